//! The configuration tree.
//!
//! A [`Node`] is a scalar, a path, a sequence, or a string-keyed mapping.
//! Mappings keep insertion order so rendering follows the source document.

use crate::error::{EnvError, EnvResult};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};

/// Mapping type used by [`Node::Map`].
pub type NodeMap = IndexMap<String, Node>;

/// A node of the configuration tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Node {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Path(PathBuf),
    Seq(Vec<Node>),
    Map(NodeMap),
}

impl Node {
    /// An empty mapping.
    pub fn map() -> Self {
        Node::Map(NodeMap::new())
    }

    pub fn as_map(&self) -> Option<&NodeMap> {
        match self {
            Node::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut NodeMap> {
        match self {
            Node::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Node::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Node::Float(f) => Some(*f),
            Node::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Node::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Node]> {
        match self {
            Node::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    /// Look up a key in a mapping node.
    ///
    /// Fails with a lookup error if this node is not a mapping or the key is absent.
    pub fn get(&self, key: &str) -> EnvResult<&Node> {
        self.as_map()
            .and_then(|map| map.get(key))
            .ok_or_else(|| EnvError::key_not_found(key))
    }

    /// Follow a dotted path (`a.b.c`) through nested mappings.
    pub fn lookup(&self, dotted: &str) -> EnvResult<&Node> {
        let mut current = self;
        for segment in dotted.split('.') {
            current = current
                .as_map()
                .and_then(|map| map.get(segment))
                .ok_or_else(|| EnvError::missing_segment(dotted, segment))?;
        }
        Ok(current)
    }

    /// Convert to JSON. Paths become strings, non-finite floats become null.
    pub fn to_json(&self) -> Value {
        match self {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Int(i) => Value::from(*i),
            Node::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Node::String(s) => Value::String(s.clone()),
            Node::Path(p) => Value::String(p.to_string_lossy().into_owned()),
            Node::Seq(items) => Value::Array(items.iter().map(Node::to_json).collect()),
            Node::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Parse a command-line style value (`100`, `true`, `some text`) as a YAML scalar.
    ///
    /// Anything that does not parse to a YAML scalar stays a plain string.
    pub fn parse_scalar(text: &str) -> Node {
        use serde_yaml::Value as Yaml;
        if text.trim().is_empty() {
            return Node::String(text.to_string());
        }
        match serde_yaml::from_str::<Yaml>(text) {
            Ok(value @ (Yaml::Null | Yaml::Bool(_) | Yaml::Number(_) | Yaml::String(_))) => {
                Node::from(value)
            }
            _ => Node::String(text.to_string()),
        }
    }
}

impl From<serde_yaml::Value> for Node {
    fn from(value: serde_yaml::Value) -> Self {
        use serde_yaml::Value as Yaml;
        match value {
            Yaml::Null => Node::Null,
            Yaml::Bool(b) => Node::Bool(b),
            Yaml::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Node::Int(i)
                } else {
                    Node::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Yaml::String(s) => Node::String(s),
            Yaml::Sequence(items) => Node::Seq(items.into_iter().map(Node::from).collect()),
            Yaml::Mapping(mapping) => Node::Map(
                mapping
                    .into_iter()
                    .map(|(k, v)| (yaml_key(k), Node::from(v)))
                    .collect(),
            ),
            Yaml::Tagged(tagged) => Node::from(tagged.value),
        }
    }
}

/// Mapping keys are always strings; scalar keys are stringified.
fn yaml_key(key: serde_yaml::Value) -> String {
    use serde_yaml::Value as Yaml;
    match key {
        Yaml::String(s) => s,
        Yaml::Bool(b) => b.to_string(),
        Yaml::Number(n) => n.to_string(),
        Yaml::Null => "null".to_string(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Node::Int(i)
                } else {
                    Node::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Node::String(s),
            Value::Array(items) => Node::Seq(items.into_iter().map(Node::from).collect()),
            Value::Object(map) => Node::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Node::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::String(s.to_string())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::String(s)
    }
}

impl From<i64> for Node {
    fn from(i: i64) -> Self {
        Node::Int(i)
    }
}

impl From<i32> for Node {
    fn from(i: i32) -> Self {
        Node::Int(i64::from(i))
    }
}

impl From<f64> for Node {
    fn from(f: f64) -> Self {
        Node::Float(f)
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::Bool(b)
    }
}

impl From<PathBuf> for Node {
    fn from(p: PathBuf) -> Self {
        Node::Path(p)
    }
}

impl From<NodeMap> for Node {
    fn from(map: NodeMap) -> Self {
        Node::Map(map)
    }
}

impl From<Vec<Node>> for Node {
    fn from(items: Vec<Node>) -> Self {
        Node::Seq(items)
    }
}

/// Renders a dictionary literal: `{'a': 1, 'b': [True, None], 'p': Path('/tmp')}`.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Null => write!(f, "None"),
            Node::Bool(true) => write!(f, "True"),
            Node::Bool(false) => write!(f, "False"),
            Node::Int(i) => write!(f, "{}", i),
            Node::Float(x) => {
                if x.is_finite() && x.fract() == 0.0 {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Node::String(s) => write_quoted(f, s),
            Node::Path(p) => {
                write!(f, "Path(")?;
                write_quoted(f, &p.to_string_lossy())?;
                write!(f, ")")
            }
            Node::Seq(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Node::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_quoted(f, key)?;
                    write!(f, ": {}", value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "'")?;
    for c in s.chars() {
        match c {
            '\'' => write!(f, "\\'")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            other => write!(f, "{}", other)?,
        }
    }
    write!(f, "'")
}
