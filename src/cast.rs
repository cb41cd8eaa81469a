//! Casting of path-like sub-trees.
//!
//! String leaves under the top-level `path` key (and any other key flagged as
//! path-like) become [`Node::Path`] values with `~` expanded to the home
//! directory.

use crate::node::Node;
use std::path::PathBuf;

/// Top-level key whose string leaves are always cast to paths.
pub const PATH_KEY: &str = "path";

/// Expand a leading `~` (alone or followed by a separator) to the home directory.
///
/// Other strings, including `~user` forms, are returned unchanged.
pub fn expand_user(raw: &str) -> PathBuf {
    let rest = if raw == "~" {
        Some("")
    } else {
        raw.strip_prefix("~/")
            .or_else(|| raw.strip_prefix("~\\"))
    };

    match (rest, dirs::home_dir()) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(raw),
    }
}

/// Cast every string leaf of `node` to a path, recursing into mappings and sequences.
pub fn cast_paths(node: Node) -> Node {
    match node {
        Node::String(s) => Node::Path(expand_user(&s)),
        Node::Seq(items) => Node::Seq(items.into_iter().map(cast_paths).collect()),
        Node::Map(map) => Node::Map(map.into_iter().map(|(k, v)| (k, cast_paths(v))).collect()),
        other => other,
    }
}

/// Cast the sub-trees of `root` named by `path_keys`. Other keys are left as-is.
pub fn cast_path_keys(root: Node, path_keys: &[String]) -> Node {
    match root {
        Node::Map(map) => Node::Map(
            map.into_iter()
                .map(|(key, value)| {
                    if path_keys.iter().any(|k| *k == key) {
                        (key, cast_paths(value))
                    } else {
                        (key, value)
                    }
                })
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn default_keys() -> Vec<String> {
        vec![PATH_KEY.to_string()]
    }

    #[test]
    fn test_path_leaves_become_paths() {
        let root = Node::from(json!({"path": {"a": "/tmp/path/file.txt", "b": "/another/path/file.csv"}}));
        let cast = cast_path_keys(root, &default_keys());
        assert_eq!(
            cast.lookup("path.a").unwrap(),
            &Node::Path(PathBuf::from("/tmp/path/file.txt"))
        );
        assert!(cast.lookup("path.b").unwrap().as_path().is_some());
    }

    #[test]
    fn test_home_is_expanded() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let root = Node::from(json!({"path": {"home": "~", "data": "~/data"}}));
        let cast = cast_path_keys(root, &default_keys());
        assert_eq!(cast.lookup("path.home").unwrap().as_path(), Some(home.as_path()));
        assert_eq!(
            cast.lookup("path.data").unwrap().as_path(),
            Some(home.join("data").as_path())
        );
    }

    #[test]
    fn test_other_keys_untouched() {
        let root = Node::from(json!({"name": "/not/a/path", "path": {"n": 1}}));
        let cast = cast_path_keys(root, &default_keys());
        assert_eq!(cast.get("name").unwrap(), &Node::from("/not/a/path"));
        assert_eq!(cast.lookup("path.n").unwrap(), &Node::Int(1));
    }

    #[test]
    fn test_nested_path_subtree() {
        let root = Node::from(json!({"path": {"raw": {"x": "/data/x"}, "list": ["/a", "/b"]}}));
        let cast = cast_path_keys(root, &default_keys());
        assert!(cast.lookup("path.raw.x").unwrap().as_path().is_some());
        let list = cast.lookup("path.list").unwrap().as_seq().unwrap();
        assert!(list.iter().all(|n| n.as_path().is_some()));
    }

    #[test]
    fn test_tilde_user_not_expanded() {
        assert_eq!(expand_user("~other/x"), PathBuf::from("~other/x"));
    }
}
