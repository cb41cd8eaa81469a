//! Key validation for raw env trees.
//!
//! `__` is reserved for override paths (`env__a__b`), and top-level keys
//! starting with `_` are reserved for the env itself.

use crate::error::ValidationError;
use crate::node::Node;

/// Top-level key that is allowed to start with an underscore.
pub const MODULE_KEY: &str = "_module";

/// Delimiter between override path segments.
pub const DELIMITER: &str = "__";

/// Collect the keys of every mapping in the tree, at every depth, in document order.
///
/// Mappings nested inside sequences are included.
pub fn collect_keys(node: &Node) -> Vec<String> {
    let mut keys = Vec::new();
    walk_keys(node, &mut keys);
    keys
}

fn walk_keys(node: &Node, keys: &mut Vec<String>) {
    match node {
        Node::Map(map) => {
            for (key, value) in map {
                keys.push(key.clone());
                walk_keys(value, keys);
            }
        }
        Node::Seq(items) => {
            for item in items {
                walk_keys(item, keys);
            }
        }
        _ => {}
    }
}

/// Validate key shapes. Double-underscore keys are checked first, at all depths.
pub fn validate_keys(root: &Node) -> Result<(), ValidationError> {
    let double: Vec<String> = collect_keys(root)
        .into_iter()
        .filter(|key| key.contains(DELIMITER))
        .collect();

    if !double.is_empty() {
        return Err(ValidationError::DoubleUnderscore { keys: double });
    }

    let leading: Vec<String> = root
        .as_map()
        .map(|map| {
            map.keys()
                .filter(|key| key.starts_with('_') && key.as_str() != MODULE_KEY)
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    if !leading.is_empty() {
        return Err(ValidationError::LeadingUnderscore {
            keys: leading,
            reserved: MODULE_KEY,
        });
    }

    Ok(())
}
