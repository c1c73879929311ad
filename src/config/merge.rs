// ABOUTME: Deep merge of YAML configuration layers.
// ABOUTME: Mappings merge key by key, scalars and sequences are replaced wholesale.

use serde_yaml::Value;

/// Merge `overlay` into `base`, with `overlay` taking precedence.
///
/// Mapping values are merged recursively. Any other value in `overlay`,
/// including sequences and explicit nulls, replaces the value in `base`.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
