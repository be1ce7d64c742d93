//! Deep-path get/set/delete and default-merge over nested mappings.

use px_types::ConfigError;
use serde_json::{Map, Value};

/// Separator used by the flat (dotted-key) representation.
pub const PATH_SEPARATOR: char = '.';

fn join(path: &[&str]) -> String {
    path.join(".")
}

/// Look up the value at `path`. Fails with `PathNotFound` when any segment
/// is absent or a non-mapping value is traversed.
pub fn get<'a>(config: &'a Value, path: &[&str]) -> Result<&'a Value, ConfigError> {
    let mut current = config;
    for (depth, segment) in path.iter().enumerate() {
        current = current
            .as_object()
            .and_then(|map| map.get(*segment))
            .ok_or_else(|| ConfigError::PathNotFound {
                path: join(&path[..=depth]),
            })?;
    }
    Ok(current)
}

/// Like [`get`] with a dotted path string.
pub fn get_dotted<'a>(config: &'a Value, path: &str) -> Result<&'a Value, ConfigError> {
    let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    get(config, &segments)
}

/// Write `value` at `path`, creating intermediate mappings as needed.
///
/// An existing non-mapping value on an intermediate segment is never
/// silently replaced; that is an `IncompatiblePath` error. The leaf itself
/// is overwritten.
pub fn set(config: &mut Value, path: &[&str], value: Value) -> Result<(), ConfigError> {
    let (leaf, intermediate) = match path.split_last() {
        Some(parts) => parts,
        None => {
            return Err(ConfigError::IncompatiblePath {
                path: String::new(),
            })
        }
    };

    let mut current = config;
    for (depth, segment) in intermediate.iter().enumerate() {
        let map = current
            .as_object_mut()
            .ok_or_else(|| ConfigError::IncompatiblePath {
                path: join(&path[..depth]),
            })?;
        let entry = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            return Err(ConfigError::IncompatiblePath {
                path: join(&path[..=depth]),
            });
        }
        current = entry;
    }

    let map = current
        .as_object_mut()
        .ok_or_else(|| ConfigError::IncompatiblePath {
            path: join(intermediate),
        })?;
    map.insert(leaf.to_string(), value);
    Ok(())
}

/// Like [`set`] with a dotted path string.
pub fn set_dotted(config: &mut Value, path: &str, value: Value) -> Result<(), ConfigError> {
    let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    set(config, &segments, value)
}

/// Remove the leaf at `path` if present; a missing path is a no-op.
pub fn delete(config: &mut Value, path: &[&str]) {
    let (leaf, intermediate) = match path.split_last() {
        Some(parts) => parts,
        None => return,
    };

    let mut current = config;
    for segment in intermediate {
        current = match current.as_object_mut().and_then(|map| map.get_mut(*segment)) {
            Some(next) => next,
            None => return,
        };
    }
    if let Some(map) = current.as_object_mut() {
        map.remove(*leaf);
    }
}

/// Flatten a nested tree into a single-level mapping with dotted keys.
///
/// Empty mappings are treated as leaves so `nest(flatten(c)) == c` holds for
/// trees whose keys contain no dots.
pub fn flatten(nested: &Value) -> Map<String, Value> {
    let mut flat = Map::new();
    flatten_into(nested, String::new(), &mut flat);
    flat
}

fn flatten_into(value: &Value, prefix: String, out: &mut Map<String, Value>) {
    match value.as_object() {
        Some(map) if !map.is_empty() => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}{PATH_SEPARATOR}{key}")
                };
                flatten_into(child, path, out);
            }
        }
        _ => {
            out.insert(prefix, value.clone());
        }
    }
}

/// Rebuild a nested tree from a flat dotted-key mapping. Inverse of
/// [`flatten`].
pub fn nest(flat: &Map<String, Value>) -> Value {
    let mut nested = Value::Object(Map::new());
    for (key, value) in flat {
        let segments: Vec<&str> = key.split(PATH_SEPARATOR).collect();
        // Keys produced by `flatten` never collide on incompatible paths.
        let _ = set(&mut nested, &segments, value.clone());
    }
    nested
}

/// Merge `overrides` onto `defaults`: every leaf named in the overrides wins,
/// every default leaf not named survives. Nested mappings merge recursively,
/// never as a whole-subtree replace.
pub fn merge_defaults(overrides: &Value, defaults: &Value) -> Value {
    match (overrides.as_object(), defaults.as_object()) {
        (Some(over), Some(def)) => {
            let mut merged = def.clone();
            for (key, value) in over {
                let entry = match def.get(key) {
                    Some(existing) => merge_defaults(value, existing),
                    None => value.clone(),
                };
                merged.insert(key.clone(), entry);
            }
            Value::Object(merged)
        }
        _ => overrides.clone(),
    }
}
