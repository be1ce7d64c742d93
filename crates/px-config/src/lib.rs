//! # px-config
//!
//! Deep-path access, flatten/nest conversion, and recursive default-merge
//! over nested configuration trees (`serde_json::Value` mappings).
//!
//! This is the merge layer under every Proxima model configuration: variant
//! presets are nested trees, user overrides address individual leaves by
//! path, and `merge_defaults` folds the two together without clobbering
//! unspecified defaults.

mod merge;

pub use merge::{
    delete, flatten, get, get_dotted, merge_defaults, nest, set, set_dotted, PATH_SEPARATOR,
};
