//! Deep merge of TOML values.
//!
//! The merge operates on raw [`toml::Value`] trees rather than deserialized
//! structs, so a key missing from an upper layer never overrides the base.

mod deep;
mod types;

pub use deep::{deep_merge, deep_merge_tracking, record_layer};
pub use types::{ConfigLayer, FieldSources};
