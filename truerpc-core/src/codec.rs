//! # Dynamic Message Codec
//!
//! Converts between JSON text, protobuf binary and [`DynamicMessage`], a message whose layout
//! is taken from a [`crate::descriptor::MessageDescriptor`] at runtime.
//!
//! * [`value`]: the [`Value`] union and [`DynamicMessage`] itself.
//! * [`json`]: the protobuf JSON mapping, plus request templates.
//! * [`wire`]: the protobuf binary format.
//!
//! Nested message and enum types are looked up through a
//! [`crate::descriptor::DescriptorIndex`] as they are encountered, which is why most entry
//! points take one.
pub mod json;
pub mod value;
pub mod wire;

pub use json::{from_json, normalize_quotes, template, to_json, to_json_value};
pub use value::{DynamicMessage, Value};
pub use wire::{MAX_NESTING_DEPTH, decode, encode};
