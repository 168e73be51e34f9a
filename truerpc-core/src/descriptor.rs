//! # Descriptors
//!
//! This module holds everything the engine knows about Protobuf schemas.
//!
//! * [`model`]: the descriptor types themselves.
//! * [`index`]: the [`DescriptorIndex`], which accumulates files and resolves type names.
//! * [`loader`]: adapters from parser output (`FileDescriptorSet` bytes or `.proto` sources
//!   compiled by `protox`) into the model.
pub mod index;
pub mod loader;
pub mod model;

pub use index::{DescriptorIndex, Resolved};
pub use model::{
    EnumDescriptor, EnumValue, FieldDescriptor, FieldType, FileDescriptor, MessageDescriptor,
    MethodDescriptor, ServiceDescriptor,
};

/// Errors raised while building descriptors or loading them from a parser.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("Field number {number} of '{message}' is outside the range 1..=536870911")]
    InvalidFieldNumber { message: String, number: u32 },

    #[error("Field number {number} is declared twice in '{message}'")]
    DuplicateFieldNumber { message: String, number: u32 },

    #[error("Field '{field}' is declared twice in '{message}'")]
    DuplicateFieldName { message: String, field: String },

    #[error("Field '{field}' of '{message}' references a message or enum without naming it")]
    MissingTypeName { message: String, field: String },

    #[error("Field '{field}' of '{message}' uses an unsupported type (groups are not supported)")]
    UnsupportedFieldType { message: String, field: String },

    #[error("Failed to decode file descriptor set: '{0}'")]
    Decode(#[from] prost_reflect::DescriptorError),

    #[error("Failed to compile proto files: '{0}'")]
    Compile(#[source] Box<protox::Error>),

    #[error("Failed to read '{path}': '{source}'")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

impl From<protox::Error> for DescriptorError {
    fn from(err: protox::Error) -> Self {
        DescriptorError::Compile(Box::new(err))
    }
}
