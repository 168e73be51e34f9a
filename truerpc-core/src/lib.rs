//! # TrueRPC Core
//!
//! `truerpc-core` is the engine behind the TrueRPC CLI. It performs unary gRPC calls against
//! any server without compile-time knowledge of the Protobuf schema: schemas are loaded at
//! runtime, requests are written as JSON and responses come back as JSON.
//!
//! ## Key Components
//!
//! * **[`descriptor`]:** The descriptor model (files, messages, fields, enums, services,
//!   methods) and the [`DescriptorIndex`] that resolves type names against every loaded file.
//! * **[`codec`]:** [`DynamicMessage`], a message whose layout comes from a descriptor, plus
//!   its JSON and protobuf binary encodings.
//! * **[`address`]:** Parsing of `host[:port]` targets and the plaintext/TLS decision.
//! * **[`client`]:** [`TrueRpcClient`], which drives one unary call end to end.
//! * **[`error`]:** [`RpcError`], the closed set of failures a call can produce.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use truerpc_core::{DescriptorIndex, TrueRpcClient, client::UnaryRequest};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let index = Arc::new(DescriptorIndex::new());
//! index.register_proto_files(&["protos/echo.proto"], &["protos"])?;
//!
//! let client = TrueRpcClient::new(index);
//! let response = client
//!     .execute(
//!         "echo.EchoService",
//!         "UnaryEcho",
//!         UnaryRequest::new(r#"{"message": "hi"}"#, "localhost:50051"),
//!     )
//!     .await?;
//!
//! println!("{} ({:.3}s)", response.body, response.elapsed_seconds());
//! # Ok(())
//! # }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports `prost` and `tonic` so that consumers use compatible versions of
//! these underlying dependencies.
pub mod address;
pub mod client;
pub mod codec;
pub mod descriptor;
pub mod error;
pub mod grpc;

pub use client::TrueRpcClient;
pub use codec::{DynamicMessage, Value};
pub use descriptor::{DescriptorError, DescriptorIndex};
pub use error::RpcError;

// Re-exports
pub use prost;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
