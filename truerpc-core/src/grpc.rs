//! # Generic gRPC Transport
//!
//! This module contains the low-level building blocks for performing unary gRPC calls with
//! dynamic message types.
//!
//! Unlike standard `tonic` clients which are strongly typed (e.g., `HelloRequest`), the
//! components here send a [`crate::codec::DynamicMessage`] and hand back the raw response
//! bytes, leaving it to the caller to decode them against the right descriptor.
//!
//! * [`codec`]: the `tonic::codec::Codec` bridging [`crate::codec::wire`] and tonic.
//! * [`client`]: a thin unary client plus request/metadata helpers.
//! * [`connector`]: how a transport is opened for an [`crate::address::RpcAddress`].
pub mod client;
pub mod codec;
pub mod connector;
