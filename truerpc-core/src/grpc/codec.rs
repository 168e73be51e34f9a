//! # DynamicMessage <-> gRPC Codec
//!
//! This module implements `tonic::codec::Codec` so that `tonic` can carry a
//! [`DynamicMessage`] without generated Rust structs.
//!
//! The two directions are asymmetric:
//!
//! 1. **Encoder**: writes the request with the crate's binary encoder.
//! 2. **Decoder**: returns the response payload untouched. Decoding needs the output
//!    descriptor and the [`crate::descriptor::DescriptorIndex`], and a failure there is a
//!    [`crate::RpcError::MalformedWireData`] rather than a transport status, so it happens
//!    after the call returns.
use crate::codec::{DynamicMessage, wire};
use bytes::{Buf, BufMut, Bytes};
use tonic::{
    Status,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct WireCodec;

impl Codec for WireCodec {
    type Encode = DynamicMessage;
    type Decode = Bytes;

    type Encoder = WireEncoder;
    type Decoder = RawDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        WireEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        RawDecoder
    }
}

/// Encodes a [`DynamicMessage`] into Protobuf bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireEncoder;

impl Encoder for WireEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        dst.put_slice(&wire::encode(&item));
        Ok(())
    }
}

/// Hands back each response frame as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDecoder;

impl Decoder for RawDecoder {
    type Item = Bytes;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        Ok(Some(src.copy_to_bytes(src.remaining())))
    }
}
