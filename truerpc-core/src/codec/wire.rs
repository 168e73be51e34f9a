//! # Protobuf Binary Format
//!
//! Field-level layout of the protobuf wire format for [`DynamicMessage`]. Keys, varints and
//! wire types come from `prost::encoding`; everything above them is done here.
//!
//! Encoding writes fields in declaration order and packs repeated scalar numbers. Decoding
//! accepts both packed and unpacked repeated scalars and skips fields the descriptor does not
//! declare, groups included.
use super::value::{DynamicMessage, Value};
use crate::{
    descriptor::{DescriptorIndex, FieldDescriptor, FieldType, MessageDescriptor},
    error::RpcError,
};
use bytes::{Buf, BufMut, Bytes};
use prost::encoding::{WireType, decode_key, decode_varint, encode_key, encode_varint};
use std::sync::Arc;

/// Deepest message (or group) nesting accepted by [`decode`].
pub const MAX_NESTING_DEPTH: usize = 100;

/// Encodes a message into protobuf binary form.
pub fn encode(message: &DynamicMessage) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_into(message, &mut buf);
    buf
}

/// Decodes protobuf bytes as a message of type `descriptor`.
///
/// Truncated input, lengths running past the end of the buffer, a known field framed with the
/// wrong wire type, invalid UTF-8 in a string field and nesting beyond
/// [`MAX_NESTING_DEPTH`] all fail with [`RpcError::MalformedWireData`].
pub fn decode(
    bytes: &[u8],
    descriptor: Arc<MessageDescriptor>,
    index: &DescriptorIndex,
) -> Result<DynamicMessage, RpcError> {
    let mut buf = bytes;
    decode_message(&mut buf, descriptor, index, 0)
}

fn encode_into(message: &DynamicMessage, buf: &mut Vec<u8>) {
    for (field, value) in message.fields() {
        let field_type = field.field_type();

        match value {
            Value::List(items) if field_type.is_packable() => {
                if items.is_empty() {
                    continue;
                }
                let mut packed = Vec::new();
                for item in items {
                    encode_value(field_type, item, &mut packed);
                }
                encode_key(field.number(), WireType::LengthDelimited, buf);
                encode_varint(packed.len() as u64, buf);
                buf.extend_from_slice(&packed);
            }
            Value::List(items) => {
                for item in items {
                    encode_key(field.number(), field_type.wire_type(), buf);
                    encode_value(field_type, item, buf);
                }
            }
            single => {
                encode_key(field.number(), field_type.wire_type(), buf);
                encode_value(field_type, single, buf);
            }
        }
    }
}

/// Writes the payload of one value (no key). Values were type checked when they were set, so
/// the variant always agrees with `field_type`; the field type only picks the integer flavour.
fn encode_value(field_type: FieldType, value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::I32(v) => match field_type {
            FieldType::Sint32 => encode_varint(u64::from(zigzag32(*v)), buf),
            FieldType::Sfixed32 => buf.put_i32_le(*v),
            // Negative int32 values are sign extended to ten bytes.
            _ => encode_varint(i64::from(*v) as u64, buf),
        },
        Value::I64(v) => match field_type {
            FieldType::Sint64 => encode_varint(zigzag64(*v), buf),
            FieldType::Sfixed64 => buf.put_i64_le(*v),
            _ => encode_varint(*v as u64, buf),
        },
        Value::U32(v) => match field_type {
            FieldType::Fixed32 => buf.put_u32_le(*v),
            _ => encode_varint(u64::from(*v), buf),
        },
        Value::U64(v) => match field_type {
            FieldType::Fixed64 => buf.put_u64_le(*v),
            _ => encode_varint(*v, buf),
        },
        Value::F32(v) => buf.put_f32_le(*v),
        Value::F64(v) => buf.put_f64_le(*v),
        Value::Bool(v) => encode_varint(u64::from(*v), buf),
        Value::EnumNumber(v) => encode_varint(i64::from(*v) as u64, buf),
        Value::String(s) => {
            encode_varint(s.len() as u64, buf);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(bytes) => {
            encode_varint(bytes.len() as u64, buf);
            buf.extend_from_slice(bytes);
        }
        Value::Message(message) => {
            let nested = encode(message);
            encode_varint(nested.len() as u64, buf);
            buf.extend_from_slice(&nested);
        }
        Value::List(items) => {
            for item in items {
                encode_value(field_type, item, buf);
            }
        }
    }
}

fn decode_message(
    buf: &mut &[u8],
    descriptor: Arc<MessageDescriptor>,
    index: &DescriptorIndex,
    depth: usize,
) -> Result<DynamicMessage, RpcError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(RpcError::MalformedWireData(format!(
            "message nesting exceeds {MAX_NESTING_DEPTH} levels"
        )));
    }

    let mut message = DynamicMessage::new(descriptor.clone());

    while buf.has_remaining() {
        let (number, wire_type) = decode_key(buf).map_err(malformed)?;

        let Some(field) = descriptor.field_by_number(number) else {
            skip_field(buf, number, wire_type, depth)?;
            continue;
        };
        let field_type = field.field_type();

        if field.is_repeated()
            && field_type.is_packable()
            && wire_type == WireType::LengthDelimited
        {
            let mut packed = take_length_delimited(buf)?;
            while packed.has_remaining() {
                let value = decode_value(&mut packed, field, index, depth)?;
                message.push(field, value)?;
            }
            continue;
        }

        if wire_type != field_type.wire_type() {
            return Err(RpcError::MalformedWireData(format!(
                "field '{}' of '{}' was sent as {wire_type:?}, expected {:?}",
                field.name(),
                descriptor.full_name(),
                field_type.wire_type()
            )));
        }

        let value = decode_value(buf, field, index, depth)?;
        if field.is_repeated() {
            message.push(field, value)?;
        } else {
            // Last one wins for singular fields.
            message.set_resolved(field, value)?;
        }
    }

    Ok(message)
}

fn decode_value(
    buf: &mut &[u8],
    field: &FieldDescriptor,
    index: &DescriptorIndex,
    depth: usize,
) -> Result<Value, RpcError> {
    let value = match field.field_type() {
        FieldType::Int32 => Value::I32(varint(buf)? as i32),
        FieldType::Int64 => Value::I64(varint(buf)? as i64),
        FieldType::Uint32 => Value::U32(varint(buf)? as u32),
        FieldType::Uint64 => Value::U64(varint(buf)?),
        FieldType::Sint32 => Value::I32(unzigzag32(varint(buf)? as u32)),
        FieldType::Sint64 => Value::I64(unzigzag64(varint(buf)?)),
        FieldType::Bool => Value::Bool(varint(buf)? != 0),
        FieldType::Enum => Value::EnumNumber(varint(buf)? as i32),
        FieldType::Fixed32 => {
            ensure_remaining(buf, 4)?;
            Value::U32(buf.get_u32_le())
        }
        FieldType::Sfixed32 => {
            ensure_remaining(buf, 4)?;
            Value::I32(buf.get_i32_le())
        }
        FieldType::Float => {
            ensure_remaining(buf, 4)?;
            Value::F32(buf.get_f32_le())
        }
        FieldType::Fixed64 => {
            ensure_remaining(buf, 8)?;
            Value::U64(buf.get_u64_le())
        }
        FieldType::Sfixed64 => {
            ensure_remaining(buf, 8)?;
            Value::I64(buf.get_i64_le())
        }
        FieldType::Double => {
            ensure_remaining(buf, 8)?;
            Value::F64(buf.get_f64_le())
        }
        FieldType::String => {
            let bytes = take_length_delimited(buf)?;
            let text = std::str::from_utf8(bytes).map_err(|e| {
                RpcError::MalformedWireData(format!(
                    "field '{}' is not valid UTF-8: {e}",
                    field.name()
                ))
            })?;
            Value::String(text.to_string())
        }
        FieldType::Bytes => Value::Bytes(Bytes::copy_from_slice(take_length_delimited(buf)?)),
        FieldType::Message => {
            let mut nested = take_length_delimited(buf)?;
            let descriptor = index.resolve(field.type_name().unwrap_or_default())?;
            Value::Message(decode_message(&mut nested, descriptor, index, depth + 1)?)
        }
    };

    Ok(value)
}

fn skip_field(
    buf: &mut &[u8],
    number: u32,
    wire_type: WireType,
    depth: usize,
) -> Result<(), RpcError> {
    match wire_type {
        WireType::Varint => {
            varint(buf)?;
        }
        WireType::SixtyFourBit => {
            ensure_remaining(buf, 8)?;
            buf.advance(8);
        }
        WireType::ThirtyTwoBit => {
            ensure_remaining(buf, 4)?;
            buf.advance(4);
        }
        WireType::LengthDelimited => {
            take_length_delimited(buf)?;
        }
        WireType::StartGroup => {
            if depth >= MAX_NESTING_DEPTH {
                return Err(RpcError::MalformedWireData(format!(
                    "group nesting exceeds {MAX_NESTING_DEPTH} levels"
                )));
            }
            loop {
                if !buf.has_remaining() {
                    return Err(RpcError::MalformedWireData(format!(
                        "group {number} is not terminated"
                    )));
                }
                let (inner_number, inner_type) = decode_key(buf).map_err(malformed)?;
                if inner_type == WireType::EndGroup {
                    if inner_number != number {
                        return Err(RpcError::MalformedWireData(format!(
                            "group {number} closed with end tag {inner_number}"
                        )));
                    }
                    break;
                }
                skip_field(buf, inner_number, inner_type, depth + 1)?;
            }
        }
        WireType::EndGroup => {
            return Err(RpcError::MalformedWireData(format!(
                "unexpected end of group {number}"
            )));
        }
    }

    Ok(())
}

fn take_length_delimited<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], RpcError> {
    let len = varint(buf)?;
    if len > buf.len() as u64 {
        return Err(RpcError::MalformedWireData(format!(
            "length {len} exceeds the {} remaining bytes",
            buf.len()
        )));
    }

    let remaining: &'a [u8] = *buf;
    let (head, tail) = remaining.split_at(len as usize);
    *buf = tail;
    Ok(head)
}

fn varint(buf: &mut &[u8]) -> Result<u64, RpcError> {
    decode_varint(buf).map_err(malformed)
}

fn ensure_remaining(buf: &[u8], needed: usize) -> Result<(), RpcError> {
    if buf.len() < needed {
        return Err(RpcError::MalformedWireData(format!(
            "expected {needed} bytes, {} remaining",
            buf.len()
        )));
    }
    Ok(())
}

fn malformed(err: prost::DecodeError) -> RpcError {
    RpcError::MalformedWireData(err.to_string())
}

fn zigzag32(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

fn zigzag64(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn unzigzag32(v: u32) -> i32 {
    ((v >> 1) as i32) ^ -((v & 1) as i32)
}

fn unzigzag64(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}
