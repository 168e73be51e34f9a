//! Typed field values and the [`DynamicMessage`] container.
use crate::{
    descriptor::{FieldDescriptor, FieldType, MessageDescriptor},
    error::RpcError,
};
use bytes::Bytes;
use std::{collections::BTreeMap, sync::Arc};

/// A single field value, tagged with the representation its wire type needs.
///
/// Enums are carried as their number so that values unknown to the local schema survive
/// a round trip. Repeated fields (and map fields, as lists of entry messages) use
/// [`Value::List`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    String(String),
    Bytes(Bytes),
    EnumNumber(i32),
    Message(DynamicMessage),
    List(Vec<Value>),
}

impl Value {
    /// The zero value of a scalar type. Messages have no default without a descriptor.
    pub fn default_for(field_type: FieldType) -> Option<Value> {
        let value = match field_type {
            FieldType::Int32 | FieldType::Sint32 | FieldType::Sfixed32 => Value::I32(0),
            FieldType::Int64 | FieldType::Sint64 | FieldType::Sfixed64 => Value::I64(0),
            FieldType::Uint32 | FieldType::Fixed32 => Value::U32(0),
            FieldType::Uint64 | FieldType::Fixed64 => Value::U64(0),
            FieldType::Float => Value::F32(0.0),
            FieldType::Double => Value::F64(0.0),
            FieldType::Bool => Value::Bool(false),
            FieldType::String => Value::String(String::new()),
            FieldType::Bytes => Value::Bytes(Bytes::new()),
            FieldType::Enum => Value::EnumNumber(0),
            FieldType::Message => return None,
        };
        Some(value)
    }

    /// Whether this (single, non-list) value can be stored in a field of `field_type`.
    pub fn is_valid_for(&self, field_type: FieldType) -> bool {
        matches!(
            (field_type, self),
            (
                FieldType::Int32 | FieldType::Sint32 | FieldType::Sfixed32,
                Value::I32(_)
            ) | (
                FieldType::Int64 | FieldType::Sint64 | FieldType::Sfixed64,
                Value::I64(_)
            ) | (FieldType::Uint32 | FieldType::Fixed32, Value::U32(_))
                | (FieldType::Uint64 | FieldType::Fixed64, Value::U64(_))
                | (FieldType::Float, Value::F32(_))
                | (FieldType::Double, Value::F64(_))
                | (FieldType::Bool, Value::Bool(_))
                | (FieldType::String, Value::String(_))
                | (FieldType::Bytes, Value::Bytes(_))
                | (FieldType::Enum, Value::EnumNumber(_))
                | (FieldType::Message, Value::Message(_))
        )
    }

    /// Short name of the variant, used in mismatch diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::EnumNumber(_) => "enum number",
            Value::Message(_) => "message",
            Value::List(_) => "list",
        }
    }

    pub fn as_message(&self) -> Option<&DynamicMessage> {
        match self {
            Value::Message(message) => Some(message),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

/// A message instance bound to a descriptor.
///
/// Values are keyed by field number. Every write is checked against the declared type of the
/// field, so a `DynamicMessage` never holds a value its descriptor cannot encode.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicMessage {
    descriptor: Arc<MessageDescriptor>,
    values: BTreeMap<u32, Value>,
}

impl DynamicMessage {
    pub fn new(descriptor: Arc<MessageDescriptor>) -> Self {
        Self {
            descriptor,
            values: BTreeMap::new(),
        }
    }

    pub fn descriptor(&self) -> &Arc<MessageDescriptor> {
        &self.descriptor
    }

    /// Stores `value` in the field with this number.
    pub fn set(&mut self, number: u32, value: Value) -> Result<(), RpcError> {
        let field = self.descriptor.field_by_number(number).ok_or_else(|| {
            RpcError::type_mismatch(
                number.to_string(),
                format!("'{}' declares no field {number}", self.descriptor.full_name()),
            )
        })?;

        check_value(field, &value, check_single)?;
        self.store(number, value);
        Ok(())
    }

    /// Stores a value the codecs built by resolving nested types through the index.
    ///
    /// Only the value kind is checked. Resolution may have matched a declaration whose full
    /// name differs from the field's type reference (see the fallback in
    /// [`crate::descriptor::index`]), and that match is authoritative.
    pub(crate) fn set_resolved(
        &mut self,
        field: &FieldDescriptor,
        value: Value,
    ) -> Result<(), RpcError> {
        check_value(field, &value, check_kind)?;
        self.store(field.number(), value);
        Ok(())
    }

    /// An empty list leaves a repeated field unset: the binary form cannot tell the two apart.
    fn store(&mut self, number: u32, value: Value) {
        match value {
            Value::List(items) if items.is_empty() => {
                self.values.remove(&number);
            }
            value => {
                self.values.insert(number, value);
            }
        }
    }

    /// Stores `value` in the field with this declared (or JSON) name.
    pub fn set_by_name(&mut self, name: &str, value: Value) -> Result<(), RpcError> {
        let number = self
            .descriptor
            .field_by_name(name)
            .map(FieldDescriptor::number)
            .ok_or_else(|| {
                RpcError::type_mismatch(
                    name,
                    format!("'{}' declares no such field", self.descriptor.full_name()),
                )
            })?;
        self.set(number, value)
    }

    pub fn get(&self, number: u32) -> Option<&Value> {
        self.values.get(&number)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        let field = self.descriptor.field_by_name(name)?;
        self.values.get(&field.number())
    }

    /// The stored value, or the field's zero value when it is unset.
    ///
    /// Returns `None` for unknown names and for unset singular message fields.
    pub fn get_or_default(&self, name: &str) -> Option<Value> {
        let field = self.descriptor.field_by_name(name)?;
        if let Some(value) = self.values.get(&field.number()) {
            return Some(value.clone());
        }
        if field.is_repeated() {
            return Some(Value::List(Vec::new()));
        }
        Value::default_for(field.field_type())
    }

    pub fn has(&self, number: u32) -> bool {
        self.values.contains_key(&number)
    }

    pub fn clear(&mut self, number: u32) -> Option<Value> {
        self.values.remove(&number)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Set fields with their values, in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&FieldDescriptor, &Value)> {
        self.descriptor
            .fields()
            .iter()
            .filter_map(|field| self.values.get(&field.number()).map(|value| (field, value)))
    }

    /// Appends a decoded item to a repeated field, creating the list on first use.
    pub(crate) fn push(&mut self, field: &FieldDescriptor, value: Value) -> Result<(), RpcError> {
        check_kind(field, &value)?;
        match self
            .values
            .entry(field.number())
            .or_insert_with(|| Value::List(Vec::new()))
        {
            Value::List(items) => items.push(value),
            other => *other = Value::List(vec![value]),
        }
        Ok(())
    }
}

type ItemCheck = fn(&FieldDescriptor, &Value) -> Result<(), RpcError>;

fn check_value(field: &FieldDescriptor, value: &Value, check: ItemCheck) -> Result<(), RpcError> {
    if !field.is_repeated() {
        return check(field, value);
    }

    match value {
        Value::List(items) => items.iter().try_for_each(|item| check(field, item)),
        other => Err(RpcError::type_mismatch(
            field.name(),
            format!("repeated field needs a list, got {}", other.kind()),
        )),
    }
}

fn check_kind(field: &FieldDescriptor, value: &Value) -> Result<(), RpcError> {
    if value.is_valid_for(field.field_type()) {
        return Ok(());
    }
    Err(RpcError::type_mismatch(
        field.name(),
        format!(
            "expected {}, got {}",
            field.field_type().name(),
            value.kind()
        ),
    ))
}

/// Kind check plus, for messages, a textual check of the nested type name.
fn check_single(field: &FieldDescriptor, value: &Value) -> Result<(), RpcError> {
    check_kind(field, value)?;

    if let (Value::Message(message), Some(type_name)) = (value, field.type_name()) {
        let actual = message.descriptor().full_name();
        if !names_agree(type_name, actual) {
            return Err(RpcError::type_mismatch(
                field.name(),
                format!("expected message {type_name}, got {actual}"),
            ));
        }
    }

    Ok(())
}

/// Whether a (possibly relative, possibly over-qualified) type reference can denote `full_name`.
fn names_agree(reference: &str, full_name: &str) -> bool {
    let reference = reference.strip_prefix('.').unwrap_or(reference);
    reference == full_name
        || full_name.ends_with(&format!(".{reference}"))
        || reference.ends_with(&format!(".{full_name}"))
}
