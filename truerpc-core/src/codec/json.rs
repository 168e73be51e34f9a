//! # Protobuf JSON Mapping
//!
//! [`from_json`] and [`to_json`] follow the canonical protobuf JSON mapping closely enough
//! for request authoring and response display:
//!
//! * Input keys may be the declared field name or its lowerCamelCase JSON name. Unknown keys
//!   and `null` values are ignored.
//! * 64-bit integers are written as strings and read from strings or numbers.
//! * Bytes are base64 (standard on output, standard or URL-safe, padded or not, on input).
//! * `NaN`, `Infinity` and `-Infinity` are strings.
//! * Enums are written by value name and read from a name or a number.
//! * Map fields are JSON objects keyed by the stringified map key.
//!
//! Output is keyed by declared field name, in declaration order, and contains every field
//! present in the message.
use super::value::{DynamicMessage, Value};
use crate::{
    descriptor::{DescriptorIndex, FieldDescriptor, FieldType, MessageDescriptor},
    error::RpcError,
};
use base64::{
    Engine,
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
};
use bytes::Bytes;
use serde_json::{Map, Number, Value as Json, json};
use std::sync::Arc;

/// Parses a JSON object into a message of type `descriptor`.
///
/// Nothing is produced unless the whole document is valid: a malformed document fails with
/// [`RpcError::InvalidInputEncoding`] and a value that does not fit its field with
/// [`RpcError::TypeMismatch`].
pub fn from_json(
    json: &str,
    descriptor: &Arc<MessageDescriptor>,
    index: &DescriptorIndex,
) -> Result<DynamicMessage, RpcError> {
    let value: Json = serde_json::from_str(json)
        .map_err(|e| RpcError::InvalidInputEncoding(e.to_string()))?;

    match value {
        Json::Object(object) => message_from_object(&object, descriptor, index),
        other => Err(RpcError::InvalidInputEncoding(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
    }
}

/// Serializes a message to compact JSON text. An empty message becomes `{}`.
pub fn to_json(message: &DynamicMessage, index: &DescriptorIndex) -> String {
    to_json_value(message, index).to_string()
}

/// Like [`to_json`], but returns the JSON tree.
pub fn to_json_value(message: &DynamicMessage, index: &DescriptorIndex) -> Json {
    let mut object = Map::new();
    for (field, value) in message.fields() {
        object.insert(field.name().to_string(), field_to_json(field, value, index));
    }
    Json::Object(object)
}

/// Replaces typographic quotes and dashes (as inserted by text editors and word processors)
/// with their ASCII forms.
pub fn normalize_quotes(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{2014}' | '\u{2013}' => '-',
            other => other,
        })
        .collect()
}

/// Builds a request skeleton for `descriptor`: every field set to its default JSON form.
///
/// Nested messages are expanded recursively. A message that (directly or indirectly)
/// contains itself is expanded once and then cut to `{}`, and so is any nested type the
/// index cannot resolve.
pub fn template(descriptor: &MessageDescriptor, index: &DescriptorIndex) -> Json {
    let mut visiting = vec![descriptor.full_name().to_string()];
    template_object(descriptor, index, &mut visiting)
}

fn template_object(
    descriptor: &MessageDescriptor,
    index: &DescriptorIndex,
    visiting: &mut Vec<String>,
) -> Json {
    let mut object = Map::new();
    for field in descriptor.fields() {
        object.insert(
            field.name().to_string(),
            template_field(field, index, visiting),
        );
    }
    Json::Object(object)
}

fn template_field(
    field: &FieldDescriptor,
    index: &DescriptorIndex,
    visiting: &mut Vec<String>,
) -> Json {
    if field.is_repeated() {
        let is_map = map_entry(field, index).is_some();
        return if is_map { json!({}) } else { json!([]) };
    }

    match field.field_type() {
        FieldType::Message => {
            let Some(nested) = field.type_name().and_then(|name| index.resolve(name).ok()) else {
                return json!({});
            };
            if visiting.iter().any(|name| name == nested.full_name()) {
                return json!({});
            }

            visiting.push(nested.full_name().to_string());
            let object = template_object(&nested, index, visiting);
            visiting.pop();
            object
        }
        FieldType::Enum => field
            .type_name()
            .and_then(|name| index.resolve_enum(name).ok())
            .and_then(|desc| desc.default_value().map(|v| json!(v.name)))
            .unwrap_or_else(|| json!(0)),
        scalar => Value::default_for(scalar)
            .map(|value| scalar_to_json(field, &value, index))
            .unwrap_or(Json::Null),
    }
}

fn message_from_object(
    object: &Map<String, Json>,
    descriptor: &Arc<MessageDescriptor>,
    index: &DescriptorIndex,
) -> Result<DynamicMessage, RpcError> {
    let mut message = DynamicMessage::new(descriptor.clone());

    for (key, json) in object {
        let Some(field) = descriptor.field_by_name(key) else {
            tracing::trace!(
                type_name = descriptor.full_name(),
                key = key.as_str(),
                "ignoring unknown JSON key"
            );
            continue;
        };
        if json.is_null() {
            continue;
        }

        let value = field_from_json(field, json, index)?;
        message.set_resolved(field, value)?;
    }

    Ok(message)
}

fn field_from_json(
    field: &FieldDescriptor,
    json: &Json,
    index: &DescriptorIndex,
) -> Result<Value, RpcError> {
    if !field.is_repeated() {
        return single_from_json(field, json, index);
    }

    if let Some(entry) = map_entry(field, index) {
        let Json::Object(object) = json else {
            return Err(mismatch(field, "a map needs a JSON object", json));
        };
        return object
            .iter()
            .map(|(key, value)| map_entry_from_json(field, &entry, key, value, index))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List);
    }

    let Json::Array(items) = json else {
        return Err(mismatch(field, "a repeated field needs a JSON array", json));
    };
    items
        .iter()
        .map(|item| single_from_json(field, item, index))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::List)
}

fn map_entry_from_json(
    field: &FieldDescriptor,
    entry: &Arc<MessageDescriptor>,
    key: &str,
    value: &Json,
    index: &DescriptorIndex,
) -> Result<Value, RpcError> {
    let (Some(key_field), Some(value_field)) = (entry.field_by_number(1), entry.field_by_number(2))
    else {
        return Err(RpcError::type_mismatch(
            field.name(),
            format!("'{}' is not a valid map entry", entry.full_name()),
        ));
    };

    let mut message = DynamicMessage::new(entry.clone());
    // Map keys are always JSON strings; numeric and bool keys are parsed out of them.
    let key_json = match (key_field.field_type(), key) {
        (FieldType::Bool, "true") => Json::Bool(true),
        (FieldType::Bool, "false") => Json::Bool(false),
        _ => Json::String(key.to_string()),
    };
    message.set_resolved(key_field, single_from_json(key_field, &key_json, index)?)?;
    if !value.is_null() {
        message.set_resolved(value_field, single_from_json(value_field, value, index)?)?;
    }

    Ok(Value::Message(message))
}

fn single_from_json(
    field: &FieldDescriptor,
    json: &Json,
    index: &DescriptorIndex,
) -> Result<Value, RpcError> {
    let value = match field.field_type() {
        FieldType::Int32 | FieldType::Sint32 | FieldType::Sfixed32 => integer(json)
            .and_then(|n| i32::try_from(n).ok())
            .map(Value::I32),
        FieldType::Int64 | FieldType::Sint64 | FieldType::Sfixed64 => {
            integer(json).and_then(|n| i64::try_from(n).ok()).map(Value::I64)
        }
        FieldType::Uint32 | FieldType::Fixed32 => integer(json)
            .and_then(|n| u32::try_from(n).ok())
            .map(Value::U32),
        FieldType::Uint64 | FieldType::Fixed64 => {
            integer(json).and_then(|n| u64::try_from(n).ok()).map(Value::U64)
        }
        FieldType::Float => float(json)
            .filter(|f| !f.is_finite() || (*f as f32).is_finite())
            .map(|f| Value::F32(f as f32)),
        FieldType::Double => float(json).map(Value::F64),
        FieldType::Bool => json.as_bool().map(Value::Bool),
        FieldType::String => json.as_str().map(|s| Value::String(s.to_string())),
        FieldType::Bytes => json.as_str().and_then(decode_base64).map(Value::Bytes),
        FieldType::Enum => return enum_from_json(field, json, index),
        FieldType::Message => {
            let Json::Object(object) = json else {
                return Err(mismatch(field, "a message needs a JSON object", json));
            };
            let nested = resolve_field_type(field, index)?;
            return message_from_object(object, &nested, index).map(Value::Message);
        }
    };

    value.ok_or_else(|| {
        let expected = format!("expected {}", field.field_type().name());
        mismatch(field, &expected, json)
    })
}

fn enum_from_json(
    field: &FieldDescriptor,
    json: &Json,
    index: &DescriptorIndex,
) -> Result<Value, RpcError> {
    if let Some(number) = integer(json).and_then(|n| i32::try_from(n).ok()) {
        return Ok(Value::EnumNumber(number));
    }

    let Some(name) = json.as_str() else {
        return Err(mismatch(field, "expected an enum name or number", json));
    };
    let type_name = field.type_name().unwrap_or_default();
    let enum_desc = index.resolve_enum(type_name)?;

    enum_desc
        .value_by_name(name)
        .map(|v| Value::EnumNumber(v.number))
        .ok_or_else(|| {
            let reason = format!("'{}' has no value named", enum_desc.full_name());
            mismatch(field, &reason, json)
        })
}

fn field_to_json(field: &FieldDescriptor, value: &Value, index: &DescriptorIndex) -> Json {
    match value {
        Value::List(items) if map_entry(field, index).is_some() => {
            let mut object = Map::new();
            for entry in items.iter().filter_map(Value::as_message) {
                let key = entry.get(1).map(map_key_to_string).unwrap_or_default();
                let json = match (entry.descriptor().field_by_number(2), entry.get(2)) {
                    (Some(value_field), Some(value)) => scalar_to_json(value_field, value, index),
                    (Some(value_field), None) => empty_json(value_field, index),
                    (None, _) => Json::Null,
                };
                object.insert(key, json);
            }
            Json::Object(object)
        }
        Value::List(items) => Json::Array(
            items
                .iter()
                .map(|item| scalar_to_json(field, item, index))
                .collect(),
        ),
        single => scalar_to_json(field, single, index),
    }
}

fn scalar_to_json(field: &FieldDescriptor, value: &Value, index: &DescriptorIndex) -> Json {
    match value {
        Value::I32(n) => json!(n),
        Value::U32(n) => json!(n),
        Value::I64(n) => Json::String(n.to_string()),
        Value::U64(n) => Json::String(n.to_string()),
        // Going through the shortest f32 text keeps 0.1f32 from printing as 0.10000000149.
        Value::F32(f) => float_to_json(f.to_string().parse().unwrap_or(f64::from(*f))),
        Value::F64(f) => float_to_json(*f),
        Value::Bool(b) => Json::Bool(*b),
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(bytes) => Json::String(STANDARD.encode(bytes)),
        Value::EnumNumber(number) => field
            .type_name()
            .and_then(|name| index.resolve_enum(name).ok())
            .and_then(|desc| desc.value_by_number(*number).map(|v| json!(v.name)))
            .unwrap_or_else(|| json!(number)),
        Value::Message(message) => to_json_value(message, index),
        Value::List(items) => Json::Array(
            items
                .iter()
                .map(|item| scalar_to_json(field, item, index))
                .collect(),
        ),
    }
}

/// JSON for a map value that was left unset on the wire.
fn empty_json(field: &FieldDescriptor, index: &DescriptorIndex) -> Json {
    match Value::default_for(field.field_type()) {
        Some(value) => scalar_to_json(field, &value, index),
        None => json!({}),
    }
}

fn float_to_json(f: f64) -> Json {
    if f.is_nan() {
        Json::String("NaN".to_string())
    } else if f.is_infinite() {
        let text = if f > 0.0 { "Infinity" } else { "-Infinity" };
        Json::String(text.to_string())
    } else {
        Number::from_f64(f).map(Json::Number).unwrap_or(Json::Null)
    }
}

fn map_key_to_string(value: &Value) -> String {
    match value {
        Value::I32(n) => n.to_string(),
        Value::I64(n) => n.to_string(),
        Value::U32(n) => n.to_string(),
        Value::U64(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => s.clone(),
        other => format!("{other:?}"),
    }
}

/// The entry type of a map field, or `None` for plain repeated fields.
fn map_entry(field: &FieldDescriptor, index: &DescriptorIndex) -> Option<Arc<MessageDescriptor>> {
    if field.field_type() != FieldType::Message {
        return None;
    }
    field
        .type_name()
        .and_then(|name| index.resolve(name).ok())
        .filter(|entry| entry.is_map_entry())
}

fn resolve_field_type(
    field: &FieldDescriptor,
    index: &DescriptorIndex,
) -> Result<Arc<MessageDescriptor>, RpcError> {
    index.resolve(field.type_name().unwrap_or_default())
}

/// An exact integer from a JSON number without fractional part, or from a numeric string.
fn integer(json: &Json) -> Option<i128> {
    match json {
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i128::from(i))
            } else if let Some(u) = n.as_u64() {
                Some(i128::from(u))
            } else {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < 1.9e19)
                    .map(|f| f as i128)
            }
        }
        Json::String(s) => s.trim().parse::<i128>().ok(),
        _ => None,
    }
}

fn float(json: &Json) -> Option<f64> {
    match json {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            other => other.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        },
        _ => None,
    }
}

fn decode_base64(text: &str) -> Option<Bytes> {
    [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD]
        .into_iter()
        .find_map(|engine| engine.decode(text).ok())
        .map(Bytes::from)
}

fn mismatch(field: &FieldDescriptor, reason: &str, json: &Json) -> RpcError {
    RpcError::type_mismatch(field.name(), format!("{reason} (got {json})"))
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOP_PROTO: &str = r#"
        syntax = "proto3";
        package shop.v1;

        enum Currency {
          CURRENCY_UNSPECIFIED = 0;
          CURRENCY_EUR = 1;
          CURRENCY_USD = 2;
        }

        message Money {
          Currency currency = 1;
          int64 units = 2;
          sint32 nanos = 3;
        }

        message Order {
          string id = 1;
          uint64 customer_id = 2;
          repeated Line lines = 3;
          map<string, int32> quantities = 4;
          bytes signature = 5;
          double weight = 6;
          float ratio = 7;
          bool gift = 8;
          Money total = 9;
          Order parent = 10;
          map<int32, Money> by_position = 11;
        }

        message Line {
          string sku = 1;
          fixed32 count = 2;
        }
    "#;

    fn shop() -> (DescriptorIndex, Arc<MessageDescriptor>) {
        let index = DescriptorIndex::new();
        index
            .register_proto_sources(&[("shop.proto", SHOP_PROTO)])
            .unwrap();
        let order = index.resolve("shop.v1.Order").unwrap();
        (index, order)
    }

    fn reparse(text: &str) -> Json {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_empty_message_serializes_to_empty_object() {
        let (index, order) = shop();
        let message = DynamicMessage::new(order);
        assert_eq!(to_json(&message, &index), "{}");
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let (index, order) = shop();

        assert!(matches!(
            from_json("{invalid json", &order, &index),
            Err(RpcError::InvalidInputEncoding(_))
        ));
        assert!(matches!(
            from_json("[1, 2]", &order, &index),
            Err(RpcError::InvalidInputEncoding(msg)) if msg.contains("an array")
        ));
    }

    #[test]
    fn test_round_trip_keeps_values() {
        let (index, order) = shop();
        let input = json!({
            "id": "o-1",
            "customer_id": "18446744073709551615",
            "lines": [{"sku": "apple", "count": 3}],
            "quantities": {"apple": 3},
            "signature": "AQID",
            "weight": 1.5,
            "ratio": 0.1,
            "gift": true,
            "total": {"currency": "CURRENCY_EUR", "units": "-9007199254740993", "nanos": -5},
            "by_position": {"1": {"units": "2"}}
        });

        let message = from_json(&input.to_string(), &order, &index).unwrap();
        let output = reparse(&to_json(&message, &index));

        assert_eq!(output, input);
    }

    #[test]
    fn test_output_follows_declaration_order() {
        let (index, order) = shop();
        let message = from_json(r#"{"gift": false, "id": "x"}"#, &order, &index).unwrap();

        // Explicitly set defaults are kept.
        assert_eq!(to_json(&message, &index), r#"{"id":"x","gift":false}"#);
    }

    #[test]
    fn test_json_names_and_unknown_keys() {
        let (index, order) = shop();
        let message = from_json(
            r#"{"customerId": 7, "unknownKey": [1, 2, 3], "id": null}"#,
            &order,
            &index,
        )
        .unwrap();

        assert_eq!(message.get_by_name("customer_id"), Some(&Value::U64(7)));
        assert!(message.get_by_name("id").is_none());
    }

    #[test]
    fn test_integer_coercion() {
        let (index, order) = shop();

        let message = from_json(r#"{"total": {"units": 12, "nanos": "3"}}"#, &order, &index)
            .unwrap();
        let total = message.get_by_name("total").and_then(Value::as_message).unwrap();
        assert_eq!(total.get(2), Some(&Value::I64(12)));
        assert_eq!(total.get(3), Some(&Value::I32(3)));

        let message = from_json(r#"{"total": {"nanos": 4.0}}"#, &order, &index).unwrap();
        let total = message.get_by_name("total").and_then(Value::as_message).unwrap();
        assert_eq!(total.get(3), Some(&Value::I32(4)));

        for bad in [
            r#"{"total": {"nanos": 1.5}}"#,
            r#"{"total": {"nanos": 3000000000}}"#,
            r#"{"customer_id": -1}"#,
            r#"{"customer_id": "12abc"}"#,
            r#"{"gift": "yes"}"#,
            r#"{"id": 5}"#,
        ] {
            assert!(
                matches!(
                    from_json(bad, &order, &index),
                    Err(RpcError::TypeMismatch { .. })
                ),
                "expected TypeMismatch for {bad}"
            );
        }
    }

    #[test]
    fn test_special_floats_and_bytes() {
        let (index, order) = shop();
        let message = from_json(
            r#"{"weight": "NaN", "ratio": "-Infinity", "signature": "-_8"}"#,
            &order,
            &index,
        )
        .unwrap();

        assert!(matches!(message.get(6), Some(Value::F64(f)) if f.is_nan()));
        assert_eq!(message.get(7), Some(&Value::F32(f32::NEG_INFINITY)));
        // URL-safe, unpadded input comes back as padded standard base64.
        assert_eq!(
            message.get(5),
            Some(&Value::Bytes(Bytes::from_static(&[0xfb, 0xff])))
        );

        let output = reparse(&to_json(&message, &index));
        assert_eq!(output["weight"], "NaN");
        assert_eq!(output["ratio"], "-Infinity");
        assert_eq!(output["signature"], "+/8=");
    }

    #[test]
    fn test_enums_by_name_and_number() {
        let (index, order) = shop();

        let message = from_json(r#"{"total": {"currency": 2}}"#, &order, &index).unwrap();
        let output = reparse(&to_json(&message, &index));
        assert_eq!(output["total"]["currency"], "CURRENCY_USD");

        // Numbers unknown to the schema survive as numbers.
        let message = from_json(r#"{"total": {"currency": 9}}"#, &order, &index).unwrap();
        let output = reparse(&to_json(&message, &index));
        assert_eq!(output["total"]["currency"], 9);

        assert!(matches!(
            from_json(r#"{"total": {"currency": "CURRENCY_GBP"}}"#, &order, &index),
            Err(RpcError::TypeMismatch { field, .. }) if field == "currency"
        ));
    }

    #[test]
    fn test_shape_mismatches() {
        let (index, order) = shop();

        for bad in [
            r#"{"lines": {"sku": "a"}}"#,
            r#"{"quantities": [1]}"#,
            r#"{"total": "EUR"}"#,
            r#"{"quantities": {"a": "many"}}"#,
        ] {
            assert!(
                matches!(
                    from_json(bad, &order, &index),
                    Err(RpcError::TypeMismatch { .. })
                ),
                "expected TypeMismatch for {bad}"
            );
        }
    }

    #[test]
    fn test_empty_repeated_and_map_fields_are_unset() {
        let (index, order) = shop();

        let message = from_json(
            r#"{"id": "o-1", "lines": [], "quantities": {}}"#,
            &order,
            &index,
        )
        .unwrap();
        let json = to_json(&message, &index);
        assert_eq!(reparse(&json), json!({"id": "o-1"}));

        let again = from_json(&json, &order, &index).unwrap();
        assert_eq!(to_json(&again, &index), json);
    }

    #[test]
    fn test_map_output_is_decided_by_the_field() {
        let (index, order) = shop();

        let message = from_json(r#"{"quantities": {"x": 1}}"#, &order, &index).unwrap();
        let json = to_json(&message, &index);
        assert_eq!(reparse(&json), json!({"quantities": {"x": 1}}));
        assert_eq!(
            to_json(&from_json(&json, &order, &index).unwrap(), &index),
            json
        );
    }

    #[test]
    fn test_nested_type_found_through_fallback() {
        let index = DescriptorIndex::new();
        index
            .register_proto_sources(&[(
                "common.proto",
                "syntax = \"proto3\"; package common; message Status { string code = 1; }",
            )])
            .unwrap();
        index
            .register_proto_sources(&[(
                "api.proto",
                r#"
                syntax = "proto3";
                package api;
                message Status { string code = 1; }
                message Resp { Status status = 1; }
                "#,
            )])
            .unwrap();

        let resp = index.resolve("api.Resp").unwrap();
        let message = from_json(r#"{"status": {"code": "x"}}"#, &resp, &index).unwrap();

        let status = message.get_by_name("status").and_then(Value::as_message).unwrap();
        assert_eq!(status.descriptor().full_name(), "common.Status");
        assert_eq!(to_json(&message, &index), r#"{"status":{"code":"x"}}"#);
    }

    #[test]
    fn test_normalize_quotes() {
        assert_eq!(
            normalize_quotes("{\u{201C}name\u{201D}: \u{2018}a\u{2019} \u{2014} b\u{2013}c}"),
            "{\"name\": 'a' - b-c}"
        );
        assert_eq!(normalize_quotes(r#"{"plain": 1}"#), r#"{"plain": 1}"#);
    }

    #[test]
    fn test_template_expands_fields_and_cuts_recursion() {
        let (index, order) = shop();
        let skeleton = template(&order, &index);

        assert_eq!(
            skeleton,
            json!({
                "id": "",
                "customer_id": "0",
                "lines": [],
                "quantities": {},
                "signature": "",
                "weight": 0.0,
                "ratio": 0.0,
                "gift": false,
                "total": {"currency": "CURRENCY_UNSPECIFIED", "units": "0", "nanos": 0},
                "parent": {},
                "by_position": {}
            })
        );

        let keys: Vec<_> = skeleton.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys[0], "id");
        assert_eq!(keys[10], "by_position");
    }
}
