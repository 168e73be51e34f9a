use colored::*;
use std::fmt::Display;
use truerpc_core::{
    DescriptorIndex, RpcError,
    client::UnaryResponse,
    descriptor::{EnumDescriptor, FieldDescriptor, FieldType, MessageDescriptor, ServiceDescriptor},
};

/// A wrapper struct for a formatted, colored string.
///
/// Implements `Display` so it can be printed directly.
pub struct FormattedString(pub String);

pub struct ServiceList(pub Vec<String>);

pub struct GenericError<T: Display>(pub &'static str, pub T);

/// A message definition, rendered with map fields spelled out as `map<K, V>`.
pub struct MessageView<'a> {
    pub message: &'a MessageDescriptor,
    pub index: &'a DescriptorIndex,
}

impl std::fmt::Display for FormattedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", self.0)?;
        Ok(())
    }
}

impl From<serde_json::Value> for FormattedString {
    fn from(value: serde_json::Value) -> Self {
        FormattedString(serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()))
    }
}

impl From<UnaryResponse> for FormattedString {
    fn from(response: UnaryResponse) -> Self {
        let body = serde_json::from_str::<serde_json::Value>(&response.body)
            .ok()
            .and_then(|value| serde_json::to_string_pretty(&value).ok())
            .unwrap_or_else(|| response.body.clone());

        let mut out = String::new();
        out.push_str(&body);
        out.push_str(&format!(
            "\n\n{} {} in {:.3}s\n",
            "Status:".green().bold(),
            response.status_message,
            response.elapsed_seconds()
        ));

        if !response.headers.is_empty() {
            out.push_str(&format!("{}\n", "Headers:".cyan()));
            for (key, value) in &response.headers {
                out.push_str(&format!("  {}: {}\n", key.dimmed(), value));
            }
        }

        FormattedString(out.trim_end().to_string())
    }
}

impl From<RpcError> for FormattedString {
    fn from(err: RpcError) -> Self {
        let Some(call) = err.failed_call() else {
            let title = format!("{}:", error_title(&err));
            return FormattedString(format!("{}\n\n'{}'", title.red().bold(), err));
        };

        let mut out = format!(
            "{} code={:?} message={:?}",
            "gRPC Failed:".red().bold(),
            call.code,
            call.message
        );
        if !call.details.is_empty() {
            out.push_str(&format!("\n  details: {} bytes", call.details.len()));
        }
        for (key, value) in &call.metadata {
            out.push_str(&format!("\n  {}: {}", key.dimmed(), value));
        }
        FormattedString(out)
    }
}

fn error_title(err: &RpcError) -> &'static str {
    match err {
        RpcError::InvalidInputEncoding(_) | RpcError::TypeMismatch { .. } => "Invalid Request Body",
        RpcError::MessageTypeNotFound(_) => "Symbol Lookup Failed",
        RpcError::InvalidAddress(_) | RpcError::Unavailable(_) => "Connection Error",
        RpcError::MalformedWireData(_) => "Invalid Response",
        RpcError::StreamingNotSupported(_) => "Unsupported Method",
        RpcError::Timeout => "Timeout",
        RpcError::RpcFailed(_) | RpcError::Unknown(_) => "Call Failed",
    }
}

impl<T: Display> From<GenericError<T>> for FormattedString {
    fn from(GenericError(msg, err): GenericError<T>) -> Self {
        FormattedString(format!("{}:\n\n'{}'", msg.red().bold(), err))
    }
}

impl From<ServiceList> for FormattedString {
    fn from(ServiceList(services): ServiceList) -> Self {
        if services.is_empty() {
            return FormattedString("No services found.".yellow().to_string());
        }

        let mut out = String::new();
        out.push_str("Available Services:\n");
        for svc in services {
            out.push_str(&format!("  - {}\n", svc.green()));
        }
        FormattedString(out.trim_end().to_string())
    }
}

impl From<ServiceDescriptor> for FormattedString {
    fn from(service: ServiceDescriptor) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "service".cyan(),
            service.name().green()
        ));

        for method in service.methods() {
            let stream = |streaming: bool| {
                if streaming {
                    format!("{} ", "stream".cyan())
                } else {
                    "".to_string()
                }
            };

            out.push_str(&format!(
                "  {} {}({}{}) {} ({}{});\n",
                "rpc".cyan(),
                method.name().green(),
                stream(method.is_client_streaming()),
                type_label(method.input_type()).yellow(),
                "returns".cyan(),
                stream(method.is_server_streaming()),
                type_label(method.output_type()).yellow()
            ));
        }
        out.push('}');
        FormattedString(out)
    }
}

impl From<MessageView<'_>> for FormattedString {
    fn from(MessageView { message, index }: MessageView<'_>) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "message".cyan(),
            message.name().green()
        ));

        for field in message.fields() {
            out.push_str(&format!(
                "  {}{} {} = {};\n",
                field_label(field, index),
                field_type(field, index).yellow(),
                field.name(),
                field.number()
            ));
        }

        for nested in message.nested_enums() {
            let FormattedString(text) = FormattedString::from(&**nested);
            for line in text.lines() {
                out.push_str(&format!("  {line}\n"));
            }
        }
        out.push('}');
        FormattedString(out)
    }
}

impl From<&EnumDescriptor> for FormattedString {
    fn from(enum_desc: &EnumDescriptor) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "enum".cyan(),
            enum_desc.name().green()
        ));

        for val in enum_desc.values() {
            out.push_str(&format!(
                "  {} = {};\n",
                val.name,
                val.number.to_string().purple()
            ));
        }
        out.push('}');

        FormattedString(out)
    }
}

fn type_label(type_name: &str) -> &str {
    type_name.strip_prefix('.').unwrap_or(type_name)
}

fn map_entry(field: &FieldDescriptor, index: &DescriptorIndex) -> Option<(String, String)> {
    let entry = index
        .resolve(field.type_name()?)
        .ok()
        .filter(|entry| entry.is_map_entry())?;
    let key = entry.field_by_number(1)?;
    let value = entry.field_by_number(2)?;
    Some((field_type(key, index), field_type(value, index)))
}

fn field_label(field: &FieldDescriptor, index: &DescriptorIndex) -> String {
    if field.is_repeated() && map_entry(field, index).is_none() {
        format!("{} ", "repeated".cyan())
    } else {
        "".to_string()
    }
}

fn field_type(field: &FieldDescriptor, index: &DescriptorIndex) -> String {
    match field.field_type() {
        FieldType::Message if field.is_repeated() => match map_entry(field, index) {
            Some((key, value)) => format!("map<{key}, {value}>"),
            None => type_label(field.type_name().unwrap_or_default()).to_string(),
        },
        FieldType::Message | FieldType::Enum => {
            type_label(field.type_name().unwrap_or_default()).to_string()
        }
        scalar => scalar.name().to_string(),
    }
}
