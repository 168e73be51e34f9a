//! # Descriptor Model
//!
//! Plain data describing Protobuf files, messages, fields, enums, services and methods.
//! Nothing here depends on a particular parser: [`super::loader`] maps parser output into
//! these types, and tests can build them by hand.
//!
//! Messages and enums are mutable while they are being built and are shared behind [`Arc`]
//! once they are added to their parent, which freezes them.
use super::DescriptorError;
use prost::encoding::WireType;
use std::sync::Arc;

/// Highest field number allowed by the Protobuf language.
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;

/// The declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
    Message,
    Enum,
}

impl FieldType {
    /// The wire type a single (non-packed) value of this type is framed with.
    pub fn wire_type(self) -> WireType {
        match self {
            FieldType::Int32
            | FieldType::Int64
            | FieldType::Uint32
            | FieldType::Uint64
            | FieldType::Sint32
            | FieldType::Sint64
            | FieldType::Bool
            | FieldType::Enum => WireType::Varint,
            FieldType::Fixed64 | FieldType::Sfixed64 | FieldType::Double => WireType::SixtyFourBit,
            FieldType::Fixed32 | FieldType::Sfixed32 | FieldType::Float => WireType::ThirtyTwoBit,
            FieldType::String | FieldType::Bytes | FieldType::Message => {
                WireType::LengthDelimited
            }
        }
    }

    /// Scalar numeric types (bools and enums included) can use packed encoding when repeated.
    pub fn is_packable(self) -> bool {
        !matches!(
            self,
            FieldType::String | FieldType::Bytes | FieldType::Message
        )
    }

    /// 64-bit integers are carried as JSON strings.
    pub fn is_64_bit_integer(self) -> bool {
        matches!(
            self,
            FieldType::Int64
                | FieldType::Uint64
                | FieldType::Sint64
                | FieldType::Fixed64
                | FieldType::Sfixed64
        )
    }

    /// Whether a field of this type must carry the name of a message or enum.
    pub fn is_named(self) -> bool {
        matches!(self, FieldType::Message | FieldType::Enum)
    }

    /// The keyword used for this type in `.proto` source.
    pub fn name(self) -> &'static str {
        match self {
            FieldType::Double => "double",
            FieldType::Float => "float",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::Uint32 => "uint32",
            FieldType::Uint64 => "uint64",
            FieldType::Sint32 => "sint32",
            FieldType::Sint64 => "sint64",
            FieldType::Fixed32 => "fixed32",
            FieldType::Fixed64 => "fixed64",
            FieldType::Sfixed32 => "sfixed32",
            FieldType::Sfixed64 => "sfixed64",
            FieldType::Bool => "bool",
            FieldType::String => "string",
            FieldType::Bytes => "bytes",
            FieldType::Message => "message",
            FieldType::Enum => "enum",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    name: String,
    json_name: String,
    number: u32,
    field_type: FieldType,
    repeated: bool,
    type_name: Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, number: u32, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            json_name: to_json_name(&name),
            name,
            number,
            field_type,
            repeated: false,
            type_name: None,
        }
    }

    /// Marks the field as `repeated`.
    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    /// Sets the referenced message or enum name, as written in the source (it may be relative
    /// or carry a leading dot).
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Overrides the derived lowerCamelCase JSON name.
    pub fn with_json_name(mut self, json_name: impl Into<String>) -> Self {
        self.json_name = json_name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn json_name(&self) -> &str {
        &self.json_name
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn is_repeated(&self) -> bool {
        self.repeated
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageDescriptor {
    name: String,
    full_name: String,
    package: String,
    fields: Vec<FieldDescriptor>,
    nested_messages: Vec<Arc<MessageDescriptor>>,
    nested_enums: Vec<Arc<EnumDescriptor>>,
    map_entry: bool,
}

impl MessageDescriptor {
    /// A top-level message of `package`.
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        let package = package.into();
        let name = name.into();
        Self {
            full_name: qualify(&package, &name),
            name,
            package,
            fields: Vec::new(),
            nested_messages: Vec::new(),
            nested_enums: Vec::new(),
            map_entry: false,
        }
    }

    /// A message declared inside `parent`.
    pub fn new_nested(parent: &MessageDescriptor, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            full_name: qualify(&parent.full_name, &name),
            name,
            package: parent.package.clone(),
            fields: Vec::new(),
            nested_messages: Vec::new(),
            nested_enums: Vec::new(),
            map_entry: false,
        }
    }

    /// Appends a field, keeping declaration order.
    pub fn add_field(&mut self, field: FieldDescriptor) -> Result<&mut Self, DescriptorError> {
        if field.number == 0 || field.number > MAX_FIELD_NUMBER {
            return Err(DescriptorError::InvalidFieldNumber {
                message: self.full_name.clone(),
                number: field.number,
            });
        }
        if self.field_by_number(field.number).is_some() {
            return Err(DescriptorError::DuplicateFieldNumber {
                message: self.full_name.clone(),
                number: field.number,
            });
        }
        if self.fields.iter().any(|f| f.name == field.name) {
            return Err(DescriptorError::DuplicateFieldName {
                message: self.full_name.clone(),
                field: field.name,
            });
        }
        if field.field_type.is_named() && field.type_name.is_none() {
            return Err(DescriptorError::MissingTypeName {
                message: self.full_name.clone(),
                field: field.name,
            });
        }

        self.fields.push(field);
        Ok(self)
    }

    pub fn add_nested_message(&mut self, message: MessageDescriptor) -> &mut Self {
        self.nested_messages.push(Arc::new(message));
        self
    }

    pub fn add_nested_enum(&mut self, enum_desc: EnumDescriptor) -> &mut Self {
        self.nested_enums.push(Arc::new(enum_desc));
        self
    }

    /// Flags this message as the synthetic entry type of a `map<K, V>` field.
    pub fn set_map_entry(&mut self, map_entry: bool) -> &mut Self {
        self.map_entry = map_entry;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// The package of the file declaring this message.
    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Looks a field up by its declared name or by its JSON name.
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.fields.iter().find(|f| f.json_name == name))
    }

    pub fn field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.number == number)
    }

    pub fn nested_messages(&self) -> &[Arc<MessageDescriptor>] {
        &self.nested_messages
    }

    pub fn nested_message(&self, name: &str) -> Option<&Arc<MessageDescriptor>> {
        self.nested_messages.iter().find(|m| m.name == name)
    }

    pub fn nested_enums(&self) -> &[Arc<EnumDescriptor>] {
        &self.nested_enums
    }

    pub fn is_map_entry(&self) -> bool {
        self.map_entry
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub name: String,
    pub number: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    name: String,
    full_name: String,
    values: Vec<EnumValue>,
}

impl EnumDescriptor {
    /// `scope` is the package for top-level enums and the parent's full name for nested ones.
    pub fn new(scope: &str, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            full_name: qualify(scope, &name),
            name,
            values: Vec::new(),
        }
    }

    pub fn add_value(&mut self, name: impl Into<String>, number: i32) -> &mut Self {
        self.values.push(EnumValue {
            name: name.into(),
            number,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn values(&self) -> &[EnumValue] {
        &self.values
    }

    pub fn value_by_name(&self, name: &str) -> Option<&EnumValue> {
        self.values.iter().find(|v| v.name == name)
    }

    /// First declared value with this number (aliases share numbers).
    pub fn value_by_number(&self, number: i32) -> Option<&EnumValue> {
        self.values.iter().find(|v| v.number == number)
    }

    /// The first declared value, which proto3 requires to be the zero value.
    pub fn default_value(&self) -> Option<&EnumValue> {
        self.values.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    name: String,
    service_full_name: String,
    input_type: String,
    output_type: String,
    client_streaming: bool,
    server_streaming: bool,
}

impl MethodDescriptor {
    pub fn new(
        service_full_name: impl Into<String>,
        name: impl Into<String>,
        input_type: impl Into<String>,
        output_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            service_full_name: service_full_name.into(),
            input_type: input_type.into(),
            output_type: output_type.into(),
            client_streaming: false,
            server_streaming: false,
        }
    }

    pub fn with_streaming(mut self, client_streaming: bool, server_streaming: bool) -> Self {
        self.set_streaming(client_streaming, server_streaming);
        self
    }

    pub fn set_streaming(&mut self, client_streaming: bool, server_streaming: bool) -> &mut Self {
        self.client_streaming = client_streaming;
        self.server_streaming = server_streaming;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service_full_name(&self) -> &str {
        &self.service_full_name
    }

    /// The request type as written in the source, possibly with a leading dot.
    pub fn input_type(&self) -> &str {
        &self.input_type
    }

    /// The response type as written in the source, possibly with a leading dot.
    pub fn output_type(&self) -> &str {
        &self.output_type
    }

    pub fn is_client_streaming(&self) -> bool {
        self.client_streaming
    }

    pub fn is_server_streaming(&self) -> bool {
        self.server_streaming
    }

    /// True for every method that is not unary.
    pub fn is_streaming(&self) -> bool {
        self.client_streaming || self.server_streaming
    }

    /// The HTTP/2 path of the method (e.g. `/my.package.Service/Method`).
    pub fn path(&self) -> String {
        format!("/{}/{}", self.service_full_name, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    name: String,
    full_name: String,
    methods: Vec<MethodDescriptor>,
}

impl ServiceDescriptor {
    pub fn new(package: &str, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            full_name: qualify(package, &name),
            name,
            methods: Vec::new(),
        }
    }

    /// Declares a method on this service and returns it for further configuration.
    pub fn add_method(
        &mut self,
        name: impl Into<String>,
        input_type: impl Into<String>,
        output_type: impl Into<String>,
    ) -> &mut MethodDescriptor {
        let method = MethodDescriptor::new(self.full_name.clone(), name, input_type, output_type);
        self.methods.push(method);
        let last = self.methods.len() - 1;
        &mut self.methods[last]
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileDescriptor {
    name: String,
    package: String,
    dependencies: Vec<String>,
    messages: Vec<Arc<MessageDescriptor>>,
    enums: Vec<Arc<EnumDescriptor>>,
    services: Vec<ServiceDescriptor>,
}

impl FileDescriptor {
    pub fn new(name: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            dependencies: Vec::new(),
            messages: Vec::new(),
            enums: Vec::new(),
            services: Vec::new(),
        }
    }

    pub fn add_dependency(&mut self, path: impl Into<String>) -> &mut Self {
        self.dependencies.push(path.into());
        self
    }

    pub fn add_message(&mut self, message: MessageDescriptor) -> &mut Self {
        self.messages.push(Arc::new(message));
        self
    }

    pub fn add_enum(&mut self, enum_desc: EnumDescriptor) -> &mut Self {
        self.enums.push(Arc::new(enum_desc));
        self
    }

    pub fn add_service(&mut self, service: ServiceDescriptor) -> &mut Self {
        self.services.push(service);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn messages(&self) -> &[Arc<MessageDescriptor>] {
        &self.messages
    }

    pub fn enums(&self) -> &[Arc<EnumDescriptor>] {
        &self.enums
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }
}

/// Something the index can find by name inside a file or message scope.
pub(crate) trait Declaration {
    fn name(&self) -> &str;
}

impl Declaration for MessageDescriptor {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Declaration for EnumDescriptor {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Joins a scope and a name with a dot, or returns the bare name for the empty scope.
pub(crate) fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}

/// lowerCamelCase conversion used by protoc for `json_name`.
fn to_json_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}
