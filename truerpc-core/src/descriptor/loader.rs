//! # Descriptor Loading
//!
//! Parsing `.proto` syntax is not this crate's job. Schemas come in as
//! `google.protobuf.FileDescriptorProto` values, produced either by `protoc`/`buf` (an
//! encoded `FileDescriptorSet`) or by `protox`, a pure-Rust compiler invoked here on files or
//! in-memory sources. This module maps those values into the [`super::model`] types and
//! registers them with a [`DescriptorIndex`].
//!
//! Every loader maps all files before registering any of them, so a failure leaves the
//! index untouched.
use super::{
    DescriptorError,
    index::DescriptorIndex,
    model::{
        EnumDescriptor, FieldDescriptor, FieldType, FileDescriptor, MessageDescriptor,
        ServiceDescriptor,
    },
};
use prost_reflect::DescriptorPool;
use prost_types::{
    DescriptorProto, EnumDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    ServiceDescriptorProto,
    field_descriptor_proto::{Label, Type},
};
use protox::file::{File, FileResolver, GoogleFileResolver};
use std::{collections::HashMap, path::Path, sync::Arc};

impl DescriptorIndex {
    /// Registers every file of an encoded `FileDescriptorSet` (e.g. the output of
    /// `protoc --include_imports --descriptor_set_out`).
    ///
    /// The set is validated by building a `prost_reflect::DescriptorPool` from it first, so
    /// sets with dangling type references are rejected.
    pub fn register_file_descriptor_set(
        &self,
        bytes: &[u8],
    ) -> Result<Vec<Arc<FileDescriptor>>, DescriptorError> {
        let pool = DescriptorPool::decode(bytes)?;
        let files = pool
            .file_descriptor_protos()
            .map(map_file)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.register_all(files))
    }

    /// Reads and registers an encoded `FileDescriptorSet` from disk.
    pub fn register_file_descriptor_set_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Vec<Arc<FileDescriptor>>, DescriptorError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| DescriptorError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.register_file_descriptor_set(&bytes)
    }

    /// Registers an already decoded `FileDescriptorSet`, validating it like
    /// [`DescriptorIndex::register_file_descriptor_set`] does.
    pub fn register_descriptor_set(
        &self,
        set: FileDescriptorSet,
    ) -> Result<Vec<Arc<FileDescriptor>>, DescriptorError> {
        DescriptorPool::from_file_descriptor_set(set.clone())?;
        let files = set
            .file
            .iter()
            .map(map_file)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.register_all(files))
    }

    /// Compiles `.proto` files from disk with `protox` and registers them together with
    /// their transitive imports.
    ///
    /// # Arguments
    ///
    /// * `files` - The files to compile, relative to one of the include paths.
    /// * `includes` - Directories searched for the files and their imports.
    pub fn register_proto_files(
        &self,
        files: &[impl AsRef<Path>],
        includes: &[impl AsRef<Path>],
    ) -> Result<Vec<Arc<FileDescriptor>>, DescriptorError> {
        let set = protox::compile(files, includes)?;
        self.register_compiled(set)
    }

    /// Compiles in-memory `.proto` sources, given as `(file name, source)` pairs.
    ///
    /// Imports are resolved among the given sources first, then among the well-known types
    /// bundled with `protox` (`google/protobuf/*.proto`).
    pub fn register_proto_sources(
        &self,
        sources: &[(&str, &str)],
    ) -> Result<Vec<Arc<FileDescriptor>>, DescriptorError> {
        let resolver = SourceResolver {
            sources: sources
                .iter()
                .map(|(name, source)| (name.to_string(), source.to_string()))
                .collect(),
            well_known: GoogleFileResolver::new(),
        };

        let mut compiler = protox::Compiler::with_file_resolver(resolver);
        compiler.include_imports(true);
        for (name, _) in sources {
            compiler.open_file(name)?;
        }

        self.register_compiled(compiler.file_descriptor_set())
    }

    fn register_compiled(
        &self,
        set: FileDescriptorSet,
    ) -> Result<Vec<Arc<FileDescriptor>>, DescriptorError> {
        let files = set
            .file
            .iter()
            .map(map_file)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.register_all(files))
    }

    fn register_all(&self, files: Vec<FileDescriptor>) -> Vec<Arc<FileDescriptor>> {
        files.into_iter().map(|file| self.register(file)).collect()
    }
}

/// Serves in-memory sources to `protox`, falling back to the bundled well-known types.
struct SourceResolver {
    sources: HashMap<String, String>,
    well_known: GoogleFileResolver,
}

impl FileResolver for SourceResolver {
    fn resolve_path(&self, path: &Path) -> Option<String> {
        let name = path.to_str()?;
        self.sources.contains_key(name).then(|| name.to_string())
    }

    fn open_file(&self, name: &str) -> Result<File, protox::Error> {
        match self.sources.get(name) {
            Some(source) => File::from_source(name, source),
            None => self.well_known.open_file(name),
        }
    }
}

/// Maps one parser-produced file into the descriptor model.
pub fn map_file(proto: &FileDescriptorProto) -> Result<FileDescriptor, DescriptorError> {
    let package = proto.package();
    let mut file = FileDescriptor::new(proto.name(), package);

    for dependency in &proto.dependency {
        file.add_dependency(dependency.clone());
    }
    for message in &proto.message_type {
        let mut desc = MessageDescriptor::new(package, message.name());
        fill_message(&mut desc, message)?;
        file.add_message(desc);
    }
    for enum_proto in &proto.enum_type {
        file.add_enum(map_enum(package, enum_proto));
    }
    for service in &proto.service {
        file.add_service(map_service(package, service));
    }

    Ok(file)
}

fn fill_message(
    desc: &mut MessageDescriptor,
    proto: &DescriptorProto,
) -> Result<(), DescriptorError> {
    let is_map_entry = proto.options.as_ref().is_some_and(|o| o.map_entry());
    desc.set_map_entry(is_map_entry);

    for field in &proto.field {
        let field_type = map_field_type(field.r#type()).ok_or_else(|| {
            DescriptorError::UnsupportedFieldType {
                message: desc.full_name().to_string(),
                field: field.name().to_string(),
            }
        })?;

        let number = u32::try_from(field.number()).unwrap_or(0);
        let mut mapped = FieldDescriptor::new(field.name(), number, field_type);
        if field.label() == Label::Repeated {
            mapped = mapped.repeated();
        }
        if field.type_name.is_some() {
            mapped = mapped.with_type_name(field.type_name());
        }
        if field.json_name.is_some() {
            mapped = mapped.with_json_name(field.json_name());
        }
        desc.add_field(mapped)?;
    }

    for nested in &proto.nested_type {
        let mut nested_desc = MessageDescriptor::new_nested(desc, nested.name());
        fill_message(&mut nested_desc, nested)?;
        desc.add_nested_message(nested_desc);
    }

    let scope = desc.full_name().to_string();
    for enum_proto in &proto.enum_type {
        desc.add_nested_enum(map_enum(&scope, enum_proto));
    }

    Ok(())
}

fn map_enum(scope: &str, proto: &EnumDescriptorProto) -> EnumDescriptor {
    let mut desc = EnumDescriptor::new(scope, proto.name());
    for value in &proto.value {
        desc.add_value(value.name(), value.number());
    }
    desc
}

fn map_service(package: &str, proto: &ServiceDescriptorProto) -> ServiceDescriptor {
    let mut service = ServiceDescriptor::new(package, proto.name());
    for method in &proto.method {
        service
            .add_method(method.name(), method.input_type(), method.output_type())
            .set_streaming(method.client_streaming(), method.server_streaming());
    }
    service
}

fn map_field_type(ty: Type) -> Option<FieldType> {
    let mapped = match ty {
        Type::Double => FieldType::Double,
        Type::Float => FieldType::Float,
        Type::Int64 => FieldType::Int64,
        Type::Uint64 => FieldType::Uint64,
        Type::Int32 => FieldType::Int32,
        Type::Fixed64 => FieldType::Fixed64,
        Type::Fixed32 => FieldType::Fixed32,
        Type::Bool => FieldType::Bool,
        Type::String => FieldType::String,
        Type::Message => FieldType::Message,
        Type::Bytes => FieldType::Bytes,
        Type::Uint32 => FieldType::Uint32,
        Type::Enum => FieldType::Enum,
        Type::Sfixed32 => FieldType::Sfixed32,
        Type::Sfixed64 => FieldType::Sfixed64,
        Type::Sint32 => FieldType::Sint32,
        Type::Sint64 => FieldType::Sint64,
        Type::Group => return None,
    };
    Some(mapped)
}
