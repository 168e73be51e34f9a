//! # Descriptor Index
//!
//! The index owns every [`FileDescriptor`] loaded so far and answers "which message does
//! this type name refer to?".
//!
//! ## Resolution
//!
//! A leading `.` is stripped, then each file is searched in registration order:
//!
//! 1. Top-level declarations, comparing `package.Name` (or just `Name` for files without a
//!    package) against the requested name. The bare declaration name also matches, which
//!    covers unqualified references from the same package.
//! 2. Nested declarations, depth-first, extending the prefix one level at a time
//!    (`package.Outer.Inner`), with the same full-or-bare comparison.
//! 3. If the name has a dot, the same two steps are retried with its first segment dropped
//!    (`example.google.protobuf.Empty` becomes `google.protobuf.Empty`). Some toolchains
//!    prefix cross-package references with an extra namespace segment; this undoes exactly
//!    one such segment.
//!
//! The first file producing a match wins. There is no ambiguity detection: two files
//! declaring the same name resolve to whichever was registered first. Use
//! [`DescriptorIndex::resolve_traced`] and [`DescriptorIndex::resolution_order`] to observe
//! which file answered.
//!
//! ## Concurrency
//!
//! Files are only ever appended. Writers are serialized by a lock and readers work on a
//! snapshot of the file list taken under a short read lock, so a registration never
//! blocks an in-flight resolution for longer than that copy.
use super::model::{
    Declaration, EnumDescriptor, FileDescriptor, MessageDescriptor, MethodDescriptor,
    ServiceDescriptor, qualify,
};
use crate::error::RpcError;
use parking_lot::RwLock;
use std::sync::Arc;

/// The outcome of a traced resolution.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub descriptor: Arc<T>,
    /// Name of the file the declaration was found in.
    pub file: String,
    /// Whether the match was only found after dropping the first name segment.
    pub via_fallback: bool,
}

/// Where declarations of one kind live inside files and messages.
struct Scope<T> {
    top_level: fn(&FileDescriptor) -> &[Arc<T>],
    nested: fn(&MessageDescriptor) -> &[Arc<T>],
}

const MESSAGES: Scope<MessageDescriptor> = Scope {
    top_level: FileDescriptor::messages,
    nested: MessageDescriptor::nested_messages,
};

const ENUMS: Scope<EnumDescriptor> = Scope {
    top_level: FileDescriptor::enums,
    nested: MessageDescriptor::nested_enums,
};

#[derive(Debug, Default)]
pub struct DescriptorIndex {
    files: RwLock<Vec<Arc<FileDescriptor>>>,
}

impl DescriptorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a file. Files are never replaced or evicted, even if they redeclare names.
    pub fn register(&self, file: FileDescriptor) -> Arc<FileDescriptor> {
        let file = Arc::new(file);

        tracing::debug!(
            file = file.name(),
            package = file.package(),
            messages = file.messages().len(),
            enums = file.enums().len(),
            services = file.services().len(),
            "registered file descriptor"
        );

        self.files.write().push(file.clone());
        file
    }

    /// A consistent copy of the registered files, in search order.
    pub fn files(&self) -> Vec<Arc<FileDescriptor>> {
        self.files.read().clone()
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    /// File names in the order [`DescriptorIndex::resolve`] searches them.
    pub fn resolution_order(&self) -> Vec<String> {
        self.files
            .read()
            .iter()
            .map(|f| f.name().to_string())
            .collect()
    }

    /// Resolves a (possibly partially qualified, possibly dot-prefixed) message name.
    pub fn resolve(&self, type_name: &str) -> Result<Arc<MessageDescriptor>, RpcError> {
        self.resolve_traced(type_name).map(|r| r.descriptor)
    }

    /// Like [`DescriptorIndex::resolve`], but also reports where the match came from.
    pub fn resolve_traced(
        &self,
        type_name: &str,
    ) -> Result<Resolved<MessageDescriptor>, RpcError> {
        self.resolve_in(type_name, &MESSAGES)
    }

    /// Resolves an enum name with the same rules used for messages.
    pub fn resolve_enum(&self, type_name: &str) -> Result<Arc<EnumDescriptor>, RpcError> {
        self.resolve_in(type_name, &ENUMS).map(|r| r.descriptor)
    }

    /// Lists the fully qualified name of every registered service.
    pub fn services(&self) -> Vec<String> {
        self.files
            .read()
            .iter()
            .flat_map(|f| f.services().iter().map(|s| s.full_name().to_string()))
            .collect()
    }

    /// Finds a service by its fully qualified name (a leading dot is accepted).
    pub fn find_service(&self, full_name: &str) -> Option<ServiceDescriptor> {
        let full_name = full_name.strip_prefix('.').unwrap_or(full_name);
        self.files
            .read()
            .iter()
            .flat_map(|f| f.services().iter())
            .find(|s| s.full_name() == full_name)
            .cloned()
    }

    /// Finds a method of a service.
    pub fn find_method(&self, service: &str, method: &str) -> Result<MethodDescriptor, RpcError> {
        let service_desc = self
            .find_service(service)
            .ok_or_else(|| RpcError::MessageTypeNotFound(service.to_string()))?;

        service_desc
            .method(method)
            .cloned()
            .ok_or_else(|| RpcError::MessageTypeNotFound(format!("{service}/{method}")))
    }

    fn resolve_in<T: Declaration>(
        &self,
        type_name: &str,
        scope: &Scope<T>,
    ) -> Result<Resolved<T>, RpcError> {
        let normalized = type_name.strip_prefix('.').unwrap_or(type_name);
        let fallback = normalized.split_once('.').map(|(_, rest)| rest);

        for file in self.files().iter() {
            if let Some(descriptor) = search_file(file, normalized, scope) {
                return Ok(Resolved {
                    descriptor,
                    file: file.name().to_string(),
                    via_fallback: false,
                });
            }

            if let Some(fallback) = fallback
                && let Some(descriptor) = search_file(file, fallback, scope)
            {
                tracing::debug!(
                    requested = type_name,
                    matched = fallback,
                    file = file.name(),
                    "resolved type name by dropping its first segment"
                );
                return Ok(Resolved {
                    descriptor,
                    file: file.name().to_string(),
                    via_fallback: true,
                });
            }
        }

        Err(RpcError::MessageTypeNotFound(type_name.to_string()))
    }
}

fn search_file<T: Declaration>(
    file: &FileDescriptor,
    name: &str,
    scope: &Scope<T>,
) -> Option<Arc<T>> {
    let package = file.package();

    for item in (scope.top_level)(file) {
        if is_match(&qualify(package, item.name()), item.name(), name) {
            return Some(item.clone());
        }
    }

    for message in file.messages() {
        let prefix = qualify(package, message.name());
        if let Some(found) = search_nested(message, &prefix, name, scope) {
            return Some(found);
        }
    }

    None
}

fn search_nested<T: Declaration>(
    parent: &MessageDescriptor,
    parent_full_name: &str,
    name: &str,
    scope: &Scope<T>,
) -> Option<Arc<T>> {
    for item in (scope.nested)(parent) {
        if is_match(&qualify(parent_full_name, item.name()), item.name(), name) {
            return Some(item.clone());
        }
    }

    for child in parent.nested_messages() {
        let child_full_name = qualify(parent_full_name, child.name());
        if let Some(found) = search_nested(child, &child_full_name, name, scope) {
            return Some(found);
        }
    }

    None
}

fn is_match(full_name: &str, bare_name: &str, requested: &str) -> bool {
    full_name == requested || bare_name == requested
}
