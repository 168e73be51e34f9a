//! # Generic gRPC Client
//!
//! This module wraps a standard `tonic` client to provide a schema-agnostic interface for
//! unary gRPC calls.
//!
//! ## How it works
//!
//! The [`GrpcClient`] utilizes the [`super::codec::WireCodec`] to handle serialization. It
//! does not need to know the structure of the data it is sending; it simply ensures the
//! connection is ready and passes the [`DynamicMessage`] to the codec.
//!
//! ## Metadata
//!
//! [`build_request`] turns caller-supplied `(key, value)` pairs into tonic metadata. Keys
//! ending in [`BINARY_METADATA_SUFFIX`] are binary entries carrying the bytes of the value;
//! every other key is an ASCII entry. [`metadata_to_pairs`] goes the other way for response
//! headers and trailers, base64-encoding binary values.
use super::codec::WireCodec;
use crate::{BoxError, codec::DynamicMessage};
use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use http_body::Body as HttpBody;
use std::{str::FromStr, time::Duration};
use tonic::{
    client::GrpcService,
    metadata::{
        Ascii, Binary, KeyAndValueRef, MetadataKey, MetadataMap, MetadataValue,
        errors::{InvalidMetadataKey, InvalidMetadataValue},
    },
    transport::Channel,
};

/// Metadata keys with this suffix carry raw bytes instead of ASCII text.
pub const BINARY_METADATA_SUFFIX: &str = "-bin";

#[derive(thiserror::Error, Debug)]
pub enum GrpcRequestError {
    #[error("Internal error, the client was not ready: '{0}'")]
    ClientNotReady(#[source] BoxError),
    #[error("Invalid method path '{0}'")]
    InvalidPath(String),
    #[error("Invalid metadata (header) key '{key}': '{source}'")]
    InvalidMetadataKey {
        key: String,
        source: InvalidMetadataKey,
    },
    #[error("Invalid metadata (header) value for key '{key}': '{source}'")]
    InvalidMetadataValue {
        key: String,
        source: InvalidMetadataValue,
    },
}

/// A generic client for unary calls with dynamic messages.
#[derive(Debug, Clone)]
pub struct GrpcClient<S = Channel> {
    client: tonic::client::Grpc<S>,
}

impl<S> GrpcClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        let client = tonic::client::Grpc::new(service);
        Self { client }
    }

    /// Performs a Unary gRPC call (Single Request -> Single Response).
    ///
    /// # Arguments
    ///
    /// * `path` - The HTTP/2 path of the method (e.g. `/my.package.Service/Method`).
    /// * `request` - A request built with [`build_request`].
    ///
    /// # Returns
    ///
    /// * `Ok(Ok(Response))` - Successful RPC execution, with the raw response payload.
    /// * `Ok(Err(Status))` - RPC executed, but the server returned an error.
    /// * `Err(GrpcRequestError)` - Failed to send the request.
    pub async fn unary(
        &mut self,
        path: &str,
        request: tonic::Request<DynamicMessage>,
    ) -> Result<Result<tonic::Response<Bytes>, tonic::Status>, GrpcRequestError> {
        let path = http_path(path)?;

        self.client
            .ready()
            .await
            .map_err(|e| GrpcRequestError::ClientNotReady(e.into()))?;

        Ok(self.client.unary(request, path, WireCodec).await)
    }
}

/// Wraps a message with its metadata and optional deadline.
///
/// The deadline travels as the `grpc-timeout` header.
pub fn build_request<T>(
    payload: T,
    metadata: &[(String, String)],
    timeout: Option<Duration>,
) -> Result<tonic::Request<T>, GrpcRequestError> {
    let mut request = tonic::Request::new(payload);

    for (key, value) in metadata {
        let invalid_key = |source| GrpcRequestError::InvalidMetadataKey {
            key: key.clone(),
            source,
        };

        if key.ends_with(BINARY_METADATA_SUFFIX) {
            let meta_key =
                MetadataKey::<Binary>::from_bytes(key.as_bytes()).map_err(invalid_key)?;
            request
                .metadata_mut()
                .append_bin(meta_key, MetadataValue::from_bytes(value.as_bytes()));
        } else {
            let meta_key = MetadataKey::<Ascii>::from_str(key).map_err(invalid_key)?;
            let meta_value = MetadataValue::<Ascii>::from_str(value).map_err(|source| {
                GrpcRequestError::InvalidMetadataValue {
                    key: key.clone(),
                    source,
                }
            })?;
            request.metadata_mut().append(meta_key, meta_value);
        }
    }

    if let Some(timeout) = timeout {
        request.set_timeout(timeout);
    }

    Ok(request)
}

/// Flattens metadata into `(key, value)` pairs, in map order.
///
/// Binary values are reported as padded standard base64.
pub fn metadata_to_pairs(metadata: &MetadataMap) -> Vec<(String, String)> {
    metadata
        .iter()
        .map(|entry| match entry {
            KeyAndValueRef::Ascii(key, value) => {
                let text = value
                    .to_str()
                    .map(str::to_string)
                    .unwrap_or_else(|_| String::from_utf8_lossy(value.as_encoded_bytes()).into());
                (key.as_str().to_string(), text)
            }
            KeyAndValueRef::Binary(key, value) => {
                let text = value
                    .to_bytes()
                    .map(|bytes| STANDARD.encode(bytes))
                    .unwrap_or_else(|_| String::from_utf8_lossy(value.as_encoded_bytes()).into());
                (key.as_str().to_string(), text)
            }
        })
        .collect()
}

fn http_path(path: &str) -> Result<http::uri::PathAndQuery, GrpcRequestError> {
    http::uri::PathAndQuery::from_str(path)
        .map_err(|_| GrpcRequestError::InvalidPath(path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_ascii_and_binary_metadata() {
        let request = build_request(
            (),
            &pairs(&[("x-api-key", "secret"), ("trace-bin", "raw\u{e9}")]),
            None,
        )
        .unwrap();

        let metadata = request.metadata();
        assert_eq!(metadata.get("x-api-key").unwrap(), "secret");
        assert_eq!(
            metadata.get_bin("trace-bin").unwrap().to_bytes().unwrap(),
            "raw\u{e9}".as_bytes()
        );
        assert!(metadata.get("trace-bin").is_none());
    }

    #[test]
    fn test_repeated_keys_are_kept() {
        let request =
            build_request((), &pairs(&[("x-tag", "a"), ("x-tag", "b")]), None).unwrap();

        let values: Vec<_> = request
            .metadata()
            .get_all("x-tag")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(values, ["a", "b"]);
    }

    #[test]
    fn test_invalid_metadata_is_rejected() {
        assert!(matches!(
            build_request((), &pairs(&[("bad key", "v")]), None),
            Err(GrpcRequestError::InvalidMetadataKey { key, .. }) if key == "bad key"
        ));
        assert!(matches!(
            build_request((), &pairs(&[("x-line", "a\nb")]), None),
            Err(GrpcRequestError::InvalidMetadataValue { .. })
        ));
    }

    #[test]
    fn test_timeout_becomes_grpc_timeout_header() {
        let request = build_request((), &[], Some(Duration::from_millis(1500))).unwrap();
        assert!(request.metadata().get("grpc-timeout").is_some());
    }

    #[test]
    fn test_metadata_to_pairs_encodes_binary_values() {
        let mut metadata = MetadataMap::new();
        metadata.insert("x-request-id", "abc".parse().unwrap());
        metadata.insert_bin("blob-bin", MetadataValue::from_bytes(&[0xfb, 0xff]));

        let pairs = metadata_to_pairs(&metadata);
        assert!(pairs.contains(&("x-request-id".to_string(), "abc".to_string())));
        assert!(pairs.contains(&("blob-bin".to_string(), "+/8=".to_string())));
    }
}
