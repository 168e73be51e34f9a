//! # TrueRPC Client
//!
//! This module implements the high-level logic for executing dynamic unary gRPC calls.
//!
//! A call runs through a fixed sequence and stops at the first failure:
//!
//! 1. **Resolve types**: the method's input and output types are looked up in the
//!    [`DescriptorIndex`]. Streaming methods are rejected here.
//! 2. **Encode request**: the JSON body becomes a [`crate::DynamicMessage`]; the metadata
//!    and deadline are attached.
//! 3. **Resolve address**: the target string becomes an [`RpcAddress`] with its TLS decision.
//! 4. **Invoke**: the [`Connector`] opens a transport and the call is sent.
//! 5. **Decode response**: the response bytes are decoded and rendered as JSON.
//!
//! Steps 1 to 3 never touch the network. Transport failures are classified once, by
//! [`crate::error::classify`], before they reach the caller. Nothing is retried.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::{sync::Arc, time::Duration};
//! use truerpc_core::{DescriptorIndex, TrueRpcClient, client::UnaryRequest};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let index = Arc::new(DescriptorIndex::new());
//! index.register_file_descriptor_set(&std::fs::read("descriptor.bin")?)?;
//!
//! let client = TrueRpcClient::new(index.clone());
//! let method = index.find_method("helloworld.Greeter", "SayHello")?;
//!
//! let request = UnaryRequest::new(r#"{"name": "Ferris"}"#, "localhost:50051")
//!     .with_metadata("authorization", "Bearer token")
//!     .with_timeout(Duration::from_secs(5));
//!
//! let response = client.execute_unary(request, &method).await?;
//! println!("{}", response.body);
//! # Ok(())
//! # }
//! ```
mod types;

pub use types::*;

use crate::{
    BoxError,
    address::RpcAddress,
    codec::{self, DynamicMessage},
    descriptor::{DescriptorIndex, MessageDescriptor, MethodDescriptor},
    error::{RpcError, classify},
    grpc::{
        client::{GrpcClient, GrpcRequestError, build_request, metadata_to_pairs},
        connector::{ChannelConnector, Connector},
    },
};
use bytes::Bytes;
use http_body::Body as HttpBody;
use std::{sync::Arc, time::Instant};
use tonic::client::GrpcService;

/// Executes unary calls against any server whose schema is loaded in a [`DescriptorIndex`].
///
/// The index is shared: the client only reads from it, so the same index can keep
/// receiving files while calls are in flight.
#[derive(Debug, Clone)]
pub struct TrueRpcClient<C = ChannelConnector> {
    index: Arc<DescriptorIndex>,
    connector: C,
}

impl TrueRpcClient<ChannelConnector> {
    /// A client that dials real servers with the default [`ChannelConnector`].
    pub fn new(index: Arc<DescriptorIndex>) -> Self {
        Self::with_connector(index, ChannelConnector::default())
    }
}

impl<C> TrueRpcClient<C> {
    pub fn with_connector(index: Arc<DescriptorIndex>, connector: C) -> Self {
        Self { index, connector }
    }

    pub fn index(&self) -> &Arc<DescriptorIndex> {
        &self.index
    }

    /// Resolves a message type name against the index.
    pub fn resolve_descriptor(&self, type_name: &str) -> Result<Arc<MessageDescriptor>, RpcError> {
        self.index.resolve(type_name)
    }
}

impl<C> TrueRpcClient<C>
where
    C: Connector,
    <C::Service as GrpcService<tonic::body::Body>>::Error: Into<BoxError>,
    <C::Service as GrpcService<tonic::body::Body>>::ResponseBody:
        HttpBody<Data = Bytes> + Send + 'static,
    <<C::Service as GrpcService<tonic::body::Body>>::ResponseBody as HttpBody>::Error:
        Into<BoxError> + Send,
{
    /// Looks `service`/`method` up in the index, then runs [`TrueRpcClient::execute_unary`].
    pub async fn execute(
        &self,
        service: &str,
        method: &str,
        request: UnaryRequest,
    ) -> Result<UnaryResponse, RpcError> {
        let method = self.index.find_method(service, method)?;
        self.execute_unary(request, &method).await
    }

    /// Performs one unary call.
    ///
    /// # Returns
    ///
    /// * `Ok(UnaryResponse)` - The server answered with status OK.
    /// * `Err(RpcError)` - The first failure, already classified.
    pub async fn execute_unary(
        &self,
        request: UnaryRequest,
        method: &MethodDescriptor,
    ) -> Result<UnaryResponse, RpcError> {
        let path = method.path();
        let result = self.call(request, method).await;

        match &result {
            Ok(response) => tracing::info!(
                method = %path,
                elapsed_ms = response.elapsed.as_millis() as u64,
                "unary call completed"
            ),
            Err(err) => tracing::warn!(
                method = %path,
                code = err.code(),
                error = %err,
                "unary call failed"
            ),
        }

        result
    }

    async fn call(
        &self,
        request: UnaryRequest,
        method: &MethodDescriptor,
    ) -> Result<UnaryResponse, RpcError> {
        if method.is_streaming() {
            return Err(RpcError::StreamingNotSupported(format!(
                "{}/{}",
                method.service_full_name(),
                method.name()
            )));
        }
        let input = self.index.resolve(method.input_type())?;
        let output = self.index.resolve(method.output_type())?;

        let body = codec::normalize_quotes(&request.body);
        let message = codec::from_json(&body, &input, &self.index)?;
        let grpc_request = build_request(message, &request.metadata, request.timeout)
            .map_err(request_error)?;

        let address = RpcAddress::resolve(&request.address)?;

        let path = method.path();
        // Timing covers connection setup, which is part of sending the request.
        let start = Instant::now();
        let invocation = self.invoke(&address, &path, grpc_request);
        let response = match request.timeout {
            Some(timeout) => tokio::time::timeout(timeout, invocation)
                .await
                .map_err(|_| RpcError::Timeout)??,
            None => invocation.await?,
        };

        let (metadata, payload, _) = response.into_parts();
        let decoded = codec::decode(&payload, output, &self.index)?;
        let body = codec::to_json(&decoded, &self.index);
        let elapsed = start.elapsed();

        Ok(UnaryResponse {
            body,
            elapsed,
            status_code: tonic::Code::Ok as i32,
            status_message: "OK".to_string(),
            headers: metadata_to_pairs(&metadata),
            trailers: None,
        })
    }

    async fn invoke(
        &self,
        address: &RpcAddress,
        path: &str,
        request: tonic::Request<DynamicMessage>,
    ) -> Result<tonic::Response<Bytes>, RpcError> {
        let service = self.connector.connect(address).await?;
        let mut client = GrpcClient::new(service);

        client
            .unary(path, request)
            .await
            .map_err(request_error)?
            .map_err(classify)
    }
}

fn request_error(err: GrpcRequestError) -> RpcError {
    match err {
        GrpcRequestError::ClientNotReady(source) => RpcError::Unavailable(source.to_string()),
        GrpcRequestError::InvalidPath(_) => RpcError::Unknown(err.to_string()),
        GrpcRequestError::InvalidMetadataKey { .. }
        | GrpcRequestError::InvalidMetadataValue { .. } => {
            RpcError::InvalidInputEncoding(err.to_string())
        }
    }
}
