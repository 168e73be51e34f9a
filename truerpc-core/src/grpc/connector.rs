//! # Transport Connectors
//!
//! A [`Connector`] opens the transport a call runs on. [`ChannelConnector`] dials real
//! servers with `tonic::transport`; tests plug in-process services into the same seam.
use crate::{address::RpcAddress, error::RpcError};
use std::{error::Error as StdError, future::Future, time::Duration};
use tonic::{
    client::GrpcService,
    transport::{Channel, ClientTlsConfig, Endpoint},
};

/// Default limit for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens a gRPC transport for a resolved address.
pub trait Connector: Send + Sync {
    type Service: GrpcService<tonic::body::Body>;

    /// Connects to `address`, honouring its TLS decision.
    ///
    /// Connection failures are reported as [`RpcError::Unavailable`] and addresses the
    /// transport cannot represent as [`RpcError::InvalidAddress`].
    fn connect(
        &self,
        address: &RpcAddress,
    ) -> impl Future<Output = Result<Self::Service, RpcError>> + Send;
}

/// Dials servers over HTTP/2 with `tonic::transport::Channel`.
///
/// TLS connections verify the server against the bundled webpki roots.
#[derive(Debug, Clone)]
pub struct ChannelConnector {
    connect_timeout: Duration,
}

impl Default for ChannelConnector {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ChannelConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    fn endpoint(&self, address: &RpcAddress) -> Result<Endpoint, RpcError> {
        let endpoint = Endpoint::from_shared(address.uri())
            .map_err(|e| RpcError::InvalidAddress(format!("{address}: {}", describe(&e))))?
            .connect_timeout(self.connect_timeout)
            .tcp_keepalive(None);

        if !address.use_tls {
            return Ok(endpoint);
        }

        let domain = address.host.trim_start_matches('[').trim_end_matches(']');
        let tls = ClientTlsConfig::new()
            .with_webpki_roots()
            .domain_name(domain);

        endpoint
            .tls_config(tls)
            .map_err(|e| RpcError::InvalidAddress(format!("{address}: {}", describe(&e))))
    }
}

impl Connector for ChannelConnector {
    type Service = Channel;

    async fn connect(&self, address: &RpcAddress) -> Result<Channel, RpcError> {
        let endpoint = self.endpoint(address)?;

        tracing::debug!(uri = %address.uri(), tls = address.use_tls, "connecting");

        endpoint
            .connect()
            .await
            .map_err(|e| RpcError::Unavailable(format!("{address}: {}", describe(&e))))
    }
}

/// Joins an error message with the messages of its sources.
fn describe(err: &dyn StdError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
