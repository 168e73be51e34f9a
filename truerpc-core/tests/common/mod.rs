#![allow(dead_code)]

use bytes::{Buf, BufMut, Bytes};
use std::{
    convert::Infallible,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};
use tonic::{
    Code, Status,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
    codegen::{BoxFuture, Service},
    metadata::{MetadataMap, MetadataValue},
    server::{NamedService, UnaryService},
    transport::Server,
};
use truerpc_core::{
    DescriptorIndex, RpcError, TrueRpcClient, address::RpcAddress, grpc::connector::Connector,
};

pub const ECHO_PROTO: &str = r#"
syntax = "proto3";
package echo;

import "google/protobuf/empty.proto";

enum Mood {
  MOOD_UNSPECIFIED = 0;
  MOOD_HAPPY = 1;
}

message EchoRequest {
  string message = 1;
  int64 count = 2;
  repeated string tags = 3;
  map<string, string> attributes = 4;
  Mood mood = 5;
  bytes payload = 6;
}

message EchoResponse {
  string message = 1;
  int64 count = 2;
  repeated string tags = 3;
  map<string, string> attributes = 4;
  Mood mood = 5;
  bytes payload = 6;
}

service EchoService {
  rpc UnaryEcho(EchoRequest) returns (EchoResponse);
  rpc ServerStreamingEcho(EchoRequest) returns (stream EchoResponse);
  rpc Fail(EchoRequest) returns (EchoResponse);
  rpc Slow(EchoRequest) returns (EchoResponse);
  rpc Garbage(EchoRequest) returns (EchoResponse);
  rpc Inspect(EchoRequest) returns (EchoResponse);
  rpc Ping(google.protobuf.Empty) returns (google.protobuf.Empty);
}
"#;

pub fn echo_index() -> Arc<DescriptorIndex> {
    let index = DescriptorIndex::new();
    index
        .register_proto_sources(&[("echo.proto", ECHO_PROTO)])
        .unwrap();
    Arc::new(index)
}

/// Passes payloads through untouched on the server side.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Codec for RawCodec {
    type Encode = Bytes;
    type Decode = Bytes;
    type Encoder = RawCodec;
    type Decoder = RawCodec;

    fn encoder(&mut self) -> Self::Encoder {
        RawCodec
    }

    fn decoder(&mut self) -> Self::Decoder {
        RawCodec
    }
}

impl Encoder for RawCodec {
    type Item = Bytes;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        dst.put_slice(&item);
        Ok(())
    }
}

impl Decoder for RawCodec {
    type Item = Bytes;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        Ok(Some(src.copy_to_bytes(src.remaining())))
    }
}

#[derive(Debug, Clone, Copy)]
enum Handler {
    Echo,
    Fail,
    Slow,
    Garbage,
    Inspect,
}

impl UnaryService<Bytes> for Handler {
    type Response = Bytes;
    type Future = BoxFuture<tonic::Response<Bytes>, Status>;

    fn call(&mut self, request: tonic::Request<Bytes>) -> Self::Future {
        let handler = *self;
        Box::pin(async move {
            match handler {
                // EchoRequest and EchoResponse share their layout.
                Handler::Echo => Ok(tonic::Response::new(request.into_inner())),
                Handler::Slow => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(tonic::Response::new(request.into_inner()))
                }
                Handler::Fail => {
                    let mut metadata = MetadataMap::new();
                    metadata.insert("x-reason", MetadataValue::from_static("missing"));
                    Err(Status::with_details_and_metadata(
                        Code::NotFound,
                        "no such echo",
                        Bytes::from_static(b"\x08\x05"),
                        metadata,
                    ))
                }
                // Field 1 claims five bytes but only one follows.
                Handler::Garbage => Ok(tonic::Response::new(Bytes::from_static(b"\x0a\x05a"))),
                Handler::Inspect => Ok(inspect(&request)),
            }
        })
    }
}

/// Reports the request metadata back: `x-api-key` as `message`, the raw `trace-bin` bytes
/// as `payload`.
fn inspect(request: &tonic::Request<Bytes>) -> tonic::Response<Bytes> {
    let metadata = request.metadata();
    let mut body = Vec::new();

    if let Some(key) = metadata.get("x-api-key").and_then(|v| v.to_str().ok()) {
        prost::encoding::string::encode(1, &key.to_string(), &mut body);
    }
    if let Some(trace) = metadata.get_bin("trace-bin").and_then(|v| v.to_bytes().ok()) {
        prost::encoding::bytes::encode(6, &trace.to_vec(), &mut body);
    }

    let mut response = tonic::Response::new(Bytes::from(body));
    response
        .metadata_mut()
        .insert("x-served-by", MetadataValue::from_static("echo"));
    response
}

/// A hand-written `echo.EchoService` server, routed like generated tonic servers.
#[derive(Debug, Clone, Default)]
pub struct EchoServer {
    pub calls: Arc<AtomicUsize>,
}

impl Service<http::Request<tonic::body::Body>> for EchoServer {
    type Response = http::Response<tonic::body::Body>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<tonic::body::Body>) -> Self::Future {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let handler = match req.uri().path() {
            "/echo.EchoService/UnaryEcho" | "/echo.EchoService/Ping" => Handler::Echo,
            "/echo.EchoService/Fail" => Handler::Fail,
            "/echo.EchoService/Slow" => Handler::Slow,
            "/echo.EchoService/Garbage" => Handler::Garbage,
            "/echo.EchoService/Inspect" => Handler::Inspect,
            _ => return Box::pin(async { Ok(Status::unimplemented("").into_http()) }),
        };

        Box::pin(async move {
            let mut grpc = tonic::server::Grpc::new(RawCodec);
            Ok(grpc.unary(handler, req).await)
        })
    }
}

impl NamedService for EchoServer {
    const NAME: &'static str = "echo.EchoService";
}

/// Hands every call straight to an in-process [`EchoServer`], counting connections.
#[derive(Debug, Clone, Default)]
pub struct InProcess {
    pub server: EchoServer,
    pub connects: Arc<AtomicUsize>,
    /// Simulated connection setup time.
    pub connect_delay: Duration,
}

impl InProcess {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.server.calls.load(Ordering::SeqCst)
    }
}

impl Connector for InProcess {
    type Service = EchoServer;

    async fn connect(&self, _address: &RpcAddress) -> Result<EchoServer, RpcError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        Ok(self.server.clone())
    }
}

pub fn in_process_client() -> (TrueRpcClient<InProcess>, InProcess) {
    let connector = InProcess::default();
    let client = TrueRpcClient::with_connector(echo_index(), connector.clone());
    (client, connector)
}

/// Serves [`EchoServer`] over TCP on an ephemeral port and returns `127.0.0.1:<port>`.
pub async fn spawn_tcp_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        Server::builder()
            .add_service(EchoServer::default())
            .serve_with_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    addr.to_string()
}
