//! # Error Taxonomy
//!
//! Every failure a call can produce is reported as one [`RpcError`] variant. Descriptor
//! resolution and encoding failures are detected before any network I/O happens; transport
//! failures are mapped exactly once, by [`classify`], at the orchestration boundary.
use crate::grpc::client::metadata_to_pairs;
use bytes::Bytes;
use tonic::{Code, Status};

/// What is left of a call the peer answered with a non-OK status.
///
/// Kept so that callers can render protocol-level diagnostics instead of a generic failure.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedCall {
    pub code: Code,
    pub message: String,
    /// Raw `grpc-status-details-bin` payload, empty when the server sent none.
    pub details: Bytes,
    /// Headers and trailers attached to the status.
    pub metadata: Vec<(String, String)>,
}

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Invalid input encoding: {0}")]
    InvalidInputEncoding(String),

    #[error("Value for field '{field}' cannot be used: {reason}")]
    TypeMismatch { field: String, reason: String },

    #[error("Message type '{0}' not found")]
    MessageTypeNotFound(String),

    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    #[error("Malformed wire data: {0}")]
    MalformedWireData(String),

    #[error("Method '{0}' is a streaming method, only unary calls are supported")]
    StreamingNotSupported(String),

    #[error("Server unavailable: {0}")]
    Unavailable(String),

    #[error("Deadline exceeded while waiting for a response")]
    Timeout,

    #[error("gRPC call failed with code {:?}: '{}'", .0.code, .0.message)]
    RpcFailed(Box<FailedCall>),

    #[error("{0}")]
    Unknown(String),
}

impl RpcError {
    pub(crate) fn type_mismatch(field: impl Into<String>, reason: impl Into<String>) -> Self {
        RpcError::TypeMismatch {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// A stable identifier for the variant, suitable for logs and UIs.
    pub fn code(&self) -> &'static str {
        match self {
            RpcError::InvalidInputEncoding(_) => "INVALID_INPUT_ENCODING",
            RpcError::TypeMismatch { .. } => "TYPE_MISMATCH",
            RpcError::MessageTypeNotFound(_) => "MESSAGE_TYPE_NOT_FOUND",
            RpcError::InvalidAddress(_) => "INVALID_ADDRESS",
            RpcError::MalformedWireData(_) => "MALFORMED_WIRE_DATA",
            RpcError::StreamingNotSupported(_) => "STREAMING_NOT_SUPPORTED",
            RpcError::Unavailable(_) => "UNAVAILABLE",
            RpcError::Timeout => "TIMEOUT",
            RpcError::RpcFailed(_) => "RPC_FAILED",
            RpcError::Unknown(_) => "UNKNOWN",
        }
    }

    /// Returns the failed call details if this is an [`RpcError::RpcFailed`].
    pub fn failed_call(&self) -> Option<&FailedCall> {
        match self {
            RpcError::RpcFailed(call) => Some(call),
            _ => None,
        }
    }
}

/// Maps a transport status into the taxonomy.
///
/// `Unknown` is treated as "the transport could not tell us what happened" and keeps the
/// original code and message as diagnostic text.
pub fn classify(status: Status) -> RpcError {
    match status.code() {
        Code::Unavailable => RpcError::Unavailable(status.message().to_string()),
        Code::DeadlineExceeded => RpcError::Timeout,
        Code::Unknown | Code::Ok => RpcError::Unknown(format!(
            "gRPC error: {:?} - {}",
            status.code(),
            status.message()
        )),
        code => RpcError::RpcFailed(Box::new(FailedCall {
            code,
            message: status.message().to_string(),
            details: status.details().to_vec().into(),
            metadata: metadata_to_pairs(status.metadata()),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::metadata::MetadataMap;

    #[test]
    fn test_unavailable_and_deadline_have_dedicated_variants() {
        assert!(matches!(
            classify(Status::unavailable("connection refused")),
            RpcError::Unavailable(msg) if msg == "connection refused"
        ));
        assert!(matches!(
            classify(Status::deadline_exceeded("too slow")),
            RpcError::Timeout
        ));
    }

    #[test]
    fn test_unknown_code_keeps_diagnostic_text() {
        let err = classify(Status::unknown("h2 protocol error"));

        match err {
            RpcError::Unknown(text) => {
                assert!(text.contains("Unknown"));
                assert!(text.contains("h2 protocol error"));
            }
            other => panic!("Expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn test_other_codes_preserve_the_failed_call() {
        let mut metadata = MetadataMap::new();
        metadata.insert("x-request-id", "abc".parse().unwrap());

        let status = Status::with_details_and_metadata(
            Code::NotFound,
            "user 42 does not exist",
            Bytes::from_static(b"\x08\x05"),
            metadata,
        );

        let err = classify(status);
        let call = err.failed_call().expect("RpcFailed");

        assert_eq!(err.code(), "RPC_FAILED");
        assert_eq!(call.code, Code::NotFound);
        assert_eq!(call.message, "user 42 does not exist");
        assert_eq!(call.details.as_ref(), b"\x08\x05");
        assert!(
            call.metadata
                .contains(&("x-request-id".to_string(), "abc".to_string()))
        );
    }
}
