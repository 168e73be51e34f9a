use std::time::Duration;

/// Everything needed to perform one unary call, besides the method itself.
#[derive(Debug, Clone, Default)]
pub struct UnaryRequest {
    /// The JSON body of the request, an object matching the method's input type.
    pub body: String,
    /// The target, as typed by the user (e.g. `localhost:50051`, `https://api.example.com:443`).
    pub address: String,
    /// Custom gRPC metadata (headers). Keys ending in `-bin` are sent as binary metadata.
    pub metadata: Vec<(String, String)>,
    /// Deadline for the whole call, connection included.
    pub timeout: Option<Duration>,
}

impl UnaryRequest {
    pub fn new(body: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// The result of a successful unary call.
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryResponse {
    /// The response message as JSON text.
    pub body: String,
    /// Wall-clock time of the send step: connection setup, the call itself and decoding
    /// the response. Request encoding and address parsing happen before the clock starts.
    pub elapsed: Duration,
    /// The gRPC status code, always `0` (OK) here since failures are reported as errors.
    pub status_code: i32,
    pub status_message: String,
    /// Response metadata as `(key, value)` pairs; binary values are base64-encoded.
    pub headers: Vec<(String, String)>,
    /// Trailing metadata. `tonic` folds unary trailers into [`UnaryResponse::headers`], so
    /// this is `None` for successful calls.
    pub trailers: Option<Vec<(String, String)>>,
}

impl UnaryResponse {
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}
