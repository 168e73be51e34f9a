//! # Address & Transport Security
//!
//! Turns the free-form target typed by a user (`localhost`, `api.example.com:443`,
//! `http://10.0.0.7:9000`) into a host, a port and a plaintext/TLS decision.
//!
//! The TLS decision is a fixed heuristic: port `443` means TLS, every other port means
//! plaintext. Deployments serving TLS on other ports are not supported by this rule.
use crate::error::RpcError;
use std::fmt;

/// The conventional gRPC port, used when the target does not carry a valid one.
pub const DEFAULT_PORT: u16 = 50051;

/// The only port for which TLS is negotiated.
pub const TLS_PORT: u16 = 443;

/// A resolved call target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcAddress {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

impl RpcAddress {
    /// Parses `raw` and applies the TLS decision to the resulting port.
    pub fn resolve(raw: &str) -> Result<Self, RpcError> {
        let (host, port) = parse_address(raw)?;
        Ok(Self {
            host,
            port,
            use_tls: decide_tls(port),
        })
    }

    /// The URI handed to the transport, with the scheme matching the security mode.
    pub fn uri(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for RpcAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Splits a `host[:port]` target, with an optional `http://` or `https://` prefix.
///
/// A missing or unparseable port falls back to [`DEFAULT_PORT`]. IPv6 literals must be
/// bracketed (`[::1]:8080`): an empty host, or a host that still contains `:`, is an error.
pub fn parse_address(raw: &str) -> Result<(String, u16), RpcError> {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or(trimmed)
        .trim()
        .trim_end_matches('/');

    if without_scheme.is_empty() {
        return Err(RpcError::InvalidAddress(raw.to_string()));
    }

    let (host, port) = if without_scheme.starts_with('[') {
        split_bracketed(without_scheme).ok_or_else(|| RpcError::InvalidAddress(raw.to_string()))?
    } else {
        match without_scheme.rsplit_once(':') {
            Some((host, port)) => (host, parse_port(port)),
            None => (without_scheme, DEFAULT_PORT),
        }
    };

    if host.is_empty() || (!host.starts_with('[') && host.contains(':')) {
        return Err(RpcError::InvalidAddress(raw.to_string()));
    }

    Ok((host.to_string(), port))
}

/// TLS is used only on port 443.
pub fn decide_tls(port: u16) -> bool {
    port == TLS_PORT
}

/// `[addr]` or `[addr]:port`. Anything else after the closing bracket is rejected.
fn split_bracketed(target: &str) -> Option<(&str, u16)> {
    let close = target.find(']')?;
    let (host, rest) = target.split_at(close + 1);
    if host.len() == 2 {
        return None;
    }
    match rest {
        "" => Some((host, DEFAULT_PORT)),
        _ => rest.strip_prefix(':').map(|port| (host, parse_port(port))),
    }
}

fn parse_port(port: &str) -> u16 {
    match port.trim().parse::<u16>() {
        Ok(port) if port > 0 => port,
        _ => DEFAULT_PORT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_prefix_and_explicit_port() {
        let (host, port) = parse_address("https://api.example.com:443").unwrap();
        assert_eq!(host, "api.example.com");
        assert_eq!(port, 443);
    }

    #[test]
    fn test_default_port_applied() {
        assert_eq!(
            parse_address("localhost").unwrap(),
            ("localhost".to_string(), 50051)
        );
        assert_eq!(
            parse_address("http://localhost").unwrap(),
            ("localhost".to_string(), 50051)
        );
        assert_eq!(
            parse_address("localhost:").unwrap(),
            ("localhost".to_string(), 50051)
        );
    }

    #[test]
    fn test_unparseable_port_falls_back_to_default() {
        assert_eq!(parse_address("localhost:abc").unwrap().1, 50051);
        assert_eq!(parse_address("localhost:0").unwrap().1, 50051);
        assert_eq!(parse_address("localhost:70000").unwrap().1, 50051);
    }

    #[test]
    fn test_whitespace_and_trailing_slash_are_ignored() {
        assert_eq!(
            parse_address("  http://127.0.0.1:9000/  ").unwrap(),
            ("127.0.0.1".to_string(), 9000)
        );
    }

    #[test]
    fn test_ipv6_literal() {
        assert_eq!(
            parse_address("[::1]:8080").unwrap(),
            ("[::1]".to_string(), 8080)
        );
        assert_eq!(
            parse_address("[::1]").unwrap(),
            ("[::1]".to_string(), 50051)
        );
    }

    #[test]
    fn test_unbracketed_ipv6_is_rejected() {
        for raw in ["::1", "fe80::1:8080", "http://::1", "[::1", "[::1]x", "[]:8080"] {
            assert!(
                matches!(parse_address(raw), Err(RpcError::InvalidAddress(_))),
                "expected InvalidAddress for {raw:?}"
            );
        }
    }

    #[test]
    fn test_empty_address_is_rejected() {
        for raw in ["", "   ", "http://", "https://  ", ":8080"] {
            assert!(
                matches!(parse_address(raw), Err(RpcError::InvalidAddress(_))),
                "expected InvalidAddress for {raw:?}"
            );
        }
    }

    #[test]
    fn test_tls_only_on_443() {
        assert!(decide_tls(443));
        assert!(!decide_tls(50051));
        assert!(!decide_tls(80));
        assert!(!decide_tls(8443));
    }

    #[test]
    fn test_resolve_builds_uri_matching_security_mode() {
        let secure = RpcAddress::resolve("https://api.example.com:443").unwrap();
        assert!(secure.use_tls);
        assert_eq!(secure.uri(), "https://api.example.com:443");

        // The scheme typed by the user does not influence the decision.
        let plain = RpcAddress::resolve("https://api.example.com:8080").unwrap();
        assert!(!plain.use_tls);
        assert_eq!(plain.uri(), "http://api.example.com:8080");
        assert_eq!(plain.to_string(), "api.example.com:8080");
    }
}
