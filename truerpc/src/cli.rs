//! # CLI
//!
//! This module defines the command-line interface of `truerpc` using `clap`.
//!
//! It is responsible for parsing user input and performing validation (e.g., ensuring headers are `key:value`).
//! Schema flags are global so every command sees the same descriptors.
use clap::{Args, Parser, Subcommand};
use std::{path::PathBuf, time::Duration};

#[derive(Parser)]
#[command(name = "truerpc", version, about = "Dynamic gRPC CLI")]
pub struct Cli {
    #[command(flatten)]
    pub schema: SchemaArgs,

    /// Log debug output to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where descriptors are loaded from. Sources are registered in the order given, proto
/// files first, and the first declaration of a name wins.
#[derive(Args)]
pub struct SchemaArgs {
    /// A .proto file to compile (repeatable)
    #[arg(
        long = "proto",
        global = true,
        env = "TRUERPC_PROTO",
        value_delimiter = ','
    )]
    pub protos: Vec<PathBuf>,

    /// Directory searched for .proto files and their imports (repeatable)
    #[arg(
        short = 'I',
        long = "include",
        global = true,
        env = "TRUERPC_INCLUDE",
        value_delimiter = ','
    )]
    pub includes: Vec<PathBuf>,

    /// An encoded FileDescriptorSet, e.g. from `protoc --include_imports -o` (repeatable)
    #[arg(
        long = "file-descriptor-set",
        global = true,
        env = "TRUERPC_FILE_DESCRIPTOR_SET",
        value_delimiter = ','
    )]
    pub file_descriptor_sets: Vec<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Perform a unary gRPC call
    ///
    /// Port 443 is called over TLS, every other port in plaintext.
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// truerpc --proto echo.proto call localhost:50051 echo.EchoService/UnaryEcho --body '{"message": "hi"}'
    /// ```
    Call {
        /// Target address (host[:port], default port 50051)
        address: String,

        /// Endpoint (package.Service/Method)
        #[arg(value_parser = parse_endpoint)]
        endpoint: (String, String),

        /// JSON body (an object matching the method's input type)
        #[arg(long, default_value = "{}")]
        body: String,

        #[arg(short = 'H', long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        /// Deadline for the whole call, in seconds
        #[arg(long, env = "TRUERPC_TIMEOUT", value_parser = parse_timeout)]
        timeout: Option<Duration>,
    },

    /// List available services or other resources
    List {
        #[command(subcommand)]
        sub: ListCommands,
    },

    /// Describe a service or a message in detail
    Describe {
        #[command(subcommand)]
        sub: DescribeCommands,
    },

    /// Print a JSON request skeleton for a message type
    Template {
        /// Message type name (e.g. my.package.Message)
        message: String,
    },
}

#[derive(Subcommand)]
pub enum ListCommands {
    /// List all services declared in the loaded descriptors
    Services,
}

#[derive(Subcommand)]
pub enum DescribeCommands {
    /// Describe a specific service (list its methods)
    Service {
        /// Fully qualified service name (e.g. my.package.Service)
        service: String,
    },
    /// Describe a specific message (show its fields)
    Message {
        /// Message type name (e.g. my.package.Message)
        message: String,
    },
}

fn parse_endpoint(value: &str) -> Result<(String, String), String> {
    let (service, method) = value.split_once('/').ok_or_else(|| {
        format!("Invalid endpoint format: '{value}'. Expected 'package.Service/Method'",)
    })?;

    if service.trim().is_empty() || method.trim().is_empty() {
        return Err("Service and Method names cannot be empty".to_string());
    }

    Ok((service.to_string(), method.to_string()))
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    s.split_once(':')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| "Format must be 'key:value'".to_string())
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|_| format!("Invalid timeout '{value}': expected a number of seconds"))?;

    Duration::try_from_secs_f64(seconds)
        .ok()
        .filter(|d| !d.is_zero())
        .ok_or_else(|| format!("Invalid timeout '{value}': must be greater than zero"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        assert_eq!(
            parse_endpoint("echo.EchoService/UnaryEcho").unwrap(),
            ("echo.EchoService".to_string(), "UnaryEcho".to_string())
        );
        assert!(parse_endpoint("echo.EchoService").is_err());
        assert!(parse_endpoint("/UnaryEcho").is_err());
    }

    #[test]
    fn test_parse_header_keeps_colons_in_value() {
        assert_eq!(
            parse_header("authorization: Bearer a:b").unwrap(),
            ("authorization".to_string(), "Bearer a:b".to_string())
        );
        assert!(parse_header("no-colon").is_err());
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("1.5").unwrap(), Duration::from_millis(1500));
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("-1").is_err());
        assert!(parse_timeout("soon").is_err());
    }

    #[test]
    fn test_global_schema_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "truerpc",
            "call",
            "localhost:50051",
            "echo.EchoService/UnaryEcho",
            "--proto",
            "echo.proto",
            "-I",
            "protos",
            "-H",
            "x-api-key:secret",
            "--timeout",
            "2",
        ])
        .unwrap();

        assert_eq!(cli.schema.protos, [PathBuf::from("echo.proto")]);
        assert_eq!(cli.schema.includes, [PathBuf::from("protos")]);
        match cli.command {
            Commands::Call {
                body,
                headers,
                timeout,
                ..
            } => {
                assert_eq!(body, "{}");
                assert_eq!(headers, [("x-api-key".to_string(), "secret".to_string())]);
                assert_eq!(timeout, Some(Duration::from_secs(2)));
            }
            _ => panic!("Expected the call command"),
        }
    }
}
