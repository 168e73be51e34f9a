//! # TrueRPC CLI Entry Point
//!
//! The main executable for the TrueRPC tool. This file drives the application lifecycle:
//!
//! 1. **Initialization**: Parses command-line arguments using [`cli::Cli`] and installs the
//!    log subscriber.
//! 2. **Schema loading**: Compiles `.proto` files and reads descriptor sets into a
//!    [`DescriptorIndex`].
//! 3. **Execution**: Delegates calls to the `TrueRpcClient` and lookups to the index.
//! 4. **Presentation**: Formats and prints the resulting data or error to standard output/error.

mod cli;
mod formatter;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands, DescribeCommands, ListCommands, SchemaArgs};
use formatter::{FormattedString, GenericError, MessageView, ServiceList};
use std::{path::PathBuf, process, sync::Arc, time::Duration};
use tracing_subscriber::EnvFilter;
use truerpc_core::{
    DescriptorIndex, TrueRpcClient,
    client::UnaryRequest,
    codec::template,
};

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    init_tracing(args.verbose);

    let index = match load_index(&args.schema) {
        Ok(index) => Arc::new(index),
        Err(err) => {
            eprintln!(
                "{}",
                FormattedString::from(GenericError("Failed to load descriptors", format!("{err:#}")))
            );
            process::exit(1);
        }
    };

    match args.command {
        Commands::Call {
            address,
            endpoint,
            body,
            headers,
            timeout,
        } => {
            let (service, method) = endpoint;
            run_call(index, address, service, method, body, headers, timeout).await;
        }
        Commands::List { sub } => match sub {
            ListCommands::Services => {
                println!("{}", FormattedString::from(ServiceList(index.services())))
            }
        },
        Commands::Describe { sub } => match sub {
            DescribeCommands::Service { service } => describe_service(&index, &service),
            DescribeCommands::Message { message } => describe_message(&index, &message),
        },
        Commands::Template { message } => print_template(&index, &message),
    }
}

/// Logs go to stderr so they never mix with JSON printed on stdout.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_index(schema: &SchemaArgs) -> anyhow::Result<DescriptorIndex> {
    if schema.protos.is_empty() && schema.file_descriptor_sets.is_empty() {
        anyhow::bail!("no descriptors given, pass --proto or --file-descriptor-set");
    }

    let index = DescriptorIndex::new();

    if !schema.protos.is_empty() {
        let includes = include_paths(schema);
        index
            .register_proto_files(&schema.protos, &includes)
            .with_context(|| format!("compiling {}", display_paths(&schema.protos)))?;
    }

    for path in &schema.file_descriptor_sets {
        index
            .register_file_descriptor_set_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
    }

    tracing::debug!(files = ?index.resolution_order(), "descriptors loaded");
    Ok(index)
}

/// Without `-I`, every proto file's own directory is searched.
fn include_paths(schema: &SchemaArgs) -> Vec<PathBuf> {
    if !schema.includes.is_empty() {
        return schema.includes.clone();
    }

    let mut includes: Vec<PathBuf> = Vec::new();
    for proto in &schema.protos {
        let dir = match proto.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !includes.contains(&dir) {
            includes.push(dir);
        }
    }
    includes
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_service(index: &DescriptorIndex, service_name: &str) {
    match index.find_service(service_name) {
        Some(descriptor) => println!("{}", FormattedString::from(descriptor)),
        None => {
            eprintln!(
                "{}",
                FormattedString::from(GenericError("Symbol Lookup Failed", service_name))
            );
            process::exit(1);
        }
    }
}

fn describe_message(index: &DescriptorIndex, message_name: &str) {
    match index.resolve(message_name) {
        Ok(message) => println!(
            "{}",
            FormattedString::from(MessageView {
                message: &message,
                index,
            })
        ),
        Err(e) => {
            eprintln!("{}", FormattedString::from(e));
            process::exit(1);
        }
    }
}

fn print_template(index: &DescriptorIndex, message_name: &str) {
    match index.resolve(message_name) {
        Ok(message) => println!("{}", FormattedString::from(template(&message, index))),
        Err(e) => {
            eprintln!("{}", FormattedString::from(e));
            process::exit(1);
        }
    }
}

async fn run_call(
    index: Arc<DescriptorIndex>,
    address: String,
    service: String,
    method: String,
    body: String,
    headers: Vec<(String, String)>,
    timeout: Option<Duration>,
) {
    let request = UnaryRequest {
        body,
        address,
        metadata: headers,
        timeout,
    };

    let client = TrueRpcClient::new(index);

    match client.execute(&service, &method, request).await {
        Ok(response) => println!("{}", FormattedString::from(response)),
        Err(err) => {
            eprintln!("{}", FormattedString::from(err));
            process::exit(1);
        }
    }
}
