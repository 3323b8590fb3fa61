//! Unified Memory MCP Server
//!
//! Exposes the unified memory store (tier/scope-partitioned storage, BM25
//! and semantic search, behavioural analytics, and lifecycle management) to
//! AI coding assistants over the Model Context Protocol, via JSON-RPC 2.0 on
//! stdio.

mod protocol;
mod server;
mod tools;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use memory_core::config::Config;
use memory_core::storage::Store;

use crate::protocol::stdio::StdioTransport;
use crate::server::McpServer;

/// Parses command-line arguments and returns the optional data directory
/// path. Returns `None` if no `--data-dir` was specified. Exits the process
/// if `--help` or `--version` is requested.
fn parse_args() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    let mut data_dir: Option<PathBuf> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!("memory-mcp v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("A unified memory store exposed as an MCP server over stdio.");
                println!();
                println!("USAGE:");
                println!("    memory-mcp [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help              Print help information");
                println!("    -V, --version           Print version information");
                println!("    --data-dir <PATH>       Directory holding unified.db (default: ~/.copilot-mcp/memory)");
                println!();
                println!("ENVIRONMENT:");
                println!("    RUST_LOG               Log level filter (e.g., debug, info, warn, error)");
                println!();
                println!("EXAMPLES:");
                println!("    memory-mcp");
                println!("    memory-mcp --data-dir /custom/path");
                println!("    RUST_LOG=debug memory-mcp");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("memory-mcp {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--data-dir" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --data-dir requires a path argument");
                    eprintln!("Usage: memory-mcp --data-dir <PATH>");
                    std::process::exit(1);
                }
                data_dir = Some(PathBuf::from(&args[i]));
            }
            arg if arg.starts_with("--data-dir=") => {
                let path = arg.strip_prefix("--data-dir=").unwrap_or("");
                if path.is_empty() {
                    eprintln!("error: --data-dir requires a path argument");
                    eprintln!("Usage: memory-mcp --data-dir <PATH>");
                    std::process::exit(1);
                }
                data_dir = Some(PathBuf::from(path));
            }
            arg => {
                eprintln!("error: unknown argument '{}'", arg);
                eprintln!("Usage: memory-mcp [OPTIONS]");
                eprintln!("Try 'memory-mcp --help' for more information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    data_dir
}

fn resolve_config(data_dir: Option<PathBuf>) -> anyhow::Result<Config> {
    match data_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            Ok(Config::new(dir.join("unified.db")))
        }
        None => Ok(Config::default_for_home()?),
    }
}

#[tokio::main]
async fn main() {
    // Parse CLI arguments first (before logging init, so --help/--version work cleanly).
    let data_dir = parse_args();

    // Initialize logging to stderr; stdout is reserved for JSON-RPC.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!("memory-mcp v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = match resolve_config(data_dir) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to resolve data directory: {}", e);
            std::process::exit(1);
        }
    };

    let store = match Store::open(&config) {
        Ok(s) => {
            info!(db_path = %config.db_path.display(), "Store opened");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    let server = McpServer::new(store);
    let transport = StdioTransport::new();

    info!("Starting MCP server on stdio...");
    if let Err(e) = transport.run(server).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("memory-mcp shutting down");
}
