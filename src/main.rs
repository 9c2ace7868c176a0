//! FlintKV server binary.
//!
//! Parses the command line, replays the durability log, and serves clients
//! until Ctrl+C.

use flintkv::config::{Config, Invocation};
use flintkv::server::{serve, ServerContext};
use flintkv::storage::ExpirySweeper;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!(
        r#"
FlintKV - A Small Redis-Style Key-Value Server

USAGE:
    flintkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>               Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>               Port to listen on (default: 6380)
        --cleanup-interval <SECS>   Expiry sweep period in seconds (default: 1)
        --aof <PATH>                Durability log (default: data/appendonly.aof)
        --max-keys <N>              Keys kept before LRU eviction, 0 = unbounded (default: 10000)
    -v, --version                   Print version information
        --help                      Print this help message

ENVIRONMENT:
    RUST_LOG                        Log filter (default: info)

CONNECTING:
    Use redis-cli or any Redis client to connect:
    $ redis-cli -p 6380
    127.0.0.1:6380> SET name "Ariz"
    OK
    127.0.0.1:6380> GET name
    "Ariz"
"#
    );
}

fn print_banner(config: &Config) {
    println!(
        r#"
FlintKV v{} - Redis-Style Key-Value Server
──────────────────────────────────────────────
Server started on {}
Durability log: {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        flintkv::VERSION,
        config.bind_address(),
        config.aof_path.display()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::parse_args(std::env::args().skip(1)) {
        Ok(Invocation::Run(config)) => config,
        Ok(Invocation::Help) => {
            print_help();
            return Ok(());
        }
        Ok(Invocation::Version) => {
            println!("FlintKV version {}", flintkv::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {e}");
            print_help();
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    print_banner(&config);

    let ctx = ServerContext::open(&config).await?;

    let _sweeper = ExpirySweeper::start(Arc::clone(&ctx.store), config.cleanup_interval);

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!(address = %config.bind_address(), "Listening");

    let log = ctx.commands.log().cloned();

    tokio::select! {
        _ = serve(listener, ctx) => {}
        result = signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Shutdown signal received, stopping server..."),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
            }
        }
    }

    if let Some(log) = log {
        if let Err(e) = log.sync() {
            error!(error = %e, "Failed to sync durability log");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
