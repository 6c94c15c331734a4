//! Render service entry point.
//!
//! Bootstraps the WebSocket render server with:
//! - Configuration loading from `PHENO_RENDER_*` environment variables
//! - Structured logging initialization
//! - Port selection (fixed or derived from a host-info file path)
//! - Signal handling for graceful shutdown
//!
//! ## CLI Subcommands
//!
//! - `phenosynth-render` or `phenosynth-render serve` - run the server (default)
//! - `phenosynth-render health` - probe a running server's `/health` (exit 0/1)
//! - `phenosynth-render config show` - print the effective configuration
//! - `phenosynth-render version` - print version

use std::process::ExitCode;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use phenosynth_render::config;
use phenosynth_render::port::{write_host_info, PathHashAllocator, PortAllocator};
use phenosynth_render::shutdown::ShutdownResult;
use phenosynth_render::telemetry::{init_logging, LogConfig};
use phenosynth_render::ws::server::run_server;
use phenosynth_render::Service;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("serve");

    match command {
        "serve" | "" => match serve().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Server error: {e}");
                ExitCode::FAILURE
            }
        },
        "health" => {
            let config = config::load();
            let host = if config.listen.host == "0.0.0.0" {
                "127.0.0.1".to_string()
            } else {
                config.listen.host.clone()
            };
            match probe_health(&host, config.listen.port).await {
                Ok(true) => {
                    println!("healthy");
                    ExitCode::SUCCESS
                }
                Ok(false) => {
                    eprintln!("unhealthy");
                    ExitCode::FAILURE
                }
                Err(e) => {
                    eprintln!("Connection error: {e}");
                    ExitCode::from(3u8)
                }
            }
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    println!("{:#?}", config::load().effective_config());
                    ExitCode::SUCCESS
                }
                _ => {
                    eprintln!("Unknown config subcommand: {subcommand}");
                    ExitCode::FAILURE
                }
            }
        }
        "version" | "--version" | "-V" => {
            println!("phenosynth-render {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {command}");
            print_usage();
            ExitCode::FAILURE
        }
    }
}

async fn serve() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load();
    init_logging(&LogConfig {
        format: config.log_format,
        level: config.log_level.clone(),
        output_path: None,
    })?;

    // Port: derived from the host-info path in cluster mode, fixed otherwise.
    let port = match &config.listen.host_info_file {
        Some(path) => {
            let port = PathHashAllocator::new(path.clone()).allocate().await?;
            write_host_info(path, port).await?;
            port
        }
        None => config.listen.port,
    };

    let listener =
        tokio::net::TcpListener::bind((config.listen.host.as_str(), port)).await?;
    tracing::info!(
        host = %config.listen.host,
        port,
        workers = config.effective_workers(),
        max_concurrent = config.admission.max_concurrent,
        "render service listening"
    );

    let service = Service::new(&config);
    let token = service.shutdown.cancel_token();
    let server = tokio::spawn(run_server(listener, Arc::clone(&service.state), token));

    wait_for_shutdown_signal().await?;
    tracing::info!("shutdown signal received, draining");

    match service.shutdown.initiate(config.shutdown_timeout).await {
        ShutdownResult::Complete => tracing::info!("shutdown complete"),
        ShutdownResult::Timeout { remaining } => {
            tracing::warn!(remaining, "shutdown timeout with sessions remaining");
        }
    }

    server.await??;
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

/// Minimal HTTP GET against `/health`; true iff the status line is 200.
async fn probe_health(host: &str, port: u16) -> std::io::Result<bool> {
    let mut stream = tokio::net::TcpStream::connect((host, port)).await?;
    let request = format!("GET /health HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    let head = String::from_utf8_lossy(&response);
    Ok(head.lines().next().is_some_and(|line| line.contains(" 200 ")))
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "phenosynth-render - genome render scheduler and streaming service v{version}

USAGE:
    phenosynth-render [COMMAND]

COMMANDS:
    serve        Run the WebSocket render server (default)
    health       Probe a running server's /health endpoint (exit 0/1)
    config show  Print the effective configuration
    version      Show version information
    help         Show this help message

ENVIRONMENT:
    PHENO_RENDER_HOST             Listen address (default 0.0.0.0)
    PHENO_RENDER_PORT             Listen port (default 3000)
    PHENO_RENDER_HOST_INFO_FILE   Derive the port from this path and write host:port back
    PHENO_RENDER_WORKERS          Render workers, 0 = CPU count
    PHENO_RENDER_MAX_CONCURRENT   Concurrent render slots, 0 = worker count
    PHENO_RENDER_GENOME_DIR       Directory backing the genome store
    PHENO_RENDER_LOG_FORMAT       json | pretty

EXIT CODES:
    0  Success / Healthy
    1  Failure / Unhealthy
    3  Connection error
"
    );
}
