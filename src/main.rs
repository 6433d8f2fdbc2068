use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use image_previewer::{
    config::{Config, LogFormat},
    errors::AppResult,
    logging::init_logging,
    services::{HttpFetcher, ImageTransformer, PreviewCache, PreviewService},
    storage::PreviewStorage,
    web::{WebServer, wait_for_shutdown_signal},
};

#[derive(Parser)]
#[command(name = "image-previewer")]
#[command(version)]
#[command(about = "HTTP image preview proxy with a disk-backed LRU cache")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Upstream connect timeout (e.g. 25s)
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    connect_timeout: Option<Duration>,

    /// Upstream whole-request timeout (e.g. 25s)
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    request_timeout: Option<Duration>,

    /// Time allowed for open connections to drain on shutdown
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    shutdown_timeout: Option<Duration>,

    /// Preview cache directory; a temporary one is used and removed on exit when unset
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Maximum number of cached previews
    #[arg(long, value_name = "N")]
    cache_size: Option<usize>,

    /// Log level
    #[arg(short = 'v', long)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.web.host = host;
        }
        if let Some(port) = self.port {
            config.web.port = port;
        }
        if let Some(timeout) = self.connect_timeout {
            config.fetch.connect_timeout = timeout;
        }
        if let Some(timeout) = self.request_timeout {
            config.fetch.request_timeout = timeout;
        }
        if let Some(timeout) = self.shutdown_timeout {
            config.web.shutdown_timeout = timeout;
        }
        if let Some(dir) = self.cache_dir {
            config.cache.directory = Some(dir);
        }
        if let Some(size) = self.cache_size {
            config.cache.capacity = size;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    let mut config = Config::load(cli.config.take().as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    init_logging(&config.logging.level, config.logging.format)?;
    info!("Starting image previewer v{}", env!("CARGO_PKG_VERSION"));

    let storage = open_storage(config.cache.directory.as_deref()).await?;
    info!(
        capacity = config.cache.capacity,
        directory = %storage.directory().display(),
        auto_allocated = storage.is_auto_allocated(),
        "Preview cache initialized"
    );

    let previews = PreviewService::new(
        Arc::new(PreviewCache::new(config.cache.capacity)),
        storage.clone(),
        Arc::new(HttpFetcher::new(&config.fetch)?),
        Arc::new(ImageTransformer::new(&config.transform)),
    );

    let server = WebServer::new(&config.web, previews)?;
    let shutdown_token = CancellationToken::new();
    let (server_ready_tx, server_ready_rx) = oneshot::channel();
    let mut server_handle = tokio::spawn(
        server.serve_with_cancellation(server_ready_tx, Some(shutdown_token.clone())),
    );

    match server_ready_rx.await {
        Ok(Ok(addr)) => info!(address = %addr, "Image previewer ready"),
        Ok(Err(e)) => {
            error!(error = %e, "Web server failed to start");
            return Err(e);
        }
        Err(_) => {
            return Err(anyhow::anyhow!(
                "Web server exited before signalling readiness"
            ));
        }
    }

    tokio::select! {
        _ = wait_for_shutdown_signal() => {}
        result = &mut server_handle => {
            error!("Web server stopped unexpectedly");
            release_storage(storage);
            return result?;
        }
    }

    shutdown_token.cancel();
    match tokio::time::timeout(config.web.shutdown_timeout, &mut server_handle).await {
        Ok(Ok(Ok(()))) => info!("Graceful shutdown complete"),
        Ok(Ok(Err(e))) => error!(error = %e, "Web server failed during shutdown"),
        Ok(Err(e)) => error!(error = %e, "Web server task failed"),
        Err(_) => {
            warn!(
                timeout = ?config.web.shutdown_timeout,
                "Connections did not drain in time, aborting"
            );
            server_handle.abort();
            let _ = server_handle.await;
        }
    }

    release_storage(storage);
    Ok(())
}

/// Use the configured cache directory, or allocate a temporary one
async fn open_storage(directory: Option<&Path>) -> AppResult<PreviewStorage> {
    let storage = match directory {
        Some(dir) => PreviewStorage::open(dir).await?,
        None => PreviewStorage::temporary()?,
    };
    Ok(storage)
}

fn release_storage(storage: PreviewStorage) {
    if let Err(e) = storage.cleanup() {
        warn!(error = %e, "Failed to remove temporary preview cache directory");
    }
}
