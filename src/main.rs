//! airstatus - airport status through a read-through cache
//!
//! Connects to the configured cache store, looks up each airport code in turn
//! and prints its status record. Any failure aborts the run with a nonzero
//! exit code.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use airstatus::cli::{Cli, DriverConfig, StoreKind};
use airstatus::fetch::FaaClient;
use airstatus::resolver::{ResolveError, Resolver};
use airstatus::store::{CacheStore, FileStore, MemoryStore, RedisStore};

/// Installs the stderr log subscriber; RUST_LOG wins over `-v`
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Opens the selected cache backend
async fn open_store(config: &DriverConfig) -> Result<Arc<dyn CacheStore>, ResolveError> {
    let store: Arc<dyn CacheStore> = match config.store {
        StoreKind::Redis => Arc::new(
            RedisStore::connect(&config.host, config.port)
                .await
                .map_err(|e| ResolveError::Configuration(e.to_string()))?,
        ),
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::File => Arc::new(
            FileStore::new().map_err(|e| ResolveError::Configuration(e.to_string()))?,
        ),
    };
    Ok(store)
}

async fn run(config: DriverConfig) -> Result<(), ResolveError> {
    let store = open_store(&config).await?;
    let source = FaaClient::new(config.fetch.clone())
        .map_err(|e| ResolveError::Configuration(e.to_string()))?;
    let resolver = Resolver::new(store, Arc::new(source), config.resolver.clone());
    debug!(?resolver, "Resolver ready");

    for code in &config.codes {
        let record = resolver.get_airport(code).await?;
        println!("{}: {}", code, record);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match DriverConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };

    init_tracing(config.verbose);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(code = ?e.code(), layer = %e.layer(), "Lookup aborted");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
