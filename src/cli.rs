//! Command-line interface parsing for airstatus
//!
//! This module handles parsing of CLI arguments using clap and turns them into
//! a validated [`DriverConfig`]. The short flags follow the classic cache
//! demo layout (`-h` host, `-p` port, `-n` namespace, `-s` set, `-u` usage),
//! which is why clap's built-in `-h` help flag is disabled.

use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use thiserror::Error;

use crate::fetch::FetchConfig;
use crate::resolver::ResolverConfig;
use crate::store::Ttl;

/// Airports looked up when no codes are given
pub const DEFAULT_CODES: [&str; 4] = ["DFW", "SFO", "BWI", "SJC"];

/// Error types for CLI argument validation
#[derive(Debug, Error)]
pub enum CliError {
    /// Port zero cannot be connected to
    #[error("Invalid port: 0")]
    InvalidPort,

    /// TTL must be at least one second
    #[error("Invalid TTL: must be at least 1 second")]
    InvalidTtl,

    /// Namespace or set was empty
    #[error("Invalid {0}: must not be empty")]
    EmptyPartition(&'static str),

    /// An airport code argument was empty
    #[error("Invalid airport code: must not be empty")]
    EmptyCode,
}

/// Which cache backend the driver uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Redis server at --host/--port
    Redis,
    /// In-process map, lost on exit
    Memory,
    /// JSON files in the user cache directory
    File,
}

/// airstatus - airport status through a read-through cache
#[derive(Parser, Debug)]
#[command(name = "airstatus")]
#[command(about = "Look up FAA airport status through a read-through cache")]
#[command(version)]
#[command(disable_help_flag = true)]
pub struct Cli {
    /// Server hostname of the cache store
    #[arg(short = 'h', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port of the cache store
    #[arg(short = 'p', long, default_value_t = 3000)]
    pub port: u16,

    /// Cache namespace
    #[arg(short = 'n', long, default_value = "test")]
    pub namespace: String,

    /// Cache set
    #[arg(short = 's', long, default_value = "demo")]
    pub set: String,

    /// Cache backend
    #[arg(long, value_enum, default_value_t = StoreKind::Redis)]
    pub store: StoreKind,

    /// Time to live of cached records, in seconds
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    pub ttl: u32,

    /// Root URL of the airport status service
    #[arg(long, value_name = "URL")]
    pub upstream: Option<String>,

    /// Per-request upstream timeout, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Upstream retries on transient failures
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Print usage
    #[arg(short = 'u', long = "usage", action = ArgAction::Help)]
    pub usage: Option<bool>,

    /// Print help (`-h` is taken by --host)
    #[arg(long = "help", action = ArgAction::Help)]
    pub help: Option<bool>,

    /// Airport codes to look up
    ///
    /// Examples:
    ///   airstatus                 # DFW SFO BWI SJC
    ///   airstatus IAD ORD         # just IAD and ORD
    #[arg(value_name = "CODES")]
    pub codes: Vec<String>,
}

/// Configuration derived from CLI arguments for driver startup
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Cache store host
    pub host: String,
    /// Cache store port
    pub port: u16,
    /// Selected backend
    pub store: StoreKind,
    /// Resolver settings (namespace, set, TTL)
    pub resolver: ResolverConfig,
    /// Upstream client settings
    pub fetch: FetchConfig,
    /// Codes to look up, in order
    pub codes: Vec<String>,
    /// Debug logging requested
    pub verbose: bool,
}

impl DriverConfig {
    /// Creates a DriverConfig from parsed CLI arguments.
    ///
    /// # Arguments
    /// * `cli` - The parsed CLI struct
    ///
    /// # Returns
    /// * `Ok(DriverConfig)` with defaults filled in
    /// * `Err(CliError)` if a value is out of range or empty
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        if cli.port == 0 {
            return Err(CliError::InvalidPort);
        }
        if cli.namespace.is_empty() {
            return Err(CliError::EmptyPartition("namespace"));
        }
        if cli.set.is_empty() {
            return Err(CliError::EmptyPartition("set"));
        }
        let ttl = Ttl::from_secs(cli.ttl).ok_or(CliError::InvalidTtl)?;

        let codes = if cli.codes.is_empty() {
            DEFAULT_CODES.iter().map(|c| c.to_string()).collect()
        } else {
            if cli.codes.iter().any(|c| c.is_empty()) {
                return Err(CliError::EmptyCode);
            }
            cli.codes.clone()
        };

        let mut fetch = FetchConfig::default();
        if let Some(url) = &cli.upstream {
            fetch = fetch.with_base_url(url.as_str());
        }
        if let Some(secs) = cli.timeout {
            fetch = fetch.with_timeout(Duration::from_secs(secs));
        }
        if let Some(retries) = cli.retries {
            fetch = fetch.with_retries(retries);
        }

        Ok(DriverConfig {
            host: cli.host.clone(),
            port: cli.port,
            store: cli.store,
            resolver: ResolverConfig::new(cli.namespace.as_str(), cli.set.as_str()).with_ttl(ttl),
            fetch,
            codes,
            verbose: cli.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_args() {
        let cli = Cli::parse_from(["airstatus"]);
        assert_eq!(cli.host, "127.0.0.1");
        assert_eq!(cli.port, 3000);
        assert_eq!(cli.namespace, "test");
        assert_eq!(cli.set, "demo");
        assert_eq!(cli.store, StoreKind::Redis);
        assert_eq!(cli.ttl, 300);
        assert!(cli.codes.is_empty());
    }

    #[test]
    fn test_cli_parse_short_flags() {
        let cli = Cli::parse_from([
            "airstatus", "-h", "cache.local", "-p", "6379", "-n", "prod", "-s", "airports",
        ]);
        assert_eq!(cli.host, "cache.local");
        assert_eq!(cli.port, 6379);
        assert_eq!(cli.namespace, "prod");
        assert_eq!(cli.set, "airports");
    }

    #[test]
    fn test_cli_parse_codes_and_store() {
        let cli = Cli::parse_from(["airstatus", "--store", "memory", "IAD", "ORD"]);
        assert_eq!(cli.store, StoreKind::Memory);
        assert_eq!(cli.codes, vec!["IAD", "ORD"]);
    }

    #[test]
    fn test_cli_rejects_unknown_store() {
        assert!(Cli::try_parse_from(["airstatus", "--store", "sqlite"]).is_err());
    }

    #[test]
    fn test_usage_flag_requests_help() {
        let err = Cli::try_parse_from(["airstatus", "-u"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_long_help_flag_requests_help() {
        let err = Cli::try_parse_from(["airstatus", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);

        let cli = Cli::parse_from(["airstatus", "-h", "cache.local"]);
        assert_eq!(cli.host, "cache.local");
    }

    #[test]
    fn test_driver_config_defaults() {
        let cli = Cli::parse_from(["airstatus"]);
        let config = DriverConfig::from_cli(&cli).unwrap();

        assert_eq!(config.codes, DEFAULT_CODES.to_vec());
        assert_eq!(config.resolver.namespace, "test");
        assert_eq!(config.resolver.set, "demo");
        assert_eq!(config.resolver.ttl, Ttl::DEFAULT);
        assert_eq!(config.fetch.base_url, "http://services.faa.gov");
        assert!(!config.verbose);
    }

    #[test]
    fn test_driver_config_upstream_overrides() {
        let cli = Cli::parse_from([
            "airstatus", "--upstream", "http://localhost:9000/", "--timeout", "3", "--retries", "0",
        ]);
        let config = DriverConfig::from_cli(&cli).unwrap();

        assert_eq!(config.fetch.base_url, "http://localhost:9000");
        assert_eq!(config.fetch.timeout, Duration::from_secs(3));
        assert_eq!(config.fetch.max_retries, 0);
    }

    #[test]
    fn test_driver_config_rejects_zero_port() {
        let cli = Cli::parse_from(["airstatus", "-p", "0"]);
        assert!(matches!(DriverConfig::from_cli(&cli), Err(CliError::InvalidPort)));
    }

    #[test]
    fn test_driver_config_rejects_zero_ttl() {
        let cli = Cli::parse_from(["airstatus", "--ttl", "0"]);
        assert!(matches!(DriverConfig::from_cli(&cli), Err(CliError::InvalidTtl)));
    }

    #[test]
    fn test_driver_config_rejects_empty_namespace() {
        let cli = Cli::parse_from(["airstatus", "-n", ""]);
        let err = DriverConfig::from_cli(&cli).unwrap_err();
        assert!(err.to_string().contains("namespace"));
    }

    #[test]
    fn test_driver_config_rejects_empty_code() {
        let cli = Cli::parse_from(["airstatus", "DFW", ""]);
        assert!(matches!(DriverConfig::from_cli(&cli), Err(CliError::EmptyCode)));
    }

    #[test]
    fn test_driver_config_keeps_codes_verbatim() {
        let cli = Cli::parse_from(["airstatus", "dfw", "SFO"]);
        let config = DriverConfig::from_cli(&cli).unwrap();
        assert_eq!(config.codes, vec!["dfw", "SFO"]);
    }
}
