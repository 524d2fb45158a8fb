use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the cachefront binary.
#[derive(Debug, Parser)]
#[command(name = "cachefront", version, about = "Read-through HTTP response cache")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "CACHEFRONT_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Install, activate and run the caching proxy.
    Serve(Box<ServeArgs>),
    /// Delete every cache namespace, as activation does, and exit.
    Purge(StoreArgs),
    /// List cache namespaces and exit.
    Namespaces(StoreArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct StoreArgs {
    #[command(flatten)]
    pub cache: CacheOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CacheOverrides {
    /// Override the storage backend (memory|disk).
    #[arg(long = "cache-backend", value_name = "BACKEND")]
    pub cache_backend: Option<String>,

    /// Override the disk backend directory.
    #[arg(long = "cache-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub cache_dir: Option<PathBuf>,

    /// Override the memory backend namespace limit (0 = unbounded).
    #[arg(long = "cache-max-namespaces", value_name = "COUNT")]
    pub cache_max_namespaces: Option<usize>,

    /// Override the namespace layout (per_url|shared).
    #[arg(long = "cache-namespace", value_name = "MODE")]
    pub cache_namespace: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub cache: CacheOverrides,

    /// Override the listener host.
    #[arg(long = "listen-host", value_name = "HOST")]
    pub listen_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "listen-port", value_name = "PORT")]
    pub listen_port: Option<u16>,

    /// Override the maximum accepted request body in bytes.
    #[arg(long = "max-body-bytes", value_name = "BYTES")]
    pub max_body_bytes: Option<u64>,

    /// Override the origin base URL.
    #[arg(long = "origin-url", value_name = "URL", value_hint = ValueHint::Url)]
    pub origin_url: Option<String>,

    /// Override the origin request timeout.
    #[arg(long = "origin-timeout-seconds", value_name = "SECONDS")]
    pub origin_timeout_seconds: Option<u64>,

    /// Override the number of attempts per origin request.
    #[arg(long = "origin-retry-attempts", value_name = "COUNT")]
    pub origin_retry_attempts: Option<u32>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}
