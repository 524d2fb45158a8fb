//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::{CacheConfig, NamespaceMode, StorageBackend};

mod cli;

pub use cli::{CacheOverrides, CliArgs, Command, ServeArgs, ServeOverrides, StoreArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "cachefront";
const ENV_PREFIX: &str = "CACHEFRONT";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_RETRY_ATTEMPTS: u32 = 1;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 200;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub origin: OriginSettings,
    pub logging: LoggingSettings,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub max_body_bytes: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct OriginSettings {
    /// Absolute http(s) base URL. Only `serve` needs one.
    pub url: Option<Url>,
    pub timeout: Option<Duration>,
    pub retry_attempts: NonZeroU32,
    pub retry_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

impl OriginSettings {
    pub fn require_url(&self) -> Result<&Url, LoadError> {
        self.url
            .as_ref()
            .ok_or_else(|| LoadError::invalid("origin.url", "must be set to serve"))
    }
}

impl Settings {
    /// Offline store commands only see what a previous process left behind,
    /// which the memory backend never does.
    pub fn require_persistent_cache(&self) -> Result<(), LoadError> {
        match self.cache.backend {
            StorageBackend::Disk => Ok(()),
            StorageBackend::Memory => Err(LoadError::invalid(
                "cache.backend",
                "store commands need `disk`; the memory backend is empty outside `serve`",
            )),
        }
    }

    /// Resolve `cache.precache` paths against the origin.
    pub fn precache_urls(&self) -> Result<Vec<Url>, LoadError> {
        if !self.cache.has_precache() {
            return Ok(Vec::new());
        }
        let origin = self.origin.require_url()?;
        self.cache
            .precache
            .iter()
            .map(|path| {
                origin.join(path).map_err(|err| {
                    LoadError::invalid("cache.precache", format!("`{path}`: {err}"))
                })
            })
            .collect()
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("cache.precache")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Purge(args)) | Some(Command::Namespaces(args)) => {
            raw.apply_cache_overrides(&args.cache)
        }
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    origin: RawOriginSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.listen_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.listen_port {
            self.server.port = Some(port);
        }
        if let Some(limit) = overrides.max_body_bytes {
            self.server.max_body_bytes = Some(limit);
        }
        if let Some(url) = overrides.origin_url.as_ref() {
            self.origin.url = Some(url.clone());
        }
        if let Some(seconds) = overrides.origin_timeout_seconds {
            self.origin.timeout_seconds = Some(seconds);
        }
        if let Some(attempts) = overrides.origin_retry_attempts {
            self.origin.retry_attempts = Some(attempts);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }

        self.apply_cache_overrides(&overrides.cache);
    }

    fn apply_cache_overrides(&mut self, overrides: &CacheOverrides) {
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(dir) = overrides.cache_dir.as_ref() {
            self.cache.directory = Some(dir.clone());
        }
        if let Some(limit) = overrides.cache_max_namespaces {
            self.cache.max_namespaces = Some(limit);
        }
        if let Some(mode) = overrides.cache_namespace.as_ref() {
            self.cache.namespace = Some(mode.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            origin,
            logging,
            cache,
        } = raw;

        let server = build_server_settings(server)?;
        let origin = build_origin_settings(origin)?;
        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;

        Ok(Self {
            server,
            origin,
            logging,
            cache,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let limit = server.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);
    let limit: usize = limit
        .try_into()
        .map_err(|_| LoadError::invalid("server.max_body_bytes", "value exceeds usize"))?;
    let max_body_bytes = NonZeroUsize::new(limit)
        .ok_or_else(|| LoadError::invalid("server.max_body_bytes", "must be greater than zero"))?;

    Ok(ServerSettings {
        addr,
        max_body_bytes,
    })
}

fn build_origin_settings(origin: RawOriginSettings) -> Result<OriginSettings, LoadError> {
    let url = match origin.url {
        Some(value) if !value.trim().is_empty() => Some(parse_origin_url(value.trim())?),
        _ => None,
    };

    let timeout = match origin.timeout_seconds {
        Some(0) => {
            return Err(LoadError::invalid(
                "origin.timeout_seconds",
                "must be greater than zero",
            ));
        }
        Some(seconds) => Some(Duration::from_secs(seconds)),
        None => None,
    };

    let retry_attempts = NonZeroU32::new(origin.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS))
        .ok_or_else(|| LoadError::invalid("origin.retry_attempts", "must be greater than zero"))?;
    let retry_backoff =
        Duration::from_millis(origin.retry_backoff_ms.unwrap_or(DEFAULT_RETRY_BACKOFF_MS));

    Ok(OriginSettings {
        url,
        timeout,
        retry_attempts,
        retry_backoff,
    })
}

fn parse_origin_url(value: &str) -> Result<Url, LoadError> {
    let url = Url::parse(value)
        .map_err(|err| LoadError::invalid("origin.url", format!("`{value}`: {err}")))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        "http" | "https" => Err(LoadError::invalid("origin.url", "must include a host")),
        scheme => Err(LoadError::invalid(
            "origin.url",
            format!("unsupported scheme `{scheme}`"),
        )),
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheConfig, LoadError> {
    let defaults = CacheConfig::default();

    let backend = match cache.backend.as_deref().map(str::trim) {
        None => defaults.backend,
        Some("memory") => StorageBackend::Memory,
        Some("disk") => StorageBackend::Disk,
        Some(other) => {
            return Err(LoadError::invalid(
                "cache.backend",
                format!("unknown backend `{other}` (expected memory or disk)"),
            ));
        }
    };

    let namespace_mode = match cache.namespace.as_deref().map(str::trim) {
        None => defaults.namespace_mode,
        Some("per_url") => NamespaceMode::PerUrl,
        Some("shared") => NamespaceMode::Shared,
        Some(other) => {
            return Err(LoadError::invalid(
                "cache.namespace",
                format!("unknown mode `{other}` (expected per_url or shared)"),
            ));
        }
    };

    let max_namespaces = cache.max_namespaces.unwrap_or(defaults.max_namespaces);
    if max_namespaces > 0 && backend == StorageBackend::Disk {
        return Err(LoadError::invalid(
            "cache.max_namespaces",
            "only supported by the memory backend",
        ));
    }

    let shared_namespace = cache
        .shared_namespace
        .map(|name| name.trim().to_string())
        .unwrap_or(defaults.shared_namespace);
    if shared_namespace.is_empty() {
        return Err(LoadError::invalid(
            "cache.shared_namespace",
            "must not be empty",
        ));
    }

    let directory = cache.directory.unwrap_or(defaults.directory);
    let precache = cache
        .precache
        .unwrap_or_default()
        .into_iter()
        .map(|path| path.trim().to_string())
        .filter(|path| !path.is_empty())
        .collect();

    Ok(CacheConfig {
        backend,
        directory,
        max_namespaces,
        namespace_mode,
        shared_namespace,
        precache,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    max_body_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOriginSettings {
    url: Option<String>,
    timeout_seconds: Option<u64>,
    retry_attempts: Option<u32>,
    retry_backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    backend: Option<String>,
    directory: Option<PathBuf>,
    max_namespaces: Option<usize>,
    namespace: Option<String>,
    shared_namespace: Option<String>,
    precache: Option<Vec<String>>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
