//! Configuration layer: typed settings with layered precedence (file → env).
//!
//! Sources, lowest precedence first:
//!
//! 1. `config/portico.{toml,yaml,json}` in the working directory (optional)
//! 2. the file named by `PORTICO_CONFIG_FILE` (required when set)
//! 3. environment variables `PORTICO__<SECTION>__<KEY>`, e.g.
//!    `PORTICO__CACHE__TTL=90s` or `PORTICO__LOAD_BALANCER__BACKENDS=a:80,b:80`
//!
//! The merged raw settings are validated once into an immutable [`ServerConfig`].

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use portico_core::BackendAddress;
use portico_store::StoreConfig;
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_CONFIG_BASENAME: &str = "config/portico";
const CONFIG_FILE_ENV: &str = "PORTICO_CONFIG_FILE";
const ENV_PREFIX: &str = "PORTICO";

const DEFAULT_HTTP_PORT: u16 = 80;
const DEFAULT_HTTPS_PORT: u16 = 443;
const DEFAULT_BALANCER_PORT: u16 = 81;
const DEFAULT_KEEP_ALIVE_SECS: u64 = 75;
const DEFAULT_MAX_CONNECTIONS: usize = 1000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 15;
const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
const DEFAULT_INVALIDATION_INTERVAL_SECS: u64 = 3600;
const DEFAULT_FOLLOWER_WAIT_SECS: u64 = 5;
const DEFAULT_ORIGIN_TIMEOUT_SECS: u64 = 5;
const DEFAULT_ORIGIN_ROOT: &str = "public";
const DEFAULT_BACKENDS: [&str; 3] = ["server1:80", "server2:80", "server3:80"];

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl SettingsError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Immutable configuration snapshot loaded once at boot.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listener: ListenerSettings,
    pub cache: CacheSettings,
    pub origin: OriginSettings,
    pub load_balancer: LoadBalancerSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct ListenerSettings {
    pub host: IpAddr,
    pub http_port: u16,
    pub https: Option<TlsSettings>,
    pub keep_alive: Duration,
    pub max_connections: usize,
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl ListenerSettings {
    /// Address of the plain HTTP listener.
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.http_port)
    }
}

/// Externally provisioned certificate material for the HTTPS listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    pub port: u16,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub store: StoreConfig,
    pub ttl: Duration,
    pub follower_wait: Duration,
    pub invalidation_interval: Duration,
    /// Mounts `DELETE /_portico/cache[/{path}]` on the cache listeners.
    pub admin_invalidation: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginSettings {
    /// Serve files from a local directory.
    Static { root: PathBuf },
    /// Fetch from an upstream HTTP service.
    Upstream { base_url: String, timeout: Duration },
}

#[derive(Debug, Clone)]
pub struct LoadBalancerSettings {
    pub enabled: bool,
    pub port: u16,
    pub backends: Vec<BackendAddress>,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl ServerConfig {
    /// Loads settings from the default file, `$PORTICO_CONFIG_FILE` and the environment.
    pub fn load() -> Result<Self, SettingsError> {
        let explicit = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);
        Self::load_from(explicit.as_deref())
    }

    /// Loads settings using `config_file` as the explicit configuration file.
    pub fn load_from(config_file: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder =
            Config::builder().add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false));

        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        Self::from_builder(builder.add_source(environment()))
    }

    /// Parses settings from an inline TOML document, without environment overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self, SettingsError> {
        Self::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, SettingsError> {
        let raw: RawSettings = builder.build()?.try_deserialize()?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Self, SettingsError> {
        let listener = raw.server.into_settings()?;
        let cache = raw.cache.into_settings()?;
        let origin = raw.origin.into_settings()?;
        let load_balancer = raw.load_balancer.into_settings()?;

        let mut ports = vec![("server.http_port", listener.http_port)];
        if let Some(tls) = &listener.https {
            ports.push(("server.https_port", tls.port));
        }
        if load_balancer.enabled {
            ports.push(("load_balancer.port", load_balancer.port));
        }
        for (i, (key, port)) in ports.iter().enumerate() {
            if *port != 0 && ports[..i].iter().any(|(_, other)| other == port) {
                return Err(SettingsError::invalid(
                    *key,
                    format!("port {} is already used by another listener", port),
                ));
            }
        }

        Ok(Self {
            listener,
            cache,
            origin,
            load_balancer,
            logging: LoggingSettings {
                level: raw.logging.level,
                format: raw.logging.format,
            },
        })
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("load_balancer.backends")
}

fn require_positive(key: &'static str, value: Duration) -> Result<Duration, SettingsError> {
    if value.is_zero() {
        Err(SettingsError::invalid(key, "must be greater than zero"))
    } else {
        Ok(value)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    cache: RawCacheSettings,
    origin: RawOriginSettings,
    load_balancer: RawLoadBalancerSettings,
    logging: RawLoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawServerSettings {
    host: IpAddr,
    http_port: u16,
    https_port: u16,
    tls_cert_path: Option<PathBuf>,
    tls_key_path: Option<PathBuf>,
    #[serde(with = "humantime_serde")]
    keep_alive: Duration,
    max_connections: usize,
    #[serde(with = "humantime_serde")]
    request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    shutdown_grace: Duration,
}

impl Default for RawServerSettings {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            http_port: DEFAULT_HTTP_PORT,
            https_port: DEFAULT_HTTPS_PORT,
            tls_cert_path: None,
            tls_key_path: None,
            keep_alive: Duration::from_secs(DEFAULT_KEEP_ALIVE_SECS),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }
}

impl RawServerSettings {
    fn into_settings(self) -> Result<ListenerSettings, SettingsError> {
        let https = match (self.tls_cert_path, self.tls_key_path) {
            (Some(cert_path), Some(key_path)) => Some(TlsSettings {
                port: self.https_port,
                cert_path,
                key_path,
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(SettingsError::invalid(
                    "server.tls_key_path",
                    "required when server.tls_cert_path is set",
                ));
            },
            (None, Some(_)) => {
                return Err(SettingsError::invalid(
                    "server.tls_cert_path",
                    "required when server.tls_key_path is set",
                ));
            },
        };

        if self.max_connections == 0 {
            return Err(SettingsError::invalid(
                "server.max_connections",
                "must be at least 1",
            ));
        }

        Ok(ListenerSettings {
            host: self.host,
            http_port: self.http_port,
            https,
            keep_alive: require_positive("server.keep_alive", self.keep_alive)?,
            max_connections: self.max_connections,
            request_timeout: require_positive("server.request_timeout", self.request_timeout)?,
            shutdown_grace: self.shutdown_grace,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawCacheSettings {
    store: StoreConfig,
    #[serde(with = "humantime_serde")]
    ttl: Duration,
    #[serde(with = "humantime_serde")]
    follower_wait: Duration,
    #[serde(with = "humantime_serde")]
    invalidation_interval: Duration,
    admin_invalidation: bool,
}

impl Default for RawCacheSettings {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            follower_wait: Duration::from_secs(DEFAULT_FOLLOWER_WAIT_SECS),
            invalidation_interval: Duration::from_secs(DEFAULT_INVALIDATION_INTERVAL_SECS),
            admin_invalidation: false,
        }
    }
}

impl RawCacheSettings {
    fn into_settings(self) -> Result<CacheSettings, SettingsError> {
        Ok(CacheSettings {
            store: self.store,
            ttl: require_positive("cache.ttl", self.ttl)?,
            follower_wait: require_positive("cache.follower_wait", self.follower_wait)?,
            invalidation_interval: require_positive(
                "cache.invalidation_interval",
                self.invalidation_interval,
            )?,
            admin_invalidation: self.admin_invalidation,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
enum RawOriginKind {
    #[default]
    Static,
    Upstream,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawOriginSettings {
    kind: RawOriginKind,
    root: PathBuf,
    base_url: Option<String>,
    #[serde(with = "humantime_serde")]
    timeout: Duration,
}

impl Default for RawOriginSettings {
    fn default() -> Self {
        Self {
            kind: RawOriginKind::default(),
            root: PathBuf::from(DEFAULT_ORIGIN_ROOT),
            base_url: None,
            timeout: Duration::from_secs(DEFAULT_ORIGIN_TIMEOUT_SECS),
        }
    }
}

impl RawOriginSettings {
    fn into_settings(self) -> Result<OriginSettings, SettingsError> {
        match self.kind {
            RawOriginKind::Static => Ok(OriginSettings::Static { root: self.root }),
            RawOriginKind::Upstream => {
                let base_url = self
                    .base_url
                    .filter(|url| !url.trim().is_empty())
                    .ok_or_else(|| {
                        SettingsError::invalid(
                            "origin.base_url",
                            "required when origin.kind = \"upstream\"",
                        )
                    })?;
                if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                    return Err(SettingsError::invalid(
                        "origin.base_url",
                        "must start with http:// or https://",
                    ));
                }
                Ok(OriginSettings::Upstream {
                    base_url,
                    timeout: require_positive("origin.timeout", self.timeout)?,
                })
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawLoadBalancerSettings {
    enabled: bool,
    port: u16,
    backends: Vec<String>,
    #[serde(with = "humantime_serde")]
    connect_timeout: Duration,
}

impl Default for RawLoadBalancerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            port: DEFAULT_BALANCER_PORT,
            backends: DEFAULT_BACKENDS.iter().map(|s| s.to_string()).collect(),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

impl RawLoadBalancerSettings {
    fn into_settings(self) -> Result<LoadBalancerSettings, SettingsError> {
        let backends = self
            .backends
            .iter()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| raw.parse::<BackendAddress>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SettingsError::invalid("load_balancer.backends", e.to_string()))?;

        // Un pool vacio no es fatal para el proceso: el router lo reporta.
        Ok(LoadBalancerSettings {
            enabled: self.enabled,
            port: self.port,
            backends,
            connect_timeout: require_positive(
                "load_balancer.connect_timeout",
                self.connect_timeout,
            )?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawLoggingSettings {
    level: String,
    format: LogFormat,
}

impl Default for RawLoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
