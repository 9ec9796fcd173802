use std::env;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

/// Defines the source of a config error.
#[derive(Debug)]
enum ConfigErrorSource {
    /// An error occurring independently.
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating from a single configuration value.
    Field(&'static str),
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
    inner: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            source: ConfigErrorSource::None,
            kind,
            inner: None,
        }
    }

    #[inline]
    fn wrap<E>(inner: E, kind: ConfigErrorKind) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            source: ConfigErrorSource::None,
            kind,
            inner: Some(Box::new(inner)),
        }
    }

    #[inline]
    fn file<P: AsRef<Path>>(mut self, p: P) -> Self {
        self.source = ConfigErrorSource::File(p.as_ref().to_path_buf());
        self
    }

    #[inline]
    fn field(mut self, name: &'static str) -> Self {
        self.source = ConfigErrorSource::Field(name);
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            ConfigErrorSource::None => self.kind.fmt(f),
            ConfigErrorSource::File(file_name) => {
                write!(f, "{} (file {})", self.kind, file_name.display())
            }
            ConfigErrorSource::Field(name) => write!(f, "{} (field {})", self.kind, name),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

/// Indicates config related errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Parsing JSON failed.
    #[error("could not parse json config file")]
    BadJson,
    /// Invalid config value.
    #[error("invalid config value")]
    InvalidValue,
}

/// A configuration file stored as YAML within the config folder.
trait ConfigObject: DeserializeOwned + Serialize {
    /// The basename of the config file.
    fn name() -> &'static str;

    /// The full filename of the config file, including the file extension.
    fn path(base: &Path) -> PathBuf {
        base.join(format!("{}.yml", Self::name()))
    }

    /// Loads the config file from a file within the given directory location.
    fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(base);

        let f = fs::File::open(&path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(&path))?;

        serde_yaml::from_reader(io::BufReader::new(f))
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(&path))
    }
}

/// Network settings of the collector's HTTP server.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Collector {
    /// The host the collector should bind to (network interface).
    host: IpAddr,
    /// The port to bind for the HTTP server.
    port: u16,
}

impl Default for Collector {
    fn default() -> Self {
        Collector {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 8080,
        }
    }
}

/// Controls where and how often allow-lists are fetched.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Upstream {
    /// Base URL of the configuration endpoint serving `manifest.json` and the per-app
    /// `metrics.json` files. Required.
    url: Option<Url>,
    /// Seconds between two refresh cycles.
    refresh_interval: u64,
    /// Upper bound for a single refresh cycle in seconds, including all per-app fetches.
    refresh_timeout: u64,
    /// Number of per-app allow-lists fetched concurrently.
    max_concurrent_fetches: usize,
}

impl Default for Upstream {
    fn default() -> Self {
        Upstream {
            url: None,
            refresh_interval: 300,
            refresh_timeout: 60,
            max_concurrent_fetches: 8,
        }
    }
}

/// Controls HTTP requests to the configuration endpoint.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Http {
    /// Timeout for upstream requests in seconds.
    ///
    /// This covers the entire request including reading the response body.
    timeout: u32,
    /// Timeout for establishing connections with the upstream in seconds.
    connection_timeout: u32,
}

impl Default for Http {
    fn default() -> Self {
        Http {
            timeout: 5,
            connection_timeout: 3,
        }
    }
}

/// Controls various limits.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Limits {
    /// The maximum body size of a metric report in bytes.
    max_report_size: usize,
    /// The maximum size of a manifest or allow-list response in bytes.
    max_upstream_response_size: usize,
    /// Seconds to wait for in-flight requests during graceful shutdown.
    shutdown_timeout: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_report_size: 2 * 1024 * 1024,
            max_upstream_response_size: 10 * 1024 * 1024,
            shutdown_timeout: 10,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct ConfigValues {
    #[serde(default)]
    collector: Collector,
    #[serde(default)]
    upstream: Upstream,
    #[serde(default)]
    http: Http,
    #[serde(default)]
    limits: Limits,
    #[serde(default)]
    logging: tally_log::LogConfig,
}

impl ConfigObject for ConfigValues {
    fn name() -> &'static str {
        "config"
    }
}

impl ConfigValues {
    /// Rejects values that would stall the refresh service and returns the upstream URL.
    fn validate(&self) -> Result<Url, ConfigError> {
        let Some(url) = self.upstream.url.clone() else {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("upstream.url"));
        };

        if self.upstream.refresh_interval == 0 {
            return Err(
                ConfigError::new(ConfigErrorKind::InvalidValue).field("upstream.refresh_interval")
            );
        }

        if self.upstream.refresh_timeout == 0 {
            return Err(
                ConfigError::new(ConfigErrorKind::InvalidValue).field("upstream.refresh_timeout")
            );
        }

        if self.http.timeout == 0 {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("http.timeout"));
        }

        if self.upstream.max_concurrent_fetches == 0 {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue)
                .field("upstream.max_concurrent_fetches"));
        }

        Ok(url)
    }
}

/// Configuration of the Tally collector.
pub struct Config {
    values: ConfigValues,
    upstream_url: Url,
    path: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("values", &self.values)
            .finish()
    }
}

impl Config {
    /// Loads a config from a given config folder.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = env::current_dir()
            .map(|x| x.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        let values = ConfigValues::load(&path)?;
        let upstream_url = values.validate()?;

        Ok(Config {
            values,
            upstream_url,
            path,
        })
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Config, ConfigError> {
        let values: ConfigValues = serde_json::from_value(value)
            .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadJson))?;
        let upstream_url = values.validate()?;

        Ok(Config {
            values,
            upstream_url,
            path: PathBuf::new(),
        })
    }

    /// The config folder this config was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the socket address the collector binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        (self.values.collector.host, self.values.collector.port).into()
    }

    /// Returns the base URL of the configuration endpoint.
    pub fn upstream_url(&self) -> &Url {
        &self.upstream_url
    }

    /// Returns the interval between two allow-list refresh cycles.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.values.upstream.refresh_interval)
    }

    /// Returns the deadline for a single refresh cycle.
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.values.upstream.refresh_timeout)
    }

    /// Returns the number of allow-lists fetched concurrently during a refresh.
    pub fn max_concurrent_fetches(&self) -> usize {
        self.values.upstream.max_concurrent_fetches
    }

    /// Returns the timeout for all upstream HTTP requests.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.values.http.timeout.into())
    }

    /// Returns the connection timeout for all upstream HTTP requests.
    pub fn http_connection_timeout(&self) -> Duration {
        Duration::from_secs(self.values.http.connection_timeout.into())
    }

    /// Returns the maximum body size of a metric report in bytes.
    pub fn max_report_size(&self) -> usize {
        self.values.limits.max_report_size
    }

    /// Returns the maximum size of a response from the configuration endpoint in bytes.
    pub fn max_upstream_response_size(&self) -> usize {
        self.values.limits.max_upstream_response_size
    }

    /// Returns the grace period for in-flight requests on shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.values.limits.shutdown_timeout)
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &tally_log::LogConfig {
        &self.values.logging
    }
}
