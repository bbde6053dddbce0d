use crate::errors::{ChimeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Layered runtime settings for every scheduler role.
///
/// Sources are applied in order of increasing precedence: built-in defaults,
/// an optional config file (TOML/YAML/JSON, picked by extension), environment
/// variables (`CHIME_` prefix, `__` as the nesting separator, `.env` files
/// honored), and finally programmatic overrides, the hook a CLI layer uses.
///
/// # Example
///
/// ```rust,no_run
/// use chime::Settings;
///
/// let settings = Settings::load(None, &[("worker.count".into(), "8".into())])?;
/// assert_eq!(settings.worker.count, 8);
/// # Ok::<(), chime::ChimeError>(())
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub index: IndexSettings,
    #[serde(default)]
    pub prequeuer: PrequeuerSettings,
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub log: LogSettings,
}

/// Durable document store endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_uri")]
    pub uri: String,
    #[serde(default = "default_store_database")]
    pub database: String,
}

/// Priority index endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    #[serde(default = "default_index_host")]
    pub host: String,
    #[serde(default = "default_index_port")]
    pub port: u16,
}

impl IndexSettings {
    /// Connection URL for the Redis-backed index.
    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

/// Pre-queuer tick cadence and materialization window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrequeuerSettings {
    #[serde(default = "default_ticker_interval_seconds")]
    pub ticker_interval_seconds: u64,
    #[serde(default = "default_event_timeframe_minutes")]
    pub event_timeframe_minutes: u64,
}

impl PrequeuerSettings {
    pub fn ticker_interval(&self) -> Duration {
        Duration::from_secs(self.ticker_interval_seconds)
    }

    pub fn event_timeframe(&self) -> Duration {
        Duration::from_secs(self.event_timeframe_minutes * 60)
    }
}

/// Worker pool sizing and callback retry limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    #[serde(default = "default_worker_count")]
    pub count: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Logging verbosity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Settings {
    /// Load settings from all layers and validate the result.
    ///
    /// `path` points at an explicit config file; when `None`, no file layer is
    /// read. `overrides` are `(key, value)` pairs in dotted-key form, applied
    /// last.
    pub fn load(path: Option<&Path>, overrides: &[(String, String)]) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder()
            .set_default("store.uri", default_store_uri())?
            .set_default("store.database", default_store_database())?
            .set_default("index.host", default_index_host())?
            .set_default("index.port", default_index_port() as i64)?
            .set_default(
                "prequeuer.ticker_interval_seconds",
                default_ticker_interval_seconds() as i64,
            )?
            .set_default(
                "prequeuer.event_timeframe_minutes",
                default_event_timeframe_minutes() as i64,
            )?
            .set_default("worker.count", default_worker_count() as i64)?
            .set_default("worker.max_retries", default_max_retries() as i64)?
            .set_default("log.level", default_log_level())?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CHIME")
                .separator("__")
                .try_parsing(true),
        );

        for (key, value) in overrides {
            builder = builder.set_override(key.as_str(), value.as_str())?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Enforce the contract constraints between the configured values.
    pub fn validate(&self) -> Result<()> {
        if self.prequeuer.ticker_interval_seconds == 0 {
            return Err(ChimeError::Config(
                "prequeuer.ticker_interval_seconds must be greater than zero".to_string(),
            ));
        }
        if self.prequeuer.event_timeframe_minutes == 0 {
            return Err(ChimeError::Config(
                "prequeuer.event_timeframe_minutes must be greater than zero".to_string(),
            ));
        }
        if self.worker.count == 0 {
            return Err(ChimeError::Config(
                "worker.count must be greater than zero".to_string(),
            ));
        }
        if self.worker.max_retries == 0 {
            return Err(ChimeError::Config(
                "worker.max_retries must be greater than zero".to_string(),
            ));
        }

        // Coverage requires the window to outlast a tick; twice a tick absorbs
        // one missed tick.
        let tick = self.prequeuer.ticker_interval();
        let window = self.prequeuer.event_timeframe();
        if window <= tick {
            return Err(ChimeError::Config(format!(
                "prequeuer.event_timeframe_minutes ({:?}) must exceed prequeuer.ticker_interval_seconds ({:?})",
                window, tick
            )));
        }
        if window < tick * 2 {
            tracing::warn!(
                window_seconds = window.as_secs(),
                tick_seconds = tick.as_secs(),
                "event timeframe is below twice the ticker interval; a missed tick can leave coverage gaps"
            );
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store: StoreSettings::default(),
            index: IndexSettings::default(),
            prequeuer: PrequeuerSettings::default(),
            worker: WorkerSettings::default(),
            log: LogSettings::default(),
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            uri: default_store_uri(),
            database: default_store_database(),
        }
    }
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            host: default_index_host(),
            port: default_index_port(),
        }
    }
}

impl Default for PrequeuerSettings {
    fn default() -> Self {
        Self {
            ticker_interval_seconds: default_ticker_interval_seconds(),
            event_timeframe_minutes: default_event_timeframe_minutes(),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions for serde
// ---------------------------------------------------------------------------

fn default_store_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_store_database() -> String {
    "chime".to_string()
}

fn default_index_host() -> String {
    "localhost".to_string()
}

fn default_index_port() -> u16 {
    6379
}

fn default_ticker_interval_seconds() -> u64 {
    30
}

fn default_event_timeframe_minutes() -> u64 {
    60
}

fn default_worker_count() -> usize {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}
