use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::constants::DEFAULT_BATCH_SIZE;
use crate::error::{AnalyticsError, Result};
use crate::pipeline::storage::{InMemoryStore, SqliteStore, VehicleStore};
use crate::pipeline::CsvSource;

const DEFAULT_CONFIG_PATH: &str = "ev_analytics.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(AnalyticsError::Config(format!("unknown store backend '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CsvSourceKind {
    #[default]
    Local,
    Url,
    S3,
}

impl FromStr for CsvSourceKind {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(CsvSourceKind::Local),
            "url" => Ok(CsvSourceKind::Url),
            "s3" => Ok(CsvSourceKind::S3),
            other => Err(AnalyticsError::Config(format!("unknown CSV source '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            database_path: PathBuf::from("data/ev_analytics.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: CsvSourceKind,
    pub local_path: PathBuf,
    pub url: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_key: String,
    pub s3_region: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: CsvSourceKind::Local,
            local_path: PathBuf::from("data/Electric_Vehicle_Population_Data.csv"),
            url: None,
            s3_bucket: None,
            s3_key: "Electric_Vehicle_Population_Data.csv".to_string(),
            s3_region: "us-east-1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus exporter listen address; exporter disabled when unset
    pub addr: Option<String>,
}

/// Application settings: defaults, then the TOML file, then `EV_*` variables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub source: SourceConfig,
    pub api: ApiConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match std::env::var("EV_CONFIG_PATH") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AnalyticsError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay `EV_*` variables read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("EV_STORE_BACKEND") {
            self.store.backend = v.parse()?;
        }
        if let Some(v) = lookup("EV_DATABASE_PATH") {
            self.store.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("EV_CSV_SOURCE") {
            self.source.kind = v.parse()?;
        }
        if let Some(v) = lookup("EV_CSV_PATH") {
            self.source.local_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("EV_CSV_URL") {
            self.source.url = Some(v);
        }
        if let Some(v) = lookup("EV_S3_BUCKET") {
            self.source.s3_bucket = Some(v);
        }
        if let Some(v) = lookup("EV_S3_KEY") {
            self.source.s3_key = v;
        }
        if let Some(v) = lookup("EV_S3_REGION") {
            self.source.s3_region = v;
        }
        if let Some(v) = lookup("EV_API_HOST") {
            self.api.host = v;
        }
        if let Some(v) = lookup("EV_API_PORT") {
            self.api.port = v
                .parse()
                .map_err(|e| AnalyticsError::Config(format!("EV_API_PORT '{v}': {e}")))?;
        }
        if let Some(v) = lookup("EV_BATCH_SIZE") {
            self.pipeline.batch_size = v
                .parse()
                .map_err(|e| AnalyticsError::Config(format!("EV_BATCH_SIZE '{v}': {e}")))?;
        }
        if let Some(v) = lookup("EV_LOG_DIR") {
            self.logging.log_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("EV_METRICS_ADDR") {
            self.metrics.addr = Some(v);
        }
        Ok(())
    }

    pub fn csv_source(&self) -> Result<CsvSource> {
        let source = &self.source;
        match source.kind {
            CsvSourceKind::Local => Ok(CsvSource::Local(source.local_path.clone())),
            CsvSourceKind::Url => source
                .url
                .clone()
                .map(CsvSource::Remote)
                .ok_or_else(|| AnalyticsError::Config("source.url is not set".to_string())),
            CsvSourceKind::S3 => {
                let bucket = source.s3_bucket.as_deref().ok_or_else(|| {
                    AnalyticsError::Config("source.s3_bucket is not set".to_string())
                })?;
                Ok(CsvSource::s3(bucket, &source.s3_key, &source.s3_region))
            }
        }
    }

    pub fn open_store(&self) -> Result<Arc<dyn VehicleStore>> {
        match self.store.backend {
            StoreBackend::Sqlite => Ok(Arc::new(SqliteStore::open(&self.store.database_path)?)),
            StoreBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
        }
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api.host, self.api.port)
            .parse()
            .map_err(|e| AnalyticsError::Config(format!("invalid API address: {e}")))
    }

    pub fn metrics_addr(&self) -> Result<Option<SocketAddr>> {
        self.metrics
            .addr
            .as_deref()
            .map(|addr| {
                addr.parse()
                    .map_err(|e| AnalyticsError::Config(format!("invalid metrics address '{addr}': {e}")))
            })
            .transpose()
    }
}
