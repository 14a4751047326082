//! Configuration types for tracklift

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Catalogue source configuration (endpoint, paging, HTTP behavior)
///
/// Groups settings for the paginated discovery source.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the catalogue service (page N is fetched at `{base_url}?page={N}`)
    #[serde(default)]
    pub base_url: String,

    /// Number of listings a full page carries; a shorter page signals end of
    /// catalogue (default: 10)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Page number scanning starts and restarts from (default: 1)
    #[serde(default = "default_start_page")]
    pub start_page: u32,

    /// HTTP request timeout for page fetches (default: 10s)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent to the catalogue service
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            page_size: default_page_size(),
            start_page: default_start_page(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Download behavior configuration (scratch space, retries, tool tuning)
///
/// Groups settings for how assets are fetched and staged on disk.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Scratch directory for per-unit download folders (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Download attempts per unit before giving up (default: 3, must be ≥ 1)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wall-clock limit for one download attempt; the tool is killed on
    /// expiry (default: 300s)
    #[serde(default = "default_attempt_timeout", with = "duration_serde")]
    pub attempt_timeout: Duration,

    /// Connections the fetch tool may open per server (default: 5)
    #[serde(default = "default_connections_per_server")]
    pub connections_per_server: u32,

    /// Minimum split size passed to the fetch tool (default: "1M")
    #[serde(default = "default_min_split_size")]
    pub min_split_size: String,

    /// Per-connection timeout passed to the fetch tool (default: 30s)
    #[serde(default = "default_tool_timeout", with = "duration_serde")]
    pub tool_timeout: Duration,

    /// Connect timeout passed to the fetch tool (default: 10s)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Concurrent units in flight within one listing (default: 4, must be ≥ 1)
    #[serde(default = "default_max_concurrent_units")]
    pub max_concurrent_units: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            max_attempts: default_max_attempts(),
            attempt_timeout: default_attempt_timeout(),
            connections_per_server: default_connections_per_server(),
            min_split_size: default_min_split_size(),
            tool_timeout: default_tool_timeout(),
            connect_timeout: default_connect_timeout(),
            max_concurrent_units: default_max_concurrent_units(),
        }
    }
}

/// External tool paths (fetch tool, transcoder)
///
/// Groups settings for external binaries.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the aria2c executable (auto-detected if None)
    #[serde(default)]
    pub aria2c_path: Option<PathBuf>,

    /// Path to the ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Wall-clock limit for one thumbnail derivation (default: 60s)
    #[serde(default = "default_transcode_timeout", with = "duration_serde")]
    pub transcode_timeout: Duration,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            aria2c_path: None,
            ffmpeg_path: None,
            search_path: true,
            transcode_timeout: default_transcode_timeout(),
        }
    }
}

/// Messaging sink configuration (endpoint, target channel, timeouts)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Base URL of the sink API (publishes with POST to `{endpoint}/sendPhoto`
    /// and `{endpoint}/sendDocument`)
    #[serde(default)]
    pub endpoint: String,

    /// Channel identifier assets are published to
    #[serde(default)]
    pub channel: i64,

    /// HTTP timeout for one publish call (default: 30s)
    #[serde(default = "default_publish_timeout", with = "duration_serde")]
    pub publish_timeout: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            channel: 0,
            publish_timeout: default_publish_timeout(),
        }
    }
}

/// Data storage configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database path for the dedup store (default: "tracklift.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Scan loop pacing configuration (cooldowns, stall bound)
///
/// Groups settings for the page loop.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Sleep after the end of the catalogue before restarting at the first
    /// page (default: 1 hour)
    #[serde(default = "default_catalogue_cooldown", with = "duration_serde")]
    pub catalogue_cooldown: Duration,

    /// Sleep after a page-level error before retrying the same page
    /// (default: 1 minute)
    #[serde(default = "default_error_cooldown", with = "duration_serde")]
    pub error_cooldown: Duration,

    /// Consecutive failures of one page before it is skipped for this cycle
    /// (default: 5, must be ≥ 1)
    #[serde(default = "default_max_page_retries")]
    pub max_page_retries: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            catalogue_cooldown: default_catalogue_cooldown(),
            error_cooldown: default_error_cooldown(),
            max_page_retries: default_max_page_retries(),
        }
    }
}

/// Main configuration for CatalogMirror
///
/// Fields are organized into logical sub-configs:
/// - [`source`](SourceConfig) — catalogue endpoint and paging
/// - [`fetch`](FetchConfig) — scratch space, retries, tool tuning
/// - [`tools`](ToolsConfig) — external binary paths
/// - [`sink`](SinkConfig) — publish endpoint and target channel
/// - [`persistence`](PersistenceConfig) — dedup database
/// - [`scan`](ScanConfig) — page-loop pacing
///
/// Fetch, tools, and scan fields are flattened for a flat JSON/TOML surface;
/// source, sink, and persistence stay nested since they describe endpoints.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Catalogue source settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Download behavior settings
    #[serde(flatten)]
    pub fetch: FetchConfig,

    /// External tool paths
    #[serde(flatten)]
    pub tools: ToolsConfig,

    /// Messaging sink settings
    #[serde(default)]
    pub sink: SinkConfig,

    /// Data storage settings
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Scan loop pacing
    #[serde(flatten)]
    pub scan: ScanConfig,
}

// Convenience accessors for the paths used throughout the pipeline.
impl Config {
    /// Scratch directory for per-unit download folders
    pub fn temp_dir(&self) -> &PathBuf {
        &self.fetch.temp_dir
    }

    /// Dedup database path
    pub fn database_path(&self) -> &PathBuf {
        &self.persistence.database_path
    }

    /// Reject configurations the pipeline cannot run with
    ///
    /// Called by [`crate::CatalogMirror::new`] before any collaborator is
    /// constructed, so a bad config fails fast instead of mid-scan.
    pub fn validate(&self) -> crate::Result<()> {
        if self.source.base_url.is_empty() {
            return Err(config_error("source base URL is empty", "source.base_url"));
        }
        if url::Url::parse(&self.source.base_url).is_err() {
            return Err(config_error(
                "source base URL is not a valid URL",
                "source.base_url",
            ));
        }
        if self.source.page_size == 0 {
            return Err(config_error("page size must be ≥ 1", "source.page_size"));
        }
        if self.fetch.max_attempts == 0 {
            return Err(config_error(
                "download attempts must be ≥ 1",
                "fetch.max_attempts",
            ));
        }
        if self.fetch.max_concurrent_units == 0 {
            return Err(config_error(
                "concurrent units must be ≥ 1",
                "fetch.max_concurrent_units",
            ));
        }
        if self.scan.max_page_retries == 0 {
            return Err(config_error(
                "page retries must be ≥ 1",
                "scan.max_page_retries",
            ));
        }
        if self.sink.endpoint.is_empty() {
            return Err(config_error("sink endpoint is empty", "sink.endpoint"));
        }
        if self.sink.channel == 0 {
            return Err(config_error("sink channel is not set", "sink.channel"));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> crate::Error {
    crate::Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

// Default value functions
fn default_page_size() -> usize {
    10
}

fn default_start_page() -> u32 {
    1
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_user_agent() -> String {
    concat!("tracklift/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_max_attempts() -> u32 {
    3
}

fn default_attempt_timeout() -> Duration {
    Duration::from_secs(300) // 5 minutes
}

fn default_connections_per_server() -> u32 {
    5
}

fn default_min_split_size() -> String {
    "1M".to_string()
}

fn default_tool_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_concurrent_units() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_transcode_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_publish_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("tracklift.db")
}

fn default_catalogue_cooldown() -> Duration {
    Duration::from_secs(60 * 60) // 1 hour
}

fn default_error_cooldown() -> Duration {
    Duration::from_secs(60)
}

fn default_max_page_retries() -> u32 {
    5
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
