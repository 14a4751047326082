//! Asset download via an external fetch tool (aria2c)

use crate::config::FetchConfig;
use crate::error::FetchError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

/// A downloaded asset staged on local disk
///
/// Ephemeral: the containing directory is owned by the unit of work that
/// requested the download and is removed when that unit finishes.
#[must_use]
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    /// Where the file landed; always under the requested destination directory
    pub path: PathBuf,
    /// File size in bytes; always non-zero
    pub size_bytes: u64,
}

/// Interface for downloading one URL into a destination directory
///
/// Implementations own their retry policy: a call returns either a usable
/// asset or the final, exhausted failure. Tests substitute scripted fakes.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Download `url` into `dest_dir`, creating the directory if needed
    ///
    /// `file_name` forces the output filename when given; otherwise the
    /// tool's own naming is trusted. On success the returned asset exists,
    /// is non-empty, and lives under `dest_dir`.
    async fn fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        file_name: Option<&str>,
    ) -> Result<FetchedAsset, FetchError>;
}

/// How a single attempt failed; `Unavailable` aborts the attempt loop.
enum AttemptFailure {
    Tool(String),
    Unavailable(String),
}

/// Fetcher backed by the external `aria2c` binary
///
/// Each attempt is one subprocess invocation bounded by the configured
/// attempt timeout; the child is killed if the timeout expires. Attempts are
/// sequential with no added backoff (the tool carries its own connection
/// timeouts).
///
/// # Examples
///
/// ```no_run
/// use tracklift::config::FetchConfig;
/// use tracklift::fetcher::{Aria2cFetcher, AssetFetcher};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = Aria2cFetcher::from_path(FetchConfig::default())
///     .expect("aria2c not found in PATH");
///
/// let asset = fetcher
///     .fetch("https://cdn.example.com/song.mp3", Path::new("temp/unit-1"), None)
///     .await?;
/// println!("downloaded {} bytes", asset.size_bytes);
/// # Ok(())
/// # }
/// ```
pub struct Aria2cFetcher {
    binary_path: PathBuf,
    config: FetchConfig,
}

impl Aria2cFetcher {
    /// Create a fetcher with an explicit binary path
    pub fn new(binary_path: PathBuf, config: FetchConfig) -> Self {
        Self {
            binary_path,
            config,
        }
    }

    /// Attempt to find aria2c in PATH
    ///
    /// Returns `None` when the binary is not installed.
    pub fn from_path(config: FetchConfig) -> Option<Self> {
        which::which("aria2c").ok().map(|p| Self::new(p, config))
    }

    async fn run_attempt(
        &self,
        url: &str,
        dest_dir: &Path,
        file_name: Option<&str>,
    ) -> Result<FetchedAsset, AttemptFailure> {
        let mut command = Command::new(&self.binary_path);
        command
            .arg(url)
            .arg("-d")
            .arg(dest_dir)
            .arg("--max-concurrent-downloads=1")
            .arg(format!(
                "--max-connection-per-server={}",
                self.config.connections_per_server
            ))
            .arg(format!("--min-split-size={}", self.config.min_split_size))
            .arg("--allow-overwrite=true")
            .arg(format!("--timeout={}", self.config.tool_timeout.as_secs()))
            .arg(format!(
                "--connect-timeout={}",
                self.config.connect_timeout.as_secs()
            ))
            .kill_on_drop(true);
        if let Some(name) = file_name {
            command.arg("-o").arg(name);
        }

        let output = match tokio::time::timeout(self.config.attempt_timeout, command.output())
            .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AttemptFailure::Unavailable(format!(
                    "{} not found",
                    self.binary_path.display()
                )));
            }
            Ok(Err(e)) => {
                return Err(AttemptFailure::Tool(format!(
                    "failed to execute {}: {}",
                    self.binary_path.display(),
                    e
                )));
            }
            Err(_) => {
                return Err(AttemptFailure::Tool(format!(
                    "attempt timed out after {}s",
                    self.config.attempt_timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AttemptFailure::Tool(format!(
                "{}: {}",
                output.status,
                stderr.trim()
            )));
        }

        self.locate_result(dest_dir, file_name).await
    }

    /// Find the downloaded file and check it is non-empty.
    ///
    /// `.aria2` control files left by interrupted runs are never the result.
    async fn locate_result(
        &self,
        dest_dir: &Path,
        file_name: Option<&str>,
    ) -> Result<FetchedAsset, AttemptFailure> {
        if let Some(name) = file_name {
            let path = dest_dir.join(name);
            return match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.len() > 0 => Ok(FetchedAsset {
                    path,
                    size_bytes: meta.len(),
                }),
                Ok(_) => Err(AttemptFailure::Tool(format!(
                    "result file {} is empty",
                    path.display()
                ))),
                Err(_) => Err(AttemptFailure::Tool(format!(
                    "no result file at {}",
                    path.display()
                ))),
            };
        }

        let mut entries = tokio::fs::read_dir(dest_dir)
            .await
            .map_err(|e| AttemptFailure::Tool(format!("cannot read destination: {e}")))?;
        let mut found: Option<(PathBuf, u64)> = None;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AttemptFailure::Tool(format!("cannot read destination: {e}")))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "aria2") {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(_) => continue,
            };
            if !meta.is_file() {
                continue;
            }
            found = Some((path, meta.len()));
            break;
        }

        match found {
            Some((path, len)) if len > 0 => Ok(FetchedAsset {
                path,
                size_bytes: len,
            }),
            Some((path, _)) => Err(AttemptFailure::Tool(format!(
                "result file {} is empty",
                path.display()
            ))),
            None => Err(AttemptFailure::Tool(
                "destination directory is empty".to_string(),
            )),
        }
    }
}

#[async_trait]
impl AssetFetcher for Aria2cFetcher {
    async fn fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        file_name: Option<&str>,
    ) -> Result<FetchedAsset, FetchError> {
        url::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| FetchError::Destination {
                dir: dest_dir.to_path_buf(),
                reason: e.to_string(),
            })?;

        let mut last_error = String::new();
        for attempt in 1..=self.config.max_attempts {
            debug!(url = %url, attempt, "starting download attempt");
            match self.run_attempt(url, dest_dir, file_name).await {
                Ok(asset) => {
                    debug!(url = %url, attempt, size = asset.size_bytes, "download succeeded");
                    return Ok(asset);
                }
                Err(AttemptFailure::Unavailable(reason)) => {
                    return Err(FetchError::ToolUnavailable(reason));
                }
                Err(AttemptFailure::Tool(reason)) => {
                    warn!(url = %url, attempt, error = %reason, "download attempt failed");
                    last_error = reason;
                }
            }
        }

        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts: self.config.max_attempts,
            last_error,
        })
    }
}
