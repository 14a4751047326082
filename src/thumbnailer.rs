//! Thumbnail derivation via an external transcode tool (ffmpeg)

use crate::error::TranscodeError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Interface for deriving a thumbnail image from a downloaded asset
///
/// Thumbnail derivation is best-effort: callers absorb failures and publish
/// the asset without a thumbnail.
#[async_trait]
pub trait Thumbnailer: Send + Sync {
    /// Derive a thumbnail for `asset`, writing the image under `out_dir`
    ///
    /// Returns the path of the derived image. The image exists and is
    /// non-empty when this returns `Ok`.
    async fn derive(&self, asset: &Path, out_dir: &Path) -> Result<PathBuf, TranscodeError>;
}

/// Thumbnailer backed by the external `ffmpeg` binary
///
/// Extracts embedded cover art by copying the asset's video stream with
/// audio stripped. One invocation per asset, bounded by the configured
/// timeout; the tool is killed on expiry.
///
/// # Examples
///
/// ```no_run
/// use tracklift::thumbnailer::{FfmpegThumbnailer, Thumbnailer};
/// use std::path::Path;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let thumbnailer = FfmpegThumbnailer::from_path(Duration::from_secs(60))
///     .expect("ffmpeg not found in PATH");
///
/// let thumb = thumbnailer
///     .derive(Path::new("temp/unit-1/song.mp3"), Path::new("temp/unit-1"))
///     .await?;
/// println!("cover art at {}", thumb.display());
/// # Ok(())
/// # }
/// ```
pub struct FfmpegThumbnailer {
    binary_path: PathBuf,
    timeout: Duration,
}

impl FfmpegThumbnailer {
    /// Create a thumbnailer with an explicit binary path
    pub fn new(binary_path: PathBuf, timeout: Duration) -> Self {
        Self {
            binary_path,
            timeout,
        }
    }

    /// Attempt to find ffmpeg in PATH
    ///
    /// Returns `None` when the binary is not installed.
    pub fn from_path(timeout: Duration) -> Option<Self> {
        which::which("ffmpeg").ok().map(|p| Self::new(p, timeout))
    }
}

#[async_trait]
impl Thumbnailer for FfmpegThumbnailer {
    async fn derive(&self, asset: &Path, out_dir: &Path) -> Result<PathBuf, TranscodeError> {
        let stem = asset
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("asset");
        let output = out_dir.join(format!("{stem}_thumb.png"));

        debug!(asset = %asset.display(), "deriving thumbnail");
        let run = Command::new(&self.binary_path)
            .arg("-i")
            .arg(asset)
            .arg("-an")
            .arg("-c:v")
            .arg("copy")
            .arg(&output)
            .kill_on_drop(true)
            .output();

        let result = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TranscodeError::ToolUnavailable(format!(
                    "{} not found",
                    self.binary_path.display()
                )));
            }
            Ok(Err(e)) => {
                return Err(TranscodeError::Failed {
                    input: asset.to_path_buf(),
                    reason: format!("failed to execute {}: {}", self.binary_path.display(), e),
                });
            }
            Err(_) => {
                return Err(TranscodeError::TimedOut {
                    input: asset.to_path_buf(),
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(TranscodeError::Failed {
                input: asset.to_path_buf(),
                reason: format!("{}: {}", result.status, stderr.trim()),
            });
        }

        // Assets without embedded cover art can exit zero with nothing written
        match tokio::fs::metadata(&output).await {
            Ok(meta) if meta.len() > 0 => Ok(output),
            _ => Err(TranscodeError::MissingOutput {
                input: asset.to_path_buf(),
                output,
            }),
        }
    }
}

/// No-op thumbnailer used when no transcode tool is available
///
/// Provides graceful degradation: every call reports the tool as
/// unavailable, and callers publish assets without thumbnails. The rest of
/// the pipeline is unaffected.
///
/// # Examples
///
/// ```
/// use tracklift::thumbnailer::{NoOpThumbnailer, Thumbnailer};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() {
/// let thumbnailer = NoOpThumbnailer;
///
/// let result = thumbnailer
///     .derive(Path::new("song.mp3"), Path::new("temp"))
///     .await;
/// assert!(result.is_err());
/// # }
/// ```
pub struct NoOpThumbnailer;

#[async_trait]
impl Thumbnailer for NoOpThumbnailer {
    async fn derive(&self, _asset: &Path, _out_dir: &Path) -> Result<PathBuf, TranscodeError> {
        Err(TranscodeError::ToolUnavailable(
            "thumbnail derivation requires the ffmpeg binary. \
             Configure ffmpeg_path in config or ensure ffmpeg is in PATH."
                .into(),
        ))
    }
}
