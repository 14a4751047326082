//! Per-download-link unit execution - fetch, best-effort thumbnail, ordered
//! publishes, scratch cleanup.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use super::CatalogMirror;
use crate::error::TranscodeError;
use crate::types::{DownloadLink, Event, Listing, Song, UnitFailure, UnitReport, UnitStage};

/// Process-wide counter giving each unit its own scratch directory
static UNIT_SEQ: AtomicU64 = AtomicU64::new(0);

impl CatalogMirror {
    /// Execute one unit of work: one download link of one song
    ///
    /// Steps, in order:
    /// 1. Acquire a slot from the unit semaphore
    /// 2. Fetch the asset into a scratch directory owned by this unit
    /// 3. Derive cover art from the asset (best-effort)
    /// 4. Publish the cover art with the listing's metadata caption
    /// 5. Publish the asset as a document, attaching the cover art
    /// 6. Remove the scratch directory, whatever the outcome
    ///
    /// The image publish always completes before the document publish starts;
    /// if it fails, the document still goes out, just without a thumbnail,
    /// and the unit is recorded as failed. A fetch failure ends the unit with
    /// nothing published. Sibling units are unaffected either way.
    pub(crate) async fn run_unit(
        &self,
        listing: &Listing,
        song: &Song,
        link: &DownloadLink,
    ) -> UnitReport {
        let mut report = UnitReport {
            song: song.name.clone(),
            quality: link.quality.clone(),
            url: link.url.clone(),
            thumbnailed: false,
            failure: None,
        };

        // Semaphore errors only after close, which happens during teardown
        let _permit = match self.scan_state.unit_limit.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                report.failure = Some(UnitFailure {
                    stage: UnitStage::Fetch,
                    error: "unit limiter closed during shutdown".to_string(),
                });
                return report;
            }
        };

        let unit_dir = self.next_unit_dir();
        self.execute_unit(listing, song, link, &unit_dir, &mut report)
            .await;

        // The unit owns its scratch directory; remove it whatever the outcome
        if let Err(e) = tokio::fs::remove_dir_all(&unit_dir).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(
                dir = %unit_dir.display(),
                error = %e,
                "Failed to remove unit scratch directory"
            );
        }

        match &report.failure {
            None => {
                debug!(
                    listing = %listing.url,
                    song = %report.song,
                    quality = %report.quality,
                    "Unit published"
                );
                self.emit_event(Event::UnitPublished {
                    listing: listing.url.clone(),
                    song: report.song.clone(),
                    quality: report.quality.clone(),
                });
            }
            Some(failure) => {
                self.emit_event(Event::UnitFailed {
                    listing: listing.url.clone(),
                    song: report.song.clone(),
                    quality: report.quality.clone(),
                    stage: failure.stage,
                    error: failure.error.clone(),
                });
            }
        }

        report
    }

    /// Fetch, thumbnail, and publish; fills in `report`
    async fn execute_unit(
        &self,
        listing: &Listing,
        song: &Song,
        link: &DownloadLink,
        unit_dir: &Path,
        report: &mut UnitReport,
    ) {
        let file_name = output_file_name(&link.url);

        let asset = match self
            .fetcher
            .fetch(&link.url, unit_dir, file_name.as_deref())
            .await
        {
            Ok(asset) => asset,
            Err(e) => {
                warn!(song = %song.name, quality = %link.quality, error = %e, "Unit fetch failed");
                report.failure = Some(UnitFailure {
                    stage: UnitStage::Fetch,
                    error: e.to_string(),
                });
                return;
            }
        };
        debug!(
            song = %song.name,
            bytes = asset.size_bytes,
            path = %asset.path.display(),
            "Asset fetched"
        );

        // Cover art is best-effort: a failed derivation never fails the unit.
        // A missing tool was already reported at startup, so only log it at
        // debug here instead of once per unit.
        let thumbnail = match self.thumbnailer.derive(&asset.path, unit_dir).await {
            Ok(path) => Some(path),
            Err(TranscodeError::ToolUnavailable(reason)) => {
                debug!(reason = %reason, "Thumbnail derivation unavailable");
                None
            }
            Err(e) => {
                warn!(song = %song.name, error = %e, "Thumbnail derivation failed, continuing without");
                self.emit_event(Event::ThumbnailSkipped {
                    listing: listing.url.clone(),
                    song: song.name.clone(),
                    error: e.to_string(),
                });
                None
            }
        };

        // The image publish must finish before the document publish starts.
        // On image failure the document still goes out without a thumbnail.
        let mut document_thumbnail: Option<&Path> = None;
        if let Some(ref thumb) = thumbnail {
            report.thumbnailed = true;
            match self
                .sink
                .publish_image(thumb, &listing.metadata_caption())
                .await
            {
                Ok(receipt) => {
                    debug!(message_id = receipt.message_id, "Metadata image published");
                    document_thumbnail = Some(thumb);
                }
                Err(e) => {
                    warn!(
                        song = %song.name,
                        error = %e,
                        "Image publish failed, document continues without thumbnail"
                    );
                    report.failure = Some(UnitFailure {
                        stage: UnitStage::PublishImage,
                        error: e.to_string(),
                    });
                }
            }
        }

        match self
            .sink
            .publish_document(
                &asset.path,
                &song.document_caption(&link.quality),
                document_thumbnail,
            )
            .await
        {
            Ok(receipt) => {
                debug!(message_id = receipt.message_id, "Document published");
            }
            Err(e) => {
                warn!(song = %song.name, quality = %link.quality, error = %e, "Document publish failed");
                // The first failure decides the unit's recorded stage
                if report.failure.is_none() {
                    report.failure = Some(UnitFailure {
                        stage: UnitStage::PublishDocument,
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    /// Scratch directory for one unit, unique within this process
    fn next_unit_dir(&self) -> PathBuf {
        let seq = UNIT_SEQ.fetch_add(1, Ordering::Relaxed);
        self.config
            .temp_dir()
            .join(format!("unit-{}-{}", std::process::id(), seq))
    }
}

/// Derive the download's output filename from its URL
///
/// Uses the URL's last path segment, percent-decoded and with path
/// separators replaced. Returns `None` when the segment is empty or unusable,
/// in which case the fetch tool's own naming is trusted.
pub(crate) fn output_file_name(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    if segment.is_empty() {
        return None;
    }

    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());

    let cleaned: String = decoded
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return None;
    }
    Some(cleaned.to_string())
}
