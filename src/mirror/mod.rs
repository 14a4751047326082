//! Core pipeline implementation split into focused submodules.
//!
//! The `CatalogMirror` struct and its methods are organized by concern:
//! - [`scan`] - Catalogue page loop, cooldown pacing, stall handling
//! - [`listing`] - Dedup gate, unit fan-out, join, and the commit decision
//! - [`unit`] - Fetch/thumbnail/publish execution for one download link

mod listing;
mod scan;
mod unit;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::db::{Database, SeenStore};
use crate::error::{Error, FetchError, Result};
use crate::fetcher::{Aria2cFetcher, AssetFetcher};
use crate::sink::{BotApiSink, MediaSink};
use crate::source::{CatalogSource, JsonCatalogSource};
use crate::thumbnailer::{FfmpegThumbnailer, NoOpThumbnailer, Thumbnailer};
use crate::types::Event;

/// Scan loop state shared across tasks
#[derive(Clone)]
pub(crate) struct ScanState {
    /// Semaphore bounding how many units of one listing run concurrently
    pub(crate) unit_limit: std::sync::Arc<tokio::sync::Semaphore>,
    /// Cancelled on shutdown; aborts cooldown sleeps and stops the page loop
    pub(crate) shutdown: tokio_util::sync::CancellationToken,
    /// Cleared during shutdown so the loop stops picking up new pages
    pub(crate) accepting: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

/// Main pipeline instance (cloneable - all fields are Arc-wrapped)
///
/// Drives the catalogue scan loop: page-by-page discovery, a dedup gate per
/// listing, a bounded concurrent fan-out of per-download-link units, and a
/// commit to the dedup store once every unit of a listing has published.
///
/// A listing is committed only when all of its units succeed, so a partial
/// failure leaves the whole listing uncommitted and it is retried on the next
/// catalogue cycle. Units that did publish before the failure will publish
/// again on that retry; per-unit commit granularity would avoid the duplicate
/// uploads and is the natural next refinement.
#[derive(Clone)]
pub struct CatalogMirror {
    /// Paginated producer of candidate listings
    pub(crate) source: std::sync::Arc<dyn CatalogSource>,
    /// Downloader invoked once per unit with bounded retries
    pub(crate) fetcher: std::sync::Arc<dyn AssetFetcher>,
    /// Best-effort cover art derivation
    pub(crate) thumbnailer: std::sync::Arc<dyn Thumbnailer>,
    /// Publish target for images and documents
    pub(crate) sink: std::sync::Arc<dyn MediaSink>,
    /// Dedup store consulted before work and committed after success
    pub(crate) store: std::sync::Arc<dyn SeenStore>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: std::sync::Arc<Config>,
    /// Scan loop state
    pub(crate) scan_state: ScanState,
}

impl CatalogMirror {
    /// Create a new CatalogMirror instance with the default collaborators
    ///
    /// This validates the configuration and wires everything up:
    /// - Creates the scratch directory for per-unit downloads
    /// - Opens/creates the SQLite dedup database and runs migrations
    /// - Builds the HTTP catalogue client and the bot-API sink
    /// - Resolves the aria2c and ffmpeg binaries (explicit path or PATH search)
    /// - Sets up the event broadcast channel
    ///
    /// Downloads cannot run without the fetch tool, so a missing aria2c binary
    /// is an error here. A missing ffmpeg binary only disables thumbnails.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        // Ensure the scratch directory exists
        tokio::fs::create_dir_all(config.temp_dir())
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create temp directory '{}': {}",
                        config.temp_dir().display(),
                        e
                    ),
                ))
            })?;

        // Initialize the dedup database
        let db = Database::new(config.database_path()).await?;

        let source = JsonCatalogSource::new(config.source.clone())?;
        let sink = BotApiSink::new(config.sink.clone())?;

        // Resolve the fetch tool based on config
        let fetcher = if let Some(ref aria2c_path) = config.tools.aria2c_path {
            // Use explicitly configured binary path
            tracing::info!(binary = %aria2c_path.display(), "Using configured aria2c binary");
            Aria2cFetcher::new(aria2c_path.clone(), config.fetch.clone())
        } else if config.tools.search_path {
            // Search PATH for the aria2c binary
            Aria2cFetcher::from_path(config.fetch.clone()).ok_or_else(|| {
                Error::Fetch(FetchError::ToolUnavailable(
                    "aria2c not found in PATH. Configure aria2c_path in config \
                     or install aria2c."
                        .to_string(),
                ))
            })?
        } else {
            // No binary configured and PATH search disabled
            return Err(Error::Fetch(FetchError::ToolUnavailable(
                "no aria2c binary configured and PATH search is disabled".to_string(),
            )));
        };

        // Resolve the thumbnailer based on config
        let thumbnailer: std::sync::Arc<dyn Thumbnailer> =
            if let Some(ref ffmpeg_path) = config.tools.ffmpeg_path {
                // Use explicitly configured binary path
                std::sync::Arc::new(FfmpegThumbnailer::new(
                    ffmpeg_path.clone(),
                    config.tools.transcode_timeout,
                ))
            } else if config.tools.search_path {
                // Search PATH for the ffmpeg binary
                FfmpegThumbnailer::from_path(config.tools.transcode_timeout)
                    .map(|t| std::sync::Arc::new(t) as std::sync::Arc<dyn Thumbnailer>)
                    .unwrap_or_else(|| std::sync::Arc::new(NoOpThumbnailer))
            } else {
                // No binary configured and PATH search disabled
                std::sync::Arc::new(NoOpThumbnailer)
            };

        let mirror = Self::with_components(
            config,
            std::sync::Arc::new(source),
            std::sync::Arc::new(fetcher),
            thumbnailer,
            std::sync::Arc::new(sink),
            std::sync::Arc::new(db),
        );

        tracing::info!(
            page_size = mirror.source.page_size(),
            unit_width = mirror.config.fetch.max_concurrent_units,
            "Catalogue mirror initialized"
        );

        Ok(mirror)
    }

    /// Assemble a mirror from externally constructed collaborators
    ///
    /// All pipeline seams are trait objects, so alternate sources, fetchers,
    /// thumbnailers, sinks, and stores can be injected here; [`new`] is a
    /// convenience wrapper that builds the defaults from config. The config
    /// still drives pacing (cooldowns, stall bound) and the per-listing unit
    /// concurrency.
    ///
    /// [`new`]: Self::new
    pub fn with_components(
        config: Config,
        source: std::sync::Arc<dyn CatalogSource>,
        fetcher: std::sync::Arc<dyn AssetFetcher>,
        thumbnailer: std::sync::Arc<dyn Thumbnailer>,
        sink: std::sync::Arc<dyn MediaSink>,
        store: std::sync::Arc<dyn SeenStore>,
    ) -> Self {
        // Create broadcast channel with buffer size of 1000 events
        // This allows multiple subscribers to receive all events independently
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let scan_state = ScanState {
            unit_limit: std::sync::Arc::new(tokio::sync::Semaphore::new(
                config.fetch.max_concurrent_units,
            )),
            shutdown: tokio_util::sync::CancellationToken::new(),
            accepting: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true)),
        };

        Self {
            source,
            fetcher,
            thumbnailer,
            sink,
            store,
            event_tx,
            config: std::sync::Arc::new(config),
            scan_state,
        }
    }

    /// Subscribe to pipeline events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events
    /// independently. Events are buffered, but if a subscriber falls behind by
    /// more than 1000 events, it will receive a `RecvError::Lagged` error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tracklift::{CatalogMirror, Config};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let mirror = CatalogMirror::new(Config::default()).await?;
    ///
    ///     let mut events = mirror.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             tracing::info!(?event, "pipeline event");
    ///         }
    ///     });
    ///
    ///     mirror.run().await;
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    ///
    /// The configuration is wrapped in an Arc, so this is a cheap clone
    /// operation.
    pub fn get_config(&self) -> std::sync::Arc<Config> {
        std::sync::Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped
    /// (ok() converts Err to None). The pipeline never blocks on a slow or
    /// absent consumer.
    pub(crate) fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }

    /// Signal a graceful shutdown
    ///
    /// Flips the accepting flag and cancels the shutdown token: the scan loop
    /// stops at its next boundary, cooldown sleeps abort immediately, and the
    /// listing currently in flight drains before [`run`] returns. Nothing is
    /// committed for a listing whose units did not all finish, so abandoned
    /// scratch files are safe to discard.
    ///
    /// [`run`]: Self::run
    pub fn shutdown(&self) {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop picking up new pages
        self.scan_state
            .accepting
            .store(false, std::sync::atomic::Ordering::SeqCst);

        // 2. Abort cooldown sleeps and in-progress page waits
        self.scan_state.shutdown.cancel();

        // 3. Emit shutdown event
        self.emit_event(Event::Shutdown);

        // Database connections close when the last mirror clone is dropped.
        tracing::info!("Shutdown signalled");
    }
}
