//! # tracklift
//!
//! Backend library for mirroring a paginated music catalogue into a
//! messaging channel.
//!
//! tracklift walks a JSON catalogue page by page, downloads every song the
//! new listings link to, derives cover-art thumbnails, and publishes the
//! results through a bot-style HTTP API. A SQLite dedup store remembers
//! which listings have already been mirrored, so the loop can run forever
//! and only ever does new work.
//!
//! ## Design Philosophy
//!
//! tracklift is designed to be:
//! - **Sensible defaults** - Paging, cooldowns, and retry bounds work out of the box
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//! - **Crash-safe** - A listing commits only after every publish lands, so a
//!   restart repeats work instead of losing it
//!
//! ## Quick Start
//!
//! ```no_run
//! use tracklift::{CatalogMirror, Config, SinkConfig, SourceConfig, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         source: SourceConfig {
//!             base_url: "https://catalogue.example.com/albums".to_string(),
//!             ..Default::default()
//!         },
//!         sink: SinkConfig {
//!             endpoint: "https://api.example.org/bot123:abc".to_string(),
//!             channel: -1_001_234_567,
//!             ..Default::default()
//!         },
//!         ..Default::default()
//!     };
//!
//!     let mirror = CatalogMirror::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = mirror.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {event:?}");
//!         }
//!     });
//!
//!     // Scan until SIGTERM/SIGINT
//!     run_with_shutdown(mirror).await;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Dedup store persistence layer
pub mod db;
/// Error types
pub mod error;
/// Asset download via an external fetch tool
pub mod fetcher;
/// Core mirror implementation (decomposed into focused submodules)
pub mod mirror;
/// Publishing to the messaging sink
pub mod sink;
/// Paginated catalogue discovery
pub mod source;
/// Cover-art thumbnail derivation
pub mod thumbnailer;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{
    Config, FetchConfig, PersistenceConfig, ScanConfig, SinkConfig, SourceConfig, ToolsConfig,
};
pub use db::{Database, SeenStore};
pub use error::{
    DiscoveryError, Error, FetchError, PublishError, Result, StoreError, TranscodeError,
};
pub use fetcher::{Aria2cFetcher, AssetFetcher, FetchedAsset};
pub use mirror::CatalogMirror;
pub use sink::{BotApiSink, MediaSink, PublishReceipt};
pub use source::{CatalogSource, JsonCatalogSource};
pub use thumbnailer::{FfmpegThumbnailer, NoOpThumbnailer, Thumbnailer};
pub use types::{DownloadLink, Event, Listing, Song, UnitStage};

/// Helper function to run the scan loop with graceful signal handling.
///
/// Spawns the mirror's scan loop, waits for a termination signal, then calls
/// [`CatalogMirror::shutdown`] and waits for the loop to drain.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use tracklift::{CatalogMirror, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let mirror = CatalogMirror::new(config).await?;
///
///     // Scan with automatic signal handling
///     run_with_shutdown(mirror).await;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(mirror: CatalogMirror) {
    let runner = {
        let mirror = mirror.clone();
        tokio::spawn(async move { mirror.run().await })
    };

    wait_for_signal().await;
    mirror.shutdown();

    if let Err(e) = runner.await {
        tracing::error!(error = %e, "Scan loop task failed");
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
