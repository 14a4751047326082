//! Test configuration helpers for wiring a mirror to mock services and fake tools

use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tracklift::{
    CatalogMirror, Config, Event, FetchConfig, PersistenceConfig, SinkConfig, SourceConfig,
    ToolsConfig,
};

/// Build a config pointing at mock HTTP services and fake tool scripts
///
/// The catalogue is served at `{catalogue_url}/albums`, downloads and the
/// dedup database live under the temp directory, and a single download
/// attempt is made per unit so failure tests finish quickly.
pub fn mirror_config(
    temp: &TempDir,
    catalogue_url: &str,
    sink_url: &str,
    aria2c: &Path,
    ffmpeg: &Path,
) -> Config {
    Config {
        source: SourceConfig {
            base_url: format!("{catalogue_url}/albums"),
            ..Default::default()
        },
        sink: SinkConfig {
            endpoint: sink_url.to_string(),
            channel: -1_001_900_000,
            ..Default::default()
        },
        fetch: FetchConfig {
            temp_dir: temp.path().join("scratch"),
            max_attempts: 1,
            attempt_timeout: Duration::from_secs(10),
            ..Default::default()
        },
        tools: ToolsConfig {
            aria2c_path: Some(aria2c.to_path_buf()),
            ffmpeg_path: Some(ffmpeg.to_path_buf()),
            ..Default::default()
        },
        persistence: PersistenceConfig {
            database_path: temp.path().join("mirror.db"),
        },
        ..Default::default()
    }
}

/// Construct a mirror, subscribe to its events, and spawn its scan loop
///
/// The subscription is taken before the loop starts so no event is missed.
pub async fn start_mirror(
    config: Config,
) -> (
    CatalogMirror,
    tokio::task::JoinHandle<()>,
    tokio::sync::broadcast::Receiver<Event>,
) {
    let mirror = CatalogMirror::new(config)
        .await
        .expect("mirror construction failed");
    let events = mirror.subscribe();
    let handle = {
        let mirror = mirror.clone();
        tokio::spawn(async move { mirror.run().await })
    };
    (mirror, handle, events)
}

/// Signal shutdown and wait for the scan loop to drain
pub async fn stop_mirror(mirror: &CatalogMirror, handle: tokio::task::JoinHandle<()>) {
    mirror.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scan loop did not stop after shutdown")
        .expect("scan loop task panicked");
}
