//! Shared test helpers - in-process fakes for every pipeline seam.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::config::Config;
use crate::db::SeenStore;
use crate::error::{DiscoveryError, FetchError, PublishError, StoreError, TranscodeError};
use crate::fetcher::{AssetFetcher, FetchedAsset};
use crate::mirror::CatalogMirror;
use crate::sink::{MediaSink, PublishReceipt};
use crate::source::CatalogSource;
use crate::thumbnailer::Thumbnailer;
use crate::types::{DownloadLink, Event, Listing, Song};

/// Catalogue source scripted per page
///
/// Each page number carries a queue of responses consumed one call at a
/// time; once a page's queue runs dry it serves empty pages, which the loop
/// reads as end of catalogue.
pub(crate) struct FakeSource {
    responses: Mutex<HashMap<u32, VecDeque<Result<Vec<Listing>, DiscoveryError>>>>,
    calls: Mutex<Vec<u32>>,
    page_size: usize,
}

impl FakeSource {
    pub(crate) fn new(page_size: usize) -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            page_size,
        }
    }

    /// Queue one successful response for `page`
    pub(crate) fn push_page(&self, page: u32, listings: Vec<Listing>) {
        self.responses
            .lock()
            .unwrap()
            .entry(page)
            .or_default()
            .push_back(Ok(listings));
    }

    /// Queue one failed response for `page`
    pub(crate) fn push_error(&self, page: u32) {
        self.responses
            .lock()
            .unwrap()
            .entry(page)
            .or_default()
            .push_back(Err(DiscoveryError::Http { page, status: 500 }));
    }

    /// Pages requested so far, in call order
    pub(crate) fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogSource for FakeSource {
    async fn fetch_page(&self, page: u32) -> Result<Vec<Listing>, DiscoveryError> {
        self.calls.lock().unwrap().push(page);
        let scripted = self
            .responses
            .lock()
            .unwrap()
            .get_mut(&page)
            .and_then(|queue| queue.pop_front());
        scripted.unwrap_or_else(|| Ok(Vec::new()))
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}

/// Fetcher that writes real files so downstream steps see a usable asset
pub(crate) struct FakeFetcher {
    calls: Mutex<Vec<(String, Option<String>)>>,
    fail_urls: Mutex<HashSet<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeFetcher {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_urls: Mutex::new(HashSet::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Make every fetch of `url` fail with an exhausted-attempts error
    pub(crate) fn fail_url(&self, url: &str) {
        self.fail_urls.lock().unwrap().insert(url.to_string());
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// `(url, file_name)` pairs in call order
    pub(crate) fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of fetches observed running at once
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetFetcher for FakeFetcher {
    async fn fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        file_name: Option<&str>,
    ) -> Result<FetchedAsset, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), file_name.map(str::to_string)));

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        // Let sibling units start so overlap is observable
        tokio::task::yield_now().await;

        let result = if self.fail_urls.lock().unwrap().contains(url) {
            Err(FetchError::Exhausted {
                url: url.to_string(),
                attempts: 3,
                last_error: "exit status 1".to_string(),
            })
        } else {
            tokio::fs::create_dir_all(dest_dir).await.unwrap();
            let path = dest_dir.join(file_name.unwrap_or("asset.mp3"));
            tokio::fs::write(&path, b"fake-asset-bytes").await.unwrap();
            Ok(FetchedAsset {
                path,
                size_bytes: 16,
            })
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// What a [`FakeThumbnailer`] does when asked to derive
#[derive(Clone, Copy, Debug)]
pub(crate) enum ThumbMode {
    /// Write a real thumbnail file next to the asset
    Derive,
    /// Report the tool as missing
    Unavailable,
    /// Fail like a tool that found no cover art
    Fail,
}

pub(crate) struct FakeThumbnailer {
    mode: Mutex<ThumbMode>,
    calls: Mutex<Vec<PathBuf>>,
}

impl FakeThumbnailer {
    pub(crate) fn new() -> Self {
        Self {
            mode: Mutex::new(ThumbMode::Derive),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_mode(&self, mode: ThumbMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub(crate) fn derive_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Thumbnailer for FakeThumbnailer {
    async fn derive(&self, asset: &Path, out_dir: &Path) -> Result<PathBuf, TranscodeError> {
        self.calls.lock().unwrap().push(asset.to_path_buf());

        let mode = *self.mode.lock().unwrap();
        match mode {
            ThumbMode::Derive => {
                let stem = asset.file_stem().and_then(|s| s.to_str()).unwrap_or("asset");
                let output = out_dir.join(format!("{stem}_thumb.png"));
                tokio::fs::write(&output, b"png-bytes").await.unwrap();
                Ok(output)
            }
            ThumbMode::Unavailable => Err(TranscodeError::ToolUnavailable(
                "ffmpeg not installed".to_string(),
            )),
            ThumbMode::Fail => Err(TranscodeError::Failed {
                input: asset.to_path_buf(),
                reason: "exit status 1".to_string(),
            }),
        }
    }
}

/// One recorded publish call
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum SinkCall {
    Image { caption: String },
    Document { caption: String, thumbnail: bool },
}

/// Sink recording every publish in order, with programmable failures
pub(crate) struct FakeSink {
    calls: Mutex<Vec<SinkCall>>,
    fail_images: AtomicBool,
    fail_documents: AtomicBool,
    next_message_id: AtomicI64,
}

impl FakeSink {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_images: AtomicBool::new(false),
            fail_documents: AtomicBool::new(false),
            next_message_id: AtomicI64::new(1),
        }
    }

    pub(crate) fn fail_images(&self) {
        self.fail_images.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_documents(&self) {
        self.fail_documents.store(true, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn image_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| matches!(call, SinkCall::Image { .. }))
            .count()
    }

    pub(crate) fn document_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| matches!(call, SinkCall::Document { .. }))
            .count()
    }

    fn receipt(&self) -> PublishReceipt {
        PublishReceipt {
            message_id: self.next_message_id.fetch_add(1, Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl MediaSink for FakeSink {
    async fn publish_image(
        &self,
        _image: &Path,
        caption: &str,
    ) -> Result<PublishReceipt, PublishError> {
        self.calls.lock().unwrap().push(SinkCall::Image {
            caption: caption.to_string(),
        });
        if self.fail_images.load(Ordering::SeqCst) {
            return Err(PublishError::Rejected {
                status: 502,
                body: "Bad Gateway".to_string(),
            });
        }
        Ok(self.receipt())
    }

    async fn publish_document(
        &self,
        _document: &Path,
        caption: &str,
        thumbnail: Option<&Path>,
    ) -> Result<PublishReceipt, PublishError> {
        self.calls.lock().unwrap().push(SinkCall::Document {
            caption: caption.to_string(),
            thumbnail: thumbnail.is_some(),
        });
        if self.fail_documents.load(Ordering::SeqCst) {
            return Err(PublishError::Rejected {
                status: 502,
                body: "Bad Gateway".to_string(),
            });
        }
        Ok(self.receipt())
    }
}

/// In-memory dedup store with a commit log
pub(crate) struct MemorySeenStore {
    processed: Mutex<HashMap<String, usize>>,
    commits: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl MemorySeenStore {
    pub(crate) fn new() -> Self {
        Self {
            processed: Mutex::new(HashMap::new()),
            commits: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    /// Mark `url` as already processed without going through the pipeline
    pub(crate) fn preload(&self, url: &str) {
        self.processed.lock().unwrap().insert(url.to_string(), 0);
    }

    /// Make every store call fail, as a locked database would
    pub(crate) fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Commits recorded so far, in order (one entry per mark_processed call)
    pub(crate) fn commits(&self) -> Vec<String> {
        self.commits.lock().unwrap().clone()
    }

    pub(crate) fn commit_count(&self, url: &str) -> usize {
        self.commits
            .lock()
            .unwrap()
            .iter()
            .filter(|committed| committed.as_str() == url)
            .count()
    }

    /// Units recorded for a committed listing
    pub(crate) fn units_for(&self, url: &str) -> Option<usize> {
        self.processed.lock().unwrap().get(url).copied()
    }
}

#[async_trait]
impl SeenStore for MemorySeenStore {
    async fn is_processed(&self, listing_url: &str) -> Result<bool, StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::QueryFailed("database is locked".to_string()));
        }
        Ok(self.processed.lock().unwrap().contains_key(listing_url))
    }

    async fn mark_processed(
        &self,
        listing: &Listing,
        units_published: usize,
    ) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::QueryFailed("database is locked".to_string()));
        }
        self.processed
            .lock()
            .unwrap()
            .insert(listing.url.clone(), units_published);
        self.commits.lock().unwrap().push(listing.url.clone());
        Ok(())
    }
}

/// A mirror wired to fakes, plus handles to every fake for scripting and
/// assertions. The tempdir must be kept alive for the scratch directory.
pub(crate) struct TestRig {
    pub(crate) mirror: CatalogMirror,
    pub(crate) source: std::sync::Arc<FakeSource>,
    pub(crate) fetcher: std::sync::Arc<FakeFetcher>,
    pub(crate) thumbnailer: std::sync::Arc<FakeThumbnailer>,
    pub(crate) sink: std::sync::Arc<FakeSink>,
    pub(crate) store: std::sync::Arc<MemorySeenStore>,
    pub(crate) temp: TempDir,
}

/// Build a mirror over in-process fakes with a page size of 10
pub(crate) fn test_rig() -> TestRig {
    let temp = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.fetch.temp_dir = temp.path().join("scratch");
    config.source.page_size = 10;

    let source = std::sync::Arc::new(FakeSource::new(config.source.page_size));
    let fetcher = std::sync::Arc::new(FakeFetcher::new());
    let thumbnailer = std::sync::Arc::new(FakeThumbnailer::new());
    let sink = std::sync::Arc::new(FakeSink::new());
    let store = std::sync::Arc::new(MemorySeenStore::new());

    let mirror = CatalogMirror::with_components(
        config,
        source.clone(),
        fetcher.clone(),
        thumbnailer.clone(),
        sink.clone(),
        store.clone(),
    );

    TestRig {
        mirror,
        source,
        fetcher,
        thumbnailer,
        sink,
        store,
        temp,
    }
}

/// A song named `name` with one download link per quality label
pub(crate) fn song(name: &str, qualities: &[&str]) -> Song {
    Song {
        name: name.to_string(),
        page_link: format!("https://catalogue.test/song/{name}"),
        downloads: qualities
            .iter()
            .map(|quality| DownloadLink {
                quality: quality.to_string(),
                url: format!("https://cdn.test/{name}-{quality}.mp3"),
            })
            .collect(),
    }
}

/// A listing at `url` with fixed metadata
pub(crate) fn listing(url: &str, songs: Vec<Song>) -> Listing {
    let mut metadata = BTreeMap::new();
    metadata.insert("Album".to_string(), "Test Album".to_string());
    metadata.insert("Year".to_string(), "2024".to_string());
    Listing {
        url: url.to_string(),
        songs,
        metadata,
    }
}

/// A page of single-song single-link listings numbered `first..first + count`
pub(crate) fn single_unit_listings(first: usize, count: usize) -> Vec<Listing> {
    (first..first + count)
        .map(|n| {
            listing(
                &format!("https://catalogue.test/album/{n}"),
                vec![song(&format!("track{n}"), &["320kbps"])],
            )
        })
        .collect()
}

/// Receive events until one matches, failing the test if none arrives
///
/// The ceiling must outlast the catalogue cooldown so paused-clock tests can
/// wait across it; under a paused clock the wait costs no wall time.
pub(crate) async fn wait_for_event(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    mut predicate: impl FnMut(&Event) -> bool,
) -> Event {
    tokio::time::timeout(Duration::from_secs(4 * 3600), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event was not emitted")
}

/// Drain whatever events are immediately available
pub(crate) fn drain_events(events: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
