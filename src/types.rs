//! Core types for tracklift

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One discovered unit of content: a catalogue entry with its songs and
/// descriptive metadata
///
/// Listings are produced by the discovery source, consumed exactly once per
/// scan cycle, and never mutated. The canonical URL doubles as the dedup key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Canonical listing URL; unique key in the dedup store
    pub url: String,

    /// Songs in catalogue order
    #[serde(default)]
    pub songs: Vec<Song>,

    /// Display attributes (album, year, cast, ...) keyed by attribute name
    #[serde(default, rename = "movie_info")]
    pub metadata: BTreeMap<String, String>,
}

impl Listing {
    /// Number of units of work this listing expands to (one per download link)
    pub fn unit_count(&self) -> usize {
        self.songs.iter().map(|s| s.downloads.len()).sum()
    }

    /// Caption for the listing's metadata image publish
    ///
    /// One `key: value` line per metadata entry, in key order.
    pub fn metadata_caption(&self) -> String {
        let mut caption = String::from("Metadata:");
        for (key, value) in &self.metadata {
            caption.push('\n');
            caption.push_str(key);
            caption.push_str(": ");
            caption.push_str(value);
        }
        caption
    }
}

/// One song within a listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    /// Song title as listed in the catalogue
    pub name: String,

    /// URL of the song's own catalogue page
    #[serde(rename = "song_link")]
    pub page_link: String,

    /// Download variants, one per offered quality
    #[serde(default, rename = "download_links")]
    pub downloads: Vec<DownloadLink>,
}

impl Song {
    /// Caption attached to this song's document publish
    pub fn document_caption(&self, quality: &str) -> String {
        format!("{}\nQuality: {}", self.name, quality)
    }
}

/// One downloadable variant of a song
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLink {
    /// Quality label (e.g., "320kbps")
    pub quality: String,

    /// Direct download URL handed to the fetch tool
    pub url: String,
}

/// Pipeline stage at which a unit failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStage {
    /// Downloading the asset
    Fetch,
    /// Publishing the metadata image
    PublishImage,
    /// Publishing the main document
    PublishDocument,
}

/// Failure detail for a single unit of work
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    /// Stage at which the unit failed
    pub stage: UnitStage,
    /// Error description
    pub error: String,
}

/// Outcome of one unit of work (one download link of one song)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReport {
    /// Song title the unit belongs to
    pub song: String,
    /// Quality label of the download link
    pub quality: String,
    /// Download URL the unit fetched
    pub url: String,
    /// Whether a thumbnail was derived and its image publish attempted
    pub thumbnailed: bool,
    /// Failure detail; `None` means the unit succeeded
    pub failure: Option<UnitFailure>,
}

impl UnitReport {
    /// Whether this unit completed all required publishes
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Terminal state of one listing after a scan cycle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ListingOutcome {
    /// Every unit succeeded; the listing was committed to the dedup store
    Committed {
        /// Number of units published
        units: usize,
    },
    /// The dedup gate matched; no work was performed
    Skipped,
    /// At least one unit failed; the listing was not committed and will be
    /// retried on the next catalogue cycle
    PartiallyFailed {
        /// Number of failed units
        failed: usize,
        /// Total number of scheduled units
        total: usize,
    },
}

/// Event emitted during pipeline operation
///
/// Consumers subscribe via [`crate::CatalogMirror::subscribe`]; a slow or
/// absent consumer never blocks the pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A catalogue page was fetched and its listings dispatched
    PageScanned {
        /// Page number (1-based)
        page: u32,
        /// Listings the page contained
        listings: usize,
    },

    /// A short page signalled the end of the catalogue
    CatalogueExhausted {
        /// The final page of the cycle
        page: u32,
    },

    /// Fetching or processing a page failed; the loop cools down and retries
    ScanError {
        /// Page number the failure occurred on
        page: u32,
        /// Error message
        error: String,
    },

    /// A page failed repeatedly and was skipped to keep the loop moving
    PageSkipped {
        /// The page that was abandoned until the next cycle
        page: u32,
        /// Consecutive failures observed
        failures: u32,
    },

    /// The dedup gate matched; the listing was not reprocessed
    ListingSkipped {
        /// Listing URL
        url: String,
    },

    /// A listing passed the dedup gate and its units were scheduled
    ListingStarted {
        /// Listing URL
        url: String,
        /// Number of scheduled units
        units: usize,
    },

    /// A unit finished all its publishes
    UnitPublished {
        /// Listing URL
        listing: String,
        /// Song title
        song: String,
        /// Quality label
        quality: String,
    },

    /// A unit failed; siblings are unaffected
    UnitFailed {
        /// Listing URL
        listing: String,
        /// Song title
        song: String,
        /// Quality label
        quality: String,
        /// Stage at which the unit failed
        stage: UnitStage,
        /// Error message
        error: String,
    },

    /// Thumbnail derivation failed; the unit continued without one
    ThumbnailSkipped {
        /// Listing URL
        listing: String,
        /// Song title
        song: String,
        /// Error message
        error: String,
    },

    /// Every unit succeeded and the listing was committed
    ListingCommitted {
        /// Listing URL
        url: String,
        /// Number of units published
        units: usize,
    },

    /// Some units failed; the listing was left uncommitted for retry
    ListingPartiallyFailed {
        /// Listing URL
        url: String,
        /// Number of failed units
        failed: usize,
        /// Total number of scheduled units
        total: usize,
    },

    /// Graceful shutdown initiated
    Shutdown,
}
