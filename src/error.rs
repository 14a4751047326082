//! Error types for tracklift
//!
//! This module provides comprehensive error handling for the library, including:
//! - One error enum per external collaborator (fetch, transcode, publish, store, discovery)
//! - A crate-level [`Error`] aggregating them for `?` propagation
//! - Context information (URL, attempt count, tool output, HTTP status)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tracklift operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tracklift
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "fetch.max_attempts")
        key: Option<String>,
    },

    /// Dedup store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Catalogue discovery failed
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Asset download failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Thumbnail derivation failed
    #[error("transcode error: {0}")]
    Transcode(#[from] TranscodeError),

    /// Publishing to the sink failed
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Download failures from the external fetch tool
///
/// A failed attempt is retried up to the configured attempt limit; only the
/// final, exhausted outcome is surfaced as [`FetchError::Exhausted`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// The download URL is empty or cannot be parsed
    #[error("invalid download url {url:?}: {reason}")]
    InvalidUrl {
        /// The offending URL string
        url: String,
        /// Why the URL was rejected
        reason: String,
    },

    /// The fetch tool binary could not be found or spawned
    #[error("fetch tool unavailable: {0}")]
    ToolUnavailable(String),

    /// The destination directory could not be created
    #[error("cannot prepare destination {dir}: {reason}")]
    Destination {
        /// The directory that was being prepared
        dir: PathBuf,
        /// The underlying I/O error
        reason: String,
    },

    /// All attempts failed; carries the last attempt's failure
    #[error("download of {url} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        /// The URL that could not be downloaded
        url: String,
        /// How many attempts were made
        attempts: u32,
        /// Description of the final attempt's failure
        last_error: String,
    },
}

/// Thumbnail derivation failures
///
/// Always absorbed by the caller: a failed transcode means the unit proceeds
/// without a thumbnail, never that the unit fails.
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// The transcode tool binary could not be found or spawned
    #[error("transcode tool unavailable: {0}")]
    ToolUnavailable(String),

    /// The tool exited non-zero
    #[error("transcode of {input} failed: {reason}")]
    Failed {
        /// The asset the thumbnail was derived from
        input: PathBuf,
        /// Tool output or exit status description
        reason: String,
    },

    /// The tool exited zero but produced no usable output file
    #[error("transcode of {input} produced no output at {output}")]
    MissingOutput {
        /// The asset the thumbnail was derived from
        input: PathBuf,
        /// Where the output image was expected
        output: PathBuf,
    },

    /// The tool ran past the transcode timeout and was killed
    #[error("transcode of {input} timed out after {seconds}s")]
    TimedOut {
        /// The asset the thumbnail was derived from
        input: PathBuf,
        /// The timeout that expired
        seconds: u64,
    },
}

/// Publish failures from the messaging sink
#[derive(Debug, Error)]
pub enum PublishError {
    /// The asset file could not be read for upload
    #[error("asset not readable at {path}: {reason}")]
    AssetUnreadable {
        /// The local file that could not be read
        path: PathBuf,
        /// The underlying I/O error
        reason: String,
    },

    /// The sink answered with a non-success status
    #[error("sink rejected publish with status {status}: {body}")]
    Rejected {
        /// HTTP status code returned by the sink
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },

    /// The request could not be delivered
    #[error("publish transport error: {0}")]
    Transport(String),

    /// The sink did not answer within the publish timeout
    #[error("publish timed out after {seconds}s")]
    TimedOut {
        /// The timeout that expired
        seconds: u64,
    },

    /// The sink answered success but the receipt could not be parsed
    #[error("malformed sink response: {0}")]
    MalformedResponse(String),
}

/// Dedup persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to connect to the database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::QueryFailed(e.to_string())
    }
}

/// Catalogue discovery errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The page request could not be delivered
    #[error("catalogue request for page {page} failed: {reason}")]
    Transport {
        /// The page that was being fetched
        page: u32,
        /// The underlying transport error
        reason: String,
    },

    /// The source answered with a non-success status
    #[error("catalogue returned status {status} for page {page}")]
    Http {
        /// The page that was being fetched
        page: u32,
        /// HTTP status code returned by the source
        status: u16,
    },

    /// The page body could not be parsed into listings
    #[error("malformed catalogue page {page}: {reason}")]
    MalformedPage {
        /// The page that was being fetched
        page: u32,
        /// Why parsing failed
        reason: String,
    },
}
