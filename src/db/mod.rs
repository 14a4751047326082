//! Database layer for tracklift
//!
//! Handles SQLite persistence for the processed-listing dedup store.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`seen`] — Processed-listing gate and commit records

use crate::error::StoreError;
use crate::types::Listing;
use async_trait::async_trait;
use sqlx::{FromRow, sqlite::SqlitePool};

mod migrations;
mod seen;

/// Interface for the processed-listing gate
///
/// Consulted before any work starts on a listing; written only after every
/// unit of the listing has published. A listing that never commits is picked
/// up again on the next pass over its page.
#[async_trait]
pub trait SeenStore: Send + Sync {
    /// Whether a listing has already been committed
    async fn is_processed(&self, listing_url: &str) -> Result<bool, StoreError>;

    /// Record a fully published listing
    ///
    /// Idempotent: committing the same URL again refreshes the record
    /// instead of failing.
    async fn mark_processed(
        &self,
        listing: &Listing,
        units_published: usize,
    ) -> Result<(), StoreError>;
}

/// Commit record from the dedup store
#[derive(Debug, Clone, FromRow)]
pub struct ProcessedListing {
    /// The listing URL, unique per catalogue listing
    pub url: String,
    /// How many songs the listing carried when committed
    pub songs: i64,
    /// How many units were published for it
    pub units_published: i64,
    /// Unix timestamp of the commit
    pub processed_at: i64,
}

/// Database handle for tracklift
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
