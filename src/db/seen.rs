//! Processed-listing gate: the dedup check before work, the commit after.

use crate::error::StoreError;
use crate::types::Listing;
use async_trait::async_trait;

use super::{Database, ProcessedListing, SeenStore};

impl Database {
    /// Fetch the commit record for a listing, if any
    pub async fn processed_listing(
        &self,
        listing_url: &str,
    ) -> Result<Option<ProcessedListing>, StoreError> {
        let record = sqlx::query_as::<_, ProcessedListing>(
            r#"
            SELECT url, songs, units_published, processed_at
            FROM processed_listings
            WHERE url = ?
            "#,
        )
        .bind(listing_url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Number of committed listings
    pub async fn processed_count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processed_listings")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[async_trait]
impl SeenStore for Database {
    async fn is_processed(&self, listing_url: &str) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM processed_listings WHERE url = ?
            "#,
        )
        .bind(listing_url)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn mark_processed(
        &self,
        listing: &Listing,
        units_published: usize,
    ) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO processed_listings (url, songs, units_published, processed_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET songs = ?, units_published = ?, processed_at = ?
            "#,
        )
        .bind(&listing.url)
        .bind(listing.songs.len() as i64)
        .bind(units_published as i64)
        .bind(now)
        .bind(listing.songs.len() as i64)
        .bind(units_published as i64)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
