//! Per-listing processing - the dedup gate, the bounded unit fan-out, and
//! the all-or-nothing commit decision.

use tracing::{debug, info, warn};

use super::CatalogMirror;
use crate::error::StoreError;
use crate::types::{Event, Listing, ListingOutcome};

impl CatalogMirror {
    /// Run one listing through the dedup gate, the unit fan-out, and the
    /// commit decision
    ///
    /// The gate is checked before any work starts; a processed listing is
    /// skipped without touching the fetcher or the sink. Otherwise one unit
    /// future is dispatched per download link of every song, all concurrently
    /// (bounded by the unit semaphore), and joined before the outcome is
    /// decided.
    ///
    /// The listing is committed to the dedup store only when every unit
    /// succeeded. One failed unit leaves the whole listing uncommitted, so
    /// the next catalogue cycle retries it from scratch; its sibling units
    /// will publish a second time then. A listing with no download links has
    /// nothing to publish and commits vacuously, which keeps it from being
    /// rescanned every cycle.
    ///
    /// Store errors from the gate or the commit propagate to the page loop.
    pub(crate) async fn process_listing(
        &self,
        listing: &Listing,
    ) -> Result<ListingOutcome, StoreError> {
        if self.store.is_processed(&listing.url).await? {
            debug!(url = %listing.url, "Listing already processed, skipping");
            self.emit_event(Event::ListingSkipped {
                url: listing.url.clone(),
            });
            return Ok(ListingOutcome::Skipped);
        }

        let total = listing.unit_count();
        info!(url = %listing.url, songs = listing.songs.len(), units = total, "Processing listing");
        self.emit_event(Event::ListingStarted {
            url: listing.url.clone(),
            units: total,
        });

        // One future per download link; join_all waits for the slowest unit
        // before the commit decision
        let mut units = Vec::with_capacity(total);
        for song in &listing.songs {
            for link in &song.downloads {
                units.push(self.run_unit(listing, song, link));
            }
        }
        let reports = futures::future::join_all(units).await;

        let failed = reports.iter().filter(|r| !r.succeeded()).count();
        if failed > 0 {
            warn!(
                url = %listing.url,
                failed,
                total,
                "Listing left uncommitted, will retry next cycle"
            );
            self.emit_event(Event::ListingPartiallyFailed {
                url: listing.url.clone(),
                failed,
                total,
            });
            return Ok(ListingOutcome::PartiallyFailed { failed, total });
        }

        self.store.mark_processed(listing, total).await?;
        info!(url = %listing.url, units = total, "Listing committed");
        self.emit_event(Event::ListingCommitted {
            url: listing.url.clone(),
            units: total,
        });
        Ok(ListingOutcome::Committed { units: total })
    }
}
