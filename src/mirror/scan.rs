//! Catalogue page loop - sequential page fetches, cooldown pacing, and the
//! same-page stall bound.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::CatalogMirror;
use crate::error::Result;
use crate::types::Event;

impl CatalogMirror {
    /// Drive the catalogue scan loop until shutdown
    ///
    /// Pages are requested in ascending order starting at the configured
    /// start page. Each cycle:
    /// 1. Fetch one page of listings from the catalogue source
    /// 2. Run every listing through the dedup gate and, when new, its units
    /// 3. Advance to the next page, or restart after the catalogue cooldown
    ///    when a short page signals the end of the catalogue
    ///
    /// Errors never escape the loop. A failed page is logged, waited out with
    /// the error cooldown, and retried at the same number; after
    /// `max_page_retries` consecutive failures the page is skipped so one
    /// broken page cannot stall the catalogue forever.
    ///
    /// Returns when [`shutdown`] is signalled. The listing in flight at that
    /// point drains first, so no commit is ever lost to shutdown.
    ///
    /// [`shutdown`]: Self::shutdown
    pub async fn run(&self) {
        let start_page = self.config.source.start_page;
        info!(start_page, "Catalogue scan loop started");

        let mut page = start_page;
        let mut consecutive_failures: u32 = 0;

        loop {
            if !self
                .scan_state
                .accepting
                .load(std::sync::atomic::Ordering::SeqCst)
            {
                info!("Scan loop shutting down");
                break;
            }

            match self.scan_page(page).await {
                Ok(listings) => {
                    consecutive_failures = 0;
                    self.emit_event(Event::PageScanned { page, listings });

                    if listings < self.source.page_size() {
                        // Short page: the catalogue is exhausted for now
                        info!(
                            page,
                            listings,
                            cooldown_secs = self.config.scan.catalogue_cooldown.as_secs(),
                            "End of catalogue reached, cooling down"
                        );
                        self.emit_event(Event::CatalogueExhausted { page });

                        if self.cooldown(self.config.scan.catalogue_cooldown).await {
                            break;
                        }
                        page = start_page;
                    } else {
                        page = page.saturating_add(1);
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(
                        page,
                        error = %e,
                        failures = consecutive_failures,
                        "Page scan failed"
                    );
                    self.emit_event(Event::ScanError {
                        page,
                        error: e.to_string(),
                    });

                    if consecutive_failures >= self.config.scan.max_page_retries {
                        warn!(
                            page,
                            failures = consecutive_failures,
                            "Page keeps failing, skipping it until the next cycle"
                        );
                        self.emit_event(Event::PageSkipped {
                            page,
                            failures: consecutive_failures,
                        });
                        page = page.saturating_add(1);
                        consecutive_failures = 0;
                    }

                    if self.cooldown(self.config.scan.error_cooldown).await {
                        break;
                    }
                }
            }
        }

        info!("Catalogue scan loop stopped");
    }

    /// Fetch one page and process its listings sequentially
    ///
    /// Listings within a page run one at a time so the dedup gate stays
    /// linearizable per listing; concurrency lives inside the listing's unit
    /// fan-out. Store failures escalate here and surface as a page error.
    async fn scan_page(&self, page: u32) -> Result<usize> {
        let listings = self.source.fetch_page(page).await?;
        let count = listings.len();
        debug!(page, listings = count, "Catalogue page fetched");

        for listing in &listings {
            if self.scan_state.shutdown.is_cancelled() {
                break;
            }
            self.process_listing(listing).await?;
        }

        Ok(count)
    }

    /// Sleep for `duration` unless shutdown is signalled first
    ///
    /// Returns `true` when the sleep was interrupted by shutdown.
    async fn cooldown(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.scan_state.shutdown.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }
}
