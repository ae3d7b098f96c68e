//! Alternative-release search after a blacklisted failure.

use crate::types::{Event, MediaRef};

use super::DownloadOrchestrator;

impl DownloadOrchestrator {
    /// Fire off an alternative search for a failed media item
    ///
    /// Runs detached so a stuck external search can never stall the
    /// reconciliation tick; the outcome is logged, not propagated.
    pub(crate) fn spawn_alternative_search(&self, media: MediaRef) {
        self.emit(Event::RetrySearchTriggered {
            media: media.clone(),
        });

        let search = self.search.clone();
        tokio::spawn(async move {
            tracing::info!(media = %media, "Searching for an alternative release");
            match search.search_and_grab(&media).await {
                Ok(true) => tracing::info!(media = %media, "Alternative release grabbed"),
                Ok(false) => tracing::info!(media = %media, "No alternative release found"),
                Err(e) => tracing::warn!(
                    media = %media,
                    error = %e,
                    "Alternative release search failed"
                ),
            }
        });
    }
}
