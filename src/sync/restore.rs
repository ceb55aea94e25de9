//! Return from a detail view to the NPS listing.
//!
//! The portal's history is unreliable: depending on how the detail was opened,
//! the entry to go back to lives in the browser, the outer page or the listing
//! frame. Strategies are tried in a fixed order until one completes.

use std::fmt;

use anyhow::Result;

use super::frames::{resolve_frame, wait_for_element};
use crate::config::ResolvedConfig;
use crate::error::AutomationError;
use crate::portal::{PortalPage, Scope};

const HISTORY_BACK: &str = "history.back()";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStrategy {
    /// Browser-level back on the outer page.
    BrowserBack,
    /// `history.back()` in the outer page.
    PageHistoryBack,
    /// `history.back()` inside the listing frame.
    FrameHistoryBack,
}

impl RestoreStrategy {
    pub const ORDER: [RestoreStrategy; 3] = [
        RestoreStrategy::BrowserBack,
        RestoreStrategy::PageHistoryBack,
        RestoreStrategy::FrameHistoryBack,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RestoreStrategy::BrowserBack => "browser_back",
            RestoreStrategy::PageHistoryBack => "page_history_back",
            RestoreStrategy::FrameHistoryBack => "frame_history_back",
        }
    }

    async fn attempt(
        &self,
        page: &dyn PortalPage,
        listing: &Scope,
        config: &ResolvedConfig,
    ) -> Result<bool> {
        match self {
            RestoreStrategy::BrowserBack => page.go_back(config.timeouts.back_navigation).await,
            RestoreStrategy::PageHistoryBack => {
                page.evaluate(&Scope::Page, HISTORY_BACK).await?;
                Ok(true)
            }
            RestoreStrategy::FrameHistoryBack => {
                page.evaluate(listing, HISTORY_BACK).await?;
                Ok(true)
            }
        }
    }
}

impl fmt::Display for RestoreStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Navigate back to the listing and wait for its rows.
///
/// `listing` is the frame scope the detail was opened from. Rows that do not
/// reappear are logged, not fatal; only every strategy failing is an error.
pub async fn restore_listing(
    page: &dyn PortalPage,
    config: &ResolvedConfig,
    listing: &Scope,
) -> Result<RestoreStrategy> {
    let timeouts = &config.timeouts;
    let mut failures = Vec::new();

    let mut restored = None;
    for strategy in RestoreStrategy::ORDER {
        let outcome =
            tokio::time::timeout(timeouts.back_navigation, strategy.attempt(page, listing, config))
                .await;
        match outcome {
            Ok(Ok(true)) => {
                restored = Some(strategy);
                break;
            }
            Ok(Ok(false)) => failures.push(format!("{strategy}: no navigation")),
            Ok(Err(e)) => failures.push(format!("{strategy}: {e}")),
            Err(_) => failures.push(format!("{strategy}: timed out")),
        }
        tracing::debug!(strategy = %strategy, "Restoration strategy failed");
    }

    let Some(strategy) = restored else {
        let err = AutomationError::RestorationFailed {
            attempts: failures.join("; "),
        };
        tracing::warn!(error = %err, "Could not return to listing");
        return Err(err.into());
    };

    let selectors = &config.selectors.nps;
    let rows = async {
        let scope = resolve_frame(
            page,
            &selectors.frame,
            timeouts.frame_resolve,
            timeouts.poll_interval,
        )
        .await?;
        wait_for_element(
            page,
            &scope,
            &selectors.rows,
            timeouts.restore_rows,
            timeouts.poll_interval,
        )
        .await
    };
    match rows.await {
        Ok(_) => tracing::info!(strategy = %strategy, "Returned to listing"),
        Err(e) => {
            tracing::warn!(strategy = %strategy, error = %e, "Listing rows did not reappear")
        }
    }

    Ok(strategy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategies_run_browser_then_page_then_frame() {
        let names: Vec<_> = RestoreStrategy::ORDER.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec!["browser_back", "page_history_back", "frame_history_back"]
        );
    }
}
