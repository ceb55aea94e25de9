//! Runs the portal sessions in order and merges their results into a report.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use uuid::Uuid;

use super::declarations::{open_query, query_declarations};
use super::drilldown::drill_down;
use super::listings::{extract_identifiers, extract_payments};
use super::login::{dismiss_notices, login};
use super::reconcile::reconcile;
use crate::clock::{Clock, SystemClock};
use crate::config::ResolvedConfig;
use crate::credentials::{CookieJar, PortalCredentials};
use crate::models::{compute_six_month_window, expand_window, PortalReport, ReportSummary};
use crate::portal::{PortalBrowser, PortalPage};

/// Drives one browser through the declaration session, then the payment and
/// NPS session, and reconciles what they read.
pub struct SyncOrchestrator {
    browser: Arc<dyn PortalBrowser>,
    config: ResolvedConfig,
    clock: Arc<dyn Clock>,
}

impl SyncOrchestrator {
    pub fn new(browser: Arc<dyn PortalBrowser>, config: ResolvedConfig) -> Self {
        Self {
            browser,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn run(&self, credentials: &PortalCredentials) -> Result<PortalReport> {
        let config = &self.config;
        let selectors = &config.selectors;

        let run_id = Uuid::new_v4();
        let today = self.clock.today_in(config.portal.tz()?);
        let window = compute_six_month_window(today);
        let periods = expand_window(&window);
        tracing::info!(
            run_id = %run_id,
            start = %window.start(),
            end = %window.end(),
            periods = periods.len(),
            "Starting portal sync"
        );

        let jar = CookieJar::new(&config.session_file);

        // Session 1: declarations, on its own page.
        let page = self.browser.new_page().await?;
        restore_session(page.as_ref(), &jar).await;
        login(
            page.as_ref(),
            config,
            credentials,
            &config.portal.declarations_login_url,
            &selectors.declarations.ready,
        )
        .await
        .context("Declaration session login failed")?;
        save_session(page.as_ref(), &jar).await;

        open_query(page.as_ref(), config).await?;
        let declarations = query_declarations(page.as_ref(), config, &periods).await;
        tracing::info!(declarations = declarations.len(), "Declaration session finished");

        // Session 2: payment listing, then the NPS listing and its details on the same page.
        let page = self.browser.new_page().await?;
        login(
            page.as_ref(),
            config,
            credentials,
            &config.portal.payments_login_url,
            &selectors.payments.ready,
        )
        .await
        .context("Payment session login failed")?;
        dismiss_notices(page.as_ref(), config).await;

        let payments = extract_payments(page.as_ref(), config, &window).await?;
        let identifiers = extract_identifiers(page.as_ref(), config).await?;

        let matches = reconcile(&payments, &identifiers);
        let tributes = drill_down(page.as_ref(), config, &matches).await;

        let summary = ReportSummary::compute(&declarations, &payments, &matches, &tributes);
        tracing::info!(
            run_id = %run_id,
            payments = payments.len(),
            identifiers = identifiers.len(),
            matches = matches.len(),
            failed_drilldowns = summary.failed_drilldowns,
            "Portal sync finished"
        );

        Ok(PortalReport {
            run_id,
            generated_at: Utc::now(),
            window,
            declarations,
            payments,
            identifiers,
            matches,
            tributes,
            summary,
        })
    }
}

async fn restore_session(page: &dyn PortalPage, jar: &CookieJar) {
    let Some(cookies) = jar.load() else {
        return;
    };
    match page.set_cookies(&cookies).await {
        Ok(()) => tracing::info!(cookies = cookies.len(), "Restored previous session"),
        Err(e) => tracing::warn!(error = %e, "Failed to restore previous session"),
    }
}

async fn save_session(page: &dyn PortalPage, jar: &CookieJar) {
    let saved = async {
        let cookies = page.cookies().await?;
        jar.save(&cookies)?;
        anyhow::Ok(cookies.len())
    };
    match saved.await {
        Ok(count) => {
            tracing::debug!(cookies = count, path = %jar.path().display(), "Saved session")
        }
        Err(e) => tracing::warn!(error = %e, "Failed to save session"),
    }
}
