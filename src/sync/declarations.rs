//! Session 1: per-period declaration query.
//!
//! Each period runs select, submit, locate the result link, then either open the
//! detail and read the total, skip a hidden result, or abort the remaining
//! periods when the query produced no result structure at all.

use anyhow::{Context, Result};

use super::frames::{resolve_frame, settle, wait_for_element};
use super::login::open_menu;
use crate::config::{FormFilter, RangeSelectors, ResolvedConfig};
use crate::error::AutomationError;
use crate::models::{DeclarationResult, Period};
use crate::portal::{PortalPage, Scope};

enum PeriodOutcome {
    Read(String),
    Hidden,
}

/// Navigate from the menu to the declaration query and wait for its frame.
pub async fn open_query(page: &dyn PortalPage, config: &ResolvedConfig) -> Result<()> {
    let selectors = &config.selectors.declarations;
    open_menu(page, config, &selectors.menu).await?;
    resolve_frame(
        page,
        &selectors.frame,
        config.timeouts.frame_resolve,
        config.timeouts.poll_interval,
    )
    .await
    .context("Declaration query did not open")?;
    Ok(())
}

/// Query every period in order. Stops early, keeping what was read, when a
/// query returns no result structure.
pub async fn query_declarations(
    page: &dyn PortalPage,
    config: &ResolvedConfig,
    periods: &[Period],
) -> Vec<DeclarationResult> {
    let mut results = Vec::with_capacity(periods.len());

    for period in periods {
        match query_period(page, config, period).await {
            Ok(PeriodOutcome::Read(total)) => {
                tracing::info!(period = %period, total = %total, "Read declaration");
                results.push(DeclarationResult::read(period, total));
            }
            Ok(PeriodOutcome::Hidden) => {
                tracing::info!(period = %period, "Result present but hidden, skipping period");
            }
            Err(err) => {
                if let Some(abort @ AutomationError::QueryAborted { .. }) =
                    AutomationError::find(&err)
                {
                    tracing::warn!(period = %period, error = %abort, "Stopping declaration query");
                    break;
                }
                let message = format!("{err:#}");
                tracing::warn!(period = %period, error = %message, "Declaration query failed");
                results.push(DeclarationResult::failed(period, message));
            }
        }
    }

    results
}

async fn query_period(
    page: &dyn PortalPage,
    config: &ResolvedConfig,
    period: &Period,
) -> Result<PeriodOutcome> {
    let timeouts = &config.timeouts;
    let selectors = &config.selectors.declarations;

    // The form resets between periods and may re-render its frame.
    let scope = resolve_frame(
        page,
        &selectors.frame,
        timeouts.frame_resolve,
        timeouts.poll_interval,
    )
    .await?;

    apply_form_filter(page, &scope, &selectors.form_filter, config).await;
    select_range(page, &scope, &selectors.range, period, period).await?;
    page.click(&scope, &selectors.search).await?;
    settle(timeouts.submit_settle).await;

    let links = page.count(&scope, &selectors.result_link).await?;
    if links.attached == 0 {
        return Err(AutomationError::QueryAborted {
            period: period.to_string(),
        }
        .into());
    }
    if links.visible == 0 {
        return Ok(PeriodOutcome::Hidden);
    }

    page.click_nth(&scope, &selectors.result_link, 0, true)
        .await
        .context("Failed to open declaration detail")?;
    settle(timeouts.detail_settle).await;

    wait_for_element(
        page,
        &scope,
        &selectors.total,
        timeouts.element_wait,
        timeouts.poll_interval,
    )
    .await?;
    let total = page
        .read_text(&scope, &selectors.total)
        .await?
        .unwrap_or_default()
        .trim()
        .to_string();

    if let Err(e) = page.click_nth(&scope, &selectors.close_detail, 0, true).await {
        tracing::warn!(period = %period, error = %e, "Failed to close declaration detail");
    }

    Ok(PeriodOutcome::Read(total))
}

/// Reapply the form-type filter. Every step is best-effort.
async fn apply_form_filter(
    page: &dyn PortalPage,
    scope: &Scope,
    filter: &FormFilter,
    config: &ResolvedConfig,
) {
    if let Err(e) = page.click(scope, &filter.clear_all).await {
        tracing::debug!(error = %e, "No form chip to clear");
    }
    if let Err(e) = page.fill(scope, &filter.search_input, &filter.value).await {
        tracing::warn!(error = %e, "Form filter search box unavailable");
        return;
    }
    settle(config.timeouts.poll_interval).await;
    if let Err(e) = page.click(scope, &filter.option).await {
        tracing::warn!(form = %filter.value, error = %e, "Form filter option not found");
    }
    if let Err(e) = page.click(scope, &filter.blur).await {
        tracing::debug!(error = %e, "Failed to close form filter");
    }
}

/// Write a `from..=to` period range into the four range selects.
pub(crate) async fn select_range(
    page: &dyn PortalPage,
    scope: &Scope,
    range: &RangeSelectors,
    from: &Period,
    to: &Period,
) -> Result<()> {
    page.select_option(scope, &range.month_start, &from.month_value()).await?;
    page.select_option(scope, &range.year_start, &from.year_value()).await?;
    page.select_option(scope, &range.month_end, &to.month_value()).await?;
    page.select_option(scope, &range.year_end, &to.year_value()).await?;
    Ok(())
}
