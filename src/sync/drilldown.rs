//! Per-match detail drill-down on the NPS listing.
//!
//! For every match the listing is located afresh, the row carrying the match's
//! amount is clicked, the detail view's tributes are read and the listing is
//! restored before the next match.

use std::collections::HashSet;

use anyhow::{Context, Result};

use super::frames::{resolve_frame, settle, wait_for_element};
use super::listings::{find_listing_table, read_listing_tables};
use super::restore::restore_listing;
use super::tributes::extract_tributes;
use crate::config::ResolvedConfig;
use crate::error::AutomationError;
use crate::models::{Match, TributeBundle, TributeRecord};
use crate::normalize::normalize_amount;
use crate::portal::{PortalPage, Scope};

/// How far one drill-down got, for recording and recovering from failures.
#[derive(Default)]
struct Progress {
    number: Option<String>,
    /// Set once the detail link was clicked; the listing then needs restoring.
    opened: Option<Scope>,
}

/// Drill into each match's identifier once, in match order.
pub async fn drill_down(
    page: &dyn PortalPage,
    config: &ResolvedConfig,
    matches: &[Match],
) -> Vec<TributeBundle> {
    let mut processed = HashSet::new();
    let mut bundles = Vec::new();

    for m in matches {
        let mut progress = Progress::default();
        match drill_one(page, config, m, &mut processed, &mut progress).await {
            Ok(Some(bundle)) => bundles.push(bundle),
            Ok(None) => {}
            Err(err) => {
                let message = format!("{err:#}");
                tracing::warn!(
                    number = ?progress.number,
                    amount = %m.identifier.amount,
                    error = %message,
                    "Drill-down failed"
                );
                if let Some(listing) = &progress.opened {
                    // The next match re-locates the listing anyway.
                    if let Err(e) = restore_listing(page, config, listing).await {
                        tracing::debug!(error = %e, "Listing not restored after failure");
                    }
                }
                bundles.push(TributeBundle::failed(
                    progress.number,
                    m.identifier.amount.clone(),
                    message,
                ));
            }
        }
    }

    bundles
}

async fn drill_one(
    page: &dyn PortalPage,
    config: &ResolvedConfig,
    m: &Match,
    processed: &mut HashSet<String>,
    progress: &mut Progress,
) -> Result<Option<TributeBundle>> {
    let timeouts = &config.timeouts;
    let selectors = &config.selectors.nps;

    let listing = resolve_frame(
        page,
        &selectors.frame,
        timeouts.frame_resolve,
        timeouts.poll_interval,
    )
    .await?;
    let tables = read_listing_tables(page, &listing, config).await?;
    let table = find_listing_table(
        &tables,
        &selectors.signature,
        Some(selectors.amount_header.as_str()),
    )
    .context("NPS listing table not found")?;

    let amount = normalize_amount(&m.identifier.amount);
    let row = table
        .rows
        .iter()
        .find(|row| {
            row.cells
                .get(selectors.amount_column)
                .is_some_and(|cell| normalize_amount(cell) == amount)
        })
        .with_context(|| format!("No listing row with amount {}", m.identifier.amount))?;
    let number = row
        .link
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .with_context(|| format!("Listing row {} has no identifier link", row.index))?;
    progress.number = Some(number.clone());

    if !processed.insert(number.clone()) {
        tracing::info!(number = %number, "Identifier already drilled into, skipping");
        return Ok(None);
    }

    tracing::info!(number = %number, amount = %m.identifier.amount, "Opening NPS detail");
    page.click_row_link(&listing, table.index, row.index).await?;
    progress.opened = Some(listing.clone());
    settle(timeouts.detail_settle).await;

    let tributes = match read_tributes(page, config).await {
        Ok(tributes) => tributes,
        Err(e) if matches!(AutomationError::find(&e), Some(AutomationError::ExtractionEmpty)) => {
            tracing::info!(number = %number, "Detail view has no tribute rows");
            Vec::new()
        }
        Err(e) => return Err(e),
    };
    tracing::info!(number = %number, tributes = tributes.len(), "Read NPS detail");

    // The tributes were read; a listing that cannot be restored fails the next match instead.
    if let Err(e) = restore_listing(page, config, &listing).await {
        tracing::debug!(number = %number, error = %e, "Listing not restored after detail");
    }

    Ok(Some(TributeBundle {
        identifier_number: Some(number),
        amount: m.identifier.amount.clone(),
        tributes,
        error: None,
    }))
}

async fn read_tributes(
    page: &dyn PortalPage,
    config: &ResolvedConfig,
) -> Result<Vec<TributeRecord>> {
    let timeouts = &config.timeouts;
    let selectors = &config.selectors.nps;

    let detail = resolve_frame(
        page,
        &selectors.frame,
        timeouts.frame_resolve,
        timeouts.poll_interval,
    )
    .await?;
    wait_for_element(
        page,
        &detail,
        &selectors.detail_ready,
        timeouts.element_wait,
        timeouts.poll_interval,
    )
    .await?;

    let tributes = extract_tributes(&page.read_tables(&detail).await?);
    if tributes.is_empty() {
        return Err(AutomationError::ExtractionEmpty.into());
    }
    Ok(tributes)
}
