//! Session 2: payment listing (phase A) and NPS listing (phase B).

use anyhow::{Context, Result};

use super::declarations::select_range;
use super::frames::{resolve_frame, resolve_scope, settle, wait_for_element};
use super::login::open_menu;
use crate::config::{NpsSelectors, ResolvedConfig};
use crate::error::AutomationError;
use crate::models::{IdentifierRecord, PaymentRecord, PeriodWindow};
use crate::normalize::has_currency_marker;
use crate::portal::{PortalPage, Scope, TableRow, TableSnapshot};

/// Run the payment report over `window` and read its table in one snapshot.
pub async fn extract_payments(
    page: &dyn PortalPage,
    config: &ResolvedConfig,
    window: &PeriodWindow,
) -> Result<Vec<PaymentRecord>> {
    let timeouts = &config.timeouts;
    let selectors = &config.selectors.payments;

    open_menu(page, config, &selectors.menu).await?;
    let scope = resolve_scope(
        page,
        selectors.frame.as_ref(),
        timeouts.frame_resolve,
        timeouts.poll_interval,
    )
    .await
    .context("Payment report did not open")?;

    wait_for_element(
        page,
        &scope,
        &selectors.amount_paid,
        timeouts.element_wait,
        timeouts.poll_interval,
    )
    .await?;
    page.select_option(&scope, &selectors.amount_paid, &selectors.amount_paid_value).await?;
    select_range(page, &scope, &selectors.range, &window.start(), &window.end()).await?;
    page.click(&scope, &selectors.search).await?;
    settle(timeouts.submit_settle).await;

    wait_for_element(
        page,
        &scope,
        &selectors.first_row,
        timeouts.element_wait,
        timeouts.poll_interval,
    )
    .await
    .context("Payment report returned no rows")?;

    let table = page
        .read_table(&scope, &selectors.table)
        .await?
        .with_context(|| format!("Payment table {} not found", selectors.table))?;

    let payments = project_payments(&table, selectors.date_column, selectors.amount_column);
    tracing::info!(rows = table.rows.len(), payments = payments.len(), "Read payment listing");
    Ok(payments)
}

/// Go back to the menu start page and read the NPS listing.
pub async fn extract_identifiers(
    page: &dyn PortalPage,
    config: &ResolvedConfig,
) -> Result<Vec<IdentifierRecord>> {
    let selectors = &config.selectors.nps;

    if let Err(e) = page.click(&Scope::Page, &selectors.home).await {
        tracing::warn!(error = %e, "Failed to return to menu home");
    }
    open_menu(page, config, &selectors.menu).await?;

    let scope = resolve_frame(
        page,
        &selectors.frame,
        config.timeouts.frame_resolve,
        config.timeouts.poll_interval,
    )
    .await
    .context("NPS report did not open")?;

    let tables = read_listing_tables(page, &scope, config).await?;
    let Some(table) = find_listing_table(&tables, &selectors.signature, None) else {
        tracing::warn!(
            signature = %selectors.signature,
            tables = tables.len(),
            "No NPS listing table"
        );
        return Ok(Vec::new());
    };

    let identifiers = project_identifiers(table, selectors);
    tracing::info!(rows = table.rows.len(), identifiers = identifiers.len(), "Read NPS listing");
    Ok(identifiers)
}

/// Wait for the listing rows in `scope`, then snapshot every table.
pub(crate) async fn read_listing_tables(
    page: &dyn PortalPage,
    scope: &Scope,
    config: &ResolvedConfig,
) -> Result<Vec<TableSnapshot>> {
    wait_for_element(
        page,
        scope,
        &config.selectors.nps.rows,
        config.timeouts.element_wait,
        config.timeouts.poll_interval,
    )
    .await?;
    page.read_tables(scope).await
}

/// The first table whose text carries `signature` and, if given, whose header
/// row (or text) carries `header`.
pub(crate) fn find_listing_table<'a>(
    tables: &'a [TableSnapshot],
    signature: &str,
    header: Option<&str>,
) -> Option<&'a TableSnapshot> {
    tables.iter().find(|table| {
        table.contains_text(signature)
            && header.map_or(true, |header| {
                table.headers.iter().any(|h| h.contains(header)) || table.contains_text(header)
            })
    })
}

fn column<'a>(row: &'a TableRow, index: usize) -> Result<&'a str, AutomationError> {
    row.cells
        .get(index)
        .map(|cell| cell.trim())
        .ok_or(AutomationError::MissingColumn {
            column: index,
            width: row.cells.len(),
        })
}

/// Project date and amount columns; rows narrower than the projection are skipped.
pub fn project_payments(
    table: &TableSnapshot,
    date_column: usize,
    amount_column: usize,
) -> Vec<PaymentRecord> {
    table
        .rows
        .iter()
        .filter_map(|row| {
            let date = column(row, date_column);
            let amount = column(row, amount_column);
            match (date, amount) {
                (Ok(date), Ok(amount)) => Some(PaymentRecord::new(date, amount)),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::debug!(row = row.index, error = %e, "Skipping payment row");
                    None
                }
            }
        })
        .collect()
}

/// Project NPS rows, keeping those with a slash-dated date and a currency amount.
pub fn project_identifiers(
    table: &TableSnapshot,
    selectors: &NpsSelectors,
) -> Vec<IdentifierRecord> {
    table
        .rows
        .iter()
        .filter_map(|row| {
            let date = column(row, selectors.date_column).ok()?;
            let amount = column(row, selectors.amount_column).ok()?;
            if !date.contains('/') || !has_currency_marker(amount) {
                return None;
            }

            let record = IdentifierRecord::new(date, amount);
            let number = row
                .link
                .as_deref()
                .or_else(|| column(row, selectors.number_column).ok())
                .map(str::trim)
                .filter(|n| !n.is_empty());
            Some(match number {
                Some(number) => record.with_number(number),
                None => record,
            })
        })
        .collect()
}
