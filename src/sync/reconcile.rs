//! Pairs payments with NPS identifiers on normalized (date, amount).

use crate::models::{IdentifierRecord, Match, PaymentRecord};
use crate::normalize::{normalize_amount, normalize_date};

/// First identifier matching each payment, in payment order.
///
/// At most one match per payment. An identifier may satisfy several payments.
/// Records with an empty normalized date or amount never match.
pub fn reconcile(payments: &[PaymentRecord], identifiers: &[IdentifierRecord]) -> Vec<Match> {
    let keyed: Vec<_> = identifiers
        .iter()
        .filter_map(|identifier| {
            let key = key(&identifier.presentation_date, &identifier.amount);
            if key.is_none() {
                tracing::debug!(
                    date = %identifier.presentation_date,
                    amount = %identifier.amount,
                    "Identifier has an empty key, not matchable"
                );
            }
            key.map(|key| (key, identifier))
        })
        .collect();

    let mut matches = Vec::new();
    for payment in payments {
        let Some((date, amount)) = key(&payment.presentation_date, &payment.amount) else {
            tracing::debug!(
                date = %payment.presentation_date,
                amount = %payment.amount,
                "Payment has an empty key, not matchable"
            );
            continue;
        };

        if let Some((_, identifier)) = keyed
            .iter()
            .find(|((id_date, id_amount), _)| *id_date == date && *id_amount == amount)
        {
            matches.push(Match {
                normalized_date: date,
                normalized_amount: amount,
                payment: payment.clone(),
                identifier: (*identifier).clone(),
            });
        }
    }

    tracing::info!(
        payments = payments.len(),
        identifiers = identifiers.len(),
        matches = matches.len(),
        "Reconciled listings"
    );
    matches
}

fn key(date: &str, amount: &str) -> Option<(String, String)> {
    let date = normalize_date(date);
    let amount = normalize_amount(amount);
    if date.is_empty() || amount.is_empty() {
        None
    } else {
        Some((date, amount))
    }
}
