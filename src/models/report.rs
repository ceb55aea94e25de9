use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    DeclarationResult, IdentifierRecord, Match, PaymentRecord, PeriodWindow, TributeBundle,
};
use crate::normalize::parse_amount;

/// Consolidated result of one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub window: PeriodWindow,
    pub declarations: Vec<DeclarationResult>,
    pub payments: Vec<PaymentRecord>,
    pub identifiers: Vec<IdentifierRecord>,
    pub matches: Vec<Match>,
    pub tributes: Vec<TributeBundle>,
    pub summary: ReportSummary,
}

/// Totals over the report's amounts. Sums are decimal strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub declarations_read: usize,
    pub declared_tax_due: String,
    pub payments_total: String,
    pub matched_total: String,
    pub tributes_total: String,
    pub failed_drilldowns: usize,
    /// Amounts that could not be parsed and were left out of the sums.
    pub unparsed_amounts: usize,
}

#[derive(Default)]
struct Sum {
    total: Decimal,
    unparsed: usize,
}

impl Sum {
    fn add(&mut self, raw: &str) {
        match parse_amount(raw) {
            Some(value) => self.total += value,
            None => self.unparsed += 1,
        }
    }
}

impl ReportSummary {
    pub fn compute(
        declarations: &[DeclarationResult],
        payments: &[PaymentRecord],
        matches: &[Match],
        tributes: &[TributeBundle],
    ) -> Self {
        let mut declared = Sum::default();
        let mut declarations_read = 0;
        for value in declarations.iter().filter_map(|d| d.total_tax_due.as_deref()) {
            declarations_read += 1;
            // A blank total is a legitimate "nothing due" reading, not a parse failure.
            if !value.trim().is_empty() {
                declared.add(value);
            }
        }

        let mut paid = Sum::default();
        for payment in payments {
            paid.add(&payment.amount);
        }

        let mut matched = Sum::default();
        for m in matches {
            matched.add(&m.payment.amount);
        }

        let mut tributed = Sum::default();
        for tribute in tributes.iter().flat_map(|b| b.tributes.iter()) {
            tributed.add(&tribute.amount);
        }

        Self {
            declarations_read,
            declared_tax_due: declared.total.normalize().to_string(),
            payments_total: paid.total.normalize().to_string(),
            matched_total: matched.total.normalize().to_string(),
            tributes_total: tributed.total.normalize().to_string(),
            failed_drilldowns: tributes.iter().filter(|b| b.error.is_some()).count(),
            unparsed_amounts: declared.unparsed
                + paid.unparsed
                + matched.unparsed
                + tributed.unparsed,
        }
    }
}
