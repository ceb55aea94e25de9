use serde::{Deserialize, Serialize};

use super::Period;

/// Outcome of querying one declaration period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarationResult {
    pub month: String,
    pub year: String,
    /// Trimmed "total tax due" text; `None` when the period could not be read.
    pub total_tax_due: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeclarationResult {
    pub fn read(period: &Period, total_tax_due: impl Into<String>) -> Self {
        Self {
            month: period.month_value(),
            year: period.year_value(),
            total_tax_due: Some(total_tax_due.into()),
            error: None,
        }
    }

    pub fn failed(period: &Period, error: impl Into<String>) -> Self {
        Self {
            month: period.month_value(),
            year: period.year_value(),
            total_tax_due: None,
            error: Some(error.into()),
        }
    }
}

/// One row of the payment listing, as displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub presentation_date: String,
    pub amount: String,
}

impl PaymentRecord {
    pub fn new(presentation_date: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            presentation_date: presentation_date.into(),
            amount: amount.into(),
        }
    }
}

/// One row of the NPS listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierRecord {
    pub presentation_date: String,
    pub amount: String,
    /// Text of the row's detail link (the NPS number), when the row has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
}

impl IdentifierRecord {
    pub fn new(presentation_date: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            presentation_date: presentation_date.into(),
            amount: amount.into(),
            number: None,
        }
    }

    pub fn with_number(mut self, number: impl Into<String>) -> Self {
        self.number = Some(number.into());
        self
    }
}

/// A payment and an identifier sharing the same normalized date and amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub normalized_date: String,
    pub normalized_amount: String,
    pub payment: PaymentRecord,
    pub identifier: IdentifierRecord,
}

/// One line item of an identifier's detail view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TributeRecord {
    pub period: Option<String>,
    pub concept: String,
    pub amount: String,
}

/// Everything read from one identifier's detail view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TributeBundle {
    /// `None` when the listing row or its link could not be resolved.
    pub identifier_number: Option<String>,
    pub amount: String,
    pub tributes: Vec<TributeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TributeBundle {
    pub fn failed(
        identifier_number: Option<String>,
        amount: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            identifier_number,
            amount: amount.into(),
            tributes: Vec::new(),
            error: Some(error.into()),
        }
    }
}
