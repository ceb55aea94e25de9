mod period;
mod records;
mod report;

pub use period::{compute_six_month_window, expand_window, Period, PeriodWindow, WINDOW_MONTHS};
pub use records::{
    DeclarationResult, IdentifierRecord, Match, PaymentRecord, TributeBundle, TributeRecord,
};
pub use report::{PortalReport, ReportSummary};
