//! Typed failure classes of the automation pipeline.
//!
//! Most code propagates `anyhow::Error`; these variants are wrapped inside it
//! and recovered with `downcast_ref` where a caller has to branch on the class
//! (skip a period, abort the loop, record an empty bundle).

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    /// No attached frame matched within the resolution bound.
    #[error("frame {target} not found after {waited:?}")]
    FrameNotFound { target: String, waited: Duration },

    /// Elements matched the locator but none of them is rendered.
    #[error("{locator} is present ({attached} attached) but not visible")]
    ElementNotVisible { locator: String, attached: usize },

    /// Nothing matched the locator within the wait bound.
    #[error("{locator} did not appear after {waited:?}")]
    ElementTimeout { locator: String, waited: Duration },

    /// The query returned no result structure at all.
    #[error("query for {period} returned no results; remaining periods aborted")]
    QueryAborted { period: String },

    /// Every navigation restoration strategy failed.
    #[error("could not restore listing: {attempts}")]
    RestorationFailed { attempts: String },

    /// The detail view contained no recognizable tribute rows.
    #[error("no tribute rows found in detail view")]
    ExtractionEmpty,

    /// Login did not reach the authenticated menu.
    #[error("login failed: {reason}")]
    LoginFailed { reason: String },

    /// A listing row is narrower than the configured column projection.
    #[error("table has {width} columns, column {column} required")]
    MissingColumn { column: usize, width: usize },
}

impl AutomationError {
    /// Returns the typed error inside an `anyhow::Error`, if there is one.
    pub fn find(err: &anyhow::Error) -> Option<&AutomationError> {
        err.downcast_ref::<AutomationError>()
    }
}
