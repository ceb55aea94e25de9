//! The portal automation pipeline.
//!
//! Session 1 reads declaration totals per period. Session 2 reads the payment
//! listing and the NPS listing, which are reconciled into matches whose NPS
//! details are then drilled into. [`SyncOrchestrator`] runs all of it.

pub mod declarations;
pub mod drilldown;
pub mod frames;
pub mod listings;
pub mod login;
mod orchestrator;
pub mod reconcile;
pub mod restore;
pub mod tributes;

pub use orchestrator::SyncOrchestrator;
pub use reconcile::reconcile;
pub use restore::RestoreStrategy;
pub use tributes::extract_tributes;
