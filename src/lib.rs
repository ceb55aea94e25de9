pub mod clock;
pub mod config;
pub mod credentials;
pub mod duration;
pub mod error;
pub mod models;
pub mod normalize;
pub mod portal;
pub mod sync;

pub use error::AutomationError;
pub use models::PortalReport;
pub use sync::SyncOrchestrator;
