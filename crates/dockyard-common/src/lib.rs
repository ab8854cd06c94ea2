//! dockyard-common: shared error type and identifiers used across all Dockyard crates.

pub mod error;
pub mod ids;

// Re-export commonly used types
pub use error::{DockyardError, Result};
pub use ids::{RunId, SessionId};
