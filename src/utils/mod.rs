//! Ambient configuration: environment-driven startup config plus the
//! hot-reloadable retrieval tunables layered on top of it.

pub mod config;
pub mod tunables;

pub use config::RagConfig;
pub use tunables::{Tunables, TunablesManager};
