//! Harrow Common - Shared types and traits
//!
//! This crate provides the core data model, error taxonomy, configuration
//! and collaborator traits used across the Harrow scan engine.
//!
//! Key pieces:
//! - `ScanJob` and its state machine (`JobState`, `JobUpdate`)
//! - normalized `Finding` records with canonical `Severity`
//! - `ToolRunner` / `PersistenceGateway` seams for external collaborators
//! - `EngineConfig` tunables with deployment presets

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{CommandError, RejectReason, ScanError, ScanResult};
pub use traits::{PersistenceGateway, PersistenceSession, ToolRunner};
pub use types::{
    CommandSpec, Finding, Invocation, JobId, JobState, JobUpdate, ScanJob, ScanRecordStatus,
    ScanSummary, Severity, SeverityStats, Stage,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
