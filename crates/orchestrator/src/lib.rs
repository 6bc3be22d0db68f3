//! Orchestrator - admission, job registry and the scan pipeline
//!
//! - `ScanOrchestrator`: request/status API used by front ends
//! - `JobRegistry`: the only shared-mutable job store, owning admission
//! - `PipelineExecutor`: discovery, collection, vulnerability scan, ingestion

mod admission;
mod orchestrator;
mod pipeline;
mod progress;
mod registry;

#[cfg(test)]
mod testing;

pub use admission::AdmissionController;
pub use orchestrator::ScanOrchestrator;
pub use pipeline::PipelineExecutor;
pub use progress::{CollectionTally, ProgressPlan};
pub use registry::JobRegistry;
