//! External tool execution
//!
//! - `ProcessRunner`: the production `ToolRunner`, spawning child processes
//!   (optionally chained through their standard streams) under a deadline
//! - `Toolchain`: builds the argument vectors for every pipeline stage

mod process;
mod toolchain;

pub use process::ProcessRunner;
pub use toolchain::Toolchain;
