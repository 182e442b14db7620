//! Command implementations
//!
//! All manual search CLI commands are implemented here.
//! Each module corresponds to a subcommand in the CLI.

pub mod build;
pub mod neighbors;
pub mod repl;
pub mod search;

// Re-export commonly used types
pub use build::{run as build_run, BuildArgs, BuildSummary};
pub use neighbors::run as neighbors_run;
pub use repl::run as repl_run;
pub use search::{open_engine, run as search_run, SearchArgs};
