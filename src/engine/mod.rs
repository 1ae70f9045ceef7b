//! Engine module: worker pool, CLI surface and shared helpers

pub mod arg_parser;
pub mod cli;
pub mod handlers;
pub mod pool;
pub mod progress;
pub mod tools;

// Re-export commonly used items
pub use arg_parser::{Cli, Commands, CommonArgs};
pub use cli::handle_run;
pub use handlers::{handle_convert, handle_pipeline, handle_watch, plan_jobs};
pub use pool::{ProgressFn, WorkerPool};
pub use tools::{detect_format, normalize_format, path_relative_to};
