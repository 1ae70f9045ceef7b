pub mod config;
pub mod logger;
pub mod settings;
pub mod tempfiles;

pub use config::*;
pub use logger::{Colors, setup_logging};
pub use settings::{Settings, load_settings};
pub use tempfiles::RunTempDir;
