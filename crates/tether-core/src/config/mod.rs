//! Client configuration

pub mod loader;
pub mod options;

pub use loader::{apply_env_overrides, apply_process_env, load_from_file};
pub use options::{ClientOptions, DEFAULT_CLI_PATH, DEFAULT_LOG_LEVEL, LOG_LEVELS};
