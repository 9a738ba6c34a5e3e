//! Configuration for the Colloq conversation memory service.
//!
//! Provides TOML-based configuration with:
//! - Per-concern sections (`[storage]`, `[memory]`, `[compaction]`, ...)
//! - Config file layering (XDG user config + project-local overrides)
//! - Environment overrides for the Redis location

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LayerKind, LoadedConfig, apply_env_overrides, data_dir, load_config,
    load_config_file, load_config_with_options, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
