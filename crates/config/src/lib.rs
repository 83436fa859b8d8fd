//! Configuration loading and validation for `wicket`.
//!
//! Config files: `wicket.toml`, `wicket.yaml`, or `wicket.json`
//! Searched in `./` then `~/.config/wicket/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in the raw file.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, discover_and_load, find_config_file, load_config},
    schema::{HttpConfig, StorageConfig, StorageMode, WicketConfig},
    validate::{Diagnostic, Severity, ValidationResult},
};
