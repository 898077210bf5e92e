//! Configuration loading, env substitution, and env overrides.
//!
//! Config files: `skillshelf.toml`, `skillshelf.yaml`, or `skillshelf.json`
//! Searched in `./` then the user config directory.
//!
//! Supports `${ENV_VAR}` substitution in the raw file text.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        apply_env_overrides, config_dir, data_dir, default_skills_dir, discover_and_load, load,
        load_config,
    },
    schema::{LoggingConfig, MirrorsConfig, ShelfConfig, SkillsConfig},
};
