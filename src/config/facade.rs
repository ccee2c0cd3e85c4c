//! Entry point for loading [`SculptConfig`] from all sources.

use super::merge::merge_policy;
use super::sources::{env, global_file, workspace_file};
use super::SculptConfig;
use config::{Config, ConfigError, File};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Order (later wins): defaults, global file, `config/config.toml`,
    /// `config/{SCULPT_ENV}.toml`, `SCULPT__*` environment variables.
    pub fn load(workspace_root: &Path) -> Result<SculptConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = env::add_to_builder(builder);

        let config: SculptConfig = builder.build()?.try_deserialize()?;
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        Ok(config)
    }

    /// Load configuration from a single file, ignoring all other sources.
    pub fn load_from_file(path: &Path) -> Result<SculptConfig, ConfigError> {
        Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize()
    }

    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }

    pub fn default() -> SculptConfig {
        SculptConfig::default()
    }
}
