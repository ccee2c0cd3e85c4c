//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("orchestrator.max_concurrent_generations", 3)?
        .set_default("storage.artifact_dir", "outputs")?
        .set_default("storage.input_dir", "outputs/inputs")?
        .set_default("backends.primary", "local")
}
