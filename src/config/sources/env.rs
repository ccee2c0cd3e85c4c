//! Environment overrides: `SCULPT__BACKENDS__REMOTE__API_KEY` sets `backends.remote.api_key`.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix("SCULPT")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    )
}
