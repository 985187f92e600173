use std::env;

use config::{
    builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File, FileFormat,
    FileStoredFormat,
};

use crate::{log_debug, log_warn};

pub const CONFIG_STR: &str = "CONFIG_STR";
pub const CONFIG_STR_FORMAT: &str = "CONFIG_STR_FMT";

/// Builds the layered configuration of a tool.
///
/// Sources, from the lowest to the highest priority:
/// 1. whatever `config_builder` sets (typically defaults),
/// 2. a file named `file_name` (any supported extension) found in the current
///    directory or one of its ancestors,
/// 3. an inline string in `<PREFIX>_CONFIG_STR` with its format in
///    `<PREFIX>_CONFIG_STR_FMT`,
/// 4. environment variables starting with `<PREFIX>_`, where `__` separates
///    nested keys.
pub fn load_config(
    file_name: &str,
    env_prefix: &str,
    config_builder: impl FnOnce(
        ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError>,
) -> Result<Config, ConfigError> {
    let mut builder = config_builder(Config::builder())?;

    let file_path = crate::utils::search_current_ancestor_dirs_for(file_name)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());
    log_debug!("Looking for configuration file at: {}", file_path);
    builder = builder.add_source(File::with_name(&file_path).required(false));

    if let Some((str, format)) = Option::zip(
        env::var(format!("{env_prefix}_{CONFIG_STR}")).ok(),
        env::var(format!("{env_prefix}_{CONFIG_STR_FORMAT}")).ok(),
    ) {
        match try_parse_format(&format) {
            Ok(format) => builder = builder.add_source(File::from_str(str.as_str(), format)),
            Err(format) => log_warn!("Unknown format for config string: {}", format),
        }
    }

    builder = builder.add_source(
        Environment::with_prefix(env_prefix)
            .prefix_separator("_")
            .separator("__"),
    );

    builder
        .build()
        .inspect(|c| log_debug!("Loaded raw configurations: {:?}", c))
}

fn try_parse_format(format: &str) -> Result<FileFormat, &str> {
    use FileFormat::*;
    let all_formats = [Toml, Json, Json5, Yaml, Ron, Ini];
    all_formats
        .into_iter()
        .find(|f| f.file_extensions().contains(&format))
        .ok_or(format)
}
