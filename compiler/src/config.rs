use std::path::PathBuf;

use serde::Deserialize;

use crate::constants::{CONFIG_ENV_PREFIX, CONFIG_FILENAME};
use common::log_info;

#[derive(Debug, Default, Clone, Deserialize)]
pub struct InstrumenterConfig {
    /// The assertion library module linked into the target.
    #[serde(default)]
    pub library_path: Option<PathBuf>,
    #[serde(default)]
    pub return_assertions: ReturnAssertionPolicy,
    #[serde(default)]
    pub verify_each: bool,
    #[serde(default)]
    pub print_each: bool,
}

impl InstrumenterConfig {
    const F_RETURN_ASSERTIONS: &'static str = "return_assertions";
    const F_VERIFY_EACH: &'static str = "verify_each";
    const F_PRINT_EACH: &'static str = "print_each";
}

/// What to do with a function that carries several return-value assertions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnAssertionPolicy {
    /// Instrument the first one, warn about the rest.
    #[default]
    #[serde(alias = "first_wins")]
    First,
    /// Fail the run.
    #[serde(alias = "error")]
    Reject,
}

impl ReturnAssertionPolicy {
    const V_FIRST: &'static str = "first";
}

pub(super) fn load_config() -> Result<InstrumenterConfig, config::ConfigError> {
    common::config::load_config(CONFIG_FILENAME, CONFIG_ENV_PREFIX, |b| {
        Ok(b)
            .and_then(|b| {
                b.set_default(
                    InstrumenterConfig::F_RETURN_ASSERTIONS,
                    ReturnAssertionPolicy::V_FIRST,
                )
            })
            .and_then(|b| b.set_default(InstrumenterConfig::F_VERIFY_EACH, false))
            .and_then(|b| b.set_default(InstrumenterConfig::F_PRINT_EACH, false))
    })
    .and_then(|c| c.try_deserialize())
    .inspect(|c| log_info!("Loaded configurations: {:?}", c))
}

#[cfg(test)]
mod tests {
    use super::*;

    use config::{Config, File, FileFormat};

    fn parse(toml: &str) -> InstrumenterConfig {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .unwrap()
    }

    #[test]
    fn missing_keys_take_defaults() {
        let config = parse("");
        assert_eq!(config.return_assertions, ReturnAssertionPolicy::First);
        assert!(config.library_path.is_none());
        assert!(!config.verify_each);
    }

    #[test]
    fn keys_are_read() {
        let config = parse(
            r#"
            library_path = "lib/assertions.json"
            return_assertions = "reject"
            print_each = true
            "#,
        );
        assert_eq!(config.return_assertions, ReturnAssertionPolicy::Reject);
        assert_eq!(
            config.library_path,
            Some(PathBuf::from("lib/assertions.json"))
        );
        assert!(config.print_each);
    }
}
