//! Layered configuration loading
//!
//! Sources, lowest precedence first:
//! 1. the type's `Default` impl
//! 2. an optional TOML file
//! 3. `VOCALIS__SECTION__KEY` environment variables

use crate::error::{Error, Result};
use config::{Config, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Environment prefix used for overrides
pub const ENV_PREFIX: &str = "VOCALIS";

/// Load a configuration value from defaults, an optional TOML file and the environment
pub fn load_layered<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Serialize + Default,
{
    let defaults = Config::try_from(&T::default())?;
    let mut builder = Config::builder().add_source(defaults);

    if let Some(path) = path {
        if !path.exists() {
            return Err(Error::Configuration(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        if path.to_string_lossy().contains("..") {
            return Err(Error::Configuration(
                "Config path cannot contain '..'".to_string(),
            ));
        }
        debug!("Loading configuration from {}", path.display());
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let merged = builder.build()?;
    Ok(merged.try_deserialize()?)
}

/// Parse configuration from a TOML string on top of defaults (no environment)
pub fn from_toml_str<T>(contents: &str) -> Result<T>
where
    T: DeserializeOwned + Serialize + Default,
{
    let defaults = Config::try_from(&T::default())?;
    let merged = Config::builder()
        .add_source(defaults)
        .add_source(File::from_str(contents, FileFormat::Toml))
        .build()?;
    Ok(merged.try_deserialize()?)
}
