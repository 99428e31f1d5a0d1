use std::path::{Path, PathBuf};

use clap::Parser;
use config::{builder::DefaultState, ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-1.5-flash-latest";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STORE_PATH: &str = "salesbot-profile";

#[derive(Parser, Debug)]
#[command(version, about = "Query understanding and recommendation engine")]
pub struct Args {
    /// Path to the local configuration TOML file.
    #[arg(short, value_name = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Path to a JSON file with the scraped candidate products.
    #[arg(short, long, value_name = "PRODUCTS_PATH")]
    pub products: PathBuf,

    /// Queries to run through the engine, in order.
    #[arg(required = true, value_name = "QUERY")]
    pub queries: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningSettings {
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub reasoning: ReasoningSettings,
    pub store: StoreSettings,
}

impl Settings {
    /// Load settings from the given TOML file, with sane defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let cfg = Self::builder()?.add_source(File::from(path)).build()?;
        cfg.try_deserialize()
    }

    /// Defaults only, for running without a configuration file.
    pub fn default_values() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        ConfigBuilder::<DefaultState>::default()
            .set_default("reasoning.endpoint", DEFAULT_ENDPOINT)?
            .set_default("reasoning.model", DEFAULT_MODEL)?
            .set_default("reasoning.timeout_secs", DEFAULT_TIMEOUT_SECS)?
            .set_default("store.path", DEFAULT_STORE_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_without_a_file() {
        let settings = Settings::default_values().unwrap();
        assert_eq!(settings.reasoning.model, DEFAULT_MODEL);
        assert_eq!(settings.reasoning.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(settings.reasoning.api_key.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "[reasoning]\napi_key = \"k\"\ntimeout_secs = 5\n\n[store]\npath = \"/tmp/p\""
        )
        .unwrap();
        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.reasoning.api_key.as_deref(), Some("k"));
        assert_eq!(settings.reasoning.timeout_secs, 5);
        assert_eq!(settings.store.path, PathBuf::from("/tmp/p"));
        // Untouched keys keep their defaults.
        assert_eq!(settings.reasoning.endpoint, DEFAULT_ENDPOINT);
    }
}
