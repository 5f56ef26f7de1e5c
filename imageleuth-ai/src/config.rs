//! Configuration resolution for imageleuth-ai
//!
//! Recognition API key priority: ENV (`OPENAI_API_KEY`) → TOML `[recognizer].api_key`.

use imageleuth_common::config::TomlConfig;
use imageleuth_common::{Error, Result};
use tracing::{info, warn};

/// Environment variable holding the vision model API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Resolve the vision model API key
pub fn resolve_api_key(toml_config: &TomlConfig) -> Result<String> {
    resolve_api_key_from(std::env::var(API_KEY_ENV).ok(), toml_config)
}

fn resolve_api_key_from(env_key: Option<String>, toml_config: &TomlConfig) -> Result<String> {
    let env_key = env_key.filter(|key| is_valid_key(key));
    let toml_key = toml_config
        .recognizer
        .api_key
        .clone()
        .filter(|key| is_valid_key(key));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "API key found in both {} and TOML config. Using environment variable.",
            API_KEY_ENV
        );
    }

    if let Some(key) = env_key {
        info!("Recognition API key loaded from environment variable");
        return Ok(key.trim().to_string());
    }

    if let Some(key) = toml_key {
        info!("Recognition API key loaded from TOML config");
        return Ok(key.trim().to_string());
    }

    Err(Error::Config(format!(
        "Recognition API key not configured. Please configure using one of:\n\
         1. Environment: {}=your-key-here\n\
         2. TOML config: [recognizer] api_key = \"your-key\" in imageleuth.toml",
        API_KEY_ENV
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
