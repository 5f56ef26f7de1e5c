//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `IMAGELEUTH_ROOT_FOLDER`
//! 3. TOML config file (`root_folder`)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file never stops the service: a warning is
//! logged and compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the data root folder
pub const ROOT_FOLDER_ENV: &str = "IMAGELEUTH_ROOT_FOLDER";

/// Config file name searched in the platform config directories
pub const CONFIG_FILE_NAME: &str = "imageleuth.toml";

const DEFAULT_LOG_FILTER: &str = "imageleuth_ai=info,tower_http=info";
const DEFAULT_MODEL: &str = "gpt-4.1";
const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:5000";

/// Contents of `imageleuth.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Data root (database, batch workspaces, export output)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Socket address the HTTP server binds to
    #[serde(default)]
    pub bind_address: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub recognizer: RecognizerConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub level: String,
}

/// `[recognizer]` section: the vision model endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizerConfig {
    /// API key; the `OPENAI_API_KEY` environment variable takes priority
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Chat-completions URL (OpenAI or any compatible gateway)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// `[http]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// CORS allow-list; empty allows any origin
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Request body limit for multipart uploads
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Number of records echoed back after a batch
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_max_tokens() -> u32 {
    500
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_upload_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_preview_limit() -> usize {
    5
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_filter(),
        }
    }
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            endpoint: default_endpoint(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
            preview_limit: default_preview_limit(),
        }
    }
}

impl TomlConfig {
    /// Parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }

    /// Load from the first config file found, falling back to defaults
    pub fn load_or_default(explicit: Option<&Path>) -> Self {
        let path = match explicit.map(Path::to_path_buf).or_else(find_config_file) {
            Some(path) => path,
            None => {
                warn!("No {} found, using compiled defaults", CONFIG_FILE_NAME);
                return Self::default();
            }
        };

        match Self::load(&path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                warn!("{}; using compiled defaults", e);
                Self::default()
            }
        }
    }

    /// Bind address with compiled default applied
    pub fn bind_address(&self) -> String {
        self.bind_address
            .clone()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string())
    }
}

/// Locate the config file: user config dir first, then `/etc/imageleuth`
pub fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("imageleuth").join(CONFIG_FILE_NAME));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/imageleuth").join(CONFIG_FILE_NAME);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Resolves the data root folder from CLI, environment, TOML and defaults
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_value = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_value {
            return path.clone();
        }

        default_root_folder()
    }
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("imageleuth"))
        .unwrap_or_else(|| PathBuf::from("./imageleuth_data"))
}

/// Creates the data root layout and hands out its well-known paths
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create root, `temp/` and `output/` if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        for dir in [self.root.clone(), self.temp_dir(), self.output_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                Error::Config(format!("Cannot create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join("imageleuth.db")
    }

    /// Parent of the per-batch workspaces
    pub fn temp_dir(&self) -> PathBuf {
        self.root.join("temp")
    }

    /// Export artifacts (spreadsheets, archives)
    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }
}
