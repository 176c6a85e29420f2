//! # Configuration
//!
//! `eavdb.toml`, parsed with `toml` + `serde`. Every field has a default, so
//! a missing file or a partial file is fine.
//!
//! ```toml
//! databases = ["session", "browser", "event", "view", "editor", "inspector"]
//! session = "session"
//! browser = "browser"
//!
//! [evaluation]
//! max_passes = 1000
//! # generated ids start here; lower ids are left to clients
//! id_seed = 0
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! ```

use eavdb_core::EavError;
use eavdb_core::EvaluationConfig;
use eavdb_core::primitives::{EVENT_DATABASE, SESSION_DATABASE};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the database `findNode` and `diff` replies look at.
pub const BROWSER_DATABASE: &str = "browser";

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Databases registered at evaluation start, in registration order.
    pub databases: Vec<String>,
    /// The database carrying the compiled Blocks.
    pub session: String,
    /// The outward-facing database.
    pub browser: String,
    pub evaluation: EvaluationConfig,
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            databases: [
                SESSION_DATABASE,
                BROWSER_DATABASE,
                EVENT_DATABASE,
                "view",
                "editor",
                "inspector",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            session: SESSION_DATABASE.to_string(),
            browser: BROWSER_DATABASE.to_string(),
            evaluation: EvaluationConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, EavError> {
        let config: Config = toml::from_str(text)
            .map_err(|e| EavError::SerializationError(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, EavError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let metadata = std::fs::metadata(path)
            .map_err(|e| EavError::IoError(format!("Cannot read config metadata: {}", e)))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(EavError::IoError(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| EavError::IoError(format!("Cannot read config: {}", e)))?;
        let config = Self::from_toml(&text)?;
        tracing::info!(path = %path.display(), databases = config.databases.len(), "loaded config");
        Ok(config)
    }

    /// The session and event databases must be registered, names must be
    /// unique, and the pass bound must allow at least one pass.
    pub fn validate(&self) -> Result<(), EavError> {
        for required in [self.session.as_str(), EVENT_DATABASE] {
            if !self.databases.iter().any(|name| name == required) {
                return Err(EavError::InvalidState(format!(
                    "database '{}' must be listed in `databases`",
                    required
                )));
            }
        }
        for (index, name) in self.databases.iter().enumerate() {
            if self.databases[..index].contains(name) {
                return Err(EavError::DuplicateDatabase(name.clone()));
            }
        }
        if self.evaluation.max_passes == 0 {
            return Err(EavError::InvalidState(
                "max_passes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// `host:port` for the listener.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

// =============================================================================
// TESTS
// =============================================================================
