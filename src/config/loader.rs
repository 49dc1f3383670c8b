// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Configuration file discovery and loading.
//!
//! Files are TOML unless the extension is `.json`; both use the same
//! camelCase field names as the page-injected configuration object.

use std::path::{Path, PathBuf};

use crate::error::{EnrollError, Result};

use super::{EnrollConfig, RawConfig};

/// Default environment variable naming a configuration file.
pub const CONFIG_ENV_VAR: &str = "MTLS_ENROLL_CONFIG";

/// Configuration file loader with discovery and precedence rules.
///
/// # Search Order
///
/// First found wins:
///
/// 1. Explicit path (if set via `with_path()`)
/// 2. Environment variable `MTLS_ENROLL_CONFIG`
/// 3. User config directory: `<config_dir>/mtls-enroll/config.toml`
/// 4. Current directory: `./mtls-enroll.toml`, then `./mtls-enroll.json`
///
/// # Example
///
/// ```no_run
/// use mtls_enroll::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_path("/etc/mtls-enroll.toml")
///     .load()
///     .unwrap();
/// println!("missing: {:?}", config.missing());
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    explicit_path: Option<PathBuf>,
    expand_variables: bool,
    env_var_name: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader with default settings.
    pub fn new() -> Self {
        Self {
            explicit_path: None,
            expand_variables: true,
            env_var_name: CONFIG_ENV_VAR.to_string(),
        }
    }

    /// Set an explicit configuration file path.
    ///
    /// When set, only this path will be checked (no discovery).
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.explicit_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enable or disable `${VAR}` expansion.
    ///
    /// Default: `true`
    pub fn with_expand_variables(mut self, expand: bool) -> Self {
        self.expand_variables = expand;
        self
    }

    /// Set the environment variable name for path override.
    ///
    /// Default: `MTLS_ENROLL_CONFIG`
    pub fn with_env_var(mut self, name: impl Into<String>) -> Self {
        self.env_var_name = name.into();
        self
    }

    /// Find and load the configuration file.
    ///
    /// The result is not validated; incomplete settings surface when the
    /// flow is started.
    ///
    /// # Errors
    ///
    /// Returns [`EnrollError::ConfigFile`] if no file is found, or the file
    /// cannot be read or parsed.
    pub fn load(&self) -> Result<EnrollConfig> {
        let path = self.find_config_file()?;
        tracing::debug!("Loading configuration from {}", path.display());

        let content = std::fs::read_to_string(&path).map_err(|e| {
            EnrollError::config_file(format!("Failed to read {}: {}", path.display(), e))
        })?;

        if is_json(&path) {
            self.load_from_json(&content)
        } else {
            self.load_from_str(&content)
        }
    }

    /// Load configuration from a TOML string.
    pub fn load_from_str(&self, toml_content: &str) -> Result<EnrollConfig> {
        let raw: RawConfig = toml::from_str(toml_content)
            .map_err(|e| EnrollError::config_file(format!("Invalid TOML: {}", e)))?;
        Ok(self.finish(raw))
    }

    /// Load configuration from a JSON string.
    pub fn load_from_json(&self, json_content: &str) -> Result<EnrollConfig> {
        let raw: RawConfig = serde_json::from_str(json_content)
            .map_err(|e| EnrollError::config_file(format!("Invalid JSON: {}", e)))?;
        Ok(self.finish(raw))
    }

    fn finish(&self, mut raw: RawConfig) -> EnrollConfig {
        if self.expand_variables {
            raw.expand_variables();
        }
        EnrollConfig::from_raw(raw)
    }

    /// Find the configuration file path.
    pub fn find_config_file(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.explicit_path {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(EnrollError::config_file(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        if let Ok(env_path) = std::env::var(&self.env_var_name) {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok(path);
            }
            return Err(EnrollError::config_file(format!(
                "Configuration file from {} not found: {}",
                self.env_var_name, env_path
            )));
        }

        let search_paths = self.get_search_paths();
        if let Some(path) = search_paths.iter().find(|p| p.exists()) {
            return Ok(path.clone());
        }

        Err(EnrollError::config_file(format!(
            "No configuration file found. Searched:\n  - {}",
            search_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join("\n  - ")
        )))
    }

    /// Get the list of paths to search for configuration files.
    pub fn get_search_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("mtls-enroll").join("config.toml"));
        }

        paths.push(PathBuf::from("mtls-enroll.toml"));
        paths.push(PathBuf::from("mtls-enroll.json"));

        paths
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
