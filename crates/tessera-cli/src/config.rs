//! Configuration file loading for the CLI
//!
//! This module finds and loads TOML configuration files from an explicit
//! path, the local project directory or the platform config directory.

use std::{
    fs,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use log::{debug, info};
use thiserror::Error;

use tessera::{TesseraError, config::AppConfig};

/// Configuration-related errors for CLI
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse TOML configuration: {0}")]
    Parse(String),

    #[error("Missing configuration file: {0}")]
    MissingFile(PathBuf),
}

impl From<ConfigError> for TesseraError {
    fn from(err: ConfigError) -> Self {
        TesseraError::Config(err.to_string())
    }
}

/// Find and load configuration from various locations
///
/// Search order:
/// 1. Explicit path if provided
/// 2. Local project directory (tessera/config.toml)
/// 3. Platform-specific config directory
/// 4. Default config if none found
///
/// # Errors
///
/// Returns error if:
/// - Explicit path is provided but file doesn't exist
/// - Config file exists but cannot be parsed
/// - The configured background color is invalid
pub fn load_config(explicit_path: Option<impl AsRef<Path>>) -> Result<AppConfig, TesseraError> {
    if let Some(path) = explicit_path {
        let path = path.as_ref();
        info!(path = path.display().to_string(); "Loading configuration from explicit path");
        return load_config_file(path);
    }

    let local_config = Path::new("tessera/config.toml");
    if local_config.exists() {
        info!(path = local_config.display().to_string(); "Loading configuration from local path");
        return load_config_file(local_config);
    }

    if let Some(proj_dirs) = ProjectDirs::from("com", "tessera", "tessera") {
        let system_config = proj_dirs.config_dir().join("config.toml");
        if system_config.exists() {
            info!(path = system_config.display().to_string(); "Loading configuration from system path");
            return load_config_file(system_config);
        }
        debug!(path = system_config.display().to_string(); "System configuration file not found");
    } else {
        debug!("Could not determine platform-specific config directory");
    }

    debug!("No configuration file found, using default configuration");
    Ok(AppConfig::default())
}

/// Load configuration from a TOML file
///
/// # Errors
///
/// Returns error if the file is missing, unreadable, not valid TOML for
/// [`AppConfig`] or carries an invalid background color.
fn load_config_file(path: impl AsRef<Path>) -> Result<AppConfig, TesseraError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::MissingFile(path.to_path_buf()).into());
    }
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and checks a TOML configuration document.
fn parse_config(content: &str) -> Result<AppConfig, TesseraError> {
    let config: AppConfig = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.style().background_color().map_err(TesseraError::Config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use tessera::config::Sorting;

    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(
            r##"
            [paper]
            async = true
            batch_size = 50
            width = 1024
            height = 768
            sorting = "none"
            labels_layer = true

            [paper.router]
            name = "orthogonal"

            [graph]
            dangling_links = "disconnect"
            cascade_embeds = false

            [style]
            background_color = "#F0F0F0"
            "##,
        )
        .unwrap();
        assert!(config.paper().is_async());
        assert_eq!(config.paper().batch_size(), 50);
        assert_eq!(config.paper().sorting(), Sorting::None);
        assert!(config.paper().labels_layer());
        assert_eq!(config.paper().router().name(), "orthogonal");
        assert!(!config.graph().cascade_embeds());
        assert!(config.style().background_color().unwrap().is_some());
    }

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert!(!config.paper().is_async());
        assert_eq!(config.paper().batch_size(), 1000);
    }

    #[test]
    fn test_parse_errors() {
        let err = parse_config("[paper\nasync = true").unwrap_err();
        assert!(matches!(err, TesseraError::Config(_)));

        let err = parse_config("[style]\nbackground_color = \"not-a-color\"").unwrap_err();
        assert!(matches!(err, TesseraError::Config(_)));
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = load_config(Some("definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("Missing configuration file"));
    }
}
