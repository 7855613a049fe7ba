//! Configuration for matcalc
//!
//! Optional `config.toml` under `$MATCALC_HOME` (default `~/.matcalc/`).
//! Command-line flags override the file.

use anyhow::{Context, Result};
use matcalc_logging::matcalc_home;
use matcalc_schema::DEFAULT_FLASH_DURATION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatcalcConfig {
    /// Directory of the JSON template store (default `<home>/templates`)
    #[serde(default)]
    pub store_dir: Option<PathBuf>,

    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default)]
    pub log_filter: Option<String>,

    /// Flash notification duration in milliseconds
    #[serde(default)]
    pub flash_millis: Option<u64>,
}

impl MatcalcConfig {
    /// Load the config file. An explicit path must exist; the default one is
    /// optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = matcalc_home()?.join(CONFIG_FILE);
                if !path.exists() {
                    return Ok(Self::default());
                }
                path
            }
        };
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Store directory: the flag wins, then the file, then `<home>/templates`.
    pub fn resolve_store_dir(&self, flag: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(dir) = flag.or_else(|| self.store_dir.clone()) {
            return Ok(dir);
        }
        Ok(matcalc_home()?.join("templates"))
    }

    pub fn flash_duration(&self) -> Duration {
        self.flash_millis
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_FLASH_DURATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "store_dir = \"/srv/templates\"\nlog_filter = \"matcalc=debug\"\nflash_millis = 250\n",
        )
        .unwrap();

        let config = MatcalcConfig::load(Some(&path)).unwrap();
        assert_eq!(config.store_dir, Some(PathBuf::from("/srv/templates")));
        assert_eq!(config.log_filter.as_deref(), Some("matcalc=debug"));
        assert_eq!(config.flash_duration(), Duration::from_millis(250));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: MatcalcConfig = toml::from_str("").unwrap();
        assert_eq!(config, MatcalcConfig::default());
        assert_eq!(config.flash_duration(), DEFAULT_FLASH_DURATION);
    }

    #[test]
    fn test_flag_overrides_store_dir() {
        let config = MatcalcConfig {
            store_dir: Some(PathBuf::from("/from/file")),
            ..Default::default()
        };
        let dir = config
            .resolve_store_dir(Some(PathBuf::from("/from/flag")))
            .unwrap();
        assert_eq!(dir, PathBuf::from("/from/flag"));
        assert_eq!(
            config.resolve_store_dir(None).unwrap(),
            PathBuf::from("/from/file")
        );
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = MatcalcConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_invalid_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "flash_millis = \"soon\"").unwrap();
        let err = MatcalcConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
