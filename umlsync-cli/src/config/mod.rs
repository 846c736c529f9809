//! CLI configuration
//!
//! Settings come from a TOML file (`~/.config/umlsync/config.toml` unless a
//! path is given), then environment variables, then command-line flags.
//! A missing default file is not an error; every key has a default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::sync::ReconcileOptions;

const APP_DIR: &str = "umlsync";
const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "models.db";

/// Environment variable overriding the partition store path
pub const DATABASE_ENV: &str = "UMLSYNC_DATABASE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file holding the schema partitions
    pub database: PathBuf,
    /// Schema used when a command omits one
    pub default_schema: Option<String>,
    /// Defaults for `reconcile`; flags on the command line take precedence
    pub reconcile: ReconcileOptions,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: app_dir().join(DATABASE_FILE),
            default_schema: None,
            reconcile: ReconcileOptions::default(),
        }
    }
}

/// `~/.config/umlsync`, falling back to the working directory
pub fn app_dir() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
}

pub fn default_config_path() -> PathBuf {
    app_dir().join(CONFIG_FILE)
}

impl Config {
    /// Load from an explicit path (which must exist) or the default location
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = default_config_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    log::debug!("No config file at {}, using defaults", path.display());
                    Config::default()
                }
            }
        };

        if let Ok(database) = std::env::var(DATABASE_ENV) {
            if !database.trim().is_empty() {
                log::debug!("Database path overridden by {}", DATABASE_ENV);
                config.database = PathBuf::from(database);
            }
        }

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write the config as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// The explicit schema, else the configured default
    pub fn schema_or_default(&self, explicit: Option<String>) -> Result<String> {
        match explicit.or_else(|| self.default_schema.clone()) {
            Some(schema) => Ok(schema),
            None => anyhow::bail!("No schema given and no default_schema configured"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{TagStrategy, VersionStep};

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "database = \"/tmp/models.db\"\n\n[reconcile]\nversion_step = \"minor\"\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.database, PathBuf::from("/tmp/models.db"));
        assert_eq!(config.default_schema, None);
        assert_eq!(config.reconcile.version_step, VersionStep::Minor);
        assert_eq!(config.reconcile.tag_strategy, TagStrategy::Update);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            database: dir.path().join("m.db"),
            default_schema: Some("main".into()),
            reconcile: ReconcileOptions::default().inserting(),
        };

        config.save(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_schema_fallback() {
        let mut config = Config::default();
        assert!(config.schema_or_default(None).is_err());
        config.default_schema = Some("main".into());
        assert_eq!(config.schema_or_default(None).unwrap(), "main");
        assert_eq!(config.schema_or_default(Some("other".into())).unwrap(), "other");
    }
}
