use std::fs;
use std::path::{Path, PathBuf};

use arbor::ImportFormat;
use serde::Deserialize;
use thiserror::Error;

/// Settings read from `cli.toml`.
#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    data: RawConfig,
}

impl CliConfig {
    /// Loads `explicit` or the default location. A missing file yields defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let data = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            _ => RawConfig::default(),
        };
        Ok(Self { path, data })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn default_db_path(&self) -> Option<&PathBuf> {
        self.data.database.default_path.as_ref()
    }

    pub fn import(&self) -> &ImportSection {
        &self.data.import
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    database: DatabaseSection,
    #[serde(default)]
    import: ImportSection,
}

#[derive(Debug, Default, Deserialize)]
struct DatabaseSection {
    #[serde(rename = "default")]
    default_path: Option<PathBuf>,
}

/// `[import]` defaults; command-line flags take precedence.
#[derive(Debug, Default, Deserialize)]
pub struct ImportSection {
    pub source: Option<String>,
    pub layout: Option<ImportFormat>,
    pub commit_every: Option<u64>,
    pub marker: Option<String>,
    pub extension: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read CLI config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse CLI config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("arbor").join("cli.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().expect("tempdir");
        let config = CliConfig::load(Some(dir.path().join("absent.toml"))).expect("load");
        assert!(config.default_db_path().is_none());
        assert!(config.import().commit_every.is_none());
    }

    #[test]
    fn reads_database_and_import_sections() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("cli.toml");
        fs::write(
            &path,
            r#"
            [database]
            default = "/var/lib/arbor/graph.db"

            [import]
            source = "USHMM"
            layout = "flat"
            commit_every = 10
            "#,
        )
        .expect("write config");

        let config = CliConfig::load(Some(path)).expect("load");
        assert_eq!(
            config.default_db_path(),
            Some(&PathBuf::from("/var/lib/arbor/graph.db"))
        );
        assert_eq!(config.import().source.as_deref(), Some("USHMM"));
        assert_eq!(config.import().layout, Some(ImportFormat::Flat));
        assert_eq!(config.import().commit_every, Some(10));
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("cli.toml");
        fs::write(&path, "[import\ncommit_every = ").expect("write config");
        let err = CliConfig::load(Some(path.clone())).unwrap_err();
        assert!(err.to_string().contains(&path.display().to_string()));
    }
}
