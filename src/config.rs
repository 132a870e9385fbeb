use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{DEFAULT_JOB_TYPE, DEFAULT_PREVIEW_ROWS, DEFAULT_PROJECT};
use crate::error::{CleaningError, Result};

/// Config file read when `BASIC_CLEANING_CONFIG` is not set
pub const DEFAULT_CONFIG_FILE: &str = "basic_cleaning.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub run: RunConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory of the local artifact store
    pub root: PathBuf,
    /// Where fetched artifacts are materialized; defaults to `<root>/downloads`
    pub download_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("artifacts"),
            download_dir: None,
        }
    }
}

impl StoreConfig {
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(|| self.root.join("downloads"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub project: String,
    pub job_type: String,
    /// Directory the cleaned CSV is written to before it is published
    pub output_dir: PathBuf,
    /// Rows printed after loading the dataset
    pub preview_rows: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            project: DEFAULT_PROJECT.to_string(),
            job_type: DEFAULT_JOB_TYPE.to_string(),
            output_dir: PathBuf::from("."),
            preview_rows: DEFAULT_PREVIEW_ROWS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub file_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            file_name: "basic_cleaning.log".to_string(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the TOML file (if any), then environment overrides.
    pub fn load() -> Result<Self> {
        let explicit = std::env::var("BASIC_CLEANING_CONFIG").ok().map(PathBuf::from);
        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CleaningError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// `lookup` is injected so tests do not have to touch the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup("ARTIFACT_STORE_ROOT") {
            self.store.root = PathBuf::from(root);
        }
        if let Some(dir) = lookup("CLEANING_LOG_DIR") {
            self.logging.dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("CLEANING_OUTPUT_DIR") {
            self.run.output_dir = PathBuf::from(dir);
        }
        if let Some(project) = lookup("WANDB_PROJECT") {
            self.run.project = project;
        }
    }
}
