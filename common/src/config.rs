use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs::read_to_string;

pub const DEFAULT_DATA_DIR: &str = "./test_data/";
pub const DEFAULT_FILE_PATTERN: &str = r"^service.*\.csv$";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the measurement files, charts are written next to them
    pub data_dir: PathBuf,
    /// Regex matched against file names in `data_dir`
    pub file_pattern: String,
    pub chart: ChartSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            file_pattern: DEFAULT_FILE_PATTERN.to_owned(),
            chart: ChartSettings::default(),
        }
    }
}

impl Config {
    pub async fn load(path: &Path) -> Result<Config> {
        let content = read_to_string(path)
            .await
            .wrap_err_with(|| format!("Reading config {}", path.display()))?;
        serde_yml::from_str(&content).wrap_err_with(|| format!("Parsing config {}", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartSettings {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub log_y_label: String,
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 800,
            title: "MedChain time measurements for 1 query".to_owned(),
            x_label: "Number of MedChain Nodes".to_owned(),
            y_label: "Time (second)".to_owned(),
            log_y_label: "Logarithm of Time (seconds)".to_owned(),
        }
    }
}
