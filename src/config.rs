//! Configuration for the correlator.
use color_eyre::eyre::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the incident logs live and which autoreducer nodes to read.
///
/// The defaults are the July 2024 incident set; running without a
/// configuration file analyzes exactly that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub data_path: PathBuf,
    pub runs_csv: String,
    pub restarts_file: String,
    pub workflow_log: String,
    pub ar_nodes: Vec<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("."),
            runs_csv: String::from("runs-for-peterson.csv"),
            restarts_file: String::from("AR_restarts"),
            workflow_log: String::from("workflow_manager_20240711_20240715.log"),
            ar_nodes: vec![1, 2, 4],
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&text)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_yaml::to_string(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn runs_csv_path(&self) -> PathBuf {
        self.data_path.join(&self.runs_csv)
    }

    pub fn restarts_path(&self) -> PathBuf {
        self.data_path.join(&self.restarts_file)
    }

    pub fn workflow_log_path(&self) -> PathBuf {
        self.data_path.join(&self.workflow_log)
    }

    /// Post-processing log for one autoreducer node.
    pub fn postproc_log_path(&self, node: u32) -> PathBuf {
        self.data_path.join(format!("AR{node}_postprocessing.log"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_name_the_incident_files() {
        let config = Config::default();
        assert_eq!(config.runs_csv_path(), PathBuf::from("./runs-for-peterson.csv"));
        assert_eq!(config.restarts_path(), PathBuf::from("./AR_restarts"));
        assert_eq!(
            config.postproc_log_path(4),
            PathBuf::from("./AR4_postprocessing.log")
        );
        assert_eq!(config.ar_nodes, vec![1, 2, 4]);
    }

    #[test]
    fn yaml_round_trip() {
        let config = Config::default();
        let text = serde_yaml::to_string(&config).unwrap();
        let back: Config = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
