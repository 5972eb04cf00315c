use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Result};
use config::Config;

/// Toolkit-wide configuration, read from `~/.petri/petri.toml` and
/// `PETRI_*` environment variables.
pub struct PetriConfig {
    /// Server URL where unit-test databases are created
    pub server_url: String,

    /// Path to the directory holding petri's data
    pub data_dir: String,

    /// Keep unit-test databases instead of dropping them at the end
    pub keep_test_dbs: bool,
}

const EMPTY_CONFIG: &str = r#"### petri configuration file

### server URL where unit-test databases are created
# server_url = "sqlite://"

### directory for data used by petri
# data_dir = "~/.petri"

### keep unit-test databases instead of dropping them (for inspection)
# keep_test_dbs = false
"#;

const DEFAULT_SERVER_URL: &str = "sqlite://";

impl Default for PetriConfig {
    fn default() -> Self {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string());

        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            data_dir: format!("{home_dir}/.petri"),
            keep_test_dbs: false,
        }
    }
}

impl PetriConfig {
    /// Creates and initializes the configuration.
    ///
    /// Reads the TOML file at `path` (or `~/.petri/petri.toml` when no path
    /// is given, writing a commented template there on first run), then
    /// applies `PETRI_*` environment overrides, e.g. `PETRI_SERVER_URL`.
    pub fn new(path: &Option<String>) -> Result<PetriConfig> {
        let mut builder = Config::builder();

        let home_dir = dirs::home_dir()
            .ok_or_else(|| anyhow!("Could not find home directory"))?
            .to_str()
            .ok_or_else(|| anyhow!("Could not convert home directory path to string"))?
            .to_owned();
        let petri_dir = format!("{home_dir}/.petri");

        match path {
            Some(p) => {
                let path = Path::new(p.as_str());
                if path.exists() {
                    let path_str = path
                        .to_str()
                        .ok_or_else(|| anyhow!("Could not convert path to string"))?;
                    builder = builder.add_source(config::File::with_name(path_str));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file: {e}"))?;
                }
            }
            None => {
                std::fs::create_dir_all(petri_dir.as_str())
                    .map_err(|e| anyhow!("Unable to create petri directory: {e}"))?;
                let p = format!("{petri_dir}/petri.toml");
                if Path::new(p.as_str()).exists() {
                    builder = builder.add_source(config::File::with_name(p.as_str()));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file {p}: {e}"))?;
                }
            }
        }

        // Environment settings take precedence, e.g.
        // `PETRI_SERVER_URL=sqlite:// cargo test`
        builder = builder.add_source(config::Environment::with_prefix("PETRI"));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {e}"))?;
        let config = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {e}"))?;

        let server_url = config
            .get("server_url")
            .cloned()
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());

        let data_dir = match config.get("data_dir") {
            Some(dir) => dir.clone(),
            None => format!("{home_dir}/.petri"),
        };

        let keep_test_dbs = config
            .get("keep_test_dbs")
            .map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(PetriConfig {
            server_url,
            data_dir,
            keep_test_dbs,
        })
    }

    /// Returns the default config file path.
    pub fn config_file_path() -> String {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| "~".to_string());
        format!("{home_dir}/.petri/petri.toml")
    }

    /// Display configuration summary.
    pub fn summary(&self) -> String {
        [
            format!("Server URL:     {}", self.server_url),
            format!("Data Directory: {}", self.data_dir),
            format!("Keep Test DBs:  {}", self.keep_test_dbs),
        ]
        .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PetriConfig::default();
        assert_eq!(config.server_url, "sqlite://");
        assert!(!config.keep_test_dbs);
        assert!(config.data_dir.ends_with(".petri"));
    }

    #[test]
    fn test_summary() {
        let config = PetriConfig {
            server_url: "sqlite://".to_string(),
            data_dir: "/test/dir".to_string(),
            keep_test_dbs: true,
        };
        let summary = config.summary();
        assert!(summary.contains("sqlite://"));
        assert!(summary.contains("/test/dir"));
        assert!(summary.contains("true"));
    }
}
