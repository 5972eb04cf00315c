//! Remote file loading with format-specific parsing.
//!
//! [`RemoteFileLoader`] fetches a file over HTTP(S) (local paths work too,
//! which keeps tests offline) and parses it according to the selected
//! [`FileFormat`]. Unknown formats come back as raw text. Non-success HTTP
//! statuses and timeouts propagate as errors.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;

/// File format selecting an ad-hoc parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    Json,
    Yaml,
    Ini,
    Env,
    /// No parsing: content is returned as-is.
    #[default]
    Text,
}

impl FileFormat {
    /// Maps a file extension (or format name) to a format, falling back to
    /// plain text for anything unknown.
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_lowercase().as_str() {
            "json" => FileFormat::Json,
            "yaml" | "yml" => FileFormat::Yaml,
            "ini" => FileFormat::Ini,
            "env" => FileFormat::Env,
            _ => FileFormat::Text,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileFormat::Json => "json",
            FileFormat::Yaml => "yaml",
            FileFormat::Ini => "ini",
            FileFormat::Env => "env",
            FileFormat::Text => "text",
        };
        write!(f, "{name}")
    }
}

/// Parsed remote file content.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteContent {
    /// Structured content (JSON, YAML or INI).
    Value(serde_json::Value),
    /// Key/value pairs from an env-style file.
    Env(BTreeMap<String, String>),
    /// Raw text.
    Text(String),
}

impl RemoteContent {
    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            RemoteContent::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_env(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            RemoteContent::Env(vars) => Some(vars),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RemoteContent::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Loads remote files and parses them according to a [`FileFormat`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteFileLoader {
    format: FileFormat,
}

impl RemoteFileLoader {
    pub fn new(format: FileFormat) -> Self {
        RemoteFileLoader { format }
    }

    /// Fetches the given URL and parses its content.
    pub fn load(&self, url: &str) -> Result<RemoteContent> {
        let text = oneio::read_to_string(url).map_err(|e| anyhow!("Failed to fetch '{url}': {e}"))?;
        self.parse(&text)
            .with_context(|| format!("Failed to parse '{url}' as {}", self.format))
    }

    fn parse(&self, text: &str) -> Result<RemoteContent> {
        match self.format {
            FileFormat::Json => structured(text, config::FileFormat::Json),
            FileFormat::Yaml => structured(text, config::FileFormat::Yaml),
            FileFormat::Ini => structured(text, config::FileFormat::Ini),
            FileFormat::Env => {
                let mut vars = BTreeMap::new();
                for item in dotenvy::from_read_iter(text.as_bytes()) {
                    let (key, value) = item.map_err(|e| anyhow!("invalid env content: {e}"))?;
                    vars.insert(key, value);
                }
                Ok(RemoteContent::Env(vars))
            }
            FileFormat::Text => Ok(RemoteContent::Text(text.to_string())),
        }
    }
}

fn structured(text: &str, format: config::FileFormat) -> Result<RemoteContent> {
    let settings = config::Config::builder()
        .add_source(config::File::from_str(text, format))
        .build()?;
    let value: serde_json::Value = settings.try_deserialize()?;
    Ok(RemoteContent::Value(value))
}

/// Fetches a JSON document and deserializes it straight into `T`.
pub fn load_json_struct<T: DeserializeOwned>(url: &str) -> Result<T> {
    oneio::read_json_struct(url).map_err(|e| anyhow!("Failed to load JSON from '{url}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn fixture(dir: &Path, name: &str, content: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_load_json() {
        let tmp = tempfile::tempdir().unwrap();
        let path = fixture(
            tmp.path(),
            "sample.json",
            r#"{"lang": "rust", "os": ["linux", "windows"]}"#,
        );
        let loader = RemoteFileLoader::new(FileFormat::Json);
        let content = loader.load(&path).unwrap();
        let value = content.as_value().unwrap();
        assert_eq!(value["lang"], "rust");
        assert_eq!(value["os"][1], "windows");
    }

    #[test]
    fn test_load_yaml() {
        let tmp = tempfile::tempdir().unwrap();
        let path = fixture(
            tmp.path(),
            "sample.yaml",
            "lang: rust\nos:\n  - linux\n  - windows\n",
        );
        let loader = RemoteFileLoader::new(FileFormat::Yaml);
        let content = loader.load(&path).unwrap();
        let value = content.as_value().unwrap();
        assert_eq!(value["lang"], "rust");
        assert_eq!(value["os"][0], "linux");
    }

    #[test]
    fn test_load_ini() {
        let tmp = tempfile::tempdir().unwrap();
        let path = fixture(
            tmp.path(),
            "sample.ini",
            "[settings]\ndebug = true\nsecret_key = out_secret\n",
        );
        let loader = RemoteFileLoader::new(FileFormat::Ini);
        let content = loader.load(&path).unwrap();
        let value = content.as_value().unwrap();
        assert_eq!(value["settings"]["secret_key"], "out_secret");
    }

    #[test]
    fn test_load_env() {
        let tmp = tempfile::tempdir().unwrap();
        let path = fixture(tmp.path(), "sample.env", "DEBUG=True\nSECRET_KEY=out_secret\n");
        let loader = RemoteFileLoader::new(FileFormat::Env);
        let content = loader.load(&path).unwrap();
        let vars = content.as_env().unwrap();
        assert_eq!(vars.get("DEBUG").map(String::as_str), Some("True"));
        assert_eq!(vars.get("SECRET_KEY").map(String::as_str), Some("out_secret"));
    }

    #[test]
    fn test_load_unknown_format_as_text() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = "lang: rust\nsecret: yes";
        let path = fixture(tmp.path(), "sample.txt", raw);
        let loader = RemoteFileLoader::new(FileFormat::from_extension("txt"));
        let content = loader.load(&path).unwrap();
        assert_eq!(content.as_text(), Some(raw));
    }

    #[test]
    fn test_load_missing_source() {
        let loader = RemoteFileLoader::default();
        assert!(loader.load("/no/such/file.txt").is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(FileFormat::from_extension("YML"), FileFormat::Yaml);
        assert_eq!(FileFormat::from_extension("csv"), FileFormat::Text);
    }
}
