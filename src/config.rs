use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Runtime settings. Every section is optional in the TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StratusConfig {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub manifest: ManifestConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// External tool invoked once per dependency: `<tool> <args..> <module> <output_flag> <dir>`.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_tool")]
    pub tool: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default = "default_output_flag")]
    pub output_flag: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            tool: default_tool(),
            args: default_args(),
            output_flag: default_output_flag(),
        }
    }
}

fn default_tool() -> String {
    "buf".into()
}
fn default_args() -> Vec<String> {
    vec!["export".into()]
}
fn default_output_flag() -> String {
    "-o".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestConfig {
    /// File name searched for in the opened file's directory and its ancestors.
    #[serde(default = "default_manifest_name")]
    pub file_name: String,
    /// Fixed manifest path; disables the ancestor search.
    pub path: Option<PathBuf>,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            file_name: default_manifest_name(),
            path: None,
        }
    }
}

fn default_manifest_name() -> String {
    "buf.yaml".into()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// Event type preset for new editing sessions.
    #[serde(default)]
    pub default_event_type: String,
}

impl StratusConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults, then the file (if given), then `STRATUS_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(tool) = var("STRATUS_FETCH_TOOL").filter(|v| !v.is_empty()) {
            self.fetch.tool = tool;
        }
        if let Some(manifest) = var("STRATUS_MANIFEST").filter(|v| !v.is_empty()) {
            self.manifest.path = Some(PathBuf::from(manifest));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: StratusConfig = toml::from_str("").unwrap();
        assert_eq!(config.fetch.tool, "buf");
        assert_eq!(config.fetch.args, vec!["export".to_string()]);
        assert_eq!(config.fetch.output_flag, "-o");
        assert_eq!(config.manifest.file_name, "buf.yaml");
        assert!(config.manifest.path.is_none());
        assert_eq!(config.session.default_event_type, "");
    }

    #[test]
    fn parses_partial_sections() {
        let toml_str = r#"
[fetch]
tool = "/opt/bin/buf"

[session]
default_event_type = "com.acme.order.created"
"#;
        let config: StratusConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.fetch.tool, "/opt/bin/buf");
        assert_eq!(config.fetch.args, vec!["export".to_string()]);
        assert_eq!(config.session.default_event_type, "com.acme.order.created");
    }

    #[test]
    fn env_overrides_win() {
        let mut config = StratusConfig::default();
        config.apply_env(|key| match key {
            "STRATUS_FETCH_TOOL" => Some("fake-buf".into()),
            "STRATUS_MANIFEST" => Some("/etc/stratus/buf.yaml".into()),
            _ => None,
        });
        assert_eq!(config.fetch.tool, "fake-buf");
        assert_eq!(config.manifest.path, Some(PathBuf::from("/etc/stratus/buf.yaml")));
    }

    #[test]
    fn bad_toml_names_the_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("stratus.toml");
        std::fs::write(&path, "[fetch\ntool = 1").unwrap();
        let err = StratusConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }
}
