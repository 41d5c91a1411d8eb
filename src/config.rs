//! Configuration types and validation
//!
//! One file configures the engine, the key store and the submission pipeline.
//! Every section has defaults, so a partial file (or none at all) is valid.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// Top-level application config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub key_store: KeyStoreConfig,
    pub pipeline: PipelineConfig,
}

/// Form-field patch engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Archive entry holding the document body.
    pub body_part: String,
    pub strict_merge_fields: bool,
    pub linebreaks: bool,
}

/// Location of the persisted encryption key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyStoreConfig {
    pub key_path: PathBuf,
}

/// Render, convert and encrypt settings for submissions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub templates_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Whitelist of template id to file name inside `templates_dir`.
    pub templates: BTreeMap<String, String>,
    pub default_template: String,
    pub converter_program: String,
    pub conversion_timeout_secs: u64,
    pub remove_intermediate_docx: bool,
    /// Suffix appended to encrypted files, without the dot.
    pub encrypted_suffix: String,
}

// Defaults
impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            body_part: "word/document.xml".into(),
            strict_merge_fields: false,
            linebreaks: true,
        }
    }
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            key_path: PathBuf::from("config/encryption.key"),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut templates = BTreeMap::new();
        templates.insert("902.1e".into(), "902.1e (Identification).docx".into());
        templates.insert("902.4e".into(), "902.4e (Risk Profile).docx".into());
        Self {
            templates_dir: PathBuf::from("templates"),
            output_dir: PathBuf::from("output"),
            templates,
            default_template: "902.1e".into(),
            converter_program: "soffice".into(),
            conversion_timeout_secs: 120,
            remove_intermediate_docx: true,
            encrypted_suffix: "encrypted".into(),
        }
    }
}

impl AppConfig {
    /// Reads a config file, trying JSON first and YAML second.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: AppConfig = match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(json_err) => serde_yaml::from_str(&content).map_err(|yaml_err| {
                ConfigError::Parse(format!("not JSON ({}) nor YAML ({})", json_err, yaml_err))
            })?,
        };

        config.validate()?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.body_part.trim().is_empty() {
            return Err(ConfigError::Invalid("engine.body_part must not be empty".into()));
        }
        if self.key_store.key_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("key_store.key_path must not be empty".into()));
        }
        self.pipeline.validate()
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.templates.is_empty() {
            return Err(ConfigError::Invalid("pipeline.templates must list at least one template".into()));
        }
        if !self.templates.contains_key(&self.default_template) {
            return Err(ConfigError::Invalid(format!(
                "default template '{}' is not in pipeline.templates",
                self.default_template
            )));
        }
        if let Some((id, _)) = self
            .templates
            .iter()
            .find(|(_, file)| file.is_empty() || file.contains('/') || file.contains('\\'))
        {
            return Err(ConfigError::Invalid(format!(
                "template '{}' must name a file inside templates_dir",
                id
            )));
        }
        if self.conversion_timeout_secs == 0 {
            return Err(ConfigError::Invalid("conversion timeout must be at least 1s".into()));
        }
        if self.converter_program.trim().is_empty() {
            return Err(ConfigError::Invalid("pipeline.converter_program must not be empty".into()));
        }
        if self.encrypted_suffix.is_empty() || self.encrypted_suffix.starts_with('.') {
            return Err(ConfigError::Invalid(
                "pipeline.encrypted_suffix must be non-empty and given without a leading dot".into(),
            ));
        }
        Ok(())
    }
}
