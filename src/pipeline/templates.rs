//! Template whitelist
//!
//! Only ids listed in the configuration resolve to a file; anything a client
//! sends is looked up, never joined onto a path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::error::PipelineError;

#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    dir: PathBuf,
    templates: BTreeMap<String, String>,
    default_id: String,
}

impl TemplateRegistry {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            dir: config.templates_dir.clone(),
            templates: config.templates.clone(),
            default_id: config.default_template.clone(),
        }
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a whitelisted template. The file itself is not checked.
    pub fn resolve(&self, id: &str) -> Result<PathBuf, PipelineError> {
        self.templates
            .get(id)
            .map(|file| self.dir.join(file))
            .ok_or_else(|| PipelineError::UnknownTemplate(id.to_string()))
    }

    /// Like [`resolve`](Self::resolve), but also requires the file to exist.
    pub fn locate(&self, id: &str) -> Result<PathBuf, PipelineError> {
        let path = self.resolve(id)?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(PipelineError::TemplateMissing(path))
        }
    }
}
