//! Submission pipeline
//!
//! One submission runs: resolve the whitelisted template, render it with the
//! form data, write the `.docx`, convert it to PDF, encrypt the PDF and drop
//! the intermediate document. Delivery of the encrypted file is left to the
//! caller.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

pub mod converter;
pub mod templates;

pub use converter::{DocumentConverter, OfficeConverter};
pub use templates::TemplateRegistry;

use crate::config::{AppConfig, PipelineConfig};
use crate::encryption::EncryptionService;
use crate::error::{PipelineError, Result};
use crate::placeholder::{PlaceholderMap, PlaceholderValue};
use crate::template::{DocumentArchive, PatchEngine};

/// Form key that selects the template; never rendered.
pub const TEMPLATE_FIELD: &str = "template";

/// What a finished submission hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub template_id: String,
    pub encrypted_path: PathBuf,
    /// Server time the submission was accepted, RFC 3339 with milliseconds.
    pub submitted_at: String,
    pub plaintext_removed: bool,
}

pub struct SubmissionPipeline {
    config: PipelineConfig,
    registry: TemplateRegistry,
    engine: PatchEngine,
    encryption: EncryptionService,
    converter: Arc<dyn DocumentConverter>,
}

impl SubmissionPipeline {
    pub fn new(
        config: &AppConfig,
        encryption: EncryptionService,
        converter: Arc<dyn DocumentConverter>,
    ) -> Self {
        Self {
            config: config.pipeline.clone(),
            registry: TemplateRegistry::from_config(&config.pipeline),
            engine: PatchEngine::new(config.engine.clone()),
            encryption: encryption.with_encrypted_suffix(config.pipeline.encrypted_suffix.clone()),
            converter,
        }
    }

    /// Pipeline backed by the configured office suite.
    pub fn with_office_converter(config: &AppConfig, encryption: EncryptionService) -> Self {
        let converter = Arc::new(OfficeConverter::from_config(&config.pipeline));
        Self::new(config, encryption, converter)
    }

    /// Template id for a submission: the explicit one, else the form's
    /// `template` field, else the configured default.
    pub fn select_template(&self, explicit: Option<&str>, form: &PlaceholderMap) -> String {
        explicit
            .map(str::to_string)
            .or_else(|| match form.get(TEMPLATE_FIELD) {
                Some(PlaceholderValue::Text(id)) if !id.is_empty() => Some(id.clone()),
                _ => None,
            })
            .unwrap_or_else(|| self.registry.default_id().to_string())
    }

    #[instrument(skip(self, form), fields(fields = form.len()))]
    pub async fn submit(&self, template_id: Option<&str>, mut form: PlaceholderMap) -> Result<SubmissionReceipt> {
        let submitted_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let template_id = self.select_template(template_id, &form);
        form.remove(TEMPLATE_FIELD);

        let template_path = self.registry.locate(&template_id)?;
        let template = tokio::fs::read(&template_path).await?;
        let archive = DocumentArchive::from_bytes(&template)?;
        let (rendered, report) = self.engine.render_with_report(&archive, &form)?;

        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let docx_path = self
            .config
            .output_dir
            .join(format!("GeneratedForm_{}_{}.docx", template_id, file_safe(&submitted_at)));
        tokio::fs::write(&docx_path, rendered.to_bytes()?).await?;
        info!(
            docx = %docx_path.display(),
            checkboxes = report.rows.checkboxes_rewritten,
            "rendered submission"
        );

        let converted = self.converter.convert_to_pdf(&docx_path, &self.config.output_dir).await;
        if self.config.remove_intermediate_docx {
            if let Err(e) = tokio::fs::remove_file(&docx_path).await {
                warn!(error = %e, docx = %docx_path.display(), "could not remove intermediate document");
            }
        }
        let pdf_path = converted?;

        // key derivation, cipher and file I/O are all blocking
        let encryption = self.encryption.clone();
        let sealed = tokio::task::spawn_blocking(move || encryption.encrypt_file(&pdf_path))
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))??;
        info!(
            submitted_at = %submitted_at,
            encrypted = %sealed.path.display(),
            "form submitted"
        );

        Ok(SubmissionReceipt {
            template_id,
            encrypted_path: sealed.path,
            submitted_at,
            plaintext_removed: sealed.plaintext_removed,
        })
    }
}

/// Timestamp usable in a file name on every platform.
fn file_safe(timestamp: &str) -> String {
    timestamp.replace([':', '.'], "-")
}
