mod fixtures;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use docseal::config::AppConfig;
use docseal::encryption::{EncryptionService, KeyStore};
use docseal::error::{Error, PipelineError};
use docseal::pipeline::converter::expected_pdf_path;
use docseal::pipeline::{DocumentConverter, SubmissionPipeline};
use docseal::placeholder::PlaceholderMap;
use docseal::template::DocumentArchive;

use fixtures::{data_cell_text, TestFixtures, UNCHECKED};

/// Stands in for the office suite: the "PDF" is a copy of the document.
struct CopyConverter;

#[async_trait]
impl DocumentConverter for CopyConverter {
    async fn convert_to_pdf(&self, document: &Path, out_dir: &Path) -> Result<PathBuf, PipelineError> {
        let pdf = expected_pdf_path(document, out_dir)?;
        tokio::fs::copy(document, &pdf)
            .await
            .map_err(|e| PipelineError::Conversion(e.to_string()))?;
        Ok(pdf)
    }
}

struct FailingConverter;

#[async_trait]
impl DocumentConverter for FailingConverter {
    async fn convert_to_pdf(&self, _document: &Path, _out_dir: &Path) -> Result<PathBuf, PipelineError> {
        Err(PipelineError::Conversion("office suite unavailable".into()))
    }
}

struct Workspace {
    _dir: tempfile::TempDir,
    config: AppConfig,
    encryption: EncryptionService,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.pipeline.templates_dir = dir.path().join("templates");
        config.pipeline.output_dir = dir.path().join("output");
        config.key_store.key_path = dir.path().join("config/encryption.key");

        std::fs::create_dir_all(&config.pipeline.templates_dir).unwrap();
        std::fs::write(
            config.pipeline.templates_dir.join("902.1e (Identification).docx"),
            TestFixtures::compliance_form(),
        )
        .unwrap();

        let store = KeyStore::load_or_generate(&config.key_store.key_path).unwrap();
        let encryption = EncryptionService::new(Arc::new(store));
        Self {
            _dir: dir,
            config,
            encryption,
        }
    }

    fn pipeline(&self, converter: Arc<dyn DocumentConverter>) -> SubmissionPipeline {
        SubmissionPipeline::new(&self.config, self.encryption.clone(), converter)
    }

    fn output_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.config.pipeline.output_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

fn submission() -> PlaceholderMap {
    [
        ("template", "902.1e"),
        ("clientName", "Acme Corp"),
        ("date", "2024-05-01"),
        ("2:1", "true"),
        ("7", "Acme Corp"),
    ]
    .into_iter()
    .collect()
}

#[tokio::test]
async fn test_submission_produces_only_encrypted_pdf() {
    let ws = Workspace::new();
    let receipt = ws
        .pipeline(Arc::new(CopyConverter))
        .submit(None, submission())
        .await
        .unwrap();

    assert_eq!(receipt.template_id, "902.1e");
    assert!(receipt.plaintext_removed);
    assert!(chrono::DateTime::parse_from_rfc3339(&receipt.submitted_at).is_ok());

    let name = receipt.encrypted_path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("GeneratedForm_902.1e_"));
    assert!(name.ends_with(".pdf.encrypted"));
    assert!(!name.contains(':'));
    assert_eq!(ws.output_files(), vec![name]);
}

#[tokio::test]
async fn test_encrypted_output_holds_rendered_document() {
    let ws = Workspace::new();
    let receipt = ws
        .pipeline(Arc::new(CopyConverter))
        .submit(None, submission())
        .await
        .unwrap();

    let restored = ws.encryption.decrypt_file(&receipt.encrypted_path).unwrap();
    let archive = DocumentArchive::from_bytes(&std::fs::read(restored).unwrap()).unwrap();
    let body = archive.part_str("word/document.xml").unwrap();

    assert_eq!(data_cell_text(body, 0), "Acme Corp");
    assert_eq!(data_cell_text(body, 7), "Acme Corp");
    assert!(fixtures::rows(body)[2].to_xml().contains(UNCHECKED));
    assert!(!body.contains("{{"));
}

#[tokio::test]
async fn test_explicit_template_id_wins_over_form_field() {
    let ws = Workspace::new();
    let err = ws
        .pipeline(Arc::new(CopyConverter))
        .submit(Some("902.4e"), submission())
        .await
        .unwrap_err();
    // whitelisted, but the fixture workspace only ships 902.1e
    assert!(matches!(err, Error::Pipeline(PipelineError::TemplateMissing(_))));
}

#[tokio::test]
async fn test_unknown_template_is_rejected() {
    let ws = Workspace::new();
    let mut form = submission();
    form.insert_string("template", "../secrets");
    let err = ws
        .pipeline(Arc::new(CopyConverter))
        .submit(None, form)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Pipeline(PipelineError::UnknownTemplate(_))));
}

#[tokio::test]
async fn test_default_template_when_form_names_none() {
    let ws = Workspace::new();
    let mut form = submission();
    form.remove("template");
    let receipt = ws
        .pipeline(Arc::new(CopyConverter))
        .submit(None, form)
        .await
        .unwrap();
    assert_eq!(receipt.template_id, "902.1e");
}

#[tokio::test]
async fn test_conversion_failure_cleans_intermediate_document() {
    let ws = Workspace::new();
    let err = ws
        .pipeline(Arc::new(FailingConverter))
        .submit(None, submission())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Pipeline(PipelineError::Conversion(_))));
    assert!(ws.output_files().is_empty());
}

#[tokio::test]
async fn test_intermediate_document_can_be_kept() {
    let mut ws = Workspace::new();
    ws.config.pipeline.remove_intermediate_docx = false;
    ws.pipeline(Arc::new(CopyConverter))
        .submit(None, submission())
        .await
        .unwrap();

    let files = ws.output_files();
    assert_eq!(files.len(), 2);
    assert!(files.iter().any(|f| f.ends_with(".docx")));
    assert!(files.iter().any(|f| f.ends_with(".pdf.encrypted")));
}
