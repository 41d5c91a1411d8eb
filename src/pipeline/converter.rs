//! Document conversion
//!
//! Turning a rendered `.docx` into a PDF is delegated to an office suite run
//! headless. The seam is a trait so the pipeline can be driven without one.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::config::PipelineConfig;
use crate::error::PipelineError;

#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Converts `document` to PDF inside `out_dir` and returns the PDF path.
    async fn convert_to_pdf(&self, document: &Path, out_dir: &Path) -> Result<PathBuf, PipelineError>;
}

/// Runs `<program> --headless --convert-to pdf --outdir <dir> <document>`.
#[derive(Debug, Clone)]
pub struct OfficeConverter {
    program: String,
    timeout: Duration,
}

impl OfficeConverter {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.converter_program.clone(),
            Duration::from_secs(config.conversion_timeout_secs),
        )
    }
}

/// Where the converter leaves the PDF for `document`.
pub fn expected_pdf_path(document: &Path, out_dir: &Path) -> Result<PathBuf, PipelineError> {
    let stem = document
        .file_stem()
        .ok_or_else(|| PipelineError::Conversion(format!("{} has no file name", document.display())))?;
    // template ids contain dots, so the extension is appended rather than replaced
    let mut name = stem.to_os_string();
    name.push(".pdf");
    Ok(out_dir.join(name))
}

#[async_trait]
impl DocumentConverter for OfficeConverter {
    #[instrument(skip(self, document, out_dir), fields(program = %self.program, document = %document.display()))]
    async fn convert_to_pdf(&self, document: &Path, out_dir: &Path) -> Result<PathBuf, PipelineError> {
        let pdf = expected_pdf_path(document, out_dir)?;

        let child = Command::new(&self.program)
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(out_dir)
            .arg(document)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::Conversion(format!("cannot start {}: {}", self.program, e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| PipelineError::ConversionTimeout(self.timeout.as_secs()))?
            .map_err(|e| PipelineError::Conversion(e.to_string()))?;

        debug!(stdout = %String::from_utf8_lossy(&output.stdout).trim(), "converter finished");
        if !output.status.success() {
            return Err(PipelineError::Conversion(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if !pdf.is_file() {
            return Err(PipelineError::Conversion(format!(
                "converter reported success but {} was not produced",
                pdf.display()
            )));
        }

        info!(pdf = %pdf.display(), "converted to PDF");
        Ok(pdf)
    }
}
