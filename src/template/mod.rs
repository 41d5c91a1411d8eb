//! Form-field patch engine
//!
//! Renders a template package in two passes over the body part: the merge
//! pass substitutes `{{name}}` fields and expands sections, then the row pass
//! toggles checkboxes and overwrites data-cell text by row address. The engine
//! is synchronous and does no I/O; callers load and store the archive.

pub mod archive;
pub mod fields;
pub mod merge;
pub mod rows;
pub mod xml;

use serde::Serialize;
use tracing::{debug, info, instrument};

pub use archive::DocumentArchive;
pub use fields::list_form_fields;
pub use merge::{MergeOptions, MergeReport};
pub use rows::{RowPatchPlan, RowPatchReport};

use crate::config::EngineConfig;
use crate::error::{Result, TemplateStructureError};
use crate::placeholder::PlaceholderMap;

/// Counters from one render.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderReport {
    pub merge: MergeReport,
    pub rows: RowPatchReport,
}

#[derive(Debug, Clone, Default)]
pub struct PatchEngine {
    config: EngineConfig,
}

impl PatchEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn render(&self, archive: &DocumentArchive, data: &PlaceholderMap) -> Result<DocumentArchive> {
        self.render_with_report(archive, data).map(|(archive, _)| archive)
    }

    #[instrument(skip_all, fields(part = %self.config.body_part, fields = data.len()))]
    pub fn render_with_report(
        &self,
        archive: &DocumentArchive,
        data: &PlaceholderMap,
    ) -> Result<(DocumentArchive, RenderReport)> {
        let body = archive.part_str(&self.config.body_part)?;
        let (patched, report) = self.render_xml(body, data)?;

        let mut output = archive.clone();
        output.set_part(&self.config.body_part, patched.into_bytes());

        info!(
            substitutions = report.merge.substitutions,
            sections = report.merge.sections,
            rows = report.rows.rows,
            checkboxes = report.rows.checkboxes_rewritten,
            overwritten = report.rows.rows_overwritten,
            "rendered template"
        );
        Ok((output, report))
    }

    /// Runs both passes over a bare body part.
    pub fn render_xml(&self, xml_text: &str, data: &PlaceholderMap) -> Result<(String, RenderReport)> {
        let nodes = xml::parse(xml_text).map_err(|e| TemplateStructureError::Xml {
            part: self.config.body_part.clone(),
            message: e.to_string(),
        })?;

        let options = MergeOptions {
            strict: self.config.strict_merge_fields,
            linebreaks: self.config.linebreaks,
        };
        let (mut nodes, merge) = merge::merge_fields(nodes, data, options)?;
        if !merge.unresolved.is_empty() {
            debug!(unresolved = ?merge.unresolved, "merge fields rendered empty");
        }

        let plan = RowPatchPlan::from_placeholders(data);
        let rows = rows::patch_rows(&mut nodes, &plan);

        Ok((xml::to_string(&nodes), RenderReport { merge, rows }))
    }

    /// Legacy form-field names of the body part.
    pub fn form_fields(&self, archive: &DocumentArchive) -> Result<Vec<String>> {
        let body = archive.part_str(&self.config.body_part)?;
        let nodes = xml::parse(body).map_err(|e| TemplateStructureError::Xml {
            part: self.config.body_part.clone(),
            message: e.to_string(),
        })?;
        Ok(list_form_fields(&nodes))
    }
}
