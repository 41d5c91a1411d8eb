//! Row/cell patch pass
//!
//! Runs after the merge pass. Every `w:tr` in the body gets a global,
//! zero-based index in document order. For a row with at least two cells the
//! first cell is the label and the second the data cell; checkboxes in the data
//! cell are addressed as `"<row>:<ordinal>"` and the data cell's first text run
//! as `"<row>"`.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::trace;

use super::xml::{self, Element, Node, CHECKBOX, TABLE, TABLE_CELL, TABLE_ROW, TEXT};
use crate::placeholder::{FieldAddress, PlaceholderMap, PlaceholderValue};

/// The text value that flips a checkbox to its unchecked markup.
const UNCHECK_TRIGGER: &str = "true";

/// Row-addressed entries of a placeholder map.
#[derive(Debug, Clone, Default)]
pub struct RowPatchPlan {
    row_text: BTreeMap<usize, String>,
    checkboxes: HashMap<(usize, usize), PlaceholderValue>,
}

impl RowPatchPlan {
    pub fn from_placeholders(data: &PlaceholderMap) -> Self {
        let mut plan = Self::default();
        for (address, value) in data.addresses() {
            match address {
                FieldAddress::RowText(row) => {
                    if let Some(text) = value.as_scalar() {
                        plan.row_text.entry(row).or_insert(text);
                    }
                }
                FieldAddress::Checkbox { row, ordinal } => {
                    plan.checkboxes.insert((row, ordinal), value.clone());
                }
                FieldAddress::MergeField(_) => {}
            }
        }
        plan
    }

    pub fn row_text(&self, row: usize) -> Option<&str> {
        self.row_text.get(&row).map(String::as_str)
    }

    pub fn checkbox(&self, row: usize, ordinal: usize) -> Option<&PlaceholderValue> {
        self.checkboxes.get(&(row, ordinal))
    }

    /// Only the text `"true"` counts; a boolean `true` does not.
    fn wants_unchecked(&self, row: usize, ordinal: usize) -> bool {
        matches!(self.checkbox(row, ordinal), Some(PlaceholderValue::Text(s)) if s == UNCHECK_TRIGGER)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// Fewer than two cells.
    Skipped,
    Unchanged,
    CheckboxesToggled(usize),
    TextOverwritten,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowPatchReport {
    pub rows: usize,
    pub rows_toggled: usize,
    pub checkboxes_rewritten: usize,
    pub rows_overwritten: usize,
}

pub fn patch_rows(nodes: &mut [Node], plan: &RowPatchPlan) -> RowPatchReport {
    let mut report = RowPatchReport::default();
    let mut next_index = 0;
    visit(nodes, plan, &mut next_index, &mut report);
    report
}

fn visit(nodes: &mut [Node], plan: &RowPatchPlan, next_index: &mut usize, report: &mut RowPatchReport) {
    for node in nodes.iter_mut() {
        if let Node::Element(el) = node {
            if el.is(TABLE_ROW) {
                let index = *next_index;
                *next_index += 1;
                report.rows += 1;
                match patch_row(el, index, plan) {
                    RowOutcome::CheckboxesToggled(count) => {
                        report.rows_toggled += 1;
                        report.checkboxes_rewritten += count;
                    }
                    RowOutcome::TextOverwritten => report.rows_overwritten += 1,
                    RowOutcome::Skipped | RowOutcome::Unchanged => {}
                }
            }
            // nested tables keep counting in document order
            visit(&mut el.children, plan, next_index, report);
        }
    }
}

pub fn patch_row(row: &mut Element, index: usize, plan: &RowPatchPlan) -> RowOutcome {
    let mut cells = Vec::new();
    xml::find_all_mut(&mut row.children, TABLE_CELL, Some(TABLE), &mut cells);
    if cells.len() < 2 {
        return RowOutcome::Skipped;
    }

    let label = cells[0].text_excluding(TABLE);
    let data_cell = &mut cells[1];

    if !label.trim().is_empty() {
        let toggled = toggle_checkboxes(data_cell, index, plan);
        if toggled > 0 {
            trace!(row = index, toggled, "rewrote checkboxes");
            return RowOutcome::CheckboxesToggled(toggled);
        }
    }

    match plan.row_text(index) {
        Some(value) if overwrite_first_text(data_cell, value) => {
            trace!(row = index, "overwrote data cell text");
            RowOutcome::TextOverwritten
        }
        _ => RowOutcome::Unchanged,
    }
}

/// Rewrites every checkbox of the cell and returns how many changed markup.
///
/// The polarity is inverted on purpose: the text value `"true"` writes the
/// unchecked markup and anything else, including a boolean `true` or no value
/// at all, writes the checked markup. Existing templates and their field
/// mappings depend on it.
fn toggle_checkboxes(cell: &mut Element, row: usize, plan: &RowPatchPlan) -> usize {
    let mut boxes = Vec::new();
    xml::find_all_mut(&mut cell.children, CHECKBOX, Some(TABLE), &mut boxes);

    let mut changed = 0;
    for (position, checkbox) in boxes.into_iter().enumerate() {
        let replacement = checkbox_markup(!plan.wants_unchecked(row, position + 1));
        if *checkbox != replacement {
            *checkbox = replacement;
            changed += 1;
        }
    }
    changed
}

pub fn checkbox_markup(checked: bool) -> Element {
    let checkbox = Element::new(CHECKBOX);
    let checkbox = if checked {
        checkbox.with_child(Element::empty("w:checked"))
    } else {
        checkbox
    };
    checkbox
        .with_child(Element::empty("w:default"))
        .with_child(Element::empty("w:sizeAuto"))
}

/// Replaces the first text run of the cell with `raw`, which must already be
/// XML-escaped.
fn overwrite_first_text(cell: &mut Element, raw: &str) -> bool {
    let mut texts = Vec::new();
    xml::find_all_mut(&mut cell.children, TEXT, Some(TABLE), &mut texts);
    match texts.into_iter().next() {
        Some(text) => {
            text.set_raw_text(raw.to_string());
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKED: &str = "<w:checkBox><w:checked/><w:default/><w:sizeAuto/></w:checkBox>";
    const UNCHECKED: &str = "<w:checkBox><w:default/><w:sizeAuto/></w:checkBox>";

    fn row(label: &str, data: &str) -> String {
        format!(
            "<w:tr><w:tc><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:tc><w:tc><w:p>{}</w:p></w:tc></w:tr>",
            label, data
        )
    }

    fn checkbox_run() -> String {
        "<w:r><w:fldChar w:fldCharType=\"begin\"><w:ffData><w:name w:val=\"Check1\"/>\
         <w:checkBox><w:sizeAuto/><w:default w:val=\"0\"/></w:checkBox></w:ffData></w:fldChar></w:r>\
         <w:r><w:t>Yes</w:t></w:r>"
            .to_string()
    }

    fn patch(xml_text: &str, data: &PlaceholderMap) -> (String, RowPatchReport) {
        let mut nodes = xml::parse(xml_text).unwrap();
        let report = patch_rows(&mut nodes, &RowPatchPlan::from_placeholders(data));
        (xml::to_string(&nodes), report)
    }

    #[test]
    fn test_true_writes_unchecked_markup() {
        let body = format!("<w:tbl>{}</w:tbl>", row("PEP", &checkbox_run()));
        let data: PlaceholderMap = [("0:1", "true")].into_iter().collect();
        let (out, report) = patch(&body, &data);
        assert!(out.contains(UNCHECKED));
        assert!(!out.contains(CHECKED));
        assert_eq!(report.checkboxes_rewritten, 1);
    }

    #[test]
    fn test_other_values_and_absence_write_checked_markup() {
        let body = format!("<w:tbl>{}</w:tbl>", row("PEP", &checkbox_run()));
        for data in [
            [("0:1", "false")].into_iter().collect::<PlaceholderMap>(),
            PlaceholderMap::new(),
        ] {
            let (out, _) = patch(&body, &data);
            assert!(out.contains(CHECKED));
        }
    }

    #[test]
    fn test_boolean_true_is_not_the_text_trigger() {
        let body = format!("<w:tbl>{}</w:tbl>", row("PEP", &checkbox_run()));
        let mut data = PlaceholderMap::new();
        data.insert_boolean("0:1", true);
        let (out, _) = patch(&body, &data);
        assert!(out.contains(CHECKED));
        assert!(!out.contains(UNCHECKED));
    }

    #[test]
    fn test_ordinals_follow_document_order() {
        let data_cell = format!("{}{}", checkbox_run(), checkbox_run());
        let body = format!("<w:tbl>{}</w:tbl>", row("Options", &data_cell));
        let data: PlaceholderMap = [("0:2", "true")].into_iter().collect();
        let (out, _) = patch(&body, &data);
        let first = out.find(CHECKED).unwrap();
        let second = out.find(UNCHECKED).unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_label_less_row_gets_text_overwrite() {
        let body = format!(
            "<w:tbl>{}{}</w:tbl>",
            row("Name", "<w:r><w:t>old</w:t></w:r>"),
            row("", "<w:r><w:t>placeholder</w:t></w:r><w:r><w:t>tail</w:t></w:r>")
        );
        let data: PlaceholderMap = [("1", "Acme Corp")].into_iter().collect();
        let (out, report) = patch(&body, &data);
        assert!(out.contains("<w:t>Acme Corp</w:t></w:r><w:r><w:t>tail</w:t>"));
        assert!(out.contains("<w:t>old</w:t>"));
        assert_eq!(report.rows_overwritten, 1);
    }

    #[test]
    fn test_checkbox_rewrite_wins_over_text_overwrite() {
        let body = format!("<w:tbl>{}</w:tbl>", row("PEP", &checkbox_run()));
        let data: PlaceholderMap = [("0", "ignored"), ("0:1", "true")].into_iter().collect();
        let (out, _) = patch(&body, &data);
        assert!(out.contains("<w:t>Yes</w:t>"));
        assert!(!out.contains("ignored"));
    }

    #[test]
    fn test_unchanged_checkbox_falls_back_to_text_overwrite() {
        let data_cell = format!("<w:r>{}</w:r><w:r><w:t>x</w:t></w:r>", CHECKED);
        let body = format!("<w:tbl>{}</w:tbl>", row("PEP", &data_cell));
        let data: PlaceholderMap = [("0", "y")].into_iter().collect();
        let (out, report) = patch(&body, &data);
        assert!(out.contains("<w:t>y</w:t>"));
        assert_eq!(report.rows_toggled, 0);
    }

    #[test]
    fn test_single_cell_rows_pass_through_but_count() {
        let body = "<w:tbl><w:tr><w:tc><w:p><w:r><w:t>a</w:t></w:r></w:p></w:tc></w:tr>\
                    <w:tr><w:tc><w:p/></w:tc><w:tc><w:p><w:r><w:t>b</w:t></w:r></w:p></w:tc></w:tr></w:tbl>";
        let data: PlaceholderMap = [("0", "zero"), ("1", "one")].into_iter().collect();
        let (out, report) = patch(body, &data);
        assert!(out.contains("<w:t>a</w:t>"));
        assert!(out.contains("<w:t>one</w:t>"));
        assert_eq!(report.rows, 2);
    }

    #[test]
    fn test_nested_rows_are_indexed_after_their_parent() {
        let inner = row("", "<w:r><w:t>inner</w:t></w:r>");
        let outer = format!(
            "<w:tr><w:tc><w:p/></w:tc><w:tc><w:tbl>{}</w:tbl><w:p><w:r><w:t>outer</w:t></w:r></w:p></w:tc></w:tr>",
            inner
        );
        let body = format!("<w:tbl>{}</w:tbl>", outer);
        let data: PlaceholderMap = [("0", "O"), ("1", "I")].into_iter().collect();
        let (out, report) = patch(&body, &data);
        assert!(out.contains("<w:t>I</w:t>"));
        assert!(out.contains("<w:t>O</w:t>"));
        assert_eq!(report.rows, 2);
    }
}
