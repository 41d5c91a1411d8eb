//! Legacy form-field inventory
//!
//! Lists the `w:ffData/w:name` values of a body part. Used while authoring the
//! address mapping for a new template.

use std::collections::HashSet;

use super::xml::{self, Node};

const FORM_FIELD_DATA: &str = "w:ffData";
const FORM_FIELD_NAME: &str = "w:name";

/// Distinct form-field names in first-seen order.
pub fn list_form_fields(nodes: &[Node]) -> Vec<String> {
    let mut data = Vec::new();
    xml::find_all(nodes, FORM_FIELD_DATA, None, &mut data);

    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for field in data {
        let mut name_tags = Vec::new();
        xml::find_all(&field.children, FORM_FIELD_NAME, None, &mut name_tags);
        for name in name_tags.into_iter().filter_map(|tag| tag.attribute("w:val")) {
            if !name.is_empty() && seen.insert(name.clone()) {
                names.push(name);
            }
        }
    }
    names
}
