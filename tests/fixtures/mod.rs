#![allow(dead_code)]

use std::io::{Cursor, Write};

use docseal::template::xml::{self, Element, TABLE, TABLE_CELL, TABLE_ROW};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const CHECKED: &str = "<w:checkBox><w:checked/><w:default/><w:sizeAuto/></w:checkBox>";
pub const UNCHECKED: &str = "<w:checkBox><w:default/><w:sizeAuto/></w:checkBox>";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

pub struct TestFixtures;

impl TestFixtures {
    /// Wraps body content in a `w:document` part.
    pub fn document_xml(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}<w:sectPr/></w:body></w:document>"#,
            body
        )
    }

    /// Minimal `.docx` package around `body`.
    pub fn docx(body: &str) -> Vec<u8> {
        Self::package(Some(&Self::document_xml(body)))
    }

    /// Package with the usual parts, optionally without a body part.
    pub fn package(document: Option<&str>) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        writer.start_file("[Content_Types].xml", deflated).unwrap();
        writer.write_all(CONTENT_TYPES.as_bytes()).unwrap();
        writer.start_file("_rels/.rels", deflated).unwrap();
        writer.write_all(RELS.as_bytes()).unwrap();
        if let Some(document) = document {
            writer.start_file("word/document.xml", deflated).unwrap();
            writer.write_all(document.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    pub fn paragraph(text: &str) -> String {
        format!("<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>", text)
    }

    pub fn row(label: &str, data: &str) -> String {
        format!(
            "<w:tr><w:tc>{}</w:tc><w:tc>{}</w:tc></w:tr>",
            if label.is_empty() { "<w:p/>".to_string() } else { Self::paragraph(label) },
            data
        )
    }

    /// Legacy form checkbox followed by its caption, as Word writes it.
    pub fn checkbox(name: &str, caption: &str) -> String {
        format!(
            concat!(
                "<w:p><w:r><w:fldChar w:fldCharType=\"begin\"><w:ffData><w:name w:val=\"{}\"/><w:enabled/>",
                "<w:calcOnExit w:val=\"0\"/><w:checkBox><w:sizeAuto/><w:default w:val=\"0\"/></w:checkBox>",
                "</w:ffData></w:fldChar></w:r><w:r><w:instrText xml:space=\"preserve\"> FORMCHECKBOX </w:instrText></w:r>",
                "<w:r><w:fldChar w:fldCharType=\"end\"/></w:r><w:r><w:t xml:space=\"preserve\"> {}</w:t></w:r></w:p>"
            ),
            name, caption
        )
    }

    /// Client identification form with eight rows:
    ///
    /// 0 client name field, 1 date field, 2 "PEP Status" checkbox,
    /// 3 two sanctions checkboxes, 4 owners loop, 5 notes, 6 empty label with
    /// a field, 7 empty label with placeholder text.
    pub fn compliance_form_body() -> String {
        let rows = [
            Self::row("Client Name", &Self::paragraph("{{clientName}}")),
            Self::row("Date", &Self::paragraph("{{date}}")),
            Self::row("PEP Status", &Self::checkbox("PEP", "Politically exposed")),
            Self::row(
                "Sanctions",
                &format!(
                    "{}{}",
                    Self::checkbox("Sanctions1", "Listed"),
                    Self::checkbox("Sanctions2", "Not listed")
                ),
            ),
            Self::row("Owners", &Self::paragraph("{{#owners}}{{name}}; {{/owners}}")),
            Self::row("Notes", &Self::paragraph("n/a")),
            Self::row("", &Self::paragraph("{{reference}}")),
            Self::row("", &Self::paragraph("placeholder")),
        ];
        format!(
            "{}<w:tbl><w:tblPr/>{}</w:tbl>{}",
            Self::paragraph("Form 902.1e for {{clientName}}"),
            rows.concat(),
            Self::paragraph("Submitted {{date}}")
        )
    }

    pub fn compliance_form() -> Vec<u8> {
        Self::docx(&Self::compliance_form_body())
    }
}

/// Top-level rows of a rendered body, in document order.
pub fn rows(document: &str) -> Vec<Element> {
    let nodes = xml::parse(document).unwrap();
    let mut found = Vec::new();
    xml::find_all(&nodes, TABLE_ROW, None, &mut found);
    found.into_iter().cloned().collect()
}

/// Text of the data cell of row `index`.
pub fn data_cell_text(document: &str, index: usize) -> String {
    let rows = rows(document);
    let mut cells = Vec::new();
    xml::find_all(&rows[index].children, TABLE_CELL, Some(TABLE), &mut cells);
    cells[1].text_excluding(TABLE)
}
