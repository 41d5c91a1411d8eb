//! Minimal element tree over WordprocessingML parts
//!
//! Nodes keep the exact markup they were parsed from, so serializing an
//! untouched subtree reproduces the source byte for byte. Only nodes the
//! engine rewrites are re-emitted from their new content.

use std::borrow::Cow;

use quick_xml::escape::{escape, unescape};
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

pub const PARAGRAPH: &str = "w:p";
pub const RUN: &str = "w:r";
pub const TEXT: &str = "w:t";
pub const BREAK: &str = "w:br";
pub const TABLE: &str = "w:tbl";
pub const TABLE_ROW: &str = "w:tr";
pub const TABLE_CELL: &str = "w:tc";
pub const CHECKBOX: &str = "w:checkBox";

#[derive(Error, Debug)]
#[error("{message} (byte {position})")]
pub struct XmlParseError {
    pub message: String,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    /// Character data, still escaped as in the source.
    Text(String),
    /// Declarations, comments, processing instructions and CDATA, verbatim.
    Markup(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    name: String,
    open: String,
    close: Option<String>,
    pub children: Vec<Node>,
}

impl Element {
    /// `<name>` with an explicit end tag and no attributes.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            open: format!("<{}>", name),
            close: Some(format!("</{}>", name)),
            children: Vec::new(),
        }
    }

    /// Self-closing `<name/>`.
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            open: format!("<{}/>", name),
            close: None,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    /// Unescaped value of an attribute on the start tag.
    pub fn attribute(&self, key: &str) -> Option<String> {
        let mut reader = Reader::from_str(&self.open);
        match reader.read_event() {
            Ok(Event::Start(tag)) | Ok(Event::Empty(tag)) => tag
                .try_get_attribute(key)
                .ok()
                .flatten()
                .and_then(|attr| attr.unescape_value().ok().map(Cow::into_owned)),
            _ => None,
        }
    }

    /// Concatenated character data of the subtree.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, None, &mut out);
        out
    }

    /// Character data of the subtree, skipping any `excluded` elements.
    pub fn text_excluding(&self, excluded: &str) -> String {
        let mut out = String::new();
        collect_text(&self.children, Some(excluded), &mut out);
        out
    }

    /// Replaces the content with already-escaped character data.
    pub fn set_raw_text(&mut self, raw: String) {
        if self.close.is_none() {
            let head = self.open.trim_end_matches('>').trim_end_matches('/').trim_end();
            self.open = format!("{}>", head);
            self.close = Some(format!("</{}>", self.name));
        }
        self.children = if raw.is_empty() {
            Vec::new()
        } else {
            vec![Node::Text(raw)]
        };
    }

    /// Replaces the content with plain text, escaping it.
    pub fn set_text(&mut self, text: &str) {
        self.set_raw_text(escape(text).into_owned());
        if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
            self.preserve_space();
        }
    }

    fn preserve_space(&mut self) {
        if self.open.contains("xml:space") {
            return;
        }
        let at = if self.open.ends_with("/>") {
            self.open.len() - 2
        } else {
            self.open.len() - 1
        };
        self.open.insert_str(at, r#" xml:space="preserve""#);
    }

    pub fn write_to(&self, out: &mut String) {
        out.push_str(&self.open);
        write_nodes(&self.children, out);
        if let Some(close) = &self.close {
            out.push_str(close);
        }
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }
}

fn collect_text(nodes: &[Node], excluded: Option<&str>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(raw) => match unescape(raw) {
                Ok(text) => out.push_str(&text),
                Err(_) => out.push_str(raw),
            },
            Node::Element(el) if excluded != Some(el.name.as_str()) => {
                collect_text(&el.children, excluded, out)
            }
            _ => {}
        }
    }
}

/// Parses a part into a node list, keeping every event's raw markup.
pub fn parse(xml: &str) -> Result<Vec<Node>, XmlParseError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut roots: Vec<Node> = Vec::new();

    loop {
        let start = reader.buffer_position();
        let event = reader.read_event().map_err(|e| XmlParseError {
            message: e.to_string(),
            position: reader.buffer_position(),
        })?;
        let end = reader.buffer_position();
        let raw = xml.get(start..end).unwrap_or_default().to_string();

        let node = match event {
            Event::Start(tag) => {
                stack.push(Element {
                    name: String::from_utf8_lossy(tag.name().as_ref()).into_owned(),
                    open: raw,
                    close: None,
                    children: Vec::new(),
                });
                continue;
            }
            Event::End(tag) => {
                let mut element = stack.pop().ok_or_else(|| XmlParseError {
                    message: format!(
                        "unexpected closing tag </{}>",
                        String::from_utf8_lossy(tag.name().as_ref())
                    ),
                    position: start,
                })?;
                element.close = Some(raw);
                Node::Element(element)
            }
            Event::Empty(tag) => Node::Element(Element {
                name: String::from_utf8_lossy(tag.name().as_ref()).into_owned(),
                open: raw,
                close: None,
                children: Vec::new(),
            }),
            Event::Text(_) => Node::Text(raw),
            Event::Eof => break,
            _ => Node::Markup(raw),
        };

        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => roots.push(node),
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlParseError {
            message: format!("element <{}> is never closed", open.name),
            position: xml.len(),
        });
    }
    Ok(roots)
}

pub fn write_nodes(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Element(el) => el.write_to(out),
            Node::Text(raw) | Node::Markup(raw) => out.push_str(raw),
        }
    }
}

pub fn to_string(nodes: &[Node]) -> String {
    let mut out = String::new();
    write_nodes(nodes, &mut out);
    out
}

/// Collects `name` elements in document order. Matched elements are not
/// searched further, and neither are `stop_at` elements.
pub fn find_all_mut<'a>(
    nodes: &'a mut [Node],
    name: &str,
    stop_at: Option<&str>,
    out: &mut Vec<&'a mut Element>,
) {
    for node in nodes.iter_mut() {
        if let Node::Element(el) = node {
            if el.name == name {
                out.push(el);
            } else if stop_at != Some(el.name.as_str()) {
                find_all_mut(&mut el.children, name, stop_at, out);
            }
        }
    }
}

/// Immutable counterpart of [`find_all_mut`].
pub fn find_all<'a>(
    nodes: &'a [Node],
    name: &str,
    stop_at: Option<&str>,
    out: &mut Vec<&'a Element>,
) {
    for node in nodes {
        if let Node::Element(el) = node {
            if el.name == name {
                out.push(el);
            } else if stop_at != Some(el.name.as_str()) {
                find_all(&el.children, name, stop_at, out);
            }
        }
    }
}
