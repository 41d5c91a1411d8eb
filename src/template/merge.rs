//! Merge-field pass
//!
//! Replaces `{{name}}` tags in run text and expands `{{#name}}…{{/name}}`
//! (and inverted `{{^name}}…{{/name}}`) sections. A section inside one
//! paragraph is expanded inline; one whose tags sit in different sibling
//! blocks repeats those blocks; one that spans cells of a single table row
//! repeats the row.

use std::collections::BTreeSet;
use std::ops::Range;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use super::xml::{self, Element, Node, BREAK, PARAGRAPH, RUN, TABLE, TABLE_CELL, TABLE_ROW, TEXT};
use crate::error::MergeFieldError;
use crate::placeholder::{PlaceholderMap, PlaceholderValue};

lazy_static! {
    static ref TAG: Regex = Regex::new(r"\{\{\s*([#^/]?)\s*([^{}]*?)\s*\}\}").unwrap();
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    /// Fail on names the submission does not provide.
    pub strict: bool,
    /// Render `\n` in substituted values as `w:br`.
    pub linebreaks: bool,
}

/// Counters from one merge pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeReport {
    pub substitutions: usize,
    pub sections: usize,
    pub unresolved: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Variable,
    Open { inverted: bool },
    Close,
}

#[derive(Debug, Clone)]
struct Tag {
    kind: TagKind,
    name: String,
    span: Range<usize>,
}

fn scan_tags(text: &str) -> Vec<Tag> {
    TAG.captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let kind = match caps.get(1).map(|m| m.as_str()) {
                Some("#") => TagKind::Open { inverted: false },
                Some("^") => TagKind::Open { inverted: true },
                Some("/") => TagKind::Close,
                _ => TagKind::Variable,
            };
            Some(Tag {
                kind,
                name: caps.get(2)?.as_str().to_string(),
                span: whole.range(),
            })
        })
        .collect()
}

struct Scope<'a> {
    data: &'a PlaceholderMap,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    fn lookup(&self, name: &str) -> Option<&'a PlaceholderValue> {
        self.data
            .get(name)
            .or_else(|| self.parent.and_then(|parent| parent.lookup(name)))
    }
}

struct MergeContext {
    options: MergeOptions,
    unresolved: BTreeSet<String>,
    substitutions: usize,
    sections: usize,
}

pub fn merge_fields(
    mut nodes: Vec<Node>,
    data: &PlaceholderMap,
    options: MergeOptions,
) -> Result<(Vec<Node>, MergeReport), MergeFieldError> {
    normalize_paragraphs(&mut nodes);

    let mut ctx = MergeContext {
        options,
        unresolved: BTreeSet::new(),
        substitutions: 0,
        sections: 0,
    };
    let root = Scope { data, parent: None };
    let rendered = render_nodes(nodes, &root, &mut ctx)?;

    let report = MergeReport {
        substitutions: ctx.substitutions,
        sections: ctx.sections,
        unresolved: ctx.unresolved.into_iter().collect(),
    };
    if options.strict && !report.unresolved.is_empty() {
        return Err(MergeFieldError::Unresolved(report.unresolved));
    }
    Ok((rendered, report))
}

// -------------------- Tag normalization --------------------

fn normalize_paragraphs(nodes: &mut [Node]) {
    for node in nodes.iter_mut() {
        if let Node::Element(el) = node {
            if el.is(PARAGRAPH) {
                normalize_paragraph(el);
            }
            normalize_paragraphs(&mut el.children);
        }
    }
}

/// Word splits typed text into runs freely, so a tag can straddle several
/// `w:t` elements. Each tag, and each section opened and closed inside the
/// paragraph, is moved into the run where it starts.
fn normalize_paragraph(paragraph: &mut Element) {
    let mut slots = Vec::new();
    xml::find_all_mut(&mut paragraph.children, TEXT, Some(PARAGRAPH), &mut slots);
    if slots.len() < 2 {
        return;
    }

    let texts: Vec<String> = slots.iter().map(|slot| slot.text()).collect();
    let full = texts.concat();
    if !full.contains("{{") {
        return;
    }

    let mut owner = Vec::with_capacity(full.len());
    for (index, text) in texts.iter().enumerate() {
        owner.extend(std::iter::repeat(index).take(text.len()));
    }

    let tags = scan_tags(&full);
    let mut spans: Vec<Range<usize>> = tags.iter().map(|tag| tag.span.clone()).collect();
    let mut open: Vec<&Tag> = Vec::new();
    for tag in &tags {
        match tag.kind {
            TagKind::Open { .. } => open.push(tag),
            TagKind::Close => {
                if let Some(pos) = open.iter().rposition(|o| o.name == tag.name) {
                    spans.push(open[pos].span.start..tag.span.end);
                    open.truncate(pos);
                }
            }
            TagKind::Variable => {}
        }
    }
    for span in spans {
        let target = owner[span.start];
        owner[span].iter_mut().for_each(|slot| *slot = target);
    }

    let mut rebuilt = vec![String::new(); slots.len()];
    for (pos, ch) in full.char_indices() {
        rebuilt[owner[pos]].push(ch);
    }
    for ((slot, old), new) in slots.iter_mut().zip(&texts).zip(rebuilt) {
        if *old != new {
            slot.set_text(&new);
        }
    }
}

// -------------------- Section boundaries --------------------

#[derive(Debug, Clone)]
struct SectionTag {
    name: String,
    kind: TagKind,
}

/// Section tags of a subtree that are not balanced inside it, in order.
fn pending_sections(node: &Node) -> Vec<SectionTag> {
    match node {
        Node::Element(el) => element_pending_sections(el),
        _ => Vec::new(),
    }
}

fn element_pending_sections(el: &Element) -> Vec<SectionTag> {
    let mut slots = Vec::new();
    if el.is(TEXT) {
        slots.push(el);
    } else {
        xml::find_all(&el.children, TEXT, None, &mut slots);
    }

    let mut pending: Vec<SectionTag> = Vec::new();
    for slot in slots {
        let text = slot.text();
        if !text.contains("{{") {
            continue;
        }
        for tag in scan_tags(&text) {
            match tag.kind {
                TagKind::Variable => {}
                TagKind::Open { .. } => pending.push(SectionTag {
                    name: tag.name,
                    kind: tag.kind,
                }),
                TagKind::Close => {
                    let closes_last = pending.last().map_or(false, |last| {
                        matches!(last.kind, TagKind::Open { .. }) && last.name == tag.name
                    });
                    if closes_last {
                        pending.pop();
                    } else {
                        pending.push(SectionTag {
                            name: tag.name,
                            kind: tag.kind,
                        });
                    }
                }
            }
        }
    }
    pending
}

fn find_section_end(pending: &[Vec<SectionTag>], start: usize, name: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (index, tags) in pending.iter().enumerate().skip(start) {
        for tag in tags.iter().filter(|tag| tag.name == name) {
            match tag.kind {
                TagKind::Open { .. } => depth += 1,
                TagKind::Close => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(index);
                    }
                }
                TagKind::Variable => {}
            }
        }
    }
    None
}

/// First unbalanced section tag among a row's cells, if the row hosts a
/// section that opens in one cell and closes in another.
fn row_section(row: &Element) -> Option<SectionTag> {
    let mut cells = Vec::new();
    xml::find_all(&row.children, TABLE_CELL, Some(TABLE), &mut cells);
    cells
        .into_iter()
        .map(element_pending_sections)
        .find_map(|tags| tags.into_iter().next())
}

// -------------------- Rendering --------------------

fn render_nodes(
    nodes: Vec<Node>,
    scope: &Scope<'_>,
    ctx: &mut MergeContext,
) -> Result<Vec<Node>, MergeFieldError> {
    let pending: Vec<Vec<SectionTag>> = nodes.iter().map(pending_sections).collect();
    let mut nodes: Vec<Option<Node>> = nodes.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(nodes.len());
    let mut index = 0;

    while index < nodes.len() {
        match pending[index].first() {
            Some(tag) if tag.kind == TagKind::Close => {
                return Err(MergeFieldError::UnexpectedClose(tag.name.clone()));
            }
            Some(open) => {
                let end = find_section_end(&pending, index, &open.name)
                    .ok_or_else(|| MergeFieldError::UnclosedSection(open.name.clone()))?;
                let unit: Vec<Node> = nodes[index..=end].iter_mut().filter_map(Option::take).collect();
                out.extend(expand_section(unit, open, scope, ctx)?);
                index = end + 1;
            }
            None => {
                if let Some(node) = nodes[index].take() {
                    out.extend(render_node(node, scope, ctx)?);
                }
                index += 1;
            }
        }
    }
    Ok(out)
}

fn render_node(
    node: Node,
    scope: &Scope<'_>,
    ctx: &mut MergeContext,
) -> Result<Vec<Node>, MergeFieldError> {
    let mut el = match node {
        Node::Element(el) => el,
        other => return Ok(vec![other]),
    };

    if el.is(TABLE_ROW) {
        if let Some(tag) = row_section(&el) {
            if tag.kind == TagKind::Close {
                return Err(MergeFieldError::UnexpectedClose(tag.name));
            }
            return expand_section(vec![Node::Element(el)], &tag, scope, ctx);
        }
    }

    if el.is(TEXT) {
        render_text_slot(&mut el, scope, ctx)?;
        return Ok(vec![Node::Element(el)]);
    }

    let templated_run = ctx.options.linebreaks && el.is(RUN) && el.text().contains("{{");
    let children = std::mem::take(&mut el.children);
    el.children = render_nodes(children, scope, ctx)?;
    if templated_run {
        split_line_breaks(&mut el);
    }
    Ok(vec![Node::Element(el)])
}

fn expand_section(
    mut unit: Vec<Node>,
    open: &SectionTag,
    scope: &Scope<'_>,
    ctx: &mut MergeContext,
) -> Result<Vec<Node>, MergeFieldError> {
    let inverted = matches!(open.kind, TagKind::Open { inverted: true });
    strip_tag(&mut unit, &open.name, false);
    strip_tag(&mut unit, &open.name, true);
    drop_blank_boundary_paragraphs(&mut unit);
    ctx.sections += 1;

    let value = scope.lookup(&open.name);
    if value.is_none() && !inverted {
        ctx.unresolved.insert(open.name.clone());
    }
    debug!(section = %open.name, inverted, "expanding block section");

    let mut out = Vec::new();
    match value {
        Some(PlaceholderValue::List(items)) if !inverted => {
            for item in items {
                let child = Scope {
                    data: item,
                    parent: Some(scope),
                };
                out.extend(render_nodes(unit.clone(), &child, ctx)?);
            }
        }
        value => {
            let truthy = value.map_or(false, PlaceholderValue::is_truthy);
            if truthy != inverted {
                out.extend(render_nodes(unit, scope, ctx)?);
            }
        }
    }
    Ok(out)
}

/// Removes the first opening (or last closing) tag of a section from the
/// text runs of `nodes`.
fn strip_tag(nodes: &mut [Node], name: &str, closing: bool) -> bool {
    let mut slots = Vec::new();
    xml::find_all_mut(nodes, TEXT, None, &mut slots);
    if closing {
        slots.reverse();
    }

    for slot in slots {
        let text = slot.text();
        let tags = scan_tags(&text);
        let wanted = |tag: &&Tag| {
            tag.name == name
                && match tag.kind {
                    TagKind::Close => closing,
                    TagKind::Open { .. } => !closing,
                    TagKind::Variable => false,
                }
        };
        let found = if closing {
            tags.iter().rev().find(wanted)
        } else {
            tags.iter().find(wanted)
        };
        if let Some(tag) = found {
            let mut stripped = text.clone();
            stripped.replace_range(tag.span.clone(), "");
            slot.set_text(&stripped);
            return true;
        }
    }
    false
}

/// Paragraphs that held nothing but a section tag are not repeated.
fn drop_blank_boundary_paragraphs(unit: &mut Vec<Node>) {
    let elements: Vec<usize> = unit
        .iter()
        .enumerate()
        .filter(|(_, node)| matches!(node, Node::Element(_)))
        .map(|(index, _)| index)
        .collect();
    if elements.len() < 2 {
        return;
    }

    let is_blank = |node: &Node| match node {
        Node::Element(el) => {
            let mut media = Vec::new();
            xml::find_all(&el.children, "w:drawing", None, &mut media);
            xml::find_all(&el.children, "w:pict", None, &mut media);
            el.is(PARAGRAPH) && el.text().trim().is_empty() && media.is_empty()
        }
        _ => false,
    };

    let last = elements[elements.len() - 1];
    if is_blank(&unit[last]) {
        unit.remove(last);
    }
    let first = elements[0];
    if is_blank(&unit[first]) {
        unit.remove(first);
    }
}

fn render_text_slot(
    slot: &mut Element,
    scope: &Scope<'_>,
    ctx: &mut MergeContext,
) -> Result<(), MergeFieldError> {
    let text = slot.text();
    if !text.contains("{{") {
        return Ok(());
    }
    let pieces = parse_inline(&text)?;
    let mut rendered = String::with_capacity(text.len());
    render_pieces(&pieces, scope, ctx, &mut rendered);
    if rendered != text {
        slot.set_text(&rendered);
    }
    Ok(())
}

enum Piece<'t> {
    Literal(&'t str),
    Variable(String),
    Section {
        name: String,
        inverted: bool,
        body: Vec<Piece<'t>>,
    },
}

fn parse_inline(text: &str) -> Result<Vec<Piece<'_>>, MergeFieldError> {
    let mut stack: Vec<(String, bool, Vec<Piece<'_>>)> = Vec::new();
    let mut current: Vec<Piece<'_>> = Vec::new();
    let mut last = 0;

    for tag in scan_tags(text) {
        if tag.span.start > last {
            current.push(Piece::Literal(&text[last..tag.span.start]));
        }
        last = tag.span.end;
        match tag.kind {
            TagKind::Variable => current.push(Piece::Variable(tag.name)),
            TagKind::Open { inverted } => {
                stack.push((tag.name, inverted, std::mem::take(&mut current)));
            }
            TagKind::Close => {
                let (name, inverted, parent) = stack
                    .pop()
                    .ok_or_else(|| MergeFieldError::UnexpectedClose(tag.name.clone()))?;
                if name != tag.name {
                    return Err(MergeFieldError::UnclosedSection(name));
                }
                let body = std::mem::replace(&mut current, parent);
                current.push(Piece::Section {
                    name,
                    inverted,
                    body,
                });
            }
        }
    }
    if let Some((name, _, _)) = stack.pop() {
        return Err(MergeFieldError::UnclosedSection(name));
    }
    if last < text.len() {
        current.push(Piece::Literal(&text[last..]));
    }
    Ok(current)
}

fn render_pieces(pieces: &[Piece<'_>], scope: &Scope<'_>, ctx: &mut MergeContext, out: &mut String) {
    for piece in pieces {
        match piece {
            Piece::Literal(text) => out.push_str(text),
            Piece::Variable(name) => match scope.lookup(name) {
                Some(value) => {
                    if let Some(text) = value.as_scalar() {
                        out.push_str(&text);
                    }
                    ctx.substitutions += 1;
                }
                None => {
                    ctx.unresolved.insert(name.clone());
                }
            },
            Piece::Section {
                name,
                inverted,
                body,
            } => {
                ctx.sections += 1;
                let value = scope.lookup(name);
                if value.is_none() && !inverted {
                    ctx.unresolved.insert(name.clone());
                }
                match value {
                    Some(PlaceholderValue::List(items)) if !inverted => {
                        for item in items {
                            let child = Scope {
                                data: item,
                                parent: Some(scope),
                            };
                            render_pieces(body, &child, ctx, out);
                        }
                    }
                    value => {
                        if value.map_or(false, PlaceholderValue::is_truthy) != *inverted {
                            render_pieces(body, scope, ctx, out);
                        }
                    }
                }
            }
        }
    }
}

/// Splits `w:t` children carrying newlines into text/`w:br` sequences.
fn split_line_breaks(run: &mut Element) {
    let has_newline =
        |node: &Node| matches!(node, Node::Element(t) if t.is(TEXT) && t.text().contains('\n'));
    if !run.children.iter().any(has_newline) {
        return;
    }

    let children = std::mem::take(&mut run.children);
    for child in children {
        match child {
            Node::Element(text_el) if text_el.is(TEXT) && text_el.text().contains('\n') => {
                let text = text_el.text();
                for (index, line) in text.split('\n').enumerate() {
                    if index > 0 {
                        run.children.push(Node::Element(Element::empty(BREAK)));
                    }
                    let mut piece = text_el.clone();
                    piece.set_text(line);
                    run.children.push(Node::Element(piece));
                }
            }
            other => run.children.push(other),
        }
    }
}
