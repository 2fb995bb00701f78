//! XML element trees and the structural pre-scan
//!
//! `entity_names` only walks the event stream far enough to read the `name`
//! attribute of each child of the root element. `parse_document` builds a full
//! element tree, tagging every node with the file it came from.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CacheError, Result};

/// Attribute naming a top-level entity
pub const NAME_ATTRIBUTE: &str = "name";

/// A parsed XML element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,
    /// Files that declared or extended this node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub origins: Vec<String>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
            text: None,
            children: Vec::new(),
            origins: Vec::new(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Record `file` as a contributor of this node
    pub fn add_origin(&mut self, file: &str) {
        if !self.origins.iter().any(|o| o == file) {
            self.origins.push(file.to_string());
        }
    }

    fn tag_origin_recursive(&mut self, file: &str) {
        self.add_origin(file);
        for child in &mut self.children {
            child.tag_origin_recursive(file);
        }
    }

    fn from_start(start: &BytesStart<'_>, file: &str) -> Result<Self> {
        let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
        for attr in start.attributes() {
            let attr = attr.map_err(|e| CacheError::invalid_xml(file, e))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| CacheError::invalid_xml(file, e))?
                .into_owned();
            element.attributes.insert(key, value);
        }
        Ok(element)
    }
}

/// Read the `name` attribute of every child of the root element.
///
/// Children without a `name` attribute are skipped; schema validation reports
/// them later.
pub fn entity_names(content: &str, file: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(content);
    let mut depth = 0usize;
    let mut names = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if depth == 1 {
                    push_name(e, file, &mut names)?;
                }
                depth += 1;
            }
            Ok(Event::Empty(ref e)) => {
                if depth == 1 {
                    push_name(e, file, &mut names)?;
                }
            }
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(CacheError::invalid_xml(
                    file,
                    format!("{} at position {}", e, reader.buffer_position()),
                ))
            }
        }
    }

    Ok(names)
}

fn push_name(start: &BytesStart<'_>, file: &str, names: &mut Vec<String>) -> Result<()> {
    let attr = start
        .try_get_attribute(NAME_ATTRIBUTE)
        .map_err(|e| CacheError::invalid_xml(file, e))?;
    if let Some(attr) = attr {
        let value = attr
            .unescape_value()
            .map_err(|e| CacheError::invalid_xml(file, e))?;
        names.push(value.into_owned());
    }
    Ok(())
}

/// Parse a whole document into an element tree rooted at the document element
pub fn parse_document(content: &str, file: &str) -> Result<Element> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            CacheError::invalid_xml(file, format!("{} at position {}", e, reader.buffer_position()))
        })?;
        match event {
            Event::Start(ref e) => {
                if root.is_some() {
                    return Err(CacheError::invalid_xml(file, "content after document element"));
                }
                stack.push(Element::from_start(e, file)?);
            }
            Event::Empty(ref e) => {
                let element = Element::from_start(e, file)?;
                attach(element, &mut stack, &mut root, file)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| CacheError::invalid_xml(file, "unbalanced closing tag"))?;
                attach(element, &mut stack, &mut root, file)?;
            }
            Event::Text(ref t) => {
                let text = t.unescape().map_err(|e| CacheError::invalid_xml(file, e))?;
                append_text(&mut stack, &text);
            }
            Event::CData(ref c) => {
                let text = String::from_utf8_lossy(c).into_owned();
                append_text(&mut stack, &text);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(CacheError::invalid_xml(file, "unexpected end of document"));
    }
    let mut root = root.ok_or_else(|| CacheError::invalid_xml(file, "document has no root element"))?;
    root.tag_origin_recursive(file);
    Ok(root)
}

fn attach(
    element: Element,
    stack: &mut [Element],
    root: &mut Option<Element>,
    file: &str,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(CacheError::invalid_xml(file, "multiple document elements")),
    }
    Ok(())
}

fn append_text(stack: &mut [Element], text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(current) = stack.last_mut() {
        current.text.get_or_insert_with(String::new).push_str(text);
    }
}
