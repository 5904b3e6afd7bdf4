//! XML ingestion for Xylograph
//!
//! This crate owns everything that touches the source documents:
//!
//! - parsing XML into a plain element tree ([`XmlNode`]),
//! - selecting elements by tag or slash path (for the data pass),
//! - structural type inference over parsed trees (`walker`).
//!
//! The tree is deliberately dumb: tags, attributes in document order,
//! trimmed text, children. Namespaces are reduced to local names.

pub mod walker;

use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;
use thiserror::Error;

pub use walker::{infer_mapping, WalkReport};

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed XML: {0}")]
    Parse(#[from] quick_xml::Error),
    #[error("malformed attribute: {0}")]
    Attr(#[from] AttrError),
    #[error("document has no root element")]
    NoRoot,
    #[error("document has more than one root element")]
    MultipleRoots,
    #[error("closing tag without matching open")]
    UnbalancedClose,
}

// ============================================================================
// Element tree
// ============================================================================

/// One parsed element: tag, attributes in document order, trimmed text
/// content, children in document order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlNode {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First direct child with the given tag.
    pub fn child(&self, tag: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.tag == tag)
    }

    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Text content when this element is a scalar: non-empty text and no
    /// element children.
    pub fn scalar_text(&self) -> Option<&str> {
        if self.children.is_empty() && !self.text.is_empty() {
            Some(self.text.as_str())
        } else {
            None
        }
    }
}

/// All elements matching a slash-separated tag path from the root, e.g.
/// `/library/item`. Document order.
pub fn select<'a>(root: &'a XmlNode, selector: &str) -> Vec<&'a XmlNode> {
    let segments: Vec<&str> = selector.split('/').filter(|s| !s.is_empty()).collect();
    let mut out = Vec::new();
    match segments.split_first() {
        Some((first, rest)) if *first == root.tag => collect_path(root, rest, &mut out),
        _ => {}
    }
    out
}

fn collect_path<'a>(node: &'a XmlNode, rest: &[&str], out: &mut Vec<&'a XmlNode>) {
    match rest.split_first() {
        None => out.push(node),
        Some((next, tail)) => {
            // Filter inline: `children_named` ties the children's lifetime to
            // the tag borrow, which would cap them at `rest`'s inner lifetime.
            for child in node.children.iter().filter(|c| c.tag == **next) {
                collect_path(child, tail, out);
            }
        }
    }
}

/// All elements with the given tag anywhere under (and including) `root`.
/// Document order.
pub fn elements_by_tag<'a>(root: &'a XmlNode, tag: &str) -> Vec<&'a XmlNode> {
    let mut out = Vec::new();
    collect_by_tag(root, tag, &mut out);
    out
}

fn collect_by_tag<'a>(node: &'a XmlNode, tag: &str, out: &mut Vec<&'a XmlNode>) {
    if node.tag == tag {
        out.push(node);
    }
    for child in &node.children {
        collect_by_tag(child, tag, out);
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse one XML document into its root element.
pub fn parse_document(input: &str) -> Result<XmlNode, XmlError> {
    let mut reader = Reader::from_str(input);
    reader.trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                stack.push(node_from_start(&e)?);
            }
            Event::Empty(e) => {
                let node = node_from_start(&e)?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::End(_) => {
                let node = stack.pop().ok_or(XmlError::UnbalancedClose)?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    push_text(top, &t.unescape()?);
                }
            }
            Event::CData(t) => {
                if let Some(top) = stack.last_mut() {
                    let raw = t.into_inner();
                    push_text(top, &String::from_utf8_lossy(&raw));
                }
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions, doctypes.
            _ => {}
        }
    }

    root.ok_or(XmlError::NoRoot)
}

/// Read and parse an XML file.
pub fn parse_file(path: &Path) -> Result<XmlNode, XmlError> {
    let contents = std::fs::read_to_string(path)?;
    parse_document(&contents)
}

fn node_from_start(e: &BytesStart) -> Result<XmlNode, XmlError> {
    let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }
    Ok(XmlNode {
        tag,
        attributes,
        text: String::new(),
        children: Vec::new(),
    })
}

fn attach(
    stack: &mut Vec<XmlNode>,
    root: &mut Option<XmlNode>,
    node: XmlNode,
) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    } else if root.is_none() {
        *root = Some(node);
    } else {
        return Err(XmlError::MultipleRoots);
    }
    Ok(())
}

fn push_text(node: &mut XmlNode, text: &str) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }
    if !node.text.is_empty() {
        node.text.push(' ');
    }
    node.text.push_str(trimmed);
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<library name="central">
  <item sku="b-1">
    <title>Dune</title>
    <tag>scifi</tag>
    <tag>classic</tag>
  </item>
  <item sku="b-2">
    <title>Neuromancer &amp; Others</title>
    <tag>scifi</tag>
  </item>
</library>"#;

    #[test]
    fn parses_nested_document() {
        let root = parse_document(SAMPLE).unwrap();
        assert_eq!(root.tag, "library");
        assert_eq!(root.attribute("name"), Some("central"));
        assert_eq!(root.children.len(), 2);

        let first = &root.children[0];
        assert_eq!(first.tag, "item");
        assert_eq!(first.attribute("sku"), Some("b-1"));
        assert_eq!(first.child("title").unwrap().scalar_text(), Some("Dune"));
        assert_eq!(first.children_named("tag").count(), 2);
    }

    #[test]
    fn unescapes_entities() {
        let root = parse_document(SAMPLE).unwrap();
        let second = &root.children[1];
        assert_eq!(
            second.child("title").unwrap().scalar_text(),
            Some("Neuromancer & Others")
        );
    }

    #[test]
    fn handles_empty_elements_and_cdata() {
        let root =
            parse_document(r#"<doc><marker kind="end"/><note><![CDATA[a < b]]></note></doc>"#)
                .unwrap();
        assert_eq!(root.children[0].attribute("kind"), Some("end"));
        assert_eq!(root.children[1].scalar_text(), Some("a < b"));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            parse_document("no markup at all"),
            Err(XmlError::NoRoot)
        ));
        assert!(parse_document("<a><b></a></b>").is_err());
        assert!(matches!(
            parse_document("<a/><b/>"),
            Err(XmlError::MultipleRoots)
        ));
    }

    #[test]
    fn selects_by_path_and_tag() {
        let root = parse_document(SAMPLE).unwrap();
        assert_eq!(select(&root, "/library/item").len(), 2);
        assert_eq!(select(&root, "/library/item/tag").len(), 3);
        assert_eq!(select(&root, "/other/item").len(), 0);
        assert_eq!(elements_by_tag(&root, "tag").len(), 3);
    }

    #[test]
    fn selects_nested_same_tag_paths() {
        let root = parse_document(
            r#"<forum><post id="1"><post id="2"/><post id="3"/></post><post id="4"/></forum>"#,
        )
        .unwrap();
        assert_eq!(select(&root, "/forum/post").len(), 2);
        let nested = select(&root, "/forum/post/post");
        assert_eq!(nested.len(), 2);
        assert_eq!(nested[0].attribute("id"), Some("2"));
        assert_eq!(elements_by_tag(&root, "post").len(), 4);
    }

    #[test]
    fn scalar_text_requires_leaf() {
        let root = parse_document("<a>text<b/></a>").unwrap();
        // `a` has element children, so it is not scalar.
        assert_eq!(root.scalar_text(), None);
        assert_eq!(root.text, "text");
    }
}
