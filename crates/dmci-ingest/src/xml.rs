//! Small read-only XML tree
//!
//! Built from `quick_xml` events. Element and attribute names are stored
//! without their namespace prefix, which is all the MMD checks and the
//! catalog response parser need.

use crate::error::DocumentError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Deepest element nesting accepted by [`Element::parse`]
pub const MAX_DEPTH: usize = 256;

/// An XML element with its text content and children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Local name, e.g. `metadata_identifier` for `mmd:metadata_identifier`
    pub name: String,
    pub prefix: Option<String>,
    pub attributes: Vec<(String, String)>,
    /// Concatenated text and CDATA directly inside this element
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    /// Parse a complete document and return its root element
    pub fn parse(bytes: &[u8]) -> Result<Element, DocumentError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(DocumentError::Empty);
        }

        let mut reader = Reader::from_reader(bytes);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        let mut buf = Vec::new();

        loop {
            let event = reader.read_event_into(&mut buf).map_err(|e| {
                DocumentError::Malformed(format!("{} at position {}", e, reader.buffer_position()))
            })?;

            match event {
                Event::Start(start) => {
                    if stack.len() >= MAX_DEPTH {
                        return Err(DocumentError::Malformed(format!(
                            "elements nested deeper than {} levels",
                            MAX_DEPTH
                        )));
                    }
                    stack.push(Element::from_start(&start)?)
                },
                Event::Empty(start) => {
                    let element = Element::from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                },
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| DocumentError::Malformed("unexpected closing tag".into()))?;
                    attach(&mut stack, &mut root, element)?;
                },
                Event::Text(text) => {
                    let value = text
                        .unescape()
                        .map_err(|e| DocumentError::Malformed(e.to_string()))?;
                    match stack.last_mut() {
                        Some(current) => current.text.push_str(&value),
                        None if value.trim().is_empty() => {},
                        None => {
                            return Err(DocumentError::Malformed(
                                "text outside of the root element".into(),
                            ))
                        },
                    }
                },
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&data));
                    }
                },
                Event::Eof => break,
                _ => {},
            }
            buf.clear();
        }

        if let Some(open) = stack.last() {
            return Err(DocumentError::Malformed(format!("unclosed element '{}'", open.name)));
        }
        root.ok_or(DocumentError::Empty)
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Element, DocumentError> {
        let qname = start.name();
        let mut element = Element {
            name: String::from_utf8_lossy(qname.local_name().as_ref()).into_owned(),
            prefix: qname
                .prefix()
                .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned()),
            ..Default::default()
        };

        for attr in start.attributes() {
            let attr = attr.map_err(|e| DocumentError::Malformed(e.to_string()))?;
            if attr.key.as_namespace_binding().is_some() {
                continue;
            }
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| DocumentError::Malformed(e.to_string()))?
                .into_owned();
            element.attributes.push((key, value));
        }

        Ok(element)
    }

    /// Attribute value by local name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Trimmed text content
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// First direct child with the given local name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a Element> + 'n
    where
        'a: 'n,
    {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// All elements matching a `/`-separated path of child names
    pub fn find_all(&self, path: &str) -> Vec<&Element> {
        let mut current = vec![self];
        for step in path.split('/').filter(|s| !s.is_empty()) {
            current = current
                .into_iter()
                .flat_map(|e| e.children_named(step))
                .collect();
        }
        current
    }

    pub fn find(&self, path: &str) -> Option<&Element> {
        self.find_all(path).into_iter().next()
    }

    /// Text of the first element matching `path`
    pub fn find_text(&self, path: &str) -> Option<&str> {
        self.find(path).map(Element::text)
    }

    /// Every element below this one with the given local name, in document order
    pub fn descendants_named(&self, name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        let mut pending: Vec<&Element> = self.children.iter().rev().collect();
        while let Some(element) = pending.pop() {
            if element.name == name {
                found.push(element);
            }
            pending.extend(element.children.iter().rev());
        }
        found
    }
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), DocumentError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(DocumentError::Malformed("multiple root elements".into())),
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prefixed_document() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<mmd:mmd xmlns:mmd="http://www.met.no/schema/mmd">
  <mmd:title xml:lang="en">Sea ice &amp; snow</mmd:title>
  <mmd:keywords vocabulary="GCMDSK">
    <mmd:keyword>A</mmd:keyword>
    <mmd:keyword>B</mmd:keyword>
  </mmd:keywords>
  <mmd:description/>
</mmd:mmd>"#;

        let root = Element::parse(xml).unwrap();
        assert_eq!(root.name, "mmd");
        assert_eq!(root.prefix.as_deref(), Some("mmd"));
        assert!(root.attributes.is_empty());

        let title = root.child("title").unwrap();
        assert_eq!(title.text(), "Sea ice & snow");
        assert_eq!(title.attr("lang"), Some("en"));

        assert_eq!(root.find_all("keywords/keyword").len(), 2);
        assert_eq!(root.find("keywords").unwrap().attr("vocabulary"), Some("GCMDSK"));
        assert!(root.child("description").is_some());
    }

    #[test]
    fn test_lookups_outlive_the_path() {
        let root = Element::parse(b"<mmd><keywords><keyword>A</keyword><keyword>B</keyword></keywords></mmd>")
            .unwrap();
        let found = {
            let path = String::from("keywords/keyword");
            root.find_all(&path)
        };
        let texts: Vec<&str> = found.into_iter().map(Element::text).collect();
        assert_eq!(texts, vec!["A", "B"]);
    }

    #[test]
    fn test_descendants() {
        let xml = b"<a><b><c>1</c></b><c>2</c></a>";
        let root = Element::parse(xml).unwrap();
        let texts: Vec<_> = root.descendants_named("c").iter().map(|e| e.text()).collect();
        assert_eq!(texts, vec!["1", "2"]);
    }

    #[test]
    fn test_rejects_excessive_nesting() {
        let depth = 14_000;
        let xml = format!("<mmd>{}{}</mmd>", "<a>".repeat(depth), "</a>".repeat(depth));
        assert!(xml.len() < 100_000);
        let err = Element::parse(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, DocumentError::Malformed(ref m) if m.contains("nested deeper")));

        let xml = format!("{}{}", "<a>".repeat(MAX_DEPTH), "</a>".repeat(MAX_DEPTH));
        let root = Element::parse(xml.as_bytes()).unwrap();
        assert_eq!(root.descendants_named("a").len(), MAX_DEPTH - 1);
    }

    #[test]
    fn test_rejects_broken_documents() {
        assert_eq!(Element::parse(b"  \n").unwrap_err(), DocumentError::Empty);
        assert!(matches!(
            Element::parse(b"<a><b></a>"),
            Err(DocumentError::Malformed(_))
        ));
        assert!(matches!(
            Element::parse(b"<a><b>"),
            Err(DocumentError::Malformed(_))
        ));
        assert!(matches!(
            Element::parse(b"<a/><b/>"),
            Err(DocumentError::Malformed(_))
        ));
    }
}
