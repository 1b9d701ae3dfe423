//! Namespace-aware XML document model
//!
//! Parses a document into an owned node arena with quick-xml. Element names
//! are resolved to (namespace URI, local name) pairs so rule patterns can
//! match qualified names; SAML metadata is meaningless without this.

use crate::error::ParseError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::path::Path;

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Kind of a parsed node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
}

/// A qualified name: resolved namespace URI plus local part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QName {
    pub namespace: Option<String>,
    pub local: String,
}

impl QName {
    pub fn local(local: &str) -> Self {
        Self {
            namespace: None,
            local: local.to_string(),
        }
    }
}

/// A node in the parsed document
#[derive(Debug, Clone)]
pub struct XmlNode {
    pub kind: NodeKind,
    pub name: QName,
    /// Attributes keyed by their literal name as written (xmlns declarations
    /// are consumed during parsing and never appear here).
    pub attrs: HashMap<String, String>,
    pub children: Vec<usize>,
    pub parent: Option<usize>,
    pub line: usize,
    pub column: usize,
    text: Option<String>,
}

impl XmlNode {
    fn element(name: QName, line: usize, column: usize) -> Self {
        Self {
            kind: NodeKind::Element,
            name,
            attrs: HashMap::new(),
            children: Vec::new(),
            parent: None,
            line,
            column,
            text: None,
        }
    }

    fn text_node(content: &str, line: usize, column: usize) -> Self {
        Self {
            kind: NodeKind::Text,
            name: QName::local("#text"),
            attrs: HashMap::new(),
            children: Vec::new(),
            parent: None,
            line,
            column,
            text: Some(content.to_string()),
        }
    }

    pub fn is_element(&self) -> bool {
        self.kind == NodeKind::Element
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(|v| v.as_str())
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

/// A parsed XML document
#[derive(Debug)]
pub struct Document {
    nodes: Vec<XmlNode>,
    root: Option<usize>,
}

impl Document {
    /// Parse `content` into a document tree.
    ///
    /// `path` is used for error reporting only; no I/O happens here.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ParseError> {
        parse_document(content, path)
    }

    pub fn root(&self) -> Option<&XmlNode> {
        self.root.map(|idx| &self.nodes[idx])
    }

    /// All nodes in document order (depth-first).
    pub fn nodes(&self) -> impl Iterator<Item = &XmlNode> {
        self.nodes.iter()
    }

    pub fn children<'a>(&'a self, node: &'a XmlNode) -> impl Iterator<Item = &'a XmlNode> + 'a {
        node.children.iter().map(move |&idx| &self.nodes[idx])
    }

    /// Text content of a node: the node's own text, or the concatenation of
    /// its direct text children for an element. `None` when there is none.
    pub fn text_of(&self, node: &XmlNode) -> Option<String> {
        if node.kind == NodeKind::Text {
            return node.text().map(String::from);
        }
        let mut out = String::new();
        for child in self.children(node) {
            if let Some(t) = child.text() {
                out.push_str(t);
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}

type NsScope = HashMap<String, Option<String>>;

/// Split a raw element name into (prefix, local).
fn split_name(raw: &str) -> (&str, &str) {
    match raw.split_once(':') {
        Some((prefix, local)) => (prefix, local),
        None => ("", raw),
    }
}

/// Resolve a prefix against the element's own declarations and the scope
/// stack. The empty prefix resolves to the in-scope default namespace.
fn resolve_prefix(
    prefix: &str,
    local_decls: &NsScope,
    ns_stack: &[NsScope],
) -> Result<Option<String>, String> {
    if prefix == "xml" {
        return Ok(Some(XML_NAMESPACE.to_string()));
    }
    if let Some(decl) = local_decls.get(prefix) {
        return Ok(decl.clone());
    }
    for scope in ns_stack.iter().rev() {
        if let Some(decl) = scope.get(prefix) {
            return Ok(decl.clone());
        }
    }
    if prefix.is_empty() {
        Ok(None)
    } else {
        Err(format!("unbound namespace prefix `{}`", prefix))
    }
}

/// Pull xmlns declarations and ordinary attributes off an element tag.
fn read_attributes(e: &BytesStart) -> (NsScope, HashMap<String, String>) {
    let mut decls = NsScope::new();
    let mut attrs = HashMap::new();

    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = String::from_utf8_lossy(&attr.value).to_string();

        if key == "xmlns" {
            let uri = if value.is_empty() { None } else { Some(value) };
            decls.insert(String::new(), uri);
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            decls.insert(prefix.to_string(), Some(value));
        } else {
            attrs.insert(key, value);
        }
    }

    (decls, attrs)
}

fn build_element(
    e: &BytesStart,
    ns_stack: &[NsScope],
    line: usize,
    column: usize,
) -> Result<(XmlNode, NsScope), String> {
    let raw = String::from_utf8_lossy(e.name().as_ref()).to_string();
    let (decls, attrs) = read_attributes(e);
    let (prefix, local) = split_name(&raw);
    let namespace = resolve_prefix(prefix, &decls, ns_stack)?;

    let mut node = XmlNode::element(
        QName {
            namespace,
            local: local.to_string(),
        },
        line,
        column,
    );
    node.attrs = attrs;
    Ok((node, decls))
}

fn parse_document(content: &str, path: &Path) -> Result<Document, ParseError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut nodes: Vec<XmlNode> = Vec::new();
    let mut stack: Vec<usize> = Vec::new();
    let mut ns_stack: Vec<NsScope> = Vec::new();
    let mut root: Option<usize> = None;
    let mut buf = Vec::new();

    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(content.match_indices('\n').map(|(i, _)| i + 1))
        .collect();

    let pos_to_line_col = |pos: u64| -> (usize, usize) {
        let pos = pos as usize;
        let line = line_starts.partition_point(|&start| start <= pos);
        let col = pos - line_starts.get(line.saturating_sub(1)).unwrap_or(&0) + 1;
        (line, col)
    };

    let xml_err = |line: usize, message: String| ParseError::Xml {
        path: path.to_path_buf(),
        line,
        message,
    };

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let (line, col) = pos_to_line_col(reader.buffer_position());
                let (mut node, decls) =
                    build_element(&e, &ns_stack, line, col).map_err(|m| xml_err(line, m))?;

                let idx = nodes.len();
                if let Some(&parent) = stack.last() {
                    node.parent = Some(parent);
                    nodes.push(node);
                    nodes[parent].children.push(idx);
                } else if root.is_none() {
                    nodes.push(node);
                    root = Some(idx);
                } else {
                    return Err(xml_err(line, "multiple root elements".to_string()));
                }

                ns_stack.push(decls);
                stack.push(idx);
            }

            Ok(Event::Empty(e)) => {
                let (line, col) = pos_to_line_col(reader.buffer_position());
                let (mut node, _decls) =
                    build_element(&e, &ns_stack, line, col).map_err(|m| xml_err(line, m))?;

                let idx = nodes.len();
                if let Some(&parent) = stack.last() {
                    node.parent = Some(parent);
                    nodes.push(node);
                    nodes[parent].children.push(idx);
                } else if root.is_none() {
                    nodes.push(node);
                    root = Some(idx);
                } else {
                    return Err(xml_err(line, "multiple root elements".to_string()));
                }
            }

            Ok(Event::End(_)) => {
                stack.pop();
                ns_stack.pop();
            }

            Ok(Event::Text(e)) => {
                let (line, col) = pos_to_line_col(reader.buffer_position());
                let text = e
                    .unescape()
                    .map_err(|err| xml_err(line, err.to_string()))?;
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    let idx = nodes.len();
                    let mut node = XmlNode::text_node(trimmed, line, col);
                    if let Some(&parent) = stack.last() {
                        node.parent = Some(parent);
                        nodes.push(node);
                        nodes[parent].children.push(idx);
                    } else {
                        return Err(xml_err(line, "text outside the root element".to_string()));
                    }
                }
            }

            Ok(Event::CData(e)) => {
                let (line, col) = pos_to_line_col(reader.buffer_position());
                let text = String::from_utf8_lossy(&e).to_string();
                if !text.is_empty() {
                    let idx = nodes.len();
                    let mut node = XmlNode::text_node(&text, line, col);
                    if let Some(&parent) = stack.last() {
                        node.parent = Some(parent);
                        nodes.push(node);
                        nodes[parent].children.push(idx);
                    } else {
                        return Err(xml_err(line, "text outside the root element".to_string()));
                    }
                }
            }

            Ok(Event::Eof) => break,

            Err(e) => {
                let (line, _) = pos_to_line_col(reader.buffer_position());
                return Err(xml_err(line, e.to_string()));
            }

            _ => {}
        }

        buf.clear();
    }

    if let Some(&open) = stack.last() {
        let line = nodes[open].line;
        return Err(xml_err(
            line,
            format!("unclosed element <{}>", nodes[open].name.local),
        ));
    }

    if root.is_none() {
        return Err(xml_err(1, "no root element".to_string()));
    }

    Ok(Document { nodes, root })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MD_NS: &str = "urn:oasis:names:tc:SAML:2.0:metadata";

    fn parse(content: &str) -> Document {
        Document::parse(content, Path::new("test.xml")).unwrap()
    }

    #[test]
    fn test_parse_basic() {
        let doc = parse(r#"<?xml version="1.0"?><root><child/></root>"#);
        let root = doc.root().unwrap();
        assert_eq!(root.name.local, "root");
        assert_eq!(doc.children(root).count(), 1);
    }

    #[test]
    fn test_prefixed_namespace_resolution() {
        let doc = parse(&format!(
            r#"<md:EntityDescriptor xmlns:md="{}" entityID="https://idp.example.org">
                 <md:IDPSSODescriptor/>
               </md:EntityDescriptor>"#,
            MD_NS
        ));
        let root = doc.root().unwrap();
        assert_eq!(root.name.namespace.as_deref(), Some(MD_NS));
        assert_eq!(root.name.local, "EntityDescriptor");
        assert_eq!(root.attr("entityID"), Some("https://idp.example.org"));

        let child = doc.children(root).next().unwrap();
        assert_eq!(child.name.namespace.as_deref(), Some(MD_NS));
        assert_eq!(child.name.local, "IDPSSODescriptor");
    }

    #[test]
    fn test_default_namespace_applies_to_descendants() {
        let doc = parse(r#"<a xmlns="urn:x"><b/></a>"#);
        let root = doc.root().unwrap();
        let b = doc.children(root).next().unwrap();
        assert_eq!(root.name.namespace.as_deref(), Some("urn:x"));
        assert_eq!(b.name.namespace.as_deref(), Some("urn:x"));
    }

    #[test]
    fn test_xmlns_not_exposed_as_attribute() {
        let doc = parse(r#"<a xmlns:md="urn:x" id="1"/>"#);
        let root = doc.root().unwrap();
        assert_eq!(root.attrs.len(), 1);
        assert_eq!(root.attr("id"), Some("1"));
    }

    #[test]
    fn test_unbound_prefix_is_parse_error() {
        let err = Document::parse("<md:root/>", Path::new("t.xml")).unwrap_err();
        assert!(err.to_string().contains("unbound namespace prefix"));
    }

    #[test]
    fn test_unclosed_element_is_parse_error() {
        assert!(Document::parse("<root><child>", Path::new("t.xml")).is_err());
    }

    #[test]
    fn test_no_root_is_parse_error() {
        let err = Document::parse("<!-- only a comment -->", Path::new("t.xml")).unwrap_err();
        assert!(err.to_string().contains("no root element"));
    }

    #[test]
    fn test_text_outside_root_is_parse_error() {
        let err = Document::parse("just some text", Path::new("t.xml")).unwrap_err();
        assert!(err.to_string().contains("text outside the root element"));

        let err = Document::parse("<a/>trailing", Path::new("t.xml")).unwrap_err();
        assert!(err.to_string().contains("text outside the root element"));
    }

    #[test]
    fn test_multiple_roots_is_parse_error() {
        let err = Document::parse("<a/><b/>", Path::new("t.xml")).unwrap_err();
        assert!(err.to_string().contains("multiple root elements"));

        let err = Document::parse("<a></a><b></b>", Path::new("t.xml")).unwrap_err();
        assert!(err.to_string().contains("multiple root elements"));
    }

    #[test]
    fn test_text_content() {
        let doc = parse("<a>hello <b>nested</b></a>");
        let root = doc.root().unwrap();
        assert_eq!(doc.text_of(root), Some("hello".to_string()));
    }

    #[test]
    fn test_line_numbers() {
        let doc = parse("<a>\n  <b/>\n</a>");
        let root = doc.root().unwrap();
        let b = doc.children(root).next().unwrap();
        assert_eq!(root.line, 1);
        assert_eq!(b.line, 2);
    }
}
