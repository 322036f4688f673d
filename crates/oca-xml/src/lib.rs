//! Parse XML-RPC resource documents into navigable node trees using quick-xml.
//!
//! The API returns resource and pool descriptions as XML documents. [`parse`]
//! turns one into a [`Node`] tree with typed accessors that fail with a
//! lookup error instead of returning a default. Edited subtrees (template
//! patches) serialize back to XML via [`Node::to_xml`] with CDATA-wrapped
//! leaf text, the form the update calls expect.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("xml: {0}")]
    Xml(String),
    #[error("missing element: {0}")]
    Missing(String),
    #[error("missing attribute: {0}")]
    MissingAttr(String),
    #[error("element {0} holds a sequence")]
    Plural(String),
    #[error("element {0} is not a scalar")]
    NotScalar(String),
    #[error("invalid integer in {0}: {1}")]
    Int(String, String),
}

/// A child slot of a [`Node`]. Repeated sibling tags collapse into [`Child::Many`]
/// preserving document order; a tag that occurs once is [`Child::One`].
#[derive(Debug, Clone, PartialEq)]
pub enum Child {
    One(Node),
    Many(Vec<Node>),
}

/// One element of a parsed XML-RPC resource document.
///
/// Leaf elements carry their (CDATA-unwrapped) text in `text`; interior
/// elements carry named children. Element attributes live in a separate
/// `custom_attrs` map and are never merged into child lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    tag: String,
    text: Option<String>,
    children: HashMap<String, Child>,
    custom_attrs: HashMap<String, String>,
}

/// Parse a raw XML document into a [`Node`] tree.
///
/// A declared namespace (`xmlns="..."`) is stripped: the same document parses
/// to the same tree whether or not it declares one. CDATA sections are
/// unwrapped to plain text; invalid UTF-8 anywhere is a parse error.
pub fn parse(bytes: &[u8]) -> Result<Node, XmlError> {
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let node = open_node(&e)?;
                stack.push(node);
            }
            Ok(Event::Empty(e)) => {
                let node = open_node(&e)?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|err| XmlError::Xml(err.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    top.text.get_or_insert_with(String::new).push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                let raw = e.into_inner();
                let text = std::str::from_utf8(&raw)
                    .map_err(|err| XmlError::Xml(format!("invalid UTF-8 in CDATA: {err}")))?;
                if let Some(top) = stack.last_mut() {
                    top.text.get_or_insert_with(String::new).push_str(text);
                }
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| XmlError::Xml("unbalanced end tag".into()))?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(XmlError::Xml(err.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(XmlError::Xml("document ended inside an element".into()));
    }
    let root = root.ok_or_else(|| XmlError::Xml("empty document".into()))?;
    trace!(tag = %root.tag, children = root.children.len(), "parsed document root");
    Ok(root)
}

fn open_node(event: &quick_xml::events::BytesStart<'_>) -> Result<Node, XmlError> {
    let name = event.name();
    let tag = std::str::from_utf8(name.local_name().as_ref())
        .map_err(|err| XmlError::Xml(format!("invalid UTF-8 in tag name: {err}")))?
        .to_string();
    let mut custom_attrs = HashMap::new();
    for attr in event.attributes() {
        let attr = attr.map_err(|err| XmlError::Xml(err.to_string()))?;
        let key = attr.key.as_ref();
        // Namespace declarations are not data.
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let key = std::str::from_utf8(attr.key.local_name().as_ref())
            .map_err(|err| XmlError::Xml(format!("invalid UTF-8 in attribute name: {err}")))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| XmlError::Xml(err.to_string()))?
            .into_owned();
        custom_attrs.insert(key, value);
    }
    Ok(Node {
        tag,
        text: None,
        children: HashMap::new(),
        custom_attrs,
    })
}

fn attach(stack: &mut Vec<Node>, root: &mut Option<Node>, node: Node) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.push_child(node);
        Ok(())
    } else if root.is_some() {
        Err(XmlError::Xml("multiple root elements".into()))
    } else {
        *root = Some(node);
        Ok(())
    }
}

impl Node {
    /// Create an empty element with the given tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Node {
            tag: tag.into(),
            text: None,
            children: HashMap::new(),
            custom_attrs: HashMap::new(),
        }
    }

    /// Build a `TEMPLATE` patch from key/value pairs.
    pub fn template<K: AsRef<str>, V: AsRef<str>>(pairs: &[(K, V)]) -> Self {
        let mut node = Node::new("TEMPLATE");
        for (key, value) in pairs {
            node.set(key.as_ref(), value.as_ref());
        }
        node
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Leaf text of this element, empty when absent.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Whether the element has neither children nor text.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.text.is_none()
    }

    /// `in`-style existence check for a child tag. Returns false on empty
    /// elements instead of raising.
    pub fn contains(&self, name: &str) -> bool {
        self.children.contains_key(name)
    }

    /// Child tag names, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    /// Fetch a singly-occurring child element.
    pub fn child(&self, name: &str) -> Result<&Node, XmlError> {
        match self.children.get(name) {
            Some(Child::One(node)) => Ok(node),
            Some(Child::Many(_)) => Err(XmlError::Plural(name.to_string())),
            None => Err(XmlError::Missing(name.to_string())),
        }
    }

    /// Mutable access to a singly-occurring child element.
    pub fn child_mut(&mut self, name: &str) -> Result<&mut Node, XmlError> {
        match self.children.get_mut(name) {
            Some(Child::One(node)) => Ok(node),
            Some(Child::Many(_)) => Err(XmlError::Plural(name.to_string())),
            None => Err(XmlError::Missing(name.to_string())),
        }
    }

    /// Fetch a child as a sequence. A single occurrence is exposed as a
    /// one-element slice, so pool members parse uniformly whatever their count.
    pub fn list(&self, name: &str) -> Result<&[Node], XmlError> {
        match self.children.get(name) {
            Some(Child::One(node)) => Ok(std::slice::from_ref(node)),
            Some(Child::Many(nodes)) => Ok(nodes.as_slice()),
            None => Err(XmlError::Missing(name.to_string())),
        }
    }

    /// Fetch the text of a leaf child.
    pub fn scalar(&self, name: &str) -> Result<&str, XmlError> {
        let node = self.child(name)?;
        if !node.children.is_empty() {
            return Err(XmlError::NotScalar(name.to_string()));
        }
        Ok(node.text())
    }

    /// Fetch the text of a leaf child parsed as an integer.
    pub fn scalar_i64(&self, name: &str) -> Result<i64, XmlError> {
        let raw = self.scalar(name)?;
        raw.trim()
            .parse()
            .map_err(|err: std::num::ParseIntError| XmlError::Int(name.to_string(), err.to_string()))
    }

    /// Fetch an element attribute. Attributes never shadow child elements.
    pub fn attr(&self, name: &str) -> Result<&str, XmlError> {
        self.custom_attrs
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| XmlError::MissingAttr(name.to_string()))
    }

    /// The element's attribute map.
    pub fn custom_attrs(&self) -> &HashMap<String, String> {
        &self.custom_attrs
    }

    /// Insert or replace a scalar child.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let mut leaf = Node::new(name);
        leaf.text = Some(value.into());
        self.children.insert(name.to_string(), Child::One(leaf));
    }

    /// Serialize the subtree back to XML with CDATA-wrapped leaf text.
    ///
    /// Sibling ordering across different tags is not preserved; order within
    /// a repeated tag is. Reparsing the output yields an equal tree.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_into(&mut out);
        out
    }

    fn push_child(&mut self, child: Node) {
        match self.children.entry(child.tag.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(Child::One(child));
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                Child::Many(nodes) => nodes.push(child),
                Child::One(_) => {
                    let prev = std::mem::replace(slot.get_mut(), Child::Many(Vec::new()));
                    if let (Child::Many(nodes), Child::One(first)) = (slot.get_mut(), prev) {
                        nodes.push(first);
                        nodes.push(child);
                    }
                }
            },
        }
    }

    fn write_into(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.custom_attrs {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape(value));
            out.push('"');
        }
        if self.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        if self.children.is_empty() {
            if let Some(text) = &self.text {
                write_cdata(text, out);
            }
        } else {
            for child in self.children.values() {
                match child {
                    Child::One(node) => node.write_into(out),
                    Child::Many(nodes) => {
                        for node in nodes {
                            node.write_into(out);
                        }
                    }
                }
            }
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }
}

fn write_cdata(text: &str, out: &mut String) {
    out.push_str("<![CDATA[");
    // A literal "]]>" in the payload must split the section.
    out.push_str(&text.replace("]]>", "]]]]><![CDATA[>"));
    out.push_str("]]>");
}
