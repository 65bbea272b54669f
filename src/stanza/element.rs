//! Minimal XML element tree backed by `quick-xml`
//!
//! Stanzas are small and fully buffered, so a DOM is simpler to work with
//! than streaming events. Namespaces are resolved while parsing: every
//! element knows its effective namespace, and children built without one
//! inherit their parent's when attached.

use std::fmt;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::{Error, Result};

/// Child of an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Nested element
    Element(Element),
    /// Character data
    Text(String),
}

/// An XML element with attributes and children
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    name: String,
    ns: Option<String>,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    /// Create an element that inherits its parent's namespace
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create an element in the given namespace
    #[must_use]
    pub fn with_ns(name: impl Into<String>, ns: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ns: Some(ns.into()),
            ..Self::default()
        }
    }

    /// Element name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Effective namespace
    #[must_use]
    pub fn ns(&self) -> Option<&str> {
        self.ns.as_deref()
    }

    /// Whether this element has the given name and namespace
    #[must_use]
    pub fn is(&self, name: &str, ns: &str) -> bool {
        self.name == name && self.ns.as_deref() == Some(ns)
    }

    /// Attribute value
    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing any previous value
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.attrs.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.attrs.push((key, value));
        }
    }

    /// Builder form of [`Element::set_attr`]
    #[must_use]
    pub fn attr_set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Append a child element
    pub fn push_child(&mut self, mut child: Self) {
        child.inherit_ns(self.ns.as_deref());
        self.children.push(Node::Element(child));
    }

    /// Builder form of [`Element::push_child`]
    #[must_use]
    pub fn child_add(mut self, child: Self) -> Self {
        self.push_child(child);
        self
    }

    /// Append character data
    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(Node::Text(text.into()));
    }

    /// Builder form of [`Element::push_text`]
    #[must_use]
    pub fn text_add(mut self, text: impl Into<String>) -> Self {
        self.push_text(text);
        self
    }

    /// Child nodes in document order
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.children
    }

    /// Child elements in document order
    pub fn children(&self) -> impl Iterator<Item = &Self> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// First child with the given name and namespace
    #[must_use]
    pub fn child(&self, name: &str, ns: &str) -> Option<&Self> {
        self.children().find(|c| c.is(name, ns))
    }

    /// All children with the given name and namespace
    pub fn children_named<'a>(
        &'a self,
        name: &'a str,
        ns: &'a str,
    ) -> impl Iterator<Item = &'a Self> + 'a {
        self.children().filter(move |c| c.is(name, ns))
    }

    /// Concatenated direct text content
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    fn inherit_ns(&mut self, parent: Option<&str>) {
        if self.ns.is_some() {
            return;
        }
        let Some(parent) = parent else {
            return;
        };
        self.ns = Some(parent.to_string());
        for node in &mut self.children {
            if let Node::Element(child) = node {
                child.inherit_ns(Some(parent));
            }
        }
    }

    /// Serialize to an XML string
    ///
    /// # Errors
    ///
    /// Returns error if the writer fails
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        self.write(&mut writer, None)?;
        String::from_utf8(writer.into_inner()).map_err(|e| Error::Xml(e.to_string()))
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>, parent_ns: Option<&str>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        if let Some(ns) = self.ns.as_deref() {
            if parent_ns != Some(ns) {
                start.push_attribute(("xmlns", ns));
            }
        }
        for (key, value) in &self.attrs {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() {
            return writer
                .write_event(Event::Empty(start))
                .map_err(|e| Error::Xml(e.to_string()));
        }

        writer
            .write_event(Event::Start(start))
            .map_err(|e| Error::Xml(e.to_string()))?;
        for node in &self.children {
            match node {
                Node::Element(child) => child.write(writer, self.ns.as_deref())?,
                Node::Text(text) => writer
                    .write_event(Event::Text(BytesText::new(text)))
                    .map_err(|e| Error::Xml(e.to_string()))?,
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(|e| Error::Xml(e.to_string()))
    }

    /// Parse a single element from XML text
    ///
    /// Whitespace-only text between elements is dropped.
    ///
    /// # Errors
    ///
    /// Returns error if the input is not well-formed or ends early
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Self> = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    let parent_ns = stack.last().and_then(|p| p.ns.clone());
                    stack.push(Self::from_start(&start, parent_ns)?);
                }
                Event::Empty(start) => {
                    let parent_ns = stack.last().and_then(|p| p.ns.clone());
                    let el = Self::from_start(&start, parent_ns)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Element(el)),
                        None => return Ok(el),
                    }
                }
                Event::End(_) => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| Error::Xml("unbalanced end tag".to_string()))?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Element(el)),
                        None => return Ok(el),
                    }
                }
                Event::Text(text) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = text.unescape()?;
                        if !text.trim().is_empty() {
                            parent.children.push(Node::Text(text.into_owned()));
                        }
                    }
                }
                Event::CData(data) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(Node::Text(String::from_utf8_lossy(&data).into_owned()));
                    }
                }
                Event::Eof => return Err(Error::Xml("unexpected end of document".to_string())),
                _ => {}
            }
        }
    }

    fn from_start(start: &BytesStart<'_>, parent_ns: Option<String>) -> Result<Self> {
        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(|e| Error::Xml(e.to_string()))?
            .to_string();

        let mut ns = parent_ns;
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| Error::Xml(e.to_string()))?
                .to_string();
            let value = attr.unescape_value()?.into_owned();
            if key == "xmlns" {
                ns = Some(value);
            } else {
                attrs.push((key, value));
            }
        }

        Ok(Self {
            name,
            ns,
            attrs,
            children: Vec::new(),
        })
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_xml() {
            Ok(xml) => f.write_str(&xml),
            Err(_) => Err(fmt::Error),
        }
    }
}
