//! Mutable markup tree for package parts.
//!
//! Parts are parsed once into an owned tree of [`XmlElement`]s, edited in place, and written back
//! with quick-xml. Element and attribute names are kept as written (including prefixes), and all
//! text is kept verbatim so whitespace-only strings survive a round trip.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::XlsxError;

pub(crate) const XML_DECLARATION: &str =
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Strip a namespace prefix from a qualified name (`x:row` -> `row`).
pub fn local_name(name: &str) -> &str {
    match name.rfind(':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

fn prefix_of(name: &str) -> Option<&str> {
    name.rfind(':').map(|idx| &name[..idx])
}

#[derive(Clone, Debug, PartialEq)]
pub struct XmlDocument {
    pub root: XmlElement,
}

#[derive(Clone, Debug, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn as_element(&self) -> Option<&XmlElement> {
        match self {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut XmlElement> {
        match self {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        }
    }
}

impl XmlDocument {
    pub fn new(root: XmlElement) -> Self {
        Self { root }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, XlsxError> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(false);

        let mut buf = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => stack.push(element_from_start(&e)?),
                Event::Empty(e) => {
                    let el = element_from_start(&e)?;
                    attach(&mut stack, &mut root, el)?;
                }
                Event::End(_) => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| XlsxError::Invalid("unbalanced end tag".to_string()))?;
                    attach(&mut stack, &mut root, el)?;
                }
                Event::Text(t) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = t.unescape()?;
                        push_text(parent, &text);
                    }
                }
                Event::CData(c) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = std::str::from_utf8(&c)?;
                        push_text(parent, text);
                    }
                }
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(XlsxError::Invalid("unexpected end of document".to_string()));
        }
        let root = root.ok_or_else(|| XlsxError::Invalid("document has no root element".to_string()))?;
        Ok(Self { root })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, XlsxError> {
        let mut out = Vec::with_capacity(4096);
        out.extend_from_slice(XML_DECLARATION.as_bytes());
        out.extend_from_slice(b"\r\n");
        let mut writer = Writer::new(out);
        write_element(&mut writer, &self.root)?;
        Ok(writer.into_inner())
    }
}

fn element_from_start(e: &BytesStart<'_>) -> Result<XmlElement, XlsxError> {
    let name = std::str::from_utf8(e.name().as_ref())?.to_string();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let value = attr.unescape_value()?.into_owned();
        attrs.push((key, value));
    }
    Ok(XmlElement {
        name,
        attrs,
        children: Vec::new(),
    })
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    el: XmlElement,
) -> Result<(), XlsxError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(el)),
        None if root.is_none() => *root = Some(el),
        None => return Err(XlsxError::Invalid("multiple root elements".to_string())),
    }
    Ok(())
}

fn push_text(parent: &mut XmlElement, text: &str) {
    // Adjacent text and CDATA events merge into one node.
    if let Some(XmlNode::Text(prev)) = parent.children.last_mut() {
        prev.push_str(text);
    } else {
        parent.children.push(XmlNode::Text(text.to_string()));
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, el: &XmlElement) -> Result<(), XlsxError> {
    let mut start = BytesStart::new(el.name.as_str());
    for (key, value) in &el.attrs {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if el.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &el.children {
        match child {
            XmlNode::Element(child) => write_element(writer, child)?,
            XmlNode::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(el.name.as_str())))?;
    Ok(())
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.set_text(text);
        self
    }

    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    pub fn is(&self, local: &str) -> bool {
        self.local_name() == local
    }

    /// A new element named `local` in the same namespace prefix as `self`.
    pub fn make_child(&self, local: &str) -> XmlElement {
        match prefix_of(&self.name) {
            Some(prefix) => XmlElement::new(format!("{prefix}:{local}")),
            None => XmlElement::new(local),
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute lookup by local name among prefixed attributes (`r:id`, `rel:id`, ...).
    pub fn prefixed_attr(&self, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.contains(':') && !k.starts_with("xmlns") && local_name(k) == local)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.attrs.push((key, value)),
        }
    }

    pub fn remove_attr(&mut self, key: &str) -> Option<String> {
        let idx = self.attrs.iter().position(|(k, _)| k == key)?;
        Some(self.attrs.remove(idx).1)
    }

    pub fn elements(&self) -> impl DoubleEndedIterator<Item = &XmlElement> {
        self.children.iter().filter_map(XmlNode::as_element)
    }

    pub fn elements_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(XmlNode::as_element_mut)
    }

    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |el| el.is(local))
    }

    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.is(local))
    }

    pub fn child_mut(&mut self, local: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|el| el.is(local))
    }

    /// Index into `children` of the first element named `local`.
    pub fn position(&self, local: &str) -> Option<usize> {
        self.children
            .iter()
            .position(|node| node.as_element().is_some_and(|el| el.is(local)))
    }

    pub fn element_at_mut(&mut self, idx: usize) -> Option<&mut XmlElement> {
        self.children.get_mut(idx).and_then(XmlNode::as_element_mut)
    }

    pub fn push_child(&mut self, child: XmlElement) -> &mut XmlElement {
        let idx = self.children.len();
        self.insert_child(idx, child)
    }

    pub fn insert_child(&mut self, idx: usize, child: XmlElement) -> &mut XmlElement {
        self.children.insert(idx, XmlNode::Element(child));
        match &mut self.children[idx] {
            XmlNode::Element(el) => el,
            XmlNode::Text(_) => unreachable!("just inserted an element"),
        }
    }

    /// The first child named `local`, appending one if missing.
    pub fn child_or_insert(&mut self, local: &str) -> &mut XmlElement {
        match self.position(local) {
            Some(idx) => match &mut self.children[idx] {
                XmlNode::Element(el) => el,
                XmlNode::Text(_) => unreachable!("position only matches elements"),
            },
            None => {
                let child = self.make_child(local);
                self.push_child(child)
            }
        }
    }

    /// Remove every child element named `local`; returns how many were removed.
    pub fn remove_children(&mut self, local: &str) -> usize {
        let before = self.children.len();
        self.children
            .retain(|node| !node.as_element().is_some_and(|el| el.is(local)));
        before - self.children.len()
    }

    pub fn retain_elements(&mut self, mut keep: impl FnMut(&XmlElement) -> bool) {
        self.children.retain(|node| match node {
            XmlNode::Element(el) => keep(el),
            XmlNode::Text(_) => true,
        });
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            if let XmlNode::Text(t) = child {
                out.push_str(t);
            }
        }
        out
    }

    /// Replace all children with a single text node (none for an empty string).
    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.children.clear();
        if !text.is_empty() {
            self.children.push(XmlNode::Text(text));
        }
    }

    /// The prefix bound to namespace `ns` on this element, declaring `preferred` if none is.
    pub fn namespace_prefix(&mut self, ns: &str, preferred: &str) -> String {
        let bound = self.attrs.iter().find_map(|(key, value)| {
            (value == ns)
                .then(|| key.strip_prefix("xmlns:"))
                .flatten()
                .map(str::to_string)
        });
        match bound {
            Some(prefix) => prefix,
            None => {
                self.set_attr(format!("xmlns:{preferred}"), ns);
                preferred.to_string()
            }
        }
    }

    /// Depth-first visit of every element below (and including) `self`.
    pub fn visit(&self, f: &mut impl FnMut(&XmlElement)) {
        f(self);
        for child in self.elements() {
            child.visit(f);
        }
    }

    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut XmlElement)) {
        f(self);
        for child in self.elements_mut() {
            child.visit_mut(f);
        }
    }
}
