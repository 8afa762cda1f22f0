//! The shared string table (`xl/sharedStrings.xml`).
//!
//! Entries are append-only: an index, once handed out, names the same slot for the lifetime of the
//! document. [`SharedStrings::clear`] blanks a slot's text but never removes or renumbers it.
//!
//! Lookup by text is a linear scan. Callers interning many distinct strings pay O(n) per call.

use crate::xml::{XmlDocument, XmlElement, XmlNode};
use crate::XlsxError;

pub const SPREADSHEETML_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

#[derive(Clone, Debug)]
pub struct SharedStrings {
    part_name: String,
    doc: XmlDocument,
    /// Plain text of every `<si>`, in order.
    cache: Vec<String>,
    dirty: bool,
}

/// Plain text of one `<si>`: its `<t>`, or the concatenated `<r><t>` runs of rich text.
/// Phonetic runs (`<rPh>`) are not part of the cell text.
fn si_text(si: &XmlElement) -> String {
    if let Some(t) = si.child("t") {
        return t.text();
    }
    si.children_named("r")
        .filter_map(|run| run.child("t"))
        .map(XmlElement::text)
        .collect()
}

fn needs_space_preserve(s: &str) -> bool {
    s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace)
}

fn text_element(parent: &XmlElement, text: &str) -> XmlElement {
    let mut t = parent.make_child("t");
    if needs_space_preserve(text) {
        t.set_attr("xml:space", "preserve");
    }
    t.set_text(text);
    t
}

impl SharedStrings {
    /// An empty table for a document that has none yet.
    pub fn new(part_name: impl Into<String>) -> Self {
        let root = XmlElement::new("sst").with_attr("xmlns", SPREADSHEETML_NS);
        Self {
            part_name: part_name.into(),
            doc: XmlDocument::new(root),
            cache: Vec::new(),
            dirty: false,
        }
    }

    pub fn from_document(part_name: impl Into<String>, doc: XmlDocument) -> Self {
        let cache = doc.root.children_named("si").map(si_text).collect();
        Self {
            part_name: part_name.into(),
            doc,
            cache,
            dirty: false,
        }
    }

    pub fn parse(part_name: impl Into<String>, bytes: &[u8]) -> Result<Self, XlsxError> {
        Ok(Self::from_document(part_name, XmlDocument::parse(bytes)?))
    }

    pub fn part_name(&self) -> &str {
        &self.part_name
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.cache.iter().map(String::as_str)
    }

    /// Index of the first entry equal to `text`.
    pub fn index(&self, text: &str) -> Option<u32> {
        self.cache
            .iter()
            .position(|s| s == text)
            .map(|idx| idx as u32)
    }

    pub fn get(&self, index: u32) -> Option<&str> {
        self.cache.get(index as usize).map(String::as_str)
    }

    /// Add a new entry and return its index. Does not deduplicate; see [`SharedStrings::index`].
    pub fn append(&mut self, text: &str) -> u32 {
        let si = self.doc.root.make_child("si");
        let t = text_element(&si, text);
        self.doc.root.push_child(si.with_child(t));
        self.cache.push(text.to_string());
        self.dirty = true;
        (self.cache.len() - 1) as u32
    }

    /// Index of `text`, appending it if absent.
    pub fn intern(&mut self, text: &str) -> u32 {
        match self.index(text) {
            Some(idx) => idx,
            None => self.append(text),
        }
    }

    /// Blank the text at `index`, keeping the slot. Returns false for an unknown index.
    pub fn clear(&mut self, index: u32) -> bool {
        let Some(cached) = self.cache.get_mut(index as usize) else {
            return false;
        };
        cached.clear();
        if let Some(si) = self
            .doc
            .root
            .elements_mut()
            .filter(|el| el.is("si"))
            .nth(index as usize)
        {
            let t = si.make_child("t");
            si.children = vec![XmlNode::Element(t)];
        }
        self.dirty = true;
        true
    }

    /// The table as a tree, with `uniqueCount`/`count` brought up to date.
    pub fn to_document(&self) -> XmlDocument {
        let mut doc = self.doc.clone();
        let unique = self.cache.len();
        if doc.root.attr("uniqueCount").is_some() || unique > 0 {
            doc.root.set_attr("uniqueCount", unique.to_string());
        }
        if let Some(count) = doc.root.attr("count") {
            let count = count.parse::<usize>().unwrap_or(0).max(unique);
            doc.root.set_attr("count", count.to_string());
        }
        doc
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, XlsxError> {
        self.to_document().to_bytes()
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }
}
