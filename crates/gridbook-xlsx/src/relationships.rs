//! Relationship parts (`*.rels`): typed links from one part to another.

use roxmltree::Document;

use crate::package::Package;
use crate::path::{rels_for_part, relative_target, resolve_target};
use crate::xml::{XmlDocument, XmlElement};
use crate::XlsxError;

pub const PACKAGE_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

const OFFICE_REL_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/";
const STRICT_REL_BASE: &str = "http://purl.oclc.org/ooxml/officeDocument/relationships/";
const CORE_PROPERTIES_REL: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RelationshipType {
    OfficeDocument,
    Worksheet,
    Chartsheet,
    SharedStrings,
    Styles,
    Theme,
    CalcChain,
    CoreProperties,
    ExtendedProperties,
    Hyperlink,
    ExternalLink,
    Other(String),
}

impl RelationshipType {
    pub fn uri(&self) -> String {
        let suffix = match self {
            RelationshipType::OfficeDocument => "officeDocument",
            RelationshipType::Worksheet => "worksheet",
            RelationshipType::Chartsheet => "chartsheet",
            RelationshipType::SharedStrings => "sharedStrings",
            RelationshipType::Styles => "styles",
            RelationshipType::Theme => "theme",
            RelationshipType::CalcChain => "calcChain",
            RelationshipType::ExtendedProperties => "extended-properties",
            RelationshipType::Hyperlink => "hyperlink",
            RelationshipType::ExternalLink => "externalLink",
            RelationshipType::CoreProperties => return CORE_PROPERTIES_REL.to_string(),
            RelationshipType::Other(uri) => return uri.clone(),
        };
        format!("{OFFICE_REL_BASE}{suffix}")
    }

    /// Accepts both transitional and strict relationship namespaces.
    pub fn from_uri(uri: &str) -> Self {
        if uri == CORE_PROPERTIES_REL {
            return RelationshipType::CoreProperties;
        }
        let suffix = uri
            .strip_prefix(OFFICE_REL_BASE)
            .or_else(|| uri.strip_prefix(STRICT_REL_BASE));
        match suffix {
            Some("officeDocument") => RelationshipType::OfficeDocument,
            Some("worksheet") => RelationshipType::Worksheet,
            Some("chartsheet") => RelationshipType::Chartsheet,
            Some("sharedStrings") => RelationshipType::SharedStrings,
            Some("styles") => RelationshipType::Styles,
            Some("theme") => RelationshipType::Theme,
            Some("calcChain") => RelationshipType::CalcChain,
            Some("extended-properties") => RelationshipType::ExtendedProperties,
            Some("hyperlink") => RelationshipType::Hyperlink,
            Some("externalLink") => RelationshipType::ExternalLink,
            _ => RelationshipType::Other(uri.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub kind: RelationshipType,
    /// `Target` as written in the rels part.
    pub target: String,
    /// `TargetMode="External"`: the target is a URI outside the package.
    pub external: bool,
}

impl Relationship {
    fn from_element(el: &XmlElement) -> Option<Self> {
        Some(Self {
            id: el.attr("Id")?.to_string(),
            kind: RelationshipType::from_uri(el.attr("Type").unwrap_or_default()),
            target: el.attr("Target").unwrap_or_default().to_string(),
            external: el
                .attr("TargetMode")
                .is_some_and(|mode| mode.eq_ignore_ascii_case("External")),
        })
    }

    /// The part this relationship points at, or `None` for external targets.
    pub fn resolved_target(&self, owner_part: &str) -> Option<String> {
        (!self.external).then(|| resolve_target(owner_part, &self.target))
    }
}

/// Read-only scan of a rels part, used before any part tree is materialized.
pub fn parse_relationships(xml: &[u8], part_name: &str) -> Result<Vec<Relationship>, XlsxError> {
    let xml = std::str::from_utf8(xml)?;
    let doc = Document::parse(xml).map_err(|e| XlsxError::Invalid(format!("{part_name}: {e}")))?;

    let mut rels = Vec::new();
    for node in doc.descendants().filter(|n| n.is_element()) {
        if node.tag_name().name() != "Relationship" {
            continue;
        }
        let Some(id) = node.attribute("Id") else {
            log::warn!("{part_name}: relationship without Id skipped");
            continue;
        };
        rels.push(Relationship {
            id: id.to_string(),
            kind: RelationshipType::from_uri(node.attribute("Type").unwrap_or_default()),
            target: node.attribute("Target").unwrap_or_default().to_string(),
            external: node
                .attribute("TargetMode")
                .is_some_and(|mode| mode.eq_ignore_ascii_case("External")),
        });
    }
    Ok(rels)
}

/// `rId` + one more than the largest numeric suffix in use.
pub fn next_relationship_id<'a>(ids: impl IntoIterator<Item = &'a str>) -> String {
    let max = ids
        .into_iter()
        .filter_map(|id| id.strip_prefix("rId"))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("rId{}", max + 1)
}

fn empty_rels_document() -> XmlDocument {
    XmlDocument::new(XmlElement::new("Relationships").with_attr("xmlns", PACKAGE_REL_NS))
}

/// Relationships owned by one part.
pub struct Relationships<'a> {
    owner: String,
    doc: Option<&'a XmlDocument>,
}

/// Editable relationships owned by one part.
pub struct RelationshipsMut<'a> {
    owner: String,
    doc: &'a mut XmlDocument,
}

impl Package {
    /// Relationships of `owner_part` (`""` for the package root).
    pub fn relationships(&self, owner_part: &str) -> Result<Relationships<'_>, XlsxError> {
        let rels_part = rels_for_part(owner_part);
        let doc = if self.has_part(&rels_part) {
            Some(self.part(&rels_part)?)
        } else {
            None
        };
        Ok(Relationships {
            owner: owner_part.to_string(),
            doc,
        })
    }

    /// Editable relationships of `owner_part`, creating the rels part if needed.
    pub fn relationships_mut(&mut self, owner_part: &str) -> Result<RelationshipsMut<'_>, XlsxError> {
        let rels_part = rels_for_part(owner_part);
        if !self.has_part(&rels_part) {
            self.set_part_tree(&rels_part, empty_rels_document());
        }
        Ok(RelationshipsMut {
            owner: owner_part.to_string(),
            doc: self.part_mut(&rels_part)?,
        })
    }
}

fn elements(doc: &XmlDocument) -> impl Iterator<Item = &XmlElement> {
    doc.root.children_named("Relationship")
}

impl Relationships<'_> {
    pub fn iter(&self) -> impl Iterator<Item = Relationship> + '_ {
        self.doc
            .into_iter()
            .flat_map(elements)
            .filter_map(Relationship::from_element)
    }

    pub fn by_id(&self, id: &str) -> Option<Relationship> {
        self.iter().find(|rel| rel.id == id)
    }

    /// The relationship whose target resolves to `part`.
    pub fn by_target(&self, part: &str) -> Option<Relationship> {
        self.iter()
            .find(|rel| rel.resolved_target(&self.owner).as_deref() == Some(part))
    }

    pub fn first_of_type(&self, kind: &RelationshipType) -> Option<Relationship> {
        self.iter().find(|rel| &rel.kind == kind)
    }
}

impl RelationshipsMut<'_> {
    pub fn iter(&self) -> impl Iterator<Item = Relationship> + '_ {
        elements(self.doc).filter_map(Relationship::from_element)
    }

    pub fn by_id(&self, id: &str) -> Option<Relationship> {
        self.iter().find(|rel| rel.id == id)
    }

    pub fn by_target(&self, part: &str) -> Option<Relationship> {
        self.iter()
            .find(|rel| rel.resolved_target(&self.owner).as_deref() == Some(part))
    }

    pub fn next_id(&self) -> String {
        next_relationship_id(elements(self.doc).filter_map(|el| el.attr("Id")))
    }

    /// Link to another part of the package; returns the new id.
    pub fn add(&mut self, kind: RelationshipType, target_part: &str) -> String {
        let target = relative_target(&self.owner, target_part);
        self.insert(kind, target, false)
    }

    /// Link to a URI outside the package.
    pub fn add_external(&mut self, kind: RelationshipType, uri: &str) -> String {
        self.insert(kind, uri.to_string(), true)
    }

    fn insert(&mut self, kind: RelationshipType, target: String, external: bool) -> String {
        let id = self.next_id();
        let mut el = self
            .doc
            .root
            .make_child("Relationship")
            .with_attr("Id", id.as_str())
            .with_attr("Type", kind.uri())
            .with_attr("Target", target);
        if external {
            el.set_attr("TargetMode", "External");
        }
        log::debug!("{}: added relationship {id} -> {:?}", self.owner, el.attr("Target"));
        self.doc.root.push_child(el);
        id
    }

    /// Point an existing relationship at a different part.
    pub fn retarget(&mut self, id: &str, target_part: &str) -> bool {
        let target = relative_target(&self.owner, target_part);
        match self
            .doc
            .root
            .elements_mut()
            .find(|el| el.is("Relationship") && el.attr("Id") == Some(id))
        {
            Some(el) => {
                el.set_attr("Target", target);
                true
            }
            None => false,
        }
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.doc.root.children.len();
        self.doc
            .root
            .retain_elements(|el| !(el.is("Relationship") && el.attr("Id") == Some(id)));
        before != self.doc.root.children.len()
    }
}
