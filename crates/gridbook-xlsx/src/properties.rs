//! Document metadata in `docProps/core.xml` (Dublin Core) and `docProps/app.xml`
//! (extended properties), plus the sheet-title list kept in `app.xml`.

use chrono::DateTime;

use crate::content_types::ContentType;
use crate::package::Package;
use crate::relationships::RelationshipType;
use crate::xml::{XmlDocument, XmlElement};
use crate::XlsxError;

pub(crate) const CORE_PART: &str = "docProps/core.xml";
pub(crate) const APP_PART: &str = "docProps/app.xml";

pub(crate) const CORE_NS: &str =
    "http://schemas.openxmlformats.org/package/2006/metadata/core-properties";
pub(crate) const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
pub(crate) const DCTERMS_NS: &str = "http://purl.org/dc/terms/";
pub(crate) const DCMITYPE_NS: &str = "http://purl.org/dc/dcmitype/";
pub(crate) const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub(crate) const APP_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/extended-properties";
pub(crate) const VT_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes";

const WORKSHEETS_HEADING: &str = "Worksheets";
const CHARTS_HEADING: &str = "Charts";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Property {
    Title,
    Subject,
    Creator,
    Keywords,
    Description,
    LastModifiedBy,
    LastPrinted,
    CreationDate,
    ModificationDate,
    Category,
    Application,
    AppVersion,
    DocSecurity,
    ScaleCrop,
    Manager,
    Company,
    LinksUpToDate,
    SharedDoc,
    HyperlinkBase,
    HyperlinksChanged,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Location {
    Core { prefix: &'static str, ns: &'static str },
    App,
}

impl Property {
    pub const ALL: [Property; 20] = [
        Property::Title,
        Property::Subject,
        Property::Creator,
        Property::Keywords,
        Property::Description,
        Property::LastModifiedBy,
        Property::LastPrinted,
        Property::CreationDate,
        Property::ModificationDate,
        Property::Category,
        Property::Application,
        Property::AppVersion,
        Property::DocSecurity,
        Property::ScaleCrop,
        Property::Manager,
        Property::Company,
        Property::LinksUpToDate,
        Property::SharedDoc,
        Property::HyperlinkBase,
        Property::HyperlinksChanged,
    ];

    /// Element name without prefix.
    pub fn element_name(self) -> &'static str {
        match self {
            Property::Title => "title",
            Property::Subject => "subject",
            Property::Creator => "creator",
            Property::Keywords => "keywords",
            Property::Description => "description",
            Property::LastModifiedBy => "lastModifiedBy",
            Property::LastPrinted => "lastPrinted",
            Property::CreationDate => "created",
            Property::ModificationDate => "modified",
            Property::Category => "category",
            Property::Application => "Application",
            Property::AppVersion => "AppVersion",
            Property::DocSecurity => "DocSecurity",
            Property::ScaleCrop => "ScaleCrop",
            Property::Manager => "Manager",
            Property::Company => "Company",
            Property::LinksUpToDate => "LinksUpToDate",
            Property::SharedDoc => "SharedDoc",
            Property::HyperlinkBase => "HyperlinkBase",
            Property::HyperlinksChanged => "HyperlinksChanged",
        }
    }

    fn location(self) -> Location {
        let dc = Location::Core { prefix: "dc", ns: DC_NS };
        let cp = Location::Core { prefix: "cp", ns: CORE_NS };
        let dcterms = Location::Core {
            prefix: "dcterms",
            ns: DCTERMS_NS,
        };
        match self {
            Property::Title | Property::Subject | Property::Creator | Property::Description => dc,
            Property::Keywords
            | Property::LastModifiedBy
            | Property::LastPrinted
            | Property::Category => cp,
            Property::CreationDate | Property::ModificationDate => dcterms,
            _ => Location::App,
        }
    }

    fn is_w3cdtf(self) -> bool {
        matches!(self, Property::CreationDate | Property::ModificationDate)
    }

    fn validate(self, value: &str) -> Result<(), XlsxError> {
        let ok = match self {
            Property::AppVersion => is_app_version(value),
            Property::DocSecurity => matches!(value, "0" | "1" | "2" | "4" | "8"),
            Property::ScaleCrop
            | Property::LinksUpToDate
            | Property::SharedDoc
            | Property::HyperlinksChanged => matches!(value, "true" | "false"),
            Property::CreationDate | Property::ModificationDate | Property::LastPrinted => {
                DateTime::parse_from_rfc3339(value).is_ok()
            }
            _ => true,
        };
        if ok {
            Ok(())
        } else {
            Err(XlsxError::InvalidPropertyValue {
                property: self.element_name(),
                value: value.to_string(),
            })
        }
    }
}

/// `XX.XXXX`: one or two digits, a dot, one to five digits.
fn is_app_version(value: &str) -> bool {
    let Some((major, minor)) = value.split_once('.') else {
        return false;
    };
    let digits = |s: &str, max: usize| {
        !s.is_empty() && s.len() <= max && s.bytes().all(|b| b.is_ascii_digit())
    };
    digits(major, 2) && digits(minor, 5)
}

fn property_part(package: &Package, kind: RelationshipType, default: &str) -> String {
    package
        .relationships("")
        .ok()
        .and_then(|rels| rels.first_of_type(&kind))
        .and_then(|rel| rel.resolved_target(""))
        .unwrap_or_else(|| default.to_string())
}

fn core_part(package: &Package) -> String {
    property_part(package, RelationshipType::CoreProperties, CORE_PART)
}

fn app_part(package: &Package) -> String {
    property_part(package, RelationshipType::ExtendedProperties, APP_PART)
}

pub(crate) fn empty_core_document() -> XmlDocument {
    XmlDocument::new(
        XmlElement::new("cp:coreProperties")
            .with_attr("xmlns:cp", CORE_NS)
            .with_attr("xmlns:dc", DC_NS)
            .with_attr("xmlns:dcterms", DCTERMS_NS)
            .with_attr("xmlns:dcmitype", DCMITYPE_NS)
            .with_attr("xmlns:xsi", XSI_NS),
    )
}

pub(crate) fn empty_app_document() -> XmlDocument {
    XmlDocument::new(
        XmlElement::new("Properties")
            .with_attr("xmlns", APP_NS)
            .with_attr("xmlns:vt", VT_NS),
    )
}

/// Add a package-level part plus its root relationship and content type.
fn register_root_part(
    package: &mut Package,
    part: &str,
    doc: XmlDocument,
    kind: RelationshipType,
    content_type: ContentType,
) -> Result<(), XlsxError> {
    log::debug!("creating {part}");
    package.set_part_tree(part, doc);
    let mut rels = package.relationships_mut("")?;
    if rels.by_target(part).is_none() {
        rels.add(kind, part);
    }
    package.content_types_mut()?.add_override(part, content_type);
    Ok(())
}

fn ensure_part(package: &mut Package, location: Location) -> Result<String, XlsxError> {
    let (part, kind, content_type, make): (_, _, _, fn() -> XmlDocument) = match location {
        Location::Core { .. } => (
            core_part(package),
            RelationshipType::CoreProperties,
            ContentType::CoreProperties,
            empty_core_document,
        ),
        Location::App => (
            app_part(package),
            RelationshipType::ExtendedProperties,
            ContentType::ExtendedProperties,
            empty_app_document,
        ),
    };
    if !package.has_part(&part) {
        register_root_part(package, &part, make(), kind, content_type)?;
    }
    Ok(part)
}

fn find<'a>(doc: &'a XmlDocument, property: Property) -> Option<&'a XmlElement> {
    doc.root.elements().find(|el| el.is(property.element_name()))
}

/// Current value, or an empty string when unset.
pub(crate) fn get(package: &Package, property: Property) -> Result<String, XlsxError> {
    let part = match property.location() {
        Location::Core { .. } => core_part(package),
        Location::App => app_part(package),
    };
    if !package.has_part(&part) {
        return Ok(String::new());
    }
    let doc = package.part(&part)?;
    Ok(find(doc, property).map(XmlElement::text).unwrap_or_default())
}

pub(crate) fn set(package: &mut Package, property: Property, value: &str) -> Result<(), XlsxError> {
    property.validate(value)?;
    let location = property.location();
    let part = ensure_part(package, location)?;
    let doc = package.part_mut(&part)?;
    if let Some(el) = doc.root.elements_mut().find(|el| el.is(property.element_name())) {
        el.set_text(value);
        return Ok(());
    }

    let mut el = match location {
        Location::Core { prefix, ns } => {
            let prefix = doc.root.namespace_prefix(ns, prefix);
            let mut el = XmlElement::new(format!("{prefix}:{}", property.element_name()));
            if property.is_w3cdtf() {
                let xsi = doc.root.namespace_prefix(XSI_NS, "xsi");
                el.set_attr(format!("{xsi}:type"), format!("{prefix}:W3CDTF"));
            }
            el
        }
        Location::App => doc.root.make_child(property.element_name()),
    };
    el.set_text(value);
    doc.root.push_child(el);
    Ok(())
}

/// Remove the property's element. Returns whether one was present.
pub(crate) fn delete(package: &mut Package, property: Property) -> Result<bool, XlsxError> {
    let part = match property.location() {
        Location::Core { .. } => core_part(package),
        Location::App => app_part(package),
    };
    if !package.has_part(&part) {
        return Ok(false);
    }
    Ok(package.part_mut(&part)?.root.remove_children(property.element_name()) > 0)
}

/// `HeadingPairs` and `TitlesOfParts` of `app.xml` as parallel lists.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct TitleList {
    /// `(heading, number of titles in the group)`, in order.
    pub headings: Vec<(String, u32)>,
    pub titles: Vec<String>,
}

fn vector(parent: &XmlElement) -> Option<&XmlElement> {
    parent.child("vector")
}

impl TitleList {
    pub fn read(doc: &XmlDocument) -> Self {
        let mut list = TitleList::default();
        if let Some(pairs) = doc.root.child("HeadingPairs").and_then(vector) {
            let mut variants = pairs.children_named("variant");
            while let (Some(name), Some(count)) = (variants.next(), variants.next()) {
                let name = name.child("lpstr").map(XmlElement::text).unwrap_or_default();
                let count = count
                    .elements()
                    .next()
                    .and_then(|n| n.text().trim().parse().ok())
                    .unwrap_or(0);
                list.headings.push((name, count));
            }
        }
        if let Some(titles) = doc.root.child("TitlesOfParts").and_then(vector) {
            list.titles = titles.children_named("lpstr").map(XmlElement::text).collect();
        }
        list
    }

    fn group_start(&self, heading: &str) -> Option<(usize, usize)> {
        let mut start = 0usize;
        for (idx, (name, count)) in self.headings.iter().enumerate() {
            if name == heading {
                return Some((idx, start));
            }
            start += *count as usize;
        }
        None
    }

    /// Replace the titles of group `heading` with `names`, adding or dropping the group as needed.
    pub fn set_group(&mut self, heading: &str, names: &[String]) {
        match self.group_start(heading) {
            Some((idx, start)) => {
                let len = (self.headings[idx].1 as usize).min(self.titles.len().saturating_sub(start));
                self.titles.splice(start..start + len, names.iter().cloned());
                if names.is_empty() {
                    self.headings.remove(idx);
                } else {
                    self.headings[idx].1 = names.len() as u32;
                }
            }
            None if names.is_empty() => {}
            None => {
                // Worksheets lead; any other group goes after them.
                let (idx, start) = if heading == WORKSHEETS_HEADING {
                    (0, 0)
                } else {
                    match self.group_start(WORKSHEETS_HEADING) {
                        Some((ws, start)) => (ws + 1, start + self.headings[ws].1 as usize),
                        None => (0, 0),
                    }
                };
                let start = start.min(self.titles.len());
                self.titles.splice(start..start, names.iter().cloned());
                self.headings.insert(idx, (heading.to_string(), names.len() as u32));
            }
        }
    }

    pub fn write(&self, doc: &mut XmlDocument) {
        let vt = doc.root.namespace_prefix(VT_NS, "vt");
        let q = |local: &str| format!("{vt}:{local}");

        let mut pairs = XmlElement::new(q("vector"))
            .with_attr("size", (self.headings.len() * 2).to_string())
            .with_attr("baseType", "variant");
        for (name, count) in &self.headings {
            pairs.push_child(
                XmlElement::new(q("variant")).with_child(XmlElement::new(q("lpstr")).with_text(name.as_str())),
            );
            pairs.push_child(
                XmlElement::new(q("variant")).with_child(XmlElement::new(q("i4")).with_text(count.to_string())),
            );
        }
        let mut titles = XmlElement::new(q("vector"))
            .with_attr("size", self.titles.len().to_string())
            .with_attr("baseType", "lpstr");
        for title in &self.titles {
            titles.push_child(XmlElement::new(q("lpstr")).with_text(title.as_str()));
        }

        let root = &mut doc.root;
        let heading_pairs = root.child_or_insert("HeadingPairs");
        heading_pairs.children.clear();
        heading_pairs.push_child(pairs);
        let titles_of_parts = root.child_or_insert("TitlesOfParts");
        titles_of_parts.children.clear();
        titles_of_parts.push_child(titles);
    }
}

/// Bring the worksheet and chart title groups of `app.xml` in line with the sheet registry.
/// A package without `app.xml` is left alone.
pub(crate) fn sync_sheet_titles(
    package: &mut Package,
    worksheets: &[String],
    chartsheets: &[String],
) -> Result<(), XlsxError> {
    let part = app_part(package);
    if !package.has_part(&part) {
        return Ok(());
    }
    let current = TitleList::read(package.part(&part)?);
    let mut updated = current.clone();
    updated.set_group(WORKSHEETS_HEADING, worksheets);
    updated.set_group(CHARTS_HEADING, chartsheets);
    if updated != current {
        updated.write(package.part_mut(&part)?);
    }
    Ok(())
}

/// The app properties part name, for commands that must snapshot it.
pub(crate) fn app_part_name(package: &Package) -> String {
    app_part(package)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::CONTENT_TYPES_PART;
    use pretty_assertions::assert_eq;

    const CORE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:creator>alice</dc:creator><dcterms:created xsi:type="dcterms:W3CDTF">2024-01-02T03:04:05Z</dcterms:created></cp:coreProperties>"#;

    const APP: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes"><Application>Microsoft Excel</Application><HeadingPairs><vt:vector size="4" baseType="variant"><vt:variant><vt:lpstr>Worksheets</vt:lpstr></vt:variant><vt:variant><vt:i4>2</vt:i4></vt:variant><vt:variant><vt:lpstr>Named Ranges</vt:lpstr></vt:variant><vt:variant><vt:i4>1</vt:i4></vt:variant></vt:vector></HeadingPairs><TitlesOfParts><vt:vector size="3" baseType="lpstr"><vt:lpstr>One</vt:lpstr><vt:lpstr>Two</vt:lpstr><vt:lpstr>One!Print_Area</vt:lpstr></vt:vector></TitlesOfParts></Properties>"#;

    const TYPES: &str = r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#;

    fn package() -> Package {
        let mut pkg = Package::new();
        pkg.add_or_replace_part(CONTENT_TYPES_PART, TYPES.as_bytes().to_vec());
        pkg.add_or_replace_part(CORE_PART, CORE.as_bytes().to_vec());
        pkg.add_or_replace_part(APP_PART, APP.as_bytes().to_vec());
        pkg
    }

    #[test]
    fn get_set_and_delete() {
        let mut pkg = package();
        assert_eq!(get(&pkg, Property::Creator).unwrap(), "alice");
        assert_eq!(get(&pkg, Property::Title).unwrap(), "");
        assert_eq!(get(&pkg, Property::Application).unwrap(), "Microsoft Excel");

        set(&mut pkg, Property::Title, "Budget").unwrap();
        set(&mut pkg, Property::Company, "Acme").unwrap();
        set(&mut pkg, Property::ModificationDate, "2024-05-06T07:08:09Z").unwrap();
        assert_eq!(get(&pkg, Property::Title).unwrap(), "Budget");
        assert_eq!(get(&pkg, Property::Company).unwrap(), "Acme");

        let core = pkg.part(CORE_PART).unwrap();
        let modified = core.root.child("modified").unwrap();
        assert_eq!(modified.name, "dcterms:modified");
        assert_eq!(modified.attr("xsi:type"), Some("dcterms:W3CDTF"));
        assert_eq!(core.root.child("title").unwrap().name, "dc:title");

        assert!(delete(&mut pkg, Property::Creator).unwrap());
        assert!(!delete(&mut pkg, Property::Creator).unwrap());
        assert_eq!(get(&pkg, Property::Creator).unwrap(), "");
    }

    #[test]
    fn values_are_validated() {
        let mut pkg = package();
        for (property, bad) in [
            (Property::AppVersion, "16"),
            (Property::AppVersion, "123.1"),
            (Property::AppVersion, "16.123456"),
            (Property::DocSecurity, "3"),
            (Property::ScaleCrop, "yes"),
            (Property::CreationDate, "yesterday"),
        ] {
            let err = set(&mut pkg, property, bad).unwrap_err();
            assert!(matches!(err, XlsxError::InvalidPropertyValue { .. }), "{property:?} {bad}");
        }
        set(&mut pkg, Property::AppVersion, "16.0300").unwrap();
        set(&mut pkg, Property::DocSecurity, "4").unwrap();
        set(&mut pkg, Property::SharedDoc, "false").unwrap();
    }

    #[test]
    fn missing_parts_are_created_on_first_write() {
        let mut pkg = Package::new();
        pkg.add_or_replace_part(CONTENT_TYPES_PART, TYPES.as_bytes().to_vec());
        assert_eq!(get(&pkg, Property::Manager).unwrap(), "");
        set(&mut pkg, Property::Manager, "Bob").unwrap();
        set(&mut pkg, Property::Keywords, "q1 report").unwrap();

        assert!(pkg.has_part(APP_PART));
        assert!(pkg.has_part(CORE_PART));
        let rels = pkg.relationships("").unwrap();
        assert!(rels.first_of_type(&RelationshipType::CoreProperties).is_some());
        assert!(rels.first_of_type(&RelationshipType::ExtendedProperties).is_some());
        let types = pkg.content_types().unwrap();
        assert_eq!(types.content_type_of(CORE_PART), Some(ContentType::CoreProperties));
        assert_eq!(get(&pkg, Property::Keywords).unwrap(), "q1 report");
    }

    #[test]
    fn title_groups_follow_the_registry() {
        let mut pkg = package();
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        sync_sheet_titles(&mut pkg, &names(&["One", "Two", "Three"]), &[]).unwrap();

        let list = TitleList::read(pkg.part(APP_PART).unwrap());
        assert_eq!(list.titles, ["One", "Two", "Three", "One!Print_Area"]);
        assert_eq!(
            list.headings,
            [("Worksheets".to_string(), 3), ("Named Ranges".to_string(), 1)]
        );

        sync_sheet_titles(&mut pkg, &names(&["Two"]), &names(&["Chart1"])).unwrap();
        let list = TitleList::read(pkg.part(APP_PART).unwrap());
        assert_eq!(list.titles, ["Two", "Chart1", "One!Print_Area"]);
        assert_eq!(list.headings[1], ("Charts".to_string(), 1));

        let xml = String::from_utf8(pkg.part(APP_PART).unwrap().to_bytes().unwrap()).unwrap();
        assert!(xml.contains(r#"<vt:vector size="3" baseType="lpstr">"#), "{xml}");
    }
}
