//! `[Content_Types].xml`: media types by extension (`Default`) and by part (`Override`).

use crate::package::{Package, CONTENT_TYPES_PART};
use crate::path::{canonical_part_name, extension};
use crate::xml::{XmlDocument, XmlElement};
use crate::XlsxError;

pub const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

const SPREADSHEETML: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ContentType {
    Workbook,
    MacroEnabledWorkbook,
    Worksheet,
    Chartsheet,
    SharedStrings,
    Styles,
    Theme,
    CalcChain,
    CoreProperties,
    ExtendedProperties,
    Relationships,
    Xml,
    Other(String),
}

impl ContentType {
    pub fn media_type(&self) -> String {
        let suffix = match self {
            ContentType::Workbook => "sheet.main+xml",
            ContentType::Worksheet => "worksheet+xml",
            ContentType::Chartsheet => "chartsheet+xml",
            ContentType::SharedStrings => "sharedStrings+xml",
            ContentType::Styles => "styles+xml",
            ContentType::CalcChain => "calcChain+xml",
            ContentType::MacroEnabledWorkbook => {
                return "application/vnd.ms-excel.sheet.macroEnabled.main+xml".to_string()
            }
            ContentType::Theme => {
                return "application/vnd.openxmlformats-officedocument.theme+xml".to_string()
            }
            ContentType::CoreProperties => {
                return "application/vnd.openxmlformats-package.core-properties+xml".to_string()
            }
            ContentType::ExtendedProperties => {
                return "application/vnd.openxmlformats-officedocument.extended-properties+xml"
                    .to_string()
            }
            ContentType::Relationships => {
                return "application/vnd.openxmlformats-package.relationships+xml".to_string()
            }
            ContentType::Xml => return "application/xml".to_string(),
            ContentType::Other(media) => return media.clone(),
        };
        format!("{SPREADSHEETML}{suffix}")
    }

    pub fn from_media_type(media: &str) -> Self {
        [
            ContentType::Workbook,
            ContentType::MacroEnabledWorkbook,
            ContentType::Worksheet,
            ContentType::Chartsheet,
            ContentType::SharedStrings,
            ContentType::Styles,
            ContentType::Theme,
            ContentType::CalcChain,
            ContentType::CoreProperties,
            ContentType::ExtendedProperties,
            ContentType::Relationships,
            ContentType::Xml,
        ]
        .into_iter()
        .find(|ct| ct.media_type() == media)
        .unwrap_or_else(|| ContentType::Other(media.to_string()))
    }
}

fn override_name(part: &str) -> String {
    format!("/{}", canonical_part_name(part))
}

fn override_matches(el: &XmlElement, part_name: &str) -> bool {
    el.is("Override")
        && el
            .attr("PartName")
            .is_some_and(|name| name.eq_ignore_ascii_case(part_name))
}

/// Read view over the content-type table.
pub struct ContentTypes<'a> {
    doc: &'a XmlDocument,
}

/// Editable view over the content-type table.
pub struct ContentTypesMut<'a> {
    doc: &'a mut XmlDocument,
}

impl Package {
    pub fn content_types(&self) -> Result<ContentTypes<'_>, XlsxError> {
        Ok(ContentTypes {
            doc: self.part(CONTENT_TYPES_PART)?,
        })
    }

    pub fn content_types_mut(&mut self) -> Result<ContentTypesMut<'_>, XlsxError> {
        Ok(ContentTypesMut {
            doc: self.part_mut(CONTENT_TYPES_PART)?,
        })
    }
}

fn lookup(doc: &XmlDocument, part: &str) -> Option<ContentType> {
    let part_name = override_name(part);
    if let Some(el) = doc.root.elements().find(|el| override_matches(el, &part_name)) {
        return el.attr("ContentType").map(ContentType::from_media_type);
    }
    let ext = extension(part)?;
    doc.root
        .children_named("Default")
        .find(|el| {
            el.attr("Extension")
                .is_some_and(|e| e.eq_ignore_ascii_case(&ext))
        })
        .and_then(|el| el.attr("ContentType"))
        .map(ContentType::from_media_type)
}

fn overrides(doc: &XmlDocument) -> Vec<(String, ContentType)> {
    doc.root
        .children_named("Override")
        .filter_map(|el| {
            let name = el.attr("PartName")?;
            let media = el.attr("ContentType")?;
            Some((canonical_part_name(name), ContentType::from_media_type(media)))
        })
        .collect()
}

impl ContentTypes<'_> {
    /// The media type of `part`: its override if present, else the default for its extension.
    pub fn content_type_of(&self, part: &str) -> Option<ContentType> {
        lookup(self.doc, part)
    }

    /// `(part name, type)` for every override, part names without the leading `/`.
    pub fn overrides(&self) -> Vec<(String, ContentType)> {
        overrides(self.doc)
    }
}

impl ContentTypesMut<'_> {
    pub fn content_type_of(&self, part: &str) -> Option<ContentType> {
        lookup(self.doc, part)
    }

    pub fn overrides(&self) -> Vec<(String, ContentType)> {
        overrides(self.doc)
    }

    /// Add or replace the override for `part`.
    pub fn add_override(&mut self, part: &str, content_type: ContentType) {
        let part_name = override_name(part);
        let media = content_type.media_type();
        if let Some(el) = self
            .doc
            .root
            .elements_mut()
            .find(|el| override_matches(el, &part_name))
        {
            el.set_attr("ContentType", media);
            return;
        }
        let el = self
            .doc
            .root
            .make_child("Override")
            .with_attr("PartName", part_name)
            .with_attr("ContentType", media);
        self.doc.root.push_child(el);
    }

    pub fn remove_override(&mut self, part: &str) -> bool {
        let part_name = override_name(part);
        let before = self.doc.root.children.len();
        self.doc
            .root
            .retain_elements(|el| !override_matches(el, &part_name));
        before != self.doc.root.children.len()
    }

    /// Add or replace the default media type for an extension. Defaults precede overrides.
    pub fn set_default(&mut self, ext: &str, content_type: ContentType) {
        let media = content_type.media_type();
        if let Some(el) = self.doc.root.elements_mut().find(|el| {
            el.is("Default")
                && el
                    .attr("Extension")
                    .is_some_and(|e| e.eq_ignore_ascii_case(ext))
        }) {
            el.set_attr("ContentType", media);
            return;
        }
        let el = self
            .doc
            .root
            .make_child("Default")
            .with_attr("Extension", ext)
            .with_attr("ContentType", media);
        let idx = self.doc.root.position("Override").unwrap_or(self.doc.root.children.len());
        self.doc.root.insert_child(idx, el);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
  <Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#;

    fn package() -> Package {
        let mut pkg = Package::new();
        pkg.add_or_replace_part(CONTENT_TYPES_PART, TYPES.as_bytes().to_vec());
        pkg
    }

    #[test]
    fn override_wins_over_extension_default() {
        let pkg = package();
        let types = pkg.content_types().unwrap();
        assert_eq!(types.content_type_of("xl/workbook.xml"), Some(ContentType::Workbook));
        assert_eq!(types.content_type_of("/xl/worksheets/sheet1.xml"), Some(ContentType::Worksheet));
        assert_eq!(types.content_type_of("xl/styles.xml"), Some(ContentType::Xml));
        assert_eq!(types.content_type_of("_rels/.rels"), Some(ContentType::Relationships));
        assert_eq!(types.content_type_of("xl/media/image1.png"), None);
    }

    #[test]
    fn add_replace_and_remove_overrides() {
        let mut pkg = package();
        let mut types = pkg.content_types_mut().unwrap();
        types.add_override("xl/worksheets/sheet2.xml", ContentType::Worksheet);
        types.add_override("xl/worksheets/sheet1.xml", ContentType::Chartsheet);
        types.set_default("png", ContentType::Other("image/png".to_string()));

        assert_eq!(
            types.content_type_of("xl/worksheets/sheet1.xml"),
            Some(ContentType::Chartsheet)
        );
        assert!(types.remove_override("xl/worksheets/sheet1.xml"));
        assert!(!types.remove_override("xl/worksheets/sheet1.xml"));

        let names: Vec<String> = types.overrides().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["xl/workbook.xml", "xl/worksheets/sheet2.xml"]);
        assert_eq!(
            types.content_type_of("xl/media/a.PNG"),
            Some(ContentType::Other("image/png".to_string()))
        );
    }

    #[test]
    fn media_types_roundtrip() {
        for ct in [
            ContentType::Workbook,
            ContentType::Worksheet,
            ContentType::SharedStrings,
            ContentType::CoreProperties,
            ContentType::ExtendedProperties,
            ContentType::CalcChain,
        ] {
            assert_eq!(ContentType::from_media_type(&ct.media_type()), ct);
        }
        assert_eq!(
            ContentType::SharedStrings.media_type(),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"
        );
    }
}
