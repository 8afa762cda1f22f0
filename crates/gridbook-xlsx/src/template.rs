//! Parts of a brand-new workbook: one empty worksheet named `Sheet1`.

use chrono::{SecondsFormat, Utc};

use crate::package::{Package, CONTENT_TYPES_PART};
use crate::xml::{XmlDocument, XmlElement};

pub(crate) const WORKBOOK_PART: &str = "xl/workbook.xml";
pub(crate) const SHEET_MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
pub(crate) const OFFICE_REL_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub(crate) const FIRST_SHEET_NAME: &str = "Sheet1";

/// Skeleton of an empty worksheet part.
pub(crate) fn worksheet_document() -> XmlDocument {
    XmlDocument::new(
        XmlElement::new("worksheet")
            .with_attr("xmlns", SHEET_MAIN_NS)
            .with_attr("xmlns:r", OFFICE_REL_NS)
            .with_child(XmlElement::new("dimension").with_attr("ref", "A1"))
            .with_child(
                XmlElement::new("sheetViews")
                    .with_child(XmlElement::new("sheetView").with_attr("workbookViewId", "0")),
            )
            .with_child(
                XmlElement::new("sheetFormatPr")
                    .with_attr("baseColWidth", "10")
                    .with_attr("defaultRowHeight", "16"),
            )
            .with_child(XmlElement::new("sheetData"))
            .with_child(
                XmlElement::new("pageMargins")
                    .with_attr("left", "0.7")
                    .with_attr("right", "0.7")
                    .with_attr("top", "0.75")
                    .with_attr("bottom", "0.75")
                    .with_attr("header", "0.3")
                    .with_attr("footer", "0.3"),
            ),
    )
}

fn content_types_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/><Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/></Types>"#
}

fn root_rels_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/></Relationships>"#
}

fn workbook_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><bookViews><workbookView xWindow="0" yWindow="0" windowWidth="28800" windowHeight="17600" activeTab="0"/></bookViews><sheets><sheet name="{FIRST_SHEET_NAME}" sheetId="1" r:id="rId1"/></sheets><calcPr calcId="191029"/></workbook>"#
    )
}

fn workbook_rels_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#
}

fn styles_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="12"/><name val="Calibri"/><family val="2"/><scheme val="minor"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#
}

fn core_xml(now: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:creator>gridbook</dc:creator><cp:lastModifiedBy>gridbook</cp:lastModifiedBy><dcterms:created xsi:type="dcterms:W3CDTF">{now}</dcterms:created><dcterms:modified xsi:type="dcterms:W3CDTF">{now}</dcterms:modified></cp:coreProperties>"#
    )
}

fn app_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes"><Application>Microsoft Excel</Application><DocSecurity>0</DocSecurity><ScaleCrop>false</ScaleCrop><HeadingPairs><vt:vector size="2" baseType="variant"><vt:variant><vt:lpstr>Worksheets</vt:lpstr></vt:variant><vt:variant><vt:i4>1</vt:i4></vt:variant></vt:vector></HeadingPairs><TitlesOfParts><vt:vector size="1" baseType="lpstr"><vt:lpstr>{FIRST_SHEET_NAME}</vt:lpstr></vt:vector></TitlesOfParts><LinksUpToDate>false</LinksUpToDate><SharedDoc>false</SharedDoc><HyperlinksChanged>false</HyperlinksChanged><AppVersion>16.0300</AppVersion></Properties>"#
    )
}

/// A package holding a one-sheet workbook, with creation and modification stamped now.
pub(crate) fn new_package() -> Package {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut first_sheet = worksheet_document();
    if let Some(view) = first_sheet
        .root
        .child_mut("sheetViews")
        .and_then(|views| views.child_mut("sheetView"))
    {
        view.set_attr("tabSelected", "1");
    }

    let mut package = Package::new();
    package.add_or_replace_part(CONTENT_TYPES_PART, content_types_xml().as_bytes().to_vec());
    package.add_or_replace_part("_rels/.rels", root_rels_xml().as_bytes().to_vec());
    package.add_or_replace_part(WORKBOOK_PART, workbook_xml().into_bytes());
    package.add_or_replace_part(
        "xl/_rels/workbook.xml.rels",
        workbook_rels_xml().as_bytes().to_vec(),
    );
    package.add_or_replace_part("xl/styles.xml", styles_xml().as_bytes().to_vec());
    package.set_part_tree("xl/worksheets/sheet1.xml", first_sheet);
    package.add_or_replace_part("docProps/core.xml", core_xml(&now).into_bytes());
    package.add_or_replace_part("docProps/app.xml", app_xml().into_bytes());
    package
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_types::ContentType;
    use crate::relationships::RelationshipType;

    #[test]
    fn every_template_part_parses_and_is_wired() {
        let package = new_package();
        for name in package.part_names().map(str::to_string).collect::<Vec<_>>() {
            package.part(&name).unwrap_or_else(|err| panic!("{name}: {err}"));
        }

        let types = package.content_types().unwrap();
        assert_eq!(
            types.content_type_of("xl/worksheets/sheet1.xml"),
            Some(ContentType::Worksheet)
        );
        let rels = package.relationships(WORKBOOK_PART).unwrap();
        let sheet = rels.by_id("rId1").unwrap();
        assert_eq!(sheet.kind, RelationshipType::Worksheet);
        assert_eq!(
            sheet.resolved_target(WORKBOOK_PART).as_deref(),
            Some("xl/worksheets/sheet1.xml")
        );

        let workbook = package.part(WORKBOOK_PART).unwrap();
        let first = workbook.root.child("sheets").and_then(|s| s.child("sheet")).unwrap();
        assert_eq!(first.attr("name"), Some(FIRST_SHEET_NAME));

        let core = package.part("docProps/core.xml").unwrap();
        let created = core.root.child("created").unwrap().text();
        assert!(chrono::DateTime::parse_from_rfc3339(&created).is_ok(), "{created}");
    }
}
