//! The sheet registry in the workbook part and the commands that edit it.
//!
//! A sheet lives in several places at once: a `<sheet>` entry under `<sheets>`, a relationship in
//! the workbook's rels part, a content-type override, the part itself, and the title list in
//! `docProps/app.xml`. Each edit is a [`SheetCommand`] that names every part it may touch and runs
//! inside [`Package::transact`], so a failure part-way leaves all of them as they were.

use gridbook_model::coordinates_from_address;
use serde::{Deserialize, Serialize};

use crate::content_types::ContentType;
use crate::package::{Package, CONTENT_TYPES_PART};
use crate::path::rels_for_part;
use crate::properties::{app_part_name, sync_sheet_titles};
use crate::relationships::RelationshipType;
use crate::template::{worksheet_document, OFFICE_REL_NS};
use crate::xml::{XmlDocument, XmlElement};
use crate::XlsxError;

pub const MAX_SHEET_NAME_LEN: usize = 31;
const FORBIDDEN_SHEET_NAME_CHARS: &[char] = &['\\', '/', '?', '*', '[', ']', ':'];

/// Elements that precede `<definedNames>` in a workbook.
const BEFORE_DEFINED_NAMES: &[&str] = &[
    "fileVersion",
    "fileSharing",
    "workbookPr",
    "workbookProtection",
    "bookViews",
    "sheets",
    "functionGroups",
    "externalReferences",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetKind {
    Worksheet,
    Chartsheet,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SheetVisibility {
    #[default]
    Visible,
    Hidden,
    VeryHidden,
}

impl SheetVisibility {
    fn from_state(state: Option<&str>) -> Self {
        match state {
            Some("hidden") => SheetVisibility::Hidden,
            Some("veryHidden") => SheetVisibility::VeryHidden,
            _ => SheetVisibility::Visible,
        }
    }

    fn state(self) -> Option<&'static str> {
        match self {
            SheetVisibility::Visible => None,
            SheetVisibility::Hidden => Some("hidden"),
            SheetVisibility::VeryHidden => Some("veryHidden"),
        }
    }
}

/// One entry of the sheet registry, in tab order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetInfo {
    pub name: String,
    pub sheet_id: u32,
    pub rel_id: String,
    pub kind: SheetKind,
    pub visibility: SheetVisibility,
    /// The sheet's part, or `None` when its relationship does not resolve.
    pub part: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefinedName {
    pub name: String,
    pub formula: String,
    /// Zero-based position of the owning sheet for sheet-local names.
    pub local_sheet_id: Option<u32>,
    pub hidden: bool,
}

/// Check a proposed sheet name against the rules consumers enforce.
pub fn validate_sheet_name(name: &str) -> Result<(), XlsxError> {
    let invalid = |reason| {
        Err(XlsxError::InvalidSheetName {
            name: name.to_string(),
            reason,
        })
    };
    if name.is_empty() {
        return invalid("name is empty");
    }
    if name.chars().count() > MAX_SHEET_NAME_LEN {
        return invalid("name is longer than 31 characters");
    }
    if name.contains(FORBIDDEN_SHEET_NAME_CHARS) {
        return invalid(r"name contains one of \ / ? * [ ] :");
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return invalid("name starts or ends with an apostrophe");
    }
    Ok(())
}

fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// `R1C1`, `R2`, `C`, `rc3` and the like.
fn is_r1c1_like(name: &str) -> bool {
    let digits_then = |s: &str| s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let Some(rest) = name.strip_prefix(['R', 'r']) else {
        return name
            .strip_prefix(['C', 'c'])
            .is_some_and(|rest| digits_then(rest) == 0);
    };
    let after_row = &rest[rest.len() - digits_then(rest)..];
    after_row.is_empty()
        || after_row
            .strip_prefix(['C', 'c'])
            .is_some_and(|rest| digits_then(rest) == 0)
}

/// The form of `name` used in formulas.
///
/// Quoted when it holds anything but letters, digits, `_` or `.`, or when it would read as a
/// cell reference (`A1`, `R1C1`).
pub fn quote_sheet_name(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        && coordinates_from_address(name).is_err()
        && !is_r1c1_like(name);
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

fn starts_with_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .get(..needle.len())
        .is_some_and(|head| head.to_lowercase() == needle.to_lowercase())
}

/// Rewrite references to sheet `old` as references to `new` in one formula.
///
/// Formulas naming an external workbook (`[Book.xlsx]Sheet1!A1`) are left alone, as is text
/// inside string literals. Returns `None` when nothing changed.
pub fn rename_sheet_in_formula(formula: &str, old: &str, new: &str) -> Option<String> {
    if formula.contains(['[', ']']) {
        return None;
    }
    let quoted = format!("'{}'!", old.replace('\'', "''"));
    let bare = format!("{old}!");
    let replacement = format!("{}!", quote_sheet_name(new));

    let mut out = String::with_capacity(formula.len() + replacement.len());
    let mut changed = false;
    let mut in_string = false;
    let mut prev: Option<char> = None;
    let mut rest = formula;
    while let Some(c) = rest.chars().next() {
        if c == '"' {
            in_string = !in_string;
        } else if !in_string
            && !prev.is_some_and(|p| p.is_alphanumeric() || matches!(p, '_' | '.' | '\''))
        {
            let matched = [&quoted, &bare]
                .into_iter()
                .find(|pattern| starts_with_ignore_case(rest, pattern));
            if let Some(pattern) = matched {
                out.push_str(&replacement);
                rest = &rest[pattern.len()..];
                prev = Some('!');
                changed = true;
                continue;
            }
        }
        out.push(c);
        prev = Some(c);
        rest = &rest[c.len_utf8()..];
    }
    changed.then_some(out)
}

fn sheets_element(doc: &XmlDocument) -> Option<&XmlElement> {
    doc.root.child("sheets")
}

fn sheet_entries(doc: &XmlDocument) -> impl Iterator<Item = &XmlElement> {
    sheets_element(doc)
        .into_iter()
        .flat_map(|sheets| sheets.children_named("sheet"))
}

/// The registry, in tab order.
pub(crate) fn read_sheets(package: &Package, workbook_part: &str) -> Result<Vec<SheetInfo>, XlsxError> {
    let doc = package.part(workbook_part)?;
    let rels = package.relationships(workbook_part)?;
    let mut sheets = Vec::new();
    for el in sheet_entries(doc) {
        let name = el
            .attr("name")
            .ok_or_else(|| XlsxError::Invalid(format!("{workbook_part}: <sheet> without name")))?;
        let sheet_id = el
            .attr("sheetId")
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| XlsxError::Invalid(format!("{workbook_part}: sheet {name:?} has no valid sheetId")))?;
        let rel_id = el.prefixed_attr("id").unwrap_or_default().to_string();
        let rel = rels.by_id(&rel_id);
        if rel.is_none() {
            log::warn!("{workbook_part}: sheet {name:?} refers to missing relationship {rel_id:?}");
        }
        let kind = match rel.as_ref().map(|rel| &rel.kind) {
            Some(RelationshipType::Chartsheet) => SheetKind::Chartsheet,
            _ => SheetKind::Worksheet,
        };
        sheets.push(SheetInfo {
            name: name.to_string(),
            sheet_id,
            rel_id,
            kind,
            visibility: SheetVisibility::from_state(el.attr("state")),
            part: rel.and_then(|rel| rel.resolved_target(workbook_part)),
        });
    }
    Ok(sheets)
}

fn defined_names(doc: &XmlDocument) -> Vec<DefinedName> {
    doc.root
        .child("definedNames")
        .into_iter()
        .flat_map(|names| names.children_named("definedName"))
        .map(|el| DefinedName {
            name: el.attr("name").unwrap_or_default().to_string(),
            formula: el.text(),
            local_sheet_id: el.attr("localSheetId").and_then(|id| id.parse().ok()),
            hidden: matches!(el.attr("hidden"), Some("1") | Some("true")),
        })
        .collect()
}

fn workbook_view(doc: &mut XmlDocument) -> Option<&mut XmlElement> {
    doc.root
        .child_mut("bookViews")
        .and_then(|views| views.child_mut("workbookView"))
}

fn active_tab(doc: &XmlDocument) -> usize {
    doc.root
        .child("bookViews")
        .and_then(|views| views.child("workbookView"))
        .and_then(|view| view.attr("activeTab"))
        .and_then(|tab| tab.parse().ok())
        .unwrap_or(0)
}

fn set_active_tab_attr(doc: &mut XmlDocument, tab: usize) {
    let root = &mut doc.root;
    if root.child("bookViews").is_none() {
        let idx = ["workbookProtection", "workbookPr", "fileSharing", "fileVersion"]
            .iter()
            .find_map(|name| root.position(name))
            .map(|idx| idx + 1)
            .unwrap_or(0);
        let views = root.make_child("bookViews");
        root.insert_child(idx, views);
    }
    let views = root.child_or_insert("bookViews");
    let view = views.child_or_insert("workbookView");
    view.set_attr("activeTab", tab.to_string());
    if view
        .attr("firstSheet")
        .and_then(|first| first.parse::<usize>().ok())
        .is_some_and(|first| first > tab)
    {
        view.set_attr("firstSheet", tab.to_string());
    }
}

/// Where a command's parts live.
#[derive(Clone, Debug)]
pub(crate) struct WorkbookParts {
    pub workbook: String,
    pub workbook_rels: String,
    pub app: String,
}

impl WorkbookParts {
    pub(crate) fn new(package: &Package, workbook_part: &str) -> Self {
        Self {
            workbook: workbook_part.to_string(),
            workbook_rels: rels_for_part(workbook_part),
            app: app_part_name(package),
        }
    }

    fn registry_parts(&self) -> Vec<String> {
        vec![
            self.workbook.clone(),
            self.workbook_rels.clone(),
            CONTENT_TYPES_PART.to_string(),
            self.app.clone(),
        ]
    }
}

/// A multi-part edit of the sheet registry.
pub(crate) trait SheetCommand {
    type Output;

    fn describe(&self) -> String;

    /// Every part the command may create, modify or delete.
    fn parts(&self, package: &Package, ctx: &WorkbookParts) -> Result<Vec<String>, XlsxError>;

    fn apply(self, package: &mut Package, ctx: &WorkbookParts) -> Result<Self::Output, XlsxError>;
}

/// Run `command` so that either all of its edits land or none do.
pub(crate) fn execute<C: SheetCommand>(
    package: &mut Package,
    ctx: &WorkbookParts,
    command: C,
) -> Result<C::Output, XlsxError> {
    let parts = command.parts(package, ctx)?;
    log::debug!("{} (parts: {})", command.describe(), parts.join(", "));
    package.transact(&parts, |package| command.apply(package, ctx))
}

fn find_sheet(sheets: &[SheetInfo], name: &str) -> Result<usize, XlsxError> {
    sheets
        .iter()
        .position(|sheet| sheet.name == name)
        .ok_or_else(|| XlsxError::SheetNotFound(name.to_string()))
}

fn check_new_name(sheets: &[SheetInfo], name: &str) -> Result<(), XlsxError> {
    validate_sheet_name(name)?;
    if sheets.iter().any(|sheet| same_name(&sheet.name, name)) {
        return Err(XlsxError::DuplicateSheetName(name.to_string()));
    }
    Ok(())
}

/// First `<dir>/worksheets/sheetN.xml` not already in the package.
fn next_worksheet_part(package: &Package, workbook_part: &str) -> String {
    let dir = workbook_part
        .rsplit_once('/')
        .map(|(dir, _)| format!("{dir}/"))
        .unwrap_or_default();
    (1u32..)
        .map(|n| format!("{dir}worksheets/sheet{n}.xml"))
        .find(|part| !package.has_part(part))
        .unwrap_or_default()
}

fn titles_from(sheets: &[SheetInfo]) -> (Vec<String>, Vec<String>) {
    let names = |kind| {
        sheets
            .iter()
            .filter(|sheet| sheet.kind == kind)
            .map(|sheet| sheet.name.clone())
            .collect::<Vec<_>>()
    };
    (names(SheetKind::Worksheet), names(SheetKind::Chartsheet))
}

fn sync_titles(package: &mut Package, ctx: &WorkbookParts) -> Result<(), XlsxError> {
    let sheets = read_sheets(package, &ctx.workbook)?;
    let (worksheets, chartsheets) = titles_from(&sheets);
    sync_sheet_titles(package, &worksheets, &chartsheets)
}

/// Wire a new worksheet part into the package and append it to the registry.
fn register_worksheet(
    package: &mut Package,
    ctx: &WorkbookParts,
    name: &str,
    part: &str,
) -> Result<SheetInfo, XlsxError> {
    let sheets = read_sheets(package, &ctx.workbook)?;
    let sheet_id = sheets.iter().map(|sheet| sheet.sheet_id).max().unwrap_or(0) + 1;
    let rel_id = package
        .relationships_mut(&ctx.workbook)?
        .add(RelationshipType::Worksheet, part);
    package
        .content_types_mut()?
        .add_override(part, ContentType::Worksheet);

    let doc = package.part_mut(&ctx.workbook)?;
    let r = doc.root.namespace_prefix(OFFICE_REL_NS, "r");
    let sheets_el = doc.root.child_or_insert("sheets");
    let entry = sheets_el
        .make_child("sheet")
        .with_attr("name", name)
        .with_attr("sheetId", sheet_id.to_string())
        .with_attr(format!("{r}:id"), rel_id.as_str());
    sheets_el.push_child(entry);

    sync_titles(package, ctx)?;
    Ok(SheetInfo {
        name: name.to_string(),
        sheet_id,
        rel_id,
        kind: SheetKind::Worksheet,
        visibility: SheetVisibility::Visible,
        part: Some(part.to_string()),
    })
}

/// Append a new, empty worksheet.
pub(crate) struct AddWorksheet {
    pub name: String,
}

impl SheetCommand for AddWorksheet {
    type Output = SheetInfo;

    fn describe(&self) -> String {
        format!("add worksheet {:?}", self.name)
    }

    fn parts(&self, package: &Package, ctx: &WorkbookParts) -> Result<Vec<String>, XlsxError> {
        let mut parts = ctx.registry_parts();
        parts.push(next_worksheet_part(package, &ctx.workbook));
        Ok(parts)
    }

    fn apply(self, package: &mut Package, ctx: &WorkbookParts) -> Result<SheetInfo, XlsxError> {
        check_new_name(&read_sheets(package, &ctx.workbook)?, &self.name)?;
        let part = next_worksheet_part(package, &ctx.workbook);
        package.set_part_tree(&part, worksheet_document());
        register_worksheet(package, ctx, &self.name, &part)
    }
}

/// Copy an existing worksheet under a new name, appended at the end.
pub(crate) struct CloneSheet {
    pub existing: String,
    pub new_name: String,
}

impl SheetCommand for CloneSheet {
    type Output = SheetInfo;

    fn describe(&self) -> String {
        format!("clone sheet {:?} as {:?}", self.existing, self.new_name)
    }

    fn parts(&self, package: &Package, ctx: &WorkbookParts) -> Result<Vec<String>, XlsxError> {
        let part = next_worksheet_part(package, &ctx.workbook);
        let mut parts = ctx.registry_parts();
        parts.push(rels_for_part(&part));
        parts.push(part);
        Ok(parts)
    }

    fn apply(self, package: &mut Package, ctx: &WorkbookParts) -> Result<SheetInfo, XlsxError> {
        let sheets = read_sheets(package, &ctx.workbook)?;
        let source = &sheets[find_sheet(&sheets, &self.existing)?];
        if source.kind != SheetKind::Worksheet {
            return Err(XlsxError::Invalid(format!(
                "{:?} is a chartsheet; only worksheets can be cloned",
                source.name
            )));
        }
        let source_part = source
            .part
            .clone()
            .ok_or_else(|| XlsxError::MissingPart(format!("worksheet {:?}", source.name)))?;
        check_new_name(&sheets, &self.new_name)?;

        let part = next_worksheet_part(package, &ctx.workbook);
        let mut doc = package.part(&source_part)?.clone();
        // Only one tab may be selected.
        doc.root.visit_mut(&mut |el| {
            if el.is("sheetView") {
                el.remove_attr("tabSelected");
            }
        });
        package.set_part_tree(&part, doc);

        // Drawings, comments and hyperlinks are shared with the source sheet.
        let source_rels = rels_for_part(&source_part);
        if package.has_part(&source_rels) {
            let rels = package.raw_part(&source_rels)?.into_owned();
            package.add_or_replace_part(&rels_for_part(&part), rels);
        }
        register_worksheet(package, ctx, &self.new_name, &part)
    }
}

/// Change a sheet's name and every formula that refers to it.
pub(crate) struct RenameSheet {
    pub old_name: String,
    pub new_name: String,
}

impl SheetCommand for RenameSheet {
    type Output = ();

    fn describe(&self) -> String {
        format!("rename sheet {:?} to {:?}", self.old_name, self.new_name)
    }

    fn parts(&self, package: &Package, ctx: &WorkbookParts) -> Result<Vec<String>, XlsxError> {
        let mut parts = ctx.registry_parts();
        parts.extend(
            read_sheets(package, &ctx.workbook)?
                .into_iter()
                .filter(|sheet| sheet.kind == SheetKind::Worksheet)
                .filter_map(|sheet| sheet.part),
        );
        Ok(parts)
    }

    fn apply(self, package: &mut Package, ctx: &WorkbookParts) -> Result<(), XlsxError> {
        let sheets = read_sheets(package, &ctx.workbook)?;
        let idx = find_sheet(&sheets, &self.old_name)?;
        if self.new_name == self.old_name {
            return Ok(());
        }
        validate_sheet_name(&self.new_name)?;
        let clash = sheets
            .iter()
            .enumerate()
            .any(|(i, sheet)| i != idx && same_name(&sheet.name, &self.new_name));
        if clash {
            return Err(XlsxError::DuplicateSheetName(self.new_name));
        }

        let (old, new) = (self.old_name.as_str(), self.new_name.as_str());
        let doc = package.part_mut(&ctx.workbook)?;
        if let Some(entry) = doc
            .root
            .child_mut("sheets")
            .and_then(|sheets| sheets.elements_mut().filter(|el| el.is("sheet")).nth(idx))
        {
            entry.set_attr("name", new);
        }
        if let Some(names) = doc.root.child_mut("definedNames") {
            for name in names.elements_mut().filter(|el| el.is("definedName")) {
                if let Some(formula) = rename_sheet_in_formula(&name.text(), old, new) {
                    name.set_text(formula);
                }
            }
        }

        for part in sheets
            .iter()
            .filter(|sheet| sheet.kind == SheetKind::Worksheet)
            .filter_map(|sheet| sheet.part.as_deref())
        {
            if !package.has_part(part) || !references_sheet(package.part(part)?, old, new) {
                continue;
            }
            package.part_mut(part)?.root.visit_mut(&mut |el| {
                if el.is("f") {
                    if let Some(formula) = rename_sheet_in_formula(&el.text(), old, new) {
                        el.set_text(formula);
                    }
                }
            });
        }

        sync_titles(package, ctx)
    }
}

fn references_sheet(doc: &XmlDocument, old: &str, new: &str) -> bool {
    let mut found = false;
    doc.root.visit(&mut |el| {
        if !found && el.is("f") {
            found = rename_sheet_in_formula(&el.text(), old, new).is_some();
        }
    });
    found
}

/// Shift `localSheetId`s after the sheet at `position` moved to `to` (`None`: deleted).
fn remap_local_sheet_ids(doc: &mut XmlDocument, map: impl Fn(u32) -> Option<u32>) {
    let Some(names) = doc.root.child_mut("definedNames") else {
        return;
    };
    names.retain_elements(|el| {
        !el.is("definedName")
            || el
                .attr("localSheetId")
                .and_then(|id| id.parse().ok())
                .map_or(true, |id| map(id).is_some())
    });
    for name in names.elements_mut().filter(|el| el.is("definedName")) {
        let Some(id) = name.attr("localSheetId").and_then(|id| id.parse::<u32>().ok()) else {
            continue;
        };
        if let Some(new_id) = map(id) {
            if new_id != id {
                name.set_attr("localSheetId", new_id.to_string());
            }
        }
    }
    if names.elements().next().is_none() {
        doc.root.remove_children("definedNames");
    }
}

/// Remove a sheet and everything that points at it.
pub(crate) struct DeleteSheet {
    pub name: String,
}

impl SheetCommand for DeleteSheet {
    type Output = ();

    fn describe(&self) -> String {
        format!("delete sheet {:?}", self.name)
    }

    fn parts(&self, package: &Package, ctx: &WorkbookParts) -> Result<Vec<String>, XlsxError> {
        let mut parts = ctx.registry_parts();
        let sheets = read_sheets(package, &ctx.workbook)?;
        if let Some(part) = sheets
            .iter()
            .find(|sheet| sheet.name == self.name)
            .and_then(|sheet| sheet.part.clone())
        {
            parts.push(rels_for_part(&part));
            parts.push(part);
        }
        Ok(parts)
    }

    fn apply(self, package: &mut Package, ctx: &WorkbookParts) -> Result<(), XlsxError> {
        let sheets = read_sheets(package, &ctx.workbook)?;
        let idx = find_sheet(&sheets, &self.name)?;
        let sheet = &sheets[idx];
        let worksheets = sheets
            .iter()
            .filter(|sheet| sheet.kind == SheetKind::Worksheet)
            .count();
        if sheets.len() == 1 || (sheet.kind == SheetKind::Worksheet && worksheets == 1) {
            return Err(XlsxError::LastWorksheet(self.name));
        }

        package.relationships_mut(&ctx.workbook)?.delete(&sheet.rel_id);
        if let Some(part) = &sheet.part {
            package.content_types_mut()?.remove_override(part);
            package.delete_part(part);
            package.delete_part(&rels_for_part(part));
        }

        let position = idx as u32;
        let remaining = sheets.len() - 1;
        let doc = package.part_mut(&ctx.workbook)?;
        if let Some(sheets_el) = doc.root.child_mut("sheets") {
            let mut seen = 0usize;
            sheets_el.retain_elements(|el| {
                if !el.is("sheet") {
                    return true;
                }
                seen += 1;
                seen - 1 != idx
            });
        }
        remap_local_sheet_ids(doc, |id| match id.cmp(&position) {
            std::cmp::Ordering::Less => Some(id),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => Some(id - 1),
        });

        let mut visibility: Vec<SheetVisibility> =
            sheets.iter().map(|sheet| sheet.visibility).collect();
        visibility.remove(idx);
        if !visibility.contains(&SheetVisibility::Visible) {
            // Consumers refuse workbooks without a visible sheet.
            if let Some(first) = doc
                .root
                .child_mut("sheets")
                .and_then(|sheets| sheets.elements_mut().find(|el| el.is("sheet")))
            {
                first.remove_attr("state");
            }
            visibility[0] = SheetVisibility::Visible;
        }
        let active = active_tab(doc);
        let active = match active.cmp(&idx) {
            std::cmp::Ordering::Greater => active - 1,
            _ => active.min(remaining - 1),
        };
        let active = first_visible_from(&visibility, active);
        if workbook_view(doc).is_some() {
            set_active_tab_attr(doc, active);
        }

        sync_titles(package, ctx)
    }
}

/// `preferred` if that sheet is visible, else the nearest visible sheet.
fn first_visible_from(visibility: &[SheetVisibility], preferred: usize) -> usize {
    if visibility.get(preferred) == Some(&SheetVisibility::Visible) {
        return preferred;
    }
    visibility
        .iter()
        .position(|v| *v == SheetVisibility::Visible)
        .unwrap_or(0)
}

/// Move a sheet to a new 1-based position in the tab order.
pub(crate) struct ReindexSheet {
    pub name: String,
    pub index: usize,
}

impl SheetCommand for ReindexSheet {
    type Output = ();

    fn describe(&self) -> String {
        format!("move sheet {:?} to position {}", self.name, self.index)
    }

    fn parts(&self, _package: &Package, ctx: &WorkbookParts) -> Result<Vec<String>, XlsxError> {
        Ok(ctx.registry_parts())
    }

    fn apply(self, package: &mut Package, ctx: &WorkbookParts) -> Result<(), XlsxError> {
        let sheets = read_sheets(package, &ctx.workbook)?;
        let from = find_sheet(&sheets, &self.name)?;
        let count = sheets.len();
        if self.index == 0 || self.index > count {
            return Err(XlsxError::InvalidIndex {
                index: self.index,
                count,
            });
        }
        let to = self.index - 1;
        if from == to {
            return Ok(());
        }

        // order[new position] = old position
        let mut order: Vec<usize> = (0..count).collect();
        let moved = order.remove(from);
        order.insert(to, moved);
        let new_position = |old: usize| order.iter().position(|&o| o == old);

        let doc = package.part_mut(&ctx.workbook)?;
        if let Some(sheets_el) = doc.root.child_mut("sheets") {
            let entries: Vec<XmlElement> = sheets_el.children_named("sheet").cloned().collect();
            sheets_el.retain_elements(|el| !el.is("sheet"));
            for &old in &order {
                sheets_el.push_child(entries[old].clone());
            }
        }
        remap_local_sheet_ids(doc, |id| {
            Some(new_position(id as usize).map_or(id, |pos| pos as u32))
        });
        if workbook_view(doc).is_some() {
            let active = active_tab(doc);
            set_active_tab_attr(doc, new_position(active).unwrap_or(active));
        }

        sync_titles(package, ctx)
    }
}

/// Show or hide a sheet; at least one sheet stays visible.
pub(crate) struct SetSheetVisibility {
    pub name: String,
    pub visibility: SheetVisibility,
}

impl SheetCommand for SetSheetVisibility {
    type Output = ();

    fn describe(&self) -> String {
        format!("set sheet {:?} {:?}", self.name, self.visibility)
    }

    fn parts(&self, _package: &Package, ctx: &WorkbookParts) -> Result<Vec<String>, XlsxError> {
        Ok(vec![ctx.workbook.clone()])
    }

    fn apply(self, package: &mut Package, ctx: &WorkbookParts) -> Result<(), XlsxError> {
        let sheets = read_sheets(package, &ctx.workbook)?;
        let idx = find_sheet(&sheets, &self.name)?;
        let mut visibility: Vec<SheetVisibility> =
            sheets.iter().map(|sheet| sheet.visibility).collect();
        visibility[idx] = self.visibility;
        if !visibility.contains(&SheetVisibility::Visible) {
            return Err(XlsxError::Invalid(format!(
                "cannot hide {:?}: a workbook needs at least one visible sheet",
                self.name
            )));
        }

        let doc = package.part_mut(&ctx.workbook)?;
        if let Some(entry) = doc
            .root
            .child_mut("sheets")
            .and_then(|sheets| sheets.elements_mut().filter(|el| el.is("sheet")).nth(idx))
        {
            match self.visibility.state() {
                Some(state) => entry.set_attr("state", state),
                None => {
                    entry.remove_attr("state");
                }
            }
        }
        let active = active_tab(doc);
        if active == idx && self.visibility != SheetVisibility::Visible {
            set_active_tab_attr(doc, first_visible_from(&visibility, active));
        }
        Ok(())
    }
}

/// Registry queries and edits for one document's workbook part.
pub struct Workbook<'a> {
    package: &'a mut Package,
    ctx: WorkbookParts,
}

impl<'a> Workbook<'a> {
    pub(crate) fn new(package: &'a mut Package, workbook_part: &str) -> Self {
        let ctx = WorkbookParts::new(package, workbook_part);
        Self { package, ctx }
    }

    pub fn part_name(&self) -> &str {
        &self.ctx.workbook
    }

    pub fn sheets(&self) -> Result<Vec<SheetInfo>, XlsxError> {
        read_sheets(&*self.package, &self.ctx.workbook)
    }

    pub fn sheet(&self, name: &str) -> Result<SheetInfo, XlsxError> {
        let mut sheets = self.sheets()?;
        let idx = find_sheet(&sheets, name)?;
        Ok(sheets.swap_remove(idx))
    }

    pub fn sheet_names(&self) -> Result<Vec<String>, XlsxError> {
        Ok(self.sheets()?.into_iter().map(|sheet| sheet.name).collect())
    }

    pub fn worksheet_names(&self) -> Result<Vec<String>, XlsxError> {
        Ok(self
            .sheets()?
            .into_iter()
            .filter(|sheet| sheet.kind == SheetKind::Worksheet)
            .map(|sheet| sheet.name)
            .collect())
    }

    pub fn sheet_count(&self) -> Result<usize, XlsxError> {
        Ok(sheet_entries(self.package.part(&self.ctx.workbook)?).count())
    }

    /// 1-based tab position of `name`.
    pub fn index_of(&self, name: &str) -> Result<usize, XlsxError> {
        Ok(find_sheet(&self.sheets()?, name)? + 1)
    }

    pub fn contains_sheet(&self, name: &str) -> Result<bool, XlsxError> {
        Ok(self.sheets()?.iter().any(|sheet| sheet.name == name))
    }

    pub fn add_worksheet(&mut self, name: &str) -> Result<SheetInfo, XlsxError> {
        execute(
            self.package,
            &self.ctx,
            AddWorksheet {
                name: name.to_string(),
            },
        )
    }

    pub fn clone_sheet(&mut self, existing: &str, new_name: &str) -> Result<SheetInfo, XlsxError> {
        execute(
            self.package,
            &self.ctx,
            CloneSheet {
                existing: existing.to_string(),
                new_name: new_name.to_string(),
            },
        )
    }

    pub fn rename_sheet(&mut self, old_name: &str, new_name: &str) -> Result<(), XlsxError> {
        execute(
            self.package,
            &self.ctx,
            RenameSheet {
                old_name: old_name.to_string(),
                new_name: new_name.to_string(),
            },
        )
    }

    pub fn delete_sheet(&mut self, name: &str) -> Result<(), XlsxError> {
        execute(
            self.package,
            &self.ctx,
            DeleteSheet {
                name: name.to_string(),
            },
        )
    }

    /// Move `name` to 1-based `index` in the tab order.
    pub fn reindex_sheet(&mut self, name: &str, index: usize) -> Result<(), XlsxError> {
        execute(
            self.package,
            &self.ctx,
            ReindexSheet {
                name: name.to_string(),
                index,
            },
        )
    }

    pub fn set_sheet_visibility(
        &mut self,
        name: &str,
        visibility: SheetVisibility,
    ) -> Result<(), XlsxError> {
        execute(
            self.package,
            &self.ctx,
            SetSheetVisibility {
                name: name.to_string(),
                visibility,
            },
        )
    }

    /// Zero-based position of the tab shown on open.
    pub fn active_tab(&self) -> Result<usize, XlsxError> {
        Ok(active_tab(self.package.part(&self.ctx.workbook)?))
    }

    pub fn set_active_tab(&mut self, index: usize) -> Result<(), XlsxError> {
        let sheets = self.sheets()?;
        let Some(sheet) = sheets.get(index) else {
            return Err(XlsxError::InvalidIndex {
                index,
                count: sheets.len(),
            });
        };
        if sheet.visibility != SheetVisibility::Visible {
            return Err(XlsxError::Invalid(format!(
                "sheet {:?} is hidden and cannot be the active tab",
                sheet.name
            )));
        }
        set_active_tab_attr(self.package.part_mut(&self.ctx.workbook)?, index);
        Ok(())
    }

    pub fn defined_names(&self) -> Result<Vec<DefinedName>, XlsxError> {
        Ok(defined_names(self.package.part(&self.ctx.workbook)?))
    }

    /// Add or replace a defined name, workbook-wide or local to sheet `scope`.
    pub fn set_defined_name(
        &mut self,
        name: &str,
        formula: &str,
        scope: Option<&str>,
    ) -> Result<(), XlsxError> {
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(XlsxError::Invalid(format!("invalid defined name {name:?}")));
        }
        let local_sheet_id = match scope {
            Some(sheet) => Some(find_sheet(&self.sheets()?, sheet)? as u32),
            None => None,
        };
        let formula = formula.strip_prefix('=').unwrap_or(formula);

        let doc = self.package.part_mut(&self.ctx.workbook)?;
        let root = &mut doc.root;
        if root.position("definedNames").is_none() {
            let idx = root
                .children
                .iter()
                .rposition(|node| {
                    node.as_element()
                        .is_some_and(|el| BEFORE_DEFINED_NAMES.contains(&el.local_name()))
                })
                .map(|idx| idx + 1)
                .unwrap_or(0);
            let names = root.make_child("definedNames");
            root.insert_child(idx, names);
        }
        let names = root.child_or_insert("definedNames");
        let existing = names.elements_mut().find(|el| {
            el.is("definedName")
                && el.attr("name").is_some_and(|n| same_name(n, name))
                && el.attr("localSheetId").and_then(|id| id.parse::<u32>().ok()) == local_sheet_id
        });
        match existing {
            Some(el) => el.set_text(formula),
            None => {
                let mut el = names.make_child("definedName").with_attr("name", name);
                if let Some(id) = local_sheet_id {
                    el.set_attr("localSheetId", id.to_string());
                }
                el.set_text(formula);
                names.push_child(el);
            }
        }
        Ok(())
    }

    /// Remove a defined name. Returns whether it existed.
    pub fn remove_defined_name(&mut self, name: &str, scope: Option<&str>) -> Result<bool, XlsxError> {
        let local_sheet_id = match scope {
            Some(sheet) => Some(find_sheet(&self.sheets()?, sheet)? as u32),
            None => None,
        };
        let present = defined_names(self.package.part(&self.ctx.workbook)?)
            .iter()
            .any(|n| same_name(&n.name, name) && n.local_sheet_id == local_sheet_id);
        if !present {
            return Ok(false);
        }
        let doc = self.package.part_mut(&self.ctx.workbook)?;
        if let Some(names) = doc.root.child_mut("definedNames") {
            names.retain_elements(|el| {
                !(el.is("definedName")
                    && el.attr("name").is_some_and(|n| same_name(n, name))
                    && el.attr("localSheetId").and_then(|id| id.parse::<u32>().ok())
                        == local_sheet_id)
            });
            if names.elements().next().is_none() {
                doc.root.remove_children("definedNames");
            }
        }
        Ok(true)
    }
}
