//! Open/create/save/close lifecycle of one workbook file.

use std::path::{Path, PathBuf};

use crate::content_types::ContentType;
use crate::options::{OpenOptions, SaveOptions};
use crate::package::Package;
use crate::path::rels_for_part;
use crate::properties::{self, Property};
use crate::relationships::{parse_relationships, RelationshipType};
use crate::shared_strings::SharedStrings;
use crate::template::{new_package, WORKBOOK_PART};
use crate::workbook::{read_sheets, SheetInfo, SheetKind, Workbook};
use crate::worksheet::{refresh_dimension, Worksheet};
use crate::XlsxError;

const DEFAULT_SHARED_STRINGS: &str = "sharedStrings.xml";

#[derive(Debug)]
struct Inner {
    package: Package,
    shared_strings: SharedStrings,
    path: Option<PathBuf>,
    workbook_part: String,
}

/// An open workbook. After [`Document::close`] every operation fails with
/// [`XlsxError::InvalidDocumentState`].
#[derive(Debug)]
pub struct Document {
    inner: Option<Inner>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// The main workbook part named by the package root relationships.
fn locate_workbook(package: &Package) -> Result<String, XlsxError> {
    let rels_part = rels_for_part("");
    let bytes = package
        .raw_part(&rels_part)
        .map_err(|_| XlsxError::MissingPart(rels_part.clone()))?;
    parse_relationships(&bytes, &rels_part)?
        .into_iter()
        .find(|rel| rel.kind == RelationshipType::OfficeDocument)
        .and_then(|rel| rel.resolved_target(""))
        .filter(|part| package.has_part(part))
        .ok_or_else(|| XlsxError::MissingPart("workbook part (officeDocument relationship)".to_string()))
}

fn load_shared_strings(package: &Package, workbook_part: &str) -> Result<SharedStrings, XlsxError> {
    let part = package
        .relationships(workbook_part)?
        .first_of_type(&RelationshipType::SharedStrings)
        .and_then(|rel| rel.resolved_target(workbook_part));
    match part {
        Some(part) if package.has_part(&part) => {
            let doc = package.part(&part)?.clone();
            log::debug!("loaded shared strings from {part}");
            Ok(SharedStrings::from_document(part, doc))
        }
        _ => {
            let dir = workbook_part
                .rsplit_once('/')
                .map(|(dir, _)| format!("{dir}/"))
                .unwrap_or_default();
            Ok(SharedStrings::new(format!("{dir}{DEFAULT_SHARED_STRINGS}")))
        }
    }
}

impl Inner {
    fn from_package(package: Package, path: Option<PathBuf>) -> Result<Self, XlsxError> {
        let workbook_part = locate_workbook(&package)?;
        let shared_strings = load_shared_strings(&package, &workbook_part)?;
        Ok(Self {
            package,
            shared_strings,
            path,
            workbook_part,
        })
    }

    fn has_edits(&self) -> bool {
        self.shared_strings.is_dirty() || !self.package.dirty_parts().is_empty()
    }

    /// Write the shared string table back into the package, wiring it in if it is new.
    fn flush_shared_strings(&mut self) -> Result<(), XlsxError> {
        if !self.shared_strings.is_dirty() {
            return Ok(());
        }
        let part = self.shared_strings.part_name().to_string();
        let is_new = !self.package.has_part(&part);
        self.package
            .set_part_tree(&part, self.shared_strings.to_document());
        if is_new {
            log::debug!("creating shared string table {part}");
            let mut rels = self.package.relationships_mut(&self.workbook_part)?;
            if rels.by_target(&part).is_none() {
                rels.add(RelationshipType::SharedStrings, &part);
            }
            self.package
                .content_types_mut()?
                .add_override(&part, ContentType::SharedStrings);
        }
        Ok(())
    }

    fn drop_calc_chain(&mut self) -> Result<(), XlsxError> {
        let Some(rel) = self
            .package
            .relationships(&self.workbook_part)?
            .first_of_type(&RelationshipType::CalcChain)
        else {
            return Ok(());
        };
        if let Some(part) = rel.resolved_target(&self.workbook_part) {
            log::warn!("removing stale calculation chain {part}");
            self.package.delete_part(&part);
            self.package.content_types_mut()?.remove_override(&part);
        }
        self.package
            .relationships_mut(&self.workbook_part)?
            .delete(&rel.id);
        Ok(())
    }

    fn refresh_dimensions(&mut self) -> Result<(), XlsxError> {
        for sheet in read_sheets(&self.package, &self.workbook_part)? {
            if sheet.kind != SheetKind::Worksheet {
                continue;
            }
            if let Some(part) = sheet.part.filter(|part| self.package.is_dirty(part)) {
                refresh_dimension(self.package.part_mut(&part)?);
            }
        }
        Ok(())
    }

    fn prepare_for_save(&mut self, options: &SaveOptions) -> Result<(), XlsxError> {
        if options.drop_calc_chain && self.has_edits() {
            self.drop_calc_chain()?;
        }
        self.flush_shared_strings()?;
        if options.update_dimensions {
            self.refresh_dimensions()?;
        }
        Ok(())
    }
}

impl Document {
    /// A new in-memory workbook with one empty worksheet, `Sheet1`.
    pub fn new() -> Self {
        let package = new_package();
        log::debug!("created new workbook in memory");
        Self {
            inner: Some(Inner {
                package,
                shared_strings: SharedStrings::new(format!("xl/{DEFAULT_SHARED_STRINGS}")),
                path: None,
                workbook_part: WORKBOOK_PART.to_string(),
            }),
        }
    }

    /// Write a new one-sheet workbook to `path` and open it.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, XlsxError> {
        let mut doc = Self::new();
        doc.save_as(path)?;
        Ok(doc)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, XlsxError> {
        Self::open_with(path, &OpenOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Self, XlsxError> {
        let path = path.as_ref();
        let package = Package::open(path, options)?;
        let inner = Inner::from_package(package, Some(path.to_path_buf()))?;
        log::debug!(
            "opened {} (workbook part {})",
            path.display(),
            inner.workbook_part
        );
        Ok(Self { inner: Some(inner) })
    }

    /// Open an in-memory archive. The document has no path until [`Document::save_as`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, XlsxError> {
        Self::from_bytes_with(bytes, &OpenOptions::default())
    }

    pub fn from_bytes_with(bytes: &[u8], options: &OpenOptions) -> Result<Self, XlsxError> {
        let package = Package::from_bytes(bytes, options)?;
        Ok(Self {
            inner: Some(Inner::from_package(package, None)?),
        })
    }

    fn inner(&self) -> Result<&Inner, XlsxError> {
        self.inner.as_ref().ok_or(XlsxError::InvalidDocumentState)
    }

    fn inner_mut(&mut self) -> Result<&mut Inner, XlsxError> {
        self.inner.as_mut().ok_or(XlsxError::InvalidDocumentState)
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Where the document is saved by [`Document::save`].
    pub fn path(&self) -> Option<&Path> {
        self.inner.as_ref().and_then(|inner| inner.path.as_deref())
    }

    /// Drop the document. Unsaved edits are lost.
    pub fn close(&mut self) {
        if let Some(inner) = self.inner.take() {
            log::debug!(
                "closed {}",
                inner
                    .path
                    .as_deref()
                    .map_or_else(|| "in-memory document".to_string(), |p| p.display().to_string())
            );
        }
    }

    pub fn save(&mut self) -> Result<(), XlsxError> {
        self.save_with(&SaveOptions::default())
    }

    pub fn save_with(&mut self, options: &SaveOptions) -> Result<(), XlsxError> {
        let path = self.inner()?.path.clone().ok_or_else(|| {
            XlsxError::Invalid("document has no file path; use save_as".to_string())
        })?;
        self.save_as_with(path, options)
    }

    pub fn save_as(&mut self, path: impl AsRef<Path>) -> Result<(), XlsxError> {
        self.save_as_with(path, &SaveOptions::default())
    }

    /// Save to `path` and make it the document's path. The file is replaced only once the new
    /// archive has been written completely.
    pub fn save_as_with(
        &mut self,
        path: impl AsRef<Path>,
        options: &SaveOptions,
    ) -> Result<(), XlsxError> {
        let path = path.as_ref();
        let inner = self.inner_mut()?;
        inner.prepare_for_save(options)?;
        inner.package.save(path, options.compression)?;
        inner.shared_strings.mark_clean();
        inner.path = Some(path.to_path_buf());
        Ok(())
    }

    /// The archive as it would be saved.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, XlsxError> {
        self.to_bytes_with(&SaveOptions::default())
    }

    pub fn to_bytes_with(&mut self, options: &SaveOptions) -> Result<Vec<u8>, XlsxError> {
        let inner = self.inner_mut()?;
        inner.prepare_for_save(options)?;
        let bytes = inner.package.to_bytes(options.compression)?;
        inner.shared_strings.mark_clean();
        Ok(bytes)
    }

    pub fn package(&self) -> Result<&Package, XlsxError> {
        Ok(&self.inner()?.package)
    }

    /// Direct part access. Edits made here bypass the sheet registry bookkeeping.
    pub fn package_mut(&mut self) -> Result<&mut Package, XlsxError> {
        Ok(&mut self.inner_mut()?.package)
    }

    pub fn shared_strings(&self) -> Result<&SharedStrings, XlsxError> {
        Ok(&self.inner()?.shared_strings)
    }

    pub fn workbook(&mut self) -> Result<Workbook<'_>, XlsxError> {
        let inner = self.inner_mut()?;
        Ok(Workbook::new(&mut inner.package, &inner.workbook_part))
    }

    /// The sheet registry in tab order.
    pub fn sheets(&self) -> Result<Vec<SheetInfo>, XlsxError> {
        let inner = self.inner()?;
        read_sheets(&inner.package, &inner.workbook_part)
    }

    pub fn sheet_names(&self) -> Result<Vec<String>, XlsxError> {
        Ok(self.sheets()?.into_iter().map(|sheet| sheet.name).collect())
    }

    pub fn worksheet(&mut self, name: &str) -> Result<Worksheet<'_>, XlsxError> {
        let sheet = self
            .sheets()?
            .into_iter()
            .find(|sheet| sheet.name == name)
            .ok_or_else(|| XlsxError::SheetNotFound(name.to_string()))?;
        self.open_worksheet(sheet)
    }

    /// Worksheet at 1-based tab position `index`.
    pub fn worksheet_at(&mut self, index: usize) -> Result<Worksheet<'_>, XlsxError> {
        let mut sheets = self.sheets()?;
        let count = sheets.len();
        if index == 0 || index > count {
            return Err(XlsxError::InvalidIndex { index, count });
        }
        self.open_worksheet(sheets.swap_remove(index - 1))
    }

    fn open_worksheet(&mut self, sheet: SheetInfo) -> Result<Worksheet<'_>, XlsxError> {
        if sheet.kind != SheetKind::Worksheet {
            return Err(XlsxError::Invalid(format!(
                "{:?} is a chartsheet, not a worksheet",
                sheet.name
            )));
        }
        let part_name = sheet
            .part
            .ok_or_else(|| XlsxError::MissingPart(format!("worksheet {:?}", sheet.name)))?;
        let Inner {
            package,
            shared_strings,
            ..
        } = self.inner_mut()?;
        let part = package.part_tracked(&part_name)?;
        Ok(Worksheet::new(part, shared_strings, sheet.name))
    }

    /// Current value of a document property; empty when unset.
    pub fn property(&self, property: Property) -> Result<String, XlsxError> {
        properties::get(&self.inner()?.package, property)
    }

    pub fn set_property(&mut self, property: Property, value: &str) -> Result<(), XlsxError> {
        properties::set(&mut self.inner_mut()?.package, property, value)
    }

    /// Remove a document property. Returns whether it was set.
    pub fn delete_property(&mut self, property: Property) -> Result<bool, XlsxError> {
        properties::delete(&mut self.inner_mut()?.package, property)
    }
}
