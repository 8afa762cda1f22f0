use std::borrow::Cow;
use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use gridbook_fs::AtomicWriteError;
use zip::write::FileOptions;

use crate::options::{Compression, OpenOptions};
use crate::path::{canonical_part_name, find_part_name};
use crate::xml::XmlDocument;
use crate::XlsxError;

pub(crate) const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

#[derive(Clone, Debug, Default)]
struct PartEntry {
    /// Bytes as read from the archive (or as handed to `add_or_replace_part`).
    raw: Option<Vec<u8>>,
    /// Parsed on first access.
    tree: OnceCell<XmlDocument>,
    /// Set once the tree has been handed out mutably; only dirty parts are re-serialized.
    dirty: bool,
}

impl PartEntry {
    fn from_raw(bytes: Vec<u8>) -> Self {
        Self {
            raw: Some(bytes),
            ..Self::default()
        }
    }

    fn from_tree(doc: XmlDocument) -> Self {
        Self {
            raw: None,
            tree: OnceCell::from(doc),
            dirty: true,
        }
    }

    fn ensure_parsed(&self, name: &str) -> Result<&XmlDocument, XlsxError> {
        if let Some(doc) = self.tree.get() {
            return Ok(doc);
        }
        let raw = self
            .raw
            .as_deref()
            .ok_or_else(|| XlsxError::MissingPart(name.to_string()))?;
        let doc = XmlDocument::parse(raw)
            .map_err(|err| XlsxError::Invalid(format!("{name}: {err}")))?;
        log::debug!("parsed part {name} ({} bytes)", raw.len());
        Ok(self.tree.get_or_init(|| doc))
    }

    fn bytes(&self) -> Result<Cow<'_, [u8]>, XlsxError> {
        match (&self.raw, self.tree.get()) {
            (_, Some(doc)) if self.dirty => Ok(Cow::Owned(doc.to_bytes()?)),
            (Some(raw), _) => Ok(Cow::Borrowed(raw.as_slice())),
            (None, Some(doc)) => Ok(Cow::Owned(doc.to_bytes()?)),
            (None, None) => Ok(Cow::Borrowed(&[])),
        }
    }
}

/// The part store: every archive entry by canonical name, parsed lazily.
///
/// Parts that are only read are written back byte-for-byte; parts taken through
/// [`Package::part_mut`] are re-serialized from their tree.
#[derive(Clone, Debug, Default)]
pub struct Package {
    parts: BTreeMap<String, PartEntry>,
}

/// A parsed part borrowed from the [`Package`] that records whether it was edited.
pub(crate) struct TrackedPart<'a> {
    doc: &'a mut XmlDocument,
    dirty: &'a mut bool,
}

impl<'a> TrackedPart<'a> {
    pub(crate) fn new(doc: &'a mut XmlDocument, dirty: &'a mut bool) -> Self {
        Self { doc, dirty }
    }

    pub(crate) fn doc(&self) -> &XmlDocument {
        self.doc
    }

    /// The tree for editing; the part will be re-serialized on save.
    pub(crate) fn edit(&mut self) -> &mut XmlDocument {
        *self.dirty = true;
        self.doc
    }
}

/// Saved state of a set of parts, restored by [`Package::restore`].
#[derive(Debug)]
pub struct Snapshot {
    saved: Vec<(String, Option<PartEntry>)>,
}

impl Package {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Self, XlsxError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        log::debug!("opening package {}", path.display());
        Self::from_reader(std::io::BufReader::new(file), options)
    }

    pub fn from_bytes(bytes: &[u8], options: &OpenOptions) -> Result<Self, XlsxError> {
        Self::from_reader(Cursor::new(bytes), options)
    }

    pub fn from_reader<R: Read + Seek>(reader: R, options: &OpenOptions) -> Result<Self, XlsxError> {
        let mut zip = zip::ZipArchive::new(reader)?;
        let mut parts = BTreeMap::new();
        let mut total: u64 = 0;

        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            if !file.is_file() {
                continue;
            }
            let name = canonical_part_name(file.name());
            if file.size() > options.max_part_bytes {
                return Err(XlsxError::PartTooLarge {
                    part: name,
                    size: file.size(),
                    max: options.max_part_bytes,
                });
            }

            // The declared size can lie; cap the actual read as well.
            let mut buf = Vec::with_capacity(file.size() as usize);
            (&mut file)
                .take(options.max_part_bytes + 1)
                .read_to_end(&mut buf)?;
            let size = buf.len() as u64;
            if size > options.max_part_bytes {
                return Err(XlsxError::PartTooLarge {
                    part: name,
                    size,
                    max: options.max_part_bytes,
                });
            }
            total += size;
            if total > options.max_total_bytes {
                return Err(XlsxError::PackageTooLarge {
                    total,
                    max: options.max_total_bytes,
                });
            }
            parts.insert(name, PartEntry::from_raw(buf));
        }

        log::debug!("package holds {} parts ({total} bytes)", parts.len());
        Ok(Self { parts })
    }

    /// The stored key for `name`, falling back to an ASCII case-insensitive match.
    fn resolve(&self, name: &str) -> Option<String> {
        find_part_name(self.parts.keys().map(String::as_str), name).map(str::to_string)
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    /// The parsed tree of `name`, parsing it on first access.
    pub fn part(&self, name: &str) -> Result<&XmlDocument, XlsxError> {
        let key = self
            .resolve(name)
            .ok_or_else(|| XlsxError::MissingPart(name.to_string()))?;
        self.parts[&key].ensure_parsed(&key)
    }

    /// Mutable access to the parsed tree of `name`; the part will be re-serialized on save.
    pub fn part_mut(&mut self, name: &str) -> Result<&mut XmlDocument, XlsxError> {
        let key = self
            .resolve(name)
            .ok_or_else(|| XlsxError::MissingPart(name.to_string()))?;
        let entry = self
            .parts
            .get_mut(&key)
            .ok_or_else(|| XlsxError::MissingPart(key.clone()))?;
        entry.ensure_parsed(&key)?;
        entry.dirty = true;
        entry
            .tree
            .get_mut()
            .ok_or_else(|| XlsxError::MissingPart(key))
    }

    /// Mutable access to `name` that only marks the part dirty once [`TrackedPart::edit`] is used.
    pub(crate) fn part_tracked(&mut self, name: &str) -> Result<TrackedPart<'_>, XlsxError> {
        let key = self
            .resolve(name)
            .ok_or_else(|| XlsxError::MissingPart(name.to_string()))?;
        let entry = self
            .parts
            .get_mut(&key)
            .ok_or_else(|| XlsxError::MissingPart(key.clone()))?;
        entry.ensure_parsed(&key)?;
        let PartEntry { tree, dirty, .. } = entry;
        let doc = tree.get_mut().ok_or(XlsxError::MissingPart(key))?;
        Ok(TrackedPart { doc, dirty })
    }

    /// Current bytes of `name`, serializing the tree if it was modified.
    pub fn raw_part(&self, name: &str) -> Result<Cow<'_, [u8]>, XlsxError> {
        let key = self
            .resolve(name)
            .ok_or_else(|| XlsxError::MissingPart(name.to_string()))?;
        self.parts[&key].bytes()
    }

    pub fn add_or_replace_part(&mut self, name: &str, bytes: Vec<u8>) {
        let key = self.resolve(name).unwrap_or_else(|| canonical_part_name(name));
        log::debug!("storing part {key} ({} bytes)", bytes.len());
        self.parts.insert(key, PartEntry::from_raw(bytes));
    }

    pub fn set_part_tree(&mut self, name: &str, doc: XmlDocument) {
        let key = self.resolve(name).unwrap_or_else(|| canonical_part_name(name));
        self.parts.insert(key, PartEntry::from_tree(doc));
    }

    /// Remove `name`; returns whether it existed.
    pub fn delete_part(&mut self, name: &str) -> bool {
        match self.resolve(name) {
            Some(key) => {
                log::debug!("deleting part {key}");
                self.parts.remove(&key).is_some()
            }
            None => false,
        }
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.resolve(name)
            .is_some_and(|key| self.parts[&key].dirty)
    }

    pub fn dirty_parts(&self) -> Vec<String> {
        self.parts
            .iter()
            .filter(|(_, entry)| entry.dirty)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Capture the current state (including absence) of `names`.
    pub fn snapshot<I, S>(&self, names: I) -> Snapshot
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let saved = names
            .into_iter()
            .map(|name| {
                let key = self
                    .resolve(name.as_ref())
                    .unwrap_or_else(|| canonical_part_name(name.as_ref()));
                let entry = self.parts.get(&key).cloned();
                (key, entry)
            })
            .collect();
        Snapshot { saved }
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        for (key, entry) in snapshot.saved.into_iter().rev() {
            match entry {
                Some(entry) => {
                    self.parts.insert(key, entry);
                }
                None => {
                    self.parts.remove(&key);
                }
            }
        }
    }

    /// Run `f`, restoring `names` to their prior state if it fails.
    pub fn transact<T>(
        &mut self,
        names: &[String],
        f: impl FnOnce(&mut Package) -> Result<T, XlsxError>,
    ) -> Result<T, XlsxError> {
        let snapshot = self.snapshot(names);
        match f(self) {
            Ok(out) => Ok(out),
            Err(err) => {
                log::debug!("rolling back {} parts after error: {err}", names.len());
                self.restore(snapshot);
                Err(err)
            }
        }
    }

    pub fn write_to<W: Write + Seek>(&self, w: W, compression: Compression) -> Result<W, XlsxError> {
        let mut zip = zip::ZipWriter::new(w);
        let options = FileOptions::<()>::default().compression_method(compression.method());

        // Consumers expect the content types entry first.
        let ordered = self
            .parts
            .iter()
            .filter(|(name, _)| name.as_str() == CONTENT_TYPES_PART)
            .chain(
                self.parts
                    .iter()
                    .filter(|(name, _)| name.as_str() != CONTENT_TYPES_PART),
            );
        for (name, entry) in ordered {
            let bytes = entry.bytes()?;
            zip.start_file(name.as_str(), options)?;
            zip.write_all(&bytes)?;
        }

        Ok(zip.finish()?)
    }

    pub fn to_bytes(&self, compression: Compression) -> Result<Vec<u8>, XlsxError> {
        Ok(self
            .write_to(Cursor::new(Vec::new()), compression)?
            .into_inner())
    }

    /// Write the archive to `dest` through a staged temp file; `dest` is only replaced once the
    /// new archive is complete.
    pub fn save(&self, dest: impl AsRef<Path>, compression: Compression) -> Result<(), XlsxError> {
        let dest = dest.as_ref();
        gridbook_fs::atomic_write(dest, |file| self.write_to(file, compression).map(|_| ()))
            .map_err(AtomicWriteError::flatten::<XlsxError>)?;
        log::debug!("saved package to {}", dest.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlElement;

    fn package_with(entries: &[(&str, &str)]) -> Package {
        let mut pkg = Package::new();
        for (name, xml) in entries {
            pkg.add_or_replace_part(name, xml.as_bytes().to_vec());
        }
        pkg
    }

    #[test]
    fn lookups_canonicalize_names() {
        let pkg = package_with(&[("xl/Workbook.xml", "<workbook/>")]);
        assert!(pkg.has_part("/xl/Workbook.xml"));
        assert!(pkg.has_part("xl/workbook.xml"));
        assert_eq!(pkg.part("XL\\WORKBOOK.XML").unwrap().root.name, "workbook");
        assert!(matches!(pkg.part("xl/missing.xml"), Err(XlsxError::MissingPart(_))));
    }

    #[test]
    fn read_only_parts_keep_original_bytes() {
        let original = "<a>\n  <b x='1'/>\n</a>";
        let mut pkg = package_with(&[("a.xml", original), ("c.xml", "<c/>")]);
        pkg.part("a.xml").unwrap();
        assert_eq!(pkg.raw_part("a.xml").unwrap().as_ref(), original.as_bytes());
        assert!(!pkg.is_dirty("a.xml"));

        pkg.part_mut("c.xml").unwrap().root.set_attr("k", "v");
        assert_eq!(pkg.dirty_parts(), vec!["c.xml".to_string()]);
        let bytes = pkg.raw_part("c.xml").unwrap().into_owned();
        assert!(String::from_utf8(bytes).unwrap().ends_with(r#"<c k="v"/>"#));
    }

    #[test]
    fn transact_restores_parts_on_failure() {
        let mut pkg = package_with(&[("a.xml", "<a/>")]);
        let names = vec!["a.xml".to_string(), "new.xml".to_string()];
        let err = pkg
            .transact(&names, |pkg| {
                pkg.part_mut("a.xml")?.root.set_attr("changed", "1");
                pkg.set_part_tree("new.xml", XmlDocument::new(XmlElement::new("n")));
                Err::<(), _>(XlsxError::Invalid("boom".to_string()))
            })
            .unwrap_err();
        assert!(matches!(err, XlsxError::Invalid(_)));
        assert!(!pkg.has_part("new.xml"));
        assert_eq!(pkg.part("a.xml").unwrap().root.attr("changed"), None);
    }

    #[test]
    fn archive_roundtrip_preserves_entries() {
        let mut pkg = package_with(&[
            ("xl/workbook.xml", "<workbook/>"),
            (CONTENT_TYPES_PART, "<Types/>"),
        ]);
        pkg.add_or_replace_part("docProps/app.xml", b"<Properties/>".to_vec());
        assert!(pkg.delete_part("docProps/app.xml"));

        let bytes = pkg.to_bytes(Compression::Deflated).unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert!(names.contains(&CONTENT_TYPES_PART));
        assert_eq!(names.len(), 2);

        let reopened = Package::from_bytes(&bytes, &OpenOptions::default()).unwrap();
        assert_eq!(reopened.part("xl/workbook.xml").unwrap().root.name, "workbook");
    }

    #[test]
    fn oversized_parts_are_rejected() {
        let pkg = package_with(&[("big.xml", "<big>0123456789</big>")]);
        let bytes = pkg.to_bytes(Compression::Stored).unwrap();
        let options = OpenOptions {
            max_part_bytes: 8,
            ..OpenOptions::default()
        };
        assert!(matches!(
            Package::from_bytes(&bytes, &options),
            Err(XlsxError::PartTooLarge { .. })
        ));
    }
}
