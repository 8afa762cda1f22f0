/// Default maximum uncompressed size of a single archive entry.
pub const DEFAULT_MAX_PART_BYTES: u64 = 256 * 1024 * 1024; // 256MiB

/// Default maximum total uncompressed size across all archive entries.
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 512 * 1024 * 1024; // 512MiB

/// Limits applied while inflating an archive into memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenOptions {
    pub max_part_bytes: u64,
    pub max_total_bytes: u64,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            max_part_bytes: DEFAULT_MAX_PART_BYTES,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
        }
    }
}

/// Compression used for entries written on save.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    Deflated,
    Stored,
}

impl Compression {
    pub(crate) fn method(self) -> zip::CompressionMethod {
        match self {
            Compression::Deflated => zip::CompressionMethod::Deflated,
            Compression::Stored => zip::CompressionMethod::Stored,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SaveOptions {
    pub compression: Compression,
    /// Remove `xl/calcChain.xml`; cell edits leave it stale and Excel rebuilds it on load.
    pub drop_calc_chain: bool,
    /// Recompute `<dimension ref>` on every modified worksheet.
    pub update_dimensions: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
            drop_calc_chain: true,
            update_dimensions: true,
        }
    }
}
