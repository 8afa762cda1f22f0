//! Atomic file replacement.
//!
//! Writers stage their output in a temp file created next to the destination, which is then
//! flushed, synced and renamed over the destination. A failure at any point before the rename
//! leaves the destination exactly as it was.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Failure of an atomic write: either the filesystem or the caller's writer.
#[derive(Debug)]
pub enum AtomicWriteError<E> {
    Io(io::Error),
    Writer(E),
}

impl<E> AtomicWriteError<E> {
    /// Collapse into a single error type when both sides convert into it.
    pub fn flatten<T>(self) -> T
    where
        T: From<io::Error> + From<E>,
    {
        match self {
            AtomicWriteError::Io(err) => T::from(err),
            AtomicWriteError::Writer(err) => T::from(err),
        }
    }
}

impl<E> From<io::Error> for AtomicWriteError<E> {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl<E: std::fmt::Display> std::fmt::Display for AtomicWriteError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AtomicWriteError::Io(err) => write!(f, "io error: {err}"),
            AtomicWriteError::Writer(err) => write!(f, "write error: {err}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for AtomicWriteError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AtomicWriteError::Io(err) => Some(err),
            AtomicWriteError::Writer(err) => Some(err),
        }
    }
}

// `Path::parent` is `Some("")` for bare file names like `book.xlsx`.
fn staging_dir(dest: &Path) -> &Path {
    dest.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Replace `dest` with whatever `write_fn` writes.
///
/// Parent directories are created as needed. If `write_fn` fails the staged file is removed and
/// `dest` is left untouched.
pub fn atomic_write<T, E>(
    dest: impl AsRef<Path>,
    write_fn: impl FnOnce(&mut File) -> Result<T, E>,
) -> Result<T, AtomicWriteError<E>> {
    let dest = dest.as_ref();
    let dir = staging_dir(dest);
    fs::create_dir_all(dir)?;

    let mut staged = NamedTempFile::new_in(dir)?;
    let out = write_fn(staged.as_file_mut()).map_err(AtomicWriteError::Writer)?;

    staged.as_file_mut().flush()?;
    staged.as_file().sync_all()?;

    let staged = staged.into_temp_path();
    replace_file(staged.as_ref(), dest)?;
    // The rename is done; a failed directory sync does not undo it.
    let _ = sync_dir(dir);

    Ok(out)
}

/// Atomically replace `dest` with `bytes`.
pub fn atomic_write_bytes(dest: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    atomic_write(dest, |file| file.write_all(bytes)).map_err(AtomicWriteError::flatten)
}

fn sync_dir(dir: &Path) -> io::Result<()> {
    // Opening a directory as a file fails on some platforms (notably Windows).
    File::open(dir)?.sync_all()
}

#[cfg(not(windows))]
fn replace_file(from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to)
}

#[cfg(windows)]
fn replace_file(from: &Path, to: &Path) -> io::Result<()> {
    use std::os::windows::ffi::OsStrExt as _;
    use windows_sys::Win32::Storage::FileSystem::{MoveFileExW, MOVEFILE_REPLACE_EXISTING};

    fn wide(path: &Path) -> Vec<u16> {
        path.as_os_str().encode_wide().chain(Some(0)).collect()
    }

    let (from_w, to_w) = (wide(from), wide(to));
    let ok = unsafe { MoveFileExW(from_w.as_ptr(), to_w.as_ptr(), MOVEFILE_REPLACE_EXISTING) };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files_in(dir: &Path) -> Vec<std::path::PathBuf> {
        let mut files: Vec<_> = fs::read_dir(dir)
            .expect("read_dir")
            .map(|e| e.expect("dir entry").path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        files
    }

    #[test]
    fn creates_missing_parent_directories() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("nested/out/book.xlsx");

        atomic_write_bytes(&dest, b"PK").expect("atomic write");
        assert_eq!(fs::read(&dest).expect("read dest"), b"PK");
    }

    #[test]
    fn replaces_existing_file() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("book.xlsx");
        fs::write(&dest, b"old").expect("seed dest");

        let len = atomic_write(&dest, |file| {
            file.write_all(b"new contents")?;
            Ok::<_, io::Error>(12usize)
        })
        .expect("atomic write");

        assert_eq!(len, 12);
        assert_eq!(fs::read(&dest).expect("read dest"), b"new contents");
        assert_eq!(files_in(tmp.path()), vec![dest]);
    }

    #[test]
    fn writer_error_leaves_destination_untouched() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("book.xlsx");
        let sentinel = b"sentinel-bytes";
        fs::write(&dest, sentinel).expect("seed dest");

        let err = atomic_write(&dest, |file| {
            file.write_all(b"partial").expect("write staged bytes");
            Err::<(), _>(io::Error::new(io::ErrorKind::Other, "simulated failure"))
        })
        .expect_err("writer failure should surface");

        assert!(matches!(err, AtomicWriteError::Writer(_)));
        assert_eq!(fs::read(&dest).expect("read dest"), sentinel);
        assert_eq!(
            files_in(tmp.path()),
            vec![dest],
            "staged temp file should be cleaned up"
        );
    }
}
