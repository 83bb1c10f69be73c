//! Scoped byte files rooted at a base directory.
//!
//! Every file a [`FileStore`] hands out lives under the store's base
//! directory, and deletes are refused for any path outside it. Piece
//! staging uses `create_temp` for uniquely named scratch files; callers
//! own the returned handle and are responsible for deleting it.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum FileStoreError {
    #[error("{0} is not a directory")]
    BaseNotADirectory(PathBuf),

    #[error("File already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid base path for {path} (expecting {base})")]
    OutsideBase { path: PathBuf, base: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, FileStoreError>;

/// A seekable byte sink/source that knows its own absolute path and size.
pub struct File {
    inner: fs::File,
    path: PathBuf,
}

impl File {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current on-disk size in bytes.
    pub fn size(&self) -> Result<u64> {
        Ok(self.inner.metadata()?.len())
    }
}

impl Read for File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for File {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for File {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// A file store mounted on a local directory.
#[derive(Clone, Debug)]
pub struct FileStore {
    base: PathBuf,
}

impl FileStore {
    /// Mount a store on an existing directory.
    pub fn new(base: impl AsRef<Path>) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        let meta = fs::metadata(&base)
            .map_err(|_| FileStoreError::BaseNotADirectory(base.clone()))?;
        if !meta.is_dir() {
            return Err(FileStoreError::BaseNotADirectory(base));
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn filename(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.base.join(relative)
    }

    /// Open an existing file for reading and writing.
    pub fn open(&self, relative: impl AsRef<Path>) -> Result<File> {
        let path = self.filename(relative);
        if !path.exists() {
            return Err(FileStoreError::NotFound(path));
        }
        let inner = OpenOptions::new().read(true).write(true).open(&path)?;
        Ok(File { inner, path })
    }

    /// Create a new file; refuses to clobber an existing one.
    pub fn create(&self, relative: impl AsRef<Path>) -> Result<File> {
        let path = self.filename(relative);
        if path.exists() {
            return Err(FileStoreError::AlreadyExists(path));
        }
        let inner = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        Ok(File { inner, path })
    }

    /// Copy `src` into a newly created file and return its absolute path.
    pub fn store(&self, relative: impl AsRef<Path>, src: &mut impl Read) -> Result<PathBuf> {
        let mut dest = self.create(relative)?;
        io::copy(src, &mut dest)?;
        dest.flush()?;
        Ok(dest.path.clone())
    }

    /// Delete a file. Only paths under the store's base are accepted.
    pub fn delete(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.starts_with(&self.base) {
            return Err(FileStoreError::OutsideBase {
                path: path.to_path_buf(),
                base: self.base.clone(),
            });
        }
        fs::remove_file(path)?;
        Ok(())
    }

    /// Create a uniquely named temp file under the base. The file is kept
    /// on disk; the caller deletes it through [`FileStore::delete`].
    pub fn create_temp(&self) -> Result<File> {
        let (inner, path) = tempfile::Builder::new()
            .prefix("fstmp")
            .tempfile_in(&self.base)?
            .keep()
            .map_err(|e| FileStoreError::Io(e.error))?;
        debug!(path = %path.display(), "created temp file");
        Ok(File { inner, path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let fs = FileStore::new(dir.path()).unwrap();
        (dir, fs)
    }

    #[test]
    fn test_base_must_be_a_directory() {
        assert!(matches!(
            FileStore::new("/definitely/not/here"),
            Err(FileStoreError::BaseNotADirectory(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("plain");
        fs::write(&file_path, b"x").unwrap();
        assert!(matches!(
            FileStore::new(&file_path),
            Err(FileStoreError::BaseNotADirectory(_))
        ));
    }

    #[test]
    fn test_create_open_and_size() {
        let (_dir, fs) = store();
        let mut file = fs.create("data.bin").unwrap();
        file.write_all(b"hello").unwrap();
        file.flush().unwrap();
        assert_eq!(file.size().unwrap(), 5);

        let mut reopened = fs.open("data.bin").unwrap();
        let mut buf = String::new();
        reopened.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "hello");
    }

    #[test]
    fn test_create_refuses_existing() {
        let (_dir, fs) = store();
        fs.create("dup").unwrap();
        assert!(matches!(
            fs.create("dup"),
            Err(FileStoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_open_missing_is_not_found() {
        let (_dir, fs) = store();
        assert!(matches!(
            fs.open("missing"),
            Err(FileStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_store_copies_reader() {
        let (_dir, fs) = store();
        let mut src = io::Cursor::new(b"payload".to_vec());
        let path = fs.store("copied", &mut src).unwrap();
        assert!(path.starts_with(fs.base()));
        assert_eq!(fs::read(&path).unwrap(), b"payload");
    }

    #[test]
    fn test_delete_is_path_bounded() {
        let (_dir, fs) = store();
        let file = fs.create("victim").unwrap();
        let inside = file.path().to_path_buf();

        let outside = tempfile::tempdir().unwrap();
        let foreign = outside.path().join("foreign");
        fs::write(&foreign, b"x").unwrap();
        assert!(matches!(
            fs.delete(&foreign),
            Err(FileStoreError::OutsideBase { .. })
        ));
        assert!(foreign.exists());

        fs.delete(&inside).unwrap();
        assert!(!inside.exists());
    }

    #[test]
    fn test_create_temp_is_unique_and_kept() {
        let (_dir, fs) = store();
        let a = fs.create_temp().unwrap();
        let b = fs.create_temp().unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().exists());
        assert!(a.path().starts_with(fs.base()));

        fs.delete(a.path()).unwrap();
        fs.delete(b.path()).unwrap();
    }

    #[test]
    fn test_temp_file_seek_and_rewrite() {
        let (_dir, fs) = store();
        let mut file = fs.create_temp().unwrap();
        file.write_all(b"0123456789").unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut buf = [0u8; 4];
        file.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"0123");
        fs.delete(file.path()).unwrap();
    }
}
