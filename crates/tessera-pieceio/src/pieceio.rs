use crate::cario::{CarCodec, CarIO};
use crate::commitment;
use crate::error::{PieceIoError, Result};
use crate::padreader::{next_piece_size, write_padding};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use tessera_filestore::FileStore;
use tessera_store::Blockstore;
use tessera_types::{Cid, Selector};
use tracing::{debug, warn};

/// A seekable scratch file that knows its path and size. `FileStore`
/// files satisfy this; tests substitute scripted implementations.
pub trait PieceFile: Read + Write + Seek + Send {
    fn path(&self) -> &Path;
    fn size(&self) -> tessera_filestore::Result<u64>;
}

impl PieceFile for tessera_filestore::File {
    fn path(&self) -> &Path {
        tessera_filestore::File::path(self)
    }

    fn size(&self) -> tessera_filestore::Result<u64> {
        tessera_filestore::File::size(self)
    }
}

/// The slice of filestore behaviour piece staging needs.
pub trait StagingStore: Send + Sync {
    fn create_temp(&self) -> tessera_filestore::Result<Box<dyn PieceFile>>;
    fn delete(&self, path: &Path) -> tessera_filestore::Result<()>;
}

impl StagingStore for FileStore {
    fn create_temp(&self) -> tessera_filestore::Result<Box<dyn PieceFile>> {
        Ok(Box::new(FileStore::create_temp(self)?))
    }

    fn delete(&self, path: &Path) -> tessera_filestore::Result<()> {
        FileStore::delete(self, path)
    }
}

/// End-to-end piece construction: archive the selected subgraph, pad to
/// the next accepted size, digest, hand back the seekable staging file.
/// The caller owns the file and must delete it through the filestore.
pub struct PieceIO {
    files: Arc<dyn StagingStore>,
    bs: Arc<dyn Blockstore>,
    car: Arc<dyn CarIO>,
}

impl PieceIO {
    pub fn new(files: Arc<dyn StagingStore>, bs: Arc<dyn Blockstore>) -> Self {
        Self {
            files,
            bs,
            car: Arc::new(CarCodec::new()),
        }
    }

    /// Substitute the archive codec (failure injection in tests).
    pub fn with_car_io(mut self, car: Arc<dyn CarIO>) -> Self {
        self.car = car;
        self
    }

    /// Build the piece for `(root, selector)` and return its commitment
    /// together with the staging file. Every failure path deletes the
    /// staging file before returning.
    pub async fn generate_piece_commitment(
        &self,
        root: Cid,
        selector: &Selector,
    ) -> Result<([u8; 32], Box<dyn PieceFile>)> {
        let mut file = self.files.create_temp()?;

        if let Err(e) = self
            .car
            .write_car(self.bs.clone(), root, selector, &mut file)
            .await
        {
            self.cleanup(file.path());
            return Err(e);
        }

        let size = match file.size() {
            Ok(size) => size,
            Err(e) => {
                self.cleanup(file.path());
                return Err(e.into());
            }
        };
        let padded_size = next_piece_size(size);
        let padding = padded_size - size;

        match write_padding(&mut file, padding) {
            Ok(written) if written == padding => {}
            Ok(written) => {
                self.cleanup(file.path());
                return Err(PieceIoError::ShortPadding {
                    expected: padding,
                    written,
                });
            }
            Err(e) => {
                self.cleanup(file.path());
                return Err(e.into());
            }
        }

        if let Err(e) = file.seek(SeekFrom::Start(0)) {
            self.cleanup(file.path());
            return Err(e.into());
        }

        let piece_commitment = match commitment::generate_piece_commitment(&mut file, padded_size)
        {
            Ok(piece_commitment) => piece_commitment,
            Err(e) => {
                self.cleanup(file.path());
                return Err(e);
            }
        };

        debug!(
            root = %root,
            archive_size = size,
            padded_size,
            "generated piece commitment"
        );
        Ok((piece_commitment, file))
    }

    /// Decode an archive stream's header and return its root.
    pub fn read_piece(&self, reader: &mut (dyn Read + Send)) -> Result<Cid> {
        let header = self.car.read_car_header(reader)?;
        header.roots.first().copied().ok_or(PieceIoError::NoRoots)
    }

    fn cleanup(&self, path: &Path) {
        if let Err(e) = self.files.delete(path) {
            warn!(path = %path.display(), error = %e, "failed to delete staging file");
        }
    }
}
