use thiserror::Error;

#[derive(Error, Debug)]
pub enum PieceIoError {
    #[error("Filestore error: {0}")]
    Filestore(#[from] tessera_filestore::FileStoreError),

    #[error(transparent)]
    Types(#[from] tessera_types::TypesError),

    #[error("Blockstore error: {0}")]
    Store(#[from] tessera_store::StoreError),

    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    #[error("Archive has no roots")]
    NoRoots,

    /// The padding write reported fewer bytes than requested.
    #[error("Padding short write: wrote {written} of {expected} bytes")]
    ShortPadding { expected: u64, written: u64 },

    #[error("Unexpected end of piece: read {read} of {expected} bytes")]
    ShortPiece { expected: u64, read: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PieceIoError>;
