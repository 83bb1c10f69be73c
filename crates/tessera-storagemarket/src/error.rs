use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketError {
    /// Proposal failed validation: expired, too cheap, piece too small,
    /// balance too low, commitment mismatch, wrong provider, bad signature
    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid ask: {0}")]
    InvalidAsk(String),

    #[error("Deal peer {expected}, data transfer peer {actual}")]
    WrongPeer { expected: String, actual: String },

    #[error("Deal payload CID {expected}, data transfer CID {actual}")]
    WrongPiece { expected: String, actual: String },

    #[error("Deal in inacceptable state: {0}")]
    InacceptableDealState(String),

    #[error("Wrong voucher type: {0}")]
    WrongVoucherType(String),

    #[error("No pull requests accepted for storage deals")]
    NoPullAccepted,

    #[error("No deal found for proposal {0}")]
    UnknownDeal(String),

    #[error("Couldn't send response: not connected to {0}")]
    NotConnected(String),

    #[error("Node error: {0}")]
    Node(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Cancelled")]
    Cancelled,

    #[error(transparent)]
    Types(#[from] tessera_types::TypesError),

    #[error(transparent)]
    Store(#[from] tessera_store::StoreError),

    #[error(transparent)]
    PieceIo(#[from] tessera_pieceio::PieceIoError),

    #[error(transparent)]
    Filestore(#[from] tessera_filestore::FileStoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MarketError>;
