use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    /// A delivered block does not match the expected traversal order
    #[error("Verification error")]
    VerificationFailed,

    #[error("Piece not found")]
    NotFound,

    #[error("Deal rejected: {0}")]
    DealRejected(String),

    #[error("Unexpected deal state: {0}")]
    UnexpectedDealState(String),

    #[error("Invalid payment: {0}")]
    InvalidPayment(String),

    #[error("Cannot advance when done")]
    TraversalComplete,

    #[error("Cancelled")]
    Cancelled,

    #[error("Node error: {0}")]
    Node(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error(transparent)]
    Types(#[from] tessera_types::TypesError),

    #[error(transparent)]
    Store(#[from] tessera_store::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
