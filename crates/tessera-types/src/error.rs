use thiserror::Error;

#[derive(Error, Debug)]
pub enum TypesError {
    /// CID bytes or hex could not be parsed
    #[error("Invalid CID: {0}")]
    InvalidCid(String),

    /// A block's payload does not hash to its claimed CID
    #[error("CID mismatch: expected {expected}, computed {computed}")]
    CidMismatch { expected: String, computed: String },

    /// A codec was asked to encode/decode a node shape it does not support
    #[error("Unexpected node: {0}")]
    UnexpectedNode(String),

    /// Selector cannot be applied to the node it was given
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Incoming wire frame exceeds the configured maximum
    #[error("Frame of {0} bytes exceeds maximum")]
    FrameTooLarge(u64),

    #[error("Traversal aborted: {0}")]
    TraversalAborted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TypesError>;
