//! Piece construction and verification.
//!
//! A piece is the canonical archive of a selected subgraph, zero-padded
//! to the next accepted size; its 32-byte commitment anchors a storage
//! deal on chain. [`PieceIO`] orchestrates archive write → pad → commit
//! over a filestore staging file.

pub mod cario;
pub mod commitment;
pub mod error;
pub mod padreader;
pub mod pieceio;

pub use cario::{CarCodec, CarHeader, CarIO, CAR_VERSION};
pub use commitment::generate_piece_commitment;
pub use error::{PieceIoError, Result};
pub use padreader::{next_piece_size, write_padding, MIN_PIECE_SIZE};
pub use pieceio::{PieceFile, PieceIO, StagingStore};
