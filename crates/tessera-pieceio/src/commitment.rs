//! The piece-commitment primitive.
//!
//! Stands in for the sector builder: a streaming 32-byte digest over the
//! padded piece. The storage provider recomputes this over received data
//! and compares it against the commitment in the proposal.

use crate::error::{PieceIoError, Result};
use std::io::Read;

/// Digest exactly `piece_size` bytes from `reader`.
pub fn generate_piece_commitment(reader: &mut dyn Read, piece_size: u64) -> Result<[u8; 32]> {
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    let mut remaining = piece_size;
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = reader.read(&mut buf[..want])?;
        if n == 0 {
            return Err(PieceIoError::ShortPiece {
                expected: piece_size,
                read: piece_size - remaining,
            });
        }
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }
    Ok(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_commitment_depends_on_content_and_size() {
        let data = vec![7u8; 254];
        let a = generate_piece_commitment(&mut Cursor::new(&data), 254).unwrap();
        let b = generate_piece_commitment(&mut Cursor::new(&data), 254).unwrap();
        assert_eq!(a, b);

        let c = generate_piece_commitment(&mut Cursor::new(&data), 127).unwrap();
        assert_ne!(a, c);

        let mut other = data.clone();
        other[0] = 8;
        let d = generate_piece_commitment(&mut Cursor::new(&other), 254).unwrap();
        assert_ne!(a, d);
    }

    #[test]
    fn test_short_input_is_an_error() {
        let data = vec![1u8; 100];
        let err = generate_piece_commitment(&mut Cursor::new(&data), 127).unwrap_err();
        assert!(matches!(err, PieceIoError::ShortPiece { expected: 127, read: 100 }));
    }
}
