//! Length-delimited message framing.
//!
//! Every wire message is a u32-LE length prefix followed by a bincode
//! payload. Streams carrying these frames are expected to be ordered and
//! reliable (libp2p substreams, in-memory duplex pipes in tests).

use crate::error::{Result, TypesError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame. Large enough for a response carrying a
/// payment interval's worth of blocks, small enough to bound memory.
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
    T: Serialize + Sync,
{
    let payload =
        bincode::serialize(message).map_err(|e| TypesError::Serialization(e.to_string()))?;
    if payload.len() as u64 > MAX_FRAME_SIZE as u64 {
        return Err(TypesError::FrameTooLarge(payload.len() as u64));
    }
    writer.write_all(&(payload.len() as u32).to_le_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin + Send,
    T: DeserializeOwned,
{
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_le_bytes(len_bytes);
    if len > MAX_FRAME_SIZE {
        return Err(TypesError::FrameTooLarge(len as u64));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    bincode::deserialize(&payload).map_err(|e| TypesError::Serialization(e.to_string()))
}
