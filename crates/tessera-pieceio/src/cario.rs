//! Reading and writing canonical block archives.
//!
//! An archive is a header frame followed by one frame per distinct block
//! in selector-traversal order. Each frame is a u64-LE length prefix; the
//! header payload is the canonical JSON of [`CarHeader`], a block payload
//! is the serialized CID followed by the raw block bytes. The rest of the
//! system treats this layout as opaque framing.

use crate::error::{PieceIoError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{Read, Write};
use std::sync::Arc;
use tessera_store::{Blockstore, BlockstoreLoader};
use tessera_types::traversal::walk;
use tessera_types::{to_canonical_json, Block, Cid, Node, Selector, CID_BYTE_LEN};

pub const CAR_VERSION: u64 = 1;

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct CarHeader {
    pub version: u64,
    pub roots: Vec<Cid>,
}

/// Writes and reads archives. `PieceIO` consumes this through a trait so
/// tests can substitute failing writers.
#[async_trait]
pub trait CarIO: Send + Sync {
    /// Serialize the subgraph reachable from `root` under `selector` into
    /// `sink`, each distinct block exactly once, in traversal order.
    async fn write_car(
        &self,
        bs: Arc<dyn Blockstore>,
        root: Cid,
        selector: &Selector,
        sink: &mut (dyn Write + Send),
    ) -> Result<()>;

    /// Decode just the archive header.
    fn read_car_header(&self, source: &mut (dyn Read + Send)) -> Result<CarHeader>;
}

/// The production archive codec.
#[derive(Default)]
pub struct CarCodec;

impl CarCodec {
    pub fn new() -> Self {
        Self
    }

    /// Stream an archive back as `(header, blocks)`.
    pub fn read_car(&self, source: &mut (dyn Read + Send)) -> Result<(CarHeader, Vec<Block>)> {
        let header = self.read_car_header(source)?;
        let mut blocks = Vec::new();
        loop {
            match read_record(source) {
                Ok(payload) => blocks.push(decode_block(&payload)?),
                Err(PieceIoError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
        }
        Ok((header, blocks))
    }
}

#[async_trait]
impl CarIO for CarCodec {
    async fn write_car(
        &self,
        bs: Arc<dyn Blockstore>,
        root: Cid,
        selector: &Selector,
        sink: &mut (dyn Write + Send),
    ) -> Result<()> {
        let header = CarHeader {
            version: CAR_VERSION,
            roots: vec![root],
        };
        write_record(sink, to_canonical_json(&header)?.as_bytes())?;

        let mut seen: HashSet<Cid> = HashSet::new();
        let mut loader = BlockstoreLoader::new(bs);
        let mut visit = |cid: &Cid, bytes: &[u8], _node: &Node| {
            if seen.insert(*cid) {
                let mut payload = Vec::with_capacity(CID_BYTE_LEN + bytes.len());
                payload.extend_from_slice(&cid.to_bytes());
                payload.extend_from_slice(bytes);
                write_record(sink, &payload)
                    .map_err(|e| tessera_types::TypesError::TraversalAborted(e.to_string()))?;
            }
            Ok(())
        };
        walk(&root, selector, &mut loader, &mut visit).await?;
        sink.flush()?;
        Ok(())
    }

    fn read_car_header(&self, source: &mut (dyn Read + Send)) -> Result<CarHeader> {
        let payload = read_record(source)?;
        let header: CarHeader = serde_json::from_slice(&payload)
            .map_err(|e| PieceIoError::InvalidArchive(e.to_string()))?;
        if header.version != CAR_VERSION {
            return Err(PieceIoError::InvalidArchive(format!(
                "unsupported archive version {}",
                header.version
            )));
        }
        Ok(header)
    }
}

fn write_record(sink: &mut (dyn Write + Send), payload: &[u8]) -> Result<()> {
    sink.write_all(&(payload.len() as u64).to_le_bytes())?;
    sink.write_all(payload)?;
    Ok(())
}

fn read_record(source: &mut (dyn Read + Send)) -> Result<Vec<u8>> {
    let mut len_bytes = [0u8; 8];
    source.read_exact(&mut len_bytes)?;
    let len = u64::from_le_bytes(len_bytes);
    let mut payload = vec![0u8; len as usize];
    source.read_exact(&mut payload)?;
    Ok(payload)
}

fn decode_block(payload: &[u8]) -> Result<Block> {
    if payload.len() < CID_BYTE_LEN {
        return Err(PieceIoError::InvalidArchive(
            "block record shorter than a CID".to_string(),
        ));
    }
    let cid = Cid::from_bytes(&payload[..CID_BYTE_LEN])?;
    Block::new(payload[CID_BYTE_LEN..].to_vec(), cid).map_err(PieceIoError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tessera_store::{put_node, MemBlockstore};
    use tessera_types::{Codec, MultihashCode, Prefix};

    async fn fixture() -> (Arc<dyn Blockstore>, Cid, Vec<Cid>) {
        let bs = MemBlockstore::new();
        let raw = Prefix::new(Codec::Raw, MultihashCode::Blake3);
        let dag = Prefix::new(Codec::DagJson, MultihashCode::Blake3);

        let a = put_node(&bs, &Node::Bytes(b"aaaa".to_vec()), raw).await.unwrap();
        let b = put_node(&bs, &Node::Bytes(b"bbbb".to_vec()), raw).await.unwrap();
        let mid = put_node(
            &bs,
            &Node::map(vec![("cat", Node::Link(a)), ("dog", Node::Link(b))]),
            dag,
        )
        .await
        .unwrap();
        let root = put_node(
            &bs,
            &Node::map(vec![("second", Node::Link(mid)), ("again", Node::Link(a))]),
            dag,
        )
        .await
        .unwrap();

        (Arc::new(bs), root, vec![root, mid, a, b])
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let (bs, root, expected_order) = fixture().await;
        let codec = CarCodec::new();

        let mut sink = Vec::new();
        codec
            .write_car(bs, root, &Selector::all(), &mut sink)
            .await
            .unwrap();

        let mut source = Cursor::new(sink);
        let (header, blocks) = codec.read_car(&mut source).unwrap();
        assert_eq!(header.version, CAR_VERSION);
        assert_eq!(header.roots, vec![root]);

        // each distinct block once, in traversal order
        let cids: Vec<Cid> = blocks.iter().map(|b| b.cid).collect();
        assert_eq!(cids, expected_order);
        assert!(blocks.iter().all(|b| b.verify()));
    }

    #[tokio::test]
    async fn test_header_alone_is_readable() {
        let (bs, root, _) = fixture().await;
        let codec = CarCodec::new();

        let mut sink = Vec::new();
        codec
            .write_car(bs, root, &Selector::all(), &mut sink)
            .await
            .unwrap();

        let mut source = Cursor::new(sink);
        let header = codec.read_car_header(&mut source).unwrap();
        assert_eq!(header.roots, vec![root]);
    }

    #[tokio::test]
    async fn test_missing_block_fails_write() {
        let bs = MemBlockstore::new();
        let dag = Prefix::new(Codec::DagJson, MultihashCode::Blake3);
        let dangling = Prefix::new(Codec::Raw, MultihashCode::Blake3).sum(b"gone");
        let root = put_node(&bs, &Node::map(vec![("x", Node::Link(dangling))]), dag)
            .await
            .unwrap();

        let codec = CarCodec::new();
        let mut sink = Vec::new();
        let result = codec
            .write_car(Arc::new(bs), root, &Selector::all(), &mut sink)
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_garbage_header_rejected() {
        let codec = CarCodec::new();
        let mut source = Cursor::new(b"not an archive".to_vec());
        assert!(codec.read_car_header(&mut source).is_err());
    }
}
