use crate::error::{Result, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tessera_types::traversal::{LinkContext, LinkLoader};
use tessera_types::{Block, Cid, Node, Prefix, TypesError};
use tokio::sync::RwLock;

/// Content-addressed block storage: get/put by CID.
#[async_trait]
pub trait Blockstore: Send + Sync {
    async fn get(&self, cid: &Cid) -> Result<Block>;
    async fn put(&self, block: &Block) -> Result<()>;
    async fn has(&self, cid: &Cid) -> Result<bool>;
}

/// Encode a node, store it, and return its CID.
pub async fn put_node(bs: &dyn Blockstore, node: &Node, prefix: Prefix) -> Result<Cid> {
    let data = node
        .encode(prefix.codec)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let block = Block::wrap(data, prefix);
    let cid = block.cid;
    bs.put(&block).await?;
    Ok(cid)
}

/// In-memory blockstore.
#[derive(Default)]
pub struct MemBlockstore {
    blocks: Arc<RwLock<HashMap<Cid, Vec<u8>>>>,
}

impl MemBlockstore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blocks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blocks.read().await.is_empty()
    }
}

#[async_trait]
impl Blockstore for MemBlockstore {
    async fn get(&self, cid: &Cid) -> Result<Block> {
        let blocks = self.blocks.read().await;
        let data = blocks
            .get(cid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(cid.to_string()))?;
        Ok(Block { cid: *cid, data })
    }

    async fn put(&self, block: &Block) -> Result<()> {
        self.blocks
            .write()
            .await
            .insert(block.cid, block.data.clone());
        Ok(())
    }

    async fn has(&self, cid: &Cid) -> Result<bool> {
        Ok(self.blocks.read().await.contains_key(cid))
    }
}

/// A [`LinkLoader`] that dereferences links out of a blockstore, used by
/// the CAR writer and the provider-side block reader.
pub struct BlockstoreLoader {
    bs: Arc<dyn Blockstore>,
}

impl BlockstoreLoader {
    pub fn new(bs: Arc<dyn Blockstore>) -> Self {
        Self { bs }
    }
}

#[async_trait]
impl LinkLoader for BlockstoreLoader {
    async fn load_link(
        &mut self,
        link: &Cid,
        _ctx: &LinkContext,
    ) -> tessera_types::Result<Vec<u8>> {
        let block = self
            .bs
            .get(link)
            .await
            .map_err(|e| TypesError::TraversalAborted(e.to_string()))?;
        Ok(block.data)
    }
}
