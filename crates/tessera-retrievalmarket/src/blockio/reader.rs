//! Reads a DAG out of a blockstore one block at a time, in walk order.

use crate::blockio::traverser::Traverser;
use crate::error::{RetrievalError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tessera_store::Blockstore;
use tessera_types::{Block, Cid};
use tokio_util::sync::CancellationToken;

/// Block-by-block access to a DAG; `true` accompanies the final block.
#[async_trait]
pub trait BlockReader: Send {
    async fn read_block(&mut self) -> Result<(Block, bool)>;
}

/// Wraps a [`Traverser`] with a blockstore loader: each `read_block`
/// resolves the walk's next link from the store and advances.
pub struct SelectorBlockReader {
    traverser: Traverser,
    bs: Arc<dyn Blockstore>,
}

impl SelectorBlockReader {
    pub fn new(root: Cid, bs: Arc<dyn Blockstore>, cancel: CancellationToken) -> Self {
        let mut traverser = Traverser::new(root);
        traverser.start(cancel);
        Self { traverser, bs }
    }
}

#[async_trait]
impl BlockReader for SelectorBlockReader {
    async fn read_block(&mut self) -> Result<(Block, bool)> {
        if self.traverser.is_complete().await {
            return Err(RetrievalError::TraversalComplete);
        }
        let (link, _ctx) = self
            .traverser
            .current_request()
            .await
            .ok_or(RetrievalError::TraversalComplete)?;
        let block = self.bs.get(&link).await?;
        self.traverser.advance(block.data.clone()).await?;
        let done = self.traverser.is_complete().await;
        Ok((block, done))
    }
}
