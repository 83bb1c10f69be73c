//! Verifies that externally delivered blocks arrive in DAG walk order.

use crate::blockio::traverser::Traverser;
use crate::error::{RetrievalError, Result};
use async_trait::async_trait;
use tessera_types::{Block, Cid};
use tokio_util::sync::CancellationToken;

/// Accepts or rejects blocks as they stream in. Returns `true` once the
/// whole expected DAG has been delivered.
#[async_trait]
pub trait BlockVerifier: Send {
    async fn verify(&mut self, block: &Block) -> Result<bool>;
}

/// Accepts everything and never reports completion.
#[derive(Default)]
pub struct OptimisticVerifier;

#[async_trait]
impl BlockVerifier for OptimisticVerifier {
    async fn verify(&mut self, _block: &Block) -> Result<bool> {
        // it's probably fine
        Ok(false)
    }
}

/// Drives a [`Traverser`] over the expected DAG and accepts only the
/// block the walk is currently waiting for.
pub struct SelectorVerifier {
    root: Cid,
    traverser: Option<Traverser>,
    cancel: CancellationToken,
}

impl SelectorVerifier {
    pub fn new(root: Cid) -> Self {
        Self {
            root,
            traverser: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(root: Cid, cancel: CancellationToken) -> Self {
        Self {
            root,
            traverser: None,
            cancel,
        }
    }
}

#[async_trait]
impl BlockVerifier for SelectorVerifier {
    async fn verify(&mut self, block: &Block) -> Result<bool> {
        if self.traverser.is_none() {
            let mut traverser = Traverser::new(self.root);
            traverser.start(self.cancel.clone());
            self.traverser = Some(traverser);
        }
        let traverser = self.traverser.as_mut().expect("traverser just set");

        if traverser.is_complete().await {
            return Err(RetrievalError::VerificationFailed);
        }
        let (expected, _ctx) = traverser
            .current_request()
            .await
            .ok_or(RetrievalError::VerificationFailed)?;
        if expected != block.cid {
            traverser.error("verification error".into()).await;
            return Err(RetrievalError::VerificationFailed);
        }
        traverser
            .advance(block.data.clone())
            .await
            .map_err(|_| RetrievalError::VerificationFailed)?;
        Ok(traverser.is_complete().await)
    }
}
