//! Node facades: everything the deal drivers need from the chain.

use crate::error::Result;
use crate::types::{Balance, ClientDeal, DealId, MinerDeal, SectorId, StateKey};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tessera_store::Blockstore;
use tessera_types::{Address, PublicKey, Signature, TokenAmount};

/// Callback invoked when a deal's sector is committed on chain.
pub type CommitCallback = Box<dyn FnOnce(std::result::Result<(), String>) + Send>;

#[async_trait]
pub trait StorageProviderNode: Send + Sync {
    async fn most_recent_state_id(&self) -> Result<StateKey>;

    async fn get_balance(&self, addr: Address) -> Result<Balance>;

    /// Top up market funds for `addr` to at least `amount`.
    async fn ensure_funds(&self, addr: Address, amount: TokenAmount) -> Result<()>;

    /// Publish the deal on chain; returns the deal id and the CID of the
    /// publish message.
    async fn publish_deals(&self, deal: &MinerDeal) -> Result<(DealId, tessera_types::Cid)>;

    async fn get_miner_worker(&self, miner: Address) -> Result<Address>;

    async fn sign_bytes(&self, signer: Address, bytes: &[u8])
        -> Result<(PublicKey, Signature)>;

    /// Hand the piece file to the sealing pipeline; returns the sector it
    /// was placed in.
    async fn on_deal_complete(&self, deal: &MinerDeal, piece_path: &Path) -> Result<SectorId>;

    /// Register a callback for the deal's sector landing on chain.
    async fn on_deal_sector_committed(
        &self,
        provider: Address,
        deal_id: DealId,
        cb: CommitCallback,
    ) -> Result<()>;

    async fn locate_piece_for_deal_within_sector(
        &self,
        deal_id: DealId,
    ) -> Result<(SectorId, u64, u64)>;

    /// Blockstore over sealed sector data, for serving retrievals.
    fn sealed_blockstore(&self) -> Arc<dyn Blockstore>;
}

#[async_trait]
pub trait StorageClientNode: Send + Sync {
    async fn ensure_funds(&self, addr: Address, amount: TokenAmount) -> Result<()>;

    /// Fill in the proposal's client key and proposer signature.
    async fn sign_proposal(
        &self,
        signer: Address,
        proposal: &mut crate::types::StorageDealProposal,
    ) -> Result<()>;

    /// Check the provider's publish message on chain and return the deal
    /// id it allocated.
    async fn validate_published_deal(&self, deal: &ClientDeal) -> Result<DealId>;

    /// Wait for the deal's piece to be placed into a sector.
    async fn await_deal_sector(&self, deal_id: DealId) -> Result<SectorId>;

    /// Register a callback for the deal's sector being proven.
    async fn on_deal_sector_committed(
        &self,
        provider: Address,
        deal_id: DealId,
        cb: CommitCallback,
    ) -> Result<()>;
}
