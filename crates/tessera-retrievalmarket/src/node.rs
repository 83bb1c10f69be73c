//! Node facades for the retrieval market.

use crate::error::Result;
use crate::types::PaymentVoucher;
use async_trait::async_trait;
use std::sync::Arc;
use tessera_store::Blockstore;
use tessera_types::{Address, Cid, TokenAmount};

#[async_trait]
pub trait RetrievalClientNode: Send + Sync {
    /// Set up (or reuse) a payment channel from `client` to `miner`
    /// funded with `funds`, returning its address.
    async fn get_or_create_payment_channel(
        &self,
        client_wallet: Address,
        miner_wallet: Address,
        funds: TokenAmount,
    ) -> Result<Address>;

    /// Sign a voucher debiting `amount` from the channel.
    async fn create_payment_voucher(
        &self,
        channel: Address,
        amount: TokenAmount,
    ) -> Result<PaymentVoucher>;
}

#[async_trait]
pub trait RetrievalProviderNode: Send + Sync {
    /// Size of the piece holding `payload_cid`, or `NotFound`.
    async fn get_piece_size(&self, payload_cid: &Cid) -> Result<u64>;

    /// Redeem a voucher; returns the amount actually credited, which may
    /// be less than `expected` for a partial payment.
    async fn save_payment_voucher(
        &self,
        channel: Address,
        voucher: PaymentVoucher,
        expected: TokenAmount,
    ) -> Result<TokenAmount>;

    /// Blockstore over unsealed piece data for serving retrievals.
    fn sealed_blockstore(&self) -> Arc<dyn Blockstore>;
}
