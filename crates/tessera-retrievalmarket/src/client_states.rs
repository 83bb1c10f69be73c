//! Per-status handlers for the retrieval client loop.

use crate::blockio::BlockVerifier;
use crate::client::RetrievalClient;
use crate::error::{RetrievalError, Result};
use crate::network::RetrievalDealStream;
use crate::types::{ClientDealState, DealPayment, DealStatus};
use tessera_types::{Block, TokenAmount};
use tracing::debug;

impl RetrievalClient {
    /// New: send the proposal and consume the provider's verdict.
    pub(crate) async fn propose_deal(
        &self,
        deal: &mut ClientDealState,
        stream: &dyn RetrievalDealStream,
    ) -> Result<()> {
        stream.write_proposal(deal.proposal.clone()).await?;
        let response = stream.read_response().await?;
        if response.id != deal.proposal.id {
            return Err(RetrievalError::Network(
                "response for a different deal".into(),
            ));
        }
        match response.status {
            DealStatus::Accepted => {
                deal.status = DealStatus::Accepted;
                Ok(())
            }
            DealStatus::Rejected => Err(RetrievalError::DealRejected(
                response.message.unwrap_or_default(),
            )),
            other => Err(RetrievalError::UnexpectedDealState(other.to_string())),
        }
    }

    /// Accepted: fund a payment channel to the provider's wallet.
    pub(crate) async fn setup_payment_channel(&self, deal: &mut ClientDealState) -> Result<()> {
        let channel = self
            .node
            .get_or_create_payment_channel(deal.client_wallet, deal.miner_wallet, deal.total_funds)
            .await?;
        deal.payment_channel = Some(channel);
        deal.status = DealStatus::PaymentChannelCreated;
        Ok(())
    }

    /// Steady state: read the next provider frame. Blocks are verified
    /// against the expected traversal order and persisted; a payment
    /// request is answered with a voucher covering the bytes received
    /// since the last payment.
    pub(crate) async fn process_next_response(
        &self,
        deal: &mut ClientDealState,
        stream: &dyn RetrievalDealStream,
        verifier: &mut dyn BlockVerifier,
    ) -> Result<()> {
        let response = stream.read_response().await?;
        if response.id != deal.proposal.id {
            return Err(RetrievalError::Network(
                "response for a different deal".into(),
            ));
        }

        let mut all_delivered = false;
        for block in &response.blocks {
            let (bytes, done) = self.consume_block(verifier, block).await?;
            deal.total_received += bytes;
            if done {
                all_delivered = true;
            }
        }

        match response.status {
            DealStatus::FundsNeeded | DealStatus::FundsNeededLastPayment => {
                let last = response.status == DealStatus::FundsNeededLastPayment;
                if last && !all_delivered {
                    return Err(RetrievalError::VerificationFailed);
                }
                deal.status = response.status;
                self.send_funds(deal, stream, response.payment_owed).await?;
                deal.status = if last {
                    DealStatus::Completed
                } else {
                    DealStatus::Ongoing
                };
                Ok(())
            }
            DealStatus::Completed => {
                deal.status = DealStatus::Completed;
                Ok(())
            }
            DealStatus::Failed | DealStatus::Rejected => Err(RetrievalError::DealRejected(
                response.message.unwrap_or_default(),
            )),
            _ => {
                deal.status = if all_delivered {
                    DealStatus::Completed
                } else {
                    DealStatus::Ongoing
                };
                Ok(())
            }
        }
    }

    /// Verify one delivered block and persist it locally.
    async fn consume_block(
        &self,
        verifier: &mut dyn BlockVerifier,
        block: &Block,
    ) -> Result<(u64, bool)> {
        if !block.verify() {
            return Err(RetrievalError::VerificationFailed);
        }
        let done = verifier.verify(block).await?;
        self.bs.put(block).await?;
        Ok((block.len() as u64, done))
    }

    /// Sign and send a voucher for everything received since the last
    /// payment, then widen the interval.
    async fn send_funds(
        &self,
        deal: &mut ClientDealState,
        stream: &dyn RetrievalDealStream,
        requested: TokenAmount,
    ) -> Result<()> {
        let owed = deal
            .proposal
            .params
            .price_per_byte
            .mul_int(deal.total_received - deal.bytes_paid_for);
        if requested > owed {
            return Err(RetrievalError::InvalidPayment(format!(
                "provider requested {} but only {} is owed",
                requested, owed
            )));
        }
        let channel = deal.payment_channel.ok_or_else(|| {
            RetrievalError::UnexpectedDealState("payment requested before channel setup".into())
        })?;

        deal.payment_requested = requested;
        let voucher = self.node.create_payment_voucher(channel, owed).await?;
        stream
            .write_payment(DealPayment {
                id: deal.proposal.id,
                payment_channel: channel,
                voucher,
            })
            .await?;

        deal.funds_spent = deal.funds_spent.saturating_add(owed);
        deal.bytes_paid_for = deal.total_received;
        deal.current_interval += deal.proposal.params.payment_interval_increase;
        deal.payment_requested = TokenAmount::ZERO;
        debug!(
            deal = deal.proposal.id,
            paid = %owed,
            next_interval = deal.current_interval,
            "payment sent"
        );
        Ok(())
    }
}
