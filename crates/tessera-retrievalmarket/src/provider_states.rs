//! Per-status handlers for the retrieval provider loop.

use crate::blockio::BlockReader;
use crate::error::{RetrievalError, Result};
use crate::network::RetrievalDealStream;
use crate::provider::RetrievalProvider;
use crate::types::{DealResponse, DealStatus, ProviderDealState};
use tracing::debug;

impl RetrievalProvider {
    /// New: validate the proposal's pricing against our own and check the
    /// piece is actually held, then accept or reject.
    pub(crate) async fn receive_deal(
        &self,
        deal: &mut ProviderDealState,
        stream: &dyn RetrievalDealStream,
    ) -> Result<()> {
        if let Err(reason) = self.check_deal_params(deal).await {
            return self.reject(deal, stream, reason).await;
        }
        if self
            .node
            .get_piece_size(&deal.proposal.payload_cid)
            .await
            .is_err()
        {
            return self.reject(deal, stream, "piece not found".into()).await;
        }

        stream
            .write_response(DealResponse {
                status: DealStatus::Accepted,
                id: deal.proposal.id,
                payment_owed: tessera_types::TokenAmount::ZERO,
                message: None,
                blocks: Vec::new(),
            })
            .await?;
        deal.status = DealStatus::Accepted;
        Ok(())
    }

    async fn check_deal_params(&self, deal: &ProviderDealState) -> std::result::Result<(), String> {
        let params = &deal.proposal.params;
        if params.price_per_byte < *self.price_per_byte.read().await {
            return Err("price per byte too low".into());
        }
        let (max_interval, max_increase) = *self.payment_interval.read().await;
        if params.payment_interval > max_interval {
            return Err("payment interval too large".into());
        }
        if params.payment_interval_increase > max_increase {
            return Err("payment interval increase too large".into());
        }
        Ok(())
    }

    async fn reject(
        &self,
        deal: &mut ProviderDealState,
        stream: &dyn RetrievalDealStream,
        reason: String,
    ) -> Result<()> {
        debug!(deal = deal.proposal.id, reason = %reason, "rejecting retrieval deal");
        stream
            .write_response(DealResponse {
                status: DealStatus::Rejected,
                id: deal.proposal.id,
                payment_owed: tessera_types::TokenAmount::ZERO,
                message: Some(reason.clone()),
                blocks: Vec::new(),
            })
            .await?;
        deal.message = reason;
        deal.status = DealStatus::Rejected;
        Ok(())
    }

    /// Accepted/Ongoing: read blocks in walk order until the current
    /// interval is exhausted (or the DAG ends), send them, and request
    /// payment for everything unpaid.
    pub(crate) async fn send_blocks(
        &self,
        deal: &mut ProviderDealState,
        stream: &dyn RetrievalDealStream,
        reader: &mut dyn BlockReader,
    ) -> Result<()> {
        let mut blocks = Vec::new();
        let mut done = false;
        while !done && deal.total_sent < deal.bytes_paid_for + deal.current_interval {
            let (block, last) = reader.read_block().await?;
            deal.total_sent += block.len() as u64;
            blocks.push(block);
            done = last;
        }

        let owed = deal
            .proposal
            .params
            .price_per_byte
            .mul_int(deal.total_sent - deal.bytes_paid_for);
        let status = if done {
            DealStatus::FundsNeededLastPayment
        } else {
            DealStatus::FundsNeeded
        };

        stream
            .write_response(DealResponse {
                status,
                id: deal.proposal.id,
                payment_owed: owed,
                message: None,
                blocks,
            })
            .await?;
        deal.status = status;
        debug!(
            deal = deal.proposal.id,
            sent = deal.total_sent,
            owed = %owed,
            last = done,
            "blocks sent, payment requested"
        );
        Ok(())
    }

    /// FundsNeeded: redeem the client's voucher. A partial payment keeps
    /// the deal in its current state and re-requests the remainder; full
    /// payment widens the interval and resumes (or completes).
    pub(crate) async fn process_payment(
        &self,
        deal: &mut ProviderDealState,
        stream: &dyn RetrievalDealStream,
    ) -> Result<()> {
        let payment = stream.read_payment().await?;
        if payment.id != deal.proposal.id {
            return Err(RetrievalError::InvalidPayment(
                "payment for a different deal".into(),
            ));
        }

        let expected = deal
            .proposal
            .params
            .price_per_byte
            .mul_int(deal.total_sent - deal.bytes_paid_for);
        let received = self
            .node
            .save_payment_voucher(payment.payment_channel, payment.voucher, expected)
            .await?;
        deal.funds_received = deal.funds_received.saturating_add(received);

        if received < expected {
            let remainder = expected.saturating_sub(received);
            stream
                .write_response(DealResponse {
                    status: deal.status,
                    id: deal.proposal.id,
                    payment_owed: remainder,
                    message: None,
                    blocks: Vec::new(),
                })
                .await?;
            return Ok(());
        }

        deal.bytes_paid_for = deal.total_sent;
        deal.current_interval += deal.proposal.params.payment_interval_increase;
        deal.status = if deal.status == DealStatus::FundsNeededLastPayment {
            DealStatus::Completed
        } else {
            DealStatus::Ongoing
        };
        Ok(())
    }
}
