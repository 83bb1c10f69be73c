//! Stage handlers for the provider deal driver. Each runs on its own
//! task; results flow back to the updater as [`MinerDealUpdate`]s.

use crate::datatransfer::StorageDataTransferVoucher;
use crate::error::{MarketError, Result};
use crate::network::StorageDealStream;
use crate::piecestore::DealInfo;
use crate::provider::{DealMutator, MinerDealUpdate, Provider};
use crate::types::{DealState, MinerDeal, Response};
use std::sync::Arc;
use tessera_pieceio::PieceFile;
use tessera_types::Selector;
use tracing::{info, warn};

impl Provider {
    /// Validating: reject expired, underpriced, undersized or underfunded
    /// proposals before touching any data.
    pub(crate) async fn validating(&self, deal: MinerDeal) -> Result<Option<DealMutator>> {
        let head = self.spn.most_recent_state_id().await?;
        if head.height() >= deal.proposal.proposal_expiration {
            return Err(MarketError::InvalidProposal(
                "deal proposal already expired".into(),
            ));
        }

        let ask = self.ask.read().await.ask.clone();
        let min_price = ask
            .price
            .mul_int(deal.proposal.piece_size)
            .div_floor(1 << 30);
        if deal.proposal.storage_price_per_epoch < min_price {
            return Err(MarketError::InvalidProposal(format!(
                "storage price per epoch less than asking price: {} < {}",
                deal.proposal.storage_price_per_epoch, min_price
            )));
        }

        if deal.proposal.piece_size < ask.min_piece_size {
            return Err(MarketError::InvalidProposal(format!(
                "piece size less than minimum required size: {} < {}",
                deal.proposal.piece_size, ask.min_piece_size
            )));
        }

        // a first filter only: nothing stops the client withdrawing later
        let balance = self.spn.get_balance(deal.proposal.client).await?;
        if balance.available < deal.proposal.total_storage_price() {
            return Err(MarketError::InvalidProposal(format!(
                "client available market balance too small: {} < {}",
                balance.available,
                deal.proposal.total_storage_price()
            )));
        }

        Ok(None)
    }

    /// Transferring: open a pull of the whole payload DAG from the
    /// client. The transfer manager's completion event moves the deal
    /// forward; this handler posts nothing.
    pub(crate) async fn transferring(&self, deal: MinerDeal) -> Result<Option<DealMutator>> {
        info!(proposal = %deal.proposal_cid, payload = %deal.payload_cid, "fetching deal data");
        self.data_transfer
            .open_pull_channel(
                deal.client,
                StorageDataTransferVoucher {
                    proposal: deal.proposal_cid,
                },
                deal.payload_cid,
                Selector::all(),
            )
            .await?;
        Ok(None)
    }

    /// VerifyData: re-derive the piece commitment from the received DAG
    /// and compare against the proposal.
    pub(crate) async fn verifydata(&self, deal: MinerDeal) -> Result<Option<DealMutator>> {
        let (piece_commitment, file) = self
            .pio
            .generate_piece_commitment(deal.payload_cid, &Selector::all())
            .await?;

        if piece_commitment != deal.proposal.piece_ref {
            if let Err(e) = self.fs.delete(file.path()) {
                warn!(path = %file.path().display(), error = %e, "failed to delete piece file");
            }
            return Err(MarketError::InvalidProposal(
                "proposal piece commitment doesn't match calculated commitment".into(),
            ));
        }

        let piece_path = file.path().to_path_buf();
        Ok(Some(Box::new(move |d: &mut MinerDeal| {
            d.piece_path = Some(piece_path);
        })))
    }

    /// Publishing: fund collateral, publish on chain, send the signed
    /// acceptance (with the publish message CID) and close the client
    /// stream.
    pub(crate) async fn publishing(
        &self,
        deal: MinerDeal,
        stream: Option<Arc<dyn StorageDealStream>>,
    ) -> Result<Option<DealMutator>> {
        let stream =
            stream.ok_or_else(|| MarketError::NotConnected(deal.proposal_cid.to_string()))?;

        let worker = self.spn.get_miner_worker(deal.proposal.provider).await?;
        self.spn
            .ensure_funds(worker, deal.proposal.storage_collateral)
            .await?;

        let (deal_id, publish_message) = self.spn.publish_deals(&deal).await?;
        info!(
            proposal = %deal.proposal_cid,
            deal_id,
            publish_message = %publish_message,
            "deal published"
        );

        let signed = self
            .sign_response(Response {
                state: DealState::Accepted,
                message: None,
                proposal: deal.proposal_cid,
                publish_message: Some(publish_message),
            })
            .await?;
        stream.write_response(signed).await?;
        if let Err(e) = stream.close().await {
            warn!(proposal = %deal.proposal_cid, error = %e, "closing client connection");
        }

        Ok(Some(Box::new(move |d: &mut MinerDeal| {
            d.deal_id = Some(deal_id);
        })))
    }

    /// Staged: hand the piece file to the sealing facade.
    pub(crate) async fn staged(&self, deal: MinerDeal) -> Result<Option<DealMutator>> {
        let piece_path = deal.piece_path.clone().ok_or_else(|| {
            MarketError::InacceptableDealState("staged deal has no piece file".into())
        })?;
        let sector_id = self.spn.on_deal_complete(&deal, &piece_path).await?;

        Ok(Some(Box::new(move |d: &mut MinerDeal| {
            d.sector_id = Some(sector_id);
        })))
    }

    /// Sealing: register for the sector-committed callback; the callback
    /// posts the Complete update.
    pub(crate) async fn sealing(&self, deal: MinerDeal) -> Result<Option<DealMutator>> {
        let deal_id = deal
            .deal_id
            .ok_or_else(|| MarketError::InacceptableDealState("sealing deal has no id".into()))?;

        let tx = self.updated_tx.clone();
        let id = deal.proposal_cid;
        self.spn
            .on_deal_sector_committed(
                deal.proposal.provider,
                deal_id,
                Box::new(move |result| {
                    let update = MinerDealUpdate {
                        new_state: DealState::Complete,
                        id,
                        err: result.err().map(MarketError::Node),
                        mutator: None,
                    };
                    // the callback may fire from any task; hop onto the
                    // runtime to respect channel backpressure
                    tokio::spawn(async move {
                        let _ = tx.send(update).await;
                    });
                }),
            )
            .await?;
        Ok(None)
    }

    /// Complete: resolve the piece's location within its sector and index
    /// it for retrieval.
    pub(crate) async fn complete(&self, deal: MinerDeal) -> Result<Option<DealMutator>> {
        let deal_id = deal
            .deal_id
            .ok_or_else(|| MarketError::InacceptableDealState("complete deal has no id".into()))?;
        let (sector_id, offset, length) = self
            .spn
            .locate_piece_for_deal_within_sector(deal_id)
            .await?;
        self.piece_store
            .add_deal_for_piece(
                deal.proposal.piece_ref,
                DealInfo {
                    deal_id,
                    sector_id,
                    offset,
                    length,
                },
            )
            .await?;
        Ok(None)
    }
}
