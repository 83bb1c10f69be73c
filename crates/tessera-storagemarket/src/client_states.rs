//! Stage handlers for the client deal driver.

use crate::client::{Client, ClientDealMutator, ClientDealUpdate};
use crate::error::{MarketError, Result};
use crate::network::StorageDealStream;
use crate::types::{ClientDeal, DealState};
use std::sync::Arc;
use tracing::info;

impl Client {
    /// Unknown: consume the provider's signed response to the proposal.
    /// Anything but a well-signed acceptance from the right peer for the
    /// right proposal fails the deal.
    pub(crate) async fn new_deal(
        &self,
        deal: ClientDeal,
        stream: Option<Arc<dyn StorageDealStream>>,
    ) -> Result<Option<ClientDealMutator>> {
        let stream =
            stream.ok_or_else(|| MarketError::NotConnected(deal.proposal_cid.to_string()))?;

        if stream.remote_peer() != deal.miner {
            return Err(MarketError::WrongPeer {
                expected: deal.miner.to_string(),
                actual: stream.remote_peer().to_string(),
            });
        }

        let signed = stream.read_response().await?;
        if signed.response.proposal != deal.proposal_cid {
            return Err(MarketError::InvalidResponse(format!(
                "response for wrong proposal: {}",
                signed.response.proposal
            )));
        }
        signed.verify(&deal.miner_worker)?;

        match signed.response.state {
            DealState::Accepted => {
                let publish_message = signed.response.publish_message.ok_or_else(|| {
                    MarketError::InvalidResponse("acceptance carries no publish message".into())
                })?;
                info!(
                    proposal = %deal.proposal_cid,
                    publish_message = %publish_message,
                    "deal accepted"
                );
                Ok(Some(Box::new(move |d: &mut ClientDeal| {
                    d.publish_message = Some(publish_message);
                })))
            }
            DealState::Failed => Err(MarketError::InvalidResponse(format!(
                "deal failed: {}",
                signed.response.message.unwrap_or_default()
            ))),
            other => Err(MarketError::InvalidResponse(format!(
                "unexpected response state: {}",
                other
            ))),
        }
    }

    /// Accepted: check the publish message landed on chain and pick up
    /// the allocated deal id.
    pub(crate) async fn accepted(&self, deal: ClientDeal) -> Result<Option<ClientDealMutator>> {
        let deal_id = self.node.validate_published_deal(&deal).await?;
        info!(proposal = %deal.proposal_cid, deal_id, "deal published on chain");
        Ok(Some(Box::new(move |d: &mut ClientDeal| {
            d.deal_id = Some(deal_id);
        })))
    }

    /// Staged: wait for the piece to land in a sector.
    pub(crate) async fn staged(&self, deal: ClientDeal) -> Result<Option<ClientDealMutator>> {
        let deal_id = deal
            .deal_id
            .ok_or_else(|| MarketError::InacceptableDealState("staged deal has no id".into()))?;
        let sector_id = self.node.await_deal_sector(deal_id).await?;
        Ok(Some(Box::new(move |d: &mut ClientDeal| {
            d.sector_id = Some(sector_id);
        })))
    }

    /// Sealing: register for the commit callback, which posts Complete.
    pub(crate) async fn sealing(&self, deal: ClientDeal) -> Result<Option<ClientDealMutator>> {
        let deal_id = deal
            .deal_id
            .ok_or_else(|| MarketError::InacceptableDealState("sealing deal has no id".into()))?;

        let tx = self.updated_tx.clone();
        let id = deal.proposal_cid;
        self.node
            .on_deal_sector_committed(
                deal.proposal.provider,
                deal_id,
                Box::new(move |result| {
                    let update = ClientDealUpdate {
                        new_state: DealState::Complete,
                        id,
                        err: result.err().map(MarketError::Node),
                        mutator: None,
                    };
                    tokio::spawn(async move {
                        let _ = tx.send(update).await;
                    });
                }),
            )
            .await?;
        Ok(None)
    }
}
