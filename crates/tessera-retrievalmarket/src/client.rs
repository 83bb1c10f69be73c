//! The retrieval client: proposes a deal, sets up a payment channel, then
//! pulls the payload block by block, paying as intervals elapse.

use crate::blockio::SelectorVerifier;
use crate::discovery::Local;
use crate::error::{RetrievalError, Result};
use crate::network::{RetrievalDealStream, RetrievalMarketNetwork};
use crate::node::RetrievalClientNode;
use crate::types::{
    ClientDealState, ClientEvent, DealId, DealProposal, DealStatus, Params, Query, QueryResponse,
    RetrievalPeer,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tessera_store::Blockstore;
use tessera_types::{Address, Cid, PeerId, TokenAmount};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub type ClientSubscriber = Arc<dyn Fn(ClientEvent, ClientDealState) + Send + Sync>;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ClientSubscription(u64);

pub struct RetrievalClient {
    network: Arc<dyn RetrievalMarketNetwork>,
    pub(crate) bs: Arc<dyn Blockstore>,
    pub(crate) node: Arc<dyn RetrievalClientNode>,
    resolver: Arc<Local>,
    next_deal_id: AtomicU64,
    deals: RwLock<HashMap<DealId, ClientDealState>>,
    subscribers: RwLock<HashMap<u64, ClientSubscriber>>,
    next_subscription: AtomicU64,
    pub(crate) cancel: CancellationToken,
}

impl RetrievalClient {
    pub fn new(
        network: Arc<dyn RetrievalMarketNetwork>,
        bs: Arc<dyn Blockstore>,
        node: Arc<dyn RetrievalClientNode>,
        resolver: Arc<Local>,
    ) -> Arc<Self> {
        Arc::new(Self {
            network,
            bs,
            node,
            resolver,
            next_deal_id: AtomicU64::new(0),
            deals: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(HashMap::new()),
            next_subscription: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        })
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Providers known (via discovery) to hold `payload_cid`.
    pub async fn find_providers(&self, payload_cid: &Cid) -> Vec<RetrievalPeer> {
        match self.resolver.get_peers(payload_cid).await {
            Ok(peers) => peers,
            Err(e) => {
                error!(payload = %payload_cid, error = %e, "peer resolution failed");
                Vec::new()
            }
        }
    }

    /// Ask a provider about availability and pricing for a payload.
    pub async fn query(&self, peer: RetrievalPeer, payload_cid: Cid) -> Result<QueryResponse> {
        let stream = self.network.new_query_stream(peer.id).await?;
        let result = async {
            stream.write_query(Query { payload_cid }).await?;
            stream.read_query_response().await
        }
        .await;
        let _ = stream.close().await;
        result
    }

    /// Start retrieving `payload_cid` from `miner`. The deal runs on its
    /// own task; progress arrives through subscribers.
    pub async fn retrieve(
        self: &Arc<Self>,
        payload_cid: Cid,
        params: Params,
        total_funds: TokenAmount,
        miner: PeerId,
        client_wallet: Address,
        miner_wallet: Address,
    ) -> DealId {
        let id = self.next_deal_id.fetch_add(1, Ordering::SeqCst) + 1;
        let deal = ClientDealState::new(
            DealProposal {
                payload_cid,
                id,
                params,
            },
            total_funds,
            client_wallet,
            miner_wallet,
            miner,
        );

        let this = self.clone();
        tokio::spawn(async move {
            this.handle_deal(deal).await;
        });
        id
    }

    pub async fn deal_state(&self, id: DealId) -> Option<ClientDealState> {
        self.deals.read().await.get(&id).cloned()
    }

    pub async fn list_deals(&self) -> Vec<ClientDealState> {
        self.deals.read().await.values().cloned().collect()
    }

    pub async fn subscribe(&self, subscriber: ClientSubscriber) -> ClientSubscription {
        let token = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.subscribers.write().await.insert(token, subscriber);
        ClientSubscription(token)
    }

    pub async fn unsubscribe(&self, subscription: ClientSubscription) {
        self.subscribers.write().await.remove(&subscription.0);
    }

    async fn notify(&self, event: ClientEvent, deal: ClientDealState) {
        for subscriber in self.subscribers.read().await.values() {
            subscriber(event, deal.clone());
        }
    }

    async fn record(&self, deal: &ClientDealState) {
        self.deals
            .write()
            .await
            .insert(deal.proposal.id, deal.clone());
    }

    async fn fail_deal(&self, deal: &mut ClientDealState, err: RetrievalError) {
        warn!(deal = deal.proposal.id, error = %err, "retrieval deal failed");
        deal.message = err.to_string();
        deal.status = DealStatus::Failed;
        self.record(deal).await;
        self.notify(ClientEvent::Error, deal.clone()).await;
    }

    async fn handle_deal(self: Arc<Self>, mut deal: ClientDealState) {
        self.record(&deal).await;
        self.notify(ClientEvent::Open, deal.clone()).await;

        let stream = match self.network.new_deal_stream(deal.sender).await {
            Ok(stream) => stream,
            Err(e) => {
                self.fail_deal(&mut deal, e).await;
                return;
            }
        };

        let mut verifier = SelectorVerifier::with_cancel(
            deal.proposal.payload_cid,
            self.cancel.child_token(),
        );

        loop {
            if self.cancel.is_cancelled() {
                self.fail_deal(&mut deal, RetrievalError::Cancelled).await;
                let _ = stream.close().await;
                return;
            }

            let step = match deal.status {
                DealStatus::New => self.propose_deal(&mut deal, stream.as_ref()).await,
                DealStatus::Accepted => self.setup_payment_channel(&mut deal).await,
                DealStatus::PaymentChannelCreated
                | DealStatus::Ongoing
                | DealStatus::FundsNeeded
                | DealStatus::FundsNeededLastPayment => {
                    self.process_next_response(&mut deal, stream.as_ref(), &mut verifier)
                        .await
                }
                other => Err(RetrievalError::UnexpectedDealState(other.to_string())),
            };

            if let Err(e) = step {
                self.fail_deal(&mut deal, e).await;
                let _ = stream.close().await;
                return;
            }

            self.record(&deal).await;
            if deal.status.is_terminal() {
                break;
            }
            self.notify(ClientEvent::Progress, deal.clone()).await;
        }

        let _ = stream.close().await;
        if deal.status.is_terminal_success() {
            info!(
                deal = deal.proposal.id,
                received = deal.total_received,
                spent = %deal.funds_spent,
                "retrieval complete"
            );
            self.notify(ClientEvent::Complete, deal).await;
        } else {
            self.notify(ClientEvent::Error, deal).await;
        }
    }
}
