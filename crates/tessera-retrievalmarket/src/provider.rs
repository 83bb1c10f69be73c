//! The retrieval provider: answers availability queries and serves deals
//! block by block, pausing for payment whenever the current interval is
//! exhausted.

use crate::blockio::SelectorBlockReader;
use crate::error::{RetrievalError, Result};
use crate::network::{
    RetrievalDealStream, RetrievalMarketNetwork, RetrievalQueryStream, RetrievalReceiver,
};
use crate::node::RetrievalProviderNode;
use crate::types::{
    DealId, ProviderDealState, ProviderEvent, Query, QueryResponse, QueryResponseStatus,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tessera_store::StoreError;
use tessera_types::{Address, TokenAmount};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub type ProviderSubscriber = Arc<dyn Fn(ProviderEvent, ProviderDealState) + Send + Sync>;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ProviderSubscription(u64);

#[derive(Clone, Debug)]
pub struct RetrievalProviderConfig {
    pub price_per_byte: TokenAmount,
    pub payment_interval: u64,
    pub payment_interval_increase: u64,
}

impl Default for RetrievalProviderConfig {
    fn default() -> Self {
        Self {
            price_per_byte: TokenAmount::from_base_units(2),
            payment_interval: 1 << 20,
            payment_interval_increase: 1 << 20,
        }
    }
}

pub struct RetrievalProvider {
    pub(crate) node: Arc<dyn RetrievalProviderNode>,
    network: Arc<dyn RetrievalMarketNetwork>,
    payment_address: Address,
    pub(crate) price_per_byte: RwLock<TokenAmount>,
    /// (interval, increase)
    pub(crate) payment_interval: RwLock<(u64, u64)>,
    deals: RwLock<HashMap<DealId, ProviderDealState>>,
    subscribers: RwLock<HashMap<u64, ProviderSubscriber>>,
    next_subscription: AtomicU64,
    pub(crate) cancel: CancellationToken,
}

impl RetrievalProvider {
    pub fn new(
        config: RetrievalProviderConfig,
        payment_address: Address,
        node: Arc<dyn RetrievalProviderNode>,
        network: Arc<dyn RetrievalMarketNetwork>,
    ) -> Arc<Self> {
        Arc::new(Self {
            node,
            network,
            payment_address,
            price_per_byte: RwLock::new(config.price_per_byte),
            payment_interval: RwLock::new((
                config.payment_interval,
                config.payment_interval_increase,
            )),
            deals: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(HashMap::new()),
            next_subscription: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        })
    }

    /// Begin listening for query and deal streams.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.network
            .set_delegate(self.clone() as Arc<dyn RetrievalReceiver>)
            .await
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub async fn set_price_per_byte(&self, price: TokenAmount) {
        *self.price_per_byte.write().await = price;
    }

    /// Maximum bytes sent before requesting further payment, and how much
    /// that allowance grows after each payment.
    pub async fn set_payment_interval(&self, interval: u64, increase: u64) {
        *self.payment_interval.write().await = (interval, increase);
    }

    pub async fn deal_state(&self, id: DealId) -> Option<ProviderDealState> {
        self.deals.read().await.get(&id).cloned()
    }

    pub async fn list_deals(&self) -> Vec<ProviderDealState> {
        self.deals.read().await.values().cloned().collect()
    }

    pub async fn subscribe(&self, subscriber: ProviderSubscriber) -> ProviderSubscription {
        let token = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.subscribers.write().await.insert(token, subscriber);
        ProviderSubscription(token)
    }

    pub async fn unsubscribe(&self, subscription: ProviderSubscription) {
        self.subscribers.write().await.remove(&subscription.0);
    }

    pub(crate) async fn notify(&self, event: ProviderEvent, deal: ProviderDealState) {
        for subscriber in self.subscribers.read().await.values() {
            subscriber(event, deal.clone());
        }
    }

    pub(crate) async fn record(&self, deal: &ProviderDealState) {
        self.deals
            .write()
            .await
            .insert(deal.proposal.id, deal.clone());
    }

    async fn fail_deal(&self, deal: &mut ProviderDealState, err: RetrievalError) {
        warn!(deal = deal.proposal.id, error = %err, "retrieval deal failed");
        deal.message = err.to_string();
        deal.status = crate::types::DealStatus::Failed;
        self.record(deal).await;
        self.notify(ProviderEvent::Error, deal.clone()).await;
    }

    async fn handle_deal(&self, stream: Arc<dyn RetrievalDealStream>) {
        let proposal = match stream.read_proposal().await {
            Ok(proposal) => proposal,
            Err(e) => {
                warn!(error = %e, "failed to read retrieval proposal");
                let _ = stream.close().await;
                return;
            }
        };

        let mut deal = ProviderDealState::new(proposal, stream.remote_peer());
        // the reader exists before the first state handler runs, so block
        // serving can never observe an uninitialized reader
        let mut reader = SelectorBlockReader::new(
            deal.proposal.payload_cid,
            self.node.sealed_blockstore(),
            self.cancel.child_token(),
        );

        self.record(&deal).await;
        self.notify(ProviderEvent::Open, deal.clone()).await;

        loop {
            if self.cancel.is_cancelled() {
                self.fail_deal(&mut deal, RetrievalError::Cancelled).await;
                let _ = stream.close().await;
                return;
            }

            let step = match deal.status {
                crate::types::DealStatus::New => {
                    self.receive_deal(&mut deal, stream.as_ref()).await
                }
                crate::types::DealStatus::Accepted | crate::types::DealStatus::Ongoing => {
                    self.send_blocks(&mut deal, stream.as_ref(), &mut reader).await
                }
                crate::types::DealStatus::FundsNeeded
                | crate::types::DealStatus::FundsNeededLastPayment => {
                    self.process_payment(&mut deal, stream.as_ref()).await
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
            self.notify(ProviderEvent::Progress, deal.clone()).await;
        }

        let _ = stream.close().await;
        if deal.status.is_terminal_success() {
            info!(
                deal = deal.proposal.id,
                sent = deal.total_sent,
                received = %deal.funds_received,
                "retrieval served"
            );
            self.notify(ProviderEvent::Complete, deal).await;
        } else {
            self.notify(ProviderEvent::Error, deal).await;
        }
    }
}

#[async_trait]
impl RetrievalReceiver for RetrievalProvider {
    async fn handle_query_stream(&self, stream: Arc<dyn RetrievalQueryStream>) {
        let query: Query = match stream.read_query().await {
            Ok(query) => query,
            Err(_) => {
                let _ = stream.close().await;
                return;
            }
        };

        let (interval, increase) = *self.payment_interval.read().await;
        let mut answer = QueryResponse {
            status: QueryResponseStatus::Unavailable,
            payment_address: self.payment_address,
            min_price_per_byte: *self.price_per_byte.read().await,
            max_payment_interval: interval,
            max_payment_interval_increase: increase,
            size: None,
            message: None,
        };

        match self.node.get_piece_size(&query.payload_cid).await {
            Ok(size) => {
                answer.status = QueryResponseStatus::Available;
                answer.size = Some(size);
            }
            Err(RetrievalError::NotFound)
            | Err(RetrievalError::Store(StoreError::NotFound(_))) => {}
            Err(e) => {
                error!(payload = %query.payload_cid, error = %e, "piece lookup failed");
                answer.status = QueryResponseStatus::Error;
                answer.message = Some(e.to_string());
            }
        }

        if let Err(e) = stream.write_query_response(answer).await {
            error!(error = %e, "failed to write query response");
        }
        let _ = stream.close().await;
    }

    async fn handle_deal_stream(&self, stream: Arc<dyn RetrievalDealStream>) {
        // the network dispatches each incoming stream on its own task, so
        // running the deal loop inline serves deals concurrently
        self.handle_deal(stream).await;
    }
}
