//! The storage provider deal driver.
//!
//! A single updater task owns the deal map and the client connection map;
//! stage handlers run on their own tasks and communicate exclusively by
//! posting [`MinerDealUpdate`]s to a bounded channel. Data-transfer
//! completion arrives the same way, translated from manager events.

use crate::datatransfer::{DataTransfer, TransferEvent, TransferEventKind};
use crate::error::{MarketError, Result};
use crate::network::{AskStream, StorageDealStream, StorageMarketNetwork, StorageReceiver};
use crate::node::StorageProviderNode;
use crate::piecestore::PieceStore;
use crate::types::{
    AskResponse, DealState, MinerDeal, Proposal, Response, SignedResponse, SignedStorageAsk,
    StorageAsk,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tessera_filestore::FileStore;
use tessera_pieceio::PieceIO;
use tessera_store::StateStore;
use tessera_types::{Address, Cid, TokenAmount};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Capacity of the incoming-deal and update channels. Producers block
/// when full, which rate-limits acceptance.
const CHANNEL_CAPACITY: usize = 16;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProviderEvent {
    Open,
    Progress,
    Error,
    Complete,
}

pub type ProviderSubscriber = Arc<dyn Fn(ProviderEvent, MinerDeal) + Send + Sync>;

/// Token returned at subscribe time; unsubscribing by token is idempotent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Subscription(u64);

pub type DealMutator = Box<dyn FnOnce(&mut MinerDeal) + Send>;

/// A stage result posted to the updater.
pub struct MinerDealUpdate {
    pub new_state: DealState,
    pub id: Cid,
    pub err: Option<MarketError>,
    pub mutator: Option<DealMutator>,
}

struct IncomingDeal {
    deal: MinerDeal,
    stream: Arc<dyn StorageDealStream>,
}

#[derive(Clone, Debug)]
pub struct ProviderConfig {
    /// Ask price per GiB per epoch
    pub price: TokenAmount,
    pub min_piece_size: u64,
    /// Epochs the published ask stays valid
    pub ask_duration: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            price: TokenAmount::from_base_units(500),
            min_piece_size: 127,
            ask_duration: 10_000,
        }
    }
}

pub struct Provider {
    pub(crate) actor: Address,
    pub(crate) ask: RwLock<SignedStorageAsk>,
    pub(crate) spn: Arc<dyn StorageProviderNode>,
    pub(crate) pio: Arc<PieceIO>,
    pub(crate) fs: Arc<FileStore>,
    pub(crate) piece_store: Arc<PieceStore>,
    pub(crate) data_transfer: Arc<dyn DataTransfer>,
    network: Arc<dyn StorageMarketNetwork>,
    pub(crate) deals: StateStore<MinerDeal>,
    incoming_tx: mpsc::Sender<IncomingDeal>,
    incoming_rx: Mutex<Option<mpsc::Receiver<IncomingDeal>>>,
    pub(crate) updated_tx: mpsc::Sender<MinerDealUpdate>,
    updated_rx: Mutex<Option<mpsc::Receiver<MinerDealUpdate>>>,
    subscribers: RwLock<HashMap<u64, ProviderSubscriber>>,
    next_subscription: AtomicU64,
    cancel: CancellationToken,
}

impl Provider {
    pub async fn new(
        config: ProviderConfig,
        actor: Address,
        spn: Arc<dyn StorageProviderNode>,
        pio: Arc<PieceIO>,
        fs: Arc<FileStore>,
        piece_store: Arc<PieceStore>,
        data_transfer: Arc<dyn DataTransfer>,
        network: Arc<dyn StorageMarketNetwork>,
        deals: StateStore<MinerDeal>,
    ) -> Result<Arc<Self>> {
        let head = spn.most_recent_state_id().await?;
        let ask = StorageAsk {
            price: config.price,
            min_piece_size: config.min_piece_size,
            miner: actor,
            timestamp: chrono::Utc::now().timestamp(),
            expiry: head.height() + config.ask_duration,
            seq_no: 0,
        };
        let bytes = tessera_types::to_canonical_json(&ask)?.into_bytes();
        let (signer, signature) = spn.sign_bytes(actor, &bytes).await?;

        let (incoming_tx, incoming_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (updated_tx, updated_rx) = mpsc::channel(CHANNEL_CAPACITY);

        Ok(Arc::new(Self {
            actor,
            ask: RwLock::new(SignedStorageAsk {
                ask,
                signer,
                signature,
            }),
            spn,
            pio,
            fs,
            piece_store,
            data_transfer,
            network,
            deals,
            incoming_tx,
            incoming_rx: Mutex::new(Some(incoming_rx)),
            updated_tx,
            updated_rx: Mutex::new(Some(updated_rx)),
            subscribers: RwLock::new(HashMap::new()),
            next_subscription: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        }))
    }

    /// Register with the network and start the updater and transfer-event
    /// tasks.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.network
            .set_delegate(self.clone() as Arc<dyn StorageReceiver>)
            .await?;

        let incoming_rx = self
            .incoming_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| MarketError::Network("provider already started".into()))?;
        let updated_rx = self
            .updated_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| MarketError::Network("provider already started".into()))?;

        let this = self.clone();
        tokio::spawn(async move {
            this.run(incoming_rx, updated_rx).await;
        });

        // subscribe before returning so no completion event can slip past
        let events = self.data_transfer.subscribe();
        let this = self.clone();
        tokio::spawn(async move {
            this.watch_transfers(events).await;
        });
        Ok(())
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub async fn signed_ask(&self) -> SignedStorageAsk {
        self.ask.read().await.clone()
    }

    pub async fn list_deals(&self) -> Result<Vec<MinerDeal>> {
        Ok(self.deals.list().await?)
    }

    pub async fn subscribe(&self, subscriber: ProviderSubscriber) -> Subscription {
        let token = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.subscribers.write().await.insert(token, subscriber);
        Subscription(token)
    }

    pub async fn unsubscribe(&self, subscription: Subscription) {
        self.subscribers.write().await.remove(&subscription.0);
    }

    pub(crate) async fn notify(&self, event: ProviderEvent, deal: MinerDeal) {
        for subscriber in self.subscribers.read().await.values() {
            subscriber(event, deal.clone());
        }
    }

    /// The updater: sole writer of deal records and sole owner of the
    /// client stream map.
    async fn run(
        self: Arc<Self>,
        mut incoming_rx: mpsc::Receiver<IncomingDeal>,
        mut updated_rx: mpsc::Receiver<MinerDealUpdate>,
    ) {
        let mut conns: HashMap<Cid, Arc<dyn StorageDealStream>> = HashMap::new();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.shutdown(&mut conns, &mut updated_rx).await;
                    return;
                }
                Some(incoming) = incoming_rx.recv() => {
                    self.on_incoming(&mut conns, incoming).await;
                }
                Some(update) = updated_rx.recv() => {
                    self.on_updated(&mut conns, update).await;
                }
            }
        }
    }

    async fn on_incoming(
        self: &Arc<Self>,
        conns: &mut HashMap<Cid, Arc<dyn StorageDealStream>>,
        incoming: IncomingDeal,
    ) {
        let id = incoming.deal.proposal_cid;
        info!(proposal = %id, client = %incoming.deal.client, "incoming storage deal");

        if conns.contains_key(&id) {
            error!(proposal = %id, "already tracking a connection for this deal");
            return;
        }
        conns.insert(id, incoming.stream);

        if let Err(e) = self.deals.begin(id, &incoming.deal).await {
            // the client may have re-sent the proposal
            error!(proposal = %id, error = %e, "deal tracking failed");
            self.fail_deal(conns, id, e.into()).await;
            return;
        }
        self.notify(ProviderEvent::Open, incoming.deal).await;

        let tx = self.updated_tx.clone();
        tokio::spawn(async move {
            let _ = tx
                .send(MinerDealUpdate {
                    new_state: DealState::Validating,
                    id,
                    err: None,
                    mutator: None,
                })
                .await;
        });
    }

    async fn on_updated(
        self: &Arc<Self>,
        conns: &mut HashMap<Cid, Arc<dyn StorageDealStream>>,
        update: MinerDealUpdate,
    ) {
        debug!(proposal = %update.id, state = %update.new_state, "provider deal update");
        if let Some(err) = update.err {
            self.fail_deal(conns, update.id, err).await;
            return;
        }

        let mutator = update.mutator;
        let new_state = update.new_state;
        let deal = match self
            .deals
            .get(update.id)
            .mutate(move |d| {
                d.state = new_state;
                if let Some(mutator) = mutator {
                    mutator(d);
                }
            })
            .await
        {
            Ok(deal) => deal,
            Err(e) => {
                self.fail_deal(conns, update.id, e.into()).await;
                return;
            }
        };
        self.notify(ProviderEvent::Progress, deal.clone()).await;

        match new_state {
            DealState::Validating => {
                self.spawn_stage(deal, None, DealState::Transferring);
            }
            DealState::Transferring => {
                // completion is event-driven via the transfer manager
                self.spawn_stage(deal, None, DealState::NoUpdate);
            }
            DealState::VerifyData => {
                self.spawn_stage(deal, None, DealState::Publishing);
            }
            DealState::Publishing => {
                let stream = conns.get(&update.id).cloned();
                self.spawn_stage(deal, stream, DealState::Staged);
            }
            DealState::Staged => {
                // the client stream was closed when the deal published
                conns.remove(&update.id);
                self.spawn_stage(deal, None, DealState::Sealing);
            }
            DealState::Sealing => {
                self.spawn_stage(deal, None, DealState::NoUpdate);
            }
            DealState::Complete => {
                self.spawn_stage(deal.clone(), None, DealState::NoUpdate);
                self.notify(ProviderEvent::Complete, deal).await;
            }
            other => {
                warn!(proposal = %update.id, state = %other, "no handler for state");
            }
        }
    }

    /// Run the handler for `deal.state` on its own task and post the
    /// result. A clean handler result with `next == NoUpdate` posts
    /// nothing; the next transition arrives from elsewhere (transfer
    /// events, commit callbacks).
    fn spawn_stage(
        self: &Arc<Self>,
        deal: MinerDeal,
        stream: Option<Arc<dyn StorageDealStream>>,
        next: DealState,
    ) {
        let this = self.clone();
        tokio::spawn(async move {
            let id = deal.proposal_cid;
            let state = deal.state;
            let result = this.run_stage(deal, stream).await;

            let update = match result {
                Ok(_) if next == DealState::NoUpdate => return,
                Ok(mutator) => MinerDealUpdate {
                    new_state: next,
                    id,
                    err: None,
                    mutator,
                },
                Err(e) => {
                    warn!(proposal = %id, state = %state, error = %e, "stage handler failed");
                    MinerDealUpdate {
                        new_state: next,
                        id,
                        err: Some(e),
                        mutator: None,
                    }
                }
            };
            tokio::select! {
                _ = this.cancel.cancelled() => {}
                _ = this.updated_tx.send(update) => {}
            }
        });
    }

    async fn run_stage(
        self: &Arc<Self>,
        deal: MinerDeal,
        stream: Option<Arc<dyn StorageDealStream>>,
    ) -> Result<Option<DealMutator>> {
        match deal.state {
            DealState::Validating => self.validating(deal).await,
            DealState::Transferring => self.transferring(deal).await,
            DealState::VerifyData => self.verifydata(deal).await,
            DealState::Publishing => self.publishing(deal, stream).await,
            DealState::Staged => self.staged(deal).await,
            DealState::Sealing => self.sealing(deal).await,
            DealState::Complete => self.complete(deal).await,
            other => Err(MarketError::InacceptableDealState(other.to_string())),
        }
    }

    /// Translate transfer-manager events into deal updates.
    async fn watch_transfers(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<TransferEvent>,
    ) {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => return,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => return,
                },
            };
            let update = match event.kind {
                TransferEventKind::Completed => MinerDealUpdate {
                    new_state: DealState::VerifyData,
                    id: event.voucher.proposal,
                    err: None,
                    mutator: None,
                },
                TransferEventKind::Error(msg) => MinerDealUpdate {
                    new_state: DealState::Failed,
                    id: event.voucher.proposal,
                    err: Some(MarketError::Network(msg)),
                    mutator: None,
                },
            };
            if self.updated_tx.send(update).await.is_err() {
                return;
            }
        }
    }

    pub(crate) async fn fail_deal(
        &self,
        conns: &mut HashMap<Cid, Arc<dyn StorageDealStream>>,
        id: Cid,
        err: MarketError,
    ) {
        warn!(proposal = %id, error = %err, "storage deal failed");

        let message = err.to_string();
        let deal = self
            .deals
            .get(id)
            .mutate(|d| {
                d.state = DealState::Failed;
                d.message = message;
            })
            .await;

        let response = Response {
            state: DealState::Failed,
            message: Some(err.to_string()),
            proposal: id,
            publish_message: None,
        };
        if let Err(e) = self.send_signed_response(conns, response).await {
            warn!(proposal = %id, error = %e, "notifying client about deal failure");
        }
        if let Some(stream) = conns.remove(&id) {
            let _ = stream.close().await;
        }

        if let Ok(deal) = deal {
            self.notify(ProviderEvent::Error, deal).await;
        }
    }

    /// Sign a response with the miner worker key and send it over the
    /// deal's stream. Dropped connections are pruned from the map.
    pub(crate) async fn send_signed_response(
        &self,
        conns: &mut HashMap<Cid, Arc<dyn StorageDealStream>>,
        response: Response,
    ) -> Result<()> {
        let stream = conns
            .get(&response.proposal)
            .cloned()
            .ok_or_else(|| MarketError::NotConnected(response.proposal.to_string()))?;

        let signed = self.sign_response(response.clone()).await?;
        if let Err(e) = stream.write_response(signed).await {
            // assume the client disconnected
            let _ = stream.close().await;
            conns.remove(&response.proposal);
            return Err(e);
        }
        Ok(())
    }

    pub(crate) async fn sign_response(&self, response: Response) -> Result<SignedResponse> {
        let bytes = tessera_types::to_canonical_json(&response)?.into_bytes();
        let worker = self.spn.get_miner_worker(self.actor).await?;
        let (signer, signature) = self.spn.sign_bytes(worker, &bytes).await?;
        Ok(SignedResponse {
            response,
            signer,
            signature,
        })
    }

    /// Drain queued updates, then fail every live deal with a cancelled
    /// marker and close its stream.
    async fn shutdown(
        &self,
        conns: &mut HashMap<Cid, Arc<dyn StorageDealStream>>,
        updated_rx: &mut mpsc::Receiver<MinerDealUpdate>,
    ) {
        while let Ok(update) = updated_rx.try_recv() {
            let new_state = update.new_state;
            let mutator = update.mutator;
            let _ = self
                .deals
                .get(update.id)
                .mutate(move |d| {
                    d.state = new_state;
                    if let Some(mutator) = mutator {
                        mutator(d);
                    }
                })
                .await;
        }

        let ids: Vec<Cid> = conns.keys().copied().collect();
        for id in ids {
            self.fail_deal(conns, id, MarketError::Cancelled).await;
        }
        info!("storage provider stopped");
    }
}

#[async_trait]
impl StorageReceiver for Provider {
    async fn handle_deal_stream(&self, stream: Arc<dyn StorageDealStream>) {
        let proposal = match self.read_proposal(stream.as_ref()).await {
            Ok(proposal) => proposal,
            Err(e) => {
                warn!(error = %e, "rejected incoming proposal");
                let _ = stream.close().await;
                return;
            }
        };
        let proposal_cid = match proposal.deal_proposal.cid() {
            Ok(cid) => cid,
            Err(e) => {
                warn!(error = %e, "unhashable proposal");
                let _ = stream.close().await;
                return;
            }
        };

        let deal = MinerDeal {
            proposal_cid,
            proposal: proposal.deal_proposal,
            state: DealState::Unknown,
            client: stream.remote_peer(),
            payload_cid: proposal.piece,
            piece_path: None,
            sector_id: None,
            deal_id: None,
            message: String::new(),
        };

        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = self.incoming_tx.send(IncomingDeal { deal, stream }) => {}
        }
    }

    async fn handle_ask_stream(&self, stream: Arc<dyn AskStream>) {
        let response = match stream.read_ask_request().await {
            Ok(request) if request.miner == self.actor => AskResponse {
                ask: Some(self.ask.read().await.clone()),
            },
            Ok(request) => {
                debug!(miner = %request.miner, "ask request for a different miner");
                AskResponse { ask: None }
            }
            Err(e) => {
                warn!(error = %e, "failed to read ask request");
                let _ = stream.close().await;
                return;
            }
        };
        if let Err(e) = stream.write_ask_response(response).await {
            warn!(error = %e, "failed to write ask response");
        }
        let _ = stream.close().await;
    }
}

impl Provider {
    /// Read and pre-validate an incoming proposal: signature present and
    /// valid, and addressed to this provider.
    async fn read_proposal(&self, stream: &dyn StorageDealStream) -> Result<Proposal> {
        let proposal = stream.read_proposal().await?;
        if proposal.deal_proposal.proposer_signature.is_none() {
            return Err(MarketError::InvalidProposal(
                "incoming deal proposal has no signature".into(),
            ));
        }
        proposal.deal_proposal.verify()?;
        if proposal.deal_proposal.provider != self.actor {
            return Err(MarketError::InvalidProposal(format!(
                "proposal with wrong provider address: {}",
                proposal.deal_proposal.provider
            )));
        }
        Ok(proposal)
    }
}
