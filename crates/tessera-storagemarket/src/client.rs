//! The storage client deal driver.
//!
//! Mirrors the provider's architecture: one updater task owning the deal
//! map and stream map, stage handlers on their own tasks posting updates
//! to a bounded channel.

use crate::error::{MarketError, Result};
use crate::network::{StorageDealStream, StorageMarketNetwork};
use crate::node::StorageClientNode;
use crate::types::{
    AskRequest, ClientDeal, DealState, Proposal, SignedStorageAsk, StorageDealProposal,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tessera_filestore::FileStore;
use tessera_pieceio::{PieceFile, PieceIO};
use tessera_retrievalmarket::discovery::Local;
use tessera_retrievalmarket::types::RetrievalPeer;
use tessera_store::StateStore;
use tessera_types::{Address, Cid, PeerId, PublicKey, Selector, TokenAmount};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const CHANNEL_CAPACITY: usize = 16;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ClientEvent {
    Open,
    Progress,
    Error,
    Complete,
}

pub type ClientSubscriber = Arc<dyn Fn(ClientEvent, ClientDeal) + Send + Sync>;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ClientSubscription(u64);

pub type ClientDealMutator = Box<dyn FnOnce(&mut ClientDeal) + Send>;

pub struct ClientDealUpdate {
    pub new_state: DealState,
    pub id: Cid,
    pub err: Option<MarketError>,
    pub mutator: Option<ClientDealMutator>,
}

struct IncomingDeal {
    deal: ClientDeal,
    stream: Arc<dyn StorageDealStream>,
}

/// Everything needed to start a storage deal.
#[derive(Clone, Debug)]
pub struct ClientDealParams {
    /// Root of the payload DAG to store
    pub data: Cid,
    pub price_per_epoch: TokenAmount,
    pub proposal_expiration: u64,
    pub duration: u64,
    pub provider_address: Address,
    pub client: Address,
    pub miner_worker: Address,
    pub miner_id: PeerId,
}

pub struct Client {
    network: Arc<dyn StorageMarketNetwork>,
    pub(crate) fs: Arc<FileStore>,
    pub(crate) pio: Arc<PieceIO>,
    discovery: Arc<Local>,
    pub(crate) node: Arc<dyn StorageClientNode>,
    pub(crate) deals: StateStore<ClientDeal>,
    incoming_tx: mpsc::Sender<IncomingDeal>,
    incoming_rx: Mutex<Option<mpsc::Receiver<IncomingDeal>>>,
    pub(crate) updated_tx: mpsc::Sender<ClientDealUpdate>,
    updated_rx: Mutex<Option<mpsc::Receiver<ClientDealUpdate>>>,
    subscribers: RwLock<HashMap<u64, ClientSubscriber>>,
    next_subscription: AtomicU64,
    pub(crate) cancel: CancellationToken,
}

impl Client {
    pub fn new(
        network: Arc<dyn StorageMarketNetwork>,
        fs: Arc<FileStore>,
        pio: Arc<PieceIO>,
        discovery: Arc<Local>,
        node: Arc<dyn StorageClientNode>,
        deals: StateStore<ClientDeal>,
    ) -> Arc<Self> {
        let (incoming_tx, incoming_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (updated_tx, updated_rx) = mpsc::channel(CHANNEL_CAPACITY);
        Arc::new(Self {
            network,
            fs,
            pio,
            discovery,
            node,
            deals,
            incoming_tx,
            incoming_rx: Mutex::new(Some(incoming_rx)),
            updated_tx,
            updated_rx: Mutex::new(Some(updated_rx)),
            subscribers: RwLock::new(HashMap::new()),
            next_subscription: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        })
    }

    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let incoming_rx = self
            .incoming_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| MarketError::Network("client already started".into()))?;
        let updated_rx = self
            .updated_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| MarketError::Network("client already started".into()))?;

        let this = self.clone();
        tokio::spawn(async move {
            this.run(incoming_rx, updated_rx).await;
        });
        Ok(())
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub async fn subscribe(&self, subscriber: ClientSubscriber) -> ClientSubscription {
        let token = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.subscribers.write().await.insert(token, subscriber);
        ClientSubscription(token)
    }

    pub async fn unsubscribe(&self, subscription: ClientSubscription) {
        self.subscribers.write().await.remove(&subscription.0);
    }

    pub(crate) async fn notify(&self, event: ClientEvent, deal: ClientDeal) {
        for subscriber in self.subscribers.read().await.values() {
            subscriber(event, deal.clone());
        }
    }

    pub async fn list_deals(&self) -> Result<Vec<ClientDeal>> {
        Ok(self.deals.list().await?)
    }

    pub async fn get_deal(&self, proposal_cid: Cid) -> Result<ClientDeal> {
        Ok(self.deals.get(proposal_cid).fetch().await?)
    }

    /// Compute the piece commitment and padded size for a payload,
    /// deleting the staging file before returning.
    async fn commp(&self, data: Cid) -> Result<([u8; 32], u64)> {
        let (piece_commitment, file) = self
            .pio
            .generate_piece_commitment(data, &Selector::all())
            .await?;
        let size = file.size();
        if let Err(e) = self.fs.delete(file.path()) {
            warn!(path = %file.path().display(), error = %e, "failed to delete staging file");
        }
        Ok((piece_commitment, size?))
    }

    /// Ensure funds, build and sign the proposal, send it to the miner
    /// and begin driving the deal. Returns the proposal CID.
    pub async fn start_deal(self: &Arc<Self>, params: ClientDealParams) -> Result<Cid> {
        let amount = params.price_per_epoch.mul_int(params.duration);
        self.node.ensure_funds(params.client, amount).await?;

        let (piece_commitment, piece_size) = self.commp(params.data).await?;

        let mut proposal = StorageDealProposal {
            piece_ref: piece_commitment,
            piece_size,
            client: params.client,
            client_key: PublicKey::from_bytes([0u8; 32]),
            provider: params.provider_address,
            proposal_expiration: params.proposal_expiration,
            duration: params.duration,
            storage_price_per_epoch: params.price_per_epoch,
            // placeholder until collateral policy lands on chain
            storage_collateral: TokenAmount::from_base_units(piece_size as u128),
            proposer_signature: None,
        };
        self.node.sign_proposal(params.client, &mut proposal).await?;
        let proposal_cid = proposal.cid()?;

        let stream = self.network.new_deal_stream(params.miner_id).await?;
        if let Err(e) = stream
            .write_proposal(Proposal {
                deal_proposal: proposal.clone(),
                piece: params.data,
            })
            .await
        {
            let _ = stream.close().await;
            return Err(e);
        }

        let deal = ClientDeal {
            proposal_cid,
            proposal,
            state: DealState::Unknown,
            miner: params.miner_id,
            miner_worker: params.miner_worker,
            payload_cid: params.data,
            publish_message: None,
            deal_id: None,
            sector_id: None,
            message: String::new(),
        };

        self.incoming_tx
            .send(IncomingDeal { deal, stream })
            .await
            .map_err(|_| MarketError::Cancelled)?;

        self.discovery
            .add_peer(
                params.data,
                RetrievalPeer {
                    address: params.provider_address,
                    id: params.miner_id,
                },
            )
            .await
            .map_err(|e| MarketError::Node(e.to_string()))?;

        Ok(proposal_cid)
    }

    /// Fetch and validate a provider's signed ask.
    pub async fn query_ask(&self, peer: PeerId, miner: Address) -> Result<SignedStorageAsk> {
        let stream = self.network.new_ask_stream(peer).await?;
        stream.write_ask_request(AskRequest { miner }).await?;
        let response = stream.read_ask_response().await?;
        let _ = stream.close().await;

        let ask = response
            .ask
            .ok_or_else(|| MarketError::InvalidAsk("got no ask back".into()))?;
        if ask.ask.miner != miner {
            return Err(MarketError::InvalidAsk(
                "got back ask for wrong miner".into(),
            ));
        }
        ask.verify()?;
        Ok(ask)
    }

    async fn run(
        self: Arc<Self>,
        mut incoming_rx: mpsc::Receiver<IncomingDeal>,
        mut updated_rx: mpsc::Receiver<ClientDealUpdate>,
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
        info!(proposal = %id, "incoming deal");

        if conns.contains_key(&id) {
            error!(proposal = %id, "already tracking connection for deal");
            return;
        }
        conns.insert(id, incoming.stream);

        if let Err(e) = self.deals.begin(id, &incoming.deal).await {
            // we may have re-sent the proposal
            error!(proposal = %id, error = %e, "deal tracking failed");
            self.fail_deal(conns, id, e.into()).await;
            return;
        }
        self.notify(ClientEvent::Open, incoming.deal).await;

        let tx = self.updated_tx.clone();
        tokio::spawn(async move {
            let _ = tx
                .send(ClientDealUpdate {
                    new_state: DealState::Unknown,
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
        update: ClientDealUpdate,
    ) {
        debug!(proposal = %update.id, state = %update.new_state, "client deal update");
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
        self.notify(ClientEvent::Progress, deal.clone()).await;

        match new_state {
            DealState::Unknown => {
                let stream = conns.get(&update.id).cloned();
                self.spawn_stage(deal, stream, DealState::Accepted);
            }
            DealState::Accepted => {
                // the provider closed the stream after publishing
                if let Some(stream) = conns.remove(&update.id) {
                    let _ = stream.close().await;
                }
                self.spawn_stage(deal, None, DealState::Staged);
            }
            DealState::Staged => {
                self.spawn_stage(deal, None, DealState::Sealing);
            }
            DealState::Sealing => {
                self.spawn_stage(deal, None, DealState::NoUpdate);
            }
            DealState::Complete => {
                self.notify(ClientEvent::Complete, deal).await;
            }
            other => {
                warn!(proposal = %update.id, state = %other, "no handler for state");
            }
        }
    }

    fn spawn_stage(
        self: &Arc<Self>,
        deal: ClientDeal,
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
                Ok(mutator) => ClientDealUpdate {
                    new_state: next,
                    id,
                    err: None,
                    mutator,
                },
                Err(e) => {
                    warn!(proposal = %id, state = %state, error = %e, "stage handler failed");
                    ClientDealUpdate {
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
        deal: ClientDeal,
        stream: Option<Arc<dyn StorageDealStream>>,
    ) -> Result<Option<ClientDealMutator>> {
        match deal.state {
            DealState::Unknown => self.new_deal(deal, stream).await,
            DealState::Accepted => self.accepted(deal).await,
            DealState::Staged => self.staged(deal).await,
            DealState::Sealing => self.sealing(deal).await,
            other => Err(MarketError::InacceptableDealState(other.to_string())),
        }
    }

    pub(crate) async fn fail_deal(
        &self,
        conns: &mut HashMap<Cid, Arc<dyn StorageDealStream>>,
        id: Cid,
        err: MarketError,
    ) {
        warn!(proposal = %id, error = %err, "storage deal failed");

        if let Some(stream) = conns.remove(&id) {
            let _ = stream.close().await;
        }
        let message = err.to_string();
        let deal = self
            .deals
            .get(id)
            .mutate(move |d| {
                d.state = DealState::Failed;
                d.message = message;
            })
            .await;
        if let Ok(deal) = deal {
            self.notify(ClientEvent::Error, deal).await;
        }
    }

    async fn shutdown(
        &self,
        conns: &mut HashMap<Cid, Arc<dyn StorageDealStream>>,
        updated_rx: &mut mpsc::Receiver<ClientDealUpdate>,
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
        info!("storage client stopped");
    }
}
