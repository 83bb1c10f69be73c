//! In-memory market networks: typed duplex pipes standing in for libp2p
//! substreams, and a router dispatching new streams to registered
//! delegates.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as SyncMutex;
use tessera_retrievalmarket as rm;
use tessera_storagemarket as sm;
use tessera_types::PeerId;
use tokio::sync::{mpsc, Mutex, RwLock};

/// One end of a bidirectional typed message pipe.
struct Duplex<T> {
    tx: SyncMutex<Option<mpsc::UnboundedSender<T>>>,
    rx: Mutex<mpsc::UnboundedReceiver<T>>,
}

fn duplex_pair<T>() -> (Duplex<T>, Duplex<T>) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        Duplex {
            tx: SyncMutex::new(Some(a_tx)),
            rx: Mutex::new(a_rx),
        },
        Duplex {
            tx: SyncMutex::new(Some(b_tx)),
            rx: Mutex::new(b_rx),
        },
    )
}

impl<T: Send> Duplex<T> {
    fn send(&self, value: T) -> Result<(), &'static str> {
        let guard = self.tx.lock().unwrap();
        match guard.as_ref() {
            Some(tx) => tx.send(value).map_err(|_| "peer closed the stream"),
            None => Err("stream closed"),
        }
    }

    async fn recv(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }

    fn close(&self) {
        self.tx.lock().unwrap().take();
    }
}

// ---- storage market ----

pub struct TestStorageDealStream {
    remote: PeerId,
    proposals: Duplex<sm::Proposal>,
    responses: Duplex<sm::SignedResponse>,
}

/// A connected pair of deal streams: `(client_end, provider_end)`.
pub fn storage_deal_stream_pair(
    client_peer: PeerId,
    provider_peer: PeerId,
) -> (Arc<TestStorageDealStream>, Arc<TestStorageDealStream>) {
    let (p_a, p_b) = duplex_pair();
    let (r_a, r_b) = duplex_pair();
    (
        Arc::new(TestStorageDealStream {
            remote: provider_peer,
            proposals: p_a,
            responses: r_a,
        }),
        Arc::new(TestStorageDealStream {
            remote: client_peer,
            proposals: p_b,
            responses: r_b,
        }),
    )
}

#[async_trait]
impl sm::StorageDealStream for TestStorageDealStream {
    async fn read_proposal(&self) -> sm::Result<sm::Proposal> {
        self.proposals
            .recv()
            .await
            .ok_or_else(|| sm::MarketError::Network("stream closed".into()))
    }

    async fn write_proposal(&self, proposal: sm::Proposal) -> sm::Result<()> {
        self.proposals
            .send(proposal)
            .map_err(|e| sm::MarketError::Network(e.into()))
    }

    async fn read_response(&self) -> sm::Result<sm::SignedResponse> {
        self.responses
            .recv()
            .await
            .ok_or_else(|| sm::MarketError::Network("stream closed".into()))
    }

    async fn write_response(&self, response: sm::SignedResponse) -> sm::Result<()> {
        self.responses
            .send(response)
            .map_err(|e| sm::MarketError::Network(e.into()))
    }

    fn remote_peer(&self) -> PeerId {
        self.remote
    }

    async fn close(&self) -> sm::Result<()> {
        self.proposals.close();
        self.responses.close();
        Ok(())
    }
}

pub struct TestAskStream {
    remote: PeerId,
    requests: Duplex<sm::AskRequest>,
    responses: Duplex<sm::AskResponse>,
}

pub fn ask_stream_pair(
    client_peer: PeerId,
    provider_peer: PeerId,
) -> (Arc<TestAskStream>, Arc<TestAskStream>) {
    let (q_a, q_b) = duplex_pair();
    let (r_a, r_b) = duplex_pair();
    (
        Arc::new(TestAskStream {
            remote: provider_peer,
            requests: q_a,
            responses: r_a,
        }),
        Arc::new(TestAskStream {
            remote: client_peer,
            requests: q_b,
            responses: r_b,
        }),
    )
}

#[async_trait]
impl sm::AskStream for TestAskStream {
    async fn read_ask_request(&self) -> sm::Result<sm::AskRequest> {
        self.requests
            .recv()
            .await
            .ok_or_else(|| sm::MarketError::Network("stream closed".into()))
    }

    async fn write_ask_request(&self, request: sm::AskRequest) -> sm::Result<()> {
        self.requests
            .send(request)
            .map_err(|e| sm::MarketError::Network(e.into()))
    }

    async fn read_ask_response(&self) -> sm::Result<sm::AskResponse> {
        self.responses
            .recv()
            .await
            .ok_or_else(|| sm::MarketError::Network("stream closed".into()))
    }

    async fn write_ask_response(&self, response: sm::AskResponse) -> sm::Result<()> {
        self.responses
            .send(response)
            .map_err(|e| sm::MarketError::Network(e.into()))
    }

    fn remote_peer(&self) -> PeerId {
        self.remote
    }

    async fn close(&self) -> sm::Result<()> {
        self.requests.close();
        self.responses.close();
        Ok(())
    }
}

/// Routes new storage streams to whichever delegate registered for the
/// target peer.
#[derive(Default)]
pub struct TestStorageNetwork {
    delegates: RwLock<HashMap<PeerId, Arc<dyn sm::StorageReceiver>>>,
}

impl TestStorageNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A per-peer handle implementing [`sm::StorageMarketNetwork`].
    pub fn handle(self: &Arc<Self>, local: PeerId) -> Arc<StorageNetHandle> {
        Arc::new(StorageNetHandle {
            local,
            core: self.clone(),
        })
    }
}

pub struct StorageNetHandle {
    local: PeerId,
    core: Arc<TestStorageNetwork>,
}

#[async_trait]
impl sm::StorageMarketNetwork for StorageNetHandle {
    async fn new_deal_stream(&self, peer: PeerId) -> sm::Result<Arc<dyn sm::StorageDealStream>> {
        let delegate = self
            .core
            .delegates
            .read()
            .await
            .get(&peer)
            .cloned()
            .ok_or_else(|| sm::MarketError::Network(format!("no delegate for peer {}", peer)))?;
        let (ours, theirs) = storage_deal_stream_pair(self.local, peer);
        tokio::spawn(async move {
            delegate.handle_deal_stream(theirs).await;
        });
        Ok(ours)
    }

    async fn new_ask_stream(&self, peer: PeerId) -> sm::Result<Arc<dyn sm::AskStream>> {
        let delegate = self
            .core
            .delegates
            .read()
            .await
            .get(&peer)
            .cloned()
            .ok_or_else(|| sm::MarketError::Network(format!("no delegate for peer {}", peer)))?;
        let (ours, theirs) = ask_stream_pair(self.local, peer);
        tokio::spawn(async move {
            delegate.handle_ask_stream(theirs).await;
        });
        Ok(ours)
    }

    async fn set_delegate(&self, delegate: Arc<dyn sm::StorageReceiver>) -> sm::Result<()> {
        self.core.delegates.write().await.insert(self.local, delegate);
        Ok(())
    }
}

// ---- retrieval market ----

pub struct TestRetrievalQueryStream {
    remote: PeerId,
    queries: Duplex<rm::Query>,
    responses: Duplex<rm::QueryResponse>,
}

pub fn retrieval_query_stream_pair(
    client_peer: PeerId,
    provider_peer: PeerId,
) -> (Arc<TestRetrievalQueryStream>, Arc<TestRetrievalQueryStream>) {
    let (q_a, q_b) = duplex_pair();
    let (r_a, r_b) = duplex_pair();
    (
        Arc::new(TestRetrievalQueryStream {
            remote: provider_peer,
            queries: q_a,
            responses: r_a,
        }),
        Arc::new(TestRetrievalQueryStream {
            remote: client_peer,
            queries: q_b,
            responses: r_b,
        }),
    )
}

#[async_trait]
impl rm::RetrievalQueryStream for TestRetrievalQueryStream {
    async fn read_query(&self) -> rm::Result<rm::Query> {
        self.queries
            .recv()
            .await
            .ok_or_else(|| rm::RetrievalError::Network("stream closed".into()))
    }

    async fn write_query(&self, query: rm::Query) -> rm::Result<()> {
        self.queries
            .send(query)
            .map_err(|e| rm::RetrievalError::Network(e.into()))
    }

    async fn read_query_response(&self) -> rm::Result<rm::QueryResponse> {
        self.responses
            .recv()
            .await
            .ok_or_else(|| rm::RetrievalError::Network("stream closed".into()))
    }

    async fn write_query_response(&self, response: rm::QueryResponse) -> rm::Result<()> {
        self.responses
            .send(response)
            .map_err(|e| rm::RetrievalError::Network(e.into()))
    }

    fn remote_peer(&self) -> PeerId {
        self.remote
    }

    async fn close(&self) -> rm::Result<()> {
        self.queries.close();
        self.responses.close();
        Ok(())
    }
}

pub struct TestRetrievalDealStream {
    remote: PeerId,
    proposals: Duplex<rm::DealProposal>,
    responses: Duplex<rm::DealResponse>,
    payments: Duplex<rm::DealPayment>,
}

pub fn retrieval_deal_stream_pair(
    client_peer: PeerId,
    provider_peer: PeerId,
) -> (Arc<TestRetrievalDealStream>, Arc<TestRetrievalDealStream>) {
    let (pr_a, pr_b) = duplex_pair();
    let (re_a, re_b) = duplex_pair();
    let (pa_a, pa_b) = duplex_pair();
    (
        Arc::new(TestRetrievalDealStream {
            remote: provider_peer,
            proposals: pr_a,
            responses: re_a,
            payments: pa_a,
        }),
        Arc::new(TestRetrievalDealStream {
            remote: client_peer,
            proposals: pr_b,
            responses: re_b,
            payments: pa_b,
        }),
    )
}

#[async_trait]
impl rm::RetrievalDealStream for TestRetrievalDealStream {
    async fn read_proposal(&self) -> rm::Result<rm::DealProposal> {
        self.proposals
            .recv()
            .await
            .ok_or_else(|| rm::RetrievalError::Network("stream closed".into()))
    }

    async fn write_proposal(&self, proposal: rm::DealProposal) -> rm::Result<()> {
        self.proposals
            .send(proposal)
            .map_err(|e| rm::RetrievalError::Network(e.into()))
    }

    async fn read_response(&self) -> rm::Result<rm::DealResponse> {
        self.responses
            .recv()
            .await
            .ok_or_else(|| rm::RetrievalError::Network("stream closed".into()))
    }

    async fn write_response(&self, response: rm::DealResponse) -> rm::Result<()> {
        self.responses
            .send(response)
            .map_err(|e| rm::RetrievalError::Network(e.into()))
    }

    async fn read_payment(&self) -> rm::Result<rm::DealPayment> {
        self.payments
            .recv()
            .await
            .ok_or_else(|| rm::RetrievalError::Network("stream closed".into()))
    }

    async fn write_payment(&self, payment: rm::DealPayment) -> rm::Result<()> {
        self.payments
            .send(payment)
            .map_err(|e| rm::RetrievalError::Network(e.into()))
    }

    fn remote_peer(&self) -> PeerId {
        self.remote
    }

    async fn close(&self) -> rm::Result<()> {
        self.proposals.close();
        self.responses.close();
        self.payments.close();
        Ok(())
    }
}

#[derive(Default)]
pub struct TestRetrievalNetwork {
    delegates: RwLock<HashMap<PeerId, Arc<dyn rm::RetrievalReceiver>>>,
}

impl TestRetrievalNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn handle(self: &Arc<Self>, local: PeerId) -> Arc<RetrievalNetHandle> {
        Arc::new(RetrievalNetHandle {
            local,
            core: self.clone(),
        })
    }
}

pub struct RetrievalNetHandle {
    local: PeerId,
    core: Arc<TestRetrievalNetwork>,
}

#[async_trait]
impl rm::RetrievalMarketNetwork for RetrievalNetHandle {
    async fn new_query_stream(
        &self,
        peer: PeerId,
    ) -> rm::Result<Arc<dyn rm::RetrievalQueryStream>> {
        let delegate = self
            .core
            .delegates
            .read()
            .await
            .get(&peer)
            .cloned()
            .ok_or_else(|| {
                rm::RetrievalError::Network(format!("no delegate for peer {}", peer))
            })?;
        let (ours, theirs) = retrieval_query_stream_pair(self.local, peer);
        tokio::spawn(async move {
            delegate.handle_query_stream(theirs).await;
        });
        Ok(ours)
    }

    async fn new_deal_stream(&self, peer: PeerId) -> rm::Result<Arc<dyn rm::RetrievalDealStream>> {
        let delegate = self
            .core
            .delegates
            .read()
            .await
            .get(&peer)
            .cloned()
            .ok_or_else(|| {
                rm::RetrievalError::Network(format!("no delegate for peer {}", peer))
            })?;
        let (ours, theirs) = retrieval_deal_stream_pair(self.local, peer);
        tokio::spawn(async move {
            delegate.handle_deal_stream(theirs).await;
        });
        Ok(ours)
    }

    async fn set_delegate(&self, delegate: Arc<dyn rm::RetrievalReceiver>) -> rm::Result<()> {
        self.core.delegates.write().await.insert(self.local, delegate);
        Ok(())
    }
}
