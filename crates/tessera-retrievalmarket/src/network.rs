//! Stream interfaces for the retrieval protocols.

use crate::error::Result;
use crate::types::{DealPayment, DealProposal, DealResponse, Query, QueryResponse};
use async_trait::async_trait;
use std::sync::Arc;
use tessera_types::PeerId;

pub const QUERY_PROTOCOL_ID: &str = "/tessera/retrieval/query/1.0.0";
pub const DEAL_PROTOCOL_ID: &str = "/tessera/retrieval/deal/1.0.0";

#[async_trait]
pub trait RetrievalQueryStream: Send + Sync {
    async fn read_query(&self) -> Result<Query>;
    async fn write_query(&self, query: Query) -> Result<()>;
    async fn read_query_response(&self) -> Result<QueryResponse>;
    async fn write_query_response(&self, response: QueryResponse) -> Result<()>;
    fn remote_peer(&self) -> PeerId;
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait RetrievalDealStream: Send + Sync {
    async fn read_proposal(&self) -> Result<DealProposal>;
    async fn write_proposal(&self, proposal: DealProposal) -> Result<()>;
    async fn read_response(&self) -> Result<DealResponse>;
    async fn write_response(&self, response: DealResponse) -> Result<()>;
    async fn read_payment(&self) -> Result<DealPayment>;
    async fn write_payment(&self, payment: DealPayment) -> Result<()>;
    fn remote_peer(&self) -> PeerId;
    async fn close(&self) -> Result<()>;
}

/// Incoming-stream handler a provider registers with the network. The
/// network invokes each handler on a dedicated task per stream, so
/// handlers may run a full deal loop inline.
#[async_trait]
pub trait RetrievalReceiver: Send + Sync {
    async fn handle_query_stream(&self, stream: Arc<dyn RetrievalQueryStream>);
    async fn handle_deal_stream(&self, stream: Arc<dyn RetrievalDealStream>);
}

#[async_trait]
pub trait RetrievalMarketNetwork: Send + Sync {
    async fn new_query_stream(&self, peer: PeerId) -> Result<Arc<dyn RetrievalQueryStream>>;
    async fn new_deal_stream(&self, peer: PeerId) -> Result<Arc<dyn RetrievalDealStream>>;
    async fn set_delegate(&self, delegate: Arc<dyn RetrievalReceiver>) -> Result<()>;
}
