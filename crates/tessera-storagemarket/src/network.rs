//! Stream interfaces for the storage market protocols.
//!
//! Transport wiring lives outside this crate; deal drivers only see these
//! traits. Messages are length-delimited frames (see
//! `tessera_types::frames`) when carried over real byte streams.

use crate::error::Result;
use crate::types::{AskRequest, AskResponse, Proposal, SignedResponse};
use async_trait::async_trait;
use std::sync::Arc;
use tessera_types::PeerId;

/// Protocol id for deal negotiation streams.
pub const DEAL_PROTOCOL_ID: &str = "/tessera/storage/deal/1.0.0";
/// Protocol id for ask queries.
pub const ASK_PROTOCOL_ID: &str = "/tessera/storage/ask/1.0.0";

#[async_trait]
pub trait StorageDealStream: Send + Sync {
    async fn read_proposal(&self) -> Result<Proposal>;
    async fn write_proposal(&self, proposal: Proposal) -> Result<()>;
    async fn read_response(&self) -> Result<SignedResponse>;
    async fn write_response(&self, response: SignedResponse) -> Result<()>;
    fn remote_peer(&self) -> PeerId;
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait AskStream: Send + Sync {
    async fn read_ask_request(&self) -> Result<AskRequest>;
    async fn write_ask_request(&self, request: AskRequest) -> Result<()>;
    async fn read_ask_response(&self) -> Result<AskResponse>;
    async fn write_ask_response(&self, response: AskResponse) -> Result<()>;
    fn remote_peer(&self) -> PeerId;
    async fn close(&self) -> Result<()>;
}

/// Incoming-stream handler a provider registers with the network.
#[async_trait]
pub trait StorageReceiver: Send + Sync {
    async fn handle_deal_stream(&self, stream: Arc<dyn StorageDealStream>);
    async fn handle_ask_stream(&self, stream: Arc<dyn AskStream>);
}

#[async_trait]
pub trait StorageMarketNetwork: Send + Sync {
    async fn new_deal_stream(&self, peer: PeerId) -> Result<Arc<dyn StorageDealStream>>;
    async fn new_ask_stream(&self, peer: PeerId) -> Result<Arc<dyn AskStream>>;
    async fn set_delegate(&self, delegate: Arc<dyn StorageReceiver>) -> Result<()>;
}
