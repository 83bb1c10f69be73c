//! The storage side of the tessera marketplace.
//!
//! Clients compute a piece commitment locally, sign and transmit a
//! proposal, and advance on the provider's signed responses. Providers
//! validate, pull the payload DAG, re-derive the commitment, publish on
//! chain, hand the piece to sealing and index the sector location.

pub mod client;
pub mod client_states;
pub mod datatransfer;
pub mod error;
pub mod network;
pub mod node;
pub mod piecestore;
pub mod provider;
pub mod provider_states;
pub mod types;

pub use client::{
    Client, ClientDealParams, ClientDealUpdate, ClientEvent, ClientSubscriber,
    ClientSubscription,
};
pub use datatransfer::{
    DataTransfer, ProviderRequestValidator, RawVoucher, StorageDataTransferVoucher,
    TransferEvent, TransferEventKind, DATA_TRANSFER_STATES,
};
pub use error::{MarketError, Result};
pub use network::{
    AskStream, StorageDealStream, StorageMarketNetwork, StorageReceiver, ASK_PROTOCOL_ID,
    DEAL_PROTOCOL_ID,
};
pub use node::{CommitCallback, StorageClientNode, StorageProviderNode};
pub use piecestore::{DealInfo, PieceStore};
pub use provider::{
    MinerDealUpdate, Provider, ProviderConfig, ProviderEvent, ProviderSubscriber, Subscription,
};
pub use types::{
    AskRequest, AskResponse, Balance, ClientDeal, DealId, DealState, MinerDeal, Proposal,
    Response, SectorId, SignedResponse, SignedStorageAsk, StateKey, StorageAsk,
    StorageDealProposal,
};
