//! The retrieval side of the tessera marketplace.
//!
//! Clients resolve providers through discovery, open a deal stream, and
//! receive the payload DAG block by block, paying per interval with
//! signed vouchers. Each received block is checked by a verifier driving
//! a cooperative [`blockio::Traverser`] over the expected DAG.

pub mod blockio;
pub mod client;
pub mod client_states;
pub mod discovery;
pub mod error;
pub mod network;
pub mod node;
pub mod provider;
pub mod provider_states;
pub mod types;

pub use blockio::{
    BlockReader, BlockVerifier, OptimisticVerifier, SelectorBlockReader, SelectorVerifier,
    Traverser,
};
pub use client::{ClientSubscriber, ClientSubscription, RetrievalClient};
pub use discovery::Local;
pub use error::{RetrievalError, Result};
pub use network::{
    RetrievalDealStream, RetrievalMarketNetwork, RetrievalQueryStream, RetrievalReceiver,
    DEAL_PROTOCOL_ID, QUERY_PROTOCOL_ID,
};
pub use node::{RetrievalClientNode, RetrievalProviderNode};
pub use provider::{
    ProviderSubscriber, ProviderSubscription, RetrievalProvider, RetrievalProviderConfig,
};
pub use types::{
    ClientDealState, ClientEvent, DealId, DealPayment, DealProposal, DealResponse, DealStatus,
    Params, PaymentVoucher, ProviderDealState, ProviderEvent, Query, QueryResponse,
    QueryResponseStatus, RetrievalPeer,
};
