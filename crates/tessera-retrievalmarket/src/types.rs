use serde::{Deserialize, Serialize};
use tessera_types::{Address, Block, Cid, PeerId, Signature, TokenAmount};

pub type DealId = u64;

/// Retrieval deal status, shared between client and provider.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum DealStatus {
    New,
    Accepted,
    Rejected,
    /// Client only: payment channel ready, transfer can begin
    PaymentChannelCreated,
    Ongoing,
    FundsNeeded,
    FundsNeededLastPayment,
    Completed,
    Failed,
}

impl DealStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DealStatus::Completed | DealStatus::Failed | DealStatus::Rejected
        )
    }

    pub fn is_terminal_success(&self) -> bool {
        matches!(self, DealStatus::Completed)
    }
}

impl std::fmt::Display for DealStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Pricing and pacing parameters for one retrieval.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Params {
    pub price_per_byte: TokenAmount,
    /// Bytes the provider sends before the first payment request
    pub payment_interval: u64,
    /// How much the interval grows after each payment
    pub payment_interval_increase: u64,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct DealProposal {
    pub payload_cid: Cid,
    pub id: DealId,
    pub params: Params,
}

/// A provider frame: status plus any blocks sent under the current
/// interval, plus the payment owed when status requests funds.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct DealResponse {
    pub status: DealStatus,
    pub id: DealId,
    pub payment_owed: TokenAmount,
    pub message: Option<String>,
    pub blocks: Vec<Block>,
}

/// A signed token authorizing a payment-channel debit.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct PaymentVoucher {
    pub channel: Address,
    pub amount: TokenAmount,
    pub nonce: u64,
    pub signature: Signature,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct DealPayment {
    pub id: DealId,
    pub payment_channel: Address,
    pub voucher: PaymentVoucher,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Query {
    pub payload_cid: Cid,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum QueryResponseStatus {
    Available,
    Unavailable,
    Error,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub status: QueryResponseStatus,
    pub payment_address: Address,
    pub min_price_per_byte: TokenAmount,
    pub max_payment_interval: u64,
    pub max_payment_interval_increase: u64,
    pub size: Option<u64>,
    pub message: Option<String>,
}

/// A known holder of a payload, resolvable through discovery.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct RetrievalPeer {
    pub address: Address,
    pub id: PeerId,
}

/// Client-side record of one retrieval deal.
#[derive(Clone, Debug)]
pub struct ClientDealState {
    pub proposal: DealProposal,
    pub total_funds: TokenAmount,
    pub client_wallet: Address,
    pub miner_wallet: Address,
    pub payment_channel: Option<Address>,
    pub status: DealStatus,
    pub sender: PeerId,
    pub total_received: u64,
    /// Bytes the provider will send before the next payment request
    pub current_interval: u64,
    pub bytes_paid_for: u64,
    pub payment_requested: TokenAmount,
    pub funds_spent: TokenAmount,
    pub message: String,
}

impl ClientDealState {
    pub fn new(
        proposal: DealProposal,
        total_funds: TokenAmount,
        client_wallet: Address,
        miner_wallet: Address,
        sender: PeerId,
    ) -> Self {
        let current_interval = proposal.params.payment_interval;
        Self {
            proposal,
            total_funds,
            client_wallet,
            miner_wallet,
            payment_channel: None,
            status: DealStatus::New,
            sender,
            total_received: 0,
            current_interval,
            bytes_paid_for: 0,
            payment_requested: TokenAmount::ZERO,
            funds_spent: TokenAmount::ZERO,
            message: String::new(),
        }
    }
}

/// Provider-side record of one retrieval deal.
#[derive(Clone, Debug)]
pub struct ProviderDealState {
    pub proposal: DealProposal,
    pub status: DealStatus,
    pub receiver: PeerId,
    pub total_sent: u64,
    pub current_interval: u64,
    pub bytes_paid_for: u64,
    pub funds_received: TokenAmount,
    pub message: String,
}

impl ProviderDealState {
    pub fn new(proposal: DealProposal, receiver: PeerId) -> Self {
        let current_interval = proposal.params.payment_interval;
        Self {
            proposal,
            status: DealStatus::New,
            receiver,
            total_sent: 0,
            current_interval,
            bytes_paid_for: 0,
            funds_received: TokenAmount::ZERO,
            message: String::new(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ClientEvent {
    Open,
    Progress,
    Error,
    Complete,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProviderEvent {
    Open,
    Progress,
    Error,
    Complete,
}
