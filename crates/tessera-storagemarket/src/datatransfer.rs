//! Data-transfer integration: the storage voucher, the manager interface
//! the provider drives pulls through, and push validation against the
//! deal store.

use crate::error::{MarketError, Result};
use crate::types::{DealState, MinerDeal};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tessera_store::{StateStore, StoreError};
use tessera_types::{Cid, PeerId, Selector};
use tokio::sync::mpsc;

/// Deal states during which data transfer for the deal is acceptable.
pub const DATA_TRANSFER_STATES: &[DealState] =
    &[DealState::Validating, DealState::Transferring];

/// Voucher tying a data transfer to a storage deal.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct StorageDataTransferVoucher {
    pub proposal: Cid,
}

impl StorageDataTransferVoucher {
    pub const VOUCHER_TYPE: &'static str = "StorageDataTransferVoucher/1";

    pub fn to_raw(&self) -> RawVoucher {
        RawVoucher {
            voucher_type: Self::VOUCHER_TYPE.to_string(),
            payload: self.proposal.to_bytes().to_vec(),
        }
    }

    pub fn from_raw(raw: &RawVoucher) -> Result<Self> {
        if raw.voucher_type != Self::VOUCHER_TYPE {
            return Err(MarketError::WrongVoucherType(raw.voucher_type.clone()));
        }
        let proposal = Cid::from_bytes(&raw.payload)
            .map_err(|e| MarketError::WrongVoucherType(e.to_string()))?;
        Ok(Self { proposal })
    }
}

/// A type-erased voucher as carried by the generic transfer manager.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct RawVoucher {
    pub voucher_type: String,
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TransferEventKind {
    Completed,
    Error(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransferEvent {
    pub voucher: StorageDataTransferVoucher,
    pub kind: TransferEventKind,
}

pub type ChannelId = u64;

/// The slice of the generic data-transfer manager the storage market
/// consumes: open a pull and hear about its completion.
#[async_trait]
pub trait DataTransfer: Send + Sync {
    async fn open_pull_channel(
        &self,
        from: PeerId,
        voucher: StorageDataTransferVoucher,
        base_cid: Cid,
        selector: Selector,
    ) -> Result<ChannelId>;

    fn subscribe(&self) -> mpsc::UnboundedReceiver<TransferEvent>;
}

/// Validates incoming data-transfer requests for a storage provider.
///
/// A push is accepted only when the voucher references a known deal in an
/// acceptable state whose client matches the sender and whose payload
/// matches the transfer's base CID. Pulls are always rejected: a storage
/// provider never sends deal data back to the client.
pub struct ProviderRequestValidator {
    deals: StateStore<MinerDeal>,
}

impl ProviderRequestValidator {
    pub fn new(deals: StateStore<MinerDeal>) -> Self {
        Self { deals }
    }

    pub async fn validate_push(
        &self,
        sender: PeerId,
        voucher: &RawVoucher,
        base_cid: Cid,
        _selector: &Selector,
    ) -> Result<()> {
        let voucher = StorageDataTransferVoucher::from_raw(voucher)?;

        let deal = match self.deals.get(voucher.proposal).fetch().await {
            Ok(deal) => deal,
            Err(StoreError::NotFound(_)) => {
                return Err(MarketError::UnknownDeal(voucher.proposal.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        if deal.client != sender {
            return Err(MarketError::WrongPeer {
                expected: deal.client.to_string(),
                actual: sender.to_string(),
            });
        }
        if deal.payload_cid != base_cid {
            return Err(MarketError::WrongPiece {
                expected: deal.payload_cid.to_string(),
                actual: base_cid.to_string(),
            });
        }
        if !DATA_TRANSFER_STATES.contains(&deal.state) {
            return Err(MarketError::InacceptableDealState(deal.state.to_string()));
        }
        Ok(())
    }

    pub async fn validate_pull(
        &self,
        _receiver: PeerId,
        _voucher: &RawVoucher,
        _base_cid: Cid,
        _selector: &Selector,
    ) -> Result<()> {
        Err(MarketError::NoPullAccepted)
    }
}
