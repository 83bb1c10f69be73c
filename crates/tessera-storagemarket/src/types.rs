use crate::error::{MarketError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tessera_types::{
    canonical_hash, Address, Cid, Codec, MultihashCode, PeerId, Prefix, PublicKey, Signature,
    TokenAmount,
};

pub type DealId = u64;
pub type SectorId = u64;

/// One status enum shared by both sides of a storage deal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum DealState {
    /// Client: proposal sent, no response consumed yet
    Unknown,
    /// Provider: checking the proposal against ask and chain state
    Validating,
    /// Provider: pull data transfer in flight
    Transferring,
    /// Provider: re-deriving the piece commitment from received data
    VerifyData,
    /// Provider: funding and publishing the deal on chain
    Publishing,
    /// Deal published; piece handed to the sealing facade
    Accepted,
    Staged,
    Sealing,
    Complete,
    Failed,
    /// Sentinel: stage handler produced no state change
    NoUpdate,
}

impl DealState {
    pub fn name(&self) -> &'static str {
        match self {
            DealState::Unknown => "Unknown",
            DealState::Validating => "Validating",
            DealState::Transferring => "Transferring",
            DealState::VerifyData => "VerifyData",
            DealState::Publishing => "Publishing",
            DealState::Accepted => "Accepted",
            DealState::Staged => "Staged",
            DealState::Sealing => "Sealing",
            DealState::Complete => "Complete",
            DealState::Failed => "Failed",
            DealState::NoUpdate => "NoUpdate",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DealState::Complete | DealState::Failed)
    }
}

impl std::fmt::Display for DealState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The signed core of a storage deal, hashed into the proposal CID that
/// keys the deal everywhere.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct StorageDealProposal {
    /// Commitment of the padded piece
    pub piece_ref: [u8; 32],
    /// Padded piece size in bytes
    pub piece_size: u64,
    pub client: Address,
    pub client_key: PublicKey,
    pub provider: Address,
    /// Chain height after which the proposal is dead
    pub proposal_expiration: u64,
    /// Deal length in epochs
    pub duration: u64,
    pub storage_price_per_epoch: TokenAmount,
    pub storage_collateral: TokenAmount,
    pub proposer_signature: Option<Signature>,
}

impl StorageDealProposal {
    pub fn total_storage_price(&self) -> TokenAmount {
        self.storage_price_per_epoch.mul_int(self.duration)
    }

    /// Bytes covered by the proposer signature.
    pub fn unsigned_bytes(&self) -> Result<Vec<u8>> {
        let mut unsigned = self.clone();
        unsigned.proposer_signature = None;
        Ok(tessera_types::to_canonical_json(&unsigned)?.into_bytes())
    }

    /// CID of the signed proposal.
    pub fn cid(&self) -> Result<Cid> {
        let digest = canonical_hash(self)
            .map_err(|e| MarketError::InvalidProposal(e.to_string()))?;
        Ok(Cid::new(
            Prefix::new(Codec::DagJson, MultihashCode::Blake3),
            digest,
        ))
    }

    /// Check the proposer signature against the embedded client key.
    pub fn verify(&self) -> Result<()> {
        let signature = self
            .proposer_signature
            .as_ref()
            .ok_or_else(|| MarketError::InvalidProposal("proposal has no signature".into()))?;
        if Address::from_public_key(&self.client_key) != self.client {
            return Err(MarketError::InvalidProposal(
                "client key does not match client address".into(),
            ));
        }
        if !self.client_key.verify(&self.unsigned_bytes()?, signature) {
            return Err(MarketError::InvalidProposal(
                "proposer signature invalid".into(),
            ));
        }
        Ok(())
    }
}

/// A client's record of one deal. The stream handle lives in the driver's
/// connection map, not in the persisted record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientDeal {
    pub proposal_cid: Cid,
    pub proposal: StorageDealProposal,
    pub state: DealState,
    pub miner: PeerId,
    pub miner_worker: Address,
    pub payload_cid: Cid,
    pub publish_message: Option<Cid>,
    pub deal_id: Option<DealId>,
    pub sector_id: Option<SectorId>,
    pub message: String,
}

/// A provider's record of one deal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MinerDeal {
    pub proposal_cid: Cid,
    pub proposal: StorageDealProposal,
    pub state: DealState,
    pub client: PeerId,
    pub payload_cid: Cid,
    pub piece_path: Option<PathBuf>,
    pub sector_id: Option<SectorId>,
    pub deal_id: Option<DealId>,
    pub message: String,
}

/// A provider's published price and constraints.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct StorageAsk {
    /// Price per GiB per epoch
    pub price: TokenAmount,
    pub min_piece_size: u64,
    pub miner: Address,
    pub timestamp: i64,
    pub expiry: u64,
    pub seq_no: u64,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct SignedStorageAsk {
    pub ask: StorageAsk,
    pub signer: PublicKey,
    pub signature: Signature,
}

impl SignedStorageAsk {
    pub fn verify(&self) -> Result<()> {
        if Address::from_public_key(&self.signer) != self.ask.miner {
            return Err(MarketError::InvalidAsk(
                "ask signer does not match miner address".into(),
            ));
        }
        let bytes = tessera_types::to_canonical_json(&self.ask)?.into_bytes();
        if !self.signer.verify(&bytes, &self.signature) {
            return Err(MarketError::InvalidAsk("ask signature invalid".into()));
        }
        Ok(())
    }
}

// ---- wire messages ----

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Proposal {
    pub deal_proposal: StorageDealProposal,
    /// Root of the payload DAG the proposal covers
    pub piece: Cid,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Response {
    pub state: DealState,
    /// Failure reason, set when state is Failed
    pub message: Option<String>,
    pub proposal: Cid,
    /// CID of the on-chain publish message, set on acceptance
    pub publish_message: Option<Cid>,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct SignedResponse {
    pub response: Response,
    pub signer: PublicKey,
    pub signature: Signature,
}

impl SignedResponse {
    /// Check the signature and that it was produced by `expected_worker`.
    pub fn verify(&self, expected_worker: &Address) -> Result<()> {
        if &Address::from_public_key(&self.signer) != expected_worker {
            return Err(MarketError::InvalidResponse(
                "response signer is not the miner worker".into(),
            ));
        }
        let bytes = tessera_types::to_canonical_json(&self.response)?.into_bytes();
        if !self.signer.verify(&bytes, &self.signature) {
            return Err(MarketError::InvalidResponse(
                "response signature invalid".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct AskRequest {
    pub miner: Address,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub ask: Option<SignedStorageAsk>,
}

// ---- chain state ----

/// Opaque pointer to a chain state root, exposing only its height.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct StateKey {
    height: u64,
}

impl StateKey {
    pub fn new(height: u64) -> Self {
        Self { height }
    }

    pub fn height(&self) -> u64 {
        self.height
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct Balance {
    pub available: TokenAmount,
    pub locked: TokenAmount,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::Keypair;

    fn proposal(keypair: &Keypair) -> StorageDealProposal {
        StorageDealProposal {
            piece_ref: [9u8; 32],
            piece_size: 1016,
            client: Address::from_public_key(&keypair.public()),
            client_key: keypair.public(),
            provider: Address::from_bytes([2u8; 32]),
            proposal_expiration: 100_000,
            duration: 100,
            storage_price_per_epoch: TokenAmount::from_base_units(5),
            storage_collateral: TokenAmount::from_base_units(1016),
            proposer_signature: None,
        }
    }

    #[test]
    fn test_total_storage_price() {
        let keypair = Keypair::generate();
        assert_eq!(
            proposal(&keypair).total_storage_price(),
            TokenAmount::from_base_units(500)
        );
    }

    #[test]
    fn test_proposal_sign_verify_roundtrip() {
        let keypair = Keypair::generate();
        let mut p = proposal(&keypair);
        let sig = keypair.sign(&p.unsigned_bytes().unwrap());
        p.proposer_signature = Some(sig);
        p.verify().unwrap();

        // tampering invalidates
        p.piece_size += 1;
        assert!(p.verify().is_err());
    }

    #[test]
    fn test_proposal_rejects_foreign_key() {
        let keypair = Keypair::generate();
        let imposter = Keypair::generate();
        let mut p = proposal(&keypair);
        p.client_key = imposter.public();
        let sig = imposter.sign(&p.unsigned_bytes().unwrap());
        p.proposer_signature = Some(sig);
        assert!(p.verify().is_err());
    }

    #[test]
    fn test_proposal_cid_changes_with_signature() {
        let keypair = Keypair::generate();
        let mut p = proposal(&keypair);
        let unsigned_cid = p.cid().unwrap();
        p.proposer_signature = Some(keypair.sign(&p.unsigned_bytes().unwrap()));
        assert_ne!(unsigned_cid, p.cid().unwrap());
        assert_eq!(p.cid().unwrap(), p.cid().unwrap());
    }

    #[test]
    fn test_signed_response_verify() {
        let worker = Keypair::generate();
        let worker_addr = Address::from_public_key(&worker.public());
        let response = Response {
            state: DealState::Accepted,
            message: None,
            proposal: Prefix::default().sum(b"proposal"),
            publish_message: Some(Prefix::default().sum(b"publish")),
        };
        let bytes = tessera_types::to_canonical_json(&response).unwrap();
        let signed = SignedResponse {
            response,
            signer: worker.public(),
            signature: worker.sign(bytes.as_bytes()),
        };
        signed.verify(&worker_addr).unwrap();

        let other = Address::from_bytes([0u8; 32]);
        assert!(signed.verify(&other).is_err());
    }

    #[test]
    fn test_deal_state_terminality() {
        assert!(DealState::Complete.is_terminal());
        assert!(DealState::Failed.is_terminal());
        assert!(!DealState::Sealing.is_terminal());
        assert!(!DealState::Unknown.is_terminal());
    }
}
