//! Fake node facades and a fake data-transfer manager.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as SyncMutex;
use tessera_retrievalmarket as rm;
use tessera_storagemarket as sm;
use tessera_store::{Blockstore, BlockstoreLoader};
use tessera_types::{
    walk, Address, Block, Cid, Keypair, Node, PeerId, Prefix, Selector, TokenAmount,
};
use tokio::sync::{mpsc, RwLock};

/// Storage provider node with instant chain operations. Sector commits
/// fire their callbacks immediately.
pub struct FakeStorageProviderNode {
    pub worker: Keypair,
    height: AtomicU64,
    balances: RwLock<HashMap<Address, sm::Balance>>,
    default_available: TokenAmount,
    next_deal_id: AtomicU64,
    completed_pieces: SyncMutex<Vec<PathBuf>>,
    piece_locations: SyncMutex<HashMap<sm::DealId, (sm::SectorId, u64, u64)>>,
    sealed: Arc<dyn Blockstore>,
}

impl FakeStorageProviderNode {
    pub fn new(sealed: Arc<dyn Blockstore>) -> Arc<Self> {
        Arc::new(Self {
            worker: Keypair::generate(),
            height: AtomicU64::new(1),
            balances: RwLock::new(HashMap::new()),
            default_available: TokenAmount::from_base_units(u64::MAX as u128),
            next_deal_id: AtomicU64::new(0),
            completed_pieces: SyncMutex::new(Vec::new()),
            piece_locations: SyncMutex::new(HashMap::new()),
            sealed,
        })
    }

    pub fn worker_address(&self) -> Address {
        Address::from_public_key(&self.worker.public())
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub async fn set_balance(&self, addr: Address, balance: sm::Balance) {
        self.balances.write().await.insert(addr, balance);
    }

    pub fn completed_pieces(&self) -> Vec<PathBuf> {
        self.completed_pieces.lock().unwrap().clone()
    }
}

#[async_trait]
impl sm::StorageProviderNode for FakeStorageProviderNode {
    async fn most_recent_state_id(&self) -> sm::Result<sm::StateKey> {
        Ok(sm::StateKey::new(self.height.load(Ordering::SeqCst)))
    }

    async fn get_balance(&self, addr: Address) -> sm::Result<sm::Balance> {
        Ok(self
            .balances
            .read()
            .await
            .get(&addr)
            .copied()
            .unwrap_or(sm::Balance {
                available: self.default_available,
                locked: TokenAmount::ZERO,
            }))
    }

    async fn ensure_funds(&self, _addr: Address, _amount: TokenAmount) -> sm::Result<()> {
        Ok(())
    }

    async fn publish_deals(&self, deal: &sm::MinerDeal) -> sm::Result<(sm::DealId, Cid)> {
        let id = self.next_deal_id.fetch_add(1, Ordering::SeqCst) + 1;
        let message = Prefix::default().sum(deal.proposal_cid.to_hex().as_bytes());
        Ok((id, message))
    }

    async fn get_miner_worker(&self, _miner: Address) -> sm::Result<Address> {
        Ok(self.worker_address())
    }

    async fn sign_bytes(
        &self,
        _signer: Address,
        bytes: &[u8],
    ) -> sm::Result<(tessera_types::PublicKey, tessera_types::Signature)> {
        Ok((self.worker.public(), self.worker.sign(bytes)))
    }

    async fn on_deal_complete(
        &self,
        _deal: &sm::MinerDeal,
        piece_path: &Path,
    ) -> sm::Result<sm::SectorId> {
        self.completed_pieces
            .lock()
            .unwrap()
            .push(piece_path.to_path_buf());
        Ok(1)
    }

    async fn on_deal_sector_committed(
        &self,
        _provider: Address,
        deal_id: sm::DealId,
        cb: sm::CommitCallback,
    ) -> sm::Result<()> {
        self.piece_locations
            .lock()
            .unwrap()
            .insert(deal_id, (1, 0, 1016));
        cb(Ok(()));
        Ok(())
    }

    async fn locate_piece_for_deal_within_sector(
        &self,
        deal_id: sm::DealId,
    ) -> sm::Result<(sm::SectorId, u64, u64)> {
        self.piece_locations
            .lock()
            .unwrap()
            .get(&deal_id)
            .copied()
            .ok_or_else(|| sm::MarketError::Node(format!("no sector for deal {}", deal_id)))
    }

    fn sealed_blockstore(&self) -> Arc<dyn Blockstore> {
        self.sealed.clone()
    }
}

/// Storage client node signing with a fixed keypair; publish validation
/// and sector waits succeed instantly.
pub struct FakeStorageClientNode {
    pub keypair: Keypair,
}

impl FakeStorageClientNode {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            keypair: Keypair::generate(),
        })
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(&self.keypair.public())
    }
}

#[async_trait]
impl sm::StorageClientNode for FakeStorageClientNode {
    async fn ensure_funds(&self, _addr: Address, _amount: TokenAmount) -> sm::Result<()> {
        Ok(())
    }

    async fn sign_proposal(
        &self,
        _signer: Address,
        proposal: &mut sm::StorageDealProposal,
    ) -> sm::Result<()> {
        proposal.client_key = self.keypair.public();
        let bytes = proposal.unsigned_bytes()?;
        proposal.proposer_signature = Some(self.keypair.sign(&bytes));
        Ok(())
    }

    async fn validate_published_deal(&self, deal: &sm::ClientDeal) -> sm::Result<sm::DealId> {
        if deal.publish_message.is_none() {
            return Err(sm::MarketError::Node("no publish message".into()));
        }
        Ok(1)
    }

    async fn await_deal_sector(&self, _deal_id: sm::DealId) -> sm::Result<sm::SectorId> {
        Ok(1)
    }

    async fn on_deal_sector_committed(
        &self,
        _provider: Address,
        _deal_id: sm::DealId,
        cb: sm::CommitCallback,
    ) -> sm::Result<()> {
        cb(Ok(()));
        Ok(())
    }
}

/// A data-transfer manager that "moves" the payload by copying blocks
/// from a source blockstore into the destination, then emits Completed.
pub struct FakeDataTransfer {
    source: Arc<dyn Blockstore>,
    dest: Arc<dyn Blockstore>,
    next_channel: AtomicU64,
    pulls: SyncMutex<Vec<(PeerId, sm::StorageDataTransferVoucher, Cid)>>,
    events: SyncMutex<Vec<mpsc::UnboundedSender<sm::TransferEvent>>>,
}

impl FakeDataTransfer {
    pub fn new(source: Arc<dyn Blockstore>, dest: Arc<dyn Blockstore>) -> Arc<Self> {
        Arc::new(Self {
            source,
            dest,
            next_channel: AtomicU64::new(0),
            pulls: SyncMutex::new(Vec::new()),
            events: SyncMutex::new(Vec::new()),
        })
    }

    pub fn pulls(&self) -> Vec<(PeerId, sm::StorageDataTransferVoucher, Cid)> {
        self.pulls.lock().unwrap().clone()
    }

    fn emit(&self, event: sm::TransferEvent) {
        for tx in self.events.lock().unwrap().iter() {
            let _ = tx.send(event.clone());
        }
    }

    async fn copy_dag(&self, base_cid: Cid, selector: &Selector) -> anyhow::Result<()> {
        let mut loader = BlockstoreLoader::new(self.source.clone());
        let dest = self.dest.clone();
        let mut pending: Vec<Block> = Vec::new();
        let mut visit = |cid: &Cid, bytes: &[u8], _node: &Node| -> tessera_types::Result<()> {
            pending.push(Block {
                cid: *cid,
                data: bytes.to_vec(),
            });
            Ok(())
        };
        walk(&base_cid, selector, &mut loader, &mut visit).await?;
        for block in pending {
            dest.put(&block).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl sm::DataTransfer for FakeDataTransfer {
    async fn open_pull_channel(
        &self,
        from: PeerId,
        voucher: sm::StorageDataTransferVoucher,
        base_cid: Cid,
        selector: Selector,
    ) -> sm::Result<u64> {
        self.pulls.lock().unwrap().push((from, voucher, base_cid));
        let channel = self.next_channel.fetch_add(1, Ordering::SeqCst);

        let event = match self.copy_dag(base_cid, &selector).await {
            Ok(()) => sm::TransferEvent {
                voucher,
                kind: sm::TransferEventKind::Completed,
            },
            Err(e) => sm::TransferEvent {
                voucher,
                kind: sm::TransferEventKind::Error(e.to_string()),
            },
        };
        self.emit(event);
        Ok(channel)
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<sm::TransferEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events.lock().unwrap().push(tx);
        rx
    }
}

/// Retrieval client node: payment channels are derived addresses, and
/// vouchers are signed with a local keypair.
pub struct FakeRetrievalClientNode {
    keypair: Keypair,
    next_nonce: AtomicU64,
    vouchers: SyncMutex<Vec<rm::PaymentVoucher>>,
}

impl FakeRetrievalClientNode {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            keypair: Keypair::generate(),
            next_nonce: AtomicU64::new(0),
            vouchers: SyncMutex::new(Vec::new()),
        })
    }

    pub fn vouchers(&self) -> Vec<rm::PaymentVoucher> {
        self.vouchers.lock().unwrap().clone()
    }
}

#[async_trait]
impl rm::RetrievalClientNode for FakeRetrievalClientNode {
    async fn get_or_create_payment_channel(
        &self,
        client_wallet: Address,
        miner_wallet: Address,
        _funds: TokenAmount,
    ) -> rm::Result<Address> {
        let mut seed = Vec::new();
        seed.extend_from_slice(client_wallet.as_bytes());
        seed.extend_from_slice(miner_wallet.as_bytes());
        Ok(Address::from_bytes(*blake3::hash(&seed).as_bytes()))
    }

    async fn create_payment_voucher(
        &self,
        channel: Address,
        amount: TokenAmount,
    ) -> rm::Result<rm::PaymentVoucher> {
        let nonce = self.next_nonce.fetch_add(1, Ordering::SeqCst);
        let mut message = Vec::new();
        message.extend_from_slice(channel.as_bytes());
        message.extend_from_slice(&amount.to_base_units().to_le_bytes());
        message.extend_from_slice(&nonce.to_le_bytes());
        let voucher = rm::PaymentVoucher {
            channel,
            amount,
            nonce,
            signature: self.keypair.sign(&message),
        };
        self.vouchers.lock().unwrap().push(voucher.clone());
        Ok(voucher)
    }
}

/// Retrieval provider node over an in-memory sealed blockstore with a
/// piece-size table.
pub struct FakeRetrievalProviderNode {
    sealed: Arc<dyn Blockstore>,
    piece_sizes: SyncMutex<HashMap<Cid, u64>>,
    received: SyncMutex<TokenAmount>,
    /// When set, vouchers are credited at most this much per call.
    max_per_voucher: SyncMutex<Option<TokenAmount>>,
}

impl FakeRetrievalProviderNode {
    pub fn new(sealed: Arc<dyn Blockstore>) -> Arc<Self> {
        Arc::new(Self {
            sealed,
            piece_sizes: SyncMutex::new(HashMap::new()),
            received: SyncMutex::new(TokenAmount::ZERO),
            max_per_voucher: SyncMutex::new(None),
        })
    }

    pub fn expect_piece(&self, payload_cid: Cid, size: u64) {
        self.piece_sizes.lock().unwrap().insert(payload_cid, size);
    }

    pub fn total_received(&self) -> TokenAmount {
        *self.received.lock().unwrap()
    }

    pub fn set_max_per_voucher(&self, max: Option<TokenAmount>) {
        *self.max_per_voucher.lock().unwrap() = max;
    }
}

#[async_trait]
impl rm::RetrievalProviderNode for FakeRetrievalProviderNode {
    async fn get_piece_size(&self, payload_cid: &Cid) -> rm::Result<u64> {
        self.piece_sizes
            .lock()
            .unwrap()
            .get(payload_cid)
            .copied()
            .ok_or(rm::RetrievalError::NotFound)
    }

    async fn save_payment_voucher(
        &self,
        _channel: Address,
        voucher: rm::PaymentVoucher,
        _expected: TokenAmount,
    ) -> rm::Result<TokenAmount> {
        let credited = match *self.max_per_voucher.lock().unwrap() {
            Some(max) if voucher.amount > max => max,
            _ => voucher.amount,
        };
        let mut received = self.received.lock().unwrap();
        *received = received.saturating_add(credited);
        Ok(credited)
    }

    fn sealed_blockstore(&self) -> Arc<dyn Blockstore> {
        self.sealed.clone()
    }
}
