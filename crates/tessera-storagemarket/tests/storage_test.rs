//! End-to-end storage deal over the in-memory network: proposal →
//! validation → pull transfer → commitment verification → publish →
//! staging → sealing → piece indexing.

use std::sync::Arc;
use std::time::Duration;
use tessera_filestore::FileStore;
use tessera_pieceio::PieceIO;
use tessera_retrievalmarket::Local;
use tessera_storagemarket::{
    Client, ClientDealParams, ClientEvent, DealState, PieceStore, Provider, ProviderConfig,
    ProviderEvent,
};
use tessera_store::{MemBlockstore, MemDatastore, StateStore};
use tessera_testutil::{
    build_test_dag, FakeDataTransfer, FakeStorageClientNode, FakeStorageProviderNode,
    TestStorageNetwork,
};
use tessera_types::{PeerId, TokenAmount};
use tokio::sync::mpsc;
use tokio::time::timeout;

struct Harness {
    client: Arc<Client>,
    provider: Arc<Provider>,
    provider_node: Arc<FakeStorageProviderNode>,
    client_node: Arc<FakeStorageClientNode>,
    piece_store: Arc<PieceStore>,
    data_transfer: Arc<FakeDataTransfer>,
    provider_peer: PeerId,
    payload: tessera_types::Cid,
    _client_dir: tempfile::TempDir,
    _provider_dir: tempfile::TempDir,
}

async fn harness(config: ProviderConfig) -> Harness {
    let client_bs = Arc::new(MemBlockstore::new());
    let provider_bs = Arc::new(MemBlockstore::new());
    let dag = build_test_dag(client_bs.as_ref()).await;

    let network = TestStorageNetwork::new();
    let provider_peer = PeerId::random();
    let client_peer = PeerId::random();

    let provider_dir = tempfile::tempdir().unwrap();
    let provider_fs = Arc::new(FileStore::new(provider_dir.path()).unwrap());
    let provider_node = FakeStorageProviderNode::new(provider_bs.clone());
    let piece_store = Arc::new(PieceStore::new(Arc::new(MemDatastore::new())));
    let data_transfer = FakeDataTransfer::new(client_bs.clone(), provider_bs.clone());

    let provider = Provider::new(
        config,
        provider_node.worker_address(),
        provider_node.clone(),
        Arc::new(PieceIO::new(provider_fs.clone(), provider_bs.clone())),
        provider_fs,
        piece_store.clone(),
        data_transfer.clone(),
        network.handle(provider_peer),
        StateStore::new(Arc::new(MemDatastore::new())),
    )
    .await
    .unwrap();
    provider.start().await.unwrap();

    let client_dir = tempfile::tempdir().unwrap();
    let client_fs = Arc::new(FileStore::new(client_dir.path()).unwrap());
    let client_node = FakeStorageClientNode::new();
    let client = Client::new(
        network.handle(client_peer),
        client_fs.clone(),
        Arc::new(PieceIO::new(client_fs, client_bs)),
        Arc::new(Local::new(Arc::new(MemDatastore::new()))),
        client_node.clone(),
        StateStore::new(Arc::new(MemDatastore::new())),
    );
    client.start().await.unwrap();

    Harness {
        client,
        provider,
        provider_node,
        client_node,
        piece_store,
        data_transfer,
        provider_peer,
        payload: dag.root,
        _client_dir: client_dir,
        _provider_dir: provider_dir,
    }
}

fn deal_params(h: &Harness) -> ClientDealParams {
    ClientDealParams {
        data: h.payload,
        price_per_epoch: TokenAmount::from_base_units(5),
        proposal_expiration: 100_000,
        duration: 10,
        provider_address: h.provider_node.worker_address(),
        client: h.client_node.address(),
        miner_worker: h.provider_node.worker_address(),
        miner_id: h.provider_peer,
    }
}

#[tokio::test]
async fn test_storage_deal_end_to_end() {
    let h = harness(ProviderConfig::default()).await;

    let (client_tx, mut client_events) = mpsc::unbounded_channel();
    h.client
        .subscribe(Arc::new(move |event, deal| {
            let _ = client_tx.send((event, deal));
        }))
        .await;
    let (provider_tx, mut provider_events) = mpsc::unbounded_channel();
    h.provider
        .subscribe(Arc::new(move |event, deal| {
            let _ = provider_tx.send((event, deal));
        }))
        .await;

    let proposal_cid = h.client.start_deal(deal_params(&h)).await.unwrap();

    let client_deal = timeout(Duration::from_secs(10), async {
        loop {
            let (event, deal) = client_events.recv().await.expect("client events ended");
            match event {
                ClientEvent::Complete => return deal,
                ClientEvent::Error => panic!("client deal failed: {}", deal.message),
                _ => {}
            }
        }
    })
    .await
    .expect("client deal timed out");

    let provider_deal = timeout(Duration::from_secs(10), async {
        loop {
            let (event, deal) = provider_events.recv().await.expect("provider events ended");
            match event {
                ProviderEvent::Complete => return deal,
                ProviderEvent::Error => panic!("provider deal failed: {}", deal.message),
                _ => {}
            }
        }
    })
    .await
    .expect("provider deal timed out");

    assert_eq!(client_deal.proposal_cid, proposal_cid);
    assert_eq!(client_deal.state, DealState::Complete);
    assert!(client_deal.publish_message.is_some());
    assert_eq!(client_deal.deal_id, Some(1));

    assert_eq!(provider_deal.proposal_cid, proposal_cid);
    assert_eq!(provider_deal.state, DealState::Complete);
    assert_eq!(provider_deal.deal_id, Some(1));
    assert!(provider_deal.piece_path.is_some());

    // the provider re-derived the same commitment the client proposed
    assert_eq!(provider_deal.proposal.piece_ref, client_deal.proposal.piece_ref);

    // the pull was opened against the client with the right payload
    let pulls = h.data_transfer.pulls();
    assert_eq!(pulls.len(), 1);
    assert_eq!(pulls[0].1.proposal, proposal_cid);
    assert_eq!(pulls[0].2, h.payload);

    // the piece was handed to sealing and indexed
    assert!(!h.provider_node.completed_pieces().is_empty());
    let info = h
        .piece_store
        .get_piece_info(&provider_deal.proposal.piece_ref)
        .await
        .unwrap()
        .expect("piece not indexed");
    assert_eq!(info.deal_id, 1);
}

#[tokio::test]
async fn test_expired_proposal_fails_deal_on_both_sides() {
    let h = harness(ProviderConfig::default()).await;
    // chain is already past the proposal's expiration
    h.provider_node.set_height(200_000);

    let (client_tx, mut client_events) = mpsc::unbounded_channel();
    h.client
        .subscribe(Arc::new(move |event, deal| {
            let _ = client_tx.send((event, deal));
        }))
        .await;

    h.client.start_deal(deal_params(&h)).await.unwrap();

    let failed = timeout(Duration::from_secs(10), async {
        loop {
            let (event, deal) = client_events.recv().await.expect("client events ended");
            match event {
                ClientEvent::Error => return deal,
                ClientEvent::Complete => panic!("deal should have failed validation"),
                _ => {}
            }
        }
    })
    .await
    .expect("failure timed out");

    assert_eq!(failed.state, DealState::Failed);
    assert!(failed.message.contains("expired"));

    // nothing was ever pulled
    assert!(h.data_transfer.pulls().is_empty());
}

#[tokio::test]
async fn test_undersized_piece_is_rejected() {
    let h = harness(ProviderConfig {
        min_piece_size: 1 << 20,
        ..ProviderConfig::default()
    })
    .await;

    let (client_tx, mut client_events) = mpsc::unbounded_channel();
    h.client
        .subscribe(Arc::new(move |event, deal| {
            let _ = client_tx.send((event, deal));
        }))
        .await;

    h.client.start_deal(deal_params(&h)).await.unwrap();

    let failed = timeout(Duration::from_secs(10), async {
        loop {
            let (event, deal) = client_events.recv().await.expect("client events ended");
            match event {
                ClientEvent::Error => return deal,
                ClientEvent::Complete => panic!("deal should have been rejected"),
                _ => {}
            }
        }
    })
    .await
    .expect("failure timed out");

    assert_eq!(failed.state, DealState::Failed);
    assert!(failed.message.contains("piece size"));
}

#[tokio::test]
async fn test_query_ask_roundtrip() {
    let h = harness(ProviderConfig::default()).await;

    let ask = h
        .client
        .query_ask(h.provider_peer, h.provider_node.worker_address())
        .await
        .unwrap();
    assert_eq!(ask.ask.miner, h.provider_node.worker_address());
    assert_eq!(ask.ask.price, ProviderConfig::default().price);

    // asking for a different miner yields no ask
    let err = h
        .client
        .query_ask(h.provider_peer, tessera_types::Address::from_bytes([0u8; 32]))
        .await;
    assert!(err.is_err());
}
