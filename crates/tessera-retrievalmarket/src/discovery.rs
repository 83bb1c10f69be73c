//! Local mapping of payload CIDs to known retrieval peers.

use crate::types::RetrievalPeer;
use std::sync::Arc;
use tessera_store::{decode_record, encode_record, Datastore, NamespacedDatastore, Result};
use tessera_types::Cid;
use tracing::warn;

/// Datastore-backed peer index. One peer per payload for now; re-adding
/// overwrites the previous entry.
pub struct Local {
    ds: NamespacedDatastore,
}

impl Local {
    pub fn new(ds: Arc<dyn Datastore>) -> Self {
        Self {
            ds: NamespacedDatastore::new(ds, "deals/local"),
        }
    }

    // TODO: track multiple peers per payload and return them all from
    // get_peers.
    pub async fn add_peer(&self, payload_cid: Cid, peer: RetrievalPeer) -> Result<()> {
        if self.ds.has(&payload_cid.to_bytes()).await? {
            warn!(payload = %payload_cid, "tracking multiple retrieval peers not implemented; overwriting");
        }
        self.ds
            .put(&payload_cid.to_bytes(), encode_record(&peer)?)
            .await
    }

    /// Peers known to hold `payload_cid`; empty when unknown.
    pub async fn get_peers(&self, payload_cid: &Cid) -> Result<Vec<RetrievalPeer>> {
        match self.ds.get(&payload_cid.to_bytes()).await? {
            Some(bytes) => Ok(vec![decode_record(&bytes)?]),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_store::MemDatastore;
    use tessera_types::{Address, PeerId, Prefix};

    fn peer(seed: u8) -> RetrievalPeer {
        RetrievalPeer {
            address: Address::from_bytes([seed; 32]),
            id: PeerId::random(),
        }
    }

    #[tokio::test]
    async fn test_unknown_payload_resolves_to_nothing() {
        let local = Local::new(Arc::new(MemDatastore::new()));
        let payload = Prefix::default().sum(b"unknown");
        assert!(local.get_peers(&payload).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_then_get() {
        let local = Local::new(Arc::new(MemDatastore::new()));
        let payload = Prefix::default().sum(b"payload");
        let p = peer(1);
        local.add_peer(payload, p).await.unwrap();
        assert_eq!(local.get_peers(&payload).await.unwrap(), vec![p]);
    }

    #[tokio::test]
    async fn test_re_add_overwrites() {
        let local = Local::new(Arc::new(MemDatastore::new()));
        let payload = Prefix::default().sum(b"payload");
        local.add_peer(payload, peer(1)).await.unwrap();
        let second = peer(2);
        local.add_peer(payload, second).await.unwrap();
        assert_eq!(local.get_peers(&payload).await.unwrap(), vec![second]);
    }
}
