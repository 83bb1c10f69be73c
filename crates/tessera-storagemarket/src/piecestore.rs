use crate::error::Result;
use crate::types::{DealId, SectorId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_store::{decode_record, encode_record, Datastore, NamespacedDatastore};
use tracing::debug;

/// Where a deal's piece ended up: its sector and the byte range within.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct DealInfo {
    pub deal_id: DealId,
    pub sector_id: SectorId,
    pub offset: u64,
    pub length: u64,
}

/// Maps piece commitments to the deals and sector locations holding them.
/// Repeated adds for the same piece overwrite.
pub struct PieceStore {
    ds: NamespacedDatastore,
}

impl PieceStore {
    pub fn new(ds: Arc<dyn Datastore>) -> Self {
        Self {
            ds: NamespacedDatastore::new(ds, "pieces"),
        }
    }

    pub async fn add_deal_for_piece(&self, piece_ref: [u8; 32], info: DealInfo) -> Result<()> {
        self.ds.put(&piece_ref, encode_record(&info)?).await?;
        debug!(
            piece = hex::encode(piece_ref),
            deal_id = info.deal_id,
            sector_id = info.sector_id,
            "piece indexed"
        );
        Ok(())
    }

    pub async fn get_piece_info(&self, piece_ref: &[u8; 32]) -> Result<Option<DealInfo>> {
        match self.ds.get(piece_ref).await? {
            Some(bytes) => Ok(Some(decode_record(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_store::MemDatastore;

    #[tokio::test]
    async fn test_add_and_get() {
        let store = PieceStore::new(Arc::new(MemDatastore::new()));
        let info = DealInfo {
            deal_id: 7,
            sector_id: 3,
            offset: 128,
            length: 1016,
        };
        store.add_deal_for_piece([1u8; 32], info).await.unwrap();
        assert_eq!(store.get_piece_info(&[1u8; 32]).await.unwrap(), Some(info));
        assert_eq!(store.get_piece_info(&[2u8; 32]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_re_add_overwrites() {
        let store = PieceStore::new(Arc::new(MemDatastore::new()));
        let first = DealInfo {
            deal_id: 1,
            sector_id: 1,
            offset: 0,
            length: 127,
        };
        let second = DealInfo {
            deal_id: 2,
            sector_id: 9,
            offset: 127,
            length: 254,
        };
        store.add_deal_for_piece([5u8; 32], first).await.unwrap();
        store.add_deal_for_piece([5u8; 32], second).await.unwrap();
        assert_eq!(
            store.get_piece_info(&[5u8; 32]).await.unwrap(),
            Some(second)
        );
    }
}
