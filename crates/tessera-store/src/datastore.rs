use crate::error::{Result, StoreError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A flat key-value store. Deal records, discovery entries and the piece
/// index all persist through this interface.
#[async_trait]
pub trait Datastore: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<()>;
    async fn has(&self, key: &[u8]) -> Result<bool>;
    async fn delete(&self, key: &[u8]) -> Result<()>;
    /// All entries whose key starts with `prefix`, in key order.
    async fn list(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// In-memory datastore for tests and single-process deployments.
#[derive(Default)]
pub struct MemDatastore {
    entries: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemDatastore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Datastore for MemDatastore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.entries.write().await.insert(key.to_vec(), value);
        Ok(())
    }

    async fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Prefixes every key with `/{namespace}/`, isolating one subsystem's
/// entries from another's on a shared datastore.
pub struct NamespacedDatastore {
    inner: Arc<dyn Datastore>,
    prefix: Vec<u8>,
}

impl NamespacedDatastore {
    pub fn new(inner: Arc<dyn Datastore>, namespace: &str) -> Self {
        let mut prefix = Vec::with_capacity(namespace.len() + 2);
        prefix.push(b'/');
        prefix.extend_from_slice(namespace.as_bytes());
        prefix.push(b'/');
        Self { inner, prefix }
    }

    fn scoped(&self, key: &[u8]) -> Vec<u8> {
        let mut scoped = self.prefix.clone();
        scoped.extend_from_slice(key);
        scoped
    }
}

#[async_trait]
impl Datastore for NamespacedDatastore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get(&self.scoped(key)).await
    }

    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.inner.put(&self.scoped(key), value).await
    }

    async fn has(&self, key: &[u8]) -> Result<bool> {
        self.inner.has(&self.scoped(key)).await
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        self.inner.delete(&self.scoped(key)).await
    }

    async fn list(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let entries = self.inner.list(&self.scoped(prefix)).await?;
        Ok(entries
            .into_iter()
            .map(|(k, v)| (k[self.prefix.len()..].to_vec(), v))
            .collect())
    }
}

/// Serialize a record for storage.
pub fn encode_record<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Deserialize a stored record.
pub fn decode_record<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mem_datastore_basics() {
        let ds = MemDatastore::new();
        assert!(ds.get(b"k").await.unwrap().is_none());

        ds.put(b"k", b"v".to_vec()).await.unwrap();
        assert!(ds.has(b"k").await.unwrap());
        assert_eq!(ds.get(b"k").await.unwrap(), Some(b"v".to_vec()));

        ds.delete(b"k").await.unwrap();
        assert!(!ds.has(b"k").await.unwrap());
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let shared: Arc<dyn Datastore> = Arc::new(MemDatastore::new());
        let a = NamespacedDatastore::new(shared.clone(), "alpha");
        let b = NamespacedDatastore::new(shared.clone(), "beta");

        a.put(b"key", b"from-a".to_vec()).await.unwrap();
        assert!(b.get(b"key").await.unwrap().is_none());
        assert_eq!(a.get(b"key").await.unwrap(), Some(b"from-a".to_vec()));

        let listed = a.list(b"").await.unwrap();
        assert_eq!(listed, vec![(b"key".to_vec(), b"from-a".to_vec())]);
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix() {
        let ds = MemDatastore::new();
        ds.put(b"deal/1", b"a".to_vec()).await.unwrap();
        ds.put(b"deal/2", b"b".to_vec()).await.unwrap();
        ds.put(b"peer/1", b"c".to_vec()).await.unwrap();

        let deals = ds.list(b"deal/").await.unwrap();
        assert_eq!(deals.len(), 2);
    }
}
