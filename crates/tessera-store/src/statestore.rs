use crate::datastore::{decode_record, encode_record, Datastore};
use crate::error::{Result, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tessera_types::Cid;
use tokio::sync::Mutex;

/// Typed deal records over a datastore, keyed by CID, with single-writer
/// mutation semantics per key: `begin` registers a record, `mutate`
/// applies a closure under that key's lock, `end` removes it.
pub struct StateStore<T> {
    ds: Arc<dyn Datastore>,
    locks: Arc<Mutex<HashMap<Vec<u8>, Arc<Mutex<()>>>>>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for StateStore<T> {
    fn clone(&self) -> Self {
        Self {
            ds: self.ds.clone(),
            locks: self.locks.clone(),
            _record: PhantomData,
        }
    }
}

impl<T> StateStore<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    pub fn new(ds: Arc<dyn Datastore>) -> Self {
        Self {
            ds,
            locks: Arc::new(Mutex::new(HashMap::new())),
            _record: PhantomData,
        }
    }

    async fn key_lock(&self, key: &[u8]) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.to_vec())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Start tracking a record. Fails if the key is already present; a
    /// re-sent proposal must not silently replace an in-flight deal.
    pub async fn begin(&self, key: Cid, record: &T) -> Result<()> {
        let key_bytes = key.to_bytes();
        let lock = self.key_lock(&key_bytes).await;
        let _guard = lock.lock().await;

        if self.ds.has(&key_bytes).await? {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        self.ds.put(&key_bytes, encode_record(record)?).await
    }

    pub async fn has(&self, key: &Cid) -> Result<bool> {
        self.ds.has(&key.to_bytes()).await
    }

    /// A handle to one record.
    pub fn get(&self, key: Cid) -> StoredState<T> {
        StoredState {
            store: self.clone(),
            key,
        }
    }

    pub async fn list(&self) -> Result<Vec<T>> {
        let entries = self.ds.list(b"").await?;
        entries
            .into_iter()
            .map(|(_, bytes)| decode_record(&bytes))
            .collect()
    }
}

/// Handle to a single record in a [`StateStore`].
pub struct StoredState<T> {
    store: StateStore<T>,
    key: Cid,
}

impl<T> StoredState<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    pub async fn fetch(&self) -> Result<T> {
        let bytes = self
            .store
            .ds
            .get(&self.key.to_bytes())
            .await?
            .ok_or_else(|| StoreError::NotFound(self.key.to_string()))?;
        decode_record(&bytes)
    }

    /// Mutate the record under its key lock and return the updated value.
    pub async fn mutate<F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut T) + Send,
    {
        let key_bytes = self.key.to_bytes();
        let lock = self.store.key_lock(&key_bytes).await;
        let _guard = lock.lock().await;

        let bytes = self
            .store
            .ds
            .get(&key_bytes)
            .await?
            .ok_or_else(|| StoreError::NotFound(self.key.to_string()))?;
        let mut record: T = decode_record(&bytes)?;
        f(&mut record);
        self.store.ds.put(&key_bytes, encode_record(&record)?).await?;
        Ok(record)
    }

    /// Stop tracking the record.
    pub async fn end(&self) -> Result<()> {
        let key_bytes = self.key.to_bytes();
        let lock = self.store.key_lock(&key_bytes).await;
        let _guard = lock.lock().await;

        if !self.store.ds.has(&key_bytes).await? {
            return Err(StoreError::NotFound(self.key.to_string()));
        }
        self.store.ds.delete(&key_bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::MemDatastore;
    use serde::Deserialize;
    use tessera_types::{Codec, MultihashCode, Prefix};

    #[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
    struct Record {
        state: String,
        count: u64,
    }

    fn key(n: u8) -> Cid {
        Prefix::new(Codec::Raw, MultihashCode::Blake3).sum(&[n])
    }

    fn store() -> StateStore<Record> {
        StateStore::new(Arc::new(MemDatastore::new()))
    }

    #[tokio::test]
    async fn test_begin_get_mutate_end() {
        let store = store();
        let k = key(1);
        let record = Record {
            state: "new".into(),
            count: 0,
        };

        store.begin(k, &record).await.unwrap();
        assert_eq!(store.get(k).fetch().await.unwrap(), record);

        let updated = store
            .get(k)
            .mutate(|r| {
                r.state = "active".into();
                r.count += 1;
            })
            .await
            .unwrap();
        assert_eq!(updated.state, "active");
        assert_eq!(store.get(k).fetch().await.unwrap().count, 1);

        store.get(k).end().await.unwrap();
        assert!(matches!(
            store.get(k).fetch().await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_begin_rejects_duplicates() {
        let store = store();
        let k = key(2);
        let record = Record {
            state: "new".into(),
            count: 0,
        };
        store.begin(k, &record).await.unwrap();
        assert!(matches!(
            store.begin(k, &record).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_mutations_serialize_per_key() {
        let store = store();
        let k = key(3);
        store
            .begin(
                k,
                &Record {
                    state: "new".into(),
                    count: 0,
                },
            )
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.get(k).mutate(|r| r.count += 1).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.get(k).fetch().await.unwrap().count, 16);
    }

    #[tokio::test]
    async fn test_list_returns_all_records() {
        let store = store();
        for n in 0..3u8 {
            store
                .begin(
                    key(n),
                    &Record {
                        state: "new".into(),
                        count: n as u64,
                    },
                )
                .await
                .unwrap();
        }
        let mut listed = store.list().await.unwrap();
        listed.sort_by_key(|r| r.count);
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[2].count, 2);
    }
}
