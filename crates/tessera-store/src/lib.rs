//! Persistence for the tessera markets: a flat key-value [`Datastore`],
//! a content-addressed [`Blockstore`], and the typed [`StateStore`] the
//! deal drivers keep their records in.

pub mod blockstore;
pub mod datastore;
pub mod error;
pub mod statestore;

pub use blockstore::{put_node, Blockstore, BlockstoreLoader, MemBlockstore};
pub use datastore::{decode_record, encode_record, Datastore, MemDatastore, NamespacedDatastore};
pub use error::{Result, StoreError};
pub use statestore::{StateStore, StoredState};
