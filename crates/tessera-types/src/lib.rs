//! Core data model for the tessera storage and retrieval markets.
//!
//! Content identifiers, blocks, the IPLD node model, selectors and the
//! selector-driven traversal engine, plus the key/address/token types the
//! deal drivers share.

pub mod address;
pub mod amount;
pub mod block;
pub mod cid;
pub mod encoding;
pub mod error;
pub mod frames;
pub mod keys;
pub mod node;
pub mod selector;
pub mod traversal;

pub use address::Address;
pub use amount::TokenAmount;
pub use block::Block;
pub use cid::{Cid, Codec, MultihashCode, Prefix, CID_BYTE_LEN};
pub use encoding::{canonical_hash, to_canonical_json};
pub use error::{Result, TypesError};
pub use keys::{Keypair, PublicKey, Signature};
pub use node::Node;
pub use selector::{RecursionLimit, Selector};
pub use traversal::{walk, LinkContext, LinkLoader, Visitor};

/// Peer identity on the wire. Re-exported so downstream crates do not need
/// a direct libp2p dependency for the identifier alone.
pub use libp2p::PeerId;
