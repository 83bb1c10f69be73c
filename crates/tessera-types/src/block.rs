use crate::cid::{Cid, Prefix};
use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};

/// A content-addressed block: payload bytes plus the CID they hash to.
/// The prefix travels inside the CID, so a receiver can always recompute
/// `cid.prefix.sum(data)` and compare.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Block {
    pub cid: Cid,
    pub data: Vec<u8>,
}

impl Block {
    /// Build a block from payload and claimed CID, verifying the claim.
    pub fn new(data: Vec<u8>, cid: Cid) -> Result<Self> {
        let computed = cid.prefix.sum(&data);
        if computed != cid {
            return Err(TypesError::CidMismatch {
                expected: cid.to_hex(),
                computed: computed.to_hex(),
            });
        }
        Ok(Self { cid, data })
    }

    /// Build a block by hashing the payload under the given prefix.
    pub fn wrap(data: Vec<u8>, prefix: Prefix) -> Self {
        let cid = prefix.sum(&data);
        Self { cid, data }
    }

    pub fn verify(&self) -> bool {
        self.cid.prefix.sum(&self.data) == self.cid
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
