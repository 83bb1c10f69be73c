use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hash function identifiers usable in a CID. All digests are 32 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum MultihashCode {
    Blake3,
    Sha2_256,
}

impl MultihashCode {
    pub fn digest(&self, data: &[u8]) -> [u8; 32] {
        match self {
            MultihashCode::Blake3 => *blake3::hash(data).as_bytes(),
            MultihashCode::Sha2_256 => {
                let mut hasher = Sha256::new();
                hasher.update(data);
                hasher.finalize().into()
            }
        }
    }

    fn code(&self) -> u8 {
        match self {
            MultihashCode::Blake3 => 0x1e,
            MultihashCode::Sha2_256 => 0x12,
        }
    }

    fn from_code(code: u8) -> Result<Self> {
        match code {
            0x1e => Ok(MultihashCode::Blake3),
            0x12 => Ok(MultihashCode::Sha2_256),
            other => Err(TypesError::InvalidCid(format!(
                "unknown multihash code {:#x}",
                other
            ))),
        }
    }
}

/// Content codecs a block payload may be encoded with.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Codec {
    /// Payload is an opaque byte string
    Raw,
    /// Payload is a canonically encoded IPLD node
    DagJson,
}

impl Codec {
    fn code(&self) -> u8 {
        match self {
            Codec::Raw => 0x55,
            Codec::DagJson => 0x29,
        }
    }

    fn from_code(code: u8) -> Result<Self> {
        match code {
            0x55 => Ok(Codec::Raw),
            0x29 => Ok(Codec::DagJson),
            other => Err(TypesError::InvalidCid(format!(
                "unknown codec {:#x}",
                other
            ))),
        }
    }
}

/// The self-describing portion of a CID: version, payload codec and hash
/// function. `prefix.sum(payload)` rebuilds the full identifier, which is
/// how received blocks are checked against their claimed CIDs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Prefix {
    pub version: u8,
    pub codec: Codec,
    pub mh_type: MultihashCode,
}

impl Prefix {
    pub fn new(codec: Codec, mh_type: MultihashCode) -> Self {
        Self {
            version: 1,
            codec,
            mh_type,
        }
    }

    pub fn sum(&self, data: &[u8]) -> Cid {
        Cid {
            prefix: *self,
            digest: self.mh_type.digest(data),
        }
    }
}

impl Default for Prefix {
    fn default() -> Self {
        Self::new(Codec::DagJson, MultihashCode::Blake3)
    }
}

/// Content identifier: a prefix plus a 32-byte digest. Equality is
/// byte-equality of the serialized form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cid {
    pub prefix: Prefix,
    pub digest: [u8; 32],
}

/// Serialized length of a CID: version + codec + multihash code + digest.
pub const CID_BYTE_LEN: usize = 35;

impl Cid {
    pub fn new(prefix: Prefix, digest: [u8; 32]) -> Self {
        Self { prefix, digest }
    }

    pub fn to_bytes(&self) -> [u8; CID_BYTE_LEN] {
        let mut out = [0u8; CID_BYTE_LEN];
        out[0] = self.prefix.version;
        out[1] = self.prefix.codec.code();
        out[2] = self.prefix.mh_type.code();
        out[3..].copy_from_slice(&self.digest);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != CID_BYTE_LEN {
            return Err(TypesError::InvalidCid(format!(
                "expected {} bytes, got {}",
                CID_BYTE_LEN,
                bytes.len()
            )));
        }
        if bytes[0] != 1 {
            return Err(TypesError::InvalidCid(format!(
                "unsupported CID version {}",
                bytes[0]
            )));
        }
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&bytes[3..]);
        Ok(Self {
            prefix: Prefix {
                version: bytes[0],
                codec: Codec::from_code(bytes[1])?,
                mh_type: MultihashCode::from_code(bytes[2])?,
            },
            digest,
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| TypesError::InvalidCid(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({}...)", &self.to_hex()[..12])
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_sum_is_deterministic() {
        let prefix = Prefix::new(Codec::Raw, MultihashCode::Blake3);
        let a = prefix.sum(b"hello");
        let b = prefix.sum(b"hello");
        assert_eq!(a, b);
        assert_ne!(a, prefix.sum(b"world"));
    }

    #[test]
    fn test_cid_roundtrip_bytes_and_hex() {
        let cid = Prefix::new(Codec::DagJson, MultihashCode::Sha2_256).sum(b"payload");
        let restored = Cid::from_bytes(&cid.to_bytes()).unwrap();
        assert_eq!(cid, restored);

        let hex = cid.to_hex();
        assert_eq!(cid, Cid::from_hex(&hex).unwrap());
    }

    #[test]
    fn test_cid_rejects_bad_bytes() {
        assert!(Cid::from_bytes(&[0u8; 4]).is_err());
        let mut bytes = Prefix::default().sum(b"x").to_bytes();
        bytes[1] = 0xff;
        assert!(Cid::from_bytes(&bytes).is_err());
    }
}
