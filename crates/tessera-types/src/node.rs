use crate::cid::{Cid, Codec, Prefix};
use crate::encoding::to_canonical_json;
use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};

/// An IPLD data-model node. Maps are represented as ordered entry lists so
/// that encoding, link order and traversal order are all deterministic.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Node {
    Null,
    Bool(bool),
    Integer(i64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Node>),
    Map(Vec<(String, Node)>),
    Link(Cid),
}

impl Node {
    /// Encode this node with the given codec.
    pub fn encode(&self, codec: Codec) -> Result<Vec<u8>> {
        match codec {
            Codec::DagJson => Ok(to_canonical_json(self)?.into_bytes()),
            Codec::Raw => match self {
                Node::Bytes(bytes) => Ok(bytes.clone()),
                other => Err(TypesError::UnexpectedNode(format!(
                    "raw codec cannot encode {:?}",
                    other
                ))),
            },
        }
    }

    /// Decode a payload with the given codec.
    pub fn decode(codec: Codec, data: &[u8]) -> Result<Node> {
        match codec {
            Codec::DagJson => {
                serde_json::from_slice(data).map_err(|e| TypesError::Serialization(e.to_string()))
            }
            Codec::Raw => Ok(Node::Bytes(data.to_vec())),
        }
    }

    /// Compute the CID of this node under the given prefix.
    pub fn cid(&self, prefix: Prefix) -> Result<Cid> {
        Ok(prefix.sum(&self.encode(prefix.codec)?))
    }

    /// Child links in document order: map entries first-to-last, list
    /// elements in index order, descending into inline substructure.
    pub fn links(&self) -> Vec<Cid> {
        let mut out = Vec::new();
        self.collect_links(&mut out);
        out
    }

    fn collect_links(&self, out: &mut Vec<Cid>) {
        match self {
            Node::Link(cid) => out.push(*cid),
            Node::List(items) => {
                for item in items {
                    item.collect_links(out);
                }
            }
            Node::Map(entries) => {
                for (_, value) in entries {
                    value.collect_links(out);
                }
            }
            _ => {}
        }
    }

    pub fn map(entries: Vec<(&str, Node)>) -> Node {
        Node::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    /// Look up a map field by name.
    pub fn field(&self, name: &str) -> Option<&Node> {
        match self {
            Node::Map(entries) => entries.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Look up a list element by index.
    pub fn index(&self, idx: usize) -> Option<&Node> {
        match self {
            Node::List(items) => items.get(idx),
            _ => None,
        }
    }
}
