//! Deterministic DAG fixtures.

use tessera_store::{put_node, Blockstore};
use tessera_types::{Cid, Codec, MultihashCode, Node, Prefix};

pub fn raw_prefix() -> Prefix {
    Prefix::new(Codec::Raw, MultihashCode::Blake3)
}

pub fn dag_prefix() -> Prefix {
    Prefix::new(Codec::DagJson, MultihashCode::Blake3)
}

/// The three-level fixture used across piece tests:
/// `nd3 -> { second: nd2, bear: c }`, `nd2 -> { first: nd1, dog: b }`,
/// `nd1 -> { cat: a }` over raw leaves a/b/c.
pub struct TestDag {
    pub root: Cid,
    pub nd2: Cid,
    pub nd1: Cid,
    pub leaf_a: Cid,
    pub leaf_b: Cid,
    pub leaf_c: Cid,
}

pub async fn build_test_dag(bs: &dyn Blockstore) -> TestDag {
    let leaf_a = put_node(bs, &Node::Bytes(b"aaaa".to_vec()), raw_prefix())
        .await
        .unwrap();
    let leaf_b = put_node(bs, &Node::Bytes(b"bbbb".to_vec()), raw_prefix())
        .await
        .unwrap();
    let leaf_c = put_node(bs, &Node::Bytes(b"cccc".to_vec()), raw_prefix())
        .await
        .unwrap();

    let nd1 = put_node(bs, &Node::map(vec![("cat", Node::Link(leaf_a))]), dag_prefix())
        .await
        .unwrap();
    let nd2 = put_node(
        bs,
        &Node::map(vec![("first", Node::Link(nd1)), ("dog", Node::Link(leaf_b))]),
        dag_prefix(),
    )
    .await
    .unwrap();
    let root = put_node(
        bs,
        &Node::map(vec![
            ("second", Node::Link(nd2)),
            ("bear", Node::Link(leaf_c)),
        ]),
        dag_prefix(),
    )
    .await
    .unwrap();

    TestDag {
        root,
        nd2,
        nd1,
        leaf_a,
        leaf_b,
        leaf_c,
    }
}
