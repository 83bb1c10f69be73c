//! A fixed IPLD tree with a known whole-DAG walk order, for verifier and
//! traverser tests.

use tessera_store::Blockstore;
use tessera_types::{Block, Cid, Node};

use crate::dag::{dag_prefix, raw_prefix};

/// Shape:
///
/// ```text
/// root: { plain: "olde string",
///         linkedString: leafAlpha,
///         linkedMap: middleMap,
///         linkedList: middleList }
/// middleMap: { foo: true, bar: false,
///              nested: { alink: leafAlpha, nonlink: "zoo" } }
/// middleList: [ leafAlpha, leafAlpha, leafBeta, leafAlpha ]
/// ```
///
/// Whole-DAG walk order:
/// root, leafAlpha, middleMap, leafAlpha, middleList, leafAlpha,
/// leafAlpha, leafBeta, leafAlpha.
pub struct TestIpldTree {
    pub root_block: Block,
    pub leaf_alpha_block: Block,
    pub leaf_beta_block: Block,
    pub middle_map_block: Block,
    pub middle_list_block: Block,
    pub root: Cid,
    pub leaf_alpha: Cid,
    pub leaf_beta: Cid,
    pub middle_map: Cid,
    pub middle_list: Cid,
    /// The expected link-load order under the whole-DAG selector.
    pub expected_order: Vec<Cid>,
}

impl TestIpldTree {
    pub fn new() -> Self {
        let leaf_alpha_block = Block::wrap(
            Node::Bytes(b"alpha".to_vec()).encode(raw_prefix().codec).unwrap(),
            raw_prefix(),
        );
        let leaf_beta_block = Block::wrap(
            Node::Bytes(b"beta".to_vec()).encode(raw_prefix().codec).unwrap(),
            raw_prefix(),
        );
        let leaf_alpha = leaf_alpha_block.cid;
        let leaf_beta = leaf_beta_block.cid;

        let middle_map_node = Node::map(vec![
            ("foo", Node::Bool(true)),
            ("bar", Node::Bool(false)),
            (
                "nested",
                Node::map(vec![
                    ("alink", Node::Link(leaf_alpha)),
                    ("nonlink", Node::String("zoo".into())),
                ]),
            ),
        ]);
        let middle_map_block = Block::wrap(
            middle_map_node.encode(dag_prefix().codec).unwrap(),
            dag_prefix(),
        );
        let middle_map = middle_map_block.cid;

        let middle_list_node = Node::List(vec![
            Node::Link(leaf_alpha),
            Node::Link(leaf_alpha),
            Node::Link(leaf_beta),
            Node::Link(leaf_alpha),
        ]);
        let middle_list_block = Block::wrap(
            middle_list_node.encode(dag_prefix().codec).unwrap(),
            dag_prefix(),
        );
        let middle_list = middle_list_block.cid;

        let root_node = Node::map(vec![
            ("plain", Node::String("olde string".into())),
            ("linkedString", Node::Link(leaf_alpha)),
            ("linkedMap", Node::Link(middle_map)),
            ("linkedList", Node::Link(middle_list)),
        ]);
        let root_block =
            Block::wrap(root_node.encode(dag_prefix().codec).unwrap(), dag_prefix());
        let root = root_block.cid;

        let expected_order = vec![
            root, leaf_alpha, middle_map, leaf_alpha, middle_list, leaf_alpha, leaf_alpha,
            leaf_beta, leaf_alpha,
        ];

        Self {
            root_block,
            leaf_alpha_block,
            leaf_beta_block,
            middle_map_block,
            middle_list_block,
            root,
            leaf_alpha,
            leaf_beta,
            middle_map,
            middle_list,
            expected_order,
        }
    }

    /// The blocks in walk order, with repeats, as a provider would send
    /// them.
    pub fn blocks_in_order(&self) -> Vec<Block> {
        self.expected_order
            .iter()
            .map(|cid| self.block_for(cid))
            .collect()
    }

    pub fn block_for(&self, cid: &Cid) -> Block {
        for block in [
            &self.root_block,
            &self.leaf_alpha_block,
            &self.leaf_beta_block,
            &self.middle_map_block,
            &self.middle_list_block,
        ] {
            if &block.cid == cid {
                return block.clone();
            }
        }
        panic!("unknown cid {}", cid);
    }

    /// Store every block into `bs`.
    pub async fn load_into(&self, bs: &dyn Blockstore) {
        for block in [
            &self.root_block,
            &self.leaf_alpha_block,
            &self.leaf_beta_block,
            &self.middle_map_block,
            &self.middle_list_block,
        ] {
            bs.put(block).await.unwrap();
        }
    }
}

impl Default for TestIpldTree {
    fn default() -> Self {
        Self::new()
    }
}
