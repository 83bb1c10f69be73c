//! Selector-driven DAG traversal.
//!
//! The walk loads the root, visits it, then explores edges in document
//! order, loading every link through a caller-supplied [`LinkLoader`].
//! Link-load order is fully deterministic: identical subtrees yield
//! identical load sequences, and duplicate links are re-loaded rather than
//! deduplicated. Callers that want each block once (the CAR writer) keep
//! their own seen-set.

use crate::cid::Cid;
use crate::error::{Result, TypesError};
use crate::node::Node;
use crate::selector::Selector;
use async_trait::async_trait;

/// Where in the parent document a link was found.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct LinkContext {
    /// Map key or list index the link sat under; `None` for the root.
    pub path_segment: Option<String>,
}

impl LinkContext {
    pub fn root() -> Self {
        Self { path_segment: None }
    }

    pub fn at(segment: impl Into<String>) -> Self {
        Self {
            path_segment: Some(segment.into()),
        }
    }
}

/// Supplies the raw bytes behind a link. Implementations range from a
/// blockstore lookup to a rendezvous with a network peer.
#[async_trait]
pub trait LinkLoader: Send {
    async fn load_link(&mut self, link: &Cid, ctx: &LinkContext) -> Result<Vec<u8>>;
}

/// Callback invoked for every loaded block, in load order.
pub type Visitor<'a> = dyn FnMut(&Cid, &[u8], &Node) -> Result<()> + Send + 'a;

/// Walk the DAG rooted at `root` under `selector`, loading links through
/// `loader` and reporting each loaded block to `visit`.
pub async fn walk(
    root: &Cid,
    selector: &Selector,
    loader: &mut (dyn LinkLoader + '_),
    visit: &mut Visitor<'_>,
) -> Result<()> {
    let mut stack: Vec<(LinkContext, Cid, Selector, Option<Selector>)> =
        vec![(LinkContext::root(), *root, selector.clone(), None)];

    while let Some((ctx, cid, sel, rec)) = stack.pop() {
        let bytes = loader.load_link(&cid, &ctx).await?;
        let node = Node::decode(cid.prefix.codec, &bytes)?;
        visit(&cid, &bytes, &node)?;

        let mut edges = Vec::new();
        edges_of(&node, &sel, rec.as_ref(), &mut edges)?;
        for edge in edges.into_iter().rev() {
            stack.push(edge);
        }
    }
    Ok(())
}

/// Collect the link edges `selector` explores out of `node`, in document
/// order. Inline substructure (maps in maps, lists in maps, ...) is
/// descended synchronously; only links become pending edges.
fn edges_of(
    node: &Node,
    selector: &Selector,
    rec: Option<&Selector>,
    out: &mut Vec<(LinkContext, Cid, Selector, Option<Selector>)>,
) -> Result<()> {
    match selector {
        Selector::Matcher => Ok(()),
        Selector::ExploreRecursive { limit, sequence } => {
            if limit.is_exhausted() {
                return Ok(());
            }
            let next_rec = Selector::ExploreRecursive {
                limit: limit.decrement(),
                sequence: sequence.clone(),
            };
            edges_of(node, sequence, Some(&next_rec), out)
        }
        Selector::ExploreRecursiveEdge => match rec {
            Some(recursive) => {
                let recursive = recursive.clone();
                edges_of(node, &recursive, None, out)
            }
            None => Err(TypesError::InvalidSelector(
                "recursive edge outside of a recursion".to_string(),
            )),
        },
        Selector::ExploreAll(next) => {
            match node {
                Node::Map(entries) => {
                    for (key, child) in entries {
                        explore_child(key.clone(), child, next, rec, out)?;
                    }
                }
                Node::List(items) => {
                    for (idx, child) in items.iter().enumerate() {
                        explore_child(idx.to_string(), child, next, rec, out)?;
                    }
                }
                _ => {}
            }
            Ok(())
        }
        Selector::ExploreIndex { index, next } => {
            if let Some(child) = node.index(*index) {
                explore_child(index.to_string(), child, next, rec, out)?;
            }
            Ok(())
        }
        Selector::ExploreFields { fields } => {
            for (name, sub) in fields {
                if let Some(child) = node.field(name) {
                    explore_child(name.clone(), child, sub, rec, out)?;
                }
            }
            Ok(())
        }
    }
}

fn explore_child(
    segment: String,
    child: &Node,
    selector: &Selector,
    rec: Option<&Selector>,
    out: &mut Vec<(LinkContext, Cid, Selector, Option<Selector>)>,
) -> Result<()> {
    match child {
        Node::Link(cid) => {
            out.push((
                LinkContext::at(segment),
                *cid,
                selector.clone(),
                rec.cloned(),
            ));
            Ok(())
        }
        inline => edges_of(inline, selector, rec, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid::{Codec, MultihashCode, Prefix};
    use crate::selector::RecursionLimit;
    use std::collections::HashMap;

    struct MapLoader {
        blocks: HashMap<Cid, Vec<u8>>,
    }

    #[async_trait]
    impl LinkLoader for MapLoader {
        async fn load_link(&mut self, link: &Cid, _ctx: &LinkContext) -> Result<Vec<u8>> {
            self.blocks
                .get(link)
                .cloned()
                .ok_or_else(|| TypesError::TraversalAborted(format!("missing block {}", link)))
        }
    }

    fn raw_prefix() -> Prefix {
        Prefix::new(Codec::Raw, MultihashCode::Blake3)
    }

    fn dag_prefix() -> Prefix {
        Prefix::new(Codec::DagJson, MultihashCode::Blake3)
    }

    fn put(blocks: &mut HashMap<Cid, Vec<u8>>, node: &Node, prefix: Prefix) -> Cid {
        let bytes = node.encode(prefix.codec).unwrap();
        let cid = prefix.sum(&bytes);
        blocks.insert(cid, bytes);
        cid
    }

    async fn load_order(root: Cid, selector: &Selector, loader: &mut MapLoader) -> Vec<Cid> {
        let mut order = Vec::new();
        let mut visit = |cid: &Cid, _bytes: &[u8], _node: &Node| -> Result<()> {
            order.push(*cid);
            Ok(())
        };
        walk(&root, selector, loader, &mut visit).await.unwrap();
        order
    }

    #[tokio::test]
    async fn test_walk_all_visits_depth_first_in_document_order() {
        let mut blocks = HashMap::new();
        let a = put(&mut blocks, &Node::Bytes(b"aaaa".to_vec()), raw_prefix());
        let b = put(&mut blocks, &Node::Bytes(b"bbbb".to_vec()), raw_prefix());

        let mid = put(
            &mut blocks,
            &Node::map(vec![("left", Node::Link(a)), ("right", Node::Link(b))]),
            dag_prefix(),
        );
        let root = put(
            &mut blocks,
            &Node::map(vec![("mid", Node::Link(mid)), ("extra", Node::Link(a))]),
            dag_prefix(),
        );

        let mut loader = MapLoader { blocks };
        let order = load_order(root, &Selector::all(), &mut loader).await;
        assert_eq!(order, vec![root, mid, a, b, a]);
    }

    #[tokio::test]
    async fn test_walk_descends_inline_structure() {
        let mut blocks = HashMap::new();
        let leaf = put(&mut blocks, &Node::Bytes(b"leaf".to_vec()), raw_prefix());
        let root = put(
            &mut blocks,
            &Node::map(vec![(
                "nested",
                Node::map(vec![("inner", Node::Link(leaf))]),
            )]),
            dag_prefix(),
        );

        let mut loader = MapLoader { blocks };
        let order = load_order(root, &Selector::all(), &mut loader).await;
        assert_eq!(order, vec![root, leaf]);
    }

    #[tokio::test]
    async fn test_recursion_limit_bounds_depth() {
        let mut blocks = HashMap::new();
        let leaf = put(&mut blocks, &Node::Bytes(b"0".to_vec()), raw_prefix());
        let one = put(
            &mut blocks,
            &Node::map(vec![("next", Node::Link(leaf))]),
            dag_prefix(),
        );
        let two = put(
            &mut blocks,
            &Node::map(vec![("next", Node::Link(one))]),
            dag_prefix(),
        );

        let limited = Selector::ExploreRecursive {
            limit: RecursionLimit::Depth(2),
            sequence: Box::new(Selector::ExploreAll(Box::new(
                Selector::ExploreRecursiveEdge,
            ))),
        };

        let mut loader = MapLoader { blocks };
        let order = load_order(two, &limited, &mut loader).await;
        // root at depth 0, `one` at depth 1, `leaf` cut off at the limit
        assert_eq!(order, vec![two, one]);
    }

    #[tokio::test]
    async fn test_explore_fields_and_index() {
        let mut blocks = HashMap::new();
        let a = put(&mut blocks, &Node::Bytes(b"a".to_vec()), raw_prefix());
        let b = put(&mut blocks, &Node::Bytes(b"b".to_vec()), raw_prefix());
        let list = put(
            &mut blocks,
            &Node::List(vec![Node::Link(a), Node::Link(b)]),
            dag_prefix(),
        );
        let root = put(
            &mut blocks,
            &Node::map(vec![("skip", Node::Link(a)), ("take", Node::Link(list))]),
            dag_prefix(),
        );

        let selector = Selector::ExploreFields {
            fields: vec![(
                "take".to_string(),
                Selector::ExploreIndex {
                    index: 1,
                    next: Box::new(Selector::Matcher),
                },
            )],
        };

        let mut loader = MapLoader { blocks };
        let order = load_order(root, &selector, &mut loader).await;
        assert_eq!(order, vec![root, list, b]);
    }

    #[tokio::test]
    async fn test_loader_error_aborts_walk() {
        let mut blocks = HashMap::new();
        let missing = raw_prefix().sum(b"never stored");
        let root = put(
            &mut blocks,
            &Node::map(vec![("gone", Node::Link(missing))]),
            dag_prefix(),
        );

        let mut loader = MapLoader { blocks };
        let mut visited = 0usize;
        let mut visit = |_: &Cid, _: &[u8], _: &Node| -> Result<()> {
            visited += 1;
            Ok(())
        };
        let err = walk(&root, &Selector::all(), &mut loader, &mut visit).await;
        assert!(err.is_err());
        assert_eq!(visited, 1);
    }
}
