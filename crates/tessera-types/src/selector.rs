use serde::{Deserialize, Serialize};

/// Bound on selector recursion depth.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum RecursionLimit {
    None,
    Depth(u64),
}

impl RecursionLimit {
    /// One level deeper. `None` stays unbounded; `Depth(0)` stays exhausted.
    pub fn decrement(&self) -> RecursionLimit {
        match self {
            RecursionLimit::None => RecursionLimit::None,
            RecursionLimit::Depth(n) => RecursionLimit::Depth(n.saturating_sub(1)),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RecursionLimit::Depth(0))
    }
}

/// A declarative description of which edges of a DAG to explore.
///
/// The traversal engine interprets these; everything else in the system
/// treats selectors as opaque values, except for the distinguished
/// [`Selector::all`] used for whole-DAG transfers.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Selector {
    /// Match the current node, explore nothing further
    Matcher,
    /// Explore every edge of the current node with the inner selector
    ExploreAll(Box<Selector>),
    /// Repeatedly apply `sequence`, re-entering at every
    /// [`Selector::ExploreRecursiveEdge`], up to `limit` levels
    ExploreRecursive {
        limit: RecursionLimit,
        sequence: Box<Selector>,
    },
    /// Marker resolved to the innermost enclosing `ExploreRecursive`
    ExploreRecursiveEdge,
    /// Explore a single list index
    ExploreIndex { index: usize, next: Box<Selector> },
    /// Explore named map fields, each with its own selector
    ExploreFields { fields: Vec<(String, Selector)> },
}

impl Selector {
    /// The "explore all, recursively, without limit" selector used for
    /// whole-DAG data transfers.
    pub fn all() -> Selector {
        Selector::ExploreRecursive {
            limit: RecursionLimit::None,
            sequence: Box::new(Selector::ExploreAll(Box::new(
                Selector::ExploreRecursiveEdge,
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recursion_limit_decrement() {
        assert_eq!(RecursionLimit::None.decrement(), RecursionLimit::None);
        assert_eq!(
            RecursionLimit::Depth(2).decrement(),
            RecursionLimit::Depth(1)
        );
        assert!(RecursionLimit::Depth(0).is_exhausted());
        assert!(!RecursionLimit::None.is_exhausted());
    }

    #[test]
    fn test_all_selector_shape() {
        match Selector::all() {
            Selector::ExploreRecursive { limit, sequence } => {
                assert_eq!(limit, RecursionLimit::None);
                assert_eq!(
                    *sequence,
                    Selector::ExploreAll(Box::new(Selector::ExploreRecursiveEdge))
                );
            }
            other => panic!("unexpected selector {:?}", other),
        }
    }
}
