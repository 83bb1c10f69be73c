//! A cooperative DAG walk that suspends at every link load.
//!
//! The walk runs on its own task; the controller alternates
//! `current_request` / `advance`, supplying the bytes for each pending
//! link. Two rendezvous channels connect the sides: the walk publishes
//! its state (next link wanted, or done) and blocks until a response
//! arrives. Decoupling block acquisition from block consumption this way
//! is what lets received blocks be verified in stream order.

use crate::error::{RetrievalError, Result};
use async_trait::async_trait;
use tessera_types::traversal::{LinkContext, LinkLoader};
use tessera_types::{Cid, Selector, TypesError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct WalkState {
    is_done: bool,
    current: Option<(Cid, LinkContext)>,
}

enum WalkResponse {
    Data(Vec<u8>),
    Error(String),
}

/// Controller half of the cooperative traversal.
///
/// Single-controller protocol: `start` once, then serial calls to
/// `current_request` / `advance` / `error`. `current_request` is
/// meaningful exactly while the traversal is not complete.
pub struct Traverser {
    root: Cid,
    is_done: bool,
    current: Option<(Cid, LinkContext)>,
    /// True when the walk owes us a state we have not yet consumed.
    pending: bool,
    state_rx: mpsc::Receiver<WalkState>,
    state_tx: Option<mpsc::Sender<WalkState>>,
    response_tx: mpsc::Sender<WalkResponse>,
    response_rx: Option<mpsc::Receiver<WalkResponse>>,
    cancel: CancellationToken,
}

impl Traverser {
    pub fn new(root: Cid) -> Self {
        let (state_tx, state_rx) = mpsc::channel(1);
        let (response_tx, response_rx) = mpsc::channel(1);
        Self {
            root,
            is_done: false,
            current: None,
            pending: false,
            state_rx,
            state_tx: Some(state_tx),
            response_tx,
            response_rx: Some(response_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Arm the traversal: spawn the walk task under the whole-DAG
    /// selector. Must be called exactly once.
    pub fn start(&mut self, cancel: CancellationToken) {
        let (Some(state_tx), Some(response_rx)) = (self.state_tx.take(), self.response_rx.take())
        else {
            debug!(root = %self.root, "traversal already started");
            return;
        };
        self.cancel = cancel.clone();
        self.pending = true;

        let root = self.root;
        tokio::spawn(async move {
            let mut loader = RendezvousLoader {
                state_tx: state_tx.clone(),
                response_rx,
                cancel: cancel.clone(),
            };
            let mut visit =
                |_: &Cid, _: &[u8], _: &tessera_types::Node| -> tessera_types::Result<()> {
                    Ok(())
                };
            let result = walk_guarded(root, &mut loader, &mut visit).await;
            if let Err(e) = result {
                debug!(root = %root, error = %e, "traversal ended early");
            }
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = state_tx.send(WalkState { is_done: true, current: None }) => {}
            }
        });
    }

    async fn check_state(&mut self) {
        if self.cancel.is_cancelled() {
            self.is_done = true;
            self.current = None;
            self.pending = false;
            return;
        }
        if !self.pending {
            return;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => {
                self.is_done = true;
                self.current = None;
                self.pending = false;
            }
            state = self.state_rx.recv() => {
                if let Some(state) = state {
                    self.is_done = state.is_done;
                    self.current = state.current;
                } else {
                    self.is_done = true;
                    self.current = None;
                }
                self.pending = false;
            }
        }
    }

    /// Whether the walk has terminated (success, error or cancellation).
    pub async fn is_complete(&mut self) -> bool {
        self.check_state().await;
        self.is_done
    }

    /// The link the walk is currently blocked on.
    pub async fn current_request(&mut self) -> Option<(Cid, LinkContext)> {
        self.check_state().await;
        self.current.clone()
    }

    /// Supply the bytes for the current pending link; the walk resumes
    /// until it needs the next one.
    pub async fn advance(&mut self, data: Vec<u8>) -> Result<()> {
        if self.is_complete().await {
            return Err(RetrievalError::TraversalComplete);
        }
        self.pending = true;
        tokio::select! {
            _ = self.cancel.cancelled() => Err(RetrievalError::Cancelled),
            sent = self.response_tx.send(WalkResponse::Data(data)) => {
                sent.map_err(|_| RetrievalError::TraversalComplete)
            }
        }
    }

    /// Abort the walk with an error; the traversal terminates.
    pub async fn error(&mut self, message: String) {
        if self.is_complete().await {
            return;
        }
        self.pending = true;
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = self.response_tx.send(WalkResponse::Error(message)) => {}
        }
    }
}

async fn walk_guarded(
    root: Cid,
    loader: &mut RendezvousLoader,
    visit: &mut tessera_types::Visitor<'_>,
) -> tessera_types::Result<()> {
    tessera_types::walk(&root, &Selector::all(), loader, visit).await
}

/// The walk-side half: publishes each wanted link and blocks until the
/// controller responds.
struct RendezvousLoader {
    state_tx: mpsc::Sender<WalkState>,
    response_rx: mpsc::Receiver<WalkResponse>,
    cancel: CancellationToken,
}

#[async_trait]
impl LinkLoader for RendezvousLoader {
    async fn load_link(
        &mut self,
        link: &Cid,
        ctx: &LinkContext,
    ) -> tessera_types::Result<Vec<u8>> {
        let state = WalkState {
            is_done: false,
            current: Some((*link, ctx.clone())),
        };
        tokio::select! {
            _ = self.cancel.cancelled() => {
                return Err(TypesError::TraversalAborted("context cancelled".into()));
            }
            sent = self.state_tx.send(state) => {
                if sent.is_err() {
                    return Err(TypesError::TraversalAborted("controller gone".into()));
                }
            }
        }
        tokio::select! {
            _ = self.cancel.cancelled() => {
                Err(TypesError::TraversalAborted("context cancelled".into()))
            }
            response = self.response_rx.recv() => match response {
                Some(WalkResponse::Data(bytes)) => Ok(bytes),
                Some(WalkResponse::Error(message)) => {
                    Err(TypesError::TraversalAborted(message))
                }
                None => Err(TypesError::TraversalAborted("controller gone".into())),
            },
        }
    }
}
