//! # Node Transforms
//!
//! Transforms react to dirty nodes of one type and may edit the draft
//! further before it commits, e.g. to keep a list's numbering consistent or
//! to turn typed text into a link.
//!
//! ## Design
//!
//! After the mutator returns, the engine runs in rounds:
//!
//! 1. normalize the text nodes dirtied since the last round
//! 2. take the set of nodes dirtied since the last round
//! 3. invoke every transform registered for a dirty node's type, in node
//!    type registration order
//!
//! Whatever the transforms dirty starts the next round. The loop ends when a
//! round starts with nothing dirty; a transaction that needs more rounds than
//! the configured cap fails with `InfiniteTransformLoop`.

use crate::normalize::normalize_text_nodes;
use crate::{EditorError, EditorResult, ListenerId, Txn};
use std::rc::Rc;
use std::sync::Arc;
use tessera_model::NodeKey;
use tracing::{debug, error};

pub type TransformFn = Rc<dyn Fn(&mut Txn<'_>, &NodeKey) -> EditorResult<()>>;

#[derive(Clone)]
struct TransformEntry {
    id: ListenerId,
    node_type: Arc<str>,
    transform: TransformFn,
}

/// Registered transforms, in registration order
#[derive(Clone, Default)]
pub struct TransformEngine {
    transforms: Vec<TransformEntry>,
}

impl std::fmt::Debug for TransformEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.transforms.iter().map(|entry| &entry.node_type))
            .finish()
    }
}

impl TransformEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: ListenerId, node_type: &str, transform: TransformFn) {
        self.transforms.push(TransformEntry {
            id,
            node_type: Arc::from(node_type),
            transform,
        });
    }

    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.transforms.len();
        self.transforms.retain(|entry| entry.id != id);
        self.transforms.len() != before
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Run rounds until nothing is left dirty. Returns the number of rounds
    /// that invoked transforms.
    pub fn run(&self, txn: &mut Txn<'_>, max_rounds: usize) -> EditorResult<usize> {
        let registry = txn.registry();
        let mut ordered = self.transforms.clone();
        ordered.sort_by_key(|entry| registry.position(&entry.node_type).unwrap_or(usize::MAX));

        let mut rounds = 0;
        loop {
            normalize_text_nodes(txn)?;
            let round = txn.take_round();
            if round.is_empty() || ordered.is_empty() {
                return Ok(rounds);
            }
            if rounds == max_rounds {
                error!(
                    rounds,
                    dirty = round.len(),
                    "node transforms keep dirtying nodes, aborting the update"
                );
                return Err(EditorError::InfiniteTransformLoop { iterations: rounds });
            }
            rounds += 1;

            let mut dirty: Vec<NodeKey> = round
                .keys()
                .filter(|key| round.is_intentionally_dirty(key))
                .cloned()
                .collect();
            dirty.sort_by_cached_key(|key| txn.nodes().path(key));

            for entry in &ordered {
                for key in &dirty {
                    let matches = txn
                        .get(key)
                        .is_some_and(|node| node.node_type() == &*entry.node_type)
                        && txn.nodes().is_attached(key);
                    if matches {
                        (entry.transform)(&mut *txn, key)?;
                    }
                }
            }
            debug!(round = rounds, dirty = dirty.len(), "ran node transforms");
        }
    }
}
