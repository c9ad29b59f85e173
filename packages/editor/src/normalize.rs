//! Commit-time cleanup
//!
//! Adjacent simple text nodes with the same format and style are merged and
//! empty simple text nodes are dropped, so the committed tree has one text
//! node per formatting run. Nodes left detached at the end of a transaction
//! are garbage collected.

use crate::{EditorResult, Txn};
use std::collections::HashSet;
use tessera_model::{Node, NodeKey};
use tracing::debug;

/// Merge or drop the text nodes dirtied in the current transform round.
pub(crate) fn normalize_text_nodes(txn: &mut Txn<'_>) -> EditorResult<()> {
    let mut candidates: Vec<NodeKey> = txn.round().leaves().cloned().collect();
    candidates.sort();

    for key in candidates {
        let Some(text) = txn.get(&key).and_then(Node::as_text) else {
            continue;
        };
        if !text.is_simple() || text.is_unmergeable() || !txn.nodes().is_attached(&key) {
            continue;
        }
        if text.is_empty() {
            txn.remove(&key)?;
            continue;
        }

        let mut current = key;
        if let Some(previous) = txn.nodes().previous_sibling(&current).cloned() {
            if mergeable(txn, &previous, &current) {
                current = txn.merge_with_sibling(&current, true)?;
            }
        }
        while let Some(next) = txn.nodes().next_sibling(&current).cloned() {
            if !mergeable(txn, &current, &next) {
                break;
            }
            txn.merge_with_sibling(&current, false)?;
        }
    }
    Ok(())
}

fn mergeable(txn: &Txn<'_>, a: &NodeKey, b: &NodeKey) -> bool {
    match (
        txn.get(a).and_then(Node::as_text),
        txn.get(b).and_then(Node::as_text),
    ) {
        (Some(a), Some(b)) => a.can_merge_with(b),
        _ => false,
    }
}

/// Drop every dirty node that ended the transaction detached, together with
/// its subtree. Returns the dropped keys.
pub(crate) fn collect_garbage(txn: &mut Txn<'_>) -> EditorResult<Vec<NodeKey>> {
    let mut seen = HashSet::new();
    let mut removed = Vec::new();
    let candidates: Vec<NodeKey> = txn
        .dirty()
        .keys()
        .filter(|key| !key.is_root())
        .cloned()
        .collect();

    for key in candidates {
        if !txn.nodes().contains(&key) || txn.nodes().is_attached(&key) {
            continue;
        }
        for dead in txn.nodes().subtree(&key) {
            if seen.insert(dead.clone()) {
                removed.push(dead);
            }
        }
    }

    if !removed.is_empty() {
        debug!(count = removed.len(), "collected detached nodes");
        txn.drop_nodes(&removed)?;
    }
    Ok(removed)
}
