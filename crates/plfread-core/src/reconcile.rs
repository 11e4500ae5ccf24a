//! Append-log session reconciliation.
//!
//! The container is an append-only log: markers delimit sessions, and only
//! committed sessions contribute to the final state. Within the committed
//! stream, a later block for the same object id supersedes an earlier one:
//! last write wins by log position alone, never by any embedded timestamp.
//!
//! Reconciliation is a pure function over the framed sequence. Supersession
//! is represented as an explicit ordered arena (insertion-ordered slots plus
//! an object-id index) rather than mutation scattered through the scan, so
//! the step is independently testable.

use crate::container::{BlockRecord, Frame, LogMarker};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Diagnostic record for a session that never committed.
///
/// Its blocks are excluded from the authoritative view; they are surfaced to
/// the caller as metadata, never merged into the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteSession {
    /// Framing index of the session's first block
    pub start_index: usize,
    /// Number of blocks the session contained
    pub block_count: usize,
    /// True when the session ended with an explicit `##CLOSE##` marker,
    /// false when the log simply stopped (crash tail)
    pub closed: bool,
}

/// Result of reconciling the framed sequence.
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Final-state blocks, de-duplicated by object id, in first-appearance order
    pub entities: Vec<BlockRecord>,
    /// Sessions excluded from the authoritative view
    pub incomplete: Vec<IncompleteSession>,
}

/// Insertion-ordered arena with last-write-wins supersession by object id.
#[derive(Debug, Default)]
struct EntityArena {
    slots: Vec<BlockRecord>,
    by_id: HashMap<u64, usize>,
}

impl EntityArena {
    fn apply(&mut self, block: BlockRecord) {
        match self.by_id.get(&block.object_id) {
            Some(&slot) => {
                trace!(
                    object_id = block.object_id,
                    superseded = self.slots[slot].index,
                    by = block.index,
                    "entity superseded"
                );
                self.slots[slot] = block;
            }
            None => {
                self.by_id.insert(block.object_id, self.slots.len());
                self.slots.push(block);
            }
        }
    }
}

/// Reconciles framed blocks and markers into final-state entities.
pub fn reconcile(frames: Vec<Frame>) -> Reconciliation {
    let mut arena = EntityArena::default();
    let mut incomplete = Vec::new();
    let mut pending: Vec<BlockRecord> = Vec::new();

    for frame in frames {
        match frame {
            Frame::Block(block) => pending.push(block),
            Frame::Marker { marker, offset } => match marker {
                LogMarker::Commit => {
                    trace!(offset, blocks = pending.len(), "session committed");
                    for block in pending.drain(..) {
                        arena.apply(block);
                    }
                }
                LogMarker::Close => {
                    if !pending.is_empty() {
                        debug!(
                            offset,
                            blocks = pending.len(),
                            "session closed without commit; discarding"
                        );
                        incomplete.push(IncompleteSession {
                            start_index: pending[0].index,
                            block_count: pending.len(),
                            closed: true,
                        });
                        pending.clear();
                    }
                }
            },
        }
    }

    // Trailing blocks with no terminating marker: a crash tail. Every
    // uncommitted session is discarded, never a partial one kept.
    if !pending.is_empty() {
        debug!(blocks = pending.len(), "unterminated trailing session; discarding");
        incomplete.push(IncompleteSession {
            start_index: pending[0].index,
            block_count: pending.len(),
            closed: false,
        });
    }

    debug!(
        entities = arena.slots.len(),
        incomplete = incomplete.len(),
        "log reconciled"
    );

    Reconciliation {
        entities: arena.slots,
        incomplete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{BlockFlags, BlockKind};

    fn block(index: usize, object_id: u64, payload: &[u8]) -> Frame {
        Frame::Block(BlockRecord {
            index,
            offset: 96 + index * 32,
            frame_len: 20 + payload.len(),
            kind: BlockKind::Data,
            flags: BlockFlags(0),
            object_id,
            schema_id: 1,
            signature: None,
            payload: payload.to_vec(),
        })
    }

    fn commit() -> Frame {
        Frame::Marker {
            marker: LogMarker::Commit,
            offset: 0,
        }
    }

    fn close() -> Frame {
        Frame::Marker {
            marker: LogMarker::Close,
            offset: 0,
        }
    }

    #[test]
    fn test_committed_session_is_authoritative() {
        let result = reconcile(vec![block(0, 1, b"a"), block(1, 2, b"b"), commit()]);
        assert_eq!(result.entities.len(), 2);
        assert!(result.incomplete.is_empty());
    }

    #[test]
    fn test_last_write_wins_by_position() {
        let result = reconcile(vec![
            block(0, 1, b"old"),
            block(1, 2, b"other"),
            block(2, 1, b"new"),
            commit(),
        ]);
        assert_eq!(result.entities.len(), 2);
        // Superseded in place: first-appearance order is preserved
        assert_eq!(result.entities[0].object_id, 1);
        assert_eq!(result.entities[0].payload, b"new");
        assert_eq!(result.entities[1].object_id, 2);
    }

    #[test]
    fn test_supersession_across_sessions() {
        let result = reconcile(vec![
            block(0, 1, b"v1"),
            commit(),
            block(1, 1, b"v2"),
            commit(),
        ]);
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].payload, b"v2");
    }

    #[test]
    fn test_unterminated_tail_discarded() {
        let result = reconcile(vec![
            block(0, 1, b"committed"),
            commit(),
            block(1, 2, b"lost"),
        ]);
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].object_id, 1);
        assert_eq!(
            result.incomplete,
            vec![IncompleteSession {
                start_index: 1,
                block_count: 1,
                closed: false,
            }]
        );
    }

    #[test]
    fn test_closed_session_discarded() {
        let result = reconcile(vec![
            block(0, 1, b"kept"),
            commit(),
            block(1, 1, b"abandoned"),
            close(),
        ]);
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].payload, b"kept");
        assert_eq!(result.incomplete.len(), 1);
        assert!(result.incomplete[0].closed);
    }

    #[test]
    fn test_multiple_uncommitted_sessions_all_discarded() {
        let result = reconcile(vec![
            block(0, 1, b"kept"),
            commit(),
            block(1, 2, b"x"),
            close(),
            block(2, 3, b"y"),
        ]);
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.incomplete.len(), 2);
        assert!(result.incomplete[0].closed);
        assert!(!result.incomplete[1].closed);
    }

    #[test]
    fn test_commit_after_close_recovers() {
        let result = reconcile(vec![
            block(0, 1, b"dropped"),
            close(),
            block(1, 2, b"committed"),
            commit(),
        ]);
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].object_id, 2);
        assert_eq!(result.incomplete.len(), 1);
    }

    #[test]
    fn test_empty_log() {
        let result = reconcile(Vec::new());
        assert!(result.entities.is_empty());
        assert!(result.incomplete.is_empty());
    }

    #[test]
    fn test_bare_commit_is_noop() {
        let result = reconcile(vec![commit(), commit()]);
        assert!(result.entities.is_empty());
        assert!(result.incomplete.is_empty());
    }
}
