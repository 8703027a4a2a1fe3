//! Allocation Tracker
//!
//! Every node, fragment and recorded string the parser produces is charged to
//! an [`AllocTracker`]. The tracker keeps the blocks of the unit currently being
//! parsed on a "used" list; `mark` detaches that list to open a checkpoint and
//! `release_to_checkpoint` hands back everything charged since. The caller then
//! either drops the returned [`AllocList`] (syntax error) or moves it into the
//! [`Script`](crate::ast::types::Script) it built (success).
//!
//! The ledger behind a tracker is shared with every list it produced, so an
//! audit through [`AllocTracker::outstanding_blocks`] sees blocks owned by live
//! scripts as well as blocks still pending on the tracker.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

/// Bookkeeping header charged to every tracked block.
pub const BLOCK_HEADER_SIZE: usize = 16;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AllocError {
    #[error("out of memory: cannot allocate {requested} bytes")]
    OutOfMemory { requested: usize },
}

/// Handle to one tracked block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocId(u64);

impl AllocId {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub id: AllocId,
    pub size: usize,
}

#[derive(Debug, Default)]
struct Ledger {
    next_id: Cell<u64>,
    live_blocks: Cell<usize>,
    live_bytes: Cell<usize>,
    limit: Option<usize>,
}

impl Ledger {
    fn release(&self, block: &Block) {
        self.live_blocks.set(self.live_blocks.get().saturating_sub(1));
        self.live_bytes
            .set(self.live_bytes.get().saturating_sub(block.size + BLOCK_HEADER_SIZE));
    }
}

/// A detached run of tracked blocks, freed when dropped.
pub struct AllocList {
    ledger: Rc<Ledger>,
    // allocation order; iteration helpers reverse it
    blocks: Vec<Block>,
}

impl AllocList {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Block ids, most recent allocation first.
    pub fn ids(&self) -> Vec<AllocId> {
        self.blocks.iter().rev().map(|b| b.id).collect()
    }

    pub fn contains(&self, id: AllocId) -> bool {
        self.blocks.iter().any(|b| b.id == id)
    }

    /// Total bytes charged, headers included.
    pub fn bytes(&self) -> usize {
        self.blocks.iter().map(|b| b.size + BLOCK_HEADER_SIZE).sum()
    }
}

impl fmt::Debug for AllocList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocList")
            .field("blocks", &self.blocks.len())
            .field("bytes", &self.bytes())
            .finish()
    }
}

impl Drop for AllocList {
    fn drop(&mut self) {
        for block in self.blocks.drain(..) {
            self.ledger.release(&block);
        }
    }
}

/// Free every block of `list`. Consuming the list makes a double free impossible.
pub fn free_list(list: AllocList) {
    drop(list);
}

pub struct AllocTracker {
    ledger: Rc<Ledger>,
    used: RefCell<Vec<Block>>,
}

impl AllocTracker {
    pub fn new() -> Self {
        Self {
            ledger: Rc::new(Ledger::default()),
            used: RefCell::new(Vec::new()),
        }
    }

    /// A tracker that fails once more than `bytes` (headers included) are live.
    pub fn with_limit(bytes: usize) -> Self {
        Self {
            ledger: Rc::new(Ledger {
                limit: Some(bytes),
                ..Ledger::default()
            }),
            used: RefCell::new(Vec::new()),
        }
    }

    pub fn track_alloc(&self, size: usize) -> Result<AllocId, AllocError> {
        let total = size
            .checked_add(BLOCK_HEADER_SIZE)
            .ok_or(AllocError::OutOfMemory { requested: size })?;
        let live = self.ledger.live_bytes.get();
        if let Some(limit) = self.ledger.limit {
            if live.saturating_add(total) > limit {
                return Err(AllocError::OutOfMemory { requested: size });
            }
        }

        let id = AllocId(self.ledger.next_id.get());
        self.ledger.next_id.set(id.0 + 1);
        self.ledger.live_blocks.set(self.ledger.live_blocks.get() + 1);
        self.ledger.live_bytes.set(live + total);
        self.used.borrow_mut().push(Block { id, size });
        Ok(id)
    }

    /// Detach the current used list, opening a checkpoint.
    pub fn mark(&self) -> AllocList {
        let blocks = std::mem::take(&mut *self.used.borrow_mut());
        AllocList {
            ledger: Rc::clone(&self.ledger),
            blocks,
        }
    }

    /// Restore `saved` as the used list and return what accumulated since the
    /// matching [`mark`](Self::mark).
    pub fn release_to_checkpoint(&self, mut saved: AllocList) -> AllocList {
        let restored = std::mem::take(&mut saved.blocks);
        let since = std::mem::replace(&mut *self.used.borrow_mut(), restored);
        AllocList {
            ledger: Rc::clone(&self.ledger),
            blocks: since,
        }
    }

    /// Blocks charged since the last checkpoint.
    pub fn pending(&self) -> usize {
        self.used.borrow().len()
    }

    /// Blocks alive anywhere: pending here or owned by lists and scripts.
    pub fn outstanding_blocks(&self) -> usize {
        self.ledger.live_blocks.get()
    }

    pub fn outstanding_bytes(&self) -> usize {
        self.ledger.live_bytes.get()
    }
}

impl Default for AllocTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AllocTracker {
    fn drop(&mut self) {
        for block in self.used.get_mut().drain(..) {
            self.ledger.release(&block);
        }
    }
}
