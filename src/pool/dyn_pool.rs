//! Elastic overflow tier: dynamic blocks and their ordered pool.
//!
//! A block moves through four states:
//!
//! ```text
//! Allocated --first slot acquired--> Active
//! Active    --last slot freed-----> Idle   (idle stamp set)
//! Idle      --slot reacquired-----> Active (idle stamp cleared)
//! Idle      --idle timeout--------> Freed  (terminal, pool compacts)
//! ```
//!
//! The state is not stored as an enum; it is fully determined by occupancy
//! plus the idle stamp (`last_active_at_us == 0` while any slot is occupied
//! or the block has never drained). The sweeper normalises the stamp every
//! tick and reclaims blocks whose idle period has elapsed.

use crate::pool::bank::SlotBank;

/// One overflow block: N₂ slots with their own contiguous arenas.
#[derive(Debug)]
pub struct DynBlock {
    pub(crate) bank: SlotBank,
    last_active_at_us: u64,
}

impl DynBlock {
    fn new(bank: SlotBank) -> Self {
        Self {
            bank,
            last_active_at_us: 0,
        }
    }

    /// Monotonic reading from when the block last drained to fully free;
    /// zero while any slot is occupied.
    pub fn last_active_at_us(&self) -> u64 {
        self.last_active_at_us
    }

    /// Clear the idle stamp (a slot is being acquired).
    pub(crate) fn mark_active(&mut self) {
        self.last_active_at_us = 0;
    }

    /// Record the instant the block became fully free.
    pub(crate) fn stamp_idle(&mut self, now_us: u64) {
        self.last_active_at_us = now_us;
    }

    /// Read access to the underlying bank.
    pub fn bank(&self) -> &SlotBank {
        &self.bank
    }
}

/// Ordered collection of up to B dynamic blocks.
#[derive(Debug)]
pub struct DynPool {
    blocks: Vec<DynBlock>,
    max_blocks: usize,
    slots_per_block: usize,
    topic_cap: usize,
    payload_cap: usize,
}

impl DynPool {
    /// Create an empty pool; blocks are allocated on first overflow demand.
    pub fn new(
        max_blocks: usize,
        slots_per_block: usize,
        topic_cap: usize,
        payload_cap: usize,
    ) -> Self {
        Self {
            blocks: Vec::new(),
            max_blocks,
            slots_per_block,
            topic_cap,
            payload_cap,
        }
    }

    /// Current block count.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// True when no block is allocated.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Read access to block `idx`.
    pub fn block(&self, idx: usize) -> &DynBlock {
        &self.blocks[idx]
    }

    pub(crate) fn block_mut(&mut self, idx: usize) -> &mut DynBlock {
        &mut self.blocks[idx]
    }

    /// Iterate blocks in pool order.
    pub fn iter(&self) -> impl Iterator<Item = &DynBlock> {
        self.blocks.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut DynBlock> {
        self.blocks.iter_mut()
    }

    /// Append a new block if under the cap and the arenas can be allocated.
    ///
    /// Returns the new block's index. `None` covers both the hard cap and a
    /// failed allocation; the caller falls through to eviction either way.
    pub fn try_grow(&mut self) -> Option<usize> {
        if self.blocks.len() >= self.max_blocks {
            return None;
        }
        match SlotBank::try_new(self.slots_per_block, self.topic_cap, self.payload_cap) {
            Ok(bank) => {
                self.blocks.push(DynBlock::new(bank));
                Some(self.blocks.len() - 1)
            }
            Err(err) => {
                tracing::warn!(error = %err, "overflow block allocation failed, falling back to eviction");
                None
            }
        }
    }

    /// Drop every block that has been fully free for longer than
    /// `idle_timeout_us`. Surviving blocks keep their order.
    pub fn reclaim_idle(&mut self, now_us: u64, idle_timeout_us: u64) -> usize {
        let before = self.blocks.len();
        self.blocks.retain(|block| {
            let idle = block.bank.all_free()
                && block.last_active_at_us != 0
                && now_us.saturating_sub(block.last_active_at_us) > idle_timeout_us;
            !idle
        });
        before - self.blocks.len()
    }

    /// Drop every block unconditionally.
    pub fn clear(&mut self) {
        self.blocks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> DynPool {
        DynPool::new(2, 3, 16, 16)
    }

    #[test]
    fn grows_until_cap() {
        let mut pool = pool();
        assert_eq!(pool.try_grow(), Some(0));
        assert_eq!(pool.try_grow(), Some(1));
        assert_eq!(pool.try_grow(), None);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn fresh_block_has_zero_idle_stamp() {
        let mut pool = pool();
        let idx = pool.try_grow().unwrap();
        assert_eq!(pool.block(idx).last_active_at_us(), 0);
        assert!(pool.block(idx).bank().all_free());
    }

    #[test]
    fn reclaims_only_blocks_past_idle_timeout() {
        let mut pool = pool();
        pool.try_grow();
        pool.try_grow();
        pool.block_mut(0).stamp_idle(1_000);
        pool.block_mut(1).stamp_idle(4_000);

        // block 0 idle for 4000us, block 1 for 1000us
        assert_eq!(pool.reclaim_idle(5_000, 2_000), 1);
        assert_eq!(pool.len(), 1);
        // survivor is the former block 1, order preserved by retain
        assert_eq!(pool.block(0).last_active_at_us(), 4_000);
    }

    #[test]
    fn occupied_block_is_never_reclaimed() {
        let mut pool = pool();
        let idx = pool.try_grow().unwrap();
        pool.block_mut(idx).bank.fill(0, b"t", b"p", false, 1, 0);
        // stamp of zero means "never drained": not a reclaim candidate
        assert_eq!(pool.reclaim_idle(u64::MAX, 1), 0);
    }
}
