//! Tiered admission across the static and dynamic pools.
//!
//! `acquire` tries, in order: first free static slot, first free slot across
//! existing dynamic blocks, growth of a new block, then eviction of the
//! oldest occupied slot anywhere. Eviction is the documented lossy
//! degradation mode: the victim's message will not be delivered reliably,
//! and the caller is told which id was lost so it can say so in the log.
//!
//! The oldest occupant is chosen over the youngest because it is the one
//! most likely to have already missed its acknowledgement window; newer
//! in-flight work keeps its chance of completing under sustained overload.

use crate::pool::bank::Slot;
use crate::pool::dyn_pool::DynPool;
use crate::pool::static_pool::StaticPool;
use crate::transport::MessageId;
use std::collections::TryReserveError;

/// Position of a slot in the two-tier pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAddr {
    /// Slot in the static tier.
    Static(usize),
    /// Slot in a dynamic block.
    Dynamic {
        /// Block index in pool order.
        block: usize,
        /// Slot index within the block.
        slot: usize,
    },
}

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A free slot was found (or a block was grown).
    Free(SlotAddr),
    /// The oldest occupant was evicted to make room.
    Evicted {
        /// Address of the recycled slot.
        addr: SlotAddr,
        /// Id that was being tracked there; its delivery is no longer
        /// guaranteed.
        lost_id: MessageId,
    },
}

impl Admission {
    /// The slot address regardless of how it was obtained.
    pub fn addr(&self) -> SlotAddr {
        match *self {
            Admission::Free(addr) => addr,
            Admission::Evicted { addr, .. } => addr,
        }
    }
}

/// Admission, lookup, and maintenance over both pool tiers.
#[derive(Debug)]
pub struct TieredAllocator {
    statics: StaticPool,
    dynamics: DynPool,
}

impl TieredAllocator {
    /// Build the static tier and an empty dynamic pool.
    pub fn new(
        static_slots: usize,
        block_slots: usize,
        max_blocks: usize,
        topic_cap: usize,
        payload_cap: usize,
    ) -> Result<Self, TryReserveError> {
        Ok(Self {
            statics: StaticPool::new(static_slots, topic_cap, payload_cap)?,
            dynamics: DynPool::new(max_blocks, block_slots, topic_cap, payload_cap),
        })
    }

    /// Find a slot for a new tracked message.
    ///
    /// Returns `None` only if every pool is empty, which cannot happen with
    /// a non-zero static tier; the facade maps it to a saturation error.
    pub fn acquire(&mut self) -> Option<Admission> {
        // 1. static tier, index order
        if let Some(idx) = self.statics.bank.first_free() {
            return Some(Admission::Free(SlotAddr::Static(idx)));
        }

        // 2. existing blocks, block order then slot order
        for block_idx in 0..self.dynamics.len() {
            if let Some(slot_idx) = self.dynamics.block(block_idx).bank().first_free() {
                self.dynamics.block_mut(block_idx).mark_active();
                return Some(Admission::Free(SlotAddr::Dynamic {
                    block: block_idx,
                    slot: slot_idx,
                }));
            }
        }

        // 3. grow the overflow tier
        if let Some(block_idx) = self.dynamics.try_grow() {
            self.dynamics.block_mut(block_idx).mark_active();
            return Some(Admission::Free(SlotAddr::Dynamic {
                block: block_idx,
                slot: 0,
            }));
        }

        // 4. evict the oldest occupant anywhere
        let addr = self.oldest_occupied()?;
        let lost_id = match addr {
            SlotAddr::Static(idx) => self.statics.bank.release(idx),
            SlotAddr::Dynamic { block, slot } => {
                // the victim's block stays active, its slot is refilled next
                self.dynamics.block_mut(block).mark_active();
                self.dynamics.block_mut(block).bank.release(slot)
            }
        };
        Some(Admission::Evicted { addr, lost_id })
    }

    /// Copy a message into the slot at `addr` and mark it occupied.
    pub fn fill(
        &mut self,
        addr: SlotAddr,
        topic: &[u8],
        payload: &[u8],
        retain: bool,
        msg_id: MessageId,
        now_us: u64,
    ) {
        match addr {
            SlotAddr::Static(idx) => {
                self.statics
                    .bank
                    .fill(idx, topic, payload, retain, msg_id, now_us);
            }
            SlotAddr::Dynamic { block, slot } => {
                let block = self.dynamics.block_mut(block);
                block.mark_active();
                block.bank.fill(slot, topic, payload, retain, msg_id, now_us);
            }
        }
    }

    /// Free the slot at `addr`; stamps the block idle when it drains.
    pub fn release(&mut self, addr: SlotAddr, now_us: u64) -> MessageId {
        match addr {
            SlotAddr::Static(idx) => self.statics.bank.release(idx),
            SlotAddr::Dynamic { block, slot } => {
                let id = self.dynamics.block_mut(block).bank.release(slot);
                if self.dynamics.block(block).bank().all_free() {
                    self.dynamics.block_mut(block).stamp_idle(now_us);
                }
                id
            }
        }
    }

    /// Overwrite the recorded id of the occupied slot at `addr`.
    pub fn set_msg_id(&mut self, addr: SlotAddr, msg_id: MessageId) {
        match addr {
            SlotAddr::Static(idx) => self.statics.bank.set_msg_id(idx, msg_id),
            SlotAddr::Dynamic { block, slot } => {
                self.dynamics.block_mut(block).bank.set_msg_id(slot, msg_id);
            }
        }
    }

    /// Locate the occupied slot tracking `msg_id`: static tier first, then
    /// blocks in pool order.
    pub fn find(&self, msg_id: MessageId) -> Option<SlotAddr> {
        if let Some(idx) = self.statics.bank.find_msg_id(msg_id) {
            return Some(SlotAddr::Static(idx));
        }
        for (block_idx, block) in self.dynamics.iter().enumerate() {
            if let Some(slot_idx) = block.bank().find_msg_id(msg_id) {
                return Some(SlotAddr::Dynamic {
                    block: block_idx,
                    slot: slot_idx,
                });
            }
        }
        None
    }

    /// Slot metadata at `addr`.
    pub fn slot(&self, addr: SlotAddr) -> &Slot {
        match addr {
            SlotAddr::Static(idx) => self.statics.bank.slot(idx),
            SlotAddr::Dynamic { block, slot } => self.dynamics.block(block).bank().slot(slot),
        }
    }

    /// Stored topic at `addr`.
    pub fn topic(&self, addr: SlotAddr) -> &str {
        match addr {
            SlotAddr::Static(idx) => self.statics.bank.topic(idx),
            SlotAddr::Dynamic { block, slot } => self.dynamics.block(block).bank().topic(slot),
        }
    }

    /// Stored payload at `addr`.
    pub fn payload(&self, addr: SlotAddr) -> &[u8] {
        match addr {
            SlotAddr::Static(idx) => self.statics.bank.payload(idx),
            SlotAddr::Dynamic { block, slot } => self.dynamics.block(block).bank().payload(slot),
        }
    }

    /// Total occupied slots across both tiers.
    pub fn occupied(&self) -> usize {
        self.statics.bank.occupied()
            + self
                .dynamics
                .iter()
                .map(|block| block.bank().occupied())
                .sum::<usize>()
    }

    /// Current dynamic block count.
    pub fn block_count(&self) -> usize {
        self.dynamics.len()
    }

    /// Free every slot whose wait exceeds `timeout_us`, then normalise block
    /// idle stamps: a fully-free block with no stamp gets stamped `now_us`,
    /// an occupied block has its stamp cleared.
    pub fn sweep_expired(&mut self, now_us: u64, timeout_us: u64) -> usize {
        let mut freed = self.statics.bank.sweep_expired(now_us, timeout_us);
        for block in self.dynamics.iter_mut() {
            freed += block.bank.sweep_expired(now_us, timeout_us);
            if block.bank.all_free() {
                if block.last_active_at_us() == 0 {
                    block.stamp_idle(now_us);
                }
            } else {
                block.mark_active();
            }
        }
        freed
    }

    /// Reclaim blocks fully free for longer than `idle_timeout_us`.
    pub fn reclaim_idle(&mut self, now_us: u64, idle_timeout_us: u64) -> usize {
        self.dynamics.reclaim_idle(now_us, idle_timeout_us)
    }

    /// Free every slot and drop every dynamic block.
    pub fn clear(&mut self) {
        self.statics.bank.clear();
        self.dynamics.clear();
    }

    fn oldest_occupied(&self) -> Option<SlotAddr> {
        let mut best: Option<(SlotAddr, u64)> = None;
        if let Some((idx, ts)) = self.statics.bank.oldest_occupied() {
            best = Some((SlotAddr::Static(idx), ts));
        }
        for (block_idx, block) in self.dynamics.iter().enumerate() {
            if let Some((slot_idx, ts)) = block.bank().oldest_occupied() {
                // strict comparison keeps scan order on ties: static before
                // dynamic, lower block index first
                if best.map_or(true, |(_, best_ts)| ts < best_ts) {
                    best = Some((
                        SlotAddr::Dynamic {
                            block: block_idx,
                            slot: slot_idx,
                        },
                        ts,
                    ));
                }
            }
        }
        best.map(|(addr, _)| addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc() -> TieredAllocator {
        // 2 static slots, blocks of 2, at most 2 blocks
        TieredAllocator::new(2, 2, 2, 16, 16).unwrap()
    }

    fn admit(alloc: &mut TieredAllocator, msg_id: MessageId, now_us: u64) -> SlotAddr {
        let admission = alloc.acquire().unwrap();
        let addr = admission.addr();
        alloc.fill(addr, b"t", b"p", false, msg_id, now_us);
        addr
    }

    #[test]
    fn static_tier_fills_first_in_index_order() {
        let mut alloc = alloc();
        assert_eq!(admit(&mut alloc, 1, 10), SlotAddr::Static(0));
        assert_eq!(admit(&mut alloc, 2, 20), SlotAddr::Static(1));
        assert_eq!(alloc.block_count(), 0);
    }

    #[test]
    fn overflow_grows_one_block_at_a_time() {
        let mut alloc = alloc();
        admit(&mut alloc, 1, 10);
        admit(&mut alloc, 2, 20);
        assert_eq!(
            admit(&mut alloc, 3, 30),
            SlotAddr::Dynamic { block: 0, slot: 0 }
        );
        assert_eq!(alloc.block_count(), 1);
        assert_eq!(
            admit(&mut alloc, 4, 40),
            SlotAddr::Dynamic { block: 0, slot: 1 }
        );
        // second block only once the first is full
        assert_eq!(
            admit(&mut alloc, 5, 50),
            SlotAddr::Dynamic { block: 1, slot: 0 }
        );
        assert_eq!(alloc.block_count(), 2);
    }

    #[test]
    fn freed_dynamic_slot_is_reused_before_growth() {
        let mut alloc = alloc();
        for (id, ts) in [(1, 10), (2, 20), (3, 30), (4, 40)] {
            admit(&mut alloc, id, ts);
        }
        let addr = alloc.find(3).unwrap();
        alloc.release(addr, 45);
        assert_eq!(
            admit(&mut alloc, 5, 50),
            SlotAddr::Dynamic { block: 0, slot: 0 }
        );
        assert_eq!(alloc.block_count(), 1);
    }

    #[test]
    fn saturation_evicts_the_oldest_occupant() {
        let mut alloc = alloc();
        // fill all 2 + 2*2 = 6 slots; id 1 at the smallest timestamp
        for (id, ts) in [(1, 10), (2, 20), (3, 30), (4, 40), (5, 50), (6, 60)] {
            admit(&mut alloc, id, ts);
        }
        let admission = alloc.acquire().unwrap();
        match admission {
            Admission::Evicted { addr, lost_id } => {
                assert_eq!(lost_id, 1);
                assert_eq!(addr, SlotAddr::Static(0));
            }
            other => panic!("expected eviction, got {:?}", other),
        }
    }

    #[test]
    fn eviction_tie_break_prefers_static_then_lower_index() {
        let mut alloc = alloc();
        for id in 1..=6 {
            // identical timestamps everywhere
            admit(&mut alloc, id, 100);
        }
        let admission = alloc.acquire().unwrap();
        assert_eq!(admission.addr(), SlotAddr::Static(0));
    }

    #[test]
    fn release_stamps_block_idle_when_it_drains() {
        let mut alloc = alloc();
        admit(&mut alloc, 1, 10);
        admit(&mut alloc, 2, 20);
        let in_block = admit(&mut alloc, 3, 30);
        alloc.release(in_block, 99);
        match in_block {
            SlotAddr::Dynamic { .. } => {}
            other => panic!("expected dynamic slot, got {:?}", other),
        }
        // block drained: idle stamp holds the release time
        assert_eq!(alloc.dynamics.block(0).last_active_at_us(), 99);
        // reacquiring clears the stamp
        let again = alloc.acquire().unwrap().addr();
        assert_eq!(again, SlotAddr::Dynamic { block: 0, slot: 0 });
        assert_eq!(alloc.dynamics.block(0).last_active_at_us(), 0);
    }

    #[test]
    fn sweep_normalises_idle_stamps() {
        let mut alloc = alloc();
        admit(&mut alloc, 1, 10);
        admit(&mut alloc, 2, 10);
        admit(&mut alloc, 3, 10);
        // everything times out at once; the drained block must be stamped
        let freed = alloc.sweep_expired(2_000, 1_000);
        assert_eq!(freed, 3);
        assert_eq!(alloc.dynamics.block(0).last_active_at_us(), 2_000);
    }

    #[test]
    fn clear_drops_blocks_and_frees_statics() {
        let mut alloc = alloc();
        for id in 1..=4 {
            admit(&mut alloc, id, 10);
        }
        alloc.clear();
        assert_eq!(alloc.occupied(), 0);
        assert_eq!(alloc.block_count(), 0);
    }
}
