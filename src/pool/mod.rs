//! Two-tier slot pools for in-flight message tracking.
//!
//! The pool layer is the memory backbone of the outbox:
//!
//! - [`bank::SlotBank`] — a bank of fixed slots over two contiguous byte
//!   arenas (one for topics, one for payloads). Both tiers are built from it.
//! - [`static_pool::StaticPool`] — the always-resident first tier.
//! - [`dyn_pool::DynBlock`] / [`dyn_pool::DynPool`] — elastic overflow blocks
//!   that absorb bursts and are reclaimed after an idle period.
//! - [`allocator::TieredAllocator`] — the admission policy tying the tiers
//!   together: static search, dynamic search, growth, then oldest-victim
//!   eviction.
//!
//! Buffers live in the arenas for the lifetime of their bank; a slot only
//! ever borrows its two fixed ranges. Nothing here allocates per message.

pub mod allocator;
pub mod bank;
pub mod dyn_pool;
pub mod static_pool;

pub use allocator::{Admission, SlotAddr, TieredAllocator};
pub use bank::{Slot, SlotBank};
pub use dyn_pool::{DynBlock, DynPool};
pub use static_pool::StaticPool;
