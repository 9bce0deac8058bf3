//! Always-resident first tier.

use crate::pool::bank::SlotBank;
use std::collections::TryReserveError;

/// The static tier: exactly N₁ slots whose arenas live for the process.
///
/// Admission always scans this tier first, so under steady-state load the
/// dynamic tier stays empty and the working set is this one allocation.
#[derive(Debug)]
pub struct StaticPool {
    pub(crate) bank: SlotBank,
}

impl StaticPool {
    /// Allocate the resident tier. Failing here fails outbox construction;
    /// unlike dynamic growth there is no degraded mode without it.
    pub fn new(
        slot_count: usize,
        topic_cap: usize,
        payload_cap: usize,
    ) -> Result<Self, TryReserveError> {
        Ok(Self {
            bank: SlotBank::try_new(slot_count, topic_cap, payload_cap)?,
        })
    }

    /// Read access to the underlying bank.
    pub fn bank(&self) -> &SlotBank {
        &self.bank
    }
}
