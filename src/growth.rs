//! Growth and cleanup policy.
//!
//! Both table variants ask [`plan`] before placing a new entry. A cleanup
//! rebuilds the slot array at the same size to drop tombstones; it is chosen
//! when tombstones outnumber live entries. Each tombstone comes from exactly
//! one remove, and a cleanup clears all of them, so the rebuild cost is
//! amortized over the removes that caused it.

use crate::config::LoadFactor;

/// What to do before one more entry is placed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Plan {
    /// Within the load-factor bound.
    Fits,
    /// Rebuild at the current size to discard tombstones.
    Clean,
    /// Rebuild with `2^log` slots.
    Grow(u32),
    /// At the capacity ceiling and over the bound; placing is still safe.
    Degraded,
    /// At the capacity ceiling with no free slot to spare.
    Full,
}

/// Occupancy as seen by the policy. `live` counts entries plus any
/// placements already reserved but not yet written.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Occupancy {
    pub(crate) live: usize,
    pub(crate) tombstones: usize,
    pub(crate) log_slots: u32,
}

pub(crate) fn plan(occ: Occupancy, load: &LoadFactor, max_log: u32) -> Plan {
    let Occupancy {
        live,
        tombstones,
        log_slots,
    } = occ;
    let max_sum = load.max_sum(log_slots);
    if live + tombstones < max_sum {
        return Plan::Fits;
    }
    if live < tombstones && live < max_sum {
        return Plan::Clean;
    }
    if log_slots < max_log {
        let mut log = log_slots + 1;
        while log < max_log && load.max_sum(log) <= live {
            log += 1;
        }
        return Plan::Grow(log);
    }

    // Keep at least one empty slot so every probe sequence still ends.
    let slots = 1usize << log_slots;
    if live + tombstones + 1 < slots {
        Plan::Degraded
    } else if tombstones > 0 && live + 1 < slots {
        Plan::Clean
    } else {
        Plan::Full
    }
}
