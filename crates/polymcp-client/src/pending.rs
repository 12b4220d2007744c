//! Open-addressed pending-request table.
//!
//! Maps in-flight request ids to their waiters. Slots removed after a caller
//! is unparked become tombstones: they keep probe chains intact and are
//! reused by later inserts. Capacity is a power of two, load factor is held
//! below 0.70, and probing is quadratic (triangular steps) with a bounded
//! budget per lookup.
//!
//! The table is not internally synchronized: the owning client wraps it,
//! together with the request-id counter it carries, in a single mutex.

use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::warn;

/// Smallest table capacity.
pub const MIN_CAPACITY: usize = 16;

/// Probes allowed per lookup before the linear-scan safety net kicks in.
const PROBE_BUDGET_CAP: usize = 16;

/// Final outcome delivered to a parked caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    Error { code: i32, message: String },
}

/// Lifecycle of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStatus {
    Waiting,
    Completed,
    Error,
    Timeout,
    /// Tombstone: the slot is dead but keeps probe chains walkable.
    Invalid,
}

#[derive(Debug, Error, PartialEq)]
pub enum PendingError {
    #[error("request id {0} is already pending")]
    Duplicate(u64),

    #[error("pending table resize failed: an entry could not be rehashed")]
    ResizeFailed,

    #[error("pending table has no free slot for request id {0}")]
    Full(u64),
}

struct Slot {
    /// 0 marks a never-used slot.
    rid: u64,
    status: PendingStatus,
    waiter: Option<oneshot::Sender<Outcome>>,
}

impl Slot {
    const EMPTY: u64 = 0;

    fn empty() -> Self {
        Self {
            rid: Self::EMPTY,
            status: PendingStatus::Invalid,
            waiter: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.rid == Self::EMPTY
    }

    fn is_tombstone(&self) -> bool {
        self.rid != Self::EMPTY && self.status == PendingStatus::Invalid
    }

    fn is_live(&self) -> bool {
        self.rid != Self::EMPTY && self.status != PendingStatus::Invalid
    }
}

/// The pending-request table plus the request-id counter it guards.
pub struct PendingTable {
    slots: Vec<Slot>,
    live: usize,
    next_rid: u64,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::with_capacity(MIN_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY).next_power_of_two();
        Self {
            slots: (0..capacity).map(|_| Slot::empty()).collect(),
            live: 0,
            next_rid: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn live(&self) -> usize {
        self.live
    }

    /// Issue the next request id. Monotonic, never 0.
    pub fn allocate_rid(&mut self) -> u64 {
        let rid = self.next_rid;
        self.next_rid += 1;
        rid
    }

    /// Park a waiter under `rid`. Resizes first when this insert would push
    /// the load factor to 0.70 or above.
    pub fn insert(&mut self, rid: u64, waiter: oneshot::Sender<Outcome>) -> Result<(), PendingError> {
        debug_assert_ne!(rid, Slot::EMPTY);
        if (self.live + 1) * 100 >= self.capacity() * 70 {
            self.resize()?;
        }

        let target = self.find_insert_slot(rid)?;
        let slot = &mut self.slots[target];
        if slot.is_live() && slot.rid == rid {
            return Err(PendingError::Duplicate(rid));
        }
        *slot = Slot {
            rid,
            status: PendingStatus::Waiting,
            waiter: Some(waiter),
        };
        self.live += 1;
        Ok(())
    }

    /// Deliver an outcome to the waiter parked under `rid`. Returns `false`
    /// for an unknown or already-settled id (the response is dropped).
    pub fn complete(&mut self, rid: u64, outcome: Outcome) -> bool {
        let Some(index) = self.find(rid) else {
            return false;
        };
        let slot = &mut self.slots[index];
        if slot.status != PendingStatus::Waiting {
            return false;
        }
        slot.status = match outcome {
            Outcome::Success(_) => PendingStatus::Completed,
            Outcome::Error { .. } => PendingStatus::Error,
        };
        if let Some(waiter) = slot.waiter.take() {
            // Signaled while the owning mutex is held; the receiver wakes
            // after the caller reacquires it.
            let _ = waiter.send(outcome);
        }
        true
    }

    /// Mark `rid` timed out and tombstone its slot.
    pub fn timeout(&mut self, rid: u64) {
        if let Some(index) = self.find(rid) {
            let slot = &mut self.slots[index];
            if slot.is_live() {
                slot.status = PendingStatus::Timeout;
                slot.waiter = None;
                self.tombstone(index);
            }
        }
    }

    /// Tombstone the slot for `rid` after its caller has read the outcome.
    pub fn remove(&mut self, rid: u64) {
        if let Some(index) = self.find(rid) {
            if self.slots[index].is_live() {
                self.slots[index].waiter = None;
                self.tombstone(index);
            }
        }
    }

    /// Transport-failure broadcast: every waiting entry becomes ERROR and is
    /// signaled. Later responses for these ids find no waiter and are
    /// dropped.
    pub fn fail_all_waiting(&mut self, code: i32, message: &str) -> usize {
        let mut failed = 0;
        for slot in &mut self.slots {
            if slot.is_live() && slot.status == PendingStatus::Waiting {
                slot.status = PendingStatus::Error;
                if let Some(waiter) = slot.waiter.take() {
                    let _ = waiter.send(Outcome::Error {
                        code,
                        message: message.to_string(),
                    });
                }
                failed += 1;
            }
        }
        failed
    }

    /// Observed status of `rid`, if its slot is still reachable.
    pub fn status(&mut self, rid: u64) -> Option<PendingStatus> {
        self.find(rid).map(|index| self.slots[index].status)
    }

    fn tombstone(&mut self, index: usize) {
        self.slots[index].status = PendingStatus::Invalid;
        self.live -= 1;
    }

    fn mask(&self) -> usize {
        self.capacity() - 1
    }

    fn probe_budget(&self) -> usize {
        self.capacity().min(PROBE_BUDGET_CAP)
    }

    /// Locate the slot holding `rid`. Bounded probing, then a logged full
    /// linear scan as the degenerate safety net.
    fn find(&self, rid: u64) -> Option<usize> {
        let mask = self.mask();
        let mut index = (hash_rid(rid) as usize) & mask;
        let mut step = 0;
        for _ in 0..self.probe_budget() {
            let slot = &self.slots[index];
            if slot.is_empty() {
                return None;
            }
            if slot.rid == rid && !slot.is_tombstone() {
                return Some(index);
            }
            step += 1;
            index = (index + step) & mask;
        }
        warn!(rid, "probe budget exhausted, falling back to linear scan");
        self.slots
            .iter()
            .position(|slot| slot.rid == rid && !slot.is_tombstone())
    }

    /// Locate a slot to insert `rid` into, preferring the first tombstone on
    /// the probe path over a later empty slot.
    fn find_insert_slot(&self, rid: u64) -> Result<usize, PendingError> {
        let mask = self.mask();
        let mut index = (hash_rid(rid) as usize) & mask;
        let mut step = 0;
        let mut first_tombstone: Option<usize> = None;
        for _ in 0..self.probe_budget() {
            let slot = &self.slots[index];
            if slot.is_empty() {
                return Ok(first_tombstone.unwrap_or(index));
            }
            if slot.is_tombstone() && first_tombstone.is_none() {
                first_tombstone = Some(index);
            }
            if slot.rid == rid && slot.is_live() {
                return Ok(index);
            }
            step += 1;
            index = (index + step) & mask;
        }
        if let Some(tombstone) = first_tombstone {
            return Ok(tombstone);
        }
        warn!(rid, "probe budget exhausted on insert, falling back to linear scan");
        self.slots
            .iter()
            .position(|slot| slot.is_empty() || slot.is_tombstone())
            .ok_or(PendingError::Full(rid))
    }

    /// Double the capacity and rehash live entries. Tombstones are not
    /// carried over. Placement uses bounded probing only; a placement
    /// failure aborts without touching the current table.
    fn resize(&mut self) -> Result<(), PendingError> {
        let new_capacity = self.capacity() * 2;
        let new_mask = new_capacity - 1;
        let budget = new_capacity.min(PROBE_BUDGET_CAP);

        // Plan every placement before moving anything.
        let mut occupied = vec![false; new_capacity];
        let mut placements = Vec::with_capacity(self.live);
        for (old_index, slot) in self.slots.iter().enumerate() {
            if !slot.is_live() {
                continue;
            }
            let mut index = (hash_rid(slot.rid) as usize) & new_mask;
            let mut step = 0;
            let mut placed = false;
            for _ in 0..budget {
                if !occupied[index] {
                    occupied[index] = true;
                    placements.push((old_index, index));
                    placed = true;
                    break;
                }
                step += 1;
                index = (index + step) & new_mask;
            }
            if !placed {
                warn!(
                    rid = slot.rid,
                    new_capacity, "rehash could not place entry within probe budget"
                );
                return Err(PendingError::ResizeFailed);
            }
        }

        let mut new_slots: Vec<Slot> = (0..new_capacity).map(|_| Slot::empty()).collect();
        for (old_index, new_index) in placements {
            new_slots[new_index] = std::mem::replace(&mut self.slots[old_index], Slot::empty());
        }
        self.slots = new_slots;
        Ok(())
    }
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

/// 64-bit finalizer (splitmix64 style) so consecutive rids spread across
/// the table instead of clustering in one probe chain.
fn hash_rid(rid: u64) -> u64 {
    let mut x = rid;
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn park(table: &mut PendingTable) -> (u64, oneshot::Receiver<Outcome>) {
        let rid = table.allocate_rid();
        let (tx, rx) = oneshot::channel();
        table.insert(rid, tx).expect("insert");
        (rid, rx)
    }

    #[test]
    fn test_rids_are_monotonic_and_never_zero() {
        let mut table = PendingTable::new();
        let first = table.allocate_rid();
        let second = table.allocate_rid();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn test_complete_signals_waiter() {
        let mut table = PendingTable::new();
        let (rid, mut rx) = park(&mut table);

        assert!(table.complete(rid, Outcome::Success(json!({"ok": true}))));
        assert_eq!(table.status(rid), Some(PendingStatus::Completed));
        assert_eq!(
            rx.try_recv().expect("signaled"),
            Outcome::Success(json!({"ok": true}))
        );

        table.remove(rid);
        assert_eq!(table.status(rid), None);
        assert_eq!(table.live(), 0);
    }

    #[test]
    fn test_unknown_rid_is_dropped() {
        let mut table = PendingTable::new();
        assert!(!table.complete(999, Outcome::Success(json!(null))));
    }

    #[test]
    fn test_double_completion_is_ignored() {
        let mut table = PendingTable::new();
        let (rid, _rx) = park(&mut table);
        assert!(table.complete(rid, Outcome::Success(json!(1))));
        assert!(!table.complete(rid, Outcome::Success(json!(2))));
    }

    #[test]
    fn test_duplicate_rid_rejected() {
        let mut table = PendingTable::new();
        let (rid, _rx) = park(&mut table);
        let (tx, _rx2) = oneshot::channel();
        assert_eq!(table.insert(rid, tx), Err(PendingError::Duplicate(rid)));
    }

    #[test]
    fn test_tombstone_preserves_probe_chain_and_is_reused() {
        let mut table = PendingTable::new();
        let rids: Vec<u64> = (0..8).map(|_| {
            let (rid, _rx) = park(&mut table);
            rid
        }).collect();

        // Remove one in the middle; the rest must stay reachable.
        table.remove(rids[3]);
        for &rid in rids.iter().filter(|&&r| r != rids[3]) {
            assert_eq!(table.status(rid), Some(PendingStatus::Waiting), "rid {rid}");
        }
        assert_eq!(table.live(), 7);

        // A new entry may land in the tombstone; live count stays coherent.
        let (_rid, _rx) = park(&mut table);
        assert_eq!(table.live(), 8);
    }

    #[test]
    fn test_resize_at_070_load_factor() {
        let mut table = PendingTable::new();
        assert_eq!(table.capacity(), 16);

        let mut receivers = Vec::new();
        for _ in 0..11 {
            receivers.push(park(&mut table));
        }
        // 11 live entries in 16 slots: no resize yet.
        assert_eq!(table.capacity(), 16);

        // The 12th live insert crosses 0.70 and doubles the table first.
        receivers.push(park(&mut table));
        assert_eq!(table.capacity(), 32);
        assert_eq!(table.live(), 12);

        // Every parked entry survived the rehash.
        for (rid, _) in &receivers {
            assert_eq!(table.status(*rid), Some(PendingStatus::Waiting));
        }
    }

    #[test]
    fn test_rehash_drops_tombstones() {
        let mut table = PendingTable::new();
        let mut kept = Vec::new();
        for i in 0..11 {
            let (rid, rx) = park(&mut table);
            if i % 2 == 0 {
                table.remove(rid);
            } else {
                kept.push((rid, rx));
            }
        }
        // Force growth; tombstones disappear, live entries persist.
        while table.capacity() == 16 {
            kept.push(park(&mut table));
        }
        for (rid, _) in &kept {
            assert_eq!(table.status(*rid), Some(PendingStatus::Waiting));
        }
    }

    #[test]
    fn test_fail_all_waiting_broadcast() {
        let mut table = PendingTable::new();
        let (rid_a, mut rx_a) = park(&mut table);
        let (rid_b, mut rx_b) = park(&mut table);

        // One entry has already completed; it must not be re-signaled.
        assert!(table.complete(rid_a, Outcome::Success(json!(null))));

        let failed = table.fail_all_waiting(-32000, "Transport connection error");
        assert_eq!(failed, 1);
        assert_eq!(table.status(rid_b), Some(PendingStatus::Error));
        assert!(matches!(
            rx_b.try_recv().expect("signaled"),
            Outcome::Error { code: -32000, ref message } if message == "Transport connection error"
        ));
        assert!(matches!(rx_a.try_recv(), Ok(Outcome::Success(_))));

        // A late response for the failed id finds no waiter.
        assert!(!table.complete(rid_b, Outcome::Success(json!(null))));
    }

    #[test]
    fn test_timeout_tombstones_entry() {
        let mut table = PendingTable::new();
        let (rid, mut rx) = park(&mut table);
        table.timeout(rid);
        assert_eq!(table.status(rid), None);
        assert_eq!(table.live(), 0);
        // The waiter was dropped, not signaled.
        assert!(rx.try_recv().is_err());
        // A late response is dropped.
        assert!(!table.complete(rid, Outcome::Success(json!(null))));
    }

    #[test]
    fn test_many_entries_and_removals_stay_consistent() {
        let mut table = PendingTable::new();
        let mut live = Vec::new();
        for round in 0..50u64 {
            let (rid, rx) = park(&mut table);
            live.push((rid, rx));
            if round % 3 == 0 {
                let (gone, _) = live.remove(0);
                table.remove(gone);
            }
        }
        assert_eq!(table.live(), live.len());
        for (rid, _) in &live {
            assert_eq!(table.status(*rid), Some(PendingStatus::Waiting), "rid {rid}");
        }
        // Capacity stayed a power of two.
        assert!(table.capacity().is_power_of_two());
    }
}
