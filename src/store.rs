use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use dashmap::DashMap;
use ulid::Ulid;

use crate::model::{HolderId, LockKey, Ms, ResourceId};

/// A holder's claim on one seat, as the fast store sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockEntry {
    pub lock_id: Ulid,
    pub expires_at: Ms,
}

impl LockEntry {
    fn is_live(&self, now: Ms) -> bool {
        self.expires_at > now
    }
}

/// Per-resource fast-store state: the capacity counter plus the lock table.
#[derive(Debug)]
struct Slots {
    capacity: u32,
    seats: u32,
    locks: HashMap<HolderId, LockEntry>,
}

impl Slots {
    fn new(capacity: u32, seats: u32) -> Self {
        Self {
            capacity,
            seats,
            locks: HashMap::new(),
        }
    }

    /// Credit one seat back, never past capacity.
    fn credit(&mut self) {
        self.seats = (self.seats + 1).min(self.capacity);
    }
}

/// Outcome of the atomic admission+lock step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Granted(LockEntry),
    /// A live lock already exists for this (resource, holder) pair.
    AlreadyLocked,
    /// Counter is zero (or the resource has no counter yet).
    Full,
}

/// What the lock table says about a candidate's entry at reconcile time.
enum LockEntryState {
    Live,
    ExpiredInPlace,
    Gone,
}

/// Outcome of reconciling one expiry-index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Entry was already handled, or the lock is live again — index-only cleanup.
    Stale,
    /// The lock truly vanished; one seat was credited.
    Reclaimed,
    /// The resource has no fast-store entry; index dropped, nothing to credit.
    ColdResource,
}

/// The fast store: capacity counters, lock entries, and the time-ordered
/// expiry index.
///
/// Every mutating operation runs as one synchronous critical section while
/// holding the resource's map guard, so no concurrent operation can observe a
/// counter decrement without the paired lock write (or vice versa). Lock
/// entries expire passively: an entry past its deadline reads as absent, and
/// the seat it consumed is only ever credited back by the sweep.
///
/// Lock order is always slots, then index.
pub struct FastStore {
    slots: DashMap<ResourceId, Slots>,
    /// Time-ordered pending expirations: (expires_at, key). One entry per
    /// live lock; a re-grant after passive expiry replaces the pair's entry.
    expiry: Mutex<BTreeSet<(Ms, LockKey)>>,
}

impl Default for FastStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FastStore {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            expiry: Mutex::new(BTreeSet::new()),
        }
    }

    // ── Counter lifecycle ────────────────────────────────────

    pub fn contains(&self, resource_id: ResourceId) -> bool {
        self.slots.contains_key(&resource_id)
    }

    /// Seed the counter, only if no entry exists. Returns whether this call
    /// created it — concurrent initializers cannot overwrite each other.
    pub fn init_if_absent(&self, resource_id: ResourceId, capacity: u32, seats: u32) -> bool {
        let mut created = false;
        self.slots.entry(resource_id).or_insert_with(|| {
            created = true;
            Slots::new(capacity, seats)
        });
        created
    }

    /// Administrative reset: drop the counter and lock table so the next
    /// touch reinitializes from ledger truth. Orphaned index entries drain
    /// through the sweep as cold-resource no-ops.
    pub fn reset(&self, resource_id: ResourceId) -> bool {
        self.slots.remove(&resource_id).is_some()
    }

    pub fn seats(&self, resource_id: ResourceId) -> Option<u32> {
        self.slots.get(&resource_id).map(|s| s.seats)
    }

    /// Live locks on a resource (expired entries excluded).
    pub fn live_locks(&self, resource_id: ResourceId, now: Ms) -> usize {
        self.slots
            .get(&resource_id)
            .map(|s| s.locks.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn lock_entry(&self, resource_id: ResourceId, holder_id: HolderId, now: Ms) -> Option<LockEntry> {
        let slots = self.slots.get(&resource_id)?;
        slots
            .locks
            .get(&holder_id)
            .copied()
            .filter(|e| e.is_live(now))
    }

    // ── Atomic reservation operations ────────────────────────

    /// Admission + lock write as one unit: reject a live duplicate, reject on
    /// zero seats, otherwise decrement, record the lock, and index its expiry.
    ///
    /// A missing counter admits nobody. An expired entry for the pair does
    /// not count as a duplicate — its seat stays consumed until the sweep
    /// credits it — and a successful re-grant replaces the pair's index entry.
    pub fn try_lock(
        &self,
        resource_id: ResourceId,
        holder_id: HolderId,
        ttl_ms: Ms,
        now: Ms,
    ) -> Admission {
        let Some(mut slots) = self.slots.get_mut(&resource_id) else {
            return Admission::Full;
        };
        let prior = slots.locks.get(&holder_id).copied();
        if let Some(existing) = prior
            && existing.is_live(now)
        {
            return Admission::AlreadyLocked;
        }
        if slots.seats == 0 {
            return Admission::Full;
        }

        let entry = LockEntry {
            lock_id: Ulid::new(),
            expires_at: now + ttl_ms,
        };
        slots.seats -= 1;
        slots.locks.insert(holder_id, entry);

        let key = LockKey::new(resource_id, holder_id);
        let mut index = self.expiry.lock().expect("expiry index poisoned");
        if let Some(old) = prior {
            index.remove(&(old.expires_at, key));
        }
        index.insert((entry.expires_at, key));
        Admission::Granted(entry)
    }

    /// Guarded delete: only a live entry credits the seat and clears the
    /// index. Returns the removed entry, or None if there was nothing live to
    /// cancel (double-cancel, or passive expiry already took the key).
    pub fn cancel(&self, resource_id: ResourceId, holder_id: HolderId, now: Ms) -> Option<LockEntry> {
        let mut slots = self.slots.get_mut(&resource_id)?;
        let entry = slots.locks.get(&holder_id).copied()?;
        if !entry.is_live(now) {
            // Key already gone as far as callers are concerned; the sweep
            // owns the seat credit.
            return None;
        }
        slots.locks.remove(&holder_id);
        slots.credit();
        self.expiry
            .lock()
            .expect("expiry index poisoned")
            .remove(&(entry.expires_at, LockKey::new(resource_id, holder_id)));
        Some(entry)
    }

    /// Delete a live lock without touching the counter — the seat stays
    /// consumed and moves to the booking. Returns the removed entry.
    pub fn convert(&self, resource_id: ResourceId, holder_id: HolderId, now: Ms) -> Option<LockEntry> {
        let mut slots = self.slots.get_mut(&resource_id)?;
        let entry = slots.locks.get(&holder_id).copied()?;
        if !entry.is_live(now) {
            return None;
        }
        slots.locks.remove(&holder_id);
        self.expiry
            .lock()
            .expect("expiry index poisoned")
            .remove(&(entry.expires_at, LockKey::new(resource_id, holder_id)));
        Some(entry)
    }

    /// Check-and-decrement for a direct booking. No lock entry is written.
    pub fn admit(&self, resource_id: ResourceId) -> bool {
        match self.slots.get_mut(&resource_id) {
            Some(mut slots) if slots.seats > 0 => {
                slots.seats -= 1;
                true
            }
            _ => false,
        }
    }

    /// Compensating increment for a failed booking write (and for bookings
    /// reaching a terminal payment state).
    pub fn release(&self, resource_id: ResourceId) {
        if let Some(mut slots) = self.slots.get_mut(&resource_id) {
            slots.credit();
        }
    }

    // ── Sweep support ────────────────────────────────────────

    /// Up to `limit` index entries with expiry at or before `now`.
    pub fn expired_candidates(&self, now: Ms, limit: usize) -> Vec<(Ms, LockKey)> {
        let index = self.expiry.lock().expect("expiry index poisoned");
        index
            .range(..=(now, LockKey::new(u64::MAX, u64::MAX)))
            .take(limit)
            .copied()
            .collect()
    }

    /// Reconcile one candidate. The index entry is consumed exactly once; a
    /// candidate whose entry is already gone (cancelled, converted, or
    /// reconciled by a racing iteration) is a no-op. A lock that is live
    /// again was renewed — index-only cleanup, no credit. Only a truly
    /// vanished lock credits the counter.
    pub fn reconcile(&self, stamp: Ms, key: LockKey, now: Ms) -> SweepOutcome {
        let Some(mut slots) = self.slots.get_mut(&key.resource_id) else {
            let removed = self
                .expiry
                .lock()
                .expect("expiry index poisoned")
                .remove(&(stamp, key));
            return if removed {
                SweepOutcome::ColdResource
            } else {
                SweepOutcome::Stale
            };
        };

        let state = match slots.locks.get(&key.holder_id) {
            Some(e) if e.is_live(now) => LockEntryState::Live,
            Some(_) => LockEntryState::ExpiredInPlace,
            None => LockEntryState::Gone,
        };
        let removed = self
            .expiry
            .lock()
            .expect("expiry index poisoned")
            .remove(&(stamp, key));
        if !removed {
            return SweepOutcome::Stale;
        }
        match state {
            LockEntryState::Live => SweepOutcome::Stale,
            LockEntryState::ExpiredInPlace => {
                slots.locks.remove(&key.holder_id);
                slots.credit();
                SweepOutcome::Reclaimed
            }
            LockEntryState::Gone => {
                slots.credit();
                SweepOutcome::Reclaimed
            }
        }
    }
}
