use ulid::Ulid;

use crate::model::{
    now_ms, BookingId, BookingRecord, HolderId, LockId, LockRecord, LockStatus, Ms, PaymentStatus,
    ResourceId,
};
use crate::observability;
use crate::store::{Admission, SweepOutcome};

use super::{Engine, EngineError};

/// A granted soft lock, as returned to the routing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockGrant {
    pub lock_id: LockId,
    pub expires_at: Ms,
}

/// Result of promoting a hold into a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Promotion {
    pub booking_id: BookingId,
    /// The lock whose seat the booking took over, if the holder had one.
    pub from_lock: Option<LockId>,
}

/// Accounting for one sweep iteration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Index entries read this iteration.
    pub scanned: usize,
    /// Seats credited back to counters.
    pub reclaimed: usize,
    /// Ledger records transitioned to expired.
    pub ledger_expired: u64,
}

impl Engine {
    /// Create a soft lock: one indivisible admission step against the fast
    /// store (duplicate check, capacity check, decrement, lock write, index
    /// write), then the denormalized ledger record.
    ///
    /// A ledger failure fails the call but does not roll back the fast-store
    /// admission; the next cold initialization recomputes from ledger truth.
    pub async fn create_lock(
        &self,
        resource_id: ResourceId,
        holder_id: HolderId,
        ttl_ms: Option<Ms>,
    ) -> Result<LockGrant, EngineError> {
        self.ensure_initialized(resource_id).await?;

        let ttl = ttl_ms.unwrap_or(self.default_ttl_ms);
        let now = now_ms();
        let entry = match self.store.try_lock(resource_id, holder_id, ttl, now) {
            Admission::Granted(entry) => entry,
            Admission::AlreadyLocked => {
                return Err(EngineError::AlreadyLocked {
                    resource_id,
                    holder_id,
                })
            }
            Admission::Full => {
                metrics::counter!(observability::ADMISSIONS_REJECTED_TOTAL).increment(1);
                return Err(EngineError::ResourceFull(resource_id));
            }
        };
        metrics::counter!(observability::LOCKS_CREATED_TOTAL).increment(1);

        self.ledger
            .record_lock(LockRecord {
                lock_id: entry.lock_id,
                resource_id,
                holder_id,
                created_at: now,
                expires_at: entry.expires_at,
                status: LockStatus::Active,
            })
            .await
            .map_err(EngineError::DurableWriteFailure)?;

        Ok(LockGrant {
            lock_id: entry.lock_id,
            expires_at: entry.expires_at,
        })
    }

    /// Release a holder's lock before expiry. Returns whether a lock was
    /// actually cancelled — a missing or already-expired lock is a benign
    /// no-op, and the seat credit happens only on the winning delete.
    pub async fn cancel_lock(
        &self,
        resource_id: ResourceId,
        holder_id: HolderId,
    ) -> Result<bool, EngineError> {
        match self.store.cancel(resource_id, holder_id, now_ms()) {
            Some(entry) => {
                metrics::counter!(observability::LOCKS_CANCELLED_TOTAL).increment(1);
                self.ledger
                    .set_lock_status(entry.lock_id, LockStatus::Cancelled)
                    .await
                    .map_err(EngineError::DurableWriteFailure)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Atomic check-and-decrement for a direct booking, without a lock entry.
    /// The caller owns the follow-up booking write and must compensate with
    /// [`Engine::release_seat`] if that write fails.
    pub async fn admit_seat(&self, resource_id: ResourceId) -> Result<(), EngineError> {
        self.ensure_initialized(resource_id).await?;
        if self.store.admit(resource_id) {
            Ok(())
        } else {
            metrics::counter!(observability::ADMISSIONS_REJECTED_TOTAL).increment(1);
            Err(EngineError::ResourceFull(resource_id))
        }
    }

    /// Compensating increment for a seat admitted but never recorded.
    pub async fn release_seat(&self, resource_id: ResourceId) -> Result<(), EngineError> {
        self.ensure_initialized(resource_id).await?;
        self.store.release(resource_id);
        Ok(())
    }

    /// Promote the holder's lock into a booking. The lock entry is deleted
    /// without touching the counter — the seat stays consumed and moves to
    /// the booking. Without a live lock this falls back to direct admission,
    /// so the seat accounting holds either way.
    pub async fn promote(
        &self,
        resource_id: ResourceId,
        holder_id: HolderId,
        price_cents: i64,
    ) -> Result<Promotion, EngineError> {
        self.ensure_initialized(resource_id).await?;

        if self
            .ledger
            .has_live_booking(resource_id, holder_id)
            .await
            .map_err(EngineError::DurableWriteFailure)?
        {
            return Err(EngineError::AlreadyBooked {
                resource_id,
                holder_id,
            });
        }

        let now = now_ms();
        let converted = self.store.convert(resource_id, holder_id, now);
        if converted.is_none() && !self.store.admit(resource_id) {
            metrics::counter!(observability::ADMISSIONS_REJECTED_TOTAL).increment(1);
            return Err(EngineError::ResourceFull(resource_id));
        }

        let record = BookingRecord {
            booking_id: Ulid::new(),
            resource_id,
            holder_id,
            price_cents,
            payment: PaymentStatus::Unpaid,
            created_at: now,
            lock_id: converted.map(|e| e.lock_id),
        };
        if let Err(e) = self.ledger.record_booking(record.clone()).await {
            if converted.is_none() {
                // Compensate the direct admission. A converted lock's seat
                // stays consumed — that window is closed by reinitialization.
                self.store.release(resource_id);
            }
            return Err(EngineError::DurableWriteFailure(e));
        }
        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL).increment(1);

        if let Some(entry) = converted {
            metrics::counter!(observability::LOCKS_CONVERTED_TOTAL).increment(1);
            self.ledger
                .set_lock_status(entry.lock_id, LockStatus::Converted)
                .await
                .map_err(EngineError::DurableWriteFailure)?;
        }

        Ok(Promotion {
            booking_id: record.booking_id,
            from_lock: converted.map(|e| e.lock_id),
        })
    }

    /// Cancel an unpaid booking and return its seat. Anything else —
    /// unknown id, other holder, already paid or terminal — is a no-op.
    pub async fn cancel_booking(
        &self,
        booking_id: BookingId,
        holder_id: HolderId,
    ) -> Result<bool, EngineError> {
        let Some(record) = self
            .ledger
            .booking(booking_id)
            .await
            .map_err(EngineError::DurableWriteFailure)?
        else {
            return Ok(false);
        };
        if record.holder_id != holder_id || record.payment != PaymentStatus::Unpaid {
            return Ok(false);
        }

        self.ledger
            .set_payment(booking_id, PaymentStatus::Cancelled)
            .await
            .map_err(EngineError::DurableWriteFailure)?;
        self.release_seat(record.resource_id).await?;
        Ok(true)
    }

    /// Mark an unpaid booking paid. No capacity effect.
    pub async fn mark_paid(&self, booking_id: BookingId) -> Result<bool, EngineError> {
        let Some(record) = self
            .ledger
            .booking(booking_id)
            .await
            .map_err(EngineError::DurableWriteFailure)?
        else {
            return Ok(false);
        };
        if record.payment != PaymentStatus::Unpaid {
            return Ok(false);
        }
        self.ledger
            .set_payment(booking_id, PaymentStatus::Paid)
            .await
            .map_err(EngineError::DurableWriteFailure)?;
        Ok(true)
    }

    /// Refund a paid booking and return its seat.
    pub async fn refund_booking(&self, booking_id: BookingId) -> Result<bool, EngineError> {
        let Some(record) = self
            .ledger
            .booking(booking_id)
            .await
            .map_err(EngineError::DurableWriteFailure)?
        else {
            return Ok(false);
        };
        if record.payment != PaymentStatus::Paid {
            return Ok(false);
        }
        self.ledger
            .set_payment(booking_id, PaymentStatus::Refunded)
            .await
            .map_err(EngineError::DurableWriteFailure)?;
        self.release_seat(record.resource_id).await?;
        Ok(true)
    }

    /// Administrative: write (or overwrite) a resource's capacity definition.
    /// Changing an existing capacity only takes effect on the counter after
    /// an explicit [`Engine::reset_counter`].
    pub async fn define_resource(
        &self,
        resource_id: ResourceId,
        capacity: u32,
    ) -> Result<(), EngineError> {
        self.ledger
            .define_resource(resource_id, capacity)
            .await
            .map_err(EngineError::DurableWriteFailure)
    }

    /// Administrative: destroy the counter so the next touch reinitializes
    /// from ledger truth. Returns whether a counter existed.
    pub fn reset_counter(&self, resource_id: ResourceId) -> bool {
        self.store.reset(resource_id)
    }

    /// One sweep iteration: read up to `limit` due expiry-index entries and
    /// reconcile each. Only a lock that truly vanished credits its counter;
    /// a lock that is live again is an index-only cleanup. Reclaimed pairs
    /// get their still-active, past-deadline ledger records transitioned to
    /// expired — a ledger hiccup there is logged and left to record readers'
    /// deadline filters, never retried against the counter.
    pub async fn sweep_expired(&self, now: Ms, limit: usize) -> SweepStats {
        let candidates = self.store.expired_candidates(now, limit);
        let mut stats = SweepStats {
            scanned: candidates.len(),
            ..SweepStats::default()
        };

        for (stamp, key) in candidates {
            let outcome = self.store.reconcile(stamp, key, now);
            if outcome == SweepOutcome::Stale {
                continue;
            }
            if outcome == SweepOutcome::Reclaimed {
                stats.reclaimed += 1;
                metrics::counter!(observability::LOCKS_EXPIRED_TOTAL).increment(1);
            }
            match self
                .ledger
                .expire_locks(key.resource_id, key.holder_id, now)
                .await
            {
                Ok(n) => stats.ledger_expired += n,
                Err(e) => tracing::warn!(
                    "sweep: ledger expiry for {}:{} failed: {e}",
                    key.resource_id,
                    key.holder_id
                ),
            }
        }
        stats
    }
}
