mod error;
mod mutations;
mod queries;

pub use error::EngineError;
pub use mutations::{LockGrant, Promotion, SweepStats};

use std::sync::Arc;

use crate::config::Config;
use crate::ledger::Ledger;
use crate::model::{now_ms, Ms, ResourceId};
use crate::store::FastStore;

/// The reservation coordinator: orchestrates create/cancel/promote flows
/// across the fast store and the durable ledger.
///
/// Admission decisions run against the fast store's capacity counters; the
/// ledger is written only after the fast-store step is confirmed. The two are
/// not atomic with each other — the drift window is closed by
/// [`Engine::ensure_initialized`] recomputing a cold counter from ledger
/// truth, and by explicit compensation on the direct-booking path.
pub struct Engine {
    pub(crate) store: FastStore,
    pub(crate) ledger: Arc<dyn Ledger>,
    default_ttl_ms: Ms,
}

impl Engine {
    pub fn new(ledger: Arc<dyn Ledger>, config: &Config) -> Self {
        Self {
            store: FastStore::new(),
            ledger,
            default_ttl_ms: config.default_ttl_ms,
        }
    }

    /// Capacity initializer. Idempotent: seeds the counter from ledger truth
    /// (`capacity - active_bookings - active_unexpired_locks`, floored at 0)
    /// only when no counter exists. The set is conditional on absence, so
    /// racing initializers cannot overwrite a live counter.
    pub async fn ensure_initialized(&self, resource_id: ResourceId) -> Result<(), EngineError> {
        if self.store.contains(resource_id) {
            return Ok(());
        }

        let capacity = self
            .ledger
            .resource_capacity(resource_id)
            .await
            .map_err(EngineError::DurableWriteFailure)?
            .ok_or(EngineError::ResourceNotFound(resource_id))?;

        let now = now_ms();
        let booked = self
            .ledger
            .count_active_bookings(resource_id)
            .await
            .map_err(EngineError::DurableWriteFailure)?;
        let locked = self
            .ledger
            .count_active_locks(resource_id, now)
            .await
            .map_err(EngineError::DurableWriteFailure)?;

        let seats = u64::from(capacity).saturating_sub(booked + locked) as u32;
        if self.store.init_if_absent(resource_id, capacity, seats) {
            metrics::counter!(crate::observability::COUNTERS_INITIALIZED_TOTAL).increment(1);
        }
        Ok(())
    }
}
