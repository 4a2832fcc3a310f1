use crate::model::{now_ms, BookingId, BookingRecord, HolderId, LockId, LockRecord, ResourceId};
use crate::store::LockEntry;

use super::{Engine, EngineError};

impl Engine {
    /// Current free-seat count, for display. Best effort: it may lag true
    /// state by up to one sweep interval in the expiry direction.
    pub async fn available_seats(&self, resource_id: ResourceId) -> Result<u32, EngineError> {
        self.ensure_initialized(resource_id).await?;
        Ok(self.store.seats(resource_id).unwrap_or(0))
    }

    /// The holder's live lock on a resource, if any. Expired entries read as
    /// absent even before the sweep reconciles them.
    pub fn active_lock(&self, resource_id: ResourceId, holder_id: HolderId) -> Option<LockEntry> {
        self.store.lock_entry(resource_id, holder_id, now_ms())
    }

    /// Ledger record of a lock, at whatever status history left it in.
    pub async fn lock_record(&self, lock_id: LockId) -> Result<Option<LockRecord>, EngineError> {
        self.ledger
            .lock(lock_id)
            .await
            .map_err(EngineError::DurableWriteFailure)
    }

    /// Ledger record of a booking.
    pub async fn booking(&self, booking_id: BookingId) -> Result<Option<BookingRecord>, EngineError> {
        self.ledger
            .booking(booking_id)
            .await
            .map_err(EngineError::DurableWriteFailure)
    }
}
