use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Resource (session) identifier, assigned by the admin layer.
pub type ResourceId = u64;

/// Holder (customer) identifier, assigned by the auth layer.
pub type HolderId = u64;

/// Soft-lock identifier, assigned by the engine.
pub type LockId = Ulid;

/// Booking identifier, assigned by the engine.
pub type BookingId = Ulid;

/// Composite key for a soft lock. The fast store enforces at most one
/// active lock per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LockKey {
    pub resource_id: ResourceId,
    pub holder_id: HolderId,
}

impl LockKey {
    pub fn new(resource_id: ResourceId, holder_id: HolderId) -> Self {
        Self {
            resource_id,
            holder_id,
        }
    }
}

/// Lifecycle of a soft lock. Terminal states are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockStatus {
    /// Holding a seat, TTL running.
    Active,
    /// Promoted into a booking; the seat moved with it.
    Converted,
    /// Released by the holder before expiry; the seat was returned.
    Cancelled,
    /// Reclaimed by the sweep after the TTL elapsed.
    Expired,
}

/// Payment state of a booking. A booking consumes a seat until it reaches
/// a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    /// Terminal states return the seat to the pool.
    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Refunded | PaymentStatus::Cancelled)
    }

    /// Live states (unpaid or paid) keep the seat consumed.
    pub fn is_live(self) -> bool {
        !self.is_terminal()
    }
}

/// Durable record of a soft lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub lock_id: LockId,
    pub resource_id: ResourceId,
    pub holder_id: HolderId,
    pub created_at: Ms,
    pub expires_at: Ms,
    pub status: LockStatus,
}

impl LockRecord {
    /// Counts against capacity: still active and not past its deadline.
    pub fn is_active_at(&self, now: Ms) -> bool {
        self.status == LockStatus::Active && self.expires_at > now
    }
}

/// Durable record of a confirmed booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub booking_id: BookingId,
    pub resource_id: ResourceId,
    pub holder_id: HolderId,
    pub price_cents: i64,
    pub payment: PaymentStatus,
    pub created_at: Ms,
    /// Set when the booking came from promoting a soft lock.
    pub lock_id: Option<LockId>,
}

/// The ledger event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    ResourceDefined {
        resource_id: ResourceId,
        capacity: u32,
    },
    LockRecorded {
        lock_id: LockId,
        resource_id: ResourceId,
        holder_id: HolderId,
        created_at: Ms,
        expires_at: Ms,
        status: LockStatus,
    },
    LockStatusChanged {
        lock_id: LockId,
        status: LockStatus,
    },
    BookingRecorded {
        booking_id: BookingId,
        resource_id: ResourceId,
        holder_id: HolderId,
        price_cents: i64,
        payment: PaymentStatus,
        created_at: Ms,
        lock_id: Option<LockId>,
    },
    PaymentChanged {
        booking_id: BookingId,
        payment: PaymentStatus,
    },
}

/// Current wall-clock time in unix milliseconds.
pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as Ms
}
