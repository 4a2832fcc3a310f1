use crate::ledger::LedgerError;
use crate::model::{HolderId, ResourceId};

#[derive(Debug)]
pub enum EngineError {
    /// No capacity definition in the ledger — fatal to the caller.
    ResourceNotFound(ResourceId),
    /// Capacity exhausted — an ordinary rejection, not a system error.
    ResourceFull(ResourceId),
    /// A live lock already exists for this (resource, holder) pair.
    AlreadyLocked {
        resource_id: ResourceId,
        holder_id: HolderId,
    },
    /// The holder already has a live booking on this resource.
    AlreadyBooked {
        resource_id: ResourceId,
        holder_id: HolderId,
    },
    /// The fast-store step succeeded but the ledger was unavailable.
    DurableWriteFailure(LedgerError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::ResourceNotFound(id) => write!(f, "resource not found: {id}"),
            EngineError::ResourceFull(id) => write!(f, "resource full: {id}"),
            EngineError::AlreadyLocked {
                resource_id,
                holder_id,
            } => write!(f, "holder {holder_id} already holds a lock on {resource_id}"),
            EngineError::AlreadyBooked {
                resource_id,
                holder_id,
            } => write!(f, "holder {holder_id} already booked {resource_id}"),
            EngineError::DurableWriteFailure(e) => write!(f, "durable write failure: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
