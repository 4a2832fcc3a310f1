use std::collections::HashMap;
use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::model::{
    BookingId, BookingRecord, HolderId, LedgerEvent, LockId, LockRecord, LockStatus, Ms,
    PaymentStatus, ResourceId,
};
use crate::wal::Wal;

#[derive(Debug)]
pub enum LedgerError {
    Io(String),
    WriterClosed,
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::Io(e) => write!(f, "ledger I/O error: {e}"),
            LedgerError::WriterClosed => write!(f, "ledger writer shut down"),
        }
    }
}

impl std::error::Error for LedgerError {}

/// The durable system of record for locks and bookings.
///
/// Writes here happen only after the corresponding fast-store step is
/// confirmed; they are not atomic with it. The coordinator and the sweep are
/// written against this seam, not against a concrete store.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn define_resource(&self, resource_id: ResourceId, capacity: u32)
        -> Result<(), LedgerError>;
    async fn resource_capacity(&self, resource_id: ResourceId)
        -> Result<Option<u32>, LedgerError>;

    async fn record_lock(&self, record: LockRecord) -> Result<(), LedgerError>;
    async fn set_lock_status(&self, lock_id: LockId, status: LockStatus)
        -> Result<(), LedgerError>;
    /// Bulk transition: every lock for the pair still `active` with an expiry
    /// at or before `cutoff` becomes `expired`. Returns how many changed.
    async fn expire_locks(
        &self,
        resource_id: ResourceId,
        holder_id: HolderId,
        cutoff: Ms,
    ) -> Result<u64, LedgerError>;
    /// Locks counting against capacity: `active` with an expiry after `now`.
    async fn count_active_locks(&self, resource_id: ResourceId, now: Ms)
        -> Result<u64, LedgerError>;
    async fn lock(&self, lock_id: LockId) -> Result<Option<LockRecord>, LedgerError>;

    async fn record_booking(&self, record: BookingRecord) -> Result<(), LedgerError>;
    async fn set_payment(&self, booking_id: BookingId, payment: PaymentStatus)
        -> Result<(), LedgerError>;
    async fn booking(&self, booking_id: BookingId)
        -> Result<Option<BookingRecord>, LedgerError>;
    /// Bookings counting against capacity: payment state unpaid or paid.
    async fn count_active_bookings(&self, resource_id: ResourceId) -> Result<u64, LedgerError>;
    /// Whether the holder already has a live booking on the resource.
    async fn has_live_booking(
        &self,
        resource_id: ResourceId,
        holder_id: HolderId,
    ) -> Result<bool, LedgerError>;
}

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: LedgerEvent,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<LedgerEvent>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(LedgerEvent, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::LEDGER_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::LEDGER_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(LedgerEvent, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(
    batch: &mut Vec<(LedgerEvent, oneshot::Sender<io::Result<()>>)>,
    result: &io::Result<()>,
) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

// ── In-memory record maps ────────────────────────────────

#[derive(Default)]
struct LedgerState {
    capacities: HashMap<ResourceId, u32>,
    locks: HashMap<LockId, LockRecord>,
    resource_locks: HashMap<ResourceId, Vec<LockId>>,
    bookings: HashMap<BookingId, BookingRecord>,
    resource_bookings: HashMap<ResourceId, Vec<BookingId>>,
}

impl LedgerState {
    fn apply(&mut self, event: &LedgerEvent) {
        match event {
            LedgerEvent::ResourceDefined { resource_id, capacity } => {
                self.capacities.insert(*resource_id, *capacity);
            }
            LedgerEvent::LockRecorded {
                lock_id,
                resource_id,
                holder_id,
                created_at,
                expires_at,
                status,
            } => {
                let record = LockRecord {
                    lock_id: *lock_id,
                    resource_id: *resource_id,
                    holder_id: *holder_id,
                    created_at: *created_at,
                    expires_at: *expires_at,
                    status: *status,
                };
                if self.locks.insert(*lock_id, record).is_none() {
                    self.resource_locks
                        .entry(*resource_id)
                        .or_default()
                        .push(*lock_id);
                }
            }
            LedgerEvent::LockStatusChanged { lock_id, status } => {
                if let Some(record) = self.locks.get_mut(lock_id) {
                    record.status = *status;
                }
            }
            LedgerEvent::BookingRecorded {
                booking_id,
                resource_id,
                holder_id,
                price_cents,
                payment,
                created_at,
                lock_id,
            } => {
                let record = BookingRecord {
                    booking_id: *booking_id,
                    resource_id: *resource_id,
                    holder_id: *holder_id,
                    price_cents: *price_cents,
                    payment: *payment,
                    created_at: *created_at,
                    lock_id: *lock_id,
                };
                if self.bookings.insert(*booking_id, record).is_none() {
                    self.resource_bookings
                        .entry(*resource_id)
                        .or_default()
                        .push(*booking_id);
                }
            }
            LedgerEvent::PaymentChanged { booking_id, payment } => {
                if let Some(record) = self.bookings.get_mut(booking_id) {
                    record.payment = *payment;
                }
            }
        }
    }

    /// Minimal event list that recreates the current state: one definition per
    /// resource, one record per lock/booking at its current status.
    fn snapshot(&self) -> Vec<LedgerEvent> {
        let mut events = Vec::with_capacity(
            self.capacities.len() + self.locks.len() + self.bookings.len(),
        );
        for (resource_id, capacity) in &self.capacities {
            events.push(LedgerEvent::ResourceDefined {
                resource_id: *resource_id,
                capacity: *capacity,
            });
        }
        for record in self.locks.values() {
            events.push(LedgerEvent::LockRecorded {
                lock_id: record.lock_id,
                resource_id: record.resource_id,
                holder_id: record.holder_id,
                created_at: record.created_at,
                expires_at: record.expires_at,
                status: record.status,
            });
        }
        for record in self.bookings.values() {
            events.push(LedgerEvent::BookingRecorded {
                booking_id: record.booking_id,
                resource_id: record.resource_id,
                holder_id: record.holder_id,
                price_cents: record.price_cents,
                payment: record.payment,
                created_at: record.created_at,
                lock_id: record.lock_id,
            });
        }
        events
    }
}

/// WAL-backed ledger. Record maps live in memory, rebuilt by replay on open;
/// every mutation is durably appended (group commit) before it is applied.
pub struct WalLedger {
    state: RwLock<LedgerState>,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl WalLedger {
    /// Open the ledger at `path`, replaying any existing log.
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Wal::replay(path)?;
        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut state = LedgerState::default();
        for event in &events {
            state.apply(event);
        }

        Ok(Self {
            state: RwLock::new(state),
            wal_tx,
        })
    }

    /// Durably append one event via the group-commit writer.
    async fn append(&self, event: &LedgerEvent) -> Result<(), LedgerError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| LedgerError::WriterClosed)?;
        rx.await
            .map_err(|_| LedgerError::WriterClosed)?
            .map_err(|e| LedgerError::Io(e.to_string()))
    }

    /// Append durably, then apply to the in-memory maps.
    async fn commit(&self, event: LedgerEvent) -> Result<(), LedgerError> {
        self.append(&event).await?;
        self.state.write().await.apply(&event);
        Ok(())
    }

    /// Rewrite the WAL with only the events needed to recreate current state.
    pub async fn compact(&self) -> Result<(), LedgerError> {
        let events = self.state.read().await.snapshot();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| LedgerError::WriterClosed)?;
        rx.await
            .map_err(|_| LedgerError::WriterClosed)?
            .map_err(|e| LedgerError::Io(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl Ledger for WalLedger {
    async fn define_resource(
        &self,
        resource_id: ResourceId,
        capacity: u32,
    ) -> Result<(), LedgerError> {
        self.commit(LedgerEvent::ResourceDefined { resource_id, capacity })
            .await
    }

    async fn resource_capacity(
        &self,
        resource_id: ResourceId,
    ) -> Result<Option<u32>, LedgerError> {
        Ok(self.state.read().await.capacities.get(&resource_id).copied())
    }

    async fn record_lock(&self, record: LockRecord) -> Result<(), LedgerError> {
        self.commit(LedgerEvent::LockRecorded {
            lock_id: record.lock_id,
            resource_id: record.resource_id,
            holder_id: record.holder_id,
            created_at: record.created_at,
            expires_at: record.expires_at,
            status: record.status,
        })
        .await
    }

    async fn set_lock_status(
        &self,
        lock_id: LockId,
        status: LockStatus,
    ) -> Result<(), LedgerError> {
        self.commit(LedgerEvent::LockStatusChanged { lock_id, status })
            .await
    }

    async fn expire_locks(
        &self,
        resource_id: ResourceId,
        holder_id: HolderId,
        cutoff: Ms,
    ) -> Result<u64, LedgerError> {
        let matching: Vec<LockId> = {
            let state = self.state.read().await;
            state
                .resource_locks
                .get(&resource_id)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| state.locks.get(id))
                        .filter(|r| {
                            r.holder_id == holder_id
                                && r.status == LockStatus::Active
                                && r.expires_at <= cutoff
                        })
                        .map(|r| r.lock_id)
                        .collect()
                })
                .unwrap_or_default()
        };

        for lock_id in &matching {
            self.commit(LedgerEvent::LockStatusChanged {
                lock_id: *lock_id,
                status: LockStatus::Expired,
            })
            .await?;
        }
        Ok(matching.len() as u64)
    }

    async fn count_active_locks(
        &self,
        resource_id: ResourceId,
        now: Ms,
    ) -> Result<u64, LedgerError> {
        let state = self.state.read().await;
        let count = state
            .resource_locks
            .get(&resource_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.locks.get(id))
                    .filter(|r| r.is_active_at(now))
                    .count()
            })
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn lock(&self, lock_id: LockId) -> Result<Option<LockRecord>, LedgerError> {
        Ok(self.state.read().await.locks.get(&lock_id).cloned())
    }

    async fn record_booking(&self, record: BookingRecord) -> Result<(), LedgerError> {
        self.commit(LedgerEvent::BookingRecorded {
            booking_id: record.booking_id,
            resource_id: record.resource_id,
            holder_id: record.holder_id,
            price_cents: record.price_cents,
            payment: record.payment,
            created_at: record.created_at,
            lock_id: record.lock_id,
        })
        .await
    }

    async fn set_payment(
        &self,
        booking_id: BookingId,
        payment: PaymentStatus,
    ) -> Result<(), LedgerError> {
        self.commit(LedgerEvent::PaymentChanged { booking_id, payment })
            .await
    }

    async fn booking(&self, booking_id: BookingId) -> Result<Option<BookingRecord>, LedgerError> {
        Ok(self.state.read().await.bookings.get(&booking_id).cloned())
    }

    async fn count_active_bookings(&self, resource_id: ResourceId) -> Result<u64, LedgerError> {
        let state = self.state.read().await;
        let count = state
            .resource_bookings
            .get(&resource_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.bookings.get(id))
                    .filter(|r| r.payment.is_live())
                    .count()
            })
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn has_live_booking(
        &self,
        resource_id: ResourceId,
        holder_id: HolderId,
    ) -> Result<bool, LedgerError> {
        let state = self.state.read().await;
        let found = state
            .resource_bookings
            .get(&resource_id)
            .is_some_and(|ids| {
                ids.iter()
                    .filter_map(|id| state.bookings.get(id))
                    .any(|r| r.holder_id == holder_id && r.payment.is_live())
            });
        Ok(found)
    }
}
