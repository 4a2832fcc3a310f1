//! Seat reservation & lock coordination engine.
//!
//! Limited-capacity, time-slotted resources are claimed by many concurrent
//! holders through soft locks (TTL-bounded holds) that can be cancelled or
//! promoted into hard bookings. Admission runs against an embedded fast
//! store — per-resource capacity counters and lock entries mutated in atomic
//! critical sections — while a WAL-backed durable ledger records the history
//! and seeds counters back after a cold start. A recurring sweep reconciles
//! passively expired locks with the counters and the ledger.

pub mod config;
pub mod engine;
pub mod ledger;
pub mod model;
pub mod observability;
pub mod store;
pub mod sweep;
pub mod wal;

pub use config::Config;
pub use engine::{Engine, EngineError, LockGrant, Promotion, SweepStats};
pub use ledger::{Ledger, LedgerError, WalLedger};
pub use sweep::{run_compactor, run_sweep};
