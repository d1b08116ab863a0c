//! Recording Controller service library
//!
//! This library provides the core functionality of the recording lifecycle
//! coordinator - the subsystem of the meeting-room API responsible for:
//!
//! - Starting and stopping asynchronous recording jobs (egress) on the
//!   external media engine
//! - Guaranteeing at-most-one active recording per room across multiple
//!   cooperating server instances (distributed lock with TTL)
//! - Resolving the race between an asynchronous "recording became active"
//!   notification and a hard timeout with exactly-once settlement
//! - Healing locks and recording records left inconsistent by crashes,
//!   network partitions, or missed notifications (background reapers)
//!
//! # Architecture
//!
//! ```text
//! RecordingCoordinator
//! ├── LockService          (Redis SET NX PX, one lock per room)
//! ├── MediaEngineClient    (engine REST API: egress + participant presence)
//! ├── EventBus             (Redis pub/sub, "egress active" notifications)
//! └── RecordingStore       (Redis-persisted recording records)
//!
//! Scheduler
//! ├── OrphanedLockReaper   (releases locks with no live work behind them)
//! └── StaleRecordingReaper (aborts records whose engine job is gone/stalled)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Lock is the exclusivity primitive**: the store never enforces
//!   uniqueness; the distributed lock does. Lock state is always re-checked
//!   remotely, never cached in-process.
//! - **Exactly-once settlement**: a `start` call races a work branch against
//!   a timeout branch behind a single compare-and-swap guard. The losing
//!   branch is discarded silently.
//! - **Reapers are idempotent**: both background sweeps tolerate overlap
//!   with themselves and with each other, and one room's failure never
//!   aborts a sweep.
//!
//! # Modules
//!
//! - [`clients`] - Collaborator contracts (lock, engine, bus, store) and
//!   their production implementations
//! - [`coordinator`] - The start/stop lifecycle protocol
//! - [`tasks`] - Scheduler plus the two reapers
//! - [`models`] - Recording session records and status lifecycle
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error taxonomy with client-safe mapping
//! - [`observability`] - Health endpoints and Prometheus metrics

pub mod clients;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod models;
pub mod observability;
pub mod tasks;
