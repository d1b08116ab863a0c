//! Collaborator contracts and their production implementations.
//!
//! Every external system the coordinator touches is modeled as an
//! `async_trait` contract so the core carries no assumption about the
//! backing technology, only the operation semantics. Production
//! implementations live next to the contracts; in-memory mocks live in
//! the `rc-test-utils` crate.
//!
//! - [`lock`] - distributed mutual exclusion with TTL (Redis)
//! - [`engine`] - media engine egress + participant presence (HTTP)
//! - [`event_bus`] - cross-process recording notifications (Redis pub/sub)
//! - [`store`] - persisted recording records (Redis)

pub mod engine;
pub mod event_bus;
pub mod lock;
pub mod store;

pub use engine::{EgressConfig, EgressInfo, EgressStatus, MediaEngineClient};
pub use event_bus::{EventBus, EventSubscription, RecordingEvent, RecordingEventKind};
pub use lock::{LockEntry, LockService};
pub use store::RecordingStore;
