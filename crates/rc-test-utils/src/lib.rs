//! # Recording Controller Test Utilities
//!
//! Shared test utilities for the Recording Controller service.
//!
//! This crate provides in-memory implementations of every collaborator
//! contract plus test fixtures, so coordinator and reaper behavior can be
//! tested without Redis or a media engine.
//!
//! ## Modules
//!
//! - `mock_engine` - Scriptable in-memory media engine
//! - `mock_lock` - In-memory lock service with adjustable creation times
//! - `mock_bus` - In-memory event bus over the production subscriber registry
//! - `mock_store` - In-memory recording store
//! - `fixtures` - Pre-wired harness and test data builders
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rc_test_utils::fixtures::TestHarness;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = TestHarness::new();
//!     harness.engine.add_room("room-1", 2);
//!
//!     let start = harness.coordinator.start(&room("room-1"), EgressConfig::default());
//!     // Drive activation through harness.bus, then assert on the session...
//! }
//! ```

pub mod fixtures;
pub mod mock_bus;
pub mod mock_engine;
pub mod mock_lock;
pub mod mock_store;

pub use fixtures::TestHarness;
pub use mock_bus::MockEventBus;
pub use mock_engine::{MockMediaEngine, StartBehavior};
pub use mock_lock::MockLockService;
pub use mock_store::MockRecordingStore;
