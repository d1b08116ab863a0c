//! In-memory event bus.
//!
//! Reuses the production `SubscriberRegistry` for fan-out, so subscriptions
//! behave exactly as with the Redis bus (room filtering, unsubscribe on
//! drop). Tests stand in for the webhook-ingestion collaborator by calling
//! [`MockEventBus::emit`].

use async_trait::async_trait;
use common::types::RoomId;
use recording_controller::clients::event_bus::{
    EventBus, EventSubscription, RecordingEvent, SubscriberRegistry,
};
use recording_controller::errors::RecorderError;
use std::sync::{Arc, Mutex};

/// In-memory [`EventBus`] implementation.
#[derive(Clone, Default)]
pub struct MockEventBus {
    registry: SubscriberRegistry,
    published: Arc<Mutex<Vec<RecordingEvent>>>,
}

impl MockEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to subscribers, as the webhook-ingestion
    /// collaborator would after translating an engine webhook.
    pub fn emit(&self, event: &RecordingEvent) {
        self.registry.dispatch(event);
    }

    /// Every event published through the bus by the code under test.
    #[must_use]
    pub fn published(&self) -> Vec<RecordingEvent> {
        self.published.lock().unwrap().clone()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.subscriber_count()
    }
}

#[async_trait]
impl EventBus for MockEventBus {
    async fn subscribe(&self, room_id: &RoomId) -> Result<EventSubscription, RecorderError> {
        Ok(self.registry.subscribe(room_id.clone()))
    }

    async fn publish(&self, event: &RecordingEvent) -> Result<(), RecorderError> {
        self.published.lock().unwrap().push(event.clone());
        // Like Redis pub/sub, a publisher's own instance receives the
        // message back.
        self.registry.dispatch(event);
        Ok(())
    }
}
