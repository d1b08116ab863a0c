//! Distributed event bus for recording notifications.
//!
//! Carries "recording became active" notifications across server instances.
//! The publish side is driven by the webhook-ingestion collaborator that
//! translates engine webhooks into [`RecordingEvent`]s; this service mostly
//! consumes, except for the best-effort `Starting` signal emitted so room
//! UIs reflect state even when a webhook is missed.
//!
//! # Wire Format
//!
//! Events travel as JSON on a single Redis pub/sub channel
//! (`recording:events`). An in-process dispatcher fans messages out to
//! per-subscription mpsc channels filtered by room.
//!
//! Subscriptions unsubscribe on drop, so a settled `start` call cannot leak
//! its activation wait.

use crate::errors::RecorderError;
use async_trait::async_trait;
use common::types::{EgressId, RoomId};
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Redis pub/sub channel carrying all recording events.
pub const RECORDING_EVENTS_CHANNEL: &str = "recording:events";

/// Per-subscription buffer size. A subscriber that falls this far behind
/// loses events; the start timeout is the backstop.
const SUBSCRIPTION_BUFFER: usize = 16;

/// What happened to a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordingEventKind {
    /// A start was requested; activation not yet confirmed (best-effort UI
    /// signal).
    Starting,
    /// The engine confirmed the job is recording.
    Active,
}

/// A recording notification scoped to one room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingEvent {
    pub room_id: RoomId,
    /// Engine job the event refers to. `None` for signals emitted before a
    /// job id exists.
    pub egress_id: Option<EgressId>,
    pub kind: RecordingEventKind,
}

impl RecordingEvent {
    /// Whether this event confirms activation of the given job. An event
    /// without an egress id matches any job in its room.
    #[must_use]
    pub fn activates(&self, room_id: &RoomId, egress_id: &EgressId) -> bool {
        self.kind == RecordingEventKind::Active
            && self.room_id == *room_id
            && self
                .egress_id
                .as_ref()
                .is_none_or(|id| id == egress_id)
    }
}

/// Process-spanning publish/subscribe channel for recording events.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Subscribe to events for one room. Dropping the subscription
    /// unsubscribes.
    async fn subscribe(&self, room_id: &RoomId) -> Result<EventSubscription, RecorderError>;

    /// Publish an event to every instance.
    async fn publish(&self, event: &RecordingEvent) -> Result<(), RecorderError>;
}

/// In-process fan-out of bus messages to room-filtered subscriptions.
///
/// Shared by the production Redis bus and the in-memory test bus so both
/// hand out the same [`EventSubscription`] type.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    subscribers: HashMap<u64, (RoomId, mpsc::Sender<RecordingEvent>)>,
}

impl SubscriberRegistry {
    /// Register a new room-scoped subscription.
    #[must_use]
    pub fn subscribe(&self, room_id: RoomId) -> EventSubscription {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let id = {
            let mut inner = match self.inner.lock() {
                Ok(inner) => inner,
                Err(poisoned) => poisoned.into_inner(),
            };
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.insert(id, (room_id, tx));
            id
        };
        EventSubscription {
            id,
            receiver: rx,
            registry: Arc::clone(&self.inner),
        }
    }

    /// Deliver an event to every subscription whose room matches.
    pub fn dispatch(&self, event: &RecordingEvent) {
        let inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (id, (room_id, tx)) in &inner.subscribers {
            if *room_id == event.room_id {
                if let Err(e) = tx.try_send(event.clone()) {
                    warn!(
                        target: "rc.bus",
                        subscription = id,
                        room_id = %event.room_id,
                        error = %e,
                        "Dropping event for slow or closed subscriber"
                    );
                }
            }
        }
    }

    /// Number of live subscriptions (for tests and introspection).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        match self.inner.lock() {
            Ok(inner) => inner.subscribers.len(),
            Err(poisoned) => poisoned.into_inner().subscribers.len(),
        }
    }
}

/// A live room-scoped subscription. Unsubscribes on drop.
pub struct EventSubscription {
    id: u64,
    receiver: mpsc::Receiver<RecordingEvent>,
    registry: Arc<Mutex<RegistryInner>>,
}

impl EventSubscription {
    /// Await the next event for this room. Returns `None` if the bus
    /// dispatcher has shut down.
    pub async fn recv(&mut self) -> Option<RecordingEvent> {
        self.receiver.recv().await
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        let mut inner = match self.registry.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.subscribers.remove(&self.id);
    }
}

/// Redis pub/sub backed event bus.
#[derive(Clone)]
pub struct RedisEventBus {
    connection: MultiplexedConnection,
    registry: SubscriberRegistry,
}

impl RedisEventBus {
    /// Connect to Redis and spawn the dispatcher task.
    ///
    /// The dispatcher exits when `cancel_token` is cancelled or the pub/sub
    /// connection closes; open subscriptions then observe end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns `RecorderError::EventBus` if the connection or channel
    /// subscription fails.
    pub async fn new(
        redis_url: &str,
        cancel_token: CancellationToken,
    ) -> Result<Self, RecorderError> {
        let client = Client::open(redis_url).map_err(|e| {
            error!(target: "rc.bus", error = %e, "Failed to open Redis client");
            RecorderError::EventBus(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "rc.bus", error = %e, "Failed to connect to Redis");
                RecorderError::EventBus(format!("Failed to connect to Redis: {e}"))
            })?;

        let mut pubsub = client.get_async_pubsub().await.map_err(|e| {
            error!(target: "rc.bus", error = %e, "Failed to open pub/sub connection");
            RecorderError::EventBus(format!("Failed to open pub/sub connection: {e}"))
        })?;

        pubsub
            .subscribe(RECORDING_EVENTS_CHANNEL)
            .await
            .map_err(|e| {
                error!(target: "rc.bus", error = %e, "Failed to subscribe to events channel");
                RecorderError::EventBus(format!("Failed to subscribe to events channel: {e}"))
            })?;

        let registry = SubscriberRegistry::default();
        let dispatch_registry = registry.clone();

        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        info!(target: "rc.bus", "Event dispatcher shutting down");
                        break;
                    }
                    msg = stream.next() => {
                        let Some(msg) = msg else {
                            warn!(target: "rc.bus", "Pub/sub connection closed, dispatcher exiting");
                            break;
                        };
                        let payload: String = match msg.get_payload() {
                            Ok(payload) => payload,
                            Err(e) => {
                                warn!(target: "rc.bus", error = %e, "Undecodable pub/sub payload");
                                continue;
                            }
                        };
                        match serde_json::from_str::<RecordingEvent>(&payload) {
                            Ok(event) => {
                                debug!(
                                    target: "rc.bus",
                                    room_id = %event.room_id,
                                    kind = ?event.kind,
                                    "Dispatching event"
                                );
                                dispatch_registry.dispatch(&event);
                            }
                            Err(e) => {
                                warn!(target: "rc.bus", error = %e, "Malformed event payload");
                            }
                        }
                    }
                }
            }
        });

        Ok(Self {
            connection,
            registry,
        })
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn subscribe(&self, room_id: &RoomId) -> Result<EventSubscription, RecorderError> {
        Ok(self.registry.subscribe(room_id.clone()))
    }

    async fn publish(&self, event: &RecordingEvent) -> Result<(), RecorderError> {
        let payload = serde_json::to_string(event).map_err(|e| {
            RecorderError::EventBus(format!("Failed to serialize event: {e}"))
        })?;

        let mut conn = self.connection.clone();
        let _: () = conn
            .publish(RECORDING_EVENTS_CHANNEL, payload)
            .await
            .map_err(|e| {
                warn!(target: "rc.bus", error = %e, "Failed to publish event");
                RecorderError::EventBus(format!("Failed to publish event: {e}"))
            })?;

        Ok(())
    }
}
