// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Gate Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Implements the EventSignal port in-process so observers (the CLI, tests,
// a forwarding task) can follow gate invocations as they happen.
//
// Events are not persisted; a receiver that falls behind loses the oldest.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::events::GateEvent;
use crate::domain::ports::{EventSignal, UpstreamError};

/// Event bus for publishing and subscribing to gate events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<GateEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish a gate event to all subscribers
    pub fn publish(&self, event: GateEvent) {
        debug!("Publishing event: {:?}", event);

        // send() errs only when nobody is subscribed
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all gate events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to the events of a single invocation
    pub fn subscribe_invocation(&self, invocation_id: Uuid) -> InvocationEventReceiver {
        InvocationEventReceiver {
            receiver: self.sender.subscribe(),
            invocation_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl EventSignal for EventBus {
    async fn emit(&self, event: &GateEvent) -> Result<(), UpstreamError> {
        self.publish(event.clone());
        Ok(())
    }
}

fn recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all gate events
pub struct EventReceiver {
    receiver: broadcast::Receiver<GateEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<GateEvent, EventBusError> {
        self.receiver.recv().await.map_err(recv_error)
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Result<GateEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to one invocation id
pub struct InvocationEventReceiver {
    receiver: broadcast::Receiver<GateEvent>,
    invocation_id: Uuid,
}

impl InvocationEventReceiver {
    pub async fn recv(&mut self) -> Result<GateEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(recv_error)?;
            if event.invocation_id() == self.invocation_id {
                return Ok(event);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::image::ImageDigest;
    use chrono::Utc;

    fn baseline(invocation_id: Uuid) -> GateEvent {
        GateEvent::BaselineRecorded {
            invocation_id,
            repository: "web".to_string(),
            image_digest: ImageDigest::new("sha256:a"),
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_emit_reaches_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 2);

        let id = Uuid::new_v4();
        event_bus.emit(&baseline(id)).await.unwrap();

        assert_eq!(receiver1.recv().await.unwrap().invocation_id(), id);
        assert_eq!(receiver2.recv().await.unwrap().invocation_id(), id);
        assert!(matches!(receiver1.try_recv(), Err(EventBusError::Empty)));
    }

    #[tokio::test]
    async fn test_invocation_filtering() {
        let event_bus = EventBus::new(10);
        let ours = Uuid::new_v4();
        let mut receiver = event_bus.subscribe_invocation(ours);

        event_bus.publish(baseline(Uuid::new_v4()));
        event_bus.publish(baseline(ours));

        assert_eq!(receiver.recv().await.unwrap().invocation_id(), ours);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let event_bus = EventBus::default();
        event_bus.publish(baseline(Uuid::new_v4()));
        assert_eq!(event_bus.subscriber_count(), 0);
    }
}
