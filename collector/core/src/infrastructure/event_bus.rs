// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Collector Events
//
// In-memory event streaming over a tokio broadcast channel. The daemon logs
// from it and tests observe pipeline progress through it. Events are not
// persisted; a lagging subscriber loses the oldest ones.

use crate::domain::events::CollectorEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event bus for publishing and subscribing to collector events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<CollectorEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity
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

    pub fn publish(&self, event: CollectorEvent) {
        debug!(event = event.name(), "Publishing event");

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all collector events
pub struct EventReceiver {
    receiver: broadcast::Receiver<CollectorEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<CollectorEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<CollectorEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Everything currently buffered, without waiting
    pub fn drain(&mut self) -> Vec<CollectorEvent> {
        let mut events = Vec::new();
        loop {
            match self.try_recv() {
                Ok(event) => events.push(event),
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::SweepId;
    use chrono::Utc;

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let sweep_id = SweepId::new();
        event_bus.publish(CollectorEvent::SweepStarted {
            sweep_id,
            started_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            CollectorEvent::SweepStarted { sweep_id: id, .. } => assert_eq!(id, sweep_id),
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_drain_and_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        for _ in 0..3 {
            event_bus.publish(CollectorEvent::SweepStarted {
                sweep_id: SweepId::new(),
                started_at: Utc::now(),
            });
        }

        assert_eq!(receiver1.drain().len(), 3);
        assert_eq!(receiver2.drain().len(), 3);
        assert!(matches!(receiver1.try_recv(), Err(EventBusError::Empty)));
    }
}
