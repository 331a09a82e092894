//! Event bus with typed pub/sub
//!
//! The bus carries state changes from the state machine and the
//! notifications the scheduler produces (mode changes, configuration
//! changes, slot updates). Subscribers receive events over tokio broadcast
//! channels, so a slow subscriber lags instead of blocking the publisher.

use cs_core::{Context, Event, EventData, EventType};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Default channel capacity for event subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// The event bus for publishing and subscribing to events
pub struct EventBus {
    /// Senders per event type
    listeners: DashMap<EventType, broadcast::Sender<Event<serde_json::Value>>>,
    /// Sender for subscribers of every event
    match_all_sender: broadcast::Sender<Event<serde_json::Value>>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (match_all_sender, _) = broadcast::channel(capacity);
        Self {
            listeners: DashMap::new(),
            match_all_sender,
            capacity,
        }
    }

    /// Subscribe to events of one type (`"*"` subscribes to everything)
    pub fn subscribe(
        &self,
        event_type: impl Into<EventType>,
    ) -> broadcast::Receiver<Event<serde_json::Value>> {
        let event_type = event_type.into();
        trace!(event_type = %event_type, "Subscribing to event type");

        if event_type.is_match_all() {
            return self.match_all_sender.subscribe();
        }

        self.listeners
            .entry(event_type)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Subscribe to a typed event, receiving parsed payloads
    pub fn subscribe_typed<T: EventData + serde::de::DeserializeOwned>(
        &self,
    ) -> TypedEventReceiver<T> {
        TypedEventReceiver::new(self.subscribe(T::event_type()))
    }

    /// Subscribe to all events
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event<serde_json::Value>> {
        self.match_all_sender.subscribe()
    }

    /// Deliver an event to its type's subscribers and to match-all subscribers
    pub fn fire(&self, event: Event<serde_json::Value>) {
        debug!(event_type = %event.event_type, "Firing event");

        if let Some(sender) = self.listeners.get(&event.event_type) {
            // A send error only means nobody is listening
            let _ = sender.send(event.clone());
        }

        let _ = self.match_all_sender.send(event);
    }

    /// Serialize and fire a typed event
    pub fn fire_typed<T: EventData + serde::Serialize>(&self, data: T, context: Context) {
        let event = Event::typed(data, context);
        match serde_json::to_value(&event.data) {
            Ok(json) => self.fire(event.map(|_| json)),
            Err(err) => warn!(
                event_type = %event.event_type,
                error = %err,
                "Dropping event with unserializable payload"
            ),
        }
    }

    /// Number of event types with at least one subscription ever made
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A receiver yielding only events whose payload parses as `T`
pub struct TypedEventReceiver<T> {
    rx: broadcast::Receiver<Event<serde_json::Value>>,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: EventData + serde::de::DeserializeOwned> TypedEventReceiver<T> {
    fn new(rx: broadcast::Receiver<Event<serde_json::Value>>) -> Self {
        Self {
            rx,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Receive the next event whose payload parses as `T`
    pub async fn recv(&mut self) -> Result<Event<T>, broadcast::error::RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if let Ok(data) = serde_json::from_value::<T>(event.data.clone()) {
                return Ok(event.map(|_| data));
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv)
    pub fn try_recv(&mut self) -> Result<Event<T>, broadcast::error::TryRecvError> {
        loop {
            let event = self.rx.try_recv()?;
            if let Ok(data) = serde_json::from_value::<T>(event.data.clone()) {
                return Ok(event.map(|_| data));
            }
        }
    }
}

/// Shared handle to the event bus
pub type SharedEventBus = Arc<EventBus>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cs_core::events::{ModeChangedData, SlotUpdatedData};
    use cs_core::{EntityId, Mode};
    use serde_json::json;

    #[tokio::test]
    async fn test_subscribe_and_fire() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe("test_event");

        bus.fire(Event::new("test_event", json!({"key": "value"}), Context::new()));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type.as_str(), "test_event");
        assert_eq!(received.data["key"], "value");
    }

    #[tokio::test]
    async fn test_match_all_subscription() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe("*");

        bus.fire(Event::new("event_a", json!({}), Context::new()));
        bus.fire(Event::new("event_b", json!({}), Context::new()));

        assert_eq!(rx.recv().await.unwrap().event_type.as_str(), "event_a");
        assert_eq!(rx.recv().await.unwrap().event_type.as_str(), "event_b");
    }

    #[tokio::test]
    async fn test_typed_mode_changed() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_typed::<ModeChangedData>();

        let data = ModeChangedData {
            old_mode: Mode::Home,
            new_mode: Mode::Away,
            timestamp: Utc::now(),
        };
        bus.fire_typed(data.clone(), Context::new());

        let received = rx.recv().await.unwrap();
        assert_eq!(received.data, data);
    }

    #[tokio::test]
    async fn test_typed_receiver_skips_other_payloads() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_typed::<SlotUpdatedData>();

        bus.fire(Event::new(
            cs_core::events::SLOT_UPDATED,
            json!({"garbage": true}),
            Context::new(),
        ));
        let data = SlotUpdatedData {
            entity: EntityId::new("climate", "office").unwrap(),
            mode: Mode::Home,
            day: "monday".to_string(),
            time_slot: "07:00-09:00".to_string(),
            target_value: Some(21.0),
        };
        bus.fire_typed(data.clone(), Context::new());

        assert_eq!(rx.recv().await.unwrap().data, data);
    }

    #[tokio::test]
    async fn test_no_cross_event_pollution() {
        let bus = EventBus::new();
        let mut rx_a = bus.subscribe("event_a");
        let mut rx_b = bus.subscribe("event_b");

        bus.fire(Event::new("event_a", json!({"type": "a"}), Context::new()));

        assert_eq!(rx_a.recv().await.unwrap().data["type"], "a");
        assert!(rx_b.try_recv().is_err());
    }
}
