//! Per-session event bus: ordered, asynchronous delivery of lifecycle
//! events to subscribers, plus the command channel a running scheduler
//! polls for `Retry`/`Skip`/`Pause`/`Resume` (§4.2).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// What kind of tree node an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    TestCase,
    Module,
    Keyword,
    Execution,
}

/// Per-node status, matching the state machine in §4.7.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    NotRun,
    Running,
    Pass,
    Fail,
    Error,
    Skipped,
    Retrying,
}

/// An immutable lifecycle event, §3.1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub name: String,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<String>>,
}

impl Event {
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>, name: impl Into<String>, status: EventStatus) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            name: name.into(),
            status,
            message: None,
            parent_id: None,
            extra: HashMap::new(),
            timestamp: Utc::now(),
            args: None,
            start_time: None,
            end_time: None,
            elapsed: None,
            logs: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = Some(args);
        self
    }

    pub fn with_elapsed(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.elapsed = Some((end - start).num_milliseconds() as f64 / 1000.0);
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    pub fn with_logs(mut self, logs: Vec<String>) -> Self {
        self.logs = Some(logs);
        self
    }
}

/// Control messages consumed at a scheduler suspension point (§3.1, §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Retry,
    Add,
    Skip,
    Pause,
    Resume,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    pub entity_id: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// A consumer of the event stream (live display, JUnit writer, ...).
///
/// A failing subscriber is isolated: the bus logs the error and keeps
/// delivering to the rest (§4.2).
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn on_event(&self, event: &Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

const EVENT_QUEUE_CAPACITY: usize = 256;
const COMMAND_QUEUE_CAPACITY: usize = 64;

struct Subscribers {
    by_id: HashMap<String, Arc<dyn EventSubscriber>>,
}

/// One event bus per session. Delivery runs on a background task so
/// publishers never block on a slow subscriber beyond the bounded queue;
/// overflow evicts the oldest pending event to make room for the new one
/// (§4.2).
pub struct EventBus {
    event_tx: mpsc::Sender<Event>,
    event_rx: Arc<Mutex<mpsc::Receiver<Event>>>,
    command_tx: mpsc::Sender<Command>,
    command_rx: Mutex<mpsc::Receiver<Command>>,
    subscribers: Arc<Mutex<Subscribers>>,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
    shutdown: Mutex<bool>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        let (event_tx, event_rx) = mpsc::channel::<Event>(EVENT_QUEUE_CAPACITY);
        let event_rx = Arc::new(Mutex::new(event_rx));
        let (command_tx, command_rx) = mpsc::channel::<Command>(COMMAND_QUEUE_CAPACITY);
        let subscribers = Arc::new(Mutex::new(Subscribers {
            by_id: HashMap::new(),
        }));

        let worker_subs = subscribers.clone();
        let worker_rx = event_rx.clone();
        let worker = tokio::spawn(async move {
            loop {
                // Lock is held only across the `recv` itself so `publish_event`
                // can acquire it to evict the oldest event while a subscriber
                // delivery is in flight below.
                let event = worker_rx.lock().await.recv().await;
                let Some(event) = event else { break };
                let subs = worker_subs.lock().await;
                for (id, sub) in subs.by_id.iter() {
                    if let Err(e) = sub.on_event(&event).await {
                        tracing::warn!(subscriber = %id, error = %e, "event subscriber failed, continuing delivery to others");
                    }
                }
            }
        });

        Arc::new(Self {
            event_tx,
            event_rx,
            command_tx,
            command_rx: Mutex::new(command_rx),
            subscribers,
            worker: Mutex::new(Some(worker)),
            shutdown: Mutex::new(false),
        })
    }

    /// Publish an event. Never blocks the scheduler indefinitely: on a full
    /// queue the oldest pending event is evicted to make room for the new
    /// one (§4.2), rather than dropping the new event outright.
    pub async fn publish_event(&self, event: Event) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                if let Ok(dropped) = self.event_rx.lock().await.try_recv() {
                    tracing::warn!(entity_id = %dropped.entity_id, "event queue full, dropping oldest pending event");
                }
                let _ = self.event_tx.try_send(event);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    pub async fn subscribe(&self, id: impl Into<String>, subscriber: Arc<dyn EventSubscriber>) {
        let mut subs = self.subscribers.lock().await;
        subs.by_id.insert(id.into(), subscriber);
    }

    pub async fn unsubscribe(&self, id: &str) {
        let mut subs = self.subscribers.lock().await;
        subs.by_id.remove(id);
    }

    pub async fn publish_command(&self, command: Command) {
        let _ = self.command_tx.try_send(command);
    }

    /// Non-blocking poll for the next pending command, used by the
    /// scheduler at its suspension points (§5).
    pub async fn get_command(&self) -> Option<Command> {
        self.command_rx.lock().await.try_recv().ok()
    }

    /// Idempotent: cancels the delivery worker and closes the bus. Safe to
    /// call more than once.
    pub async fn shutdown(&self) {
        let mut done = self.shutdown.lock().await;
        if *done {
            return;
        }
        *done = true;
        if let Some(handle) = self.worker.lock().await.take() {
            handle.abort();
        }
    }
}

/// Convenience id generator for entities created during suite parsing.
pub fn new_entity_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(Arc<AtomicUsize>);

    #[async_trait]
    impl EventSubscriber for Counter {
        async fn on_event(&self, _event: &Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventSubscriber for Failing {
        async fn on_event(&self, _event: &Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("boom".into())
        }
    }

    #[tokio::test]
    async fn delivers_in_order_to_all_subscribers_even_if_one_fails() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe("counter", Arc::new(Counter(count.clone()))).await;
        bus.subscribe("failing", Arc::new(Failing)).await;

        for i in 0..5 {
            bus.publish_event(Event::new(
                EntityType::Keyword,
                format!("kw-{i}"),
                "press",
                EventStatus::Running,
            ))
            .await;
        }

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn commands_are_polled_non_blocking() {
        let bus = EventBus::new();
        assert!(bus.get_command().await.is_none());
        bus.publish_command(Command {
            kind: CommandKind::Retry,
            entity_id: "kw-1".into(),
            params: vec![],
            parent_id: None,
        })
        .await;
        let cmd = bus.get_command().await.expect("command should be present");
        assert_eq!(cmd.kind, CommandKind::Retry);
        assert!(bus.get_command().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let bus = EventBus::new();
        bus.shutdown().await;
        bus.shutdown().await;
    }

    struct Blocking;

    #[async_trait]
    impl EventSubscriber for Blocking {
        async fn on_event(&self, _event: &Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn publish_event_drops_the_oldest_entry_when_the_queue_is_full() {
        let bus = EventBus::new();
        bus.subscribe("blocking", Arc::new(Blocking)).await;

        // Stalls the delivery worker inside the first event's subscriber call
        // so nothing drains the queue for the rest of this test.
        bus.publish_event(Event::new(EntityType::Keyword, "kickoff", "press", EventStatus::Running))
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        for i in 0..EVENT_QUEUE_CAPACITY {
            bus.publish_event(Event::new(EntityType::Keyword, format!("kw-{i}"), "press", EventStatus::Running))
                .await;
        }
        bus.publish_event(Event::new(EntityType::Keyword, "overflow", "press", EventStatus::Running))
            .await;

        let mut remaining = Vec::new();
        let mut rx = bus.event_rx.lock().await;
        while let Ok(event) = rx.try_recv() {
            remaining.push(event.entity_id);
        }

        assert_eq!(remaining.len(), EVENT_QUEUE_CAPACITY);
        assert!(!remaining.contains(&"kw-0".to_string()), "oldest buffered event should have been evicted");
        assert!(remaining.contains(&"overflow".to_string()), "newest event should have been kept");
    }
}
