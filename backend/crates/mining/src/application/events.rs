//! Outbound Events
//!
//! Core operations never talk to clients or notifiers directly. They publish
//! [`MiningEvent`]s on the [`EventBus`] after the user's critical section is
//! released, and an [`EventDispatcher`] task fans them out to the
//! [`LiveChannel`] and the [`NotificationSink`]. Nothing here can fail a
//! ledger operation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::domain::session::SessionSnapshot;
use crate::domain::value_objects::{NotificationKind, UserId};
use crate::domain::wallet::WalletSnapshot;

#[derive(Debug, Clone)]
pub enum MiningEvent {
    WalletChanged(WalletSnapshot),
    SessionChanged(SessionSnapshot),
    Notify {
        user_id: UserId,
        kind: NotificationKind,
        payload: serde_json::Value,
    },
}

impl MiningEvent {
    pub fn user_id(&self) -> UserId {
        match self {
            MiningEvent::WalletChanged(w) => w.user_id,
            MiningEvent::SessionChanged(s) => s.user_id,
            MiningEvent::Notify { user_id, .. } => *user_id,
        }
    }

    pub fn notify(user_id: UserId, kind: NotificationKind, payload: serde_json::Value) -> Self {
        MiningEvent::Notify {
            user_id,
            kind,
            payload,
        }
    }
}

/// Broadcast bus for committed state changes
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MiningEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: MiningEvent) {
        // no receiver just means nobody is listening
        if self.sender.send(event).is_err() {
            tracing::trace!("Mining event dropped, no subscribers");
        }
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = MiningEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MiningEvent> {
        self.sender.subscribe()
    }
}

/// Message delivered to a live subscriber
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LiveUpdate {
    Wallet(WalletSnapshot),
    Session(SessionSnapshot),
}

/// Best-effort per-user push channel.
///
/// Subscribers get a bounded queue. A full queue drops the update; a closed
/// one is removed on the next push.
#[derive(Debug)]
pub struct LiveChannel {
    buffer: usize,
    subscribers: Mutex<HashMap<UserId, Vec<mpsc::Sender<LiveUpdate>>>>,
}

impl LiveChannel {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, user_id: UserId) -> mpsc::Receiver<LiveUpdate> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(user_id)
            .or_default()
            .push(tx);
        rx
    }

    /// Push to every subscriber of `user_id`. Returns how many received it.
    pub fn push(&self, user_id: UserId, update: LiveUpdate) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        let Some(senders) = subscribers.get_mut(&user_id) else {
            return 0;
        };

        let mut delivered = 0;
        senders.retain(|tx| match tx.try_send(update.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(user_id = %user_id, "Live subscriber lagging, update dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        if senders.is_empty() {
            subscribers.remove(&user_id);
        }
        delivered
    }

    /// Drop every subscriber, ending their streams
    pub fn close_all(&self) {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn subscriber_count(&self, user_id: UserId) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&user_id)
            .map_or(0, Vec::len)
    }
}

impl Default for LiveChannel {
    fn default() -> Self {
        Self::new(32)
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification sink unavailable: {0}")]
    Unavailable(String),
    #[error("Notification rejected: {0}")]
    Rejected(String),
}

/// Fire-and-forget notification sink
#[trait_variant::make(NotificationSink: Send)]
pub trait LocalNotificationSink {
    async fn notify(
        &self,
        user_id: UserId,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError>;
}

/// Sink that only writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    async fn notify(
        &self,
        user_id: UserId,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError> {
        tracing::info!(user_id = %user_id, kind = %kind, payload = %payload, "Notification");
        Ok(())
    }
}

/// Forwards bus events to the live channel and the notification sink
pub struct EventDispatcher<N> {
    live: Arc<LiveChannel>,
    sink: Arc<N>,
}

impl<N> EventDispatcher<N>
where
    N: NotificationSink + Sync + 'static,
{
    pub fn new(live: Arc<LiveChannel>, sink: Arc<N>) -> Self {
        Self { live, sink }
    }

    pub async fn dispatch(&self, event: MiningEvent) {
        match event {
            MiningEvent::WalletChanged(snapshot) => {
                self.live.push(snapshot.user_id, LiveUpdate::Wallet(snapshot));
            }
            MiningEvent::SessionChanged(snapshot) => {
                self.live.push(snapshot.user_id, LiveUpdate::Session(snapshot));
            }
            MiningEvent::Notify {
                user_id,
                kind,
                payload,
            } => {
                if let Err(e) = self.sink.notify(user_id, kind, payload).await {
                    tracing::warn!(user_id = %user_id, kind = %kind, error = %e, "Notification failed");
                }
            }
        }
    }

    /// Drain the bus until every sender is gone
    pub async fn run(self, mut events: broadcast::Receiver<MiningEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.dispatch(event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event dispatcher lagged, events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::debug!("Event dispatcher stopped");
    }

    pub fn spawn(self, events: broadcast::Receiver<MiningEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }
}
