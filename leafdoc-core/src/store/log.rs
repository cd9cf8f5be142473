//! Ordered conversation log with live subscriptions.
//!
//! Every identity gets one `watch` channel. After each append the log
//! re-reads the identity's window from the store and publishes it, so a
//! subscriber always holds a complete, ordered snapshot rather than a
//! stream of deltas.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::types::{ChatTurn, ConversationIdentity, NewTurn};

use super::DocumentStore;

/// Snapshot delivered to subscribers
#[derive(Debug, Clone)]
pub enum LogUpdate {
    /// Up to `window` most recent visible turns, oldest first
    Turns(Arc<[ChatTurn]>),
    /// Reading the window failed; the subscription stays open
    Failed(String),
}

impl LogUpdate {
    /// Turns in this snapshot, empty for a failure
    pub fn turns(&self) -> Arc<[ChatTurn]> {
        match self {
            LogUpdate::Turns(turns) => turns.clone(),
            LogUpdate::Failed(_) => Arc::from(Vec::new()),
        }
    }
}

/// Append-only, timestamp-ordered turn log
pub struct ConversationLog {
    store: Arc<dyn DocumentStore>,
    window_size: usize,
    channels: Mutex<HashMap<String, watch::Sender<LogUpdate>>>,
}

impl ConversationLog {
    pub fn new(store: Arc<dyn DocumentStore>, window_size: usize) -> Self {
        Self {
            store,
            window_size: window_size.max(1),
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(store: Arc<dyn DocumentStore>, config: &StoreConfig) -> Self {
        Self::new(store, config.window)
    }

    /// Maximum number of turns in a delivered snapshot
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// One-shot read of the current window
    pub fn window(&self, identity: &ConversationIdentity) -> Result<Vec<ChatTurn>> {
        let mut turns = self.store.recent(identity.key(), self.window_size)?;
        turns.retain(ChatTurn::has_text);
        Ok(turns)
    }

    /// Register a live listener for `identity`.
    ///
    /// The returned subscription already holds the current window.
    pub fn subscribe(&self, identity: &ConversationIdentity) -> Subscription {
        let mut channels = lock_channels(&self.channels);
        let receiver = match channels.get(identity.key()) {
            Some(sender) if !sender.is_closed() => sender.subscribe(),
            _ => {
                let (sender, receiver) = watch::channel(self.read_update(identity));
                channels.insert(identity.key().to_string(), sender);
                receiver
            }
        };

        tracing::debug!(identity = %identity, "Subscribed to conversation");
        Subscription {
            identity: identity.clone(),
            receiver: Some(receiver),
        }
    }

    /// Insert a turn; the store assigns its id and timestamp.
    ///
    /// Subscribers see the turn in their next snapshot.
    pub fn append(&self, identity: &ConversationIdentity, turn: NewTurn) -> Result<String> {
        let stored = self
            .store
            .append(identity.key(), &turn)
            .map_err(|e| match e {
                Error::StoreWrite(_) => e,
                other => Error::StoreWrite(other.to_string()),
            })?;

        tracing::debug!(
            identity = %identity,
            turn_id = %stored.id,
            role = stored.role.as_str(),
            "Appended turn"
        );

        self.publish(identity);
        Ok(stored.id)
    }

    fn publish(&self, identity: &ConversationIdentity) {
        let mut channels = lock_channels(&self.channels);
        let Some(sender) = channels.get(identity.key()) else {
            return;
        };
        if sender.receiver_count() == 0 {
            channels.remove(identity.key());
            return;
        }
        sender.send_replace(self.read_update(identity));
    }

    fn read_update(&self, identity: &ConversationIdentity) -> LogUpdate {
        match self.window(identity) {
            Ok(turns) => LogUpdate::Turns(turns.into()),
            Err(e) => {
                tracing::warn!(identity = %identity, error = %e, "Failed to read conversation window");
                LogUpdate::Failed(e.to_string())
            }
        }
    }
}

fn lock_channels(
    channels: &Mutex<HashMap<String, watch::Sender<LogUpdate>>>,
) -> std::sync::MutexGuard<'_, HashMap<String, watch::Sender<LogUpdate>>> {
    channels
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Handle to a live conversation view.
///
/// Dropping the handle unsubscribes.
pub struct Subscription {
    identity: ConversationIdentity,
    receiver: Option<watch::Receiver<LogUpdate>>,
}

impl Subscription {
    pub fn identity(&self) -> &ConversationIdentity {
        &self.identity
    }

    /// Last-delivered snapshot, `None` once unsubscribed
    pub fn current(&self) -> Option<LogUpdate> {
        self.receiver.as_ref().map(|rx| rx.borrow().clone())
    }

    /// Turns of the last-delivered snapshot
    pub fn turns(&self) -> Arc<[ChatTurn]> {
        self.current()
            .map(|update| update.turns())
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Wait for the next snapshot.
    ///
    /// Returns `None` when unsubscribed or when the log has gone away.
    pub async fn changed(&mut self) -> Option<LogUpdate> {
        let receiver = self.receiver.as_mut()?;
        match receiver.changed().await {
            Ok(()) => Some(receiver.borrow_and_update().clone()),
            Err(_) => None,
        }
    }

    /// Stop delivery. Safe to call repeatedly.
    pub fn unsubscribe(&mut self) {
        if self.receiver.take().is_some() {
            tracing::debug!(identity = %self.identity, "Unsubscribed from conversation");
        }
    }

    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }
}
