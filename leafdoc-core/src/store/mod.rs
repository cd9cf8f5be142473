//! Conversation storage
//!
//! - [`DocumentStore`]: the backing store capability (append with a
//!   store-assigned timestamp, most-recent-N query)
//! - [`SqliteStore`]: SQLite implementation with embedded migrations
//! - [`ConversationLog`]: ordered log with live subscriptions on top

pub mod log;
pub mod schema;
mod sqlite;

pub use log::{ConversationLog, LogUpdate, Subscription};
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::{ChatTurn, NewTurn};

/// Ordered collection keyed by a namespace path.
pub trait DocumentStore: Send + Sync {
    /// Insert a turn, assigning `id`, `created_at` and `seq`.
    ///
    /// `created_at` never precedes an earlier turn in the same namespace.
    fn append(&self, namespace: &str, turn: &NewTurn) -> Result<ChatTurn>;

    /// The `limit` most recent turns of `namespace`, oldest first.
    fn recent(&self, namespace: &str, limit: usize) -> Result<Vec<ChatTurn>>;
}
