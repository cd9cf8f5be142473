//! Core domain types for leafdoc
//!
//! | Term | Definition |
//! |------|------------|
//! | **Scan** | One image submitted for structured plant-health analysis |
//! | **Turn** | One message in a conversation, authored by the user or the model |
//! | **Window** | The most recent turns of a conversation, oldest first |
//! | **Identity** | The key that scopes one conversation log |

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Analysis
// ============================================

/// Sentinel disease name meaning "no disease found".
pub const HEALTHY: &str = "Healthy";

/// Structured outcome of a single scan. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Overall health, 0-100 as advised to the model (not clamped)
    pub health_percentage: i64,
    /// Short disease name, or "Healthy"
    pub predicted_disease: String,
    /// Status summary first, then suggested treatments
    #[serde(rename = "home_remedies")]
    pub remedies: Vec<String>,
}

impl AnalysisResult {
    /// Whether the model reported no disease.
    pub fn is_healthy(&self) -> bool {
        self.predicted_disease.trim().eq_ignore_ascii_case(HEALTHY)
    }

    /// The leading status summary, if the model supplied one.
    pub fn summary(&self) -> Option<&str> {
        self.remedies.first().map(String::as_str)
    }
}

// ============================================
// Conversation
// ============================================

/// Who authored a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "model" => Ok(Role::Model),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// A persisted conversation turn.
///
/// Turns are immutable once written; `id` and `created_at` are assigned by
/// the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Store-assigned identifier, unique within a log
    pub id: String,
    pub role: Role,
    pub text: String,
    /// Store-assigned write time; the sole sort key
    pub created_at: DateTime<Utc>,
    /// Store insertion sequence, breaks `created_at` ties
    #[serde(skip)]
    pub seq: i64,
}

impl ChatTurn {
    /// Turns without visible text are never delivered to subscribers.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Caller-supplied part of a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTurn {
    pub role: Role,
    pub text: String,
}

impl NewTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Stable key scoping one conversation log.
///
/// Derived from an application namespace and a user/session id supplied by
/// the identity provider. The core never generates one itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationIdentity {
    key: String,
}

impl ConversationIdentity {
    pub fn new(namespace: &str, user_id: &str) -> Result<Self> {
        let namespace = namespace.trim();
        let user_id = user_id.trim();
        if namespace.is_empty() || user_id.is_empty() {
            return Err(Error::InvalidInput(
                "conversation identity needs a namespace and a user id".to_string(),
            ));
        }
        if user_id.contains('/') {
            return Err(Error::InvalidInput(format!(
                "user id must not contain '/': {}",
                user_id
            )));
        }
        Ok(Self {
            key: format!("{}/users/{}/messages", namespace, user_id),
        })
    }

    /// Namespace path used by the document store
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Display for ConversationIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_sentinel_is_case_insensitive() {
        let mut result = AnalysisResult {
            health_percentage: 95,
            predicted_disease: "healthy".to_string(),
            remedies: vec!["Looks great".to_string()],
        };
        assert!(result.is_healthy());
        assert_eq!(result.summary(), Some("Looks great"));

        result.predicted_disease = "Leaf Blight".to_string();
        assert!(!result.is_healthy());
    }

    #[test]
    fn test_analysis_result_wire_names() {
        let result = AnalysisResult {
            health_percentage: 40,
            predicted_disease: "Rust".to_string(),
            remedies: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["health_percentage"], 40);
        assert_eq!(value["home_remedies"][2], "c");
    }

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [Role::User, Role::Model] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("assistant".parse::<Role>().is_err());
    }

    #[test]
    fn test_identity_key() {
        let identity = ConversationIdentity::new("leafdoc", "abc123").unwrap();
        assert_eq!(identity.key(), "leafdoc/users/abc123/messages");
        assert!(ConversationIdentity::new("leafdoc", " ").is_err());
        assert!(ConversationIdentity::new("", "abc").is_err());
        assert!(ConversationIdentity::new("leafdoc", "a/b").is_err());
    }
}
