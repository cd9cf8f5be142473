//! Chat orchestration
//!
//! A send is a two-phase write: the user turn is appended immediately, the
//! model turn after the inference call finishes. There is no transaction
//! across the two; if the process stops in between, the log keeps a user
//! turn without a reply.
//!
//! Inference failures never escape [`ChatOrchestrator::send`]. Once the
//! retry budget is spent the log gets [`CHAT_APOLOGY`] as the model turn.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::inference::{build_chat_request, decode_text, InferenceClient};
use crate::retry::RetryExecutor;
use crate::store::{ConversationLog, Subscription};
use crate::types::{ChatTurn, ConversationIdentity, NewTurn};

pub const CHAT_SYSTEM_INSTRUCTION: &str = "You are an experienced plant doctor and gardener. \
Answer questions about plant health, pests, diseases and care. Keep answers concise and \
actionable: short paragraphs or a few bullet points, with concrete steps the user can take today.";

/// Model turn written when the reply could not be produced.
pub const CHAT_APOLOGY: &str =
    "Sorry, I couldn't get an answer right now. Please try sending your message again in a moment.";

/// Per-orchestrator send state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    Sending,
    AwaitingReply,
}

/// What a completed send wrote to the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The model replied
    Replied {
        user_turn_id: String,
        reply_turn_id: String,
    },
    /// Inference failed; the reply turn is [`CHAT_APOLOGY`]
    Apologized {
        user_turn_id: String,
        reply_turn_id: String,
    },
}

impl SendOutcome {
    pub fn reply_turn_id(&self) -> &str {
        match self {
            SendOutcome::Replied { reply_turn_id, .. }
            | SendOutcome::Apologized { reply_turn_id, .. } => reply_turn_id,
        }
    }
}

/// Turns user utterances into persisted user and model turns.
///
/// One orchestrator serves one UI surface: at most one send is in flight
/// at a time, whichever identity it targets.
///
/// The orchestrator keeps a live subscription for every identity it has
/// sent to until [`ChatOrchestrator::release`] is called or it is dropped.
pub struct ChatOrchestrator {
    log: Arc<ConversationLog>,
    client: Arc<dyn InferenceClient>,
    retry: RetryExecutor,
    state: Mutex<ChatState>,
    views: Mutex<HashMap<ConversationIdentity, Subscription>>,
}

impl ChatOrchestrator {
    pub fn new(
        log: Arc<ConversationLog>,
        client: Arc<dyn InferenceClient>,
        retry: &RetryConfig,
    ) -> Self {
        Self {
            log,
            client,
            retry: RetryExecutor::new(retry),
            state: Mutex::new(ChatState::Idle),
            views: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self) -> ChatState {
        *lock(&self.state)
    }

    /// Send `utterance` and wait for the reply turn to be written.
    pub async fn send(
        &self,
        identity: &ConversationIdentity,
        utterance: &str,
    ) -> Result<SendOutcome> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Err(Error::InvalidInput("message is empty".to_string()));
        }
        let flight = SendFlight::begin(&self.state)?;

        let history = self.materialized_view(identity);
        let user_turn_id = self.log.append(identity, NewTurn::user(utterance))?;
        flight.advance(ChatState::AwaitingReply);

        tracing::info!(
            identity = %identity,
            history_turns = history.len(),
            "Requesting chat reply"
        );
        let request = build_chat_request(&history, utterance, CHAT_SYSTEM_INSTRUCTION);
        let client = self.client.as_ref();
        let request = &request;
        let reply = self
            .retry
            .execute(move || client.generate(request))
            .await
            .and_then(|envelope| decode_text(&envelope));

        let (text, replied) = match reply {
            Ok(text) => (text, true),
            Err(e) => {
                tracing::error!(identity = %identity, error = %e, "Chat reply failed");
                (CHAT_APOLOGY.to_string(), false)
            }
        };
        let reply_turn_id = self.log.append(identity, NewTurn::model(text))?;

        Ok(if replied {
            SendOutcome::Replied {
                user_turn_id,
                reply_turn_id,
            }
        } else {
            SendOutcome::Apologized {
                user_turn_id,
                reply_turn_id,
            }
        })
    }

    /// Drop this orchestrator's view of `identity`.
    pub fn release(&self, identity: &ConversationIdentity) {
        if let Some(mut view) = lock(&self.views).remove(identity) {
            view.unsubscribe();
        }
    }

    /// Last snapshot delivered to this orchestrator's subscription.
    fn materialized_view(&self, identity: &ConversationIdentity) -> Vec<ChatTurn> {
        let mut views = lock(&self.views);
        let view = views
            .entry(identity.clone())
            .or_insert_with(|| self.log.subscribe(identity));
        view.turns().iter().filter(|t| t.has_text()).cloned().collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds the single-flight slot; returns the state to `Idle` on drop.
struct SendFlight<'a> {
    state: &'a Mutex<ChatState>,
}

impl<'a> SendFlight<'a> {
    fn begin(state: &'a Mutex<ChatState>) -> Result<Self> {
        let mut current = lock(state);
        if *current != ChatState::Idle {
            return Err(Error::Busy);
        }
        *current = ChatState::Sending;
        Ok(Self { state })
    }

    fn advance(&self, next: ChatState) {
        *lock(self.state) = next;
    }
}

impl Drop for SendFlight<'_> {
    fn drop(&mut self) {
        *lock(self.state) = ChatState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::mock::ScriptedClient;
    use crate::inference::{GenerateRequest, GenerateResponse};
    use crate::store::{DocumentStore, SqliteStore};
    use crate::types::Role;
    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    fn identity() -> ConversationIdentity {
        ConversationIdentity::new("leafdoc", "gardener").unwrap()
    }

    fn log() -> Arc<ConversationLog> {
        Arc::new(ConversationLog::new(
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            50,
        ))
    }

    struct GatedClient {
        gate: Semaphore,
    }

    #[async_trait]
    impl InferenceClient for GatedClient {
        async fn generate(&self, _request: &GenerateRequest) -> Result<GenerateResponse> {
            let _permit = self.gate.acquire().await.map_err(|e| Error::Transport {
                status: None,
                message: e.to_string(),
            })?;
            Ok(GenerateResponse::with_text("Use a well-draining mix."))
        }
    }

    struct ReadOnlyStore;

    impl DocumentStore for ReadOnlyStore {
        fn append(&self, _namespace: &str, _turn: &NewTurn) -> Result<ChatTurn> {
            Err(Error::StoreWrite("permission denied".to_string()))
        }

        fn recent(&self, _namespace: &str, _limit: usize) -> Result<Vec<ChatTurn>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_send_appends_user_then_model_turn() {
        let log = log();
        let client = Arc::new(ScriptedClient::replying(&["Water at the base, mornings only."]));
        let chat = ChatOrchestrator::new(log.clone(), client.clone(), &RetryConfig::default());
        let id = identity();

        let outcome = chat.send(&id, "  Why are my basil leaves spotted?  ").await.unwrap();
        assert!(matches!(outcome, SendOutcome::Replied { .. }));

        let turns = log.window(&id).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].text, "Why are my basil leaves spotted?");
        assert_eq!(turns[1].role, Role::Model);
        assert_eq!(turns[1].text, "Water at the base, mornings only.");
        assert_eq!(turns[1].id, outcome.reply_turn_id());
        assert_eq!(chat.state(), ChatState::Idle);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inference_failure_becomes_apology_turn() {
        let log = log();
        let client = Arc::new(ScriptedClient::failing());
        let chat = ChatOrchestrator::new(log.clone(), client.clone(), &RetryConfig::default());
        let id = identity();

        let outcome = chat.send(&id, "Is this mildew?").await.unwrap();

        assert!(matches!(outcome, SendOutcome::Apologized { .. }));
        assert_eq!(client.calls(), 5);
        let turns = log.window(&id).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text, "Is this mildew?");
        assert_eq!(turns[1].role, Role::Model);
        assert_eq!(turns[1].text, CHAT_APOLOGY);
        assert_eq!(chat.state(), ChatState::Idle);
    }

    #[tokio::test]
    async fn test_empty_reply_is_not_retried_and_apologizes() {
        let log = log();
        let client = Arc::new(ScriptedClient::default());
        client.push(Ok(GenerateResponse::default()));
        let chat = ChatOrchestrator::new(log.clone(), client.clone(), &RetryConfig::default());
        let id = identity();

        let outcome = chat.send(&id, "hello?").await.unwrap();
        assert!(matches!(outcome, SendOutcome::Apologized { .. }));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_context_comes_from_materialized_view() {
        let log = log();
        let client = Arc::new(ScriptedClient::replying(&["first reply", "second reply"]));
        let chat = ChatOrchestrator::new(log.clone(), client.clone(), &RetryConfig::default());
        let id = identity();

        chat.send(&id, "first question").await.unwrap();
        log.append(&id, NewTurn::model("")).unwrap();
        chat.send(&id, "second question").await.unwrap();

        let requests = client.requests();
        assert_eq!(requests[0].contents.len(), 1);

        let texts: Vec<_> = requests[1]
            .contents
            .iter()
            .map(|c| c.parts[0].text.clone().unwrap())
            .collect();
        assert_eq!(
            texts,
            vec!["first question", "first reply", "second question"]
        );
        let system = requests[1].system_instruction.as_ref().unwrap();
        assert_eq!(system.parts[0].text.as_deref(), Some(CHAT_SYSTEM_INSTRUCTION));
    }

    #[tokio::test]
    async fn test_blank_utterance_rejected_without_writes() {
        let log = log();
        let client = Arc::new(ScriptedClient::replying(&["unused"]));
        let chat = ChatOrchestrator::new(log.clone(), client.clone(), &RetryConfig::default());
        let id = identity();

        let err = chat.send(&id, "   \n").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(log.window(&id).unwrap().is_empty());
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_send_is_rejected() {
        let log = log();
        let client = Arc::new(GatedClient {
            gate: Semaphore::new(0),
        });
        let chat = Arc::new(ChatOrchestrator::new(
            log.clone(),
            client.clone(),
            &RetryConfig::default(),
        ));
        let id = identity();

        let first = {
            let chat = chat.clone();
            let id = id.clone();
            tokio::spawn(async move { chat.send(&id, "repot now?").await })
        };
        while chat.state() != ChatState::AwaitingReply {
            tokio::task::yield_now().await;
        }

        let other = ConversationIdentity::new("leafdoc", "someone-else").unwrap();
        assert!(matches!(chat.send(&id, "hello?").await, Err(Error::Busy)));
        assert!(matches!(chat.send(&other, "hello?").await, Err(Error::Busy)));

        client.gate.add_permits(1);
        let outcome = first.await.unwrap().unwrap();
        assert!(matches!(outcome, SendOutcome::Replied { .. }));
        assert_eq!(chat.state(), ChatState::Idle);
        assert_eq!(log.window(&id).unwrap().len(), 2);
        assert!(log.window(&other).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_user_turn_write_failure_propagates() {
        let log = Arc::new(ConversationLog::new(Arc::new(ReadOnlyStore), 50));
        let client = Arc::new(ScriptedClient::replying(&["unused"]));
        let chat = ChatOrchestrator::new(log, client.clone(), &RetryConfig::default());

        let err = chat.send(&identity(), "hello").await.unwrap_err();
        assert!(matches!(err, Error::StoreWrite(_)));
        assert_eq!(client.calls(), 0);
        assert_eq!(chat.state(), ChatState::Idle);
    }

    #[tokio::test]
    async fn test_release_drops_view() {
        let log = log();
        let client = Arc::new(ScriptedClient::replying(&["ok"]));
        let chat = ChatOrchestrator::new(log.clone(), client, &RetryConfig::default());
        let id = identity();

        chat.send(&id, "hi").await.unwrap();
        chat.release(&id);
        chat.release(&id);
        assert!(lock(&chat.views).is_empty());
    }
}
