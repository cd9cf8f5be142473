//! Scripted client for orchestrator tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::wire::{GenerateRequest, GenerateResponse};
use super::InferenceClient;

/// Plays back queued results, then fails with 503 forever.
#[derive(Default)]
pub(crate) struct ScriptedClient {
    script: Mutex<VecDeque<Result<GenerateResponse>>>,
    requests: Mutex<Vec<GenerateRequest>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    pub(crate) fn failing() -> Self {
        Self::default()
    }

    pub(crate) fn replying(texts: &[&str]) -> Self {
        let client = Self::default();
        for text in texts {
            client.push(Ok(GenerateResponse::with_text(*text)));
        }
        client
    }

    pub(crate) fn push(&self, result: Result<GenerateResponse>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceClient for ScriptedClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(Error::Transport {
                    status: Some(503),
                    message: "service unavailable".to_string(),
                })
            })
    }
}
