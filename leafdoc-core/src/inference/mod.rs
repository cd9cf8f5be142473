//! Structured-inference client
//!
//! Two call shapes share one transport:
//! - single-shot image analysis constrained by a response schema
//! - multi-turn chat with a fixed system instruction
//!
//! The network call sits behind [`InferenceClient`] so orchestrators can be
//! driven by a scripted client in tests.

mod client;
pub mod decode;
#[cfg(test)]
pub(crate) mod mock;
pub mod request;
pub mod wire;

use async_trait::async_trait;

use crate::error::Result;

pub use client::HttpInferenceClient;
pub use decode::{decode_analysis, decode_text, extract_text};
pub use request::{
    analysis_schema, build_analysis_request, build_chat_request, mime_type_for_path,
    MultimodalRequestBuilder, ANALYSIS_INSTRUCTION, DEFAULT_MIME_TYPE,
};
pub use wire::{GenerateRequest, GenerateResponse};

/// One round trip to the inference endpoint.
///
/// Implementations report network failures and non-2xx statuses as
/// [`crate::Error::Transport`]; they do not retry.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse>;
}
