//! # leafdoc-core
//!
//! Client-side core for leafdoc, a plant-health assistant backed by a hosted
//! generative model.
//!
//! This library provides:
//! - A resilient structured-inference client (request building, retry with
//!   backoff, schema-checked decoding)
//! - An ordered conversation log with live subscriptions
//! - Scan and chat orchestrators composing the two
//! - Configuration management and logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use leafdoc_core::{Config, HttpInferenceClient, ScanOrchestrator};
//!
//! # async fn run() -> leafdoc_core::Result<()> {
//! let config = Config::load()?;
//! let client = Arc::new(HttpInferenceClient::new(&config.inference)?);
//! let scanner = ScanOrchestrator::new(client, &config.retry);
//!
//! let result = scanner.scan_file(std::path::Path::new("leaf.jpg")).await?;
//! println!("{}: {}%", result.predicted_disease, result.health_percentage);
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use chat::{ChatOrchestrator, ChatState, SendOutcome, CHAT_APOLOGY};
pub use config::Config;
pub use error::{Error, Result};
pub use inference::{HttpInferenceClient, InferenceClient};
pub use retry::RetryExecutor;
pub use scan::ScanOrchestrator;
pub use store::{ConversationLog, DocumentStore, LogUpdate, SqliteStore, Subscription};
pub use types::*;

// Public modules
pub mod chat;
pub mod config;
pub mod error;
pub mod inference;
pub mod logging;
pub mod retry;
pub mod scan;
pub mod store;
pub mod types;
