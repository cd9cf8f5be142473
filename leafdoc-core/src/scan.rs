//! Image scan orchestration: build, call with retry, decode.
//!
//! Every failure comes back as [`Error::AnalysisFailed`] wrapping the
//! internal cause. Callers show [`Error::user_message`], not the cause.

use std::path::Path;
use std::sync::Arc;

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::inference::{
    decode_analysis, mime_type_for_path, InferenceClient, MultimodalRequestBuilder,
};
use crate::retry::RetryExecutor;
use crate::types::AnalysisResult;

/// Turns an uploaded image into a validated [`AnalysisResult`].
pub struct ScanOrchestrator {
    client: Arc<dyn InferenceClient>,
    builder: MultimodalRequestBuilder,
    retry: RetryExecutor,
}

impl ScanOrchestrator {
    pub fn new(client: Arc<dyn InferenceClient>, retry: &RetryConfig) -> Self {
        Self::with_builder(client, retry, MultimodalRequestBuilder::default())
    }

    /// Use a custom instruction/schema pair
    pub fn with_builder(
        client: Arc<dyn InferenceClient>,
        retry: &RetryConfig,
        builder: MultimodalRequestBuilder,
    ) -> Self {
        Self {
            client,
            builder,
            retry: RetryExecutor::new(retry),
        }
    }

    /// Analyze raw image bytes.
    pub async fn scan(&self, image_bytes: &[u8], mime_type: Option<&str>) -> Result<AnalysisResult> {
        self.run(image_bytes, mime_type).await.map_err(|e| {
            tracing::error!(error = %e, "Scan failed");
            Error::AnalysisFailed(Box::new(e))
        })
    }

    /// Read an image file and analyze it.
    ///
    /// An unreadable file fails as an encoding problem before any request.
    pub async fn scan_file(&self, path: &Path) -> Result<AnalysisResult> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let cause = Error::Encoding(format!("cannot read {}: {}", path.display(), e));
                tracing::error!(error = %cause, "Scan failed");
                return Err(Error::AnalysisFailed(Box::new(cause)));
            }
        };
        self.scan(&bytes, mime_type_for_path(path)).await
    }

    async fn run(&self, image_bytes: &[u8], mime_type: Option<&str>) -> Result<AnalysisResult> {
        let request = self.builder.build(image_bytes, mime_type)?;
        tracing::info!(bytes = image_bytes.len(), "Requesting image analysis");

        let client = self.client.as_ref();
        let request = &request;
        let envelope = self.retry.execute(move || client.generate(request)).await?;
        let result = decode_analysis(&envelope)?;

        tracing::info!(
            health = result.health_percentage,
            disease = %result.predicted_disease,
            remedies = result.remedies.len(),
            "Analysis complete"
        );
        Ok(result)
    }
}
