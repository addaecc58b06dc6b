//! Correction oracle interface.
//!
//! An oracle takes a unit's text and streams back a candidate correction as
//! ordered fragments. The client concatenates fragments and does not look at
//! their content. A stream that ends without the oracle's end-of-response
//! marker is an error, never a short candidate.

pub mod ollama;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;

use crate::errors::OracleError;

pub use ollama::OllamaClient;

/// Ordered, finite stream of text fragments.
pub type FragmentStream = BoxStream<'static, Result<String, OracleError>>;

/// Anything that can turn text into corrected text.
#[async_trait]
pub trait CorrectionOracle: Send + Sync {
    /// Model identifier; part of every revision identity.
    fn model(&self) -> &str;

    /// Start a correction. The returned stream is consumed by the caller.
    async fn correct(&self, text: &str) -> Result<FragmentStream, OracleError>;
}

/// Run one correction to completion and return the concatenated candidate.
pub async fn collect_candidate(
    oracle: &dyn CorrectionOracle,
    text: &str,
) -> Result<String, OracleError> {
    let mut stream = oracle.correct(text).await?;
    let mut candidate = String::new();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        tracing::trace!(fragment = %fragment, "oracle fragment");
        candidate.push_str(&fragment);
    }
    Ok(candidate)
}
