pub mod ollama;

// Re-export common types
pub use ollama::OllamaClient;

use anyhow::Result;
use async_trait::async_trait;

/// A text-in, text-out model backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Submit one prompt and return the raw completion text
    async fn submit(&self, prompt: &str) -> Result<String>;
}
