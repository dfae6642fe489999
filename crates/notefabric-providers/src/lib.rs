//! # NoteFabric Providers
//!
//! Text-generation backends behind the [`TextGenerator`] seam.
//!
//! Any OpenAI-compatible chat API is served by [`OpenAiCompatibleGenerator`];
//! [`OfflineGenerator`] answers deterministically without network access.

pub mod offline;
pub mod openai_compatible;

use std::sync::Arc;

use notefabric_core::config::LlmConfig;
use notefabric_core::error::{FabricError, Result};
use notefabric_core::traits::TextGenerator;

pub use offline::OfflineGenerator;
pub use openai_compatible::OpenAiCompatibleGenerator;

/// Create a generator from configuration.
///
/// `provider` is `offline`, `openai`, or `custom:<base-url>`.
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn TextGenerator>> {
    match config.provider.as_str() {
        "offline" | "" => Ok(Arc::new(OfflineGenerator::new())),
        "openai" => Ok(Arc::new(OpenAiCompatibleGenerator::openai(config)?)),
        other if other.starts_with("custom:") => {
            Ok(Arc::new(OpenAiCompatibleGenerator::custom(other, config)?))
        }
        other => Err(FabricError::Config(format!("Unknown LLM provider: {other}"))),
    }
}

/// All provider names accepted by [`create_generator`].
pub fn available_providers() -> Vec<&'static str> {
    vec!["offline", "openai", "custom"]
}
