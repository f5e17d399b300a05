//! ModelProvider trait — the abstraction over the remote generative model.
//!
//! A ModelProvider knows how to send a role-tagged list of prior turns plus
//! generation parameters to a hosted model and get generated text back.
//!
//! Implementations: Vertex AI `generateContent`, mocks in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::session::Turn;

/// Fixed generation parameters sent with every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling cutoff
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Output token ceiling
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_top_p() -> f32 {
    0.95
}
fn default_max_output_tokens() -> u32 {
    2048
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

/// A single "generate content" request: system instruction, bounded context
/// window, and generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Static system instruction (identity, scope rules)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// The bounded context window, oldest first, ending with the new user turn
    pub turns: Vec<Turn>,

    /// Generation parameters
    #[serde(default)]
    pub config: GenerationConfig,
}

/// The core ModelProvider trait.
///
/// The response pipeline calls `generate()` without knowing which backend is
/// configured. `smoke_test()` is the one-shot connectivity probe used only
/// during initialization.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// A human-readable name for this provider (e.g., "vertex").
    fn name(&self) -> &str;

    /// Send a request and get generated text back.
    async fn generate(&self, request: GenerateRequest) -> std::result::Result<String, ModelError>;

    /// One-shot connectivity check of the same shape as `generate`.
    ///
    /// Default implementation sends a minimal request and discards the text.
    async fn smoke_test(&self) -> std::result::Result<(), ModelError> {
        let request = GenerateRequest {
            system: None,
            turns: vec![Turn::user("ping")],
            config: GenerationConfig {
                max_output_tokens: 8,
                ..GenerationConfig::default()
            },
        };
        self.generate(request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_config_defaults() {
        let config = GenerationConfig::default();
        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
        assert!((config.top_p - 0.95).abs() < f32::EPSILON);
        assert_eq!(config.max_output_tokens, 2048);
    }

    #[test]
    fn generate_request_serialization() {
        let request = GenerateRequest {
            system: Some("You are a concierge".into()),
            turns: vec![Turn::user("hello")],
            config: GenerationConfig::default(),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("concierge"));
        assert!(json.contains("hello"));
    }
}
