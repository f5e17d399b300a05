//! Vertex AI provider implementation.
//!
//! Uses the `generateContent` REST endpoint directly:
//!
//! `POST {base}/v1/projects/{project}/locations/{location}/publishers/google/models/{model}:generateContent`
//!
//! Features:
//! - Bearer token authentication
//! - Role-tagged `contents` with `user` / `model` parts
//! - `systemInstruction` as a top-level field
//! - `generationConfig` (temperature, topP, maxOutputTokens)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use kokua_core::error::ModelError;
use kokua_core::model::GenerateRequest;
use kokua_core::session::{Role, Turn};

const DEFAULT_BASE_URL_PREFIX: &str = "https://{location}-aiplatform.googleapis.com";

/// Vertex AI `generateContent` provider.
pub struct VertexProvider {
    name: String,
    base_url: String,
    project_id: String,
    location: String,
    model: String,
    access_token: String,
    client: reqwest::Client,
}

impl VertexProvider {
    /// Create a new Vertex provider.
    pub fn new(
        project_id: impl Into<String>,
        location: impl Into<String>,
        model: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        let location = location.into();
        let base_url = DEFAULT_BASE_URL_PREFIX.replace("{location}", &location);

        Self {
            name: "vertex".into(),
            base_url,
            project_id: project_id.into(),
            location,
            model: model.into(),
            access_token: access_token.into(),
            client,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            self.base_url, self.project_id, self.location, self.model
        )
    }

    /// Convert turns to the Vertex `contents` format.
    fn to_api_contents(turns: &[Turn]) -> Vec<ApiContent> {
        turns
            .iter()
            .map(|turn| ApiContent {
                role: match turn.role {
                    Role::User => "user".into(),
                    Role::Model => "model".into(),
                },
                parts: vec![ApiPart {
                    text: turn.text.clone(),
                }],
            })
            .collect()
    }

    /// Pull the generated text out of a response payload.
    fn extract_text(response: ApiResponse) -> Result<String, ModelError> {
        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::MalformedResponse("no candidates in response".into()))?;

        let text: String = candidate
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(ModelError::MalformedResponse(
                "candidate contained no text parts".into(),
            ));
        }

        Ok(text)
    }
}

#[async_trait]
impl kokua_core::ModelProvider for VertexProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String, ModelError> {
        let url = self.endpoint();

        let mut body = serde_json::json!({
            "contents": Self::to_api_contents(&request.turns),
            "generationConfig": {
                "temperature": request.config.temperature,
                "topP": request.config.top_p,
                "maxOutputTokens": request.config.max_output_tokens,
            },
        });

        if let Some(ref system) = request.system {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{ "text": system }]
            });
        }

        debug!(provider = "vertex", model = %self.model, turns = request.turns.len(), "Sending generateContent request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout(e.to_string())
                } else {
                    ModelError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ModelError::RateLimited { retry_after_secs: 5 });
        }
        if status == 401 || status == 403 {
            return Err(ModelError::AuthenticationFailed(
                "Invalid or expired Vertex AI credentials".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Vertex AI API error");
            return Err(ModelError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: ApiResponse = response.json().await.map_err(|e| {
            ModelError::MalformedResponse(format!("Failed to parse Vertex response: {e}"))
        })?;

        Self::extract_text(api_resp)
    }
}

// --- Wire types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiContent {
    role: String,
    parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
}

#[derive(Debug, Deserialize)]
struct ApiCandidate {
    content: ApiCandidateContent,
}

#[derive(Debug, Deserialize)]
struct ApiCandidateContent {
    #[serde(default)]
    parts: Vec<ApiPart>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_includes_project_location_model() {
        let provider = VertexProvider::new("demo-project", "us-central1", "gemini-pro", "token");
        let url = provider.endpoint();
        assert!(url.contains("/projects/demo-project/"));
        assert!(url.contains("/locations/us-central1/"));
        assert!(url.ends_with("models/gemini-pro:generateContent"));
        assert!(url.starts_with("https://us-central1-aiplatform.googleapis.com"));
    }

    #[test]
    fn base_url_override_strips_trailing_slash() {
        let provider = VertexProvider::new("p", "l", "m", "t").with_base_url("http://localhost:9090/");
        assert!(provider.endpoint().starts_with("http://localhost:9090/v1/"));
    }

    #[test]
    fn turns_map_to_api_roles() {
        let turns = vec![Turn::model("Aloha!"), Turn::user("What about rainfall?")];
        let contents = VertexProvider::to_api_contents(&turns);
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].role, "model");
        assert_eq!(contents[1].role, "user");
        assert_eq!(contents[1].parts[0].text, "What about rainfall?");
    }

    #[test]
    fn extract_text_joins_parts() {
        let response: ApiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{ "text": "Sea levels " }, { "text": "are rising." }]
                }
            }]
        }))
        .unwrap();

        let text = VertexProvider::extract_text(response).unwrap();
        assert_eq!(text, "Sea levels are rising.");
    }

    #[test]
    fn empty_candidates_is_malformed() {
        let response: ApiResponse = serde_json::from_value(serde_json::json!({
            "candidates": []
        }))
        .unwrap();

        let result = VertexProvider::extract_text(response);
        assert!(matches!(result, Err(ModelError::MalformedResponse(_))));
    }

    #[test]
    fn empty_parts_is_malformed() {
        let response: ApiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{ "content": { "role": "model", "parts": [] } }]
        }))
        .unwrap();

        let result = VertexProvider::extract_text(response);
        assert!(matches!(result, Err(ModelError::MalformedResponse(_))));
    }
}
