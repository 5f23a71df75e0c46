//! Google Gemini `generateContent` client.

use std::time::Duration;

use async_trait::async_trait;
use relaybot_core::{
    config::BackendConfig, Candidate, CandidateContent, GenerationError, GenerationResult,
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::GenerativeBackend;

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Option<Vec<ResponseCandidate>>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Option<Vec<ResponsePart>>,
}

/// Non-text parts (inline data, function calls) carry no `text`.
#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub struct GeminiBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key: SecretString,
}

impl GeminiBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| GenerationError::Backend(error.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    async fn generate(&self, prompt: &str) -> Result<GenerationResult, GenerationError> {
        let request = GenerateContentRequest {
            contents: vec![RequestContent { role: "user", parts: vec![RequestPart { text: prompt }] }],
        };

        debug!(model = %self.model, prompt_chars = prompt.chars().count(), "calling gemini");
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|error| GenerationError::Backend(error.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|error| GenerationError::Backend(error.to_string()))?;

        if !status.is_success() {
            return Err(GenerationError::Backend(error_detail(status.as_u16(), &body)));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|error| GenerationError::MalformedResponse(error.to_string()))?;
        Ok(into_generation_result(parsed))
    }
}

fn error_detail(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) => format!(
            "{status} {}: {}",
            error.status.as_deref().unwrap_or("UNKNOWN"),
            error.message.as_deref().unwrap_or("no message")
        ),
        Err(_) => format!("{status}: {}", body.trim()),
    }
}

fn into_generation_result(response: GenerateContentResponse) -> GenerationResult {
    let candidates = response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .map(|candidate| {
            let parts = candidate
                .content
                .and_then(|content| content.parts)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|part| part.text)
                .collect();
            Candidate { content: CandidateContent { parts } }
        })
        .collect();

    GenerationResult { candidates }
}
