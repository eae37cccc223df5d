use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::credentials::AccessTokenSource;
use super::{GenerativeModel, ModelError};

const TEMPERATURE: f32 = 0.2;
const MAX_OUTPUT_TOKENS: u32 = 8192;

/// Every safety category is relaxed to "block only high severity";
/// pathology reports trip the stricter defaults.
const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_HARASSMENT",
];
const SAFETY_THRESHOLD: &str = "BLOCK_ONLY_HIGH";

/// Answer shown when the service returns no candidates.
pub const NO_CANDIDATES_ANSWER: &str = "Resposta sem candidatos do Vertex AI.";

/// Answer shown when the first candidate has no content parts.
pub const EMPTY_CONTENT_ANSWER: &str = "IA não gerou conteúdo de resposta.";

// ═══════════════════════════════════════════════════════════
// Wire types
// ═══════════════════════════════════════════════════════════

/// Request body for `:generateContent`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

impl<'a> GenerateContentRequest<'a> {
    pub fn for_prompt(prompt: &'a str) -> Self {
        Self {
            contents: vec![Content {
                role: "user",
                parts: vec![TextPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: SAFETY_THRESHOLD,
                })
                .collect(),
        }
    }
}

/// Response body from `:generateContent` (only what we read).
#[derive(Debug, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GenerateContentResponse {
    /// First part of the first candidate, or a displayable placeholder.
    pub fn answer_text(&self) -> String {
        let Some(candidate) = self.candidates.first() else {
            return NO_CANDIDATES_ANSWER.to_string();
        };
        candidate
            .content
            .as_ref()
            .and_then(|content| content.parts.first())
            .map(|part| part.text.clone())
            .unwrap_or_else(|| EMPTY_CONTENT_ANSWER.to_string())
    }
}

/// Google API error envelope: `{"error": {"code", "message", "status"}}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Map a non-success response to a `ModelError`.
pub fn classify_error(status: u16, body: &str) -> ModelError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let exhausted = status == 429
        || envelope
            .as_ref()
            .is_some_and(|e| e.error.status == "RESOURCE_EXHAUSTED");

    if exhausted {
        let message = envelope
            .map(|e| e.error.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| body.to_string());
        return ModelError::QuotaExhausted(message);
    }

    ModelError::Service {
        status,
        body: body.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════
// Client
// ═══════════════════════════════════════════════════════════

/// Vertex AI `generateContent` client for a single publisher model.
pub struct VertexClient {
    endpoint: String,
    client: reqwest::blocking::Client,
    tokens: Box<dyn AccessTokenSource>,
    timeout_secs: u64,
}

impl VertexClient {
    pub fn new(
        project_id: &str,
        region: &str,
        model: &str,
        tokens: Box<dyn AccessTokenSource>,
        timeout_secs: u64,
    ) -> Result<Self, ModelError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ModelError::HttpClient(e.to_string()))?;

        Ok(Self {
            endpoint: generate_content_url(project_id, region, model),
            client,
            tokens,
            timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Regional `:generateContent` URL for a Google publisher model.
pub fn generate_content_url(project_id: &str, region: &str, model: &str) -> String {
    format!(
        "https://{region}-aiplatform.googleapis.com/v1/projects/{project_id}/locations/{region}/publishers/google/models/{model}:generateContent"
    )
}

impl GenerativeModel for VertexClient {
    fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let token = self.tokens.access_token()?;
        let body = GenerateContentRequest::for_prompt(prompt);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::HttpClient(format!(
                        "Request timed out after {}s",
                        self.timeout_secs
                    ))
                } else {
                    ModelError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(classify_error(status.as_u16(), &body));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .map_err(|e| ModelError::ResponseParsing(e.to_string()))?;

        Ok(parsed.answer_text())
    }
}

/// Stand-in used when no credentials were found at startup.
pub struct UnconfiguredModel;

impl GenerativeModel for UnconfiguredModel {
    fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
        Err(ModelError::NotConfigured)
    }
}

/// Mock model for testing: replays scripted results, then repeats the last one.
pub struct MockModel {
    script: Mutex<Vec<Result<String, ModelError>>>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl MockModel {
    pub fn new(response: &str) -> Self {
        Self::scripted(vec![Ok(response.to_string())])
    }

    /// Results are returned in order; the final entry repeats forever.
    pub fn scripted(script: Vec<Result<String, ModelError>>) -> Self {
        let mut script = script;
        script.reverse();
        Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|p| p.clone())
    }
}

impl GenerativeModel for MockModel {
    fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(prompt.to_string());
        }

        let mut script = self.script.lock().unwrap_or_else(|p| p.into_inner());
        match script.len() {
            0 => Err(ModelError::ResponseParsing("mock script is empty".into())),
            1 => script[0].clone(),
            _ => script.pop().unwrap_or(Err(ModelError::ResponseParsing(
                "mock script is empty".into(),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::credentials::StaticToken;

    #[test]
    fn request_carries_generation_and_safety_settings() {
        let body = serde_json::to_value(GenerateContentRequest::for_prompt("olá")).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "olá");
        assert!((body["generationConfig"]["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);

        let settings = body["safetySettings"].as_array().unwrap();
        assert_eq!(settings.len(), 4);
        assert!(settings.iter().all(|s| s["threshold"] == "BLOCK_ONLY_HIGH"));
        assert!(settings
            .iter()
            .any(|s| s["category"] == "HARM_CATEGORY_DANGEROUS_CONTENT"));
    }

    #[test]
    fn answer_is_first_part_of_first_candidate() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"| a | b |"},{"text":"extra"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(response.answer_text(), "| a | b |");
    }

    #[test]
    fn missing_candidates_yield_placeholder() {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert_eq!(response.answer_text(), NO_CANDIDATES_ANSWER);
    }

    #[test]
    fn filtered_candidate_yields_placeholder() {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        assert_eq!(response.answer_text(), EMPTY_CONTENT_ANSWER);
    }

    #[test]
    fn http_429_is_quota_exhaustion() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            classify_error(429, body),
            ModelError::QuotaExhausted("Quota exceeded".into())
        );
    }

    #[test]
    fn resource_exhausted_status_is_quota_exhaustion() {
        let body = r#"{"error":{"code":400,"message":"try later","status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(classify_error(400, body).is_quota_exhausted());
    }

    #[test]
    fn server_error_is_not_quota_exhaustion() {
        let err = classify_error(503, "upstream unavailable");
        assert_eq!(
            err,
            ModelError::Service {
                status: 503,
                body: "upstream unavailable".into()
            }
        );
        assert!(!err.is_quota_exhausted());
    }

    #[test]
    fn endpoint_is_regional() {
        let client = VertexClient::new(
            "lab-billing",
            "us-central1",
            "gemini-2.5-flash",
            Box::new(StaticToken("t".into())),
            30,
        )
        .unwrap();
        assert_eq!(
            client.endpoint(),
            "https://us-central1-aiplatform.googleapis.com/v1/projects/lab-billing/locations/us-central1/publishers/google/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn unconfigured_model_always_fails() {
        assert_eq!(
            UnconfiguredModel.generate("x"),
            Err(ModelError::NotConfigured)
        );
    }

    #[test]
    fn mock_model_replays_script() {
        let mock = MockModel::scripted(vec![
            Err(ModelError::QuotaExhausted("q".into())),
            Ok("done".into()),
        ]);
        assert!(mock.generate("a").is_err());
        assert_eq!(mock.generate("b").unwrap(), "done");
        assert_eq!(mock.generate("c").unwrap(), "done");
        assert_eq!(mock.calls(), 3);
        assert_eq!(mock.last_prompt().as_deref(), Some("c"));
    }
}
