//! Gemini `generateContent` client for text replies.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Produces a reply for a piece of user text.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn generate(&self, input_text: &str) -> Result<String, CompletionError>;
}

#[derive(Debug)]
pub enum CompletionError {
    /// Nothing to send.
    EmptyInput,
    /// The request never got a response.
    Http(String),
    /// The endpoint answered with a non-200 status.
    Status { status: u16, body: String },
    /// The 200 body was not the expected JSON.
    Malformed { body: String, reason: String },
    /// The 200 body carried no generated text.
    Empty { body: String },
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInput => write!(f, "empty input text"),
            Self::Http(e) => write!(f, "HTTP error: {e}"),
            Self::Status { status, body } => write!(f, "API error {status}: {body}"),
            Self::Malformed { body, reason } => {
                write!(f, "failed to parse response ({reason}): {body}")
            }
            Self::Empty { body } => write!(f, "no text in response: {body}"),
        }
    }
}

impl std::error::Error for CompletionError {}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}

pub struct GeminiClient {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: String, api_base: &str, model: &str) -> Self {
        Self::with_client(api_key, api_base, model, reqwest::Client::new())
    }

    pub fn with_client(api_key: String, api_base: &str, model: &str, client: reqwest::Client) -> Self {
        let endpoint = format!(
            "{}/models/{}:generateContent",
            api_base.trim_end_matches('/'),
            model
        );
        Self { api_key, endpoint, client }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Completion for GeminiClient {
    async fn generate(&self, input_text: &str) -> Result<String, CompletionError> {
        if input_text.trim().is_empty() {
            return Err(CompletionError::EmptyInput);
        }

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: input_text }],
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| CompletionError::Http(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::Http(format!("failed to read response: {}", e.without_url())))?;

        debug!("Gemini response status: {status}");

        if status != reqwest::StatusCode::OK {
            return Err(CompletionError::Status { status: status.as_u16(), body });
        }

        let text = extract_text(&body)?;
        info!("🤖 Generated reply ({} chars)", text.chars().count());
        Ok(text)
    }
}

/// Pull the generated text out of a `generateContent` response body.
fn extract_text(body: &str) -> Result<String, CompletionError> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| CompletionError::Malformed {
            body: body.to_string(),
            reason: e.to_string(),
        })?;

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect::<String>())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(CompletionError::Empty { body: body.to_string() });
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::tests::serve_once;

    fn client(base: &str) -> GeminiClient {
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        GeminiClient::with_client("test-key".to_string(), base, "gemini-1.5-flash", http)
    }

    #[test]
    fn test_endpoint_shape() {
        let c = GeminiClient::new("k".to_string(), "https://example.com/v1beta/", "gemini-1.5-flash");
        assert_eq!(c.endpoint(), "https://example.com/v1beta/models/gemini-1.5-flash:generateContent");
    }

    #[test]
    fn test_request_body_shape() {
        let request = GenerateRequest {
            contents: vec![Content { parts: vec![Part { text: "Hola" }] }],
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"contents":[{"parts":[{"text":"Hola"}]}]}"#
        );
    }

    #[test]
    fn test_extract_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Hola "},{"text":"mundo"}],"role":"model"},"finishReason":"STOP"}]}"#;
        assert_eq!(extract_text(body).unwrap(), "Hola mundo");
    }

    #[test]
    fn test_extract_no_candidates() {
        let body = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        assert!(matches!(extract_text(body), Err(CompletionError::Empty { .. })));
    }

    #[test]
    fn test_extract_garbage() {
        let err = extract_text("<html>oops</html>").unwrap_err();
        match err {
            CompletionError::Malformed { body, .. } => assert_eq!(body, "<html>oops</html>"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_generate_success() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"candidates":[{"content":{"parts":[{"text":"Respuesta generada"}]}}]}"#,
        )
        .await;

        let reply = client(&base).generate("Hola bot").await.unwrap();
        assert_eq!(reply, "Respuesta generada");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1beta/models/gemini-1.5-flash:generateContent?key=test-key "));
        assert!(request.ends_with(r#"{"contents":[{"parts":[{"text":"Hola bot"}]}]}"#));
    }

    #[tokio::test]
    async fn test_generate_non_200() {
        let (base, server) = serve_once(
            "500 Internal Server Error",
            r#"{"error":{"code":500,"message":"boom"}}"#,
        )
        .await;

        let err = client(&base).generate("Hola").await.unwrap_err();
        match err {
            CompletionError::Status { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_generate_empty_input_skips_network() {
        let c = client("http://127.0.0.1:9");
        assert!(matches!(c.generate("  ").await, Err(CompletionError::EmptyInput)));
    }
}
