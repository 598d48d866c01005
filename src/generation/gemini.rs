//! Gemini REST client.
//!
//! Talks to the `generateContent` and `streamGenerateContent` endpoints of the
//! Generative Language API. Streaming uses server-sent events (`alt=sse`).

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::{ChatRole, GenerationRequest, LlmError, TextGenerator, TextStream};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini API client.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, GEMINI_API_URL)
    }

    pub fn with_base_url(
        client: reqwest::Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: crate::providers::normalize_base(base_url),
        }
    }

    /// Parse Retry-After header value into Duration.
    fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok().map(Duration::from_secs))
    }

    async fn send(
        &self,
        model: &str,
        method: &str,
        request: &GenerationRequest,
        sse: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/v1beta/models/{}:{}", self.base_url, model, method);
        let mut query = vec![("key", self.api_key.as_str())];
        if sse {
            query.push(("alt", "sse"));
        }

        let response = self
            .client
            .post(&url)
            .query(&query)
            .json(&GeminiRequest::from(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = Self::parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), &body, retry_after));
        }
        Ok(response)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, model: &str, request: &GenerationRequest) -> Result<String, LlmError> {
        let response = self.send(model, "generateContent", request, false).await?;
        let body = response.text().await?;

        let parsed: GeminiResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::Malformed(format!("Failed to parse response: {}, body: {}", e, body))
        })?;

        let text = parsed.text();
        if text.is_empty() {
            let reason = parsed
                .candidates
                .first()
                .and_then(|c| c.finish_reason.clone())
                .unwrap_or_else(|| "no candidates".to_string());
            return Err(LlmError::Empty(format!(
                "Model {} returned no text ({})",
                model, reason
            )));
        }

        tracing::debug!(model = %model, chars = text.len(), "Gemini generation complete");
        Ok(text)
    }

    async fn stream(
        &self,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<TextStream, LlmError> {
        let response = self
            .send(model, "streamGenerateContent", request, true)
            .await?;
        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut lines = SseLineBuffer::default();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(LlmError::from(e));
                        return;
                    }
                };

                for line in lines.push(&chunk) {
                    match line.map(|l| parse_sse_line(&l)) {
                        Ok(Some(Ok(text))) if !text.is_empty() => yield Ok(text),
                        Ok(Some(Err(e))) | Err(e) => yield Err(e),
                        _ => {}
                    }
                }
            }

            if let Some(Ok(rest)) = lines.finish() {
                if let Some(Ok(text)) = parse_sse_line(&rest) {
                    if !text.is_empty() {
                        yield Ok(text);
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Byte buffer that releases only complete lines, so a multi-byte character
/// split across network chunks is decoded once both halves have arrived.
#[derive(Debug, Default)]
struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<Result<String, LlmError>> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            lines.push(decode_line(line));
        }
        lines
    }

    /// Trailing bytes after the last newline, if any.
    fn finish(self) -> Option<Result<String, LlmError>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(decode_line(self.pending))
        }
    }
}

fn decode_line(bytes: Vec<u8>) -> Result<String, LlmError> {
    String::from_utf8(bytes)
        .map_err(|e| LlmError::Malformed(format!("Stream line is not UTF-8: {}", e)))
}

/// Decode one SSE line. `None` for blank lines, comments and non-data fields.
fn parse_sse_line(line: &str) -> Option<Result<String, LlmError>> {
    let payload = line.trim().strip_prefix("data:")?.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    Some(
        serde_json::from_str::<GeminiResponse>(payload)
            .map(|r| r.text())
            .map_err(|e| LlmError::Malformed(format!("Bad stream chunk: {}", e))),
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

impl GeminiContent {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![GeminiPart {
                text: text.to_string(),
            }],
        }
    }
}

impl From<&GenerationRequest> for GeminiRequest {
    fn from(request: &GenerationRequest) -> Self {
        let contents = request
            .messages
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    ChatRole::User => "user",
                    ChatRole::Model => "model",
                };
                GeminiContent::text(Some(role), &turn.text)
            })
            .collect();

        Self {
            system_instruction: request
                .system
                .as_deref()
                .map(|s| GeminiContent::text(None, s)),
            contents,
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
                response_mime_type: request.json.then_some("application/json"),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: GeminiContent,
    finish_reason: Option<String>,
}

impl GeminiResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::generation::ChatTurn;

    fn client(server: &MockServer) -> GeminiClient {
        GeminiClient::with_base_url(reqwest::Client::new(), "test-key", server.uri())
    }

    #[tokio::test]
    async fn test_generate_joins_candidate_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(json!({
                "systemInstruction": {"parts": [{"text": "be brief"}]},
                "contents": [
                    {"role": "user", "parts": [{"text": "hi"}]},
                    {"role": "model", "parts": [{"text": "hello"}]},
                    {"role": "user", "parts": [{"text": "plan my trip"}]}
                ],
                "generationConfig": {"responseMimeType": "application/json"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "Sure, "}, {"text": "let's go."}]},
                    "finishReason": "STOP"
                }]
            })))
            .mount(&server)
            .await;

        let request = GenerationRequest::prompt("plan my trip")
            .with_system("be brief")
            .with_history(vec![ChatTurn::user("hi"), ChatTurn::model("hello")])
            .json();
        let text = client(&server)
            .generate("gemini-2.0-flash", &request)
            .await
            .unwrap();
        assert_eq!(text, "Sure, let's go.");
    }

    #[tokio::test]
    async fn test_status_maps_to_error_kind() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "12")
                    .set_body_string("quota"),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .generate("gemini-1.5-flash", &GenerationRequest::prompt("x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LlmError::RateLimited { retry_after: Some(d), .. } if d == Duration::from_secs(12)
        ));
    }

    #[tokio::test]
    async fn test_blocked_response_is_empty_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"finishReason": "SAFETY"}]
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .generate("gemini-1.5-flash", &GenerationRequest::prompt("x"))
            .await
            .unwrap_err();
        assert!(matches!(&err, LlmError::Empty(message) if message.contains("SAFETY")));
    }

    #[tokio::test]
    async fn test_stream_yields_sse_chunks() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}]},\"finishReason\":\"STOP\"}]}\n\n"
        );
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let stream = client(&server)
            .stream("gemini-2.0-flash", &GenerationRequest::prompt("x"))
            .await
            .unwrap();
        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec!["Hel", "lo"]);
    }

    #[test]
    fn test_line_buffer_joins_split_characters() {
        let line = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"café\"}]}}]}\n";
        let bytes = line.as_bytes();
        // Split between the two bytes of `é`.
        let split = line.find('é').unwrap() + 1;

        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(&bytes[..split]).is_empty());
        let lines = buffer.push(&bytes[split..]);
        assert_eq!(lines.len(), 1);

        let decoded = lines.into_iter().next().unwrap().unwrap();
        let text = parse_sse_line(&decoded).unwrap().unwrap();
        assert_eq!(text, "café");
        assert!(buffer.finish().is_none());
    }

    #[test]
    fn test_line_buffer_keeps_unterminated_tail() {
        let mut buffer = SseLineBuffer::default();
        let lines = buffer.push(b"data: a\ndata: b");
        assert_eq!(lines.len(), 1);
        assert_eq!(buffer.finish().unwrap().unwrap(), "data: b");
    }

    #[tokio::test]
    async fn test_stream_preserves_non_ascii_text() {
        let server = MockServer::start().await;
        let body = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"café über 東京\"}]}}]}\n\n";
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:streamGenerateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let stream = client(&server)
            .stream("gemini-2.0-flash", &GenerationRequest::prompt("x"))
            .await
            .unwrap();
        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec!["café über 東京"]);
    }

    #[test]
    fn test_parse_sse_line_skips_non_data() {
        assert!(parse_sse_line("").is_none());
        assert!(parse_sse_line(": keep-alive").is_none());
        assert!(parse_sse_line("event: message").is_none());
        assert!(matches!(parse_sse_line("data: {oops"), Some(Err(_))));
    }
}
