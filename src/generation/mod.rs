//! Generation fallback ring.
//!
//! Text generation is spread over an ordered list of model identifiers. A call
//! starts at the ring's cursor and walks forward one model per failure:
//!
//! ```text
//!   cursor ─▶ [m0] ─fail─▶ [m1] ─fail─▶ [m2] ─fail─▶ last error
//!               │            │            │
//!               └──── ok ────┴──── ok ────┴──▶ value, cursor = 0
//! ```
//!
//! Each model is tried at most once per call, with a fixed pause between
//! attempts. A success always resets the cursor to the first model.

mod chat;
mod error;
mod gemini;

pub use chat::{
    degraded_message, ChatReply, ChatService, FeasibilityReport, GoalCategory, GoalClarification,
};
pub use error::LlmError;
pub use gemini::GeminiClient;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

/// Pause between two attempts of the same call.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

/// One turn of conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            text: text.into(),
        }
    }
}

/// Provider-neutral generation request.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatTurn>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    /// Ask the model for a JSON document instead of prose.
    pub json: bool,
}

impl GenerationRequest {
    /// Single user prompt with no history.
    pub fn prompt(text: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatTurn::user(text)],
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        let mut messages = history;
        messages.append(&mut self.messages);
        self.messages = messages;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }

    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }
}

/// Incremental text chunks of a streamed generation.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// A backend able to run a request against a named model.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, model: &str, request: &GenerationRequest) -> Result<String, LlmError>;

    /// Open a streamed generation. Only errors raised before the first chunk
    /// count as a failed attempt.
    async fn stream(&self, model: &str, request: &GenerationRequest)
        -> Result<TextStream, LlmError>;
}

/// Cyclic multi-model retry with reset on success.
pub struct GenerationRing {
    models: Vec<String>,
    cursor: AtomicUsize,
    delay: Duration,
}

impl GenerationRing {
    pub fn new(models: Vec<String>, delay: Duration) -> Self {
        Self {
            models,
            cursor: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Index of the model the next call starts with.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    /// Run `op` against successive models until one succeeds or every model
    /// has been tried once.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, LlmError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let count = self.models.len();
        if count == 0 {
            return Err(LlmError::Unavailable(
                "No generation models configured".to_string(),
            ));
        }

        let mut last_error = None;
        for attempt in 0..count {
            let index = self.cursor.load(Ordering::SeqCst) % count;
            let model = self.models[index].clone();

            match op(model.clone()).await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(model = %model, attempt = attempt + 1, "Generation recovered on fallback model");
                    }
                    self.cursor.store(0, Ordering::SeqCst);
                    return Ok(value);
                }
                Err(e) => {
                    let next = (index + 1) % count;
                    self.cursor.store(next, Ordering::SeqCst);
                    if attempt + 1 < count {
                        tracing::warn!(
                            model = %model,
                            next_model = %self.models[next],
                            attempt = attempt + 1,
                            max_attempts = count,
                            delay_ms = self.delay.as_millis() as u64,
                            error = %e,
                            "Generation failed, rotating to next model"
                        );
                        last_error = Some(e);
                        tokio::time::sleep(self.delay).await;
                    } else {
                        tracing::error!(
                            model = %model,
                            attempts = count,
                            error = %e,
                            "Generation failed on every model"
                        );
                        last_error = Some(e);
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::Unavailable("Generation ring exhausted".to_string())))
    }

    /// One-shot generation through the ring.
    pub async fn generate(
        &self,
        generator: &Arc<dyn TextGenerator>,
        request: &GenerationRequest,
    ) -> Result<String, LlmError> {
        self.run(|model| {
            let generator = Arc::clone(generator);
            async move { generator.generate(&model, request).await }
        })
        .await
    }

    /// Streamed generation through the ring.
    pub async fn stream(
        &self,
        generator: &Arc<dyn TextGenerator>,
        request: &GenerationRequest,
    ) -> Result<TextStream, LlmError> {
        self.run(|model| {
            let generator = Arc::clone(generator);
            async move { generator.stream(&model, request).await }
        })
        .await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Instant;

    use super::*;

    /// Generator that fails for listed models and answers `reply` otherwise.
    pub struct ScriptedGenerator {
        failures: HashMap<String, LlmError>,
        reply: String,
        calls: Mutex<Vec<(String, Instant)>>,
    }

    impl ScriptedGenerator {
        pub fn replying(reply: impl Into<String>) -> Self {
            Self {
                failures: HashMap::new(),
                reply: reply.into(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(mut self, model: &str, error: LlmError) -> Self {
            self.failures.insert(model.to_string(), error);
            self
        }

        pub fn calls(&self) -> Vec<(String, Instant)> {
            self.calls.lock().unwrap().clone()
        }

        pub fn models_called(&self) -> Vec<String> {
            self.calls().into_iter().map(|(m, _)| m).collect()
        }

        fn answer(&self, model: &str) -> Result<String, LlmError> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), Instant::now()));
            match self.failures.get(model) {
                Some(err) => Err(err.clone()),
                None => Ok(self.reply.clone()),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, model: &str, _request: &GenerationRequest) -> Result<String, LlmError> {
            self.answer(model)
        }

        async fn stream(
            &self,
            model: &str,
            _request: &GenerationRequest,
        ) -> Result<TextStream, LlmError> {
            let reply = self.answer(model)?;
            let chunks: Vec<Result<String, LlmError>> = reply
                .split_inclusive(' ')
                .map(|c| Ok(c.to_string()))
                .collect();
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::testing::ScriptedGenerator;
    use super::*;

    fn models() -> Vec<String> {
        vec!["m1".into(), "m2".into(), "m3".into()]
    }

    #[tokio::test]
    async fn test_ring_walks_to_third_model_and_resets() {
        let delay = Duration::from_millis(30);
        let scripted = Arc::new(
            ScriptedGenerator::replying("hello")
                .failing("m1", LlmError::from_status(503, "busy", None))
                .failing("m2", LlmError::from_status(429, "slow", None)),
        );
        let generator: Arc<dyn TextGenerator> = scripted.clone();
        let ring = GenerationRing::new(models(), delay);

        let text = ring
            .generate(&generator, &GenerationRequest::prompt("hi"))
            .await
            .unwrap();
        assert_eq!(text, "hello");

        let calls = scripted.calls();
        assert_eq!(
            calls.iter().map(|(m, _)| m.as_str()).collect::<Vec<_>>(),
            vec!["m1", "m2", "m3"]
        );
        for pair in calls.windows(2) {
            assert!(pair[1].1.duration_since(pair[0].1) >= delay);
        }
        assert_eq!(ring.cursor(), 0);

        // Next call starts again from the first model.
        let _ = ring.generate(&generator, &GenerationRequest::prompt("again")).await;
        assert_eq!(scripted.models_called()[3], "m1");
    }

    #[tokio::test]
    async fn test_ring_exhaustion_returns_last_error() {
        let scripted = Arc::new(
            ScriptedGenerator::replying("never")
                .failing("m1", LlmError::from_status(503, "busy", None))
                .failing("m2", LlmError::from_status(500, "oops", None))
                .failing("m3", LlmError::from_status(400, "bad", None)),
        );
        let generator: Arc<dyn TextGenerator> = scripted.clone();
        let ring = GenerationRing::new(models(), Duration::from_millis(1));

        let err = ring
            .generate(&generator, &GenerationRequest::prompt("hi"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(scripted.calls().len(), 3);
        // Cursor wrapped back around to the start.
        assert_eq!(ring.cursor(), 0);
    }

    #[tokio::test]
    async fn test_each_model_tried_once_when_all_fail() {
        let ring = GenerationRing::new(models(), Duration::from_millis(1));
        let mut seen = Vec::new();
        let result: Result<(), LlmError> = ring
            .run(|model| {
                seen.push(model);
                async { Err(LlmError::Transport("down".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(seen, vec!["m1", "m2", "m3"]);
        // A full lap leaves the cursor back on the first model.
        assert_eq!(ring.cursor(), 0);
    }

    #[tokio::test]
    async fn test_empty_ring_is_unavailable() {
        let ring = GenerationRing::new(Vec::new(), DEFAULT_RETRY_DELAY);
        let err = ring
            .run(|_| async { Ok::<_, LlmError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_stream_falls_back_before_first_chunk() {
        let scripted = Arc::new(
            ScriptedGenerator::replying("streamed reply text")
                .failing("m1", LlmError::from_status(503, "busy", None)),
        );
        let generator: Arc<dyn TextGenerator> = scripted.clone();
        let ring = GenerationRing::new(models(), Duration::from_millis(1));

        let stream = ring
            .stream(&generator, &GenerationRequest::prompt("hi"))
            .await
            .unwrap();
        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks.concat(), "streamed reply text");
        assert_eq!(scripted.models_called(), vec!["m1", "m2"]);
    }

    #[test]
    fn test_request_history_precedes_prompt() {
        let request = GenerationRequest::prompt("now")
            .with_history(vec![ChatTurn::user("before"), ChatTurn::model("reply")])
            .json();
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[2].text, "now");
        assert!(request.json);
    }
}
