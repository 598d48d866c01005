//! Conversational goal clarification and feasibility checks.
//!
//! Every call goes through the [`GenerationRing`]. When the ring is exhausted
//! the caller still gets a well-formed answer carrying a degraded message
//! chosen from the last error's status class.

use std::sync::Arc;

use futures::StreamExt;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{ChatTurn, GenerationRequest, GenerationRing, LlmError, TextGenerator, TextStream};
use crate::agents::AgentType;

const CHAT_SYSTEM_PROMPT: &str = "You are a goal-planning assistant. Help the user turn a \
vague ambition into a concrete, measurable goal. Keep answers short and practical.";

const CLARIFY_SYSTEM_PROMPT: &str = "You clarify personal goals. Respond with a JSON object: \
{\"category\": one of travel|savings|learning|fitness|career|other, \"reply\": a short answer \
to the user, \"questions\": up to three follow-up questions}.";

const FEASIBILITY_SYSTEM_PROMPT: &str = "You assess whether a personal goal is achievable. \
Respond with a JSON object: {\"feasible\": bool, \"score\": number between 0 and 1, \
\"summary\": string, \"risks\": [string], \"recommendations\": [string]}.";

const FENCED_JSON_REGEX: &str = r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$";

/// User-facing text for a generation failure, keyed by failure class.
pub fn degraded_message(error: &LlmError) -> &'static str {
    match error {
        LlmError::Overloaded(_) => {
            "Our AI assistant is experiencing high demand right now. Please try again in a few minutes."
        }
        LlmError::RateLimited { .. } => {
            "We've hit our AI request limit for the moment. Please wait a minute and try again."
        }
        LlmError::BadRequest(_) => "I couldn't process that request. Could you rephrase your goal?",
        _ => "Something went wrong while generating a response. Please try again.",
    }
}

/// Broad goal category inferred during clarification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalCategory {
    Travel,
    Savings,
    Learning,
    Fitness,
    Career,
    Other,
}

impl GoalCategory {
    /// Agents worth assigning to a goal of this category.
    pub fn suggested_agents(&self) -> Vec<AgentType> {
        match self {
            Self::Travel => vec![AgentType::Travel, AgentType::Weather, AgentType::Financial],
            Self::Savings => vec![AgentType::Financial],
            Self::Learning => vec![AgentType::Learning, AgentType::Research],
            Self::Fitness => vec![AgentType::Research, AgentType::Learning],
            Self::Career => vec![AgentType::Learning, AgentType::Research, AgentType::Financial],
            Self::Other => vec![AgentType::Research],
        }
    }

    /// Category from a model-supplied label. Unknown labels map to `Other`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "travel" => Self::Travel,
            "savings" | "financial" | "finance" => Self::Savings,
            "learning" | "education" => Self::Learning,
            "fitness" | "health" => Self::Fitness,
            "career" => Self::Career,
            _ => Self::Other,
        }
    }

    /// Keyword guess used when the model is unavailable or returns prose.
    pub fn infer(text: &str) -> Self {
        const KEYWORDS: [(GoalCategory, &[&str]); 5] = [
            (
                GoalCategory::Travel,
                &["trip", "travel", "visit", "vacation", "holiday", "flight"],
            ),
            (
                GoalCategory::Savings,
                &["save", "saving", "money", "budget", "invest", "debt"],
            ),
            (
                GoalCategory::Fitness,
                &["marathon", "fitness", "weight", "gym", "exercise"],
            ),
            (
                GoalCategory::Career,
                &["job", "career", "promotion", "salary", "interview"],
            ),
            (
                GoalCategory::Learning,
                &["learn", "course", "study", "language", "degree", "skill"],
            ),
        ];

        let lower = text.to_lowercase();
        KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map(|(category, _)| *category)
            .unwrap_or(GoalCategory::Other)
    }
}

/// A conversational answer.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub text: String,
    pub degraded: bool,
}

/// Outcome of goal clarification.
#[derive(Debug, Clone, Serialize)]
pub struct GoalClarification {
    pub category: GoalCategory,
    pub reply: String,
    pub questions: Vec<String>,
    pub suggested_agents: Vec<AgentType>,
    pub degraded: bool,
}

/// Model-judged feasibility of a goal. `feasible` is `None` when no model
/// could be reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeasibilityReport {
    pub feasible: Option<bool>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub degraded: bool,
}

#[derive(Debug, Deserialize)]
struct ClarifyPayload {
    category: Option<String>,
    #[serde(default)]
    reply: String,
    #[serde(default)]
    questions: Vec<String>,
}

/// Chat front end over the generation ring.
pub struct ChatService {
    generator: Arc<dyn TextGenerator>,
    ring: GenerationRing,
}

impl ChatService {
    pub fn new(generator: Arc<dyn TextGenerator>, ring: GenerationRing) -> Self {
        Self { generator, ring }
    }

    pub fn ring(&self) -> &GenerationRing {
        &self.ring
    }

    /// Answer the next user message given prior turns.
    pub async fn reply(&self, history: &[ChatTurn], message: &str) -> ChatReply {
        let request = GenerationRequest::prompt(message)
            .with_history(history.to_vec())
            .with_system(CHAT_SYSTEM_PROMPT)
            .with_temperature(0.7);

        match self.ring.generate(&self.generator, &request).await {
            Ok(text) => ChatReply {
                text,
                degraded: false,
            },
            Err(e) => ChatReply {
                text: degraded_message(&e).to_string(),
                degraded: true,
            },
        }
    }

    /// Streamed variant of [`reply`](Self::reply). On exhaustion the stream
    /// carries the degraded message as its only chunk.
    pub async fn reply_stream(&self, history: &[ChatTurn], message: &str) -> TextStream {
        let request = GenerationRequest::prompt(message)
            .with_history(history.to_vec())
            .with_system(CHAT_SYSTEM_PROMPT)
            .with_temperature(0.7);

        match self.ring.stream(&self.generator, &request).await {
            Ok(stream) => stream,
            Err(e) => {
                let text = degraded_message(&e).to_string();
                futures::stream::once(async move { Ok(text) }).boxed()
            }
        }
    }

    /// Classify a goal and ask follow-up questions.
    pub async fn clarify_goal(&self, goal: &str, history: &[ChatTurn]) -> GoalClarification {
        let request = GenerationRequest::prompt(goal)
            .with_history(history.to_vec())
            .with_system(CLARIFY_SYSTEM_PROMPT)
            .with_temperature(0.4)
            .json();

        let raw = match self.ring.generate(&self.generator, &request).await {
            Ok(raw) => raw,
            Err(e) => {
                let category = GoalCategory::infer(goal);
                return GoalClarification {
                    category,
                    reply: degraded_message(&e).to_string(),
                    questions: Vec::new(),
                    suggested_agents: category.suggested_agents(),
                    degraded: true,
                };
            }
        };

        let (category, reply, questions) = match parse_model_json::<ClarifyPayload>(&raw) {
            Some(payload) => (
                payload
                    .category
                    .as_deref()
                    .map(GoalCategory::from_label)
                    .unwrap_or_else(|| GoalCategory::infer(goal)),
                payload.reply,
                payload.questions.into_iter().take(3).collect(),
            ),
            None => {
                tracing::debug!("Clarification was not JSON, keeping prose reply");
                (GoalCategory::infer(goal), raw, Vec::new())
            }
        };

        GoalClarification {
            category,
            reply,
            questions,
            suggested_agents: category.suggested_agents(),
            degraded: false,
        }
    }

    /// Ask the model for a structured feasibility judgement.
    pub async fn assess_feasibility(
        &self,
        goal: &str,
        context: &serde_json::Value,
    ) -> FeasibilityReport {
        let prompt = format!("Goal: {}\nContext: {}", goal, context);
        let request = GenerationRequest::prompt(prompt)
            .with_system(FEASIBILITY_SYSTEM_PROMPT)
            .with_temperature(0.2)
            .json();

        let raw = match self.ring.generate(&self.generator, &request).await {
            Ok(raw) => raw,
            Err(e) => return FeasibilityReport::unavailable(degraded_message(&e)),
        };

        match parse_model_json::<FeasibilityReport>(&raw) {
            Some(mut report) => {
                report.score = report.score.clamp(0.0, 1.0);
                report.degraded = false;
                report
            }
            None => {
                tracing::warn!("Feasibility response was not valid JSON");
                FeasibilityReport {
                    feasible: None,
                    score: 0.0,
                    summary: raw,
                    risks: Vec::new(),
                    recommendations: Vec::new(),
                    degraded: false,
                }
            }
        }
    }
}

impl FeasibilityReport {
    fn unavailable(message: &str) -> Self {
        Self {
            feasible: None,
            score: 0.0,
            summary: message.to_string(),
            risks: Vec::new(),
            recommendations: Vec::new(),
            degraded: true,
        }
    }
}

/// Decode a JSON answer, tolerating a surrounding Markdown code fence.
fn parse_model_json<T: serde::de::DeserializeOwned>(raw: &str) -> Option<T> {
    let body = Regex::new(FENCED_JSON_REGEX)
        .ok()
        .and_then(|re| re.captures(raw))
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw);
    serde_json::from_str(body.trim()).ok()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::generation::testing::ScriptedGenerator;

    fn service(generator: ScriptedGenerator) -> ChatService {
        let ring = GenerationRing::new(
            vec!["primary".into(), "secondary".into()],
            Duration::from_millis(1),
        );
        ChatService::new(Arc::new(generator), ring)
    }

    fn all_failing(status: u16) -> ScriptedGenerator {
        let err = LlmError::from_status(status, "upstream", None);
        ScriptedGenerator::replying("unused")
            .failing("primary", err.clone())
            .failing("secondary", err)
    }

    #[test]
    fn test_degraded_message_by_status() {
        let busy = degraded_message(&LlmError::from_status(503, "", None));
        let limited = degraded_message(&LlmError::from_status(429, "", None));
        let bad = degraded_message(&LlmError::from_status(400, "", None));
        let other = degraded_message(&LlmError::Transport(String::new()));
        assert!(busy.contains("high demand"));
        assert!(limited.contains("limit"));
        assert!(bad.contains("rephrase"));
        assert!(other.contains("try again"));
        assert_ne!(busy, other);
    }

    #[tokio::test]
    async fn test_reply_uses_fallback_model() {
        let generator = ScriptedGenerator::replying("Start with a budget.")
            .failing("primary", LlmError::from_status(503, "busy", None));
        let chat = service(generator);

        let reply = chat.reply(&[], "I want to save money").await;
        assert!(!reply.degraded);
        assert_eq!(reply.text, "Start with a budget.");
        assert_eq!(chat.ring().cursor(), 0);
    }

    #[tokio::test]
    async fn test_reply_degrades_on_exhaustion() {
        let reply = service(all_failing(503)).reply(&[], "hello").await;
        assert!(reply.degraded);
        assert!(reply.text.contains("high demand"));

        let reply = service(all_failing(429)).reply(&[], "hello").await;
        assert!(reply.text.contains("limit"));
    }

    #[tokio::test]
    async fn test_reply_stream_degrades_to_single_chunk() {
        let stream = service(all_failing(400)).reply_stream(&[], "hello").await;
        let chunks: Vec<_> = stream.collect().await;
        assert_eq!(chunks.len(), 1);
        let text = tokio_test::assert_ok!(chunks.into_iter().next().unwrap());
        assert!(text.contains("rephrase"));
    }

    #[tokio::test]
    async fn test_clarify_goal_parses_fenced_json() {
        let raw = "```json\n{\"category\": \"travel\", \"reply\": \"Where to?\", \
                   \"questions\": [\"When?\", \"Budget?\", \"Who?\", \"Why?\"]}\n```";
        let clarification = service(ScriptedGenerator::replying(raw))
            .clarify_goal("See Japan in spring", &[])
            .await;
        assert_eq!(clarification.category, GoalCategory::Travel);
        assert_eq!(clarification.reply, "Where to?");
        assert_eq!(clarification.questions.len(), 3);
        assert!(clarification.suggested_agents.contains(&AgentType::Weather));
        assert!(!clarification.degraded);
    }

    #[tokio::test]
    async fn test_clarify_goal_keeps_prose_and_infers_category() {
        let clarification = service(ScriptedGenerator::replying("Sounds great, how much?"))
            .clarify_goal("Save 5000 dollars for a car", &[])
            .await;
        assert_eq!(clarification.category, GoalCategory::Savings);
        assert_eq!(clarification.reply, "Sounds great, how much?");
        assert_eq!(clarification.suggested_agents, vec![AgentType::Financial]);
    }

    #[tokio::test]
    async fn test_clarify_goal_degraded_still_categorizes() {
        let clarification = service(all_failing(503))
            .clarify_goal("Learn Spanish this year", &[])
            .await;
        assert!(clarification.degraded);
        assert_eq!(clarification.category, GoalCategory::Learning);
    }

    #[tokio::test]
    async fn test_assess_feasibility_clamps_score() {
        let raw = json!({
            "feasible": true,
            "score": 1.4,
            "summary": "Doable with discipline",
            "risks": ["income variance"],
            "recommendations": ["automate transfers"]
        })
        .to_string();
        let report = service(ScriptedGenerator::replying(raw))
            .assess_feasibility("Save 10k", &json!({"months": 12}))
            .await;
        assert_eq!(report.feasible, Some(true));
        assert_eq!(report.score, 1.0);
        assert_eq!(report.risks, vec!["income variance"]);
    }

    #[tokio::test]
    async fn test_assess_feasibility_unavailable() {
        let report = service(all_failing(500))
            .assess_feasibility("Run a marathon", &json!({}))
            .await;
        assert!(report.degraded);
        assert_eq!(report.feasible, None);
        assert!(report.summary.contains("try again"));
    }

    #[test]
    fn test_infer_category_defaults_to_other() {
        assert_eq!(GoalCategory::infer("Plan a trip to Rome"), GoalCategory::Travel);
        assert_eq!(GoalCategory::infer("Get a promotion"), GoalCategory::Career);
        assert_eq!(GoalCategory::infer("Be happier"), GoalCategory::Other);
    }
}
