//! Learning agent: learning paths, course discovery and study schedules.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};

use super::{
    unsupported, AgentError, AgentResult, AgentType, Capability, Credential, CredentialSet,
    DomainAgent, ParamSpec, ParamType, Provenance, SharedKeys,
};
use crate::cascade::{round2, seeded_rng, Cascade};
use crate::providers::learning::{CourseResource, YouTubeCourses};
use crate::task::{
    CourseQuery, LearningPathRequest, SkillLevel, StudyScheduleRequest, Task, TaskParams,
};

/// Platforms in the curated catalog: (name, base url, free).
const PLATFORMS: [(&str, &str, bool); 5] = [
    ("Coursera", "https://www.coursera.org/search?query=", false),
    ("edX", "https://www.edx.org/search?q=", false),
    ("Udemy", "https://www.udemy.com/courses/search/?q=", false),
    ("freeCodeCamp", "https://www.freecodecamp.org/news/search/?query=", true),
    ("Khan Academy", "https://www.khanacademy.org/search?page_search_query=", true),
];

const LEVELS: [SkillLevel; 4] = [
    SkillLevel::Beginner,
    SkillLevel::Intermediate,
    SkillLevel::Advanced,
    SkillLevel::Expert,
];

/// Study hours to move up from a level to the next one.
fn hours_to_advance(from: SkillLevel) -> f64 {
    match from {
        SkillLevel::Beginner => 60.0,
        SkillLevel::Intermediate => 120.0,
        SkillLevel::Advanced => 200.0,
        SkillLevel::Expert => 0.0,
    }
}

const DAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Courses attached to each learning-path phase.
const COURSES_PER_PHASE: u32 = 2;

pub struct LearningAgent {
    credentials: CredentialSet,
    courses: Cascade<CourseQuery, Vec<CourseResource>>,
}

impl LearningAgent {
    pub fn new(http: reqwest::Client, shared: SharedKeys) -> Self {
        Self {
            credentials: CredentialSet::new(shared),
            courses: Cascade::new("courses").tier(Arc::new(YouTubeCourses::new(http))),
        }
    }

    async fn find_courses(&self, query: &CourseQuery, trail: &mut Provenance) -> Value {
        let retrieved = self.courses.run(query, &self.credentials, curated_courses).await;
        trail.note(&retrieved);

        json!({
            "topic": query.topic,
            "level": query.level,
            "courses": retrieved.value,
            "provider": retrieved.source.label(),
            "dataSource": trail.data_source(),
        })
    }

    async fn learning_path(&self, request: &LearningPathRequest, trail: &mut Provenance) -> Value {
        let current = request.current_level;
        let target = request
            .target_level
            .filter(|t| t.rank() > current.rank())
            .unwrap_or_else(|| next_level(current));

        let mut phases = Vec::new();
        let mut start_week = 1u32;
        let mut total_hours = 0.0;
        for level in LEVELS
            .iter()
            .copied()
            .filter(|l| l.rank() >= current.rank() && l.rank() < target.rank())
        {
            let to = next_level(level);
            let hours = hours_to_advance(level);
            let weeks = (hours / request.hours_per_week).ceil().max(1.0) as u32;

            let query = CourseQuery {
                topic: request.skill.clone(),
                level: Some(level),
                limit: COURSES_PER_PHASE,
            };
            let retrieved = self.courses.run(&query, &self.credentials, curated_courses).await;
            trail.note(&retrieved);

            phases.push(json!({
                "phase": phases.len() + 1,
                "from": level,
                "to": to,
                "startWeek": start_week,
                "weeks": weeks,
                "hours": hours,
                "milestone": format!("Reach {} {}", to.as_str(), request.skill),
                "resources": retrieved.value,
            }));
            start_week = start_week.saturating_add(weeks);
            total_hours += hours;
        }

        json!({
            "skill": request.skill,
            "currentLevel": current,
            "targetLevel": target,
            "hoursPerWeek": request.hours_per_week,
            "totalHours": total_hours,
            "totalWeeks": start_week - 1,
            "phases": phases,
            "dataSource": trail.data_source(),
        })
    }
}

#[async_trait]
impl DomainAgent for LearningAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Learning
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![
            Capability::new("createLearningPath", "Phased plan from the current to a target level")
                .param("skill", ParamSpec::required(ParamType::String))
                .param("currentLevel", ParamSpec::with_default(ParamType::String, json!("beginner")))
                .param("targetLevel", ParamSpec::optional(ParamType::String))
                .param("hoursPerWeek", ParamSpec::with_default(ParamType::Number, json!(5))),
            Capability::new("findCourses", "Courses and playlists for a topic")
                .param("topic", ParamSpec::required(ParamType::String))
                .param("level", ParamSpec::optional(ParamType::String))
                .param("limit", ParamSpec::with_default(ParamType::Integer, json!(5))),
            Capability::new("createStudySchedule", "Weekly study sessions across topics")
                .param("topics", ParamSpec::required(ParamType::Array))
                .param("weeks", ParamSpec::required(ParamType::Integer))
                .param("hoursPerWeek", ParamSpec::with_default(ParamType::Number, json!(5))),
        ]
    }

    async fn execute_task(&self, task: &Task) -> Result<AgentResult, AgentError> {
        let params = TaskParams::parse(&task.task_type, &task.parameters)?;
        let mut trail = Provenance::default();

        let (data, confidence) = match params {
            TaskParams::LearningPath(r) => (self.learning_path(&r, &mut trail).await, 0.8),
            TaskParams::FindCourses(q) => (self.find_courses(&q, &mut trail).await, 0.85),
            TaskParams::StudySchedule(r) => (study_schedule(&r), 0.9),
            _ => return Err(unsupported(AgentType::Learning, task)),
        };

        Ok(trail.finish(AgentType::Learning, &task.task_type, data, confidence))
    }

    fn set_api_credentials(&mut self, provider: &str, credential: Credential) {
        self.credentials.insert(provider, credential);
    }

    fn api_credentials(&self, provider: &str) -> Option<&Credential> {
        self.credentials.get(provider)
    }
}

fn next_level(level: SkillLevel) -> SkillLevel {
    match level {
        SkillLevel::Beginner => SkillLevel::Intermediate,
        SkillLevel::Intermediate => SkillLevel::Advanced,
        SkillLevel::Advanced | SkillLevel::Expert => SkillLevel::Expert,
    }
}

fn curated_courses(query: &CourseQuery) -> Vec<CourseResource> {
    let level = query.level.unwrap_or_default();
    let mut rng = seeded_rng(&format!("{}-{}", query.topic.to_lowercase(), level.as_str()));
    let encoded: String = query
        .topic
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("+");

    PLATFORMS
        .iter()
        .cycle()
        .take(query.limit as usize)
        .enumerate()
        .map(|(i, (platform, base, free))| {
            let kind = if i < PLATFORMS.len() { "Complete" } else { "Practical" };
            CourseResource {
                title: format!("{} {} Guide ({})", kind, query.topic, level.as_str()),
                provider: platform.to_string(),
                url: format!("{}{}", base, encoded),
                level: level.as_str().to_string(),
                duration_hours: Some(rng.gen_range(4.0f64..40.0).round()),
                free: *free,
                rating: Some(round2(rng.gen_range(4.0..4.9))),
            }
        })
        .collect()
}

fn study_schedule(request: &StudyScheduleRequest) -> Value {
    let topics: Vec<&str> = request
        .topics
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();

    // Sessions of at most two hours, at least one per week.
    let sessions_per_week = (request.hours_per_week / 2.0).ceil().max(1.0) as u32;
    let session_hours = round2(request.hours_per_week / sessions_per_week as f64);
    let weeks_per_topic = (request.weeks as f64 / topics.len() as f64).max(1.0);

    let weeks: Vec<Value> = (0..request.weeks)
        .map(|week| {
            let index = ((week as f64 / weeks_per_topic) as usize).min(topics.len() - 1);
            let topic = topics[index];
            let is_review = week + 1 == request.weeks && request.weeks > 1;
            let sessions: Vec<Value> = (0..sessions_per_week)
                .map(|s| {
                    let day = DAYS[(s as usize * 7 / sessions_per_week as usize) % 7];
                    json!({"day": day, "hours": session_hours})
                })
                .collect();
            let topic = if is_review { "Review and practice" } else { topic };
            json!({
                "week": week + 1,
                "topic": topic,
                "sessions": sessions,
            })
        })
        .collect();

    json!({
        "topics": topics,
        "totalWeeks": request.weeks,
        "hoursPerWeek": request.hours_per_week,
        "totalHours": round2(request.hours_per_week * request.weeks as f64),
        "sessionsPerWeek": sessions_per_week,
        "weeks": weeks,
        "dataSource": "computed",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::testing::FakeProvider;
    use serde_json::json;

    fn agent() -> LearningAgent {
        LearningAgent::new(reqwest::Client::new(), SharedKeys::default())
    }

    #[tokio::test]
    async fn test_courses_fall_back_to_catalog() {
        let result = agent()
            .execute_task(&Task::new("g", "u", "findCourses", json!({"topic": "data science", "limit": 3})))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.is_fallback());
        let courses = result.data["courses"].as_array().unwrap();
        assert_eq!(courses.len(), 3);
        assert_eq!(courses[0]["provider"], "Coursera");
        assert!(courses[0]["url"].as_str().unwrap().ends_with("data+science"));
    }

    #[tokio::test]
    async fn test_learning_path_phases() {
        let result = agent()
            .execute_task(&Task::new(
                "g",
                "u",
                "createLearningPath",
                json!({"skill": "Spanish", "currentLevel": "beginner", "targetLevel": "advanced", "hoursPerWeek": 10}),
            ))
            .await
            .unwrap();

        let phases = result.data["phases"].as_array().unwrap();
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0]["weeks"], 6);
        assert_eq!(phases[1]["startWeek"], 7);
        assert_eq!(phases[1]["weeks"], 12);
        assert_eq!(result.data["totalWeeks"], 18);
        assert_eq!(result.data["totalHours"], 180.0);
    }

    #[tokio::test]
    async fn test_learning_path_defaults_to_next_level() {
        let result = agent()
            .execute_task(&Task::new(
                "g",
                "u",
                "createLearningPath",
                json!({"skill": "piano", "currentLevel": "intermediate"}),
            ))
            .await
            .unwrap();
        assert_eq!(result.data["targetLevel"], "advanced");
        assert_eq!(result.data["phases"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_live_courses_used_per_phase() {
        let course = CourseResource {
            title: "Live".to_string(),
            provider: "YouTube - Channel".to_string(),
            url: "https://www.youtube.com/playlist?list=PL1".to_string(),
            level: "beginner".to_string(),
            duration_hours: None,
            free: true,
            rating: None,
        };
        let youtube = FakeProvider::ok("youtube", vec![course]);

        let mut agent = agent();
        agent.courses = Cascade::new("courses").tier(youtube.clone());
        agent.set_api_credentials("youtube", Credential::new("youtube", "key", "k"));

        let result = agent
            .execute_task(&Task::new(
                "g",
                "u",
                "createLearningPath",
                json!({"skill": "go", "targetLevel": "advanced"}),
            ))
            .await
            .unwrap();

        assert!(!result.is_fallback());
        assert_eq!(youtube.calls(), 2);
    }

    #[tokio::test]
    async fn test_tiny_weekly_hours_rejected() {
        let err = agent()
            .execute_task(&Task::new(
                "g",
                "u",
                "createLearningPath",
                json!({"skill": "x", "currentLevel": "beginner", "targetLevel": "advanced", "hoursPerWeek": 1e-9}),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_learning_path_at_minimum_hours() {
        let result = agent()
            .execute_task(&Task::new(
                "g",
                "u",
                "createLearningPath",
                json!({"skill": "x", "currentLevel": "beginner", "targetLevel": "expert", "hoursPerWeek": 0.5}),
            ))
            .await
            .unwrap();
        let phases = result.data["phases"].as_array().unwrap();
        let summed: u64 = phases.iter().map(|p| p["weeks"].as_u64().unwrap()).sum();
        assert_eq!(result.data["totalWeeks"].as_u64().unwrap(), summed);
    }

    #[tokio::test]
    async fn test_oversized_schedule_rejected() {
        let err = agent()
            .execute_task(&Task::new(
                "g",
                "u",
                "createStudySchedule",
                json!({"topics": ["rust"], "weeks": 4, "hoursPerWeek": 1e12}),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters(_)));
    }

    #[test]
    fn test_study_schedule_distributes_topics() {
        let schedule = study_schedule(&StudyScheduleRequest {
            topics: vec!["algebra".to_string(), "geometry".to_string()],
            hours_per_week: 5.0,
            weeks: 4,
        });

        assert_eq!(schedule["sessionsPerWeek"], 3);
        let weeks = schedule["weeks"].as_array().unwrap();
        assert_eq!(weeks.len(), 4);
        assert_eq!(weeks[0]["topic"], "algebra");
        assert_eq!(weeks[2]["topic"], "geometry");
        assert_eq!(weeks[3]["topic"], "Review and practice");
        assert_eq!(schedule["totalHours"], 20.0);
    }
}
