//! Task module - the unit of work submitted to the agent manager.
//!
//! A [`Task`] carries a free-form parameter bag as it arrives from the route
//! layer. Agents turn it into a typed [`TaskParams`] before doing any work, so
//! parameter validation happens once, at the edge.

mod params;

pub use params::*;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agents::AgentType;

/// Scheduling hint carried by a task. Execution is immediate regardless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    High,
    #[default]
    Medium,
    Low,
}

/// One unit of work for the agent manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub goal_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default = "empty_parameters")]
    pub parameters: Value,
}

fn empty_parameters() -> Value {
    Value::Object(Default::default())
}

impl Task {
    pub fn new(
        goal_id: impl Into<String>,
        user_id: impl Into<String>,
        task_type: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            goal_id: goal_id.into(),
            user_id: user_id.into(),
            task_type: task_type.into(),
            priority: TaskPriority::default(),
            parameters,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Known task kind, if the type string is one of the mapped task types.
    pub fn kind(&self) -> Option<TaskKind> {
        self.task_type.parse().ok()
    }

    /// Agent type that handles this task. Unmapped types go to research.
    pub fn agent_type(&self) -> AgentType {
        agent_type_for_task(&self.task_type)
    }
}

/// Every task type with a fixed agent mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    SearchFlights,
    SearchHotels,
    GetVisaRequirements,
    PlanItinerary,
    ConvertCurrency,
    CreateSavingsPlan,
    GetInvestmentAdvice,
    AnalyzeBudget,
    MarketResearch,
    CompetitorAnalysis,
    NewsSearch,
    SwotAnalysis,
    CreateLearningPath,
    FindCourses,
    CreateStudySchedule,
    GetCurrentWeather,
    GetWeatherForecast,
    GetTravelWeather,
}

impl TaskKind {
    pub const ALL: [TaskKind; 18] = [
        TaskKind::SearchFlights,
        TaskKind::SearchHotels,
        TaskKind::GetVisaRequirements,
        TaskKind::PlanItinerary,
        TaskKind::ConvertCurrency,
        TaskKind::CreateSavingsPlan,
        TaskKind::GetInvestmentAdvice,
        TaskKind::AnalyzeBudget,
        TaskKind::MarketResearch,
        TaskKind::CompetitorAnalysis,
        TaskKind::NewsSearch,
        TaskKind::SwotAnalysis,
        TaskKind::CreateLearningPath,
        TaskKind::FindCourses,
        TaskKind::CreateStudySchedule,
        TaskKind::GetCurrentWeather,
        TaskKind::GetWeatherForecast,
        TaskKind::GetTravelWeather,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SearchFlights => "searchFlights",
            Self::SearchHotels => "searchHotels",
            Self::GetVisaRequirements => "getVisaRequirements",
            Self::PlanItinerary => "planItinerary",
            Self::ConvertCurrency => "convertCurrency",
            Self::CreateSavingsPlan => "createSavingsPlan",
            Self::GetInvestmentAdvice => "getInvestmentAdvice",
            Self::AnalyzeBudget => "analyzeBudget",
            Self::MarketResearch => "marketResearch",
            Self::CompetitorAnalysis => "competitorAnalysis",
            Self::NewsSearch => "newsSearch",
            Self::SwotAnalysis => "swotAnalysis",
            Self::CreateLearningPath => "createLearningPath",
            Self::FindCourses => "findCourses",
            Self::CreateStudySchedule => "createStudySchedule",
            Self::GetCurrentWeather => "getCurrentWeather",
            Self::GetWeatherForecast => "getWeatherForecast",
            Self::GetTravelWeather => "getTravelWeather",
        }
    }

    pub fn agent_type(&self) -> AgentType {
        match self {
            Self::SearchFlights
            | Self::SearchHotels
            | Self::GetVisaRequirements
            | Self::PlanItinerary => AgentType::Travel,
            Self::ConvertCurrency
            | Self::CreateSavingsPlan
            | Self::GetInvestmentAdvice
            | Self::AnalyzeBudget => AgentType::Financial,
            Self::MarketResearch
            | Self::CompetitorAnalysis
            | Self::NewsSearch
            | Self::SwotAnalysis => AgentType::Research,
            Self::CreateLearningPath | Self::FindCourses | Self::CreateStudySchedule => {
                AgentType::Learning
            }
            Self::GetCurrentWeather | Self::GetWeatherForecast | Self::GetTravelWeather => {
                AgentType::Weather
            }
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or(())
    }
}

/// Resolve a task type string to the agent type that serves it.
pub fn agent_type_for_task(task_type: &str) -> AgentType {
    task_type
        .parse::<TaskKind>()
        .map(|kind| kind.agent_type())
        .unwrap_or(AgentType::Research)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_static_mapping() {
        assert_eq!(agent_type_for_task("searchFlights"), AgentType::Travel);
        assert_eq!(agent_type_for_task("convertCurrency"), AgentType::Financial);
        assert_eq!(agent_type_for_task("findCourses"), AgentType::Learning);
        assert_eq!(agent_type_for_task("getWeatherForecast"), AgentType::Weather);
        assert_eq!(agent_type_for_task("swotAnalysis"), AgentType::Research);
    }

    #[test]
    fn test_unknown_task_defaults_to_research() {
        assert_eq!(agent_type_for_task("planMarathonTraining"), AgentType::Research);
        assert_eq!(agent_type_for_task(""), AgentType::Research);
        // Mapping is case-sensitive like the route layer's task names.
        assert_eq!(agent_type_for_task("SEARCHFLIGHTS"), AgentType::Research);
    }

    #[test]
    fn test_kind_roundtrip_names() {
        for kind in TaskKind::ALL {
            assert_eq!(kind.as_str().parse::<TaskKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_task_deserializes_route_payload() {
        let task: Task = serde_json::from_value(json!({
            "goalId": "goal-1",
            "userId": "user-1",
            "type": "convertCurrency",
            "priority": "high",
            "parameters": {"amount": 10, "fromCurrency": "USD", "toCurrency": "EUR"}
        }))
        .unwrap();

        assert_eq!(task.kind(), Some(TaskKind::ConvertCurrency));
        assert_eq!(task.priority, TaskPriority::High);
        assert_eq!(task.agent_type(), AgentType::Financial);
    }

    #[test]
    fn test_task_defaults() {
        let task: Task = serde_json::from_value(json!({
            "goalId": "g", "userId": "u", "type": "newsSearch"
        }))
        .unwrap();
        assert_eq!(task.priority, TaskPriority::Medium);
        assert!(task.parameters.is_object());
    }
}
