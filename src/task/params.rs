//! Typed task parameters.
//!
//! Each mapped task type has its own request struct. [`TaskParams::parse`]
//! is the only place a raw parameter bag is interpreted.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TaskKind;
use crate::agents::AgentError;

fn default_currency() -> String {
    "USD".to_string()
}

fn default_one() -> u32 {
    1
}

fn default_language() -> String {
    "en".to_string()
}

fn default_news_limit() -> u32 {
    10
}

fn default_course_limit() -> u32 {
    5
}

fn default_forecast_days() -> u32 {
    5
}

fn default_hours_per_week() -> f64 {
    5.0
}

/// Weekly study hours accepted by the learning tasks.
const HOURS_PER_WEEK_RANGE: std::ops::RangeInclusive<f64> = 0.5..=80.0;
const MAX_SCHEDULE_WEEKS: u32 = 104;

fn default_horizon_years() -> u32 {
    5
}

fn default_purpose() -> String {
    "tourism".to_string()
}

fn default_itinerary_days() -> u32 {
    3
}

/// Measurement system for weather data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl SkillLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillLevel::Beginner => "beginner",
            SkillLevel::Intermediate => "intermediate",
            SkillLevel::Advanced => "advanced",
            SkillLevel::Expert => "expert",
        }
    }

    pub fn rank(&self) -> u32 {
        match self {
            SkillLevel::Beginner => 0,
            SkillLevel::Intermediate => 1,
            SkillLevel::Advanced => 2,
            SkillLevel::Expert => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightSearch {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    #[serde(default)]
    pub return_date: Option<NaiveDate>,
    #[serde(default = "default_one", alias = "passengers")]
    pub adults: u32,
    #[serde(default)]
    pub cabin_class: Option<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelSearch {
    #[serde(alias = "city")]
    pub destination: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[serde(default = "default_one")]
    pub guests: u32,
    #[serde(default = "default_one")]
    pub rooms: u32,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl HotelSearch {
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days().max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisaQuery {
    #[serde(alias = "passportCountry")]
    pub nationality: String,
    pub destination: String,
    #[serde(default = "default_purpose")]
    pub purpose: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItineraryRequest {
    pub destination: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default = "default_itinerary_days")]
    pub days: u32,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub budget: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyConversion {
    pub amount: f64,
    pub from_currency: String,
    pub to_currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsPlanRequest {
    pub target_amount: f64,
    #[serde(default)]
    pub current_savings: f64,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    #[serde(default)]
    pub months: Option<u32>,
    #[serde(default)]
    pub monthly_income: Option<f64>,
    /// Annual interest rate in percent.
    #[serde(default)]
    pub interest_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentRequest {
    pub amount: f64,
    #[serde(default)]
    pub risk_tolerance: RiskTolerance,
    #[serde(default = "default_horizon_years")]
    pub time_horizon_years: u32,
    #[serde(default)]
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetRequest {
    pub monthly_income: f64,
    #[serde(default)]
    pub expenses: BTreeMap<String, f64>,
    #[serde(default)]
    pub savings_goal: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketResearchRequest {
    #[serde(alias = "topic")]
    pub industry: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorRequest {
    pub company: String,
    #[serde(default)]
    pub competitors: Vec<String>,
    #[serde(default)]
    pub industry: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsQuery {
    pub query: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_news_limit")]
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwotRequest {
    #[serde(alias = "company", alias = "idea")]
    pub subject: String,
    #[serde(default)]
    pub industry: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPathRequest {
    #[serde(alias = "topic")]
    pub skill: String,
    #[serde(default)]
    pub current_level: SkillLevel,
    #[serde(default)]
    pub target_level: Option<SkillLevel>,
    #[serde(default = "default_hours_per_week")]
    pub hours_per_week: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseQuery {
    #[serde(alias = "skill")]
    pub topic: String,
    #[serde(default)]
    pub level: Option<SkillLevel>,
    #[serde(default = "default_course_limit")]
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyScheduleRequest {
    pub topics: Vec<String>,
    #[serde(default = "default_hours_per_week")]
    pub hours_per_week: f64,
    pub weeks: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationQuery {
    #[serde(alias = "city")]
    pub location: String,
    #[serde(default)]
    pub units: Units,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastQuery {
    #[serde(alias = "city")]
    pub location: String,
    #[serde(default = "default_forecast_days")]
    pub days: u32,
    #[serde(default)]
    pub units: Units,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelWeatherRequest {
    pub destination: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub units: Units,
}

/// Research request for a task type with no fixed mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralResearchRequest {
    pub task_type: String,
    pub query: String,
}

/// Validated parameters, one variant per task type.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskParams {
    SearchFlights(FlightSearch),
    SearchHotels(HotelSearch),
    VisaRequirements(VisaQuery),
    PlanItinerary(ItineraryRequest),
    ConvertCurrency(CurrencyConversion),
    SavingsPlan(SavingsPlanRequest),
    InvestmentAdvice(InvestmentRequest),
    AnalyzeBudget(BudgetRequest),
    MarketResearch(MarketResearchRequest),
    CompetitorAnalysis(CompetitorRequest),
    NewsSearch(NewsQuery),
    SwotAnalysis(SwotRequest),
    LearningPath(LearningPathRequest),
    FindCourses(CourseQuery),
    StudySchedule(StudyScheduleRequest),
    CurrentWeather(LocationQuery),
    WeatherForecast(ForecastQuery),
    TravelWeather(TravelWeatherRequest),
    GeneralResearch(GeneralResearchRequest),
}

fn decode<T: DeserializeOwned>(task_type: &str, params: &Value) -> Result<T, AgentError> {
    serde_json::from_value(params.clone())
        .map_err(|e| AgentError::InvalidParameters(format!("{}: {}", task_type, e)))
}

fn invalid(task_type: &str, message: impl std::fmt::Display) -> AgentError {
    AgentError::InvalidParameters(format!("{}: {}", task_type, message))
}

fn hours_per_week(task_type: &str, hours: f64) -> Result<(), AgentError> {
    if !HOURS_PER_WEEK_RANGE.contains(&hours) {
        return Err(invalid(
            task_type,
            format!(
                "`hoursPerWeek` must be between {} and {}",
                HOURS_PER_WEEK_RANGE.start(),
                HOURS_PER_WEEK_RANGE.end()
            ),
        ));
    }
    Ok(())
}

fn require_text(task_type: &str, field: &str, value: &str) -> Result<(), AgentError> {
    if value.trim().is_empty() {
        return Err(invalid(task_type, format!("`{}` must not be empty", field)));
    }
    Ok(())
}

/// Normalize an ISO 4217 code to upper case, rejecting anything that is not
/// three ASCII letters.
fn currency_code(task_type: &str, field: &str, code: &str) -> Result<String, AgentError> {
    let code = code.trim().to_ascii_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid(
            task_type,
            format!("`{}` must be a 3-letter currency code", field),
        ));
    }
    Ok(code)
}

impl TaskParams {
    /// Interpret a raw parameter bag for `task_type`.
    ///
    /// Unmapped task types become [`TaskParams::GeneralResearch`]; the query
    /// is taken from `query`, then `topic`, then the task type itself.
    pub fn parse(task_type: &str, params: &Value) -> Result<Self, AgentError> {
        if !params.is_object() {
            return Err(invalid(task_type, "parameters must be an object"));
        }

        let Ok(kind) = task_type.parse::<TaskKind>() else {
            let query = ["query", "topic", "subject"]
                .iter()
                .find_map(|key| params.get(*key).and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| task_type.to_string());
            return Ok(Self::GeneralResearch(GeneralResearchRequest {
                task_type: task_type.to_string(),
                query,
            }));
        };

        let parsed = match kind {
            TaskKind::SearchFlights => {
                let mut p: FlightSearch = decode(task_type, params)?;
                require_text(task_type, "origin", &p.origin)?;
                require_text(task_type, "destination", &p.destination)?;
                if p.adults == 0 {
                    return Err(invalid(task_type, "`adults` must be at least 1"));
                }
                if let Some(ret) = p.return_date {
                    if ret < p.departure_date {
                        return Err(invalid(task_type, "`returnDate` is before `departureDate`"));
                    }
                }
                p.origin = p.origin.trim().to_ascii_uppercase();
                p.destination = p.destination.trim().to_ascii_uppercase();
                p.currency = currency_code(task_type, "currency", &p.currency)?;
                Self::SearchFlights(p)
            }
            TaskKind::SearchHotels => {
                let mut p: HotelSearch = decode(task_type, params)?;
                require_text(task_type, "destination", &p.destination)?;
                if p.check_out <= p.check_in {
                    return Err(invalid(task_type, "`checkOut` must be after `checkIn`"));
                }
                p.currency = currency_code(task_type, "currency", &p.currency)?;
                Self::SearchHotels(p)
            }
            TaskKind::GetVisaRequirements => {
                let p: VisaQuery = decode(task_type, params)?;
                require_text(task_type, "nationality", &p.nationality)?;
                require_text(task_type, "destination", &p.destination)?;
                Self::VisaRequirements(p)
            }
            TaskKind::PlanItinerary => {
                let p: ItineraryRequest = decode(task_type, params)?;
                require_text(task_type, "destination", &p.destination)?;
                if p.days == 0 || p.days > 30 {
                    return Err(invalid(task_type, "`days` must be between 1 and 30"));
                }
                Self::PlanItinerary(p)
            }
            TaskKind::ConvertCurrency => {
                let mut p: CurrencyConversion = decode(task_type, params)?;
                if !p.amount.is_finite() || p.amount <= 0.0 {
                    return Err(invalid(task_type, "`amount` must be a positive number"));
                }
                p.from_currency = currency_code(task_type, "fromCurrency", &p.from_currency)?;
                p.to_currency = currency_code(task_type, "toCurrency", &p.to_currency)?;
                Self::ConvertCurrency(p)
            }
            TaskKind::CreateSavingsPlan => {
                let p: SavingsPlanRequest = decode(task_type, params)?;
                if p.target_amount <= 0.0 {
                    return Err(invalid(task_type, "`targetAmount` must be positive"));
                }
                if p.current_savings < 0.0 {
                    return Err(invalid(task_type, "`currentSavings` must not be negative"));
                }
                if p.target_date.is_none() && p.months.unwrap_or(0) == 0 {
                    return Err(invalid(task_type, "either `targetDate` or `months` is required"));
                }
                Self::SavingsPlan(p)
            }
            TaskKind::GetInvestmentAdvice => {
                let mut p: InvestmentRequest = decode(task_type, params)?;
                if p.amount <= 0.0 {
                    return Err(invalid(task_type, "`amount` must be positive"));
                }
                p.symbols = p
                    .symbols
                    .iter()
                    .map(|s| s.trim().to_ascii_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect();
                Self::InvestmentAdvice(p)
            }
            TaskKind::AnalyzeBudget => {
                let p: BudgetRequest = decode(task_type, params)?;
                if p.monthly_income <= 0.0 {
                    return Err(invalid(task_type, "`monthlyIncome` must be positive"));
                }
                if p.expenses.values().any(|v| *v < 0.0) {
                    return Err(invalid(task_type, "expenses must not be negative"));
                }
                Self::AnalyzeBudget(p)
            }
            TaskKind::MarketResearch => {
                let p: MarketResearchRequest = decode(task_type, params)?;
                require_text(task_type, "industry", &p.industry)?;
                Self::MarketResearch(p)
            }
            TaskKind::CompetitorAnalysis => {
                let p: CompetitorRequest = decode(task_type, params)?;
                require_text(task_type, "company", &p.company)?;
                Self::CompetitorAnalysis(p)
            }
            TaskKind::NewsSearch => {
                let mut p: NewsQuery = decode(task_type, params)?;
                require_text(task_type, "query", &p.query)?;
                p.limit = p.limit.clamp(1, 50);
                Self::NewsSearch(p)
            }
            TaskKind::SwotAnalysis => {
                let p: SwotRequest = decode(task_type, params)?;
                require_text(task_type, "subject", &p.subject)?;
                Self::SwotAnalysis(p)
            }
            TaskKind::CreateLearningPath => {
                let p: LearningPathRequest = decode(task_type, params)?;
                require_text(task_type, "skill", &p.skill)?;
                hours_per_week(task_type, p.hours_per_week)?;
                Self::LearningPath(p)
            }
            TaskKind::FindCourses => {
                let mut p: CourseQuery = decode(task_type, params)?;
                require_text(task_type, "topic", &p.topic)?;
                p.limit = p.limit.clamp(1, 25);
                Self::FindCourses(p)
            }
            TaskKind::CreateStudySchedule => {
                let p: StudyScheduleRequest = decode(task_type, params)?;
                if p.topics.iter().all(|t| t.trim().is_empty()) {
                    return Err(invalid(task_type, "`topics` must contain at least one topic"));
                }
                if p.weeks == 0 || p.weeks > MAX_SCHEDULE_WEEKS {
                    return Err(invalid(
                        task_type,
                        format!("`weeks` must be between 1 and {}", MAX_SCHEDULE_WEEKS),
                    ));
                }
                hours_per_week(task_type, p.hours_per_week)?;
                Self::StudySchedule(p)
            }
            TaskKind::GetCurrentWeather => {
                let p: LocationQuery = decode(task_type, params)?;
                require_text(task_type, "location", &p.location)?;
                Self::CurrentWeather(p)
            }
            TaskKind::GetWeatherForecast => {
                let mut p: ForecastQuery = decode(task_type, params)?;
                require_text(task_type, "location", &p.location)?;
                p.days = p.days.clamp(1, 10);
                Self::WeatherForecast(p)
            }
            TaskKind::GetTravelWeather => {
                let p: TravelWeatherRequest = decode(task_type, params)?;
                require_text(task_type, "destination", &p.destination)?;
                if let Some(end) = p.end_date {
                    if end < p.start_date {
                        return Err(invalid(task_type, "`endDate` is before `startDate`"));
                    }
                }
                Self::TravelWeather(p)
            }
        };

        Ok(parsed)
    }

    /// Task kind this variant was parsed from; `None` for general research.
    pub fn kind(&self) -> Option<TaskKind> {
        Some(match self {
            Self::SearchFlights(_) => TaskKind::SearchFlights,
            Self::SearchHotels(_) => TaskKind::SearchHotels,
            Self::VisaRequirements(_) => TaskKind::GetVisaRequirements,
            Self::PlanItinerary(_) => TaskKind::PlanItinerary,
            Self::ConvertCurrency(_) => TaskKind::ConvertCurrency,
            Self::SavingsPlan(_) => TaskKind::CreateSavingsPlan,
            Self::InvestmentAdvice(_) => TaskKind::GetInvestmentAdvice,
            Self::AnalyzeBudget(_) => TaskKind::AnalyzeBudget,
            Self::MarketResearch(_) => TaskKind::MarketResearch,
            Self::CompetitorAnalysis(_) => TaskKind::CompetitorAnalysis,
            Self::NewsSearch(_) => TaskKind::NewsSearch,
            Self::SwotAnalysis(_) => TaskKind::SwotAnalysis,
            Self::LearningPath(_) => TaskKind::CreateLearningPath,
            Self::FindCourses(_) => TaskKind::FindCourses,
            Self::StudySchedule(_) => TaskKind::CreateStudySchedule,
            Self::CurrentWeather(_) => TaskKind::GetCurrentWeather,
            Self::WeatherForecast(_) => TaskKind::GetWeatherForecast,
            Self::TravelWeather(_) => TaskKind::GetTravelWeather,
            Self::GeneralResearch(_) => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_currency_codes_normalized() {
        let params = TaskParams::parse(
            "convertCurrency",
            &json!({"amount": 25, "fromCurrency": "usd", "toCurrency": " eur "}),
        )
        .unwrap();

        match params {
            TaskParams::ConvertCurrency(p) => {
                assert_eq!(p.from_currency, "USD");
                assert_eq!(p.to_currency, "EUR");
                assert_eq!(p.amount, 25.0);
            }
            other => panic!("unexpected params: {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let err = TaskParams::parse("convertCurrency", &json!({"amount": 10})).unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters(_)));
        assert!(err.to_string().contains("convertCurrency"));
    }

    #[test]
    fn test_non_object_bag_is_rejected() {
        assert!(TaskParams::parse("newsSearch", &json!(["query"])).is_err());
        assert!(TaskParams::parse("unknownThing", &json!("text")).is_err());
    }

    #[test]
    fn test_negative_amount_rejected() {
        let err = TaskParams::parse(
            "convertCurrency",
            &json!({"amount": -5, "fromCurrency": "USD", "toCurrency": "EUR"}),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_hotel_dates_validated() {
        let err = TaskParams::parse(
            "searchHotels",
            &json!({"destination": "Lisbon", "checkIn": "2026-05-03", "checkOut": "2026-05-01"}),
        );
        assert!(err.is_err());

        let ok = TaskParams::parse(
            "searchHotels",
            &json!({"city": "Lisbon", "checkIn": "2026-05-01", "checkOut": "2026-05-04"}),
        )
        .unwrap();
        match ok {
            TaskParams::SearchHotels(h) => {
                assert_eq!(h.nights(), 3);
                assert_eq!(h.guests, 1);
            }
            other => panic!("unexpected params: {:?}", other),
        }
    }

    #[test]
    fn test_savings_plan_needs_horizon() {
        let err = TaskParams::parse("createSavingsPlan", &json!({"targetAmount": 5000}));
        assert!(err.is_err());

        let ok = TaskParams::parse("createSavingsPlan", &json!({"targetAmount": 5000, "months": 10}));
        assert!(ok.is_ok());
    }

    #[test]
    fn test_unknown_task_becomes_general_research() {
        let params = TaskParams::parse("trainForMarathon", &json!({"topic": "marathon plans"})).unwrap();
        assert_eq!(
            params,
            TaskParams::GeneralResearch(GeneralResearchRequest {
                task_type: "trainForMarathon".to_string(),
                query: "marathon plans".to_string(),
            })
        );
        assert_eq!(params.kind(), None);

        let bare = TaskParams::parse("trainForMarathon", &json!({})).unwrap();
        match bare {
            TaskParams::GeneralResearch(r) => assert_eq!(r.query, "trainForMarathon"),
            other => panic!("unexpected params: {:?}", other),
        }
    }

    #[test]
    fn test_study_hours_bounded() {
        for hours in [0.0, 1e-9, 0.4, 80.5, 1e12] {
            let path = TaskParams::parse(
                "createLearningPath",
                &json!({"skill": "x", "currentLevel": "beginner", "targetLevel": "advanced", "hoursPerWeek": hours}),
            );
            assert!(matches!(path, Err(AgentError::InvalidParameters(_))), "path accepted {}", hours);

            let schedule = TaskParams::parse(
                "createStudySchedule",
                &json!({"topics": ["rust"], "weeks": 4, "hoursPerWeek": hours}),
            );
            assert!(matches!(schedule, Err(AgentError::InvalidParameters(_))), "schedule accepted {}", hours);
        }

        assert!(TaskParams::parse("createLearningPath", &json!({"skill": "x", "hoursPerWeek": 0.5})).is_ok());
        assert!(TaskParams::parse(
            "createStudySchedule",
            &json!({"topics": ["rust"], "weeks": 4, "hoursPerWeek": 80}),
        )
        .is_ok());
    }

    #[test]
    fn test_schedule_weeks_bounded() {
        let parse = |weeks: u64| {
            TaskParams::parse("createStudySchedule", &json!({"topics": ["rust"], "weeks": weeks}))
        };
        assert!(parse(0).is_err());
        assert!(parse(105).is_err());
        assert!(parse(4_000_000_000).is_err());
        assert!(parse(104).is_ok());
    }

    #[test]
    fn test_forecast_days_clamped() {
        let params =
            TaskParams::parse("getWeatherForecast", &json!({"location": "Oslo", "days": 40})).unwrap();
        match params {
            TaskParams::WeatherForecast(f) => assert_eq!(f.days, 10),
            other => panic!("unexpected params: {:?}", other),
        }
    }

    #[test]
    fn test_every_kind_reports_itself() {
        let params = TaskParams::parse(
            "searchFlights",
            &json!({"origin": "jfk", "destination": "lhr", "departureDate": "2026-06-01"}),
        )
        .unwrap();
        assert_eq!(params.kind(), Some(TaskKind::SearchFlights));
        match params {
            TaskParams::SearchFlights(f) => {
                assert_eq!(f.origin, "JFK");
                assert_eq!(f.adults, 1);
            }
            other => panic!("unexpected params: {:?}", other),
        }
    }
}
