//! Weather agent: current conditions, forecasts and trip weather.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};

use super::{
    unsupported, AgentError, AgentResult, AgentType, Capability, Credential, CredentialSet,
    DomainAgent, ParamSpec, ParamType, Provenance, SharedKeys,
};
use crate::cascade::{round2, seeded_rng, Cascade};
use crate::providers::weather::{CurrentConditions, DailyForecast, OpenWeatherMap, WeatherApi};
use crate::task::{ForecastQuery, LocationQuery, Task, TaskParams, TravelWeatherRequest, Units};

const CONDITIONS: [&str; 6] = [
    "clear sky",
    "few clouds",
    "scattered clouds",
    "overcast clouds",
    "light rain",
    "moderate rain",
];

/// Longest forecast any tier can produce, in days.
const MAX_FORECAST_DAYS: u32 = 10;
const MAX_OUTLOOK_DAYS: u32 = MAX_FORECAST_DAYS * 3;

pub struct WeatherAgent {
    credentials: CredentialSet,
    current: Cascade<LocationQuery, CurrentConditions>,
    forecast: Cascade<ForecastQuery, Vec<DailyForecast>>,
}

impl WeatherAgent {
    pub fn new(http: reqwest::Client, shared: SharedKeys) -> Self {
        Self {
            credentials: CredentialSet::new(shared),
            current: Cascade::new("weather_current")
                .tier(Arc::new(OpenWeatherMap::new(http.clone())))
                .tier(Arc::new(WeatherApi::new(http.clone()))),
            forecast: Cascade::new("weather_forecast")
                .tier(Arc::new(OpenWeatherMap::new(http.clone())))
                .tier(Arc::new(WeatherApi::new(http))),
        }
    }

    async fn current_weather(&self, query: &LocationQuery, trail: &mut Provenance) -> Value {
        let retrieved = self.current.run(query, &self.credentials, synthetic_current).await;
        trail.note(&retrieved);
        json!({
            "current": retrieved.value,
            "provider": retrieved.source.label(),
            "dataSource": trail.data_source(),
        })
    }

    async fn weather_forecast(&self, query: &ForecastQuery, trail: &mut Provenance) -> Value {
        let retrieved = self.forecast.run(query, &self.credentials, synthetic_forecast).await;
        trail.note(&retrieved);
        json!({
            "location": query.location,
            "units": query.units,
            "days": retrieved.value,
            "provider": retrieved.source.label(),
            "dataSource": trail.data_source(),
        })
    }

    async fn travel_weather(&self, request: &TravelWeatherRequest, trail: &mut Provenance) -> Value {
        let end = request.end_date.unwrap_or(request.start_date);
        let trip_days = ((end - request.start_date).num_days() + 1)
            .clamp(1, MAX_OUTLOOK_DAYS as i64) as u32;
        let today = Utc::now().date_naive();
        let lead_days = (request.start_date - today)
            .num_days()
            .clamp(0, MAX_FORECAST_DAYS as i64) as u32;

        // Providers forecast from today, so request enough days to cover the trip.
        let query = ForecastQuery {
            location: request.destination.clone(),
            days: (lead_days + trip_days).clamp(1, MAX_FORECAST_DAYS),
            units: request.units,
        };
        let retrieved = self.forecast.run(&query, &self.credentials, synthetic_forecast).await;
        trail.note(&retrieved);

        let start = request.start_date.to_string();
        let finish = end.to_string();
        let mut trip: Vec<DailyForecast> = retrieved
            .value
            .iter()
            .filter(|d| d.date >= start && d.date <= finish)
            .cloned()
            .collect();
        let beyond_range = trip.is_empty();
        if beyond_range {
            // Trip is outside the forecast window; use a seasonal outlook instead.
            trip = outlook(&request.destination, request.start_date, trip_days, request.units);
        }

        json!({
            "destination": request.destination,
            "startDate": request.start_date,
            "endDate": end,
            "forecast": trip,
            "outlookOnly": beyond_range,
            "packing": packing_list(&trip, request.units),
            "provider": retrieved.source.label(),
            "dataSource": trail.data_source(),
        })
    }
}

#[async_trait]
impl DomainAgent for WeatherAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Weather
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![
            Capability::new("getCurrentWeather", "Current conditions for a location")
                .param("location", ParamSpec::required(ParamType::String))
                .param("units", ParamSpec::with_default(ParamType::String, json!("metric"))),
            Capability::new("getWeatherForecast", "Daily forecast for a location")
                .param("location", ParamSpec::required(ParamType::String))
                .param("days", ParamSpec::with_default(ParamType::Integer, json!(5)))
                .param("units", ParamSpec::with_default(ParamType::String, json!("metric"))),
            Capability::new("getTravelWeather", "Trip forecast with packing suggestions")
                .param("destination", ParamSpec::required(ParamType::String))
                .param("startDate", ParamSpec::required(ParamType::String))
                .param("endDate", ParamSpec::optional(ParamType::String))
                .param("units", ParamSpec::with_default(ParamType::String, json!("metric"))),
        ]
    }

    async fn execute_task(&self, task: &Task) -> Result<AgentResult, AgentError> {
        let params = TaskParams::parse(&task.task_type, &task.parameters)?;
        let mut trail = Provenance::default();

        let (data, confidence) = match params {
            TaskParams::CurrentWeather(q) => (self.current_weather(&q, &mut trail).await, 0.9),
            TaskParams::WeatherForecast(q) => (self.weather_forecast(&q, &mut trail).await, 0.8),
            TaskParams::TravelWeather(r) => (self.travel_weather(&r, &mut trail).await, 0.7),
            _ => return Err(unsupported(AgentType::Weather, task)),
        };

        Ok(trail.finish(AgentType::Weather, &task.task_type, data, confidence))
    }

    fn set_api_credentials(&mut self, provider: &str, credential: Credential) {
        self.credentials.insert(provider, credential);
    }

    fn api_credentials(&self, provider: &str) -> Option<&Credential> {
        self.credentials.get(provider)
    }
}

fn to_units(celsius: f64, units: Units) -> f64 {
    match units {
        Units::Metric => round2(celsius),
        Units::Imperial => round2(celsius * 9.0 / 5.0 + 32.0),
    }
}

/// Baseline temperature for a location, stable across calls.
fn base_celsius(rng: &mut StdRng) -> f64 {
    rng.gen_range(4.0..28.0)
}

fn synthetic_current(query: &LocationQuery) -> CurrentConditions {
    let mut rng = seeded_rng(&query.location.to_lowercase());
    let temp = base_celsius(&mut rng);
    let wind_ms = rng.gen_range(0.5..9.0);
    CurrentConditions {
        location: query.location.clone(),
        temperature: to_units(temp, query.units),
        feels_like: to_units(temp - rng.gen_range(0.0..3.0), query.units),
        humidity: rng.gen_range(35.0..90.0) as u32,
        wind_speed: match query.units {
            Units::Metric => round2(wind_ms),
            Units::Imperial => round2(wind_ms * 2.237),
        },
        description: CONDITIONS.choose(&mut rng).copied().unwrap_or(CONDITIONS[0]).to_string(),
        units: query.units,
    }
}

fn daily_series(location: &str, from: NaiveDate, days: u32, units: Units) -> Vec<DailyForecast> {
    let mut rng = seeded_rng(&location.to_lowercase());
    let base = base_celsius(&mut rng);

    // Series ends early rather than past the last representable date.
    (0..days)
        .map_while(|offset| from.checked_add_signed(Duration::days(offset as i64)))
        .map(|date| {
            let high = base + rng.gen_range(-3.0..4.0);
            let low = high - rng.gen_range(5.0..10.0);
            let description = CONDITIONS.choose(&mut rng).copied().unwrap_or(CONDITIONS[0]);
            let rain = if description.contains("rain") {
                rng.gen_range(55.0..95.0)
            } else {
                rng.gen_range(0.0..30.0)
            };
            DailyForecast {
                date: date.to_string(),
                temp_min: to_units(low, units),
                temp_max: to_units(high, units),
                precipitation_chance: rain as u32,
                description: description.to_string(),
            }
        })
        .collect()
}

fn synthetic_forecast(query: &ForecastQuery) -> Vec<DailyForecast> {
    daily_series(&query.location, Utc::now().date_naive(), query.days, query.units)
}

fn outlook(location: &str, start: NaiveDate, days: u32, units: Units) -> Vec<DailyForecast> {
    daily_series(location, start, days.min(MAX_OUTLOOK_DAYS), units)
}

fn packing_list(days: &[DailyForecast], units: Units) -> Vec<&'static str> {
    let to_c = |t: f64| match units {
        Units::Metric => t,
        Units::Imperial => (t - 32.0) * 5.0 / 9.0,
    };
    let coldest = days.iter().map(|d| to_c(d.temp_min)).fold(f64::INFINITY, f64::min);
    let warmest = days.iter().map(|d| to_c(d.temp_max)).fold(f64::NEG_INFINITY, f64::max);
    let wet = days.iter().any(|d| d.precipitation_chance >= 50);

    let mut items = vec!["Comfortable walking shoes"];
    if coldest < 5.0 {
        items.push("Warm coat, hat and gloves");
    } else if coldest < 14.0 {
        items.push("Light jacket or sweater");
    }
    if warmest > 25.0 {
        items.push("Sunscreen and sunglasses");
        items.push("Breathable summer clothing");
    }
    if wet {
        items.push("Umbrella or rain jacket");
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::testing::FakeProvider;
    use serde_json::json;

    fn agent() -> WeatherAgent {
        WeatherAgent::new(reqwest::Client::new(), SharedKeys::default())
    }

    #[tokio::test]
    async fn test_forecast_defaults_to_five_synthetic_days() {
        let result = agent()
            .execute_task(&Task::new("g", "u", "getWeatherForecast", json!({"location": "Reykjavik"})))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.is_fallback());
        let days = result.data["days"].as_array().unwrap();
        assert_eq!(days.len(), 5);
        for day in days {
            assert!(day["tempMin"].as_f64().unwrap() <= day["tempMax"].as_f64().unwrap());
        }
    }

    #[tokio::test]
    async fn test_current_weather_fallback_in_imperial() {
        let metric = synthetic_current(&LocationQuery {
            location: "Madrid".to_string(),
            units: Units::Metric,
        });
        let result = agent()
            .execute_task(&Task::new(
                "g",
                "u",
                "getCurrentWeather",
                json!({"city": "Madrid", "units": "imperial"}),
            ))
            .await
            .unwrap();

        let fahrenheit = result.data["current"]["temperature"].as_f64().unwrap();
        assert!((fahrenheit - (metric.temperature * 9.0 / 5.0 + 32.0)).abs() < 0.05);
        assert_eq!(result.data["current"]["units"], "imperial");
    }

    #[tokio::test]
    async fn test_secondary_provider_answers_when_primary_lacks_key() {
        let now = CurrentConditions {
            location: "Lima".to_string(),
            temperature: 19.0,
            feels_like: 18.0,
            humidity: 80,
            wind_speed: 3.0,
            description: "mist".to_string(),
            units: Units::Metric,
        };
        let primary = FakeProvider::ok("openweathermap", now.clone());
        let secondary = FakeProvider::ok("weatherapi", now);

        let mut agent = agent();
        agent.current = Cascade::new("weather_current")
            .tier(primary.clone())
            .tier(secondary.clone());
        agent.set_api_credentials("weatherapi", Credential::new("weatherapi", "key", "k"));

        let result = agent
            .execute_task(&Task::new("g", "u", "getCurrentWeather", json!({"location": "Lima"})))
            .await
            .unwrap();

        assert_eq!(result.data["provider"], "weatherapi");
        assert_eq!(primary.calls(), 0);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_travel_weather_covers_trip() {
        let start = Utc::now().date_naive() + Duration::days(1);
        let end = start + Duration::days(2);
        let result = agent()
            .execute_task(&Task::new(
                "g",
                "u",
                "getTravelWeather",
                json!({"destination": "Rome", "startDate": start, "endDate": end}),
            ))
            .await
            .unwrap();

        assert_eq!(result.data["forecast"].as_array().unwrap().len(), 3);
        assert_eq!(result.data["outlookOnly"], false);
        assert!(!result.data["packing"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_distant_trip_uses_outlook() {
        let start = Utc::now().date_naive() + Duration::days(60);
        let result = agent()
            .execute_task(&Task::new(
                "g",
                "u",
                "getTravelWeather",
                json!({"destination": "Cairo", "startDate": start, "endDate": start + Duration::days(4)}),
            ))
            .await
            .unwrap();

        assert_eq!(result.data["outlookOnly"], true);
        assert_eq!(result.data["forecast"].as_array().unwrap().len(), 5);
        assert_eq!(result.data["forecast"][0]["date"], start.to_string());
    }

    #[test]
    fn test_series_stops_at_last_date() {
        let days = daily_series("Rome", NaiveDate::MAX - Duration::days(2), 10, Units::Metric);
        assert_eq!(days.len(), 3);
        assert_eq!(days[2].date, NaiveDate::MAX.to_string());

        let trip = outlook("Rome", NaiveDate::MAX, 5, Units::Metric);
        assert_eq!(trip.len(), 1);
    }

    #[test]
    fn test_packing_for_cold_wet_trip() {
        let days = vec![DailyForecast {
            date: "2026-01-10".to_string(),
            temp_min: 28.0,
            temp_max: 35.0,
            precipitation_chance: 70,
            description: "light rain".to_string(),
        }];
        let items = packing_list(&days, Units::Imperial);
        assert!(items.contains(&"Warm coat, hat and gloves"));
        assert!(items.contains(&"Umbrella or rain jacket"));
        assert!(!items.contains(&"Sunscreen and sunglasses"));
    }
}
