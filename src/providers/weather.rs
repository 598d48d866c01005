//! Current-conditions and forecast providers.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{normalize_base, read_json};
use crate::cascade::{Provider, ProviderError};
use crate::task::{ForecastQuery, LocationQuery, Units};

const OPENWEATHER_URL: &str = "https://api.openweathermap.org";
const WEATHERAPI_URL: &str = "https://api.weatherapi.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentConditions {
    pub location: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: u32,
    pub wind_speed: f64,
    pub description: String,
    pub units: Units,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyForecast {
    pub date: String,
    pub temp_min: f64,
    pub temp_max: f64,
    /// Probability of precipitation, 0-100.
    pub precipitation_chance: u32,
    pub description: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenWeatherMap
// ─────────────────────────────────────────────────────────────────────────────

pub struct OpenWeatherMap {
    client: reqwest::Client,
    base_url: String,
}

impl OpenWeatherMap {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, OPENWEATHER_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: normalize_base(base_url),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OwmCurrent {
    name: String,
    main: OwmMain,
    wind: OwmWind,
    #[serde(default)]
    weather: Vec<OwmWeather>,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    feels_like: f64,
    #[serde(default)]
    temp_min: f64,
    #[serde(default)]
    temp_max: f64,
    humidity: u32,
}

#[derive(Debug, Deserialize)]
struct OwmWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwmWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwmForecast {
    #[serde(default)]
    list: Vec<OwmSlot>,
}

#[derive(Debug, Deserialize)]
struct OwmSlot {
    dt_txt: String,
    main: OwmMain,
    #[serde(default)]
    pop: f64,
    #[serde(default)]
    weather: Vec<OwmWeather>,
}

#[async_trait]
impl Provider<LocationQuery, CurrentConditions> for OpenWeatherMap {
    fn name(&self) -> &str {
        "openweathermap"
    }

    async fn fetch(&self, query: &LocationQuery, api_key: &str) -> Result<CurrentConditions, ProviderError> {
        let response = self
            .client
            .get(format!("{}/data/2.5/weather", self.base_url))
            .query(&[
                ("q", query.location.as_str()),
                ("units", query.units.as_str()),
                ("appid", api_key),
            ])
            .send()
            .await?;
        let parsed: OwmCurrent = read_json(response).await?;

        Ok(CurrentConditions {
            location: parsed.name,
            temperature: parsed.main.temp,
            feels_like: parsed.main.feels_like,
            humidity: parsed.main.humidity,
            wind_speed: parsed.wind.speed,
            description: parsed
                .weather
                .into_iter()
                .next()
                .map(|w| w.description)
                .unwrap_or_default(),
            units: query.units,
        })
    }
}

#[async_trait]
impl Provider<ForecastQuery, Vec<DailyForecast>> for OpenWeatherMap {
    fn name(&self) -> &str {
        "openweathermap"
    }

    async fn fetch(&self, query: &ForecastQuery, api_key: &str) -> Result<Vec<DailyForecast>, ProviderError> {
        let response = self
            .client
            .get(format!("{}/data/2.5/forecast", self.base_url))
            .query(&[
                ("q", query.location.as_str()),
                ("units", query.units.as_str()),
                ("appid", api_key),
            ])
            .send()
            .await?;
        let parsed: OwmForecast = read_json(response).await?;

        // The free endpoint returns 3-hour slots; fold them into days.
        let mut days: BTreeMap<String, DailyForecast> = BTreeMap::new();
        for slot in parsed.list {
            let date = slot.dt_txt.split(' ').next().unwrap_or_default().to_string();
            let chance = (slot.pop * 100.0).round() as u32;
            let description = slot
                .weather
                .into_iter()
                .next()
                .map(|w| w.description)
                .unwrap_or_default();
            days.entry(date.clone())
                .and_modify(|d| {
                    d.temp_min = d.temp_min.min(slot.main.temp_min);
                    d.temp_max = d.temp_max.max(slot.main.temp_max);
                    d.precipitation_chance = d.precipitation_chance.max(chance);
                })
                .or_insert(DailyForecast {
                    date,
                    temp_min: slot.main.temp_min,
                    temp_max: slot.main.temp_max,
                    precipitation_chance: chance,
                    description,
                });
        }

        let forecast: Vec<DailyForecast> = days.into_values().take(query.days as usize).collect();
        if forecast.is_empty() {
            return Err(ProviderError::malformed("empty forecast"));
        }
        Ok(forecast)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WeatherAPI.com
// ─────────────────────────────────────────────────────────────────────────────

pub struct WeatherApi {
    client: reqwest::Client,
    base_url: String,
}

impl WeatherApi {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, WEATHERAPI_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: normalize_base(base_url),
        }
    }

    async fn forecast_json(&self, location: &str, days: u32, api_key: &str) -> Result<WapiResponse, ProviderError> {
        let response = self
            .client
            .get(format!("{}/v1/forecast.json", self.base_url))
            .query(&[("key", api_key), ("q", location)])
            .query(&[("days", days)])
            .send()
            .await?;
        read_json(response).await
    }
}

#[derive(Debug, Deserialize)]
struct WapiResponse {
    location: WapiLocation,
    current: WapiCurrent,
    forecast: Option<WapiForecast>,
}

#[derive(Debug, Deserialize)]
struct WapiLocation {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WapiCurrent {
    temp_c: f64,
    temp_f: f64,
    feelslike_c: f64,
    feelslike_f: f64,
    humidity: u32,
    wind_kph: f64,
    wind_mph: f64,
    condition: WapiCondition,
}

#[derive(Debug, Deserialize)]
struct WapiCondition {
    text: String,
}

#[derive(Debug, Deserialize)]
struct WapiForecast {
    #[serde(default)]
    forecastday: Vec<WapiDay>,
}

#[derive(Debug, Deserialize)]
struct WapiDay {
    date: String,
    day: WapiDayDetail,
}

#[derive(Debug, Deserialize)]
struct WapiDayDetail {
    mintemp_c: f64,
    maxtemp_c: f64,
    mintemp_f: f64,
    maxtemp_f: f64,
    #[serde(default)]
    daily_chance_of_rain: u32,
    condition: WapiCondition,
}

#[async_trait]
impl Provider<LocationQuery, CurrentConditions> for WeatherApi {
    fn name(&self) -> &str {
        "weatherapi"
    }

    async fn fetch(&self, query: &LocationQuery, api_key: &str) -> Result<CurrentConditions, ProviderError> {
        let parsed = self.forecast_json(&query.location, 1, api_key).await?;
        let c = parsed.current;
        let (temperature, feels_like, wind_speed) = match query.units {
            // WeatherAPI reports kph; metric wind is m/s elsewhere in the crate.
            Units::Metric => (c.temp_c, c.feelslike_c, crate::cascade::round2(c.wind_kph / 3.6)),
            Units::Imperial => (c.temp_f, c.feelslike_f, c.wind_mph),
        };
        Ok(CurrentConditions {
            location: parsed.location.name,
            temperature,
            feels_like,
            humidity: c.humidity,
            wind_speed,
            description: c.condition.text.to_lowercase(),
            units: query.units,
        })
    }
}

#[async_trait]
impl Provider<ForecastQuery, Vec<DailyForecast>> for WeatherApi {
    fn name(&self) -> &str {
        "weatherapi"
    }

    async fn fetch(&self, query: &ForecastQuery, api_key: &str) -> Result<Vec<DailyForecast>, ProviderError> {
        let parsed = self.forecast_json(&query.location, query.days, api_key).await?;
        let days = parsed.forecast.map(|f| f.forecastday).unwrap_or_default();
        if days.is_empty() {
            return Err(ProviderError::malformed("empty forecast"));
        }
        Ok(days
            .into_iter()
            .map(|d| {
                let (temp_min, temp_max) = match query.units {
                    Units::Metric => (d.day.mintemp_c, d.day.maxtemp_c),
                    Units::Imperial => (d.day.mintemp_f, d.day.maxtemp_f),
                };
                DailyForecast {
                    date: d.date,
                    temp_min,
                    temp_max,
                    precipitation_chance: d.day.daily_chance_of_rain.min(100),
                    description: d.day.condition.text.to_lowercase(),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_openweather_forecast_folds_slots_into_days() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/forecast"))
            .and(query_param("appid", "owm"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "list": [
                    {"dt_txt": "2026-03-01 09:00:00", "pop": 0.1,
                     "main": {"temp": 5.0, "feels_like": 3.0, "temp_min": 4.0, "temp_max": 6.0, "humidity": 70},
                     "weather": [{"description": "light rain"}]},
                    {"dt_txt": "2026-03-01 15:00:00", "pop": 0.6,
                     "main": {"temp": 9.0, "feels_like": 8.0, "temp_min": 8.5, "temp_max": 10.0, "humidity": 60},
                     "weather": [{"description": "rain"}]},
                    {"dt_txt": "2026-03-02 12:00:00", "pop": 0.0,
                     "main": {"temp": 11.0, "feels_like": 11.0, "temp_min": 10.0, "temp_max": 12.0, "humidity": 50},
                     "weather": [{"description": "clear sky"}]}
                ]
            })))
            .mount(&server)
            .await;

        let provider = OpenWeatherMap::with_base_url(reqwest::Client::new(), server.uri());
        let query = ForecastQuery {
            location: "Oslo".to_string(),
            days: 5,
            units: Units::Metric,
        };
        let days: Vec<DailyForecast> = provider.fetch(&query, "owm").await.unwrap();

        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, "2026-03-01");
        assert_eq!(days[0].temp_min, 4.0);
        assert_eq!(days[0].temp_max, 10.0);
        assert_eq!(days[0].precipitation_chance, 60);
        assert_eq!(days[1].description, "clear sky");
    }

    #[tokio::test]
    async fn test_weatherapi_current_imperial() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "location": {"name": "Denver"},
                "current": {
                    "temp_c": 20.0, "temp_f": 68.0, "feelslike_c": 19.0, "feelslike_f": 66.2,
                    "humidity": 30, "wind_kph": 18.0, "wind_mph": 11.2,
                    "condition": {"text": "Sunny"}
                }
            })))
            .mount(&server)
            .await;

        let provider = WeatherApi::with_base_url(reqwest::Client::new(), server.uri());
        let query = LocationQuery {
            location: "Denver".to_string(),
            units: Units::Imperial,
        };
        let now: CurrentConditions = provider.fetch(&query, "wapi").await.unwrap();

        assert_eq!(now.temperature, 68.0);
        assert_eq!(now.wind_speed, 11.2);
        assert_eq!(now.description, "sunny");
    }
}
