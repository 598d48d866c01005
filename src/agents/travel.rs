//! Travel agent: flights, hotels, visa rules and itineraries.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveTime};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};

use super::{
    unsupported, AgentError, AgentResult, AgentType, Capability, Credential, CredentialSet,
    DomainAgent, ParamSpec, ParamType, Provenance, SharedKeys,
};
use crate::cascade::{round2, seeded_rng, Cascade};
use crate::providers::travel::{
    BookingHotels, FlightOffer, HotelOffer, KiwiFlights, SkyscannerFlights, VisaRequirement,
    VisaRequirementsApi,
};
use crate::task::{FlightSearch, HotelSearch, ItineraryRequest, Task, TaskParams, VisaQuery};

const AIRLINES: [(&str, &str); 6] = [
    ("Delta Air Lines", "DL"),
    ("United Airlines", "UA"),
    ("British Airways", "BA"),
    ("Lufthansa", "LH"),
    ("Air France", "AF"),
    ("Emirates", "EK"),
];

const HOTEL_NAMES: [&str; 6] = [
    "Grand Central Hotel",
    "Riverside Suites",
    "Old Town Inn",
    "Harbor View Hotel",
    "City Garden Residences",
    "Plaza Boutique Hotel",
];

/// Countries whose citizens enter each other's territory without a visa for
/// short tourist stays. Codes are ISO 3166-1 alpha-2.
const SCHENGEN: [&str; 14] = [
    "AT", "BE", "CH", "DE", "DK", "ES", "FI", "FR", "GR", "IT", "NL", "NO", "PT", "SE",
];

pub struct TravelAgent {
    credentials: CredentialSet,
    flights: Cascade<FlightSearch, Vec<FlightOffer>>,
    hotels: Cascade<HotelSearch, Vec<HotelOffer>>,
    visas: Cascade<VisaQuery, VisaRequirement>,
}

impl TravelAgent {
    pub fn new(http: reqwest::Client, shared: SharedKeys) -> Self {
        Self {
            credentials: CredentialSet::new(shared),
            flights: Cascade::new("flights")
                .tier(Arc::new(SkyscannerFlights::new(http.clone())))
                .tier(Arc::new(KiwiFlights::new(http.clone()))),
            hotels: Cascade::new("hotels").tier(Arc::new(BookingHotels::new(http.clone()))),
            visas: Cascade::new("visa").tier(Arc::new(VisaRequirementsApi::new(http))),
        }
    }

    async fn search_flights(&self, query: &FlightSearch, trail: &mut Provenance) -> Value {
        let retrieved = self.flights.run(query, &self.credentials, mock_flights).await;
        trail.note(&retrieved);

        let cheapest = retrieved
            .value
            .iter()
            .map(|f| f.price)
            .fold(f64::INFINITY, f64::min);
        let cheapest = cheapest.is_finite().then_some(cheapest);
        json!({
            "origin": query.origin,
            "destination": query.destination,
            "departureDate": query.departure_date,
            "returnDate": query.return_date,
            "passengers": query.adults,
            "flights": retrieved.value,
            "cheapestPrice": cheapest,
            "currency": query.currency,
            "provider": retrieved.source.label(),
            "dataSource": trail.data_source(),
        })
    }

    async fn search_hotels(&self, query: &HotelSearch, trail: &mut Provenance) -> Value {
        let retrieved = self.hotels.run(query, &self.credentials, mock_hotels).await;
        trail.note(&retrieved);

        json!({
            "destination": query.destination,
            "checkIn": query.check_in,
            "checkOut": query.check_out,
            "nights": query.nights(),
            "guests": query.guests,
            "rooms": query.rooms,
            "hotels": retrieved.value,
            "provider": retrieved.source.label(),
            "dataSource": trail.data_source(),
        })
    }

    async fn visa_requirements(&self, query: &VisaQuery, trail: &mut Provenance) -> Value {
        let retrieved = self.visas.run(query, &self.credentials, builtin_visa_rule).await;
        trail.note(&retrieved);

        let mut documents = vec!["Passport valid for at least 6 months beyond stay"];
        if retrieved.value.visa_required {
            documents.push("Completed visa application");
            documents.push("Proof of accommodation");
            documents.push("Return or onward ticket");
        }
        json!({
            "requirement": retrieved.value,
            "purpose": query.purpose,
            "documents": documents,
            "provider": retrieved.source.label(),
            "dataSource": trail.data_source(),
        })
    }
}

#[async_trait]
impl DomainAgent for TravelAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Travel
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![
            Capability::new("searchFlights", "Search one-way or return flight offers")
                .param("origin", ParamSpec::required(ParamType::String))
                .param("destination", ParamSpec::required(ParamType::String))
                .param("departureDate", ParamSpec::required(ParamType::String))
                .param("returnDate", ParamSpec::optional(ParamType::String))
                .param("adults", ParamSpec::with_default(ParamType::Integer, json!(1)))
                .param("currency", ParamSpec::with_default(ParamType::String, json!("USD"))),
            Capability::new("searchHotels", "Search hotel offers for a stay")
                .param("destination", ParamSpec::required(ParamType::String))
                .param("checkIn", ParamSpec::required(ParamType::String))
                .param("checkOut", ParamSpec::required(ParamType::String))
                .param("guests", ParamSpec::with_default(ParamType::Integer, json!(1)))
                .param("rooms", ParamSpec::with_default(ParamType::Integer, json!(1))),
            Capability::new("getVisaRequirements", "Entry requirements for a passport and destination")
                .param("nationality", ParamSpec::required(ParamType::String))
                .param("destination", ParamSpec::required(ParamType::String))
                .param("purpose", ParamSpec::with_default(ParamType::String, json!("tourism"))),
            Capability::new("planItinerary", "Day-by-day trip outline")
                .param("destination", ParamSpec::required(ParamType::String))
                .param("startDate", ParamSpec::optional(ParamType::String))
                .param("days", ParamSpec::with_default(ParamType::Integer, json!(3)))
                .param("interests", ParamSpec::optional(ParamType::Array))
                .param("budget", ParamSpec::optional(ParamType::Number)),
        ]
    }

    async fn execute_task(&self, task: &Task) -> Result<AgentResult, AgentError> {
        let params = TaskParams::parse(&task.task_type, &task.parameters)?;
        let mut trail = Provenance::default();

        let (data, confidence) = match params {
            TaskParams::SearchFlights(q) => (self.search_flights(&q, &mut trail).await, 0.85),
            TaskParams::SearchHotels(q) => (self.search_hotels(&q, &mut trail).await, 0.85),
            TaskParams::VisaRequirements(q) => (self.visa_requirements(&q, &mut trail).await, 0.9),
            TaskParams::PlanItinerary(r) => (plan_itinerary(&r), 0.7),
            _ => return Err(unsupported(AgentType::Travel, task)),
        };

        Ok(trail.finish(AgentType::Travel, &task.task_type, data, confidence))
    }

    fn set_api_credentials(&mut self, provider: &str, credential: Credential) {
        self.credentials.insert(provider, credential);
    }

    fn api_credentials(&self, provider: &str) -> Option<&Credential> {
        self.credentials.get(provider)
    }
}

/// Two plausible offers, stable for the same route and date.
fn mock_flights(query: &FlightSearch) -> Vec<FlightOffer> {
    let seed = format!("{}-{}-{}", query.origin, query.destination, query.departure_date);
    let mut rng = seeded_rng(&seed);
    let date = query.departure_date;

    (0..2)
        .map(|i| {
            let (airline, code) = AIRLINES.choose(&mut rng).copied().unwrap_or(AIRLINES[0]);
            let departure = NaiveTime::from_hms_opt(7 + i * 6 + rng.gen_range(0..3), 0, 0)
                .unwrap_or_default();
            let duration_minutes = rng.gen_range(90.0..720.0) as u32;
            let departs = date.and_time(departure);
            let arrives = departs + Duration::minutes(duration_minutes as i64);
            let stops = i;
            FlightOffer {
                id: format!("mock-flight-{}", i + 1),
                airline: airline.to_string(),
                flight_number: Some(format!("{}{}", code, rng.gen_range(100..1000))),
                origin: query.origin.clone(),
                destination: query.destination.clone(),
                departure_time: departs.format("%Y-%m-%dT%H:%M:%S").to_string(),
                arrival_time: arrives.format("%Y-%m-%dT%H:%M:%S").to_string(),
                duration_minutes,
                stops,
                price: round2(rng.gen_range(180.0..950.0) * query.adults as f64),
                currency: query.currency.clone(),
                booking_url: None,
            }
        })
        .collect()
}

fn mock_hotels(query: &HotelSearch) -> Vec<HotelOffer> {
    let mut rng = seeded_rng(&format!("{}-{}", query.destination, query.check_in));
    let nights = query.nights() as f64;

    (0..2)
        .map(|i| {
            let nightly = round2(rng.gen_range(70.0..320.0) * query.rooms as f64);
            HotelOffer {
                id: format!("mock-hotel-{}", i + 1),
                name: format!(
                    "{} {}",
                    query.destination,
                    HOTEL_NAMES.choose(&mut rng).copied().unwrap_or(HOTEL_NAMES[0])
                ),
                rating: Some(round2(rng.gen_range(3.5..4.9))),
                price_per_night: nightly,
                total_price: round2(nightly * nights),
                currency: query.currency.clone(),
                amenities: vec!["Free WiFi".to_string(), "Breakfast available".to_string()],
            }
        })
        .collect()
}

/// Built-in rule table used when the visa API is unavailable.
fn builtin_visa_rule(query: &VisaQuery) -> VisaRequirement {
    let from = query.nationality.trim().to_ascii_uppercase();
    let to = query.destination.trim().to_ascii_uppercase();

    let (category, visa_required, max_stay_days) = if from == to {
        ("citizen", false, None)
    } else if SCHENGEN.contains(&from.as_str()) && SCHENGEN.contains(&to.as_str()) {
        ("freedom of movement", false, None)
    } else {
        match (from.as_str(), to.as_str()) {
            (_, t) if SCHENGEN.contains(&t) && matches!(from.as_str(), "US" | "CA" | "GB" | "AU" | "JP") => {
                ("visa free", false, Some(90))
            }
            ("US" | "CA" | "AU" | "JP", "GB") => ("visa free", false, Some(180)),
            (f, "US") if SCHENGEN.contains(&f) || matches!(f, "GB" | "JP" | "AU") => {
                ("electronic travel authorization", false, Some(90))
            }
            ("US" | "GB" | "CA" | "AU", "JP" | "MX") => ("visa free", false, Some(90)),
            (_, "IN") => ("e-visa", true, Some(30)),
            (_, "AU") => ("electronic travel authority", true, Some(90)),
            _ => ("visa required", true, None),
        }
    };

    VisaRequirement {
        nationality: from,
        destination: to,
        visa_required,
        category: category.to_string(),
        max_stay_days,
        notes: vec!["Rules change frequently; confirm with the destination's embassy.".to_string()],
    }
}

fn plan_itinerary(request: &ItineraryRequest) -> Value {
    let interests: Vec<&str> = if request.interests.is_empty() {
        vec!["sightseeing", "food", "culture"]
    } else {
        request.interests.iter().map(String::as_str).collect()
    };

    let days: Vec<Value> = (0..request.days)
        .map(|day| {
            let focus = interests[day as usize % interests.len()];
            let date = request.start_date.map(|d| d + Duration::days(day as i64));
            let (morning, afternoon, evening) = match day {
                0 => (
                    "Arrive and check in".to_string(),
                    format!("Orientation walk around central {}", request.destination),
                    "Dinner near the hotel".to_string(),
                ),
                d if d + 1 == request.days => (
                    "Last look at a favourite spot".to_string(),
                    "Souvenir shopping and packing".to_string(),
                    "Departure".to_string(),
                ),
                _ => (
                    format!("Morning {} activity", focus),
                    format!("Afternoon {} exploration", focus),
                    "Evening at a local restaurant".to_string(),
                ),
            };
            json!({
                "day": day + 1,
                "date": date,
                "focus": focus,
                "morning": morning,
                "afternoon": afternoon,
                "evening": evening,
            })
        })
        .collect();

    let daily_budget = request.budget.map(|b| round2(b / request.days as f64));
    json!({
        "destination": request.destination,
        "startDate": request.start_date,
        "totalDays": request.days,
        "dailyBudget": daily_budget,
        "days": days,
        "dataSource": "computed",
    })
}
