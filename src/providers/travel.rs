//! Flight, hotel and visa data providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{normalize_base, read_json, RAPIDAPI};
use crate::cascade::{Provider, ProviderError};
use crate::task::{FlightSearch, HotelSearch, VisaQuery};

const SKYSCANNER_URL: &str = "https://sky-scanner3.p.rapidapi.com";
const SKYSCANNER_HOST: &str = "sky-scanner3.p.rapidapi.com";
const KIWI_URL: &str = "https://api.tequila.kiwi.com";
const BOOKING_URL: &str = "https://booking-com15.p.rapidapi.com";
const BOOKING_HOST: &str = "booking-com15.p.rapidapi.com";
const VISA_URL: &str = "https://visa-requirement.p.rapidapi.com";
const VISA_HOST: &str = "visa-requirement.p.rapidapi.com";

/// Maximum offers returned from a live search.
const MAX_OFFERS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightOffer {
    pub id: String,
    pub airline: String,
    pub flight_number: Option<String>,
    pub origin: String,
    pub destination: String,
    pub departure_time: String,
    pub arrival_time: String,
    pub duration_minutes: u32,
    pub stops: u32,
    pub price: f64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelOffer {
    pub id: String,
    pub name: String,
    pub rating: Option<f64>,
    pub price_per_night: f64,
    pub total_price: f64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amenities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisaRequirement {
    pub nationality: String,
    pub destination: String,
    pub visa_required: bool,
    /// e.g. "visa free", "visa on arrival", "e-visa", "visa required"
    pub category: String,
    pub max_stay_days: Option<u32>,
    #[serde(default)]
    pub notes: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Skyscanner (RapidAPI)
// ─────────────────────────────────────────────────────────────────────────────

pub struct SkyscannerFlights {
    client: reqwest::Client,
    base_url: String,
}

impl SkyscannerFlights {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, SKYSCANNER_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: normalize_base(base_url),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SkyscannerResponse {
    data: SkyscannerData,
}

#[derive(Debug, Deserialize)]
struct SkyscannerData {
    #[serde(default)]
    itineraries: Vec<SkyscannerItinerary>,
}

#[derive(Debug, Deserialize)]
struct SkyscannerItinerary {
    id: String,
    price: SkyscannerPrice,
    legs: Vec<SkyscannerLeg>,
}

#[derive(Debug, Deserialize)]
struct SkyscannerPrice {
    raw: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkyscannerLeg {
    departure: String,
    arrival: String,
    duration_in_minutes: u32,
    #[serde(default)]
    stop_count: u32,
    carriers: SkyscannerCarriers,
    #[serde(default)]
    segments: Vec<SkyscannerSegment>,
}

#[derive(Debug, Deserialize)]
struct SkyscannerCarriers {
    marketing: Vec<SkyscannerCarrier>,
}

#[derive(Debug, Deserialize)]
struct SkyscannerCarrier {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkyscannerSegment {
    flight_number: Option<String>,
}

#[async_trait]
impl Provider<FlightSearch, Vec<FlightOffer>> for SkyscannerFlights {
    fn name(&self) -> &str {
        "skyscanner"
    }

    fn shared_credential(&self) -> Option<&str> {
        Some(RAPIDAPI)
    }

    async fn fetch(&self, query: &FlightSearch, api_key: &str) -> Result<Vec<FlightOffer>, ProviderError> {
        let mut params = vec![
            ("fromEntityId", query.origin.clone()),
            ("toEntityId", query.destination.clone()),
            ("departDate", query.departure_date.to_string()),
            ("adults", query.adults.to_string()),
            ("currency", query.currency.clone()),
        ];
        if let Some(cabin) = &query.cabin_class {
            params.push(("cabinClass", cabin.to_lowercase()));
        }

        let response = self
            .client
            .get(format!("{}/flights/search-one-way", self.base_url))
            .header("X-RapidAPI-Key", api_key)
            .header("X-RapidAPI-Host", SKYSCANNER_HOST)
            .query(&params)
            .send()
            .await?;
        let parsed: SkyscannerResponse = read_json(response).await?;

        let offers: Vec<FlightOffer> = parsed
            .data
            .itineraries
            .into_iter()
            .filter_map(|it| {
                let leg = it.legs.into_iter().next()?;
                let airline = leg.carriers.marketing.into_iter().next()?.name;
                Some(FlightOffer {
                    id: it.id,
                    airline,
                    flight_number: leg.segments.into_iter().find_map(|s| s.flight_number),
                    origin: query.origin.clone(),
                    destination: query.destination.clone(),
                    departure_time: leg.departure,
                    arrival_time: leg.arrival,
                    duration_minutes: leg.duration_in_minutes,
                    stops: leg.stop_count,
                    price: it.price.raw,
                    currency: query.currency.clone(),
                    booking_url: None,
                })
            })
            .take(MAX_OFFERS)
            .collect();

        if offers.is_empty() {
            return Err(ProviderError::malformed("no itineraries in response"));
        }
        Ok(offers)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Kiwi Tequila
// ─────────────────────────────────────────────────────────────────────────────

pub struct KiwiFlights {
    client: reqwest::Client,
    base_url: String,
}

impl KiwiFlights {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, KIWI_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: normalize_base(base_url),
        }
    }
}

#[derive(Debug, Deserialize)]
struct KiwiResponse {
    #[serde(default)]
    data: Vec<KiwiFlight>,
}

#[derive(Debug, Deserialize)]
struct KiwiFlight {
    id: String,
    price: f64,
    #[serde(default)]
    airlines: Vec<String>,
    #[serde(default)]
    route: Vec<KiwiRoute>,
    duration: Option<KiwiDuration>,
    deep_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KiwiRoute {
    flight_no: Option<u32>,
    airline: Option<String>,
    local_departure: String,
    local_arrival: String,
}

#[derive(Debug, Deserialize)]
struct KiwiDuration {
    departure: u64,
}

#[async_trait]
impl Provider<FlightSearch, Vec<FlightOffer>> for KiwiFlights {
    fn name(&self) -> &str {
        "kiwi"
    }

    async fn fetch(&self, query: &FlightSearch, api_key: &str) -> Result<Vec<FlightOffer>, ProviderError> {
        let date = query.departure_date.format("%d/%m/%Y").to_string();
        let response = self
            .client
            .get(format!("{}/v2/search", self.base_url))
            .header("apikey", api_key)
            .query(&[
                ("fly_from", query.origin.as_str()),
                ("fly_to", query.destination.as_str()),
                ("date_from", date.as_str()),
                ("date_to", date.as_str()),
                ("curr", query.currency.as_str()),
                ("limit", "5"),
            ])
            .query(&[("adults", query.adults)])
            .send()
            .await?;
        let parsed: KiwiResponse = read_json(response).await?;

        let offers: Vec<FlightOffer> = parsed
            .data
            .into_iter()
            .filter_map(|f| {
                let first = f.route.first()?;
                let last = f.route.last()?;
                let airline = first
                    .airline
                    .clone()
                    .or_else(|| f.airlines.first().cloned())?;
                Some(FlightOffer {
                    flight_number: first.flight_no.map(|n| format!("{}{}", airline, n)),
                    airline,
                    id: f.id,
                    origin: query.origin.clone(),
                    destination: query.destination.clone(),
                    departure_time: first.local_departure.clone(),
                    arrival_time: last.local_arrival.clone(),
                    duration_minutes: f.duration.map(|d| (d.departure / 60) as u32).unwrap_or(0),
                    stops: f.route.len().saturating_sub(1) as u32,
                    price: f.price,
                    currency: query.currency.clone(),
                    booking_url: f.deep_link,
                })
            })
            .take(MAX_OFFERS)
            .collect();

        if offers.is_empty() {
            return Err(ProviderError::malformed("no flights in response"));
        }
        Ok(offers)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Booking.com (RapidAPI)
// ─────────────────────────────────────────────────────────────────────────────

pub struct BookingHotels {
    client: reqwest::Client,
    base_url: String,
}

impl BookingHotels {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, BOOKING_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: normalize_base(base_url),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BookingDestinations {
    #[serde(default)]
    data: Vec<BookingDestination>,
}

#[derive(Debug, Deserialize)]
struct BookingDestination {
    dest_id: String,
    search_type: String,
}

#[derive(Debug, Deserialize)]
struct BookingHotelsResponse {
    data: BookingHotelsData,
}

#[derive(Debug, Deserialize)]
struct BookingHotelsData {
    #[serde(default)]
    hotels: Vec<BookingHotel>,
}

#[derive(Debug, Deserialize)]
struct BookingHotel {
    hotel_id: u64,
    property: BookingProperty,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookingProperty {
    name: String,
    review_score: Option<f64>,
    price_breakdown: BookingPriceBreakdown,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookingPriceBreakdown {
    gross_price: BookingPrice,
}

#[derive(Debug, Deserialize)]
struct BookingPrice {
    value: f64,
    currency: String,
}

#[async_trait]
impl Provider<HotelSearch, Vec<HotelOffer>> for BookingHotels {
    fn name(&self) -> &str {
        "booking"
    }

    fn shared_credential(&self) -> Option<&str> {
        Some(RAPIDAPI)
    }

    async fn fetch(&self, query: &HotelSearch, api_key: &str) -> Result<Vec<HotelOffer>, ProviderError> {
        let response = self
            .client
            .get(format!("{}/api/v1/hotels/searchDestination", self.base_url))
            .header("X-RapidAPI-Key", api_key)
            .header("X-RapidAPI-Host", BOOKING_HOST)
            .query(&[("query", query.destination.as_str())])
            .send()
            .await?;
        let destinations: BookingDestinations = read_json(response).await?;
        let destination = destinations
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::malformed("destination not found"))?;

        let response = self
            .client
            .get(format!("{}/api/v1/hotels/searchHotels", self.base_url))
            .header("X-RapidAPI-Key", api_key)
            .header("X-RapidAPI-Host", BOOKING_HOST)
            .query(&[
                ("dest_id", destination.dest_id),
                ("search_type", destination.search_type),
                ("arrival_date", query.check_in.to_string()),
                ("departure_date", query.check_out.to_string()),
                ("adults", query.guests.to_string()),
                ("room_qty", query.rooms.to_string()),
                ("currency_code", query.currency.clone()),
            ])
            .send()
            .await?;
        let parsed: BookingHotelsResponse = read_json(response).await?;

        let nights = query.nights() as f64;
        let offers: Vec<HotelOffer> = parsed
            .data
            .hotels
            .into_iter()
            .take(MAX_OFFERS)
            .map(|h| {
                let total = h.property.price_breakdown.gross_price.value;
                HotelOffer {
                    id: h.hotel_id.to_string(),
                    name: h.property.name,
                    rating: h.property.review_score,
                    price_per_night: crate::cascade::round2(total / nights),
                    total_price: total,
                    currency: h.property.price_breakdown.gross_price.currency,
                    amenities: Vec::new(),
                }
            })
            .collect();

        if offers.is_empty() {
            return Err(ProviderError::malformed("no hotels in response"));
        }
        Ok(offers)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Visa requirements (RapidAPI)
// ─────────────────────────────────────────────────────────────────────────────

pub struct VisaRequirementsApi {
    client: reqwest::Client,
    base_url: String,
}

impl VisaRequirementsApi {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, VISA_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: normalize_base(base_url),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VisaApiResponse {
    category: VisaApiCategory,
    #[serde(default)]
    dur: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct VisaApiCategory {
    name: String,
    code: String,
}

#[async_trait]
impl Provider<VisaQuery, VisaRequirement> for VisaRequirementsApi {
    fn name(&self) -> &str {
        "visa_requirements"
    }

    fn shared_credential(&self) -> Option<&str> {
        Some(RAPIDAPI)
    }

    async fn fetch(&self, query: &VisaQuery, api_key: &str) -> Result<VisaRequirement, ProviderError> {
        let response = self
            .client
            .post(format!("{}/", self.base_url))
            .header("X-RapidAPI-Key", api_key)
            .header("X-RapidAPI-Host", VISA_HOST)
            .form(&[
                ("passport", query.nationality.as_str()),
                ("destination", query.destination.as_str()),
            ])
            .send()
            .await?;
        let parsed: VisaApiResponse = read_json(response).await?;

        // VF = visa free, VOA = on arrival, EV = e-visa, VR = required
        let visa_required = matches!(parsed.category.code.as_str(), "VR" | "EV");
        Ok(VisaRequirement {
            nationality: query.nationality.clone(),
            destination: query.destination.clone(),
            visa_required,
            category: parsed.category.name.to_lowercase(),
            max_stay_days: parsed.dur,
            notes: Vec::new(),
        })
    }
}
