use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::PROVIDER_TIMEOUT_SECS;
use crate::model::{
    CurrentConditions, ForecastDay, ForecastLocation, HourlyReading, LocatedForecast,
    LocationMatch,
};

use super::{ProviderError, WeatherApi};

const LOOKUP_ERROR_CODE: i64 = 1006;
const AUTH_ERROR_CODES: [i64; 5] = [1002, 2006, 2007, 2008, 2009];

#[derive(Debug, Serialize)]
struct ForecastQuery<'a> {
    key: &'a str,
    q: &'a str,
    days: u8,
    aqi: &'a str,
    alerts: &'a str,
}

#[derive(Debug, Serialize)]
struct LocationQuery<'a> {
    key: &'a str,
    q: &'a str,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    location: LocationPayload,
    forecast: ForecastPayload,
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    location: LocationPayload,
    current: CurrentPayload,
}

#[derive(Debug, Deserialize)]
struct LocationPayload {
    name: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    country: String,
    lat: f64,
    lon: f64,
    #[serde(default)]
    tz_id: String,
    #[serde(default)]
    localtime: String,
}

#[derive(Debug, Deserialize)]
struct ForecastPayload {
    #[serde(default)]
    forecastday: Vec<ForecastDayPayload>,
}

#[derive(Debug, Deserialize)]
struct ForecastDayPayload {
    date: String,
    day: DaySummaryPayload,
    #[serde(default)]
    hour: Vec<HourPayload>,
}

#[derive(Debug, Deserialize)]
struct DaySummaryPayload {
    maxtemp_c: Option<f64>,
    mintemp_c: Option<f64>,
    avgtemp_c: Option<f64>,
    maxwind_kph: Option<f64>,
    totalprecip_mm: Option<f64>,
    daily_chance_of_rain: Option<f64>,
    uv: Option<f64>,
    condition: Option<ConditionPayload>,
}

#[derive(Debug, Deserialize)]
struct HourPayload {
    time: String,
    temp_c: Option<f64>,
    feelslike_c: Option<f64>,
    precip_mm: Option<f64>,
    wind_kph: Option<f64>,
    condition: Option<ConditionPayload>,
}

#[derive(Debug, Deserialize)]
struct CurrentPayload {
    temp_c: Option<f64>,
    feelslike_c: Option<f64>,
    condition: Option<ConditionPayload>,
    humidity: Option<f64>,
    wind_kph: Option<f64>,
    wind_dir: Option<String>,
    pressure_mb: Option<f64>,
    vis_km: Option<f64>,
    uv: Option<f64>,
    cloud: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ConditionPayload {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    name: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    country: String,
    lat: f64,
    lon: f64,
}

/// Blocking WeatherAPI.com client. Each call is a single request; failures
/// are returned as-is.
#[derive(Debug, Clone)]
pub struct WeatherApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl WeatherApiClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .build()
            .map_err(|error| ProviderError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{name}.json", self.base_url)
    }
}

impl WeatherApi for WeatherApiClient {
    fn fetch_forecast(&self, location: &str, days: u8) -> Result<LocatedForecast, ProviderError> {
        let query = ForecastQuery {
            key: &self.api_key,
            q: location,
            days,
            aqi: "no",
            alerts: "no",
        };
        tracing::debug!(location, days, "requesting weatherapi forecast");

        let body = execute_request(self.client.get(self.endpoint("forecast")).query(&query))?;
        let forecast = parse_forecast_response(&body)?;
        tracing::info!(
            location = %forecast.location.label(),
            days = forecast.days.len(),
            "fetched weatherapi forecast"
        );
        Ok(forecast)
    }

    fn fetch_current(&self, location: &str) -> Result<CurrentConditions, ProviderError> {
        let query = LocationQuery {
            key: &self.api_key,
            q: location,
        };
        tracing::debug!(location, "requesting weatherapi current conditions");

        let body = execute_request(self.client.get(self.endpoint("current")).query(&query))?;
        parse_current_response(&body)
    }

    fn search_locations(&self, query: &str) -> Result<Vec<LocationMatch>, ProviderError> {
        let params = LocationQuery {
            key: &self.api_key,
            q: query,
        };
        tracing::debug!(query, "requesting weatherapi location search");

        let body = execute_request(self.client.get(self.endpoint("search")).query(&params))?;
        parse_search_response(&body)
    }
}

fn execute_request(request: RequestBuilder) -> Result<String, ProviderError> {
    let response = request
        .send()
        .map_err(|error| ProviderError::Transport(error.without_url().to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .map_err(|error| ProviderError::Transport(error.without_url().to_string()))?;

    if status.is_success() {
        return Ok(body);
    }

    let fallback = status.canonical_reason().unwrap_or("request failed");
    let error = map_error_response(status.as_u16(), &body, fallback);
    tracing::warn!(status = status.as_u16(), error = %error, "weatherapi request failed");
    Err(error)
}

fn map_error_response(status: u16, body: &str, fallback: &str) -> ProviderError {
    let code = extract_error_code(body);
    let message = extract_error_message(body).unwrap_or_else(|| fallback.to_string());

    match code {
        Some(LOOKUP_ERROR_CODE) => ProviderError::Lookup(message),
        Some(code) if AUTH_ERROR_CODES.contains(&code) => ProviderError::Auth(message),
        _ if status == 401 || status == 403 => ProviderError::Auth(message),
        _ => ProviderError::Http { status, message },
    }
}

fn parse_forecast_response(body: &str) -> Result<LocatedForecast, ProviderError> {
    let payload: ForecastResponse = serde_json::from_str(body)
        .map_err(|error| ProviderError::InvalidResponse(format!("forecast payload: {error}")))?;

    let location = build_location(payload.location)?;
    if payload.forecast.forecastday.is_empty() {
        return Err(ProviderError::InvalidResponse(
            "forecast payload: no forecast days".to_string(),
        ));
    }

    let days = payload
        .forecast
        .forecastday
        .into_iter()
        .map(build_forecast_day)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(LocatedForecast { location, days })
}

fn build_forecast_day(payload: ForecastDayPayload) -> Result<ForecastDay, ProviderError> {
    let date = payload.date.trim().to_string();
    if date.is_empty() {
        return Err(ProviderError::InvalidResponse(
            "forecast payload: empty date in forecastday".to_string(),
        ));
    }

    let day = payload.day;
    let hourly = payload
        .hour
        .into_iter()
        .map(|hour| HourlyReading {
            time: hour.time,
            temp_c: hour.temp_c,
            precip_mm: hour.precip_mm,
            wind_kph: hour.wind_kph,
            feels_like_c: hour.feelslike_c,
            condition_text: condition_text(hour.condition),
        })
        .collect();

    Ok(ForecastDay {
        date,
        max_temp_c: day.maxtemp_c,
        min_temp_c: day.mintemp_c,
        avg_temp_c: day.avgtemp_c,
        total_precip_mm: day.totalprecip_mm,
        max_wind_kph: day.maxwind_kph,
        uv_index: day.uv,
        rain_chance_pct: day.daily_chance_of_rain,
        condition_text: condition_text(day.condition),
        hourly,
    })
}

fn parse_current_response(body: &str) -> Result<CurrentConditions, ProviderError> {
    let payload: CurrentResponse = serde_json::from_str(body)
        .map_err(|error| ProviderError::InvalidResponse(format!("current payload: {error}")))?;

    let location = build_location(payload.location)?;
    let current = payload.current;

    Ok(CurrentConditions {
        location,
        temp_c: current.temp_c,
        feels_like_c: current.feelslike_c,
        condition_text: condition_text(current.condition),
        humidity_pct: current.humidity,
        wind_kph: current.wind_kph,
        wind_dir: current.wind_dir.filter(|value| !value.trim().is_empty()),
        pressure_mb: current.pressure_mb,
        visibility_km: current.vis_km,
        uv_index: current.uv,
        cloud_pct: current.cloud,
    })
}

fn parse_search_response(body: &str) -> Result<Vec<LocationMatch>, ProviderError> {
    let results: Vec<SearchResult> = serde_json::from_str(body)
        .map_err(|error| ProviderError::InvalidResponse(format!("search payload: {error}")))?;

    Ok(results
        .into_iter()
        .filter(|result| !result.name.trim().is_empty())
        .map(|result| LocationMatch {
            name: result.name,
            region: result.region,
            country: result.country,
            latitude: result.lat,
            longitude: result.lon,
        })
        .collect())
}

fn build_location(payload: LocationPayload) -> Result<ForecastLocation, ProviderError> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(ProviderError::InvalidResponse(
            "location payload: empty location name".to_string(),
        ));
    }

    Ok(ForecastLocation {
        name,
        region: payload.region,
        country: payload.country,
        latitude: payload.lat,
        longitude: payload.lon,
        timezone: payload.tz_id,
        local_time: payload.localtime,
    })
}

fn condition_text(condition: Option<ConditionPayload>) -> Option<String> {
    condition
        .and_then(|condition| condition.text)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn extract_error_code(body: &str) -> Option<i64> {
    serde_json::from_str::<Value>(body.trim())
        .ok()?
        .get("error")?
        .get("code")?
        .as_i64()
}

fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let from_json = serde_json::from_str::<Value>(trimmed).ok().and_then(|json| {
        let nested = json.get("error").and_then(|error| error.get("message"));
        let candidates = [
            nested,
            json.get("message"),
            json.get("error"),
            json.get("detail"),
        ];
        candidates
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|message| !message.is_empty())
            .map(ToOwned::to_owned)
    });

    from_json.or_else(|| Some(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORECAST_BODY: &str = r#"{
        "location": {
            "name": "London",
            "region": "City of London, Greater London",
            "country": "United Kingdom",
            "lat": 51.52,
            "lon": -0.11,
            "tz_id": "Europe/London",
            "localtime": "2025-11-01 09:15"
        },
        "forecast": {
            "forecastday": [
                {
                    "date": "2025-11-01",
                    "day": {
                        "maxtemp_c": 14.2,
                        "mintemp_c": 8.1,
                        "avgtemp_c": 11.0,
                        "maxwind_kph": 31.7,
                        "totalprecip_mm": 2.4,
                        "daily_chance_of_rain": 86,
                        "uv": 2.0,
                        "condition": {"text": "Patchy rain nearby", "code": 1063}
                    },
                    "hour": [
                        {
                            "time": "2025-11-01 00:00",
                            "temp_c": 9.4,
                            "feelslike_c": 7.0,
                            "precip_mm": 0.1,
                            "wind_kph": 18.0,
                            "condition": {"text": "Cloudy "}
                        }
                    ]
                },
                {
                    "date": "2025-11-02",
                    "day": {
                        "maxtemp_c": 12.0,
                        "mintemp_c": 6.5,
                        "maxwind_kph": 22.3,
                        "totalprecip_mm": 0.0
                    }
                }
            ]
        }
    }"#;

    #[test]
    fn weatherapi_forecast_maps_days_and_hours() {
        let forecast = parse_forecast_response(FORECAST_BODY).expect("forecast");

        assert_eq!(forecast.location.label(), "London, United Kingdom");
        assert_eq!(forecast.location.timezone, "Europe/London");
        assert_eq!(forecast.days.len(), 2);

        let first = &forecast.days[0];
        assert_eq!(first.date, "2025-11-01");
        assert_eq!(first.max_temp_c, Some(14.2));
        assert_eq!(first.rain_chance_pct, Some(86.0));
        assert_eq!(first.condition_text.as_deref(), Some("Patchy rain nearby"));
        assert_eq!(first.hourly.len(), 1);
        assert_eq!(first.hourly[0].feels_like_c, Some(7.0));
        assert_eq!(first.hourly[0].condition_text.as_deref(), Some("Cloudy"));

        let second = &forecast.days[1];
        assert_eq!(second.avg_temp_c, None);
        assert_eq!(second.uv_index, None);
        assert!(second.hourly.is_empty());
    }

    #[test]
    fn weatherapi_forecast_rejects_non_numeric_day_value() {
        let body = FORECAST_BODY.replace("\"maxtemp_c\": 14.2", "\"maxtemp_c\": \"hot\"");
        let error = parse_forecast_response(&body).expect_err("must fail");

        assert!(
            matches!(error, ProviderError::InvalidResponse(message) if message.starts_with("forecast payload"))
        );
    }

    #[test]
    fn weatherapi_forecast_rejects_empty_forecast() {
        let body = r#"{
            "location": {"name": "London", "lat": 51.52, "lon": -0.11},
            "forecast": {"forecastday": []}
        }"#;
        let error = parse_forecast_response(body).expect_err("must fail");

        assert_eq!(
            error,
            ProviderError::InvalidResponse("forecast payload: no forecast days".to_string())
        );
    }

    #[test]
    fn weatherapi_current_maps_conditions() {
        let body = r#"{
            "location": {
                "name": "Paris", "region": "Ile-de-France", "country": "France",
                "lat": 48.87, "lon": 2.33, "tz_id": "Europe/Paris",
                "localtime": "2025-11-01 10:00"
            },
            "current": {
                "temp_c": 12.0, "feelslike_c": 10.4,
                "condition": {"text": "Partly cloudy"},
                "humidity": 72, "wind_kph": 14.4, "wind_dir": "SW",
                "pressure_mb": 1014.0, "vis_km": 10.0, "uv": 3.0, "cloud": 50
            }
        }"#;

        let current = parse_current_response(body).expect("current");
        assert_eq!(current.location.name, "Paris");
        assert_eq!(current.humidity_pct, Some(72.0));
        assert_eq!(current.wind_dir.as_deref(), Some("SW"));
        assert_eq!(current.visibility_km, Some(10.0));
        assert_eq!(current.cloud_pct, Some(50.0));
    }

    #[test]
    fn weatherapi_search_skips_unnamed_results() {
        let body = r#"[
            {"id": 1, "name": "Springfield", "region": "Illinois", "country": "United States of America", "lat": 39.8, "lon": -89.64},
            {"id": 2, "name": " ", "lat": 0.0, "lon": 0.0}
        ]"#;

        let matches = parse_search_response(body).expect("search");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].region, "Illinois");
    }

    #[test]
    fn weatherapi_error_code_1006_maps_to_lookup() {
        let body = r#"{"error": {"code": 1006, "message": "No matching location found."}}"#;
        assert_eq!(
            map_error_response(400, body, "Bad Request"),
            ProviderError::Lookup("No matching location found.".to_string())
        );
    }

    #[test]
    fn weatherapi_key_errors_map_to_auth() {
        let body = r#"{"error": {"code": 2006, "message": "API key is invalid."}}"#;
        assert_eq!(
            map_error_response(401, body, "Unauthorized"),
            ProviderError::Auth("API key is invalid.".to_string())
        );
        assert_eq!(
            map_error_response(403, "", "Forbidden"),
            ProviderError::Auth("Forbidden".to_string())
        );
    }

    #[test]
    fn weatherapi_other_errors_keep_status() {
        let body = r#"{"error": {"code": 9999, "message": "Internal application error."}}"#;
        assert_eq!(
            map_error_response(500, body, "Internal Server Error"),
            ProviderError::Http {
                status: 500,
                message: "Internal application error.".to_string()
            }
        );
        assert_eq!(
            map_error_response(502, "upstream down", "Bad Gateway"),
            ProviderError::Http {
                status: 502,
                message: "upstream down".to_string()
            }
        );
    }
}
