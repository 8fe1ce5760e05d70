//! Prompt construction for the generation service.
//!
//! Prompts are plain text assembled from typed forecast data and anomaly
//! flags. Sending them is delegated to a [`TextGenerator`]; nothing here
//! retries or rewrites the generated text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::anomaly::AnomalyFlag;
use crate::model::{CurrentConditions, ForecastDay, ForecastLocation};
use crate::providers::gemini::GenerationError;

pub const FORECAST_PROMPT_DAYS: usize = 7;
const NO_ANOMALIES: &str = "No significant anomalies detected";

pub trait TextGenerator {
    fn generate(&self, prompt: &str, temperature: f64) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Forecast,
    Anomalies,
    Current,
    Activities,
}

impl InsightKind {
    pub const ALL: [InsightKind; 4] = [
        InsightKind::Forecast,
        InsightKind::Anomalies,
        InsightKind::Current,
        InsightKind::Activities,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Forecast => "forecast",
            Self::Anomalies => "anomalies",
            Self::Current => "current",
            Self::Activities => "activities",
        }
    }

    /// Whether the prompt is built from current conditions rather than the
    /// cached forecast.
    pub fn uses_current_conditions(self) -> bool {
        matches!(self, Self::Current | Self::Activities)
    }
}

impl fmt::Display for InsightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InsightKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| {
                format!("unknown insight kind `{value}` (expected forecast, anomalies, current or activities)")
            })
    }
}

/// Anomaly commentary prompt with one line per flag in evaluation order.
pub fn insight_prompt(
    location: &ForecastLocation,
    days: &[ForecastDay],
    flags: &[AnomalyFlag],
) -> String {
    let today = days.first();
    let anomaly_summary = if flags.is_empty() {
        NO_ANOMALIES.to_string()
    } else {
        flags
            .iter()
            .map(|flag| format!("- {}", flag.describe()))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "You are a weather intelligence analyst providing expert insights.

Location: {location}
Forecast Period: {period}
Today's High: {high}°C
Today's Condition: {condition}

Detected Weather Anomalies:
{anomaly_summary}

Provide expert weather insights covering:
1. Significance of the forecast conditions
2. Analysis of detected anomalies
3. Potential impacts on daily activities
4. Recommendations and precautions
5. What to expect in the coming days

Be concise, actionable, and focus on practical guidance (3-4 paragraphs).",
        location = location.label(),
        period = period_label(days),
        high = number(today.and_then(|day| day.max_temp_c)),
        condition = text(today.and_then(|day| day.condition_text.as_deref())),
    )
}

/// Multi-day outlook prompt with at most [`FORECAST_PROMPT_DAYS`] days
/// summarised as JSON.
pub fn forecast_prompt(location: &ForecastLocation, days: &[ForecastDay]) -> String {
    let summary: Vec<Value> = days
        .iter()
        .take(FORECAST_PROMPT_DAYS)
        .map(|day| {
            json!({
                "date": day.date,
                "condition": day.condition_text,
                "max_temp": day.max_temp_c,
                "min_temp": day.min_temp_c,
                "precipitation": day.total_precip_mm,
                "max_wind": day.max_wind_kph,
                "uv": day.uv_index,
            })
        })
        .collect();
    let day_count = summary.len();

    format!(
        "You are a professional meteorologist providing a comprehensive {day_count}-day weather forecast analysis.

Location: {location}

{day_count}-Day Forecast:
{forecast:#}

Provide a detailed forecast analysis covering:
1. Week overview and general weather trends
2. Key weather patterns and changes expected
3. Best days for outdoor activities
4. Days requiring weather precautions
5. Temperature trends and what they mean
6. Precipitation and wind patterns

Keep the analysis informative, actionable, and professional (4-5 paragraphs maximum).",
        location = location.label(),
        forecast = Value::Array(summary),
    )
}

pub fn current_prompt(current: &CurrentConditions) -> String {
    format!(
        "You are a professional meteorologist analyzing current weather conditions.

Location: {location}
Local Time: {local_time}

Current Conditions:
- Temperature: {temp}°C (Feels like: {feels}°C)
- Condition: {condition}
- Humidity: {humidity}%
- Wind: {wind} km/h {wind_dir}
- Pressure: {pressure} mb
- Visibility: {visibility} km
- UV Index: {uv}
- Cloud Cover: {cloud}%

Provide a professional weather analysis covering:
1. Current conditions summary
2. Comfort level and what to expect
3. Outdoor activity recommendations
4. Any weather concerns or advisories

Keep the analysis concise, practical, and professional (3-4 paragraphs maximum).",
        location = current.location.label(),
        local_time = text(Some(current.location.local_time.as_str())),
        temp = number(current.temp_c),
        feels = number(current.feels_like_c),
        condition = text(current.condition_text.as_deref()),
        humidity = number(current.humidity_pct),
        wind = number(current.wind_kph),
        wind_dir = current.wind_dir.as_deref().unwrap_or_default(),
        pressure = number(current.pressure_mb),
        visibility = number(current.visibility_km),
        uv = number(current.uv_index),
        cloud = number(current.cloud_pct),
    )
}

pub fn activities_prompt(current: &CurrentConditions) -> String {
    format!(
        "Based on these current weather conditions, suggest 5 suitable activities:

Temperature: {temp}°C
Condition: {condition}
Wind: {wind} km/h
UV Index: {uv}
Humidity: {humidity}%

Provide 5 specific, practical activity recommendations that are well-suited for these conditions.
Format: Brief activity name followed by 1-sentence explanation.
Mix indoor and outdoor suggestions based on conditions.",
        temp = number(current.temp_c),
        condition = text(current.condition_text.as_deref()),
        wind = number(current.wind_kph),
        uv = number(current.uv_index),
        humidity = number(current.humidity_pct),
    )
}

fn period_label(days: &[ForecastDay]) -> String {
    match (days.first(), days.last()) {
        (Some(first), Some(last)) if first.date != last.date => {
            format!("{} to {} ({} days)", first.date, last.date, days.len())
        }
        (Some(first), _) => first.date.clone(),
        _ => "n/a".to_string(),
    }
}

fn number(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |value| value.to_string())
}

fn text(value: Option<&str>) -> &str {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("n/a")
}
