use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const MIN_FORECAST_DAYS: i64 = 3;
pub const MAX_FORECAST_DAYS: i64 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessStatus {
    Live,
    CacheFresh,
}

impl FreshnessStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::CacheFresh => "cache_fresh",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub status: FreshnessStatus,
    pub key: String,
    pub ttl_secs: u64,
    pub age_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyReading {
    pub time: String,
    pub temp_c: Option<f64>,
    pub precip_mm: Option<f64>,
    pub wind_kph: Option<f64>,
    pub feels_like_c: Option<f64>,
    pub condition_text: Option<String>,
}

/// One calendar day of forecast data with its hourly breakdown.
///
/// Numeric fields are optional: partial provider payloads leave them empty
/// and downstream consumers skip them instead of reading zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: String,
    pub max_temp_c: Option<f64>,
    pub min_temp_c: Option<f64>,
    pub avg_temp_c: Option<f64>,
    pub total_precip_mm: Option<f64>,
    pub max_wind_kph: Option<f64>,
    pub uv_index: Option<f64>,
    #[serde(default)]
    pub rain_chance_pct: Option<f64>,
    pub condition_text: Option<String>,
    #[serde(default)]
    pub hourly: Vec<HourlyReading>,
}

impl ForecastDay {
    pub fn new(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            max_temp_c: None,
            min_temp_c: None,
            avg_temp_c: None,
            total_precip_mm: None,
            max_wind_kph: None,
            uv_index: None,
            rain_chance_pct: None,
            condition_text: None,
            hourly: Vec::new(),
        }
    }

    /// Numeric fields paired with their names, in declaration order.
    pub fn numeric_fields(&self) -> [(&'static str, Option<f64>); 7] {
        [
            ("max_temp_c", self.max_temp_c),
            ("min_temp_c", self.min_temp_c),
            ("avg_temp_c", self.avg_temp_c),
            ("total_precip_mm", self.total_precip_mm),
            ("max_wind_kph", self.max_wind_kph),
            ("uv_index", self.uv_index),
            ("rain_chance_pct", self.rain_chance_pct),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastLocation {
    pub name: String,
    pub region: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    pub local_time: String,
}

impl ForecastLocation {
    pub fn label(&self) -> String {
        if self.country.trim().is_empty() {
            return self.name.clone();
        }
        format!("{}, {}", self.name, self.country)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatedForecast {
    pub location: ForecastLocation,
    pub days: Vec<ForecastDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub location: ForecastLocation,
    pub temp_c: Option<f64>,
    pub feels_like_c: Option<f64>,
    pub condition_text: Option<String>,
    pub humidity_pct: Option<f64>,
    pub wind_kph: Option<f64>,
    pub wind_dir: Option<String>,
    pub pressure_mb: Option<f64>,
    pub visibility_km: Option<f64>,
    pub uv_index: Option<f64>,
    pub cloud_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationMatch {
    pub name: String,
    pub region: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRequest {
    pub location: String,
    pub days: u8,
}

impl ForecastRequest {
    pub fn new(location: &str, days: i64) -> Result<Self, ValidationError> {
        Ok(Self {
            location: normalize_location(location)?,
            days: validate_day_count(days)?,
        })
    }
}

pub fn normalize_location(raw: &str) -> Result<String, ValidationError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ValidationError::EmptyLocation);
    }
    Ok(value.to_string())
}

pub fn validate_day_count(days: i64) -> Result<u8, ValidationError> {
    if !(MIN_FORECAST_DAYS..=MAX_FORECAST_DAYS).contains(&days) {
        return Err(ValidationError::InvalidDayCount(days));
    }
    u8::try_from(days).map_err(|_| ValidationError::InvalidDayCount(days))
}

/// Decodes an untyped forecast payload into typed days.
///
/// Accepts either a bare array of day objects or an object carrying them under
/// `days` (the shape `forecast --json` emits). Present-but-wrong values are
/// rejected with the offending day and field; absent or `null` values decode
/// to `None`.
pub fn decode_days(payload: &Value) -> Result<Vec<ForecastDay>, ValidationError> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(object) => match object.get("days") {
            Some(Value::Array(items)) => items,
            _ => return Err(ValidationError::NotAnArray),
        },
        _ => return Err(ValidationError::NotAnArray),
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| decode_day(index, item))
        .collect()
}

fn decode_day(index: usize, item: &Value) -> Result<ForecastDay, ValidationError> {
    let Some(object) = item.as_object() else {
        return Err(ValidationError::NotAnObject { index });
    };

    let date = match object.get("date") {
        Some(Value::String(date)) if !date.trim().is_empty() => date.trim().to_string(),
        _ => return Err(ValidationError::MissingDate { index }),
    };

    let hourly = match object.get("hourly") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(hours)) => hours
            .iter()
            .enumerate()
            .map(|(hour_index, hour)| decode_hour(&date, hour_index, hour))
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => {
            return Err(ValidationError::UnexpectedShape {
                date,
                field: "hourly".to_string(),
                found: describe_value(other),
            });
        }
    };

    Ok(ForecastDay {
        max_temp_c: optional_number(object, &date, "max_temp_c", "max_temp_c")?,
        min_temp_c: optional_number(object, &date, "min_temp_c", "min_temp_c")?,
        avg_temp_c: optional_number(object, &date, "avg_temp_c", "avg_temp_c")?,
        total_precip_mm: optional_number(object, &date, "total_precip_mm", "total_precip_mm")?,
        max_wind_kph: optional_number(object, &date, "max_wind_kph", "max_wind_kph")?,
        uv_index: optional_number(object, &date, "uv_index", "uv_index")?,
        rain_chance_pct: optional_number(object, &date, "rain_chance_pct", "rain_chance_pct")?,
        condition_text: optional_text(object, &date, "condition_text", "condition_text")?,
        hourly,
        date,
    })
}

fn decode_hour(date: &str, index: usize, item: &Value) -> Result<HourlyReading, ValidationError> {
    let label = |field: &str| format!("hourly[{index}].{field}");
    let Some(object) = item.as_object() else {
        return Err(ValidationError::UnexpectedShape {
            date: date.to_string(),
            field: format!("hourly[{index}]"),
            found: describe_value(item),
        });
    };

    let time = optional_text(object, date, "time", &label("time"))?.ok_or_else(|| {
        ValidationError::MissingField {
            date: date.to_string(),
            field: label("time"),
        }
    })?;

    Ok(HourlyReading {
        time,
        temp_c: optional_number(object, date, "temp_c", &label("temp_c"))?,
        precip_mm: optional_number(object, date, "precip_mm", &label("precip_mm"))?,
        wind_kph: optional_number(object, date, "wind_kph", &label("wind_kph"))?,
        feels_like_c: optional_number(object, date, "feels_like_c", &label("feels_like_c"))?,
        condition_text: optional_text(object, date, "condition_text", &label("condition_text"))?,
    })
}

pub(crate) fn optional_number(
    object: &Map<String, Value>,
    date: &str,
    key: &str,
    field: &str,
) -> Result<Option<f64>, ValidationError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_f64()
            .filter(|value| value.is_finite())
            .map(Some)
            .ok_or_else(|| ValidationError::NonFinite {
                date: date.to_string(),
                field: field.to_string(),
            }),
        Some(other) => Err(ValidationError::NonNumeric {
            date: date.to_string(),
            field: field.to_string(),
            found: describe_value(other),
        }),
    }
}

pub(crate) fn optional_text(
    object: &Map<String, Value>,
    date: &str,
    key: &str,
    field: &str,
) -> Result<Option<String>, ValidationError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.trim().to_string())),
        Some(other) => Err(ValidationError::UnexpectedShape {
            date: date.to_string(),
            field: field.to_string(),
            found: describe_value(other),
        }),
    }
}

fn describe_value(value: &Value) -> String {
    const MAX_LEN: usize = 32;
    let rendered = value.to_string();
    if rendered.chars().count() <= MAX_LEN {
        return rendered;
    }
    let truncated: String = rendered.chars().take(MAX_LEN).collect();
    format!("{truncated}...")
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("location must not be empty")]
    EmptyLocation,
    #[error("invalid forecast day count: {0} (expected 3..=14)")]
    InvalidDayCount(i64),
    #[error("forecast payload must be an array of days")]
    NotAnArray,
    #[error("forecast day #{index} must be an object")]
    NotAnObject { index: usize },
    #[error("forecast day #{index} is missing its date")]
    MissingDate { index: usize },
    #[error("day {date}: field `{field}` is missing")]
    MissingField { date: String, field: String },
    #[error("day {date}: field `{field}` must be numeric, found {found}")]
    NonNumeric {
        date: String,
        field: String,
        found: String,
    },
    #[error("day {date}: field `{field}` is not a finite number")]
    NonFinite { date: String, field: String },
    #[error("day {date}: field `{field}` has an unexpected shape, found {found}")]
    UnexpectedShape {
        date: String,
        field: String,
        found: String,
    },
}

impl ValidationError {
    /// Date of the offending day, when the error concerns one.
    pub fn day_date(&self) -> Option<&str> {
        match self {
            Self::MissingField { date, .. }
            | Self::NonNumeric { date, .. }
            | Self::NonFinite { date, .. }
            | Self::UnexpectedShape { date, .. } => Some(date),
            _ => None,
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingField { field, .. }
            | Self::NonNumeric { field, .. }
            | Self::NonFinite { field, .. }
            | Self::UnexpectedShape { field, .. } => Some(field),
            _ => None,
        }
    }
}
