use serde::Serialize;

use crate::model::ForecastDay;

const UNKNOWN_CONDITION: &str = "Unknown";
const MPH_PER_KPH: f64 = 0.621_371;
const MM_PER_INCH: f64 = 25.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

impl UnitSystem {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Imperial => "imperial",
        }
    }

    pub fn temperature_unit(self) -> &'static str {
        match self {
            Self::Metric => "°C",
            Self::Imperial => "°F",
        }
    }

    pub fn speed_unit(self) -> &'static str {
        match self {
            Self::Metric => "km/h",
            Self::Imperial => "mph",
        }
    }

    pub fn precip_unit(self) -> &'static str {
        match self {
            Self::Metric => "mm",
            Self::Imperial => "in",
        }
    }

    pub fn temperature(self, celsius: f64) -> f64 {
        match self {
            Self::Metric => celsius,
            Self::Imperial => celsius * 9.0 / 5.0 + 32.0,
        }
    }

    pub fn speed(self, kph: f64) -> f64 {
        match self {
            Self::Metric => kph,
            Self::Imperial => kph * MPH_PER_KPH,
        }
    }

    pub fn precipitation(self, mm: f64) -> f64 {
        match self {
            Self::Metric => mm,
            Self::Imperial => mm / MM_PER_INCH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureSeries {
    pub unit: &'static str,
    pub dates: Vec<String>,
    pub max: Vec<Option<f64>>,
    pub avg: Vec<Option<f64>>,
    pub min: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrecipitationSeries {
    pub unit: &'static str,
    pub dates: Vec<String>,
    pub totals: Vec<Option<f64>>,
    pub rain_chance_pct: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindSeries {
    pub unit: &'static str,
    pub dates: Vec<String>,
    pub max_wind: Vec<Option<f64>>,
    pub alert_line: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionCount {
    pub condition: String,
    pub days: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlySeries {
    pub date: String,
    pub temperature_unit: &'static str,
    pub precip_unit: &'static str,
    pub labels: Vec<String>,
    pub temp: Vec<Option<f64>>,
    pub feels_like: Vec<Option<f64>>,
    pub precip: Vec<Option<f64>>,
}

/// Every series a dashboard view draws for one forecast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSet {
    pub units: UnitSystem,
    pub temperature: TemperatureSeries,
    pub precipitation: PrecipitationSeries,
    pub wind: WindSeries,
    pub conditions: Vec<ConditionCount>,
    pub hourly: Option<HourlySeries>,
}

pub fn chart_set(
    days: &[ForecastDay],
    units: UnitSystem,
    wind_alert_kph: f64,
    hourly_date: Option<&str>,
) -> ChartSet {
    let hourly_date = hourly_date.or_else(|| days.first().map(|day| day.date.as_str()));

    ChartSet {
        units,
        temperature: temperature_series(days, units),
        precipitation: precipitation_series(days, units),
        wind: wind_series(days, units, wind_alert_kph),
        conditions: condition_distribution(days),
        hourly: hourly_date.and_then(|date| hourly_series(days, date, units)),
    }
}

pub fn temperature_series(days: &[ForecastDay], units: UnitSystem) -> TemperatureSeries {
    let convert = |value: Option<f64>| value.map(|value| units.temperature(value));
    TemperatureSeries {
        unit: units.temperature_unit(),
        dates: dates(days),
        max: days.iter().map(|day| convert(day.max_temp_c)).collect(),
        avg: days.iter().map(|day| convert(day.avg_temp_c)).collect(),
        min: days.iter().map(|day| convert(day.min_temp_c)).collect(),
    }
}

pub fn precipitation_series(days: &[ForecastDay], units: UnitSystem) -> PrecipitationSeries {
    PrecipitationSeries {
        unit: units.precip_unit(),
        dates: dates(days),
        totals: days
            .iter()
            .map(|day| day.total_precip_mm.map(|value| units.precipitation(value)))
            .collect(),
        rain_chance_pct: days.iter().map(|day| day.rain_chance_pct).collect(),
    }
}

pub fn wind_series(days: &[ForecastDay], units: UnitSystem, alert_kph: f64) -> WindSeries {
    WindSeries {
        unit: units.speed_unit(),
        dates: dates(days),
        max_wind: days
            .iter()
            .map(|day| day.max_wind_kph.map(|value| units.speed(value)))
            .collect(),
        alert_line: units.speed(alert_kph),
    }
}

/// Days per condition text, in order of first appearance.
pub fn condition_distribution(days: &[ForecastDay]) -> Vec<ConditionCount> {
    let mut counts: Vec<ConditionCount> = Vec::new();
    for day in days {
        let condition = day
            .condition_text
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(UNKNOWN_CONDITION);

        match counts.iter_mut().find(|entry| entry.condition == condition) {
            Some(entry) => entry.days += 1,
            None => counts.push(ConditionCount {
                condition: condition.to_string(),
                days: 1,
            }),
        }
    }
    counts
}

/// Hourly breakdown for `date`, or `None` when the forecast has no such day.
pub fn hourly_series(days: &[ForecastDay], date: &str, units: UnitSystem) -> Option<HourlySeries> {
    let day = days.iter().find(|day| day.date == date.trim())?;
    let temperature = |value: Option<f64>| value.map(|value| units.temperature(value));

    Some(HourlySeries {
        date: day.date.clone(),
        temperature_unit: units.temperature_unit(),
        precip_unit: units.precip_unit(),
        labels: day.hourly.iter().map(|hour| hour_label(&hour.time)).collect(),
        temp: day.hourly.iter().map(|hour| temperature(hour.temp_c)).collect(),
        feels_like: day
            .hourly
            .iter()
            .map(|hour| temperature(hour.feels_like_c))
            .collect(),
        precip: day
            .hourly
            .iter()
            .map(|hour| hour.precip_mm.map(|value| units.precipitation(value)))
            .collect(),
    })
}

fn dates(days: &[ForecastDay]) -> Vec<String> {
    days.iter().map(|day| day.date.clone()).collect()
}

fn hour_label(time: &str) -> String {
    let trimmed = time.trim();
    trimmed
        .split_once(' ')
        .map_or(trimmed, |(_, clock)| clock)
        .to_string()
}
