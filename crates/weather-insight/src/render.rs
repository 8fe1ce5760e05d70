use serde::Serialize;
use serde_json::json;

use crate::anomaly::AnomalyFlag;
use crate::charts::{ChartSet, UnitSystem};
use crate::error::{AppError, ERROR_CODE_RUNTIME_SERIALIZE};
use crate::model::{CacheMetadata, CurrentConditions, LocationMatch};
use crate::service::{AnomalyReport, ChartReport, ForecastReport, InsightReport, StatusReport};

pub const ENVELOPE_SCHEMA_VERSION: &str = "v1";

const MISSING: &str = "-";

pub fn json_envelope<T: Serialize>(command: &str, result: &T) -> Result<String, AppError> {
    let result = serde_json::to_value(result).map_err(|error| {
        AppError::runtime(
            ERROR_CODE_RUNTIME_SERIALIZE,
            format!("failed to serialize output: {error}"),
        )
    })?;
    serde_json::to_string(&json!({
        "schema_version": ENVELOPE_SCHEMA_VERSION,
        "command": command,
        "ok": true,
        "result": result,
    }))
    .map_err(|error| {
        AppError::runtime(
            ERROR_CODE_RUNTIME_SERIALIZE,
            format!("failed to serialize output envelope: {error}"),
        )
    })
}

pub fn json_error_envelope(command: &str, error: &AppError) -> String {
    let payload = json!({
        "schema_version": ENVELOPE_SCHEMA_VERSION,
        "command": command,
        "ok": false,
        "error": {
            "code": error.code,
            "message": redact_sensitive(&error.message),
            "details": {
                "kind": error.kind.as_str(),
                "exit_code": error.exit_code(),
            }
        }
    });
    serde_json::to_string(&payload).unwrap_or_else(|serialize_error| {
        format!(
            "{{\"schema_version\":\"{}\",\"command\":\"{}\",\"ok\":false,\"error\":{{\"code\":\"{}\",\"message\":\"{}\"}}}}",
            ENVELOPE_SCHEMA_VERSION,
            escape_json_string(command),
            ERROR_CODE_RUNTIME_SERIALIZE,
            escape_json_string(&format!(
                "failed to serialize error envelope: {serialize_error}"
            )),
        )
    })
}

pub fn error_line(error: &AppError) -> String {
    format!("error[{}]: {}", error.code, redact_sensitive(&error.message))
}

pub fn forecast_text(report: &ForecastReport, units: UnitSystem) -> String {
    let mut lines = vec![location_header(
        &report.location.label(),
        &report.location.timezone,
        &report.cache,
    )];

    for day in &report.days {
        lines.push(format!(
            "{} {} {}~{} rain:{} wind:{} uv:{}",
            day.date,
            day.condition_text.as_deref().unwrap_or(MISSING),
            measure(day.min_temp_c.map(|v| units.temperature(v)), ""),
            measure(day.max_temp_c.map(|v| units.temperature(v)), units.temperature_unit()),
            measure(day.total_precip_mm.map(|v| units.precipitation(v)), units.precip_unit()),
            measure(day.max_wind_kph.map(|v| units.speed(v)), units.speed_unit()),
            measure(day.uv_index, ""),
        ));
    }

    lines.push(String::new());
    lines.extend(flag_lines(&report.flags));
    lines.join("\n")
}

pub fn anomalies_text(report: &AnomalyReport) -> String {
    let mut lines = Vec::new();
    match (&report.location, &report.cache) {
        (Some(location), Some(cache)) => {
            lines.push(location_header(&location.label(), &location.timezone, cache));
        }
        _ => lines.push(format!("offline input | days={}", report.day_count)),
    }
    lines.extend(flag_lines(&report.flags));
    lines.join("\n")
}

pub fn charts_text(report: &ChartReport) -> String {
    let mut lines = vec![location_header(
        &report.location.label(),
        &report.location.timezone,
        &report.cache,
    )];
    lines.extend(chart_lines(&report.charts));
    lines.join("\n")
}

pub fn current_text(current: &CurrentConditions, units: UnitSystem) -> String {
    let temperature = |value: Option<f64>| {
        measure(value.map(|v| units.temperature(v)), units.temperature_unit())
    };

    [
        format!(
            "{} | local time {}",
            current.location.label(),
            non_empty(&current.location.local_time)
        ),
        format!(
            "{} {} (feels like {})",
            current.condition_text.as_deref().unwrap_or(MISSING),
            temperature(current.temp_c),
            temperature(current.feels_like_c)
        ),
        format!(
            "humidity:{} wind:{} {} pressure:{} visibility:{} uv:{} cloud:{}",
            measure(current.humidity_pct, "%"),
            measure(current.wind_kph.map(|v| units.speed(v)), units.speed_unit()),
            current.wind_dir.as_deref().unwrap_or(MISSING),
            measure(current.pressure_mb, "mb"),
            measure(current.visibility_km, "km"),
            measure(current.uv_index, ""),
            measure(current.cloud_pct, "%"),
        ),
    ]
    .join("\n")
}

pub fn search_text(matches: &[LocationMatch]) -> String {
    if matches.is_empty() {
        return "no matching locations".to_string();
    }

    matches
        .iter()
        .map(|item| {
            let place = [item.name.as_str(), item.region.as_str(), item.country.as_str()]
                .into_iter()
                .filter(|part| !part.trim().is_empty())
                .collect::<Vec<_>>()
                .join(", ");
            format!("{place} ({:.4}, {:.4})", item.latitude, item.longitude)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn insight_text(report: &InsightReport) -> String {
    let mut header = format!("{} insight | {}", report.kind, report.location);
    if let Some(cache) = &report.cache {
        header.push_str(&format!(" | cache={}", cache.status.as_str()));
    }
    format!("{header}\n\n{}", report.text.trim())
}

pub fn status_text(report: &StatusReport) -> String {
    let t = &report.thresholds;
    let mut lines = vec![
        format!("Weather API: {}", report.weather_api),
        format!("Gemini AI: {} ({})", report.gemini, report.gemini_model),
        format!(
            "Defaults: location={} days={} cache_ttl={}s",
            report.default_location, report.forecast_days, report.cache_ttl_secs
        ),
        format!(
            "Thresholds: temp baseline={} delta={}/{} wind={}/{} precip={}/{} uv={}/{}",
            t.temp_baseline_c
                .map_or_else(|| "period mean".to_string(), |value| value.to_string()),
            t.temp_delta_c,
            t.severe_temp_delta(),
            t.wind_warning_kph,
            t.wind_severe_kph,
            t.precip_warning_mm,
            t.precip_severe_mm,
            t.uv_warning,
            t.uv_severe,
        ),
    ];
    if let Some(path) = &report.config_file {
        lines.push(format!("Config file: {}", path.display()));
    }
    lines.extend(report.problems.iter().map(|problem| format!("! {problem}")));
    lines.join("\n")
}

fn chart_lines(charts: &ChartSet) -> Vec<String> {
    let mut lines = Vec::new();

    let temperature = &charts.temperature;
    lines.push(format!("Temperature ({})", temperature.unit));
    for (index, date) in temperature.dates.iter().enumerate() {
        lines.push(format!(
            "  {date} max:{} avg:{} min:{}",
            measure(temperature.max[index], ""),
            measure(temperature.avg[index], ""),
            measure(temperature.min[index], ""),
        ));
    }

    let precipitation = &charts.precipitation;
    lines.push(format!("Precipitation ({})", precipitation.unit));
    for (index, date) in precipitation.dates.iter().enumerate() {
        lines.push(format!(
            "  {date} total:{} chance:{}",
            measure(precipitation.totals[index], ""),
            measure(precipitation.rain_chance_pct[index], "%"),
        ));
    }

    let wind = &charts.wind;
    lines.push(format!("Wind ({}, alert above {:.1})", wind.unit, wind.alert_line));
    for (index, date) in wind.dates.iter().enumerate() {
        let alert = wind.max_wind[index].is_some_and(|value| value > wind.alert_line);
        lines.push(format!(
            "  {date} max:{}{}",
            measure(wind.max_wind[index], ""),
            if alert { " !" } else { "" }
        ));
    }

    lines.push("Conditions".to_string());
    for entry in &charts.conditions {
        lines.push(format!("  {}: {} day(s)", entry.condition, entry.days));
    }

    if let Some(hourly) = &charts.hourly {
        lines.push(format!(
            "Hourly {} ({} / {})",
            hourly.date, hourly.temperature_unit, hourly.precip_unit
        ));
        for (index, label) in hourly.labels.iter().enumerate() {
            lines.push(format!(
                "  {label} temp:{} feels:{} precip:{}",
                measure(hourly.temp[index], ""),
                measure(hourly.feels_like[index], ""),
                measure(hourly.precip[index], ""),
            ));
        }
    }

    lines
}

fn flag_lines(flags: &[AnomalyFlag]) -> Vec<String> {
    if flags.is_empty() {
        return vec!["Anomalies: none".to_string()];
    }
    let mut lines = vec![format!("Anomalies: {}", flags.len())];
    lines.extend(flags.iter().map(|flag| format!("- {}", flag.describe())));
    lines
}

fn location_header(label: &str, timezone: &str, cache: &CacheMetadata) -> String {
    format!(
        "{label} ({}) | cache={} age={}s ttl={}s",
        non_empty(timezone),
        cache.status.as_str(),
        cache.age_secs,
        cache.ttl_secs
    )
}

fn measure(value: Option<f64>, unit: &str) -> String {
    value.map_or_else(|| MISSING.to_string(), |value| format!("{value:.1}{unit}"))
}

fn non_empty(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.is_empty() { MISSING } else { trimmed }
}

/// Masks credentials that transport errors or provider messages may echo.
pub fn redact_sensitive(input: &str) -> String {
    let mut output = input.to_string();
    for pattern in [
        "key=",
        "token=",
        "token:",
        "secret=",
        "secret:",
        "x-goog-api-key:",
        "authorization=",
        "authorization:",
    ] {
        output = redact_after_pattern(&output, pattern);
    }
    redact_bearer_token(&output)
}

fn redact_after_pattern(input: &str, pattern: &str) -> String {
    let lower = input.to_ascii_lowercase();
    let pattern_lower = pattern.to_ascii_lowercase();
    let is_authorization_pattern = pattern_lower.starts_with("authorization");
    let mut output = String::with_capacity(input.len());
    let mut cursor = 0;

    while let Some(found) = lower[cursor..].find(&pattern_lower) {
        let start = cursor + found;
        let value_start = skip_whitespace(input, start + pattern.len());
        let (redaction_start, value_end) = if is_authorization_pattern
            && input[value_start..]
                .to_ascii_lowercase()
                .starts_with("bearer ")
        {
            let bearer_start = value_start + "bearer ".len();
            (bearer_start, find_value_end(input, bearer_start))
        } else {
            (value_start, find_value_end(input, value_start))
        };

        output.push_str(&input[cursor..redaction_start]);
        if redaction_start < value_end {
            output.push_str("[REDACTED]");
        }
        cursor = value_end;
    }

    output.push_str(&input[cursor..]);
    output
}

fn redact_bearer_token(input: &str) -> String {
    let lower = input.to_ascii_lowercase();
    let pattern = "bearer ";
    let mut output = String::with_capacity(input.len());
    let mut cursor = 0;

    while let Some(found) = lower[cursor..].find(pattern) {
        let start = cursor + found;
        let value_start = start + pattern.len();
        let value_end = find_value_end(input, value_start);

        output.push_str(&input[cursor..value_start]);
        if value_start < value_end {
            output.push_str("[REDACTED]");
        }
        cursor = value_end;
    }

    output.push_str(&input[cursor..]);
    output
}

fn skip_whitespace(input: &str, mut index: usize) -> usize {
    let bytes = input.as_bytes();
    while index < bytes.len() && bytes[index].is_ascii_whitespace() {
        index += 1;
    }
    index
}

fn find_value_end(input: &str, mut index: usize) -> usize {
    let bytes = input.as_bytes();
    while index < bytes.len() {
        let byte = bytes[index];
        if byte.is_ascii_whitespace() || matches!(byte, b'&' | b',' | b';' | b')' | b']' | b'}') {
            break;
        }
        index += 1;
    }
    index
}

fn escape_json_string(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c if c < '\u{20}' => escaped.push_str(&format!("\\u{:04x}", c as u32)),
            c => escaped.push(c),
        }
    }
    escaped
}
