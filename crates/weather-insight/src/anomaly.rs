use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{ForecastDay, ValidationError, decode_days};

pub const TEMP_DELTA_C: f64 = 5.0;
pub const TEMP_SEVERE_MULTIPLE: f64 = 2.0;
pub const WIND_WARNING_KPH: f64 = 50.0;
pub const WIND_SEVERE_KPH: f64 = 80.0;
pub const PRECIP_WARNING_MM: f64 = 50.0;
pub const PRECIP_SEVERE_MM: f64 = 100.0;
pub const UV_WARNING: f64 = 8.0;
pub const UV_SEVERE: f64 = 11.0;

/// Cutoffs used by [`evaluate`].
///
/// Temperature, wind and precipitation cutoffs are exclusive (`>`); UV cutoffs
/// are inclusive (`>=`). Without a `temp_baseline_c` the baseline is the mean
/// `max_temp_c` of the evaluated days.
///
/// A temperature deviation turns Severe once it clears the warning cutoff by
/// more than [`TEMP_SEVERE_MULTIPLE`] times `temp_delta_c`, unless
/// `temp_severe_delta_c` pins the severe deviation explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyThresholds {
    pub temp_baseline_c: Option<f64>,
    pub temp_delta_c: f64,
    pub temp_severe_delta_c: Option<f64>,
    pub wind_warning_kph: f64,
    pub wind_severe_kph: f64,
    pub precip_warning_mm: f64,
    pub precip_severe_mm: f64,
    pub uv_warning: f64,
    pub uv_severe: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            temp_baseline_c: None,
            temp_delta_c: TEMP_DELTA_C,
            temp_severe_delta_c: None,
            wind_warning_kph: WIND_WARNING_KPH,
            wind_severe_kph: WIND_SEVERE_KPH,
            precip_warning_mm: PRECIP_WARNING_MM,
            precip_severe_mm: PRECIP_SEVERE_MM,
            uv_warning: UV_WARNING,
            uv_severe: UV_SEVERE,
        }
    }
}

impl AnomalyThresholds {
    pub fn with_baseline(mut self, baseline_c: f64) -> Self {
        self.temp_baseline_c = Some(baseline_c);
        self
    }

    /// Deviation from the baseline beyond which a temperature flag is Severe.
    pub fn severe_temp_delta(&self) -> f64 {
        self.temp_severe_delta_c
            .unwrap_or(self.temp_delta_c * (1.0 + TEMP_SEVERE_MULTIPLE))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    HighTemp,
    LowTemp,
    HighWind,
    HeavyPrecip,
    HighUv,
}

impl AnomalyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HighTemp => "high_temp",
            Self::LowTemp => "low_temp",
            Self::HighWind => "high_wind",
            Self::HeavyPrecip => "heavy_precip",
            Self::HighUv => "high_uv",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::HighTemp => "High temperature",
            Self::LowTemp => "Low temperature",
            Self::HighWind => "High wind speed",
            Self::HeavyPrecip => "Heavy precipitation",
            Self::HighUv => "Extreme UV index",
        }
    }

    fn unit(self) -> &'static str {
        match self {
            Self::HighTemp | Self::LowTemp => "°C",
            Self::HighWind => " km/h",
            Self::HeavyPrecip => " mm",
            Self::HighUv => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Severe,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Severe => "severe",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFlag {
    pub kind: AnomalyKind,
    pub day_date: String,
    pub observed_value: f64,
    pub threshold: f64,
    pub severity: Severity,
}

impl AnomalyFlag {
    pub fn describe(&self) -> String {
        let unit = self.kind.unit();
        let relation = match self.kind {
            AnomalyKind::LowTemp => "below",
            AnomalyKind::HighUv => "at or above",
            _ => "above",
        };
        format!(
            "{} on {}: {:.1}{unit} ({} {relation} {:.1}{unit})",
            self.kind.title(),
            self.day_date,
            self.observed_value,
            self.severity.as_str(),
            self.threshold,
        )
    }
}

/// Flags every threshold crossing in `days`.
///
/// Output follows input day order; within a day flags come in the fixed order
/// temperature, wind, precipitation, UV. Absent fields never produce flags.
pub fn evaluate(
    days: &[ForecastDay],
    thresholds: &AnomalyThresholds,
) -> Result<Vec<AnomalyFlag>, ValidationError> {
    validate_days(days)?;

    let baseline = thresholds
        .temp_baseline_c
        .or_else(|| mean_max_temp(days));
    let mut flags = Vec::new();

    for day in days {
        if let (Some(baseline), Some(max_temp)) = (baseline, day.max_temp_c) {
            flags.extend(check_temperature(day, max_temp, baseline, thresholds));
        }

        if let Some(wind) = day.max_wind_kph {
            flags.extend(
                exceeds(wind, thresholds.wind_warning_kph, thresholds.wind_severe_kph)
                    .map(|(severity, threshold)| {
                        flag(AnomalyKind::HighWind, day, wind, threshold, severity)
                    }),
            );
        }

        if let Some(precip) = day.total_precip_mm {
            flags.extend(
                exceeds(
                    precip,
                    thresholds.precip_warning_mm,
                    thresholds.precip_severe_mm,
                )
                .map(|(severity, threshold)| {
                    flag(AnomalyKind::HeavyPrecip, day, precip, threshold, severity)
                }),
            );
        }

        if let Some(uv) = day.uv_index {
            flags.extend(
                reaches(uv, thresholds.uv_warning, thresholds.uv_severe).map(
                    |(severity, threshold)| flag(AnomalyKind::HighUv, day, uv, threshold, severity),
                ),
            );
        }
    }

    tracing::debug!(days = days.len(), flags = flags.len(), "evaluated forecast anomalies");
    Ok(flags)
}

/// Validates an untyped payload and evaluates it.
pub fn evaluate_json(
    payload: &Value,
    thresholds: &AnomalyThresholds,
) -> Result<Vec<AnomalyFlag>, ValidationError> {
    let days = decode_days(payload)?;
    evaluate(&days, thresholds)
}

fn validate_days(days: &[ForecastDay]) -> Result<(), ValidationError> {
    for (index, day) in days.iter().enumerate() {
        if day.date.trim().is_empty() {
            return Err(ValidationError::MissingDate { index });
        }
        for (field, value) in day.numeric_fields() {
            if value.is_some_and(|value| !value.is_finite()) {
                return Err(ValidationError::NonFinite {
                    date: day.date.clone(),
                    field: field.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn mean_max_temp(days: &[ForecastDay]) -> Option<f64> {
    let temps: Vec<f64> = days.iter().filter_map(|day| day.max_temp_c).collect();
    if temps.is_empty() {
        return None;
    }
    Some(temps.iter().sum::<f64>() / temps.len() as f64)
}

fn check_temperature(
    day: &ForecastDay,
    max_temp: f64,
    baseline: f64,
    thresholds: &AnomalyThresholds,
) -> Option<AnomalyFlag> {
    let deviation = max_temp - baseline;
    let (kind, direction) = if deviation > 0.0 {
        (AnomalyKind::HighTemp, 1.0)
    } else {
        (AnomalyKind::LowTemp, -1.0)
    };

    exceeds(
        deviation.abs(),
        thresholds.temp_delta_c,
        thresholds.severe_temp_delta(),
    )
    .map(|(severity, delta)| flag(kind, day, max_temp, baseline + direction * delta, severity))
}

fn exceeds(value: f64, warning: f64, severe: f64) -> Option<(Severity, f64)> {
    if value > severe {
        Some((Severity::Severe, severe))
    } else if value > warning {
        Some((Severity::Warning, warning))
    } else {
        None
    }
}

fn reaches(value: f64, warning: f64, severe: f64) -> Option<(Severity, f64)> {
    if value >= severe {
        Some((Severity::Severe, severe))
    } else if value >= warning {
        Some((Severity::Warning, warning))
    } else {
        None
    }
}

fn flag(
    kind: AnomalyKind,
    day: &ForecastDay,
    observed_value: f64,
    threshold: f64,
    severity: Severity,
) -> AnomalyFlag {
    AnomalyFlag {
        kind,
        day_date: day.date.clone(),
        observed_value,
        threshold,
        severity,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn calm_day(date: &str) -> ForecastDay {
        ForecastDay {
            max_temp_c: Some(22.0),
            min_temp_c: Some(14.0),
            avg_temp_c: Some(18.0),
            total_precip_mm: Some(1.2),
            max_wind_kph: Some(20.0),
            uv_index: Some(4.0),
            condition_text: Some("Partly cloudy".to_string()),
            ..ForecastDay::new(date)
        }
    }

    fn fixed_baseline() -> AnomalyThresholds {
        AnomalyThresholds::default().with_baseline(25.0)
    }

    #[test]
    fn calm_week_produces_no_flags() {
        let days: Vec<ForecastDay> = (1..=7)
            .map(|day| calm_day(&format!("2025-11-0{day}")))
            .collect();

        let flags = evaluate(&days, &fixed_baseline()).expect("evaluate");
        assert!(flags.is_empty());

        let flags = evaluate(&days, &AnomalyThresholds::default()).expect("evaluate");
        assert!(flags.is_empty());
    }

    #[test]
    fn wind_of_ninety_is_severe_with_exact_observed_value() {
        let day = ForecastDay {
            max_wind_kph: Some(90.0),
            ..calm_day("2025-11-01")
        };

        let flags = evaluate(&[day], &fixed_baseline()).expect("evaluate");
        assert_eq!(
            flags,
            vec![AnomalyFlag {
                kind: AnomalyKind::HighWind,
                day_date: "2025-11-01".to_string(),
                observed_value: 90.0,
                threshold: WIND_SEVERE_KPH,
                severity: Severity::Severe,
            }]
        );
    }

    #[test]
    fn wind_exactly_at_warning_cutoff_is_not_flagged() {
        let day = ForecastDay {
            max_wind_kph: Some(50.0),
            ..calm_day("2025-11-01")
        };

        let flags = evaluate(&[day], &fixed_baseline()).expect("evaluate");
        assert!(flags.iter().all(|flag| flag.kind != AnomalyKind::HighWind));
    }

    #[test]
    fn hot_uv_day_matches_reference_scenario() {
        let day = ForecastDay {
            max_temp_c: Some(40.0),
            min_temp_c: Some(28.0),
            avg_temp_c: Some(34.0),
            total_precip_mm: Some(0.0),
            max_wind_kph: Some(30.0),
            uv_index: Some(9.0),
            ..ForecastDay::new("2025-11-01")
        };

        let flags = evaluate(&[day], &fixed_baseline()).expect("evaluate");
        let summary: Vec<(AnomalyKind, Severity, f64)> = flags
            .iter()
            .map(|flag| (flag.kind, flag.severity, flag.observed_value))
            .collect();
        assert_eq!(
            summary,
            vec![
                (AnomalyKind::HighTemp, Severity::Warning, 40.0),
                (AnomalyKind::HighUv, Severity::Warning, 9.0),
            ]
        );
        assert_eq!(flags[0].threshold, 30.0);
        assert_eq!(flags[1].threshold, UV_WARNING);
    }

    #[test]
    fn temperature_beyond_severe_delta_is_severe_and_cold_days_flag_low() {
        let hot = ForecastDay {
            max_temp_c: Some(40.5),
            ..calm_day("2025-07-01")
        };
        let cold = ForecastDay {
            max_temp_c: Some(18.0),
            ..calm_day("2025-07-02")
        };

        let flags = evaluate(&[hot, cold], &fixed_baseline()).expect("evaluate");
        assert_eq!(flags.len(), 2);
        assert_eq!(flags[0].kind, AnomalyKind::HighTemp);
        assert_eq!(flags[0].severity, Severity::Severe);
        assert_eq!(flags[0].threshold, 40.0);
        assert_eq!(flags[1].kind, AnomalyKind::LowTemp);
        assert_eq!(flags[1].severity, Severity::Warning);
        assert_eq!(flags[1].threshold, 20.0);
    }

    #[test]
    fn temperature_at_warning_cutoff_is_not_flagged() {
        let day = ForecastDay {
            max_temp_c: Some(30.0),
            ..calm_day("2025-07-01")
        };
        let flags = evaluate(&[day], &fixed_baseline()).expect("evaluate");
        assert!(flags.is_empty());
    }

    #[test]
    fn temperature_exactly_at_severe_cutoff_stays_warning() {
        let day = ForecastDay {
            max_temp_c: Some(40.0),
            ..calm_day("2025-07-01")
        };

        let flags = evaluate(&[day], &fixed_baseline()).expect("evaluate");
        assert_eq!(
            flags,
            vec![AnomalyFlag {
                kind: AnomalyKind::HighTemp,
                day_date: "2025-07-01".to_string(),
                observed_value: 40.0,
                threshold: 30.0,
                severity: Severity::Warning,
            }]
        );
    }

    #[test]
    fn cold_day_beyond_severe_cutoff_is_severe_low_temp() {
        let day = ForecastDay {
            max_temp_c: Some(8.0),
            ..calm_day("2025-01-10")
        };

        let flags = evaluate(&[day], &fixed_baseline()).expect("evaluate");
        assert_eq!(
            flags,
            vec![AnomalyFlag {
                kind: AnomalyKind::LowTemp,
                day_date: "2025-01-10".to_string(),
                observed_value: 8.0,
                threshold: 10.0,
                severity: Severity::Severe,
            }]
        );
    }

    #[test]
    fn severe_temperature_cutoff_follows_warning_delta() {
        let thresholds = AnomalyThresholds {
            temp_delta_c: 2.0,
            ..fixed_baseline()
        };
        assert_eq!(thresholds.severe_temp_delta(), 6.0);
        assert_eq!(AnomalyThresholds::default().severe_temp_delta(), 15.0);

        let day = ForecastDay {
            max_temp_c: Some(31.5),
            ..calm_day("2025-07-01")
        };
        let flags = evaluate(std::slice::from_ref(&day), &thresholds).expect("evaluate");
        assert_eq!(flags[0].severity, Severity::Severe);
        assert_eq!(flags[0].threshold, 31.0);

        let pinned = AnomalyThresholds {
            temp_severe_delta_c: Some(8.0),
            ..thresholds
        };
        let flags = evaluate(&[day], &pinned).expect("evaluate");
        assert_eq!(flags[0].severity, Severity::Warning);
        assert_eq!(flags[0].threshold, 27.0);
    }

    #[test]
    fn period_mean_baseline_is_used_when_none_configured() {
        let mut days: Vec<ForecastDay> = (1..=4)
            .map(|day| ForecastDay {
                max_temp_c: Some(20.0),
                avg_temp_c: Some(16.0),
                ..calm_day(&format!("2025-03-0{day}"))
            })
            .collect();
        days.push(ForecastDay {
            max_temp_c: Some(30.0),
            avg_temp_c: Some(26.0),
            ..calm_day("2025-03-05")
        });

        // mean max_temp_c = 22.0; only the last day deviates by more than 5.
        let flags = evaluate(&days, &AnomalyThresholds::default()).expect("evaluate");
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].kind, AnomalyKind::HighTemp);
        assert_eq!(flags[0].day_date, "2025-03-05");
        assert_eq!(flags[0].threshold, 27.0);
        assert_eq!(flags[0].severity, Severity::Warning);
    }

    #[test]
    fn uniform_week_has_no_temperature_flags_without_baseline() {
        let days: Vec<ForecastDay> = (1..=7)
            .map(|day| ForecastDay {
                max_temp_c: Some(24.0),
                avg_temp_c: Some(18.0),
                min_temp_c: Some(12.0),
                ..calm_day(&format!("2025-05-0{day}"))
            })
            .collect();

        let flags = evaluate(&days, &AnomalyThresholds::default()).expect("evaluate");
        assert!(flags.is_empty());
    }

    #[test]
    fn precip_and_uv_severity_cutoffs() {
        let day = ForecastDay {
            total_precip_mm: Some(120.4),
            uv_index: Some(11.0),
            ..calm_day("2025-11-01")
        };

        let flags = evaluate(&[day], &fixed_baseline()).expect("evaluate");
        assert_eq!(flags.len(), 2);
        assert_eq!(flags[0].kind, AnomalyKind::HeavyPrecip);
        assert_eq!(flags[0].severity, Severity::Severe);
        assert_eq!(flags[0].observed_value, 120.4);
        assert_eq!(flags[1].kind, AnomalyKind::HighUv);
        assert_eq!(flags[1].severity, Severity::Severe);
    }

    #[test]
    fn flags_follow_day_order_then_check_order() {
        let first = ForecastDay {
            uv_index: Some(8.0),
            max_wind_kph: Some(55.0),
            ..calm_day("2025-11-01")
        };
        let second = ForecastDay {
            total_precip_mm: Some(60.0),
            ..calm_day("2025-11-02")
        };

        let flags = evaluate(&[first, second], &fixed_baseline()).expect("evaluate");
        let order: Vec<(&str, AnomalyKind)> = flags
            .iter()
            .map(|flag| (flag.day_date.as_str(), flag.kind))
            .collect();
        assert_eq!(
            order,
            vec![
                ("2025-11-01", AnomalyKind::HighWind),
                ("2025-11-01", AnomalyKind::HighUv),
                ("2025-11-02", AnomalyKind::HeavyPrecip),
            ]
        );
    }

    #[test]
    fn absent_fields_are_skipped_not_zeroed() {
        let day = ForecastDay::new("2025-11-01");
        let thresholds = AnomalyThresholds {
            uv_warning: 0.0,
            ..fixed_baseline()
        };

        let flags = evaluate(&[day], &thresholds).expect("evaluate");
        assert!(flags.is_empty());
    }

    #[test]
    fn evaluate_is_idempotent() {
        let days = vec![
            ForecastDay {
                max_wind_kph: Some(85.0),
                ..calm_day("2025-11-01")
            },
            calm_day("2025-11-02"),
        ];

        let first = evaluate(&days, &fixed_baseline()).expect("evaluate");
        let second = evaluate(&days, &fixed_baseline()).expect("evaluate");
        assert_eq!(first, second);
    }

    #[test]
    fn overridden_thresholds_change_cutoffs() {
        let thresholds = AnomalyThresholds {
            wind_warning_kph: 20.0,
            wind_severe_kph: 40.0,
            ..fixed_baseline()
        };
        let day = ForecastDay {
            max_wind_kph: Some(30.0),
            ..calm_day("2025-11-01")
        };

        let flags = evaluate(&[day], &thresholds).expect("evaluate");
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].severity, Severity::Warning);
        assert_eq!(flags[0].threshold, 20.0);
    }

    #[test]
    fn non_finite_value_is_a_validation_error() {
        let day = ForecastDay {
            uv_index: Some(f64::NAN),
            ..calm_day("2025-11-01")
        };

        let err = evaluate(&[day], &fixed_baseline()).expect_err("must fail");
        assert_eq!(
            err,
            ValidationError::NonFinite {
                date: "2025-11-01".to_string(),
                field: "uv_index".to_string(),
            }
        );
    }

    #[test]
    fn evaluate_json_rejects_non_numeric_temperature() {
        let payload = json!([{
            "date": "2025-11-01",
            "max_temp_c": "hot",
            "uv_index": 9,
            "max_wind_kph": 30,
            "total_precip_mm": 0,
            "min_temp_c": 28,
            "avg_temp_c": 34
        }]);

        let err = evaluate_json(&payload, &fixed_baseline()).expect_err("must fail");
        assert_eq!(err.day_date(), Some("2025-11-01"));
        assert_eq!(err.field(), Some("max_temp_c"));
    }

    #[test]
    fn evaluate_json_matches_typed_evaluation() {
        let payload = json!([{
            "date": "2025-11-01",
            "max_temp_c": 40,
            "uv_index": 9,
            "max_wind_kph": 30,
            "total_precip_mm": 0,
            "min_temp_c": 28,
            "avg_temp_c": 34
        }]);

        let flags = evaluate_json(&payload, &fixed_baseline()).expect("evaluate");
        assert_eq!(flags.len(), 2);
        assert_eq!(flags[0].kind, AnomalyKind::HighTemp);
        assert_eq!(flags[1].kind, AnomalyKind::HighUv);
    }

    #[test]
    fn flag_kinds_serialize_in_snake_case() {
        let value = serde_json::to_value(AnomalyKind::HighUv).expect("json");
        assert_eq!(value, json!("high_uv"));
        let value = serde_json::to_value(Severity::Severe).expect("json");
        assert_eq!(value, json!("severe"));
    }

    #[test]
    fn describe_mentions_date_value_and_cutoff() {
        let flag = AnomalyFlag {
            kind: AnomalyKind::HighWind,
            day_date: "2025-11-01".to_string(),
            observed_value: 90.0,
            threshold: 80.0,
            severity: Severity::Severe,
        };
        assert_eq!(
            flag.describe(),
            "High wind speed on 2025-11-01: 90.0 km/h (severe above 80.0 km/h)"
        );
    }
}
