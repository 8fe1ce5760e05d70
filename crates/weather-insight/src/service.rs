use std::path::PathBuf;

use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::Value;

use crate::anomaly::{AnomalyFlag, AnomalyThresholds, evaluate, evaluate_json};
use crate::charts::{ChartSet, UnitSystem, chart_set};
use crate::config::{GEMINI_API_KEY_ENV, RuntimeConfig, ServiceStatus};
use crate::error::AppError;
use crate::insight::{
    InsightKind, TextGenerator, activities_prompt, current_prompt, forecast_prompt, insight_prompt,
};
use crate::model::{
    CacheMetadata, CurrentConditions, ForecastDay, ForecastLocation, ForecastRequest,
    LocatedForecast, LocationMatch, normalize_location,
};
use crate::providers::WeatherApi;
use crate::snapshot::{Snapshot, SnapshotStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastReport {
    pub location: ForecastLocation,
    pub fetched_at: String,
    pub cache: CacheMetadata,
    pub days: Vec<ForecastDay>,
    pub flags: Vec<AnomalyFlag>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyReport {
    pub location: Option<ForecastLocation>,
    pub cache: Option<CacheMetadata>,
    pub day_count: usize,
    pub thresholds: AnomalyThresholds,
    pub flags: Vec<AnomalyFlag>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartReport {
    pub location: ForecastLocation,
    pub cache: CacheMetadata,
    pub charts: ChartSet,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightReport {
    pub kind: InsightKind,
    pub location: String,
    pub cache: Option<CacheMetadata>,
    pub flags: Vec<AnomalyFlag>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub weather_api: &'static str,
    pub gemini: &'static str,
    pub default_location: String,
    pub forecast_days: u8,
    pub cache_ttl_secs: u64,
    pub gemini_model: String,
    pub thresholds: AnomalyThresholds,
    pub config_file: Option<PathBuf>,
    pub problems: Vec<String>,
}

pub fn status_report(config: &RuntimeConfig) -> StatusReport {
    let ServiceStatus {
        weather_api,
        gemini,
    } = config.status();

    StatusReport {
        weather_api: ServiceStatus::label(weather_api),
        gemini: ServiceStatus::label(gemini),
        default_location: config.default_location.clone(),
        forecast_days: config.forecast_days,
        cache_ttl_secs: config.cache_ttl_secs,
        gemini_model: config.gemini.model.clone(),
        thresholds: config.thresholds,
        config_file: config.config_file.clone(),
        problems: config.validate(),
    }
}

/// Evaluates an offline forecast payload (a `days` array or an object
/// carrying one).
pub fn anomalies_from_value(
    payload: &Value,
    thresholds: &AnomalyThresholds,
) -> Result<AnomalyReport, AppError> {
    let flags = evaluate_json(payload, thresholds)?;
    let day_count = match payload {
        Value::Array(items) => items.len(),
        other => other
            .get("days")
            .and_then(Value::as_array)
            .map_or(0, Vec::len),
    };

    Ok(AnomalyReport {
        location: None,
        cache: None,
        day_count,
        thresholds: *thresholds,
        flags,
    })
}

/// Dashboard operations over one weather collaborator, an optional text
/// generator and a snapshot store owned for the service's lifetime.
pub struct DashboardService<W, G> {
    config: RuntimeConfig,
    weather: W,
    generator: Option<G>,
    store: SnapshotStore<LocatedForecast>,
}

impl<W, G> DashboardService<W, G>
where
    W: WeatherApi,
    G: TextGenerator,
{
    pub fn new(config: RuntimeConfig, weather: W, generator: Option<G>) -> Self {
        let store = SnapshotStore::new(config.cache_ttl_secs);
        Self::with_store(config, weather, generator, store)
    }

    pub fn with_store(
        config: RuntimeConfig,
        weather: W,
        generator: Option<G>,
        store: SnapshotStore<LocatedForecast>,
    ) -> Self {
        Self {
            config,
            weather,
            generator,
            store,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn store(&self) -> &SnapshotStore<LocatedForecast> {
        &self.store
    }

    pub fn forecast(
        &self,
        location: Option<&str>,
        days: Option<i64>,
    ) -> Result<ForecastReport, AppError> {
        let snapshot = self.snapshot(location, days)?;
        let flags = evaluate(&snapshot.payload.days, &self.config.thresholds)?;

        Ok(ForecastReport {
            location: snapshot.payload.location.clone(),
            fetched_at: snapshot
                .fetched_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            cache: snapshot.cache,
            days: snapshot.payload.days.clone(),
            flags,
        })
    }

    pub fn anomalies(
        &self,
        location: Option<&str>,
        days: Option<i64>,
    ) -> Result<AnomalyReport, AppError> {
        let snapshot = self.snapshot(location, days)?;
        let flags = evaluate(&snapshot.payload.days, &self.config.thresholds)?;

        Ok(AnomalyReport {
            location: Some(snapshot.payload.location.clone()),
            cache: Some(snapshot.cache),
            day_count: snapshot.payload.days.len(),
            thresholds: self.config.thresholds,
            flags,
        })
    }

    pub fn charts(
        &self,
        location: Option<&str>,
        days: Option<i64>,
        date: Option<&str>,
        units: UnitSystem,
    ) -> Result<ChartReport, AppError> {
        let snapshot = self.snapshot(location, days)?;
        let charts = chart_set(
            &snapshot.payload.days,
            units,
            self.config.thresholds.wind_warning_kph,
            date,
        );

        if let Some(date) = date
            && charts.hourly.is_none()
        {
            return Err(AppError::invalid_input(format!(
                "no forecast day for {} in the {}-day forecast",
                date.trim(),
                snapshot.payload.days.len()
            )));
        }

        Ok(ChartReport {
            location: snapshot.payload.location.clone(),
            cache: snapshot.cache,
            charts,
        })
    }

    pub fn current(&self, location: Option<&str>) -> Result<CurrentConditions, AppError> {
        let location = self.location_or_default(location)?;
        Ok(self.weather.fetch_current(&location)?)
    }

    pub fn search(&self, query: &str) -> Result<Vec<LocationMatch>, AppError> {
        let query = normalize_location(query)?;
        Ok(self.weather.search_locations(&query)?)
    }

    /// Builds the prompt for `kind` and hands it to the generator once.
    pub fn insight(
        &self,
        location: Option<&str>,
        days: Option<i64>,
        kind: InsightKind,
    ) -> Result<InsightReport, AppError> {
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| AppError::missing_api_key(GEMINI_API_KEY_ENV))?;

        let (label, cache, flags, prompt) = if kind.uses_current_conditions() {
            let current = self.current(location)?;
            let prompt = match kind {
                InsightKind::Activities => activities_prompt(&current),
                _ => current_prompt(&current),
            };
            (current.location.label(), None, Vec::new(), prompt)
        } else {
            let snapshot = self.snapshot(location, days)?;
            let forecast = &snapshot.payload;
            let (flags, prompt) = match kind {
                InsightKind::Forecast => {
                    (Vec::new(), forecast_prompt(&forecast.location, &forecast.days))
                }
                _ => {
                    let flags = evaluate(&forecast.days, &self.config.thresholds)?;
                    let prompt = insight_prompt(&forecast.location, &forecast.days, &flags);
                    (flags, prompt)
                }
            };
            (forecast.location.label(), Some(snapshot.cache), flags, prompt)
        };

        tracing::debug!(kind = %kind, location = %label, "requesting insight");
        let text = generator.generate(&prompt, self.config.gemini.temperature)?;

        Ok(InsightReport {
            kind,
            location: label,
            cache,
            flags,
            text,
        })
    }

    /// Drops the snapshot for one location and day count.
    pub fn refresh(&self, location: Option<&str>, days: Option<i64>) -> Result<bool, AppError> {
        let request = self.request(location, days)?;
        Ok(self.store.invalidate(&request.location, request.days))
    }

    pub fn refresh_all(&self) -> usize {
        let dropped = self.store.len();
        self.store.clear();
        dropped
    }

    fn snapshot(
        &self,
        location: Option<&str>,
        days: Option<i64>,
    ) -> Result<Snapshot<LocatedForecast>, AppError> {
        let request = self.request(location, days)?;
        let snapshot = self
            .store
            .get_or_fetch(&request.location, request.days, |location, days| {
                self.weather.fetch_forecast(location, days)
            })?;
        Ok(snapshot)
    }

    fn request(&self, location: Option<&str>, days: Option<i64>) -> Result<ForecastRequest, AppError> {
        let location = self.location_or_default(location)?;
        let days = days.unwrap_or(i64::from(self.config.forecast_days));
        Ok(ForecastRequest::new(&location, days)?)
    }

    fn location_or_default(&self, location: Option<&str>) -> Result<String, AppError> {
        match location {
            Some(location) => Ok(normalize_location(location)?),
            None => Ok(normalize_location(&self.config.default_location)?),
        }
    }
}
