use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::anomaly::AnomalyThresholds;
use crate::model::{MAX_FORECAST_DAYS, MIN_FORECAST_DAYS};

pub const WEATHER_API_BASE_URL: &str = "https://api.weatherapi.com/v1";
pub const DEFAULT_LOCATION: &str = "London";
pub const DEFAULT_FORECAST_DAYS: u8 = 7;
pub const CACHE_TTL_SECS: u64 = 600;
pub const PROVIDER_TIMEOUT_SECS: u64 = 10;

pub const GEMINI_MODEL: &str = "gemini-2.0-flash-exp";
pub const GEMINI_TEMPERATURE: f64 = 0.2;
pub const GEMINI_MAX_OUTPUT_TOKENS: u32 = 1000;

pub const WEATHERAPI_KEY_ENV: &str = "WEATHERAPI_KEY";
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const CONFIG_FILE_ENV: &str = "WEATHER_INSIGHT_CONFIG";
const WEATHER_API_BASE_URL_ENV: &str = "WEATHER_API_BASE_URL";
const DEFAULT_LOCATION_ENV: &str = "WEATHER_DEFAULT_LOCATION";
const FORECAST_DAYS_ENV: &str = "WEATHER_FORECAST_DAYS";
const CACHE_TTL_SECS_ENV: &str = "WEATHER_CACHE_TTL_SECS";
const GEMINI_MODEL_ENV: &str = "GEMINI_MODEL";
const GEMINI_TEMPERATURE_ENV: &str = "GEMINI_TEMPERATURE";
const GEMINI_MAX_TOKENS_ENV: &str = "GEMINI_MAX_TOKENS";
const HOME_ENV: &str = "HOME";

const TEMP_BASELINE_ENV: &str = "WEATHER_TEMP_BASELINE_C";
const TEMP_DELTA_ENV: &str = "WEATHER_TEMP_DELTA_C";
const TEMP_SEVERE_DELTA_ENV: &str = "WEATHER_TEMP_SEVERE_DELTA_C";
const WIND_WARNING_ENV: &str = "WEATHER_WIND_WARNING_KPH";
const WIND_SEVERE_ENV: &str = "WEATHER_WIND_SEVERE_KPH";
const PRECIP_WARNING_ENV: &str = "WEATHER_PRECIP_WARNING_MM";
const PRECIP_SEVERE_ENV: &str = "WEATHER_PRECIP_SEVERE_MM";
const UV_WARNING_ENV: &str = "WEATHER_UV_WARNING";
const UV_SEVERE_ENV: &str = "WEATHER_UV_SEVERE";

const PLACEHOLDER_KEYS: [&str; 2] = ["your_weatherapi_key_here", "your_gemini_api_key_here"];

#[derive(Debug, Clone, PartialEq)]
pub struct GeminiSettings {
    pub model: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            model: GEMINI_MODEL.to_string(),
            temperature: GEMINI_TEMPERATURE,
            max_output_tokens: GEMINI_MAX_OUTPUT_TOKENS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub weather_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub weather_api_base_url: String,
    pub default_location: String,
    pub forecast_days: u8,
    pub cache_ttl_secs: u64,
    pub gemini: GeminiSettings,
    pub thresholds: AnomalyThresholds,
    pub config_file: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            weather_api_key: None,
            gemini_api_key: None,
            weather_api_base_url: WEATHER_API_BASE_URL.to_string(),
            default_location: DEFAULT_LOCATION.to_string(),
            forecast_days: DEFAULT_FORECAST_DAYS,
            cache_ttl_secs: CACHE_TTL_SECS,
            gemini: GeminiSettings::default(),
            thresholds: AnomalyThresholds::default(),
            config_file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub weather_api: bool,
    pub gemini: bool,
}

impl ServiceStatus {
    pub fn label(configured: bool) -> &'static str {
        if configured {
            "Configured"
        } else {
            "Not Configured"
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_pairs(std::env::vars())
    }

    /// Layers defaults, the optional TOML file and environment overrides,
    /// in that order.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let env_map: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let mut config = Self::default();

        if let Some(path) = non_empty(&env_map, CONFIG_FILE_ENV) {
            let path = PathBuf::from(expand_home_path(path, non_empty(&env_map, HOME_ENV)));
            FileConfig::load(&path)?.apply(&mut config);
            config.config_file = Some(path);
        }

        config.apply_env(&env_map)?;
        config.validate_settings()?;
        Ok(config)
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            weather_api: self.weather_api_key.is_some(),
            gemini: self.gemini_api_key.is_some(),
        }
    }

    /// Human-readable list of settings that keep a service from working.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.weather_api_key.is_none() {
            problems.push(format!("{WEATHERAPI_KEY_ENV} is not configured"));
        }
        if self.gemini_api_key.is_none() {
            problems.push(format!("{GEMINI_API_KEY_ENV} is not configured"));
        }
        problems
    }

    fn apply_env(&mut self, env_map: &HashMap<String, String>) -> Result<(), ConfigError> {
        if let Some(key) = api_key(env_map, WEATHERAPI_KEY_ENV) {
            self.weather_api_key = Some(key);
        }
        if let Some(key) = api_key(env_map, GEMINI_API_KEY_ENV) {
            self.gemini_api_key = Some(key);
        }
        if let Some(url) = non_empty(env_map, WEATHER_API_BASE_URL_ENV) {
            self.weather_api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(location) = non_empty(env_map, DEFAULT_LOCATION_ENV) {
            self.default_location = location.to_string();
        }
        if let Some(days) = parse_env::<i64>(env_map, FORECAST_DAYS_ENV)? {
            self.forecast_days = clamp_forecast_days(days);
        }
        if let Some(ttl) = parse_env::<u64>(env_map, CACHE_TTL_SECS_ENV)? {
            self.cache_ttl_secs = ttl;
        }
        if let Some(model) = non_empty(env_map, GEMINI_MODEL_ENV) {
            self.gemini.model = model.to_string();
        }
        if let Some(temperature) = parse_env::<f64>(env_map, GEMINI_TEMPERATURE_ENV)? {
            self.gemini.temperature = temperature;
        }
        if let Some(tokens) = parse_env::<u32>(env_map, GEMINI_MAX_TOKENS_ENV)? {
            self.gemini.max_output_tokens = tokens;
        }

        let overrides = ThresholdOverrides {
            temp_baseline_c: parse_env(env_map, TEMP_BASELINE_ENV)?,
            temp_delta_c: parse_env(env_map, TEMP_DELTA_ENV)?,
            temp_severe_delta_c: parse_env(env_map, TEMP_SEVERE_DELTA_ENV)?,
            wind_warning_kph: parse_env(env_map, WIND_WARNING_ENV)?,
            wind_severe_kph: parse_env(env_map, WIND_SEVERE_ENV)?,
            precip_warning_mm: parse_env(env_map, PRECIP_WARNING_ENV)?,
            precip_severe_mm: parse_env(env_map, PRECIP_SEVERE_ENV)?,
            uv_warning: parse_env(env_map, UV_WARNING_ENV)?,
            uv_severe: parse_env(env_map, UV_SEVERE_ENV)?,
        };
        overrides.apply(&mut self.thresholds);
        Ok(())
    }

    fn validate_settings(&self) -> Result<(), ConfigError> {
        if self.cache_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: CACHE_TTL_SECS_ENV.to_string(),
                value: "0".to_string(),
                expected: "a positive number of seconds",
            });
        }
        if !(0.0..=2.0).contains(&self.gemini.temperature) {
            return Err(ConfigError::InvalidValue {
                key: GEMINI_TEMPERATURE_ENV.to_string(),
                value: self.gemini.temperature.to_string(),
                expected: "a value within 0.0..=2.0",
            });
        }

        let t = &self.thresholds;
        if t.temp_baseline_c.is_some_and(|baseline| !baseline.is_finite()) {
            return Err(ConfigError::InconsistentThresholds(
                "temperature baseline must be finite".to_string(),
            ));
        }
        let pairs = [
            ("temperature", t.temp_delta_c, t.severe_temp_delta()),
            ("wind", t.wind_warning_kph, t.wind_severe_kph),
            ("precipitation", t.precip_warning_mm, t.precip_severe_mm),
            ("uv", t.uv_warning, t.uv_severe),
        ];
        for (name, warning, severe) in pairs {
            if !warning.is_finite() || !severe.is_finite() || warning < 0.0 {
                return Err(ConfigError::InconsistentThresholds(format!(
                    "{name} cutoffs must be finite and non-negative"
                )));
            }
            if severe < warning {
                return Err(ConfigError::InconsistentThresholds(format!(
                    "{name} severe cutoff {severe} is below warning cutoff {warning}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    default_location: Option<String>,
    forecast_days: Option<i64>,
    cache_ttl_secs: Option<u64>,
    thresholds: ThresholdOverrides,
    gemini: GeminiOverrides,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct GeminiOverrides {
    model: Option<String>,
    temperature: Option<f64>,
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ThresholdOverrides {
    temp_baseline_c: Option<f64>,
    temp_delta_c: Option<f64>,
    temp_severe_delta_c: Option<f64>,
    wind_warning_kph: Option<f64>,
    wind_severe_kph: Option<f64>,
    precip_warning_mm: Option<f64>,
    precip_severe_mm: Option<f64>,
    uv_warning: Option<f64>,
    uv_severe: Option<f64>,
}

impl ThresholdOverrides {
    fn apply(&self, thresholds: &mut AnomalyThresholds) {
        if self.temp_baseline_c.is_some() {
            thresholds.temp_baseline_c = self.temp_baseline_c;
        }
        if self.temp_severe_delta_c.is_some() {
            thresholds.temp_severe_delta_c = self.temp_severe_delta_c;
        }
        let targets = [
            (self.temp_delta_c, &mut thresholds.temp_delta_c),
            (self.wind_warning_kph, &mut thresholds.wind_warning_kph),
            (self.wind_severe_kph, &mut thresholds.wind_severe_kph),
            (self.precip_warning_mm, &mut thresholds.precip_warning_mm),
            (self.precip_severe_mm, &mut thresholds.precip_severe_mm),
            (self.uv_warning, &mut thresholds.uv_warning),
            (self.uv_severe, &mut thresholds.uv_severe),
        ];
        for (value, target) in targets {
            if let Some(value) = value {
                *target = value;
            }
        }
    }
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|error| ConfigError::ReadFile {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;
        toml::from_str(&raw).map_err(|error| ConfigError::ParseFile {
            path: path.to_path_buf(),
            message: error.message().to_string(),
        })
    }

    fn apply(self, config: &mut RuntimeConfig) {
        if let Some(location) = self
            .default_location
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
        {
            config.default_location = location;
        }
        if let Some(days) = self.forecast_days {
            config.forecast_days = clamp_forecast_days(days);
        }
        if let Some(ttl) = self.cache_ttl_secs {
            config.cache_ttl_secs = ttl;
        }
        if let Some(model) = self.gemini.model {
            config.gemini.model = model;
        }
        if let Some(temperature) = self.gemini.temperature {
            config.gemini.temperature = temperature;
        }
        if let Some(tokens) = self.gemini.max_output_tokens {
            config.gemini.max_output_tokens = tokens;
        }
        self.thresholds.apply(&mut config.thresholds);
    }
}

fn non_empty<'a>(env_map: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    env_map
        .get(key)
        .map(String::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn api_key(env_map: &HashMap<String, String>, key: &str) -> Option<String> {
    non_empty(env_map, key)
        .filter(|value| !PLACEHOLDER_KEYS.contains(value))
        .map(ToOwned::to_owned)
}

fn parse_env<T: std::str::FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let Some(raw) = non_empty(env_map, key) else {
        return Ok(None);
    };
    raw.parse::<T>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            expected: "a number",
        })
}

fn clamp_forecast_days(days: i64) -> u8 {
    u8::try_from(days.clamp(MIN_FORECAST_DAYS, MAX_FORECAST_DAYS)).unwrap_or(DEFAULT_FORECAST_DAYS)
}

fn expand_home_path(raw: &str, home: Option<&str>) -> String {
    let trimmed = raw.trim();
    let Some(home) = home.map(str::trim).filter(|value| !value.is_empty()) else {
        return trimmed.to_string();
    };

    let home = home.trim_end_matches('/');
    let mut expanded = trimmed.replace("$HOME", home);

    if expanded == "~" {
        expanded = home.to_string();
    } else if let Some(rest) = expanded.strip_prefix("~/") {
        expanded = format!("{home}/{rest}");
    }

    expanded
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid {key}: {value} (expected {expected})")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
    #[error("inconsistent anomaly thresholds: {0}")]
    InconsistentThresholds(String),
    #[error("failed to read config file {path}: {message}")]
    ReadFile { path: PathBuf, message: String },
    #[error("failed to parse config file {path}: {message}")]
    ParseFile { path: PathBuf, message: String },
}
