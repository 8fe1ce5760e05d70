use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use weather_insight::{
    charts::UnitSystem,
    config::{RuntimeConfig, WEATHERAPI_KEY_ENV},
    error::{
        AppError, ERROR_CODE_RUNTIME_IO, ERROR_CODE_RUNTIME_PROVIDER_INIT,
        ERROR_CODE_USER_INPUT_UNREADABLE,
    },
    insight::{InsightKind, TextGenerator},
    providers::{WeatherApi, gemini::GeminiClient, weatherapi::WeatherApiClient},
    render,
    service::{self, DashboardService},
    session,
};

const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Weather dashboard CLI: WeatherAPI.com forecasts, anomaly flags and Gemini insights"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Forecast days with anomaly flags.
    Forecast {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Current conditions.
    Current {
        #[arg(long)]
        location: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Search locations by name.
    Search {
        query: String,
        #[arg(long)]
        json: bool,
    },
    /// Anomaly flags from a live forecast or a JSON file of days.
    Anomalies {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long, conflicts_with_all = ["location", "days"])]
        input: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Chart series for the forecast.
    Charts {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        date: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// AI commentary from the generation service.
    Insight {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long, default_value = "anomalies")]
        kind: InsightKind,
        #[arg(long)]
        json: bool,
    },
    /// Interactive session over stdin sharing one forecast cache.
    Session {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Configuration status.
    Status {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Args)]
struct TargetArgs {
    #[arg(long)]
    location: Option<String>,
    #[arg(long, allow_negative_numbers = true)]
    days: Option<i64>,
}

#[derive(Debug, Clone, Copy, Args)]
struct OutputArgs {
    #[arg(long)]
    json: bool,
    #[arg(long, value_enum, default_value_t = UnitsArg::Metric)]
    units: UnitsArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum UnitsArg {
    Metric,
    Imperial,
}

impl From<UnitsArg> for UnitSystem {
    fn from(value: UnitsArg) -> Self {
        match value {
            UnitsArg::Metric => UnitSystem::Metric,
            UnitsArg::Imperial => UnitSystem::Imperial,
        }
    }
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Forecast { .. } => "weather.forecast",
            Commands::Current { .. } => "weather.current",
            Commands::Search { .. } => "weather.search",
            Commands::Anomalies { .. } => "weather.anomalies",
            Commands::Charts { .. } => "weather.charts",
            Commands::Insight { .. } => "weather.insight",
            Commands::Session { .. } => "weather.session",
            Commands::Status { .. } => "weather.status",
        }
    }

    fn json(&self) -> bool {
        match self {
            Commands::Forecast { output, .. }
            | Commands::Current { output, .. }
            | Commands::Charts { output, .. }
            | Commands::Session { output } => output.json,
            Commands::Search { json, .. }
            | Commands::Anomalies { json, .. }
            | Commands::Insight { json, .. }
            | Commands::Status { json } => *json,
        }
    }
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let command = cli.command.name();
    let json = cli.command.json();
    match run(cli) {
        Ok(output) => println!("{output}"),
        Err(error) => {
            emit_error(command, json, &error);
            std::process::exit(error.exit_code());
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<String, AppError> {
    let config = RuntimeConfig::from_env()?;

    match cli.command {
        Commands::Status { json } => render_status(&config, json),
        Commands::Anomalies {
            input: Some(path),
            json,
            ..
        } => run_offline_anomalies(&config, &path, json),
        command => {
            let service = build_service(config)?;
            let stdin = io::stdin();
            let stdout = io::stdout();
            run_with(command, &service, stdin.lock(), &mut stdout.lock())
        }
    }
}

fn build_service(
    config: RuntimeConfig,
) -> Result<DashboardService<WeatherApiClient, GeminiClient>, AppError> {
    let weather_key = config
        .weather_api_key
        .clone()
        .ok_or_else(|| AppError::missing_api_key(WEATHERAPI_KEY_ENV))?;
    let weather = WeatherApiClient::new(weather_key, config.weather_api_base_url.clone())
        .map_err(|error| AppError::runtime(ERROR_CODE_RUNTIME_PROVIDER_INIT, error.to_string()))?;
    let generator = match config.gemini_api_key.clone() {
        Some(key) => Some(
            GeminiClient::new(key, config.gemini.clone()).map_err(|error| {
                AppError::runtime(ERROR_CODE_RUNTIME_PROVIDER_INIT, error.to_string())
            })?,
        ),
        None => None,
    };

    Ok(DashboardService::new(config, weather, generator))
}

fn run_with<W, G, R, O>(
    command: Commands,
    service: &DashboardService<W, G>,
    input: R,
    output: &mut O,
) -> Result<String, AppError>
where
    W: WeatherApi,
    G: TextGenerator,
    R: BufRead,
    O: Write,
{
    let name = command.name();
    match command {
        Commands::Forecast { target, output } => {
            let report = service.forecast(target.location.as_deref(), target.days)?;
            if output.json {
                render::json_envelope(name, &report)
            } else {
                Ok(render::forecast_text(&report, output.units.into()))
            }
        }
        Commands::Current { location, output } => {
            let current = service.current(location.as_deref())?;
            if output.json {
                render::json_envelope(name, &current)
            } else {
                Ok(render::current_text(&current, output.units.into()))
            }
        }
        Commands::Search { query, json } => {
            let matches = service.search(&query)?;
            if json {
                render::json_envelope(name, &matches)
            } else {
                Ok(render::search_text(&matches))
            }
        }
        Commands::Anomalies { target, json, .. } => {
            let report = service.anomalies(target.location.as_deref(), target.days)?;
            if json {
                render::json_envelope(name, &report)
            } else {
                Ok(render::anomalies_text(&report))
            }
        }
        Commands::Charts {
            target,
            date,
            output,
        } => {
            let report = service.charts(
                target.location.as_deref(),
                target.days,
                date.as_deref(),
                output.units.into(),
            )?;
            if output.json {
                render::json_envelope(name, &report)
            } else {
                Ok(render::charts_text(&report))
            }
        }
        Commands::Insight { target, kind, json } => {
            let report = service.insight(target.location.as_deref(), target.days, kind)?;
            if json {
                render::json_envelope(name, &report)
            } else {
                Ok(render::insight_text(&report))
            }
        }
        Commands::Session { output: args } => {
            let summary = session::run_session(service, input, output, args.units.into(), args.json)
                .map_err(|error| {
                    AppError::runtime(ERROR_CODE_RUNTIME_IO, format!("session i/o failed: {error}"))
                })?;
            if args.json {
                render::json_envelope(name, &summary)
            } else {
                Ok(format!(
                    "session ended: {} command(s), {} error(s)",
                    summary.commands, summary.errors
                ))
            }
        }
        Commands::Status { json } => render_status(service.config(), json),
    }
}

fn render_status(config: &RuntimeConfig, json: bool) -> Result<String, AppError> {
    let report = service::status_report(config);
    if json {
        render::json_envelope("weather.status", &report)
    } else {
        Ok(render::status_text(&report))
    }
}

fn run_offline_anomalies(
    config: &RuntimeConfig,
    path: &Path,
    json: bool,
) -> Result<String, AppError> {
    let raw = fs::read_to_string(path).map_err(|error| {
        AppError::user(
            ERROR_CODE_USER_INPUT_UNREADABLE,
            format!("failed to read {}: {error}", path.display()),
        )
    })?;
    let payload: Value = serde_json::from_str(&raw).map_err(|error| {
        AppError::invalid_input(format!("{} is not valid JSON: {error}", path.display()))
    })?;

    let report = service::anomalies_from_value(&payload, &config.thresholds)?;
    if json {
        render::json_envelope("weather.anomalies", &report)
    } else {
        Ok(render::anomalies_text(&report))
    }
}

fn emit_error(command: &str, json: bool, error: &AppError) {
    if json {
        println!("{}", render::json_error_envelope(command, error));
    } else {
        eprintln!("{}", render::error_line(error));
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::io::Cursor;

    use weather_insight::{
        error::ErrorKind,
        model::{CurrentConditions, ForecastDay, ForecastLocation, LocatedForecast, LocationMatch},
        providers::{ProviderError, gemini::GenerationError},
    };

    use super::*;

    struct FakeWeather {
        forecast_result: Result<LocatedForecast, ProviderError>,
        forecast_calls: Cell<usize>,
    }

    impl FakeWeather {
        fn ok() -> Self {
            let mut day = ForecastDay::new("2025-11-01");
            day.max_temp_c = Some(40.0);
            day.min_temp_c = Some(28.0);
            day.avg_temp_c = Some(34.0);
            day.max_wind_kph = Some(30.0);
            day.total_precip_mm = Some(0.0);
            day.uv_index = Some(9.0);
            day.condition_text = Some("Sunny".to_string());

            Self {
                forecast_result: Ok(LocatedForecast {
                    location: location(),
                    days: vec![day],
                }),
                forecast_calls: Cell::new(0),
            }
        }
    }

    impl WeatherApi for &FakeWeather {
        fn fetch_forecast(&self, _location: &str, _days: u8) -> Result<LocatedForecast, ProviderError> {
            self.forecast_calls.set(self.forecast_calls.get() + 1);
            self.forecast_result.clone()
        }

        fn fetch_current(&self, _location: &str) -> Result<CurrentConditions, ProviderError> {
            Ok(CurrentConditions {
                location: location(),
                temp_c: Some(30.0),
                feels_like_c: Some(29.0),
                condition_text: Some("Sunny".to_string()),
                humidity_pct: Some(10.0),
                wind_kph: Some(10.0),
                wind_dir: Some("N".to_string()),
                pressure_mb: Some(1010.0),
                visibility_km: Some(10.0),
                uv_index: Some(9.0),
                cloud_pct: Some(0.0),
            })
        }

        fn search_locations(&self, _query: &str) -> Result<Vec<LocationMatch>, ProviderError> {
            Ok(Vec::new())
        }
    }

    struct EchoGenerator;

    impl TextGenerator for EchoGenerator {
        fn generate(&self, prompt: &str, _temperature: f64) -> Result<String, GenerationError> {
            Ok(format!("{} chars considered", prompt.len()))
        }
    }

    fn location() -> ForecastLocation {
        ForecastLocation {
            name: "Phoenix".to_string(),
            region: "Arizona".to_string(),
            country: "United States of America".to_string(),
            latitude: 33.45,
            longitude: -112.07,
            timezone: "America/Phoenix".to_string(),
            local_time: "2025-11-01 08:00".to_string(),
        }
    }

    fn config() -> RuntimeConfig {
        RuntimeConfig::from_pairs(vec![("WEATHER_TEMP_BASELINE_C", "25")]).expect("config")
    }

    fn run_args(
        args: &[&str],
        weather: &FakeWeather,
        generator: Option<EchoGenerator>,
    ) -> Result<String, AppError> {
        let cli = Cli::parse_from(args);
        let service = DashboardService::new(config(), weather, generator);
        let mut sink = Vec::new();
        run_with(cli.command, &service, Cursor::new(String::new()), &mut sink)
    }

    #[test]
    fn main_outputs_forecast_json_contract() {
        let weather = FakeWeather::ok();
        let output = run_args(
            &["weather-insight", "forecast", "--location", "Phoenix", "--json"],
            &weather,
            None,
        )
        .expect("forecast should pass");
        let json: Value = serde_json::from_str(&output).expect("json");

        assert_eq!(json.get("schema_version").and_then(Value::as_str), Some("v1"));
        assert_eq!(
            json.get("command").and_then(Value::as_str),
            Some("weather.forecast")
        );
        assert_eq!(json.get("ok").and_then(Value::as_bool), Some(true));
        assert_eq!(json["result"]["location"]["name"], "Phoenix");
        assert_eq!(json["result"]["cache"]["status"], "live");
        assert_eq!(json["result"]["flags"][0]["kind"], "high_temp");
        assert_eq!(json["result"]["flags"][1]["kind"], "high_uv");
        assert_eq!(json["result"]["flags"][1]["severity"], "warning");
    }

    #[test]
    fn main_outputs_text_mode_with_units() {
        let weather = FakeWeather::ok();
        let output = run_args(
            &["weather-insight", "forecast", "--units", "imperial"],
            &weather,
            None,
        )
        .expect("text mode");

        assert!(output.contains("Phoenix, United States of America"));
        assert!(output.contains("82.4~104.0°F"));
        assert!(output.contains("Anomalies: 2"));
    }

    #[test]
    fn main_maps_invalid_days_to_user_error() {
        let weather = FakeWeather::ok();
        let err = run_args(&["weather-insight", "anomalies", "--days", "20"], &weather, None)
            .expect_err("must fail");

        assert_eq!(err.kind, ErrorKind::User);
        assert_eq!(err.code, "user.invalid_input");
        assert_eq!(err.exit_code(), 2);
        assert_eq!(weather.forecast_calls.get(), 0);
    }

    #[test]
    fn main_maps_runtime_provider_failure() {
        let weather = FakeWeather {
            forecast_result: Err(ProviderError::Transport("timeout".to_string())),
            ..FakeWeather::ok()
        };
        let err = run_args(&["weather-insight", "charts", "--json"], &weather, None)
            .expect_err("must fail");

        assert_eq!(err.kind, ErrorKind::Runtime);
        assert_eq!(err.code, "runtime.provider_failed");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn main_insight_kind_flag_selects_prompt() {
        let weather = FakeWeather::ok();
        let output = run_args(
            &["weather-insight", "insight", "--kind", "current", "--json"],
            &weather,
            Some(EchoGenerator),
        )
        .expect("insight");
        let json: Value = serde_json::from_str(&output).expect("json");

        assert_eq!(json["result"]["kind"], "current");
        assert!(json["result"]["cache"].is_null());
        assert_eq!(weather.forecast_calls.get(), 0);
    }

    #[test]
    fn main_session_reports_summary() {
        let weather = FakeWeather::ok();
        let cli = Cli::parse_from(["weather-insight", "session"]);
        let service = DashboardService::new(config(), &weather, None::<EchoGenerator>);
        let mut transcript = Vec::new();

        let output = run_with(
            cli.command,
            &service,
            Cursor::new("forecast\nforecast\nquit\n".to_string()),
            &mut transcript,
        )
        .expect("session");

        assert_eq!(output, "session ended: 2 command(s), 0 error(s)");
        assert_eq!(weather.forecast_calls.get(), 1);
        assert!(String::from_utf8(transcript).expect("utf8").contains("cache=cache_fresh"));
    }

    #[test]
    fn main_offline_anomalies_reads_json_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("days.json");
        fs::write(
            &path,
            r#"[{"date": "2025-11-01", "max_temp_c": 40, "uv_index": 9, "max_wind_kph": 30,
                 "total_precip_mm": 0, "min_temp_c": 28, "avg_temp_c": 34}]"#,
        )
        .expect("write");

        let output = run_offline_anomalies(&config(), &path, true).expect("anomalies");
        let json: Value = serde_json::from_str(&output).expect("json");
        assert_eq!(json["command"], "weather.anomalies");
        assert_eq!(json["result"]["day_count"], 1);
        assert_eq!(json["result"]["flags"][0]["observed_value"], 40.0);
        assert_eq!(json["result"]["flags"][0]["threshold"], 30.0);

        let missing = dir.path().join("absent.json");
        let err = run_offline_anomalies(&config(), &missing, false).expect_err("must fail");
        assert_eq!(err.code, ERROR_CODE_USER_INPUT_UNREADABLE);
    }

    #[test]
    fn main_status_reports_configuration() {
        let output = render_status(&config(), false).expect("status");
        assert!(output.contains("Weather API: Not Configured"));
        assert!(output.contains("Thresholds: temp baseline=25"));
    }

    #[test]
    fn main_rejects_input_with_location() {
        let result = Cli::try_parse_from([
            "weather-insight",
            "anomalies",
            "--input",
            "days.json",
            "--location",
            "Oslo",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn main_help_flag_is_supported() {
        let help = Cli::try_parse_from(["weather-insight", "--help"]).expect_err("help");
        assert_eq!(help.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
