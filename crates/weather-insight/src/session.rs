//! Line-oriented interactive session.
//!
//! One [`DashboardService`] serves every line, so repeated requests for the
//! same location and day count are answered from its snapshot store until
//! the entry expires or `refresh` clears it.

use std::io::{self, BufRead, Write};

use serde::Serialize;

use crate::charts::UnitSystem;
use crate::error::AppError;
use crate::insight::{InsightKind, TextGenerator};
use crate::providers::WeatherApi;
use crate::render;
use crate::service::DashboardService;

const HELP: &str = "commands:
  forecast [LOCATION] [DAYS]
  anomalies [LOCATION] [DAYS]
  charts [LOCATION] [DAYS] [date=YYYY-MM-DD]
  insight forecast|anomalies|current|activities [LOCATION] [DAYS]
  current [LOCATION]
  search QUERY
  refresh
  help
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Forecast(Target),
    Anomalies(Target),
    Charts { target: Target, date: Option<String> },
    Insight { kind: InsightKind, target: Target },
    Current(Option<String>),
    Search(String),
    Refresh,
    Help,
    Quit,
}

/// Location and day count as typed; `None` falls back to configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub location: Option<String>,
    pub days: Option<i64>,
}

impl SessionCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Forecast(_) => "session.forecast",
            Self::Anomalies(_) => "session.anomalies",
            Self::Charts { .. } => "session.charts",
            Self::Insight { .. } => "session.insight",
            Self::Current(_) => "session.current",
            Self::Search(_) => "session.search",
            Self::Refresh => "session.refresh",
            Self::Help => "session.help",
            Self::Quit => "session.quit",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub commands: usize,
    pub errors: usize,
}

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<SessionCommand>, AppError> {
    let mut tokens = line.split_whitespace();
    let Some(verb) = tokens.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = tokens.collect();

    let command = match verb.to_ascii_lowercase().as_str() {
        "forecast" => SessionCommand::Forecast(parse_target(&rest)),
        "anomalies" => SessionCommand::Anomalies(parse_target(&rest)),
        "charts" => {
            let (dates, others): (Vec<&str>, Vec<&str>) =
                rest.iter().partition(|token| token.starts_with("date="));
            SessionCommand::Charts {
                target: parse_target(&others),
                date: dates
                    .last()
                    .map(|token| token.trim_start_matches("date=").to_string()),
            }
        }
        "insight" => {
            let Some((kind, rest)) = rest.split_first() else {
                return Err(AppError::invalid_input(
                    "insight needs a kind: forecast, anomalies, current or activities",
                ));
            };
            SessionCommand::Insight {
                kind: kind.parse().map_err(AppError::invalid_input)?,
                target: parse_target(rest),
            }
        }
        "current" => SessionCommand::Current(join_words(&rest)),
        "search" => match join_words(&rest) {
            Some(query) => SessionCommand::Search(query),
            None => return Err(AppError::invalid_input("search needs a query")),
        },
        "refresh" => SessionCommand::Refresh,
        "help" | "?" => SessionCommand::Help,
        "quit" | "exit" => SessionCommand::Quit,
        other => {
            return Err(AppError::invalid_input(format!(
                "unknown command `{other}` (type `help`)"
            )));
        }
    };
    Ok(Some(command))
}

pub fn run_session<W, G, R, O>(
    service: &DashboardService<W, G>,
    input: R,
    output: &mut O,
    units: UnitSystem,
    json: bool,
) -> io::Result<SessionSummary>
where
    W: WeatherApi,
    G: TextGenerator,
    R: BufRead,
    O: Write,
{
    let mut summary = SessionSummary::default();

    for line in input.lines() {
        let line = line?;
        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(error) => {
                summary.errors += 1;
                write_error(output, "session", &error, json)?;
                continue;
            }
        };
        if command == SessionCommand::Quit {
            break;
        }

        summary.commands += 1;
        let name = command.name();
        match execute(service, command, units, json) {
            Ok(rendered) => writeln!(output, "{rendered}")?,
            Err(error) => {
                summary.errors += 1;
                tracing::debug!(command = name, code = error.code, "session command failed");
                write_error(output, name, &error, json)?;
            }
        }
        output.flush()?;
    }

    Ok(summary)
}

fn execute<W, G>(
    service: &DashboardService<W, G>,
    command: SessionCommand,
    units: UnitSystem,
    json: bool,
) -> Result<String, AppError>
where
    W: WeatherApi,
    G: TextGenerator,
{
    let name = command.name();
    match command {
        SessionCommand::Forecast(target) => {
            let report = service.forecast(target.location.as_deref(), target.days)?;
            if json {
                render::json_envelope(name, &report)
            } else {
                Ok(render::forecast_text(&report, units))
            }
        }
        SessionCommand::Anomalies(target) => {
            let report = service.anomalies(target.location.as_deref(), target.days)?;
            if json {
                render::json_envelope(name, &report)
            } else {
                Ok(render::anomalies_text(&report))
            }
        }
        SessionCommand::Charts { target, date } => {
            let report = service.charts(
                target.location.as_deref(),
                target.days,
                date.as_deref(),
                units,
            )?;
            if json {
                render::json_envelope(name, &report)
            } else {
                Ok(render::charts_text(&report))
            }
        }
        SessionCommand::Insight { kind, target } => {
            let report = service.insight(target.location.as_deref(), target.days, kind)?;
            if json {
                render::json_envelope(name, &report)
            } else {
                Ok(render::insight_text(&report))
            }
        }
        SessionCommand::Current(location) => {
            let current = service.current(location.as_deref())?;
            if json {
                render::json_envelope(name, &current)
            } else {
                Ok(render::current_text(&current, units))
            }
        }
        SessionCommand::Search(query) => {
            let matches = service.search(&query)?;
            if json {
                render::json_envelope(name, &matches)
            } else {
                Ok(render::search_text(&matches))
            }
        }
        SessionCommand::Refresh => {
            let dropped = service.refresh_all();
            if json {
                render::json_envelope(name, &serde_json::json!({ "dropped": dropped }))
            } else {
                Ok(format!("cleared {dropped} cached forecast(s)"))
            }
        }
        SessionCommand::Help | SessionCommand::Quit => Ok(HELP.to_string()),
    }
}

fn write_error<O: Write>(output: &mut O, command: &str, error: &AppError, json: bool) -> io::Result<()> {
    if json {
        writeln!(output, "{}", render::json_error_envelope(command, error))
    } else {
        writeln!(output, "{}", render::error_line(error))
    }
}

fn parse_target(tokens: &[&str]) -> Target {
    match tokens.split_last() {
        Some((last, words)) if last.parse::<i64>().is_ok() => Target {
            location: join_words(words),
            days: last.parse().ok(),
        },
        _ => Target {
            location: join_words(tokens),
            days: None,
        },
    }
}

fn join_words(words: &[&str]) -> Option<String> {
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}
