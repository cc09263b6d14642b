use std::{env, path::PathBuf, str::FromStr, time::Duration};

use rollstat_core::{WindowOptions, stats::MonitorOptions};

#[derive(Debug, Clone)]
pub struct Config {
    pub window: WindowOptions,
    pub sweep_interval: Duration,
    /// `None` disables periodic reports, only the final one is printed.
    pub report_interval: Option<Duration>,
    pub idle_metric_timeout: Option<Duration>,
    pub logger: LoggerConfig,
}

impl Config {
    pub fn monitor_options(&self) -> MonitorOptions {
        MonitorOptions {
            default_window: self.window,
            sweep_interval: self.sweep_interval,
            idle_metric_timeout: self.idle_metric_timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub stdio_level: String,
    pub file_level: String,
    pub log_file: Option<PathBuf>,
    pub format: LoggerFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerFormat {
    Pretty,
    Json,
    Compact,
}

impl FromStr for LoggerFormat {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(LoggerFormat::Json),
            "pretty" => Ok(LoggerFormat::Pretty),
            "compact" => Ok(LoggerFormat::Compact),
            _ => Err("invalid logger format"),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Environment variable {name} has invalid value {value:?}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

pub fn read_config() -> Result<Config, ConfigError> {
    config_from(|name| env::var(name).ok())
}

fn config_from(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
    let max_size = parse_var(&lookup, "ROLLSTAT_WINDOW_MAX_SIZE")?.unwrap_or(1000);
    if max_size == 0 {
        return Err(invalid("ROLLSTAT_WINDOW_MAX_SIZE", "0", "has to be greater than zero"));
    }
    let max_size = usize::try_from(max_size).map_err(|err| {
        invalid("ROLLSTAT_WINDOW_MAX_SIZE", &max_size.to_string(), &err.to_string())
    })?;
    let duration = Duration::from_millis(
        parse_var(&lookup, "ROLLSTAT_WINDOW_DURATION_MS")?.unwrap_or(60_000),
    );

    let sweep_interval_ms = parse_var(&lookup, "ROLLSTAT_SWEEP_INTERVAL_MS")?.unwrap_or(1000);
    if sweep_interval_ms == 0 {
        return Err(invalid("ROLLSTAT_SWEEP_INTERVAL_MS", "0", "has to be greater than zero"));
    }

    let report_interval = match parse_var(&lookup, "ROLLSTAT_REPORT_INTERVAL_MS")? {
        Some(0) => None,
        Some(ms) => Some(Duration::from_millis(ms)),
        None => Some(Duration::from_millis(5000)),
    };
    let idle_metric_timeout =
        parse_var(&lookup, "ROLLSTAT_IDLE_METRIC_TIMEOUT_SECS")?.map(Duration::from_secs);

    let logger_level = lookup("ROLLSTAT_LOGGER_LEVEL").unwrap_or_else(|| "info".to_string());
    let stdio_level = lookup("ROLLSTAT_STDIO_LOGGER_LEVEL").unwrap_or_else(|| logger_level.clone());
    let file_level = lookup("ROLLSTAT_FILE_LOGGER_LEVEL").unwrap_or_else(|| logger_level.clone());
    let format = match lookup("ROLLSTAT_LOGGER_FORMAT") {
        Some(format) => LoggerFormat::from_str(&format)
            .map_err(|reason| invalid("ROLLSTAT_LOGGER_FORMAT", &format, reason))?,
        None => LoggerFormat::Compact,
    };
    let log_file = lookup("ROLLSTAT_LOG_FILE").map(PathBuf::from);

    Ok(Config {
        window: WindowOptions {
            max_size,
            duration,
        },
        sweep_interval: Duration::from_millis(sweep_interval_ms),
        report_interval,
        idle_metric_timeout,
        logger: LoggerConfig {
            stdio_level,
            file_level,
            log_file,
            format,
        },
    })
}

fn parse_var(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<u64>, ConfigError> {
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    value
        .trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|err| invalid(name, &value, &err.to_string()))
}

fn invalid(name: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
