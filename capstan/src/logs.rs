//! Logging configuration and the per-host log sink

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::CapstanError;

/// Log level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_filter_string(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl serde::Serialize for LogLevel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_filter_string())
    }
}

impl<'de> serde::Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging options
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Log level
    pub log_level: LogLevel,

    /// Write logs to the terminal (stderr)
    pub console: bool,

    /// Also append logs to this file
    pub log_file: Option<PathBuf>,

    /// Enable JSON format
    pub json_format: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            console: true,
            log_file: None,
            json_format: false,
        }
    }
}

/// Initialize logging.
///
/// The returned guard flushes the file writer on drop and must be kept alive
/// for as long as logs should reach the file.
pub fn init_logging(options: LogOptions) -> Result<Option<WorkerGuard>, CapstanError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.log_level.to_filter_string()));

    let (file_layer, guard) = match &options.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().ok_or_else(|| {
                CapstanError::ConfigError(format!("Invalid log file: {}", path.display()))
            })?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(file_layer);

    let result = match (options.console, options.json_format) {
        (true, true) => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        (true, false) => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        (false, _) => subscriber.try_init(),
    };
    result.map_err(|e| CapstanError::ConfigError(e.to_string()))?;

    Ok(guard)
}

/// Progress of a named step on one host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Start,
    Ok,
    Failed,
}

/// Receives everything a deployment has to say, keyed by host.
///
/// Calls are fire-and-forget: a sink must never fail or block for long.
pub trait LogSink: Send + Sync {
    /// A command is about to run.
    fn command(&self, host: &str, line: &str);

    /// Non-empty output captured from a command.
    fn output(&self, host: &str, output: &str);

    /// A named step started, succeeded or failed.
    fn step(&self, host: &str, step: &str, status: StepStatus);

    /// A failure worth surfacing on its own.
    fn error(&self, host: &str, error: &CapstanError);
}

/// Forwards sink events to `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn command(&self, host: &str, line: &str) {
        info!(host = %host, "$ {}", line);
    }

    fn output(&self, host: &str, output: &str) {
        info!(host = %host, "{}", output);
    }

    fn step(&self, host: &str, step: &str, status: StepStatus) {
        match status {
            StepStatus::Start => info!(host = %host, "{} ...", step),
            StepStatus::Ok => info!(host = %host, "{} [OK]", step),
            StepStatus::Failed => error!(host = %host, "{} [NG]", step),
        }
    }

    fn error(&self, host: &str, error: &CapstanError) {
        error!(host = %host, "{}", error);
    }
}

/// One recorded sink event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LogEvent {
    Command { host: String, line: String },
    Output { host: String, output: String },
    Step { host: String, step: String, status: StepStatus },
    Error { host: String, message: String },
}

impl LogEvent {
    pub fn host(&self) -> &str {
        match self {
            LogEvent::Command { host, .. }
            | LogEvent::Output { host, .. }
            | LogEvent::Step { host, .. }
            | LogEvent::Error { host, .. } => host,
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<LogEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: LogEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    /// Snapshot of all events so far
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Command lines issued for one host, in order
    pub fn commands_for(&self, host: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LogEvent::Command { host: h, line } if h == host => Some(line),
                _ => None,
            })
            .collect()
    }
}

impl LogSink for MemorySink {
    fn command(&self, host: &str, line: &str) {
        self.push(LogEvent::Command {
            host: host.to_string(),
            line: line.to_string(),
        });
    }

    fn output(&self, host: &str, output: &str) {
        self.push(LogEvent::Output {
            host: host.to_string(),
            output: output.to_string(),
        });
    }

    fn step(&self, host: &str, step: &str, status: StepStatus) {
        self.push(LogEvent::Step {
            host: host.to_string(),
            step: step.to_string(),
            status,
        });
    }

    fn error(&self, host: &str, error: &CapstanError) {
        self.push(LogEvent::Error {
            host: host.to_string(),
            message: error.to_string(),
        });
    }
}
