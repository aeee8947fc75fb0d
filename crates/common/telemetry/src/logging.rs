// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Logging
//!
//! Global `tracing` subscriber setup shared by the library tests and the
//! `courier` binary.
//!
//! Layers, each optional:
//!
//! - **Console**: stdout or stderr, non-blocking, ANSI colors only on a
//!   terminal
//! - **File**: hourly rolling files named after the application
//! - **Error file**: same rotation, `ERROR` events only
//!
//! Records emitted through the `log` crate are bridged into `tracing`.

use std::{
    env,
    io::IsTerminal,
    sync::{Arc, Mutex, Once},
};

use bon::Builder;
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, de};
use smart_default::SmartDefault;
use snafu::{ResultExt, Snafu};
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter,
    layer::{Layered, SubscriberExt},
};

/// Deserializes a string value, using `Default::default()` if the string is
/// empty.
///
/// Lets configuration files spell "use the default" as `""` as well as by
/// omitting the field.
///
/// # Errors
/// Returns an error if deserialization fails.
pub fn empty_string_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let s = String::deserialize(deserializer)?;
    if s.is_empty() {
        Ok(T::default())
    } else {
        T::deserialize(de::value::StrDeserializer::new(&s)).map_err(|e: de::value::Error| {
            de::Error::custom(format!("invalid value, expect empty string, err: {e}"))
        })
    }
}

/// The default directory name for log files when file logging is enabled.
pub const DEFAULT_LOGGING_DIR: &str = "logs";

/// Default log level filter when neither `LoggingOptions::level` nor
/// `RUST_LOG` is set.
const DEFAULT_LOG_TARGETS: &str = "info";

/// Why the global subscriber could not be installed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LoggingError {
    #[snafu(display("Failed to bridge log records into tracing"))]
    LogBridge { source: tracing_log::log::SetLoggerError },

    #[snafu(display("Failed to create rolling log file in {dir}"))]
    RollingFile {
        dir:    String,
        source: tracing_appender::rolling::InitError,
    },

    #[snafu(display("Invalid log level filter '{level}'"))]
    InvalidLevel {
        level:  String,
        source: filter::ParseError,
    },

    #[snafu(display("A global tracing subscriber is already installed"))]
    SetGlobal {
        source: tracing::subscriber::SetGlobalDefaultError,
    },
}

/// Configuration options for the logging system.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, Builder)]
#[serde(default)]
pub struct LoggingOptions {
    /// Directory for log files. Empty disables file logging.
    ///
    /// The directory is created if it doesn't exist.
    #[default = ""]
    #[builder(default, into)]
    pub dir: String,

    /// Level filter such as `"info"` or `"info,queue=debug"`. Falls back to
    /// `RUST_LOG`, then to `info`.
    #[builder(into)]
    pub level: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_default")]
    #[builder(default)]
    pub log_format: LogFormat,

    /// Rotated files kept per layer. 720 is 30 days of hourly files.
    #[default = 720]
    #[builder(default = 720)]
    pub max_log_files: usize,

    /// Also write to the console when file logging is enabled.
    #[default = true]
    #[builder(default = true)]
    pub append_stdout: bool,

    /// Stream the console layer writes to.
    #[serde(default, deserialize_with = "empty_string_as_default")]
    #[builder(default)]
    pub console: ConsoleTarget,
}

/// Where console logs go. Programs that print results on stdout log to
/// stderr.
#[derive(
    Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, Default, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleTarget {
    #[default]
    Stdout,
    Stderr,
}

/// Available log output formats.
#[derive(
    Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, Default, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// JSON objects with structured fields, for log aggregation.
    ///
    /// ```json
    /// {"timestamp":"2024-01-01T12:00:00Z","level":"DEBUG","target":"queue::queue","fields":{"message":"Sent message","channel":"jobs"}}
    /// ```
    Json,

    /// Human-readable lines.
    ///
    /// ```text
    /// 2024-01-01T12:00:00.123Z DEBUG queue::queue: Sent message channel="jobs"
    /// ```
    #[default]
    Text,
}

/// Subscriber the output layers sit on: the registry behind the level
/// filter.
type FilteredRegistry = Layered<filter::Targets, Registry>;

type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

/// Initialize logging for unit tests.
///
/// Safe to call from every test; only the first call installs anything.
///
/// # Environment Variables
///
/// * `UNITTEST_LOG_DIR` - Directory for test logs (default:
///   "/tmp/__unittest_logs")
/// * `UNITTEST_LOG_LEVEL` - Log level filter (default: "debug")
pub fn init_default_ut_logging() {
    static START: Once = Once::new();

    START.call_once(|| {
        let dir =
            env::var("UNITTEST_LOG_DIR").unwrap_or_else(|_| "/tmp/__unittest_logs".to_string());
        let level = env::var("UNITTEST_LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());
        let opts = LoggingOptions {
            dir: dir.clone(),
            level: Some(level),
            ..Default::default()
        };

        match init_global_logging("unittest", &opts) {
            Ok(guards) => {
                if let Ok(mut g) = GLOBAL_UT_LOG_GUARD.lock() {
                    *g = Some(guards);
                }
                tracing::info!("logs dir = {}", dir);
            }
            Err(e) => eprintln!("unit test logging disabled: {e}"),
        }
    });
}

/// Keeps the unit-test writer guards alive for the whole test binary.
static GLOBAL_UT_LOG_GUARD: Lazy<Arc<Mutex<Option<Vec<WorkerGuard>>>>> =
    Lazy::new(|| Arc::new(Mutex::new(None)));

/// Install the global subscriber described by `opts`.
///
/// Returns the non-blocking writer guards; dropping them stops the
/// background writer threads. Only the first call in a process does
/// anything, later calls return no guards.
///
/// # Errors
/// Fails when the log directory cannot be used, when the level filter does
/// not parse, or when another subscriber was installed first.
pub fn init_global_logging(
    app_name: &str,
    opts: &LoggingOptions,
) -> Result<Vec<WorkerGuard>, LoggingError> {
    static START: Once = Once::new();
    let mut result = Ok(Vec::new());

    START.call_once(|| result = install(app_name, opts));

    result
}

fn install(app_name: &str, opts: &LoggingOptions) -> Result<Vec<WorkerGuard>, LoggingError> {
    let mut guards = vec![];
    let mut layers: Vec<BoxedLayer> = vec![];

    LogTracer::init().context(LogBridgeSnafu)?;

    if opts.append_stdout {
        let ((writer, guard), ansi) = match opts.console {
            ConsoleTarget::Stdout => (
                tracing_appender::non_blocking(std::io::stdout()),
                std::io::stdout().is_terminal(),
            ),
            ConsoleTarget::Stderr => (
                tracing_appender::non_blocking(std::io::stderr()),
                std::io::stderr().is_terminal(),
            ),
        };
        guards.push(guard);
        layers.push(fmt_layer(writer, opts.log_format, ansi));
    }

    if !opts.dir.is_empty() {
        let (writer, guard) = rolling_writer(&opts.dir, app_name, opts.max_log_files)?;
        guards.push(guard);
        layers.push(fmt_layer(writer, opts.log_format, false));

        let (writer, guard) =
            rolling_writer(&opts.dir, &format!("{app_name}-err"), opts.max_log_files)?;
        guards.push(guard);
        layers.push(
            fmt_layer(writer, opts.log_format, false)
                .with_filter(filter::LevelFilter::ERROR)
                .boxed(),
        );
    }

    let env_level = env::var(EnvFilter::DEFAULT_ENV).ok();
    let level = opts
        .level
        .as_deref()
        .or(env_level.as_deref())
        .unwrap_or(DEFAULT_LOG_TARGETS);
    let targets = level
        .parse::<filter::Targets>()
        .context(InvalidLevelSnafu { level })?;

    let subscriber = Registry::default().with(targets).with(layers);

    tracing::subscriber::set_global_default(subscriber).context(SetGlobalSnafu)?;
    Ok(guards)
}

fn rolling_writer(
    dir: &str,
    prefix: &str,
    max_log_files: usize,
) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let rolling_appender = RollingFileAppender::builder()
        .rotation(Rotation::HOURLY)
        .filename_prefix(prefix)
        .max_log_files(max_log_files)
        .build(dir)
        .context(RollingFileSnafu { dir })?;
    Ok(tracing_appender::non_blocking(rolling_appender))
}

fn fmt_layer(writer: NonBlocking, format: LogFormat, ansi: bool) -> BoxedLayer {
    match format {
        LogFormat::Json => tracing_subscriber::fmt::Layer::new()
            .json()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::Layer::new()
            .with_writer(writer)
            .with_ansi(ansi)
            .boxed(),
    }
}
