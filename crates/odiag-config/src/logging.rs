use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Once};

use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// A simple level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs in JSON format.
    #[serde(default)]
    pub json: bool,

    /// Mirror logs to stderr.
    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to the given file path. If the file cannot be opened, file
    /// logging is disabled while stderr logging remains active.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    /// Accepts `warning` for `warn` and any letter case for the simple
    /// levels; anything else is passed through as `EnvFilter` directives.
    pub(crate) fn level_directives(input: &str) -> String {
        let trimmed = input.trim();
        let lower = trimmed.to_ascii_lowercase();
        match lower.as_str() {
            "" => Self::default_level(),
            "warning" => "warn".to_owned(),
            "off" | "error" | "warn" | "info" | "debug" | "trace" => lower,
            _ => trimmed.to_owned(),
        }
    }

    /// The configured level with `RUST_LOG` appended, so environment
    /// directives win per target. Invalid directives are skipped.
    pub fn env_filter(&self) -> EnvFilter {
        let mut directives = Self::level_directives(&self.level);
        if let Ok(env) = std::env::var("RUST_LOG") {
            let env = env.trim();
            if !env.is_empty() {
                directives.push(',');
                directives.push_str(env);
            }
        }
        EnvFilter::new(directives)
    }

    fn make_writer(&self) -> BoxMakeWriter {
        let file = self.file.as_ref().and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
                .map(Arc::new)
        });

        match (self.stderr, file) {
            (true, Some(file)) => BoxMakeWriter::new(io::stderr.and(file)),
            (true, None) => BoxMakeWriter::new(io::stderr),
            (false, Some(file)) => BoxMakeWriter::new(file),
            (false, None) => BoxMakeWriter::new(io::sink),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

static TRACING_INIT: Once = Once::new();

/// Installs the global `tracing` subscriber.
///
/// Safe to call multiple times; only the first call has an effect, and a
/// subscriber installed by someone else is left alone.
pub fn init_tracing(config: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let filter = config.env_filter();
        let writer = config.make_writer();
        let registry = tracing_subscriber::registry().with(filter);

        let installed = if config.json {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .try_init()
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .try_init()
        };

        match installed {
            Ok(()) => {
                if let Some(path) = config.file.as_ref() {
                    tracing::debug!(target: "odiag.config", path = %path.display(), "file logging enabled");
                }
            }
            Err(err) => {
                // Another subscriber is already installed (e.g. by an embedding host).
                tracing::debug!(target: "odiag.config", error = %err, "tracing already initialised");
            }
        }
    });
}
