//! Logging for the ACP engine
//!
//! The engine never installs a global subscriber. Bridges receive an
//! [`AcpLogger`] at construction and emit their events inside its dispatch, so
//! the owning database decides where ACP logs go and for how long.

use crate::error::{AcpError, AcpResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Output format of log events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Plain,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level for every target
    pub level: String,
    pub format: LogFormat,
    /// Enable colored output (plain format only)
    pub enable_colors: bool,
    /// Include the event target (module path)
    pub include_target: bool,
    /// Per-target level overrides, e.g. `defra_acp::ledger = "debug"`
    pub features: HashMap<String, String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Plain,
            enable_colors: false,
            include_target: true,
            features: HashMap::new(),
        }
    }
}

const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

fn check_level(field: &str, level: &str) -> AcpResult<()> {
    if LEVELS.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(AcpError::config(format!("invalid log level '{}' for {}", level, field)))
    }
}

impl LogConfig {
    pub fn validate(&self) -> AcpResult<()> {
        check_level("level", &self.level)?;
        for (target, level) in &self.features {
            check_level(target, level)?;
        }
        Ok(())
    }

    /// Filter directives: the default level followed by per-target overrides
    pub fn filter_directives(&self) -> String {
        let mut targets: Vec<_> = self.features.iter().collect();
        targets.sort();

        let mut directives = vec![self.level.to_lowercase()];
        directives.extend(
            targets
                .into_iter()
                .map(|(target, level)| format!("{}={}", target, level.to_lowercase())),
        );
        directives.join(",")
    }

    fn env_filter(&self) -> AcpResult<EnvFilter> {
        self.validate()?;
        EnvFilter::try_new(self.filter_directives())
            .map_err(|e| AcpError::Logging(e.to_string()))
    }

    /// Build a dispatch writing to stderr
    pub fn build_dispatch(&self) -> AcpResult<Dispatch> {
        self.build_dispatch_with_writer(std::io::stderr)
    }

    /// Build a dispatch writing to `writer`
    pub fn build_dispatch_with_writer<W>(&self, writer: W) -> AcpResult<Dispatch>
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let filter = self.env_filter()?;
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(self.include_target)
            .with_writer(writer);

        let dispatch = match self.format {
            LogFormat::Json => Dispatch::new(builder.json().finish()),
            LogFormat::Plain => Dispatch::new(builder.with_ansi(self.enable_colors).finish()),
        };
        Ok(dispatch)
    }
}

/// Logging capability handed to bridges
#[derive(Clone)]
pub struct AcpLogger {
    dispatch: Dispatch,
}

impl AcpLogger {
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// Logger that forwards to whatever dispatcher is current at construction
    pub fn current() -> Self {
        Self::new(tracing::dispatcher::get_default(|d| d.clone()))
    }

    /// Logger that drops every event
    pub fn disabled() -> Self {
        Self::new(Dispatch::none())
    }

    pub fn from_config(config: &LogConfig) -> AcpResult<Self> {
        Ok(Self::new(config.build_dispatch()?))
    }

    /// Run `f` with this logger's dispatch as the default.
    ///
    /// `f` must not await; the scope only covers the current thread.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }
}

impl Default for AcpLogger {
    fn default() -> Self {
        Self::current()
    }
}

impl std::fmt::Debug for AcpLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcpLogger").finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::Captured;
    use super::*;

    #[test]
    fn json_logger_captures_structured_fields() {
        let captured = Captured::default();
        let config = LogConfig {
            format: LogFormat::Json,
            ..LogConfig::default()
        };
        let logger = AcpLogger::new(config.build_dispatch_with_writer(captured.clone()).unwrap());

        logger.in_scope(|| tracing::info!(policy_id = "abc", "policy added"));

        let output = captured.contents();
        assert!(output.contains("\"policy_id\":\"abc\""), "{}", output);
        assert!(output.contains("policy added"));
    }

    #[test]
    fn level_filter_drops_debug_events() {
        let captured = Captured::default();
        let logger = AcpLogger::new(
            LogConfig::default()
                .build_dispatch_with_writer(captured.clone())
                .unwrap(),
        );

        logger.in_scope(|| tracing::debug!("hidden"));
        assert!(captured.contents().is_empty());
    }

    #[test]
    fn invalid_levels_are_rejected() {
        let mut config = LogConfig::default();
        config.features.insert("defra_acp::ledger".to_string(), "loud".to_string());
        assert!(config.validate().is_err());
        assert!(config.build_dispatch().is_err());
    }

    #[test]
    fn directives_are_sorted() {
        let mut config = LogConfig::default();
        config.features.insert("b".to_string(), "DEBUG".to_string());
        config.features.insert("a".to_string(), "warn".to_string());
        assert_eq!(config.filter_directives(), "info,a=warn,b=debug");
    }
}
