//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Default filter when nothing else is configured.
const DEFAULT_FILTER: &str = "reclaim=info,warn";

/// Filter used with `--verbose`.
const VERBOSE_FILTER: &str = "reclaim=debug,info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name. Unknown names fall back to pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Log file; stderr when `None`.
    pub file: Option<PathBuf>,
    /// Event filter.
    pub filter: EnvFilter,
}

impl Clone for LoggingConfig {
    fn clone(&self) -> Self {
        Self {
            format: self.format,
            file: self.file.clone(),
            filter: EnvFilter::new(self.filter.to_string()),
        }
    }
}

impl LoggingConfig {
    /// Builds logging configuration from config settings with env overrides.
    ///
    /// Filter precedence: `RECLAIM_LOG`, `RUST_LOG`, `--verbose`, the
    /// `[logging] filter` setting, then the built-in default.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        Self::resolve(settings, verbose, |key| std::env::var(key).ok())
    }

    /// Like [`Self::from_settings`], reading the environment through `lookup`.
    #[must_use]
    pub fn resolve<F>(settings: Option<&LoggingSettings>, verbose: bool, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let format = lookup("RECLAIM_LOG_FORMAT")
            .or_else(|| settings.and_then(|s| s.format.clone()))
            .map_or_else(LogFormat::default, |value| LogFormat::parse(&value));

        let file = lookup("RECLAIM_LOG_FILE")
            .or_else(|| settings.and_then(|s| s.file.clone()))
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        let directive = lookup("RECLAIM_LOG")
            .or_else(|| lookup("RUST_LOG"))
            .or_else(|| verbose.then(|| VERBOSE_FILTER.to_string()))
            .or_else(|| settings.and_then(|s| s.filter.clone()))
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());

        let filter = EnvFilter::try_new(&directive).unwrap_or_else(|e| {
            eprintln!("Ignoring invalid log filter {directive:?}: {e}");
            EnvFilter::new(DEFAULT_FILTER)
        });

        Self {
            format,
            file,
            filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve_with(
        settings: Option<&LoggingSettings>,
        verbose: bool,
        env: &[(&str, &str)],
    ) -> LoggingConfig {
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        LoggingConfig::resolve(settings, verbose, |key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = resolve_with(None, false, &[]);
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.file.is_none());
        assert_eq!(config.filter.to_string(), EnvFilter::new(DEFAULT_FILTER).to_string());
    }

    #[test]
    fn test_verbose_raises_filter() {
        let config = resolve_with(None, true, &[]);
        assert!(config.filter.to_string().contains("reclaim=debug"));
    }

    #[test]
    fn test_env_beats_settings() {
        let settings = LoggingSettings {
            format: Some("pretty".to_string()),
            file: Some("/tmp/settings.log".to_string()),
            filter: Some("reclaim=warn".to_string()),
        };
        let config = resolve_with(
            Some(&settings),
            false,
            &[
                ("RECLAIM_LOG_FORMAT", "json"),
                ("RECLAIM_LOG", "reclaim=trace"),
            ],
        );
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file, Some(PathBuf::from("/tmp/settings.log")));
        assert!(config.filter.to_string().contains("reclaim=trace"));
    }

    #[test]
    fn test_settings_filter_used_without_env() {
        let settings = LoggingSettings {
            filter: Some("reclaim=warn".to_string()),
            ..LoggingSettings::default()
        };
        let config = resolve_with(Some(&settings), false, &[]);
        assert!(config.filter.to_string().contains("reclaim=warn"));
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("text"), LogFormat::Pretty);
    }
}
