//! Crash reporting hook.
//!
//! The crate never depends on a crash-reporting service. Embedders register a
//! factory that turns the `sentry_config` section into a [`CrashReporter`];
//! panics are then forwarded to it.

use std::sync::Arc;

use crate::config::schema::SentryConfig;

/// What is known about a crash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashReport {
    pub message: String,
    /// `file:line:column` of the panic, when available.
    pub location: Option<String>,
    pub environment: Option<String>,
}

/// Destination of crash reports.
pub trait CrashReporter: Send + Sync {
    fn report(&self, report: &CrashReport);
}

/// Builds a reporter from the `sentry_config` section.
pub type CrashReporterFactory =
    Arc<dyn Fn(&ValidatedSentryConfig) -> Result<Arc<dyn CrashReporter>, String> + Send + Sync>;

/// Sentry settings with the mandatory DSN present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSentryConfig {
    pub dsn: String,
    pub environment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CrashConfigError {
    #[error("no value for sentry dsn configured")]
    MissingDsn,

    #[error("crash reporter could not be created: {0}")]
    Factory(String),
}

impl ValidatedSentryConfig {
    pub fn from_config(config: &SentryConfig) -> Result<Self, CrashConfigError> {
        let dsn = config
            .dsn
            .as_deref()
            .map(str::trim)
            .filter(|dsn| !dsn.is_empty())
            .ok_or(CrashConfigError::MissingDsn)?;
        Ok(Self {
            dsn: dsn.to_string(),
            environment: config.environment.clone(),
        })
    }
}

/// Forward panics to `reporter`, then run the previously installed hook.
pub fn install_panic_hook(reporter: Arc<dyn CrashReporter>, environment: Option<String>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic with a non-string payload".to_string());
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));

        reporter.report(&CrashReport {
            message,
            location,
            environment: environment.clone(),
        });
        previous(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsn_is_required() {
        let missing = SentryConfig::default();
        assert_eq!(
            ValidatedSentryConfig::from_config(&missing),
            Err(CrashConfigError::MissingDsn)
        );

        let blank = SentryConfig {
            dsn: Some("  ".into()),
            ..SentryConfig::default()
        };
        assert!(ValidatedSentryConfig::from_config(&blank).is_err());

        let ok = SentryConfig {
            dsn: Some("https://key@sentry.example/1".into()),
            environment: Some("staging".into()),
            ..SentryConfig::default()
        };
        let validated = ValidatedSentryConfig::from_config(&ok).unwrap();
        assert_eq!(validated.environment.as_deref(), Some("staging"));
    }
}
