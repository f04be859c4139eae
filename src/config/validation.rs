//! Configuration validation and the reconfiguration guard.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (handlers → formatters, loggers → handlers)
//! - Flag destructive full-replace documents
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: ConfigDocument → Result<(), Vec<ValidationError>>
//! - Incremental documents only touch levels, so references are not checked

use crate::config::schema::{ConfigDocument, LoggerSpec, SCHEMA_VERSION};

/// A single semantic problem in a document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unsupported version {0} (expected {expected})", expected = SCHEMA_VERSION)]
    UnsupportedVersion(u32),

    /// Handler references a formatter that is not declared.
    #[error("handler '{handler}' uses unknown formatter '{formatter}'")]
    UnknownFormatter { handler: String, formatter: String },

    /// Logger references a handler that is not declared or is disabled.
    #[error("logger '{logger}' uses unknown handler '{handler}'")]
    UnknownHandler { logger: String, handler: String },
}

/// Validate a resolved document before it is sent or applied.
pub fn validate_document(document: &ConfigDocument) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(version) = document.version {
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::UnsupportedVersion(version));
        }
    }

    if !document.is_incremental() {
        for (name, spec) in &document.handlers {
            let Some(spec) = spec else { continue };
            if let Some(formatter) = &spec.formatter {
                if !document.formatters.contains_key(formatter) {
                    errors.push(ValidationError::UnknownFormatter {
                        handler: name.clone(),
                        formatter: formatter.clone(),
                    });
                }
            }
        }

        let mut loggers: Vec<(&str, &LoggerSpec)> = document
            .loggers
            .iter()
            .map(|(name, spec)| (name.as_str(), spec))
            .collect();
        if let Some(root) = &document.root {
            loggers.push(("", root));
        }
        for (logger, spec) in loggers {
            for handler in spec.handlers.iter().flatten() {
                if !matches!(document.handlers.get(handler), Some(Some(_))) {
                    errors.push(ValidationError::UnknownHandler {
                        logger: logger.to_string(),
                        handler: handler.clone(),
                    });
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// True when applying the document replaces the whole topology and mutes
/// every logger it does not name.
pub fn is_destructive(document: &ConfigDocument) -> bool {
    !document.is_incremental() && document.disables_existing_loggers()
}

/// Error returned when the guard vetoes a document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("destructive configuration (incremental=false, disable_existing_loggers=true) requires explicit confirmation")]
pub struct DestructiveConfigRejected;

/// Refuses destructive documents unless the caller confirmed them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconfigurationGuard {
    confirmed: bool,
}

impl ReconfigurationGuard {
    pub fn new(confirmed: bool) -> Self {
        Self { confirmed }
    }

    /// Guard that lets every document through.
    pub fn confirmed() -> Self {
        Self { confirmed: true }
    }

    pub fn check(&self, document: &ConfigDocument) -> Result<(), DestructiveConfigRejected> {
        if is_destructive(document) && !self.confirmed {
            return Err(DestructiveConfigRejected);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> ConfigDocument {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn destructive_only_for_full_replace_that_disables() {
        assert!(is_destructive(&doc(json!({"incremental": false, "disable_existing_loggers": true}))));
        assert!(!is_destructive(&doc(json!({"incremental": true, "disable_existing_loggers": true}))));
        assert!(!is_destructive(&doc(json!({"incremental": false, "disable_existing_loggers": false}))));
        assert!(!is_destructive(&doc(json!({"incremental": false}))));
        assert!(is_destructive(&doc(json!({"disable_existing_loggers": true}))));
    }

    #[test]
    fn guard_requires_confirmation() {
        let dangerous = doc(json!({"incremental": false, "disable_existing_loggers": true}));
        assert_eq!(ReconfigurationGuard::new(false).check(&dangerous), Err(DestructiveConfigRejected));
        assert!(ReconfigurationGuard::confirmed().check(&dangerous).is_ok());

        let harmless = doc(json!({"incremental": true}));
        assert!(ReconfigurationGuard::default().check(&harmless).is_ok());
    }

    #[test]
    fn reports_every_broken_reference() {
        let broken = doc(json!({
            "version": 2,
            "handlers": {
                "a": {"class": "null", "formatter": "missing"},
                "off": null
            },
            "loggers": {"app": {"handlers": ["a", "off", "ghost"]}},
            "root": {"handlers": ["nope"]}
        }));
        let errors = validate_document(&broken).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::UnsupportedVersion(2)));
        assert!(errors.contains(&ValidationError::UnknownHandler {
            logger: "app".into(),
            handler: "off".into(),
        }));
        assert!(errors.contains(&ValidationError::UnknownHandler {
            logger: "".into(),
            handler: "nope".into(),
        }));
    }

    #[test]
    fn errors_render_readable_messages() {
        assert_eq!(
            ValidationError::UnsupportedVersion(2).to_string(),
            "unsupported version 2 (expected 1)"
        );
        let err = ValidationError::UnknownFormatter {
            handler: "file".into(),
            formatter: "json".into(),
        };
        assert_eq!(err.to_string(), "handler 'file' uses unknown formatter 'json'");
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }

    #[test]
    fn incremental_documents_skip_reference_checks() {
        let update = doc(json!({
            "incremental": true,
            "loggers": {"app": {"level": "ERROR", "handlers": ["defined-remotely"]}}
        }));
        assert!(validate_document(&update).is_ok());
    }
}
