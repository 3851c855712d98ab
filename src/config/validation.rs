//! Configuration validation logic.

use std::str::FromStr;

use crate::config::schema::AppConfig;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

/// Validate an AppConfig for semantic correctness.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.sources.is_empty() {
        errors.push(ValidationError("at least one source must be configured".into()));
    }

    if config.templates.is_empty() {
        errors.push(ValidationError("at least one template version must be configured".into()));
    }
    for (version, types) in &config.templates {
        if types.is_empty() {
            errors.push(ValidationError(format!(
                "template version {version:?} configures no resource types"
            )));
        }
    }

    if config.source_config.refresh_rate == 0 {
        errors.push(ValidationError("source_config.refresh_rate must be > 0".into()));
    }

    let ctx = &config.template_context;
    if ctx.refresh_rate.is_some() && ctx.refresh_cron.is_some() {
        errors.push(ValidationError(
            "template_context.refresh_rate and refresh_cron are mutually exclusive".into(),
        ));
    }
    if let Some(expr) = &ctx.refresh_cron {
        if parse_cron(expr).is_err() {
            errors.push(ValidationError(format!("{expr:?} is not a valid cron expression")));
        }
    }

    if config.authentication.enabled {
        if config.authentication.encryption_key.is_none() {
            errors.push(ValidationError(
                "authentication is enabled but no encryption_key is configured".into(),
            ));
        }
        if config.authentication.auth_passwords.is_empty() {
            errors.push(ValidationError(
                "authentication is enabled but auth_passwords is empty".into(),
            ));
        }
    }

    let status = config.server.no_change_status;
    if !(100..=599).contains(&status) {
        errors.push(ValidationError(format!(
            "server.no_change_status {status} is not a valid HTTP status"
        )));
    }

    if let Some(remote) = &config.discovery_cache.remote {
        if remote.kind != "redis" {
            errors.push(ValidationError(format!(
                "discovery_cache.remote.kind {:?} is not supported",
                remote.kind
            )));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parse a schedule expression, accepting the conventional five-field cron
/// form by pinning the seconds field to zero.
pub fn parse_cron(expr: &str) -> Result<cron::Schedule, cron::error::Error> {
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    cron::Schedule::from_str(&normalized)
}
