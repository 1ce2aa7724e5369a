//! SMTP target resolution.
//!
//! The server carries a set of default SMTP parameters. A request may carry
//! its own, which are only honoured when the server allows overriding.

use crate::error::{RelayError, Result};

/// SMTP defaults configured at startup. Shared read-only by every request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerSmtpConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Whether request-supplied SMTP fields may replace the defaults
    pub allow_override: bool,
}

/// SMTP fields supplied by a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmtpOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Fully resolved SMTP parameters for one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveSmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

/// Merge request overrides with the server defaults, field by field.
///
/// A request value wins only when it is present and overriding is allowed.
/// When overriding is disabled a present request value is dropped without
/// error. Fails with [`RelayError::MissingConfig`] if any field is still unset.
pub fn resolve(overrides: &SmtpOverrides, server: &ServerSmtpConfig) -> Result<EffectiveSmtpConfig> {
    fn pick<T: Clone>(requested: Option<&T>, default: Option<&T>, allow: bool) -> Option<T> {
        requested.filter(|_| allow).or(default).cloned()
    }

    let allow = server.allow_override;
    let host = pick(overrides.host.as_ref(), server.host.as_ref(), allow);
    let port = pick(overrides.port.as_ref(), server.port.as_ref(), allow);
    let user = pick(overrides.user.as_ref(), server.user.as_ref(), allow);
    let password = pick(overrides.password.as_ref(), server.password.as_ref(), allow);

    match (host, port, user, password) {
        (Some(host), Some(port), Some(user), Some(password)) => Ok(EffectiveSmtpConfig {
            host,
            port,
            user,
            password,
        }),
        _ => Err(RelayError::MissingConfig),
    }
}
