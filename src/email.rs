//! Email request and result types.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::config::SmtpOverrides;

/// An email description as posted by a caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailRequest {
    pub from: String,
    #[serde(deserialize_with = "null_as_default")]
    pub to: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub cc: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub bcc: Vec<String>,
    pub subject: String,
    /// HTML body
    pub message: String,
    /// Filename to base64 content
    #[serde(deserialize_with = "null_as_default")]
    pub attachments: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smtphost: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smtpport: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smtpuser: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smtppassword: Option<String>,
}

impl EmailRequest {
    /// The SMTP fields the caller asked for.
    #[must_use]
    pub fn smtp_overrides(&self) -> SmtpOverrides {
        SmtpOverrides {
            host: self.smtphost.clone(),
            port: self.smtpport,
            user: self.smtpuser.clone(),
            password: self.smtppassword.clone(),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A decoded attachment, ready to be added to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Confirmation of a delivered email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReceipt {
    /// Recipients exactly as requested, before empty entries were dropped
    pub to: Vec<String>,
    pub subject: String,
}

impl RelayReceipt {
    /// Bracketed, space separated recipient list, e.g. `[a@x.com b@x.com]`.
    #[must_use]
    pub fn to_text(&self) -> String {
        format!("[{}]", self.to.join(" "))
    }
}
