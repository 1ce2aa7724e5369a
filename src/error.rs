//! Error types for the relay pipeline.

use std::fmt;

use lettre::address::AddressError;
use lettre::message::header::ContentTypeErr;

/// Failure of a single relay attempt.
///
/// Every variant terminates only the request that produced it. The HTTP layer
/// turns it into a `{"error": ...}` body using the `Display` text.
#[derive(Debug)]
pub enum RelayError {
    /// The request body was not a valid email description
    Request(serde_json::Error),
    /// One or more SMTP parameters were left unset after merging
    MissingConfig,
    /// An attachment was not valid base64
    Attachment {
        name: String,
        source: base64::DecodeError,
    },
    /// No usable MIME type could be derived from an attachment's filename
    ContentType {
        name: String,
        source: ContentTypeErr,
    },
    /// A sender or recipient could not be parsed as a mailbox
    Address {
        address: String,
        source: AddressError,
    },
    /// The message could not be assembled
    Message(lettre::error::Error),
    /// The SMTP exchange failed
    Delivery(lettre::transport::smtp::Error),
}

impl RelayError {
    /// Short stable name of the failure, used as a log field.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Request(_) => "request_decode",
            Self::MissingConfig => "configuration_missing",
            Self::Attachment { .. } | Self::ContentType { .. } => "attachment_decode",
            Self::Address { .. } => "invalid_address",
            Self::Message(_) => "message_build",
            Self::Delivery(_) => "delivery",
        }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(e) => write!(f, "Error decoding JSON request body: {e}"),
            Self::MissingConfig => write!(f, "Missing smtp host data for sending"),
            Self::Attachment { name, source } => {
                write!(f, "Error decoding base64 attachment {name}: {source}")
            }
            Self::ContentType { name, source } => {
                write!(f, "Error attaching {name}: {source}")
            }
            Self::Address { address, source } => {
                write!(f, "Error sending email: invalid address \"{address}\": {source}")
            }
            Self::Message(e) => write!(f, "Error sending email: {e}"),
            Self::Delivery(e) => write!(f, "Error sending email: {e}"),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(e) => Some(e),
            Self::MissingConfig => None,
            Self::Attachment { source, .. } => Some(source),
            Self::ContentType { source, .. } => Some(source),
            Self::Address { source, .. } => Some(source),
            Self::Message(e) => Some(e),
            Self::Delivery(e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        Self::Request(e)
    }
}

impl From<lettre::error::Error> for RelayError {
    fn from(e: lettre::error::Error) -> Self {
        Self::Message(e)
    }
}

impl From<lettre::transport::smtp::Error> for RelayError {
    fn from(e: lettre::transport::smtp::Error) -> Self {
        Self::Delivery(e)
    }
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
