//! Message assembly and delivery to the upstream SMTP server.

use base64::prelude::*;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as AttachmentPart, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{resolve, EffectiveSmtpConfig, ServerSmtpConfig};
use crate::email::{Attachment, EmailRequest, RelayReceipt};
use crate::error::{RelayError, Result};

/// Port on which the upstream expects TLS from the first byte.
pub const SMTPS_PORT: u16 = 465;

/// Default bound on the outbound SMTP exchange.
pub const DEFAULT_SMTP_TIMEOUT: Duration = Duration::from_secs(60);

/// How the outbound SMTP connection is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Timeout for the SMTP connection, `None` waits forever
    pub timeout: Option<Duration>,
    /// Accept any certificate presented by the upstream server
    pub accept_invalid_certs: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_SMTP_TIMEOUT),
            accept_invalid_certs: true,
        }
    }
}

/// Relays email requests using the server's SMTP defaults.
#[derive(Debug, Clone)]
pub struct Relay {
    server: ServerSmtpConfig,
    transport: TransportOptions,
}

impl Relay {
    #[must_use]
    pub const fn new(server: ServerSmtpConfig, transport: TransportOptions) -> Self {
        Self { server, transport }
    }

    #[must_use]
    pub const fn server_config(&self) -> &ServerSmtpConfig {
        &self.server
    }

    /// Decode a JSON request body and relay it.
    pub async fn relay_json(&self, body: &[u8]) -> Result<RelayReceipt> {
        let request: EmailRequest = serde_json::from_slice(body)?;
        self.relay_request(&request).await
    }

    /// Resolve the SMTP target for `request` and relay it.
    pub async fn relay_request(&self, request: &EmailRequest) -> Result<RelayReceipt> {
        let target = resolve(&request.smtp_overrides(), &self.server)?;
        relay(&target, request, &self.transport).await
    }
}

/// Build the message described by `request` and deliver it to `target`.
///
/// Nothing touches the network until every attachment has decoded and the
/// message has been assembled.
pub async fn relay(
    target: &EffectiveSmtpConfig,
    request: &EmailRequest,
    options: &TransportOptions,
) -> Result<RelayReceipt> {
    let draft = Draft::from_request(request)?;

    info!(
        "Sending email from: {}, to: {:?}, cc: {:?}, bcc: {:?}, subject: {}",
        draft.from, draft.to, draft.cc, draft.bcc, draft.subject
    );

    let message = draft.into_message()?;
    deliver(target, options, message).await?;

    info!(
        "Email sent from: {}, to: {:?}, subject: {}",
        request.from, request.to, request.subject
    );

    Ok(RelayReceipt {
        to: request.to.clone(),
        subject: request.subject.clone(),
    })
}

/// Drop empty entries, keeping the order of the rest.
#[must_use]
pub fn normalize_recipients(recipients: &[String]) -> Vec<String> {
    recipients.iter().filter(|r| !r.is_empty()).cloned().collect()
}

/// Decode every attachment. The first bad one fails the whole batch.
pub fn decode_attachments(encoded: &BTreeMap<String, String>) -> Result<Vec<Attachment>> {
    encoded
        .iter()
        .map(|(name, data)| -> Result<Attachment> {
            let data = decode_base64(data).map_err(|source| RelayError::Attachment {
                name: name.clone(),
                source,
            })?;
            debug!("attachment name: {name}, data length: {}", data.len());

            Ok(Attachment {
                filename: name.clone(),
                content_type: mime_guess::from_path(name)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string(),
                data,
            })
        })
        .collect()
}

/// Standard alphabet with padding; line breaks in the payload are skipped.
fn decode_base64(data: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    if data.contains(['\r', '\n']) {
        let joined: String = data.chars().filter(|c| !matches!(c, '\r' | '\n')).collect();
        BASE64_STANDARD.decode(joined)
    } else {
        BASE64_STANDARD.decode(data)
    }
}

/// A message with normalized recipients and decoded attachments.
#[derive(Debug, Clone)]
pub struct Draft {
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<Attachment>,
}

impl Draft {
    pub fn from_request(request: &EmailRequest) -> Result<Self> {
        Ok(Self {
            from: request.from.clone(),
            to: normalize_recipients(&request.to),
            cc: normalize_recipients(&request.cc),
            bcc: normalize_recipients(&request.bcc),
            subject: request.subject.clone(),
            html: request.message.clone(),
            attachments: decode_attachments(&request.attachments)?,
        })
    }

    /// Assemble the MIME message.
    ///
    /// The body is always `text/html`. With attachments the message becomes
    /// `multipart/mixed`, body first.
    pub fn into_message(self) -> Result<Message> {
        let mut builder = Message::builder()
            .from(parse_mailbox(&self.from)?)
            .subject(self.subject);

        for addr in &self.to {
            builder = builder.to(parse_mailbox(addr)?);
        }
        for addr in &self.cc {
            builder = builder.cc(parse_mailbox(addr)?);
        }
        for addr in &self.bcc {
            builder = builder.bcc(parse_mailbox(addr)?);
        }

        let body = SinglePart::html(self.html);
        if self.attachments.is_empty() {
            return Ok(builder.singlepart(body)?);
        }

        let mut mixed = MultiPart::mixed().singlepart(body);
        for attachment in self.attachments {
            let content_type = ContentType::parse(&attachment.content_type).map_err(|source| {
                RelayError::ContentType {
                    name: attachment.filename.clone(),
                    source,
                }
            })?;
            mixed = mixed.singlepart(
                AttachmentPart::new(attachment.filename).body(attachment.data, content_type),
            );
        }

        Ok(builder.multipart(mixed)?)
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address.parse().map_err(|source| RelayError::Address {
        address: address.to_string(),
        source,
    })
}

/// Open a fresh connection to `target` and send `message` over it.
pub async fn deliver(
    target: &EffectiveSmtpConfig,
    options: &TransportOptions,
    message: Message,
) -> Result<()> {
    let transport = build_transport(target, options)?;
    transport.send(message).await?;
    Ok(())
}

fn build_transport(
    target: &EffectiveSmtpConfig,
    options: &TransportOptions,
) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
    let tls_params = TlsParameters::builder(target.host.clone())
        .dangerous_accept_invalid_certs(options.accept_invalid_certs)
        .build()?;

    let tls = if target.port == SMTPS_PORT {
        Tls::Wrapper(tls_params)
    } else {
        Tls::Opportunistic(tls_params)
    };

    let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&target.host)
        .port(target.port)
        .tls(tls)
        .timeout(options.timeout);

    // An empty user means the upstream takes mail without AUTH.
    if !target.user.is_empty() {
        builder = builder.credentials(Credentials::new(
            target.user.clone(),
            target.password.clone(),
        ));
    }

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    fn draft() -> Draft {
        Draft {
            from: "John Doe <john@example.com>".to_string(),
            to: strings(&["a@x.com", "b@x.com"]),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: "Quarterly report".to_string(),
            html: "<p>Hello</p>".to_string(),
            attachments: Vec::new(),
        }
    }

    fn formatted(message: &Message) -> String {
        String::from_utf8(message.formatted()).unwrap()
    }

    fn has_header(text: &str, name: &str) -> bool {
        text.lines().any(|line| line.starts_with(&format!("{name}: ")))
    }

    #[test]
    fn normalize_removes_only_empty_entries() {
        let input = strings(&["a@x.com", "", "b@x.com", "", " "]);
        assert_eq!(
            normalize_recipients(&input),
            strings(&["a@x.com", "b@x.com", " "])
        );
        assert!(normalize_recipients(&strings(&["", ""])).is_empty());
        assert!(normalize_recipients(&[]).is_empty());
    }

    #[test]
    fn decode_round_trips_arbitrary_bytes() {
        let bytes: Vec<u8> = (0..=255).collect();
        let mut encoded = BTreeMap::new();
        encoded.insert("blob.bin".to_string(), BASE64_STANDARD.encode(&bytes));

        let decoded = decode_attachments(&encoded).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].filename, "blob.bin");
        assert_eq!(decoded[0].data, bytes);
    }

    #[test]
    fn decode_skips_line_breaks() {
        let mut encoded = BTreeMap::new();
        encoded.insert("hello.txt".to_string(), "aGVs\r\nbG8=\n".to_string());

        let decoded = decode_attachments(&encoded).unwrap();
        assert_eq!(decoded[0].data, b"hello");
        assert_eq!(decoded[0].content_type, "text/plain");
    }

    #[test]
    fn one_bad_attachment_fails_the_batch() {
        let mut encoded = BTreeMap::new();
        encoded.insert("good.txt".to_string(), BASE64_STANDARD.encode(b"fine"));
        encoded.insert("bad.txt".to_string(), "not base64!".to_string());

        let err = decode_attachments(&encoded).unwrap_err();
        match err {
            RelayError::Attachment { name, .. } => assert_eq!(name, "bad.txt"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unpadded_base64_is_rejected() {
        let mut encoded = BTreeMap::new();
        encoded.insert("hello.txt".to_string(), "aGVsbG8".to_string());

        assert!(decode_attachments(&encoded).is_err());
    }

    #[test]
    fn content_type_is_guessed_from_extension() {
        let mut encoded = BTreeMap::new();
        encoded.insert("report.pdf".to_string(), BASE64_STANDARD.encode(b"%PDF"));
        encoded.insert("data".to_string(), BASE64_STANDARD.encode(b"raw"));

        let decoded = decode_attachments(&encoded).unwrap();
        let by_name = |n: &str| decoded.iter().find(|a| a.filename == n).unwrap();
        assert_eq!(by_name("report.pdf").content_type, "application/pdf");
        assert_eq!(by_name("data").content_type, "application/octet-stream");
    }

    #[test]
    fn draft_from_request_normalizes_every_list() {
        let request = EmailRequest {
            from: "a@x.com".to_string(),
            to: strings(&["", "b@x.com"]),
            cc: strings(&[""]),
            bcc: strings(&["c@x.com", ""]),
            ..Default::default()
        };

        let draft = Draft::from_request(&request).unwrap();
        assert_eq!(draft.to, strings(&["b@x.com"]));
        assert!(draft.cc.is_empty());
        assert_eq!(draft.bcc, strings(&["c@x.com"]));
    }

    #[test]
    fn html_body_without_attachments() {
        let message = draft().into_message().unwrap();
        let text = formatted(&message);

        assert!(text.contains("Content-Type: text/html; charset=utf-8"));
        assert!(text.contains("Subject: Quarterly report"));
        assert!(has_header(&text, "To"));
        assert!(!has_header(&text, "Cc"));
        assert!(!text.contains("multipart/mixed"));
    }

    #[test]
    fn plain_looking_body_is_still_html() {
        let message = Draft {
            html: "just text".to_string(),
            ..draft()
        }
        .into_message()
        .unwrap();

        assert!(formatted(&message).contains("text/html"));
    }

    #[test]
    fn cc_header_only_when_present() {
        let message = Draft {
            cc: strings(&["cc@x.com"]),
            ..draft()
        }
        .into_message()
        .unwrap();

        assert!(has_header(&formatted(&message), "Cc"));
    }

    #[test]
    fn bcc_goes_to_envelope_not_headers() {
        let message = Draft {
            bcc: strings(&["hidden@x.com"]),
            ..draft()
        }
        .into_message()
        .unwrap();

        assert!(!has_header(&formatted(&message), "Bcc"));
        assert!(message
            .envelope()
            .to()
            .iter()
            .any(|addr| addr.to_string() == "hidden@x.com"));
    }

    #[test]
    fn attachments_become_named_parts() {
        let message = Draft {
            attachments: vec![Attachment {
                filename: "report.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                data: b"%PDF-1.4".to_vec(),
            }],
            ..draft()
        }
        .into_message()
        .unwrap();
        let text = formatted(&message);

        assert!(text.contains("multipart/mixed"));
        assert!(text.contains("text/html"));
        assert!(text.contains("application/pdf"));
        assert!(text.contains("filename=\"report.pdf\""));
    }

    #[test]
    fn empty_to_with_cc_is_accepted() {
        let message = Draft {
            to: Vec::new(),
            cc: strings(&["cc@x.com"]),
            ..draft()
        }
        .into_message()
        .unwrap();

        assert!(!has_header(&formatted(&message), "To"));
        assert_eq!(message.envelope().to().len(), 1);
    }

    #[test]
    fn no_recipients_at_all_is_rejected() {
        let err = Draft {
            to: Vec::new(),
            ..draft()
        }
        .into_message()
        .unwrap_err();

        assert!(matches!(err, RelayError::Message(_)));
    }

    #[test]
    fn invalid_address_is_reported() {
        let err = Draft {
            to: strings(&["not an address"]),
            ..draft()
        }
        .into_message()
        .unwrap_err();

        match err {
            RelayError::Address { address, .. } => assert_eq!(address, "not an address"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn transport_options_default_to_bounded_insecure() {
        let options = TransportOptions::default();
        assert_eq!(options.timeout, Some(DEFAULT_SMTP_TIMEOUT));
        assert!(options.accept_invalid_certs);
    }

    #[tokio::test]
    async fn missing_config_stops_before_assembly() {
        let relay = Relay::new(ServerSmtpConfig::default(), TransportOptions::default());
        let request = EmailRequest {
            from: "a@x.com".to_string(),
            to: strings(&["b@x.com"]),
            ..Default::default()
        };

        let err = relay.relay_request(&request).await.unwrap_err();
        assert!(matches!(err, RelayError::MissingConfig));
    }

    #[tokio::test]
    async fn malformed_json_is_a_request_error() {
        let relay = Relay::new(ServerSmtpConfig::default(), TransportOptions::default());

        let err = relay.relay_json(b"{\"to\": [").await.unwrap_err();
        assert!(matches!(err, RelayError::Request(_)));
    }
}
