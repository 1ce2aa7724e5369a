//! JSON to SMTP relay: accepts email descriptions over HTTP and forwards
//! them to an upstream SMTP server.

mod config;
mod email;
mod error;
mod http;
mod relay;

pub use config::{resolve, EffectiveSmtpConfig, ServerSmtpConfig, SmtpOverrides};
pub use email::{Attachment, EmailRequest, RelayReceipt};
pub use error::{RelayError, Result};
pub use http::router;
pub use relay::{
    decode_attachments, deliver, normalize_recipients, relay, Draft, Relay, TransportOptions,
    DEFAULT_SMTP_TIMEOUT, SMTPS_PORT,
};

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

/// Default limit on the size of a posted request body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Configuration options for the relay server.
#[derive(Debug, Clone, Default)]
pub struct RelayOptions {
    pub http_port: Option<u16>,
    pub smtp: ServerSmtpConfig,
    pub transport: TransportOptions,
    pub max_body_bytes: Option<usize>,
}

/// Running server handle.
pub struct RunningServer {
    pub http_addr: SocketAddr,
    http_handle: tokio::task::JoinHandle<()>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RunningServer {
    /// Stop the server gracefully.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.http_handle.await;
    }
}

/// Start the relay with the given options.
pub async fn start_relay(opts: RelayOptions) -> std::io::Result<RunningServer> {
    let http_port = opts.http_port.unwrap_or(8080);
    let max_body_bytes = opts.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let http_listener = TcpListener::bind(("0.0.0.0", http_port)).await?;
    let http_addr = http_listener.local_addr()?;

    info!(
        "json2smtp server started, listening on port: {}, host: {}, allow json smtp information: {}",
        http_addr.port(),
        opts.smtp.host.as_deref().unwrap_or("<unset>"),
        opts.smtp.allow_override
    );

    let relay = Arc::new(Relay::new(opts.smtp, opts.transport));
    let http_shutdown = shutdown_tx.subscribe();
    let http_handle = tokio::spawn(async move {
        http::run_http_server(http_listener, relay, max_body_bytes, http_shutdown).await;
    });

    Ok(RunningServer {
        http_addr,
        http_handle,
        shutdown_tx,
    })
}
