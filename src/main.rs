//! CLI entry point for json2smtp.

use clap::{ArgAction, Parser};
use json2smtp::{start_relay, RelayOptions, ServerSmtpConfig, TransportOptions};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "json2smtp", version)]
#[command(about = "Get json input and call smtp - a json to smtp proxy")]
#[command(
    after_help = "Recommendation: put the service behind a reverse proxy for TLS towards callers"
)]
struct Cli {
    /// The port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,

    /// SMTP host, e.g. smtp.example.com
    #[arg(long)]
    smtphost: Option<String>,

    /// The port to connect to the SMTP server on
    #[arg(long, default_value = "587")]
    smtpport: u16,

    /// Username for the SMTP server, empty to skip AUTH
    #[arg(long)]
    smtpuser: Option<String>,

    /// Password for the SMTP user
    #[arg(long)]
    smtppassword: Option<String>,

    /// Allow SMTP parameters in the JSON call; false always uses the configured ones
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    smtpoverride: bool,

    /// Timeout for the outbound SMTP connection in seconds, 0 for none
    #[arg(long, default_value = "60")]
    smtp_timeout: u64,

    /// Verify the SMTP server's TLS certificate
    #[arg(long)]
    tls_verify: bool,

    /// Largest accepted request body in bytes
    #[arg(long, default_value_t = json2smtp::DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let opts = RelayOptions {
        http_port: Some(cli.port),
        smtp: ServerSmtpConfig {
            host: cli.smtphost,
            port: Some(cli.smtpport),
            user: cli.smtpuser,
            password: cli.smtppassword,
            allow_override: cli.smtpoverride,
        },
        transport: TransportOptions {
            timeout: (cli.smtp_timeout > 0).then(|| Duration::from_secs(cli.smtp_timeout)),
            accept_invalid_certs: !cli.tls_verify,
        },
        max_body_bytes: Some(cli.max_body_bytes),
    };

    let server = start_relay(opts).await?;

    // Wait for Ctrl+C
    tokio::signal::ctrl_c().await?;
    server.stop().await;

    tracing::info!("json2smtp server ended");
    Ok(())
}
