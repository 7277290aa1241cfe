//! Telephony (Twilio Media Streams) server entry point (§6 CLI)
//!
//! Grounded on `examples/original_source/src/main_twilio.py`'s `main`: binds
//! `tw_host:tw_port` and serves `/incoming-call` (TwiML) and `/media-stream`
//! (WebSocket); each accepted media stream wires a fresh set of six pipeline
//! stage threads (`telephony::ws::handle_media_stream`). CTRL-C stops
//! accepting new connections; in-flight calls each own their `exit` flag and
//! shut down on their own `stop`/transport-error signal.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use duplex_voice::telephony;
use duplex_voice::Config;

#[derive(Parser)]
#[command(
    name = "duplex-tw",
    about = "Telephony (Twilio Media Streams) server for the speech-to-speech agent"
)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "DUPLEX_CONFIG", default_value = "./priv/config.json")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,duplex_voice=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config).context("failed to load configuration")?;
    let host = config.general.tw_host.clone();
    let port = config.general.tw_port;

    let app = telephony::router(Arc::new(config));
    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("failed to bind telephony server on {host}:{port}"))?;

    info!(host = %host, port, "duplex-tw: telephony server started");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("telephony server error")?;
    info!("duplex-tw: done");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
