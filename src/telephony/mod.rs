//! Telephony front-end: Twilio Media Streams over HTTP + WebSocket (§4.1,
//! §4.6, §6)
//!
//! `GET /incoming-call` returns TwiML pointing Twilio at this server's own
//! `/media-stream` WebSocket route, which then carries the six-stage
//! pipeline for the duration of one call — grounded on
//! `examples/original_source/src/main_twilio.py`'s `on_request`/`handler`
//! pair, reshaped onto axum's router/state model instead of a raw
//! `websockets.sync.server` callback.

pub mod http;
pub mod mulaw;
pub mod outgoing;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::Config;

/// Build the telephony server's router: `/incoming-call` (TwiML) and
/// `/media-stream` (the per-call WebSocket).
pub fn router(config: Arc<Config>) -> Router {
    Router::new()
        .route("/incoming-call", get(http::incoming_call))
        .route("/media-stream", get(ws::media_stream))
        .fallback(http::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(config)
}
