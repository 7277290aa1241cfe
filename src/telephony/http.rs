//! `GET /incoming-call` TwiML handler (§4.1, §6)
//!
//! Grounded on `examples/original_source/src/main_twilio.py`'s `on_request`:
//! a TwiML `<Connect><Stream url="wss://…/media-stream"/></Connect>` pointed
//! at this server's own `/media-stream` WebSocket route. The original also
//! tracks "served" connection IDs in a global `CLOSED_IDS` set to avoid
//! double-handling a connection's HTTP upgrade; axum's router dispatches
//! `/incoming-call` and `/media-stream` to distinct handlers per request, so
//! that bookkeeping has no counterpart here (§9 redesign note: no global
//! mutable per-connection state).

use axum::http::header;
use axum::response::IntoResponse;

/// Render the TwiML response wiring a Twilio `<Stream>` to this server's
/// `/media-stream` WebSocket endpoint on `host`.
pub fn incoming_call_twiml(host: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Connect><Stream url=\"wss://{host}/media-stream\"/></Connect></Response>"
    )
}

pub async fn incoming_call(headers: axum::http::HeaderMap) -> impl IntoResponse {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");
    let body = incoming_call_twiml(host);
    (
        [
            (header::CONTENT_TYPE, "application/xml"),
            (header::CONNECTION, "close"),
        ],
        body,
    )
}

/// Any path other than `/incoming-call` or `/media-stream` (§6: "Any other
/// path → 404 plain text, connection closed").
pub async fn not_found() -> impl IntoResponse {
    (
        axum::http::StatusCode::NOT_FOUND,
        [
            (header::CONTENT_TYPE, "text/plain"),
            (header::CONNECTION, "close"),
        ],
        "Not Found",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twiml_points_stream_at_media_stream_path() {
        let xml = incoming_call_twiml("example.com");
        assert!(xml.contains("wss://example.com/media-stream"));
        assert!(xml.starts_with("<?xml"));
    }
}
