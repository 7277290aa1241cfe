//! `GET /media-stream` Twilio Media Streams WebSocket handler (§4.1, §4.6)
//!
//! Per-connection wiring: parses Twilio's `event`-tagged JSON envelopes
//! (`StreamEvent`, grounded on
//! `examples/other_examples/dcd41259_dnacenta-voice-echo__src-twilio-media.rs.rs`)
//! and bridges them onto the same `pipeline::` stages the local demo uses,
//! running as plain OS threads per §5's scheduling model. The async
//! WebSocket task itself only ever does two things: decode incoming `media`
//! frames onto SegQ, and forward whatever the (synchronous) Telephony
//! Outgoing thread hands it back over an unbounded channel — `ws.split()` +
//! one reader loop + one writer task is the same `tokio::select!`-free shape
//! as the grounding file's `handle_media_stream`, adapted to hand the actual
//! pipeline off to threads instead of `tokio::spawn`.

use std::sync::mpsc;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::conversation::Conversation;
use crate::flags::{ExitFlag, SpeakingFlag};
use crate::pipeline::{responder, segmenter, synthesizer, transcriber};
use crate::telephony::{mulaw, outgoing};
use crate::types::{AudioFrame, Sentence};
use crate::vad::SileroVad;

pub const TW_SAMPLE_RATE: u32 = 8000;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
#[allow(dead_code)]
enum StreamEvent {
    Connected,
    Start {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
    Media {
        media: MediaPayload,
    },
    Mark,
    Stop,
}

#[derive(Debug, Deserialize)]
struct MediaPayload {
    payload: String,
}

pub async fn media_stream(
    ws: WebSocketUpgrade,
    State(config): State<Arc<Config>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_media_stream(socket, config))
}

async fn handle_media_stream(socket: WebSocket, config: Arc<Config>) {
    info!("telephony media stream connected");

    let (mut ws_sink, mut ws_stream) = socket.split();
    let (out_tx, mut out_rx) = tokio::sync::mpsc::unbounded_channel::<Message>();

    let (seg_tx, seg_rx) = mpsc::channel::<AudioFrame>();
    let (utt_tx, utt_rx) = mpsc::channel();
    let (text_tx, text_rx) = mpsc::channel();
    let (sent_tx, sent_rx) = mpsc::channel::<Sentence>();
    let (audio_tx, audio_rx) = mpsc::channel();
    let (sid_tx, sid_rx) = mpsc::channel::<String>();

    let speaking = SpeakingFlag::new();
    let exit = ExitFlag::new();
    let conversation = Arc::new(Conversation::new());

    let mut handles = Vec::new();

    let greeting = config.general.initial_greeting.clone();
    if !greeting.trim().is_empty() {
        let _ = sent_tx.send(Sentence { text: greeting });
    }

    {
        let model_path = config.segmenter.model_path.clone();
        let speaking = speaking.clone();
        let exit = exit.clone();
        handles.push(std::thread::spawn(move || {
            let vad = match SileroVad::load(&model_path) {
                Ok(v) => v,
                Err(e) => {
                    warn!("telephony: failed to load VAD model: {e}");
                    return;
                }
            };
            if let Err(e) = segmenter::run(vad, TW_SAMPLE_RATE, seg_rx, utt_tx, speaking, &exit) {
                warn!("telephony: segmenter stage exited with error: {e}");
            }
        }));
    }

    {
        let cfg = config.transcriber.clone();
        let exit = exit.clone();
        handles.push(std::thread::spawn(move || {
            let client = transcriber::GroqAsrClient::new(cfg.api_key.clone(), cfg.model.clone());
            transcriber::warm_up(&client, TW_SAMPLE_RATE, &cfg.language);
            transcriber::run(&client, &cfg.language, utt_rx, text_tx, &exit);
        }));
    }

    {
        let cfg = config.responder.clone();
        let conversation = conversation.clone();
        let speaking = speaking.clone();
        let exit = exit.clone();
        handles.push(std::thread::spawn(move || {
            let client = responder::AnthropicClient::new(cfg.api_key.clone());
            responder::warm_up(&client, &cfg.system_message, &cfg.model);
            responder::run(
                &client,
                &cfg.system_message,
                &cfg.model,
                cfg.max_tokens,
                &conversation,
                text_rx,
                sent_tx,
                &speaking,
                &exit,
            );
        }));
    }

    {
        let cfg = config.synthesizer.clone();
        let speaking = speaking.clone();
        let exit = exit.clone();
        handles.push(std::thread::spawn(move || {
            let client = match synthesizer::GoogleTtsClient::new(
                &cfg.credentials_path,
                cfg.voice_language_code.clone(),
                cfg.voice_name.clone(),
                cfg.voice_gender,
                TW_SAMPLE_RATE,
            ) {
                Ok(c) => c,
                Err(e) => {
                    warn!("telephony: failed to construct TTS client: {e}");
                    return;
                }
            };
            synthesizer::warm_up(&client);
            synthesizer::run(&client, sent_rx, audio_tx, &speaking, &exit);
        }));
    }

    {
        let speaking = speaking.clone();
        let exit = exit.clone();
        let conversation = conversation.clone();
        let out_tx = out_tx.clone();
        handles.push(std::thread::spawn(move || {
            outgoing::run(sid_rx, audio_rx, out_tx, &speaking, &exit, &conversation);
        }));
    }

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if ws_sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = ws_stream.next().await {
        let msg = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let event: StreamEvent = match serde_json::from_str(&msg) {
            Ok(e) => e,
            Err(e) => {
                warn!("telephony: failed to parse stream event: {e}");
                continue;
            }
        };

        match event {
            StreamEvent::Connected => {}
            StreamEvent::Start { stream_sid } => {
                let _ = sid_tx.send(stream_sid);
            }
            StreamEvent::Media { media } => {
                let bytes = match base64::engine::general_purpose::STANDARD.decode(&media.payload)
                {
                    Ok(b) => b,
                    Err(e) => {
                        warn!("telephony: failed to decode media payload: {e}");
                        continue;
                    }
                };
                let samples = mulaw::decode(&bytes);
                let _ = seg_tx.send(AudioFrame {
                    samples,
                    sample_rate: TW_SAMPLE_RATE,
                });
            }
            StreamEvent::Mark => {}
            StreamEvent::Stop => {
                exit.set();
                break;
            }
        }
    }

    exit.set();
    writer.abort();
    for handle in handles {
        let _ = handle.join();
    }
    info!("telephony media stream disconnected");
}
