//! Telephony outgoing Sink (§4.6 "Telephony outgoing")
//!
//! Grounded on `examples/original_source/src/tw_outgoing.py`'s `WordQueue`
//! and `TwOutgoing.run`: unlike the local Sink, outbound audio is handed to
//! the peer immediately and buffered there for real-time playback, so
//! barge-in has to reach back into the peer's buffer with a `clear` control
//! frame rather than just stopping local playback. Word-to-conversation
//! accounting therefore runs off wall-clock advancement against a queue of
//! `(remaining_duration, word)` entries instead of a blocking per-word wait.

use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use axum::extract::ws::Message;
use base64::Engine;
use tracing::info;

use crate::conversation::Conversation;
use crate::flags::{ExitFlag, SpeakingFlag};
use crate::pipeline::{recv_timeout, AudioQReceiver, RecvOutcome};
use crate::telephony::mulaw;
use crate::types::Role;

const SPEAKING_POLL: Duration = Duration::from_millis(250);

struct WordQueueEntry {
    remaining_secs: f64,
    word: String,
}

struct WordQueue {
    entries: VecDeque<WordQueueEntry>,
    last_update: Instant,
}

impl WordQueue {
    fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            last_update: Instant::now(),
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Advance the queue by the wall-clock time since the last call,
    /// committing fully-consumed words to the conversation and leaving a
    /// partially-consumed head entry with reduced remaining duration.
    fn update(&mut self, conversation: &Conversation) {
        let now = Instant::now();
        let mut time_passed = now.duration_since(self.last_update).as_secs_f64();
        self.last_update = now;

        while time_passed > 0.0 {
            let Some(entry) = self.entries.pop_front() else {
                break;
            };
            time_passed -= entry.remaining_secs;
            if time_passed < 0.0 {
                self.entries.push_front(WordQueueEntry {
                    remaining_secs: -time_passed,
                    word: entry.word,
                });
            } else {
                conversation.append(Role::Assistant, &entry.word);
            }
        }
    }

    fn add_words(&mut self, text: &str, duration_secs: f64) {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return;
        }
        let duration_per_word = duration_secs / words.len() as f64;
        if self.entries.is_empty() {
            self.last_update = Instant::now();
        }
        for word in words {
            self.entries.push_back(WordQueueEntry {
                remaining_secs: duration_per_word,
                word: word.to_string(),
            });
        }
    }
}

/// Run the Telephony Outgoing stage to completion. `ws_tx` forwards outbound
/// frames to the async WebSocket writer task bridging this OS thread to the
/// connection.
pub fn run(
    stream_sid_rx: Receiver<String>,
    audio_q: AudioQReceiver,
    ws_tx: tokio::sync::mpsc::UnboundedSender<Message>,
    speaking: &SpeakingFlag,
    exit: &ExitFlag,
    conversation: &Conversation,
) {
    info!("telephony outgoing: started, waiting for stream SID");

    let stream_sid = loop {
        if exit.is_set() {
            return;
        }
        match stream_sid_rx.recv_timeout(SPEAKING_POLL) {
            Ok(sid) => break sid,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return,
        }
    };
    info!(stream_sid = %stream_sid, "telephony outgoing: stream SID received");

    let mut word_queue = WordQueue::new();

    loop {
        if exit.is_set() {
            break;
        }

        if speaking.is_set() {
            if !word_queue.is_empty() {
                let clear = serde_json::json!({"event": "clear", "streamSid": stream_sid});
                if ws_tx.send(Message::Text(clear.to_string().into())).is_err() {
                    break;
                }
                word_queue.clear();
            }
            std::thread::sleep(SPEAKING_POLL);
            continue;
        }

        word_queue.update(conversation);

        let clip = match recv_timeout(&audio_q) {
            RecvOutcome::Item(c) => c,
            RecvOutcome::Timeout => continue,
            RecvOutcome::Disconnected => break,
        };

        let max_amplitude = clip.samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
        let normalized: Vec<f32> = if max_amplitude > 1.0 {
            clip.samples.iter().map(|&s| s / max_amplitude).collect()
        } else {
            clip.samples.clone()
        };

        let payload = base64::engine::general_purpose::STANDARD.encode(mulaw::encode(&normalized));
        let media = serde_json::json!({
            "event": "media",
            "streamSid": stream_sid,
            "media": {"payload": payload},
        });
        if ws_tx.send(Message::Text(media.to_string().into())).is_err() {
            break;
        }

        let duration_secs = normalized.len() as f64 / clip.sample_rate.max(1) as f64;
        word_queue.add_words(&clip.text, duration_secs);
    }
    info!("telephony outgoing: exit observed, stopping");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_words_splits_duration_evenly() {
        let mut q = WordQueue::new();
        q.add_words("hello there friend", 3.0);
        assert_eq!(q.entries.len(), 3);
        for entry in &q.entries {
            assert!((entry.remaining_secs - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn empty_text_adds_nothing() {
        let mut q = WordQueue::new();
        q.add_words("   ", 2.0);
        assert!(q.is_empty());
    }

    #[test]
    fn clear_empties_the_queue() {
        let mut q = WordQueue::new();
        q.add_words("a b c", 3.0);
        assert!(!q.is_empty());
        q.clear();
        assert!(q.is_empty());
    }
}
