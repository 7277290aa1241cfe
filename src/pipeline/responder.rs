//! Streaming LLM responder with sentence-boundary re-segmentation (§4.4)
//!
//! The sentence splitter and retry/backoff discipline are grounded on
//! `examples/original_source/src/responder.py`'s `segment_text_by_regex`
//! and `Responder.loop`. The SSE parsing loop (buffer + `"\n\n"` event
//! splitting, `data: ` prefix) is grounded on the teacher's
//! `agent::llm::OpenRouterClient::stream_complete`, adapted from an
//! OpenAI-shaped delta stream to an Anthropic Messages API stream
//! (`content_block_delta` events with `delta.text`), matching the original's
//! use of `client.messages.stream()`.

use std::io::{BufRead, BufReader};
use std::sync::mpsc::Sender;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::conversation::Conversation;
use crate::flags::{ExitFlag, SpeakingFlag};
use crate::pipeline::{recv_timeout, RecvOutcome, SentQSender, TextQReceiver};
use crate::types::{Role, Sentence, Transcript};

pub const MAX_RETRIES: u32 = 5;
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

pub const END_PUNCTUATIONS: &[&str] = &[".", "!", "?", "。", "！", "？", "...", "。。。"];
pub const ABBREVIATIONS: &[&str] = &[
    "Mr.", "Mrs.", "Dr.", "Prof.", "Inc.", "Ltd.", "Jr.", "Sr.", "e.g.", "i.e.", "vs.", "St.",
    "Rd.",
];

const MULTI_CHAR_TERMINALS: &[&str] = &["...", "。。。"];
const SINGLE_CHAR_TERMINALS: &[char] = &['.', '!', '?', '。', '！', '？'];

/// Find the end of the next terminal-punctuation token at or after byte
/// offset `from`, preferring a multi-char ellipsis match over the single
/// period it starts with. Returns a byte offset just past the token, or
/// `None` if no terminal punctuation remains.
fn next_terminal_end(text: &str, from: usize) -> Option<usize> {
    let tail = &text[from..];
    for (i, c) in tail.char_indices() {
        let rest = &tail[i..];
        if let Some(m) = MULTI_CHAR_TERMINALS.iter().find(|p| rest.starts_with(**p)) {
            return Some(from + i + m.len());
        }
        if SINGLE_CHAR_TERMINALS.contains(&c) {
            return Some(from + i + c.len_utf8());
        }
    }
    None
}

/// Incremental sentence splitter (§4.4). Scans left to right for the next
/// terminal-punctuation token. If the text up to and including that token
/// ends with a listed abbreviation, the split is skipped and scanning
/// resumes past that token *within the same growing candidate* — the
/// abbreviation stays part of the sentence under construction rather than
/// being discarded. Returns `(complete_sentences, remainder)`.
pub fn split_sentences(text: &str) -> (Vec<String>, String) {
    if text.is_empty() {
        return (Vec::new(), String::new());
    }

    let mut complete = Vec::new();
    let mut remaining = text.trim().to_string();
    let mut scan_from = 0usize;

    loop {
        let Some(end) = next_terminal_end(&remaining, scan_from) else {
            break;
        };
        let candidate = remaining[..end].trim().to_string();
        let is_abbreviation = ABBREVIATIONS.iter().any(|a| candidate.ends_with(a));
        if is_abbreviation {
            scan_from = end;
            continue;
        }
        complete.push(candidate);
        remaining = remaining[end..].trim_start().to_string();
        scan_from = 0;
    }

    (complete, remaining)
}

/// Streaming LLM client, opaque per §1. One real implementation
/// (`AnthropicClient`) plus a fake for tests. `on_token` is invoked once per
/// streamed text fragment; returning `false` aborts the stream (barge-in).
pub trait LlmClient: Send {
    fn stream_complete(
        &self,
        system: &str,
        model: &str,
        max_tokens: u32,
        messages: &[(Role, String)],
        on_token: &mut dyn FnMut(&str) -> bool,
    ) -> Result<()>;
}

pub struct AnthropicClient {
    http: reqwest::blocking::Client,
    api_key: String,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            api_key,
        }
    }
}

impl LlmClient for AnthropicClient {
    fn stream_complete(
        &self,
        system: &str,
        model: &str,
        max_tokens: u32,
        messages: &[(Role, String)],
        on_token: &mut dyn FnMut(&str) -> bool,
    ) -> Result<()> {
        let body = serde_json::json!({
            "model": model,
            "system": system,
            "max_tokens": max_tokens,
            "stream": true,
            "messages": messages.iter().map(|(role, text)| {
                serde_json::json!({"role": role.as_str(), "content": text})
            }).collect::<Vec<_>>(),
        });

        let response = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .context("LLM stream request failed")?
            .error_for_status()
            .context("LLM stream request returned an error status")?;

        let reader = BufReader::new(response);
        for line in reader.lines() {
            let line = line.context("failed reading SSE line")?;
            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            if data == "[DONE]" {
                break;
            }
            let event: serde_json::Value = match serde_json::from_str(data) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if event.get("type").and_then(|t| t.as_str()) == Some("content_block_delta") {
                if let Some(text) = event
                    .pointer("/delta/text")
                    .and_then(|t| t.as_str())
                {
                    if !on_token(text) {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}

/// One warm-up call issued at startup, errors ignored (§4.4).
pub fn warm_up(client: &dyn LlmClient, system: &str, model: &str) {
    let messages = [(Role::User, "test".to_string())];
    let _ = client.stream_complete(system, model, 1, &messages, &mut |_| true);
}

pub fn run(
    client: &dyn LlmClient,
    system_message: &str,
    model: &str,
    max_tokens: u32,
    conversation: &Conversation,
    text_q: TextQReceiver,
    sent_q: SentQSender,
    speaking: &SpeakingFlag,
    exit: &ExitFlag,
) {
    info!("responder: started");
    loop {
        if exit.is_set() {
            break;
        }
        let transcript = match recv_timeout(&text_q) {
            RecvOutcome::Item(t) => t,
            RecvOutcome::Timeout => continue,
            RecvOutcome::Disconnected => break,
        };

        let messages = append_user_turn(conversation, &transcript);

        if speaking.is_set() {
            continue;
        }
        if exit.is_set() {
            return;
        }

        let mut succeeded = false;
        for attempt in 1..=MAX_RETRIES {
            let mut buffer = String::new();
            let mut aborted_for_speaking = false;
            let result = client.stream_complete(
                system_message,
                model,
                max_tokens,
                &messages,
                &mut |fragment| {
                    if speaking.is_set() {
                        aborted_for_speaking = true;
                        return false;
                    }
                    if exit.is_set() {
                        return false;
                    }
                    buffer.push_str(fragment);
                    let (sentences, remainder) = split_sentences(&buffer);
                    buffer = remainder;
                    for sentence in sentences {
                        if !sentence.is_empty() {
                            let _ = sent_q.send(Sentence { text: sentence });
                        }
                    }
                    true
                },
            );

            if exit.is_set() {
                return;
            }

            match result {
                Ok(()) => {
                    if !aborted_for_speaking && !buffer.trim().is_empty() {
                        let _ = sent_q.send(Sentence {
                            text: buffer.trim().to_string(),
                        });
                    }
                    succeeded = true;
                    break;
                }
                Err(e) => {
                    warn!(attempt, "responder: LLM stream failed: {e}");
                    if attempt == MAX_RETRIES {
                        let _ = sent_q.send(Sentence {
                            text: format!(
                                "Error: failed after {MAX_RETRIES} attempts: {e}"
                            ),
                        });
                        error!("responder: exhausted retries");
                    } else if speaking.wait(RETRY_DELAY) {
                        break;
                    }
                }
            }
        }
        let _ = succeeded;
    }
    info!("responder: exit observed, stopping");
}

fn append_user_turn(conversation: &Conversation, transcript: &Transcript) -> Vec<(Role, String)> {
    conversation
        .append(Role::User, &transcript.text)
        .into_iter()
        .map(|turn| (turn.role, turn.text))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_two_sentences_regardless_of_fragment_boundary() {
        let (complete, remainder) = split_sentences("Hi. How are you?");
        assert_eq!(complete, vec!["Hi.".to_string(), "How are you?".to_string()]);
        assert_eq!(remainder, "");
    }

    #[test]
    fn does_not_split_on_abbreviation() {
        let (complete, remainder) = split_sentences("Mr. Smith went home.");
        assert_eq!(complete, vec!["Mr. Smith went home.".to_string()]);
        assert_eq!(remainder, "");
    }

    #[test]
    fn splitter_is_idempotent_on_remainder() {
        let (c1, r1) = split_sentences("Hi. How");
        let (c2, r2) = split_sentences(&(r1.clone() + " are you?"));
        let mut all = c1;
        all.extend(c2);
        assert_eq!(all, vec!["Hi.".to_string(), "How are you?".to_string()]);
        assert_eq!(r2, "");
        let _ = r1;
    }

    #[test]
    fn leaves_trailing_fragment_without_terminal_punctuation_as_remainder() {
        let (complete, remainder) = split_sentences("Hello there");
        assert!(complete.is_empty());
        assert_eq!(remainder, "Hello there");
    }

    struct FakeLlm {
        fragments: Vec<&'static str>,
    }

    impl LlmClient for FakeLlm {
        fn stream_complete(
            &self,
            _system: &str,
            _model: &str,
            _max_tokens: u32,
            _messages: &[(Role, String)],
            on_token: &mut dyn FnMut(&str) -> bool,
        ) -> Result<()> {
            for f in &self.fragments {
                if !on_token(f) {
                    break;
                }
            }
            Ok(())
        }
    }

    #[test]
    fn fragmented_stream_yields_sentence_boundaries_in_order() {
        let client = FakeLlm {
            fragments: vec!["Hi", ".", " How are", " you", "?"],
        };
        let mut emitted = Vec::new();
        let mut buffer = String::new();
        let _ = client.stream_complete("sys", "model", 10, &[], &mut |frag| {
            buffer.push_str(frag);
            let (sentences, remainder) = split_sentences(&buffer);
            buffer = remainder;
            emitted.extend(sentences);
            true
        });
        assert_eq!(emitted, vec!["Hi.".to_string(), "How are you?".to_string()]);
    }
}
