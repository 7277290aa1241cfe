//! Data model shared across pipeline stages
//!
//! These mirror §3 of the spec: AudioFrame flows Source → Segmenter,
//! Utterance flows Segmenter → Transcriber, Transcript flows Transcriber →
//! Responder, Sentence flows Responder → Synthesizer, SynthClip flows
//! Synthesizer → Sink.

/// One mono float32 audio frame as produced by a Source, in [-1, 1].
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// A contiguous speech region (pre-roll + triggered speech + trailing
/// silence hysteresis), emitted by the Segmenter at end-of-speech.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Transcribed text for one utterance. Empty means "discard" (§4.3).
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
}

/// One sentence emitted by the Responder during LLM token streaming, or the
/// flushed trailing fragment of a completed response.
#[derive(Debug, Clone)]
pub struct Sentence {
    pub text: String,
}

/// Synthesized audio paired with the text it was rendered from, at the
/// sink's sample rate.
#[derive(Debug, Clone)]
pub struct SynthClip {
    pub text: String,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// A conversation turn role. Only user/assistant turns are ever stored;
/// the system message lives in configuration, not in the Conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}
