//! Real-time, full-duplex speech-to-speech conversational agent
//!
//! Six-stage streaming pipeline (§2): `Source -> Segmenter -> Transcriber ->
//! Responder -> Synthesizer -> Sink`, implemented as plain OS threads
//! communicating over `std::sync::mpsc` channels plus two broadcast flags
//! (`speaking`, `exit`). Two front-ends wire the same pipeline stages to
//! different Source/Sink implementations: a local microphone/speaker demo
//! (`duplex-local`) and a Twilio Media Streams telephony server
//! (`duplex-tw`).

pub mod audio_io;
pub mod config;
pub mod conversation;
pub mod error;
pub mod flags;
pub mod pipeline;
pub mod telephony;
pub mod types;
pub mod vad;

pub use config::Config;
pub use conversation::Conversation;
pub use error::PipelineError;
