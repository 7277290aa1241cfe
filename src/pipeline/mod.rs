//! The six-stage streaming pipeline (§2)
//!
//! `Source -> SegQ -> Segmenter -> UttQ -> Transcriber -> TextQ -> Responder
//! -> SentQ -> Synthesizer -> AudioQ -> Sink`. Every stage is a plain OS
//! thread reading one `std::sync::mpsc::Receiver` and writing one
//! `std::sync::mpsc::Sender`, polling with a ~250ms timeout so `exit` is
//! observed promptly — the parallel-threads model the design notes call out
//! as "equivalent and simpler" to an async-task pipeline here, since each
//! stage is already a serial loop and the only cross-stage signaling is
//! channels plus the two broadcast flags.

pub mod responder;
pub mod segmenter;
pub mod sink_local;
pub mod source_local;
pub mod synthesizer;
pub mod transcriber;

use std::sync::mpsc::{Receiver, Sender};
use std::time::Duration;

use crate::types::{AudioFrame, Sentence, SynthClip, Transcript, Utterance};

pub const POLL_TIMEOUT: Duration = Duration::from_millis(250);

pub type SegQSender = Sender<AudioFrame>;
pub type SegQReceiver = Receiver<AudioFrame>;
pub type UttQSender = Sender<Utterance>;
pub type UttQReceiver = Receiver<Utterance>;
pub type TextQSender = Sender<Transcript>;
pub type TextQReceiver = Receiver<Transcript>;
pub type SentQSender = Sender<Sentence>;
pub type SentQReceiver = Receiver<Sentence>;
pub type AudioQSender = Sender<SynthClip>;
pub type AudioQReceiver = Receiver<SynthClip>;

/// Poll a channel with the standard 250ms timeout, distinguishing a timeout
/// (keep looping, check `exit`) from the sender having hung up (treat like
/// `exit` — there is nothing left to ever arrive).
pub fn recv_timeout<T>(rx: &Receiver<T>) -> RecvOutcome<T> {
    match rx.recv_timeout(POLL_TIMEOUT) {
        Ok(item) => RecvOutcome::Item(item),
        Err(std::sync::mpsc::RecvTimeoutError::Timeout) => RecvOutcome::Timeout,
        Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => RecvOutcome::Disconnected,
    }
}

pub enum RecvOutcome<T> {
    Item(T),
    Timeout,
    Disconnected,
}
