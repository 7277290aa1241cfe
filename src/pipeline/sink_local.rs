//! Local speaker Sink (§4.6 "Local speaker")
//!
//! Grounded on `examples/original_source/src/speaker.py`'s `Speaker.loop`:
//! normalize, play, then walk the text word by word sleeping
//! `dur_per_word` per word (interruptible by `speaking`), appending each
//! word to the Conversation as it's "spoken", and blocking until playback
//! finishes once the word walk completes normally.

use std::time::Duration;

use tracing::info;

use crate::audio_io::AudioOutput;
use crate::conversation::Conversation;
use crate::flags::{ExitFlag, SpeakingFlag};
use crate::pipeline::{recv_timeout, AudioQReceiver, RecvOutcome};
use crate::types::Role;

pub fn run(
    output: &AudioOutput,
    audio_q: AudioQReceiver,
    speaking: &SpeakingFlag,
    exit: &ExitFlag,
    conversation: &Conversation,
) {
    info!("sink_local: started");
    loop {
        if exit.is_set() {
            break;
        }
        let clip = match recv_timeout(&audio_q) {
            RecvOutcome::Item(c) => c,
            RecvOutcome::Timeout => continue,
            RecvOutcome::Disconnected => break,
        };

        if speaking.is_set() {
            continue;
        }

        output.play(&clip.samples);

        let words: Vec<&str> = clip.text.split_whitespace().collect();
        if words.is_empty() {
            output.sleep_until_end();
            continue;
        }
        let duration_secs = clip.samples.len() as f64 / clip.sample_rate.max(1) as f64;
        let word_duration = Duration::from_secs_f64(duration_secs / words.len() as f64);

        let mut interrupted = false;
        for word in &words {
            if speaking.wait(word_duration) {
                output.stop();
                interrupted = true;
                break;
            }
            if exit.is_set() {
                return;
            }
            conversation.append(Role::Assistant, word);
        }

        if !interrupted {
            output.sleep_until_end();
        }
    }
    info!("sink_local: exit observed, stopping");
}
