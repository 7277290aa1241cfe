//! Local microphone Source (§4.1)
//!
//! Grounded on `examples/original_source/src/microphone.py`'s `Microphone`:
//! a 32 ms input stream whose device callback pushes one frame per buffer.
//! The original blocks the whole thread on `exit_event.wait()` with the
//! stream held open in scope; here the stream handle is kept alive by the
//! caller's loop instead, since `cpal::Stream` is not `Send` in all host
//! backends and the stage otherwise just needs to observe `exit`.

use std::sync::mpsc::Sender;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::audio_io::AudioInput;
use crate::flags::ExitFlag;
use crate::pipeline::SegQSender;
use crate::types::AudioFrame;

pub const SAMPLE_LENGTH_MS: u32 = 32;

/// Run the Source Local stage to completion. Block size is
/// `sample_rate * 32ms / 1000` samples, matching `Microphone.SAMPLE_LENGTH`.
pub fn run(sample_rate: u32, seg_q: SegQSender, exit: &ExitFlag) -> Result<()> {
    let block_size = (sample_rate as u64 * SAMPLE_LENGTH_MS as u64 / 1000) as usize;
    let input = AudioInput::new(sample_rate, block_size)?;

    let tx: Sender<AudioFrame> = seg_q;
    let stream = input.start(move |samples: &[f32]| {
        let _ = tx.send(AudioFrame {
            samples: samples.to_vec(),
            sample_rate,
        });
    })?;

    info!("source_local: started");
    while !exit.is_set() {
        std::thread::sleep(Duration::from_millis(100));
    }
    input.stop(&stream)?;
    info!("source_local: exit observed, stopping");
    Ok(())
}
