//! VAD-based utterance segmenter (§4.2)
//!
//! Grounded on `examples/original_source/src/segmenter.py`: this is the
//! literal state machine, carried into Rust idiom (a struct with an
//! explicit `enum State`, rather than Python's loose instance attributes)
//! and running against the `VadModel` seam instead of a bespoke energy-based
//! VAD like the teacher's `voice::vad::Vad`.

use std::collections::VecDeque;
use std::sync::mpsc::Sender;
use tracing::{debug, info};

use crate::flags::SpeakingFlag;
use crate::pipeline::{recv_timeout, RecvOutcome, SegQReceiver, UttQSender};
use crate::types::{AudioFrame, Utterance};
use crate::vad::VadModel;

pub const SPEECH_THRESHOLD: f32 = 0.4;
pub const PRE_SPEECH_BUFFER: usize = 25;
pub const MIN_SPEECH_CHUNKS: u32 = 3;
pub const SILENCE_LIMIT: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Recording,
}

/// Window-alignment carry-over buffer plus the IDLE/RECORDING state machine.
/// One instance per sample rate; `window_size` is fixed at construction and
/// any other rate is rejected (§4.2).
pub struct Segmenter<V: VadModel> {
    vad: V,
    sample_rate: u32,
    window_size: usize,
    carry_over: Vec<f32>,
    pre_buffer: VecDeque<Vec<f32>>,
    utterance_buffer: Vec<f32>,
    state: State,
    speech_run: u32,
    silence_run: u32,
}

impl<V: VadModel> Segmenter<V> {
    pub fn new(vad: V, sample_rate: u32) -> anyhow::Result<Self> {
        let window_size = vad.window_size(sample_rate)?;
        Ok(Self {
            vad,
            sample_rate,
            window_size,
            carry_over: Vec::new(),
            pre_buffer: VecDeque::with_capacity(PRE_SPEECH_BUFFER),
            utterance_buffer: Vec::new(),
            state: State::Idle,
            speech_run: 0,
            silence_run: 0,
        })
    }

    /// Feed one input frame. Drains every complete window it contains
    /// (§4.2's "implementations MAY instead drain all complete windows per
    /// frame" — preferred per the §9 open question to avoid accumulating
    /// latency on large frames) and returns any utterance emitted.
    fn feed(&mut self, frame: &[f32], speaking: &SpeakingFlag) -> anyhow::Result<Vec<Utterance>> {
        let mut combined = std::mem::take(&mut self.carry_over);
        combined.extend_from_slice(frame);

        let mut emitted = Vec::new();
        let mut offset = 0;
        while combined.len() - offset >= self.window_size {
            let window = &combined[offset..offset + self.window_size];
            if let Some(utt) = self.process_window(window, speaking)? {
                emitted.push(utt);
            }
            offset += self.window_size;
        }
        self.carry_over = combined[offset..].to_vec();
        Ok(emitted)
    }

    fn process_window(
        &mut self,
        window: &[f32],
        speaking: &SpeakingFlag,
    ) -> anyhow::Result<Option<Utterance>> {
        let prob = self.vad.probability(window, self.sample_rate)?;
        let is_speech = prob > SPEECH_THRESHOLD;

        if self.pre_buffer.len() == PRE_SPEECH_BUFFER {
            self.pre_buffer.pop_front();
        }
        self.pre_buffer.push_back(window.to_vec());

        match self.state {
            State::Idle => {
                if is_speech {
                    self.speech_run += 1;
                    if self.speech_run >= MIN_SPEECH_CHUNKS {
                        self.state = State::Recording;
                        self.silence_run = 0;
                        self.utterance_buffer.clear();
                        for w in &self.pre_buffer {
                            self.utterance_buffer.extend_from_slice(w);
                        }
                        speaking.set();
                        debug!("segmenter: speech triggered");
                    }
                } else {
                    self.speech_run = 0;
                }
                Ok(None)
            }
            State::Recording => {
                self.utterance_buffer.extend_from_slice(window);
                if is_speech {
                    self.silence_run = 0;
                    Ok(None)
                } else {
                    self.silence_run += 1;
                    if self.silence_run >= SILENCE_LIMIT {
                        let samples = std::mem::take(&mut self.utterance_buffer);
                        self.speech_run = 0;
                        self.state = State::Idle;
                        speaking.clear();
                        debug!(samples = samples.len(), "segmenter: utterance emitted");
                        Ok(Some(Utterance {
                            samples,
                            sample_rate: self.sample_rate,
                        }))
                    } else {
                        Ok(None)
                    }
                }
            }
        }
    }
}

/// Run the Segmenter stage to completion: read SegQ, write UttQ, observing
/// `exit`.
pub fn run<V: VadModel>(
    vad: V,
    sample_rate: u32,
    seg_q: SegQReceiver,
    utt_q: UttQSender,
    speaking: SpeakingFlag,
    exit: &crate::flags::ExitFlag,
) -> anyhow::Result<()> {
    let mut segmenter = Segmenter::new(vad, sample_rate)?;
    info!("segmenter: started");

    loop {
        if exit.is_set() {
            break;
        }
        match recv_timeout(&seg_q) {
            RecvOutcome::Item(AudioFrame { samples, .. }) => {
                match segmenter.feed(&samples, &speaking) {
                    Ok(utterances) => {
                        for utt in utterances {
                            if send_or_stop(&utt_q, utt) {
                                break;
                            }
                        }
                    }
                    Err(e) => tracing::error!("segmenter: VAD inference error: {e}"),
                }
            }
            RecvOutcome::Timeout => continue,
            RecvOutcome::Disconnected => break,
        }
    }
    info!("segmenter: exit observed, stopping");
    Ok(())
}

fn send_or_stop(tx: &Sender<Utterance>, utt: Utterance) -> bool {
    tx.send(utt).is_err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vad::fake::FakeVad;

    fn flags() -> SpeakingFlag {
        SpeakingFlag::new()
    }

    #[test]
    fn silent_input_produces_zero_utterances() {
        let vad = FakeVad::new(4, vec![false; 100]);
        let mut seg = Segmenter::new(vad, 16000).unwrap();
        seg.window_size = 4; // align with FakeVad for this unit test
        let speaking = flags();
        let mut total = 0;
        for _ in 0..20 {
            let frame = vec![0.0f32; 4];
            total += seg.feed(&frame, &speaking).unwrap().len();
        }
        assert_eq!(total, 0);
        assert!(!speaking.is_set());
    }

    #[test]
    fn onset_hysteresis_requires_three_consecutive_speech_windows() {
        // 2 speech windows then silence: should never trigger RECORDING.
        let mut speech = vec![true, true];
        speech.extend(std::iter::repeat(false).take(50));
        let vad = FakeVad::new(4, speech);
        let mut seg = Segmenter::new(vad, 16000).unwrap();
        seg.window_size = 4;
        let speaking = flags();
        for _ in 0..20 {
            seg.feed(&vec![0.0f32; 4], &speaking).unwrap();
        }
        assert!(!speaking.is_set());
    }

    #[test]
    fn sets_and_clears_speaking_flag_around_an_utterance() {
        let mut speech = vec![true; 3];
        speech.extend(std::iter::repeat(false).take(30));
        let vad = FakeVad::new(4, speech);
        let mut seg = Segmenter::new(vad, 16000).unwrap();
        seg.window_size = 4;
        let speaking = flags();
        let mut utterances = Vec::new();
        for _ in 0..20 {
            utterances.extend(seg.feed(&vec![0.1f32; 4], &speaking).unwrap());
        }
        assert_eq!(utterances.len(), 1);
        assert!(!speaking.is_set());
    }

    #[test]
    fn window_alignment_drops_no_samples_across_frame_sizes() {
        for frame_size in [1usize, 3, 4, 5, 11] {
            let vad = FakeVad::new(4, vec![false; 1000]);
            let mut seg = Segmenter::new(vad, 16000).unwrap();
            seg.window_size = 4;
            let speaking = flags();
            let total_frames = 37;
            let mut fed = 0usize;
            for i in 0..total_frames {
                let frame: Vec<f32> = (0..frame_size).map(|j| (i * frame_size + j) as f32).collect();
                fed += frame.len();
                seg.feed(&frame, &speaking).unwrap();
            }
            let processed = (fed / 4) * 4;
            let held = fed - processed;
            assert_eq!(seg.carry_over.len(), held, "frame_size={frame_size}");
        }
    }
}
