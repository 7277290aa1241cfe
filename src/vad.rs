//! VAD model interface
//!
//! The spec treats VAD inference as an external pure function
//! `(window, sample_rate) -> probability` (§1, §4.2) — the Segmenter owns
//! the state machine, the model only scores one window at a time. `VadModel`
//! is that seam; `SileroVad` is the one real implementation, adapted from
//! the teacher's `voice::silero_vad::SileroVad` (same ONNX Runtime session,
//! same persistent (2,1,128) hidden-state tensor) but stripped of the
//! teacher's own event/hysteresis state machine — that machinery now lives
//! in `pipeline::segmenter` per the spec's exact counters, not the
//! teacher's `min_speech_ms`/`min_silence_ms` duration-based one.

use anyhow::{Context, Result};
use ort::session::Session;
use ort::value::Value;
use tracing::info;

/// A model that scores one fixed-size audio window with a speech
/// probability in [0, 1]. `window_size(sample_rate)` rejects unsupported
/// rates at construction time per §4.2 ("any other sample rate is
/// rejected at construction").
pub trait VadModel: Send {
    fn probability(&mut self, window: &[f32], sample_rate: u32) -> Result<f32>;
    fn window_size(&self, sample_rate: u32) -> Result<usize>;
}

pub struct SileroVad {
    session: Session,
    state: Vec<f32>,
}

impl SileroVad {
    pub fn load(model_path: &str) -> Result<Self> {
        let session = Session::builder()?
            .with_intra_threads(1)
            .context("failed to configure single-threaded ONNX session")?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load Silero VAD model from {model_path}"))?;
        info!(model_path, "Silero VAD model loaded");
        Ok(Self {
            session,
            state: vec![0.0f32; 2 * 1 * 128],
        })
    }
}

impl VadModel for SileroVad {
    fn window_size(&self, sample_rate: u32) -> Result<usize> {
        match sample_rate {
            16000 => Ok(512),
            8000 => Ok(256),
            other => anyhow::bail!("unsupported VAD sample rate: {other}"),
        }
    }

    fn probability(&mut self, window: &[f32], sample_rate: u32) -> Result<f32> {
        let input = Value::from_array(([1usize, window.len()], window.to_vec()))?;
        let state = Value::from_array(([2usize, 1usize, 128usize], self.state.clone()))?;
        let sr = Value::from_array(([1usize], vec![sample_rate as i64]))?;

        let outputs = self.session.run(ort::inputs![input, state, sr])?;

        let (_, prob_data) = outputs[0].try_extract_tensor::<f32>()?;
        let prob = prob_data.first().copied().unwrap_or(0.0);

        let (_, new_state) = outputs[1].try_extract_tensor::<f32>()?;
        if new_state.len() == self.state.len() {
            self.state.copy_from_slice(new_state);
        }

        Ok(prob)
    }
}

/// Convert i16 PCM samples to f32 normalized [-1.0, 1.0].
pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Convert f32 normalized samples to i16 PCM.
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * 32767.0).clamp(-32768.0, 32767.0) as i16)
        .collect()
}

#[cfg(test)]
pub mod fake {
    use super::*;

    /// A deterministic VAD fixture for segmenter tests: returns 1.0 for
    /// windows at indices in `speech_windows`, 0.0 otherwise.
    pub struct FakeVad {
        pub window: usize,
        pub speech_windows: Vec<bool>,
        pub calls: usize,
    }

    impl FakeVad {
        pub fn new(window: usize, speech_windows: Vec<bool>) -> Self {
            Self {
                window,
                speech_windows,
                calls: 0,
            }
        }
    }

    impl VadModel for FakeVad {
        fn window_size(&self, _sample_rate: u32) -> Result<usize> {
            Ok(self.window)
        }

        fn probability(&mut self, _window: &[f32], _sample_rate: u32) -> Result<f32> {
            let is_speech = self
                .speech_windows
                .get(self.calls)
                .copied()
                .unwrap_or(false);
            self.calls += 1;
            Ok(if is_speech { 1.0 } else { 0.0 })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i16_f32_roundtrip_preserves_sign() {
        let samples = vec![0i16, 32767, -32768];
        let converted = i16_to_f32(&samples);
        assert!((converted[0] - 0.0).abs() < 0.001);
        assert!((converted[1] - 1.0).abs() < 0.001);
        assert!((converted[2] - (-1.0)).abs() < 0.001);
    }

    #[test]
    fn f32_to_i16_clamps() {
        let samples = vec![0.0f32, 1.5, -1.5];
        let converted = f32_to_i16(&samples);
        assert_eq!(converted[0], 0);
        assert_eq!(converted[1], 32767);
        assert_eq!(converted[2], -32768);
    }
}
