//! Streaming speech synthesizer (§4.5)
//!
//! Grounded on `examples/original_source/src/synthesizer.py`: a text-to-WAV
//! REST call (Google Cloud Text-to-Speech LINEAR16 encoding) behind a warm-up
//! call and a 3-attempt retry loop that bails out early on `speaking`/`exit`,
//! mirroring `Synthesizer.loop` line for line. The REST client idiom (bearer
//! token loaded once at construction, `reqwest::blocking`) follows the same
//! pattern as `pipeline::transcriber::GroqAsrClient`.

use std::io::Cursor;
use std::sync::mpsc::Sender;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::VoiceGender;
use crate::error::PipelineError;
use crate::flags::{ExitFlag, SpeakingFlag};
use crate::pipeline::{recv_timeout, AudioQSender, RecvOutcome, SentQReceiver};
use crate::types::SynthClip;

pub const MAX_RETRIES: u32 = 3;

fn voice_gender_str(gender: VoiceGender) -> &'static str {
    match gender {
        VoiceGender::Male => "MALE",
        VoiceGender::Female => "FEMALE",
        VoiceGender::Neutral => "NEUTRAL",
    }
}

/// External TTS collaborator, opaque per §1. One real implementation
/// (`GoogleTtsClient`) plus a fake for tests.
pub trait TtsClient: Send {
    fn synthesize(&self, text: &str) -> Result<(Vec<f32>, u32)>;
}

pub struct GoogleTtsClient {
    http: reqwest::blocking::Client,
    bearer_token: String,
    language_code: String,
    voice_name: String,
    voice_gender: VoiceGender,
    sample_rate: u32,
}

impl GoogleTtsClient {
    /// `credentials_path` names a file holding a bearer token suitable for
    /// the Text-to-Speech REST API (the original's service-account flow is
    /// out of scope here; see DESIGN.md).
    pub fn new(
        credentials_path: &str,
        language_code: String,
        voice_name: String,
        voice_gender: VoiceGender,
        sample_rate: u32,
    ) -> Result<Self> {
        let bearer_token = std::fs::read_to_string(credentials_path)
            .with_context(|| format!("failed to read TTS credentials at {credentials_path}"))?
            .trim()
            .to_string();
        Ok(Self {
            http: reqwest::blocking::Client::new(),
            bearer_token,
            language_code,
            voice_name,
            voice_gender,
            sample_rate,
        })
    }
}

impl TtsClient for GoogleTtsClient {
    fn synthesize(&self, text: &str) -> Result<(Vec<f32>, u32)> {
        let body = serde_json::json!({
            "input": {"text": text},
            "voice": {
                "languageCode": self.language_code,
                "name": self.voice_name,
                "ssmlGender": voice_gender_str(self.voice_gender),
            },
            "audioConfig": {
                "audioEncoding": "LINEAR16",
                "sampleRateHertz": self.sample_rate,
            },
        });

        let response = self
            .http
            .post("https://texttospeech.googleapis.com/v1/text:synthesize")
            .bearer_auth(&self.bearer_token)
            .json(&body)
            .send()
            .context("TTS request failed")?
            .error_for_status()
            .context("TTS request returned an error status")?;

        #[derive(serde::Deserialize)]
        struct TtsResponse {
            #[serde(rename = "audioContent")]
            audio_content: String,
        }
        let parsed: TtsResponse = response.json().context("failed to parse TTS response")?;
        let wav_bytes = {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD
                .decode(parsed.audio_content)
                .context("failed to base64-decode TTS audio content")?
        };

        decode_wav(&wav_bytes)
    }
}

/// Decode a WAV byte buffer to mono f32 samples, handling the 1-byte
/// (unsigned, offset 128) and 2-byte (signed) sample widths the original
/// implementation handles, and averaging stereo down to mono (§14).
pub fn decode_wav(wav_bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let reader = hound::WavReader::new(Cursor::new(wav_bytes)).context("invalid WAV audio")?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    let sample_rate = spec.sample_rate;

    let mono: Vec<f32> = match spec.bits_per_sample {
        8 => {
            let samples: Vec<f32> = reader
                .into_samples::<i8>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("failed reading 8-bit WAV samples")?
                .into_iter()
                .map(|s| s as f32 / 128.0)
                .collect();
            to_mono(&samples, channels)
        }
        16 => {
            let samples: Vec<f32> = reader
                .into_samples::<i16>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("failed reading 16-bit WAV samples")?
                .into_iter()
                .map(|s| s as f32 / 32768.0)
                .collect();
            to_mono(&samples, channels)
        }
        // A TTS backend handing back an unsupported sample width is a
        // programmer error (spec §7 class 4), not a transient failure: it
        // must never be threaded through the retry loop in `run()` as an
        // `Ok`/`Err` result to recover from, it must stop the process.
        other => panic!(
            "{}",
            PipelineError::Invariant(format!("unsupported WAV sample width: {other} bits"))
        ),
    };

    Ok((mono, sample_rate))
}

fn to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// One warm-up call, errors ignored (§4.5).
pub fn warm_up(client: &dyn TtsClient) {
    let _ = client.synthesize("warming up");
}

pub fn run(
    client: &dyn TtsClient,
    sent_q: SentQReceiver,
    audio_q: AudioQSender,
    speaking: &SpeakingFlag,
    exit: &ExitFlag,
) {
    info!("synthesizer: started");
    loop {
        if exit.is_set() {
            break;
        }
        let sentence = match recv_timeout(&sent_q) {
            RecvOutcome::Item(s) => s,
            RecvOutcome::Timeout => continue,
            RecvOutcome::Disconnected => break,
        };

        if speaking.is_set() {
            continue;
        }

        let mut clip = None;
        for attempt in 1..=MAX_RETRIES {
            match client.synthesize(&sentence.text) {
                Ok((samples, sample_rate)) => {
                    clip = Some((samples, sample_rate));
                    break;
                }
                Err(e) => {
                    warn!(attempt, "synthesizer: TTS call failed: {e}");
                    if speaking.is_set() {
                        break;
                    }
                    if exit.is_set() {
                        return;
                    }
                    if attempt == MAX_RETRIES {
                        error!("synthesizer: exhausted retries for one sentence");
                    }
                }
            }
        }

        if let Some((samples, sample_rate)) = clip {
            if send_or_stop(
                &audio_q,
                SynthClip {
                    text: sentence.text,
                    samples,
                    sample_rate,
                },
            ) {
                break;
            }
        }
    }
    info!("synthesizer: exit observed, stopping");
}

fn send_or_stop(tx: &Sender<SynthClip>, clip: SynthClip) -> bool {
    tx.send(clip).is_err()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeTts {
        responses: std::sync::Mutex<Vec<Result<(Vec<f32>, u32), String>>>,
    }

    impl TtsClient for FakeTts {
        fn synthesize(&self, _text: &str) -> Result<(Vec<f32>, u32)> {
            let mut r = self.responses.lock().unwrap();
            if r.is_empty() {
                anyhow::bail!("no more fixture responses");
            }
            r.remove(0).map_err(|e| anyhow::anyhow!(e))
        }
    }

    #[test]
    fn decode_wav_16bit_mono_roundtrips_amplitude() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 24000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(16384i16).unwrap();
            writer.write_sample(-16384i16).unwrap();
            writer.finalize().unwrap();
        }
        let (samples, rate) = decode_wav(&cursor.into_inner()).unwrap();
        assert_eq!(rate, 24000);
        assert_eq!(samples.len(), 2);
        assert!((samples[0] - 0.5).abs() < 0.01);
        assert!((samples[1] + 0.5).abs() < 0.01);
    }

    #[test]
    fn decode_wav_8bit_mono_applies_unsigned_offset() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 8,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            // hound's `i8` samples for an 8-bit WAV are already the
            // signed-centered byte (raw_byte - 128), matching the original's
            // `(byte - 128) / 128.0` decode formula.
            writer.write_sample(127i8).unwrap(); // raw byte 255
            writer.write_sample(-128i8).unwrap(); // raw byte 0
            writer.write_sample(0i8).unwrap(); // raw byte 128 (silence)
            writer.finalize().unwrap();
        }
        let (samples, rate) = decode_wav(&cursor.into_inner()).unwrap();
        assert_eq!(rate, 8000);
        assert_eq!(samples.len(), 3);
        assert!((samples[0] - 127.0 / 128.0).abs() < 0.01);
        assert!((samples[1] + 1.0).abs() < 0.01);
        assert!(samples[2].abs() < 0.01);
    }

    #[test]
    fn decode_wav_stereo_averages_to_mono() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 24000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(16384i16).unwrap(); // left
            writer.write_sample(0i16).unwrap(); // right
            writer.finalize().unwrap();
        }
        let (samples, _rate) = decode_wav(&cursor.into_inner()).unwrap();
        assert_eq!(samples.len(), 1);
        assert!((samples[0] - 0.25).abs() < 0.01);
    }

    #[test]
    fn recovers_after_two_transient_failures() {
        let fake = FakeTts {
            responses: std::sync::Mutex::new(vec![
                Err("network error".into()),
                Err("network error".into()),
                Ok((vec![0.0, 0.1], 24000)),
            ]),
        };
        let mut result = None;
        for _ in 0..MAX_RETRIES {
            match fake.synthesize("hello") {
                Ok(r) => {
                    result = Some(r);
                    break;
                }
                Err(_) => continue,
            }
        }
        assert!(result.is_some());
    }
}
