//! Streaming transcriber (§4.3)
//!
//! Grounded on `examples/original_source/src/transcriber.py` (Groq Whisper
//! over HTTPS) for the exact retry count and warm-up behavior, and on the
//! teacher's `agent::llm::OpenRouterClient` for the reqwest-blocking HTTP
//! client idiom (multipart upload, `.context(...)`-annotated errors).

use std::io::Cursor;
use std::sync::mpsc::Sender;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::flags::ExitFlag;
use crate::pipeline::{recv_timeout, RecvOutcome, TextQSender, UttQReceiver};
use crate::types::{Transcript, Utterance};

pub const MAX_RETRIES: u32 = 3;

/// External ASR collaborator, opaque per §1 ("treated as opaque request/
/// stream services"). One real implementation (`GroqAsrClient`) plus a
/// fake for tests.
pub trait AsrClient: Send {
    fn transcribe(&self, wav_bytes: Vec<u8>, language: &str) -> Result<String>;
}

pub struct GroqAsrClient {
    http: reqwest::blocking::Client,
    api_key: String,
    model: String,
}

impl GroqAsrClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            api_key,
            model,
        }
    }
}

impl AsrClient for GroqAsrClient {
    fn transcribe(&self, wav_bytes: Vec<u8>, language: &str) -> Result<String> {
        let part = reqwest::blocking::multipart::Part::bytes(wav_bytes)
            .file_name("audio.wav")
            .mime_str("audio/wav")?;
        let form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", language.to_string());

        let response = self
            .http
            .post("https://api.groq.com/openai/v1/audio/transcriptions")
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .context("ASR request failed")?
            .error_for_status()
            .context("ASR request returned an error status")?;

        #[derive(serde::Deserialize)]
        struct AsrResponse {
            text: String,
        }
        let body: AsrResponse = response.json().context("failed to parse ASR response")?;
        Ok(body.text)
    }
}

/// Clip to [-1, 1], convert to signed 16-bit PCM, wrap in a mono WAV
/// container at `sample_rate` (§4.3 step 1-2).
pub fn utterance_to_wav(utterance: &Utterance) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: utterance.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in &utterance.samples {
            let clipped = s.clamp(-1.0, 1.0);
            let pcm = (clipped * 32767.0) as i16;
            writer.write_sample(pcm)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// One warm-up request with a zero-sample utterance, errors ignored, to
/// amortize TLS/handshake cost (§4.3).
pub fn warm_up(client: &dyn AsrClient, sample_rate: u32, language: &str) {
    let zeros = Utterance {
        samples: vec![0.0; 1600],
        sample_rate,
    };
    if let Ok(wav) = utterance_to_wav(&zeros) {
        let _ = client.transcribe(wav, language);
    }
}

pub fn run(
    client: &dyn AsrClient,
    language: &str,
    utt_q: UttQReceiver,
    text_q: TextQSender,
    exit: &ExitFlag,
) {
    info!("transcriber: started");
    loop {
        if exit.is_set() {
            break;
        }
        let utterance = match recv_timeout(&utt_q) {
            RecvOutcome::Item(u) => u,
            RecvOutcome::Timeout => continue,
            RecvOutcome::Disconnected => break,
        };

        let wav = match utterance_to_wav(&utterance) {
            Ok(w) => w,
            Err(e) => {
                tracing::error!("transcriber: WAV encoding failed: {e}");
                continue;
            }
        };

        let mut last_err = None;
        let mut text = None;
        for attempt in 1..=MAX_RETRIES {
            match client.transcribe(wav.clone(), language) {
                Ok(t) => {
                    text = Some(t);
                    break;
                }
                Err(e) => {
                    warn!(attempt, "transcriber: ASR call failed: {e}");
                    last_err = Some(e);
                }
            }
        }

        match text {
            Some(t) => {
                let trimmed = t.trim();
                if trimmed.is_empty() {
                    debug!("transcriber: empty transcript, discarding");
                } else if push(&text_q, Transcript {
                    text: trimmed.to_string(),
                }) {
                    break;
                }
            }
            None => {
                if let Some(e) = last_err {
                    error!("transcriber: failed after {MAX_RETRIES} attempts: {e}");
                }
                // Final failure: suppressed rather than pushed, matching
                // the implementation option the spec allows (§4.3 step 3).
            }
        }
    }
    info!("transcriber: exit observed, stopping");
}

fn push(tx: &Sender<Transcript>, transcript: Transcript) -> bool {
    tx.send(transcript).is_err()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeAsr {
        responses: std::sync::Mutex<Vec<Result<String, String>>>,
    }

    impl AsrClient for FakeAsr {
        fn transcribe(&self, _wav_bytes: Vec<u8>, _language: &str) -> Result<String> {
            let mut r = self.responses.lock().unwrap();
            if r.is_empty() {
                anyhow::bail!("no more fixture responses");
            }
            r.remove(0).map_err(|e| anyhow::anyhow!(e))
        }
    }

    #[test]
    fn utterance_to_wav_produces_mono_16bit_pcm() {
        let utt = Utterance {
            samples: vec![0.0, 0.5, -0.5, 1.5, -1.5],
            sample_rate: 16000,
        };
        let wav = utterance_to_wav(&utt).unwrap();
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_rate, 16000);
    }

    #[test]
    fn recovers_after_two_transient_failures() {
        let fake = FakeAsr {
            responses: std::sync::Mutex::new(vec![
                Err("network error".into()),
                Err("network error".into()),
                Ok("hello world".into()),
            ]),
        };
        let utt = Utterance {
            samples: vec![0.0; 100],
            sample_rate: 16000,
        };
        let wav = utterance_to_wav(&utt).unwrap();
        let mut result = None;
        for _ in 0..MAX_RETRIES {
            match fake.transcribe(wav.clone(), "en") {
                Ok(t) => {
                    result = Some(t);
                    break;
                }
                Err(_) => continue,
            }
        }
        assert_eq!(result, Some("hello world".to_string()));
    }
}
