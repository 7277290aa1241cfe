//! G.711 µ-law codec
//!
//! Hand-rolled rather than pulled from a crate. The call site in
//! `examples/other_examples/dcd41259_dnacenta-voice-echo__src-twilio-media.rs.rs`
//! (`audio::encode_mulaw(&pcm_samples)`) confirms that project also hand-rolls
//! its codec rather than depending on one for it, even though the codec
//! implementation itself lives in a sibling module not captured in this
//! pack; no Cargo.toml across the whole retrieved pack, including that
//! project's own manifest, lists a µ-law/G.711 crate. Constants and the
//! segment-table search are the standard ITU-T G.711 reference algorithm
//! (CCITT/Sun public-domain `g711.c`: `BIAS = 0x84`, `CLIP = 32635`, 8-entry
//! segment-end table).

const BIAS: i32 = 0x84;
const CLIP: i32 = 32635;
const SEG_END: [i32; 8] = [0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF, 0x1FFF, 0x3FFF, 0x7FFF];

fn segment(val: i32) -> i32 {
    SEG_END
        .iter()
        .position(|&end| val <= end)
        .unwrap_or(SEG_END.len() - 1) as i32
}

/// Encode one signed 16-bit PCM sample to a µ-law byte.
pub fn encode_sample(pcm: i16) -> u8 {
    let mut sample = pcm as i32;
    let sign = if sample < 0 { 0x80 } else { 0x00 };
    if sample < 0 {
        sample = -sample;
    }
    if sample > CLIP {
        sample = CLIP;
    }
    sample += BIAS;

    let exponent = segment(sample);
    let mantissa = (sample >> (exponent + 3)) & 0x0F;
    (!(sign | (exponent << 4) | mantissa)) as u8
}

/// Decode one µ-law byte back to a signed 16-bit PCM sample.
pub fn decode_sample(ulaw: u8) -> i16 {
    let ulaw = !ulaw;
    let sign = ulaw & 0x80;
    let exponent = ((ulaw >> 4) & 0x07) as i32;
    let mantissa = (ulaw & 0x0F) as i32;
    let mut sample = ((mantissa << 3) + BIAS) << exponent;
    sample -= BIAS;
    if sign != 0 {
        sample = -sample;
    }
    sample.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Encode normalized float samples in [-1, 1] to µ-law bytes (§4.6
/// "Telephony Outgoing": normalize, then encode to µ-law).
pub fn encode(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .map(|&s| encode_sample((s.clamp(-1.0, 1.0) * 32767.0) as i16))
        .collect()
}

/// Decode µ-law bytes to mono float32 samples in [-1, 1] (§4.1 "media:
/// payload is base64-encoded µ-law; decode to mono float32").
pub fn decode(bytes: &[u8]) -> Vec<f32> {
    bytes
        .iter()
        .map(|&b| decode_sample(b) as f32 / 32768.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_round_trips_to_silence() {
        assert_eq!(decode_sample(encode_sample(0)), 0);
    }

    #[test]
    fn round_trip_preserves_sign_and_rough_magnitude() {
        for pcm in [1000i16, -1000, 16000, -16000, 30000, -30000] {
            let decoded = decode_sample(encode_sample(pcm));
            assert_eq!(decoded.signum(), pcm.signum());
            let relative_error = (decoded as f32 - pcm as f32).abs() / pcm.abs() as f32;
            assert!(relative_error < 0.1, "pcm={pcm} decoded={decoded}");
        }
    }

    #[test]
    fn encode_decode_buffer_preserves_length() {
        let samples = vec![0.0f32, 0.25, -0.25, 0.9, -0.9];
        let encoded = encode(&samples);
        assert_eq!(encoded.len(), samples.len());
        let decoded = decode(&encoded);
        assert_eq!(decoded.len(), samples.len());
    }
}
