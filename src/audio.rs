//! PCM container handling for upstream speech output (s16le, 24 kHz, mono).

pub const SAMPLE_RATE: u32 = 24_000;
pub const CHANNELS: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;
pub const WAV_HEADER_LEN: usize = 44;

pub const WAV_CONTENT_TYPE: &str = "audio/wav";
pub const PCM_CONTENT_TYPE: &str = "audio/L16; rate=24000; channels=1";

/// Format tag reported by chat TTS for raw PCM.
pub const CHAT_PCM_FORMAT: &str = "pcm_s16le_24000_mono";

/// Prefix raw PCM with a canonical 44-byte RIFF/WAVE header.
#[must_use]
pub fn pcm_to_wav(pcm: &[u8]) -> Vec<u8> {
    let data_size = u32::try_from(pcm.len()).unwrap_or(u32::MAX - 36);
    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate = SAMPLE_RATE * u32::from(block_align);

    let mut out = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_size).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&CHANNELS.to_le_bytes());
    out.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_size.to_le_bytes());
    out.extend_from_slice(pcm);
    out
}

/// Audio ready to be sent back on `/audio/speech`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    /// Set when the requested format could not be produced.
    pub warning: Option<String>,
}

/// Wrap PCM in the requested container. Only `wav` and `pcm` can be
/// produced; anything else falls back to WAV with a warning.
#[must_use]
pub fn encode_speech(pcm: &[u8], requested: Option<&str>) -> EncodedAudio {
    let format = requested.unwrap_or("wav");
    match format.to_ascii_lowercase().as_str() {
        "wav" => EncodedAudio {
            bytes: pcm_to_wav(pcm),
            content_type: WAV_CONTENT_TYPE,
            warning: None,
        },
        "pcm" => EncodedAudio {
            bytes: pcm.to_vec(),
            content_type: PCM_CONTENT_TYPE,
            warning: None,
        },
        _ => {
            tracing::debug!(format, "speech format not available, sending wav");
            EncodedAudio {
                bytes: pcm_to_wav(pcm),
                content_type: WAV_CONTENT_TYPE,
                warning: Some(format!(
                    "Unsupported format \"{format}\" requested, fallback to \"wav\"."
                )),
            }
        }
    }
}

/// Chat TTS output: WAV when asked for (or by default), raw PCM otherwise.
#[must_use]
pub fn encode_chat_audio(pcm: Vec<u8>, requested: Option<&str>) -> (&'static str, Vec<u8>) {
    match requested {
        None => ("wav", pcm_to_wav(&pcm)),
        Some(format) if format.eq_ignore_ascii_case("wav") => ("wav", pcm_to_wav(&pcm)),
        Some(_) => (CHAT_PCM_FORMAT, pcm),
    }
}
