//! Inbound audio frame decoding.
//!
//! Frames off the voice socket carry whatever the server felt like
//! sending: structured codec payloads, whole WAV files, or bare PCM.
//! The chain tries each stage in order and drops the frame when every
//! stage refuses it.

use tracing::{debug, trace};

/// One decoded block of interleaved 16-bit PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmChunk {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmChunk {
    /// Wall-clock duration of this chunk when played back.
    pub fn duration(&self) -> std::time::Duration {
        let frames = self.samples.len() as u64 / self.channels.max(1) as u64;
        std::time::Duration::from_micros(frames * 1_000_000 / self.sample_rate.max(1) as u64)
    }
}

/// A decode stage. Returning `None` passes the frame to the next stage.
///
/// The structured voice codec (opus in the assistant deployment) is
/// injected by the embedding app; this crate ships only the container
/// and raw fallbacks.
pub trait VoiceDecoder: Send {
    fn name(&self) -> &'static str;
    fn decode(&mut self, frame: &[u8]) -> Option<PcmChunk>;
}

/// Where decoded audio goes. `play` blocks until the chunk has been
/// rendered; the playback queue relies on that to stay sequential.
pub trait PcmSink: Send {
    fn play(&mut self, chunk: PcmChunk);
}

/// Minimal RIFF/WAVE parser: PCM format, 16-bit samples only.
pub struct WavDecoder;

impl VoiceDecoder for WavDecoder {
    fn name(&self) -> &'static str {
        "wav"
    }

    fn decode(&mut self, frame: &[u8]) -> Option<PcmChunk> {
        if frame.len() < 12 || &frame[0..4] != b"RIFF" || &frame[8..12] != b"WAVE" {
            return None;
        }

        let mut sample_rate = None;
        let mut channels = None;
        let mut data: Option<&[u8]> = None;

        let mut offset = 12;
        while offset + 8 <= frame.len() {
            let id = &frame[offset..offset + 4];
            let size = u32::from_le_bytes(frame[offset + 4..offset + 8].try_into().ok()?) as usize;
            let body_start = offset + 8;
            let body_end = body_start.checked_add(size)?;
            if body_end > frame.len() {
                return None;
            }
            let body = &frame[body_start..body_end];

            match id {
                b"fmt " => {
                    if body.len() < 16 {
                        return None;
                    }
                    let format = u16::from_le_bytes(body[0..2].try_into().ok()?);
                    let bits = u16::from_le_bytes(body[14..16].try_into().ok()?);
                    if format != 1 || bits != 16 {
                        return None;
                    }
                    channels = Some(u16::from_le_bytes(body[2..4].try_into().ok()?));
                    sample_rate = Some(u32::from_le_bytes(body[4..8].try_into().ok()?));
                }
                b"data" => data = Some(body),
                _ => {}
            }
            // Chunks are word-aligned.
            offset = body_end + (size & 1);
        }

        let (sample_rate, channels, data) = (sample_rate?, channels?, data?);
        if sample_rate == 0 || channels == 0 {
            return None;
        }
        let samples = data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Some(PcmChunk {
            samples,
            sample_rate,
            channels,
        })
    }
}

/// Last-resort stage: treat the frame as bare 16 kHz mono s16le.
pub struct RawPcmDecoder;

pub const RAW_PCM_SAMPLE_RATE: u32 = 16_000;

impl VoiceDecoder for RawPcmDecoder {
    fn name(&self) -> &'static str {
        "raw-pcm"
    }

    fn decode(&mut self, frame: &[u8]) -> Option<PcmChunk> {
        if frame.len() < 2 {
            return None;
        }
        let samples = frame
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Some(PcmChunk {
            samples,
            sample_rate: RAW_PCM_SAMPLE_RATE,
            channels: 1,
        })
    }
}

/// Ordered decode pipeline: injected codec, then WAV, then raw PCM.
pub struct DecodeChain {
    stages: Vec<Box<dyn VoiceDecoder>>,
}

impl DecodeChain {
    pub fn new(codec: Option<Box<dyn VoiceDecoder>>) -> Self {
        let mut stages: Vec<Box<dyn VoiceDecoder>> = Vec::with_capacity(3);
        if let Some(codec) = codec {
            stages.push(codec);
        }
        stages.push(Box::new(WavDecoder));
        stages.push(Box::new(RawPcmDecoder));
        Self { stages }
    }

    /// Runs the stages in order; `None` means the frame is dropped.
    pub fn decode(&mut self, frame: &[u8]) -> Option<PcmChunk> {
        for stage in &mut self.stages {
            if let Some(chunk) = stage.decode(frame) {
                trace!(stage = stage.name(), samples = chunk.samples.len(), "frame decoded");
                return Some(chunk);
            }
        }
        debug!(len = frame.len(), "dropping undecodable audio frame");
        None
    }
}
