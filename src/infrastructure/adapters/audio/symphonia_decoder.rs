//! Symphonia Decoder - 基于 symphonia 的音频解码器
//!
//! 解码为交错 f32 PCM，线性重采样到目标采样率，
//! 再拆分为 `[channels, samples]` 张量。

use async_trait::async_trait;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::application::ports::{AudioDecoderPort, AudioIoError};
use crate::domain::{Tensor, TensorData};

/// 解码后的交错 PCM
#[derive(Debug)]
struct DecodedAudio {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: usize,
}

/// Symphonia 音频解码器
#[derive(Debug, Default, Clone)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self
    }
}

fn decode_pcm(data: Vec<u8>) -> Result<DecodedAudio, AudioIoError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioIoError::UnsupportedFormat(format!("Probe failed: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| AudioIoError::DecodingError("No audio track found".to_string()))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AudioIoError::DecodingError("Unknown sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioIoError::DecodingError(format!("Decoder creation failed: {}", e)))?;

    let track_id = track.id;
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);
    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                return Err(AudioIoError::DecodingError(format!("Packet read error: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "Decode error (skipping packet)");
                continue;
            }
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();
        channels = spec.channels.count();
        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        let actual_samples = num_frames * channels;
        samples.extend(&sample_buf.samples()[..actual_samples]);
    }

    if channels == 0 {
        return Err(AudioIoError::DecodingError("Unknown channel count".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

/// 简单线性重采样（交错多通道）
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32, channels: usize) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || channels == 0 {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let frame_count = samples.len() / channels;
    let new_frame_count = (frame_count as f64 * ratio) as usize;
    let mut resampled = Vec::with_capacity(new_frame_count * channels);

    for i in 0..new_frame_count {
        let src_pos = i as f64 / ratio;
        let src_idx = src_pos as usize;
        let frac = src_pos - src_idx as f64;

        for ch in 0..channels {
            let idx0 = src_idx * channels + ch;
            let idx1 = (src_idx + 1).min(frame_count - 1) * channels + ch;

            let s0 = samples.get(idx0).copied().unwrap_or(0.0);
            let s1 = samples.get(idx1).copied().unwrap_or(s0);
            resampled.push(s0 + (s1 - s0) * frac as f32);
        }
    }

    resampled
}

/// 交错 PCM → `[channels, samples]`
fn deinterleave(samples: &[f32], channels: usize) -> Result<Tensor, AudioIoError> {
    let frames = samples.len() / channels;
    let mut planar = vec![0.0f32; frames * channels];
    for (frame, chunk) in samples.chunks_exact(channels).enumerate() {
        for (ch, &sample) in chunk.iter().enumerate() {
            planar[ch * frames + frame] = sample;
        }
    }
    Tensor::new(vec![channels, frames], TensorData::Float32(planar))
        .map_err(|e| AudioIoError::DecodingError(e.to_string()))
}

#[async_trait]
impl AudioDecoderPort for SymphoniaDecoder {
    async fn decode(&self, data: Vec<u8>, target_rate: u32) -> Result<Tensor, AudioIoError> {
        let input_size = data.len();
        tokio::task::spawn_blocking(move || {
            let pcm = decode_pcm(data)?;
            let samples = resample(&pcm.samples, pcm.sample_rate, target_rate, pcm.channels);
            tracing::debug!(
                input_size = input_size,
                source_rate = pcm.sample_rate,
                target_rate = target_rate,
                channels = pcm.channels,
                frames = samples.len() / pcm.channels,
                "Audio decoded"
            );
            deinterleave(&samples, pcm.channels)
        })
        .await
        .map_err(|e| AudioIoError::DecodingError(format!("Decode task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::AudioEncoderPort;
    use crate::infrastructure::adapters::audio::WavEncoder;

    #[test]
    fn test_resample_halves_length() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let out = resample(&samples, 48000, 24000, 1);
        assert_eq!(out.len(), 50);
        assert_eq!(out[1], 2.0);
    }

    #[test]
    fn test_deinterleave() {
        let tensor = deinterleave(&[1.0, -1.0, 2.0, -2.0, 3.0, -3.0], 2).unwrap();
        assert_eq!(tensor.dims(), &[2, 3]);
        assert_eq!(tensor.as_f32().unwrap(), &[1.0, 2.0, 3.0, -1.0, -2.0, -3.0]);
    }

    #[tokio::test]
    async fn test_decode_wav_and_resample() {
        let samples: Vec<f32> = (0..4800).map(|i| ((i % 100) as f32 / 100.0) - 0.5).collect();
        let wav = WavEncoder::new().encode(&samples, 48000).unwrap();

        let tensor = SymphoniaDecoder::new().decode(wav, 24000).await.unwrap();
        assert_eq!(tensor.dims(), &[1, 2400]);
    }

    #[tokio::test]
    async fn test_garbage_is_rejected() {
        let result = SymphoniaDecoder::new().decode(b"not audio".to_vec(), 24000).await;
        assert!(matches!(result, Err(AudioIoError::UnsupportedFormat(_))));
    }
}
