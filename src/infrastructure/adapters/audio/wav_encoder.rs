//! WAV Encoder - 单声道 16-bit PCM WAV

use crate::application::ports::{AudioEncoderPort, AudioIoError};

/// WAV 编码器
#[derive(Debug, Default, Clone)]
pub struct WavEncoder;

impl WavEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl AudioEncoderPort for WavEncoder {
    fn content_type(&self) -> &'static str {
        "audio/wav"
    }

    fn encode(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AudioIoError> {
        if sample_rate == 0 {
            return Err(AudioIoError::EncodingError("Sample rate must be positive".to_string()));
        }

        let bits_per_sample: u16 = 16;
        let num_channels: u16 = 1;
        let byte_rate = sample_rate * num_channels as u32 * (bits_per_sample / 8) as u32;
        let block_align = num_channels * (bits_per_sample / 8);

        let data_size = samples.len() * 2;
        let file_size = 36 + data_size;
        if file_size > u32::MAX as usize {
            return Err(AudioIoError::EncodingError(format!(
                "Audio too long for WAV: {} samples",
                samples.len()
            )));
        }

        let mut wav = Vec::with_capacity(44 + data_size);

        // RIFF header
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(file_size as u32).to_le_bytes());
        wav.extend_from_slice(b"WAVE");

        // fmt chunk
        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
        wav.extend_from_slice(&num_channels.to_le_bytes());
        wav.extend_from_slice(&sample_rate.to_le_bytes());
        wav.extend_from_slice(&byte_rate.to_le_bytes());
        wav.extend_from_slice(&block_align.to_le_bytes());
        wav.extend_from_slice(&bits_per_sample.to_le_bytes());

        // data chunk
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&(data_size as u32).to_le_bytes());
        for &sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
            wav.extend_from_slice(&value.to_le_bytes());
        }

        Ok(wav)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let wav = WavEncoder::new().encode(&[0.0, 1.0, -1.0, 2.0], 24000).unwrap();
        assert_eq!(wav.len(), 44 + 8);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 24000);
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 8);

        // 超出范围的样本被截断
        assert_eq!(i16::from_le_bytes([wav[46], wav[47]]), 32767);
        assert_eq!(i16::from_le_bytes([wav[50], wav[51]]), 32767);
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(WavEncoder::new().encode(&[0.0], 0).is_err());
    }
}
