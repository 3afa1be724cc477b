//! Audio Adapter - 音频解码、编码与参考音频获取

mod reference_fetcher;
mod symphonia_decoder;
mod wav_encoder;

pub use reference_fetcher::HttpReferenceFetcher;
pub use symphonia_decoder::{resample, SymphoniaDecoder};
pub use wav_encoder::WavEncoder;
