// 인코딩 모듈
// 코덱 펌프 + H.264 비디오 인코더 + 오디오 디코더/AAC 인코더 포트

pub mod audio;
pub mod encoder;
pub mod pump;

pub use audio::{AacEncoderPort, AudioCodecFactory, AudioDecoderPort, FfmpegAudioCodecs};
pub use encoder::{EncoderInput, EncoderSettings, VideoEncoder};
pub use pump::{CodecPort, Dequeue, Produce, PumpConfig};
