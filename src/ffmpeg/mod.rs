// FFmpeg 래퍼 모듈
// 디먹싱/먹싱, 트랙 기술자, 메타데이터, 프레임 추출

pub mod decoder;
pub mod extractor;
pub mod metadata;
pub mod muxer;
pub mod time;
pub mod track;

pub use decoder::{FrameExtractor, FrameSource};
pub use extractor::{Extractor, Sample, SampleSource};
pub use metadata::{inspect, VideoMetadata};
pub use muxer::{Muxer, SampleSink, WriterState};
pub use track::{find_track, TrackFormat, TrackKind};

use ffmpeg_next as ffmpeg;

/// EAGAIN = "지금은 버퍼 없음, 나중에 다시" (에러 아님)
pub fn is_try_again(e: &ffmpeg::Error) -> bool {
    matches!(e, ffmpeg::Error::Other { errno } if *errno == ffmpeg::error::EAGAIN)
}
