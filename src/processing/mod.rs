// 스테이지 처리 모듈
// 각 스테이지는 SampleSource / SampleSink / CodecPort 위에서 동작 (ffmpeg 연결은 engine)

pub mod audio;
pub mod composite;
pub mod merge;
pub mod thumbnail;
pub mod trim;

pub use audio::{add_audio, resolve_audio_path, AudioPath};
pub use composite::{composite_video, FrameGrid};
pub use merge::merge;
pub use trim::{remove_audio, trim, CopyStats, TrimWindow};
