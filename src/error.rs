// 엔진 에러 타입
// 스테이지는 성공 값 또는 EngineError 하나를 반환하고, 재시도/중단 판단은 호출자 몫

use ffmpeg_next as ffmpeg;
use std::path::PathBuf;

/// 스테이지 실패 원인
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Source unreadable ({uri}): {reason}")]
    SourceUnreadable { uri: String, reason: String },

    #[error("Unsupported URI: {0}")]
    UnsupportedUri(String),

    #[error("No {kind} track found")]
    TrackNotFound { kind: &'static str },

    /// 먹서 설정 오류 (이중 start, start 전 write, start 후 add_track)
    #[error("Muxer misconfigured: {0}")]
    MuxerMisconfigured(String),

    #[error("Codec unavailable ({codec}): {reason}")]
    CodecUnavailable { codec: String, reason: String },

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Frame buffer size mismatch: got {actual} bytes, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("Frame extraction failed {consecutive} times in a row")]
    TooManyFrameFailures { consecutive: u32 },

    #[error("No samples written for {track} track")]
    EmptyTrack { track: &'static str },

    #[error("Invalid overlay config: {0}")]
    InvalidOverlay(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("{context}: {source}")]
    Ffmpeg {
        context: String,
        #[source]
        source: ffmpeg::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// ffmpeg 에러에 컨텍스트 부여
    pub fn ffmpeg(context: impl Into<String>, source: ffmpeg::Error) -> Self {
        Self::Ffmpeg {
            context: context.into(),
            source,
        }
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    pub fn muxer(msg: impl Into<String>) -> Self {
        Self::MuxerMisconfigured(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn unreadable(uri: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnreadable {
            uri: uri.into(),
            reason: reason.to_string(),
        }
    }
}

/// 프레임 단위 추출 실패 (skip-and-continue 정책 대상, 스테이지를 중단시키지 않음)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("seek to {time_us}us failed: {reason}")]
    Seek { time_us: i64, reason: String },

    #[error("no decodable frame near {time_us}us")]
    NoFrame { time_us: i64 },

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("scale failed: {0}")]
    Scale(String),
}
