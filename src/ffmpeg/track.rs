// 트랙 포맷 기술자 + MIME 접두사로 트랙 찾기

use crate::error::{EngineError, EngineResult};
use ffmpeg_next as ffmpeg;
use ffmpeg::codec;

/// 트랙 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
    Other,
}

/// 소스 컨테이너의 트랙 하나 (index + 포맷)
#[derive(Clone)]
pub struct TrackFormat {
    /// 컨테이너 내 스트림 인덱스
    pub index: usize,
    pub kind: TrackKind,
    /// "video/avc", "audio/mp4a-latm" 등
    pub mime: String,
    pub codec_id: codec::Id,
    pub width: u32,
    pub height: u32,
    pub sample_rate: u32,
    pub channels: u16,
    /// 0이면 알 수 없음
    pub duration_us: i64,
    /// 먹서 stream copy / 디코더 생성용 원본 파라미터 (인메모리 소스는 None)
    pub parameters: Option<codec::Parameters>,
}

impl std::fmt::Debug for TrackFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackFormat")
            .field("index", &self.index)
            .field("mime", &self.mime)
            .field("codec_id", &self.codec_id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("duration_us", &self.duration_us)
            .finish()
    }
}

impl TrackFormat {
    /// 파라미터 없는 포맷 (인코더 출력/테스트용 기본값)
    pub fn new(index: usize, codec_id: codec::Id) -> Self {
        let kind = kind_of(codec_id);
        Self {
            index,
            kind,
            mime: mime_for(codec_id, kind),
            codec_id,
            width: 0,
            height: 0,
            sample_rate: 0,
            channels: 0,
            duration_us: 0,
            parameters: None,
        }
    }

    pub fn is_video(&self) -> bool {
        self.kind == TrackKind::Video
    }

    pub fn is_audio(&self) -> bool {
        self.kind == TrackKind::Audio
    }
}

/// 코덱 ID → 트랙 종류
fn kind_of(id: codec::Id) -> TrackKind {
    match id.medium() {
        ffmpeg::media::Type::Video => TrackKind::Video,
        ffmpeg::media::Type::Audio => TrackKind::Audio,
        _ => TrackKind::Other,
    }
}

/// 코덱 ID → MIME 타입 (MP4 컨테이너에서 쓰는 이름 기준)
pub fn mime_for(id: codec::Id, kind: TrackKind) -> String {
    let known = match id {
        codec::Id::H264 => Some("video/avc"),
        codec::Id::HEVC => Some("video/hevc"),
        codec::Id::MPEG4 => Some("video/mp4v-es"),
        codec::Id::H263 => Some("video/3gpp"),
        codec::Id::VP8 => Some("video/x-vnd.on2.vp8"),
        codec::Id::VP9 => Some("video/x-vnd.on2.vp9"),
        codec::Id::AV1 => Some("video/av01"),
        codec::Id::AAC => Some("audio/mp4a-latm"),
        codec::Id::AMR_NB => Some("audio/3gpp"),
        codec::Id::AMR_WB => Some("audio/amr-wb"),
        codec::Id::MP3 => Some("audio/mpeg"),
        codec::Id::OPUS => Some("audio/opus"),
        codec::Id::VORBIS => Some("audio/vorbis"),
        codec::Id::FLAC => Some("audio/flac"),
        codec::Id::PCM_S16LE => Some("audio/raw"),
        _ => None,
    };
    match known {
        Some(mime) => mime.to_string(),
        None => {
            let prefix = match kind {
                TrackKind::Video => "video",
                TrackKind::Audio => "audio",
                TrackKind::Other => "application",
            };
            format!("{}/x-{:?}", prefix, id).to_lowercase()
        }
    }
}

/// MIME 접두사("video/", "audio/")로 첫 번째 일치 트랙 찾기
/// 반환값은 tracks 슬라이스 내 위치
pub fn find_track(tracks: &[TrackFormat], mime_prefix: &str) -> EngineResult<usize> {
    tracks
        .iter()
        .position(|t| t.mime.starts_with(mime_prefix))
        .ok_or(EngineError::TrackNotFound {
            kind: kind_label(mime_prefix),
        })
}

fn kind_label(prefix: &str) -> &'static str {
    if prefix.starts_with("video") {
        "video"
    } else if prefix.starts_with("audio") {
        "audio"
    } else {
        "requested"
    }
}
