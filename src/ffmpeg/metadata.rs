// 메타데이터 검사기 - 해상도, 길이, 프레임레이트, 비트레이트, 색 태그
// 읽을 수 있는 컨테이너라면 실패하지 않음: 빠진 값은 기본값으로 채움

use crate::error::{EngineError, EngineResult};
use crate::ffmpeg::extractor::open_input;
use crate::ffmpeg::time::to_micros;
use ffmpeg_next as ffmpeg;
use log::debug;
use serde::Serialize;
use std::path::Path;

pub const DEFAULT_WIDTH: u32 = 1920;
pub const DEFAULT_HEIGHT: u32 = 1080;
pub const DEFAULT_FRAME_RATE: f64 = 30.0;
pub const DEFAULT_BIT_RATE: u64 = 8_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColorRange {
    Limited,
    Full,
    Unspecified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColorStandard {
    Bt709,
    Bt601,
    Bt2020,
    Unspecified,
}

/// 소스 색 태그
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorTags {
    pub range: ColorRange,
    pub standard: ColorStandard,
}

impl Default for ColorTags {
    fn default() -> Self {
        Self {
            range: ColorRange::Unspecified,
            standard: ColorStandard::Unspecified,
        }
    }
}

/// 소스 비디오 메타데이터 (작업 시작 시 한 번 읽는 스냅샷)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub duration_ms: i64,
    pub frame_rate: f64,
    pub bit_rate: u64,
    pub color: ColorTags,
    pub has_audio: bool,
}

/// 컨테이너에서 읽은 원시 값 (없으면 None)
#[derive(Debug, Clone, Default)]
pub struct RawMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_us: Option<i64>,
    pub frame_rate: Option<f64>,
    pub bit_rate: Option<u64>,
    pub color: ColorTags,
    pub has_audio: bool,
}

impl VideoMetadata {
    /// 기본값 적용 (0/음수/NaN도 "없음"으로 취급)
    pub fn from_raw(raw: RawMetadata) -> Self {
        Self {
            width: raw.width.filter(|w| *w > 0).unwrap_or(DEFAULT_WIDTH),
            height: raw.height.filter(|h| *h > 0).unwrap_or(DEFAULT_HEIGHT),
            duration_ms: raw.duration_us.filter(|d| *d > 0).map(|d| d / 1000).unwrap_or(0),
            frame_rate: raw
                .frame_rate
                .filter(|f| f.is_finite() && *f > 0.0)
                .unwrap_or(DEFAULT_FRAME_RATE),
            bit_rate: raw.bit_rate.filter(|b| *b > 0).unwrap_or(DEFAULT_BIT_RATE),
            color: raw.color,
            has_audio: raw.has_audio,
        }
    }

    /// 프레임 간격 (μs)
    pub fn frame_duration_us(&self) -> i64 {
        (1_000_000.0 / self.frame_rate) as i64
    }

    /// 총 프레임 수 = durationMs * fps / 1000
    pub fn total_frames(&self) -> i64 {
        (self.duration_ms as f64 * self.frame_rate / 1000.0) as i64
    }

    /// 인코더용 짝수 해상도
    pub fn even_dimensions(&self) -> (u32, u32) {
        ((self.width & !1).max(2), (self.height & !1).max(2))
    }
}

/// 소스 메타데이터 읽기 (열기 실패만 에러)
pub fn inspect(path: &Path) -> EngineResult<VideoMetadata> {
    ffmpeg::init().map_err(|e| EngineError::ffmpeg("FFmpeg init failed", e))?;

    let input_ctx = open_input(path)?;
    let mut raw = RawMetadata {
        has_audio: input_ctx.streams().best(ffmpeg::media::Type::Audio).is_some(),
        ..RawMetadata::default()
    };

    if input_ctx.duration() > 0 {
        // 컨테이너 duration은 AV_TIME_BASE(μs)
        raw.duration_us = Some(input_ctx.duration());
    }
    if input_ctx.bit_rate() > 0 {
        raw.bit_rate = Some(input_ctx.bit_rate() as u64);
    }

    if let Some(stream) = input_ctx.streams().best(ffmpeg::media::Type::Video) {
        if stream.duration() > 0 {
            raw.duration_us = Some(to_micros(stream.duration(), stream.time_base()));
        }

        let rate = stream.avg_frame_rate();
        let rate = if rate.denominator() != 0 && rate.numerator() > 0 {
            rate
        } else {
            stream.rate()
        };
        if rate.denominator() != 0 {
            raw.frame_rate = Some(f64::from(rate));
        }

        // 디코더를 열어야 해상도/색 정보/스트림 비트레이트를 알 수 있음
        let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .and_then(|ctx| ctx.decoder().video());
        match decoder {
            Ok(decoder) => {
                raw.width = Some(decoder.width());
                raw.height = Some(decoder.height());
                if decoder.bit_rate() > 0 {
                    raw.bit_rate = Some(decoder.bit_rate() as u64);
                }
                raw.color = ColorTags {
                    range: map_range(decoder.color_range()),
                    standard: map_space(decoder.color_space()),
                };
            }
            Err(e) => debug!("[META] decoder unavailable for {}: {}", path.display(), e),
        }
    }

    let metadata = VideoMetadata::from_raw(raw);
    debug!("[META] {} → {:?}", path.display(), metadata);
    Ok(metadata)
}

fn map_range(range: ffmpeg::color::Range) -> ColorRange {
    match range {
        ffmpeg::color::Range::MPEG => ColorRange::Limited,
        ffmpeg::color::Range::JPEG => ColorRange::Full,
        _ => ColorRange::Unspecified,
    }
}

fn map_space(space: ffmpeg::color::Space) -> ColorStandard {
    match space {
        ffmpeg::color::Space::BT709 => ColorStandard::Bt709,
        ffmpeg::color::Space::BT470BG | ffmpeg::color::Space::SMPTE170M => ColorStandard::Bt601,
        ffmpeg::color::Space::BT2020NCL | ffmpeg::color::Space::BT2020CL => ColorStandard::Bt2020,
        _ => ColorStandard::Unspecified,
    }
}
