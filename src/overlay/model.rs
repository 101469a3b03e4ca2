// 오버레이 설정 문서 (호스트 UI → 엔진, JSON)
// 시간 필드는 현재 작업 파일 기준 ms

use crate::error::{EngineError, EngineResult};
use crate::overlay::color::parse_color;
use serde::{Deserialize, Serialize};

fn default_opacity() -> f32 {
    1.0
}

fn default_auto_position() -> f32 {
    -1.0
}

fn default_alignment() -> Alignment {
    Alignment::Center
}

fn default_stroke_color() -> String {
    "#000000".to_string()
}

fn default_stroke_width() -> f32 {
    3.0
}

fn default_max_width() -> f32 {
    0.8
}

/// 오버레이 집합
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayConfig {
    #[serde(default)]
    pub text_overlays: Vec<TextOverlay>,
    #[serde(default)]
    pub image_overlays: Vec<ImageOverlay>,
    #[serde(default)]
    pub subtitle_overlays: Vec<SubtitleOverlay>,
}

/// 고정 위치 텍스트 ((x, y)는 베이스라인 시작점)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextOverlay {
    pub text: String,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
    pub color: String,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageOverlay {
    pub image_uri: String,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub x: f32,
    pub y: f32,
    pub width: u32,
    pub height: u32,
    /// 시계 방향 각도 (이미지 중심 기준)
    #[serde(default)]
    pub rotation: f32,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Center,
    Right,
}

/// 자막 세그먼트 (x, y가 음수면 자동 배치)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleOverlay {
    pub text: String,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    #[serde(default = "default_auto_position")]
    pub x: f32,
    #[serde(default = "default_auto_position")]
    pub y: f32,
    pub font_size: f32,
    pub color: String,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default)]
    pub highlight_words: Vec<HighlightWord>,
    #[serde(default = "default_alignment")]
    pub alignment: Alignment,
    #[serde(default = "default_stroke_color")]
    pub stroke_color: String,
    #[serde(default = "default_stroke_width")]
    pub stroke_width: f32,
    /// 프레임 폭 대비 최대 줄 폭
    #[serde(default = "default_max_width")]
    pub max_width: f32,
}

/// 단어 단위 하이라이트 (자막 표시 구간과 독립된 자체 구간)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightWord {
    pub word: String,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub highlight_color: String,
    #[serde(default)]
    pub background_color: Option<String>,
}

/// 양 끝 포함 구간 판정
#[inline]
pub fn within(start_ms: i64, end_ms: i64, t_ms: i64) -> bool {
    start_ms <= t_ms && t_ms <= end_ms
}

impl TextOverlay {
    pub fn is_visible_at(&self, t_ms: i64) -> bool {
        within(self.start_time_ms, self.end_time_ms, t_ms)
    }
}

impl ImageOverlay {
    pub fn is_visible_at(&self, t_ms: i64) -> bool {
        within(self.start_time_ms, self.end_time_ms, t_ms)
    }
}

impl SubtitleOverlay {
    pub fn is_visible_at(&self, t_ms: i64) -> bool {
        within(self.start_time_ms, self.end_time_ms, t_ms)
    }

    /// 단어에 걸린 하이라이트 (대소문자 무시, 하이라이트 자체 구간 기준)
    pub fn highlight_for(&self, word: &str, t_ms: i64) -> Option<&HighlightWord> {
        let word = word.to_lowercase();
        self.highlight_words
            .iter()
            .find(|h| h.word.to_lowercase() == word && within(h.start_time_ms, h.end_time_ms, t_ms))
    }
}

fn check_window(kind: &str, index: usize, start: i64, end: i64) -> EngineResult<()> {
    if start >= end {
        return Err(EngineError::InvalidOverlay(format!(
            "{} #{}: startTimeMs {} must be before endTimeMs {}",
            kind, index, start, end
        )));
    }
    Ok(())
}

fn check_opacity(kind: &str, index: usize, opacity: f32) -> EngineResult<()> {
    if !(0.0..=1.0).contains(&opacity) {
        return Err(EngineError::InvalidOverlay(format!(
            "{} #{}: opacity {} out of [0, 1]",
            kind, index, opacity
        )));
    }
    Ok(())
}

impl OverlayConfig {
    /// JSON 문서 파싱 + 검증
    pub fn parse(json: &str) -> EngineResult<Self> {
        let config: OverlayConfig =
            serde_json::from_str(json).map_err(|e| EngineError::InvalidOverlay(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 구간, 투명도, 색 문자열 검사
    pub fn validate(&self) -> EngineResult<()> {
        for (i, o) in self.text_overlays.iter().enumerate() {
            check_window("textOverlay", i, o.start_time_ms, o.end_time_ms)?;
            check_opacity("textOverlay", i, o.opacity)?;
            parse_color(&o.color)?;
            if let Some(bg) = &o.background_color {
                parse_color(bg)?;
            }
        }
        for (i, o) in self.image_overlays.iter().enumerate() {
            check_window("imageOverlay", i, o.start_time_ms, o.end_time_ms)?;
            check_opacity("imageOverlay", i, o.opacity)?;
            if o.width == 0 || o.height == 0 {
                return Err(EngineError::InvalidOverlay(format!("imageOverlay #{}: empty size", i)));
            }
        }
        for (i, o) in self.subtitle_overlays.iter().enumerate() {
            check_window("subtitleOverlay", i, o.start_time_ms, o.end_time_ms)?;
            check_opacity("subtitleOverlay", i, o.opacity)?;
            parse_color(&o.color)?;
            parse_color(&o.stroke_color)?;
            if let Some(bg) = &o.background_color {
                parse_color(bg)?;
            }
            for (j, h) in o.highlight_words.iter().enumerate() {
                check_window("highlightWord", j, h.start_time_ms, h.end_time_ms)?;
                parse_color(&h.highlight_color)?;
                if let Some(bg) = &h.background_color {
                    parse_color(bg)?;
                }
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.text_overlays.is_empty() && self.image_overlays.is_empty() && self.subtitle_overlays.is_empty()
    }

    /// t에 보이는 오버레이가 하나라도 있는지 (합성 생략 판정)
    pub fn has_active_at(&self, t_ms: i64) -> bool {
        self.text_overlays.iter().any(|o| o.is_visible_at(t_ms))
            || self.subtitle_overlays.iter().any(|o| o.is_visible_at(t_ms))
            || self.image_overlays.iter().any(|o| o.is_visible_at(t_ms))
    }

    /// t에 보이는 오버레이 (그리기 순서: 텍스트 → 자막 → 이미지)
    pub fn active_at(&self, t_ms: i64) -> Vec<ActiveOverlay<'_>> {
        let text = self
            .text_overlays
            .iter()
            .filter(|o| o.is_visible_at(t_ms))
            .map(ActiveOverlay::Text);
        let subtitles = self
            .subtitle_overlays
            .iter()
            .filter(|o| o.is_visible_at(t_ms))
            .map(ActiveOverlay::Subtitle);
        let images = self
            .image_overlays
            .iter()
            .filter(|o| o.is_visible_at(t_ms))
            .map(ActiveOverlay::Image);
        text.chain(subtitles).chain(images).collect()
    }
}

/// 그리기 대상 오버레이 (종류별 분기)
#[derive(Debug, Clone, Copy)]
pub enum ActiveOverlay<'a> {
    Text(&'a TextOverlay),
    Subtitle(&'a SubtitleOverlay),
    Image(&'a ImageOverlay),
}
