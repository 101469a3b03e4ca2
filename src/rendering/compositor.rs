// 오버레이 합성기
// 활성 오버레이를 텍스트 → 자막 → 이미지 순서로 프레임 위에 그림

use crate::error::EngineResult;
use crate::overlay::{parse_color, ActiveOverlay, Alignment, ImageOverlay, OverlayConfig, SubtitleOverlay, TextOverlay};
use crate::rendering::canvas::{fill_round_rect, scale_alpha, Rect};
use crate::rendering::text::FontFace;
use crate::storage::{resolve_path, ContentResolver};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// 텍스트 배경 여백
const BACKGROUND_PADDING: f32 = 20.0;
const BACKGROUND_RADIUS: f32 = 15.0;
const BACKGROUND_ALPHA: f32 = 180.0;

/// 텍스트 오버레이 외곽선
const TEXT_STROKE_WIDTH: f32 = 6.0;

/// 하이라이트 단어 배경
const HIGHLIGHT_PAD_X: f32 = 8.0;
const HIGHLIGHT_PAD_Y: f32 = 5.0;
const HIGHLIGHT_RADIUS: f32 = 8.0;
const HIGHLIGHT_ALPHA: u8 = 200;

/// 자막 줄 간격 (폰트 크기 배수)
const LINE_SPACING: f32 = 1.2;
/// 자동 배치 시 하단/좌우 여백 (프레임 비율)
const EDGE_MARGIN: f32 = 0.1;

/// 색 알파를 투명도로 교체
fn at_alpha(color: Rgba<u8>, alpha: f32) -> Rgba<u8> {
    Rgba([color.0[0], color.0[1], color.0[2], alpha.clamp(0.0, 255.0).round() as u8])
}

/// 자막 줄 배치 결과
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleLayout {
    pub lines: Vec<Vec<String>>,
    /// 블록 왼쪽 x
    pub start_x: f32,
    /// 블록 위쪽 y (첫 베이스라인 = start_y + font_size)
    pub start_y: f32,
    pub max_line_width: f32,
    pub line_height: f32,
}

impl SubtitleLayout {
    pub fn baseline(&self, line: usize, font_size: f32) -> f32 {
        self.start_y + font_size + line as f32 * self.line_height
    }
}

/// 탐욕적 줄바꿈: 현재 줄 폭 + 단어 폭이 max_width 이하면 이어 붙이고, 아니면 새 줄
pub fn wrap_words(text: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> Vec<Vec<String>> {
    let mut lines = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_width = 0.0f32;

    for word in text.split_whitespace() {
        let word_width = measure(&format!("{} ", word));
        if !current.is_empty() && current_width + word_width <= max_width {
            current.push(word.to_string());
            current_width += word_width;
        } else {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current.push(word.to_string());
            current_width = word_width;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// 자막 위치 계산 (명시 좌표 우선, 없으면 정렬/하단 여백 기준)
pub fn layout_subtitle(
    subtitle: &SubtitleOverlay,
    frame_width: u32,
    frame_height: u32,
    measure: impl Fn(&str) -> f32,
) -> SubtitleLayout {
    let w = frame_width as f32;
    let h = frame_height as f32;
    let max_width = (w * subtitle.max_width).floor();
    let lines = wrap_words(&subtitle.text, max_width, &measure);

    let max_line_width = lines
        .iter()
        .map(|line| measure(&line.join(" ")))
        .fold(0.0f32, f32::max);
    let line_height = subtitle.font_size * LINE_SPACING;

    let start_x = if subtitle.x >= 0.0 {
        subtitle.x
    } else {
        match subtitle.alignment {
            Alignment::Left => w * EDGE_MARGIN,
            Alignment::Right => w * (1.0 - EDGE_MARGIN) - max_line_width,
            Alignment::Center => (w - max_line_width) / 2.0,
        }
    };
    let start_y = if subtitle.y >= 0.0 {
        subtitle.y
    } else {
        h - lines.len() as f32 * line_height - h * EDGE_MARGIN
    };

    SubtitleLayout {
        lines,
        start_x,
        start_y,
        max_line_width,
        line_height,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ImageKey {
    uri: String,
    width: u32,
    height: u32,
    rotation_bits: u32,
    opacity_bits: u32,
}

/// 회전/리사이즈/투명도까지 끝난 이미지 + 그릴 때의 좌상단 보정값
struct PreparedImage {
    pixels: RgbaImage,
    offset_x: i32,
    offset_y: i32,
}

/// 프레임 오버레이 렌더러 (오퍼레이션 하나 동안 재사용, 이미지 캐시 보유)
pub struct OverlayRenderer {
    font: FontFace,
    resolver: Option<Arc<dyn ContentResolver>>,
    images: HashMap<ImageKey, Option<PreparedImage>>,
}

impl OverlayRenderer {
    pub fn new(font: FontFace, resolver: Option<Arc<dyn ContentResolver>>) -> Self {
        Self {
            font,
            resolver,
            images: HashMap::new(),
        }
    }

    pub fn font(&self) -> &FontFace {
        &self.font
    }

    /// t_ms에 보이는 오버레이를 모두 그림. 그린 개수 반환
    pub fn render(&mut self, frame: &mut RgbaImage, config: &OverlayConfig, t_ms: i64) -> EngineResult<usize> {
        let active = config.active_at(t_ms);
        for overlay in &active {
            match overlay {
                ActiveOverlay::Text(text) => self.draw_text(frame, text)?,
                ActiveOverlay::Subtitle(subtitle) => self.draw_subtitle(frame, subtitle, t_ms)?,
                ActiveOverlay::Image(image) => self.draw_image(frame, image),
            }
        }
        Ok(active.len())
    }

    fn draw_text(&self, frame: &mut RgbaImage, overlay: &TextOverlay) -> EngineResult<()> {
        let color = parse_color(&overlay.color)?;

        if let Some(bg) = &overlay.background_color {
            let bg = at_alpha(parse_color(bg)?, overlay.opacity * BACKGROUND_ALPHA);
            if let Some(ink) = self.font.ink_bounds(&overlay.text, overlay.font_size) {
                let rect = Rect::new(
                    overlay.x - BACKGROUND_PADDING,
                    overlay.y - ink.height() - BACKGROUND_PADDING,
                    overlay.x + ink.width() + BACKGROUND_PADDING,
                    overlay.y + BACKGROUND_PADDING,
                );
                fill_round_rect(frame, rect, BACKGROUND_RADIUS, bg);
            }
        }

        let alpha = overlay.opacity * 255.0;
        self.font.draw(
            frame,
            &overlay.text,
            overlay.font_size,
            (overlay.x, overlay.y),
            at_alpha(color, alpha),
            Some((at_alpha(Rgba([0, 0, 0, 255]), alpha), TEXT_STROKE_WIDTH)),
        );
        Ok(())
    }

    fn draw_subtitle(&self, frame: &mut RgbaImage, subtitle: &SubtitleOverlay, t_ms: i64) -> EngineResult<()> {
        let fs = subtitle.font_size;
        let layout = layout_subtitle(subtitle, frame.width(), frame.height(), |s| self.font.measure(s, fs));
        if layout.lines.is_empty() {
            return Ok(());
        }

        let text_alpha = subtitle.opacity * 255.0;
        let fill = at_alpha(parse_color(&subtitle.color)?, text_alpha);
        let stroke = at_alpha(parse_color(&subtitle.stroke_color)?, text_alpha);

        if let Some(bg) = &subtitle.background_color {
            let bg = at_alpha(parse_color(bg)?, subtitle.opacity * BACKGROUND_ALPHA);
            let last = layout.baseline(layout.lines.len() - 1, fs);
            let rect = Rect::new(
                layout.start_x - BACKGROUND_PADDING,
                layout.start_y - BACKGROUND_PADDING,
                layout.start_x + layout.max_line_width + BACKGROUND_PADDING,
                last + BACKGROUND_PADDING,
            );
            fill_round_rect(frame, rect, BACKGROUND_RADIUS, bg);
        }

        for (i, line) in layout.lines.iter().enumerate() {
            let baseline = layout.baseline(i, fs);
            let mut x = layout.start_x;
            for word in line {
                let advance = self.font.measure(&format!("{} ", word), fs);
                let word_fill = match subtitle.highlight_for(word, t_ms) {
                    Some(highlight) => {
                        if let Some(bg) = &highlight.background_color {
                            let word_width = self.font.measure(word, fs);
                            let rect = Rect::new(
                                x - HIGHLIGHT_PAD_X,
                                baseline - fs - HIGHLIGHT_PAD_Y,
                                x + word_width + HIGHLIGHT_PAD_X,
                                baseline + HIGHLIGHT_PAD_Y,
                            );
                            let bg = at_alpha(parse_color(bg)?, f32::from(HIGHLIGHT_ALPHA));
                            fill_round_rect(frame, rect, HIGHLIGHT_RADIUS, bg);
                        }
                        at_alpha(parse_color(&highlight.highlight_color)?, text_alpha)
                    }
                    None => fill,
                };
                self.font.draw(
                    frame,
                    word,
                    fs,
                    (x, baseline),
                    word_fill,
                    Some((stroke, subtitle.stroke_width)),
                );
                x += advance;
            }
        }
        Ok(())
    }

    /// 이미지 로딩 실패는 해당 오버레이만 건너뜀 (프레임 실패 아님)
    fn draw_image(&mut self, frame: &mut RgbaImage, overlay: &ImageOverlay) {
        let key = ImageKey {
            uri: overlay.image_uri.clone(),
            width: overlay.width,
            height: overlay.height,
            rotation_bits: overlay.rotation.to_bits(),
            opacity_bits: overlay.opacity.to_bits(),
        };
        if !self.images.contains_key(&key) {
            let prepared = match self.prepare_image(overlay) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!("Image overlay {} skipped: {}", overlay.image_uri, e);
                    None
                }
            };
            self.images.insert(key.clone(), prepared);
        }

        if let Some(Some(prepared)) = self.images.get(&key) {
            imageops::overlay(
                frame,
                &prepared.pixels,
                i64::from(overlay.x.round() as i32 + prepared.offset_x),
                i64::from(overlay.y.round() as i32 + prepared.offset_y),
            );
        }
    }

    fn prepare_image(&self, overlay: &ImageOverlay) -> EngineResult<PreparedImage> {
        let path = resolve_path(&overlay.image_uri, self.resolver.as_deref())?;
        let source = image::open(&path)?.to_rgba8();
        let mut scaled = imageops::resize(&source, overlay.width, overlay.height, FilterType::Triangle);
        scale_alpha(&mut scaled, overlay.opacity);
        debug!(
            "Image overlay {} loaded ({}x{} → {}x{})",
            path.display(),
            source.width(),
            source.height(),
            overlay.width,
            overlay.height
        );

        if overlay.rotation.rem_euclid(360.0) == 0.0 {
            return Ok(PreparedImage {
                pixels: scaled,
                offset_x: 0,
                offset_y: 0,
            });
        }

        // 회전 시 모서리가 잘리지 않도록 대각선 크기 캔버스 중앙에 놓고 돌림
        let (w, h) = (overlay.width, overlay.height);
        let side = ((w as f32).hypot(h as f32)).ceil() as u32;
        let pad_x = (side - w) / 2;
        let pad_y = (side - h) / 2;
        let mut canvas = RgbaImage::from_pixel(side, side, Rgba([0, 0, 0, 0]));
        imageops::overlay(&mut canvas, &scaled, i64::from(pad_x), i64::from(pad_y));
        let rotated = rotate_about_center(
            &canvas,
            overlay.rotation.to_radians(),
            Interpolation::Bilinear,
            Rgba([0, 0, 0, 0]),
        );
        Ok(PreparedImage {
            pixels: rotated,
            offset_x: -(pad_x as i32),
            offset_y: -(pad_y as i32),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::HighlightWord;

    fn subtitle(text: &str) -> SubtitleOverlay {
        SubtitleOverlay {
            text: text.to_string(),
            start_time_ms: 0,
            end_time_ms: 2000,
            x: -1.0,
            y: -1.0,
            font_size: 40.0,
            color: "#FFFFFF".to_string(),
            background_color: None,
            opacity: 1.0,
            highlight_words: Vec::new(),
            alignment: Alignment::Center,
            stroke_color: "#000000".to_string(),
            stroke_width: 3.0,
            max_width: 0.8,
        }
    }

    // 글자당 10px 고정폭 측정기
    fn mono(s: &str) -> f32 {
        s.chars().count() as f32 * 10.0
    }

    #[test]
    fn greedy_wrap() {
        // "aaa " = 40, "bb " = 30, "cccc " = 50
        let lines = wrap_words("aaa bb cccc", 75.0, mono);
        assert_eq!(lines, vec![vec!["aaa".to_string(), "bb".to_string()], vec!["cccc".to_string()]]);

        // 한 단어가 max보다 넓어도 자기 줄 하나 차지
        let lines = wrap_words("enormousword x", 50.0, mono);
        assert_eq!(lines.len(), 2);
        assert!(wrap_words("   ", 50.0, mono).is_empty());
    }

    #[test]
    fn auto_position_centers_above_bottom_margin() {
        let layout = layout_subtitle(&subtitle("hello world"), 1000, 500, mono);
        assert_eq!(layout.lines.len(), 1);
        assert_eq!(layout.max_line_width, 110.0);
        assert_eq!(layout.start_x, (1000.0 - 110.0) / 2.0);
        assert_eq!(layout.start_y, 500.0 - 48.0 - 50.0);
        assert_eq!(layout.baseline(0, 40.0), layout.start_y + 40.0);
    }

    #[test]
    fn alignment_and_explicit_position() {
        let mut sub = subtitle("abc");
        sub.alignment = Alignment::Left;
        assert_eq!(layout_subtitle(&sub, 1000, 500, mono).start_x, 100.0);
        sub.alignment = Alignment::Right;
        assert_eq!(layout_subtitle(&sub, 1000, 500, mono).start_x, 900.0 - 30.0);
        sub.x = 12.0;
        sub.y = 34.0;
        let layout = layout_subtitle(&sub, 1000, 500, mono);
        assert_eq!((layout.start_x, layout.start_y), (12.0, 34.0));
    }

    fn renderer() -> OverlayRenderer {
        OverlayRenderer::new(FontFace::embedded().unwrap(), None)
    }

    fn frame() -> RgbaImage {
        RgbaImage::from_pixel(320, 180, Rgba([0, 0, 255, 255]))
    }

    #[test]
    fn overlays_only_change_frame_inside_window() {
        let config = OverlayConfig::parse(
            r##"{ "textOverlays": [ { "text": "Hi", "startTimeMs": 100, "endTimeMs": 200,
                "x": 20, "y": 60, "fontSize": 40, "color": "#FFFFFF", "backgroundColor": "#FF0000" } ] }"##,
        )
        .unwrap();
        let mut r = renderer();
        let clean = frame();

        for t in [0, 99, 201, 5000] {
            let mut f = frame();
            assert_eq!(r.render(&mut f, &config, t).unwrap(), 0);
            assert_eq!(f, clean, "frame changed at {}", t);
        }
        for t in [100, 150, 200] {
            let mut f = frame();
            assert_eq!(r.render(&mut f, &config, t).unwrap(), 1);
            assert_ne!(f, clean, "frame untouched at {}", t);
        }
    }

    #[test]
    fn highlighted_word_switches_color_only_in_its_window() {
        let mut sub = subtitle("GO");
        sub.x = 20.0;
        sub.y = 20.0;
        sub.stroke_width = 0.0;
        sub.highlight_words.push(HighlightWord {
            word: "go".to_string(),
            start_time_ms: 500,
            end_time_ms: 600,
            highlight_color: "#FF0000".to_string(),
            background_color: None,
        });
        let config = OverlayConfig {
            subtitle_overlays: vec![sub],
            ..OverlayConfig::default()
        };
        let mut r = renderer();
        let red = |f: &RgbaImage| f.pixels().filter(|p| p.0 == [255, 0, 0, 255]).count();
        let white = |f: &RgbaImage| f.pixels().filter(|p| p.0 == [255, 255, 255, 255]).count();

        let mut plain = frame();
        r.render(&mut plain, &config, 100).unwrap();
        assert!(white(&plain) > 0);
        assert_eq!(red(&plain), 0);

        let mut lit = frame();
        r.render(&mut lit, &config, 550).unwrap();
        assert!(red(&lit) > 0);
        assert_eq!(white(&lit), 0);
    }

    #[test]
    fn missing_image_is_skipped() {
        let config = OverlayConfig::parse(
            r##"{ "imageOverlays": [ { "imageUri": "/nonexistent/logo.png", "startTimeMs": 0,
                "endTimeMs": 100, "x": 0, "y": 0, "width": 10, "height": 10 } ] }"##,
        )
        .unwrap();
        let mut r = renderer();
        let mut f = frame();
        assert_eq!(r.render(&mut f, &config, 50).unwrap(), 1);
        assert_eq!(f, frame());
    }

    #[test]
    fn image_overlay_drawn_and_rotated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.png");
        RgbaImage::from_pixel(4, 4, Rgba([0, 255, 0, 255])).save(&path).unwrap();
        let uri = format!("file://{}", path.display());

        let doc = format!(
            r#"{{ "imageOverlays": [
                {{ "imageUri": "{uri}", "startTimeMs": 0, "endTimeMs": 100, "x": 10, "y": 10, "width": 20, "height": 20 }},
                {{ "imageUri": "{uri}", "startTimeMs": 0, "endTimeMs": 100, "x": 100, "y": 50, "width": 40, "height": 20, "rotation": 90 }}
            ] }}"#
        );
        let config = OverlayConfig::parse(&doc).unwrap();
        let mut r = renderer();
        let mut f = frame();
        r.render(&mut f, &config, 0).unwrap();

        assert_eq!(f.get_pixel(15, 15).0, [0, 255, 0, 255]);
        assert_eq!(f.get_pixel(5, 5).0, [0, 0, 255, 255]);
        // 90도 회전: 40x20 → 세로로 선 20x40, 중심 (120, 60)
        assert_eq!(f.get_pixel(120, 45).0, [0, 255, 0, 255]);
        assert_eq!(f.get_pixel(105, 60).0, [0, 0, 255, 255]);
    }

    #[test]
    fn image_opacity_blends_with_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("half.png");
        RgbaImage::from_pixel(4, 4, Rgba([0, 255, 0, 255])).save(&path).unwrap();

        let doc = format!(
            r#"{{ "imageOverlays": [ {{ "imageUri": "{}", "startTimeMs": 0, "endTimeMs": 100,
                "x": 10, "y": 10, "width": 8, "height": 8, "opacity": 0.5 }} ] }}"#,
            path.display()
        );
        let config = OverlayConfig::parse(&doc).unwrap();
        let mut r = renderer();
        let mut f = frame();
        r.render(&mut f, &config, 0).unwrap();

        let [red, green, blue, _] = f.get_pixel(14, 14).0;
        assert_eq!(red, 0);
        assert!(green.abs_diff(128) <= 1, "green {}", green);
        assert!(blue.abs_diff(127) <= 1, "blue {}", blue);
        assert_eq!(f.get_pixel(9, 9).0, [0, 0, 255, 255]);
    }
}
