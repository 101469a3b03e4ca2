// 텍스트 래스터라이즈 (rusttype)
// 외곽선 패스 → 채우기 패스 순서로 그려 어떤 배경 위에서도 읽히게 함

use crate::error::{EngineError, EngineResult};
use crate::rendering::canvas::{Coverage, Rect};
use image::{Rgba, RgbaImage};
use log::info;
use rusttype::{point, Font, PositionedGlyph, Scale};
use std::path::Path;

/// 내장 볼드 산세리프
static EMBEDDED_BOLD: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans-Bold.ttf");

pub struct FontFace {
    font: Font<'static>,
}

impl FontFace {
    pub fn embedded() -> EngineResult<Self> {
        let font = Font::try_from_bytes(EMBEDDED_BOLD)
            .ok_or_else(|| EngineError::InvalidInput("embedded font is corrupt".to_string()))?;
        Ok(Self { font })
    }

    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let bytes = std::fs::read(path)?;
        let font = Font::try_from_vec(bytes)
            .ok_or_else(|| EngineError::invalid_input(format!("not a font file: {}", path.display())))?;
        Ok(Self { font })
    }

    /// 설정 경로가 있으면 그 폰트, 없으면 내장 폰트
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        match path {
            Some(p) => {
                info!("Loading overlay font {}", p.display());
                Self::from_file(p)
            }
            None => Self::embedded(),
        }
    }

    fn glyphs(&self, text: &str, size: f32, x: f32, baseline: f32) -> Vec<PositionedGlyph<'_>> {
        self.font
            .layout(text, Scale::uniform(size), point(x, baseline))
            .collect()
    }

    /// 진행 폭 (커닝 포함)
    pub fn measure(&self, text: &str, size: f32) -> f32 {
        self.glyphs(text, size, 0.0, 0.0)
            .last()
            .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
            .unwrap_or(0.0)
    }

    /// 잉크 영역 (베이스라인 원점 기준, top은 음수)
    pub fn ink_bounds(&self, text: &str, size: f32) -> Option<Rect> {
        self.glyphs(text, size, 0.0, 0.0)
            .iter()
            .filter_map(|g| g.pixel_bounding_box())
            .fold(None, |acc: Option<Rect>, bb| {
                let r = Rect::new(bb.min.x as f32, bb.min.y as f32, bb.max.x as f32, bb.max.y as f32);
                Some(match acc {
                    None => r,
                    Some(a) => Rect::new(
                        a.left.min(r.left),
                        a.top.min(r.top),
                        a.right.max(r.right),
                        a.bottom.max(r.bottom),
                    ),
                })
            })
    }

    /// 글리프 커버리지 마스크 (pad만큼 사방 여백)
    fn coverage(&self, text: &str, size: f32, x: f32, baseline: f32, pad: i32) -> Option<Coverage> {
        let glyphs = self.glyphs(text, size, x, baseline);
        let boxes: Vec<_> = glyphs.iter().filter_map(|g| g.pixel_bounding_box()).collect();
        let min_x = boxes.iter().map(|b| b.min.x).min()? - pad;
        let min_y = boxes.iter().map(|b| b.min.y).min()? - pad;
        let max_x = boxes.iter().map(|b| b.max.x).max()? + pad;
        let max_y = boxes.iter().map(|b| b.max.y).max()? + pad;

        let mut coverage = Coverage::new(min_x, min_y, (max_x - min_x) as u32, (max_y - min_y) as u32);
        for glyph in &glyphs {
            if let Some(bb) = glyph.pixel_bounding_box() {
                glyph.draw(|gx, gy, v| {
                    let mx = (bb.min.x + gx as i32 - min_x) as u32;
                    let my = (bb.min.y + gy as i32 - min_y) as u32;
                    if let Some(cell) = coverage.mask.get_pixel_mut_checked(mx, my) {
                        // 커닝으로 겹친 글리프는 큰 쪽
                        cell.0[0] = cell.0[0].max((v.clamp(0.0, 1.0) * 255.0).round() as u8);
                    }
                });
            }
        }
        Some(coverage)
    }

    /// 텍스트 그리기 (origin = (x, 베이스라인 y)). stroke = (색, 선 굵기)
    pub fn draw(
        &self,
        frame: &mut RgbaImage,
        text: &str,
        size: f32,
        origin: (f32, f32),
        fill: Rgba<u8>,
        stroke: Option<(Rgba<u8>, f32)>,
    ) {
        let (x, baseline) = origin;
        // 선 굵기의 절반이 글리프 바깥으로 나감
        let outline = stroke.map(|(_, width)| width / 2.0).unwrap_or(0.0);
        let pad = outline.ceil() as i32 + 1;
        let Some(coverage) = self.coverage(text, size, x, baseline, pad) else {
            return;
        };

        if let Some((color, _)) = stroke {
            if outline > 0.0 {
                coverage.dilate(outline).paint(frame, color);
            }
        }
        coverage.paint(frame, fill);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measure_grows_with_text_and_size() {
        let face = FontFace::embedded().unwrap();
        let short = face.measure("Hi", 32.0);
        let long = face.measure("Hi there", 32.0);
        assert!(short > 0.0);
        assert!(long > short);
        assert!(face.measure("Hi", 64.0) > short * 1.5);
        assert_eq!(face.measure("", 32.0), 0.0);
    }

    #[test]
    fn ink_sits_above_baseline() {
        let face = FontFace::embedded().unwrap();
        let bounds = face.ink_bounds("HELLO", 40.0).unwrap();
        assert!(bounds.top < 0.0);
        assert!(bounds.bottom <= 1.0);
        assert!(face.ink_bounds("   ", 40.0).is_none());
    }

    #[test]
    fn stroke_then_fill() {
        let face = FontFace::embedded().unwrap();
        let mut frame = RgbaImage::from_pixel(200, 80, Rgba([0, 0, 255, 255]));
        face.draw(
            &mut frame,
            "I",
            60.0,
            (80.0, 65.0),
            Rgba([255, 255, 255, 255]),
            Some((Rgba([0, 0, 0, 255]), 6.0)),
        );
        let white = frame.pixels().filter(|p| p.0 == [255, 255, 255, 255]).count();
        let black = frame.pixels().filter(|p| p.0 == [0, 0, 0, 255]).count();
        assert!(white > 0, "fill pass missing");
        assert!(black > 0, "stroke pass missing");
        // 바깥 영역은 그대로
        assert_eq!(frame.get_pixel(0, 0).0, [0, 0, 255, 255]);
    }

    #[test]
    fn stroke_widens_painted_area() {
        let face = FontFace::embedded().unwrap();
        let background = Rgba([0, 0, 255, 255]);
        let painted = |stroke: Option<(Rgba<u8>, f32)>| {
            let mut frame = RgbaImage::from_pixel(200, 80, background);
            face.draw(&mut frame, "I", 60.0, (80.0, 65.0), Rgba([255, 255, 255, 255]), stroke);
            frame.pixels().filter(|p| **p != background).count()
        };
        let plain = painted(None);
        let stroked = painted(Some((Rgba([0, 0, 0, 255]), 6.0)));
        assert!(plain > 0);
        assert!(stroked > plain + 50, "{} vs {}", stroked, plain);
    }
}
