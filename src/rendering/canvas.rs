// 프레임 위 레이어 합성
// 모양은 imageproc로 커버리지 마스크에 그리고, 단색 레이어로 바꿔 imageops::overlay로 source-over
// 클리핑도 overlay가 처리하므로 화면 밖 좌표를 넘겨도 됨

use image::imageops;
use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::morphology::{grayscale_dilate, Mask};
use imageproc::rect::Rect as PixelRect;

/// 축 정렬 사각형 (프레임 좌표, 실수)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

/// 프레임 좌표 (left, top)에 놓인 커버리지 마스크 (0 = 비움, 255 = 완전히 덮음)
#[derive(Debug, Clone)]
pub struct Coverage {
    pub left: i32,
    pub top: i32,
    pub mask: GrayImage,
}

impl Coverage {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            mask: GrayImage::new(width, height),
        }
    }

    /// 원형 커널 grayscale dilation (외곽선 굵기 확장)
    pub fn dilate(&self, radius: f32) -> Coverage {
        let r = radius.round().clamp(0.0, f32::from(u8::MAX)) as u8;
        if r == 0 {
            return self.clone();
        }
        Coverage {
            left: self.left,
            top: self.top,
            mask: grayscale_dilate(&self.mask, &Mask::disk(r)),
        }
    }

    /// 단색으로 칠해 합성 (픽셀 알파 = 색 알파 × 커버리지)
    pub fn paint(&self, frame: &mut RgbaImage, color: Rgba<u8>) {
        let [r, g, b, a] = color.0;
        if a == 0 {
            return;
        }
        let layer = RgbaImage::from_fn(self.mask.width(), self.mask.height(), |x, y| {
            let coverage = u16::from(self.mask.get_pixel(x, y).0[0]);
            Rgba([r, g, b, ((u16::from(a) * coverage + 127) / 255) as u8])
        });
        imageops::overlay(frame, &layer, i64::from(self.left), i64::from(self.top));
    }
}

/// 둥근 사각형 채우기: 십자 모양 사각형 두 개 + 모서리 원 네 개
pub fn fill_round_rect(frame: &mut RgbaImage, rect: Rect, radius: f32, color: Rgba<u8>) {
    let left = rect.left.round() as i32;
    let top = rect.top.round() as i32;
    let w = rect.right.round() as i32 - left;
    let h = rect.bottom.round() as i32 - top;
    if w <= 0 || h <= 0 {
        return;
    }
    let r = (radius.max(0.0).round() as i32).min(w / 2).min(h / 2);

    let mut shape = Coverage::new(left, top, w as u32, h as u32);
    let on = Luma([u8::MAX]);
    if h > 2 * r {
        draw_filled_rect_mut(&mut shape.mask, PixelRect::at(0, r).of_size(w as u32, (h - 2 * r) as u32), on);
    }
    if w > 2 * r {
        draw_filled_rect_mut(&mut shape.mask, PixelRect::at(r, 0).of_size((w - 2 * r) as u32, h as u32), on);
    }
    if r > 0 {
        for center in [(r, r), (w - 1 - r, r), (r, h - 1 - r), (w - 1 - r, h - 1 - r)] {
            draw_filled_circle_mut(&mut shape.mask, center, r, on);
        }
    }
    shape.paint(frame, color);
}

/// 이미지 자체 알파에 투명도 곱하기 (캐시된 오버레이 이미지에 한 번만)
pub fn scale_alpha(image: &mut RgbaImage, opacity: f32) {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity >= 1.0 {
        return;
    }
    for pixel in image.pixels_mut() {
        pixel.0[3] = (f32::from(pixel.0[3]) * opacity).round() as u8;
    }
}
