// 색 변환 - RGB(A) → NV12 (BT.709 limited range, 정수 계수)
// Y 평면 전체 해상도 + UV 인터리브 (짝수 행/열 샘플링)

use crate::error::{EngineError, EngineResult};
use image::RgbaImage;

#[inline]
fn luma(r: i32, g: i32, b: i32) -> u8 {
    (((66 * r + 129 * g + 25 * b) >> 8) + 16).clamp(16, 235) as u8
}

#[inline]
fn chroma_u(r: i32, g: i32, b: i32) -> u8 {
    (((-38 * r - 74 * g + 112 * b) >> 8) + 128).clamp(16, 240) as u8
}

#[inline]
fn chroma_v(r: i32, g: i32, b: i32) -> u8 {
    (((112 * r - 94 * g - 18 * b) >> 8) + 128).clamp(16, 240) as u8
}

/// RGBA 프레임 → NV12 버퍼 (width*height*3/2 바이트, 알파 무시)
pub fn rgb_to_nv12(frame: &RgbaImage) -> EngineResult<Vec<u8>> {
    let (width, height) = frame.dimensions();
    let w = width as usize;
    let h = height as usize;
    let expected = w * h * 3 / 2;

    let mut out = Vec::with_capacity(expected);

    for px in frame.pixels() {
        let [r, g, b, _] = px.0;
        out.push(luma(i32::from(r), i32::from(g), i32::from(b)));
    }

    for row in (0..h).step_by(2) {
        for col in (0..w).step_by(2) {
            let [r, g, b, _] = frame.get_pixel(col as u32, row as u32).0;
            let (r, g, b) = (i32::from(r), i32::from(g), i32::from(b));
            out.push(chroma_u(r, g, b));
            out.push(chroma_v(r, g, b));
        }
    }

    // 홀수 해상도는 크기가 어긋남 → 버퍼 손상으로 취급
    if out.len() != expected {
        return Err(EngineError::BufferSizeMismatch {
            expected,
            actual: out.len(),
        });
    }
    Ok(out)
}

/// NV12 → RGBA (BT.709 limited 역변환, 검증/썸네일 비교용)
pub fn nv12_to_rgb(nv12: &[u8], width: u32, height: u32) -> EngineResult<RgbaImage> {
    let w = width as usize;
    let h = height as usize;
    let expected = w * h * 3 / 2;
    if nv12.len() != expected || w % 2 != 0 || h % 2 != 0 {
        return Err(EngineError::BufferSizeMismatch {
            expected,
            actual: nv12.len(),
        });
    }

    let (y_plane, uv_plane) = nv12.split_at(w * h);
    let mut image = RgbaImage::new(width, height);

    for row in 0..h {
        for col in 0..w {
            let uv = (row / 2) * w + (col / 2) * 2;
            // 정수 양자화로 잘린 반 단계를 보정
            let y = f32::from(y_plane[row * w + col]) - 16.0 + 0.5;
            let u = f32::from(uv_plane[uv]) - 128.0 + 0.5;
            let v = f32::from(uv_plane[uv + 1]) - 128.0 + 0.5;

            let r = 1.1636 * y - 0.0027 * u + 1.5991 * v;
            let g = 1.1636 * y - 0.3913 * u - 0.8185 * v;
            let b = 1.1636 * y + 2.0263 * u + 0.0018 * v;

            image.put_pixel(
                col as u32,
                row as u32,
                image::Rgba([clamp_u8(r), clamp_u8(g), clamp_u8(b), 255]),
            );
        }
    }
    Ok(image)
}

#[inline]
fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn white_and_black_hit_limited_range_bounds() {
        let white = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255]));
        let nv12 = rgb_to_nv12(&white).unwrap();
        assert_eq!(&nv12[..4], &[235, 235, 235, 235]);
        assert_eq!(&nv12[4..], &[128, 128]);

        let black = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        let nv12 = rgb_to_nv12(&black).unwrap();
        assert_eq!(&nv12[..4], &[16, 16, 16, 16]);
        assert_eq!(&nv12[4..], &[128, 128]);
    }

    #[test]
    fn layout_is_luma_then_interleaved_chroma() {
        let frame = RgbaImage::from_pixel(4, 2, Rgba([255, 0, 0, 255]));
        let nv12 = rgb_to_nv12(&frame).unwrap();
        assert_eq!(nv12.len(), 4 * 2 * 3 / 2);
        // 빨강: U < 128, V > 128
        let (u, v) = (nv12[8], nv12[9]);
        assert!(u < 128 && v > 200);
        assert_eq!(&nv12[8..10], &nv12[10..12]);
    }

    #[test]
    fn round_trip_within_two_levels() {
        // 2x2 블록 단위로 같은 색 (크로마 서브샘플링 손실 배제)
        let palette = [
            [0u8, 0, 0],
            [255, 255, 255],
            [200, 30, 40],
            [20, 180, 60],
            [40, 60, 220],
            [128, 128, 128],
            [250, 200, 10],
            [90, 20, 160],
            [16, 235, 128],
        ];
        let mut frame = RgbaImage::new(6, 6);
        for (i, rgb) in palette.iter().enumerate() {
            let bx = (i % 3) as u32 * 2;
            let by = (i / 3) as u32 * 2;
            for dy in 0..2 {
                for dx in 0..2 {
                    frame.put_pixel(bx + dx, by + dy, Rgba([rgb[0], rgb[1], rgb[2], 255]));
                }
            }
        }

        let nv12 = rgb_to_nv12(&frame).unwrap();
        let back = nv12_to_rgb(&nv12, 6, 6).unwrap();
        for (a, b) in frame.pixels().zip(back.pixels()) {
            for c in 0..3 {
                let diff = (i32::from(a.0[c]) - i32::from(b.0[c])).abs();
                assert!(diff <= 2, "{:?} → {:?}", a, b);
            }
        }
    }

    #[test]
    fn odd_size_is_a_buffer_mismatch() {
        let frame = RgbaImage::from_pixel(3, 3, Rgba([10, 10, 10, 255]));
        match rgb_to_nv12(&frame) {
            Err(EngineError::BufferSizeMismatch { expected, actual }) => {
                assert_eq!(expected, 13);
                assert_eq!(actual, 9 + 8);
            }
            other => panic!("expected mismatch, got {:?}", other.map(|v| v.len())),
        }
    }
}
