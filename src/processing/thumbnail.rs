// 썸네일 - 일정 간격 시각의 키프레임을 JPEG로 저장

use crate::error::{EngineError, EngineResult, ExtractError};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};
use log::{debug, warn};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

const JPEG_QUALITY: u8 = 80;

/// i * duration / count (i = 0..count)
pub fn thumbnail_times(duration_us: i64, count: u32) -> EngineResult<Vec<i64>> {
    if duration_us <= 0 {
        return Err(EngineError::invalid_input("could not determine video duration"));
    }
    if count == 0 {
        return Ok(Vec::new());
    }
    let interval = duration_us / i64::from(count);
    Ok((0..i64::from(count)).map(|i| i * interval).collect())
}

/// 폭 고정, 비율 유지, 높이는 짝수로 내림 (최소 2)
pub fn thumbnail_size(width: u32, height: u32, target_width: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (target_width, target_width);
    }
    let h = (u64::from(height) * u64::from(target_width) / u64::from(width)) as u32;
    (target_width, (h & !1).max(2))
}

/// JPEG 한 장 저장 (알파 제거)
pub fn save_jpeg(frame: RgbaImage, path: &Path) -> EngineResult<()> {
    let rgb = DynamicImage::ImageRgba8(frame).to_rgb8();
    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).encode_image(&rgb)?;
    Ok(())
}

/// 각 시각의 프레임을 temp_dir에 thumb_<i>_*.jpeg로 저장
/// 개별 실패는 건너뛰고, 한 장도 못 만들면 실패
pub fn write_thumbnails<X>(times: &[i64], mut extract: X, temp_dir: &Path) -> EngineResult<Vec<PathBuf>>
where
    X: FnMut(i64) -> Result<RgbaImage, ExtractError>,
{
    std::fs::create_dir_all(temp_dir)?;
    let mut written = Vec::with_capacity(times.len());

    for (i, &time_us) in times.iter().enumerate() {
        let frame = match extract(time_us) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("[THUMB] #{} at {}us: {}", i, time_us, e);
                continue;
            }
        };

        let (_, path) = tempfile::Builder::new()
            .prefix(&format!("thumb_{}_", i))
            .suffix(".jpeg")
            .tempfile_in(temp_dir)?
            .keep()
            .map_err(|e| e.error)?;

        if let Err(e) = save_jpeg(frame, &path) {
            warn!("[THUMB] #{} encode failed: {}", i, e);
            let _ = std::fs::remove_file(&path);
            continue;
        }
        debug!("[THUMB] #{} at {}us → {}", i, time_us, path.display());
        written.push(path);
    }

    if written.is_empty() && !times.is_empty() {
        return Err(EngineError::codec("could not generate any thumbnails"));
    }
    Ok(written)
}
