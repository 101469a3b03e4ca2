// 공개 위치 배치 - <AppPrefix>_<operation>_<timestamp>.mp4

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Local};
use log::info;
use std::path::{Path, PathBuf};

/// 공개 파일명 생성
pub fn public_file_name(app_prefix: &str, operation: &str, now: DateTime<Local>) -> String {
    format!("{}_{}_{}.mp4", app_prefix, operation, now.format("%Y%m%d_%H%M%S"))
}

/// 이름 미지정 시 기본 operation 이름
pub fn default_operation_name(now: DateTime<Local>) -> String {
    format!("processed_{}", now.timestamp_millis())
}

/// 임시 산출물을 공개 디렉터리로 복사 (원본 임시 파일은 유지)
pub fn copy_to_public(
    temp_path: &Path,
    public_dir: &Path,
    app_prefix: &str,
    name: Option<&str>,
) -> EngineResult<PathBuf> {
    if !temp_path.is_file() {
        return Err(EngineError::ArtifactNotFound(temp_path.to_path_buf()));
    }

    let now = Local::now();
    let operation = match name {
        Some(n) if !n.trim().is_empty() => n.trim().to_string(),
        _ => default_operation_name(now),
    };

    std::fs::create_dir_all(public_dir)?;
    let target = public_dir.join(public_file_name(app_prefix, &operation, now));
    std::fs::copy(temp_path, &target)?;

    info!("[PUBLISH] {} → {}", temp_path.display(), target.display());
    Ok(target)
}
