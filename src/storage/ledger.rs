// 임시 산출물 장부
// 스테이지가 만든 파일을 생성 순서대로 기록. 캐시가 아니므로 eviction 없음, 명시적 삭제만

use crate::storage::uri::{resolve_path, ContentResolver};
use log::{debug, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// 일괄 삭제 결과
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub deleted_count: u32,
    pub error_count: u32,
    pub total: u32,
}

/// 진단용 파일 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactStatus {
    pub exists: bool,
    pub size: u64,
    pub path: PathBuf,
}

/// 삭제 시도 결과 (내부용)
enum Removal {
    Deleted,
    Missing,
    Failed,
}

/// 임시 산출물 장부 (순서 있는 집합)
#[derive(Debug, Default)]
pub struct ArtifactLedger {
    entries: Vec<PathBuf>,
}

impl ArtifactLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 산출물 등록 (이미 있으면 false)
    pub fn register(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.entries.contains(&path) {
            return false;
        }
        debug!("[LEDGER] register {}", path.display());
        self.entries.push(path);
        true
    }

    /// 생성 순서대로 등록된 산출물
    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// 단일 삭제. 없는 파일이면 false (에러 아님)
    pub fn delete_one(&mut self, uri: &str, resolver: Option<&dyn ContentResolver>) -> bool {
        let path = match resolve_path(uri, resolver) {
            Ok(p) => p,
            Err(e) => {
                warn!("[LEDGER] cannot resolve {}: {}", uri, e);
                return false;
            }
        };
        self.forget(&path);
        matches!(remove_file(&path), Removal::Deleted)
    }

    /// 일괄 삭제. 없는 파일은 deleted/error 어느 쪽에도 세지 않음
    pub fn delete_all(&mut self, uris: &[String], resolver: Option<&dyn ContentResolver>) -> CleanupReport {
        let mut report = CleanupReport {
            total: uris.len() as u32,
            ..CleanupReport::default()
        };

        for uri in uris {
            let path = match resolve_path(uri, resolver) {
                Ok(p) => p,
                Err(e) => {
                    warn!("[LEDGER] cannot resolve {}: {}", uri, e);
                    report.error_count += 1;
                    continue;
                }
            };
            self.forget(&path);
            match remove_file(&path) {
                Removal::Deleted => report.deleted_count += 1,
                Removal::Missing => {}
                Removal::Failed => report.error_count += 1,
            }
        }

        info!(
            "[LEDGER] cleanup: {} deleted, {} errors, {} total",
            report.deleted_count, report.error_count, report.total
        );
        report
    }

    /// 등록된 전체 산출물 삭제
    pub fn release_all(&mut self) -> CleanupReport {
        let entries = std::mem::take(&mut self.entries);
        let mut report = CleanupReport {
            total: entries.len() as u32,
            ..CleanupReport::default()
        };
        for path in &entries {
            match remove_file(path) {
                Removal::Deleted => report.deleted_count += 1,
                Removal::Missing => {}
                Removal::Failed => report.error_count += 1,
            }
        }
        report
    }

    fn forget(&mut self, path: &Path) {
        self.entries.retain(|p| p != path);
    }
}

/// 존재/크기 확인 (진단용)
pub fn check(path: &Path) -> ArtifactStatus {
    match std::fs::metadata(path) {
        Ok(meta) => ArtifactStatus {
            exists: meta.is_file(),
            size: if meta.is_file() { meta.len() } else { 0 },
            path: path.to_path_buf(),
        },
        Err(_) => ArtifactStatus {
            exists: false,
            size: 0,
            path: path.to_path_buf(),
        },
    }
}

fn remove_file(path: &Path) -> Removal {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("[LEDGER] deleted {}", path.display());
            Removal::Deleted
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("[LEDGER] already gone {}", path.display());
            Removal::Missing
        }
        Err(e) => {
            warn!("[LEDGER] delete failed {}: {}", path.display(), e);
            Removal::Failed
        }
    }
}
