// 파일 경계 모듈
// URI 정규화, 임시 산출물 장부, 공개 위치 배치

pub mod ledger;
pub mod publish;
pub mod uri;

pub use ledger::{ArtifactLedger, ArtifactStatus, CleanupReport};
pub use uri::{file_uri, resolve_path, ContentResolver, MediaUri};
