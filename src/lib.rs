// Clipo 네이티브 미디어 엔진
// 트림/뮤트/오디오 추가/오버레이 합성 → MP4, ffmpeg-next 기반

pub mod config;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod ffmpeg;
pub mod job;
pub mod overlay;
pub mod processing;
pub mod rendering;
pub mod storage;
pub mod transcription;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};

// FFI 함수들을 최상위에서 재export
pub use ffi::*;

/// env_logger 초기화 (RUST_LOG, 기본 info). 여러 번 호출해도 안전
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}
