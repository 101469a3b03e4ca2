// FFI 모듈 - 호스트 앱 (C ABI) 연동

mod engine;
mod job;
pub mod types;

pub use engine::*;
pub use job::*;
pub use types::{string_free, ErrorCode};
