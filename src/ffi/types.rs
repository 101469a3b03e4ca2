// FFI 공통 타입 - 에러 코드, C 문자열 변환

use crate::error::EngineError;
use std::ffi::{c_char, CStr, CString};

/// FFI 반환 코드 (0 = 성공, 음수 = 실패)
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    NullPointer = -1,
    InvalidParam = -2,
    Ffmpeg = -3,
    SourceUnreadable = -4,
    UnsupportedUri = -5,
    TrackNotFound = -6,
    Muxer = -7,
    Codec = -8,
    FrameFailures = -9,
    InvalidOverlay = -10,
    NotFound = -11,
    Io = -12,
    Unknown = -99,
}

impl From<&EngineError> for ErrorCode {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::SourceUnreadable { .. } => Self::SourceUnreadable,
            EngineError::UnsupportedUri(_) => Self::UnsupportedUri,
            EngineError::TrackNotFound { .. } | EngineError::EmptyTrack { .. } => Self::TrackNotFound,
            EngineError::MuxerMisconfigured(_) => Self::Muxer,
            EngineError::CodecUnavailable { .. } | EngineError::Codec(_) | EngineError::BufferSizeMismatch { .. } => {
                Self::Codec
            }
            EngineError::TooManyFrameFailures { .. } => Self::FrameFailures,
            EngineError::InvalidOverlay(_) => Self::InvalidOverlay,
            EngineError::InvalidInput(_) | EngineError::Json(_) => Self::InvalidParam,
            EngineError::ArtifactNotFound(_) => Self::NotFound,
            EngineError::Ffmpeg { .. } => Self::Ffmpeg,
            EngineError::Io(_) | EngineError::Image(_) => Self::Io,
        }
    }
}

/// C 문자열 → String (null/비UTF-8이면 에러 코드)
///
/// # Safety
/// ptr은 null이거나 유효한 null-terminated 문자열이어야 함
pub unsafe fn read_str(ptr: *const c_char) -> Result<String, ErrorCode> {
    if ptr.is_null() {
        return Err(ErrorCode::NullPointer);
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(str::to_string)
        .map_err(|_| ErrorCode::InvalidParam)
}

/// 선택 인자: null이나 빈 문자열이면 None
///
/// # Safety
/// read_str과 동일
pub unsafe fn read_optional_str(ptr: *const c_char) -> Option<String> {
    read_str(ptr).ok().filter(|s| !s.is_empty())
}

/// 출력 포인터에 문자열 기록 (호출자가 string_free로 해제)
///
/// # Safety
/// out은 유효한 쓰기 가능 포인터여야 함
pub unsafe fn write_string(out: *mut *mut c_char, value: String) -> ErrorCode {
    match CString::new(value) {
        Ok(c_str) => {
            *out = c_str.into_raw();
            ErrorCode::Success
        }
        Err(_) => {
            *out = std::ptr::null_mut();
            ErrorCode::InvalidParam
        }
    }
}

/// Rust가 할당한 문자열 해제
#[no_mangle]
pub extern "C" fn string_free(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            let _ = CString::from_raw(ptr);
        }
    }
}
