// Engine FFI - 호스트 앱 연동
// 엔진 핸들 생성/파괴, content URI 리졸버 등록, 동기 호출 (메타데이터/장부/공개 배치)
// 결과 문자열은 JSON 또는 URI, string_free()로 해제

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::EngineResult;
use crate::ffi::types::{read_optional_str, read_str, write_string, ErrorCode};
use crate::storage::ContentResolver;
use crate::transcription::parse_transcript;
use log::warn;
use serde::Serialize;
use std::ffi::{c_char, c_void};
use std::path::PathBuf;
use std::sync::Arc;

/// 호스트 리졸버 콜백
/// uri를 로컬 경로로 바꿔 out_path(out_len 바이트)에 null-terminated로 기록
/// 반환: 기록한 길이, 실패 시 음수
pub type ResolveCallback =
    extern "C" fn(uri: *const c_char, out_path: *mut c_char, out_len: usize, user_data: *mut c_void) -> i32;

const RESOLVE_BUFFER_LEN: usize = 4096;

struct CallbackResolver {
    callback: ResolveCallback,
    user_data: *mut c_void,
}

// user_data의 스레드 안전성은 호스트가 보장
unsafe impl Send for CallbackResolver {}
unsafe impl Sync for CallbackResolver {}

impl ContentResolver for CallbackResolver {
    fn resolve(&self, uri: &str) -> Option<PathBuf> {
        let c_uri = std::ffi::CString::new(uri).ok()?;
        let mut buffer = vec![0u8; RESOLVE_BUFFER_LEN];
        let written = (self.callback)(
            c_uri.as_ptr(),
            buffer.as_mut_ptr() as *mut c_char,
            buffer.len(),
            self.user_data,
        );
        if written <= 0 || written as usize >= buffer.len() {
            warn!("[FFI] resolver failed for {} ({})", uri, written);
            return None;
        }
        buffer.truncate(written as usize);
        String::from_utf8(buffer).ok().map(PathBuf::from)
    }
}

/// 핸들에서 Engine Arc 복제 (원본 소유권 유지)
///
/// # Safety
/// engine은 engine_create가 반환한 살아있는 핸들이어야 함
pub(crate) unsafe fn engine_arc(engine: *mut c_void) -> Arc<Engine> {
    let original = Arc::from_raw(engine as *const Engine);
    let clone = Arc::clone(&original);
    let _ = Arc::into_raw(original);
    clone
}

/// 결과 값을 JSON으로 직렬화해 out에 기록
unsafe fn write_json<T: Serialize>(out: *mut *mut c_char, result: EngineResult<T>) -> i32 {
    let value = match result.and_then(|v| serde_json::to_string(&v).map_err(Into::into)) {
        Ok(json) => json,
        Err(e) => {
            warn!("[FFI] {}", e);
            *out = std::ptr::null_mut();
            return ErrorCode::from(&e) as i32;
        }
    };
    write_string(out, value) as i32
}

/// 엔진 생성
/// config_json: EngineConfig JSON (null/빈 문자열이면 기본값)
/// out_engine: Engine 핸들 반환
#[no_mangle]
pub extern "C" fn engine_create(config_json: *const c_char, out_engine: *mut *mut c_void) -> i32 {
    if out_engine.is_null() {
        return ErrorCode::NullPointer as i32;
    }
    crate::init_logging();

    unsafe {
        let json = read_optional_str(config_json).unwrap_or_default();
        let config = match EngineConfig::from_json(&json) {
            Ok(c) => c,
            Err(e) => {
                warn!("[FFI] invalid engine config: {}", e);
                return ErrorCode::InvalidParam as i32;
            }
        };
        let engine = Arc::new(Engine::new(config));
        *out_engine = Arc::into_raw(engine) as *mut c_void;
    }

    ErrorCode::Success as i32
}

/// 엔진 파괴. 실행 중인 스테이지 작업은 자신의 참조로 끝까지 실행됨
#[no_mangle]
pub extern "C" fn engine_destroy(engine: *mut c_void) -> i32 {
    if engine.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let _ = Arc::from_raw(engine as *const Engine);
    }

    ErrorCode::Success as i32
}

/// content:// URI 리졸버 등록
#[no_mangle]
pub extern "C" fn engine_set_content_resolver(
    engine: *mut c_void,
    callback: Option<ResolveCallback>,
    user_data: *mut c_void,
) -> i32 {
    if engine.is_null() {
        return ErrorCode::NullPointer as i32;
    }
    let Some(callback) = callback else {
        return ErrorCode::NullPointer as i32;
    };

    unsafe {
        let engine = engine_arc(engine);
        engine.set_resolver(Arc::new(CallbackResolver { callback, user_data }));
    }

    ErrorCode::Success as i32
}

/// 메타데이터 (JSON)
#[no_mangle]
pub extern "C" fn engine_get_metadata(engine: *mut c_void, uri: *const c_char, out_json: *mut *mut c_char) -> i32 {
    if engine.is_null() || out_json.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let uri = match read_str(uri) {
            Ok(s) => s,
            Err(code) => return code as i32,
        };
        let engine = engine_arc(engine);
        write_json(out_json, engine.metadata(&uri))
    }
}

/// 임시 산출물을 공개 위치로 복사
/// name: operation 이름 (null이면 기본 이름)
/// out_uri: 공개 파일 URI
#[no_mangle]
pub extern "C" fn engine_finalize(
    engine: *mut c_void,
    temp_uri: *const c_char,
    name: *const c_char,
    out_uri: *mut *mut c_char,
) -> i32 {
    if engine.is_null() || out_uri.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let temp_uri = match read_str(temp_uri) {
            Ok(s) => s,
            Err(code) => return code as i32,
        };
        let name = read_optional_str(name);
        let engine = engine_arc(engine);
        match engine.finalize(&temp_uri, name.as_deref()) {
            Ok(uri) => write_string(out_uri, uri) as i32,
            Err(e) => {
                warn!("[FFI] finalize failed: {}", e);
                *out_uri = std::ptr::null_mut();
                ErrorCode::from(&e) as i32
            }
        }
    }
}

/// 산출물 하나 삭제
/// 반환: 1=삭제됨, 0=없음, 음수=오류
#[no_mangle]
pub extern "C" fn engine_delete_artifact(engine: *mut c_void, uri: *const c_char) -> i32 {
    if engine.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let uri = match read_str(uri) {
            Ok(s) => s,
            Err(code) => return code as i32,
        };
        let engine = engine_arc(engine);
        match engine.delete_one(&uri) {
            Ok(deleted) => i32::from(deleted),
            Err(e) => ErrorCode::from(&e) as i32,
        }
    }
}

/// 여러 산출물 삭제
/// uris_json: URI 문자열 배열 JSON
/// out_json: {deletedCount, errorCount, total}
#[no_mangle]
pub extern "C" fn engine_delete_artifacts(
    engine: *mut c_void,
    uris_json: *const c_char,
    out_json: *mut *mut c_char,
) -> i32 {
    if engine.is_null() || out_json.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let uris: Vec<String> = match read_str(uris_json).map(|s| serde_json::from_str(&s)) {
            Ok(Ok(list)) => list,
            Ok(Err(_)) => return ErrorCode::InvalidParam as i32,
            Err(code) => return code as i32,
        };
        let engine = engine_arc(engine);
        write_json(out_json, engine.delete_all(&uris))
    }
}

/// 등록된 모든 산출물 삭제
#[no_mangle]
pub extern "C" fn engine_release_all(engine: *mut c_void, out_json: *mut *mut c_char) -> i32 {
    if engine.is_null() || out_json.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let engine = engine_arc(engine);
        write_json(out_json, engine.release_all())
    }
}

/// 등록된 산출물 URI 목록 (JSON 배열)
#[no_mangle]
pub extern "C" fn engine_list_artifacts(engine: *mut c_void, out_json: *mut *mut c_char) -> i32 {
    if engine.is_null() || out_json.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let engine = engine_arc(engine);
        write_json(out_json, engine.artifacts())
    }
}

/// 파일 존재/크기 진단 (JSON)
#[no_mangle]
pub extern "C" fn engine_check_artifact(engine: *mut c_void, uri: *const c_char, out_json: *mut *mut c_char) -> i32 {
    if engine.is_null() || out_json.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let uri = match read_str(uri) {
            Ok(s) => s,
            Err(code) => return code as i32,
        };
        let engine = engine_arc(engine);
        write_json(out_json, engine.check(&uri))
    }
}

/// 음성 인식 결과 텍스트 → 단어 목록 JSON [{word, startMs, endMs}]
#[no_mangle]
pub extern "C" fn transcript_parse(text: *const c_char, out_json: *mut *mut c_char) -> i32 {
    if out_json.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let text = match read_str(text) {
            Ok(s) => s,
            Err(code) => return code as i32,
        };
        write_json(out_json, Ok(parse_transcript(&text)))
    }
}
