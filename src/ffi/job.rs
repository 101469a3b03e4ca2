// Stage Job FFI - 스테이지를 백그라운드에서 실행하고 폴링으로 상태 확인
// 작업 결과는 출력 URI (썸네일은 URI 배열 JSON)
// 취소 없음: 시작된 스테이지는 완료/실패까지 실행

use crate::engine::Engine;
use crate::error::EngineResult;
use crate::ffi::engine::engine_arc;
use crate::ffi::types::{read_str, write_string, ErrorCode};
use crate::job::{Progress, StageJob};
use std::ffi::{c_char, c_void};

/// 공통 시작 경로: 엔진 참조를 작업 스레드로 넘기고 StageJob 핸들 반환
unsafe fn start_stage<F>(engine: *mut c_void, name: &str, out_job: *mut *mut c_void, stage: F) -> i32
where
    F: FnOnce(&Engine, &Progress) -> EngineResult<String> + Send + 'static,
{
    let engine = engine_arc(engine);
    let job = StageJob::start(name, move |progress| stage(&engine, progress));
    *out_job = Box::into_raw(Box::new(job)) as *mut c_void;
    ErrorCode::Success as i32
}

/// 구간 잘라내기
#[no_mangle]
pub extern "C" fn stage_trim(
    engine: *mut c_void,
    uri: *const c_char,
    start_ms: i64,
    end_ms: i64,
    out_job: *mut *mut c_void,
) -> i32 {
    if engine.is_null() || out_job.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let uri = match read_str(uri) {
            Ok(s) => s,
            Err(code) => return code as i32,
        };
        start_stage(engine, "trim", out_job, move |engine, _| engine.trim(&uri, start_ms, end_ms))
    }
}

/// 오디오 제거
#[no_mangle]
pub extern "C" fn stage_remove_audio(engine: *mut c_void, uri: *const c_char, out_job: *mut *mut c_void) -> i32 {
    if engine.is_null() || out_job.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let uri = match read_str(uri) {
            Ok(s) => s,
            Err(code) => return code as i32,
        };
        start_stage(engine, "remove_audio", out_job, move |engine, _| engine.remove_audio(&uri))
    }
}

/// 다른 소스의 오디오 붙이기
#[no_mangle]
pub extern "C" fn stage_add_audio(
    engine: *mut c_void,
    video_uri: *const c_char,
    audio_uri: *const c_char,
    out_job: *mut *mut c_void,
) -> i32 {
    if engine.is_null() || out_job.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let (video_uri, audio_uri) = match (read_str(video_uri), read_str(audio_uri)) {
            (Ok(v), Ok(a)) => (v, a),
            (Err(code), _) | (_, Err(code)) => return code as i32,
        };
        start_stage(engine, "add_audio", out_job, move |engine, _| {
            engine.add_audio(&video_uri, &audio_uri)
        })
    }
}

/// 오버레이 합성 (overlay_json: OverlayConfig 문서)
#[no_mangle]
pub extern "C" fn stage_add_overlay(
    engine: *mut c_void,
    uri: *const c_char,
    overlay_json: *const c_char,
    out_job: *mut *mut c_void,
) -> i32 {
    if engine.is_null() || out_job.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let (uri, overlay_json) = match (read_str(uri), read_str(overlay_json)) {
            (Ok(u), Ok(o)) => (u, o),
            (Err(code), _) | (_, Err(code)) => return code as i32,
        };
        start_stage(engine, "add_overlay", out_job, move |engine, progress| {
            engine.add_overlay(&uri, &overlay_json, &mut |p| progress.set(p))
        })
    }
}

/// 클립 이어붙이기 (uris_json: URI 문자열 배열)
#[no_mangle]
pub extern "C" fn stage_merge(engine: *mut c_void, uris_json: *const c_char, out_job: *mut *mut c_void) -> i32 {
    if engine.is_null() || out_job.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let uris: Vec<String> = match read_str(uris_json).map(|s| serde_json::from_str(&s)) {
            Ok(Ok(list)) => list,
            Ok(Err(_)) => return ErrorCode::InvalidParam as i32,
            Err(code) => return code as i32,
        };
        start_stage(engine, "merge", out_job, move |engine, _| engine.merge(&uris))
    }
}

/// 썸네일 (결과: URI 배열 JSON)
#[no_mangle]
pub extern "C" fn stage_thumbnails(engine: *mut c_void, uri: *const c_char, out_job: *mut *mut c_void) -> i32 {
    if engine.is_null() || out_job.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let uri = match read_str(uri) {
            Ok(s) => s,
            Err(code) => return code as i32,
        };
        start_stage(engine, "thumbnails", out_job, move |engine, _| {
            let uris = engine.thumbnails(&uri)?;
            Ok(serde_json::to_string(&uris)?)
        })
    }
}

/// 음성 인식용 WAV 추출
#[no_mangle]
pub extern "C" fn stage_extract_speech_audio(
    engine: *mut c_void,
    uri: *const c_char,
    out_job: *mut *mut c_void,
) -> i32 {
    if engine.is_null() || out_job.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let uri = match read_str(uri) {
            Ok(s) => s,
            Err(code) => return code as i32,
        };
        start_stage(engine, "extract_speech_audio", out_job, move |engine, _| {
            engine.extract_speech_audio(&uri)
        })
    }
}

/// 진행률 (0~100)
#[no_mangle]
pub extern "C" fn job_get_progress(job: *mut c_void) -> u32 {
    if job.is_null() {
        return 0;
    }

    unsafe {
        let job_ref = &*(job as *const StageJob);
        job_ref.get_progress()
    }
}

/// 반환: 1=완료, 0=진행중
#[no_mangle]
pub extern "C" fn job_is_finished(job: *mut c_void) -> i32 {
    if job.is_null() {
        return 1; // null이면 완료로 처리
    }

    unsafe {
        let job_ref = &*(job as *const StageJob);
        if job_ref.is_finished() { 1 } else { 0 }
    }
}

/// 에러 메시지 (없으면 null). string_free()로 해제
#[no_mangle]
pub extern "C" fn job_get_error(job: *mut c_void, out_error: *mut *mut c_char) -> i32 {
    if job.is_null() || out_error.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let job_ref = &*(job as *const StageJob);
        match job_ref.get_error() {
            Some(msg) => write_string(out_error, msg) as i32,
            None => {
                *out_error = std::ptr::null_mut();
                ErrorCode::Success as i32
            }
        }
    }
}

/// 결과 꺼내기 (한 번만, 없으면 null). string_free()로 해제
#[no_mangle]
pub extern "C" fn job_take_result(job: *mut c_void, out_result: *mut *mut c_char) -> i32 {
    if job.is_null() || out_result.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let job_ref = &*(job as *const StageJob);
        match job_ref.take_result() {
            Some(value) => write_string(out_result, value) as i32,
            None => {
                *out_result = std::ptr::null_mut();
                ErrorCode::Success as i32
            }
        }
    }
}

/// 작업 핸들 해제 (완료 후 호출, 실행 중이면 스레드는 분리되어 계속 실행)
#[no_mangle]
pub extern "C" fn job_destroy(job: *mut c_void) -> i32 {
    if job.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let _ = Box::from_raw(job as *mut StageJob);
    }

    ErrorCode::Success as i32
}
