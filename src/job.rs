// 스테이지 작업 핸들 - 스테이지 하나를 백그라운드 스레드에서 실행
// 호스트는 progress / is_finished / error / take_result를 폴링
// 스테이지 내부에는 취소 지점이 없음 (완료, 실패, 연속 실패 중단 중 하나로 끝남)

use crate::error::EngineResult;
use log::{error, info};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// 스테이지가 진행률을 보고하는 핸들 (0~100)
#[derive(Clone, Default)]
pub struct Progress(Arc<AtomicU32>);

impl Progress {
    /// fraction: 0.0 ~ 1.0
    pub fn set(&self, fraction: f32) {
        let percent = (fraction.clamp(0.0, 1.0) * 100.0) as u32;
        // 완료 전에는 99까지만 (100은 성공 시 job이 기록)
        self.0.store(percent.min(99), Ordering::SeqCst);
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct StageJob {
    name: String,
    progress: Progress,
    finished: Arc<AtomicBool>,
    error: Arc<Mutex<Option<String>>>,
    /// 성공 결과 (출력 URI 또는 JSON)
    result: Arc<Mutex<Option<String>>>,
    handle: Option<JoinHandle<()>>,
}

impl StageJob {
    /// 스테이지 시작 (백그라운드 스레드에서 실행)
    pub fn start<F>(name: &str, stage: F) -> Self
    where
        F: FnOnce(&Progress) -> EngineResult<String> + Send + 'static,
    {
        let progress = Progress::default();
        let finished = Arc::new(AtomicBool::new(false));
        let error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let result: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let p = progress.clone();
        let f = finished.clone();
        let e = error.clone();
        let r = result.clone();
        let label = name.to_string();

        let handle = std::thread::spawn(move || {
            info!("[JOB] {} started", label);
            match stage(&p) {
                Ok(value) => {
                    p.0.store(100, Ordering::SeqCst);
                    if let Ok(mut slot) = r.lock() {
                        *slot = Some(value);
                    }
                    info!("[JOB] {} finished", label);
                }
                Err(err) => {
                    error!("[JOB] {} failed: {}", label, err);
                    if let Ok(mut slot) = e.lock() {
                        *slot = Some(err.to_string());
                    }
                }
            }
            f.store(true, Ordering::SeqCst);
        });

        Self {
            name: name.to_string(),
            progress,
            finished,
            error,
            result,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_progress(&self) -> u32 {
        self.progress.get()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn get_error(&self) -> Option<String> {
        self.error.lock().ok()?.clone()
    }

    /// 결과 꺼내기 (한 번만 반환)
    pub fn take_result(&self) -> Option<String> {
        self.result.lock().ok()?.take()
    }

    /// 스레드 종료까지 대기
    pub fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("[JOB] {} thread panicked", self.name);
                if let Ok(mut slot) = self.error.lock() {
                    slot.get_or_insert_with(|| "stage thread panicked".to_string());
                }
                self.finished.store(true, Ordering::SeqCst);
            }
        }
    }
}
