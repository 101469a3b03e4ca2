// 프레임 합성 파이프라인
// 프레임 추출 → (활성 오버레이가 있을 때만) 합성 → NV12 변환 → 인코더 → 먹서
// 추출 실패는 해당 프레임만 건너뛰고, 연속 실패가 상한에 닿으면 스테이지 중단

use crate::encoding::encoder::EncoderInput;
use crate::encoding::pump::{pump, CodecPort, Produce, PumpConfig};
use crate::error::{EngineError, EngineResult};
use crate::ffmpeg::decoder::FrameSource;
use crate::ffmpeg::extractor::Sample;
use crate::ffmpeg::muxer::SampleSink;
use crate::overlay::OverlayConfig;
use crate::rendering::color::rgb_to_nv12;
use crate::rendering::compositor::OverlayRenderer;
use log::{debug, info, warn};

/// 진행률 로그 간격 (프레임)
const PROGRESS_LOG_INTERVAL: i64 = 30;

/// 출력 프레임 격자
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGrid {
    pub width: u32,
    pub height: u32,
    pub frame_duration_us: i64,
    pub total_frames: i64,
}

impl FrameGrid {
    pub fn time_of(&self, frame_index: i64) -> i64 {
        frame_index * self.frame_duration_us
    }

    fn nv12_len(&self) -> usize {
        self.width as usize * self.height as usize * 3 / 2
    }
}

/// 입력 측 루프 상태
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeState {
    pub frame_index: i64,
    /// 오버레이를 그린 프레임
    pub composited: u64,
    /// 오버레이 없이 그대로 넘긴 프레임
    pub passthrough: u64,
    /// 추출 실패로 건너뛴 프레임
    pub skipped: u64,
}

/// 다음 인코더 입력 한 개 생산 (펌프의 producer 한 스텝)
pub fn next_input<F>(
    state: &mut CompositeState,
    grid: &FrameGrid,
    frames: &mut F,
    overlays: &OverlayConfig,
    renderer: &mut OverlayRenderer,
) -> EngineResult<Produce<EncoderInput>>
where
    F: FrameSource + ?Sized,
{
    if state.frame_index >= grid.total_frames {
        return Ok(Produce::EndOfStream);
    }

    let time_us = grid.time_of(state.frame_index);
    // 성공/실패와 무관하게 다음 프레임으로 진행 (멈추지 않음)
    state.frame_index += 1;

    let mut frame = match frames.extract_frame(time_us) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("[COMPOSITE] frame at {}us skipped: {}", time_us, e);
            state.skipped += 1;
            return Ok(Produce::Skip);
        }
    };

    let t_ms = time_us / 1000;
    if overlays.has_active_at(t_ms) {
        renderer.render(&mut frame, overlays, t_ms)?;
        state.composited += 1;
    } else {
        state.passthrough += 1;
    }

    let nv12 = rgb_to_nv12(&frame)?;
    if nv12.len() != grid.nv12_len() {
        return Err(EngineError::BufferSizeMismatch {
            expected: grid.nv12_len(),
            actual: nv12.len(),
        });
    }

    Ok(Produce::Item(EncoderInput { nv12, pts_us: time_us }))
}

/// 합성 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeStats {
    pub state: CompositeState,
    pub samples_written: u64,
}

/// 합성 루프 실행. 인코더 출력은 sink의 video_track에 기록
/// sink는 이미 start된 상태여야 함. 기록된 샘플이 없으면 EmptyTrack
#[allow(clippy::too_many_arguments)]
pub fn composite_video<F, C, K>(
    frames: &mut F,
    encoder: &mut C,
    sink: &mut K,
    video_track: usize,
    grid: &FrameGrid,
    overlays: &OverlayConfig,
    renderer: &mut OverlayRenderer,
    config: &PumpConfig,
    on_progress: &mut dyn FnMut(f32),
) -> EngineResult<CompositeStats>
where
    F: FrameSource + ?Sized,
    C: CodecPort<Input = EncoderInput, Output = Sample>,
    K: SampleSink + ?Sized,
{
    info!(
        "[COMPOSITE] {}x{}, {} frames @ {}us",
        grid.width, grid.height, grid.total_frames, grid.frame_duration_us
    );

    let mut state = CompositeState::default();
    let mut written = 0u64;
    let total = grid.total_frames.max(1);

    let stats = pump(
        encoder,
        config,
        || {
            let produced = next_input(&mut state, grid, &mut *frames, overlays, &mut *renderer)?;
            if state.frame_index % PROGRESS_LOG_INTERVAL == 0 {
                debug!("[COMPOSITE] {}/{} frames", state.frame_index, grid.total_frames);
            }
            on_progress(state.frame_index as f32 / total as f32);
            Ok(produced)
        },
        |sample| {
            sink.write_sample(video_track, &sample)?;
            written += 1;
            Ok(())
        },
    )?;

    info!(
        "[COMPOSITE] done: {} encoded, {} composited, {} passthrough, {} skipped",
        stats.emitted, state.composited, state.passthrough, state.skipped
    );
    if written == 0 {
        return Err(EngineError::EmptyTrack { track: "video" });
    }
    Ok(CompositeStats {
        state,
        samples_written: written,
    })
}
