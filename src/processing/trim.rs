// 트림 / 트랙 복사
// [start, end] 구간 샘플만 복사하고 start만큼 당겨 0부터 시작하게 함

use crate::error::{EngineError, EngineResult};
use crate::ffmpeg::extractor::SampleSource;
use crate::ffmpeg::muxer::SampleSink;
use crate::ffmpeg::track::find_track;
use log::{debug, info, warn};

/// 닫힌 구간 [start_us, end_us]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimWindow {
    pub start_us: i64,
    pub end_us: i64,
}

impl TrimWindow {
    /// 0 ≤ start < end 검사
    pub fn new(start_us: i64, end_us: i64) -> EngineResult<Self> {
        if start_us < 0 || start_us >= end_us {
            return Err(EngineError::invalid_input(format!(
                "trim window must satisfy 0 <= start < end (got {}..{}us)",
                start_us, end_us
            )));
        }
        Ok(Self { start_us, end_us })
    }

    /// 전체 길이 (뮤트/스트림 복사용)
    pub fn full() -> Self {
        Self {
            start_us: 0,
            end_us: i64::MAX,
        }
    }

    pub fn from_millis(start_ms: i64, end_ms: i64) -> EngineResult<Self> {
        Self::new(start_ms.saturating_mul(1000), end_ms.saturating_mul(1000))
    }
}

/// 트랙별 기록 샘플 수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub video_samples: u64,
    pub audio_samples: u64,
}

/// 트랙 복사 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackCopy {
    pub written: u64,
    /// 출력 타임라인 기준 마지막 샘플 끝 (max(pts + duration))
    pub end_us: i64,
}

/// 소스 트랙 하나를 구간 제한 + 타임스탬프 재기준으로 싱크 트랙에 복사
/// source_track은 컨테이너 스트림 인덱스, offset_us는 출력 타임라인 시작 위치
pub fn copy_track<S, K>(
    source: &mut S,
    sink: &mut K,
    source_track: usize,
    sink_track: usize,
    window: TrimWindow,
    offset_us: i64,
) -> EngineResult<TrackCopy>
where
    S: SampleSource + ?Sized,
    K: SampleSink + ?Sized,
{
    source.select_track(source_track)?;
    // 디코더는 싱크 포인트에서만 깔끔하게 재개됨
    source.seek_to_sync(window.start_us)?;

    let mut copy = TrackCopy::default();
    let mut discarded = 0u64;
    while let Some(sample) = source.read_sample()? {
        if sample.pts_us < window.start_us {
            discarded += 1;
            continue;
        }
        if sample.pts_us > window.end_us {
            break;
        }
        let sample = sample.rebased(window.start_us - offset_us);
        sink.write_sample(sink_track, &sample)?;
        copy.written += 1;
        copy.end_us = copy.end_us.max(sample.pts_us + sample.duration_us);
    }

    debug!(
        "[TRIM] track {} → {}: {} written, {} before window",
        source_track, sink_track, copy.written, discarded
    );
    Ok(copy)
}

/// 구간 잘라내기: 비디오 필수, 오디오는 있으면 함께
pub fn trim<S, K>(source: &mut S, sink: &mut K, window: TrimWindow) -> EngineResult<CopyStats>
where
    S: SampleSource + ?Sized,
    K: SampleSink + ?Sized,
{
    copy_tracks(source, sink, window, true)
}

/// 오디오 제거: 비디오 트랙만 전체 구간 복사
pub fn remove_audio<S, K>(source: &mut S, sink: &mut K) -> EngineResult<CopyStats>
where
    S: SampleSource + ?Sized,
    K: SampleSink + ?Sized,
{
    copy_tracks(source, sink, TrimWindow::full(), false)
}

fn copy_tracks<S, K>(source: &mut S, sink: &mut K, window: TrimWindow, with_audio: bool) -> EngineResult<CopyStats>
where
    S: SampleSource + ?Sized,
    K: SampleSink + ?Sized,
{
    let tracks = source.tracks().to_vec();
    let video = &tracks[find_track(&tracks, "video/")?];
    let audio = if with_audio {
        find_track(&tracks, "audio/").ok().map(|pos| &tracks[pos])
    } else {
        None
    };

    // 모든 트랙 등록 후 start
    let video_out = sink.add_track(video)?;
    let audio_out = audio.map(|a| sink.add_track(a)).transpose()?;
    sink.start()?;

    let mut stats = CopyStats {
        video_samples: copy_track(source, sink, video.index, video_out, window, 0)?.written,
        audio_samples: 0,
    };
    if stats.video_samples == 0 {
        return Err(EngineError::EmptyTrack { track: "video" });
    }

    if let (Some(audio), Some(audio_out)) = (audio, audio_out) {
        stats.audio_samples = copy_track(source, sink, audio.index, audio_out, window, 0)?.written;
        if stats.audio_samples == 0 {
            // 오디오는 선택 트랙이라 스테이지 실패로 보지 않음
            warn!("[TRIM] no audio samples in window {:?}", window);
        }
    }

    sink.finish()?;
    info!(
        "[TRIM] done: {} video / {} audio samples",
        stats.video_samples, stats.audio_samples
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffmpeg::extractor::Sample;
    use crate::ffmpeg::muxer::WriterState;
    use crate::testing::{samples, FakeSource, MemorySink};
    use ffmpeg_next::codec;

    const FRAME_US: i64 = 33_333;

    fn source() -> FakeSource {
        // 비디오 300프레임(10초), 30프레임마다 키프레임 / 오디오 ~23ms 간격
        FakeSource::new()
            .with_video(samples(300, FRAME_US, 30))
            .with_audio(codec::Id::AAC, samples(430, 23_220, 1))
    }

    #[test]
    fn window_validation() {
        assert!(TrimWindow::new(0, 1).is_ok());
        assert!(TrimWindow::new(-1, 10).is_err());
        assert!(TrimWindow::new(10, 10).is_err());
        assert!(TrimWindow::new(20, 10).is_err());
        assert_eq!(TrimWindow::from_millis(1500, 3000).unwrap().start_us, 1_500_000);
    }

    #[test]
    fn trimmed_samples_lie_in_rebased_window() {
        let windows = [(0, 1_000_000), (1_234_567, 4_000_000), (2_000_000, 2_100_000), (9_000_000, 20_000_000)];
        for (start, end) in windows {
            let mut src = source();
            let mut sink = MemorySink::new();
            let window = TrimWindow::new(start, end).unwrap();
            trim(&mut src, &mut sink, window).unwrap();

            let span = end - start;
            let video = sink.track_samples(0);
            assert!(!video.is_empty());
            for s in &video {
                assert!(s.pts_us >= 0 && s.pts_us <= span, "{} outside [0, {}]", s.pts_us, span);
            }
            // 첫 샘플은 싱크 간격(30프레임) 이내
            assert!(video[0].pts_us < 30 * FRAME_US);
            for s in sink.track_samples(1) {
                assert!(s.pts_us >= 0 && s.pts_us <= span);
            }
            // 키프레임 시킹
            assert_eq!(src.seeks, vec![start, start]);
        }
    }

    #[test]
    fn trim_preserves_sync_flags() {
        let mut src = source();
        let mut sink = MemorySink::new();
        trim(&mut src, &mut sink, TrimWindow::new(1_000_000, 3_000_000).unwrap()).unwrap();
        // 원본 프레임 30은 pts 999_990 < 1s라 제외, 60과 90은 키프레임
        let video = sink.track_samples(0);
        let keyframes: Vec<i64> = video.iter().filter(|s| s.is_sync).map(|s| s.pts_us).collect();
        assert_eq!(keyframes, vec![60 * FRAME_US - 1_000_000, 90 * FRAME_US - 1_000_000]);
        assert_eq!(sink.state, WriterState::Finished);
    }

    /// 디코드 순서 I P B B P B B (pts는 표시 순서, dts는 증가)
    fn reordered_gop() -> Vec<Sample> {
        [0, 120_000, 40_000, 80_000, 240_000, 160_000, 200_000]
            .iter()
            .enumerate()
            .map(|(i, &pts)| Sample {
                data: vec![i as u8; 4],
                pts_us: pts,
                dts_us: i as i64 * 40_000 - 40_000,
                duration_us: 40_000,
                is_sync: i == 0,
            })
            .collect()
    }

    fn copy_reordered(window: TrimWindow) -> Vec<i64> {
        let mut src = FakeSource::new().with_video(reordered_gop());
        let mut sink = MemorySink::new();
        let track = sink.add_track(&src.tracks()[0].clone()).unwrap();
        sink.start().unwrap();
        copy_track(&mut src, &mut sink, 0, track, window, 0).unwrap();
        sink.track_samples(track).iter().map(|s| s.pts_us).collect()
    }

    #[test]
    fn reordered_samples_stop_at_first_pts_past_end() {
        // pts 240ms가 나오는 순간 종료: 뒤따르는 160/200ms B 프레임도 쓰지 않음
        let window = TrimWindow::new(0, 200_000).unwrap();
        assert_eq!(copy_reordered(window), vec![0, 120_000, 40_000, 80_000]);
    }

    #[test]
    fn reordered_samples_before_start_are_skipped_not_fatal() {
        // 40ms는 시작 전이라 버리되 읽기는 계속, 결과는 시작 기준으로 당김
        let window = TrimWindow::new(50_000, 200_000).unwrap();
        assert_eq!(copy_reordered(window), vec![70_000, 30_000]);
    }

    #[test]
    fn window_past_the_end_is_empty_video() {
        let mut src = source();
        let mut sink = MemorySink::new();
        let result = trim(&mut src, &mut sink, TrimWindow::new(60_000_000, 70_000_000).unwrap());
        assert!(matches!(result, Err(EngineError::EmptyTrack { track: "video" })));
    }

    #[test]
    fn missing_audio_is_optional() {
        let mut src = FakeSource::new().with_video(samples(30, FRAME_US, 10));
        let mut sink = MemorySink::new();
        let stats = trim(&mut src, &mut sink, TrimWindow::new(0, 500_000).unwrap()).unwrap();
        assert_eq!(stats.audio_samples, 0);
        assert_eq!(sink.tracks.len(), 1);
    }

    #[test]
    fn missing_video_is_fatal() {
        let mut src = FakeSource::new().with_audio(codec::Id::AAC, samples(10, 23_220, 1));
        let mut sink = MemorySink::new();
        let result = trim(&mut src, &mut sink, TrimWindow::full());
        assert!(matches!(result, Err(EngineError::TrackNotFound { kind: "video" })));
    }

    #[test]
    fn mute_copies_video_only_for_full_duration() {
        let mut src = source();
        let mut sink = MemorySink::new();
        let stats = remove_audio(&mut src, &mut sink).unwrap();
        assert_eq!(stats.video_samples, 300);
        assert_eq!(stats.audio_samples, 0);
        assert_eq!(sink.tracks.len(), 1);
        assert!(sink.tracks[0].is_video());
        assert_eq!(sink.track_samples(0).last().unwrap().pts_us, 299 * FRAME_US);
    }
}
