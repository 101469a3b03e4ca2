// 병합 - 여러 클립을 이어 붙임 (스트림 복사)
// 트랙 포맷은 첫 클립 기준, 다음 클립은 앞 클립 끝 시각만큼 밀어서 기록

use crate::error::{EngineError, EngineResult};
use crate::ffmpeg::extractor::SampleSource;
use crate::ffmpeg::muxer::SampleSink;
use crate::ffmpeg::track::find_track;
use crate::processing::trim::{copy_track, CopyStats, TrimWindow};
use log::{info, warn};

pub fn merge<S, K>(sources: &mut [S], sink: &mut K) -> EngineResult<CopyStats>
where
    S: SampleSource,
    K: SampleSink + ?Sized,
{
    if sources.len() < 2 {
        return Err(EngineError::invalid_input(format!(
            "merge needs at least 2 clips, got {}",
            sources.len()
        )));
    }

    let first = sources[0].tracks().to_vec();
    let video_out = sink.add_track(&first[find_track(&first, "video/")?])?;
    let audio_out = find_track(&first, "audio/")
        .ok()
        .map(|pos| sink.add_track(&first[pos]))
        .transpose()?;
    sink.start()?;

    let mut stats = CopyStats::default();
    let mut offset_us = 0i64;

    for (clip, source) in sources.iter_mut().enumerate() {
        let tracks = source.tracks().to_vec();
        let video = &tracks[find_track(&tracks, "video/")?];

        let copied = copy_track(source, sink, video.index, video_out, TrimWindow::full(), offset_us)?;
        stats.video_samples += copied.written;
        let mut clip_end = copied.end_us;

        match (audio_out, find_track(&tracks, "audio/").ok()) {
            (Some(audio_out), Some(pos)) => {
                let copied = copy_track(source, sink, tracks[pos].index, audio_out, TrimWindow::full(), offset_us)?;
                stats.audio_samples += copied.written;
                clip_end = clip_end.max(copied.end_us);
            }
            (Some(_), None) => warn!("[MERGE] clip {} has no audio, leaving a gap", clip),
            _ => {}
        }

        // 빈 클립은 타임라인을 밀지 않음
        offset_us = offset_us.max(clip_end);
        info!("[MERGE] clip {} appended, timeline now {}us", clip, offset_us);
    }

    sink.finish()?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{samples, FakeSource, MemorySink};
    use ffmpeg_next::codec;

    fn clip(frames: usize) -> FakeSource {
        FakeSource::new()
            .with_video(samples(frames, 40_000, 10))
            .with_audio(codec::Id::AAC, samples(frames * 2, 20_000, 1))
    }

    #[test]
    fn clips_are_shifted_by_previous_end() {
        let mut sources = vec![clip(25), clip(50), clip(10)];
        let mut sink = MemorySink::new();
        let stats = merge(&mut sources, &mut sink).unwrap();
        assert_eq!(stats.video_samples, 85);
        assert_eq!(stats.audio_samples, 170);

        let video = sink.track_samples(0);
        // 첫 클립 끝 = 25 * 40ms = 1s
        assert_eq!(video[25].pts_us, 1_000_000);
        assert_eq!(video[75].pts_us, 3_000_000);
        assert!(video.windows(2).all(|w| w[1].pts_us > w[0].pts_us));

        let audio = sink.track_samples(1);
        assert_eq!(audio[50].pts_us, 1_000_000);
        assert!(audio.windows(2).all(|w| w[1].pts_us > w[0].pts_us));
    }

    #[test]
    fn needs_two_clips() {
        let mut sources = vec![clip(5)];
        let mut sink = MemorySink::new();
        assert!(matches!(merge(&mut sources, &mut sink), Err(EngineError::InvalidInput(_))));
        let mut none: Vec<FakeSource> = Vec::new();
        assert!(merge(&mut none, &mut sink).is_err());
    }

    #[test]
    fn clip_without_audio_keeps_timeline() {
        let mut sources = vec![clip(25), FakeSource::new().with_video(samples(25, 40_000, 10)), clip(5)];
        let mut sink = MemorySink::new();
        let stats = merge(&mut sources, &mut sink).unwrap();
        assert_eq!(stats.audio_samples, 60);
        let audio = sink.track_samples(1);
        assert_eq!(audio[50].pts_us, 2_000_000);
    }
}
