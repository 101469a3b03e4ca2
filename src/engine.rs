// 엔진 파사드 - URI 기반 스테이지 진입점
// 스테이지마다 소스/싱크/코덱을 열어 processing 함수에 연결하고, 출력은 임시 산출물로 장부에 등록
// 스테이지 사이 순서와 정리는 호출자 책임

use crate::config::EngineConfig;
use crate::encoding::audio::FfmpegAudioCodecs;
use crate::encoding::encoder::{EncoderSettings, VideoEncoder};
use crate::error::{EngineError, EngineResult};
use crate::ffmpeg::decoder::FrameExtractor;
use crate::ffmpeg::extractor::{Extractor, SampleSource};
use crate::ffmpeg::metadata::{inspect, VideoMetadata};
use crate::ffmpeg::muxer::{Muxer, SampleSink};
use crate::ffmpeg::track::find_track;
use crate::overlay::OverlayConfig;
use crate::processing::composite::{composite_video, FrameGrid};
use crate::processing::thumbnail::{thumbnail_size, thumbnail_times, write_thumbnails};
use crate::processing::trim::{copy_track, TrimWindow};
use crate::processing::{add_audio, merge, remove_audio, trim};
use crate::rendering::{FontFace, OverlayRenderer};
use crate::storage::ledger::check;
use crate::storage::publish::copy_to_public;
use crate::storage::{file_uri, resolve_path, ArtifactLedger, ArtifactStatus, CleanupReport, ContentResolver};
use crate::transcription;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

pub struct Engine {
    config: EngineConfig,
    ledger: Mutex<ArtifactLedger>,
    resolver: RwLock<Option<Arc<dyn ContentResolver>>>,
}

impl Engine {
    pub fn new(mut config: EngineConfig) -> Self {
        // 장부 경로와 출력 URI가 같은 절대 경로를 가리키도록
        for dir in [&mut config.temp_dir, &mut config.public_dir] {
            if let Ok(absolute) = std::path::absolute(&*dir) {
                *dir = absolute;
            }
        }
        info!(
            "[ENGINE] temp={}, public={}",
            config.temp_dir.display(),
            config.public_dir.display()
        );
        Self {
            config,
            ledger: Mutex::new(ArtifactLedger::new()),
            resolver: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// content:// URI 리졸버 등록 (기존 리졸버 대체)
    pub fn set_resolver(&self, resolver: Arc<dyn ContentResolver>) {
        if let Ok(mut slot) = self.resolver.write() {
            *slot = Some(resolver);
        }
    }

    pub fn resolver(&self) -> Option<Arc<dyn ContentResolver>> {
        self.resolver.read().ok()?.clone()
    }

    /// URI → 읽을 수 있는 로컬 경로
    fn source_path(&self, uri: &str) -> EngineResult<PathBuf> {
        let resolver = self.resolver();
        let path = resolve_path(uri, resolver.as_deref())?;
        if !path.is_file() {
            return Err(EngineError::unreadable(uri, "file does not exist"));
        }
        Ok(path)
    }

    /// temp_dir에 새 산출물 경로 생성 + 장부 등록
    /// 실패한 스테이지의 부분 출력도 장부로 정리할 수 있도록 미리 등록
    fn temp_output(&self, prefix: &str, suffix: &str) -> EngineResult<PathBuf> {
        std::fs::create_dir_all(&self.config.temp_dir)?;
        let (_, path) = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(&self.config.temp_dir)?
            .keep()
            .map_err(|e| e.error)?;
        self.register(&path);
        Ok(path)
    }

    fn register(&self, path: &Path) {
        match self.ledger.lock() {
            Ok(mut ledger) => {
                ledger.register(path);
            }
            Err(_) => warn!("[ENGINE] ledger poisoned, {} not tracked", path.display()),
        }
    }

    fn with_ledger<T>(&self, f: impl FnOnce(&mut ArtifactLedger) -> T) -> EngineResult<T> {
        let mut ledger = self
            .ledger
            .lock()
            .map_err(|_| EngineError::invalid_input("artifact ledger poisoned"))?;
        Ok(f(&mut ledger))
    }

    // ── 스테이지 ──────────────────────────────────────────

    pub fn metadata(&self, uri: &str) -> EngineResult<VideoMetadata> {
        let path = self.source_path(uri)?;
        inspect(&path)
    }

    /// [start_ms, end_ms] 구간만 남기고 0부터 시작하도록 당김
    pub fn trim(&self, uri: &str, start_ms: i64, end_ms: i64) -> EngineResult<String> {
        let window = TrimWindow::from_millis(start_ms, end_ms)?;
        let path = self.source_path(uri)?;
        let out = self.temp_output("temp_trim_", ".mp4")?;

        let mut source = Extractor::open(&path)?;
        let mut sink = Muxer::create(&out)?;
        let stats = trim(&mut source, &mut sink, window)?;

        info!(
            "[ENGINE] trim {}..{}ms: {} video, {} audio samples",
            start_ms, end_ms, stats.video_samples, stats.audio_samples
        );
        file_uri(&out)
    }

    pub fn remove_audio(&self, uri: &str) -> EngineResult<String> {
        let path = self.source_path(uri)?;
        let out = self.temp_output("temp_mute_", ".mp4")?;

        let mut source = Extractor::open(&path)?;
        let mut sink = Muxer::create(&out)?;
        let stats = remove_audio(&mut source, &mut sink)?;

        info!("[ENGINE] mute: {} video samples", stats.video_samples);
        file_uri(&out)
    }

    pub fn add_audio(&self, video_uri: &str, audio_uri: &str) -> EngineResult<String> {
        let video_path = self.source_path(video_uri)?;
        let audio_path = self.source_path(audio_uri)?;
        let out = self.temp_output("temp_audio_", ".mp4")?;

        let mut video_source = Extractor::open(&video_path)?;
        let mut audio_source = Extractor::open(&audio_path)?;
        let mut sink = Muxer::create(&out)?;
        let mut codecs = FfmpegAudioCodecs {
            bit_rate: self.config.audio_bitrate,
        };
        let stats = add_audio(
            &mut video_source,
            &mut audio_source,
            &mut sink,
            &mut codecs,
            &self.config.pump_config(),
        )?;

        info!(
            "[ENGINE] add audio ({:?}): {} video, {} audio samples",
            stats.path, stats.video_samples, stats.audio_samples
        );
        file_uri(&out)
    }

    /// 오버레이를 프레임에 굽고 재인코딩. 오디오 트랙은 그대로 복사
    pub fn add_overlay(&self, uri: &str, overlay_json: &str, on_progress: &mut dyn FnMut(f32)) -> EngineResult<String> {
        let overlays = OverlayConfig::parse(overlay_json)?;
        let path = self.source_path(uri)?;
        let meta = inspect(&path)?;
        let (width, height) = meta.even_dimensions();

        let settings = EncoderSettings {
            width,
            height,
            frame_rate: meta.frame_rate,
            bit_rate: meta.bit_rate.max(self.config.min_video_bitrate),
            keyframe_interval_secs: self.config.keyframe_interval_secs,
        };
        let mut encoder = VideoEncoder::open(&settings, &self.config.video_encoders)?;
        let mut frames = FrameExtractor::open(&path, width, height)?;
        let font = FontFace::load(self.config.font_path.as_deref())?;
        let mut renderer = OverlayRenderer::new(font, self.resolver());

        // 오디오 복사용 별도 리더 (프레임 추출 핸들과 공유하지 않음)
        let mut source = Extractor::open(&path)?;
        let tracks = source.tracks().to_vec();
        let audio = find_track(&tracks, "audio/").ok().map(|pos| tracks[pos].clone());

        let out = self.temp_output("temp_overlay_", ".mp4")?;
        let mut sink = Muxer::create(&out)?;
        let video_track = sink.add_track(&encoder.output_format())?;
        let audio_track = audio.as_ref().map(|a| sink.add_track(a)).transpose()?;
        sink.start()?;

        let grid = FrameGrid {
            width,
            height,
            frame_duration_us: meta.frame_duration_us(),
            total_frames: meta.total_frames(),
        };
        let stats = composite_video(
            &mut frames,
            &mut encoder,
            &mut sink,
            video_track,
            &grid,
            &overlays,
            &mut renderer,
            &self.config.pump_config(),
            on_progress,
        )?;

        if let (Some(audio), Some(audio_track)) = (audio, audio_track) {
            let copied = copy_track(&mut source, &mut sink, audio.index, audio_track, TrimWindow::full(), 0)?;
            info!("[ENGINE] overlay: {} audio samples copied", copied.written);
        }
        sink.finish()?;

        info!(
            "[ENGINE] overlay ({}): {} frames encoded, {} skipped",
            encoder.codec_name(),
            stats.samples_written,
            stats.state.skipped
        );
        file_uri(&out)
    }

    pub fn merge(&self, uris: &[String]) -> EngineResult<String> {
        if uris.len() < 2 {
            return Err(EngineError::invalid_input(format!(
                "merge needs at least 2 clips, got {}",
                uris.len()
            )));
        }
        let mut sources = uris
            .iter()
            .map(|uri| self.source_path(uri).and_then(|p| Extractor::open(&p)))
            .collect::<EngineResult<Vec<_>>>()?;

        let out = self.temp_output("temp_merge_", ".mp4")?;
        let mut sink = Muxer::create(&out)?;
        let stats = merge(&mut sources, &mut sink)?;

        info!(
            "[ENGINE] merged {} clips: {} video, {} audio samples",
            uris.len(),
            stats.video_samples,
            stats.audio_samples
        );
        file_uri(&out)
    }

    /// 일정 간격 썸네일 (JPEG 임시 산출물)
    pub fn thumbnails(&self, uri: &str) -> EngineResult<Vec<String>> {
        let path = self.source_path(uri)?;
        let meta = inspect(&path)?;
        let times = thumbnail_times(meta.duration_ms * 1000, self.config.thumbnail_count)?;
        let (width, height) = thumbnail_size(meta.width, meta.height, self.config.thumbnail_width);

        let mut frames = FrameExtractor::open(&path, width, height)?;
        let paths = write_thumbnails(&times, |t| frames.extract_sync_frame(t), &self.config.temp_dir)?;
        for path in &paths {
            self.register(path);
        }

        info!("[ENGINE] {} thumbnails at {}x{}", paths.len(), width, height);
        paths.iter().map(|p| file_uri(p)).collect()
    }

    /// 음성 인식기 입력 WAV (mono, speech_sample_rate)
    pub fn extract_speech_audio(&self, uri: &str) -> EngineResult<String> {
        let path = self.source_path(uri)?;
        let out = self.temp_output("speech_", ".wav")?;
        let speech = transcription::extract_speech_audio(
            &path,
            &out,
            self.config.speech_sample_rate,
            &self.config.pump_config(),
        )?;
        file_uri(&speech.path)
    }

    /// 임시 산출물을 공개 위치로 복사 (임시 파일은 장부에 남음)
    pub fn finalize(&self, temp_uri: &str, name: Option<&str>) -> EngineResult<String> {
        let resolver = self.resolver();
        let temp = resolve_path(temp_uri, resolver.as_deref())?;
        let public = copy_to_public(&temp, &self.config.public_dir, &self.config.app_prefix, name)?;
        file_uri(&public)
    }

    // ── 장부 ──────────────────────────────────────────────

    /// 등록된 산출물 URI (생성 순서)
    pub fn artifacts(&self) -> EngineResult<Vec<String>> {
        self.with_ledger(|ledger| {
            ledger
                .entries()
                .iter()
                .map(|p| file_uri(p))
                .collect::<EngineResult<Vec<_>>>()
        })?
    }

    pub fn delete_one(&self, uri: &str) -> EngineResult<bool> {
        let resolver = self.resolver();
        self.with_ledger(|ledger| ledger.delete_one(uri, resolver.as_deref()))
    }

    pub fn delete_all(&self, uris: &[String]) -> EngineResult<CleanupReport> {
        let resolver = self.resolver();
        self.with_ledger(|ledger| ledger.delete_all(uris, resolver.as_deref()))
    }

    pub fn release_all(&self) -> EngineResult<CleanupReport> {
        self.with_ledger(|ledger| ledger.release_all())
    }

    pub fn check(&self, uri: &str) -> EngineResult<ArtifactStatus> {
        let resolver = self.resolver();
        let path = resolve_path(uri, resolver.as_deref())?;
        Ok(check(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(dir: &Path) -> Engine {
        Engine::new(EngineConfig {
            temp_dir: dir.join("cache"),
            public_dir: dir.join("Movies/Clipo"),
            ..EngineConfig::default()
        })
    }

    struct MapResolver(PathBuf);

    impl ContentResolver for MapResolver {
        fn resolve(&self, uri: &str) -> Option<PathBuf> {
            uri.strip_prefix("content://media/").map(|name| self.0.join(name))
        }
    }

    #[test]
    fn temp_outputs_are_registered_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let a = engine.temp_output("temp_trim_", ".mp4").unwrap();
        let b = engine.temp_output("temp_overlay_", ".mp4").unwrap();
        assert!(a.exists() && b.exists());

        let artifacts = engine.artifacts().unwrap();
        assert_eq!(artifacts, vec![file_uri(&a).unwrap(), file_uri(&b).unwrap()]);

        let report = engine.release_all().unwrap();
        assert_eq!(report.deleted_count, 2);
        assert!(!a.exists());
        assert!(engine.artifacts().unwrap().is_empty());
    }

    #[test]
    fn missing_source_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let uri = file_uri(&dir.path().join("nope.mp4")).unwrap();
        assert!(matches!(engine.trim(&uri, 0, 1000), Err(EngineError::SourceUnreadable { .. })));
        assert!(matches!(engine.metadata(&uri), Err(EngineError::SourceUnreadable { .. })));
    }

    #[test]
    fn invalid_requests_fail_before_opening_sources() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        assert!(matches!(engine.trim("file:///x.mp4", 500, 500), Err(EngineError::InvalidInput(_))));
        assert!(matches!(
            engine.merge(&["file:///x.mp4".to_string()]),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.add_overlay("file:///x.mp4", "{ not json", &mut |_| {}),
            Err(EngineError::InvalidOverlay(_))
        ));
        // 아무 산출물도 만들지 않음
        assert!(engine.artifacts().unwrap().is_empty());
    }

    #[test]
    fn content_uris_need_a_resolver() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let clip = dir.path().join("clip.mp4");
        std::fs::write(&clip, b"data").unwrap();

        assert!(matches!(engine.check("content://media/clip.mp4"), Err(EngineError::UnsupportedUri(_))));

        engine.set_resolver(Arc::new(MapResolver(dir.path().to_path_buf())));
        let status = engine.check("content://media/clip.mp4").unwrap();
        assert!(status.exists);
        assert_eq!(status.size, 4);
        assert!(engine.delete_one("content://media/clip.mp4").unwrap());
        assert!(!engine.delete_one("content://media/clip.mp4").unwrap());
    }

    #[test]
    fn finalize_copies_into_public_dir() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let temp = engine.temp_output("temp_overlay_", ".mp4").unwrap();
        std::fs::write(&temp, b"mp4").unwrap();

        let public = engine.finalize(&file_uri(&temp).unwrap(), Some("final")).unwrap();
        let public_path = resolve_path(&public, None).unwrap();
        assert!(public_path.starts_with(dir.path().join("Movies/Clipo")));
        assert!(temp.exists());
        assert_eq!(engine.artifacts().unwrap().len(), 1);
    }

    #[test]
    fn public_names_with_reserved_characters_resolve_back() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let temp = engine.temp_output("temp_trim_", ".mp4").unwrap();
        std::fs::write(&temp, b"mp4").unwrap();

        let public = engine.finalize(&file_uri(&temp).unwrap(), Some("take #2 50%")).unwrap();
        let status = engine.check(&public).unwrap();
        assert!(status.exists);
        assert!(status.path.to_string_lossy().contains("take #2 50%"));
        assert!(engine.delete_one(&public).unwrap());
    }

    #[test]
    fn artifact_uris_match_ledger_entries() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let temp = engine.temp_output("temp_mute_", ".mp4").unwrap();
        assert!(temp.is_absolute());

        let uri = engine.artifacts().unwrap().remove(0);
        assert_eq!(resolve_path(&uri, None).unwrap(), temp);
        assert!(engine.delete_one(&uri).unwrap());
        assert!(engine.artifacts().unwrap().is_empty());
    }

    #[test]
    #[ignore] // 실제 비디오 파일 필요
    fn chained_pipeline_on_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let source = file_uri(Path::new("test.mp4")).unwrap();

        let muted = engine.remove_audio(&source).unwrap();
        let trimmed = engine.trim(&muted, 500, 2500).unwrap();
        let overlays = r##"{ "textOverlays": [ { "text": "Hello", "startTimeMs": 0, "endTimeMs": 1000,
            "x": 40, "y": 80, "fontSize": 48, "color": "#FFFFFF" } ] }"##;
        let overlaid = engine.add_overlay(&trimmed, overlays, &mut |_| {}).unwrap();

        let meta = engine.metadata(&overlaid).unwrap();
        assert!(meta.duration_ms > 1500 && meta.duration_ms < 2600);
        assert!(!meta.has_audio);

        let report = engine.release_all().unwrap();
        assert_eq!(report.total, 3);
    }
}
