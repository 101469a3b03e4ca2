// MP4 먹서 - 단일 writer 자원
// 상태: Configuring(add_track) → Started(write_sample) → Finished
// 순서 위반은 복구 불가능한 설정 오류 (MuxerMisconfigured)

use crate::error::{EngineError, EngineResult};
use crate::ffmpeg::extractor::{sample_to_packet, Sample};
use crate::ffmpeg::track::TrackFormat;
use ffmpeg_next as ffmpeg;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// writer 상태 머신
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Configuring,
    Started,
    Finished,
}

impl WriterState {
    /// add_track 허용 여부
    pub fn check_add_track(self) -> EngineResult<()> {
        match self {
            Self::Configuring => Ok(()),
            _ => Err(EngineError::muxer("tracks must be added before start()")),
        }
    }

    pub fn check_start(self) -> EngineResult<()> {
        match self {
            Self::Configuring => Ok(()),
            Self::Started => Err(EngineError::muxer("start() called twice")),
            Self::Finished => Err(EngineError::muxer("start() after finish()")),
        }
    }

    pub fn check_write(self) -> EngineResult<()> {
        match self {
            Self::Started => Ok(()),
            Self::Configuring => Err(EngineError::muxer("sample written before start()")),
            Self::Finished => Err(EngineError::muxer("sample written after finish()")),
        }
    }

    pub fn check_finish(self) -> EngineResult<()> {
        match self {
            Self::Started => Ok(()),
            Self::Configuring => Err(EngineError::muxer("finish() before start()")),
            Self::Finished => Err(EngineError::muxer("finish() called twice")),
        }
    }
}

/// 샘플 싱크 (목적지 컨테이너)
pub trait SampleSink {
    /// 트랙 등록 → 출력 트랙 인덱스
    fn add_track(&mut self, format: &TrackFormat) -> EngineResult<usize>;
    fn start(&mut self) -> EngineResult<()>;
    fn write_sample(&mut self, track: usize, sample: &Sample) -> EngineResult<()>;
    fn finish(&mut self) -> EngineResult<()>;
}

/// ffmpeg MP4 먹서
pub struct Muxer {
    output_ctx: ffmpeg::format::context::Output,
    path: PathBuf,
    state: WriterState,
    written: Vec<u64>,
}

impl Muxer {
    /// MP4 출력 생성 (확장자와 무관하게 mp4 포맷)
    pub fn create(path: &Path) -> EngineResult<Self> {
        ffmpeg::init().map_err(|e| EngineError::ffmpeg("FFmpeg init failed", e))?;

        let output_ctx = ffmpeg::format::output_as(&path, "mp4")
            .map_err(|e| EngineError::ffmpeg(format!("create output {}", path.display()), e))?;

        Ok(Self {
            output_ctx,
            path: path.to_path_buf(),
            state: WriterState::Configuring,
            written: Vec::new(),
        })
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// 트랙별 기록된 샘플 수
    pub fn samples_written(&self, track: usize) -> u64 {
        self.written.get(track).copied().unwrap_or(0)
    }
}

impl SampleSink for Muxer {
    fn add_track(&mut self, format: &TrackFormat) -> EngineResult<usize> {
        self.state.check_add_track()?;

        let params = format.parameters.clone().ok_or_else(|| {
            EngineError::muxer(format!("track {} ({}) has no codec parameters", format.index, format.mime))
        })?;

        // stream copy: 코덱 없이 파라미터만 복사 (remux 패턴)
        let mut stream = self
            .output_ctx
            .add_stream(ffmpeg::encoder::find(ffmpeg::codec::Id::None))
            .map_err(|e| EngineError::ffmpeg("add stream", e))?;
        stream.set_parameters(params);
        // 소스 컨테이너의 codec_tag는 mp4와 맞지 않을 수 있음
        unsafe {
            (*stream.parameters().as_mut_ptr()).codec_tag = 0;
        }
        if format.is_audio() && format.sample_rate > 0 {
            stream.set_time_base(ffmpeg::Rational(1, format.sample_rate as i32));
        } else {
            stream.set_time_base(ffmpeg::Rational(1, 90_000));
        }

        let index = stream.index();
        self.written.push(0);
        debug!("[MUX] track {} ← {}", index, format.mime);
        Ok(index)
    }

    fn start(&mut self) -> EngineResult<()> {
        self.state.check_start()?;
        self.output_ctx
            .write_header()
            .map_err(|e| EngineError::ffmpeg("write header", e))?;
        self.state = WriterState::Started;
        Ok(())
    }

    fn write_sample(&mut self, track: usize, sample: &Sample) -> EngineResult<()> {
        self.state.check_write()?;

        // write_header 이후 먹서가 타임베이스를 바꿀 수 있으므로 매번 조회
        let time_base = self
            .output_ctx
            .stream(track)
            .map(|s| s.time_base())
            .ok_or_else(|| EngineError::muxer(format!("unknown output track {}", track)))?;

        let mut packet = sample_to_packet(sample, time_base);
        packet.set_stream(track);
        packet.set_position(-1);
        // 트랙을 하나씩 순서대로 기록 (interleave 버퍼링 없이 mp4 먹서가 트랙별 인덱스 유지)
        packet
            .write(&mut self.output_ctx)
            .map_err(|e| EngineError::ffmpeg(format!("write sample to track {}", track), e))?;

        if let Some(count) = self.written.get_mut(track) {
            *count += 1;
        }
        Ok(())
    }

    fn finish(&mut self) -> EngineResult<()> {
        self.state.check_finish()?;
        self.state = WriterState::Finished;
        self.output_ctx
            .write_trailer()
            .map_err(|e| EngineError::ffmpeg("write trailer", e))?;
        info!("[MUX] finished {} ({:?} samples)", self.path.display(), self.written);
        Ok(())
    }
}

impl Drop for Muxer {
    /// 에러로 중단된 스테이지도 trailer는 시도 (실패는 로그만)
    fn drop(&mut self) {
        if self.state == WriterState::Started {
            self.state = WriterState::Finished;
            if let Err(e) = self.output_ctx.write_trailer() {
                warn!("[MUX] trailer on drop failed for {}: {}", self.path.display(), e);
            }
        }
    }
}
