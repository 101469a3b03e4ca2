// 테스트용 인메모리 가짜 구현 (실제 미디어 없이 파이프라인 검증)

use crate::encoding::pump::{CodecPort, Dequeue};
use crate::error::{EngineError, EngineResult, ExtractError};
use crate::ffmpeg::decoder::FrameSource;
use crate::ffmpeg::extractor::{Sample, SampleSource};
use crate::ffmpeg::muxer::{SampleSink, WriterState};
use crate::ffmpeg::track::TrackFormat;
use ffmpeg_next::codec;
use image::{Rgba, RgbaImage};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// 스크립트 코덱: 입력을 map으로 변환해 latency만큼 붙잡았다가 내보냄
pub struct ScriptedCodec<I, O = I> {
    map: Box<dyn FnMut(I) -> O>,
    buffered: VecDeque<O>,
    input_stalls: u32,
    output_stalls: u32,
    latency: usize,
    pub eos_queued: bool,
    pub inputs: usize,
}

impl<T: 'static> ScriptedCodec<T, T> {
    /// 항등 코덱
    pub fn new() -> Self {
        Self::mapping(|v| v)
    }
}

impl<I, O> ScriptedCodec<I, O> {
    pub fn mapping(map: impl FnMut(I) -> O + 'static) -> Self {
        Self {
            map: Box::new(map),
            buffered: VecDeque::new(),
            input_stalls: 0,
            output_stalls: 0,
            latency: 0,
            eos_queued: false,
            inputs: 0,
        }
    }

    /// 처음 n번의 acquire_input은 슬롯 없음
    pub fn with_input_stalls(mut self, n: u32) -> Self {
        self.input_stalls = n;
        self
    }

    /// 처음 n번의 dequeue_output은 TryAgainLater
    pub fn with_output_stalls(mut self, n: u32) -> Self {
        self.output_stalls = n;
        self
    }

    /// EOS 전까지 출력 n개를 붙잡고 있음 (인코더 지연 흉내)
    pub fn with_latency(mut self, n: usize) -> Self {
        self.latency = n;
        self
    }
}

impl<I, O> CodecPort for ScriptedCodec<I, O> {
    type Input = I;
    type Output = O;

    fn acquire_input(&mut self, _wait: Duration) -> EngineResult<bool> {
        if self.input_stalls > 0 {
            self.input_stalls -= 1;
            return Ok(false);
        }
        Ok(true)
    }

    fn queue_input(&mut self, input: I) -> EngineResult<()> {
        if self.eos_queued {
            return Err(EngineError::codec("input after end of stream"));
        }
        self.inputs += 1;
        let output = (self.map)(input);
        self.buffered.push_back(output);
        Ok(())
    }

    fn queue_end_of_stream(&mut self) -> EngineResult<()> {
        self.eos_queued = true;
        Ok(())
    }

    fn dequeue_output(&mut self, _wait: Duration) -> EngineResult<Dequeue<O>> {
        if self.output_stalls > 0 {
            self.output_stalls -= 1;
            return Ok(Dequeue::TryAgainLater);
        }
        if self.buffered.len() > self.latency || (self.eos_queued && !self.buffered.is_empty()) {
            if let Some(output) = self.buffered.pop_front() {
                return Ok(Dequeue::Ready(output));
            }
        }
        if self.eos_queued {
            return Ok(Dequeue::EndOfStream);
        }
        Ok(Dequeue::TryAgainLater)
    }
}

/// 샘플 생성: count개, 간격 step_us, gop마다 싱크
pub fn samples(count: usize, step_us: i64, gop: usize) -> Vec<Sample> {
    (0..count)
        .map(|i| Sample {
            data: vec![(i % 256) as u8; 4],
            pts_us: i as i64 * step_us,
            dts_us: i as i64 * step_us,
            duration_us: step_us,
            is_sync: gop > 0 && i % gop == 0,
        })
        .collect()
}

/// 인메모리 샘플 소스
#[derive(Default)]
pub struct FakeSource {
    tracks: Vec<TrackFormat>,
    samples: HashMap<usize, Vec<Sample>>,
    selected: Option<usize>,
    cursor: usize,
    pub seeks: Vec<i64>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_track(mut self, format: TrackFormat, samples: Vec<Sample>) -> Self {
        self.samples.insert(format.index, samples);
        self.tracks.push(format);
        self
    }

    /// H.264 비디오 트랙 (index = 현재 트랙 수)
    pub fn with_video(self, samples: Vec<Sample>) -> Self {
        let mut format = TrackFormat::new(self.tracks.len(), codec::Id::H264);
        format.width = 1280;
        format.height = 720;
        self.with_track(format, samples)
    }

    /// 오디오 트랙 (codec으로 직접 복사/트랜스코딩 경로 결정)
    pub fn with_audio(self, codec_id: codec::Id, samples: Vec<Sample>) -> Self {
        let mut format = TrackFormat::new(self.tracks.len(), codec_id);
        format.sample_rate = 44_100;
        format.channels = 2;
        self.with_track(format, samples)
    }

    fn current(&self) -> &[Sample] {
        self.selected
            .and_then(|i| self.samples.get(&i))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl SampleSource for FakeSource {
    fn tracks(&self) -> &[TrackFormat] {
        &self.tracks
    }

    fn select_track(&mut self, index: usize) -> EngineResult<()> {
        if !self.samples.contains_key(&index) {
            return Err(EngineError::invalid_input(format!("no track {}", index)));
        }
        self.selected = Some(index);
        self.cursor = 0;
        Ok(())
    }

    fn seek_to_sync(&mut self, time_us: i64) -> EngineResult<()> {
        self.seeks.push(time_us);
        self.cursor = self
            .current()
            .iter()
            .rposition(|s| s.is_sync && s.pts_us <= time_us)
            .unwrap_or(0);
        Ok(())
    }

    fn read_sample(&mut self) -> EngineResult<Option<Sample>> {
        let sample = self.current().get(self.cursor).cloned();
        if sample.is_some() {
            self.cursor += 1;
        }
        Ok(sample)
    }
}

/// 기록만 하는 싱크 (먹서 상태 규칙은 실제와 동일)
pub struct MemorySink {
    pub state: WriterState,
    pub tracks: Vec<TrackFormat>,
    pub written: Vec<(usize, Sample)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            state: WriterState::Configuring,
            tracks: Vec::new(),
            written: Vec::new(),
        }
    }

    pub fn track_samples(&self, track: usize) -> Vec<&Sample> {
        self.written.iter().filter(|(t, _)| *t == track).map(|(_, s)| s).collect()
    }
}

impl SampleSink for MemorySink {
    fn add_track(&mut self, format: &TrackFormat) -> EngineResult<usize> {
        self.state.check_add_track()?;
        self.tracks.push(format.clone());
        Ok(self.tracks.len() - 1)
    }

    fn start(&mut self) -> EngineResult<()> {
        self.state.check_start()?;
        self.state = WriterState::Started;
        Ok(())
    }

    fn write_sample(&mut self, track: usize, sample: &Sample) -> EngineResult<()> {
        self.state.check_write()?;
        if track >= self.tracks.len() {
            return Err(EngineError::muxer(format!("unknown track {}", track)));
        }
        self.written.push((track, sample.clone()));
        Ok(())
    }

    fn finish(&mut self) -> EngineResult<()> {
        self.state.check_finish()?;
        self.state = WriterState::Finished;
        Ok(())
    }
}

/// 단색 프레임 공급자 (요청 순번 기준 실패 스크립트)
pub struct ScriptedFrames {
    width: u32,
    height: u32,
    color: Rgba<u8>,
    fails: Box<dyn FnMut(usize) -> bool>,
    pub requested: Vec<i64>,
}

impl ScriptedFrames {
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        Self {
            width,
            height,
            color: Rgba(color),
            fails: Box::new(|_| false),
            requested: Vec::new(),
        }
    }

    /// n번째 요청(0부터)이 실패할지 결정
    pub fn failing(mut self, fails: impl FnMut(usize) -> bool + 'static) -> Self {
        self.fails = Box::new(fails);
        self
    }
}

impl FrameSource for ScriptedFrames {
    fn extract_frame(&mut self, time_us: i64) -> Result<RgbaImage, ExtractError> {
        let call = self.requested.len();
        self.requested.push(time_us);
        if (self.fails)(call) {
            return Err(ExtractError::NoFrame { time_us });
        }
        Ok(RgbaImage::from_pixel(self.width, self.height, self.color))
    }
}
