// 샘플 추출기 - 소스 컨테이너 디먹싱 (압축 샘플 단위)
// 트림/스트림 복사/트랜스코딩 입력이 모두 이 경로를 통과

use crate::error::{EngineError, EngineResult};
use crate::ffmpeg::is_try_again;
use crate::ffmpeg::time::{from_micros, to_micros};
use crate::ffmpeg::track::{mime_for, TrackFormat, TrackKind};
use ffmpeg_next as ffmpeg;
use log::{debug, warn};
use std::path::Path;

/// 압축 샘플 하나 (타임스탬프는 마이크로초)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub data: Vec<u8>,
    pub pts_us: i64,
    pub dts_us: i64,
    pub duration_us: i64,
    /// 키프레임/싱크 마커
    pub is_sync: bool,
}

impl Sample {
    /// 타임스탬프를 offset만큼 당김 (플래그는 유지)
    pub fn rebased(mut self, offset_us: i64) -> Self {
        self.pts_us -= offset_us;
        self.dts_us -= offset_us;
        self
    }
}

/// 샘플 소스 (트랙 하나를 선택해 순차 읽기)
pub trait SampleSource {
    fn tracks(&self) -> &[TrackFormat];

    /// 이후 read_sample은 이 트랙 샘플만 반환
    fn select_track(&mut self, index: usize) -> EngineResult<()>;

    /// time_us 이하의 가장 가까운 싱크 포인트로 이동
    fn seek_to_sync(&mut self, time_us: i64) -> EngineResult<()>;

    /// 선택 트랙의 다음 샘플 (None = 끝)
    fn read_sample(&mut self) -> EngineResult<Option<Sample>>;
}

/// ffmpeg 기반 샘플 추출기
pub struct Extractor {
    input_ctx: ffmpeg::format::context::Input,
    tracks: Vec<TrackFormat>,
    selected: Option<usize>,
}

impl Extractor {
    pub fn open(path: &Path) -> EngineResult<Self> {
        ffmpeg::init().map_err(|e| EngineError::ffmpeg("FFmpeg init failed", e))?;

        let input_ctx = open_input(path)?;
        let tracks = describe_tracks(&input_ctx);
        debug!(
            "[EXTRACT] {} → {} tracks ({})",
            path.display(),
            tracks.len(),
            tracks.iter().map(|t| t.mime.as_str()).collect::<Vec<_>>().join(", ")
        );

        Ok(Self {
            input_ctx,
            tracks,
            selected: None,
        })
    }

    fn selected_time_base(&self) -> EngineResult<ffmpeg::Rational> {
        let index = self
            .selected
            .ok_or_else(|| EngineError::invalid_input("no track selected"))?;
        self.input_ctx
            .stream(index)
            .map(|s| s.time_base())
            .ok_or(EngineError::TrackNotFound { kind: "selected" })
    }
}

/// 입력 컨텍스트 열기
/// 1차: 기본 오픈, 2차: moov atom이 파일 끝에 있는 경우 (카메라 녹화본 등)
pub fn open_input(path: &Path) -> EngineResult<ffmpeg::format::context::Input> {
    ffmpeg::format::input(&path)
        .or_else(|_| {
            let mut opts = ffmpeg::Dictionary::new();
            opts.set("probesize", "100000000"); // 100MB
            opts.set("analyzeduration", "30000000"); // 30초
            ffmpeg::format::input_with_dictionary(&path, opts)
        })
        .map_err(|e| EngineError::unreadable(path.display().to_string(), e))
}

/// 컨테이너의 모든 스트림 → TrackFormat
pub fn describe_tracks(input_ctx: &ffmpeg::format::context::Input) -> Vec<TrackFormat> {
    input_ctx
        .streams()
        .map(|stream| {
            let params = stream.parameters();
            let codec_id = params.id();
            let kind = match params.medium() {
                ffmpeg::media::Type::Video => TrackKind::Video,
                ffmpeg::media::Type::Audio => TrackKind::Audio,
                _ => TrackKind::Other,
            };

            let mut format = TrackFormat {
                index: stream.index(),
                kind,
                mime: mime_for(codec_id, kind),
                codec_id,
                width: 0,
                height: 0,
                sample_rate: 0,
                channels: 0,
                duration_us: if stream.duration() > 0 {
                    to_micros(stream.duration(), stream.time_base())
                } else {
                    0
                },
                parameters: None,
            };

            // 해상도/샘플레이트는 safe API에 없어서 AVCodecParameters 직접 읽음
            unsafe {
                let raw = &*params.as_ptr();
                format.width = raw.width.max(0) as u32;
                format.height = raw.height.max(0) as u32;
                format.sample_rate = raw.sample_rate.max(0) as u32;
                format.channels = raw.ch_layout.nb_channels.max(0) as u16;
            }

            format.parameters = Some(params);
            format
        })
        .collect()
}

impl SampleSource for Extractor {
    fn tracks(&self) -> &[TrackFormat] {
        &self.tracks
    }

    fn select_track(&mut self, index: usize) -> EngineResult<()> {
        if !self.tracks.iter().any(|t| t.index == index) {
            return Err(EngineError::invalid_input(format!("no track with index {}", index)));
        }
        self.selected = Some(index);
        Ok(())
    }

    fn seek_to_sync(&mut self, time_us: i64) -> EngineResult<()> {
        // input_ctx.seek()는 stream_index=-1 → AV_TIME_BASE(μs) 단위
        // max_ts = time_us → time_us 이하 키프레임으로 이동
        self.input_ctx
            .seek(time_us, ..time_us)
            .map_err(|e| EngineError::ffmpeg(format!("seek to {}us", time_us), e))
    }

    fn read_sample(&mut self) -> EngineResult<Option<Sample>> {
        let index = self
            .selected
            .ok_or_else(|| EngineError::invalid_input("no track selected"))?;
        let time_base = self.selected_time_base()?;

        loop {
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input_ctx) {
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(e) if is_try_again(&e) => continue,
                Err(e) => return Err(EngineError::ffmpeg("read packet", e)),
            }

            if packet.stream() != index {
                continue;
            }

            let data = match packet.data() {
                Some(d) => d.to_vec(),
                None => {
                    warn!("[EXTRACT] empty packet on stream {}", index);
                    continue;
                }
            };

            let dts = packet.dts().or(packet.pts()).unwrap_or(0);
            let pts = packet.pts().unwrap_or(dts);

            return Ok(Some(Sample {
                data,
                pts_us: to_micros(pts, time_base),
                dts_us: to_micros(dts, time_base),
                duration_us: to_micros(packet.duration(), time_base),
                is_sync: packet.is_key(),
            }));
        }
    }
}

/// 샘플 → ffmpeg 패킷 (디코더 입력/먹서 쓰기용)
pub fn sample_to_packet(sample: &Sample, time_base: ffmpeg::Rational) -> ffmpeg::Packet {
    let mut packet = ffmpeg::Packet::copy(&sample.data);
    packet.set_pts(Some(from_micros(sample.pts_us, time_base)));
    packet.set_dts(Some(from_micros(sample.dts_us, time_base)));
    packet.set_duration(from_micros(sample.duration_us, time_base));
    if sample.is_sync {
        packet.set_flags(ffmpeg::codec::packet::Flags::KEY);
    }
    packet
}
