// 프레임 추출기 (ffmpeg-next)
// 요청 시각에 가장 가까운 프레임을 RGBA로 반환 (정확한 프레임 보장 아님)
// 아키텍처: 싱크 포인트 seek + forward decode + 직전/직후 프레임 중 근접 선택

use crate::error::{EngineError, EngineResult, ExtractError};
use crate::ffmpeg::extractor::open_input;
use crate::ffmpeg::is_try_again;
use crate::ffmpeg::time::to_micros;
use ffmpeg_next as ffmpeg;
use image::RgbaImage;
use log::debug;
use std::path::Path;

/// 합성 파이프라인이 소비하는 프레임 공급자
pub trait FrameSource {
    /// time_us에 가장 가까운 프레임 (출력 해상도로 스케일됨)
    fn extract_frame(&mut self, time_us: i64) -> Result<RgbaImage, ExtractError>;
}

/// 디코딩된 프레임 + 표시 시각
struct Decoded {
    pts_us: i64,
    frame: ffmpeg::frame::Video,
}

/// 비디오 프레임 추출기 (단일 소스 리더 핸들)
pub struct FrameExtractor {
    input_ctx: ffmpeg::format::context::Input,
    video_stream_index: usize,
    time_base: ffmpeg::Rational,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    width: u32,
    height: u32,
    /// 요청 시각 이하에서 마지막으로 본 프레임
    before: Option<Decoded>,
    /// 요청 시각을 넘어선 첫 프레임 (다음 요청에서 재사용)
    after: Option<Decoded>,
    /// 마지막 요청 시각 (forward decode 판정용)
    last_request_us: Option<i64>,
    /// 현재 위치에서 이 범위 내의 미래 요청은 seek 없이 forward decode
    forward_threshold_us: i64,
    eof_sent: bool,
    exhausted: bool,
}

impl FrameExtractor {
    /// 디코더 생성 (멀티스레딩, 디코더당 최대 4스레드)
    fn create_decoder(params: ffmpeg::codec::Parameters) -> EngineResult<ffmpeg::decoder::Video> {
        let mut context = ffmpeg::codec::context::Context::from_parameters(params)
            .map_err(|e| EngineError::ffmpeg("create decoder context", e))?;

        if let Ok(parallelism) = std::thread::available_parallelism() {
            context.set_threading(ffmpeg::threading::Config {
                kind: ffmpeg::threading::Type::Frame,
                count: parallelism.get().min(4),
            });
        }

        context.decoder().video().map_err(|e| EngineError::CodecUnavailable {
            codec: "video decoder".to_string(),
            reason: e.to_string(),
        })
    }

    /// 소스 열기 + 출력 해상도(width x height) RGBA 스케일러
    pub fn open(path: &Path, width: u32, height: u32) -> EngineResult<Self> {
        ffmpeg::init().map_err(|e| EngineError::ffmpeg("FFmpeg init failed", e))?;

        let input_ctx = open_input(path)?;
        let (video_stream_index, time_base, params, frame_rate) = {
            let stream = input_ctx
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or(EngineError::TrackNotFound { kind: "video" })?;
            (stream.index(), stream.time_base(), stream.parameters(), stream.avg_frame_rate())
        };

        let decoder = Self::create_decoder(params)?;

        // 합성 출력용: 품질 우선 BICUBIC
        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::RGBA,
            width,
            height,
            ffmpeg::software::scaling::Flags::BICUBIC,
        )
        .map_err(|e| EngineError::ffmpeg("create scaler", e))?;

        // 기본 임계값: 2초 (GOP 하나 안쪽은 seek 대신 전진)
        let fps = if frame_rate.denominator() != 0 && frame_rate.numerator() > 0 {
            f64::from(frame_rate)
        } else {
            30.0
        };
        let forward_threshold_us = ((1_000_000.0 / fps) as i64 * 60).max(2_000_000);

        Ok(Self {
            input_ctx,
            video_stream_index,
            time_base,
            decoder,
            scaler,
            width,
            height,
            before: None,
            after: None,
            last_request_us: None,
            forward_threshold_us,
            eof_sent: false,
            exhausted: false,
        })
    }

    /// Forward decode 임계값 설정
    pub fn set_forward_threshold(&mut self, threshold_us: i64) {
        self.forward_threshold_us = threshold_us;
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// 싱크 포인트 프레임 (썸네일용): seek 후 첫 디코딩 프레임
    pub fn extract_sync_frame(&mut self, time_us: i64) -> Result<RgbaImage, ExtractError> {
        self.seek(time_us)?;
        self.last_request_us = None;
        let decoded = self.next_decoded()?.ok_or(ExtractError::NoFrame { time_us })?;
        self.convert(&decoded.frame)
    }

    /// 싱크 포인트로 seek + 디코더 상태 초기화
    fn seek(&mut self, time_us: i64) -> Result<(), ExtractError> {
        // stream_index = -1 → AV_TIME_BASE(μs) 단위
        let result = self.input_ctx.seek(time_us, ..time_us).or_else(|_| {
            // 실패 시 flush 후 재시도 1회
            self.decoder.flush();
            self.input_ctx.seek(time_us, ..time_us)
        });
        self.decoder.flush();
        self.before = None;
        self.after = None;
        self.eof_sent = false;
        self.exhausted = false;

        result.map_err(|e| ExtractError::Seek {
            time_us,
            reason: e.to_string(),
        })
    }

    /// 다음 디코딩 프레임 (None = 스트림 끝)
    fn next_decoded(&mut self) -> Result<Option<Decoded>, ExtractError> {
        if self.exhausted {
            return Ok(None);
        }

        loop {
            let mut frame = ffmpeg::frame::Video::empty();
            match self.decoder.receive_frame(&mut frame) {
                Ok(()) => {
                    let pts_us = frame
                        .timestamp()
                        .or(frame.pts())
                        .map(|pts| to_micros(pts, self.time_base))
                        .unwrap_or(i64::MAX);
                    return Ok(Some(Decoded { pts_us, frame }));
                }
                Err(ffmpeg::Error::Eof) => {
                    self.exhausted = true;
                    return Ok(None);
                }
                Err(e) if is_try_again(&e) => {}
                Err(e) => return Err(ExtractError::Decode(e.to_string())),
            }

            if self.eof_sent {
                // EOF 이후 EAGAIN은 더 나올 프레임이 없다는 뜻
                self.exhausted = true;
                return Ok(None);
            }

            // 디코더가 입력을 원함 → 비디오 패킷 하나 공급
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input_ctx) {
                Ok(()) => {
                    if packet.stream() != self.video_stream_index {
                        continue;
                    }
                    match self.decoder.send_packet(&packet) {
                        Ok(()) => {}
                        Err(e) if is_try_again(&e) => {}
                        // 손상 패킷은 건너뜀 (flush하면 이후 패킷도 디코딩 불가)
                        Err(e) => debug!("[FRAME] packet rejected: {}", e),
                    }
                }
                Err(ffmpeg::Error::Eof) => {
                    self.decoder
                        .send_eof()
                        .map_err(|e| ExtractError::Decode(e.to_string()))?;
                    self.eof_sent = true;
                }
                Err(e) if is_try_again(&e) => {}
                Err(e) => return Err(ExtractError::Decode(e.to_string())),
            }
        }
    }

    /// 디코딩 프레임 → 출력 해상도 RGBA 이미지
    /// FFmpeg이 손상된 프레임을 반환해도 panic 대신 Err 반환
    fn convert(&mut self, raw: &ffmpeg::frame::Video) -> Result<RgbaImage, ExtractError> {
        let mut scaled = ffmpeg::frame::Video::empty();
        self.scaler
            .run(raw, &mut scaled)
            .map_err(|e| ExtractError::Scale(e.to_string()))?;

        let w = self.width as usize;
        let h = self.height as usize;
        let row_size = w * 4;
        let src = scaled.data(0);
        let stride = scaled.stride(0);

        if stride < row_size || src.len() < (h - 1) * stride + row_size {
            return Err(ExtractError::Scale(format!(
                "frame data too small: {} bytes, stride {} for {}x{}",
                src.len(),
                stride,
                w,
                h
            )));
        }

        let mut data = vec![0u8; row_size * h];
        for y in 0..h {
            data[y * row_size..(y + 1) * row_size].copy_from_slice(&src[y * stride..y * stride + row_size]);
        }

        RgbaImage::from_raw(self.width, self.height, data)
            .ok_or_else(|| ExtractError::Scale("RGBA buffer size mismatch".to_string()))
    }
}

impl FrameSource for FrameExtractor {
    /// 판정:
    /// - 직전 요청 이후 threshold 이내 전진: seek 없이 forward decode
    /// - 그 외(역방향, 먼 점프, 첫 요청): 싱크 포인트 seek 후 전진
    fn extract_frame(&mut self, time_us: i64) -> Result<RgbaImage, ExtractError> {
        let is_forward = matches!(
            self.last_request_us,
            Some(last) if time_us >= last && time_us - last <= self.forward_threshold_us
        );
        if !is_forward {
            self.seek(time_us)?;
        }
        self.last_request_us = Some(time_us);

        // 요청 시각을 넘는 프레임이 나올 때까지 전진
        loop {
            match self.after.as_ref().map(|next| next.pts_us >= time_us) {
                Some(true) => break,
                Some(false) => self.before = self.after.take(),
                None => {}
            }
            match self.next_decoded()? {
                Some(decoded) => self.after = Some(decoded),
                None => break,
            }
        }

        // 직전/직후 중 가까운 쪽 (스트림 끝이면 마지막 프레임)
        let use_after = match (&self.before, &self.after) {
            (Some(b), Some(a)) => (a.pts_us - time_us) < (time_us - b.pts_us),
            (None, Some(_)) => true,
            (Some(_), None) => false,
            (None, None) => return Err(ExtractError::NoFrame { time_us }),
        };

        let chosen = if use_after { self.after.take() } else { self.before.take() };
        let Some(chosen) = chosen else {
            return Err(ExtractError::NoFrame { time_us });
        };
        let image = self.convert(&chosen.frame);
        // 다음 요청에서 다시 쓸 수 있도록 돌려놓음
        if use_after {
            self.after = Some(chosen);
        } else {
            self.before = Some(chosen);
        }
        image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn open_missing_file_fails() {
        assert!(FrameExtractor::open(&PathBuf::from("/nonexistent/test.mp4"), 640, 360).is_err());
    }

    #[test]
    #[ignore] // 실제 비디오 파일 필요
    fn extracts_frames_in_order() {
        let mut source = FrameExtractor::open(&PathBuf::from("test.mp4"), 640, 360).unwrap();
        for t in [0i64, 33_333, 66_666, 1_000_000, 500_000] {
            let frame = source.extract_frame(t).unwrap();
            assert_eq!(frame.dimensions(), (640, 360));
        }
    }

    #[test]
    #[ignore] // 실제 비디오 파일 필요
    fn sync_frame_for_thumbnail() {
        let mut source = FrameExtractor::open(&PathBuf::from("test.mp4"), 320, 180).unwrap();
        let frame = source.extract_sync_frame(2_000_000).unwrap();
        assert_eq!(frame.len(), 320 * 180 * 4);
    }
}
