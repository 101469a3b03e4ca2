// 비디오 인코더 - NV12 (BT.709 limited) → H.264
// 하드웨어 인코더 우선 (설정된 선호 순서), 없으면 기본 H.264 인코더
// CodecPort로 노출: 합성 파이프라인이 펌프로 구동

use crate::encoding::pump::{CodecPort, Dequeue};
use crate::error::{EngineError, EngineResult};
use crate::ffmpeg::extractor::Sample;
use crate::ffmpeg::is_try_again;
use crate::ffmpeg::time::MICROS;
use crate::ffmpeg::track::TrackFormat;
use ffmpeg_next as ffmpeg;
use ffmpeg::codec;
use ffmpeg::format::Pixel;
use log::{debug, info, warn};
use std::time::Duration;

/// 인코더 설정
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    /// 짝수여야 함 (4:2:0)
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub bit_rate: u64,
    pub keyframe_interval_secs: u32,
}

/// 인코더 입력: NV12 버퍼 + 표시 시각
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderInput {
    pub nv12: Vec<u8>,
    pub pts_us: i64,
}

/// H.264 비디오 인코더
pub struct VideoEncoder {
    encoder: ffmpeg::encoder::video::Encoder,
    codec_name: String,
    width: u32,
    height: u32,
    /// EAGAIN으로 거절된 프레임 (출력을 비운 뒤 재전송)
    pending: Option<ffmpeg::frame::Video>,
    /// pending 뒤에 보낼 EOS
    eos_pending: bool,
}

impl VideoEncoder {
    /// 선호 목록 순서대로 열기 시도 → 모두 실패 시 기본 H.264
    pub fn open(settings: &EncoderSettings, preferred: &[String]) -> EngineResult<Self> {
        ffmpeg::init().map_err(|e| EngineError::ffmpeg("FFmpeg init failed", e))?;

        if settings.width % 2 != 0 || settings.height % 2 != 0 || settings.width == 0 || settings.height == 0 {
            return Err(EngineError::invalid_input(format!(
                "encoder dimensions must be even: {}x{}",
                settings.width, settings.height
            )));
        }

        let mut last_error = String::from("no H.264 encoder available");
        let candidates = preferred
            .iter()
            .filter_map(|name| ffmpeg::encoder::find_by_name(name))
            .chain(ffmpeg::encoder::find(codec::Id::H264));

        for codec in candidates {
            let name = codec.name().to_string();
            match Self::open_codec(codec, settings) {
                Ok(encoder) => {
                    info!(
                        "[ENCODER] {} {}x{} @ {:.2}fps, {} bps",
                        name, settings.width, settings.height, settings.frame_rate, settings.bit_rate
                    );
                    return Ok(Self {
                        encoder,
                        codec_name: name,
                        width: settings.width,
                        height: settings.height,
                        pending: None,
                        eos_pending: false,
                    });
                }
                Err(e) => {
                    debug!("[ENCODER] {} unavailable: {}", name, e);
                    last_error = format!("{}: {}", name, e);
                }
            }
        }

        Err(EngineError::CodecUnavailable {
            codec: "h264".to_string(),
            reason: last_error,
        })
    }

    fn open_codec(codec: ffmpeg::Codec, settings: &EncoderSettings) -> Result<ffmpeg::encoder::video::Encoder, ffmpeg::Error> {
        let mut encoder = codec::context::Context::new_with_codec(codec).encoder().video()?;

        let fps_num = (settings.frame_rate * 1000.0).round() as i32;
        let gop = (settings.frame_rate * f64::from(settings.keyframe_interval_secs.max(1))).round() as u32;

        encoder.set_width(settings.width);
        encoder.set_height(settings.height);
        encoder.set_format(Pixel::NV12);
        encoder.set_time_base(MICROS);
        encoder.set_frame_rate(Some(ffmpeg::Rational::new(fps_num, 1000)));
        encoder.set_bit_rate(settings.bit_rate as usize);
        encoder.set_max_bit_rate(settings.bit_rate as usize);
        encoder.set_gop(gop.max(1));
        encoder.set_colorspace(ffmpeg::color::Space::BT709);
        encoder.set_color_range(ffmpeg::color::Range::MPEG);

        unsafe {
            let raw = encoder.as_mut_ptr();
            (*raw).color_primaries = ffmpeg::ffi::AVColorPrimaries::AVCOL_PRI_BT709;
            (*raw).color_trc = ffmpeg::ffi::AVColorTransferCharacteristic::AVCOL_TRC_BT709;
            // MP4 컨테이너는 항상 글로벌 헤더 (avcC)
            (*raw).flags |= codec::flag::Flags::GLOBAL_HEADER.bits() as i32;
        }

        let mut opts = ffmpeg::Dictionary::new();
        opts.set("profile", "high");
        opts.set("level", "4.1");

        encoder.open_with(opts)
    }

    pub fn codec_name(&self) -> &str {
        &self.codec_name
    }

    /// 먹서에 등록할 출력 트랙 포맷
    pub fn output_format(&self) -> TrackFormat {
        let mut format = TrackFormat::new(0, codec::Id::H264);
        format.width = self.width;
        format.height = self.height;
        format.parameters = Some(codec::Parameters::from(&self.encoder));
        format
    }

    /// NV12 버퍼 → ffmpeg 프레임 (stride 고려 복사)
    fn build_frame(&self, input: &EncoderInput) -> EngineResult<ffmpeg::frame::Video> {
        let w = self.width as usize;
        let h = self.height as usize;
        let expected = w * h * 3 / 2;
        if input.nv12.len() != expected {
            return Err(EngineError::BufferSizeMismatch {
                expected,
                actual: input.nv12.len(),
            });
        }

        let mut frame = ffmpeg::frame::Video::new(Pixel::NV12, self.width, self.height);
        let (luma, chroma) = input.nv12.split_at(w * h);

        let y_stride = frame.stride(0);
        let y_plane = frame.data_mut(0);
        for row in 0..h {
            y_plane[row * y_stride..row * y_stride + w].copy_from_slice(&luma[row * w..(row + 1) * w]);
        }

        let uv_stride = frame.stride(1);
        let uv_plane = frame.data_mut(1);
        for row in 0..h / 2 {
            uv_plane[row * uv_stride..row * uv_stride + w].copy_from_slice(&chroma[row * w..(row + 1) * w]);
        }

        frame.set_pts(Some(input.pts_us));
        frame.set_color_space(ffmpeg::color::Space::BT709);
        frame.set_color_range(ffmpeg::color::Range::MPEG);
        Ok(frame)
    }

    /// 보류 중인 프레임/EOS 재전송. true = 보류 없음
    fn flush_pending(&mut self) -> EngineResult<bool> {
        if let Some(frame) = self.pending.take() {
            match self.encoder.send_frame(&frame) {
                Ok(()) => {}
                Err(e) if is_try_again(&e) => {
                    self.pending = Some(frame);
                    return Ok(false);
                }
                Err(e) => return Err(EngineError::ffmpeg("send frame to encoder", e)),
            }
        }
        if self.eos_pending {
            match self.encoder.send_eof() {
                Ok(()) => self.eos_pending = false,
                Err(e) if is_try_again(&e) => return Ok(false),
                Err(e) => return Err(EngineError::ffmpeg("send EOF to encoder", e)),
            }
        }
        Ok(true)
    }
}

impl CodecPort for VideoEncoder {
    type Input = EncoderInput;
    type Output = Sample;

    // ffmpeg send/receive는 동기식이라 wait는 쓰지 않음
    fn acquire_input(&mut self, _wait: Duration) -> EngineResult<bool> {
        self.flush_pending()
    }

    fn queue_input(&mut self, input: EncoderInput) -> EngineResult<()> {
        let frame = self.build_frame(&input)?;
        match self.encoder.send_frame(&frame) {
            Ok(()) => Ok(()),
            Err(e) if is_try_again(&e) => {
                self.pending = Some(frame);
                Ok(())
            }
            Err(e) => Err(EngineError::ffmpeg("send frame to encoder", e)),
        }
    }

    fn queue_end_of_stream(&mut self) -> EngineResult<()> {
        self.eos_pending = true;
        self.flush_pending().map(|_| ())
    }

    fn dequeue_output(&mut self, _wait: Duration) -> EngineResult<Dequeue<Sample>> {
        let mut packet = ffmpeg::Packet::empty();
        match self.encoder.receive_packet(&mut packet) {
            Ok(()) => {
                let dts = packet.dts().or(packet.pts()).unwrap_or(0);
                Ok(Dequeue::Ready(Sample {
                    data: packet.data().map(|d| d.to_vec()).unwrap_or_default(),
                    pts_us: packet.pts().unwrap_or(dts),
                    dts_us: dts,
                    duration_us: packet.duration(),
                    is_sync: packet.is_key(),
                }))
            }
            Err(e) if is_try_again(&e) => {
                // 출력이 비었으니 보류 입력을 밀어넣을 기회
                if self.pending.is_some() || self.eos_pending {
                    self.flush_pending()?;
                }
                Ok(Dequeue::TryAgainLater)
            }
            Err(ffmpeg::Error::Eof) => Ok(Dequeue::EndOfStream),
            Err(e) => {
                warn!("[ENCODER] receive failed: {}", e);
                Err(EngineError::ffmpeg("receive packet from encoder", e))
            }
        }
    }
}
