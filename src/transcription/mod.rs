// 음성 인식 보조 모듈
// 인식 자체는 외부 협력자 몫. 여기서는 입력 WAV 추출과 결과 텍스트 파싱만 담당

pub mod transcript;
pub mod wav;

pub use transcript::{parse_transcript, TranscriptWord};
pub use wav::write_wav;

use crate::encoding::audio::{flush_resampler, resample, AudioDecoderPort};
use crate::encoding::pump::{pump, CodecPort, Produce, PumpConfig};
use crate::error::{EngineError, EngineResult};
use crate::ffmpeg::extractor::{Extractor, Sample, SampleSource};
use crate::ffmpeg::track::find_track;
use ffmpeg_next as ffmpeg;
use log::{debug, info};
use std::path::{Path, PathBuf};

/// 추출된 음성 WAV
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechAudio {
    pub path: PathBuf,
    pub sample_count: usize,
    pub duration_ms: i64,
}

/// 소스 트랙 전체를 디코더에 통과시키고 디코딩 결과를 on_frame으로 전달
/// 반환값은 디코더 출력 개수
pub fn decode_track<S, D, F>(
    source: &mut S,
    decoder: &mut D,
    track_index: usize,
    config: &PumpConfig,
    on_frame: F,
) -> EngineResult<u64>
where
    S: SampleSource + ?Sized,
    D: CodecPort<Input = Sample>,
    F: FnMut(D::Output) -> EngineResult<()>,
{
    source.select_track(track_index)?;
    source.seek_to_sync(0)?;

    let stats = pump(
        decoder,
        config,
        || {
            Ok(match source.read_sample()? {
                Some(sample) => Produce::Item(sample),
                None => Produce::EndOfStream,
            })
        },
        on_frame,
    )?;
    Ok(stats.emitted)
}

/// 디코딩 PCM → mono s16 (고정 샘플레이트)
pub struct SpeechResampler {
    sample_rate: u32,
    context: Option<ffmpeg::software::resampling::Context>,
    samples: Vec<i16>,
}

impl SpeechResampler {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            context: None,
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, frame: &ffmpeg::frame::Audio) -> EngineResult<()> {
        // 실제 포맷은 첫 디코딩 프레임에서 확정됨 (Opus 등)
        if self.context.is_none() {
            let context = ffmpeg::software::resampling::Context::get(
                frame.format(),
                frame.channel_layout(),
                frame.rate(),
                ffmpeg::format::Sample::I16(ffmpeg::format::sample::Type::Packed),
                ffmpeg::ChannelLayout::MONO,
                self.sample_rate,
            )
            .map_err(|e| EngineError::ffmpeg("create speech resampler", e))?;
            self.context = Some(context);
        }
        let Some(context) = self.context.as_mut() else {
            return Ok(());
        };

        let resampled = resample(context, frame)?;
        self.append(&resampled);
        Ok(())
    }

    /// 리샘플러 내부 지연분까지 비우고 샘플 반환
    pub fn finish(mut self) -> EngineResult<Vec<i16>> {
        if let Some(mut context) = self.context.take() {
            if let Some(tail) = flush_resampler(&mut context)? {
                self.append(&tail);
            }
        }
        Ok(self.samples)
    }

    fn append(&mut self, resampled: &ffmpeg::frame::Audio) {
        // linesize 패딩 제외, samples() 개수만
        let n = resampled.samples();
        if n == 0 {
            return;
        }
        self.samples.extend(resampled.plane::<i16>(0).iter().take(n));
    }
}

/// 첫 오디오 트랙을 mono s16 WAV로 추출
pub fn extract_speech_audio(
    path: &Path,
    out: &Path,
    sample_rate: u32,
    config: &PumpConfig,
) -> EngineResult<SpeechAudio> {
    let mut source = Extractor::open(path)?;
    let tracks = source.tracks().to_vec();
    let audio = &tracks[find_track(&tracks, "audio/")?];

    info!("[SPEECH] {} ({}) → {} Hz mono", path.display(), audio.mime, sample_rate);

    let mut decoder = AudioDecoderPort::open(audio)?;
    let mut resampler = SpeechResampler::new(sample_rate);
    let frames = decode_track(&mut source, &mut decoder, audio.index, config, |frame| {
        resampler.push(&frame)
    })?;
    let samples = resampler.finish()?;
    debug!("[SPEECH] {} decoded frames, {} samples", frames, samples.len());

    if samples.is_empty() {
        return Err(EngineError::codec("no audio samples decoded"));
    }

    write_wav(out, &samples, sample_rate)?;
    let duration_ms = samples.len() as i64 * 1000 / i64::from(sample_rate.max(1));
    info!("[SPEECH] wrote {} ({}ms)", out.display(), duration_ms);

    Ok(SpeechAudio {
        path: out.to_path_buf(),
        sample_count: samples.len(),
        duration_ms,
    })
}
