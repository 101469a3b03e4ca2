// 오디오 추가 - 다른 소스의 오디오 트랙을 비디오에 붙임
// MP4 호환 코덱이면 그대로 복사, 아니면 디코더 → AAC 인코더 → 먹서

use crate::encoding::audio::AudioCodecFactory;
use crate::encoding::pump::{drain, feed, pump, Produce, PumpConfig};
use crate::error::{EngineError, EngineResult};
use crate::ffmpeg::extractor::{Sample, SampleSource};
use crate::ffmpeg::muxer::SampleSink;
use crate::ffmpeg::track::{find_track, TrackFormat};
use crate::processing::trim::{copy_track, TrimWindow};
use log::{debug, info, warn};

/// MP4 먹서가 그대로 받는 오디오 MIME
const COPY_COMPATIBLE: &[&str] = &["audio/mp4a-latm", "audio/3gpp", "audio/amr-wb"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioPath {
    DirectCopy,
    Transcode,
}

pub fn resolve_audio_path(format: &TrackFormat) -> AudioPath {
    if COPY_COMPATIBLE.contains(&format.mime.as_str()) {
        AudioPath::DirectCopy
    } else {
        AudioPath::Transcode
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddAudioStats {
    pub path: AudioPath,
    pub video_samples: u64,
    pub audio_samples: u64,
}

/// 인코더 출력 기록. dts가 증가하지 않으면 먹서 전에 거부 (인코더/타임스탬프 버그)
struct EncodedAudioWriter {
    track: usize,
    last_dts_us: Option<i64>,
    written: u64,
}

impl EncodedAudioWriter {
    fn new(track: usize) -> Self {
        Self {
            track,
            last_dts_us: None,
            written: 0,
        }
    }

    fn write<K: SampleSink + ?Sized>(&mut self, sink: &mut K, sample: Sample) -> EngineResult<()> {
        if let Some(last) = self.last_dts_us {
            if sample.dts_us <= last {
                warn!("[AUDIO] encoded dts {} after {}", sample.dts_us, last);
                return Err(EngineError::codec(format!(
                    "encoded audio dts not increasing ({}us after {}us)",
                    sample.dts_us, last
                )));
            }
        }
        self.last_dts_us = Some(sample.dts_us);
        sink.write_sample(self.track, &sample)?;
        self.written += 1;
        Ok(())
    }
}

/// 비디오 소스의 첫 비디오 트랙 + 오디오 소스의 첫 오디오 트랙 → 싱크
/// 코덱은 트랜스코딩 경로에서만 생성
pub fn add_audio<V, A, K, F>(
    video_source: &mut V,
    audio_source: &mut A,
    sink: &mut K,
    codecs: &mut F,
    config: &PumpConfig,
) -> EngineResult<AddAudioStats>
where
    V: SampleSource + ?Sized,
    A: SampleSource + ?Sized,
    K: SampleSink + ?Sized,
    F: AudioCodecFactory,
{
    let video_tracks = video_source.tracks().to_vec();
    let video = &video_tracks[find_track(&video_tracks, "video/")?];
    let audio_tracks = audio_source.tracks().to_vec();
    let audio = &audio_tracks[find_track(&audio_tracks, "audio/")?];

    let path = resolve_audio_path(audio);
    info!("[AUDIO] {} → {:?}", audio.mime, path);

    match path {
        AudioPath::DirectCopy => {
            let video_out = sink.add_track(video)?;
            let audio_out = sink.add_track(audio)?;
            sink.start()?;
            let video_samples = copy_track(video_source, sink, video.index, video_out, TrimWindow::full(), 0)?.written;
            let audio_samples = copy_track(audio_source, sink, audio.index, audio_out, TrimWindow::full(), 0)?.written;
            sink.finish()?;
            Ok(AddAudioStats {
                path,
                video_samples,
                audio_samples,
            })
        }
        AudioPath::Transcode => {
            // 코덱 생성 실패는 먹서를 건드리기 전에 드러남
            let mut decoder = codecs.decoder(audio)?;
            let (mut encoder, encoded_format) = codecs.encoder(audio)?;

            let video_out = sink.add_track(video)?;
            let audio_out = sink.add_track(&encoded_format)?;
            sink.start()?;
            let video_samples = copy_track(video_source, sink, video.index, video_out, TrimWindow::full(), 0)?.written;

            audio_source.select_track(audio.index)?;
            audio_source.seek_to_sync(0)?;
            let mut writer = EncodedAudioWriter::new(audio_out);

            // 디코더 EOS → 인코더에 남은 PCM 전달 후 인코더 EOS (순서 보장)
            let decoded = pump(
                &mut decoder,
                config,
                || {
                    Ok(match audio_source.read_sample()? {
                        Some(sample) => Produce::Item(sample),
                        None => Produce::EndOfStream,
                    })
                },
                |pcm| feed(&mut encoder, config, pcm, |encoded| writer.write(&mut *sink, encoded)),
            )?;
            drain(&mut encoder, config, |encoded| writer.write(&mut *sink, encoded))?;
            sink.finish()?;

            debug!(
                "[AUDIO] transcoded {} packets → {} AAC samples",
                decoded.submitted, writer.written
            );
            Ok(AddAudioStats {
                path,
                video_samples,
                audio_samples: writer.written,
            })
        }
    }
}
