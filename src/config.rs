// 엔진 설정 - 호스트가 JSON으로 전달, 누락 필드는 기본값

use crate::encoding::pump::PumpConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 엔진 전역 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 스테이지 중간 산출물 디렉터리 (앱 캐시)
    pub temp_dir: PathBuf,
    /// 최종 산출물 공개 위치 (Movies/<app_prefix>)
    pub public_dir: PathBuf,
    /// 공개 파일명 접두사
    pub app_prefix: String,
    /// 연속 프레임 추출 실패 허용 상한 (이 값에 도달하면 합성 스테이지 중단)
    pub max_consecutive_failures: u32,
    /// 인코더 입력 버퍼 획득 대기 (ms)
    pub input_wait_ms: u64,
    /// 인코더 출력 버퍼 폴링 대기 (ms)
    pub output_wait_ms: u64,
    /// 재인코딩 비트레이트 하한 (bps)
    pub min_video_bitrate: u64,
    /// 키프레임 간격 (초)
    pub keyframe_interval_secs: u32,
    /// AAC 트랜스코딩 비트레이트 (bps)
    pub audio_bitrate: u64,
    /// H.264 인코더 선호 순서 (하드웨어 우선)
    pub video_encoders: Vec<String>,
    pub thumbnail_count: u32,
    pub thumbnail_width: u32,
    /// 오버레이 폰트 (없으면 내장 볼드 산세리프)
    pub font_path: Option<PathBuf>,
    /// 음성 인식용 WAV 샘플레이트
    pub speech_sample_rate: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let temp_dir = std::env::temp_dir().join("clipo");
        Self {
            public_dir: temp_dir.join("public"),
            temp_dir,
            app_prefix: "Clipo".to_string(),
            max_consecutive_failures: 5,
            input_wait_ms: 10,
            output_wait_ms: 1,
            min_video_bitrate: 8_000_000,
            keyframe_interval_secs: 1,
            audio_bitrate: 128_000,
            video_encoders: vec![
                "h264_mediacodec".to_string(),
                "h264_videotoolbox".to_string(),
                "h264_nvenc".to_string(),
                "libx264".to_string(),
            ],
            thumbnail_count: 10,
            thumbnail_width: 320,
            font_path: None,
            speech_sample_rate: 16_000,
        }
    }
}

impl EngineConfig {
    /// JSON 문서에서 설정 로드 (빈 문자열이면 기본값)
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json)
    }

    /// 코덱 펌프 대기/실패 정책
    pub fn pump_config(&self) -> PumpConfig {
        PumpConfig {
            input_wait: Duration::from_millis(self.input_wait_ms),
            output_wait: Duration::from_millis(self.output_wait_ms),
            max_consecutive_skips: self.max_consecutive_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{ "app_prefix": "Test", "max_consecutive_failures": 3 }"#).unwrap();
        assert_eq!(config.app_prefix, "Test");
        assert_eq!(config.max_consecutive_failures, 3);
        assert_eq!(config.input_wait_ms, 10);
        assert_eq!(config.min_video_bitrate, 8_000_000);
    }

    #[test]
    fn empty_json_is_default() {
        let config = EngineConfig::from_json("  ").unwrap();
        assert_eq!(config.thumbnail_count, 10);
        let pump = config.pump_config();
        assert_eq!(pump.max_consecutive_skips, 5);
        assert_eq!(pump.output_wait, Duration::from_millis(1));
    }
}
