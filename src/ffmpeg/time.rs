// 타임스탬프 변환 - 엔진 내부는 전부 마이크로초

use ffmpeg_next as ffmpeg;

/// 엔진 공통 타임베이스 (1/1,000,000)
pub const MICROS: ffmpeg::Rational = ffmpeg::Rational(1, 1_000_000);

/// 스트림 타임베이스 값 → 마이크로초
pub fn to_micros(ts: i64, time_base: ffmpeg::Rational) -> i64 {
    let num = i128::from(time_base.numerator());
    let den = i128::from(time_base.denominator());
    if den == 0 {
        return 0;
    }
    (i128::from(ts) * num * 1_000_000 / den) as i64
}

/// 마이크로초 → 스트림 타임베이스 값
pub fn from_micros(us: i64, time_base: ffmpeg::Rational) -> i64 {
    let num = i128::from(time_base.numerator());
    let den = i128::from(time_base.denominator());
    if num == 0 {
        return 0;
    }
    (i128::from(us) * den / (num * 1_000_000)) as i64
}

/// 초(f64) → 마이크로초
pub fn secs_to_micros(secs: f64) -> i64 {
    (secs * 1_000_000.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_common_time_bases() {
        let mp4_video = ffmpeg::Rational(1, 15360);
        assert_eq!(to_micros(15360, mp4_video), 1_000_000);
        assert_eq!(from_micros(500_000, mp4_video), 7680);

        let audio = ffmpeg::Rational(1, 44100);
        assert_eq!(to_micros(1024, audio), 23219);
        assert_eq!(to_micros(42, MICROS), 42);
    }

    #[test]
    fn zero_time_base_does_not_panic() {
        assert_eq!(to_micros(10, ffmpeg::Rational(1, 0)), 0);
        assert_eq!(from_micros(10, ffmpeg::Rational(0, 1)), 0);
    }

    #[test]
    fn seconds_round_to_micros() {
        assert_eq!(secs_to_micros(1.5), 1_500_000);
        assert_eq!(secs_to_micros(0.0000004), 0);
    }
}
