// 음성 인식 결과 파싱
// 한 줄에 단어 하나: "[MM:SS.CC --> MM:SS.CC] word" (센티초 해상도)

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// 인식된 단어 하나 (ms)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptWord {
    pub word: String,
    pub start_ms: i64,
    pub end_ms: i64,
}

static LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(\d{2,}):(\d{2})\.(\d{2}) --> (\d{2,}):(\d{2})\.(\d{2})\]\s+(.+)")
        .expect("transcript line pattern")
});

/// 형식에 맞지 않는 줄은 무시
pub fn parse_transcript(text: &str) -> Vec<TranscriptWord> {
    text.lines()
        .filter_map(|line| {
            let caps = LINE_REGEX.captures(line)?;
            let field = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<i64>().ok());
            let start_ms = to_millis(field(1)?, field(2)?, field(3)?);
            let end_ms = to_millis(field(4)?, field(5)?, field(6)?);
            let word = caps.get(7)?.as_str().trim();
            if word.is_empty() {
                return None;
            }
            Some(TranscriptWord {
                word: word.to_string(),
                start_ms,
                end_ms,
            })
        })
        .collect()
}

fn to_millis(minutes: i64, seconds: i64, centis: i64) -> i64 {
    minutes * 60_000 + seconds * 1000 + centis * 10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_word_lines() {
        let text = "[00:00.00 --> 00:00.38] So\n[00:00.38 --> 00:01.02]  today \n[01:02.50 --> 01:03.00] we";
        let words = parse_transcript(text);
        assert_eq!(
            words,
            vec![
                TranscriptWord { word: "So".into(), start_ms: 0, end_ms: 380 },
                TranscriptWord { word: "today".into(), start_ms: 380, end_ms: 1020 },
                TranscriptWord { word: "we".into(), start_ms: 62_500, end_ms: 63_000 },
            ]
        );
    }

    #[test]
    fn ignores_noise_lines() {
        let text = "whisper_init: loading model\n\n[00:01.00 --> 00:01.50]\n[0:01.00 --> 0:01.50] bad\n[00:02.00 --> 00:02.40] ok";
        let words = parse_transcript(text);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].word, "ok");
        assert_eq!(words[0].start_ms, 2000);
    }

    #[test]
    fn pattern_is_valid_and_reused_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                std::thread::spawn(move || {
                    parse_transcript(&format!("[100:0{i}.00 --> 100:0{i}.50] w{i}"))
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            let words = handle.join().unwrap();
            assert_eq!(words.len(), 1);
            assert_eq!(words[0].start_ms, 6_000_000 + i as i64 * 1000);
        }
    }
}
