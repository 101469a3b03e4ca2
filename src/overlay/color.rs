// 색 문자열 파싱: #RRGGBB, #AARRGGBB, 기본 색 이름

use crate::error::{EngineError, EngineResult};
use image::Rgba;

const NAMED: &[(&str, [u8; 3])] = &[
    ("black", [0x00, 0x00, 0x00]),
    ("darkgray", [0x44, 0x44, 0x44]),
    ("darkgrey", [0x44, 0x44, 0x44]),
    ("gray", [0x88, 0x88, 0x88]),
    ("grey", [0x88, 0x88, 0x88]),
    ("lightgray", [0xCC, 0xCC, 0xCC]),
    ("lightgrey", [0xCC, 0xCC, 0xCC]),
    ("white", [0xFF, 0xFF, 0xFF]),
    ("red", [0xFF, 0x00, 0x00]),
    ("green", [0x00, 0xFF, 0x00]),
    ("blue", [0x00, 0x00, 0xFF]),
    ("yellow", [0xFF, 0xFF, 0x00]),
    ("cyan", [0x00, 0xFF, 0xFF]),
    ("magenta", [0xFF, 0x00, 0xFF]),
    ("aqua", [0x00, 0xFF, 0xFF]),
    ("fuchsia", [0xFF, 0x00, 0xFF]),
    ("lime", [0x00, 0xFF, 0x00]),
    ("maroon", [0x80, 0x00, 0x00]),
    ("navy", [0x00, 0x00, 0x80]),
    ("olive", [0x80, 0x80, 0x00]),
    ("purple", [0x80, 0x00, 0x80]),
    ("silver", [0xC0, 0xC0, 0xC0]),
    ("teal", [0x00, 0x80, 0x80]),
];

/// 색 문자열 → RGBA
pub fn parse_color(value: &str) -> EngineResult<Rgba<u8>> {
    let value = value.trim();
    let invalid = || EngineError::InvalidOverlay(format!("unknown color '{}'", value));

    if let Some(hex) = value.strip_prefix('#') {
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        return match hex.len() {
            6 => Ok(Rgba([byte(0)?, byte(2)?, byte(4)?, 0xFF])),
            8 => Ok(Rgba([byte(2)?, byte(4)?, byte(6)?, byte(0)?])),
            _ => Err(invalid()),
        };
    }

    NAMED
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(value))
        .map(|(_, [r, g, b])| Rgba([*r, *g, *b, 0xFF]))
        .ok_or_else(invalid)
}
