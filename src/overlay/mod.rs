// 오버레이 설정 모듈
pub mod color;
pub mod model;

pub use color::parse_color;
pub use model::{ActiveOverlay, Alignment, HighlightWord, ImageOverlay, OverlayConfig, SubtitleOverlay, TextOverlay};
