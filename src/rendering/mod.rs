// 렌더링 모듈 - 오버레이 합성 + 색 변환

pub mod canvas;
pub mod color;
pub mod compositor;
pub mod text;

pub use color::{nv12_to_rgb, rgb_to_nv12};
pub use compositor::OverlayRenderer;
pub use text::FontFace;
