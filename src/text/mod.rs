//! 文本

mod save_text;
pub use save_text::{save_text, sidecar_path, SIDECAR_EXTENSION};
