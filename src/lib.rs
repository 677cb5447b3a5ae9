//! JoyCaption 批量图片描述
//!
//! 扫描目录中的图片, 使用 JoyCaption 生成描述, 写入同名 `.txt` 文件

pub mod config;
pub mod error;
pub mod image;
pub mod joycaption;
pub mod model;
pub mod text;
pub mod utils;

pub use config::{CaptionConfig, ModelConfig};
pub use error::Error;
pub use joycaption::{CaptionPipeline, CaptionWorker, Style};
pub use model::{Captioner, GeneratedTokens, GenerationParams};
