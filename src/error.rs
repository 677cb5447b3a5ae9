//! 错误处理

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // 标准库错误处理
    #[error("io error, {0}")]
    Io(std::io::Error),
    #[error("serde json error, {0}")]
    SerdeJsonError(#[from] serde_json::Error),
    #[error("walkdir error, {0}")]
    WalkDirError(#[from] walkdir::Error),
    #[error("invalid parameter, {0}")]
    InvalidParameter(String),

    // 批处理启动阶段, 直接终止本次运行
    #[error("directory not found, {}", .0.display())]
    DirectoryNotFound(PathBuf),
    #[error("model not found, {0}")]
    ModelNotFound(String),
    #[error("model load error, {0}")]
    ModelLoad(String),

    // 单张图片的错误, 记录后继续处理下一张
    #[error("image load error, {}: {source}", path.display())]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("generation error, {0}")]
    Generation(String),
    #[error("persistence error, {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("worker thread panicked")]
    WorkerPanicked,
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}
