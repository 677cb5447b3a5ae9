//! 图片

mod folder_scanner;
pub use folder_scanner::{FolderScanner, SUPPORTED_EXTENSIONS};

mod loader;
pub use loader::{encode_png, load_rgb_image};
