//! 图片读取

use std::{io::Cursor, path::Path};

use image::{ImageFormat, RgbImage};

use crate::error::Error;

/// 读取图片并转换为 RGB 三通道
pub fn load_rgb_image(path: impl AsRef<Path>) -> Result<RgbImage, Error> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|e| Error::ImageLoad {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(img.into_rgb8())
}

/// 图像转换为 PNG buffer
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buffer = Vec::new();
    image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
    Ok(buffer)
}
