use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::{ImageFormat, ImageReader};

use super::{MipLevel, TexelFormat, TextureData};
use crate::error::DecodeError;

/// Decodes an OpenEXR file into a single-mip RGBA32F texture.
pub(super) fn decode_exr(path: &Path) -> Result<TextureData, DecodeError> {
    let reader = ImageReader::with_format(BufReader::new(File::open(path)?), ImageFormat::OpenExr);
    let rgba = reader.decode()?.into_rgba32f();
    let (width, height) = rgba.dimensions();
    let data = rgba.into_raw().iter().flat_map(|v| v.to_le_bytes()).collect();

    Ok(TextureData {
        width,
        height,
        format: TexelFormat::Rgba32Float,
        mips: vec![MipLevel { width, height, data }],
    })
}
