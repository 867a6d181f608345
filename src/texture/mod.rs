mod dds;
mod exr;
#[cfg(windows)]
mod wic;

use std::path::Path;

use log::info;

use crate::error::DecodeError;

pub use dds::parse_dds;

/// Texture container formats the viewer can open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureFormat {
    Dds,
    OpenExr,
    JpegXr,
}

impl TextureFormat {
    pub const FILE_EXTENSIONS: [(&'static str, &'static str); 3] =
        [("OpenEXR", "exr"), ("DDS", "dds"), ("JPEG XR", "jxr")];

    /// Classifies a file by extension, case-insensitively.
    pub fn from_path(path: &Path) -> Result<Self, DecodeError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("dds") => Ok(Self::Dds),
            Some("exr") => Ok(Self::OpenExr),
            Some("jxr") => Ok(Self::JpegXr),
            _ => Err(DecodeError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Pixel layouts a decoded texture can arrive in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TexelFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rgb10A2Unorm,
    Rgba16Float,
    Rgba32Float,
}

impl TexelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8Unorm | Self::Rgba8UnormSrgb | Self::Rgb10A2Unorm => 4,
            Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
        }
    }
}

/// One mip level with tightly packed rows.
#[derive(Clone, Debug, PartialEq)]
pub struct MipLevel {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl MipLevel {
    pub fn row_pitch(&self, format: TexelFormat) -> usize {
        self.width as usize * format.bytes_per_pixel()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: TexelFormat,
    pub mips: Vec<MipLevel>,
}

impl TextureData {
    pub fn mip_count(&self) -> u32 {
        self.mips.len() as u32
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// Decodes a DDS, OpenEXR or JPEG XR file.
pub fn decode(path: &Path) -> Result<TextureData, DecodeError> {
    let texture = match TextureFormat::from_path(path)? {
        TextureFormat::Dds => parse_dds(&std::fs::read(path)?)?,
        TextureFormat::OpenExr => exr::decode_exr(path)?,
        TextureFormat::JpegXr => decode_jxr(path)?,
    };
    info!(
        "decoded {} ({}x{}, {:?}, {} mips)",
        path.display(),
        texture.width,
        texture.height,
        texture.format,
        texture.mip_count()
    );
    Ok(texture)
}

#[cfg(windows)]
fn decode_jxr(path: &Path) -> Result<TextureData, DecodeError> {
    wic::decode_wic(path)
}

#[cfg(not(windows))]
fn decode_jxr(_path: &Path) -> Result<TextureData, DecodeError> {
    Err(DecodeError::Wic("JPEG XR decoding needs the Windows Imaging Component".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_extensions() {
        assert_eq!(TextureFormat::from_path(Path::new("a/b.exr")).unwrap(), TextureFormat::OpenExr);
        assert_eq!(TextureFormat::from_path(Path::new("B.DDS")).unwrap(), TextureFormat::Dds);
        assert_eq!(TextureFormat::from_path(Path::new("photo.jxr")).unwrap(), TextureFormat::JpegXr);
    }

    #[test]
    fn rejects_unknown_extensions() {
        for name in ["image.png", "noext", "archive.exr.zip"] {
            let err = TextureFormat::from_path(Path::new(name)).unwrap_err();
            assert!(matches!(err, DecodeError::UnsupportedFormat(_)), "{name}");
        }
    }

    #[test]
    fn decode_unsupported_does_not_touch_the_file() {
        let err = decode(Path::new("does/not/exist.tga")).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedFormat(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = decode(Path::new("does/not/exist.dds")).unwrap_err();
        assert!(matches!(err, DecodeError::Io(_)));
    }
}
