use std::path::PathBuf;

use thiserror::Error;

use crate::color_space::{ColorSpace, PixelFormat};

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("No display enumerated for adapter {adapter}")]
    NoDisplays { adapter: u32 },

    #[error("Display enumeration failed: {0}")]
    Platform(String),
}

#[derive(Error, Debug)]
pub enum PresentError {
    #[error("Swap chain resize to {width}x{height} {format:?} rejected: {reason}")]
    ResizeRejected {
        width: u32,
        height: u32,
        format: PixelFormat,
        reason: String,
    },

    #[error("Color space {0:?} is not supported for presentation")]
    UnsupportedColorSpace(ColorSpace),

    #[error("HDR metadata rejected: {0}")]
    MetadataRejected(String),

    #[error("GPU synchronization failed: {0}")]
    Sync(String),

    #[error("Failed to acquire swap chain buffers: {0}")]
    Acquire(String),
}

#[derive(Error, Debug)]
pub enum SwapChainError {
    /// The new buffer description was refused; the previous one was restored.
    #[error("Resize failed (previous buffers restored): {0}")]
    Resize(#[source] PresentError),

    #[error("Resize failed and previous buffers could not be restored: {0}")]
    Restore(#[source] PresentError),

    #[error(transparent)]
    Present(#[from] PresentError),
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unsupported texture file: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid DDS file: {0}")]
    InvalidDds(String),

    #[error("Unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),

    #[error("Image format error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Windows Imaging Component error: {0}")]
    Wic(String),
}
