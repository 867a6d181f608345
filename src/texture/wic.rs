use std::path::Path;

use windows::Win32::Foundation::GENERIC_READ;
use windows::Win32::Graphics::Imaging::*;
use windows::Win32::System::Com::{CLSCTX_INPROC_SERVER, COINIT_MULTITHREADED, CoCreateInstance, CoInitializeEx};
use windows::core::HSTRING;

use super::{MipLevel, TexelFormat, TextureData};
use crate::error::DecodeError;

/// Decodes any WIC-readable image (JPEG XR included) to RGBA16F.
pub(super) fn decode_wic(path: &Path) -> Result<TextureData, DecodeError> {
    let wic_err = |what: &str, err: windows::core::Error| DecodeError::Wic(format!("{what}: {err}"));

    unsafe {
        // S_FALSE / RPC_E_CHANGED_MODE just mean COM is already up on this thread.
        let _ = CoInitializeEx(None, COINIT_MULTITHREADED);

        let factory: IWICImagingFactory = CoCreateInstance(&CLSID_WICImagingFactory, None, CLSCTX_INPROC_SERVER)
            .map_err(|e| wic_err("CoCreateInstance", e))?;

        let decoder = factory
            .CreateDecoderFromFilename(
                &HSTRING::from(path.as_os_str()),
                None,
                GENERIC_READ,
                WICDecodeMetadataCacheOnDemand,
            )
            .map_err(|e| wic_err("CreateDecoderFromFilename", e))?;
        let frame = decoder.GetFrame(0).map_err(|e| wic_err("GetFrame", e))?;

        let converter = factory
            .CreateFormatConverter()
            .map_err(|e| wic_err("CreateFormatConverter", e))?;
        converter
            .Initialize(
                &frame,
                &GUID_WICPixelFormat64bppRGBAHalf,
                WICBitmapDitherTypeNone,
                None,
                0.0,
                WICBitmapPaletteTypeCustom,
            )
            .map_err(|e| wic_err("IWICFormatConverter::Initialize", e))?;

        let mut width = 0;
        let mut height = 0;
        converter
            .GetSize(&mut width, &mut height)
            .map_err(|e| wic_err("GetSize", e))?;

        let format = TexelFormat::Rgba16Float;
        let stride = width as usize * format.bytes_per_pixel();
        let mut data = vec![0u8; stride * height as usize];
        converter
            .CopyPixels(std::ptr::null(), stride as u32, &mut data)
            .map_err(|e| wic_err("CopyPixels", e))?;

        Ok(TextureData {
            width,
            height,
            format,
            mips: vec![MipLevel { width, height, data }],
        })
    }
}
