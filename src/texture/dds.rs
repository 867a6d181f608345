use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use super::{MipLevel, TexelFormat, TextureData};
use crate::error::DecodeError;

const DDS_MAGIC: &[u8; 4] = b"DDS ";
const DDS_HEADER_SIZE: u32 = 124;
const DDS_PIXELFORMAT_SIZE: u32 = 32;

const DDSD_MIPMAPCOUNT: u32 = 0x0002_0000;
const DDPF_FOURCC: u32 = 0x4;
const DDPF_RGB: u32 = 0x40;

const FOURCC_DX10: u32 = u32::from_le_bytes(*b"DX10");
// D3DFMT values stored in the fourCC field.
const D3DFMT_A16B16G16R16F: u32 = 113;
const D3DFMT_A32B32G32R32F: u32 = 116;

// DXGI_FORMAT values accepted in the DX10 extension header.
const DXGI_R32G32B32A32_FLOAT: u32 = 2;
const DXGI_R16G16B16A16_FLOAT: u32 = 10;
const DXGI_R10G10B10A2_UNORM: u32 = 24;
const DXGI_R8G8B8A8_UNORM: u32 = 28;
const DXGI_R8G8B8A8_UNORM_SRGB: u32 = 29;
const DXGI_B8G8R8A8_UNORM: u32 = 87;
const DXGI_B8G8R8A8_UNORM_SRGB: u32 = 91;

struct PixelFormatHeader {
    flags: u32,
    four_cc: u32,
    rgb_bit_count: u32,
    masks: [u32; 4],
}

/// Parses an uncompressed DDS image: the first array slice with all its mips.
pub fn parse_dds(bytes: &[u8]) -> Result<TextureData, DecodeError> {
    let mut cursor = Cursor::new(bytes);

    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic).map_err(truncated)?;
    if &magic != DDS_MAGIC {
        return Err(DecodeError::InvalidDds("missing 'DDS ' magic".into()));
    }

    let header_size = read_u32(&mut cursor)?;
    if header_size != DDS_HEADER_SIZE {
        return Err(DecodeError::InvalidDds(format!("header size {header_size}, expected 124")));
    }
    let flags = read_u32(&mut cursor)?;
    let height = read_u32(&mut cursor)?;
    let width = read_u32(&mut cursor)?;
    let _pitch_or_linear_size = read_u32(&mut cursor)?;
    let _depth = read_u32(&mut cursor)?;
    let mip_map_count = read_u32(&mut cursor)?;
    for _ in 0..11 {
        read_u32(&mut cursor)?;
    }

    let pf_size = read_u32(&mut cursor)?;
    if pf_size != DDS_PIXELFORMAT_SIZE {
        return Err(DecodeError::InvalidDds(format!("pixel format size {pf_size}, expected 32")));
    }
    let pixel_format = PixelFormatHeader {
        flags: read_u32(&mut cursor)?,
        four_cc: read_u32(&mut cursor)?,
        rgb_bit_count: read_u32(&mut cursor)?,
        masks: [
            read_u32(&mut cursor)?,
            read_u32(&mut cursor)?,
            read_u32(&mut cursor)?,
            read_u32(&mut cursor)?,
        ],
    };
    // caps, caps2, caps3, caps4, reserved2
    for _ in 0..5 {
        read_u32(&mut cursor)?;
    }

    if width == 0 || height == 0 {
        return Err(DecodeError::InvalidDds(format!("invalid dimensions {width}x{height}")));
    }

    let (format, swizzle_bgra) = if pixel_format.flags & DDPF_FOURCC != 0 && pixel_format.four_cc == FOURCC_DX10 {
        let dxgi_format = read_u32(&mut cursor)?;
        // resource dimension, misc flag, array size, misc flags 2
        for _ in 0..4 {
            read_u32(&mut cursor)?;
        }
        dxgi_texel_format(dxgi_format)?
    } else {
        legacy_texel_format(&pixel_format)?
    };

    let mip_count = if flags & DDSD_MIPMAPCOUNT != 0 {
        mip_map_count.max(1)
    } else {
        1
    };
    let mip_count = mip_count.min(32 - width.max(height).leading_zeros());

    let mut offset = cursor.position() as usize;
    let mut mips = Vec::with_capacity(mip_count as usize);
    for level in 0..mip_count {
        let mip_width = (width >> level).max(1);
        let mip_height = (height >> level).max(1);
        let size = (mip_width as usize)
            .checked_mul(mip_height as usize)
            .and_then(|texels| texels.checked_mul(format.bytes_per_pixel()))
            .ok_or_else(|| DecodeError::InvalidDds(format!("mip {level} size overflows")))?;
        let end = offset
            .checked_add(size)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| DecodeError::InvalidDds(format!("mip {level} truncated")))?;

        let mut data = bytes[offset..end].to_vec();
        if swizzle_bgra {
            for pixel in data.chunks_exact_mut(4) {
                pixel.swap(0, 2);
            }
        }
        mips.push(MipLevel {
            width: mip_width,
            height: mip_height,
            data,
        });
        offset = end;
    }

    Ok(TextureData {
        width,
        height,
        format,
        mips,
    })
}

fn dxgi_texel_format(dxgi_format: u32) -> Result<(TexelFormat, bool), DecodeError> {
    match dxgi_format {
        DXGI_R32G32B32A32_FLOAT => Ok((TexelFormat::Rgba32Float, false)),
        DXGI_R16G16B16A16_FLOAT => Ok((TexelFormat::Rgba16Float, false)),
        DXGI_R10G10B10A2_UNORM => Ok((TexelFormat::Rgb10A2Unorm, false)),
        DXGI_R8G8B8A8_UNORM => Ok((TexelFormat::Rgba8Unorm, false)),
        DXGI_R8G8B8A8_UNORM_SRGB => Ok((TexelFormat::Rgba8UnormSrgb, false)),
        DXGI_B8G8R8A8_UNORM => Ok((TexelFormat::Rgba8Unorm, true)),
        DXGI_B8G8R8A8_UNORM_SRGB => Ok((TexelFormat::Rgba8UnormSrgb, true)),
        other => Err(DecodeError::UnsupportedPixelFormat(format!("DXGI format {other}"))),
    }
}

fn legacy_texel_format(pf: &PixelFormatHeader) -> Result<(TexelFormat, bool), DecodeError> {
    if pf.flags & DDPF_FOURCC != 0 {
        return match pf.four_cc {
            D3DFMT_A16B16G16R16F => Ok((TexelFormat::Rgba16Float, false)),
            D3DFMT_A32B32G32R32F => Ok((TexelFormat::Rgba32Float, false)),
            other => {
                let code = other.to_le_bytes();
                let name = if code.iter().all(u8::is_ascii_alphanumeric) {
                    String::from_utf8_lossy(&code).into_owned()
                } else {
                    other.to_string()
                };
                Err(DecodeError::UnsupportedPixelFormat(format!("fourCC {name}")))
            }
        };
    }

    if pf.flags & DDPF_RGB != 0 && pf.rgb_bit_count == 32 {
        match pf.masks {
            [0x0000_00ff, 0x0000_ff00, 0x00ff_0000, _] => return Ok((TexelFormat::Rgba8Unorm, false)),
            [0x00ff_0000, 0x0000_ff00, 0x0000_00ff, _] => return Ok((TexelFormat::Rgba8Unorm, true)),
            [0x0000_03ff, 0x000f_fc00, 0x3ff0_0000, _] => return Ok((TexelFormat::Rgb10A2Unorm, false)),
            _ => {}
        }
    }

    Err(DecodeError::UnsupportedPixelFormat(format!(
        "{}-bit RGB masks {:08x?}",
        pf.rgb_bit_count, pf.masks
    )))
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, DecodeError> {
    cursor.read_u32::<LittleEndian>().map_err(truncated)
}

fn truncated(_: std::io::Error) -> DecodeError {
    DecodeError::InvalidDds("header truncated".into())
}
