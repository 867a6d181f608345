use std::fmt;
use std::str::FromStr;

/// Swap chain bit depth class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BitDepthTier {
    #[default]
    Depth8,
    Depth10,
    Depth16,
}

impl BitDepthTier {
    pub const ALL: [BitDepthTier; 3] = [Self::Depth8, Self::Depth10, Self::Depth16];

    pub fn next(self) -> Self {
        match self {
            Self::Depth8 => Self::Depth10,
            Self::Depth10 => Self::Depth16,
            Self::Depth16 => Self::Depth8,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Self::Depth8 => Self::Depth16,
            Self::Depth10 => Self::Depth8,
            Self::Depth16 => Self::Depth10,
        }
    }

    pub fn pixel_format(self) -> PixelFormat {
        match self {
            Self::Depth8 => PixelFormat::Rgba8Unorm,
            Self::Depth10 => PixelFormat::Rgb10A2Unorm,
            Self::Depth16 => PixelFormat::Rgba16Float,
        }
    }

    /// Label used by the edit panel, named after the curve each tier is meant to exercise.
    pub fn curve_label(self) -> &'static str {
        match self {
            Self::Depth8 => "sRGB",
            Self::Depth10 => "ST.2084",
            Self::Depth16 => "Linear",
        }
    }
}

impl fmt::Display for BitDepthTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits = match self {
            Self::Depth8 => 8,
            Self::Depth10 => 10,
            Self::Depth16 => 16,
        };
        write!(f, "{bits}-bit")
    }
}

impl FromStr for BitDepthTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_end_matches("-bit") {
            "8" => Ok(Self::Depth8),
            "10" => Ok(Self::Depth10),
            "16" => Ok(Self::Depth16),
            other => Err(format!("unknown bit depth '{other}', expected 8, 10 or 16")),
        }
    }
}

/// Back buffer pixel formats the viewer presents with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba8Unorm,
    Rgb10A2Unorm,
    Rgba16Float,
}

/// Color space tag sent to the display pipeline with the buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    /// Rec.709 primaries, gamma 2.2 (sRGB), full range.
    Rec709Srgb,
    /// Rec.2020 primaries, ST.2084 (PQ), full range. The HDR10 wire format.
    Rec2020Pq,
    /// Rec.709 primaries, linear, full range (scRGB).
    Rec709Linear,
}

/// Encoding the present pass applies before writing the back buffer.
///
/// Discriminants are the values the present shader switches on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TransferCurve {
    Srgb = 0,
    St2084 = 1,
    Linear = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorSpaceSelection {
    pub pixel_format: PixelFormat,
    pub color_space: ColorSpace,
    pub transfer_curve: TransferCurve,
}

/// Picks the buffer format, wire color space and output curve for a tier.
///
/// `hdr_enable` only matters at 10-bit, where it switches between sRGB and HDR10.
pub fn select(tier: BitDepthTier, hdr_enable: bool) -> ColorSpaceSelection {
    let (color_space, transfer_curve) = match (tier, hdr_enable) {
        (BitDepthTier::Depth8, _) => (ColorSpace::Rec709Srgb, TransferCurve::Srgb),
        (BitDepthTier::Depth10, false) => (ColorSpace::Rec709Srgb, TransferCurve::Srgb),
        (BitDepthTier::Depth10, true) => (ColorSpace::Rec2020Pq, TransferCurve::St2084),
        (BitDepthTier::Depth16, _) => (ColorSpace::Rec709Linear, TransferCurve::Linear),
    };

    ColorSpaceSelection {
        pixel_format: tier.pixel_format(),
        color_space,
        transfer_curve,
    }
}
