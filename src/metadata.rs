use glam::Vec2;

use crate::color_space::{BitDepthTier, ColorSpace};
use crate::display::Chromaticities;

/// Chromaticity coordinates are sent in units of 0.00002.
pub const CHROMATICITY_SCALE: f32 = 50000.0;
/// Mastering luminance is sent in units of 0.0001 nits.
pub const LUMINANCE_SCALE: f32 = 10000.0;

/// HDR10 static metadata in the fixed-point layout the display pipeline expects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Hdr10Metadata {
    pub red_primary: [u16; 2],
    pub green_primary: [u16; 2],
    pub blue_primary: [u16; 2],
    pub white_point: [u16; 2],
    pub max_mastering_luminance: u32,
    pub min_mastering_luminance: u32,
    pub max_content_light_level: u16,
    pub max_frame_average_light_level: u16,
}

/// Mastering and content light levels, in nits.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetadataProfile {
    pub max_output_nits: f32,
    pub min_output_nits: f32,
    pub max_cll: f32,
    pub max_fall: f32,
}

/// Built-in metadata test profiles. A display should visibly adapt its tone
/// mapping when these are cycled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MetadataPreset {
    #[default]
    Peak1000,
    Peak500,
    Peak500Dim,
    Peak2000,
}

impl MetadataPreset {
    pub const ALL: [MetadataPreset; 4] = [Self::Peak1000, Self::Peak500, Self::Peak500Dim, Self::Peak2000];

    pub fn profile(self) -> MetadataProfile {
        let (max_output_nits, min_output_nits, max_cll, max_fall) = match self {
            Self::Peak1000 => (1000.0, 0.001, 2000.0, 500.0),
            Self::Peak500 => (500.0, 0.001, 2000.0, 500.0),
            Self::Peak500Dim => (500.0, 0.100, 500.0, 100.0),
            Self::Peak2000 => (2000.0, 1.000, 2000.0, 1000.0),
        };
        MetadataProfile {
            max_output_nits,
            min_output_nits,
            max_cll,
            max_fall,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::Peak1000 => 0,
            Self::Peak500 => 1,
            Self::Peak500Dim => 2,
            Self::Peak2000 => 3,
        }
    }

    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % Self::ALL.len()]
    }

    pub fn next(self) -> Self {
        Self::from_index(self.index() + 1)
    }
}

/// Builds the HDR10 metadata for the active output, or `None` to clear it.
///
/// Only 16-bit scRGB and 10-bit HDR10 on an HDR-capable display carry metadata.
pub fn build_metadata(
    tier: BitDepthTier,
    color_space: ColorSpace,
    profile: &MetadataProfile,
    hdr_capable: bool,
) -> Option<Hdr10Metadata> {
    if !hdr_capable {
        return None;
    }

    let chroma = match (tier, color_space) {
        (BitDepthTier::Depth16, ColorSpace::Rec709Linear) => Chromaticities::REC709,
        (BitDepthTier::Depth10, ColorSpace::Rec2020Pq) => Chromaticities::REC2020,
        _ => return None,
    };

    Some(Hdr10Metadata {
        red_primary: scale_chromaticity(chroma.red),
        green_primary: scale_chromaticity(chroma.green),
        blue_primary: scale_chromaticity(chroma.blue),
        white_point: scale_chromaticity(chroma.white),
        max_mastering_luminance: (profile.max_output_nits * LUMINANCE_SCALE) as u32,
        min_mastering_luminance: (profile.min_output_nits * LUMINANCE_SCALE) as u32,
        max_content_light_level: profile.max_cll as u16,
        max_frame_average_light_level: profile.max_fall as u16,
    })
}

fn scale_chromaticity(xy: Vec2) -> [u16; 2] {
    let scaled = xy * CHROMATICITY_SCALE;
    [scaled.x as u16, scaled.y as u16]
}

#[cfg(test)]
mod tests {
    use super::*;

    const HDR_PAIRS: [(BitDepthTier, ColorSpace); 2] = [
        (BitDepthTier::Depth10, ColorSpace::Rec2020Pq),
        (BitDepthTier::Depth16, ColorSpace::Rec709Linear),
    ];

    fn all_color_spaces() -> [ColorSpace; 3] {
        [ColorSpace::Rec709Srgb, ColorSpace::Rec2020Pq, ColorSpace::Rec709Linear]
    }

    #[test]
    fn cleared_when_display_is_not_hdr() {
        for preset in MetadataPreset::ALL {
            for tier in BitDepthTier::ALL {
                for space in all_color_spaces() {
                    assert_eq!(build_metadata(tier, space, &preset.profile(), false), None);
                }
            }
        }
    }

    #[test]
    fn only_validated_pairs_carry_metadata() {
        let profile = MetadataPreset::Peak1000.profile();
        for tier in BitDepthTier::ALL {
            for space in all_color_spaces() {
                let block = build_metadata(tier, space, &profile, true);
                assert_eq!(block.is_some(), HDR_PAIRS.contains(&(tier, space)), "{tier:?} {space:?}");
            }
        }
    }

    #[test]
    fn hdr10_uses_rec2020_primaries() {
        let block = build_metadata(
            BitDepthTier::Depth10,
            ColorSpace::Rec2020Pq,
            &MetadataPreset::Peak1000.profile(),
            true,
        )
        .unwrap();
        assert_eq!(block.red_primary, [35400, 14600]);
        assert_eq!(block.green_primary, [8500, 39850]);
        assert_eq!(block.blue_primary[1], 2300);
        assert_eq!(block.max_mastering_luminance, 10_000_000);
        assert_eq!(block.min_mastering_luminance, 10);
        assert_eq!(block.max_content_light_level, 2000);
        assert_eq!(block.max_frame_average_light_level, 500);
    }

    #[test]
    fn scrgb_uses_rec709_primaries() {
        let block = build_metadata(
            BitDepthTier::Depth16,
            ColorSpace::Rec709Linear,
            &MetadataPreset::Peak2000.profile(),
            true,
        )
        .unwrap();
        assert_eq!(block.red_primary, [32000, 16500]);
        assert_eq!(block.blue_primary[0], 7500);
        assert_eq!(block.max_mastering_luminance, 20_000_000);
        assert_eq!(block.min_mastering_luminance, 10_000);
        assert_eq!(block.max_frame_average_light_level, 1000);
    }

    #[test]
    fn chromaticity_round_trip() {
        let tolerance = 1.5 / CHROMATICITY_SCALE;
        for (tier, space, chroma) in [
            (BitDepthTier::Depth10, ColorSpace::Rec2020Pq, Chromaticities::REC2020),
            (BitDepthTier::Depth16, ColorSpace::Rec709Linear, Chromaticities::REC709),
        ] {
            let block = build_metadata(tier, space, &MetadataPreset::Peak500.profile(), true).unwrap();
            let pairs = [
                (block.red_primary, chroma.red),
                (block.green_primary, chroma.green),
                (block.blue_primary, chroma.blue),
                (block.white_point, chroma.white),
            ];
            for (scaled, original) in pairs {
                approx::assert_abs_diff_eq!(scaled[0] as f32 / CHROMATICITY_SCALE, original.x, epsilon = tolerance);
                approx::assert_abs_diff_eq!(scaled[1] as f32 / CHROMATICITY_SCALE, original.y, epsilon = tolerance);
            }
        }
    }

    #[test]
    fn presets_cycle_modulo_four() {
        let start = MetadataPreset::Peak500Dim;
        let mut preset = start;
        for _ in 0..4 {
            preset = preset.next();
        }
        assert_eq!(preset, start);
        assert_eq!(MetadataPreset::from_index(7), MetadataPreset::Peak2000);
        for (i, preset) in MetadataPreset::ALL.iter().enumerate() {
            assert_eq!(preset.index(), i);
        }
    }
}
