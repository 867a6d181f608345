use std::path::PathBuf;
use std::sync::Once;

use clap::Parser;

use crate::color_space::BitDepthTier;
use crate::metadata::MetadataPreset;
use crate::state::{DEFAULT_REFERENCE_WHITE_NITS, ViewerState};

#[derive(Parser, Debug, Clone)]
#[command(name = "hdrviewer", about = "HDR swap chain viewer for DDS, OpenEXR and JPEG XR images")]
#[command(version)]
pub struct ViewerConfig {
    /// Initial client width in pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Initial client height in pixels
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Render on the WARP software adapter
    #[arg(long)]
    pub warp: bool,

    /// Back buffer bit depth at startup (8, 10 or 16)
    #[arg(long, default_value = "8")]
    pub bit_depth: BitDepthTier,

    /// HDR10 metadata preset index (0-3)
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..4))]
    pub metadata_preset: u8,

    /// Luminance of scRGB 1.0 in the present pass, in nits
    #[arg(long, default_value_t = DEFAULT_REFERENCE_WHITE_NITS)]
    pub reference_white: f32,

    /// DDS, OpenEXR or JPEG XR file to open at startup
    #[arg(long)]
    pub texture: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl ViewerConfig {
    /// Viewer state before the first display probe.
    pub fn initial_state(&self) -> ViewerState {
        let mut state = ViewerState::new();
        state.tier = self.bit_depth;
        state.metadata_preset = MetadataPreset::from_index(self.metadata_preset as usize);
        if self.reference_white.is_finite() && self.reference_white > 0.0 {
            state.reference_white_nits = self.reference_white;
        }
        state
    }
}

static INIT: Once = Once::new();

/// Initializes `env_logger` once. `RUST_LOG` wins over the verbosity flag.
pub fn init_logging(verbose: bool) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        if let Ok(filter) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filter);
        } else if verbose {
            builder.filter_level(log::LevelFilter::Debug);
        } else {
            builder.filter_level(log::LevelFilter::Info);
        }
        builder.init();
        log::debug!("logging initialized");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ViewerConfig::try_parse_from(["hdrviewer"]).unwrap();
        assert_eq!((config.width, config.height), (1280, 720));
        assert_eq!(config.bit_depth, BitDepthTier::Depth8);
        assert!(!config.warp);
        assert!(config.texture.is_none());

        let state = config.initial_state();
        assert_eq!(state.metadata_preset, MetadataPreset::Peak1000);
        assert_eq!(state.reference_white_nits, DEFAULT_REFERENCE_WHITE_NITS);
    }

    #[test]
    fn overrides_feed_initial_state() {
        let config = ViewerConfig::try_parse_from([
            "hdrviewer",
            "--bit-depth",
            "10",
            "--metadata-preset",
            "3",
            "--reference-white",
            "203",
            "--texture",
            "scene.exr",
        ])
        .unwrap();
        let state = config.initial_state();
        assert_eq!(state.tier, BitDepthTier::Depth10);
        assert_eq!(state.metadata_preset, MetadataPreset::Peak2000);
        assert_eq!(state.reference_white_nits, 203.0);
        assert_eq!(config.texture, Some(PathBuf::from("scene.exr")));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(ViewerConfig::try_parse_from(["hdrviewer", "--bit-depth", "12"]).is_err());
        assert!(ViewerConfig::try_parse_from(["hdrviewer", "--metadata-preset", "4"]).is_err());
    }

    #[test]
    fn non_positive_reference_white_keeps_default() {
        let config = ViewerConfig::try_parse_from(["hdrviewer", "--reference-white", "0"]).unwrap();
        assert_eq!(config.initial_state().reference_white_nits, DEFAULT_REFERENCE_WHITE_NITS);
    }
}
