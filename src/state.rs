use std::path::{Path, PathBuf};

use log::info;

use crate::color_space::{BitDepthTier, ColorSpaceSelection, select};
use crate::display::DisplayDescriptor;
use crate::metadata::MetadataPreset;

pub const DEFAULT_REFERENCE_WHITE_NITS: f32 = 80.0;
pub const EV_RANGE: std::ops::RangeInclusive<f32> = -8.0..=8.0;

/// Root constants for the present pass, in register order.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShaderConstants {
    pub reference_white_nits: f32,
    pub display_curve: u32,
    pub ev_value: f32,
    pub heatmap: u32,
}

/// User requests coming from keys or the edit panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewerCommand {
    PrevTier,
    NextTier,
    SetTier(BitDepthTier),
    ToggleSt2084,
    CycleMetadata,
    ShowPanels,
    ToggleFullscreen,
    OpenTexture,
}

/// What the host has to do after a command changed the state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    None,
    /// Color space and metadata must be re-applied.
    ColorState,
    /// Buffers must be recreated in a new format.
    Buffers,
    Fullscreen,
    OpenTexture,
}

/// Outcome of the last texture load, shown in the edit panel.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadStatus {
    Loaded(PathBuf),
    Failed { path: PathBuf, message: String },
}

/// Everything the viewer knows about the current output.
#[derive(Clone, Debug)]
pub struct ViewerState {
    pub tier: BitDepthTier,
    pub hdr_enable: bool,
    hdr_support: bool,
    output: Option<DisplayDescriptor>,
    pub metadata_preset: MetadataPreset,
    pub ev_value: f32,
    pub heatmap: bool,
    pub reference_white_nits: f32,
    pub show_edit_window: bool,
    pub show_display_info: bool,
    load_status: Option<LoadStatus>,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewerState {
    pub fn new() -> Self {
        Self {
            tier: BitDepthTier::Depth8,
            hdr_enable: false,
            hdr_support: false,
            output: None,
            metadata_preset: MetadataPreset::default(),
            ev_value: 0.0,
            heatmap: false,
            reference_white_nits: DEFAULT_REFERENCE_WHITE_NITS,
            show_edit_window: true,
            show_display_info: true,
            load_status: None,
        }
    }

    pub fn hdr_support(&self) -> bool {
        self.hdr_support
    }

    /// Descriptor of the display the window was last found on.
    pub fn output(&self) -> Option<&DisplayDescriptor> {
        self.output.as_ref()
    }

    pub fn load_status(&self) -> Option<&LoadStatus> {
        self.load_status.as_ref()
    }

    pub fn selection(&self) -> ColorSpaceSelection {
        select(self.tier, self.hdr_enable)
    }

    pub fn shader_constants(&self) -> ShaderConstants {
        ShaderConstants {
            reference_white_nits: self.reference_white_nits,
            display_curve: self.selection().transfer_curve as u32,
            ev_value: self.ev_value,
            heatmap: self.heatmap as u32,
        }
    }

    /// Records a probe result. Returns true when HDR support changed.
    pub fn apply_probe(&mut self, display: &DisplayDescriptor, hdr_capable: bool) -> bool {
        let changed = self.hdr_support != hdr_capable;
        if changed || self.output.as_ref().is_none_or(|d| d.name != display.name) {
            info!(
                "output '{}' HDR support: {}",
                display.name,
                if hdr_capable { "yes" } else { "no" }
            );
        }
        self.hdr_support = hdr_capable;
        self.output = Some(display.clone());
        changed
    }

    /// Turns ST.2084 on when the first probe finds an HDR display.
    pub fn init_from_probe(&mut self, display: &DisplayDescriptor, hdr_capable: bool) {
        self.apply_probe(display, hdr_capable);
        self.hdr_enable = hdr_capable;
    }

    pub fn apply(&mut self, command: ViewerCommand) -> Effect {
        match command {
            ViewerCommand::PrevTier => {
                self.tier = self.tier.prev();
                Effect::Buffers
            }
            ViewerCommand::NextTier => {
                self.tier = self.tier.next();
                Effect::Buffers
            }
            ViewerCommand::SetTier(tier) => {
                if tier == self.tier {
                    return Effect::None;
                }
                self.tier = tier;
                Effect::Buffers
            }
            ViewerCommand::ToggleSt2084 => {
                self.hdr_enable = !self.hdr_enable;
                if self.tier == BitDepthTier::Depth10 {
                    Effect::ColorState
                } else {
                    Effect::None
                }
            }
            ViewerCommand::CycleMetadata => {
                self.metadata_preset = self.metadata_preset.next();
                info!("metadata preset {:?}", self.metadata_preset);
                Effect::ColorState
            }
            ViewerCommand::ShowPanels => {
                self.show_edit_window = true;
                self.show_display_info = true;
                Effect::None
            }
            ViewerCommand::ToggleFullscreen => Effect::Fullscreen,
            ViewerCommand::OpenTexture => Effect::OpenTexture,
        }
    }

    pub fn set_ev(&mut self, ev: f32) {
        self.ev_value = ev.clamp(*EV_RANGE.start(), *EV_RANGE.end());
    }

    pub fn record_load(&mut self, path: &Path, result: Result<(), String>) {
        self.load_status = Some(match result {
            Ok(()) => LoadStatus::Loaded(path.to_path_buf()),
            Err(message) => LoadStatus::Failed {
                path: path.to_path_buf(),
                message,
            },
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color_space::{ColorSpace, TransferCurve};
    use crate::geometry::Rect;

    fn tv() -> DisplayDescriptor {
        DisplayDescriptor::new("tv", Rect::new(0, 0, 3840, 2160), true)
    }

    #[test]
    fn starts_sdr_8bit() {
        let state = ViewerState::new();
        assert_eq!(state.tier, BitDepthTier::Depth8);
        assert!(!state.hdr_enable);
        assert!(!state.hdr_support());
        assert_eq!(state.metadata_preset.index(), 0);
    }

    #[test]
    fn first_probe_enables_st2084() {
        let mut state = ViewerState::new();
        state.init_from_probe(&tv(), true);
        assert!(state.hdr_enable);
        assert_eq!(state.output().map(|d| d.name.as_str()), Some("tv"));
    }

    #[test]
    fn later_probes_keep_user_choice() {
        let mut state = ViewerState::new();
        state.init_from_probe(&tv(), true);
        state.hdr_enable = false;
        assert!(!state.apply_probe(&tv(), true));
        assert!(!state.hdr_enable);

        let monitor = DisplayDescriptor::new("monitor", Rect::new(3840, 0, 5760, 1080), false);
        assert!(state.apply_probe(&monitor, false));
        assert!(!state.hdr_support());
    }

    #[test]
    fn tier_commands_need_new_buffers() {
        let mut state = ViewerState::new();
        assert_eq!(state.apply(ViewerCommand::NextTier), Effect::Buffers);
        assert_eq!(state.tier, BitDepthTier::Depth10);
        assert_eq!(state.apply(ViewerCommand::PrevTier), Effect::Buffers);
        assert_eq!(state.apply(ViewerCommand::PrevTier), Effect::Buffers);
        assert_eq!(state.tier, BitDepthTier::Depth16);
        assert_eq!(state.apply(ViewerCommand::SetTier(BitDepthTier::Depth16)), Effect::None);
    }

    #[test]
    fn st2084_toggle_only_reapplies_at_10bit() {
        let mut state = ViewerState::new();
        assert_eq!(state.apply(ViewerCommand::ToggleSt2084), Effect::None);
        assert!(state.hdr_enable);

        state.tier = BitDepthTier::Depth10;
        assert_eq!(state.apply(ViewerCommand::ToggleSt2084), Effect::ColorState);
        assert_eq!(state.selection().color_space, ColorSpace::Rec709Srgb);
    }

    #[test]
    fn tier_change_to_hdr10_on_hdr_display() {
        let mut state = ViewerState::new();
        state.init_from_probe(&tv(), true);
        state.apply(ViewerCommand::SetTier(BitDepthTier::Depth10));

        let selection = state.selection();
        assert_eq!(selection.color_space, ColorSpace::Rec2020Pq);
        assert_eq!(selection.transfer_curve, TransferCurve::St2084);
    }

    #[test]
    fn metadata_cycle_returns_after_four() {
        let mut state = ViewerState::new();
        let start = state.metadata_preset;
        for _ in 0..4 {
            assert_eq!(state.apply(ViewerCommand::CycleMetadata), Effect::ColorState);
        }
        assert_eq!(state.metadata_preset, start);
    }

    #[test]
    fn shader_constants_follow_state() {
        let mut state = ViewerState::new();
        state.tier = BitDepthTier::Depth16;
        state.heatmap = true;
        state.set_ev(12.0);
        let constants = state.shader_constants();
        assert_eq!(constants.display_curve, TransferCurve::Linear as u32);
        assert_eq!(constants.heatmap, 1);
        assert_eq!(constants.ev_value, 8.0);
        assert_eq!(constants.reference_white_nits, DEFAULT_REFERENCE_WHITE_NITS);
        assert_eq!(std::mem::size_of::<ShaderConstants>(), 16);
    }

    #[test]
    fn show_panels_reopens_both() {
        let mut state = ViewerState::new();
        state.show_edit_window = false;
        state.show_display_info = false;
        state.apply(ViewerCommand::ShowPanels);
        assert!(state.show_edit_window && state.show_display_info);
    }

    #[test]
    fn failed_load_is_recorded() {
        let mut state = ViewerState::new();
        state.record_load(Path::new("a.png"), Err("unsupported".into()));
        assert!(matches!(state.load_status(), Some(LoadStatus::Failed { .. })));
    }
}
