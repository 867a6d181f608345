use std::collections::VecDeque;

use hdrviewer::color_space::{BitDepthTier, ColorSpace, PixelFormat, TransferCurve};
use hdrviewer::display::{Chromaticities, DisplayDescriptor, DisplayProvider, probe_provider};
use hdrviewer::error::{DecodeError, DisplayError, PresentError, SwapChainError};
use hdrviewer::geometry::Rect;
use hdrviewer::metadata::{CHROMATICITY_SCALE, Hdr10Metadata, MetadataPreset};
use hdrviewer::state::{Effect, LoadStatus, ViewerCommand, ViewerState};
use hdrviewer::swapchain::{BufferDesc, FRAME_COUNT, PresentationLayer, ReconfigurePhase, SwapChain};
use hdrviewer::texture;

/// Presentation layer that rejects zero-sized buffers the way DXGI does, plus
/// any format listed in `rejected_formats`.
#[derive(Default)]
struct StubPresenter {
    buffers: Option<BufferDesc>,
    color_space: Option<ColorSpace>,
    metadata: Option<Option<Hdr10Metadata>>,
    unsupported: Vec<ColorSpace>,
    rejected_formats: Vec<PixelFormat>,
    fail_restore: bool,
    resize_calls: usize,
}

impl PresentationLayer for StubPresenter {
    fn wait_for_gpu_idle(&mut self) -> Result<(), PresentError> {
        Ok(())
    }

    fn release_buffers(&mut self) {}

    fn resize_buffers(&mut self, desc: &BufferDesc) -> Result<(), PresentError> {
        self.resize_calls += 1;
        if desc.width == 0
            || desc.height == 0
            || self.rejected_formats.contains(&desc.format)
            || (self.fail_restore && self.resize_calls > 1)
        {
            return Err(PresentError::ResizeRejected {
                width: desc.width,
                height: desc.height,
                format: desc.format,
                reason: "buffer description refused".into(),
            });
        }
        self.buffers = Some(*desc);
        Ok(())
    }

    fn acquire_buffers(&mut self) -> Result<u32, PresentError> {
        Ok(0)
    }

    fn supports_color_space(&self, color_space: ColorSpace) -> bool {
        !self.unsupported.contains(&color_space)
    }

    fn set_color_space(&mut self, color_space: ColorSpace) -> Result<(), PresentError> {
        self.color_space = Some(color_space);
        Ok(())
    }

    fn set_hdr_metadata(&mut self, metadata: Option<&Hdr10Metadata>) -> Result<(), PresentError> {
        self.metadata = Some(metadata.copied());
        Ok(())
    }
}

/// Hands out queued display lists, one per enumeration.
struct StubDisplays {
    snapshots: VecDeque<Vec<DisplayDescriptor>>,
}

impl DisplayProvider for StubDisplays {
    fn enumerate_displays(&mut self, adapter_index: u32) -> Result<Vec<DisplayDescriptor>, DisplayError> {
        match self.snapshots.pop_front() {
            Some(displays) if !displays.is_empty() => Ok(displays),
            _ => Err(DisplayError::NoDisplays { adapter: adapter_index }),
        }
    }
}

fn monitor(name: &str, bounds: Rect, hdr: bool) -> DisplayDescriptor {
    DisplayDescriptor::new(name, bounds, hdr)
}

#[test]
fn window_inside_single_hdr_display_is_hdr_capable() {
    let mut displays = StubDisplays {
        snapshots: VecDeque::from([vec![monitor("tv", Rect::new(0, 0, 1920, 1080), true)]]),
    };
    let (display, hdr) = probe_provider(&mut displays, 0, &Rect::new(0, 0, 1920, 1080)).unwrap();
    assert_eq!(display.name, "tv");
    assert!(hdr);
}

#[test]
fn switching_to_10bit_on_hdr_display_selects_hdr10() {
    let mut displays = StubDisplays {
        snapshots: VecDeque::from([vec![monitor("tv", Rect::new(0, 0, 1920, 1080), true)]]),
    };
    let mut state = ViewerState::new();
    let (display, hdr) = probe_provider(&mut displays, 0, &Rect::new(100, 100, 900, 700)).unwrap();
    state.init_from_probe(&display, hdr);
    assert!(state.hdr_enable);

    let mut presenter = StubPresenter::default();
    let mut chain = SwapChain::new(800, 600, PixelFormat::Rgba8Unorm, 0);
    chain.apply_color_state(&mut presenter, &state).unwrap();
    assert_eq!(chain.color_space(), ColorSpace::Rec709Srgb);
    assert_eq!(chain.metadata(), None);

    assert_eq!(state.apply(ViewerCommand::NextTier), Effect::Buffers);
    chain.reconfigure(&mut presenter, &state, 800, 600).unwrap();

    let selection = state.selection();
    assert_eq!(selection.pixel_format, PixelFormat::Rgb10A2Unorm);
    assert_eq!(selection.color_space, ColorSpace::Rec2020Pq);
    assert_eq!(selection.transfer_curve, TransferCurve::St2084);
    assert_eq!(presenter.color_space, Some(ColorSpace::Rec2020Pq));

    let metadata = chain.metadata().copied().unwrap();
    let red = Chromaticities::REC2020.red * CHROMATICITY_SCALE;
    assert_eq!(metadata.red_primary, [red.x as u16, red.y as u16]);
    assert_eq!(presenter.metadata, Some(Some(metadata)));
}

#[test]
fn metadata_preset_cycle_wraps_after_four() {
    let mut state = ViewerState::new();
    let start = state.metadata_preset;
    for _ in 0..4 {
        assert_eq!(state.apply(ViewerCommand::CycleMetadata), Effect::ColorState);
    }
    assert_eq!(state.metadata_preset, start);
    assert_eq!(state.metadata_preset, MetadataPreset::Peak1000);
}

#[test]
fn zero_width_resize_is_rejected_and_previous_buffers_kept() {
    let mut state = ViewerState::new();
    state.tier = BitDepthTier::Depth16;
    let mut presenter = StubPresenter::default();
    let mut chain = SwapChain::new(800, 600, PixelFormat::Rgba8Unorm, 0);
    chain.reconfigure(&mut presenter, &state, 1024, 768).unwrap();
    let before = *chain.desc();

    let err = chain.reconfigure(&mut presenter, &state, 0, 768).unwrap_err();
    assert!(matches!(
        err,
        SwapChainError::Resize(PresentError::ResizeRejected { width: 0, .. })
    ));
    assert_eq!(*chain.desc(), before);
    assert_eq!(chain.desc().buffer_count, FRAME_COUNT);
    assert_eq!(presenter.buffers, Some(before));
    assert_eq!(chain.phase(), ReconfigurePhase::Idle);
}

#[test]
fn rejected_tier_change_keeps_previous_tier() {
    let mut state = ViewerState::new();
    state.init_from_probe(&monitor("tv", Rect::new(0, 0, 1920, 1080), true), true);
    state.tier = BitDepthTier::Depth10;
    let mut presenter = StubPresenter {
        rejected_formats: vec![PixelFormat::Rgba16Float],
        ..Default::default()
    };
    let mut chain = SwapChain::new(1920, 1080, PixelFormat::Rgb10A2Unorm, 0);
    chain.apply_color_state(&mut presenter, &state).unwrap();
    let metadata = chain.metadata().copied();
    assert!(metadata.is_some());

    let previous = state.tier;
    assert_eq!(state.apply(ViewerCommand::NextTier), Effect::Buffers);
    let err = chain.change_tier(&mut presenter, &mut state, previous).unwrap_err();

    assert!(matches!(err, SwapChainError::Resize(_)));
    assert_eq!(state.tier, BitDepthTier::Depth10);
    assert_eq!(chain.desc().format, PixelFormat::Rgb10A2Unorm);
    assert_eq!((chain.desc().width, chain.desc().height), (1920, 1080));
    assert_eq!(chain.color_space(), ColorSpace::Rec2020Pq);
    assert_eq!(chain.metadata().copied(), metadata);
    assert_eq!(presenter.buffers.map(|b| b.format), Some(PixelFormat::Rgb10A2Unorm));
}

#[test]
fn accepted_tier_change_switches_format() {
    let mut state = ViewerState::new();
    let mut presenter = StubPresenter::default();
    let mut chain = SwapChain::new(1280, 720, PixelFormat::Rgba8Unorm, 0);

    let previous = state.tier;
    state.apply(ViewerCommand::PrevTier);
    chain.change_tier(&mut presenter, &mut state, previous).unwrap();

    assert_eq!(state.tier, BitDepthTier::Depth16);
    assert_eq!(chain.desc().format, PixelFormat::Rgba16Float);
    assert_eq!(chain.color_space(), ColorSpace::Rec709Linear);
}

#[test]
fn failed_restore_is_fatal() {
    let state = ViewerState::new();
    let mut presenter = StubPresenter {
        fail_restore: true,
        ..Default::default()
    };
    let mut chain = SwapChain::new(800, 600, PixelFormat::Rgba8Unorm, 0);

    let err = chain.reconfigure(&mut presenter, &state, 0, 0).unwrap_err();
    assert!(matches!(err, SwapChainError::Restore(_)));
    assert_eq!(chain.phase(), ReconfigurePhase::Idle);
}

#[test]
fn moving_to_sdr_display_clears_metadata_but_keeps_hdr_enable() {
    let hdr_tv = monitor("tv", Rect::new(0, 0, 1920, 1080), true);
    let sdr_panel = monitor("panel", Rect::new(1920, 0, 3840, 1080), false);
    let mut displays = StubDisplays {
        snapshots: VecDeque::from([
            vec![hdr_tv.clone(), sdr_panel.clone()],
            vec![hdr_tv, sdr_panel],
        ]),
    };
    let mut state = ViewerState::new();
    state.tier = BitDepthTier::Depth10;
    let mut presenter = StubPresenter::default();
    let mut chain = SwapChain::new(1280, 720, PixelFormat::Rgb10A2Unorm, 0);

    let (display, hdr) = probe_provider(&mut displays, 0, &Rect::new(10, 10, 1290, 730)).unwrap();
    state.init_from_probe(&display, hdr);
    chain.apply_color_state(&mut presenter, &state).unwrap();
    assert!(chain.metadata().is_some());

    let (display, hdr) = probe_provider(&mut displays, 0, &Rect::new(2000, 10, 3280, 730)).unwrap();
    assert_eq!(display.name, "panel");
    assert!(state.apply_probe(&display, hdr));
    chain.apply_color_state(&mut presenter, &state).unwrap();

    assert!(state.hdr_enable);
    assert!(!state.hdr_support());
    assert_eq!(chain.metadata(), None);
    assert_eq!(presenter.metadata, Some(None));
}

#[test]
fn unsupported_pq_keeps_previous_color_space() {
    let mut state = ViewerState::new();
    state.init_from_probe(&monitor("tv", Rect::new(0, 0, 1920, 1080), true), true);
    state.tier = BitDepthTier::Depth10;
    let mut presenter = StubPresenter {
        unsupported: vec![ColorSpace::Rec2020Pq],
        ..Default::default()
    };
    let mut chain = SwapChain::new(1920, 1080, PixelFormat::Rgb10A2Unorm, 0);

    chain.apply_color_state(&mut presenter, &state).unwrap();
    assert_eq!(chain.color_space(), ColorSpace::Rec709Srgb);
    assert_eq!(presenter.color_space, None);
    // metadata follows the space actually applied
    assert_eq!(chain.metadata(), None);
}

#[test]
fn probe_with_no_displays_reports_adapter() {
    let mut displays = StubDisplays {
        snapshots: VecDeque::new(),
    };
    let err = probe_provider(&mut displays, 1, &Rect::new(0, 0, 100, 100)).unwrap_err();
    assert!(matches!(err, DisplayError::NoDisplays { adapter: 1 }));
}

#[test]
fn bad_texture_is_a_recoverable_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.dds");
    std::fs::write(&path, b"not a dds file").unwrap();

    let err = texture::decode(&path).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidDds(_)));

    let mut state = ViewerState::new();
    state.record_load(&path, Err(err.to_string()));
    match state.load_status() {
        Some(LoadStatus::Failed { path: failed, .. }) => assert_eq!(failed, &path),
        other => panic!("unexpected load status {other:?}"),
    }
    assert_eq!(state.apply(ViewerCommand::OpenTexture), Effect::OpenTexture);
}
