use log::{debug, info, warn};

use crate::color_space::{BitDepthTier, ColorSpace, ColorSpaceSelection, PixelFormat};
use crate::error::{PresentError, SwapChainError};
use crate::metadata::{Hdr10Metadata, build_metadata};
use crate::state::ViewerState;

pub const FRAME_COUNT: u32 = 2;

/// Count, size and format of the swap chain buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    pub buffer_count: u32,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// What the orchestrator needs from the platform swap chain.
pub trait PresentationLayer {
    /// Blocks until the GPU has finished all submitted work.
    fn wait_for_gpu_idle(&mut self) -> Result<(), PresentError>;

    /// Drops every resource that references a swap chain buffer.
    fn release_buffers(&mut self);

    fn resize_buffers(&mut self, desc: &BufferDesc) -> Result<(), PresentError>;

    /// Recreates per-buffer views and returns the current back buffer index.
    fn acquire_buffers(&mut self) -> Result<u32, PresentError>;

    fn supports_color_space(&self, color_space: ColorSpace) -> bool;

    fn set_color_space(&mut self, color_space: ColorSpace) -> Result<(), PresentError>;

    /// Sends HDR10 metadata, or clears it with `None`.
    fn set_hdr_metadata(&mut self, metadata: Option<&Hdr10Metadata>) -> Result<(), PresentError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReconfigurePhase {
    #[default]
    Idle,
    Draining,
    Resizing,
    Reacquiring,
}

/// Tracks what has been applied to the swap chain and drives reconfiguration.
#[derive(Debug)]
pub struct SwapChain {
    desc: BufferDesc,
    color_space: ColorSpace,
    metadata: Option<Hdr10Metadata>,
    frame_index: u32,
    phase: ReconfigurePhase,
}

impl SwapChain {
    /// State of a freshly created swap chain, which starts out in sRGB.
    pub fn new(width: u32, height: u32, format: PixelFormat, frame_index: u32) -> Self {
        Self {
            desc: BufferDesc {
                buffer_count: FRAME_COUNT,
                width,
                height,
                format,
            },
            color_space: ColorSpace::Rec709Srgb,
            metadata: None,
            frame_index,
            phase: ReconfigurePhase::Idle,
        }
    }

    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn metadata(&self) -> Option<&Hdr10Metadata> {
        self.metadata.as_ref()
    }

    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    pub fn phase(&self) -> ReconfigurePhase {
        self.phase
    }

    /// Tracks the presentation layer's back buffer index after a present.
    pub fn advance_frame(&mut self, frame_index: u32) {
        self.frame_index = frame_index;
    }

    /// Resizes the buffers to `width`x`height` in the format the state's tier
    /// requires, then re-applies color space and metadata.
    ///
    /// A rejected resize restores the previous buffer description before the
    /// error is returned.
    pub fn reconfigure<P: PresentationLayer + ?Sized>(
        &mut self,
        presenter: &mut P,
        state: &ViewerState,
        width: u32,
        height: u32,
    ) -> Result<(), SwapChainError> {
        let requested = BufferDesc {
            buffer_count: FRAME_COUNT,
            width,
            height,
            format: state.selection().pixel_format,
        };
        let previous = self.desc;

        self.phase = ReconfigurePhase::Draining;
        if let Err(err) = presenter.wait_for_gpu_idle() {
            self.phase = ReconfigurePhase::Idle;
            return Err(err.into());
        }

        self.phase = ReconfigurePhase::Resizing;
        presenter.release_buffers();
        if let Err(err) = presenter.resize_buffers(&requested) {
            warn!("resize to {:?} rejected, restoring {:?}: {}", requested, previous, err);
            return Err(self.restore(presenter, &previous, err));
        }
        self.desc = requested;

        self.phase = ReconfigurePhase::Reacquiring;
        let result = presenter
            .acquire_buffers()
            .map_err(SwapChainError::from)
            .and_then(|frame_index| {
                self.frame_index = frame_index;
                self.apply_color_state(presenter, state)
            });
        self.phase = ReconfigurePhase::Idle;
        result?;

        info!(
            "swap chain now {}x{} {:?} ({}, {:?})",
            width, height, requested.format, state.tier, self.color_space
        );
        Ok(())
    }

    fn restore<P: PresentationLayer + ?Sized>(
        &mut self,
        presenter: &mut P,
        previous: &BufferDesc,
        cause: PresentError,
    ) -> SwapChainError {
        let restored = presenter
            .resize_buffers(previous)
            .and_then(|()| presenter.acquire_buffers());
        self.phase = ReconfigurePhase::Idle;
        match restored {
            Ok(frame_index) => {
                self.desc = *previous;
                self.frame_index = frame_index;
                SwapChainError::Resize(cause)
            }
            Err(err) => SwapChainError::Restore(err),
        }
    }

    /// Applies the selected color space (fail soft) and matching metadata
    /// without touching the buffers.
    pub fn apply_color_state<P: PresentationLayer + ?Sized>(
        &mut self,
        presenter: &mut P,
        state: &ViewerState,
    ) -> Result<(), SwapChainError> {
        let selection = state.selection();
        self.ensure_color_space(presenter, &selection);

        let metadata = build_metadata(
            state.tier,
            self.color_space,
            &state.metadata_preset.profile(),
            state.hdr_support(),
        );
        presenter.set_hdr_metadata(metadata.as_ref())?;
        if metadata != self.metadata {
            debug!("HDR metadata {:?}", metadata);
        }
        self.metadata = metadata;
        Ok(())
    }

    fn ensure_color_space<P: PresentationLayer + ?Sized>(&mut self, presenter: &mut P, selection: &ColorSpaceSelection) {
        let wanted = selection.color_space;
        if wanted == self.color_space {
            return;
        }
        if !presenter.supports_color_space(wanted) {
            warn!("{:?} not supported for presentation, keeping {:?}", wanted, self.color_space);
            return;
        }
        match presenter.set_color_space(wanted) {
            Ok(()) => {
                info!("color space {:?} -> {:?}", self.color_space, wanted);
                self.color_space = wanted;
            }
            Err(err) => warn!("keeping {:?}: {}", self.color_space, err),
        }
    }

    /// Recreates the buffers at the current size in the format of the state's
    /// new tier. When the format is rejected the state goes back to
    /// `previous_tier`, color state is re-applied for it, and the rejection is
    /// returned as `SwapChainError::Resize`.
    pub fn change_tier<P: PresentationLayer + ?Sized>(
        &mut self,
        presenter: &mut P,
        state: &mut ViewerState,
        previous_tier: BitDepthTier,
    ) -> Result<(), SwapChainError> {
        let (width, height) = (self.desc.width, self.desc.height);
        match self.reconfigure(presenter, state, width, height) {
            Err(SwapChainError::Resize(cause)) => {
                warn!("{} unavailable, staying at {}", state.tier, previous_tier);
                state.tier = previous_tier;
                self.apply_color_state(presenter, state)?;
                Err(SwapChainError::Resize(cause))
            }
            other => other,
        }
    }

    /// Whether buffers must be recreated to present `tier` at the given size.
    pub fn needs_resize(&self, tier: BitDepthTier, width: u32, height: u32) -> bool {
        self.desc.width != width || self.desc.height != height || self.desc.format != tier.pixel_format()
    }
}
