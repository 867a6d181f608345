//! Core of the HDR viewer: display probing, color space and HDR10 metadata
//! selection, swap chain reconfiguration sequencing and texture decoding.
//!
//! The Windows host in `main.rs` drives these modules through the
//! [`display::DisplayProvider`] and [`swapchain::PresentationLayer`] traits.

pub mod color_space;
pub mod config;
pub mod display;
pub mod error;
pub mod geometry;
pub mod metadata;
pub mod palette;
pub mod state;
pub mod swapchain;
pub mod texture;
