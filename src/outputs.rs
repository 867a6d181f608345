use glam::Vec2;
use hdrviewer::display::{Chromaticities, DisplayDescriptor, DisplayProvider, LuminanceRange};
use hdrviewer::error::DisplayError;
use hdrviewer::geometry::Rect;
use log::{debug, info};
use windows::Win32::Graphics::Dxgi::Common::DXGI_COLOR_SPACE_RGB_FULL_G2084_NONE_P2020;
use windows::Win32::Graphics::Dxgi::*;
use windows::core::Interface;

/// Display enumeration through a DXGI factory.
pub struct DxgiDisplays {
    factory: IDXGIFactory1,
}

impl DxgiDisplays {
    pub fn new() -> anyhow::Result<Self> {
        let factory = unsafe { CreateDXGIFactory1()? };
        Ok(Self { factory })
    }

    /// False once the adapter or output topology changed since the factory
    /// was created, which is how DXGI reports display changes.
    pub fn is_current(&self) -> bool {
        unsafe { self.factory.IsCurrent().as_bool() }
    }

    fn refresh(&mut self) -> Result<(), DisplayError> {
        if !self.is_current() {
            info!("display configuration changed, recreating DXGI factory");
            self.factory = unsafe { CreateDXGIFactory1() }.map_err(platform)?;
        }
        Ok(())
    }
}

fn platform(err: windows::core::Error) -> DisplayError {
    DisplayError::Platform(err.to_string())
}

fn describe(desc: &DXGI_OUTPUT_DESC1) -> DisplayDescriptor {
    let name_len = desc.DeviceName.iter().position(|&c| c == 0).unwrap_or(desc.DeviceName.len());
    let r = desc.DesktopCoordinates;
    let mut display = DisplayDescriptor::new(
        String::from_utf16_lossy(&desc.DeviceName[..name_len]),
        Rect::new(r.left, r.top, r.right, r.bottom),
        desc.ColorSpace == DXGI_COLOR_SPACE_RGB_FULL_G2084_NONE_P2020,
    );
    display.chromaticities = Some(Chromaticities {
        red: Vec2::from(desc.RedPrimary),
        green: Vec2::from(desc.GreenPrimary),
        blue: Vec2::from(desc.BluePrimary),
        white: Vec2::from(desc.WhitePoint),
    });
    display.luminance = Some(LuminanceRange {
        min: desc.MinLuminance,
        max: desc.MaxLuminance,
        max_full_frame: desc.MaxFullFrameLuminance,
    });
    display
}

impl DisplayProvider for DxgiDisplays {
    fn enumerate_displays(&mut self, adapter_index: u32) -> Result<Vec<DisplayDescriptor>, DisplayError> {
        self.refresh()?;

        let adapter = match unsafe { self.factory.EnumAdapters1(adapter_index) } {
            Ok(adapter) => adapter,
            Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => {
                return Err(DisplayError::NoDisplays { adapter: adapter_index });
            }
            Err(e) => return Err(platform(e)),
        };

        let mut displays = Vec::new();
        for i in 0.. {
            let output = match unsafe { adapter.EnumOutputs(i) } {
                Ok(output) => output,
                Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
                Err(e) => return Err(platform(e)),
            };
            let output6: IDXGIOutput6 = output.cast().map_err(platform)?;
            let desc = unsafe { output6.GetDesc1() }.map_err(platform)?;
            let display = describe(&desc);
            debug!(
                "output {i}: {} {:?} hdr10={} peak={} nits",
                display.name, display.bounds, display.native_hdr10, desc.MaxLuminance
            );
            displays.push(display);
        }

        if displays.is_empty() {
            return Err(DisplayError::NoDisplays { adapter: adapter_index });
        }
        Ok(displays)
    }
}
