use glam::Vec2;
use log::debug;

use crate::error::DisplayError;
use crate::geometry::{Rect, WindowBounds};

/// CIE 1931 (x, y) coordinates of a gamut's primaries and white point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Chromaticities {
    pub red: Vec2,
    pub green: Vec2,
    pub blue: Vec2,
    pub white: Vec2,
}

impl Chromaticities {
    pub const REC709: Self = Self {
        red: Vec2::new(0.640, 0.330),
        green: Vec2::new(0.300, 0.600),
        blue: Vec2::new(0.150, 0.060),
        white: Vec2::new(0.3127, 0.3290),
    };

    pub const REC2020: Self = Self {
        red: Vec2::new(0.708, 0.292),
        green: Vec2::new(0.170, 0.797),
        blue: Vec2::new(0.131, 0.046),
        white: Vec2::new(0.3127, 0.3290),
    };
}

/// Luminance capabilities reported by a display, in nits.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LuminanceRange {
    pub min: f32,
    pub max: f32,
    pub max_full_frame: f32,
}

/// Snapshot of one display attached to the adapter.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayDescriptor {
    pub name: String,
    pub bounds: Rect,
    /// The display's native wire color space is Rec.2020 PQ (HDR10).
    pub native_hdr10: bool,
    pub chromaticities: Option<Chromaticities>,
    pub luminance: Option<LuminanceRange>,
}

impl DisplayDescriptor {
    pub fn new(name: impl Into<String>, bounds: Rect, native_hdr10: bool) -> Self {
        Self {
            name: name.into(),
            bounds,
            native_hdr10,
            chromaticities: None,
            luminance: None,
        }
    }
}

/// Source of display snapshots. Implemented once per platform graphics stack.
pub trait DisplayProvider {
    /// Lists the displays attached to the given adapter. Fails when there are none.
    fn enumerate_displays(&mut self, adapter_index: u32) -> Result<Vec<DisplayDescriptor>, DisplayError>;
}

/// The display a window is primarily on.
#[derive(Clone, Copy, Debug)]
pub struct Probe<'a> {
    pub index: usize,
    pub display: &'a DisplayDescriptor,
    pub hdr_capable: bool,
}

/// Finds the display with the greatest overlap with `window`.
///
/// Ties keep the display enumerated first, and the first display is chosen even
/// if the window overlaps none of them.
pub fn probe<'a>(window: &WindowBounds, displays: &'a [DisplayDescriptor]) -> Result<Probe<'a>, DisplayError> {
    let mut best: Option<(usize, u64)> = None;
    for (index, display) in displays.iter().enumerate() {
        let area = window.intersection_area(&display.bounds);
        if best.is_none_or(|(_, best_area)| area > best_area) {
            best = Some((index, area));
        }
    }

    let (index, area) = best.ok_or(DisplayError::NoDisplays { adapter: 0 })?;
    let display = &displays[index];
    debug!(
        "window {:?} is primarily on display {} '{}' (overlap {} px)",
        window, index, display.name, area
    );

    Ok(Probe {
        index,
        display,
        hdr_capable: display.native_hdr10,
    })
}

/// Enumerates the adapter's displays and probes them against `window`.
pub fn probe_provider<P: DisplayProvider + ?Sized>(
    provider: &mut P,
    adapter_index: u32,
    window: &WindowBounds,
) -> Result<(DisplayDescriptor, bool), DisplayError> {
    let displays = provider.enumerate_displays(adapter_index)?;
    let found = probe(window, &displays).map_err(|err| match err {
        DisplayError::NoDisplays { .. } => DisplayError::NoDisplays { adapter: adapter_index },
        other => other,
    })?;
    Ok((found.display.clone(), found.hdr_capable))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sdr(name: &str, bounds: Rect) -> DisplayDescriptor {
        DisplayDescriptor::new(name, bounds, false)
    }

    fn hdr(name: &str, bounds: Rect) -> DisplayDescriptor {
        DisplayDescriptor::new(name, bounds, true)
    }

    #[test]
    fn window_inside_single_hdr_display() {
        let displays = [hdr("DISPLAY1", Rect::new(0, 0, 1920, 1080))];
        let found = probe(&Rect::new(0, 0, 1920, 1080), &displays).unwrap();
        assert_eq!(found.index, 0);
        assert!(found.hdr_capable);
    }

    #[test]
    fn empty_list_is_an_error() {
        let err = probe(&Rect::new(0, 0, 10, 10), &[]).unwrap_err();
        assert!(matches!(err, DisplayError::NoDisplays { .. }));
    }

    #[test]
    fn picks_greatest_overlap() {
        let displays = [
            sdr("left", Rect::new(0, 0, 1920, 1080)),
            hdr("right", Rect::new(1920, 0, 4480, 1440)),
        ];
        let found = probe(&Rect::new(1800, 100, 2600, 700), &displays).unwrap();
        assert_eq!(found.display.name, "right");
        assert!(found.hdr_capable);
    }

    #[test]
    fn ties_keep_first_enumerated() {
        let displays = [
            sdr("first", Rect::new(0, 0, 1000, 1000)),
            hdr("second", Rect::new(1000, 0, 2000, 1000)),
        ];
        let found = probe(&Rect::new(900, 0, 1100, 100), &displays).unwrap();
        assert_eq!(found.index, 0);
        assert!(!found.hdr_capable);
    }

    #[test]
    fn no_overlap_still_returns_first() {
        let displays = [
            hdr("a", Rect::new(0, 0, 100, 100)),
            sdr("b", Rect::new(100, 0, 200, 100)),
        ];
        let found = probe(&Rect::new(5000, 5000, 5100, 5100), &displays).unwrap();
        assert_eq!(found.index, 0);
    }

    #[test]
    fn reprobing_is_idempotent() {
        let displays = [
            sdr("a", Rect::new(0, 0, 1920, 1080)),
            hdr("b", Rect::new(1920, 0, 3840, 1080)),
        ];
        let window = Rect::new(1500, 0, 2500, 800);
        let first = probe(&window, &displays).unwrap();
        let second = probe(&window, &displays).unwrap();
        assert_eq!(first.index, second.index);
        assert_eq!(first.hdr_capable, second.hdr_capable);
    }

    struct Fixed(Vec<DisplayDescriptor>);

    impl DisplayProvider for Fixed {
        fn enumerate_displays(&mut self, adapter_index: u32) -> Result<Vec<DisplayDescriptor>, DisplayError> {
            if self.0.is_empty() {
                return Err(DisplayError::NoDisplays { adapter: adapter_index });
            }
            Ok(self.0.clone())
        }
    }

    #[test]
    fn provider_probe_reports_adapter() {
        let mut provider = Fixed(Vec::new());
        let err = probe_provider(&mut provider, 3, &Rect::new(0, 0, 1, 1)).unwrap_err();
        assert!(matches!(err, DisplayError::NoDisplays { adapter: 3 }));

        let mut provider = Fixed(vec![hdr("tv", Rect::new(0, 0, 3840, 2160))]);
        let (display, capable) = probe_provider(&mut provider, 0, &Rect::new(10, 10, 500, 500)).unwrap();
        assert_eq!(display.name, "tv");
        assert!(capable);
    }
}
