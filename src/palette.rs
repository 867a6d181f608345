//! Scene geometry for the first render pass: the built-in reference palette,
//! the letterboxed texture quad and the heatmap lookup table.
//!
//! Everything here is expressed in scRGB, where 1.0 is 80 nits, and in
//! normalized device coordinates.

pub const SCRGB_WHITE_NITS: f32 = 80.0;
pub const HEATMAP_MIN_NITS: f32 = 0.01;
pub const HEATMAP_MAX_NITS: f32 = 10000.0;
pub const HEATMAP_LUT_WIDTH: u32 = 256;

/// Grey patch levels of the reference palette.
pub const GREY_STEPS_NITS: [f32; 8] = [1.0, 10.0, 80.0, 203.0, 500.0, 1000.0, 4000.0, 10000.0];

const RAMP_SEGMENTS: usize = 48;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

pub fn nits_to_scrgb(nits: f32) -> f32 {
    nits / SCRGB_WHITE_NITS
}

/// Axis-aligned rectangle in NDC, `x0,y0` top-left.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

/// Pushes two triangles; corners go top-left, bottom-left, bottom-right, top-right.
fn push_quad(vertices: &mut Vec<Vertex>, rect: QuadRect, uv: QuadRect, colors: [[f32; 4]; 4]) {
    let corners = [
        ([rect.x0, rect.y0], [uv.x0, uv.y0]),
        ([rect.x0, rect.y1], [uv.x0, uv.y1]),
        ([rect.x1, rect.y1], [uv.x1, uv.y1]),
        ([rect.x1, rect.y0], [uv.x1, uv.y0]),
    ];
    for i in [0, 1, 2, 0, 2, 3] {
        let (position, uv) = corners[i];
        vertices.push(Vertex {
            position,
            uv,
            color: colors[i],
        });
    }
}

pub fn add_quad(vertices: &mut Vec<Vertex>, rect: QuadRect, color: [f32; 4]) {
    let uv = QuadRect {
        x0: 1.0,
        y0: 1.0,
        x1: 1.0,
        y1: 1.0,
    };
    push_quad(vertices, rect, uv, [color; 4]);
}

pub fn add_gradient_quad_h(vertices: &mut Vec<Vertex>, rect: QuadRect, left: [f32; 4], right: [f32; 4]) {
    let uv = QuadRect {
        x0: 1.0,
        y0: 1.0,
        x1: 1.0,
        y1: 1.0,
    };
    push_quad(vertices, rect, uv, [left, left, right, right]);
}

/// The test pattern shown when no texture is loaded: a row of grey patches at
/// fixed luminance, then red/green/blue/white ramps from black to 10000 nits.
pub fn reference_palette() -> Vec<Vertex> {
    let mut vertices = Vec::new();

    let patch_width = 2.0 / GREY_STEPS_NITS.len() as f32;
    for (i, nits) in GREY_STEPS_NITS.iter().enumerate() {
        let v = nits_to_scrgb(*nits);
        let x0 = -1.0 + i as f32 * patch_width;
        add_quad(
            &mut vertices,
            QuadRect {
                x0,
                y0: 1.0,
                x1: x0 + patch_width,
                y1: 0.2,
            },
            [v, v, v, 1.0],
        );
    }

    let ramps: [[f32; 3]; 4] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 1.0, 1.0]];
    let ramp_height = 1.2 / ramps.len() as f32;
    let peak = nits_to_scrgb(HEATMAP_MAX_NITS);
    for (row, base) in ramps.iter().enumerate() {
        let y0 = 0.2 - row as f32 * ramp_height;
        let y1 = (0.2 - (row + 1) as f32 * ramp_height).max(-1.0);
        for seg in 0..RAMP_SEGMENTS {
            let t0 = seg as f32 / RAMP_SEGMENTS as f32;
            let t1 = (seg + 1) as f32 / RAMP_SEGMENTS as f32;
            // quartic spacing keeps most of the ramp in the SDR range
            let c0 = ramp_color(base, t0.powi(4) * peak);
            let c1 = ramp_color(base, t1.powi(4) * peak);
            add_gradient_quad_h(
                &mut vertices,
                QuadRect {
                    x0: -1.0 + t0 * 2.0,
                    y0,
                    x1: -1.0 + t1 * 2.0,
                    y1,
                },
                c0,
                c1,
            );
        }
    }

    vertices
}

fn ramp_color(base: &[f32; 3], scrgb: f32) -> [f32; 4] {
    [base[0] * scrgb, base[1] * scrgb, base[2] * scrgb, 1.0]
}

/// Quad showing a texture at its own aspect ratio, centred, with bars on the
/// short axis.
pub fn texture_quad(texture_aspect: f32, viewport_aspect: f32) -> Vec<Vertex> {
    let (half_w, half_h) = if !texture_aspect.is_finite() || !viewport_aspect.is_finite() || viewport_aspect <= 0.0 {
        (1.0, 1.0)
    } else if texture_aspect > viewport_aspect {
        (1.0, viewport_aspect / texture_aspect)
    } else {
        (texture_aspect / viewport_aspect, 1.0)
    };

    let mut vertices = Vec::with_capacity(6);
    push_quad(
        &mut vertices,
        QuadRect {
            x0: -half_w,
            y0: half_h,
            x1: half_w,
            y1: -half_h,
        },
        QuadRect {
            x0: 0.0,
            y0: 0.0,
            x1: 1.0,
            y1: 1.0,
        },
        [[1.0; 4]; 4],
    );
    vertices
}

const HEATMAP_STOPS: [[f32; 3]; 7] = [
    [0.0, 0.0, 0.0],
    [0.0, 0.0, 1.0],
    [0.0, 1.0, 1.0],
    [0.0, 1.0, 0.0],
    [1.0, 1.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 1.0],
];

/// Position of `nits` on the heatmap scale, 0 at 0.01 nits and 1 at 10000 nits.
pub fn heatmap_coordinate(nits: f32) -> f32 {
    let lo = HEATMAP_MIN_NITS.log10();
    let hi = HEATMAP_MAX_NITS.log10();
    ((nits.max(HEATMAP_MIN_NITS).log10() - lo) / (hi - lo)).clamp(0.0, 1.0)
}

/// Heatmap color at coordinate `t` in `[0, 1]`, in SDR scRGB.
pub fn heatmap_color(t: f32) -> [f32; 4] {
    let scaled = t.clamp(0.0, 1.0) * (HEATMAP_STOPS.len() - 1) as f32;
    let i = (scaled.floor() as usize).min(HEATMAP_STOPS.len() - 2);
    let f = scaled - i as f32;
    let a = glam::Vec3::from(HEATMAP_STOPS[i]);
    let b = glam::Vec3::from(HEATMAP_STOPS[i + 1]);
    a.lerp(b, f).extend(1.0).to_array()
}

/// 1D lookup table sampled by the present pass with `heatmap_coordinate`.
pub fn heatmap_gradient(width: u32) -> Vec<[f32; 4]> {
    let last = width.saturating_sub(1).max(1) as f32;
    (0..width).map(|i| heatmap_color(i as f32 / last)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn quads_are_two_triangles() {
        let mut vertices = Vec::new();
        let rect = QuadRect {
            x0: -1.0,
            y0: 1.0,
            x1: 0.0,
            y1: 0.0,
        };
        add_gradient_quad_h(&mut vertices, rect, [0.0; 4], [1.0; 4]);
        assert_eq!(vertices.len(), 6);
        for v in &vertices {
            let expected = if v.position[0] == rect.x0 { 0.0 } else { 1.0 };
            assert_eq!(v.color[0], expected);
        }
    }

    #[test]
    fn palette_spans_sdr_and_hdr() {
        let vertices = reference_palette();
        assert_eq!(vertices.len(), (GREY_STEPS_NITS.len() + 4 * RAMP_SEGMENTS) * 6);

        let brightest = vertices.iter().map(|v| v.color[1]).fold(0.0, f32::max);
        assert_relative_eq!(brightest, 125.0);
        assert!(vertices.iter().any(|v| v.color[0] == 1.0 && v.color[1] == 1.0));
        assert!(vertices.iter().all(|v| v.position.iter().all(|p| (-1.0..=1.0).contains(p))));
    }

    #[test]
    fn texture_quad_letterboxes_wide_images() {
        let vertices = texture_quad(2.0, 16.0 / 9.0);
        let top = vertices.iter().map(|v| v.position[1]).fold(f32::MIN, f32::max);
        let right = vertices.iter().map(|v| v.position[0]).fold(f32::MIN, f32::max);
        assert_relative_eq!(right, 1.0);
        assert_relative_eq!(top, (16.0 / 9.0) / 2.0);
    }

    #[test]
    fn texture_quad_pillarboxes_tall_images() {
        let vertices = texture_quad(0.5, 1.0);
        let right = vertices.iter().map(|v| v.position[0]).fold(f32::MIN, f32::max);
        assert_relative_eq!(right, 0.5);
        let uv_max = vertices.iter().map(|v| v.uv[0]).fold(f32::MIN, f32::max);
        assert_eq!(uv_max, 1.0);
    }

    #[test]
    fn degenerate_aspect_fills_viewport() {
        let vertices = texture_quad(f32::NAN, 1.0);
        assert!(vertices.iter().all(|v| v.position[0].abs() == 1.0));
    }

    #[test]
    fn heatmap_scale_is_logarithmic() {
        assert_eq!(heatmap_coordinate(0.0), 0.0);
        assert_eq!(heatmap_coordinate(HEATMAP_MIN_NITS), 0.0);
        assert_relative_eq!(heatmap_coordinate(1.0), 1.0 / 3.0, epsilon = 1e-6);
        assert_relative_eq!(heatmap_coordinate(100.0), 2.0 / 3.0, epsilon = 1e-6);
        assert_eq!(heatmap_coordinate(1.0e6), 1.0);
    }

    #[test]
    fn heatmap_gradient_endpoints() {
        let lut = heatmap_gradient(HEATMAP_LUT_WIDTH);
        assert_eq!(lut.len(), HEATMAP_LUT_WIDTH as usize);
        assert_eq!(lut[0], [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(lut[lut.len() - 1], [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(heatmap_color(0.5), [0.0, 1.0, 0.0, 1.0]);
    }
}
