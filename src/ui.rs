use egui::{Context, Event, PointerButton, Pos2, RawInput, Rect, TextureId, Vec2, ViewportId, ViewportInfo};
use hdrviewer::color_space::BitDepthTier;
use hdrviewer::display::DisplayDescriptor;
use hdrviewer::metadata::LUMINANCE_SCALE;
use hdrviewer::palette::Vertex;
use hdrviewer::state::{EV_RANGE, LoadStatus, ViewerCommand, ViewerState};
use hdrviewer::swapchain::SwapChain;
use std::time::Instant;
pub use egui::TexturesDelta;

pub struct UiState {
    pub ctx: Context,
    pub pixels_per_point: f32,
    pub pointer_pos: Option<Pos2>,
    pub events: Vec<Event>,
    start_time: Instant,
}

pub struct UiOutput {
    pub vertices: Vec<Vertex>,
    pub textures_delta: TexturesDelta,
    /// Requests from the panels, applied by the host after the frame's UI pass.
    pub commands: Vec<ViewerCommand>,
}

impl UiState {
    pub fn new() -> Self {
        let ctx = Context::default();
        ctx.set_pixels_per_point(1.0);

        Self {
            ctx,
            pixels_per_point: 1.0,
            pointer_pos: None,
            events: Vec::new(),
            start_time: Instant::now(),
        }
    }

    pub fn on_mouse_move(&mut self, x: f32, y: f32) {
        self.pointer_pos = Some(Pos2::new(x, y));
        self.events.push(Event::PointerMoved(Pos2::new(x, y)));
    }

    pub fn on_mouse_button(&mut self, button: PointerButton, pressed: bool) {
        if let Some(pos) = self.pointer_pos {
            self.events.push(Event::PointerButton {
                pos,
                button,
                pressed,
                modifiers: Default::default(),
            });
        }
    }

    pub fn on_mouse_wheel(&mut self, delta_x: f32, delta_y: f32) {
        self.events.push(Event::MouseWheel {
            unit: egui::MouseWheelUnit::Point,
            delta: Vec2::new(delta_x, delta_y),
            modifiers: Default::default(),
        });
    }

    /// Runs one egui frame. `swap_chain` supplies what was actually applied,
    /// which can differ from the state's selection after a fail-soft fallback.
    pub fn run(&mut self, state: &mut ViewerState, swap_chain: &SwapChain, width: u32, height: u32) -> UiOutput {
        let mut input = RawInput::default();

        let mut viewport_info = ViewportInfo::default();
        viewport_info.native_pixels_per_point = Some(1.0);
        input.viewports.insert(ViewportId::ROOT, viewport_info);
        input.screen_rect = Some(Rect::from_min_size(Pos2::ZERO, Vec2::new(width as f32, height as f32)));
        input.time = Some(self.start_time.elapsed().as_secs_f64());
        input.focused = true;
        input.events = std::mem::take(&mut self.events);

        let mut commands = Vec::new();
        let output = self.ctx.run(input, |ctx| {
            edit_window(ctx, state, &mut commands);
            display_window(ctx, state, swap_chain);
        });

        // Only meshes on the font atlas (Managed(0)) are drawn
        let primitives = self.ctx.tessellate(output.shapes, self.pixels_per_point);
        let vertices = shapes_to_vertices(&primitives, width, height, TextureId::Managed(0));

        UiOutput {
            vertices,
            textures_delta: output.textures_delta,
            commands,
        }
    }
}

fn edit_window(ctx: &Context, state: &mut ViewerState, commands: &mut Vec<ViewerCommand>) {
    let mut open = state.show_edit_window;
    egui::Window::new("Edit Window")
        .open(&mut open)
        .default_pos([10.0, 10.0])
        .resizable(false)
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                for tier in BitDepthTier::ALL {
                    if ui.radio(state.tier == tier, tier.curve_label()).clicked() {
                        commands.push(ViewerCommand::SetTier(tier));
                    }
                }
            });

            if ui.button("Load File").clicked() {
                commands.push(ViewerCommand::OpenTexture);
            }

            let mut ev = state.ev_value;
            if ui.add(egui::Slider::new(&mut ev, EV_RANGE).text("EV")).changed() {
                state.set_ev(ev);
            }
            ui.checkbox(&mut state.heatmap, "Heatmap");

            match state.load_status() {
                Some(LoadStatus::Loaded(path)) => {
                    ui.label(format!("Showing {}", path.display()));
                }
                Some(LoadStatus::Failed { path, message }) => {
                    ui.colored_label(egui::Color32::LIGHT_RED, format!("{}: {}", path.display(), message));
                }
                None => {
                    ui.label("Showing the reference palette");
                }
            }

            ui.separator();
            ui.label("Space: fullscreen   PageUp/PageDown: bit depth");
            ui.label("H: toggle ST.2084   M: next metadata preset");
            ui.label("U: show panels   Esc: quit");
        });
    state.show_edit_window = open;
}

fn display_window(ctx: &Context, state: &mut ViewerState, swap_chain: &SwapChain) {
    let mut open = state.show_display_info;
    egui::Window::new("Display Information")
        .open(&mut open)
        .default_pos([10.0, 300.0])
        .resizable(false)
        .show(ctx, |ui| match state.output() {
            Some(display) => display_details(ui, display, state, swap_chain),
            None => {
                ui.label("No display probed yet");
            }
        });
    state.show_display_info = open;
}

fn display_details(ui: &mut egui::Ui, display: &DisplayDescriptor, state: &ViewerState, swap_chain: &SwapChain) {
    ui.label(display.name.as_str());
    if let Some(c) = display.chromaticities {
        for (name, xy) in [("Red", c.red), ("Green", c.green), ("Blue", c.blue), ("White", c.white)] {
            ui.label(format!("{name}: ({:.3}, {:.3})", xy.x, xy.y));
        }
    }
    if let Some(l) = display.luminance {
        ui.label(format!("Min luminance: {:.3} nits", l.min));
        ui.label(format!("Max luminance: {:.3} nits", l.max));
        ui.label(format!("Max full frame luminance: {:.3} nits", l.max_full_frame));
    }
    ui.separator();
    ui.label(format!("HDR support: {}", if state.hdr_support() { "yes" } else { "no" }));
    ui.label(format!("ST.2084 enabled: {}", if state.hdr_enable { "yes" } else { "no" }));
    ui.label(swap_chain_summary(state, swap_chain));
    let profile = state.metadata_preset.profile();
    ui.label(format!(
        "Metadata preset {}: {:.0} nits peak, MaxCLL {:.0}, MaxFALL {:.0}",
        state.metadata_preset.index(),
        profile.max_output_nits,
        profile.max_cll,
        profile.max_fall
    ));
    ui.label(metadata_summary(swap_chain));
}

/// Tier and the color space the swap chain actually presents in.
fn swap_chain_summary(state: &ViewerState, swap_chain: &SwapChain) -> String {
    format!("Swap chain: {} {:?}", state.tier, swap_chain.color_space())
}

fn metadata_summary(swap_chain: &SwapChain) -> String {
    match swap_chain.metadata() {
        Some(m) => format!(
            "HDR metadata: mastering {:.3}-{:.0} nits",
            m.min_mastering_luminance as f32 / LUMINANCE_SCALE,
            m.max_mastering_luminance as f32 / LUMINANCE_SCALE
        ),
        None => "HDR metadata: none".to_owned(),
    }
}

fn shapes_to_vertices(
    primitives: &[egui::ClippedPrimitive],
    width: u32,
    height: u32,
    expected_texture: TextureId,
) -> Vec<Vertex> {
    let mut vertices = Vec::new();

    for primitive in primitives {
        let egui::epaint::Primitive::Mesh(mesh) = &primitive.primitive else {
            continue;
        };
        if mesh.texture_id != expected_texture {
            continue;
        }

        for idx in mesh.indices.chunks_exact(3) {
            for &i in idx {
                let v = &mesh.vertices[i as usize];
                let x = (v.pos.x / width as f32) * 2.0 - 1.0;
                let y = 1.0 - (v.pos.y / height as f32) * 2.0;

                // egui colors are sRGB bytes; the UI shader works in linear scRGB
                vertices.push(Vertex {
                    position: [x, y],
                    uv: [v.uv.x, v.uv.y],
                    color: [
                        srgb_to_linear(v.color.r()),
                        srgb_to_linear(v.color.g()),
                        srgb_to_linear(v.color.b()),
                        v.color.a() as f32 / 255.0,
                    ],
                });
            }
        }
    }

    vertices
}

fn srgb_to_linear(c: u8) -> f32 {
    let c = c as f32 / 255.0;
    if c <= 0.04045 { c / 12.92 } else { ((c + 0.055) / 1.055).powf(2.4) }
}
