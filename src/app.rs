use crate::dx12::Dx12Renderer;
use crate::outputs::DxgiDisplays;
use crate::ui::UiState;
use anyhow::{Result, anyhow};
use hdrviewer::color_space::BitDepthTier;
use hdrviewer::config::ViewerConfig;
use hdrviewer::display::probe_provider;
use hdrviewer::error::SwapChainError;
use hdrviewer::geometry::Rect;
use hdrviewer::palette::{Vertex, reference_palette, texture_quad};
use hdrviewer::state::{Effect, ViewerCommand, ViewerState};
use hdrviewer::swapchain::SwapChain;
use hdrviewer::texture::{self, TextureFormat};
use log::{debug, error, info, warn};
use raw_window_handle::{HasWindowHandle, RawWindowHandle};
use std::path::Path;
use windows::Win32::Foundation::HWND;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{Key, NamedKey};
use winit::window::{Fullscreen, Window, WindowId};

/// Displays are enumerated on the first adapter, the one the OS composes on.
const PROBE_ADAPTER: u32 = 0;

/// Everything that only exists once the window does.
struct Surface {
    window: Window,
    renderer: Dx12Renderer,
    swap_chain: SwapChain,
    displays: DxgiDisplays,
}

pub struct App {
    config: ViewerConfig,
    surface: Option<Surface>,
    state: ViewerState,
    ui: UiState,
    palette: Vec<Vertex>,
    error: Option<anyhow::Error>,
}

impl App {
    pub fn new(config: ViewerConfig) -> Self {
        let state = config.initial_state();
        Self {
            config,
            surface: None,
            state,
            ui: UiState::new(),
            palette: reference_palette(),
            error: None,
        }
    }

    /// The error that stopped the event loop, if any.
    pub fn take_error(&mut self) -> Option<anyhow::Error> {
        self.error.take()
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.error = Some(err);
        event_loop.exit();
    }

    fn create_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window_attrs = Window::default_attributes()
            .with_title("D3D12 HDR Viewer")
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = event_loop.create_window(window_attrs)?;
        let size = window.inner_size();

        let hwnd = match window.window_handle()?.as_raw() {
            RawWindowHandle::Win32(h) => HWND(h.hwnd.get() as *mut _),
            _ => return Err(anyhow!("Unsupported window handle type")),
        };

        let format = self.state.selection().pixel_format;
        let mut renderer = Dx12Renderer::new(hwnd, size.width, size.height, format, self.config.warp)?;
        let mut swap_chain = SwapChain::new(size.width, size.height, format, renderer.frame_index());
        let mut displays = DxgiDisplays::new()?;

        let (display, hdr_capable) = probe_provider(&mut displays, PROBE_ADAPTER, &window_bounds(&window))?;
        self.state.init_from_probe(&display, hdr_capable);
        swap_chain.apply_color_state(&mut renderer, &self.state)?;

        self.surface = Some(Surface {
            window,
            renderer,
            swap_chain,
            displays,
        });

        if let Some(path) = self.config.texture.clone() {
            self.load_texture(&path);
        }
        Ok(())
    }

    /// Re-runs the display probe and re-applies color state when HDR support changed.
    fn reprobe(&mut self) -> Result<()> {
        let Some(surface) = &mut self.surface else {
            return Ok(());
        };
        let bounds = window_bounds(&surface.window);
        let (display, hdr_capable) = probe_provider(&mut surface.displays, PROBE_ADAPTER, &bounds)?;
        if self.state.apply_probe(&display, hdr_capable) {
            surface.swap_chain.apply_color_state(&mut surface.renderer, &self.state)?;
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let Some(surface) = &mut self.surface else {
            return Ok(());
        };
        // Minimized
        if width == 0 || height == 0 {
            return Ok(());
        }
        if !surface.swap_chain.needs_resize(self.state.tier, width, height) {
            return Ok(());
        }
        match surface.swap_chain.reconfigure(&mut surface.renderer, &self.state, width, height) {
            Ok(()) => Ok(()),
            Err(SwapChainError::Resize(err)) => {
                warn!("{err} (continuing with old size)");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn handle_command(&mut self, command: ViewerCommand) -> Result<()> {
        let previous_tier = self.state.tier;
        match self.state.apply(command) {
            Effect::None => {}
            Effect::ColorState => {
                if let Some(surface) = &mut self.surface {
                    surface.swap_chain.apply_color_state(&mut surface.renderer, &self.state)?;
                }
            }
            Effect::Buffers => self.change_tier(previous_tier)?,
            Effect::Fullscreen => {
                if let Some(surface) = &self.surface {
                    let fullscreen = match surface.window.fullscreen() {
                        Some(_) => None,
                        None => Some(Fullscreen::Borderless(None)),
                    };
                    info!("fullscreen {}", if fullscreen.is_some() { "on" } else { "off" });
                    surface.window.set_fullscreen(fullscreen);
                }
            }
            Effect::OpenTexture => self.open_texture_dialog(),
        }
        Ok(())
    }

    fn change_tier(&mut self, previous_tier: BitDepthTier) -> Result<()> {
        let Some(surface) = &mut self.surface else {
            return Ok(());
        };
        match surface
            .swap_chain
            .change_tier(&mut surface.renderer, &mut self.state, previous_tier)
        {
            Ok(()) => Ok(()),
            Err(SwapChainError::Resize(err)) => {
                warn!("{err}");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn open_texture_dialog(&mut self) {
        let mut dialog = rfd::FileDialog::new().set_title("Open HDR image");
        for (name, extension) in TextureFormat::FILE_EXTENSIONS {
            dialog = dialog.add_filter(name, &[extension]);
        }
        match dialog.pick_file() {
            Some(path) => self.load_texture(&path),
            None => debug!("file dialog cancelled"),
        }
    }

    fn load_texture(&mut self, path: &Path) {
        let Some(surface) = &mut self.surface else {
            return;
        };
        let result = texture::decode(path)
            .map_err(anyhow::Error::from)
            .and_then(|data| surface.renderer.upload_texture(&data));
        if let Err(err) = &result {
            warn!("failed to load {}: {err:#}", path.display());
        }
        self.state.record_load(path, result.map_err(|e| format!("{e:#}")));
    }

    fn render(&mut self) -> Result<()> {
        let Some(surface) = &self.surface else {
            return Ok(());
        };
        let (width, height) = surface.renderer.size();

        let ui_output = self.ui.run(&mut self.state, &surface.swap_chain, width, height);
        for command in ui_output.commands {
            self.handle_command(command)?;
        }

        let Some(surface) = &mut self.surface else {
            return Ok(());
        };
        let (width, height) = surface.renderer.size();
        let constants = self.state.shader_constants();

        surface.renderer.begin_frame()?;
        surface.renderer.update_font_texture(&ui_output.textures_delta)?;

        match surface.renderer.texture_aspect() {
            Some(aspect) => {
                let quad = texture_quad(aspect, width as f32 / height.max(1) as f32);
                surface.renderer.draw_scene(&quad, true, &constants);
            }
            None => surface.renderer.draw_scene(&self.palette, false, &constants),
        }
        surface.renderer.draw_present(&constants);
        surface.renderer.draw_ui(&ui_output.vertices, &constants);

        surface.renderer.end_frame()?;
        surface.swap_chain.advance_frame(surface.renderer.frame_index());
        Ok(())
    }

    fn key_command(key: &Key) -> Option<ViewerCommand> {
        match key {
            Key::Named(NamedKey::Space) => Some(ViewerCommand::ToggleFullscreen),
            Key::Named(NamedKey::PageUp) => Some(ViewerCommand::PrevTier),
            Key::Named(NamedKey::PageDown) => Some(ViewerCommand::NextTier),
            Key::Character(c) if c.eq_ignore_ascii_case("h") => Some(ViewerCommand::ToggleSt2084),
            Key::Character(c) if c.eq_ignore_ascii_case("u") => Some(ViewerCommand::ShowPanels),
            Key::Character(c) if c.eq_ignore_ascii_case("m") => Some(ViewerCommand::CycleMetadata),
            _ => None,
        }
    }
}

fn window_bounds(window: &Window) -> Rect {
    let position = window.outer_position().unwrap_or_default();
    let size = window.outer_size();
    Rect::from_origin_size(position.x, position.y, size.width, size.height)
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.surface.is_some() {
            return;
        }
        if let Err(err) = self.create_surface(event_loop) {
            self.fail(event_loop, err.context("Failed to initialize the viewer"));
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let result = match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
                Ok(())
            }
            WindowEvent::Resized(size) => self.resize(size.width, size.height),
            WindowEvent::Moved(_) | WindowEvent::ScaleFactorChanged { .. } => self.reprobe(),
            WindowEvent::CursorMoved { position, .. } => {
                self.ui.on_mouse_move(position.x as f32, position.y as f32);
                Ok(())
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let egui_button = match button {
                    MouseButton::Left => egui::PointerButton::Primary,
                    MouseButton::Right => egui::PointerButton::Secondary,
                    MouseButton::Middle => egui::PointerButton::Middle,
                    _ => return,
                };
                self.ui.on_mouse_button(egui_button, state == ElementState::Pressed);
                Ok(())
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let (dx, dy) = match delta {
                    MouseScrollDelta::LineDelta(x, y) => (x * 20.0, y * 20.0),
                    MouseScrollDelta::PixelDelta(pos) => (pos.x as f32, pos.y as f32),
                };
                self.ui.on_mouse_wheel(dx, dy);
                Ok(())
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                if logical_key == Key::Named(NamedKey::Escape) {
                    event_loop.exit();
                    Ok(())
                } else if let Some(command) = Self::key_command(&logical_key) {
                    self.handle_command(command)
                } else {
                    Ok(())
                }
            }
            WindowEvent::RedrawRequested => self.render(),
            _ => Ok(()),
        };

        if let Err(err) = result {
            self.fail(event_loop, err);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let stale = self.surface.as_ref().is_some_and(|s| !s.displays.is_current());
        if stale {
            if let Err(err) = self.reprobe() {
                self.fail(event_loop, err);
                return;
            }
        }
        if let Some(surface) = &self.surface {
            surface.window.request_redraw();
        }
    }
}
