#[cfg(windows)]
mod app;
#[cfg(windows)]
mod dx12;
#[cfg(windows)]
mod outputs;
#[cfg(windows)]
mod ui;

use anyhow::Result;
use clap::Parser;
use hdrviewer::config::{ViewerConfig, init_logging};

fn main() -> Result<()> {
    let config = ViewerConfig::parse();
    init_logging(config.verbose);
    run(config)
}

#[cfg(windows)]
fn run(config: ViewerConfig) -> Result<()> {
    use winit::event_loop::{ControlFlow, EventLoop};

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = app::App::new(config);
    event_loop.run_app(&mut app)?;

    match app.take_error() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(not(windows))]
fn run(_config: ViewerConfig) -> Result<()> {
    anyhow::bail!("hdrviewer presents through DXGI and only runs on Windows")
}
