//! Spinning-quad viewer
//!
//! Opens one window and renders a textured, depth-tested quad spinning
//! about the Z axis until the window is closed. Mostly useful as a live
//! exercise of the renderer's swapchain-rebuild and frame-pacing paths:
//! resize and minimize the window to drive them.

use vk_renderer::mesh::{MeshData, TextureData};
use vk_renderer::{RenderClock, RendererConfig, VulkanRenderer, Window};

const CONFIG_PATH: &str = "renderer.toml";

fn main() {
    vk_renderer::foundation::logging::init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = RendererConfig::load_or_default(CONFIG_PATH)?;
    log::info!("Starting {}", config.app_name);

    let mut window = Window::new(&config.app_name, config.window_width, config.window_height)?;

    let mesh = MeshData::unit_quad();
    let texture = TextureData::checkerboard(256, 256);

    let mut renderer = VulkanRenderer::new(&mut window, &config, &mesh, &texture)?;
    let mut clock = RenderClock::new();

    while !window.should_close() {
        window.poll_events();
        clock.tick();
        renderer.draw_frame(&mut window, &clock)?;
    }

    // Let in-flight frames retire before RAII teardown begins
    renderer.wait_idle()?;
    log::info!("Rendered {} frames", clock.frame_count());
    Ok(())
}
