//! # vk_renderer
//!
//! A single-window, real-time rasterization renderer built directly on
//! Vulkan through `ash`.
//!
//! The hard part of this crate is not drawing — it is the lifecycle of
//! GPU-resident resources across the host/device boundary: swapchain
//! teardown and rebuild, frame-in-flight synchronization, memory-type
//! selection, and image layout transitions. The crate renders exactly one
//! textured, depth-tested, MSAA-resolved mesh per frame through a single
//! hard-coded render pass.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vk_renderer::{RendererConfig, Window, VulkanRenderer, RenderClock};
//! use vk_renderer::mesh::{MeshData, TextureData};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     vk_renderer::foundation::logging::init();
//!
//!     let config = RendererConfig::default();
//!     let mut window = Window::new(&config.app_name, config.window_width, config.window_height)?;
//!     let mesh = MeshData::unit_quad();
//!     let texture = TextureData::checkerboard(64, 64);
//!
//!     let mut renderer = VulkanRenderer::new(&mut window, &config, &mesh, &texture)?;
//!     let mut clock = RenderClock::new();
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         clock.tick();
//!         renderer.draw_frame(&mut window, &clock)?;
//!     }
//!     renderer.wait_idle()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod mesh;
pub mod vulkan;
pub mod window;

pub use config::{ConfigError, RendererConfig};
pub use foundation::time::RenderClock;
pub use vulkan::{VulkanError, VulkanRenderer, VulkanResult};
pub use window::{Window, WindowError};
