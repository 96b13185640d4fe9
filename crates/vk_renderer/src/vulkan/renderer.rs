//! High-level renderer orchestration
//!
//! Wires the context, swapchain-dependent targets, geometry, and frame
//! scheduling into a per-frame acquire / submit / present cycle. Command
//! buffers are recorded once per swapchain build, one per swap image;
//! per-frame work is limited to fence waits, a uniform rewrite, and the
//! queue submissions. Everything tied to the swapchain lives in
//! [`SwapTargets`] and is torn down and rebuilt as one unit when the
//! surface goes stale.

use ash::vk;

use crate::config::RendererConfig;
use crate::foundation::time::RenderClock;
use crate::mesh::{MeshData, TextureData, UniformBlock};
use crate::vulkan::buffer::{IndexBuffer, UniformBuffer, VertexBuffer};
use crate::vulkan::commands::CommandPool;
use crate::vulkan::descriptor::{DescriptorPool, DescriptorSetLayout};
use crate::vulkan::image::{ColorTarget, DepthTarget, Texture};
use crate::vulkan::pipeline::{load_shader_bytes, GraphicsPipeline, ShaderModule};
use crate::vulkan::render_pass::{Framebuffer, RenderPass};
use crate::vulkan::swapchain::Swapchain;
use crate::vulkan::sync::{AcquireOutcome, FrameScheduler, PresentOutcome};
use crate::vulkan::{VulkanContext, VulkanError, VulkanResult};
use crate::window::Window;

/// Everything that depends on the swapchain
///
/// Field order is drop order: dependents first, the swapchain itself last.
struct SwapTargets {
    framebuffers: Vec<Framebuffer>,
    pipeline: GraphicsPipeline,
    render_pass: RenderPass,
    descriptor_pool: DescriptorPool,
    uniforms: Vec<UniformBuffer<UniformBlock>>,
    _color: ColorTarget,
    _depth: DepthTarget,
    swapchain: Swapchain,
}

impl SwapTargets {
    fn new(
        context: &VulkanContext,
        layout: &DescriptorSetLayout,
        texture: &Texture,
        vertex_spirv: &[u8],
        fragment_spirv: &[u8],
        framebuffer_size: (u32, u32),
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let samples = context.physical_device.msaa_samples;

        let swapchain = Swapchain::new(context, framebuffer_size)?;
        let extent = swapchain.extent();

        let color = ColorTarget::new(context, extent, swapchain.format().format, samples)?;
        let depth = DepthTarget::new(context, extent, samples)?;

        let render_pass = RenderPass::new(
            device.clone(),
            swapchain.format().format,
            depth.format(),
            samples,
        )?;

        // Modules are only needed while the pipeline is built
        let vertex_shader = ShaderModule::from_bytes(device.clone(), vertex_spirv)?;
        let fragment_shader = ShaderModule::from_bytes(device.clone(), fragment_spirv)?;
        let pipeline = GraphicsPipeline::new(
            device.clone(),
            render_pass.handle(),
            layout.handle(),
            &vertex_shader,
            &fragment_shader,
            extent,
            samples,
        )?;

        let uniforms = (0..swapchain.image_count())
            .map(|_| UniformBuffer::new(context))
            .collect::<VulkanResult<Vec<_>>>()?;

        let descriptor_pool = DescriptorPool::new(device.clone(), layout, &uniforms, texture)?;

        let framebuffers = swapchain
            .image_views()
            .iter()
            .map(|&resolve_view| {
                let attachments = [color.view(), depth.view(), resolve_view];
                Framebuffer::new(device.clone(), render_pass.handle(), &attachments, extent)
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        Ok(Self {
            framebuffers,
            pipeline,
            render_pass,
            descriptor_pool,
            uniforms,
            _color: color,
            _depth: depth,
            swapchain,
        })
    }
}

/// The renderer: owns the Vulkan context and drives the frame loop
///
/// Field order is drop order. Swapchain-dependent targets and scheduler
/// state go first, shared resources after them, the context last.
pub struct VulkanRenderer {
    targets: Option<SwapTargets>,
    scheduler: FrameScheduler,
    command_buffers: Vec<vk::CommandBuffer>,
    vertex_buffer: VertexBuffer,
    index_buffer: IndexBuffer,
    texture: Texture,
    descriptor_layout: DescriptorSetLayout,
    vertex_spirv: Vec<u8>,
    fragment_spirv: Vec<u8>,
    command_pool: CommandPool,
    context: VulkanContext,
}

impl VulkanRenderer {
    /// Initialize the renderer and upload the given mesh and texture
    pub fn new(
        window: &mut Window,
        config: &RendererConfig,
        mesh: &MeshData,
        texture_data: &TextureData,
    ) -> VulkanResult<Self> {
        let context = VulkanContext::new(window, config)?;
        let device = context.raw_device();

        let command_pool = CommandPool::new(device.clone(), context.device.graphics_family)?;
        let descriptor_layout = DescriptorSetLayout::new(device.clone())?;

        let texture = Texture::from_pixels(&context, &command_pool, texture_data)?;
        let vertex_buffer = VertexBuffer::new(&context, &command_pool, &mesh.vertices)?;
        let index_buffer = IndexBuffer::new(&context, &command_pool, &mesh.indices)?;

        // Kept for pipeline recreation on swapchain rebuild
        let vertex_spirv = load_shader_bytes(&config.vertex_shader_path)?;
        let fragment_spirv = load_shader_bytes(&config.fragment_shader_path)?;

        let targets = SwapTargets::new(
            &context,
            &descriptor_layout,
            &texture,
            &vertex_spirv,
            &fragment_spirv,
            window.framebuffer_size(),
        )?;

        let command_buffers =
            command_pool.allocate_command_buffers(targets.swapchain.image_count() as u32)?;
        Self::record_commands(
            &context,
            &targets,
            &vertex_buffer,
            &index_buffer,
            &command_buffers,
        )?;

        let scheduler = FrameScheduler::new(
            device,
            config.max_frames_in_flight,
            targets.swapchain.image_count(),
        )?;

        log::info!(
            "Renderer ready: {} swapchain images, {} frames in flight, {:?} MSAA",
            targets.swapchain.image_count(),
            config.max_frames_in_flight,
            context.physical_device.msaa_samples,
        );

        Ok(Self {
            targets: Some(targets),
            scheduler,
            command_buffers,
            vertex_buffer,
            index_buffer,
            texture,
            descriptor_layout,
            vertex_spirv,
            fragment_spirv,
            command_pool,
            context,
        })
    }

    /// Render and present one frame
    ///
    /// A stale surface on acquire or present triggers a swapchain rebuild
    /// and the frame is retried on the next call. Window resizes drained
    /// after presentation trigger the same rebuild.
    pub fn draw_frame(&mut self, window: &mut Window, clock: &RenderClock) -> VulkanResult<()> {
        let outcome = {
            let targets = match &self.targets {
                Some(targets) => targets,
                None => {
                    return Err(VulkanError::InitializationFailed(
                        "render targets unavailable after failed rebuild".to_string(),
                    ))
                }
            };

            let image_index = match self.scheduler.acquire(
                self.context.swapchain_loader(),
                targets.swapchain.handle(),
            )? {
                AcquireOutcome::Acquired(index) => index,
                AcquireOutcome::Stale => return self.rebuild_targets(window),
            };

            let block = UniformBlock::spin(clock.total_time(), targets.swapchain.aspect_ratio());
            targets.uniforms[image_index as usize].update(&block)?;

            self.scheduler.submit(
                self.context.graphics_queue(),
                self.command_buffers[image_index as usize],
                image_index,
            )?;
            self.scheduler.present(
                self.context.swapchain_loader(),
                self.context.present_queue(),
                targets.swapchain.handle(),
                image_index,
            )?
        };

        let resized = window.drain_resize_events();
        if outcome == PresentOutcome::Stale || resized {
            self.rebuild_targets(window)?;
        }

        Ok(())
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.context.wait_idle()
    }

    /// Record the full draw into one command buffer per swap image
    ///
    /// Recorded once per swapchain build; per-frame variation goes through
    /// the uniform buffers, never through re-recording.
    fn record_commands(
        context: &VulkanContext,
        targets: &SwapTargets,
        vertex_buffer: &VertexBuffer,
        index_buffer: &IndexBuffer,
        command_buffers: &[vk::CommandBuffer],
    ) -> VulkanResult<()> {
        let device = &context.device.device;
        let extent = targets.swapchain.extent();

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        for (image_index, &command_buffer) in command_buffers.iter().enumerate() {
            let begin_info = vk::CommandBufferBeginInfo::builder();
            unsafe {
                device
                    .begin_command_buffer(command_buffer, &begin_info)
                    .map_err(VulkanError::Api)?;
            }

            let render_pass_begin = vk::RenderPassBeginInfo::builder()
                .render_pass(targets.render_pass.handle())
                .framebuffer(targets.framebuffers[image_index].handle())
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .clear_values(&clear_values);

            unsafe {
                device.cmd_begin_render_pass(
                    command_buffer,
                    &render_pass_begin,
                    vk::SubpassContents::INLINE,
                );
                device.cmd_bind_pipeline(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    targets.pipeline.handle(),
                );
                device.cmd_bind_vertex_buffers(command_buffer, 0, &[vertex_buffer.handle()], &[0]);
                device.cmd_bind_index_buffer(
                    command_buffer,
                    index_buffer.handle(),
                    0,
                    vk::IndexType::UINT32,
                );
                device.cmd_bind_descriptor_sets(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    targets.pipeline.layout(),
                    0,
                    &[targets.descriptor_pool.set(image_index)],
                    &[],
                );
                device.cmd_draw_indexed(command_buffer, index_buffer.index_count(), 1, 0, 0, 0);
                device.cmd_end_render_pass(command_buffer);
                device
                    .end_command_buffer(command_buffer)
                    .map_err(VulkanError::Api)?;
            }
        }

        Ok(())
    }

    /// Tear down and recreate everything tied to the swapchain
    ///
    /// Blocks while the framebuffer has zero area (minimized window); the
    /// frame-slot synchronization objects survive the rebuild, command
    /// buffers do not.
    fn rebuild_targets(&mut self, window: &mut Window) -> VulkanResult<()> {
        let mut size = window.framebuffer_size();
        while size.0 == 0 || size.1 == 0 {
            window.wait_events();
            window.drain_resize_events();
            size = window.framebuffer_size();
        }

        self.context.wait_idle()?;

        self.command_pool.free_command_buffers(&self.command_buffers);
        self.command_buffers.clear();

        // The old swapchain must be destroyed before the surface is reused
        self.targets = None;
        let targets = SwapTargets::new(
            &self.context,
            &self.descriptor_layout,
            &self.texture,
            &self.vertex_spirv,
            &self.fragment_spirv,
            size,
        )?;

        let command_buffers = self
            .command_pool
            .allocate_command_buffers(targets.swapchain.image_count() as u32)?;
        Self::record_commands(
            &self.context,
            &targets,
            &self.vertex_buffer,
            &self.index_buffer,
            &command_buffers,
        )?;

        log::debug!(
            "Swapchain rebuilt at {}x{}",
            targets.swapchain.extent().width,
            targets.swapchain.extent().height
        );

        self.scheduler.reset_images(targets.swapchain.image_count());
        self.command_buffers = command_buffers;
        self.targets = Some(targets);
        Ok(())
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        // All GPU work must retire before any wrapper starts destroying
        let _ = self.context.wait_idle();
        self.command_pool.free_command_buffers(&self.command_buffers);
    }
}
