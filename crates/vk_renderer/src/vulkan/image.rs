//! Image, texture, and render-target management
//!
//! One generic [`Image`] wrapper (image + memory + view) backs the sampled
//! texture and both multisampled render targets. Layout-transition policy
//! and depth-format probing are pure functions so they can be tested
//! without a device.

use ash::{vk, Device};

use crate::mesh::TextureData;
use crate::vulkan::buffer::{find_memory_type, StagingBuffer};
use crate::vulkan::commands::CommandPool;
use crate::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Access and stage masks for the two supported setup transitions
///
/// Returns `(src_access, dst_access, src_stage, dst_stage)`. Anything else
/// is a programming error and reported as such rather than guessed at.
pub fn transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> VulkanResult<(
    vk::AccessFlags,
    vk::AccessFlags,
    vk::PipelineStageFlags,
    vk::PipelineStageFlags,
)> {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok((
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        )),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok((
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ))
        }
        (from, to) => Err(VulkanError::UnsupportedLayoutTransition { from, to }),
    }
}

/// Depth-stencil formats in preference order
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// First candidate format supporting the required features
///
/// `probe` supplies the per-format properties, letting callers inject
/// queried device data or test fixtures.
pub fn find_supported_format<F>(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    probe: F,
) -> VulkanResult<vk::Format>
where
    F: Fn(vk::Format) -> vk::FormatProperties,
{
    candidates
        .iter()
        .cloned()
        .find(|&format| {
            let props = probe(format);
            match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                _ => props.optimal_tiling_features.contains(features),
            }
        })
        .ok_or(VulkanError::NoSupportedDepthFormat)
}

/// Image wrapper owning image, memory, and view
pub struct Image {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    format: vk::Format,
}

impl Image {
    /// Create a device-local 2D image with a matching view
    pub fn new(
        device: Device,
        mem_properties: &vk::PhysicalDeviceMemoryProperties,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> VulkanResult<Self> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(samples);

        let image = unsafe {
            device
                .create_image(&image_info, None)
                .map_err(VulkanError::Api)?
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory_type_index = match find_memory_type(
            mem_properties,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ) {
            Ok(index) => index,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe {
            match device.allocate_memory(&alloc_info, None) {
                Ok(memory) => memory,
                Err(e) => {
                    device.destroy_image(image, None);
                    return Err(VulkanError::Api(e));
                }
            }
        };

        unsafe {
            device
                .bind_image_memory(image, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe {
            device
                .create_image_view(&view_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            image,
            memory,
            view,
            format,
        })
    }

    /// Image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Image view handle
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Image format
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Sampled 2D texture uploaded from raw RGBA8 pixels
pub struct Texture {
    device: Device,
    image: Image,
    sampler: vk::Sampler,
}

impl Texture {
    /// Upload pixel data into a device-local sampled image
    ///
    /// The image passes through exactly two layout transitions: UNDEFINED
    /// to TRANSFER_DST_OPTIMAL before the copy, then TRANSFER_DST_OPTIMAL
    /// to SHADER_READ_ONLY_OPTIMAL once the pixels have landed.
    pub fn from_pixels(
        context: &VulkanContext,
        command_pool: &CommandPool,
        data: &TextureData,
    ) -> VulkanResult<Self> {
        let staging = StagingBuffer::new(context, &data.rgba8)?;

        let image = Image::new(
            context.raw_device(),
            &context.memory_properties(),
            vk::Extent2D {
                width: data.width,
                height: data.height,
            },
            vk::Format::R8G8B8A8_SRGB,
            vk::SampleCountFlags::TYPE_1,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::COLOR,
        )?;

        Self::transition_layout(
            context,
            command_pool,
            image.handle(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;

        command_pool.submit_single_time(context.graphics_queue(), |device, command_buffer| {
            let region = vk::BufferImageCopy::builder()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                .image_extent(vk::Extent3D {
                    width: data.width,
                    height: data.height,
                    depth: 1,
                })
                .build();

            unsafe {
                device.cmd_copy_buffer_to_image(
                    command_buffer,
                    staging.handle(),
                    image.handle(),
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
        })?;

        Self::transition_layout(
            context,
            command_pool,
            image.handle(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        let sampler = Self::create_sampler(context)?;

        Ok(Self {
            device: context.raw_device(),
            image,
            sampler,
        })
    }

    fn transition_layout(
        context: &VulkanContext,
        command_pool: &CommandPool,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> VulkanResult<()> {
        let (src_access, dst_access, src_stage, dst_stage) =
            transition_masks(old_layout, new_layout)?;

        command_pool.submit_single_time(context.graphics_queue(), |device, command_buffer| {
            let barrier = vk::ImageMemoryBarrier::builder()
                .old_layout(old_layout)
                .new_layout(new_layout)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .src_access_mask(src_access)
                .dst_access_mask(dst_access)
                .build();

            unsafe {
                device.cmd_pipeline_barrier(
                    command_buffer,
                    src_stage,
                    dst_stage,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier],
                );
            }
        })
    }

    fn create_sampler(context: &VulkanContext) -> VulkanResult<vk::Sampler> {
        let max_anisotropy = context
            .physical_device
            .properties
            .limits
            .max_sampler_anisotropy;

        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(max_anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(0.0);

        unsafe {
            context
                .device
                .device
                .create_sampler(&sampler_info, None)
                .map_err(VulkanError::Api)
        }
    }

    /// Image view for descriptor binding
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    /// Sampler for descriptor binding
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

/// Multisampled color attachment, resolved into the swapchain image
pub struct ColorTarget {
    image: Image,
}

impl ColorTarget {
    /// Create a color target matching the swapchain format and extent
    pub fn new(
        context: &VulkanContext,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> VulkanResult<Self> {
        let image = Image::new(
            context.raw_device(),
            &context.memory_properties(),
            extent,
            format,
            samples,
            vk::ImageUsageFlags::TRANSIENT_ATTACHMENT | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            vk::ImageAspectFlags::COLOR,
        )?;

        Ok(Self { image })
    }

    /// Image view handle
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }
}

/// Multisampled depth attachment
pub struct DepthTarget {
    image: Image,
}

impl DepthTarget {
    /// Create a depth target, probing the device for a supported format
    pub fn new(
        context: &VulkanContext,
        extent: vk::Extent2D,
        samples: vk::SampleCountFlags,
    ) -> VulkanResult<Self> {
        let format = find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |f| context.format_properties(f),
        )?;

        let image = Image::new(
            context.raw_device(),
            &context.memory_properties(),
            extent,
            format,
            samples,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
        )?;

        Ok(Self { image })
    }

    /// Image view handle
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    /// Selected depth format
    pub fn format(&self) -> vk::Format {
        self.image.format()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_transition_masks() {
        let (src_access, dst_access, src_stage, dst_stage) = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(src_access, vk::AccessFlags::empty());
        assert_eq!(dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn sample_transition_masks() {
        let (src_access, dst_access, src_stage, dst_stage) = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn other_transitions_are_rejected() {
        let result = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert!(matches!(
            result,
            Err(VulkanError::UnsupportedLayoutTransition { .. })
        ));
    }

    #[test]
    fn format_probe_respects_priority_order() {
        // Pretend only the last candidate supports depth attachments.
        let format = find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |f| {
                let features = if f == vk::Format::D24_UNORM_S8_UINT {
                    vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
                } else {
                    vk::FormatFeatureFlags::empty()
                };
                vk::FormatProperties {
                    optimal_tiling_features: features,
                    ..Default::default()
                }
            },
        )
        .unwrap();
        assert_eq!(format, vk::Format::D24_UNORM_S8_UINT);

        // All candidates supported: the first one wins.
        let format = find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |_| vk::FormatProperties {
                optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(format, vk::Format::D32_SFLOAT);
    }

    #[test]
    fn format_probe_errors_when_nothing_supported() {
        let result = find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |_| vk::FormatProperties::default(),
        );
        assert!(matches!(result, Err(VulkanError::NoSupportedDepthFormat)));
    }
}
