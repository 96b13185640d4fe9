//! Descriptor set management
//!
//! One uniform buffer plus one combined image sampler per swapchain image.
//! Sets are allocated from a pool sized for the current image count and
//! are freed wholesale when the pool is dropped during a rebuild.

use ash::{vk, Device};
use std::mem;

use crate::mesh::UniformBlock;
use crate::vulkan::buffer::UniformBuffer;
use crate::vulkan::image::Texture;
use crate::vulkan::{VulkanError, VulkanResult};

/// Descriptor set layout for the mesh pipeline
///
/// Binding 0: uniform block, vertex stage. Binding 1: combined image
/// sampler, fragment stage.
pub struct DescriptorSetLayout {
    device: Device,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Create the fixed two-binding layout
    pub fn new(device: Device) -> VulkanResult<Self> {
        let bindings = [
            vk::DescriptorSetLayoutBinding::builder()
                .binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::VERTEX)
                .build(),
            vk::DescriptorSetLayoutBinding::builder()
                .binding(1)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::FRAGMENT)
                .build(),
        ];

        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

        let layout = unsafe {
            device
                .create_descriptor_set_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, layout })
    }

    /// Layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool with its allocated per-image sets
pub struct DescriptorPool {
    device: Device,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
}

impl DescriptorPool {
    /// Allocate and write one descriptor set per swapchain image
    pub fn new(
        device: Device,
        layout: &DescriptorSetLayout,
        uniforms: &[UniformBuffer<UniformBlock>],
        texture: &Texture,
    ) -> VulkanResult<Self> {
        let count = uniforms.len() as u32;

        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: count,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: count,
            },
        ];

        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&pool_sizes)
            .max_sets(count);

        let pool = unsafe {
            device
                .create_descriptor_pool(&pool_info, None)
                .map_err(VulkanError::Api)?
        };

        let layouts = vec![layout.handle(); uniforms.len()];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        let sets = unsafe {
            match device.allocate_descriptor_sets(&alloc_info) {
                Ok(sets) => sets,
                Err(e) => {
                    device.destroy_descriptor_pool(pool, None);
                    return Err(VulkanError::Api(e));
                }
            }
        };

        for (set, uniform) in sets.iter().zip(uniforms) {
            let buffer_info = [vk::DescriptorBufferInfo {
                buffer: uniform.handle(),
                offset: 0,
                range: mem::size_of::<UniformBlock>() as vk::DeviceSize,
            }];
            let image_info = [vk::DescriptorImageInfo {
                sampler: texture.sampler(),
                image_view: texture.view(),
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            }];

            let writes = [
                vk::WriteDescriptorSet::builder()
                    .dst_set(*set)
                    .dst_binding(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&buffer_info)
                    .build(),
                vk::WriteDescriptorSet::builder()
                    .dst_set(*set)
                    .dst_binding(1)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_info)
                    .build(),
            ];

            unsafe {
                device.update_descriptor_sets(&writes, &[]);
            }
        }

        Ok(Self { device, pool, sets })
    }

    /// Descriptor set for the given swapchain image index
    pub fn set(&self, image_index: usize) -> vk::DescriptorSet {
        self.sets[image_index]
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            // Destroying the pool frees all sets allocated from it
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}
