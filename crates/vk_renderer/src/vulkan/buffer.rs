//! Buffer management for vertex, index, staging, and uniform data
//!
//! Memory management following RAII patterns. Geometry buffers live in
//! device-local memory and are filled through a transient staging buffer;
//! uniform buffers stay host-visible because they are rewritten every frame.

use ash::{vk, Device};
use bytemuck::Pod;
use std::mem;

use crate::vulkan::commands::CommandPool;
use crate::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// First memory type satisfying both the requirement bitmask and the
/// requested property flags
///
/// A linear first-match scan; no scoring or heap-size preference.
pub fn find_memory_type(
    mem_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    for i in 0..mem_properties.memory_type_count {
        if (type_filter & (1 << i)) != 0
            && (mem_properties.memory_types[i as usize].property_flags & properties) == properties
        {
            return Ok(i);
        }
    }

    Err(VulkanError::NoSuitableMemoryType)
}

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a new buffer with a dedicated memory allocation
    pub fn new(
        device: Device,
        mem_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .create_buffer(&buffer_info, None)
                .map_err(VulkanError::Api)?
        };

        let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory_type_index = match find_memory_type(
            mem_properties,
            mem_requirements.memory_type_bits,
            properties,
        ) {
            Ok(index) => index,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe {
            match device.allocate_memory(&alloc_info, None) {
                Ok(memory) => memory,
                Err(e) => {
                    device.destroy_buffer(buffer, None);
                    return Err(VulkanError::Api(e));
                }
            }
        };

        unsafe {
            device
                .bind_buffer_memory(buffer, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        Ok(Self {
            device,
            buffer,
            memory,
            size,
        })
    }

    /// Write host data into a host-visible buffer
    pub fn write_bytes(&self, data: &[u8]) -> VulkanResult<()> {
        unsafe {
            let mapped = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped as *mut u8, data.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Host-visible staging buffer for one-shot uploads
pub struct StagingBuffer {
    buffer: Buffer,
}

impl StagingBuffer {
    /// Create a staging buffer pre-filled with the given bytes
    pub fn new(context: &VulkanContext, data: &[u8]) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            context.raw_device(),
            &context.memory_properties(),
            data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        buffer.write_bytes(data)?;
        Ok(Self { buffer })
    }

    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}

/// Device-local vertex buffer
pub struct VertexBuffer {
    buffer: Buffer,
}

impl VertexBuffer {
    /// Create a vertex buffer and upload the vertices through staging
    pub fn new<T: Pod>(
        context: &VulkanContext,
        command_pool: &CommandPool,
        vertices: &[T],
    ) -> VulkanResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let staging = StagingBuffer::new(context, bytes)?;

        let buffer = Buffer::new(
            context.raw_device(),
            &context.memory_properties(),
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::VERTEX_BUFFER,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        command_pool.copy_buffer(
            context.graphics_queue(),
            staging.handle(),
            buffer.handle(),
            staging.size(),
        )?;

        Ok(Self { buffer })
    }

    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }
}

/// Device-local index buffer
pub struct IndexBuffer {
    buffer: Buffer,
    index_count: u32,
}

impl IndexBuffer {
    /// Create an index buffer and upload the indices through staging
    pub fn new(
        context: &VulkanContext,
        command_pool: &CommandPool,
        indices: &[u32],
    ) -> VulkanResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(indices);
        let staging = StagingBuffer::new(context, bytes)?;

        let buffer = Buffer::new(
            context.raw_device(),
            &context.memory_properties(),
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::INDEX_BUFFER,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        command_pool.copy_buffer(
            context.graphics_queue(),
            staging.handle(),
            buffer.handle(),
            staging.size(),
        )?;

        Ok(Self {
            buffer,
            index_count: indices.len() as u32,
        })
    }

    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Number of indices in the buffer
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// Host-visible uniform buffer, rewritten every frame
pub struct UniformBuffer<T: Pod> {
    buffer: Buffer,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: Pod> UniformBuffer<T> {
    /// Create an uninitialized uniform buffer sized for `T`
    pub fn new(context: &VulkanContext) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            context.raw_device(),
            &context.memory_properties(),
            mem::size_of::<T>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        Ok(Self {
            buffer,
            _phantom: std::marker::PhantomData,
        })
    }

    /// Overwrite the buffer contents
    pub fn update(&self, data: &T) -> VulkanResult<()> {
        self.buffer.write_bytes(bytemuck::bytes_of(data))
    }

    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Size of the uniform block in bytes
    pub fn block_size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_properties(flags_per_type: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags_per_type.len() as u32,
            ..Default::default()
        };
        for (i, &flags) in flags_per_type.iter().enumerate() {
            props.memory_types[i].property_flags = flags;
        }
        props
    }

    #[test]
    fn picks_first_matching_type() {
        let props = mem_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        let index = find_memory_type(
            &props,
            0b111,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn respects_requirement_bitmask() {
        let props = mem_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);

        // Type 0 matches the properties but is excluded by the bitmask.
        let index =
            find_memory_type(&props, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn property_flags_may_be_a_superset() {
        let props = mem_properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);

        let index =
            find_memory_type(&props, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap();
        assert_eq!(index, 0);
    }

    #[test]
    fn errors_when_nothing_matches() {
        let props = mem_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);

        let result = find_memory_type(&props, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert!(matches!(result, Err(VulkanError::NoSuitableMemoryType)));
    }
}
