//! Command buffer management
//!
//! One long-lived pool serves both the per-frame command buffers and the
//! transient single-time buffers used for uploads and layout transitions.

use ash::{vk, Device};

use crate::vulkan::{VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a new command pool for the given queue family
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device
                .create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            command_pool,
        })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)
        }
    }

    /// Return command buffers to the pool
    pub fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        if buffers.is_empty() {
            return;
        }
        unsafe {
            self.device.free_command_buffers(self.command_pool, buffers);
        }
    }

    /// Command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Record and synchronously execute a one-shot command buffer
    ///
    /// Allocates a transient buffer, records `record` into it, submits on
    /// `queue`, waits for the queue to drain, and frees the buffer. Used
    /// for setup-time copies and layout transitions only; the per-frame
    /// path never blocks like this.
    pub fn submit_single_time<F>(&self, queue: vk::Queue, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&Device, vk::CommandBuffer),
    {
        let command_buffer = self.allocate_command_buffers(1)?[0];

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        let result = unsafe {
            self.device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)
                .and_then(|_| {
                    record(&self.device, command_buffer);
                    self.device
                        .end_command_buffer(command_buffer)
                        .map_err(VulkanError::Api)
                })
                .and_then(|_| {
                    let buffers = [command_buffer];
                    let submit_info = vk::SubmitInfo::builder().command_buffers(&buffers);
                    self.device
                        .queue_submit(queue, &[submit_info.build()], vk::Fence::null())
                        .map_err(VulkanError::Api)
                })
                .and_then(|_| self.device.queue_wait_idle(queue).map_err(VulkanError::Api))
        };

        self.free_command_buffers(&[command_buffer]);
        result
    }

    /// Copy between buffers through a single-time command buffer
    pub fn copy_buffer(
        &self,
        queue: vk::Queue,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) -> VulkanResult<()> {
        self.submit_single_time(queue, |device, command_buffer| {
            let region = vk::BufferCopy::builder().size(size).build();
            unsafe {
                device.cmd_copy_buffer(command_buffer, src, dst, &[region]);
            }
        })
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Command buffers must not be in flight when the pool dies
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
