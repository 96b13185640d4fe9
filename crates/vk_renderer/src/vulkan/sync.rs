//! Frame synchronization primitives and scheduling
//!
//! A fixed ring of frame slots bounds CPU/GPU overlap. Each slot owns an
//! acquire semaphore, a render-finished semaphore, and an in-flight fence;
//! a per-image table remembers which slot last submitted work targeting
//! each swapchain image. The bookkeeping lives in [`FlightTracker`], pure
//! over slot and image indices, so the overlap bound is testable.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::vulkan::{VulkanError, VulkanResult};

/// Outcome of acquiring a swapchain image
///
/// Surface staleness is an expected state, not an error; the caller
/// responds by rebuilding the swapchain and retrying next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired at the given index
    Acquired(u32),
    /// The swapchain no longer matches the surface
    Stale,
}

/// Outcome of presenting a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// The image was queued for presentation
    Presented,
    /// The swapchain no longer matches the surface and must be rebuilt
    Stale,
}

/// Semaphore wrapper with RAII cleanup
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new binary semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self { device, semaphore })
    }

    /// Semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a fence, optionally already signaled
    ///
    /// In-flight fences start signaled so the first wait on a fresh slot
    /// returns immediately.
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe {
            device
                .create_fence(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self { device, fence })
    }

    /// Block until the fence signals
    pub fn wait(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, u64::MAX)
                .map_err(VulkanError::Api)
        }
    }

    /// Return the fence to the unsignaled state
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_fences(&[self.fence])
                .map_err(VulkanError::Api)
        }
    }

    /// Fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects for one frame slot
pub struct FrameSync {
    /// Signaled when the acquired image is ready to be rendered to
    pub image_available: Semaphore,
    /// Signaled when rendering to the image has finished
    pub render_finished: Semaphore,
    /// Signaled when the slot's submitted work has retired
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create the slot's semaphores and signaled fence
    pub fn new(device: Device) -> VulkanResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device, true)?,
        })
    }
}

/// Slot and image occupancy bookkeeping
///
/// Tracks which slots have unretired submissions and which slot last
/// targeted each swapchain image. Knows nothing about Vulkan handles.
#[derive(Debug, Clone)]
pub struct FlightTracker {
    slot_busy: Vec<bool>,
    image_slots: Vec<Option<usize>>,
}

impl FlightTracker {
    /// Create a tracker for the given slot and image counts
    pub fn new(slot_count: usize, image_count: usize) -> Self {
        Self {
            slot_busy: vec![false; slot_count],
            image_slots: vec![None; image_count],
        }
    }

    /// Forget all image associations, keeping slot states
    ///
    /// Called on swapchain rebuild: the images are new, but slots may
    /// still have unretired work against the old ones.
    pub fn reset_images(&mut self, image_count: usize) {
        self.image_slots = vec![None; image_count];
    }

    /// Mark a slot's submission as retired
    pub fn retire_slot(&mut self, slot: usize) {
        self.slot_busy[slot] = false;
    }

    /// The slot that last submitted work targeting this image, if any
    pub fn slot_for_image(&self, image: usize) -> Option<usize> {
        self.image_slots.get(image).copied().flatten()
    }

    /// Record a submission from `slot` targeting `image`
    pub fn record_submission(&mut self, slot: usize, image: usize) {
        debug_assert!(!self.slot_busy[slot], "slot {} submitted while busy", slot);
        self.slot_busy[slot] = true;
        self.image_slots[image] = Some(slot);
    }

    /// Number of slots with unretired submissions
    pub fn in_flight(&self) -> usize {
        self.slot_busy.iter().filter(|&&busy| busy).count()
    }
}

/// Frame scheduler driving the acquire / submit / present cycle
///
/// Owns one [`FrameSync`] per slot. The slots outlive swapchain rebuilds;
/// only the per-image bookkeeping is reset.
pub struct FrameScheduler {
    device: Device,
    frames: Vec<FrameSync>,
    tracker: FlightTracker,
    current_slot: usize,
}

impl FrameScheduler {
    /// Create a scheduler with the given number of frame slots
    pub fn new(device: Device, slot_count: usize, image_count: usize) -> VulkanResult<Self> {
        let frames = (0..slot_count)
            .map(|_| FrameSync::new(device.clone()))
            .collect::<VulkanResult<Vec<_>>>()?;

        Ok(Self {
            device,
            frames,
            tracker: FlightTracker::new(slot_count, image_count),
            current_slot: 0,
        })
    }

    /// Index of the slot the next frame will use
    pub fn slot(&self) -> usize {
        self.current_slot
    }

    /// Forget per-image state after a swapchain rebuild
    pub fn reset_images(&mut self, image_count: usize) {
        self.tracker.reset_images(image_count);
    }

    /// Acquire the next swapchain image
    ///
    /// Waits for the current slot's previous submission to retire, then
    /// waits out any other slot still rendering to the acquired image.
    pub fn acquire(
        &mut self,
        loader: &SwapchainLoader,
        swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<AcquireOutcome> {
        let frame = &self.frames[self.current_slot];
        frame.in_flight.wait()?;
        self.tracker.retire_slot(self.current_slot);

        let result = unsafe {
            loader.acquire_next_image(
                swapchain,
                u64::MAX,
                frame.image_available.handle(),
                vk::Fence::null(),
            )
        };

        let image_index = match result {
            Ok((index, _suboptimal)) => index,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => return Ok(AcquireOutcome::Stale),
            Err(e) => return Err(VulkanError::Api(e)),
        };

        if let Some(prior_slot) = self.tracker.slot_for_image(image_index as usize) {
            if prior_slot != self.current_slot {
                self.frames[prior_slot].in_flight.wait()?;
                self.tracker.retire_slot(prior_slot);
            }
        }

        Ok(AcquireOutcome::Acquired(image_index))
    }

    /// Submit a recorded command buffer for the acquired image
    pub fn submit(
        &mut self,
        queue: vk::Queue,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> VulkanResult<()> {
        let frame = &self.frames[self.current_slot];
        frame.in_flight.reset()?;

        let wait_semaphores = [frame.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [frame.render_finished.handle()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .queue_submit(queue, &[submit_info.build()], frame.in_flight.handle())
                .map_err(VulkanError::Api)?;
        }

        self.tracker
            .record_submission(self.current_slot, image_index as usize);
        Ok(())
    }

    /// Present the rendered image and advance to the next slot
    ///
    /// The slot advances even when presentation reports staleness: the
    /// submission already happened, so its slot must cycle normally.
    pub fn present(
        &mut self,
        loader: &SwapchainLoader,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
    ) -> VulkanResult<PresentOutcome> {
        let frame = &self.frames[self.current_slot];
        let wait_semaphores = [frame.render_finished.handle()];
        let swapchains = [swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { loader.queue_present(queue, &present_info) };

        self.current_slot = (self.current_slot + 1) % self.frames.len();

        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Drives the tracker the way the scheduler does, pretending every
    // fence wait succeeds immediately.
    fn simulate_frame(tracker: &mut FlightTracker, slot: usize, image: usize) {
        tracker.retire_slot(slot);
        if let Some(prior) = tracker.slot_for_image(image) {
            if prior != slot {
                tracker.retire_slot(prior);
            }
        }
        tracker.record_submission(slot, image);
    }

    #[test]
    fn overlap_never_exceeds_slot_count() {
        let slot_count = 2;
        let mut tracker = FlightTracker::new(slot_count, 3);

        for frame in 0..100 {
            let slot = frame % slot_count;
            let image = frame % 3;
            simulate_frame(&mut tracker, slot, image);
            assert!(tracker.in_flight() <= slot_count);
        }
    }

    #[test]
    fn image_remembers_last_submitting_slot() {
        let mut tracker = FlightTracker::new(2, 3);
        assert_eq!(tracker.slot_for_image(0), None);

        tracker.record_submission(0, 0);
        assert_eq!(tracker.slot_for_image(0), Some(0));

        tracker.record_submission(1, 0);
        assert_eq!(tracker.slot_for_image(0), Some(1));
    }

    #[test]
    fn rebuild_clears_image_state_but_not_slots() {
        let mut tracker = FlightTracker::new(2, 3);
        tracker.record_submission(0, 1);
        tracker.record_submission(1, 2);
        assert_eq!(tracker.in_flight(), 2);

        tracker.reset_images(4);
        assert_eq!(tracker.slot_for_image(1), None);
        assert_eq!(tracker.slot_for_image(2), None);
        // Unretired submissions against the old images still occupy slots
        assert_eq!(tracker.in_flight(), 2);
    }

    #[test]
    fn retiring_frees_the_slot() {
        let mut tracker = FlightTracker::new(2, 2);
        tracker.record_submission(0, 0);
        tracker.record_submission(1, 1);
        tracker.retire_slot(0);
        assert_eq!(tracker.in_flight(), 1);
        tracker.retire_slot(1);
        assert_eq!(tracker.in_flight(), 0);
    }
}
