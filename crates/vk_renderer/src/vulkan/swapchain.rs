//! Vulkan swapchain management
//!
//! Handles swapchain creation and recreation following RAII principles.
//! All selection policy lives in [`SwapchainConfig::derive`], which is pure
//! over queried surface data so the decisions can be tested directly.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Derived swapchain parameters
///
/// A pure function of surface capabilities, the advertised format and
/// present-mode lists, and the current framebuffer size.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainConfig {
    /// Selected surface format and color space
    pub format: vk::SurfaceFormatKHR,
    /// Selected present mode
    pub present_mode: vk::PresentModeKHR,
    /// Selected image extent in pixels
    pub extent: vk::Extent2D,
    /// Requested minimum image count
    pub image_count: u32,
}

impl SwapchainConfig {
    /// Derive swapchain parameters from surface data
    ///
    /// Format: the first 8-bit sRGB format (BGRA or RGBA) with a nonlinear
    /// sRGB color space, else the first advertised format. Present mode:
    /// MAILBOX if available, else FIFO. Extent: the surface's current
    /// extent unless the driver reports the "window manager decides"
    /// sentinel, in which case the framebuffer size clamped to the
    /// supported range. Image count: one above the minimum, capped by the
    /// maximum unless the maximum is the zero "uncapped" sentinel.
    pub fn derive(
        caps: &vk::SurfaceCapabilitiesKHR,
        formats: &[vk::SurfaceFormatKHR],
        present_modes: &[vk::PresentModeKHR],
        framebuffer: (u32, u32),
    ) -> Self {
        let format = formats
            .iter()
            .find(|sf| {
                (sf.format == vk::Format::B8G8R8A8_SRGB || sf.format == vk::Format::R8G8B8A8_SRGB)
                    && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .cloned()
            .unwrap_or(formats[0]);

        let present_mode = present_modes
            .iter()
            .cloned()
            .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
            .unwrap_or(vk::PresentModeKHR::FIFO);

        let extent = if caps.current_extent.width != u32::MAX {
            caps.current_extent
        } else {
            vk::Extent2D {
                width: framebuffer
                    .0
                    .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
                height: framebuffer
                    .1
                    .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
            }
        };

        let image_count = (caps.min_image_count + 1).min(if caps.max_image_count > 0 {
            caps.max_image_count
        } else {
            caps.min_image_count + 1
        });

        Self {
            format,
            present_mode,
            extent,
            image_count,
        }
    }
}

/// Swapchain wrapper with RAII cleanup
pub struct Swapchain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a new swapchain sized to the window's framebuffer
    ///
    /// Image sharing is CONCURRENT only when graphics and present live in
    /// different queue families; EXCLUSIVE otherwise.
    pub fn new(context: &VulkanContext, framebuffer: (u32, u32)) -> VulkanResult<Self> {
        let device = context.raw_device();
        let swapchain_loader = context.swapchain_loader().clone();

        let surface_caps = unsafe {
            context
                .surface_loader
                .get_physical_device_surface_capabilities(
                    context.physical_device.device,
                    context.surface,
                )
                .map_err(VulkanError::Api)?
        };
        let surface_formats = unsafe {
            context
                .surface_loader
                .get_physical_device_surface_formats(
                    context.physical_device.device,
                    context.surface,
                )
                .map_err(VulkanError::Api)?
        };
        let present_modes = unsafe {
            context
                .surface_loader
                .get_physical_device_surface_present_modes(
                    context.physical_device.device,
                    context.surface,
                )
                .map_err(VulkanError::Api)?
        };

        let config =
            SwapchainConfig::derive(&surface_caps, &surface_formats, &present_modes, framebuffer);

        log::debug!(
            "Swapchain: {:?} {:?} {}x{} x{}",
            config.format.format,
            config.present_mode,
            config.extent.width,
            config.extent.height,
            config.image_count
        );

        let queue_families = [
            context.device.graphics_family,
            context.device.present_family,
        ];
        let concurrent = queue_families[0] != queue_families[1];

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface)
            .min_image_count(config.image_count)
            .image_format(config.format.format)
            .image_color_space(config.format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        create_info = if concurrent {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_families)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let images = unsafe {
            swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };

        let image_views: Result<Vec<_>, _> = images
            .iter()
            .map(|&image| {
                let view_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(config.format.format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });

                unsafe { device.create_image_view(&view_info, None) }
            })
            .collect();
        let image_views = image_views.map_err(VulkanError::Api)?;

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            format: config.format,
            extent: config.extent,
        })
    }

    /// Swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Image extent in pixels
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Selected surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Image views, one per swapchain image
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Number of images actually created
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Aspect ratio of the current extent
    pub fn aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height.max(1) as f32
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &image_view in &self.image_views {
                self.device.destroy_image_view(image_view, None);
            }
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min_count: u32, max_count: u32, current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    fn srgb(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn prefers_8bit_srgb_formats() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R16G16B16A16_SFLOAT,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            srgb(vk::Format::R8G8B8A8_SRGB),
            srgb(vk::Format::B8G8R8A8_SRGB),
        ];
        let config = SwapchainConfig::derive(
            &caps(2, 8, (800, 600)),
            &formats,
            &[vk::PresentModeKHR::FIFO],
            (800, 600),
        );
        assert_eq!(config.format.format, vk::Format::R8G8B8A8_SRGB);
    }

    #[test]
    fn falls_back_to_first_format() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::R16G16B16A16_SFLOAT,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        }];
        let config = SwapchainConfig::derive(
            &caps(2, 8, (800, 600)),
            &formats,
            &[vk::PresentModeKHR::FIFO],
            (800, 600),
        );
        assert_eq!(config.format.format, formats[0].format);
        assert_eq!(config.format.color_space, formats[0].color_space);
    }

    #[test]
    fn prefers_mailbox_else_fifo() {
        let formats = [srgb(vk::Format::B8G8R8A8_SRGB)];
        let with_mailbox = SwapchainConfig::derive(
            &caps(2, 8, (800, 600)),
            &formats,
            &[
                vk::PresentModeKHR::IMMEDIATE,
                vk::PresentModeKHR::MAILBOX,
                vk::PresentModeKHR::FIFO,
            ],
            (800, 600),
        );
        assert_eq!(with_mailbox.present_mode, vk::PresentModeKHR::MAILBOX);

        let without = SwapchainConfig::derive(
            &caps(2, 8, (800, 600)),
            &formats,
            &[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO],
            (800, 600),
        );
        assert_eq!(without.present_mode, vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_uses_current_unless_sentinel() {
        let formats = [srgb(vk::Format::B8G8R8A8_SRGB)];
        let fixed = SwapchainConfig::derive(
            &caps(2, 8, (1280, 720)),
            &formats,
            &[vk::PresentModeKHR::FIFO],
            (99, 99),
        );
        assert_eq!(fixed.extent.width, 1280);
        assert_eq!(fixed.extent.height, 720);

        let flexible = SwapchainConfig::derive(
            &caps(2, 8, (u32::MAX, u32::MAX)),
            &formats,
            &[vk::PresentModeKHR::FIFO],
            (8000, 10),
        );
        assert_eq!(flexible.extent.width, 4096); // clamped to max
        assert_eq!(flexible.extent.height, 64); // clamped to min
    }

    #[test]
    fn derivation_with_flexible_extent_and_capped_count() {
        let formats = [srgb(vk::Format::B8G8R8A8_SRGB)];
        let config = SwapchainConfig::derive(
            &caps(1, 3, (u32::MAX, u32::MAX)),
            &formats,
            &[vk::PresentModeKHR::FIFO],
            (1024, 768),
        );
        assert_eq!(config.image_count, 2);
        assert_eq!(config.extent.width, 1024);
        assert_eq!(config.extent.height, 768);
    }

    #[test]
    fn image_count_is_min_plus_one_capped_by_max() {
        let formats = [srgb(vk::Format::B8G8R8A8_SRGB)];
        let modes = [vk::PresentModeKHR::FIFO];

        let capped = SwapchainConfig::derive(&caps(3, 3, (800, 600)), &formats, &modes, (800, 600));
        assert_eq!(capped.image_count, 3);

        let uncapped =
            SwapchainConfig::derive(&caps(2, 0, (800, 600)), &formats, &modes, (800, 600));
        assert_eq!(uncapped.image_count, 3);

        let roomy = SwapchainConfig::derive(&caps(2, 8, (800, 600)), &formats, &modes, (800, 600));
        assert_eq!(roomy.image_count, 3);
    }
}
