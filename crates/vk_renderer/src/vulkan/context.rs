//! Vulkan context management
//!
//! Owns the instance, diagnostics hookup, physical-device selection, the
//! logical device, and its queues. Selection happens exactly once per
//! process lifetime; all other components borrow the resulting handles
//! read-only.

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
#[cfg(debug_assertions)]
use ash::extensions::ext::DebugUtils;
use ash::{vk, Device, Entry, Instance};
use std::ffi::{CStr, CString};

use crate::config::RendererConfig;
use crate::vulkan::{VulkanError, VulkanResult};
use crate::window::Window;

/// Exact-match filter for known-benign driver diagnostics
///
/// Heap-pinned for the lifetime of the debug messenger; the messenger's
/// user-data pointer refers to it.
#[cfg(debug_assertions)]
struct DiagnosticsFilter {
    suppressed: Vec<String>,
}

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    /// Debug utilities extension (debug builds)
    #[cfg(debug_assertions)]
    debug_utils: Option<DebugUtils>,
    /// Debug messenger handle (debug builds)
    #[cfg(debug_assertions)]
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    /// Keeps the messenger's user-data alive
    #[cfg(debug_assertions)]
    _diagnostics_filter: Option<Box<DiagnosticsFilter>>,
}

impl VulkanInstance {
    /// Create a new Vulkan instance, with validation layers in debug builds
    pub fn new(window: &Window, config: &RendererConfig) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e)))?;

        let enable_validation = cfg!(debug_assertions);
        if enable_validation {
            Self::check_validation_layer_support(&entry)?;
        }

        let app_name_cstr = CString::new(config.app_name.as_str()).unwrap();
        let engine_name_cstr = CString::new("vk_renderer").unwrap();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        // Instance extensions required by the windowing system
        let required_extensions = window
            .required_instance_extensions()
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to get required extensions: {}", e)))?;

        let cstr_extensions: Vec<CString> = required_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()).unwrap())
            .collect();

        #[allow(unused_mut)] // Mutable in debug builds for the debug extension
        let mut extensions: Vec<*const i8> = cstr_extensions.iter().map(|ext| ext.as_ptr()).collect();

        #[cfg(debug_assertions)]
        extensions.push(DebugUtils::name().as_ptr());

        let layer_names = if enable_validation {
            vec![CString::new(VALIDATION_LAYER).unwrap()]
        } else {
            vec![]
        };
        let layer_names_ptrs: Vec<*const i8> = layer_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names_ptrs);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        #[cfg(debug_assertions)]
        let (debug_utils, debug_messenger, diagnostics_filter) = {
            let filter = Box::new(DiagnosticsFilter {
                suppressed: config.suppressed_diagnostics.clone(),
            });
            let debug_utils = DebugUtils::new(&entry, &instance);
            let debug_messenger = Self::setup_debug_messenger(&debug_utils, &filter)?;
            (Some(debug_utils), Some(debug_messenger), Some(filter))
        };

        Ok(Self {
            entry,
            instance,
            #[cfg(debug_assertions)]
            debug_utils,
            #[cfg(debug_assertions)]
            debug_messenger,
            #[cfg(debug_assertions)]
            _diagnostics_filter: diagnostics_filter,
        })
    }

    fn check_validation_layer_support(entry: &Entry) -> VulkanResult<()> {
        let available_layers = entry
            .enumerate_instance_layer_properties()
            .map_err(VulkanError::Api)?;

        let found = available_layers.iter().any(|layer| {
            let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
            name.to_string_lossy() == VALIDATION_LAYER
        });

        if found {
            Ok(())
        } else {
            Err(VulkanError::MissingValidationLayer(VALIDATION_LAYER.to_string()))
        }
    }

    #[cfg(debug_assertions)]
    fn setup_debug_messenger(
        debug_utils: &DebugUtils,
        filter: &DiagnosticsFilter,
    ) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback))
            .user_data(filter as *const DiagnosticsFilter as *mut std::ffi::c_void);

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            #[cfg(debug_assertions)]
            if let (Some(debug_utils), Some(debug_messenger)) =
                (&self.debug_utils, &self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(*debug_messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Debug callback for validation layers
///
/// Known-benign messages on the filter's allow-list are dropped entirely;
/// everything else is logged by severity.
#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let callback_data = *callback_data;
    let message = CStr::from_ptr(callback_data.p_message).to_string_lossy();

    if !user_data.is_null() {
        let filter = &*(user_data as *const DiagnosticsFilter);
        if filter.suppressed.iter().any(|s| s == message.as_ref()) {
            return vk::FALSE;
        }
    }

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Queue family indices for graphics and presentation
///
/// The two may coincide on most hardware; a device is only eligible when
/// both are present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Index of a graphics-capable queue family
    pub graphics: Option<u32>,
    /// Index of a presentation-capable queue family
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Whether both required families were found
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }
}

/// Capability snapshot of one physical-device candidate
///
/// Pure data, so eligibility can be tested without a live device.
#[derive(Debug, Clone, Default)]
pub struct DeviceSupport {
    /// Queue families found on the candidate
    pub queue_families: QueueFamilyIndices,
    /// Whether all required device extensions are exposed
    pub extensions_supported: bool,
    /// Whether the device supports anisotropic sampling
    pub sampler_anisotropy: bool,
    /// Number of surface formats reported
    pub surface_format_count: usize,
    /// Number of present modes reported
    pub present_mode_count: usize,
}

impl DeviceSupport {
    /// The eligibility predicate: both queue families, required extensions,
    /// anisotropic sampling, and non-empty format/present-mode lists
    pub fn is_eligible(&self) -> bool {
        self.queue_families.is_complete()
            && self.extensions_supported
            && self.sampler_anisotropy
            && self.surface_format_count > 0
            && self.present_mode_count > 0
    }
}

/// First-match candidate selection, no scoring
pub fn select_first_eligible(candidates: &[DeviceSupport]) -> Option<usize> {
    candidates.iter().position(DeviceSupport::is_eligible)
}

/// Highest sample count usable for both color and depth framebuffers
pub fn max_usable_sample_count(
    color: vk::SampleCountFlags,
    depth: vk::SampleCountFlags,
) -> vk::SampleCountFlags {
    let counts = color & depth;
    [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|&count| counts.contains(count))
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// Device extensions every eligible candidate must expose: the
/// presentation chain, and maintenance1 for the negated viewport height.
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 2] =
    [SwapchainLoader::name(), vk::KhrMaintenance1Fn::name()];

/// Selected physical device and its capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Graphics queue family index
    pub graphics_family: u32,
    /// Presentation queue family index
    pub present_family: u32,
    /// Highest usable multisample count for color+depth attachments
    pub msaa_samples: vk::SampleCountFlags,
}

impl PhysicalDeviceInfo {
    /// Select the first eligible physical device
    pub fn select_suitable_device(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };

        let supports = devices
            .iter()
            .map(|&device| Self::query_support(instance, device, surface, surface_loader))
            .collect::<VulkanResult<Vec<_>>>()?;

        let index = select_first_eligible(&supports).ok_or(VulkanError::NoSuitableDevice)?;
        let device = devices[index];
        let support = &supports[index];

        let properties = unsafe { instance.get_physical_device_properties(device) };
        let msaa_samples = max_usable_sample_count(
            properties.limits.framebuffer_color_sample_counts,
            properties.limits.framebuffer_depth_sample_counts,
        );

        log::info!("Selected GPU: {}", unsafe {
            CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy()
        });

        Ok(Self {
            device,
            properties,
            graphics_family: support.queue_families.graphics.unwrap_or(0),
            present_family: support.queue_families.present.unwrap_or(0),
            msaa_samples,
        })
    }

    fn query_support(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<DeviceSupport> {
        let features = unsafe { instance.get_physical_device_features(device) };
        let queue_family_props =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut queue_families = QueueFamilyIndices::default();
        for (index, family) in queue_family_props.iter().enumerate() {
            let index = index as u32;
            if family.queue_count == 0 {
                continue;
            }

            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                && queue_families.graphics.is_none()
            {
                queue_families.graphics = Some(index);
            }

            let present_support = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, index, surface)
                    .map_err(VulkanError::Api)?
            };
            if present_support && queue_families.present.is_none() {
                queue_families.present = Some(index);
            }
        }

        let available_extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };
        let extensions_supported = REQUIRED_DEVICE_EXTENSIONS.iter().all(|required| {
            available_extensions.iter().any(|available| {
                let name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
                name == *required
            })
        });

        let surface_formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(device, surface)
                .map_err(VulkanError::Api)?
        };
        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(device, surface)
                .map_err(VulkanError::Api)?
        };

        Ok(DeviceSupport {
            queue_families,
            extensions_supported,
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
            surface_format_count: surface_formats.len(),
            present_mode_count: present_modes.len(),
        })
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Graphics queue family index
    pub graphics_family: u32,
    /// Presentation queue family index
    pub present_family: u32,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create a new logical device with the required queues and features
    pub fn new(instance: &Instance, physical_device: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let unique_families: std::collections::BTreeSet<u32> = [
            physical_device.graphics_family,
            physical_device.present_family,
        ]
        .into_iter()
        .collect();

        // Priorities must outlive the create infos that point at them
        let queue_priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extension_ptrs: Vec<*const i8> = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();

        let device_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(true)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&device_features);

        let device = unsafe {
            instance
                .create_device(physical_device.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let graphics_queue = unsafe { device.get_device_queue(physical_device.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical_device.present_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            graphics_family: physical_device.graphics_family,
            present_family: physical_device.present_family,
            swapchain_loader,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Main Vulkan context owning instance, surface, and device
pub struct VulkanContext {
    /// Vulkan surface for presentation
    pub surface: vk::SurfaceKHR,
    /// Surface extension loader
    pub surface_loader: Surface,
    /// Selected physical device information
    pub physical_device: PhysicalDeviceInfo,
    /// Logical device and queues
    pub device: LogicalDevice,
    /// Instance and diagnostics hookup
    pub instance: VulkanInstance,
}

impl VulkanContext {
    /// Create a new Vulkan context for the window
    pub fn new(window: &mut Window, config: &RendererConfig) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(window, config)?;

        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = window
            .create_surface(instance.instance.handle())
            .map_err(|e| VulkanError::InitializationFailed(format!("Surface creation: {}", e)))?;

        let physical_device =
            PhysicalDeviceInfo::select_suitable_device(&instance.instance, surface, &surface_loader)?;

        let device = LogicalDevice::new(&instance.instance, &physical_device)?;

        Ok(Self {
            surface,
            surface_loader,
            physical_device,
            device,
            instance,
        })
    }

    /// Raw `ash::Device` handle, cheap to clone into RAII wrappers
    pub fn raw_device(&self) -> Device {
        self.device.device.clone()
    }

    /// Device memory properties for memory-type selection
    pub fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        unsafe {
            self.instance
                .instance
                .get_physical_device_memory_properties(self.physical_device.device)
        }
    }

    /// Format properties for a given format, used by the depth-format probe
    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .instance
                .get_physical_device_format_properties(self.physical_device.device, format)
        }
    }

    /// Graphics queue handle
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Presentation queue handle
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Swapchain extension loader
    pub fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.device.swapchain_loader
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device.device_wait_idle();
            self.surface_loader.destroy_surface(self.surface, None);
        }
        // Remaining fields drop in declaration order: the logical device
        // before the instance that created it.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eligible_support() -> DeviceSupport {
        DeviceSupport {
            queue_families: QueueFamilyIndices {
                graphics: Some(0),
                present: Some(0),
            },
            extensions_supported: true,
            sampler_anisotropy: true,
            surface_format_count: 3,
            present_mode_count: 2,
        }
    }

    #[test]
    fn queue_family_completeness() {
        let mut indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());
        indices.graphics = Some(1);
        assert!(!indices.is_complete());
        indices.present = Some(1);
        assert!(indices.is_complete());
    }

    #[test]
    fn eligibility_requires_every_capability() {
        assert!(eligible_support().is_eligible());

        let mut missing_present = eligible_support();
        missing_present.queue_families.present = None;
        assert!(!missing_present.is_eligible());

        let mut no_extensions = eligible_support();
        no_extensions.extensions_supported = false;
        assert!(!no_extensions.is_eligible());

        let mut no_anisotropy = eligible_support();
        no_anisotropy.sampler_anisotropy = false;
        assert!(!no_anisotropy.is_eligible());

        let mut no_formats = eligible_support();
        no_formats.surface_format_count = 0;
        assert!(!no_formats.is_eligible());

        let mut no_present_modes = eligible_support();
        no_present_modes.present_mode_count = 0;
        assert!(!no_present_modes.is_eligible());
    }

    #[test]
    fn selection_takes_first_eligible_candidate() {
        let mut ineligible = eligible_support();
        ineligible.sampler_anisotropy = false;

        let candidates = vec![ineligible.clone(), eligible_support(), eligible_support()];
        assert_eq!(select_first_eligible(&candidates), Some(1));

        let none = vec![ineligible.clone(), ineligible];
        assert_eq!(select_first_eligible(&none), None);
        assert_eq!(select_first_eligible(&[]), None);
    }

    #[test]
    fn sample_count_is_highest_shared_bit() {
        let color = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4
            | vk::SampleCountFlags::TYPE_8;
        let depth = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4;
        assert_eq!(
            max_usable_sample_count(color, depth),
            vk::SampleCountFlags::TYPE_4
        );
        assert_eq!(
            max_usable_sample_count(vk::SampleCountFlags::TYPE_1, vk::SampleCountFlags::TYPE_1),
            vk::SampleCountFlags::TYPE_1
        );
    }
}
