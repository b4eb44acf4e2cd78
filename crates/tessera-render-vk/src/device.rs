// SPDX-License-Identifier: CEPL-1.0
//! Instance, debug messenger, physical device choice and logical device.

use std::ffi::{c_char, CStr, CString};
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(debug_assertions)]
use ash::ext::debug_utils as ext_debug;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use bitflags::bitflags;
use raw_window_handle::RawDisplayHandle;
use tessera_render::PointLightBlock;
use tracing::{debug, error, info, warn};

use crate::error::{FatalError, VkContext};

#[cfg(debug_assertions)]
pub(crate) type DebugState = vk::DebugUtilsMessengerEXT;
#[cfg(not(debug_assertions))]
pub(crate) type DebugState = ();

static VALIDATION_ERRORS: AtomicU64 = AtomicU64::new(0);

/// Error-severity validation messages seen by this process.
pub fn validation_error_count() -> u64 {
    VALIDATION_ERRORS.load(Ordering::Relaxed)
}

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FamilyCaps: u8 {
        const GRAPHICS = 1 << 0;
        const COMPUTE = 1 << 1;
        const TRANSFER = 1 << 2;
        const PRESENT = 1 << 3;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FamilyInfo {
    pub caps: FamilyCaps,
    pub queue_count: u32,
}

impl FamilyInfo {
    pub fn new(flags: vk::QueueFlags, queue_count: u32, presentable: bool) -> Self {
        let mut caps = FamilyCaps::empty();
        caps.set(FamilyCaps::GRAPHICS, flags.contains(vk::QueueFlags::GRAPHICS));
        caps.set(FamilyCaps::COMPUTE, flags.contains(vk::QueueFlags::COMPUTE));
        caps.set(FamilyCaps::TRANSFER, flags.contains(vk::QueueFlags::TRANSFER));
        caps.set(FamilyCaps::PRESENT, presentable);
        Self { caps, queue_count }
    }
}

/// Queue family indices for each role. Compute runs on the second queue of
/// the graphics family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
    pub transfer: u32,
}

/// Graphics: the first family with graphics+compute and at least two
/// queues. Present: the graphics family if it can present, else the first
/// that can. Transfer: the first transfer-capable family that is neither.
pub fn select_queue_families(families: &[FamilyInfo]) -> Option<QueueFamilies> {
    let idx = |i: usize| i as u32;

    let graphics = families
        .iter()
        .position(|f| {
            f.caps.contains(FamilyCaps::GRAPHICS | FamilyCaps::COMPUTE) && f.queue_count >= 2
        })
        .map(idx)?;
    let present = if families[graphics as usize].caps.contains(FamilyCaps::PRESENT) {
        graphics
    } else {
        families
            .iter()
            .position(|f| f.caps.contains(FamilyCaps::PRESENT))
            .map(idx)?
    };
    let transfer = families
        .iter()
        .enumerate()
        .position(|(i, f)| {
            f.caps.contains(FamilyCaps::TRANSFER) && idx(i) != graphics && idx(i) != present
        })
        .map(idx)?;

    Some(QueueFamilies {
        graphics,
        present,
        transfer,
    })
}

/// At least one of the capabilities that separate real GPUs from stubs.
pub fn meets_feature_floor(f: &vk::PhysicalDeviceFeatures) -> bool {
    f.tessellation_shader == vk::TRUE
        || f.logic_op == vk::TRUE
        || f.multi_viewport == vk::TRUE
        || f.sampler_anisotropy == vk::TRUE
}

#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    let data = &*data;
    let msg = if data.p_message.is_null() {
        std::borrow::Cow::Borrowed("")
    } else {
        CStr::from_ptr(data.p_message).to_string_lossy()
    };
    let id = if data.p_message_id_name.is_null() {
        std::borrow::Cow::Borrowed("")
    } else {
        CStr::from_ptr(data.p_message_id_name).to_string_lossy()
    };

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        VALIDATION_ERRORS.fetch_add(1, Ordering::Relaxed);
        error!("(VK {types:?}) {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("(VK {types:?}) {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        if id != "Loader Message" {
            debug!("(VK {types:?}) {msg}");
        }
    }
    vk::FALSE
}

#[cfg(debug_assertions)]
pub(crate) unsafe fn create_debug_messenger(
    entry: &Entry,
    instance: &Instance,
    enabled: bool,
) -> Result<DebugState, FatalError> {
    if !enabled {
        return Ok(vk::DebugUtilsMessengerEXT::null());
    }
    let loader = ext_debug::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    loader
        .create_debug_utils_messenger(&ci, None)
        .vk_call("vkCreateDebugUtilsMessengerEXT")
}

#[cfg(not(debug_assertions))]
pub(crate) unsafe fn create_debug_messenger(
    _entry: &Entry,
    _instance: &Instance,
    _enabled: bool,
) -> Result<DebugState, FatalError> {
    Ok(())
}

#[cfg(debug_assertions)]
pub(crate) unsafe fn destroy_debug_messenger(entry: &Entry, instance: &Instance, dbg: DebugState) {
    if dbg != vk::DebugUtilsMessengerEXT::null() {
        ext_debug::Instance::new(entry, instance).destroy_debug_utils_messenger(dbg, None);
    }
}

#[cfg(not(debug_assertions))]
pub(crate) unsafe fn destroy_debug_messenger(_entry: &Entry, _instance: &Instance, _dbg: DebugState) {}

/// Attaches names to GPU objects when debug utils is loaded.
#[derive(Clone)]
pub struct DebugNames {
    #[cfg(debug_assertions)]
    loader: Option<ext_debug::Device>,
}

impl DebugNames {
    #[allow(unused_variables)]
    pub(crate) fn new(instance: &Instance, device: &ash::Device, enabled: bool) -> Self {
        Self {
            #[cfg(debug_assertions)]
            loader: enabled.then(|| ext_debug::Device::new(instance, device)),
        }
    }

    #[allow(unused_variables)]
    pub fn set<H: vk::Handle>(&self, handle: H, name: &str) {
        #[cfg(debug_assertions)]
        if let Some(loader) = &self.loader {
            let Ok(cname) = CString::new(name) else {
                return;
            };
            let info = vk::DebugUtilsObjectNameInfoEXT {
                s_type: vk::StructureType::DEBUG_UTILS_OBJECT_NAME_INFO_EXT,
                object_type: H::TYPE,
                object_handle: handle.as_raw(),
                p_object_name: cname.as_ptr(),
                ..Default::default()
            };
            unsafe {
                let _ = loader.set_debug_utils_object_name(&info);
            }
        }
    }
}

unsafe fn has_layer(entry: &Entry, name: &CStr) -> bool {
    entry
        .enumerate_instance_layer_properties()
        .unwrap_or_default()
        .iter()
        .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == name)
}

unsafe fn has_instance_ext(entry: &Entry, name: &CStr) -> bool {
    entry
        .enumerate_instance_extension_properties(None)
        .unwrap_or_default()
        .iter()
        .any(|e| CStr::from_ptr(e.extension_name.as_ptr()) == name)
}

/// Creates the instance with WSI extensions. In debug builds the validation
/// layer and debug utils are enabled when available; the returned flag says
/// whether debug utils is on.
pub(crate) unsafe fn create_instance(
    entry: &Entry,
    display: RawDisplayHandle,
) -> Result<(Instance, bool), FatalError> {
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: c"Tessera".as_ptr(),
        application_version: 0,
        p_engine_name: c"Tessera".as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_2,
        ..Default::default()
    };

    let mut exts: Vec<*const c_char> = ash_window::enumerate_required_extensions(display)
        .vk_call("enumerate_required_extensions")?
        .to_vec();
    let mut layers: Vec<*const c_char> = Vec::new();

    let debug_utils = cfg!(debug_assertions) && has_instance_ext(entry, ash::ext::debug_utils::NAME);
    if debug_utils {
        exts.push(ash::ext::debug_utils::NAME.as_ptr());
    }
    if cfg!(debug_assertions) {
        if has_layer(entry, VALIDATION_LAYER) {
            layers.push(VALIDATION_LAYER.as_ptr());
        } else {
            warn!("validation layer not installed; running without it");
        }
    }

    let ci = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: exts.len() as u32,
        pp_enabled_extension_names: exts.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };
    let instance = entry
        .create_instance(&ci, None)
        .vk_call("vkCreateInstance")?;
    Ok((instance, debug_utils))
}

pub(crate) unsafe fn device_extensions(instance: &Instance, phys: vk::PhysicalDevice) -> Vec<CString> {
    instance
        .enumerate_device_extension_properties(phys)
        .unwrap_or_default()
        .iter()
        .map(|e| CStr::from_ptr(e.extension_name.as_ptr()).to_owned())
        .collect()
}

/// What a candidate physical device offers; filled from the driver, judged
/// by [`Candidate::families`].
struct Candidate {
    phys: vk::PhysicalDevice,
    props: vk::PhysicalDeviceProperties,
    features: vk::PhysicalDeviceFeatures,
    extensions: Vec<CString>,
    families: Vec<FamilyInfo>,
    surface_ok: bool,
}

impl Candidate {
    fn families(&self) -> Option<QueueFamilies> {
        if !meets_feature_floor(&self.features)
            || !self.extensions.iter().any(|e| e.as_c_str() == swapchain::NAME)
            || !self.surface_ok
            || (self.props.limits.max_uniform_buffer_range as usize) < PointLightBlock::BYTE_SIZE
        {
            return None;
        }
        select_queue_families(&self.families)
    }
}

pub(crate) struct PickedDevice {
    pub phys: vk::PhysicalDevice,
    pub props: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub families: QueueFamilies,
    pub multiview: bool,
}

pub(crate) unsafe fn pick_physical_device(
    instance: &Instance,
    surf_i: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<PickedDevice, FatalError> {
    let devices = instance
        .enumerate_physical_devices()
        .vk_call("vkEnumeratePhysicalDevices")?;

    for phys in devices {
        let qprops = instance.get_physical_device_queue_family_properties(phys);
        let families = qprops
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let presentable = surf_i
                    .get_physical_device_surface_support(phys, i as u32, surface)
                    .unwrap_or(false);
                FamilyInfo::new(q.queue_flags, q.queue_count, presentable)
            })
            .collect();
        let surface_ok = !surf_i
            .get_physical_device_surface_formats(phys, surface)
            .unwrap_or_default()
            .is_empty()
            && !surf_i
                .get_physical_device_surface_present_modes(phys, surface)
                .unwrap_or_default()
                .is_empty();

        let c = Candidate {
            phys,
            props: instance.get_physical_device_properties(phys),
            features: instance.get_physical_device_features(phys),
            extensions: device_extensions(instance, phys),
            families,
            surface_ok,
        };
        let name = CStr::from_ptr(c.props.device_name.as_ptr()).to_string_lossy();

        let Some(families) = c.families() else {
            debug!("skipping physical device {name}");
            continue;
        };

        info!(
            "physical device: {name} ({}), driver {}.{}.{}, API {}.{}.{}",
            if c.props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
                "dedicated"
            } else {
                "integrated/other"
            },
            vk::api_version_major(c.props.driver_version),
            vk::api_version_minor(c.props.driver_version),
            vk::api_version_patch(c.props.driver_version),
            vk::api_version_major(c.props.api_version),
            vk::api_version_minor(c.props.api_version),
            vk::api_version_patch(c.props.api_version),
        );
        debug!("queue families: {families:?}");

        let multiview = c
            .extensions
            .iter()
            .any(|e| e.as_c_str() == ash::khr::multiview::NAME);
        return Ok(PickedDevice {
            phys: c.phys,
            props: c.props,
            features: c.features,
            families,
            multiview,
        });
    }

    Err(FatalError::NoSuitableDevice)
}

pub(crate) struct Queues {
    pub graphics: vk::Queue,
    pub compute: vk::Queue,
    pub present: vk::Queue,
    pub transfer: vk::Queue,
}

pub(crate) unsafe fn create_logical_device(
    instance: &Instance,
    picked: &PickedDevice,
) -> Result<(ash::Device, Queues), FatalError> {
    let fam = picked.families;
    let priorities = [1.0_f32, 1.0];

    let mut qinfos = vec![vk::DeviceQueueCreateInfo {
        s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
        queue_family_index: fam.graphics,
        queue_count: 2,
        p_queue_priorities: priorities.as_ptr(),
        ..Default::default()
    }];
    for family in [fam.present, fam.transfer] {
        if qinfos.iter().all(|q| q.queue_family_index != family) {
            qinfos.push(vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: family,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            });
        }
    }

    let mut exts = vec![swapchain::NAME.as_ptr()];
    if picked.multiview {
        exts.push(ash::khr::multiview::NAME.as_ptr());
    }

    let features = vk::PhysicalDeviceFeatures {
        sampler_anisotropy: picked.features.sampler_anisotropy,
        ..Default::default()
    };

    let ci = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: qinfos.len() as u32,
        p_queue_create_infos: qinfos.as_ptr(),
        enabled_extension_count: exts.len() as u32,
        pp_enabled_extension_names: exts.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };
    let device = instance
        .create_device(picked.phys, &ci, None)
        .vk_call("vkCreateDevice")?;

    let queues = Queues {
        graphics: device.get_device_queue(fam.graphics, 0),
        compute: device.get_device_queue(fam.graphics, 1),
        present: device.get_device_queue(fam.present, 0),
        transfer: device.get_device_queue(fam.transfer, 0),
    };
    Ok((device, queues))
}

pub(crate) unsafe fn pick_depth_format(
    instance: &Instance,
    phys: vk::PhysicalDevice,
) -> Result<vk::Format, FatalError> {
    // Depth-only: barriers and the sampled view use the DEPTH aspect alone.
    let candidates = [vk::Format::D32_SFLOAT, vk::Format::X8_D24_UNORM_PACK32, vk::Format::D16_UNORM];
    for fmt in candidates {
        let feats = instance
            .get_physical_device_format_properties(phys, fmt)
            .optimal_tiling_features;
        if feats.contains(
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT | vk::FormatFeatureFlags::SAMPLED_IMAGE,
        ) {
            return Ok(fmt);
        }
    }
    Err(FatalError::NoDepthFormat)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fam(flags: vk::QueueFlags, count: u32, present: bool) -> FamilyInfo {
        FamilyInfo::new(flags, count, present)
    }

    const GCT: vk::QueueFlags = vk::QueueFlags::from_raw(
        vk::QueueFlags::GRAPHICS.as_raw()
            | vk::QueueFlags::COMPUTE.as_raw()
            | vk::QueueFlags::TRANSFER.as_raw(),
    );

    #[test]
    fn typical_discrete_layout() {
        let families = [
            fam(GCT, 16, true),
            fam(vk::QueueFlags::TRANSFER, 2, false),
            fam(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, 8, false),
        ];
        assert_eq!(
            select_queue_families(&families),
            Some(QueueFamilies {
                graphics: 0,
                present: 0,
                transfer: 1
            })
        );
    }

    #[test]
    fn graphics_family_needs_two_queues() {
        let families = [
            fam(GCT, 1, true),
            fam(GCT, 2, false),
            fam(vk::QueueFlags::TRANSFER, 1, false),
        ];
        assert_eq!(
            select_queue_families(&families),
            Some(QueueFamilies {
                graphics: 1,
                present: 0,
                transfer: 2
            })
        );
    }

    #[test]
    fn graphics_without_compute_is_rejected() {
        let families = [
            fam(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, 4, true),
            fam(vk::QueueFlags::TRANSFER, 1, false),
        ];
        assert_eq!(select_queue_families(&families), None);
    }

    #[test]
    fn distinct_transfer_family_is_required() {
        let families = [fam(GCT, 4, true)];
        assert_eq!(select_queue_families(&families), None);

        let families = [fam(GCT, 4, false), fam(vk::QueueFlags::TRANSFER, 1, true)];
        assert_eq!(select_queue_families(&families), None);
    }

    #[test]
    fn no_presentable_family_is_rejected() {
        let families = [fam(GCT, 4, false), fam(vk::QueueFlags::TRANSFER, 1, false)];
        assert_eq!(select_queue_families(&families), None);
    }

    #[test]
    fn feature_floor() {
        let none = vk::PhysicalDeviceFeatures::default();
        assert!(!meets_feature_floor(&none));
        let aniso = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: vk::TRUE,
            ..Default::default()
        };
        assert!(meets_feature_floor(&aniso));
    }
}
