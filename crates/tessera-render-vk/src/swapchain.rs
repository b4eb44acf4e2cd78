// SPDX-License-Identifier: CEPL-1.0
//! Swapchain creation and the choices that go into it.

use ash::khr::{surface, swapchain};
use ash::vk;
use tessera_render::RenderSize;
use tracing::info;

use crate::device::QueueFamilies;
use crate::error::{FatalError, VkContext};

#[derive(Default)]
pub(crate) struct SwapchainBundle {
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
}

/// `B8G8R8A8_SRGB` in the sRGB colour space when offered, else the first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let preferred = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };
    match formats {
        [] => None,
        [only] if only.format == vk::Format::UNDEFINED => Some(preferred),
        _ => Some(
            formats
                .iter()
                .copied()
                .find(|f| f.format == preferred.format && f.color_space == preferred.color_space)
                .unwrap_or(formats[0]),
        ),
    }
}

/// FIFO under vsync, otherwise MAILBOX when available. FIFO is always there.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync && modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum (0 means no maximum).
pub fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    if caps.max_image_count == 0 {
        caps.min_image_count + 1
    } else {
        (caps.min_image_count + 1).min(caps.max_image_count)
    }
}

/// Concurrent sharing between graphics and present when they differ.
pub fn sharing(families: &QueueFamilies) -> (vk::SharingMode, Vec<u32>) {
    if families.graphics == families.present {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (
            vk::SharingMode::CONCURRENT,
            vec![families.graphics, families.present],
        )
    }
}

pub(crate) unsafe fn create_swapchain(
    device: &ash::Device,
    surf_i: &surface::Instance,
    swap_d: &swapchain::Device,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    families: &QueueFamilies,
    want: RenderSize,
    vsync: bool,
) -> Result<SwapchainBundle, FatalError> {
    let caps = surf_i
        .get_physical_device_surface_capabilities(phys, surface)
        .vk_call("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
    let formats = surf_i
        .get_physical_device_surface_formats(phys, surface)
        .vk_call("vkGetPhysicalDeviceSurfaceFormatsKHR")?;
    let modes = surf_i
        .get_physical_device_surface_present_modes(phys, surface)
        .vk_call("vkGetPhysicalDeviceSurfacePresentModesKHR")?;

    let surf_format = choose_surface_format(&formats).ok_or(FatalError::SurfaceUnsupported)?;
    let present_mode = choose_present_mode(&modes, vsync);
    let extent = extent_from_caps(&caps, want);
    let min_count = image_count(&caps);
    let (sharing_mode, family_indices) = sharing(families);

    info!(
        "swapchain: {:?} / {:?}, {:?}, {}x{}, {} images",
        surf_format.format,
        surf_format.color_space,
        present_mode,
        extent.width,
        extent.height,
        min_count
    );

    let pre_transform = if caps
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        caps.current_transform
    };

    let ci = vk::SwapchainCreateInfoKHR {
        s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
        surface,
        min_image_count: min_count,
        image_format: surf_format.format,
        image_color_space: surf_format.color_space,
        image_extent: extent,
        image_array_layers: 1,
        image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        image_sharing_mode: sharing_mode,
        queue_family_index_count: family_indices.len() as u32,
        p_queue_family_indices: family_indices.as_ptr(),
        pre_transform,
        composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
        present_mode,
        clipped: vk::TRUE,
        ..Default::default()
    };

    let swapchain = swap_d
        .create_swapchain(&ci, None)
        .vk_call("vkCreateSwapchainKHR")?;
    let images = match swap_d.get_swapchain_images(swapchain) {
        Ok(i) => i,
        Err(result) => {
            swap_d.destroy_swapchain(swapchain, None);
            return Err(FatalError::Vk {
                call: "vkGetSwapchainImagesKHR",
                result,
            });
        }
    };

    let mut views = Vec::with_capacity(images.len());
    for &image in &images {
        let iv = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format: surf_format.format,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        match device.create_image_view(&iv, None) {
            Ok(v) => views.push(v),
            Err(result) => {
                for v in views {
                    device.destroy_image_view(v, None);
                }
                swap_d.destroy_swapchain(swapchain, None);
                return Err(FatalError::Vk {
                    call: "vkCreateImageView (swapchain)",
                    result,
                });
            }
        }
    }

    Ok(SwapchainBundle {
        swapchain,
        format: surf_format.format,
        extent,
        images,
        views,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sf(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn prefers_bgra_srgb() {
        let formats = [sf(vk::Format::B8G8R8A8_UNORM), sf(vk::Format::B8G8R8A8_SRGB)];
        assert_eq!(
            choose_surface_format(&formats).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_SRGB)
        );
        let formats = [sf(vk::Format::R8G8B8A8_UNORM)];
        assert_eq!(
            choose_surface_format(&formats).map(|f| f.format),
            Some(vk::Format::R8G8B8A8_UNORM)
        );
        assert!(choose_surface_format(&[]).is_none());
        assert_eq!(
            choose_surface_format(&[sf(vk::Format::UNDEFINED)]).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_SRGB)
        );
    }

    #[test]
    fn present_mode_follows_vsync() {
        let all = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&all, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&all, true), vk::PresentModeKHR::FIFO);
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO], false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_and_count_respect_caps() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 1024,
                height: 1024,
            },
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        let e = extent_from_caps(&caps, RenderSize { width: 4000, height: 600 });
        assert_eq!((e.width, e.height), (1024, 600));
        assert_eq!(image_count(&caps), 3);

        caps.max_image_count = 2;
        caps.current_extent = vk::Extent2D { width: 800, height: 600 };
        assert_eq!(image_count(&caps), 2);
        let e = extent_from_caps(&caps, RenderSize { width: 1, height: 1 });
        assert_eq!((e.width, e.height), (800, 600));
    }

    #[test]
    fn sharing_mode_by_family() {
        let same = QueueFamilies {
            graphics: 0,
            present: 0,
            transfer: 1,
        };
        assert_eq!(sharing(&same), (vk::SharingMode::EXCLUSIVE, vec![]));
        let split = QueueFamilies { present: 2, ..same };
        assert_eq!(sharing(&split), (vk::SharingMode::CONCURRENT, vec![0, 2]));
    }
}
