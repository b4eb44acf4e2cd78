// SPDX-License-Identifier: CEPL-1.0
//! Descriptor set layouts, the shared pool and the shared sampler.

use ash::vk;
use tracing::warn;

use crate::error::{FatalError, VkContext};

pub const POOL_UNIFORM_BUFFERS: u32 = 100;
pub const POOL_SAMPLERS: u32 = 100;
pub const POOL_STORAGE_BUFFERS: u32 = 3;
pub const POOL_MAX_SETS: u32 = 200;

/// Set numbers as the shaded pipeline sees them.
pub mod set {
    pub const OBJECT: u32 = 0;
    pub const CAMERA: u32 = 1;
    pub const LIGHT_CULL: u32 = 2;
    pub const INTERMEDIATE: u32 = 3;
    pub const MATERIAL: u32 = 4;
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct SetLayouts {
    pub object: vk::DescriptorSetLayout,
    pub camera: vk::DescriptorSetLayout,
    pub light_cull: vk::DescriptorSetLayout,
    pub intermediate: vk::DescriptorSetLayout,
    pub material: vk::DescriptorSetLayout,
}

impl SetLayouts {
    pub fn depth(&self) -> [vk::DescriptorSetLayout; 2] {
        [self.object, self.camera]
    }

    pub fn shaded(&self) -> [vk::DescriptorSetLayout; 5] {
        [
            self.object,
            self.camera,
            self.light_cull,
            self.intermediate,
            self.material,
        ]
    }

    pub fn compute(&self) -> [vk::DescriptorSetLayout; 3] {
        [self.light_cull, self.camera, self.intermediate]
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        for l in self.shaded() {
            if l != vk::DescriptorSetLayout::null() {
                device.destroy_descriptor_set_layout(l, None);
            }
        }
        *self = Self::default();
    }
}

fn binding(
    binding: u32,
    ty: vk::DescriptorType,
    stages: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding {
        binding,
        descriptor_type: ty,
        descriptor_count: 1,
        stage_flags: stages,
        ..Default::default()
    }
}

/// Binding tables for each set, in `SetLayouts` field order.
pub fn layout_bindings() -> [Vec<vk::DescriptorSetLayoutBinding<'static>>; 5] {
    use vk::DescriptorType as D;
    use vk::ShaderStageFlags as S;
    [
        vec![binding(0, D::UNIFORM_BUFFER, S::VERTEX | S::FRAGMENT)],
        vec![binding(0, D::UNIFORM_BUFFER, S::VERTEX | S::FRAGMENT | S::COMPUTE)],
        vec![
            binding(0, D::STORAGE_BUFFER, S::FRAGMENT | S::COMPUTE),
            binding(1, D::UNIFORM_BUFFER, S::FRAGMENT | S::COMPUTE),
        ],
        vec![binding(0, D::COMBINED_IMAGE_SAMPLER, S::COMPUTE | S::FRAGMENT)],
        vec![
            binding(0, D::UNIFORM_BUFFER, S::FRAGMENT),
            binding(1, D::COMBINED_IMAGE_SAMPLER, S::FRAGMENT),
            binding(2, D::COMBINED_IMAGE_SAMPLER, S::FRAGMENT),
        ],
    ]
}

pub(crate) unsafe fn create_set_layouts(device: &ash::Device) -> Result<SetLayouts, FatalError> {
    let mut created = Vec::with_capacity(5);
    for bindings in layout_bindings() {
        let ci = vk::DescriptorSetLayoutCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
            binding_count: bindings.len() as u32,
            p_bindings: bindings.as_ptr(),
            ..Default::default()
        };
        match device.create_descriptor_set_layout(&ci, None) {
            Ok(l) => created.push(l),
            Err(result) => {
                for l in created {
                    device.destroy_descriptor_set_layout(l, None);
                }
                return Err(FatalError::Vk {
                    call: "vkCreateDescriptorSetLayout",
                    result,
                });
            }
        }
    }
    Ok(SetLayouts {
        object: created[0],
        camera: created[1],
        light_cull: created[2],
        intermediate: created[3],
        material: created[4],
    })
}

pub(crate) unsafe fn create_pool(device: &ash::Device) -> Result<vk::DescriptorPool, FatalError> {
    let sizes = [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: POOL_UNIFORM_BUFFERS,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: POOL_SAMPLERS,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_BUFFER,
            descriptor_count: POOL_STORAGE_BUFFERS,
        },
    ];
    let ci = vk::DescriptorPoolCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
        flags: vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET,
        max_sets: POOL_MAX_SETS,
        pool_size_count: sizes.len() as u32,
        p_pool_sizes: sizes.as_ptr(),
        ..Default::default()
    };
    device
        .create_descriptor_pool(&ci, None)
        .vk_call("vkCreateDescriptorPool")
}

/// Linear filtering, repeat addressing, anisotropic when the device allows.
pub fn sampler_info(anisotropy: bool) -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo {
        s_type: vk::StructureType::SAMPLER_CREATE_INFO,
        mag_filter: vk::Filter::LINEAR,
        min_filter: vk::Filter::LINEAR,
        mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        address_mode_u: vk::SamplerAddressMode::REPEAT,
        address_mode_v: vk::SamplerAddressMode::REPEAT,
        address_mode_w: vk::SamplerAddressMode::REPEAT,
        anisotropy_enable: anisotropy as vk::Bool32,
        max_anisotropy: if anisotropy { 16.0 } else { 1.0 },
        compare_enable: vk::FALSE,
        compare_op: vk::CompareOp::ALWAYS,
        border_color: vk::BorderColor::INT_OPAQUE_BLACK,
        unnormalized_coordinates: vk::FALSE,
        ..Default::default()
    }
}

pub(crate) unsafe fn create_sampler(
    device: &ash::Device,
    anisotropy: bool,
) -> Result<vk::Sampler, FatalError> {
    device
        .create_sampler(&sampler_info(anisotropy), None)
        .vk_call("vkCreateSampler")
}

pub(crate) unsafe fn allocate_set(
    device: &ash::Device,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
) -> Result<vk::DescriptorSet, FatalError> {
    let ai = vk::DescriptorSetAllocateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
        descriptor_pool: pool,
        descriptor_set_count: 1,
        p_set_layouts: &layout,
        ..Default::default()
    };
    device
        .allocate_descriptor_sets(&ai)
        .map(|s| s[0])
        .map_err(FatalError::DescriptorAllocation)
}

/// The non-null entries of `sets`.
pub fn live_sets(sets: &[vk::DescriptorSet]) -> Vec<vk::DescriptorSet> {
    sets.iter()
        .copied()
        .filter(|&s| s != vk::DescriptorSet::null())
        .collect()
}

/// Returns the live entries of `sets` to `pool`. A failure is logged, not
/// propagated: this only runs on teardown paths.
pub(crate) unsafe fn free_sets(
    device: &ash::Device,
    pool: vk::DescriptorPool,
    sets: &[vk::DescriptorSet],
    what: &str,
) {
    let live = live_sets(sets);
    if live.is_empty() {
        return;
    }
    if let Err(e) = device.free_descriptor_sets(pool, &live) {
        warn!("freeing {what} descriptor sets: {e}");
    }
}

pub(crate) unsafe fn write_buffer(
    device: &ash::Device,
    set: vk::DescriptorSet,
    binding: u32,
    ty: vk::DescriptorType,
    info: vk::DescriptorBufferInfo,
) {
    let write = vk::WriteDescriptorSet {
        s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
        dst_set: set,
        dst_binding: binding,
        descriptor_count: 1,
        descriptor_type: ty,
        p_buffer_info: &info,
        ..Default::default()
    };
    device.update_descriptor_sets(std::slice::from_ref(&write), &[]);
}

pub(crate) unsafe fn write_image(
    device: &ash::Device,
    set: vk::DescriptorSet,
    binding: u32,
    sampler: vk::Sampler,
    view: vk::ImageView,
    layout: vk::ImageLayout,
) {
    let info = vk::DescriptorImageInfo {
        sampler,
        image_view: view,
        image_layout: layout,
    };
    let write = vk::WriteDescriptorSet {
        s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
        dst_set: set,
        dst_binding: binding,
        descriptor_count: 1,
        descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        p_image_info: &info,
        ..Default::default()
    };
    device.update_descriptor_sets(std::slice::from_ref(&write), &[]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn null_sets_are_never_freed() {
        let a = vk::DescriptorSet::from_raw(7);
        let b = vk::DescriptorSet::from_raw(9);
        let live = live_sets(&[vk::DescriptorSet::null(), a, vk::DescriptorSet::null(), b]);
        assert_eq!(live, [a, b]);
        assert!(live_sets(&[vk::DescriptorSet::null(); 4]).is_empty());
    }

    #[test]
    fn light_cull_set_is_storage_then_uniform() {
        let b = &layout_bindings()[2];
        assert_eq!(b.len(), 2);
        assert_eq!(b[0].descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
        assert_eq!(b[1].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert!(b.iter().all(|x| x.stage_flags.contains(vk::ShaderStageFlags::COMPUTE)));
    }

    #[test]
    fn camera_is_visible_to_every_stage_that_reads_it() {
        let b = &layout_bindings()[1][0];
        assert!(b.stage_flags.contains(
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT | vk::ShaderStageFlags::COMPUTE
        ));
    }

    #[test]
    fn material_set_has_info_and_two_textures() {
        let b = &layout_bindings()[4];
        let kinds: Vec<_> = b.iter().map(|x| (x.binding, x.descriptor_type)).collect();
        assert_eq!(
            kinds,
            [
                (0, vk::DescriptorType::UNIFORM_BUFFER),
                (1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
                (2, vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
            ]
        );
    }

    #[test]
    fn pool_covers_the_storage_bindings() {
        let storage = layout_bindings()
            .iter()
            .flatten()
            .filter(|b| b.descriptor_type == vk::DescriptorType::STORAGE_BUFFER)
            .count() as u32;
        assert!(storage <= POOL_STORAGE_BUFFERS);
    }

    #[test]
    fn sampler_anisotropy_is_optional() {
        assert_eq!(sampler_info(true).max_anisotropy, 16.0);
        let s = sampler_info(false);
        assert_eq!(s.anisotropy_enable, vk::FALSE);
        assert_eq!(s.address_mode_u, vk::SamplerAddressMode::REPEAT);
    }
}
