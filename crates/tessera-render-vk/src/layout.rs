// SPDX-License-Identifier: CEPL-1.0
//! The image layout transitions the renderer performs, and nothing else.

use ash::vk;

/// Access masks and aspect for one supported `from -> to` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub aspect: vk::ImageAspectFlags,
}

const DEPTH_RW: vk::AccessFlags = vk::AccessFlags::from_raw(
    vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw(),
);

/// Stages on both sides of every transition barrier.
const BARRIER_STAGES: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
    vk::PipelineStageFlags::TOP_OF_PIPE.as_raw()
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS.as_raw()
        | vk::PipelineStageFlags::HOST.as_raw()
        | vk::PipelineStageFlags::VERTEX_SHADER.as_raw()
        | vk::PipelineStageFlags::FRAGMENT_SHADER.as_raw()
        | vk::PipelineStageFlags::TRANSFER.as_raw(),
);

/// Looks up a transition. `None` means the pair is not one the renderer uses.
pub fn transition(from: vk::ImageLayout, to: vk::ImageLayout) -> Option<Transition> {
    use vk::ImageLayout as L;

    let (src_access, dst_access) = match (from, to) {
        (L::PREINITIALIZED, L::TRANSFER_SRC_OPTIMAL) => {
            (vk::AccessFlags::HOST_WRITE, vk::AccessFlags::TRANSFER_READ)
        }
        (L::PREINITIALIZED, L::TRANSFER_DST_OPTIMAL) => {
            (vk::AccessFlags::HOST_WRITE, vk::AccessFlags::TRANSFER_WRITE)
        }
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (vk::AccessFlags::empty(), DEPTH_RW),
        (L::UNDEFINED, L::SHADER_READ_ONLY_OPTIMAL) => {
            (vk::AccessFlags::empty(), vk::AccessFlags::SHADER_READ)
        }
        (L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => {
            (DEPTH_RW, vk::AccessFlags::SHADER_READ)
        }
        (L::SHADER_READ_ONLY_OPTIMAL, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => {
            (vk::AccessFlags::SHADER_READ, DEPTH_RW)
        }
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => {
            (vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::SHADER_READ)
        }
        _ => return None,
    };

    let aspect = if from == L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        || to == L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    };

    Some(Transition {
        src_access,
        dst_access,
        aspect,
    })
}

/// Builds the barrier for `from -> to`.
///
/// # Panics
/// If the pair is not in the supported set.
pub fn layout_barrier(
    image: vk::Image,
    from: vk::ImageLayout,
    to: vk::ImageLayout,
) -> vk::ImageMemoryBarrier<'static> {
    let Some(t) = transition(from, to) else {
        panic!("unsupported image layout transition {from:?} -> {to:?}");
    };
    vk::ImageMemoryBarrier {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
        src_access_mask: t.src_access,
        dst_access_mask: t.dst_access,
        old_layout: from,
        new_layout: to,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image,
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: t.aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    }
}

/// Records the barrier for `from -> to` into `cmd`.
///
/// # Panics
/// If the pair is not in the supported set.
pub unsafe fn record_image_layout_change(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    from: vk::ImageLayout,
    to: vk::ImageLayout,
) {
    let barrier = layout_barrier(image, from, to);
    device.cmd_pipeline_barrier(
        cmd,
        BARRIER_STAGES,
        BARRIER_STAGES,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        std::slice::from_ref(&barrier),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::ImageLayout as L;

    #[test]
    fn supported_set_is_exactly_seven_pairs() {
        let layouts = [
            L::UNDEFINED,
            L::PREINITIALIZED,
            L::TRANSFER_SRC_OPTIMAL,
            L::TRANSFER_DST_OPTIMAL,
            L::SHADER_READ_ONLY_OPTIMAL,
            L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            L::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            L::COLOR_ATTACHMENT_OPTIMAL,
            L::PRESENT_SRC_KHR,
        ];
        let n = layouts
            .iter()
            .flat_map(|&a| layouts.iter().map(move |&b| (a, b)))
            .filter(|&(a, b)| transition(a, b).is_some())
            .count();
        assert_eq!(n, 7);
    }

    #[test]
    fn depth_transitions_use_depth_aspect() {
        let t = transition(L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL).unwrap();
        assert_eq!(t.aspect, vk::ImageAspectFlags::DEPTH);
        assert!(t.src_access.is_empty());
        assert!(t.dst_access.contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));

        let t = transition(L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL)
            .unwrap();
        assert_eq!(t.aspect, vk::ImageAspectFlags::DEPTH);
        assert_eq!(t.dst_access, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn texture_upload_path() {
        let t = transition(L::PREINITIALIZED, L::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(t.src_access, vk::AccessFlags::HOST_WRITE);
        assert_eq!(t.aspect, vk::ImageAspectFlags::COLOR);

        let b = layout_barrier(vk::Image::null(), L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(b.src_access_mask, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(b.new_layout, L::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(b.subresource_range.level_count, 1);
    }

    #[test]
    #[should_panic(expected = "unsupported image layout transition")]
    fn unsupported_pair_panics() {
        let _ = layout_barrier(vk::Image::null(), L::PRESENT_SRC_KHR, L::TRANSFER_DST_OPTIMAL);
    }

    #[test]
    #[should_panic]
    fn reverse_of_upload_is_unsupported() {
        let _ = layout_barrier(vk::Image::null(), L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_DST_OPTIMAL);
    }
}
