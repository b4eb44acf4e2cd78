// SPDX-License-Identifier: CEPL-1.0
//! Device-local meshes.
//!
//! A model packs every mesh's vertices and indices into one buffer; each
//! [`Mesh`] is a pair of slices into it, so all of them go away together.

use ash::vk;
use gpu_allocator::MemoryLocation;
use tessera_render::{Index, MeshData};
use tracing::debug;

use crate::command::OneTimeSubmit;
use crate::error::FatalError;
use crate::memory::{GpuBuffer, GpuMemory, MemoryRelease};

const VERTEX_ALIGN: u64 = 16;
const INDEX_ALIGN: u64 = std::mem::size_of::<Index>() as u64;

fn align_up(v: u64, a: u64) -> u64 {
    v.div_ceil(a) * a
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mesh {
    pub vertex_offset: vk::DeviceSize,
    pub index_offset: vk::DeviceSize,
    pub index_count: u32,
}

/// Where each mesh lands in the packed buffer, and the total size.
pub fn pack_layout(meshes: &[MeshData]) -> (Vec<Mesh>, vk::DeviceSize) {
    let mut cursor = 0;
    let mut out = Vec::with_capacity(meshes.len());
    for m in meshes.iter().filter(|m| !m.is_empty()) {
        let vertex_offset = align_up(cursor, VERTEX_ALIGN);
        let index_offset = align_up(vertex_offset + m.vertex_bytes().len() as u64, INDEX_ALIGN);
        cursor = index_offset + m.index_bytes().len() as u64;
        out.push(Mesh {
            vertex_offset,
            index_offset,
            index_count: m.indices.len() as u32,
        });
    }
    (out, cursor)
}

#[derive(Debug, Default)]
pub struct Model {
    buffer: GpuBuffer,
    meshes: Vec<Mesh>,
}

impl Model {
    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    pub fn destroy(&mut self, mem: &dyn MemoryRelease) {
        self.buffer.destroy(mem);
        self.meshes.clear();
    }
}

/// Uploads `meshes` through a staging buffer. Empty meshes are dropped; a
/// model with nothing left owns no memory.
pub fn upload_model(
    mem: &GpuMemory,
    onetime: &OneTimeSubmit,
    name: &str,
    meshes: &[MeshData],
) -> Result<Model, FatalError> {
    let (layout, size) = pack_layout(meshes);
    if layout.is_empty() {
        return Ok(Model::default());
    }

    let mut staging = mem.create_buffer(
        &format!("{name} (staging)"),
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
    )?;
    let result = (|| -> Result<GpuBuffer, FatalError> {
        for (slot, data) in layout.iter().zip(meshes.iter().filter(|m| !m.is_empty())) {
            staging.write_bytes(slot.vertex_offset as usize, data.vertex_bytes())?;
            staging.write_bytes(slot.index_offset as usize, data.index_bytes())?;
        }
        let mut buffer = mem.create_buffer(
            name,
            size,
            vk::BufferUsageFlags::VERTEX_BUFFER
                | vk::BufferUsageFlags::INDEX_BUFFER
                | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
        )?;
        let (src, dst) = (staging.handle(), buffer.handle());
        let copied = onetime.run(|device, cmd| unsafe {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            device.cmd_copy_buffer(cmd, src, dst, std::slice::from_ref(&region));
        });
        if let Err(e) = copied {
            buffer.destroy(mem);
            return Err(e);
        }
        Ok(buffer)
    })();
    staging.destroy(mem);

    let buffer = result?;
    debug!("model `{name}`: {} meshes, {size} bytes", layout.len());
    Ok(Model {
        buffer,
        meshes: layout,
    })
}

/// Binds and draws every mesh of `model` into each of `cmds`.
pub(crate) unsafe fn record_draw(device: &ash::Device, cmds: &[vk::CommandBuffer], model: &Model) {
    if model.is_empty() {
        return;
    }
    assert!(
        model.buffer() != vk::Buffer::null(),
        "drawing a model whose buffer was destroyed"
    );
    for &cmd in cmds {
        for mesh in model.meshes() {
            device.cmd_bind_vertex_buffers(cmd, 0, &[model.buffer()], &[mesh.vertex_offset]);
            device.cmd_bind_index_buffer(cmd, model.buffer(), mesh.index_offset, vk::IndexType::UINT32);
            device.cmd_draw_indexed(cmd, mesh.index_count, 1, 0, 0, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_math::Vec3;
    use tessera_render::Vertex;

    fn tri() -> MeshData {
        MeshData::new(
            [Vec3::ZERO, Vec3::X, Vec3::Y].into_iter().map(Vertex::at).collect(),
            vec![0, 1, 2],
        )
    }

    #[test]
    fn meshes_are_packed_back_to_back_with_alignment() {
        let (layout, size) = pack_layout(&[tri(), tri()]);
        assert_eq!(layout.len(), 2);
        assert_eq!(layout[0].vertex_offset, 0);
        assert_eq!(layout[0].index_offset, 3 * 56);
        assert_eq!(layout[0].index_count, 3);
        let end0 = 3 * 56 + 12;
        assert_eq!(layout[1].vertex_offset, align_up(end0, 16));
        assert_eq!(layout[1].vertex_offset % 16, 0);
        assert_eq!(size, layout[1].index_offset + 12);
    }

    #[test]
    fn empty_meshes_take_no_space() {
        let (layout, size) = pack_layout(&[MeshData::default(), tri()]);
        assert_eq!(layout.len(), 1);
        assert_eq!(layout[0].vertex_offset, 0);
        assert_eq!(pack_layout(&[]).1, 0);
        assert!(size > 0);
    }

    #[test]
    fn default_model_is_empty() {
        let m = Model::default();
        assert!(m.is_empty());
        assert_eq!(m.buffer(), vk::Buffer::null());
    }
}
