// SPDX-License-Identifier: CEPL-1.0
//! Pipeline handle, its layout and the shader modules it was built from.

use std::io::Cursor;

use ash::vk;

use crate::error::{FatalError, VkContext};

#[derive(Debug, Default)]
pub struct Pipeline {
    pub handle: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub shaders: Vec<vk::ShaderModule>,
}

impl Pipeline {
    /// Valid only when the handle, layout and at least one module all are.
    pub fn is_empty(&self) -> bool {
        self.handle == vk::Pipeline::null()
            || self.layout == vk::PipelineLayout::null()
            || self.shaders.is_empty()
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if self.handle != vk::Pipeline::null() {
            device.destroy_pipeline(self.handle, None);
        }
        if self.layout != vk::PipelineLayout::null() {
            device.destroy_pipeline_layout(self.layout, None);
        }
        for m in self.shaders.drain(..) {
            device.destroy_shader_module(m, None);
        }
        self.handle = vk::Pipeline::null();
        self.layout = vk::PipelineLayout::null();
    }
}

pub(crate) unsafe fn create_shader_module(
    device: &ash::Device,
    name: &'static str,
    bytes: &[u8],
) -> Result<vk::ShaderModule, FatalError> {
    let code = ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|source| FatalError::Shader { name, source })?;
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        code_size: code.len() * 4,
        p_code: code.as_ptr(),
        ..Default::default()
    };
    device
        .create_shader_module(&ci, None)
        .vk_call("vkCreateShaderModule")
}

pub(crate) unsafe fn create_layout(
    device: &ash::Device,
    set_layouts: &[vk::DescriptorSetLayout],
    push_constants: &[vk::PushConstantRange],
) -> Result<vk::PipelineLayout, FatalError> {
    let ci = vk::PipelineLayoutCreateInfo {
        s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
        set_layout_count: set_layouts.len() as u32,
        p_set_layouts: set_layouts.as_ptr(),
        push_constant_range_count: push_constants.len() as u32,
        p_push_constant_ranges: push_constants.as_ptr(),
        ..Default::default()
    };
    device
        .create_pipeline_layout(&ci, None)
        .vk_call("vkCreatePipelineLayout")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn partially_built_pipeline_is_empty() {
        assert!(Pipeline::default().is_empty());
        let p = Pipeline {
            handle: vk::Pipeline::from_raw(1),
            layout: vk::PipelineLayout::from_raw(2),
            shaders: Vec::new(),
        };
        assert!(p.is_empty());
        let p = Pipeline {
            shaders: vec![vk::ShaderModule::from_raw(3)],
            ..p
        };
        assert!(!p.is_empty());
    }
}
