// SPDX-License-Identifier: CEPL-1.0
//! Text reports behind the `vkdiag` console command.

use std::ffi::CStr;

use ash::vk;

pub const USAGE: &str = "Usage: vkdiag ext|gpu|queue";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagTopic {
    Extensions,
    Gpu,
    Queues,
}

impl DiagTopic {
    /// `args` excludes the command name itself.
    pub fn parse(args: &[&str]) -> Option<Self> {
        match args.first().copied()? {
            "ext" => Some(Self::Extensions),
            "gpu" => Some(Self::Gpu),
            "queue" => Some(Self::Queues),
            _ => None,
        }
    }
}

fn yes_no(b: vk::Bool32) -> &'static str {
    if b == vk::TRUE {
        "yes"
    } else {
        "no"
    }
}

fn version(v: u32) -> String {
    format!(
        "{}.{}.{}",
        vk::api_version_major(v),
        vk::api_version_minor(v),
        vk::api_version_patch(v)
    )
}

fn ext_name(e: &vk::ExtensionProperties) -> String {
    e.extension_name_as_c_str()
        .map(CStr::to_string_lossy)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| "<invalid name>".to_owned())
}

pub fn extension_report(
    instance_exts: &[vk::ExtensionProperties],
    device_exts: &[vk::ExtensionProperties],
) -> Vec<String> {
    let mut out = vec!["All supported instance extensions:".to_owned()];
    out.extend(
        instance_exts
            .iter()
            .map(|e| format!("\t{} (vers. {})", ext_name(e), e.spec_version)),
    );
    out.push("All supported device extensions:".to_owned());
    out.extend(
        device_exts
            .iter()
            .map(|e| format!("\t{} (vers. {})", ext_name(e), e.spec_version)),
    );
    out
}

pub fn gpu_report(props: &vk::PhysicalDeviceProperties, feats: &vk::PhysicalDeviceFeatures) -> Vec<String> {
    let name = props
        .device_name_as_c_str()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    vec![
        "Physical device information:".to_owned(),
        format!("Name: {name}"),
        format!("\tDriver version: {}", version(props.driver_version)),
        format!("\tAPI version: {}", version(props.api_version)),
        format!("\tSupports tessellation shaders: {}", yes_no(feats.tessellation_shader)),
        format!("\tSupports dual-source blending: {}", yes_no(feats.dual_src_blend)),
        format!("\tSupports logic operations: {}", yes_no(feats.logic_op)),
        format!("\tSupports anisotropic filtering: {}", yes_no(feats.sampler_anisotropy)),
    ]
}

pub fn queue_report(families: &[vk::QueueFamilyProperties]) -> Vec<String> {
    let mut out = vec!["All device queue families:".to_owned()];
    for (i, q) in families.iter().enumerate() {
        out.push(format!("- Queue Family {i}"));
        out.push(format!("Flags: {:?}", q.queue_flags));
        out.push(format!("Queue count: {}", q.queue_count));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_topics_only() {
        assert_eq!(DiagTopic::parse(&["ext"]), Some(DiagTopic::Extensions));
        assert_eq!(DiagTopic::parse(&["queue", "extra"]), Some(DiagTopic::Queues));
        assert_eq!(DiagTopic::parse(&[]), None);
        assert_eq!(DiagTopic::parse(&["memory"]), None);
    }

    #[test]
    fn queue_report_lists_every_family() {
        let fams = [
            vk::QueueFamilyProperties {
                queue_flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
                queue_count: 16,
                ..Default::default()
            },
            vk::QueueFamilyProperties {
                queue_flags: vk::QueueFlags::TRANSFER,
                queue_count: 2,
                ..Default::default()
            },
        ];
        let lines = queue_report(&fams);
        assert_eq!(lines.len(), 1 + 3 * 2);
        assert_eq!(lines[1], "- Queue Family 0");
        assert!(lines[2].contains("GRAPHICS"));
        assert_eq!(lines[6], "Queue count: 2");
    }

    #[test]
    fn gpu_report_prints_versions_and_features() {
        let props = vk::PhysicalDeviceProperties {
            api_version: vk::make_api_version(0, 1, 3, 250),
            ..Default::default()
        };
        let feats = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: vk::TRUE,
            ..Default::default()
        };
        let lines = gpu_report(&props, &feats);
        assert!(lines.iter().any(|l| l == "\tAPI version: 1.3.250"));
        assert!(lines.iter().any(|l| l == "\tSupports anisotropic filtering: yes"));
        assert!(lines.iter().any(|l| l == "\tSupports logic operations: no"));
    }

    #[test]
    fn extension_report_has_both_headings() {
        let lines = extension_report(&[], &[]);
        assert_eq!(lines.len(), 2);
    }
}
