use std::{env, fs, path::PathBuf};

const SHADERS: &[(&str, shaderc::ShaderKind)] = &[
    ("depth.vert", shaderc::ShaderKind::Vertex),
    ("fwdplus.vert", shaderc::ShaderKind::Vertex),
    ("fwdplus.frag", shaderc::ShaderKind::Fragment),
    ("lightcull.comp", shaderc::ShaderKind::Compute),
    ("overlay.vert", shaderc::ShaderKind::Vertex),
    ("overlay.frag", shaderc::ShaderKind::Fragment),
];

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").unwrap());
    let src_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap()).join("shaders");

    let comp = shaderc::Compiler::new().unwrap();
    let mut opts = shaderc::CompileOptions::new().unwrap();
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let include_dir = src_dir.clone();
    opts.set_include_callback(move |name, _kind, _from, _depth| {
        let path = include_dir.join(name);
        fs::read_to_string(&path)
            .map(|content| shaderc::ResolvedInclude {
                resolved_name: path.display().to_string(),
                content,
            })
            .map_err(|e| format!("{}: {e}", path.display()))
    });

    for &(name, kind) in SHADERS {
        let path = src_dir.join(name);
        let source = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("reading {}: {e}", path.display()));
        let spv = comp
            .compile_into_spirv(&source, kind, name, "main", Some(&opts))
            .unwrap_or_else(|e| panic!("compiling {name}: {e}"));
        fs::write(out.join(format!("{name}.spv")), spv.as_binary_u8()).unwrap();
        println!("cargo:rerun-if-changed={}", path.display());
    }

    println!(
        "cargo:rerun-if-changed={}",
        src_dir.join("common.glsl").display()
    );
    println!("cargo:rerun-if-changed=build.rs");
}
