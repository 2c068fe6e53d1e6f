use std::{env, fs, path::PathBuf};

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").unwrap());

    // binding 0, location 0: R32G32B32_SFLOAT position, nothing else.
    let vs_src = r#"
#version 450
layout(location = 0) in vec3 inPos;

void main() {
    gl_Position = vec4(inPos, 1.0);
}
"#;

    let fs_src = r#"
#version 450
layout(location = 0) out vec4 outColor;

void main() {
    outColor = vec4(1.0, 0.5, 0.1, 1.0);
}
"#;

    let comp = shaderc::Compiler::new().unwrap();
    let mut opts = shaderc::CompileOptions::new().unwrap();
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let vs_spv = comp
        .compile_into_spirv(
            vs_src,
            shaderc::ShaderKind::Vertex,
            "quad.vert",
            "main",
            Some(&opts),
        )
        .unwrap();

    let fs_spv = comp
        .compile_into_spirv(
            fs_src,
            shaderc::ShaderKind::Fragment,
            "quad.frag",
            "main",
            Some(&opts),
        )
        .unwrap();

    fs::write(out.join("quad.vert.spv"), vs_spv.as_binary_u8()).unwrap();
    fs::write(out.join("quad.frag.spv"), fs_spv.as_binary_u8()).unwrap();

    println!("cargo:rerun-if-changed=build.rs");
}
