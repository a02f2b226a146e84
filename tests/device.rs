mod common;

use phalanx::*;

use common::*;

#[test]
fn headless_device_avoids_the_gl_backend() {
    let Some(gpu) = gpu() else { return };
    assert_ne!(gpu.adapter_info.backend, wgpu::Backend::Gl);
}

#[test]
fn rejected_shader_is_returned_as_an_error() {
    let Some(gpu) = gpu() else { return };
    let result = gpu.validation_scope(|| {
        gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Broken Shader"),
            source: wgpu::ShaderSource::Wgsl("fn main() -> { let x = ; }".into()),
        })
    });
    assert!(result.is_err());

    // The device stays usable after a captured error
    let renderer = SceneRenderer::new(&gpu, small_config());
    assert!(renderer.is_ok());
}
