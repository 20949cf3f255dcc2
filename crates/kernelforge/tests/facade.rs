//! Tests for the facade re-exports.

use kernelforge::codegen::{transpile_kernel, KernelConfig};
use kernelforge::prelude::*;
use kernelforge::{kernel_module, BindingKind, BufferKind, TypeLayout};
use syn::parse_quote;

#[derive(Debug, Clone, Copy, PartialEq, GpuType)]
#[repr(C)]
struct Vertex {
    position: Float3,
    weight: f32,
    uv: Float2,
}

#[kernel_module]
mod blend {
    use kernelforge::prelude::*;

    #[kernel]
    fn lerp_colors(a: ReadOnlyBuffer<Float4>, b: ReadOnlyBuffer<Float4>, out: ReadWriteBuffer<Float4>, t: f32) {
        let i = ThreadIds::x();
        out[i] = kernelforge::intrinsics::mix(a[i], b[i], Float4::splat(t));
    }

    #[kernel]
    fn clamp_values(values: ReadWriteBuffer<f32>) {
        let i = ThreadIds::x();
        values[i] = saturate(values[i]);
    }
}

#[test]
fn test_derived_type_through_prelude() {
    assert_eq!(Vertex::NAME, "Vertex");
    assert_eq!(Vertex::LAYOUT, TypeLayout::new(24, 4));
}

#[test]
fn test_runtime_transpile_matches_macro() {
    let func: syn::ItemFn = parse_quote! {
        fn clamp_values(values: ReadWriteBuffer<f32>) {
            let i = ThreadIds::x();
            values[i] = saturate(values[i]);
        }
    };
    let runtime = transpile_kernel(&func, &KernelConfig::new("clamp_values")).unwrap();
    assert_eq!(runtime, blend::CLAMP_VALUES);
}

#[test]
fn test_intrinsics_rewritten() {
    assert!(blend::LERP_COLORS.wgsl.contains("mix("));
    assert!(blend::CLAMP_VALUES.wgsl.contains("saturate("));
    assert_eq!(
        blend::LERP_COLORS.binding("a").map(|b| b.kind),
        Some(BindingKind::Buffer(BufferKind::ReadOnly))
    );
}

#[test]
fn test_intrinsic_surface_naming() {
    let inverse_sqrt = kernelforge::intrinsics::SURFACE
        .iter()
        .find(|d| d.name == "inverse_sqrt")
        .expect("inverse_sqrt declared");
    assert_eq!(inverse_sqrt.target_name(), "inverseSqrt");
}

#[test]
fn test_errors_are_shared() {
    let err: Result<()> = Err(ForgeError::MissingArgument("x".into()));
    assert!(err.unwrap_err().to_string().contains('x'));
}
