//! Integration tests for whole-kernel transpilation.
//!
//! These tests run complete kernels through the public API and check the
//! assembled shader and the descriptor the runtime binds against:
//! - binding numbering (dispatch data, resources, sampler)
//! - dispatch-data member offsets
//! - custom struct declarations reached through resources and helpers
//! - diagnostics for names the registry does not know

use kernelforge_codegen::{transpile_kernel, Category, KernelConfig, KernelModule, TranspileError};
use kernelforge_core::kernel::BindingKind;
use kernelforge_core::layout::BufferKind;
use syn::parse_quote;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A 2D convolution touches every kind of binding.
#[test]
fn test_convolution_kernel() {
    init_tracing();
    let func: syn::ItemFn = parse_quote! {
        fn convolve(
            source: ReadOnlyTexture2D<f32>,
            dest: ReadWriteTexture2D<f32>,
            taps: ConstantBuffer<f32>,
            radius: i32,
        ) {
            let xy = ThreadIds::xy();
            let mut acc = 0.0;
            for dx in -radius..=radius {
                let tap = taps[dx + radius];
                let x = clamp(xy.x + dx, 0, source.width() - 1);
                acc += source[(x, xy.y)] * tap;
            }
            dest[xy] = acc;
        }
    };
    let config = KernelConfig::new("convolve").with_workgroup_size(16, 16, 1);
    let kernel = transpile_kernel(&func, &config).expect("convolution should transpile");

    println!("Generated WGSL:\n{}", kernel.wgsl);

    assert!(kernel.wgsl.contains("@compute @workgroup_size(16, 16, 1)"));
    assert!(
        kernel
            .wgsl
            .contains("@group(0) @binding(1) var source: texture_2d<f32>;"),
        "read-only textures bind as sampled textures"
    );
    assert!(kernel
        .wgsl
        .contains("@group(0) @binding(2) var dest: texture_storage_2d<r32float, read_write>;"));
    assert!(kernel
        .wgsl
        .contains("@group(0) @binding(3) var<storage, read> taps: array<_KfConstant_f32>;"));
    assert!(kernel
        .wgsl
        .contains("for (var dx: i32 = -(radius); dx <= radius; dx = dx + 1) {"));
    assert!(kernel.wgsl.contains("let tap: f32 = taps[dx + radius].value;"));
    assert!(kernel
        .wgsl
        .contains("textureLoad(source, vec2<i32>(x, xy.y), 0).x * tap"));
    assert!(kernel
        .wgsl
        .contains("textureStore(dest, xy, vec4<f32>(acc, 0.0, 0.0, 0.0));"));

    assert_eq!(kernel.bindings.len(), 4);
    assert_eq!(
        kernel.binding("taps").map(|b| b.kind),
        Some(BindingKind::Buffer(BufferKind::Constant))
    );
    let radius = kernel.data_field("radius").expect("radius is captured");
    assert_eq!(radius.offset, 12);
    assert_eq!(kernel.dispatch_data.size, 16);
}

/// Structs reached only through a helper's signature are still declared.
#[test]
fn test_module_with_nested_structs() {
    let mut module = KernelModule::new();
    module
        .add_structs(&[
            parse_quote! {
                #[repr(C)]
                struct Body { position: Float4, velocity: Float4 }
            },
            parse_quote! {
                #[repr(C)]
                struct Bounds { min: Float4, max: Float4 }
            },
        ])
        .expect("structs are well formed");
    module
        .add_helper(parse_quote! {
            fn inside(bounds: Bounds, p: Float4) -> bool {
                p.x >= bounds.min.x && p.x <= bounds.max.x
            }
        })
        .unwrap();
    module
        .add_kernel(
            parse_quote! {
                fn integrate(bodies: ReadWriteBuffer<Body>, bounds: Bounds, dt: f32) {
                    let i = ThreadIds::x();
                    let mut body = bodies[i];
                    body.position += body.velocity * dt;
                    if !inside(bounds, body.position) {
                        body.velocity = -body.velocity;
                    }
                    bodies[i] = body;
                }
            },
            KernelConfig::new("integrate"),
        )
        .unwrap();

    let kernel = module.transpile_kernel("integrate").unwrap();
    println!("Generated WGSL:\n{}", kernel.wgsl);

    assert!(kernel.wgsl.contains("struct Body {"));
    assert!(kernel.wgsl.contains("struct Bounds {"));
    assert!(kernel
        .wgsl
        .contains("@align(16) @size(32) bounds: Bounds,"));
    assert!(kernel.wgsl.contains("fn inside(bounds: Bounds, p: vec4<f32>) -> bool {"));
    assert!(kernel.wgsl.contains("body.position += body.velocity * dt;"));
    assert!(kernel.wgsl.contains("if (!(inside(bounds, body.position))) {"));
    assert!(kernel.wgsl.contains("body.velocity = -(body.velocity);"));

    let bounds = kernel.data_field("bounds").unwrap();
    assert_eq!(bounds.offset, 16);
    assert_eq!(bounds.size, 32);
    let dt = kernel.data_field("dt").unwrap();
    assert_eq!(dt.offset, 48);
}

/// Unknown names carry their category and a span for the macro to report.
#[test]
fn test_unknown_names_are_diagnosed() {
    let func: syn::ItemFn = parse_quote! {
        fn broken(values: ReadWriteBuffer<f32>) {
            values[0] = fancy_noise(1.0);
        }
    };
    let err = transpile_kernel(&func, &KernelConfig::new("broken")).unwrap_err();
    match &err {
        TranspileError::UnknownIdentifier { category, name, .. } => {
            assert_eq!(*category, Category::Method);
            assert_eq!(name, "fancy_noise");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_syn_error().to_string().contains("fancy_noise"));
}

/// Three-component vectors do not share a layout in storage buffers.
#[test]
fn test_float3_storage_rejected() {
    let func: syn::ItemFn = parse_quote! {
        fn normals(out: ReadWriteBuffer<Float3>) {
            out[0] = Float3::splat(0.0);
        }
    };
    let err = transpile_kernel(&func, &KernelConfig::new("normals")).unwrap_err();
    assert!(err.to_string().contains("4-component"), "{err}");
}

/// Kernels cannot return values.
#[test]
fn test_kernel_return_rejected() {
    let func: syn::ItemFn = parse_quote! {
        fn answer(out: ReadWriteBuffer<i32>) -> i32 { 42 }
    };
    assert!(matches!(
        transpile_kernel(&func, &KernelConfig::new("answer")),
        Err(TranspileError::Validation(_))
    ));
}

/// Every kernel of a module transpiles independently.
#[test]
fn test_transpile_all_kernels() {
    let mut module = KernelModule::new();
    for name in ["first", "second"] {
        let ident = syn::Ident::new(name, proc_macro2::Span::call_site());
        module
            .add_kernel(
                parse_quote! {
                    fn #ident(values: ReadWriteBuffer<u32>) {
                        let i = ThreadIds::x();
                        values[i] = values[i] + 1u32;
                    }
                },
                KernelConfig::new(name),
            )
            .unwrap();
    }
    let kernels = module.transpile().unwrap();
    assert_eq!(kernels.len(), 2);
    assert_eq!(kernels[1].entry_point, "second");
    assert!(kernels[0].wgsl.contains("values[i] = values[i] + 1u;"));
}

/// Every axis of the dispatch context resolves, not only `x`.
#[test]
fn test_all_dispatch_axes_resolve() {
    let func: syn::ItemFn = parse_quote! {
        fn axes(values: ReadWriteBuffer<i32>) {
            let i = ThreadIds::x();
            let y = ThreadIds::y();
            let z = ThreadIds::z();
            values[i] = y * DispatchSize::z() + z + GroupIds::y();
        }
    };
    let kernel = transpile_kernel(&func, &KernelConfig::new("axes")).unwrap();
    assert!(kernel.wgsl.contains("i32(_kf_global_id.y)"));
    assert!(kernel.wgsl.contains("i32(_kf_global_id.z)"));
    assert!(kernel.wgsl.contains("_kf_data.dispatch_z"));
    assert!(kernel.wgsl.contains("i32(_kf_local_id.y)"));
}

/// A module struct may not reuse a built-in type name.
#[test]
fn test_struct_shadowing_builtin_is_diagnosed() {
    let mut module = KernelModule::new();
    let err = module
        .add_structs(&[parse_quote! {
            #[repr(C)]
            struct Float2 { u: f32, v: f32 }
        }])
        .unwrap_err();
    assert!(matches!(err, TranspileError::ShadowsBuiltin { .. }));
    assert!(err.span().is_some());
    assert!(err.to_string().contains("Float2"));
}
