//! Kernel module assembly.
//!
//! A [`KernelModule`] collects the structs, helper functions and kernels of
//! one Rust module and produces a complete WGSL shader per kernel:
//!
//! ```text
//! // kernelforge: scale
//! struct Particle { ... }              // reachable custom structs
//! struct _KfConstant_f32 { ... }       // constant-buffer wrappers
//! struct _KfDispatchData { ... }       // binding 0
//! @group(0) @binding(0) var<uniform> _kf_data: _KfDispatchData;
//! @group(0) @binding(1) var<storage, read_write> values: array<f32>;
//! const _kf_group_size_x: i32 = 64;
//! var<private> _kf_global_id: vec3<u32>;
//! fn helper(...) { ... }               // helpers reachable from the kernel
//! @compute @workgroup_size(64, 1, 1)
//! fn scale(...) { ... }
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;

use kernelforge_core::kernel::KernelDescriptor;
use kernelforge_core::layout::BufferKind;
use kernelforge_core::types::TexelFormat;
use syn::spanned::Spanned;

use crate::bindings::{
    constant_wrapper, constant_wrapper_name, generate_bindings, BindingLayout,
};
use crate::config::KernelConfig;
use crate::dispatch::{DATA, GLOBAL_ID, GROUP_INDEX, GROUP_SIZE_PREFIX, LOCAL_ID, WORKGROUP_ID};
use crate::dispatch_data::DispatchData;
use crate::explorer::{discover_spanned, StructDef, StructTable, TypeGraph};
use crate::registry::known_names;
use crate::transpiler::{EmittedFunction, HelperSignature, WgslTranspiler};
use crate::types::{KernelType, TypeMapper};
use crate::validation::{validate_function, validate_function_with_mode, ValidationMode};
use crate::wgsl_layout::{check_constant_element, check_storage_element, check_struct};
use crate::{Result, TranspileError};

const IN_GLOBAL_ID: &str = "_kf_in_global_id";
const IN_LOCAL_ID: &str = "_kf_in_local_id";
const IN_WORKGROUP_ID: &str = "_kf_in_workgroup_id";

/// The structs, helpers and kernels of one Rust module.
#[derive(Debug, Clone, Default)]
pub struct KernelModule {
    mapper: TypeMapper,
    structs: StructTable,
    helpers: BTreeMap<String, syn::ItemFn>,
    kernels: Vec<(KernelConfig, syn::ItemFn)>,
}

impl KernelModule {
    /// Create an empty module.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add custom structs. Names are registered before fields are resolved,
    /// so the structs may reference each other.
    pub fn add_structs(&mut self, items: &[syn::ItemStruct]) -> Result<()> {
        for item in items {
            self.mapper.register_struct(&item.ident.to_string());
        }
        for item in items {
            self.structs.insert(StructDef::from_item(item, &self.mapper)?)?;
        }
        Ok(())
    }

    /// Add one custom struct.
    pub fn add_struct(&mut self, item: &syn::ItemStruct) -> Result<()> {
        self.add_structs(std::slice::from_ref(item))
    }

    /// Add a helper function kernels may call.
    pub fn add_helper(&mut self, func: syn::ItemFn) -> Result<()> {
        validate_function_with_mode(&func, ValidationMode::Helper)?;
        let name = func.sig.ident.to_string();
        if self.helpers.contains_key(&name) {
            return Err(TranspileError::Type(format!(
                "helper `{name}` is declared twice"
            )));
        }
        self.helpers.insert(name, func);
        Ok(())
    }

    /// Add a kernel entry function.
    pub fn add_kernel(&mut self, func: syn::ItemFn, config: KernelConfig) -> Result<()> {
        config.validate()?;
        validate_function(&func)?;
        if self.kernels.iter().any(|(c, _)| c.name == config.name) {
            return Err(TranspileError::Type(format!(
                "kernel `{}` is declared twice",
                config.name
            )));
        }
        self.kernels.push((config, func));
        Ok(())
    }

    /// Kernel names in declaration order.
    pub fn kernel_names(&self) -> impl Iterator<Item = &str> {
        self.kernels.iter().map(|(c, _)| c.name.as_str())
    }

    /// Transpile every kernel, in declaration order.
    pub fn transpile(&self) -> Result<Vec<KernelDescriptor>> {
        self.kernels
            .iter()
            .map(|(config, _)| self.transpile_kernel(&config.name))
            .collect()
    }

    /// Transpile one kernel into a complete shader.
    pub fn transpile_kernel(&self, name: &str) -> Result<KernelDescriptor> {
        let (config, func) = self
            .kernels
            .iter()
            .find(|(c, _)| c.name == name)
            .ok_or_else(|| TranspileError::Type(format!("no kernel named `{name}`")))?;

        let signatures = self
            .helpers
            .iter()
            .map(|(name, func)| Ok((name.clone(), HelperSignature::from_fn(func, &self.mapper)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        let entry_name = known_names().wgsl_identifier(config.entry_point());
        if signatures.values().any(|s| s.wgsl_name == entry_name) {
            return Err(TranspileError::Type(format!(
                "entry point `{entry_name}` collides with a helper function"
            )));
        }

        let group = config.bind_group;
        let mut entry = WgslTranspiler::new(&self.mapper, &self.structs, &signatures, true);
        let mut resources = Vec::new();
        let mut wrappers = BTreeMap::new();
        let mut captured = Vec::new();
        let mut prologue = Vec::new();
        let mut roots = Vec::new();
        let mut binding = kernelforge_core::DISPATCH_DATA_BINDING + 1;

        for input in &func.sig.inputs {
            let syn::FnArg::Typed(pat_type) = input else {
                continue;
            };
            let syn::Pat::Ident(pat) = pat_type.pat.as_ref() else {
                continue;
            };
            let param = pat.ident.to_string();

            match self.mapper.map_type(&pat_type.ty)? {
                KernelType::Resource { resource, element } => {
                    let wgsl_name = entry.declare_resource(&param, resource, &element);
                    let layout = match resource.buffer_kind() {
                        Some(BufferKind::Constant) => {
                            let stride = check_constant_element(&element, &self.structs)?;
                            let element_wgsl = self.mapper.wgsl_value(&element)?;
                            wrappers.entry(element.clone()).or_insert_with(|| {
                                constant_wrapper(&element, &element_wgsl, stride)
                            });
                            BindingLayout::buffer(
                                group,
                                binding,
                                &param,
                                &wgsl_name,
                                BufferKind::Constant,
                                &constant_wrapper_name(&element),
                            )
                        }
                        Some(kind) => {
                            check_storage_element(&element, &self.structs)?;
                            BindingLayout::buffer(
                                group,
                                binding,
                                &param,
                                &wgsl_name,
                                kind,
                                &self.mapper.wgsl_value(&element)?,
                            )
                        }
                        None => {
                            let dimension = resource.texture_dimension().ok_or_else(|| {
                                TranspileError::Type(format!("`{param}` is not bindable"))
                            })?;
                            let format = TexelFormat::from_type_name(&element).ok_or_else(|| {
                                TranspileError::Type(format!("`{element}` is not a texel type"))
                            })?;
                            BindingLayout::texture(
                                group,
                                binding,
                                &param,
                                &wgsl_name,
                                dimension,
                                format,
                                resource.is_writable(),
                            )?
                        }
                    };
                    resources.push(layout);
                    binding += 1;
                    roots.push((KernelType::Value(element), pat_type.ty.span()));
                }
                _ => {
                    let ty = self.mapper.map_storable(&pat_type.ty)?;
                    let mutable = pat.mutability.is_some();
                    let member = known_names().wgsl_identifier(&param);
                    let local = entry.declare_value(&param, &ty.host_name(), mutable);
                    let keyword = if mutable || matches!(ty, KernelType::Array { .. }) {
                        "var"
                    } else {
                        "let"
                    };
                    prologue.push(format!(
                        "{keyword} {local}: {} = {DATA}.{member};",
                        self.mapper.wgsl_type(&ty)?
                    ));
                    roots.push((ty.clone(), pat_type.ty.span()));
                    captured.push((param, member, ty));
                }
            }
        }

        for line in &prologue {
            entry.emit_line(line);
        }
        entry.transpile_body(&func.block)?;
        let body = entry.finish();

        let helpers = self.emit_helpers(&body, &signatures)?;
        check_recursion(&helpers)?;

        let body_span = func.sig.ident.span();
        roots.extend(body.types_used.iter().map(|ty| (ty.clone(), body_span)));
        for helper in helpers.values() {
            roots.extend(helper.types_used.iter().map(|ty| (ty.clone(), body_span)));
        }
        let mut structs = Vec::new();
        for name in discover_spanned(roots.iter().map(|(ty, span)| (ty, *span)), &self.structs)? {
            if let Some(def) = self.structs.struct_def(&name) {
                check_struct(def, &self.structs)?;
                structs.push(self.struct_declaration(def)?);
            }
        }

        let data = DispatchData::build(&captured, &self.mapper, &self.structs)?;

        let mut bindings = vec![BindingLayout::dispatch_data(group)];
        bindings.append(&mut resources);
        if !body.sampled.is_empty() {
            let filtering = body.sampled.iter().all(TexelFormat::is_filterable);
            bindings.push(BindingLayout::sampler(group, binding, filtering));
        }

        let uses_barrier = body.uses_barrier || helpers.values().any(|h| h.uses_barrier);
        let wgsl = self.assemble(
            config,
            &entry_name,
            &structs,
            &wrappers,
            &data,
            &bindings,
            &helpers,
            &body.code,
            uses_barrier,
        );

        let (x, y, z) = config.workgroup_size;
        let descriptor = KernelDescriptor {
            name: Cow::Owned(config.name.clone()),
            entry_point: Cow::Owned(entry_name),
            wgsl: Cow::Owned(wgsl),
            workgroup_size: [x, y, z],
            bind_group: group,
            bindings: Cow::Owned(bindings.iter().map(BindingLayout::descriptor).collect()),
            dispatch_data: data.layout(),
        };
        tracing::debug!(
            kernel = %config.name,
            bindings = descriptor.bindings.len(),
            helpers = helpers.len(),
            structs = structs.len(),
            "transpiled kernel"
        );
        Ok(descriptor)
    }

    /// Transpile every helper reachable from `body`.
    fn emit_helpers(
        &self,
        body: &EmittedFunction,
        signatures: &BTreeMap<String, HelperSignature>,
    ) -> Result<BTreeMap<String, EmittedFunction>> {
        let mut emitted = BTreeMap::new();
        let mut pending: Vec<String> = body.calls.iter().cloned().collect();
        while let Some(name) = pending.pop() {
            if emitted.contains_key(&name) {
                continue;
            }
            let (Some(func), Some(sig)) = (self.helpers.get(&name), signatures.get(&name)) else {
                continue;
            };
            let out = WgslTranspiler::new(&self.mapper, &self.structs, signatures, false)
                .transpile_helper(func, sig)?;
            pending.extend(out.calls.iter().cloned());
            emitted.insert(name, out);
        }
        Ok(emitted)
    }

    fn struct_declaration(&self, def: &StructDef) -> Result<String> {
        let names = known_names();
        let mut out = format!("struct {} {{\n", names.wgsl_identifier(&def.name));
        for field in &def.fields {
            out.push_str(&format!(
                "    {}: {},\n",
                names.wgsl_identifier(&field.name),
                self.mapper.wgsl_type(&field.ty)?
            ));
        }
        out.push('}');
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        config: &KernelConfig,
        entry_name: &str,
        structs: &[String],
        wrappers: &BTreeMap<String, String>,
        data: &DispatchData,
        bindings: &[BindingLayout],
        helpers: &BTreeMap<String, EmittedFunction>,
        body: &str,
        uses_barrier: bool,
    ) -> String {
        let mut sections: Vec<String> = vec![format!("// kernelforge: {}", config.name)];
        sections.extend(structs.iter().cloned());
        sections.extend(wrappers.values().cloned());
        sections.push(data.to_wgsl());
        sections.push(generate_bindings(bindings));

        let (x, y, z) = config.workgroup_size;
        sections.push(
            [("x", x), ("y", y), ("z", z)]
                .iter()
                .map(|(axis, n)| format!("const {GROUP_SIZE_PREFIX}{axis}: i32 = {n};"))
                .collect::<Vec<_>>()
                .join("\n"),
        );
        sections.push(
            [GLOBAL_ID, LOCAL_ID, WORKGROUP_ID]
                .iter()
                .map(|id| format!("var<private> {id}: vec3<u32>;"))
                .collect::<Vec<_>>()
                .join("\n"),
        );
        sections.extend(helpers.values().map(|h| h.code.clone()));

        let mut main = format!("{}\n", config.workgroup_size_annotation());
        main.push_str(&format!(
            "fn {entry_name}(\n    @builtin(global_invocation_id) {IN_GLOBAL_ID}: vec3<u32>,\n    \
             @builtin(local_invocation_id) {IN_LOCAL_ID}: vec3<u32>,\n    \
             @builtin(workgroup_id) {IN_WORKGROUP_ID}: vec3<u32>,\n    \
             @builtin(local_invocation_index) {GROUP_INDEX}: u32,\n) {{\n"
        ));
        main.push_str(&format!("    {GLOBAL_ID} = {IN_GLOBAL_ID};\n"));
        main.push_str(&format!("    {LOCAL_ID} = {IN_LOCAL_ID};\n"));
        main.push_str(&format!("    {WORKGROUP_ID} = {IN_WORKGROUP_ID};\n"));
        // barriers must be reached by every invocation of the workgroup
        if !uses_barrier {
            let guard = ["x", "y", "z"]
                .iter()
                .map(|a| format!("{GLOBAL_ID}.{a} >= u32({DATA}.dispatch_{a})"))
                .collect::<Vec<_>>()
                .join(" || ");
            main.push_str(&format!("    if ({guard}) {{\n        return;\n    }}\n"));
        }
        main.push_str(body);
        main.push('}');
        sections.push(main);

        let mut wgsl = sections.join("\n\n");
        wgsl.push('\n');
        wgsl
    }
}

/// Reject helper call cycles.
fn check_recursion(helpers: &BTreeMap<String, EmittedFunction>) -> Result<()> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        name: &str,
        helpers: &BTreeMap<String, EmittedFunction>,
        marks: &mut BTreeMap<String, Mark>,
    ) -> Result<()> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(TranspileError::WgslLimitation(format!(
                    "helper `{name}` is recursive; WGSL does not allow recursion"
                )))
            }
            None => {}
        }
        marks.insert(name.to_string(), Mark::Visiting);
        if let Some(helper) = helpers.get(name) {
            for callee in &helper.calls {
                visit(callee, helpers, marks)?;
            }
        }
        marks.insert(name.to_string(), Mark::Done);
        Ok(())
    }

    let mut marks = BTreeMap::new();
    for name in helpers.keys() {
        visit(name, helpers, &mut marks)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernelforge_core::kernel::BindingKind;
    use syn::parse_quote;

    fn scale() -> syn::ItemFn {
        parse_quote! {
            fn scale(values: ReadWriteBuffer<f32>, factor: f32) {
                let i = ThreadIds::x();
                values[i] = values[i] * factor;
            }
        }
    }

    #[test]
    fn test_single_kernel_shader() {
        let kernel = crate::transpile_kernel(&scale(), &KernelConfig::new("scale")).unwrap();
        let wgsl = &kernel.wgsl;
        assert!(wgsl.starts_with("// kernelforge: scale"));
        assert!(wgsl.contains("@group(0) @binding(0) var<uniform> _kf_data: _KfDispatchData;"));
        assert!(wgsl.contains("@group(0) @binding(1) var<storage, read_write> values: array<f32>;"));
        assert!(wgsl.contains("const _kf_group_size_x: i32 = 64;"));
        assert!(wgsl.contains("@compute @workgroup_size(64, 1, 1)\nfn scale("));
        assert!(wgsl.contains("    let factor: f32 = _kf_data.factor;"), "{wgsl}");
        assert!(wgsl.contains("_kf_global_id.x >= u32(_kf_data.dispatch_x)"));
        assert_eq!(kernel.bindings.len(), 2);
        assert_eq!(kernel.dispatch_data.fields[0].offset, 12);
        assert_eq!(kernel.entry_point, "scale");
    }

    #[test]
    fn test_structs_helpers_and_wrappers() {
        let mut module = KernelModule::new();
        module
            .add_struct(&parse_quote! {
                #[repr(C)]
                struct Particle { position: Float4, velocity: Float4 }
            })
            .unwrap();
        module
            .add_helper(parse_quote! {
                fn advance(p: Particle, dt: f32) -> Particle {
                    Particle { position: p.position + p.velocity * dt, velocity: p.velocity }
                }
            })
            .unwrap();
        module
            .add_helper(parse_quote! {
                fn unused(x: f32) -> f32 { x }
            })
            .unwrap();
        module
            .add_kernel(
                parse_quote! {
                    fn advance_all(particles: ReadWriteBuffer<Particle>, gains: ConstantBuffer<f32>, dt: f32) {
                        let i = ThreadIds::x();
                        particles[i] = advance(particles[i], dt * gains[0]);
                    }
                },
                KernelConfig::new("advance_all").with_workgroup_size(128, 1, 1),
            )
            .unwrap();

        let kernel = module.transpile_kernel("advance_all").unwrap();
        let wgsl = &kernel.wgsl;
        assert!(wgsl.contains("struct Particle {\n    position: vec4<f32>,\n    velocity: vec4<f32>,\n}"));
        assert!(wgsl.contains("struct _KfConstant_f32 {\n    @size(16) value: f32,\n}"));
        assert!(wgsl.contains("fn advance(p: Particle, dt: f32) -> Particle {"));
        assert!(wgsl.contains("return Particle(p.position + (p.velocity * dt), p.velocity);"), "{wgsl}");
        assert!(!wgsl.contains("fn unused"));
        assert!(wgsl.contains("particles[i] = advance(particles[i], dt * gains[0].value);"));
        assert_eq!(
            kernel.binding("gains").map(|b| b.kind),
            Some(BindingKind::Buffer(BufferKind::Constant))
        );
    }

    #[test]
    fn test_recursion_rejected() {
        let mut module = KernelModule::new();
        module
            .add_helper(parse_quote! {
                fn ping(n: i32) -> i32 { pong(n - 1) }
            })
            .unwrap();
        module
            .add_helper(parse_quote! {
                fn pong(n: i32) -> i32 { ping(n) }
            })
            .unwrap();
        module
            .add_kernel(
                parse_quote! {
                    fn run(out: ReadWriteBuffer<i32>) {
                        out[0] = ping(3);
                    }
                },
                KernelConfig::new("run"),
            )
            .unwrap();
        let err = module.transpile_kernel("run").unwrap_err();
        assert!(err.to_string().contains("recursive"), "{err}");
    }

    #[test]
    fn test_sampler_binding_is_last() {
        let func: syn::ItemFn = parse_quote! {
            fn blur(image: ReadOnlyTexture2D<Rgba8>, output: ReadWriteTexture2D<Float4>) {
                let x = ThreadIds::x();
                let y = ThreadIds::y();
                let u = ThreadIdsNormalized::x();
                let v = ThreadIdsNormalized::y();
                output[(x, y)] = image.sample(u, v);
            }
        };
        let kernel =
            crate::transpile_kernel(&func, &KernelConfig::new("blur").with_workgroup_size(8, 8, 1))
                .unwrap();
        let last = kernel.bindings.last().unwrap();
        assert_eq!(last.binding, 3);
        assert_eq!(last.kind, BindingKind::Sampler { filtering: true });
        assert!(kernel
            .wgsl
            .contains("@group(0) @binding(2) var output: texture_storage_2d<rgba32float, read_write>;"));
        assert!(kernel.wgsl.contains("@group(0) @binding(3) var _kf_sampler: sampler;"));
    }

    #[test]
    fn test_barrier_disables_guard() {
        let func: syn::ItemFn = parse_quote! {
            fn sync(values: ReadWriteBuffer<f32>) {
                workgroup_barrier();
            }
        };
        let kernel = crate::transpile_kernel(&func, &KernelConfig::new("sync")).unwrap();
        assert!(!kernel.wgsl.contains("dispatch_x)"), "{}", kernel.wgsl);
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut module = KernelModule::new();
        module.add_kernel(scale(), KernelConfig::new("scale")).unwrap();
        assert!(module.add_kernel(scale(), KernelConfig::new("scale")).is_err());
        assert!(module.transpile_kernel("missing").is_err());
        assert_eq!(module.kernel_names().collect::<Vec<_>>(), vec!["scale"]);
    }

    #[test]
    fn test_bool_parameters_rejected() {
        let func: syn::ItemFn = parse_quote! {
            fn flagged(values: ReadWriteBuffer<f32>, enabled: bool) {}
        };
        assert!(crate::transpile_kernel(&func, &KernelConfig::new("flagged")).is_err());
    }

    #[test]
    fn test_invalid_workgroup_rejected() {
        let err = crate::transpile_kernel(
            &scale(),
            &KernelConfig::new("scale").with_workgroup_size(512, 1, 1),
        )
        .unwrap_err();
        assert!(err.to_string().contains("workgroup"));
    }
}
