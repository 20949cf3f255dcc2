//! Procedural macros for KernelForge.
//!
//! This crate provides the following macros:
//!
//! - `#[derive(GpuType)]` - Give a `#[repr(C)]` struct a GPU layout so it can
//!   live in buffers and be passed to kernels by value
//! - `#[kernel_module]` - Transpile the kernels of a module to WGSL at build
//!   time
//!
//! # Example
//!
//! ```ignore
//! use kernelforge::prelude::*;
//!
//! #[kernel_module]
//! mod physics {
//!     use kernelforge::prelude::*;
//!
//!     #[derive(Clone, Copy, GpuType)]
//!     #[repr(C)]
//!     pub struct Body {
//!         pub position: Float4,
//!         pub velocity: Float4,
//!     }
//!
//!     fn damp(v: Float4, factor: f32) -> Float4 {
//!         v * factor
//!     }
//!
//!     #[kernel(workgroup_size(128, 1, 1))]
//!     fn integrate(bodies: ReadWriteBuffer<Body>, dt: f32) {
//!         let i = ThreadIds::x();
//!         let mut body = bodies[i];
//!         body.position += body.velocity * dt;
//!         body.velocity = damp(body.velocity, 0.99);
//!         bodies[i] = body;
//!     }
//! }
//!
//! // `physics::INTEGRATE` is a `KernelDescriptor` holding the WGSL source.
//! let shader = ComputeShader::new(&device, &physics::INTEGRATE).await?;
//! ```
//!
//! Transpilation errors are reported as compile errors at the offending
//! source location.

use darling::ast::NestedMeta;
use darling::FromMeta;
use kernelforge_codegen::{KernelConfig, KernelModule, TranspileError};
use kernelforge_core::kernel::{BindingKind, KernelDescriptor};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::spanned::Spanned;
use syn::{parse_macro_input, DeriveInput, ItemMod};

// ============================================================================
// GpuType derive
// ============================================================================

/// Derive macro for host structs shared with kernels.
///
/// The struct must be `#[repr(C)]`, have named fields whose types are
/// themselves `GpuType`, contain no padding between fields, and be `Copy`.
/// The derive implements `bytemuck::Pod`/`Zeroable` and `GpuType` with a
/// layout whose pack is the largest pack among the fields.
#[proc_macro_derive(GpuType)]
pub fn derive_gpu_type(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match gpu_type_impl(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(e) => TokenStream::from(e.to_compile_error()),
    }
}

fn gpu_type_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "GpuType cannot be derived for generic structs",
        ));
    }
    if !has_repr_c(&input.attrs) {
        return Err(syn::Error::new_spanned(
            name,
            "GpuType requires #[repr(C)] so the host layout is well defined",
        ));
    }

    let fields = match &input.data {
        syn::Data::Struct(syn::DataStruct {
            fields: syn::Fields::Named(fields),
            ..
        }) if !fields.named.is_empty() => &fields.named,
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "GpuType requires a struct with named fields",
            ))
        }
    };

    let p = private_path();
    let field_tys: Vec<_> = fields.iter().map(|f| &f.ty).collect();
    let name_str = name.to_string();
    let padding_msg = format!(
        "`{}` has padding between its fields; reorder or add explicit padding members",
        name_str
    );

    Ok(quote! {
        // Pod is only sound without implicit padding.
        const _: () = ::core::assert!(
            ::core::mem::size_of::<#name>() == 0 #(+ ::core::mem::size_of::<#field_tys>())*,
            #padding_msg
        );

        unsafe impl #p::bytemuck::Zeroable for #name {}
        unsafe impl #p::bytemuck::Pod for #name {}

        impl #p::GpuType for #name {
            const NAME: &'static str = #name_str;
            const LAYOUT: #p::TypeLayout = #p::TypeLayout::new(
                ::core::mem::size_of::<#name>(),
                #p::TypeLayout::max_pack(&[#(<#field_tys as #p::GpuType>::LAYOUT),*]),
            );
        }
    })
}

fn has_repr_c(attrs: &[syn::Attribute]) -> bool {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident("repr"))
        .any(|attr| {
            let mut found = false;
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("C") {
                    found = true;
                }
                Ok(())
            });
            found
        })
}

fn private_path() -> TokenStream2 {
    quote!(::kernelforge::__private)
}

// ============================================================================
// kernel_module
// ============================================================================

/// Arguments of `#[kernel(...)]`.
#[derive(Debug, Default, FromMeta)]
struct KernelAttr {
    /// `workgroup_size(x, y, z)`; missing trailing axes default to 1.
    #[darling(default)]
    workgroup_size: Option<WorkgroupSize>,
    /// Bind group holding the kernel's bindings.
    #[darling(default)]
    bind_group: Option<u32>,
    /// WGSL entry point name.
    #[darling(default)]
    entry_point: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct WorkgroupSize([u32; 3]);

impl FromMeta for WorkgroupSize {
    fn from_list(items: &[NestedMeta]) -> darling::Result<Self> {
        if items.is_empty() || items.len() > 3 {
            return Err(darling::Error::custom(
                "workgroup_size takes one to three integers",
            ));
        }
        let mut dims = [1u32; 3];
        for (dim, item) in dims.iter_mut().zip(items) {
            match item {
                NestedMeta::Lit(syn::Lit::Int(value)) => {
                    *dim = value.base10_parse().map_err(darling::Error::from)?;
                }
                other => {
                    return Err(darling::Error::custom("expected an integer").with_span(other))
                }
            }
        }
        Ok(Self(dims))
    }
}

impl KernelAttr {
    fn parse(attr: &syn::Attribute) -> darling::Result<Self> {
        match &attr.meta {
            syn::Meta::Path(_) => Ok(Self::default()),
            syn::Meta::List(list) => {
                let items = NestedMeta::parse_meta_list(list.tokens.clone())?;
                Self::from_list(&items)
            }
            syn::Meta::NameValue(_) => {
                Err(darling::Error::unsupported_format("name-value").with_span(attr))
            }
        }
    }

    fn config(&self, name: &str) -> KernelConfig {
        let mut config = KernelConfig::new(name);
        if let Some(WorkgroupSize([x, y, z])) = self.workgroup_size {
            config = config.with_workgroup_size(x, y, z);
        }
        if let Some(group) = self.bind_group {
            config = config.with_bind_group(group);
        }
        if let Some(entry_point) = &self.entry_point {
            config = config.with_entry_point(entry_point.clone());
        }
        config
    }
}

/// Attribute macro that transpiles the kernels of a module at build time.
///
/// Inside the module:
///
/// - Structs are emitted unchanged for host use and become WGSL structs when a
///   kernel reaches them.
/// - Functions tagged `#[kernel]` or `#[kernel(workgroup_size(x, y, z),
///   bind_group = n, entry_point = "name")]` become
///   `pub const NAME: KernelDescriptor` items (the function name in upper
///   case).
/// - Untagged functions are helpers, emitted into every shader that calls
///   them.
/// - Other items (`use`, `const`, ...) are kept as written.
///
/// Function bodies are not compiled for the host.
#[proc_macro_attribute]
pub fn kernel_module(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return TokenStream::from(
            syn::Error::new(
                proc_macro2::Span::call_site(),
                "kernel_module takes no arguments",
            )
            .to_compile_error(),
        );
    }
    let input = parse_macro_input!(item as ItemMod);
    match kernel_module_impl(input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(e) => TokenStream::from(e.to_compile_error()),
    }
}

fn kernel_module_impl(input: ItemMod) -> syn::Result<TokenStream2> {
    let Some((_, items)) = &input.content else {
        return Err(syn::Error::new_spanned(
            &input,
            "kernel_module requires an inline module body",
        ));
    };

    let mut kept = Vec::new();
    let mut structs = Vec::new();
    let mut helpers = Vec::new();
    let mut kernels = Vec::new();

    for item in items {
        match item {
            syn::Item::Fn(func) => {
                let mut func = func.clone();
                let position = func.attrs.iter().position(|a| a.path().is_ident("kernel"));
                match position {
                    Some(index) => {
                        let attr = func.attrs.remove(index);
                        let args = KernelAttr::parse(&attr)
                            .map_err(|e| syn::Error::new(attr.span(), e.to_string()))?;
                        kernels.push((args, func));
                    }
                    None => helpers.push(func),
                }
            }
            syn::Item::Struct(item_struct) => {
                structs.push(item_struct.clone());
                kept.push(item.clone());
            }
            other => kept.push(other.clone()),
        }
    }

    let mut module = KernelModule::new();
    module
        .add_structs(&structs)
        .map_err(|e| spanned_error(&e, &input.ident))?;
    for func in helpers {
        let ident = func.sig.ident.clone();
        module
            .add_helper(func)
            .map_err(|e| spanned_error(&e, &ident))?;
    }

    let mut names = Vec::new();
    for (args, func) in kernels {
        let ident = func.sig.ident.clone();
        let name = ident.to_string();
        module
            .add_kernel(func, args.config(&name))
            .map_err(|e| spanned_error(&e, &ident))?;
        names.push(ident);
    }

    let mut errors: Option<syn::Error> = None;
    let mut descriptors = Vec::new();
    for ident in &names {
        match module.transpile_kernel(&ident.to_string()) {
            Ok(descriptor) => descriptors.push(descriptor_const(&descriptor, ident)),
            Err(e) => {
                let err = spanned_error(&e, ident);
                match &mut errors {
                    Some(errors) => errors.combine(err),
                    None => errors = Some(err),
                }
            }
        }
    }
    if let Some(errors) = errors {
        return Err(errors);
    }

    let attrs = &input.attrs;
    let vis = &input.vis;
    let mod_name = &input.ident;
    Ok(quote! {
        #(#attrs)*
        #vis mod #mod_name {
            #(#kept)*
            #(#descriptors)*
        }
    })
}

/// Attach errors without a source location to `fallback`.
fn spanned_error(err: &TranspileError, fallback: &syn::Ident) -> syn::Error {
    match err.span() {
        Some(_) => err.to_syn_error(),
        None => syn::Error::new_spanned(fallback, err.to_string()),
    }
}

fn descriptor_const(descriptor: &KernelDescriptor, ident: &syn::Ident) -> TokenStream2 {
    let p = private_path();
    let const_name = format_ident!("{}", ident.to_string().to_uppercase());
    let doc = format!("Compiled descriptor of the `{}` kernel.", ident);

    let name = descriptor.name.as_ref();
    let entry_point = descriptor.entry_point.as_ref();
    let wgsl = descriptor.wgsl.as_ref();
    let [x, y, z] = descriptor.workgroup_size;
    let bind_group = descriptor.bind_group;

    let bindings = descriptor.bindings.iter().map(|binding| {
        let index = binding.binding;
        let name = binding.name.as_ref();
        let kind = binding_kind_tokens(&binding.kind);
        quote! {
            #p::BindingDescriptor {
                binding: #index,
                name: ::std::borrow::Cow::Borrowed(#name),
                kind: #kind,
            }
        }
    });

    let size = descriptor.dispatch_data.size;
    let fields = descriptor.dispatch_data.fields.iter().map(|field| {
        let name = field.name.as_ref();
        let ty = field.ty.as_ref();
        let offset = field.offset;
        let field_size = field.size;
        quote! {
            #p::DataField {
                name: ::std::borrow::Cow::Borrowed(#name),
                ty: ::std::borrow::Cow::Borrowed(#ty),
                offset: #offset,
                size: #field_size,
            }
        }
    });

    quote! {
        #[doc = #doc]
        pub const #const_name: #p::KernelDescriptor = #p::KernelDescriptor {
            name: ::std::borrow::Cow::Borrowed(#name),
            entry_point: ::std::borrow::Cow::Borrowed(#entry_point),
            wgsl: ::std::borrow::Cow::Borrowed(#wgsl),
            workgroup_size: [#x, #y, #z],
            bind_group: #bind_group,
            bindings: ::std::borrow::Cow::Borrowed(&[#(#bindings),*]),
            dispatch_data: #p::DispatchDataLayout {
                size: #size,
                fields: ::std::borrow::Cow::Borrowed(&[#(#fields),*]),
            },
        };
    }
}

fn binding_kind_tokens(kind: &BindingKind) -> TokenStream2 {
    let p = private_path();
    match kind {
        BindingKind::DispatchData => quote!(#p::BindingKind::DispatchData),
        BindingKind::Buffer(buffer_kind) => {
            let variant = format_ident!("{}", format!("{:?}", buffer_kind));
            quote!(#p::BindingKind::Buffer(#p::BufferKind::#variant))
        }
        BindingKind::Texture {
            dimension,
            format,
            read_write,
        } => {
            let dimension = format_ident!("{}", format!("{:?}", dimension));
            let format = format_ident!("{}", format!("{:?}", format));
            quote! {
                #p::BindingKind::Texture {
                    dimension: #p::TextureDimension::#dimension,
                    format: #p::TexelFormat::#format,
                    read_write: #read_write,
                }
            }
        }
        BindingKind::Sampler { filtering } => {
            quote!(#p::BindingKind::Sampler { filtering: #filtering })
        }
    }
}
