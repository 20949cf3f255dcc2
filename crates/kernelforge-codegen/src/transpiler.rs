//! Statement and expression emitter.
//!
//! [`WgslTranspiler`] turns one Rust function body into WGSL. It tracks a
//! scope stack of locals with their host types, so every emitted `let` and
//! `var` is explicitly typed and every name is looked up in the registry with
//! the right owner type. The surrounding module (bindings, structs, entry
//! point) is assembled by [`KernelModule`](crate::module::KernelModule).
//!
//! # Lowering
//!
//! | Rust | WGSL |
//! |------|------|
//! | `let x = e;` | `let x: T = e;` |
//! | `let mut x = e;` | `var x: T = e;` |
//! | `values[i]` | `values[i]` |
//! | `weights[i]` (constant buffer) | `weights[i].value` |
//! | `image[(x, y)]` | `textureLoad(image, vec2<i32>(x, y), 0)` |
//! | `image.sample(u, v)` | `textureSampleLevel(image, _kf_sampler, vec2<f32>(u, v), 0.0)` |
//! | `values.length()` | `i32(arrayLength(&values))` |
//! | `ThreadIds::x()` | `i32(_kf_global_id.x)` |
//! | `x as f32` | `f32(x)` |
//! | `if c { a } else { b }` (value) | `select(b, a, c)` |
//! | `match n { .. }` | `switch (n) { .. }` |
//! | `for i in 0..n` | `for (var i: i32 = 0; i < n; i = i + 1)` |

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use proc_macro2::Span;
use quote::ToTokens;
use syn::spanned::Spanned;
use syn::{BinOp, Expr, Lit, Pat, Stmt, UnOp};

use kernelforge_core::kernel::KernelDescriptor;
use kernelforge_core::types::{TexelFormat, TexelSampleKind};

use crate::bindings::SAMPLER;
use crate::config::KernelConfig;
use crate::explorer::{StructTable, TypeGraph};
use crate::intrinsics::{ReturnRule, BARRIERS};
use crate::loops::{range_to_for_loop, LoopPattern, RangeInfo};
use crate::module::KernelModule;
use crate::registry::{known_names, Category, Lowering, MethodMapping};
use crate::resources::ResourceType;
use crate::types::{
    array_element, component_type, is_scalar, matrix_dim, vector_info, vector_name, KernelType,
    TypeMapper,
};
use crate::validation::{validate_function_with_mode, ValidationMode};
use crate::{Result, TranspileError};

/// Transpile a single kernel function with no helpers or custom structs.
pub fn transpile_kernel(func: &syn::ItemFn, config: &KernelConfig) -> Result<KernelDescriptor> {
    let mut module = KernelModule::new();
    module.add_kernel(func.clone(), config.clone())?;
    module.transpile_kernel(&config.name)
}

/// WGSL builtins whose scalar operands must be splatted when the first
/// argument is a vector.
const SPLAT_TARGETS: &[&str] = &["clamp", "max", "min", "pow", "step", "smoothstep"];

const AXES: [&str; 4] = ["x", "y", "z", "w"];

/// Signature of a helper function as seen by its callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperSignature {
    /// WGSL function name.
    pub wgsl_name: String,
    /// Host parameter types.
    pub params: Vec<String>,
    /// Host return type, `()` for none.
    pub returns: String,
}

impl HelperSignature {
    /// Resolve a helper's signature. Helpers take values only.
    pub fn from_fn(func: &syn::ItemFn, mapper: &TypeMapper) -> Result<Self> {
        let name = func.sig.ident.to_string();
        let mut params = Vec::with_capacity(func.sig.inputs.len());
        for input in &func.sig.inputs {
            let syn::FnArg::Typed(pat_type) = input else {
                return Err(TranspileError::Unsupported(format!(
                    "receiver on helper `{name}`"
                )));
            };
            let ty = mapper.map_type(&pat_type.ty)?;
            match ty {
                KernelType::Resource { .. } => {
                    return Err(TranspileError::WgslLimitation(format!(
                        "helper `{name}` takes resource parameter `{}`; only kernels bind resources",
                        pat_type.pat.to_token_stream()
                    )))
                }
                KernelType::Unit => {
                    return Err(TranspileError::Type(format!(
                        "helper `{name}` has a `()` parameter"
                    )))
                }
                ty => params.push(host_type(&ty)),
            }
        }
        let returns = match &func.sig.output {
            syn::ReturnType::Default => "()".to_string(),
            syn::ReturnType::Type(_, ty) => match mapper.map_type(ty)? {
                KernelType::Resource { .. } => {
                    return Err(TranspileError::WgslLimitation(format!(
                        "helper `{name}` cannot return a resource"
                    )))
                }
                ty => host_type(&ty),
            },
        };
        Ok(Self {
            wgsl_name: known_names().wgsl_identifier(&name),
            params,
            returns,
        })
    }
}

/// Output of one transpiled function.
#[derive(Debug, Clone, Default)]
pub struct EmittedFunction {
    /// WGSL text: the full function for helpers, the body for entries.
    pub code: String,
    /// Helper functions called directly, by host name.
    pub calls: BTreeSet<String>,
    /// Whether a workgroup barrier is executed.
    pub uses_barrier: bool,
    /// Formats of sampled textures.
    pub sampled: Vec<TexelFormat>,
    /// Custom struct types named by locals and literals.
    pub types_used: Vec<KernelType>,
}

#[derive(Debug, Clone)]
enum LocalKind {
    Value(String),
    Resource {
        resource: ResourceType,
        element: String,
    },
}

#[derive(Debug, Clone)]
struct Local {
    wgsl: String,
    kind: LocalKind,
    mutable: bool,
}

#[derive(Debug, Clone)]
struct Typed {
    code: String,
    ty: String,
}

impl Typed {
    fn new(code: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ty: ty.into(),
        }
    }
}

enum Target {
    Place(Typed),
    Texel {
        texture: String,
        coord: String,
        format: TexelFormat,
    },
}

/// Rust to WGSL function transpiler.
pub struct WgslTranspiler<'m> {
    mapper: &'m TypeMapper,
    structs: &'m StructTable,
    helpers: &'m BTreeMap<String, HelperSignature>,
    entry: bool,
    scopes: Vec<HashMap<String, Local>>,
    declared: HashSet<String>,
    indent: usize,
    return_ty: String,
    out: EmittedFunction,
}

impl<'m> WgslTranspiler<'m> {
    /// Create a transpiler for an entry kernel (`entry`) or a helper.
    pub fn new(
        mapper: &'m TypeMapper,
        structs: &'m StructTable,
        helpers: &'m BTreeMap<String, HelperSignature>,
        entry: bool,
    ) -> Self {
        let mut declared = HashSet::new();
        for sig in helpers.values() {
            declared.insert(sig.wgsl_name.clone());
        }
        for def in structs.iter() {
            declared.insert(known_names().wgsl_identifier(&def.name));
        }
        Self {
            mapper,
            structs,
            helpers,
            entry,
            scopes: vec![HashMap::new()],
            declared,
            indent: 1,
            return_ty: "()".to_string(),
            out: EmittedFunction::default(),
        }
    }

    /// Declare a by-value local in the function scope. Returns its WGSL name.
    pub fn declare_value(&mut self, name: &str, ty: &str, mutable: bool) -> String {
        self.use_type(ty);
        self.declare_local(name, LocalKind::Value(ty.to_string()), mutable)
    }

    /// Declare a resource parameter. Returns the WGSL name of its binding.
    pub fn declare_resource(&mut self, name: &str, resource: ResourceType, element: &str) -> String {
        self.use_type(element);
        self.declare_local(
            name,
            LocalKind::Resource {
                resource,
                element: element.to_string(),
            },
            false,
        )
    }

    /// Emit one line at the current indentation.
    pub fn emit_line(&mut self, line: &str) {
        self.line(line);
    }

    /// Transpile the statements of a body into the current scope.
    pub fn transpile_body(&mut self, block: &syn::Block) -> Result<()> {
        let tail_return = self.return_ty != "()";
        self.stmts(&block.stmts, tail_return)
    }

    /// Transpile a complete helper function.
    pub fn transpile_helper(
        mut self,
        func: &syn::ItemFn,
        sig: &HelperSignature,
    ) -> Result<EmittedFunction> {
        validate_function_with_mode(func, ValidationMode::Helper)?;
        self.return_ty = sig.returns.clone();
        self.use_type(&sig.returns);

        let mut params = Vec::with_capacity(sig.params.len());
        let mut prologue = Vec::new();
        for (input, ty) in func.sig.inputs.iter().zip(&sig.params) {
            let syn::FnArg::Typed(pat_type) = input else {
                continue;
            };
            let Pat::Ident(pat) = pat_type.pat.as_ref() else {
                continue;
            };
            let name = pat.ident.to_string();
            let wgsl_ty = self.wgsl_of(ty)?;
            if pat.mutability.is_some() {
                // WGSL parameters are immutable; copy into a var
                let param = self.fresh(&format!("{name}_in"));
                let local = self.declare_value(&name, ty, true);
                prologue.push(format!("var {local}: {wgsl_ty} = {param};"));
                params.push(format!("{param}: {wgsl_ty}"));
            } else {
                let local = self.declare_value(&name, ty, false);
                params.push(format!("{local}: {wgsl_ty}"));
            }
        }
        for line in &prologue {
            self.line(line);
        }
        self.transpile_body(&func.block)?;

        let header = if sig.returns == "()" {
            format!("fn {}({}) {{", sig.wgsl_name, params.join(", "))
        } else {
            format!(
                "fn {}({}) -> {} {{",
                sig.wgsl_name,
                params.join(", "),
                self.wgsl_of(&sig.returns)?
            )
        };
        let mut out = self.out;
        out.code = format!("{header}\n{}}}", out.code);
        Ok(out)
    }

    /// Finish an entry body.
    pub fn finish(self) -> EmittedFunction {
        self.out
    }

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    fn indent_str(&self) -> String {
        "    ".repeat(self.indent)
    }

    fn line(&mut self, line: &str) {
        let indent = self.indent_str();
        self.out.code.push_str(&indent);
        self.out.code.push_str(line);
        self.out.code.push('\n');
    }

    fn fresh(&mut self, name: &str) -> String {
        let base = known_names().wgsl_identifier(name);
        let mut candidate = base.clone();
        let mut n = 1;
        while self.declared.contains(&candidate) {
            candidate = format!("{base}_{n}");
            n += 1;
        }
        self.declared.insert(candidate.clone());
        candidate
    }

    fn declare_local(&mut self, name: &str, kind: LocalKind, mutable: bool) -> String {
        let wgsl = self.fresh(name);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(
                name.to_string(),
                Local {
                    wgsl: wgsl.clone(),
                    kind,
                    mutable,
                },
            );
        }
        wgsl
    }

    fn lookup(&self, name: &str) -> Option<Local> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .cloned()
    }

    fn resource_of(&self, expr: &Expr) -> Option<(String, ResourceType, String)> {
        let Expr::Path(path) = strip(expr) else {
            return None;
        };
        let ident = path.path.get_ident()?;
        match self.lookup(&ident.to_string())? {
            Local {
                wgsl,
                kind: LocalKind::Resource { resource, element },
                ..
            } => Some((wgsl, resource, element)),
            _ => None,
        }
    }

    fn use_type(&mut self, host: &str) {
        let mut name = host;
        while let Some(element) = array_element(name) {
            name = element;
        }
        if self.structs.struct_def(name).is_some() {
            self.out.types_used.push(KernelType::Value(name.to_string()));
        }
    }

    fn wgsl_of(&self, host: &str) -> Result<String> {
        if let Some(element) = array_element(host) {
            let len = host[..host.len() - 1]
                .rsplit_once(';')
                .map(|(_, n)| n.trim())
                .unwrap_or_default();
            return Ok(format!("array<{}, {len}>", self.wgsl_of(element)?));
        }
        self.mapper.wgsl_value(host)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn block(&mut self, block: &syn::Block, tail_return: bool) -> Result<()> {
        self.scopes.push(HashMap::new());
        self.indent += 1;
        let result = self.stmts(&block.stmts, tail_return);
        self.indent -= 1;
        self.scopes.pop();
        result
    }

    fn stmts(&mut self, stmts: &[Stmt], tail_return: bool) -> Result<()> {
        let last = stmts.len().saturating_sub(1);
        for (i, stmt) in stmts.iter().enumerate() {
            self.stmt(stmt, tail_return && i == last)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt, tail_return: bool) -> Result<()> {
        match stmt {
            Stmt::Local(local) => self.let_stmt(local),
            Stmt::Expr(expr, None) if tail_return => self.tail_expr(expr),
            Stmt::Expr(expr, _) => self.expr_stmt(expr, false),
            Stmt::Item(_) => Err(TranspileError::Unsupported(
                "items inside kernel bodies".to_string(),
            )),
            Stmt::Macro(mac) => Err(TranspileError::Unsupported(format!(
                "macro `{}!`",
                mac.mac.path.to_token_stream()
            ))),
        }
    }

    fn tail_expr(&mut self, expr: &Expr) -> Result<()> {
        match strip(expr) {
            Expr::If(_)
            | Expr::Match(_)
            | Expr::Block(_)
            | Expr::Return(_)
            | Expr::Loop(_)
            | Expr::While(_)
            | Expr::ForLoop(_)
            | Expr::Assign(_) => self.expr_stmt(expr, true),
            _ => {
                let ret = self.return_ty.clone();
                let value = coerce(self.expr(expr, Some(&ret))?, &ret);
                self.line(&format!("return {};", value.code));
                Ok(())
            }
        }
    }

    fn let_stmt(&mut self, local: &syn::Local) -> Result<()> {
        let (pat, annotated) = match &local.pat {
            Pat::Type(pat_type) => (pat_type.pat.as_ref(), Some(&pat_type.ty)),
            pat => (pat, None),
        };
        let Pat::Ident(ident) = pat else {
            return Err(TranspileError::Unsupported(format!(
                "let pattern: {}",
                pat.to_token_stream()
            )));
        };
        let name = ident.ident.to_string();

        let declared = match annotated {
            Some(ty) => match self.mapper.map_type(ty)? {
                KernelType::Resource { .. } | KernelType::Unit => {
                    return Err(TranspileError::Type(format!(
                        "local `{name}` cannot hold `{}`",
                        ty.to_token_stream()
                    )))
                }
                ty => Some(host_type(&ty)),
            },
            None => None,
        };

        let init = match &local.init {
            Some(init) => {
                let value = self.expr(&init.expr, declared.as_deref())?;
                Some(match &declared {
                    Some(ty) => coerce(value, ty),
                    None => value,
                })
            }
            None => None,
        };

        let ty = declared
            .or_else(|| init.as_ref().map(|v| v.ty.clone()))
            .ok_or_else(|| {
                TranspileError::Type(format!(
                    "`{name}` needs a type annotation or an initializer"
                ))
            })?;
        if ty == "()" {
            return Err(TranspileError::Type(format!("`{name}` is bound to `()`")));
        }

        let wgsl_ty = self.wgsl_of(&ty)?;
        // dynamically indexed arrays must live in a var
        let needs_var = ident.mutability.is_some() || init.is_none() || array_element(&ty).is_some();
        let wgsl = self.declare_value(&name, &ty, ident.mutability.is_some() || init.is_none());
        let keyword = if needs_var { "var" } else { "let" };
        match init {
            Some(value) => self.line(&format!("{keyword} {wgsl}: {wgsl_ty} = {};", value.code)),
            None => self.line(&format!("var {wgsl}: {wgsl_ty};")),
        }
        Ok(())
    }

    fn expr_stmt(&mut self, expr: &Expr, tail_return: bool) -> Result<()> {
        match expr {
            Expr::Assign(assign) => self.assign(&assign.left, &assign.right, None),
            Expr::Binary(bin) if compound_op(&bin.op).is_some() => {
                self.assign(&bin.left, &bin.right, compound_op(&bin.op))
            }
            Expr::If(expr_if) => self.if_stmt(expr_if, "", tail_return),
            Expr::Match(expr_match) => self.match_stmt(expr_match, tail_return),
            Expr::ForLoop(for_loop) => self.for_loop(for_loop),
            Expr::While(expr_while) => {
                let cond = self.condition(&expr_while.cond)?;
                let header = LoopPattern::While { condition: cond }.to_wgsl_header();
                self.line(&format!("{header} {{"));
                self.block(&expr_while.body, false)?;
                self.line("}");
                Ok(())
            }
            Expr::Loop(expr_loop) => {
                self.line(&format!("{} {{", LoopPattern::Loop.to_wgsl_header()));
                self.block(&expr_loop.body, false)?;
                self.line("}");
                Ok(())
            }
            Expr::Block(block) => {
                self.line("{");
                self.block(&block.block, tail_return)?;
                self.line("}");
                Ok(())
            }
            Expr::Return(ret) => self.return_stmt(ret),
            Expr::Break(_) => {
                self.line("break;");
                Ok(())
            }
            Expr::Continue(_) => {
                self.line("continue;");
                Ok(())
            }
            Expr::Call(_) | Expr::MethodCall(_) => {
                let value = self.expr(expr, None)?;
                if value.ty == "()" {
                    self.line(&format!("{};", value.code));
                } else {
                    self.line(&format!("_ = {};", value.code));
                }
                Ok(())
            }
            Expr::Paren(paren) => self.expr_stmt(&paren.expr, tail_return),
            Expr::Group(group) => self.expr_stmt(&group.expr, tail_return),
            _ => Err(TranspileError::Unsupported(format!(
                "expression statement without effect: {}",
                expr.to_token_stream()
            ))),
        }
    }

    fn assign(&mut self, lhs: &Expr, rhs: &Expr, op: Option<&str>) -> Result<()> {
        let target = self.assign_target(lhs)?;
        match target {
            Target::Place(place) => {
                let shift = matches!(op, Some("<<") | Some(">>"));
                let hint = if shift { "u32" } else { place.ty.as_str() };
                let value = self.expr(rhs, Some(hint))?;
                let value = if shift {
                    convert(value, "u32")
                } else {
                    coerce(value, &place.ty)
                };
                self.line(&format!("{} {}= {};", place.code, op.unwrap_or(""), value.code));
            }
            Target::Texel {
                texture,
                coord,
                format,
            } => {
                if op.is_some() {
                    return Err(TranspileError::Unsupported(
                        "compound assignment to a texel; load, modify and store instead"
                            .to_string(),
                    ));
                }
                let value = self.expr(rhs, Some(format.value_type_name()))?;
                self.line(&format!(
                    "textureStore({texture}, {coord}, {});",
                    widen_texel(&value.code, format)
                ));
            }
        }
        Ok(())
    }

    fn assign_target(&mut self, lhs: &Expr) -> Result<Target> {
        let lhs = strip(lhs);
        let root = root_ident(lhs).ok_or_else(|| {
            TranspileError::Unsupported(format!(
                "assignment target: {}",
                lhs.to_token_stream()
            ))
        })?;
        let name = root.to_string();
        let local = self.lookup(&name).ok_or_else(|| TranspileError::UnknownIdentifier {
            category: Category::Member,
            name: name.clone(),
            span: root.span(),
        })?;

        match &local.kind {
            LocalKind::Resource { resource, element } => {
                if !resource.is_writable() {
                    return Err(TranspileError::Type(format!(
                        "cannot write to read-only resource `{name}`"
                    )));
                }
                if resource.is_texture() {
                    let Expr::Index(index) = lhs else {
                        return Err(TranspileError::Unsupported(format!(
                            "partial texel write to `{name}`; store the whole texel"
                        )));
                    };
                    if !matches!(strip(&index.expr), Expr::Path(_)) {
                        return Err(TranspileError::Unsupported(format!(
                            "partial texel write to `{name}`; store the whole texel"
                        )));
                    }
                    let format = texel_format(element)?;
                    let coord = self.coordinate(*resource, &index.index, index.span())?;
                    return Ok(Target::Texel {
                        texture: local.wgsl.clone(),
                        coord,
                        format,
                    });
                }
            }
            LocalKind::Value(_) => {
                if !local.mutable {
                    return Err(TranspileError::Type(format!(
                        "cannot assign to immutable `{name}`; declare it with `let mut`"
                    )));
                }
            }
        }
        Ok(Target::Place(self.expr(lhs, None)?))
    }

    fn condition(&mut self, cond: &Expr) -> Result<String> {
        let value = coerce(self.expr(strip_paren(cond), None)?, "bool");
        if value.ty != "bool" {
            return Err(TranspileError::Type(format!(
                "condition has type `{}`, expected `bool`",
                value.ty
            )));
        }
        Ok(value.code)
    }

    fn if_stmt(&mut self, expr_if: &syn::ExprIf, prefix: &str, tail_return: bool) -> Result<()> {
        let cond = self.condition(&expr_if.cond)?;
        self.line(&format!("{prefix}if ({cond}) {{"));
        self.block(&expr_if.then_branch, tail_return)?;
        match &expr_if.else_branch {
            None => self.line("}"),
            Some((_, else_expr)) => match else_expr.as_ref() {
                Expr::If(nested) => return self.if_stmt(nested, "} else ", tail_return),
                Expr::Block(block) => {
                    self.line("} else {");
                    self.block(&block.block, tail_return)?;
                    self.line("}");
                }
                other => {
                    return Err(TranspileError::Unsupported(format!(
                        "else branch: {}",
                        other.to_token_stream()
                    )))
                }
            },
        }
        Ok(())
    }

    fn match_stmt(&mut self, expr_match: &syn::ExprMatch, tail_return: bool) -> Result<()> {
        let scrutinee = self.expr(&expr_match.expr, None)?;
        if !matches!(scrutinee.ty.as_str(), "i32" | "u32") {
            return Err(TranspileError::WgslLimitation(format!(
                "`match` on `{}`; WGSL switches need an i32 or u32 selector",
                scrutinee.ty
            )));
        }

        self.line(&format!("switch ({}) {{", strip_outer_parens(&scrutinee.code)));
        self.indent += 1;
        let mut has_default = false;
        for arm in &expr_match.arms {
            if arm.guard.is_some() {
                return Err(TranspileError::Unsupported("match guards".to_string()));
            }
            match self.case_selectors(&arm.pat, &scrutinee.ty)? {
                Some(selectors) => self.line(&format!("case {}: {{", selectors.join(", "))),
                None => {
                    has_default = true;
                    self.line("default: {");
                }
            }
            self.scopes.push(HashMap::new());
            self.indent += 1;
            let result = match arm.body.as_ref() {
                Expr::Block(block) => self.stmts(&block.block.stmts, tail_return),
                body if tail_return => self.tail_expr(body),
                body => self.expr_stmt(body, false),
            };
            self.indent -= 1;
            self.scopes.pop();
            result?;
            self.line("}");
        }
        if !has_default {
            self.line("default: {}");
        }
        self.indent -= 1;
        self.line("}");
        Ok(())
    }

    /// Case selectors of a pattern, or `None` for the default arm.
    fn case_selectors(&mut self, pat: &Pat, ty: &str) -> Result<Option<Vec<String>>> {
        match pat {
            Pat::Wild(_) => Ok(None),
            Pat::Lit(lit) => Ok(Some(vec![self.literal(&lit.lit, Some(ty))?.code])),
            Pat::Or(or) => {
                let mut selectors = Vec::new();
                for case in &or.cases {
                    match self.case_selectors(case, ty)? {
                        Some(mut s) => selectors.append(&mut s),
                        None => return Ok(None),
                    }
                }
                Ok(Some(selectors))
            }
            Pat::Paren(paren) => self.case_selectors(&paren.pat, ty),
            other => Err(TranspileError::Unsupported(format!(
                "match pattern: {}",
                other.to_token_stream()
            ))),
        }
    }

    fn for_loop(&mut self, for_loop: &syn::ExprForLoop) -> Result<()> {
        let Pat::Ident(var) = for_loop.pat.as_ref() else {
            return Err(TranspileError::Unsupported(format!(
                "for-loop pattern: {}",
                for_loop.pat.to_token_stream()
            )));
        };
        let Expr::Range(range) = strip_paren(&for_loop.expr) else {
            return Err(TranspileError::Unsupported(
                "`for` over anything but an integer range".to_string(),
            ));
        };

        let start = range.start.as_deref();
        let end = range.end.as_deref();
        let typed_start = start
            .filter(|e| !is_untyped_literal(e))
            .map(|e| self.expr(e, None))
            .transpose()?;
        let typed_end = end
            .filter(|e| !is_untyped_literal(e))
            .map(|e| self.expr(e, None))
            .transpose()?;
        let ty = typed_start
            .as_ref()
            .or(typed_end.as_ref())
            .map(|t| t.ty.clone())
            .unwrap_or_else(|| "i32".to_string());
        if !matches!(ty.as_str(), "i32" | "u32") {
            return Err(TranspileError::Type(format!(
                "range bounds have type `{ty}`, expected i32 or u32"
            )));
        }

        let start = match (typed_start, start) {
            (Some(value), _) => Some(convert(value, &ty).code),
            (None, Some(e)) => Some(self.expr(e, Some(&ty))?.code),
            (None, None) => None,
        };
        let end = match (typed_end, end) {
            (Some(value), _) => Some(convert(value, &ty).code),
            (None, Some(e)) => Some(self.expr(e, Some(&ty))?.code),
            (None, None) => None,
        };
        let info = RangeInfo::new(start, end, matches!(range.limits, syn::RangeLimits::Closed(_)));

        self.scopes.push(HashMap::new());
        let name = self.declare_value(&var.ident.to_string(), &ty, false);
        let pattern = range_to_for_loop(&name, &ty, &info).ok_or_else(|| {
            TranspileError::Unsupported("`for` over an unbounded range".to_string())
        });
        let result = pattern.and_then(|pattern| {
            self.line(&format!("{} {{", pattern.to_wgsl_header()));
            self.block(&for_loop.body, false)?;
            self.line("}");
            Ok(())
        });
        self.scopes.pop();
        result
    }

    fn return_stmt(&mut self, ret: &syn::ExprReturn) -> Result<()> {
        match &ret.expr {
            None => {
                if self.return_ty != "()" {
                    return Err(TranspileError::Type(format!(
                        "`return` without a value in a function returning `{}`",
                        self.return_ty
                    )));
                }
                self.line("return;");
            }
            Some(expr) => {
                if self.return_ty == "()" {
                    return Err(TranspileError::Type(
                        "`return` with a value in a function returning `()`".to_string(),
                    ));
                }
                let ret = self.return_ty.clone();
                let value = coerce(self.expr(expr, Some(&ret))?, &ret);
                self.line(&format!("return {};", value.code));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expr(&mut self, expr: &Expr, expected: Option<&str>) -> Result<Typed> {
        match expr {
            Expr::Lit(lit) => self.literal(&lit.lit, expected),
            Expr::Path(path) => self.path_expr(path),
            Expr::Binary(bin) => self.binary(bin, expected),
            Expr::Unary(unary) => self.unary(unary, expected),
            Expr::Paren(paren) => {
                let inner = self.expr(&paren.expr, expected)?;
                Ok(Typed::new(format!("({})", inner.code), inner.ty))
            }
            Expr::Group(group) => self.expr(&group.expr, expected),
            Expr::Index(index) => self.index(index),
            Expr::Field(field) => self.field(field),
            Expr::Call(call) => self.call(call),
            Expr::MethodCall(call) => self.method_call(call),
            Expr::Cast(cast) => self.cast(cast),
            Expr::Struct(lit) => self.struct_literal(lit),
            Expr::Array(array) => self.array_literal(array, expected),
            Expr::Repeat(repeat) => self.repeat_literal(repeat, expected),
            Expr::If(expr_if) => self.select(expr_if, expected),
            Expr::Block(block) => match single_tail(&block.block) {
                Some(inner) => self.expr(inner, expected),
                None => Err(TranspileError::Unsupported(
                    "block with statements in value position".to_string(),
                )),
            },
            _ => Err(TranspileError::Unsupported(format!(
                "expression in value position: {}",
                expr.to_token_stream()
            ))),
        }
    }

    fn literal(&self, lit: &Lit, expected: Option<&str>) -> Result<Typed> {
        match lit {
            Lit::Int(int) => {
                let ty = match int.suffix() {
                    "" => expected.and_then(numeric_scalar).unwrap_or("i32"),
                    "i32" => "i32",
                    "u32" | "usize" => "u32",
                    "f32" => "f32",
                    other => {
                        return Err(TranspileError::WgslLimitation(format!(
                            "`{other}` literals have no WGSL equivalent"
                        )))
                    }
                };
                let digits = int.base10_digits();
                let code = match ty {
                    "u32" => format!("{digits}u"),
                    "f32" => format!("{digits}.0"),
                    _ => digits.to_string(),
                };
                Ok(Typed::new(code, ty))
            }
            Lit::Float(float) => {
                if !matches!(float.suffix(), "" | "f32") {
                    return Err(TranspileError::WgslLimitation(format!(
                        "`{}` literals have no WGSL equivalent; use f32",
                        float.suffix()
                    )));
                }
                let digits = float.base10_digits();
                let code = if digits.contains(['.', 'e', 'E']) {
                    digits.to_string()
                } else {
                    format!("{digits}.0")
                };
                Ok(Typed::new(code, "f32"))
            }
            Lit::Bool(value) => Ok(Typed::new(value.value.to_string(), "bool")),
            other => Err(TranspileError::Unsupported(format!(
                "literal {}",
                other.to_token_stream()
            ))),
        }
    }

    fn path_expr(&mut self, path: &syn::ExprPath) -> Result<Typed> {
        if let Some(ident) = path.path.get_ident() {
            let name = ident.to_string();
            if let Some(local) = self.lookup(&name) {
                return match local.kind {
                    LocalKind::Value(ty) => Ok(Typed::new(local.wgsl, ty)),
                    LocalKind::Resource { .. } => Err(TranspileError::Unsupported(format!(
                        "resource `{name}` used as a value; resources can only be indexed, \
                         sampled or measured"
                    ))),
                };
            }
        }
        self.member(&path_text(&path.path), path.span())
    }

    fn member(&self, name: &str, span: Span) -> Result<Typed> {
        let mapping =
            known_names()
                .resolve_member(name)
                .ok_or_else(|| TranspileError::UnknownIdentifier {
                    category: Category::Member,
                    name: name.to_string(),
                    span,
                })?;
        match &mapping.lowering {
            Lowering::Expression(code) => Ok(Typed::new(code.clone(), mapping.ty)),
            Lowering::HiddenParameter(param) => {
                if !self.entry {
                    return Err(TranspileError::WgslLimitation(format!(
                        "`{name}` is only available in the kernel entry function"
                    )));
                }
                Ok(Typed::new(format!("i32({param})"), mapping.ty))
            }
        }
    }

    fn binary(&mut self, bin: &syn::ExprBinary, expected: Option<&str>) -> Result<Typed> {
        let op = binary_op(&bin.op)?;
        let comparison = matches!(op, "==" | "!=" | "<" | "<=" | ">" | ">=");
        let logical = matches!(op, "&&" | "||");

        let (left, right) = if matches!(op, "<<" | ">>") {
            let left = self.expr(&bin.left, expected)?;
            let right = convert(self.expr(&bin.right, Some("u32"))?, "u32");
            (left, right)
        } else if logical {
            let left = coerce(self.expr(&bin.left, None)?, "bool");
            let right = coerce(self.expr(&bin.right, None)?, "bool");
            (left, right)
        } else {
            let hint = if comparison { None } else { expected };
            if is_untyped_literal(&bin.left) && !is_untyped_literal(&bin.right) {
                let right = self.expr(&bin.right, hint)?;
                let left = self.expr(&bin.left, Some(&right.ty))?;
                (left, right)
            } else {
                let left = self.expr(&bin.left, hint)?;
                let right = self.expr(&bin.right, Some(&left.ty))?;
                (left, right)
            }
        };

        let ty = if comparison || logical {
            "bool".to_string()
        } else {
            arithmetic_type(&left.ty, &right.ty)
        };
        let code = format!(
            "{} {op} {}",
            operand(&bin.left, &left.code, &bin.op),
            operand(&bin.right, &right.code, &bin.op)
        );
        Ok(Typed::new(code, ty))
    }

    fn unary(&mut self, unary: &syn::ExprUnary, expected: Option<&str>) -> Result<Typed> {
        match unary.op {
            UnOp::Neg(_) => {
                let inner = self.expr(&unary.expr, expected)?;
                let code = if matches!(strip(&unary.expr), Expr::Lit(_)) {
                    format!("-{}", inner.code)
                } else {
                    format!("-({})", strip_outer_parens(&inner.code))
                };
                Ok(Typed::new(code, inner.ty))
            }
            UnOp::Not(_) => {
                let inner = coerce(self.expr(&unary.expr, expected)?, "bool");
                let op = if inner.ty == "bool" { "!" } else { "~" };
                Ok(Typed::new(
                    format!("{op}({})", strip_outer_parens(&inner.code)),
                    inner.ty,
                ))
            }
            _ => Err(TranspileError::Unsupported(format!(
                "unary operator: {}",
                unary.to_token_stream()
            ))),
        }
    }

    fn cast(&mut self, cast: &syn::ExprCast) -> Result<Typed> {
        let target = match self.mapper.map_type(&cast.ty)? {
            KernelType::Value(name) if is_scalar(&name) => host_type(&KernelType::Value(name)),
            other => {
                return Err(TranspileError::Unsupported(format!(
                    "cast to `{}`; only numeric scalar casts are supported",
                    other.host_name()
                )))
            }
        };
        let inner = self.expr(&cast.expr, Some(&target))?;
        if inner.ty == target {
            return Ok(inner);
        }
        Ok(Typed::new(
            format!("{target}({})", strip_outer_parens(&inner.code)),
            target,
        ))
    }

    fn index(&mut self, index: &syn::ExprIndex) -> Result<Typed> {
        if let Some((wgsl, resource, element)) = self.resource_of(&index.expr) {
            let coord = self.coordinate(resource, &index.index, index.span())?;
            if resource.is_texture() {
                let format = texel_format(&element)?;
                let load = if resource.is_writable() {
                    format!("textureLoad({wgsl}, {coord})")
                } else {
                    format!("textureLoad({wgsl}, {coord}, 0)")
                };
                return Ok(texel_value(load, format));
            }
            let code = match resource {
                ResourceType::ConstantBuffer => format!("{wgsl}[{coord}].value"),
                _ => format!("{wgsl}[{coord}]"),
            };
            return Ok(Typed::new(code, element));
        }

        let base = self.expr(&index.expr, None)?;
        let position = self.expr(&index.index, Some("i32"))?;
        if !matches!(position.ty.as_str(), "i32" | "u32") {
            return Err(TranspileError::Type(format!(
                "index has type `{}`, expected i32 or u32",
                position.ty
            )));
        }
        let ty = if let Some(element) = array_element(&base.ty) {
            element.to_string()
        } else if vector_info(&base.ty).is_some() || matrix_dim(&base.ty).is_some() {
            component_type(&base.ty)
        } else {
            return Err(TranspileError::Type(format!(
                "`{}` cannot be indexed",
                base.ty
            )));
        };
        Ok(Typed::new(format!("{}[{}]", base.code, position.code), ty))
    }

    /// WGSL coordinate of a resource element access.
    fn coordinate(&mut self, resource: ResourceType, index: &Expr, span: Span) -> Result<String> {
        let parts: Vec<&Expr> = match strip_paren(index) {
            Expr::Tuple(tuple) => tuple.elems.iter().collect(),
            other => vec![other],
        };
        let mut values = Vec::with_capacity(parts.len());
        for part in parts {
            values.push(self.expr(part, Some("i32"))?);
        }
        let types: Vec<&str> = values.iter().map(|v| v.ty.as_str()).collect();
        let key = format!("{}[{}]", resource.generic_name(), types.join(", "));
        let coord = known_names().resolve_indexer(&key).ok_or_else(|| {
            TranspileError::UnknownIdentifier {
                category: Category::ResourceIndexer,
                name: format!("{}[{}]", resource.name(), types.join(", ")),
                span,
            }
        })?;

        if resource.rank() == 1 {
            return Ok(values.remove(0).code);
        }
        if values.len() == 1 {
            let value = values.remove(0);
            let token = known_names().resolve_type(&value.ty).unwrap_or_default();
            return Ok(if token == coord {
                value.code
            } else {
                format!("{coord}({})", value.code)
            });
        }
        let components: Vec<String> = values
            .into_iter()
            .map(|v| convert(v, "i32").code)
            .collect();
        Ok(format!("{coord}({})", components.join(", ")))
    }

    fn field(&mut self, field: &syn::ExprField) -> Result<Typed> {
        let syn::Member::Named(member) = &field.member else {
            return Err(TranspileError::Unsupported(
                "tuple field access".to_string(),
            ));
        };
        let name = member.to_string();
        let base = self.expr(&field.base, None)?;

        if let Some(def) = self.structs.struct_def(&base.ty) {
            let found = def.field(&name).ok_or_else(|| {
                TranspileError::Type(format!("struct `{}` has no field `{name}`", def.name))
            })?;
            return Ok(Typed::new(
                format!("{}.{}", base.code, known_names().wgsl_identifier(&name)),
                found.ty.host_name(),
            ));
        }
        if let Some((scalar, n)) = vector_info(&base.ty) {
            if AXES[..n].contains(&name.as_str()) {
                return Ok(Typed::new(format!("{}.{name}", base.code), scalar));
            }
        }
        if let Some(n) = matrix_dim(&base.ty) {
            if name == "columns" {
                // `m.columns[i]` indexes the matrix directly
                return Ok(Typed::new(base.code, format!("[Float{n}; {n}]")));
            }
        }
        Err(TranspileError::Type(format!(
            "`{}` has no field `{name}`",
            base.ty
        )))
    }

    fn call(&mut self, call: &syn::ExprCall) -> Result<Typed> {
        let Expr::Path(func) = call.func.as_ref() else {
            return Err(TranspileError::Unsupported(format!(
                "call of a non-path expression: {}",
                call.func.to_token_stream()
            )));
        };
        let name = path_text(&func.path);
        let args: Vec<&Expr> = call.args.iter().collect();

        let helpers = self.helpers;
        if let Some(sig) = helpers.get(&name) {
            if args.len() != sig.params.len() {
                return Err(TranspileError::Type(format!(
                    "`{name}` takes {} arguments but {} were given",
                    sig.params.len(),
                    args.len()
                )));
            }
            let mut codes = Vec::with_capacity(args.len());
            for (arg, ty) in args.iter().zip(&sig.params) {
                codes.push(coerce(self.expr(arg, Some(ty))?, ty).code);
            }
            self.out.calls.insert(name);
            return Ok(Typed::new(
                format!("{}({})", sig.wgsl_name, codes.join(", ")),
                sig.returns.clone(),
            ));
        }

        if args.is_empty() && known_names().resolve_member(&name).is_some() {
            return self.member(&name, func.span());
        }

        if is_bool_constructor(&name) {
            let [arg] = args.as_slice() else {
                return Err(TranspileError::Type(format!("`{name}` takes one argument")));
            };
            return Ok(coerce(self.expr(arg, None)?, "Bool"));
        }

        let mapping = known_names().resolve_method(&name).ok_or_else(|| {
            TranspileError::UnknownIdentifier {
                category: Category::Method,
                name: name.clone(),
                span: func.span(),
            }
        })?;

        let hint = match mapping.returns {
            ReturnRule::Fixed(ty) => numeric_scalar(ty),
            _ => None,
        };
        // `Float4x4::from_columns([a, b, c, d])` spreads into the constructor
        let spread: Vec<&Expr> = match args.as_slice() {
            [Expr::Array(array)] if matches!(mapping.returns, ReturnRule::Fixed(_)) => {
                array.elems.iter().collect()
            }
            _ => args.clone(),
        };
        let values = self.args(&spread, hint)?;
        Ok(self.apply(mapping, values))
    }

    fn method_call(&mut self, call: &syn::ExprMethodCall) -> Result<Typed> {
        let method = call.method.to_string();
        if let Some((wgsl, resource, element)) = self.resource_of(&call.receiver) {
            return self.resource_method(&wgsl, resource, &element, &method, call);
        }

        let receiver = self.expr(&call.receiver, None)?;
        if receiver.ty == "Bool" && method == "get" && call.args.is_empty() {
            return Ok(coerce(receiver, "bool"));
        }

        let owner = known_names()
            .qualified_type(&receiver.ty)
            .unwrap_or_else(|| receiver.ty.clone());
        let mapping = known_names()
            .resolve_method(&format!("{owner}::{method}"))
            .ok_or_else(|| TranspileError::UnknownIdentifier {
                category: Category::Method,
                name: format!("{}::{method}", receiver.ty),
                span: call.method.span(),
            })?;

        let rest: Vec<&Expr> = call.args.iter().collect();
        let hint = receiver.ty.clone();
        let mut values = vec![receiver];
        values.extend(self.args(&rest, Some(&hint))?);
        Ok(self.apply(mapping, values))
    }

    fn resource_method(
        &mut self,
        wgsl: &str,
        resource: ResourceType,
        element: &str,
        method: &str,
        call: &syn::ExprMethodCall,
    ) -> Result<Typed> {
        let owner = resource.generic_name();
        let span = call.method.span();

        if method == "sample" {
            let args: Vec<&Expr> = call.args.iter().collect();
            let values = self.args(&args, Some("f32"))?;
            let types: Vec<&str> = values.iter().map(|v| v.ty.as_str()).collect();
            let key = format!("{owner}::sample({})", types.join(", "));
            let coord = known_names().resolve_sampler(&key).ok_or_else(|| {
                TranspileError::UnknownIdentifier {
                    category: Category::ResourceSampler,
                    name: format!("{}::sample({})", resource.name(), types.join(", ")),
                    span,
                }
            })?;
            let format = texel_format(element)?;
            if format.sample_kind() != TexelSampleKind::Float {
                return Err(TranspileError::WgslLimitation(format!(
                    "`{element}` textures cannot be sampled; index them instead"
                )));
            }
            self.out.sampled.push(format);
            let codes: Vec<&str> = values.iter().map(|v| v.code.as_str()).collect();
            let coord = match coord {
                Some(ctor) => format!("{ctor}({})", codes.join(", ")),
                None => codes.concat(),
            };
            return Ok(texel_value(
                format!("textureSampleLevel({wgsl}, {SAMPLER}, {coord}, 0.0)"),
                format,
            ));
        }

        if call.args.is_empty() {
            let key = format!("{owner}::{method}");
            if let Some((_, axis)) = known_names().resolve_size_accessor(&key) {
                let code = if resource.is_texture() {
                    format!("i32(textureDimensions({wgsl}).{})", AXES[axis as usize])
                } else {
                    format!("i32(arrayLength(&{wgsl}))")
                };
                return Ok(Typed::new(code, "i32"));
            }
        }

        Err(TranspileError::UnknownIdentifier {
            category: if call.args.is_empty() {
                Category::SizeAccessor
            } else {
                Category::Method
            },
            name: format!("{}::{method}", resource.name()),
            span,
        })
    }

    /// Transpile call arguments. Unsuffixed integer literals take their type
    /// from `hint`, or from the first typed argument.
    fn args(&mut self, args: &[&Expr], hint: Option<&str>) -> Result<Vec<Typed>> {
        let mut values: Vec<Option<Typed>> = vec![None; args.len()];
        let mut hint = hint.map(str::to_string);
        if let Some(anchor) = args.iter().position(|a| !is_untyped_literal(a)) {
            let value = self.expr(args[anchor], hint.as_deref())?;
            if hint.is_none() {
                hint = Some(value.ty.clone());
            }
            values[anchor] = Some(value);
        }
        for (i, arg) in args.iter().enumerate() {
            if values[i].is_none() {
                values[i] = Some(self.expr(arg, hint.as_deref())?);
            }
        }
        Ok(values.into_iter().flatten().collect())
    }

    fn apply(&mut self, mapping: &MethodMapping, mut args: Vec<Typed>) -> Typed {
        if BARRIERS.contains(&mapping.target.as_str()) {
            self.out.uses_barrier = true;
        }
        let first = args.first().map(|a| a.ty.clone());
        let ty = match mapping.returns {
            ReturnRule::SameAsFirst => first.unwrap_or_else(|| "()".to_string()),
            ReturnRule::ComponentOfFirst => first
                .map(|t| component_type(&t))
                .unwrap_or_else(|| "()".to_string()),
            ReturnRule::Fixed(ty) => ty.to_string(),
            ReturnRule::Void => "()".to_string(),
        };

        if SPLAT_TARGETS.contains(&mapping.target.as_str()) {
            if let Some((scalar, n)) = args.first().and_then(|a| vector_info(&a.ty)) {
                for arg in args.iter_mut().skip(1) {
                    if is_scalar(&arg.ty) {
                        arg.code = format!("vec{n}<{scalar}>({})", arg.code);
                        arg.ty = vector_name(scalar, n);
                    }
                }
            }
        }

        let codes: Vec<&str> = args.iter().map(|a| a.code.as_str()).collect();
        Typed::new(format!("{}({})", mapping.target, codes.join(", ")), ty)
    }

    fn struct_literal(&mut self, lit: &syn::ExprStruct) -> Result<Typed> {
        if lit.rest.is_some() {
            return Err(TranspileError::Unsupported(
                "struct update syntax".to_string(),
            ));
        }
        let name = lit
            .path
            .segments
            .last()
            .map(|s| s.ident.to_string())
            .unwrap_or_default();

        let fields: Vec<(String, String)> = if let Some(def) = self.structs.struct_def(&name) {
            def.fields
                .iter()
                .map(|f| (f.name.clone(), f.ty.host_name()))
                .collect()
        } else if let Some((scalar, n)) = vector_info(&name) {
            AXES[..n]
                .iter()
                .map(|a| (a.to_string(), scalar.to_string()))
                .collect()
        } else {
            return Err(TranspileError::UnsupportedType {
                name,
                span: lit.path.span(),
            });
        };

        let mut given: HashMap<String, &Expr> = HashMap::new();
        for field in &lit.fields {
            let syn::Member::Named(member) = &field.member else {
                return Err(TranspileError::Unsupported(
                    "positional struct fields".to_string(),
                ));
            };
            given.insert(member.to_string(), &field.expr);
        }

        let mut codes = Vec::with_capacity(fields.len());
        for (field, ty) in &fields {
            let expr = given.remove(field).ok_or_else(|| {
                TranspileError::Type(format!("missing field `{field}` in `{name}` literal"))
            })?;
            codes.push(coerce(self.expr(expr, Some(ty))?, ty).code);
        }
        if let Some(extra) = given.keys().next() {
            return Err(TranspileError::Type(format!(
                "`{name}` has no field `{extra}`"
            )));
        }

        self.use_type(&name);
        let ctor = self.mapper.wgsl_value(&name)?;
        Ok(Typed::new(format!("{ctor}({})", codes.join(", ")), name))
    }

    fn array_literal(&mut self, array: &syn::ExprArray, expected: Option<&str>) -> Result<Typed> {
        if array.elems.is_empty() {
            return Err(TranspileError::Unsupported("empty array literal".to_string()));
        }
        let hint = expected.and_then(array_element).map(str::to_string);
        let elems: Vec<&Expr> = array.elems.iter().collect();
        let values = self.args(&elems, hint.as_deref())?;
        let element = hint.unwrap_or_else(|| values[0].ty.clone());
        let codes: Vec<String> = values
            .into_iter()
            .map(|v| coerce(v, &element).code)
            .collect();
        let n = codes.len();
        Ok(Typed::new(
            format!("array<{}, {n}>({})", self.wgsl_of(&element)?, codes.join(", ")),
            format!("[{element}; {n}]"),
        ))
    }

    fn repeat_literal(
        &mut self,
        repeat: &syn::ExprRepeat,
        expected: Option<&str>,
    ) -> Result<Typed> {
        let n = match strip(&repeat.len) {
            Expr::Lit(syn::ExprLit {
                lit: Lit::Int(int), ..
            }) => int
                .base10_parse::<usize>()
                .map_err(|e| TranspileError::Parse(e.to_string()))?,
            _ => {
                return Err(TranspileError::Unsupported(
                    "array repeat length must be a literal integer".to_string(),
                ))
            }
        };
        let hint = expected.and_then(array_element).map(str::to_string);
        let value = self.expr(&repeat.expr, hint.as_deref())?;
        let element = hint.unwrap_or_else(|| value.ty.clone());
        let value = coerce(value, &element);
        let wgsl = self.wgsl_of(&element)?;
        let code = if matches!(value.code.as_str(), "0" | "0u" | "0.0" | "false") {
            format!("array<{wgsl}, {n}>()")
        } else {
            format!("array<{wgsl}, {n}>({})", vec![value.code; n].join(", "))
        };
        Ok(Typed::new(code, format!("[{element}; {n}]")))
    }

    fn select(&mut self, expr_if: &syn::ExprIf, expected: Option<&str>) -> Result<Typed> {
        let not_value = || {
            TranspileError::Unsupported(
                "`if` in value position needs single-expression branches and an `else`"
                    .to_string(),
            )
        };
        let cond = self.condition(&expr_if.cond)?;
        let then = single_tail(&expr_if.then_branch).ok_or_else(not_value)?;
        let otherwise = match &expr_if.else_branch {
            Some((_, else_expr)) => match else_expr.as_ref() {
                Expr::Block(block) => single_tail(&block.block).ok_or_else(not_value)?,
                other => other,
            },
            None => return Err(not_value()),
        };

        let (accept, reject) = if is_untyped_literal(then) && !is_untyped_literal(otherwise) {
            let reject = self.expr(otherwise, expected)?;
            let accept = self.expr(then, Some(&reject.ty))?;
            (accept, reject)
        } else {
            let accept = self.expr(then, expected)?;
            let reject = self.expr(otherwise, Some(&accept.ty))?;
            (accept, reject)
        };
        let reject = coerce(reject, &accept.ty);
        Ok(Typed::new(
            format!("select({}, {}, {cond})", reject.code, accept.code),
            accept.ty,
        ))
    }
}

/// Host type string with `usize` folded into `u32`.
fn host_type(ty: &KernelType) -> String {
    match ty {
        KernelType::Value(name) if name == "usize" => "u32".to_string(),
        KernelType::Array { element, len } => format!("[{}; {len}]", host_type(element)),
        other => other.host_name(),
    }
}

fn strip(expr: &Expr) -> &Expr {
    match expr {
        Expr::Group(group) => strip(&group.expr),
        other => other,
    }
}

fn strip_paren(expr: &Expr) -> &Expr {
    match expr {
        Expr::Group(group) => strip_paren(&group.expr),
        Expr::Paren(paren) => strip_paren(&paren.expr),
        other => other,
    }
}

/// Remove one pair of parentheses that encloses the whole expression.
fn strip_outer_parens(code: &str) -> &str {
    let Some(inner) = code.strip_prefix('(').and_then(|c| c.strip_suffix(')')) else {
        return code;
    };
    let mut depth = 0i32;
    for c in inner.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return code;
                }
            }
            _ => {}
        }
    }
    if depth == 0 {
        inner
    } else {
        code
    }
}

fn single_tail(block: &syn::Block) -> Option<&Expr> {
    match block.stmts.as_slice() {
        [Stmt::Expr(expr, None)] => Some(expr),
        _ => None,
    }
}

fn root_ident(expr: &Expr) -> Option<&syn::Ident> {
    match expr {
        Expr::Path(path) => path.path.get_ident(),
        Expr::Field(field) => root_ident(&field.base),
        Expr::Index(index) => root_ident(&index.expr),
        Expr::Paren(paren) => root_ident(&paren.expr),
        Expr::Group(group) => root_ident(&group.expr),
        _ => None,
    }
}

fn path_text(path: &syn::Path) -> String {
    path.segments
        .iter()
        .map(|s| s.ident.to_string())
        .collect::<Vec<_>>()
        .join("::")
}

fn is_untyped_literal(expr: &Expr) -> bool {
    match expr {
        Expr::Lit(lit) => matches!(&lit.lit, Lit::Int(int) if int.suffix().is_empty()),
        Expr::Unary(unary) if matches!(unary.op, UnOp::Neg(_)) => is_untyped_literal(&unary.expr),
        Expr::Paren(paren) => is_untyped_literal(&paren.expr),
        Expr::Group(group) => is_untyped_literal(&group.expr),
        _ => false,
    }
}

fn is_bool_constructor(name: &str) -> bool {
    matches!(
        name,
        "Bool::from" | "Bool::new" | "kernelforge::Bool::from" | "kernelforge::Bool::new"
    )
}

/// Scalar an unsuffixed literal takes when `ty` is expected.
fn numeric_scalar(ty: &str) -> Option<&'static str> {
    match ty {
        "f32" => Some("f32"),
        "i32" => Some("i32"),
        "u32" | "usize" => Some("u32"),
        other => {
            if let Some((scalar, _)) = vector_info(other) {
                Some(scalar)
            } else if matrix_dim(other).is_some() {
                Some("f32")
            } else {
                None
            }
        }
    }
}

/// Convert between `bool` and the host-shareable `Bool`.
fn coerce(value: Typed, target: &str) -> Typed {
    match (value.ty.as_str(), target) {
        ("bool", "Bool") => {
            let code = match value.code.as_str() {
                "true" => "1u".to_string(),
                "false" => "0u".to_string(),
                code => format!("select(0u, 1u, {code})"),
            };
            Typed::new(code, "Bool")
        }
        ("Bool", "bool") => Typed::new(format!("({} != 0u)", value.code), "bool"),
        _ => value,
    }
}

/// Numeric conversion to a scalar type.
fn convert(value: Typed, ty: &str) -> Typed {
    if value.ty == ty {
        return value;
    }
    Typed::new(format!("{ty}({})", strip_outer_parens(&value.code)), ty)
}

fn arithmetic_type(left: &str, right: &str) -> String {
    if matrix_dim(left).is_some() && vector_info(right).is_some() {
        return right.to_string();
    }
    if vector_info(left).is_some() || matrix_dim(left).is_some() {
        return left.to_string();
    }
    if is_scalar(left) && (vector_info(right).is_some() || matrix_dim(right).is_some()) {
        return right.to_string();
    }
    left.to_string()
}

/// Parenthesize a nested binary operand whose operator differs from its parent.
fn operand(expr: &Expr, code: &str, parent: &BinOp) -> String {
    match strip(expr) {
        Expr::Binary(child) if binary_op(&child.op).ok() != binary_op(parent).ok() => {
            format!("({code})")
        }
        _ => code.to_string(),
    }
}

fn binary_op(op: &BinOp) -> Result<&'static str> {
    Ok(match op {
        BinOp::Add(_) => "+",
        BinOp::Sub(_) => "-",
        BinOp::Mul(_) => "*",
        BinOp::Div(_) => "/",
        BinOp::Rem(_) => "%",
        BinOp::And(_) => "&&",
        BinOp::Or(_) => "||",
        BinOp::BitXor(_) => "^",
        BinOp::BitAnd(_) => "&",
        BinOp::BitOr(_) => "|",
        BinOp::Shl(_) => "<<",
        BinOp::Shr(_) => ">>",
        BinOp::Eq(_) => "==",
        BinOp::Lt(_) => "<",
        BinOp::Le(_) => "<=",
        BinOp::Ne(_) => "!=",
        BinOp::Ge(_) => ">=",
        BinOp::Gt(_) => ">",
        other => {
            return Err(TranspileError::Unsupported(format!(
                "operator `{}` in value position",
                other.to_token_stream()
            )))
        }
    })
}

fn compound_op(op: &BinOp) -> Option<&'static str> {
    Some(match op {
        BinOp::AddAssign(_) => "+",
        BinOp::SubAssign(_) => "-",
        BinOp::MulAssign(_) => "*",
        BinOp::DivAssign(_) => "/",
        BinOp::RemAssign(_) => "%",
        BinOp::BitXorAssign(_) => "^",
        BinOp::BitAndAssign(_) => "&",
        BinOp::BitOrAssign(_) => "|",
        BinOp::ShlAssign(_) => "<<",
        BinOp::ShrAssign(_) => ">>",
        _ => return None,
    })
}

fn texel_format(element: &str) -> Result<TexelFormat> {
    TexelFormat::from_type_name(element)
        .ok_or_else(|| TranspileError::Type(format!("`{element}` is not a texel type")))
}

/// Narrow a `vec4` texel read to the kernel-visible value.
fn texel_value(code: String, format: TexelFormat) -> Typed {
    let code = match format.components() {
        1 => format!("{code}.x"),
        2 => format!("{code}.xy"),
        _ => code,
    };
    Typed::new(code, format.value_type_name())
}

/// Widen a kernel value to the `vec4` a texel store takes.
fn widen_texel(code: &str, format: TexelFormat) -> String {
    let scalar = format.sample_kind().wgsl_scalar();
    let zero = match scalar {
        "f32" => "0.0",
        "u32" => "0u",
        _ => "0",
    };
    let pad = 4 - format.components();
    if pad == 0 {
        return code.to_string();
    }
    format!("vec4<{scalar}>({code}, {})", vec![zero; pad].join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn entry(block: syn::Block) -> Result<EmittedFunction> {
        let mapper = TypeMapper::new();
        let structs = StructTable::new();
        let helpers = BTreeMap::new();
        let mut t = WgslTranspiler::new(&mapper, &structs, &helpers, true);
        t.declare_resource("values", ResourceType::ReadWriteBuffer, "f32");
        t.declare_resource("flags", ResourceType::ReadWriteBuffer, "Bool");
        t.declare_resource("weights", ResourceType::ConstantBuffer, "f32");
        t.declare_resource("image", ResourceType::ReadOnlyTexture2D, "Rgba8");
        t.declare_resource("output", ResourceType::ReadWriteTexture2D, "f32");
        t.declare_resource("labels", ResourceType::ReadOnlyTexture2D, "u32");
        t.declare_value("factor", "f32", false);
        t.declare_value("count", "u32", false);
        t.transpile_body(&block)?;
        Ok(t.finish())
    }

    fn code(block: syn::Block) -> String {
        entry(block).unwrap().code
    }

    fn helper(func: syn::ItemFn) -> Result<EmittedFunction> {
        let mapper = TypeMapper::new();
        let structs = StructTable::new();
        let helpers = BTreeMap::new();
        let sig = HelperSignature::from_fn(&func, &mapper)?;
        WgslTranspiler::new(&mapper, &structs, &helpers, false).transpile_helper(&func, &sig)
    }

    #[test]
    fn test_buffer_read_write() {
        let wgsl = code(parse_quote! {{
            let i = ThreadIds::x();
            values[i] = values[i] * factor;
        }});
        assert!(wgsl.contains("let i: i32 = i32(_kf_global_id.x);"), "{wgsl}");
        assert!(wgsl.contains("values[i] = values[i] * factor;"), "{wgsl}");
    }

    #[test]
    fn test_mutable_locals_and_loops() {
        let wgsl = code(parse_quote! {{
            let mut acc = 0.0;
            for k in 0..count {
                acc += weights[k];
            }
            values[0] = acc;
        }});
        assert!(wgsl.contains("var acc: f32 = 0.0;"), "{wgsl}");
        assert!(
            wgsl.contains("for (var k: u32 = 0u; k < count; k = k + 1u) {"),
            "{wgsl}"
        );
        assert!(wgsl.contains("acc += weights[k].value;"), "{wgsl}");
    }

    #[test]
    fn test_texture_load_and_sample() {
        let out = entry(parse_quote! {{
            let c = image[(1, 2)];
            let s = image.sample(0.5, 0.25);
            let w = image.width();
            let n = values.length();
        }})
        .unwrap();
        assert!(
            out.code
                .contains("let c: vec4<f32> = textureLoad(image, vec2<i32>(1, 2), 0);"),
            "{}",
            out.code
        );
        assert!(out
            .code
            .contains("textureSampleLevel(image, _kf_sampler, vec2<f32>(0.5, 0.25), 0.0)"));
        assert!(out.code.contains("let w: i32 = i32(textureDimensions(image).x);"));
        assert!(out.code.contains("let n: i32 = i32(arrayLength(&values));"));
        assert_eq!(out.sampled, vec![TexelFormat::Rgba8Unorm]);
    }

    #[test]
    fn test_texture_store_widens_value() {
        let wgsl = code(parse_quote! {{
            let x = ThreadIds::x();
            let y = ThreadIds::y();
            output[(x, y)] = 1.0;
            let previous = output[(x, y)];
        }});
        assert!(
            wgsl.contains("textureStore(output, vec2<i32>(x, y), vec4<f32>(1.0, 0.0, 0.0, 0.0));"),
            "{wgsl}"
        );
        assert!(wgsl.contains("let previous: f32 = textureLoad(output, vec2<i32>(x, y)).x;"));
    }

    #[test]
    fn test_unsigned_coordinates_are_converted() {
        let wgsl = code(parse_quote! {{
            let v = labels[(count, count)];
        }});
        assert!(
            wgsl.contains("textureLoad(labels, vec2<i32>(i32(count), i32(count)), 0).x"),
            "{wgsl}"
        );
    }

    #[test]
    fn test_integer_textures_cannot_be_sampled() {
        let err = entry(parse_quote! {{
            let v = labels.sample(0.5, 0.5);
        }})
        .unwrap_err();
        assert!(err.to_string().contains("cannot be sampled"));
    }

    #[test]
    fn test_read_only_writes_rejected() {
        assert!(entry(parse_quote! {{ weights[0] = 1.0; }}).is_err());
        assert!(entry(parse_quote! {{ image[(0, 0)] = Float4::splat(0.0); }}).is_err());
    }

    #[test]
    fn test_immutable_assignment_rejected() {
        let err = entry(parse_quote! {{
            let a = 1.0;
            a = 2.0;
        }})
        .unwrap_err();
        assert!(err.to_string().contains("immutable"));
    }

    #[test]
    fn test_shadowing_renames() {
        let wgsl = code(parse_quote! {{
            let a = 1.0;
            let a = a * 2.0;
            values[0] = a;
        }});
        assert!(wgsl.contains("let a: f32 = 1.0;"));
        assert!(wgsl.contains("let a_1: f32 = a * 2.0;"), "{wgsl}");
        assert!(wgsl.contains("values[0] = a_1;"));
    }

    #[test]
    fn test_reserved_names_rewritten() {
        let wgsl = code(parse_quote! {{
            let var = factor;
            values[0] = var;
        }});
        assert!(wgsl.contains("let _reserved_var: f32 = factor;"), "{wgsl}");
    }

    #[test]
    fn test_unknown_method() {
        let err = entry(parse_quote! {{
            let v = Float3::splat(1.0);
            let w = v.frobnicate();
        }})
        .unwrap_err();
        assert_eq!(err.to_string(), "Unknown method: `Float3::frobnicate`");
        assert!(err.span().is_some());
    }

    #[test]
    fn test_unknown_member() {
        let err = entry(parse_quote! {{ let v = ThreadIds::w(); }}).unwrap_err();
        assert!(matches!(
            err,
            TranspileError::UnknownIdentifier {
                category: Category::Method,
                ..
            }
        ));
        let err = entry(parse_quote! {{ let v = missing; }}).unwrap_err();
        assert_eq!(err.to_string(), "Unknown member: `missing`");
    }

    #[test]
    fn test_bool_conversions() {
        let wgsl = code(parse_quote! {{
            flags[0] = factor > 1.0;
            flags[1] = true;
            if flags[2] {
                values[0] = 0.0;
            }
            let b = flags[3].get();
        }});
        assert!(wgsl.contains("flags[0] = select(0u, 1u, factor > 1.0);"), "{wgsl}");
        assert!(wgsl.contains("flags[1] = 1u;"));
        assert!(wgsl.contains("if ((flags[2] != 0u)) {"), "{wgsl}");
        assert!(wgsl.contains("let b: bool = (flags[3] != 0u);"));
    }

    #[test]
    fn test_match_becomes_switch() {
        let wgsl = code(parse_quote! {{
            match count {
                0 => {
                    values[0] = 1.0;
                }
                1 | 2 => values[1] = 2.0,
                _ => {}
            }
        }});
        assert!(wgsl.contains("switch (count) {"), "{wgsl}");
        assert!(wgsl.contains("case 0u: {"));
        assert!(wgsl.contains("case 1u, 2u: {"));
        assert!(wgsl.contains("default: {"));
    }

    #[test]
    fn test_switch_gets_default() {
        let wgsl = code(parse_quote! {{
            match count {
                0 => values[0] = 1.0,
                1 => values[0] = 2.0,
            }
        }});
        assert!(wgsl.contains("default: {}"));
    }

    #[test]
    fn test_value_if_becomes_select() {
        let wgsl = code(parse_quote! {{
            let m = if factor > 0.0 { 1.0 } else { -1.0 };
        }});
        assert!(
            wgsl.contains("let m: f32 = select(-1.0, 1.0, factor > 0.0);"),
            "{wgsl}"
        );
    }

    #[test]
    fn test_if_else_chain() {
        let wgsl = code(parse_quote! {{
            if factor < 0.0 {
                values[0] = 0.0;
            } else if factor > 1.0 {
                values[0] = 1.0;
            } else {
                values[0] = factor;
            }
        }});
        assert!(wgsl.contains("if (factor < 0.0) {"));
        assert!(wgsl.contains("} else if (factor > 1.0) {"), "{wgsl}");
        assert!(wgsl.contains("} else {"));
    }

    #[test]
    fn test_group_index_only_in_entry() {
        let wgsl = code(parse_quote! {{ let g = GroupIds::index(); }});
        assert!(wgsl.contains("let g: i32 = i32(_kf_group_index);"));

        let err = helper(parse_quote! {
            fn lane() -> i32 { GroupIds::index() }
        })
        .unwrap_err();
        assert!(err.to_string().contains("entry function"));
    }

    #[test]
    fn test_barrier_is_recorded() {
        let out = entry(parse_quote! {{ workgroup_barrier(); }}).unwrap();
        assert!(out.code.contains("workgroupBarrier();"));
        assert!(out.uses_barrier);
    }

    #[test]
    fn test_vector_methods_splat_scalars() {
        let wgsl = code(parse_quote! {{
            let v = Float3::new(1.0, 2.0, 3.0);
            let c = v.clamp(0.0, 1.0);
            let d = v.dot(c);
            let s = v * 2;
        }});
        assert!(wgsl.contains("let v: vec3<f32> = vec3<f32>(1.0, 2.0, 3.0);"));
        assert!(
            wgsl.contains("let c: vec3<f32> = clamp(v, vec3<f32>(0.0), vec3<f32>(1.0));"),
            "{wgsl}"
        );
        assert!(wgsl.contains("let d: f32 = dot(v, c);"));
        assert!(wgsl.contains("let s: vec3<f32> = v * 2.0;"), "{wgsl}");
    }

    #[test]
    fn test_constants_and_casts() {
        let wgsl = code(parse_quote! {{
            let p = f32::consts::PI;
            let i = ThreadIds::x() as u32;
            let f = count as f32;
            let m = u32::MAX;
        }});
        assert!(wgsl.contains("let p: f32 = 3.1415927;"));
        assert!(wgsl.contains("let i: u32 = u32(i32(_kf_global_id.x));"), "{wgsl}");
        assert!(wgsl.contains("let f: f32 = f32(count);"));
        assert!(wgsl.contains("let m: u32 = 4294967295u;"));
    }

    #[test]
    fn test_arrays() {
        let wgsl = code(parse_quote! {{
            let taps = [0.25, 0.5, 0.25];
            let mut acc: [f32; 4] = [0.0; 4];
            acc[1] = taps[0];
        }});
        assert!(
            wgsl.contains("var taps: array<f32, 3> = array<f32, 3>(0.25, 0.5, 0.25);"),
            "{wgsl}"
        );
        assert!(wgsl.contains("var acc: array<f32, 4> = array<f32, 4>();"));
        assert!(wgsl.contains("acc[1] = taps[0];"));
    }

    #[test]
    fn test_operator_precedence_is_explicit() {
        let wgsl = code(parse_quote! {{
            let a = factor + factor * 2.0;
            let b = (count << 2) | 1;
        }});
        assert!(wgsl.contains("let a: f32 = factor + (factor * 2.0);"), "{wgsl}");
        assert!(wgsl.contains("let b: u32 = (count << 2u) | 1u;"), "{wgsl}");
    }

    #[test]
    fn test_helper_function() {
        let out = helper(parse_quote! {
            fn lerp1(a: f32, b: f32, t: f32) -> f32 {
                a + (b - a) * t
            }
        })
        .unwrap();
        assert_eq!(
            out.code,
            "fn lerp1(a: f32, b: f32, t: f32) -> f32 {\n    return a + ((b - a) * t);\n}"
        );
    }

    #[test]
    fn test_helper_tail_if_returns_from_each_branch() {
        let out = helper(parse_quote! {
            fn sign_of(x: f32) -> f32 {
                if x < 0.0 { -1.0 } else { 1.0 }
            }
        })
        .unwrap();
        assert!(out.code.contains("if (x < 0.0) {\n        return -1.0;\n    } else {\n        return 1.0;\n    }"), "{}", out.code);
    }

    #[test]
    fn test_helper_mutable_parameter() {
        let out = helper(parse_quote! {
            fn bump(mut x: i32) -> i32 {
                x += 1;
                x
            }
        })
        .unwrap();
        assert!(out.code.starts_with("fn bump(x_in: i32) -> i32 {"), "{}", out.code);
        assert!(out.code.contains("var x: i32 = x_in;"));
        assert!(out.code.contains("x += 1;"));
        assert!(out.code.contains("return x;"));
    }

    #[test]
    fn test_helpers_cannot_take_resources() {
        let func: syn::ItemFn = parse_quote! {
            fn read(values: ReadOnlyBuffer<f32>) -> f32 { values[0] }
        };
        assert!(HelperSignature::from_fn(&func, &TypeMapper::new()).is_err());
    }

    #[test]
    fn test_strip_outer_parens() {
        assert_eq!(strip_outer_parens("(a + b)"), "a + b");
        assert_eq!(strip_outer_parens("(a) + (b)"), "(a) + (b)");
        assert_eq!(strip_outer_parens("a"), "a");
    }
}
