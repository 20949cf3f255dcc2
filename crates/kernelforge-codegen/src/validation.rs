//! Kernel DSL validation.
//!
//! Rejects the Rust constructs WGSL cannot express before the emitter runs,
//! so errors name the construct rather than failing half-way through
//! generation.

use quote::ToTokens;
use thiserror::Error;

/// Errors that can occur during validation.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Unsupported Rust construct.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Invalid DSL usage.
    #[error("Invalid DSL usage: {0}")]
    InvalidDsl(String),
}

/// Validation mode determines which signatures are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Entry kernels: resources and values as parameters, no return value.
    #[default]
    Kernel,

    /// Helper functions: value parameters only, any value return.
    Helper,
}

impl ValidationMode {
    /// Check if this mode allows resource parameters.
    pub fn allows_resources(&self) -> bool {
        matches!(self, ValidationMode::Kernel)
    }

    /// Check if this mode requires a unit return type.
    pub fn requires_unit_return(&self) -> bool {
        matches!(self, ValidationMode::Kernel)
    }
}

const ALLOWED_ATTRIBUTES: &[&str] = &["doc", "allow", "cfg", "kernel", "inline"];

/// Validate a function for WGSL transpilation.
pub fn validate_function(func: &syn::ItemFn) -> Result<(), ValidationError> {
    validate_function_with_mode(func, ValidationMode::default())
}

/// Validate a function with a specific validation mode.
pub fn validate_function_with_mode(
    func: &syn::ItemFn,
    mode: ValidationMode,
) -> Result<(), ValidationError> {
    for attr in &func.attrs {
        let path = attr.path().to_token_stream().to_string();
        if !ALLOWED_ATTRIBUTES.contains(&path.as_str()) {
            return Err(ValidationError::Unsupported(format!(
                "Function attribute: {path}"
            )));
        }
    }

    if func.sig.asyncness.is_some() {
        return Err(ValidationError::Unsupported(
            "Async functions are not supported in WGSL".to_string(),
        ));
    }

    if func.sig.unsafety.is_some() {
        return Err(ValidationError::Unsupported(
            "Unsafe functions are not supported in WGSL".to_string(),
        ));
    }

    if !func.sig.generics.params.is_empty() {
        return Err(ValidationError::Unsupported(
            "Generic functions are not supported in WGSL".to_string(),
        ));
    }

    if func.sig.variadic.is_some() {
        return Err(ValidationError::Unsupported(
            "Variadic functions are not supported in WGSL".to_string(),
        ));
    }

    if mode.requires_unit_return() && !matches!(func.sig.output, syn::ReturnType::Default) {
        return Err(ValidationError::InvalidDsl(format!(
            "kernel `{}` must not return a value; write results to a buffer",
            func.sig.ident
        )));
    }

    for input in &func.sig.inputs {
        match input {
            syn::FnArg::Receiver(_) => {
                return Err(ValidationError::Unsupported(
                    "Methods are not supported; use free functions".to_string(),
                ))
            }
            syn::FnArg::Typed(pat_type) => {
                if !matches!(pat_type.pat.as_ref(), syn::Pat::Ident(_)) {
                    return Err(ValidationError::Unsupported(format!(
                        "Parameter pattern: {}",
                        pat_type.pat.to_token_stream()
                    )));
                }
            }
        }
    }

    validate_block(&func.block)
}

fn validate_block(block: &syn::Block) -> Result<(), ValidationError> {
    for stmt in &block.stmts {
        validate_stmt(stmt)?;
    }
    Ok(())
}

fn validate_stmt(stmt: &syn::Stmt) -> Result<(), ValidationError> {
    match stmt {
        syn::Stmt::Local(local) => {
            validate_pattern(&local.pat)?;
            if let Some(init) = &local.init {
                if init.diverge.is_some() {
                    return Err(ValidationError::Unsupported(
                        "let-else is not supported".to_string(),
                    ));
                }
                validate_expr(&init.expr)?;
            }
            Ok(())
        }
        syn::Stmt::Expr(expr, _) => validate_expr(expr),
        syn::Stmt::Item(_) => Err(ValidationError::Unsupported(
            "Nested items are not supported".to_string(),
        )),
        syn::Stmt::Macro(_) => Err(ValidationError::Unsupported(
            "Macros are not supported in kernels".to_string(),
        )),
    }
}

fn validate_pattern(pat: &syn::Pat) -> Result<(), ValidationError> {
    match pat {
        syn::Pat::Ident(ident) if ident.by_ref.is_none() && ident.subpat.is_none() => Ok(()),
        syn::Pat::Type(pat_type) => validate_pattern(&pat_type.pat),
        _ => Err(ValidationError::Unsupported(format!(
            "Pattern: {}",
            pat.to_token_stream()
        ))),
    }
}

fn validate_expr(expr: &syn::Expr) -> Result<(), ValidationError> {
    match expr {
        syn::Expr::Lit(_) | syn::Expr::Path(_) => Ok(()),
        syn::Expr::Break(brk) => {
            if brk.label.is_some() || brk.expr.is_some() {
                return Err(ValidationError::Unsupported(
                    "Labelled or valued break".to_string(),
                ));
            }
            Ok(())
        }
        syn::Expr::Continue(cont) => {
            if cont.label.is_some() {
                return Err(ValidationError::Unsupported("Labelled continue".to_string()));
            }
            Ok(())
        }
        syn::Expr::Paren(p) => validate_expr(&p.expr),
        syn::Expr::Group(g) => validate_expr(&g.expr),
        syn::Expr::Binary(bin) => {
            validate_expr(&bin.left)?;
            validate_expr(&bin.right)
        }
        syn::Expr::Unary(unary) => validate_expr(&unary.expr),
        syn::Expr::Index(idx) => {
            validate_expr(&idx.expr)?;
            validate_expr(&idx.index)
        }
        syn::Expr::Tuple(tuple) => tuple.elems.iter().try_for_each(validate_expr),
        syn::Expr::Array(array) => array.elems.iter().try_for_each(validate_expr),
        syn::Expr::Repeat(repeat) => {
            validate_expr(&repeat.expr)?;
            validate_expr(&repeat.len)
        }
        syn::Expr::Call(call) => {
            validate_expr(&call.func)?;
            call.args.iter().try_for_each(validate_expr)
        }
        syn::Expr::MethodCall(method) => {
            if method.turbofish.is_some() {
                return Err(ValidationError::Unsupported(
                    "Turbofish method calls".to_string(),
                ));
            }
            validate_expr(&method.receiver)?;
            method.args.iter().try_for_each(validate_expr)
        }
        syn::Expr::If(if_expr) => {
            if matches!(if_expr.cond.as_ref(), syn::Expr::Let(_)) {
                return Err(ValidationError::Unsupported("if-let".to_string()));
            }
            validate_expr(&if_expr.cond)?;
            validate_block(&if_expr.then_branch)?;
            if let Some((_, else_branch)) = &if_expr.else_branch {
                validate_expr(else_branch)?;
            }
            Ok(())
        }
        syn::Expr::Block(block) => {
            if block.label.is_some() {
                return Err(ValidationError::Unsupported("Labelled blocks".to_string()));
            }
            validate_block(&block.block)
        }
        syn::Expr::ForLoop(for_loop) => {
            if for_loop.label.is_some() {
                return Err(ValidationError::Unsupported("Labelled loops".to_string()));
            }
            validate_pattern(&for_loop.pat)?;
            validate_expr(&for_loop.expr)?;
            validate_block(&for_loop.body)
        }
        syn::Expr::While(while_loop) => {
            if while_loop.label.is_some() {
                return Err(ValidationError::Unsupported("Labelled loops".to_string()));
            }
            if matches!(while_loop.cond.as_ref(), syn::Expr::Let(_)) {
                return Err(ValidationError::Unsupported("while-let".to_string()));
            }
            validate_expr(&while_loop.cond)?;
            validate_block(&while_loop.body)
        }
        syn::Expr::Loop(loop_expr) => {
            if loop_expr.label.is_some() {
                return Err(ValidationError::Unsupported("Labelled loops".to_string()));
            }
            validate_block(&loop_expr.body)
        }
        syn::Expr::Return(ret) => match &ret.expr {
            Some(expr) => validate_expr(expr),
            None => Ok(()),
        },
        syn::Expr::Assign(assign) => {
            validate_expr(&assign.left)?;
            validate_expr(&assign.right)
        }
        syn::Expr::Cast(cast) => validate_expr(&cast.expr),
        syn::Expr::Struct(struct_expr) => {
            if struct_expr.rest.is_some() {
                return Err(ValidationError::Unsupported(
                    "Struct update syntax".to_string(),
                ));
            }
            struct_expr
                .fields
                .iter()
                .try_for_each(|field| validate_expr(&field.expr))
        }
        syn::Expr::Field(field) => validate_expr(&field.base),
        syn::Expr::Match(match_expr) => {
            validate_expr(&match_expr.expr)?;
            for arm in &match_expr.arms {
                if arm.guard.is_some() {
                    return Err(ValidationError::Unsupported("Match guards".to_string()));
                }
                validate_expr(&arm.body)?;
            }
            Ok(())
        }
        syn::Expr::Range(range) => {
            if let Some(start) = &range.start {
                validate_expr(start)?;
            }
            if let Some(end) = &range.end {
                validate_expr(end)?;
            }
            Ok(())
        }
        syn::Expr::Closure(_) => Err(ValidationError::Unsupported(
            "Closures are not supported in WGSL".to_string(),
        )),
        syn::Expr::Macro(mac) => Err(ValidationError::Unsupported(format!(
            "Macro `{}!` in kernel",
            mac.mac.path.to_token_stream()
        ))),
        syn::Expr::Reference(_) => Err(ValidationError::Unsupported(
            "References are not supported; pass values directly".to_string(),
        )),
        _ => Err(ValidationError::Unsupported(format!(
            "Expression type: {}",
            expr.to_token_stream()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_simple_kernel_validates() {
        let func: syn::ItemFn = parse_quote! {
            fn scale(values: ReadWriteBuffer<f32>, factor: f32) {
                let i = ThreadIds::x();
                values[i] = values[i] * factor;
            }
        };
        assert!(validate_function(&func).is_ok());
    }

    #[test]
    fn test_helper_may_return() {
        let func: syn::ItemFn = parse_quote! {
            fn add(a: f32, b: f32) -> f32 {
                a + b
            }
        };
        assert!(validate_function(&func).is_err());
        assert!(validate_function_with_mode(&func, ValidationMode::Helper).is_ok());
    }

    #[test]
    fn test_async_function_rejected() {
        let func: syn::ItemFn = parse_quote! {
            async fn process() {}
        };
        assert!(validate_function(&func).is_err());
    }

    #[test]
    fn test_generic_function_rejected() {
        let func: syn::ItemFn = parse_quote! {
            fn generic<T>(x: T) { }
        };
        assert!(validate_function(&func).is_err());
    }

    #[test]
    fn test_closures_and_macros_rejected() {
        let func: syn::ItemFn = parse_quote! {
            fn k() {
                let f = |x: f32| x * 2.0;
            }
        };
        assert!(validate_function(&func).is_err());

        let func: syn::ItemFn = parse_quote! {
            fn k() {
                println!("hello");
            }
        };
        assert!(validate_function(&func).is_err());
    }

    #[test]
    fn test_loops_allowed() {
        let func: syn::ItemFn = parse_quote! {
            fn k(values: ReadWriteBuffer<f32>) {
                for i in 0..10 {
                    values[i] = 0.0;
                }
                let mut n = 0;
                while n < 4 { n += 1; }
            }
        };
        assert!(validate_function(&func).is_ok());
    }

    #[test]
    fn test_destructuring_rejected() {
        let func: syn::ItemFn = parse_quote! {
            fn k() {
                let (a, b) = (1, 2);
            }
        };
        assert!(validate_function(&func).is_err());
    }

    #[test]
    fn test_foreign_attribute_rejected() {
        let func: syn::ItemFn = parse_quote! {
            #[no_mangle]
            fn k() {}
        };
        assert!(validate_function(&func).is_err());
    }
}
