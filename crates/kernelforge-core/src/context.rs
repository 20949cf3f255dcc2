//! Dispatch-context types.
//!
//! These types have no values. Inside a kernel body their members name the
//! per-invocation built-ins and are lowered to WGSL expressions by the
//! transpiler, e.g. `ThreadIds::xy()` becomes a `vec2<i32>` built from the
//! global invocation id. Outside a kernel body there is nothing to call.
//!
//! | Type | Members |
//! |------|---------|
//! | [`ThreadIds`] | `x`, `y`, `z`, `xy`, `xyz` |
//! | [`GroupIds`] | `x`, `y`, `z`, `xy`, `xyz`, `index` |
//! | [`WorkgroupIds`] | `x`, `y`, `z`, `xy`, `xyz` |
//! | [`GroupSize`] | `x`, `y`, `z`, `xy`, `xyz`, `count` |
//! | [`DispatchSize`] | `x`, `y`, `z`, `xy`, `xyz`, `count` |
//! | [`ThreadIdsNormalized`] | `x`, `y`, `z`, `xy`, `xyz` |

/// Global invocation id of the current thread.
#[derive(Debug)]
pub enum ThreadIds {}

/// Id of the current thread within its workgroup. `index` is the linear
/// in-group index.
#[derive(Debug)]
pub enum GroupIds {}

/// Id of the current workgroup.
#[derive(Debug)]
pub enum WorkgroupIds {}

/// Workgroup size the kernel was compiled with.
#[derive(Debug)]
pub enum GroupSize {}

/// Logical dispatch size passed to `dispatch`.
#[derive(Debug)]
pub enum DispatchSize {}

/// Global invocation id divided by the dispatch size, in `[0, 1)`.
#[derive(Debug)]
pub enum ThreadIdsNormalized {}

/// Names of every dispatch-context type.
pub const CONTEXT_TYPE_NAMES: &[&str] = &[
    "ThreadIds",
    "GroupIds",
    "WorkgroupIds",
    "GroupSize",
    "DispatchSize",
    "ThreadIdsNormalized",
];
