//! Silo Compiler - Graph resolution and plan compilation
//!
//! Turns declarative feature-view definitions into processor-targeted
//! physical plans:
//!
//! 1. [`Resolver`] walks named references through the registry and builds an
//!    immutable, fully typed [`ResolvedGraph`] (cycle detection, schema
//!    propagation, memoized per (name, version)).
//! 2. The [`pit`] module defines the point-in-time visibility semantics
//!    every processor must implement bit-for-bit.
//! 3. [`PlanCompiler`] lowers a resolved graph into an
//!    [`ExecutionPlan`](silo_core::plan::ExecutionPlan) for a concrete
//!    (time range, key filter, capability set) request.
//!
//! Everything in this crate is pure: concurrent compilations share nothing
//! but the read-only registry.

pub mod error;
pub mod graph;
pub mod pit;
mod compiler;
mod resolver;

pub use compiler::{CompilerOptions, PlanCompiler};
pub use error::{CompileError, ResolveError};
pub use graph::{
    ResolvedGraph, ResolvedInput, ResolvedKind, ResolvedNode, TypedAggregate, TypedOnDemand,
    TypedTransform,
};
pub use resolver::Resolver;
