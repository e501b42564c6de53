//! Fixpoint type inference for a dynamically-written, statically-typed
//! language targeting a JVM-like platform.
//!
//! Callers build an [`ast::Ast`] arena, then hand its root to
//! [`typeck::infer_program`]. Types flow bottom-up; anything that cannot be
//! typed yet is deferred and retried until the program converges.

pub mod span;
pub mod diagnostics;
pub mod ast;
pub mod config;
pub mod typeck;

pub use ast::{Ast, NodeId, NodeKind};
pub use config::InferenceConfig;
pub use diagnostics::CompileError;
pub use typeck::env::Environment;
pub use typeck::types::Type;
pub use typeck::{infer_program, infer_program_with, InferenceOutcome};
