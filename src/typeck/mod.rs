//! Type inference over the node arena.
//!
//! Rules run bottom-up from [`Environment::infer`]. A rule that lacks an
//! input defers its node; [`Environment::resolve`] then re-runs deferred
//! nodes until they all resolve, progress stops, or the pass budget runs out.

pub mod env;
pub mod errors;
pub mod methods;
pub mod platform;
pub mod plugin;
pub mod resolve;
pub mod types;

mod control_flow;
pub(crate) mod infer;

use crate::ast::{Ast, NodeId};
use crate::config::InferenceConfig;
use crate::diagnostics::CompileError;
use env::Environment;
use resolve::ResolveReport;
use types::Type;

/// Everything one inference run produces.
#[derive(Debug)]
pub struct InferenceOutcome {
    pub env: Environment,
    pub report: ResolveReport,
    /// Type of the root node; the error type if the root could not be typed.
    pub root_type: Type,
}

/// Infer types for the tree under `root` with a fresh environment.
pub fn infer_program(ast: &mut Ast, root: NodeId, config: InferenceConfig) -> Result<InferenceOutcome, CompileError> {
    infer_program_with(Environment::new(config), ast, root)
}

/// Like [`infer_program`], with a caller-built environment (custom plugins,
/// pre-learned signatures).
pub fn infer_program_with(mut env: Environment, ast: &mut Ast, root: NodeId) -> Result<InferenceOutcome, CompileError> {
    let script_class = env.config().script_class.clone();
    let strict = env.config().strict;
    tracing::debug!(nodes = ast.len(), %root, script_class = %script_class, "starting inference");

    env.define_type(&script_class, None, Vec::new(), |env, _| env.infer(ast, root));
    let report = env.resolve(ast, strict)?;

    let root_type = ast.inferred_type(root).cloned().unwrap_or(Type::Error);
    tracing::debug!(
        passes = report.passes,
        final_state = ?report.final_state,
        errors = env.errors().len(),
        "inference finished"
    );
    Ok(InferenceOutcome { env, report, root_type })
}
