use crate::ast::{Ast, NodeId};
use crate::diagnostics::{CompileError, InferenceFailure};
use super::env::Environment;
use super::errors::InferenceError;
use super::types::Type;

/// Passes allowed beyond the ordinary budget to break a stall.
pub const MAX_EXTENSION_PASSES: usize = 2;

/// Resolver state. The non-terminal states name the kind of the next pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ResolveState {
    /// Ordinary pass over the deferred set.
    Progressing,
    /// Re-run of a stalled pass with `last_chance` set so rules may fall back to defaults.
    LastChance,
    /// Re-run of a stalled pass where the first deferral becomes an error.
    ErrorForcing,
    /// Deferred set emptied.
    Converged,
    /// Stalled and every escalation was spent.
    NoProgress,
    /// Still progressing when the ordinary pass budget ran out.
    Exhausted,
}

impl ResolveState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ResolveState::Converged | ResolveState::NoProgress | ResolveState::Exhausted)
    }
}

/// How the deferred set changed across one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Empty,
    Changed,
    Unchanged,
}

/// Transition table for the resolver.
pub fn next_state(ran: ResolveState, outcome: PassOutcome, last_chance: bool, extensions_left: usize) -> ResolveState {
    match outcome {
        PassOutcome::Empty => ResolveState::Converged,
        PassOutcome::Changed => ResolveState::Progressing,
        PassOutcome::Unchanged => {
            if ran == ResolveState::ErrorForcing || extensions_left == 0 {
                ResolveState::NoProgress
            } else if last_chance {
                ResolveState::ErrorForcing
            } else {
                ResolveState::LastChance
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ResolveReport {
    /// Every pass run, ordinary and extension.
    pub passes: usize,
    pub ordinary_passes: usize,
    pub extension_passes: usize,
    pub final_state: ResolveState,
    /// Nodes forced to the error type after the loop ended.
    pub forced: Vec<NodeId>,
}

impl Environment {
    /// Drive deferred nodes to a fixpoint.
    ///
    /// Runs at most `|deferred| + 1` ordinary passes plus
    /// [`MAX_EXTENSION_PASSES`] escalation passes. Whatever is still pending
    /// afterwards is resolved to the error type. In strict mode any recorded
    /// error fails the whole run.
    pub fn resolve(&mut self, ast: &mut Ast, strict: bool) -> Result<ResolveReport, CompileError> {
        let budget = self.deferred.len() + 1;
        let saved_self = self.self_type().cloned();
        let mut report = ResolveReport {
            passes: 0,
            ordinary_passes: 0,
            extension_passes: 0,
            final_state: ResolveState::Progressing,
            forced: Vec::new(),
        };
        let mut state = if self.deferred.is_empty() { ResolveState::Converged } else { ResolveState::Progressing };

        tracing::debug!(pending = self.deferred.len(), budget, "entering type inference cycle");
        self.cycling = true;
        while !state.is_terminal() {
            match state {
                ResolveState::Progressing => {
                    if report.ordinary_passes == budget {
                        state = ResolveState::Exhausted;
                        break;
                    }
                    report.ordinary_passes += 1;
                }
                ResolveState::LastChance => {
                    self.last_chance = true;
                    report.extension_passes += 1;
                }
                ResolveState::ErrorForcing => {
                    self.error_next = true;
                    report.extension_passes += 1;
                }
                _ => {}
            }
            report.passes += 1;
            let outcome = self.run_pass(ast, report.passes, state);
            let next = next_state(
                state,
                outcome,
                self.last_chance,
                MAX_EXTENSION_PASSES.saturating_sub(report.extension_passes),
            );
            tracing::debug!(pass = report.passes, ?state, ?outcome, ?next, "pass finished");
            if next == ResolveState::Progressing {
                self.error_next = false;
            }
            state = next;
        }
        self.cycling = false;
        self.error_next = false;
        self.last_chance = false;
        report.final_state = state;

        report.forced = self.force_unresolved(ast);
        self.set_self_type(saved_self);

        if strict && !self.errors().is_empty() {
            let failures = self.errors().iter().map(|e| failure_for(ast, e)).collect();
            return Err(CompileError::inference(failures));
        }
        Ok(report)
    }

    fn run_pass(&mut self, ast: &mut Ast, pass: usize, state: ResolveState) -> PassOutcome {
        let snapshot = std::mem::take(&mut self.deferred);
        let before: Vec<NodeId> = snapshot.keys().copied().collect();
        tracing::debug!(pass, ?state, pending = before.len(), "resolution pass");

        for (id, saved_self) in snapshot {
            self.set_self_type(saved_self.clone());
            let ty = self.infer(ast, id);
            tracing::trace!(pass, node = %id, kind = %ast.describe(id), ty = ?ty, "reinferred");
            if !ast.is_resolved(id) && !self.deferred.contains_key(&id) {
                self.deferred.insert(id, saved_self);
            }
        }
        self.deferred.retain(|id, _| !ast.is_resolved(*id));

        let after: Vec<NodeId> = self.deferred.keys().copied().collect();
        if after.is_empty() {
            PassOutcome::Empty
        } else if after == before {
            PassOutcome::Unchanged
        } else {
            PassOutcome::Changed
        }
    }

    /// Resolve every still-deferred node to the error type. Each one gets a
    /// "Could not infer typing for node" error unless it already has one.
    fn force_unresolved(&mut self, ast: &mut Ast) -> Vec<NodeId> {
        let leftovers = std::mem::take(&mut self.deferred);
        let mut forced = Vec::new();
        for id in leftovers.into_keys() {
            if ast.is_resolved(id) {
                continue;
            }
            if !self.has_error_for(id) {
                self.push_error(
                    InferenceError::new("Could not infer typing for node").at(Some(id), ast.span(id)),
                );
            }
            tracing::warn!(node = %id, kind = %ast.describe(id), "unresolved after inference cycle");
            ast.resolve(id, Type::Error);
            forced.push(id);
        }
        forced
    }
}

fn failure_for(ast: &Ast, err: &InferenceError) -> InferenceFailure {
    match err.node {
        Some(node) => InferenceFailure {
            message: err.message.clone(),
            node: ast.describe(node),
            line: ast.span(node).line,
            parent: ast.parent(node).map(|p| ast.describe(p)),
        },
        None => InferenceFailure {
            message: err.message.clone(),
            node: "<unknown>".to_string(),
            line: err.span.line,
            parent: None,
        },
    }
}
