use thiserror::Error;

use crate::ast::NodeId;
use crate::span::Span;

/// A hard inference error: a genuine type contradiction, or an unresolvable
/// deferral converted into one by the resolver.
///
/// Raised by node rules and caught only at `Environment::infer`, which tags it
/// with the failing node when the rule did not name one.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize)]
#[error("{message}")]
pub struct InferenceError {
    pub message: String,
    pub node: Option<NodeId>,
    pub span: Span,
    pub trace: Option<String>,
}

impl InferenceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), node: None, span: Span::dummy(), trace: None }
    }

    pub fn at(mut self, node: Option<NodeId>, span: Span) -> Self {
        self.node = node;
        self.span = span;
        self
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }
}

pub type InferResult = Result<Option<crate::typeck::types::Type>, InferenceError>;
