use crate::typeck::errors::InferenceError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Config error: {msg}")]
    Config { msg: String, path: PathBuf },

    #[error("Type inference failed with {} error(s):\n{}", failures.len(), render_failures(failures))]
    Inference { failures: Vec<InferenceFailure> },

    #[error("Plugin error: {msg}")]
    Plugin { msg: String },
}

/// One entry of a strict-mode aggregate failure.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct InferenceFailure {
    pub message: String,
    pub node: String,
    pub line: u32,
    pub parent: Option<String>,
}

impl std::fmt::Display for InferenceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at line {}", self.node, self.line)?;
        if let Some(parent) = &self.parent {
            write!(f, " (in {parent})")?;
        }
        write!(f, ": {}", self.message)
    }
}

fn render_failures(failures: &[InferenceFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  {f}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl CompileError {
    pub fn config(msg: impl Into<String>, path: PathBuf) -> Self {
        Self::Config { msg: msg.into(), path }
    }

    pub fn inference(failures: Vec<InferenceFailure>) -> Self {
        Self::Inference { failures }
    }

    pub fn plugin(msg: impl Into<String>) -> Self {
        Self::Plugin { msg: msg.into() }
    }
}

/// Render collected inference errors with ariadne for terminal output.
/// Errors attached to synthesized nodes (no source text) fall back to a plain line.
pub fn render_errors(source: &str, errors: &[InferenceError]) -> String {
    use ariadne::{Config, Label, Report, ReportKind, Source};

    let mut out = Vec::new();
    for err in errors {
        if err.span.is_dummy() || err.span.end > source.len() {
            out.extend_from_slice(format!("error: {}\n", err.message).as_bytes());
            continue;
        }
        let report = Report::build(ReportKind::Error, (), err.span.start)
            .with_config(Config::default().with_color(false))
            .with_message("type error")
            .with_label(Label::new(err.span.start..err.span.end).with_message(&err.message))
            .finish();
        if report.write(Source::from(source), &mut out).is_err() {
            out.extend_from_slice(format!("error: {}\n", err.message).as_bytes());
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Machine-readable form of the error list, for editor and CI integrations.
pub fn errors_to_json(errors: &[InferenceError]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(errors)
}
