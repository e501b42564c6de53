use serde::{Serialize, Deserialize};

/// Byte-offset span in source code, plus the 1-based line it starts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end, line: 0 }
    }

    pub fn with_line(start: usize, end: usize, line: u32) -> Self {
        Self { start, end, line }
    }

    /// Span used for nodes synthesized during rewriting that have no source text of their own.
    pub fn dummy() -> Self {
        Self { start: 0, end: 0, line: 0 }
    }

    pub fn is_dummy(&self) -> bool {
        self.start == 0 && self.end == 0 && self.line == 0
    }
}
