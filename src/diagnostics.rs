use std::fmt;

use crate::token::Position;

/// A compile-time problem reported by the scanner, parser, or a semantic
/// pass. Diagnostics never abort the surrounding pass; callers inspect the
/// accumulated list and decide whether execution may proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub pos: Position,
    pub is_warning: bool,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, pos: Position) -> Self {
        Self {
            message: message.into(),
            pos,
            is_warning: false,
        }
    }

    pub fn warning(message: impl Into<String>, pos: Position) -> Self {
        Self {
            message: message.into(),
            pos,
            is_warning: true,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = if self.is_warning { "warning" } else { "error" };
        write!(f, "@{}: {severity}: {}", self.pos, self.message)
    }
}

/// Count of error-severity diagnostics in a list.
pub fn error_count(diagnostics: &[Diagnostic]) -> usize {
    diagnostics.iter().filter(|d| !d.is_warning).count()
}
