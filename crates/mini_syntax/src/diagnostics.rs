//! Diagnostics (errors, warnings) tagged with the pipeline phase and a source span.

use crate::span::Span;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub level: Level,
    pub phase: Phase,
    /// Short machine-readable classification, e.g. `redeclaration`.
    pub kind: String,
    pub message: String,
    pub span: Option<Span>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Error,
    Warning,
}

/// Pipeline stage a diagnostic is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Phase {
    Lexical,
    Syntax,
    Semantic,
    #[serde(rename = "Code Generation")]
    CodeGeneration,
    Runtime,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Lexical => "Lexical",
            Phase::Syntax => "Syntax",
            Phase::Semantic => "Semantic",
            Phase::CodeGeneration => "Code Generation",
            Phase::Runtime => "Runtime",
        })
    }
}

impl Diagnostic {
    pub fn error(
        phase: Phase,
        kind: impl Into<String>,
        message: impl Into<String>,
        span: Option<Span>,
    ) -> Self {
        Self {
            level: Level::Error,
            phase,
            kind: kind.into(),
            message: message.into(),
            span,
        }
    }

    pub fn warning(
        phase: Phase,
        kind: impl Into<String>,
        message: impl Into<String>,
        span: Option<Span>,
    ) -> Self {
        Self {
            level: Level::Warning,
            phase,
            kind: kind.into(),
            message: message.into(),
            span,
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == Level::Error
    }

    pub fn line(&self) -> Option<u32> {
        self.span.map(|s| s.start.line)
    }

    pub fn column(&self) -> Option<u32> {
        self.span.map(|s| s.start.column)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            Level::Error => "error",
            Level::Warning => "warning",
        };
        if let Some(span) = &self.span {
            write!(
                f,
                "{} [{}] at {}: {}",
                level, self.phase, span.start, self.message
            )
        } else {
            write!(f, "{} [{}]: {}", level, self.phase, self.message)
        }
    }
}

/// Host-facing shape: `{ level, phase, kind, message, line?, column? }`.
impl Serialize for Diagnostic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Diagnostic", 6)?;
        s.serialize_field("level", &self.level)?;
        s.serialize_field("phase", &self.phase)?;
        s.serialize_field("kind", &self.kind)?;
        s.serialize_field("message", &self.message)?;
        s.serialize_field("line", &self.line())?;
        s.serialize_field("column", &self.column())?;
        s.end()
    }
}

/// Format a diagnostic with its source line and a caret underline (for printing).
pub fn format_diagnostic(source: &str, file_name: &str, diag: &Diagnostic) -> String {
    let level = match diag.level {
        Level::Error => "error",
        Level::Warning => "warning",
    };
    let span = match &diag.span {
        Some(s) => s,
        None => return format!("{}: {} [{}]: {}", file_name, level, diag.phase, diag.message),
    };
    let line = span.start.line;
    let col = span.start.column;
    let line_content = source
        .lines()
        .nth((line as usize).saturating_sub(1))
        .unwrap_or("");
    let col_end = if span.end.line == line {
        span.end.column
    } else {
        col + 1
    };
    let underline = if col_end > col && (col_end as usize) <= line_content.chars().count() + 1 {
        " ".repeat((col as usize).saturating_sub(1)) + &"^".repeat((col_end - col) as usize)
    } else {
        " ".repeat((col as usize).saturating_sub(1)) + "^"
    };
    let gutter = " ".repeat(line.to_string().len());
    format!(
        "{}:{}:{}: {} [{}]: {}\n  {} | {}\n  {} | {}",
        file_name, line, col, level, diag.phase, diag.message, line, line_content, gutter, underline
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Position;

    #[test]
    fn format_points_at_span() {
        let src = "let x = 1;\nprint(y);";
        let span = Span::new(Position::new(2, 7, 17), Position::new(2, 8, 18));
        let d = Diagnostic::error(Phase::Semantic, "undefined", "undefined identifier 'y'", Some(span));
        let text = format_diagnostic(src, "main.mini", &d);
        assert!(text.starts_with("main.mini:2:7: error [Semantic]: undefined identifier 'y'"));
        assert!(text.contains("2 | print(y);"));
        assert!(text.ends_with("|       ^"));
    }

    #[test]
    fn format_without_span() {
        let d = Diagnostic::error(Phase::Runtime, "division-by-zero", "division by zero", None);
        assert_eq!(
            format_diagnostic("", "main.mini", &d),
            "main.mini: error [Runtime]: division by zero"
        );
        assert_eq!(d.line(), None);
    }
}
