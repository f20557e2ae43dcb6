use mini_runtime::Execution;
use mini_syntax::ast::Program;
use mini_syntax::diagnostics::{Diagnostic, Phase};
use mini_syntax::ir::Instr;
use mini_syntax::token::Token;
use serde::Serialize;

use crate::semantic::SymbolRecord;

/// Everything one pipeline run produced. Later fields stay empty when an
/// earlier phase reported errors.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CompilationResult {
    pub tokens: Vec<Token>,
    /// Indented AST dump.
    pub ast: String,
    #[serde(skip)]
    pub program: Option<Program>,
    /// Flat `{ op, dest, args, label, function, params }` records.
    pub ir: Vec<Instr>,
    pub ir_listing: String,
    pub symbols: Vec<SymbolRecord>,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assembly: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<Execution>,
}

impl CompilationResult {
    /// Diagnostics in report order: errors, then warnings.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.errors.iter().chain(self.warnings.iter())
    }

    /// Lexing, parsing, analysis and lowering all passed, whatever the
    /// backend reported afterwards.
    pub fn frontend_succeeded(&self) -> bool {
        !self.ir.is_empty()
            && self
                .errors
                .iter()
                .all(|e| e.phase == Phase::CodeGeneration)
    }
}
