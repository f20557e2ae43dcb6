//! Semantic analysis: scope-stack symbol resolution over the AST.
//!
//! Top-level functions are hoisted into the global scope before the walk, so
//! they may be called ahead of their declaration. Everything else must be
//! declared before use. The analyzer is rebuilt for every call, so analyzing
//! the same program twice gives identical results.

use mini_syntax::ast::*;
use mini_syntax::diagnostics::{Diagnostic, Phase};
use mini_syntax::span::{Position, Span};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::trace;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum SemanticError {
    #[error("'{name}' is already declared in this scope (previous declaration at {previous})")]
    Redeclaration {
        name: String,
        span: Span,
        previous: Position,
    },
    #[error("undefined identifier '{name}'")]
    Undefined { name: String, span: Span },
    #[error("'{name}' is not a function")]
    NotAFunction { name: String, span: Span },
    #[error("function '{name}' cannot be used as a value")]
    FunctionAsValue { name: String, span: Span },
    #[error("function '{name}' expects {expected} arguments, got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },
    #[error("cannot assign to constant '{name}'")]
    AssignToConstant { name: String, span: Span },
    #[error("cannot assign to function '{name}'")]
    AssignToFunction { name: String, span: Span },
}

impl SemanticError {
    pub fn kind(&self) -> &'static str {
        match self {
            SemanticError::Redeclaration { .. } => "redeclaration",
            SemanticError::Undefined { .. } => "undefined-identifier",
            SemanticError::NotAFunction { .. } => "not-a-function",
            SemanticError::FunctionAsValue { .. } => "function-as-value",
            SemanticError::ArityMismatch { .. } => "arity-mismatch",
            SemanticError::AssignToConstant { .. } => "assign-to-constant",
            SemanticError::AssignToFunction { .. } => "assign-to-function",
        }
    }

    pub fn span(&self) -> Span {
        match self {
            SemanticError::Redeclaration { span, .. }
            | SemanticError::Undefined { span, .. }
            | SemanticError::NotAFunction { span, .. }
            | SemanticError::FunctionAsValue { span, .. }
            | SemanticError::ArityMismatch { span, .. }
            | SemanticError::AssignToConstant { span, .. }
            | SemanticError::AssignToFunction { span, .. } => *span,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(
            Phase::Semantic,
            self.kind(),
            self.to_string(),
            Some(self.span()),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum SemanticWarning {
    #[error("variable '{name}' is declared but never used")]
    UnusedVariable { name: String, span: Span },
    #[error("parameter '{name}' is never used")]
    UnusedParameter { name: String, span: Span },
}

impl SemanticWarning {
    pub fn to_diagnostic(&self) -> Diagnostic {
        let (kind, span) = match self {
            SemanticWarning::UnusedVariable { span, .. } => ("unused-variable", span),
            SemanticWarning::UnusedParameter { span, .. } => ("unused-parameter", span),
        };
        Diagnostic::warning(Phase::Semantic, kind, self.to_string(), Some(*span))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SymbolKind {
    Variable,
    Constant,
    Function,
}

/// Flat, owned view of one declaration for symbol-table dumps.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SymbolRecord {
    pub name: String,
    pub kind: SymbolKind,
    pub scope_depth: usize,
    pub declared_order: usize,
    pub line: u32,
    pub column: u32,
    pub used: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Analysis {
    pub errors: Vec<SemanticError>,
    pub warnings: Vec<SemanticWarning>,
    pub symbols: Vec<SymbolRecord>,
}

impl Analysis {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The AST node a symbol was declared by.
#[derive(Clone, Copy, Debug)]
enum SymbolNode<'a> {
    Variable(&'a Identifier),
    Parameter(&'a Identifier),
    Function(&'a FunctionDecl),
}

#[derive(Clone, Copy, Debug)]
struct SymbolEntry<'a> {
    kind: SymbolKind,
    /// Index into `Analyzer::records`; also the declaration order.
    declared_order: usize,
    node: SymbolNode<'a>,
}

impl<'a> SymbolEntry<'a> {
    fn position(&self) -> Position {
        match self.node {
            SymbolNode::Variable(id) | SymbolNode::Parameter(id) => id.span.start,
            SymbolNode::Function(f) => f.name.span.start,
        }
    }
}

type Scope<'a> = HashMap<&'a str, SymbolEntry<'a>>;

pub fn analyze(program: &Program) -> Analysis {
    let mut analyzer = Analyzer::default();
    analyzer.run(program);
    Analysis {
        errors: analyzer.errors,
        warnings: analyzer.warnings,
        symbols: analyzer.records,
    }
}

#[derive(Default)]
struct Analyzer<'a> {
    scopes: Vec<Scope<'a>>,
    records: Vec<SymbolRecord>,
    errors: Vec<SemanticError>,
    warnings: Vec<SemanticWarning>,
}

impl<'a> Analyzer<'a> {
    fn run(&mut self, program: &'a Program) {
        self.push_scope();
        for stmt in &program.statements {
            if let Stmt::FunctionDeclaration(f) = stmt {
                self.declare(&f.name, SymbolKind::Function, SymbolNode::Function(f));
            }
        }
        for stmt in &program.statements {
            self.stmt(stmt);
        }
        self.pop_scope();
    }

    fn push_scope(&mut self) {
        self.scopes.push(Scope::new());
    }

    /// Pops the innermost scope, warning about variables nothing read.
    fn pop_scope(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };
        let mut entries: Vec<SymbolEntry<'a>> = scope.into_values().collect();
        entries.sort_by_key(|e| e.declared_order);
        for entry in entries {
            if self.records[entry.declared_order].used {
                continue;
            }
            match entry.node {
                SymbolNode::Variable(id) => self.warnings.push(SemanticWarning::UnusedVariable {
                    name: id.name.clone(),
                    span: id.span,
                }),
                SymbolNode::Parameter(id) => {
                    self.warnings.push(SemanticWarning::UnusedParameter {
                        name: id.name.clone(),
                        span: id.span,
                    })
                }
                SymbolNode::Function(_) => {}
            }
        }
    }

    fn declare(&mut self, name: &'a Identifier, kind: SymbolKind, node: SymbolNode<'a>) {
        let depth = self.scopes.len().saturating_sub(1);
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        if let Some(existing) = scope.get(name.name.as_str()) {
            self.errors.push(SemanticError::Redeclaration {
                name: name.name.clone(),
                span: name.span,
                previous: existing.position(),
            });
            return;
        }
        let declared_order = self.records.len();
        scope.insert(
            name.name.as_str(),
            SymbolEntry {
                kind,
                declared_order,
                node,
            },
        );
        trace!(name = %name.name, ?kind, depth, "declare");
        self.records.push(SymbolRecord {
            name: name.name.clone(),
            kind,
            scope_depth: depth,
            declared_order,
            line: name.span.start.line,
            column: name.span.start.column,
            used: false,
        });
    }

    /// Innermost-to-outermost lookup.
    fn resolve(&self, name: &str) -> Option<SymbolEntry<'a>> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn mark_used(&mut self, entry: &SymbolEntry<'a>) {
        self.records[entry.declared_order].used = true;
    }

    fn stmt(&mut self, stmt: &'a Stmt) {
        match stmt {
            Stmt::VariableDeclaration(decl) => {
                if let Some(init) = &decl.initializer {
                    self.expr(init);
                }
                let kind = match decl.kind {
                    DeclKind::Let => SymbolKind::Variable,
                    DeclKind::Const => SymbolKind::Constant,
                };
                self.declare(&decl.name, kind, SymbolNode::Variable(&decl.name));
            }
            Stmt::FunctionDeclaration(f) => {
                // Declared by the hoisting pass; the parser keeps functions top-level.
                self.push_scope();
                for p in &f.params {
                    self.declare(p, SymbolKind::Variable, SymbolNode::Parameter(p));
                }
                for s in &f.body.statements {
                    self.stmt(s);
                }
                self.pop_scope();
            }
            Stmt::Block(block) => {
                self.push_scope();
                for s in &block.statements {
                    self.stmt(s);
                }
                self.pop_scope();
            }
            Stmt::If {
                test, then, else_, ..
            } => {
                self.expr(test);
                self.stmt(then);
                if let Some(alt) = else_ {
                    self.stmt(alt);
                }
            }
            Stmt::Return { value, .. } => {
                if let Some(v) = value {
                    self.expr(v);
                }
            }
            Stmt::Print { value, .. } => self.expr(value),
            Stmt::Expression { expression, .. } => self.expr(expression),
        }
    }

    fn expr(&mut self, expr: &'a Expr) {
        match expr {
            Expr::Binary { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::Unary { operand, .. } => self.expr(operand),
            Expr::Literal { .. } => {}
            Expr::Identifier(id) => match self.resolve(&id.name) {
                None => self.undefined(id),
                Some(entry) => {
                    self.mark_used(&entry);
                    if entry.kind == SymbolKind::Function {
                        self.errors.push(SemanticError::FunctionAsValue {
                            name: id.name.clone(),
                            span: id.span,
                        });
                    }
                }
            },
            Expr::Call { callee, args, .. } => {
                match self.resolve(&callee.name) {
                    None => self.undefined(callee),
                    Some(entry) => {
                        self.mark_used(&entry);
                        match entry.node {
                            SymbolNode::Function(f) if f.params.len() != args.len() => {
                                self.errors.push(SemanticError::ArityMismatch {
                                    name: callee.name.clone(),
                                    expected: f.params.len(),
                                    found: args.len(),
                                    span: callee.span,
                                })
                            }
                            SymbolNode::Function(_) => {}
                            SymbolNode::Variable(_) | SymbolNode::Parameter(_) => {
                                self.errors.push(SemanticError::NotAFunction {
                                    name: callee.name.clone(),
                                    span: callee.span,
                                })
                            }
                        }
                    }
                }
                for a in args {
                    self.expr(a);
                }
            }
            Expr::Assign { target, value, .. } => {
                self.expr(value);
                match self.resolve(&target.name) {
                    None => self.undefined(target),
                    Some(entry) => match entry.kind {
                        SymbolKind::Variable => {}
                        SymbolKind::Constant => {
                            self.errors.push(SemanticError::AssignToConstant {
                                name: target.name.clone(),
                                span: target.span,
                            })
                        }
                        SymbolKind::Function => {
                            self.errors.push(SemanticError::AssignToFunction {
                                name: target.name.clone(),
                                span: target.span,
                            })
                        }
                    },
                }
            }
        }
    }

    fn undefined(&mut self, id: &Identifier) {
        self.errors.push(SemanticError::Undefined {
            name: id.name.clone(),
            span: id.span,
        });
    }
}
