//! Parser: tokens → AST. Recursive descent, one method per precedence level,
//! with panic-mode recovery so one pass reports every syntax error.

use mini_syntax::ast::*;
use mini_syntax::diagnostics::{Diagnostic, Phase};
use mini_syntax::span::Span;
use mini_syntax::token::{Token, TokenKind};
use thiserror::Error;

/// Upper bound on parameters per declaration and arguments per call.
pub const MAX_ARGS: usize = 255;

/// Upper bound on nested statements, parenthesized or unary expressions and
/// chained binary operators. Later passes recurse over the tree, so it stays
/// well inside a default thread stack.
pub const MAX_DEPTH: usize = 128;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum SyntaxError {
    #[error("Expected {expected}, got '{found}'")]
    Expected {
        expected: String,
        found: TokenKind,
        span: Span,
    },
    #[error("'return' outside of a function body")]
    ReturnOutsideFunction { span: Span },
    #[error("function declarations are only allowed at the top level")]
    NestedFunction { span: Span },
    #[error("invalid assignment target")]
    InvalidAssignmentTarget { span: Span },
    #[error("only named functions can be called")]
    InvalidCallee { span: Span },
    #[error("cannot have more than 255 {what}")]
    TooMany { what: &'static str, span: Span },
    #[error("invalid number literal '{text}'")]
    InvalidNumber { text: String, span: Span },
    #[error("const '{name}' must be initialized")]
    MissingInitializer { name: String, span: Span },
    #[error("nesting exceeds {} levels", MAX_DEPTH)]
    TooDeep { span: Span },
}

impl SyntaxError {
    pub fn kind(&self) -> &'static str {
        match self {
            SyntaxError::Expected { .. } => "unexpected-token",
            SyntaxError::ReturnOutsideFunction { .. } => "return-outside-function",
            SyntaxError::NestedFunction { .. } => "nested-function",
            SyntaxError::InvalidAssignmentTarget { .. } => "invalid-assignment-target",
            SyntaxError::InvalidCallee { .. } => "invalid-callee",
            SyntaxError::TooMany { .. } => "too-many-arguments",
            SyntaxError::InvalidNumber { .. } => "invalid-number",
            SyntaxError::MissingInitializer { .. } => "missing-initializer",
            SyntaxError::TooDeep { .. } => "nesting-too-deep",
        }
    }

    pub fn span(&self) -> Span {
        match self {
            SyntaxError::Expected { span, .. }
            | SyntaxError::ReturnOutsideFunction { span }
            | SyntaxError::NestedFunction { span }
            | SyntaxError::InvalidAssignmentTarget { span }
            | SyntaxError::InvalidCallee { span }
            | SyntaxError::TooDeep { span }
            | SyntaxError::TooMany { span, .. }
            | SyntaxError::InvalidNumber { span, .. }
            | SyntaxError::MissingInitializer { span, .. } => *span,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(Phase::Syntax, self.kind(), self.to_string(), Some(self.span()))
    }
}

type PResult<T> = Result<T, SyntaxError>;

/// Parse a token stream. Always returns a program; it is only meaningful
/// when the error list is empty.
pub fn parse(tokens: Vec<Token>) -> (Program, Vec<SyntaxError>) {
    let mut parser = Parser::new(tokens);
    let program = parser.parse_program();
    (program, parser.errors)
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    in_function: bool,
    block_depth: usize,
    /// 1 while parsing a top-level statement.
    statement_depth: usize,
    depth: usize,
    errors: Vec<SyntaxError>,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if !tokens.last().is_some_and(Token::is_eof) {
            let span = tokens.last().map(|t| Span::new(t.span.end, t.span.end));
            tokens.push(Token::new(TokenKind::Eof, "", span.unwrap_or_default()));
        }
        Self {
            tokens,
            pos: 0,
            in_function: false,
            block_depth: 0,
            statement_depth: 0,
            depth: 0,
            errors: Vec::new(),
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn is_at_end(&self) -> bool {
        self.peek().is_eof()
    }

    fn advance(&mut self) -> Token {
        let t = self.peek().clone();
        if !self.is_at_end() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        Err(self.unexpected(format!("'{}'", kind)))
    }

    fn unexpected(&self, expected: impl Into<String>) -> SyntaxError {
        let t = self.peek();
        SyntaxError::Expected {
            expected: expected.into(),
            found: t.kind,
            span: t.span,
        }
    }

    fn span_from(&self, start: Span) -> Span {
        start.merge(self.previous().span)
    }

    /// Runs `parse` one level deeper, or fails once `MAX_DEPTH` is reached.
    fn nested<T>(&mut self, parse: fn(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth >= MAX_DEPTH {
            return Err(SyntaxError::TooDeep {
                span: self.peek().span,
            });
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn identifier(&mut self, what: &str) -> PResult<Identifier> {
        if self.check(TokenKind::Identifier) {
            let t = self.advance();
            return Ok(Identifier::new(t.text, t.span));
        }
        Err(self.unexpected(what))
    }

    /// Skip to a plausible statement boundary: just after a `;`, or just
    /// before a statement keyword or a closing brace.
    fn synchronize(&mut self) {
        // A `}` that closes the enclosing block is left for `block` to consume.
        if !(self.check(TokenKind::RBrace) && self.block_depth > 0) {
            self.advance();
        }
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            let kind = self.peek().kind;
            if kind.starts_statement() || kind == TokenKind::RBrace {
                return;
            }
            self.advance();
        }
    }

    pub fn parse_program(&mut self) -> Program {
        let start = self.peek().span;
        let mut statements = Vec::new();
        while !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }
        Program {
            statements,
            span: self.span_from(start),
        }
    }

    /// One statement with recovery; `None` when it failed to parse.
    fn declaration(&mut self) -> Option<Stmt> {
        match self.statement() {
            Ok(stmt) => Some(stmt),
            Err(e) => {
                self.errors.push(e);
                self.synchronize();
                None
            }
        }
    }

    fn statement(&mut self) -> PResult<Stmt> {
        self.statement_depth += 1;
        let stmt = self.nested(Self::statement_kind);
        self.statement_depth -= 1;
        stmt
    }

    fn statement_kind(&mut self) -> PResult<Stmt> {
        match self.peek().kind {
            TokenKind::Let | TokenKind::Const => self.variable_declaration(),
            TokenKind::Function => self.function_declaration(),
            TokenKind::If => self.if_statement(),
            TokenKind::Return => self.return_statement(),
            TokenKind::Print => self.print_statement(),
            TokenKind::LBrace => Ok(Stmt::Block(self.block()?)),
            _ => self.expression_statement(),
        }
    }

    fn variable_declaration(&mut self) -> PResult<Stmt> {
        let keyword = self.advance();
        let kind = if keyword.kind == TokenKind::Const {
            DeclKind::Const
        } else {
            DeclKind::Let
        };
        let name = self.identifier("variable name")?;
        let initializer = if self.eat(TokenKind::Assign) {
            Some(self.expression()?)
        } else {
            None
        };
        if kind == DeclKind::Const && initializer.is_none() {
            self.errors.push(SyntaxError::MissingInitializer {
                name: name.name.clone(),
                span: name.span,
            });
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(Stmt::VariableDeclaration(VariableDecl {
            span: self.span_from(keyword.span),
            kind,
            name,
            initializer,
        }))
    }

    fn function_declaration(&mut self) -> PResult<Stmt> {
        let keyword = self.advance();
        if self.statement_depth > 1 {
            self.errors
                .push(SyntaxError::NestedFunction { span: keyword.span });
        }
        let name = self.identifier("function name")?;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                if params.len() >= MAX_ARGS {
                    self.errors.push(SyntaxError::TooMany {
                        what: "parameters",
                        span: self.peek().span,
                    });
                }
                params.push(self.identifier("parameter name")?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;

        let enclosing = self.in_function;
        self.in_function = true;
        let body = self.block();
        self.in_function = enclosing;
        let body = body?;

        Ok(Stmt::FunctionDeclaration(FunctionDecl {
            span: self.span_from(keyword.span),
            name,
            params,
            body,
        }))
    }

    fn block(&mut self) -> PResult<Block> {
        let open = self.expect(TokenKind::LBrace)?;
        self.block_depth += 1;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }
        self.block_depth -= 1;
        self.expect(TokenKind::RBrace)?;
        Ok(Block {
            span: self.span_from(open.span),
            statements,
        })
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.advance();
        self.expect(TokenKind::LParen)?;
        let test = self.expression()?;
        self.expect(TokenKind::RParen)?;
        let then = Box::new(self.statement()?);
        let else_ = if self.eat(TokenKind::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            span: self.span_from(keyword.span),
            test,
            then,
            else_,
        })
    }

    fn return_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.advance();
        if !self.in_function {
            self.errors
                .push(SyntaxError::ReturnOutsideFunction { span: keyword.span });
        }
        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::Semicolon)?;
        Ok(Stmt::Return {
            span: self.span_from(keyword.span),
            value,
        })
    }

    fn print_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.advance();
        self.expect(TokenKind::LParen)?;
        let value = self.expression()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Semicolon)?;
        Ok(Stmt::Print {
            span: self.span_from(keyword.span),
            value,
        })
    }

    fn expression_statement(&mut self) -> PResult<Stmt> {
        let start = self.peek().span;
        let expression = self.expression()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(Stmt::Expression {
            span: self.span_from(start),
            expression,
        })
    }

    fn expression(&mut self) -> PResult<Expr> {
        self.nested(Self::assignment)
    }

    fn assignment(&mut self) -> PResult<Expr> {
        let target = self.equality()?;
        if !self.check(TokenKind::Assign) {
            return Ok(target);
        }
        let eq = self.advance();
        let value = self.expression()?;
        match target {
            Expr::Identifier(id) => Ok(Expr::Assign {
                span: id.span.merge(value.span()),
                target: id,
                value: Box::new(value),
            }),
            _ => Err(SyntaxError::InvalidAssignmentTarget { span: eq.span }),
        }
    }

    /// Left-associative loop over one precedence level.
    fn binary_level(
        &mut self,
        ops: &[(TokenKind, BinOp)],
        next: fn(&mut Self) -> PResult<Expr>,
    ) -> PResult<Expr> {
        let mut left = next(self)?;
        // Each operator deepens the left spine of the tree.
        let mut chained = 0;
        let result = loop {
            let Some(&(_, op)) = ops.iter().find(|(k, _)| self.check(*k)) else {
                break Ok(left);
            };
            if self.depth >= MAX_DEPTH {
                break Err(SyntaxError::TooDeep {
                    span: self.peek().span,
                });
            }
            self.depth += 1;
            chained += 1;
            self.advance();
            let right = match next(self) {
                Ok(right) => right,
                Err(e) => break Err(e),
            };
            left = Expr::Binary {
                span: left.span().merge(right.span()),
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        };
        self.depth -= chained;
        result
    }

    fn equality(&mut self) -> PResult<Expr> {
        self.binary_level(
            &[(TokenKind::EqEq, BinOp::Eq), (TokenKind::NotEq, BinOp::Ne)],
            Self::comparison,
        )
    }

    fn comparison(&mut self) -> PResult<Expr> {
        self.binary_level(
            &[
                (TokenKind::Lt, BinOp::Lt),
                (TokenKind::Gt, BinOp::Gt),
                (TokenKind::Le, BinOp::Le),
                (TokenKind::Ge, BinOp::Ge),
            ],
            Self::term,
        )
    }

    fn term(&mut self) -> PResult<Expr> {
        self.binary_level(
            &[(TokenKind::Plus, BinOp::Add), (TokenKind::Minus, BinOp::Sub)],
            Self::factor,
        )
    }

    fn factor(&mut self) -> PResult<Expr> {
        self.binary_level(
            &[(TokenKind::Star, BinOp::Mul), (TokenKind::Slash, BinOp::Div)],
            Self::unary,
        )
    }

    fn unary(&mut self) -> PResult<Expr> {
        let op = match self.peek().kind {
            TokenKind::Bang => UnOp::Not,
            TokenKind::Minus => UnOp::Neg,
            _ => return self.call(),
        };
        let t = self.advance();
        let operand = self.nested(Self::unary)?;
        Ok(Expr::Unary {
            span: t.span.merge(operand.span()),
            op,
            operand: Box::new(operand),
        })
    }

    fn call(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        while self.check(TokenKind::LParen) {
            let callee = match expr {
                Expr::Identifier(id) => id,
                other => return Err(SyntaxError::InvalidCallee { span: other.span() }),
            };
            self.advance();
            let mut args = Vec::new();
            if !self.check(TokenKind::RParen) {
                loop {
                    if args.len() >= MAX_ARGS {
                        self.errors.push(SyntaxError::TooMany {
                            what: "arguments",
                            span: self.peek().span,
                        });
                    }
                    args.push(self.expression()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen)?;
            expr = Expr::Call {
                span: self.span_from(callee.span),
                callee,
                args,
            };
        }
        Ok(expr)
    }

    fn primary(&mut self) -> PResult<Expr> {
        let t = self.peek().clone();
        let value = match t.kind {
            TokenKind::Number => {
                self.advance();
                number_literal(&t)?
            }
            TokenKind::String => {
                self.advance();
                Literal::Str(t.text)
            }
            TokenKind::True => {
                self.advance();
                Literal::Bool(true)
            }
            TokenKind::False => {
                self.advance();
                Literal::Bool(false)
            }
            TokenKind::Identifier => {
                self.advance();
                return Ok(Expr::Identifier(Identifier::new(t.text, t.span)));
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expression()?;
                self.expect(TokenKind::RParen)?;
                return Ok(inner);
            }
            _ => return Err(self.unexpected("expression")),
        };
        Ok(Expr::Literal {
            span: t.span,
            value,
        })
    }
}

fn number_literal(t: &Token) -> PResult<Literal> {
    let invalid = || SyntaxError::InvalidNumber {
        text: t.text.clone(),
        span: t.span,
    };
    if t.text.contains('.') {
        t.text.parse().map(Literal::Float).map_err(|_| invalid())
    } else {
        t.text.parse().map(Literal::Int).map_err(|_| invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_src(src: &str) -> (Program, Vec<SyntaxError>) {
        parse(tokenize(src).tokens)
    }

    fn parse_ok(src: &str) -> Program {
        let (program, errors) = parse_src(src);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        program
    }

    #[test]
    fn precedence_and_associativity() {
        let program = parse_ok("let r = 1 + 2 * 3 - 4;");
        let Stmt::VariableDeclaration(decl) = &program.statements[0] else {
            panic!("expected declaration");
        };
        // ((1 + (2 * 3)) - 4)
        let Some(Expr::Binary { op, left, .. }) = &decl.initializer else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinOp::Sub);
        assert!(matches!(**left, Expr::Binary { op: BinOp::Add, .. }));
    }

    #[test]
    fn functions_calls_and_control_flow() {
        let program = parse_ok(
            "function max(a, b) {\n  if (a > b) return a; else { return b; }\n}\nprint(max(1, -2));",
        );
        assert_eq!(program.statements.len(), 2);
        let Stmt::FunctionDeclaration(f) = &program.statements[0] else {
            panic!("expected function");
        };
        assert_eq!(f.name.name, "max");
        assert_eq!(f.params.len(), 2);
        assert!(matches!(f.body.statements[0], Stmt::If { else_: Some(_), .. }));
        let Stmt::Print { value, .. } = &program.statements[1] else {
            panic!("expected print");
        };
        assert!(matches!(value, Expr::Call { args, .. } if args.len() == 2));
    }

    #[test]
    fn assignment_is_right_associative() {
        let program = parse_ok("let a; let b; a = b = 3;");
        let Stmt::Expression { expression, .. } = &program.statements[2] else {
            panic!("expected expression statement");
        };
        let Expr::Assign { target, value, .. } = expression else {
            panic!("expected assignment");
        };
        assert_eq!(target.name, "a");
        assert!(matches!(**value, Expr::Assign { .. }));
    }

    #[test]
    fn missing_paren_message() {
        let (_, errors) = parse_src("print(x y);");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "Expected ')', got 'IDENTIFIER'");
        assert_eq!(errors[0].span().start.column, 9);
    }

    #[test]
    fn recovers_and_reports_every_statement() {
        let (program, errors) = parse_src("let = 1;\nlet ok = 2;\nprint(;\nprint(ok);");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].span().start.line, 1);
        assert_eq!(errors[1].span().start.line, 3);
        assert_eq!(program.statements.len(), 2);
    }

    #[test]
    fn recovery_inside_blocks_keeps_closing_brace() {
        let (program, errors) = parse_src("function f() { let x = ; }\nprint(1);");
        assert_eq!(errors.len(), 1);
        assert_eq!(program.statements.len(), 2);
    }

    #[test]
    fn return_and_nesting_rules() {
        let (_, errors) = parse_src("return 1;");
        assert!(matches!(errors[..], [SyntaxError::ReturnOutsideFunction { .. }]));

        let (_, errors) = parse_src("function f() { function g() {} }");
        assert!(matches!(errors[..], [SyntaxError::NestedFunction { .. }]));
    }

    #[test]
    fn functions_only_at_top_level() {
        for src in [
            "{ let a = 1; function h() { return a; } }",
            "if (true) function h() { return 1; }",
            "if (false) print(1); else function h() {}",
            "function g() { return 1; } { function g() { return 2; } }",
        ] {
            let (_, errors) = parse_src(src);
            assert!(
                matches!(errors[..], [SyntaxError::NestedFunction { .. }]),
                "{}: {:?}",
                src,
                errors
            );
        }
        parse_ok("function g() { return 1; }
if (true) print(g());");
    }

    #[test]
    fn deep_nesting_is_an_error_not_a_crash() {
        let parens = format!("print({}1{});", "(".repeat(100_000), ")".repeat(100_000));
        let negations = format!("print({}1);", "-".repeat(100_000));
        let blocks = format!("{}{}", "{".repeat(100_000), "}".repeat(100_000));
        let sum = format!("print(1{});", "+1".repeat(100_000));
        for src in [&parens, &negations, &blocks, &sum] {
            let (_, errors) = parse_src(src);
            assert!(!errors.is_empty());
            assert!(errors
                .iter()
                .all(|e| e.kind() == "nesting-too-deep" || e.kind() == "unexpected-token"));
            assert_eq!(errors[0].kind(), "nesting-too-deep");
        }
        let (_, errors) = parse_src(&parens);
        assert_eq!(errors.len(), 1);

        parse_ok(&format!("print({}1{});", "(".repeat(100), ")".repeat(100)));
        parse_ok(&format!("print(1{});", "+1".repeat(100)));
    }

    #[test]
    fn invalid_targets_and_callees() {
        let (_, errors) = parse_src("1 = 2;");
        assert!(matches!(errors[..], [SyntaxError::InvalidAssignmentTarget { .. }]));
        let (_, errors) = parse_src("(1)(2);");
        assert!(matches!(errors[..], [SyntaxError::InvalidCallee { .. }]));
        let (_, errors) = parse_src("const c;");
        assert!(matches!(errors[..], [SyntaxError::MissingInitializer { .. }]));
    }

    #[test]
    fn too_many_arguments() {
        let args: Vec<String> = (0..256).map(|i| i.to_string()).collect();
        let src = format!("f({});", args.join(", "));
        let (_, errors) = parse_src(&src);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), "too-many-arguments");
    }

    #[test]
    fn stray_closing_brace_does_not_loop() {
        let (_, errors) = parse_src("} } print(1);");
        assert_eq!(errors.len(), 2);
    }
}
