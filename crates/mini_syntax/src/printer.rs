//! Source pretty-printer and indented AST dump.

use crate::ast::*;
use std::fmt::Write;

const INDENT: &str = "    ";

/// Render a program back to source. Parenthesizes only where precedence
/// requires it, so re-parsing the output yields the same tree.
pub fn pretty(program: &Program) -> String {
    let mut out = String::new();
    for stmt in &program.statements {
        write_stmt(&mut out, stmt, 0);
        out.push('\n');
    }
    out
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn write_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    indent(out, depth);
    write_stmt_inline(out, stmt, depth);
}

/// Writes a statement assuming the cursor is already indented.
fn write_stmt_inline(out: &mut String, stmt: &Stmt, depth: usize) {
    match stmt {
        Stmt::VariableDeclaration(decl) => {
            let _ = write!(out, "{} {}", decl.kind.keyword(), decl.name.name);
            if let Some(init) = &decl.initializer {
                out.push_str(" = ");
                write_expr(out, init);
            }
            out.push(';');
        }
        Stmt::FunctionDeclaration(f) => {
            let params: Vec<&str> = f.params.iter().map(|p| p.name.as_str()).collect();
            let _ = write!(out, "function {}({}) ", f.name.name, params.join(", "));
            write_block(out, &f.body, depth);
        }
        Stmt::Block(block) => write_block(out, block, depth),
        Stmt::If {
            test, then, else_, ..
        } => {
            out.push_str("if (");
            write_expr(out, test);
            out.push_str(") ");
            // An else-less inner `if` would capture our `else` when re-parsed.
            let dangling = else_.is_some() && matches!(**then, Stmt::If { else_: None, .. });
            if dangling {
                out.push_str("{\n");
                write_stmt(out, then, depth + 1);
                out.push('\n');
                indent(out, depth);
                out.push('}');
            } else {
                write_stmt_inline(out, then, depth);
            }
            if let Some(alt) = else_ {
                out.push_str(" else ");
                write_stmt_inline(out, alt, depth);
            }
        }
        Stmt::Return { value, .. } => {
            out.push_str("return");
            if let Some(v) = value {
                out.push(' ');
                write_expr(out, v);
            }
            out.push(';');
        }
        Stmt::Print { value, .. } => {
            out.push_str("print(");
            write_expr(out, value);
            out.push_str(");");
        }
        Stmt::Expression { expression, .. } => {
            write_expr(out, expression);
            out.push(';');
        }
    }
}

fn write_block(out: &mut String, block: &Block, depth: usize) {
    if block.statements.is_empty() {
        out.push_str("{}");
        return;
    }
    out.push_str("{\n");
    for s in &block.statements {
        write_stmt(out, s, depth + 1);
        out.push('\n');
    }
    indent(out, depth);
    out.push('}');
}

const PREC_ASSIGN: u8 = 1;
const PREC_UNARY: u8 = 6;
const PREC_PRIMARY: u8 = 7;

fn binop_precedence(op: BinOp) -> u8 {
    match op {
        BinOp::Eq | BinOp::Ne => 2,
        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => 3,
        BinOp::Add | BinOp::Sub => 4,
        BinOp::Mul | BinOp::Div => 5,
    }
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Assign { .. } => PREC_ASSIGN,
        Expr::Binary { op, .. } => binop_precedence(*op),
        Expr::Unary { .. } => PREC_UNARY,
        Expr::Call { .. } | Expr::Literal { .. } | Expr::Identifier(_) => PREC_PRIMARY,
    }
}

fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Binary {
            op, left, right, ..
        } => {
            let p = binop_precedence(*op);
            write_operand(out, left, precedence(left) < p);
            let _ = write!(out, " {} ", op);
            write_operand(out, right, precedence(right) <= p);
        }
        Expr::Unary { op, operand, .. } => {
            out.push_str(op.symbol());
            write_operand(out, operand, precedence(operand) < PREC_UNARY);
        }
        Expr::Call { callee, args, .. } => {
            out.push_str(&callee.name);
            out.push('(');
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, a);
            }
            out.push(')');
        }
        Expr::Assign { target, value, .. } => {
            let _ = write!(out, "{} = ", target.name);
            write_expr(out, value);
        }
        Expr::Literal { value, .. } => {
            let _ = write!(out, "{}", value);
        }
        Expr::Identifier(id) => out.push_str(&id.name),
    }
}

fn write_operand(out: &mut String, expr: &Expr, parens: bool) {
    if parens {
        out.push('(');
        write_expr(out, expr);
        out.push(')');
    } else {
        write_expr(out, expr);
    }
}

/// Indented tree dump: one node per line with its start position.
pub fn dump(program: &Program) -> String {
    let mut out = String::from("Program\n");
    for stmt in &program.statements {
        dump_stmt(&mut out, stmt, 1);
    }
    out
}

fn line(out: &mut String, depth: usize, text: std::fmt::Arguments<'_>) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    let _ = out.write_fmt(text);
    out.push('\n');
}

fn dump_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    let pos = stmt.span().start;
    match stmt {
        Stmt::VariableDeclaration(decl) => {
            line(
                out,
                depth,
                format_args!(
                    "VariableDeclaration {} {} ({})",
                    decl.kind.keyword(),
                    decl.name.name,
                    pos
                ),
            );
            if let Some(init) = &decl.initializer {
                dump_expr(out, init, depth + 1);
            }
        }
        Stmt::FunctionDeclaration(f) => {
            let params: Vec<&str> = f.params.iter().map(|p| p.name.as_str()).collect();
            line(
                out,
                depth,
                format_args!(
                    "FunctionDeclaration {}({}) ({})",
                    f.name.name,
                    params.join(", "),
                    pos
                ),
            );
            dump_block(out, &f.body, depth + 1);
        }
        Stmt::Block(b) => dump_block(out, b, depth),
        Stmt::If {
            test, then, else_, ..
        } => {
            line(out, depth, format_args!("IfStatement ({})", pos));
            dump_expr(out, test, depth + 1);
            dump_stmt(out, then, depth + 1);
            if let Some(alt) = else_ {
                line(out, depth + 1, format_args!("Else"));
                dump_stmt(out, alt, depth + 2);
            }
        }
        Stmt::Return { value, .. } => {
            line(out, depth, format_args!("ReturnStatement ({})", pos));
            if let Some(v) = value {
                dump_expr(out, v, depth + 1);
            }
        }
        Stmt::Print { value, .. } => {
            line(out, depth, format_args!("PrintStatement ({})", pos));
            dump_expr(out, value, depth + 1);
        }
        Stmt::Expression { expression, .. } => {
            line(out, depth, format_args!("ExpressionStatement ({})", pos));
            dump_expr(out, expression, depth + 1);
        }
    }
}

fn dump_block(out: &mut String, block: &Block, depth: usize) {
    line(out, depth, format_args!("Block ({})", block.span.start));
    for s in &block.statements {
        dump_stmt(out, s, depth + 1);
    }
}

fn dump_expr(out: &mut String, expr: &Expr, depth: usize) {
    let pos = expr.span().start;
    match expr {
        Expr::Binary {
            op, left, right, ..
        } => {
            line(out, depth, format_args!("BinaryExpression {} ({})", op, pos));
            dump_expr(out, left, depth + 1);
            dump_expr(out, right, depth + 1);
        }
        Expr::Unary { op, operand, .. } => {
            line(out, depth, format_args!("UnaryExpression {} ({})", op, pos));
            dump_expr(out, operand, depth + 1);
        }
        Expr::Call { callee, args, .. } => {
            line(
                out,
                depth,
                format_args!("CallExpression {} ({})", callee.name, pos),
            );
            for a in args {
                dump_expr(out, a, depth + 1);
            }
        }
        Expr::Assign { target, value, .. } => {
            line(
                out,
                depth,
                format_args!("AssignmentExpression {} ({})", target.name, pos),
            );
            dump_expr(out, value, depth + 1);
        }
        Expr::Literal { value, .. } => {
            line(out, depth, format_args!("Literal {} ({})", value, pos));
        }
        Expr::Identifier(id) => {
            line(out, depth, format_args!("Identifier {} ({})", id.name, pos));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Span;

    fn num(n: i64) -> Expr {
        Expr::Literal {
            span: Span::default(),
            value: Literal::Int(n),
        }
    }

    fn bin(op: BinOp, l: Expr, r: Expr) -> Expr {
        Expr::Binary {
            span: Span::default(),
            op,
            left: Box::new(l),
            right: Box::new(r),
        }
    }

    #[test]
    fn parenthesizes_by_precedence() {
        let e = bin(BinOp::Mul, bin(BinOp::Add, num(1), num(2)), num(3));
        let mut s = String::new();
        write_expr(&mut s, &e);
        assert_eq!(s, "(1 + 2) * 3");

        let e = bin(BinOp::Sub, num(1), bin(BinOp::Sub, num(2), num(3)));
        let mut s = String::new();
        write_expr(&mut s, &e);
        assert_eq!(s, "1 - (2 - 3)");

        let e = bin(BinOp::Add, num(1), bin(BinOp::Mul, num(2), num(3)));
        let mut s = String::new();
        write_expr(&mut s, &e);
        assert_eq!(s, "1 + 2 * 3");
    }

    #[test]
    fn pretty_prints_statements() {
        let program = Program {
            span: Span::default(),
            statements: vec![
                Stmt::VariableDeclaration(VariableDecl {
                    span: Span::default(),
                    kind: DeclKind::Let,
                    name: Identifier::new("x", Span::default()),
                    initializer: Some(num(1)),
                }),
                Stmt::Print {
                    span: Span::default(),
                    value: Expr::Identifier(Identifier::new("x", Span::default())),
                },
            ],
        };
        assert_eq!(pretty(&program), "let x = 1;\nprint(x);\n");
        let tree = dump(&program);
        assert!(tree.starts_with("Program\n  VariableDeclaration let x (1:1)\n    Literal 1 (1:1)\n"));
    }
}
