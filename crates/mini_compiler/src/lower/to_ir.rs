//! Lower AST to IR. One pass over the program with a scope stack mapping
//! source names to storage; counters live on the generator value.

use mini_syntax::ast::*;
use mini_syntax::ir::{Instr, Operand, Place, Temp, ENTRY_FUNCTION};
use std::collections::HashMap;
use tracing::debug;

/// Lower a program. Top-level variables become globals; function locals,
/// parameters and block-scoped top-level lets become temporaries.
/// Names that do not resolve are treated as globals.
pub fn generate_ir(program: &Program) -> Vec<Instr> {
    let ir = IrGenerator::default().generate(program);
    debug!(instructions = ir.len(), "lowered to IR");
    ir
}

#[derive(Default)]
struct IrGenerator {
    next_temp: u32,
    next_label: u32,
    scopes: Vec<HashMap<String, Place>>,
    /// Nesting depth of function bodies being lowered.
    function_depth: usize,
    /// Instructions of the function currently being lowered.
    current: Vec<Instr>,
    /// Finished user functions, in declaration order.
    functions: Vec<Instr>,
}

impl IrGenerator {
    fn generate(mut self, program: &Program) -> Vec<Instr> {
        self.scopes.push(HashMap::new());
        self.emit(Instr::Func {
            name: ENTRY_FUNCTION.to_string(),
            params: Vec::new(),
        });
        for stmt in &program.statements {
            self.stmt(stmt);
        }
        self.finish_function();
        let mut ir = std::mem::take(&mut self.current);
        ir.append(&mut self.functions);
        ir
    }

    fn emit(&mut self, instr: Instr) {
        self.current.push(instr);
    }

    fn temp(&mut self) -> Temp {
        let t = Temp(self.next_temp);
        self.next_temp += 1;
        t
    }

    /// Fresh `(elseN, endifN)` pair.
    fn if_labels(&mut self) -> (String, String) {
        let n = self.next_label;
        self.next_label += 1;
        (format!("else{}", n), format!("endif{}", n))
    }

    /// Appends `return null` unless the body already ends in a return.
    fn finish_function(&mut self) {
        if !matches!(self.current.last(), Some(Instr::Return { .. })) {
            self.emit(Instr::Return { value: None });
        }
    }

    fn resolve(&self, name: &str) -> Place {
        self.scopes
            .iter()
            .rev()
            .find_map(|s| s.get(name).cloned())
            .unwrap_or_else(|| Place::Global(name.to_string()))
    }

    fn bind(&mut self, name: &str, place: Place) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), place);
        }
    }

    fn block(&mut self, statements: &[Stmt]) {
        self.scopes.push(HashMap::new());
        for s in statements {
            self.stmt(s);
        }
        self.scopes.pop();
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::VariableDeclaration(decl) => {
                let value = match &decl.initializer {
                    Some(init) => self.expr(init),
                    None => Operand::Null,
                };
                let place = if self.function_depth == 0 && self.scopes.len() == 1 {
                    Place::Global(decl.name.name.clone())
                } else {
                    Place::Temp(self.temp())
                };
                self.bind(&decl.name.name, place.clone());
                self.emit(Instr::Copy {
                    dest: place,
                    src: value,
                });
            }
            Stmt::FunctionDeclaration(f) => self.function(f),
            Stmt::Block(b) => self.block(&b.statements),
            Stmt::If {
                test, then, else_, ..
            } => {
                let cond = self.expr(test);
                let (else_label, end_label) = self.if_labels();
                self.emit(Instr::JumpIfFalse {
                    cond,
                    label: else_label.clone(),
                });
                self.stmt(then);
                self.emit(Instr::Jump {
                    label: end_label.clone(),
                });
                self.emit(Instr::Label { label: else_label });
                if let Some(alt) = else_ {
                    self.stmt(alt);
                }
                self.emit(Instr::Label { label: end_label });
            }
            Stmt::Return { value, .. } => {
                let value = value.as_ref().map(|v| self.expr(v));
                self.emit(Instr::Return { value });
            }
            Stmt::Print { value, .. } => {
                let value = self.expr(value);
                self.emit(Instr::Print { value });
            }
            Stmt::Expression { expression, .. } => {
                self.expr(expression);
            }
        }
    }

    fn function(&mut self, f: &FunctionDecl) {
        let outer = std::mem::take(&mut self.current);
        self.function_depth += 1;
        self.scopes.push(HashMap::new());

        let params: Vec<Temp> = f.params.iter().map(|_| self.temp()).collect();
        for (p, t) in f.params.iter().zip(&params) {
            self.bind(&p.name, Place::Temp(*t));
        }
        self.emit(Instr::Func {
            name: f.name.name.clone(),
            params,
        });
        for s in &f.body.statements {
            self.stmt(s);
        }
        self.finish_function();

        self.scopes.pop();
        self.function_depth -= 1;
        let body = std::mem::replace(&mut self.current, outer);
        self.functions.extend(body);
    }

    fn expr(&mut self, expr: &Expr) -> Operand {
        match expr {
            Expr::Literal { value, .. } => match value {
                Literal::Int(n) => Operand::Int(*n),
                Literal::Float(x) => Operand::Float(*x),
                Literal::Bool(b) => Operand::Bool(*b),
                Literal::Str(s) => Operand::Str(s.clone()),
            },
            Expr::Identifier(id) => self.resolve(&id.name).to_operand(),
            Expr::Binary {
                op, left, right, ..
            } => {
                let lhs = self.operand_before(left, std::slice::from_ref(&**right));
                let rhs = self.expr(right);
                let dest = self.temp();
                self.emit(Instr::Binary {
                    op: *op,
                    dest,
                    lhs,
                    rhs,
                });
                Operand::Temp(dest)
            }
            Expr::Unary { op, operand, .. } => {
                let operand = self.expr(operand);
                let dest = self.temp();
                self.emit(Instr::Unary {
                    op: *op,
                    dest,
                    operand,
                });
                Operand::Temp(dest)
            }
            Expr::Call { callee, args, .. } => {
                let mut operands = Vec::with_capacity(args.len());
                for (i, a) in args.iter().enumerate() {
                    operands.push(self.operand_before(a, &args[i + 1..]));
                }
                let dest = self.temp();
                self.emit(Instr::Call {
                    dest,
                    function: callee.name.clone(),
                    args: operands,
                });
                Operand::Temp(dest)
            }
            Expr::Assign { target, value, .. } => {
                let src = self.expr(value);
                let dest = self.resolve(&target.name);
                self.emit(Instr::Copy {
                    dest: dest.clone(),
                    src,
                });
                dest.to_operand()
            }
        }
    }

    /// Lowers `expr`, copying a variable read into a fresh temporary when a
    /// later sibling could reassign that variable before the read is used.
    fn operand_before(&mut self, expr: &Expr, later: &[Expr]) -> Operand {
        let operand = self.expr(expr);
        let is_variable = matches!(expr, Expr::Identifier(_) | Expr::Assign { .. });
        if is_variable && later.iter().any(has_side_effects) {
            let t = self.temp();
            self.emit(Instr::Copy {
                dest: Place::Temp(t),
                src: operand,
            });
            return Operand::Temp(t);
        }
        operand
    }
}

/// Whether evaluating `expr` can write to a variable.
fn has_side_effects(expr: &Expr) -> bool {
    match expr {
        Expr::Call { .. } | Expr::Assign { .. } => true,
        Expr::Binary { left, right, .. } => has_side_effects(left) || has_side_effects(right),
        Expr::Unary { operand, .. } => has_side_effects(operand),
        Expr::Literal { .. } | Expr::Identifier(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use mini_syntax::ir::listing;

    fn lower(src: &str) -> String {
        let (program, errors) = parse(tokenize(src).tokens);
        assert!(errors.is_empty(), "{:?}", errors);
        listing(&generate_ir(&program))
    }

    #[test]
    fn top_level_arithmetic() {
        assert_eq!(
            lower("let x = 10; let y = 20; let result = x + y * 2; print(result);"),
            "func <main>()\n  @x = 10\n  @y = 20\n  t0 = @y * 2\n  t1 = @x + t0\n  @result = t1\n  print @result\n  return null\n"
        );
    }

    #[test]
    fn if_else_shape() {
        assert_eq!(
            lower("let a = 1; if (a < 2) print(1); else print(2);"),
            "func <main>()\n  @a = 1\n  t0 = @a < 2\n  jump-if-false t0, else0\n  print 1\n  jump endif0\nelse0:\n  print 2\nendif0:\n  return null\n"
        );
    }

    #[test]
    fn functions_follow_entry_and_get_implicit_return() {
        let text = lower("function add(a, b) { let s = a + b; print(s); }\nprint(add(1, 2));");
        assert_eq!(
            text,
            "func <main>()\n  t4 = call add(1, 2)\n  print t4\n  return null\nfunc add(t0, t1)\n  t2 = t0 + t1\n  t3 = t2\n  print t3\n  return null\n"
        );
    }

    #[test]
    fn explicit_return_is_not_duplicated() {
        let text = lower("function one() { return 1; }");
        assert!(text.ends_with("func one()\n  return 1\n"));
    }

    #[test]
    fn block_scoped_lets_use_temporaries() {
        let text = lower("let x = 1; { let x = 2; print(x); } print(x);");
        assert!(text.contains("  t0 = 2\n  print t0\n"));
        assert!(text.contains("  print @x\n"));
    }

    #[test]
    fn variable_read_is_snapshotted_before_a_call() {
        let text = lower("let x = 1; function bump() { x = x + 1; return x; } print(x + bump());");
        assert!(text.contains("  t1 = @x\n  t2 = call bump()\n  t3 = t1 + t2\n"), "{}", text);
    }

    #[test]
    fn counters_are_per_generator() {
        let src = "if (true) print(1);";
        assert_eq!(lower(src), lower(src));
    }
}
