//! Assembly text emission: module layout plus per-function lowering of IR.
//!
//! Each function body is emitted into its own buffer first; the prologue is
//! written afterwards, once the spill area and the callee-saved registers the
//! body touched are known.

use crate::regalloc::{last_uses, Loc, RegisterAllocator, ARG_REGS};
use crate::CodegenError;
use mini_syntax::{BinOp, Instr, Operand, Place, Temp, UnOp, ENTRY_FUNCTION};
use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Write};
use tracing::{debug, trace};

const FMT_INT: &str = ".Lfmt_int";
const FMT_STR: &str = ".Lfmt_str";

macro_rules! asm {
    ($em:expr, $($arg:tt)*) => {
        $em.line(format_args!($($arg)*))
    };
}

/// One function's slice of the IR (header excluded).
struct FunctionIr<'ir> {
    name: &'ir str,
    params: &'ir [Temp],
    body: &'ir [Instr],
}

fn split_functions(ir: &[Instr]) -> Vec<FunctionIr<'_>> {
    let mut starts: Vec<usize> = ir
        .iter()
        .enumerate()
        .filter(|(_, i)| matches!(i, Instr::Func { .. }))
        .map(|(i, _)| i)
        .collect();
    let mut functions = Vec::new();
    // Leading instructions without a header run as the entry function.
    let first = starts.first().copied().unwrap_or(ir.len());
    if first > 0 {
        functions.push(FunctionIr {
            name: ENTRY_FUNCTION,
            params: &[],
            body: &ir[..first],
        });
    }
    starts.push(ir.len());
    for w in starts.windows(2) {
        if let Instr::Func { name, params } = &ir[w[0]] {
            functions.push(FunctionIr {
                name: name.as_str(),
                params: params.as_slice(),
                body: &ir[w[0] + 1..w[1]],
            });
        }
    }
    functions
}

pub(crate) fn function_symbol(name: &str) -> String {
    if name == ENTRY_FUNCTION {
        "main".to_string()
    } else {
        format!("fn_{}", name)
    }
}

fn global_symbol(name: &str) -> String {
    format!("gv_{}", name)
}

#[derive(Default)]
struct StringTable {
    entries: Vec<String>,
    index: HashMap<String, usize>,
}

impl StringTable {
    fn intern(&mut self, s: &str) -> usize {
        if let Some(&i) = self.index.get(s) {
            return i;
        }
        let i = self.entries.len();
        self.entries.push(s.to_string());
        self.index.insert(s.to_string(), i);
        i
    }
}

/// Escape for a GAS `.string` directive.
fn asm_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_ascii_control() => {
                let _ = write!(out, "\\{:03o}", c as u8);
            }
            c => out.push(c),
        }
    }
    out
}

pub(crate) fn emit_module(ir: &[Instr], registers: usize) -> Result<String, CodegenError> {
    let functions = split_functions(ir);
    debug!(functions = functions.len(), registers, "x86-64 codegen");

    let mut globals = BTreeSet::new();
    for instr in ir {
        if let Instr::Copy {
            dest: Place::Global(name),
            ..
        } = instr
        {
            globals.insert(name.as_str());
        }
        for op in instr.operands() {
            if let Operand::Global(name) = op {
                globals.insert(name.as_str());
            }
        }
    }

    let mut strings = StringTable::default();
    let mut text = String::new();
    for f in &functions {
        let emitter = FunctionEmitter::new(f, registers, &mut strings);
        text.push_str(&emitter.lower(f)?);
    }

    let mut out = String::new();
    out.push_str("\t.intel_syntax noprefix\n");
    out.push_str("\t.section .rodata\n");
    let _ = writeln!(out, "{}:\n\t.string \"%lld\\n\"", FMT_INT);
    let _ = writeln!(out, "{}:\n\t.string \"%s\\n\"", FMT_STR);
    for (i, s) in strings.entries.iter().enumerate() {
        let _ = writeln!(out, ".LC{}:\n\t.string \"{}\"", i, asm_string(s));
    }
    if !globals.is_empty() {
        out.push_str("\t.data\n\t.p2align 3\n");
        for g in &globals {
            let _ = writeln!(out, "{}:\n\t.quad 0", global_symbol(g));
        }
    }
    out.push_str("\t.text\n\t.globl main\n");
    out.push_str(&text);
    out.push_str("\t.section .note.GNU-stack,\"\",@progbits\n");
    Ok(out)
}

struct FunctionEmitter<'a> {
    name: &'a str,
    symbol: String,
    ra: RegisterAllocator,
    last_use: HashMap<Temp, usize>,
    strings: &'a mut StringTable,
    body: String,
}

impl<'a> FunctionEmitter<'a> {
    fn new(f: &FunctionIr<'a>, registers: usize, strings: &'a mut StringTable) -> Self {
        Self {
            name: f.name,
            symbol: function_symbol(f.name),
            ra: RegisterAllocator::new(registers),
            last_use: last_uses(f.body),
            strings,
            body: String::new(),
        }
    }

    fn line(&mut self, args: fmt::Arguments<'_>) {
        self.body.push('\t');
        let _ = self.body.write_fmt(args);
        self.body.push('\n');
    }

    fn lower(mut self, f: &FunctionIr<'_>) -> Result<String, CodegenError> {
        if f.params.len() > ARG_REGS.len() {
            return Err(CodegenError::TooManyParameters {
                function: self.name.to_string(),
                count: f.params.len(),
            });
        }
        for (param, reg) in f.params.iter().zip(ARG_REGS) {
            if self.last_use.contains_key(param) {
                let loc = self.ra.allocate(*param);
                asm!(self, "mov {}, {}", loc, reg);
            }
        }

        let mut i = 0;
        while i < f.body.len() {
            trace!(function = self.name, instr = %f.body[i], "lower");
            i += self.instr(f.body, i)?;
        }
        if !matches!(f.body.last(), Some(Instr::Return { .. })) {
            asm!(self, "xor eax, eax");
        }
        Ok(self.finish())
    }

    fn finish(self) -> String {
        let spills = self.ra.spill_slots();
        let saved = self.ra.callee_saved_used();
        let raw = 8 * (spills as usize + saved.len());
        let frame = (raw + 15) / 16 * 16;

        let mut out = String::new();
        let _ = writeln!(out, "{}:", self.symbol);
        out.push_str("\tpush rbp\n\tmov rbp, rsp\n");
        if frame > 0 {
            let _ = writeln!(out, "\tsub rsp, {}", frame);
        }
        for (k, reg) in saved.iter().enumerate() {
            let off = 8 * (spills as usize + k + 1);
            let _ = writeln!(out, "\tmov QWORD PTR [rbp-{}], {}", off, reg);
        }
        out.push_str(&self.body);
        let _ = writeln!(out, ".Lret_{}:", self.symbol);
        for (k, reg) in saved.iter().enumerate() {
            let off = 8 * (spills as usize + k + 1);
            let _ = writeln!(out, "\tmov {}, QWORD PTR [rbp-{}]", reg, off);
        }
        out.push_str("\tmov rsp, rbp\n\tpop rbp\n\tret\n");
        out
    }

    /// True when no instruction after `at` reads `t`.
    fn is_dead(&self, t: Temp, at: usize) -> bool {
        self.last_use.get(&t).map_or(true, |&u| u <= at)
    }

    /// Frees registers of operands whose last read is instruction `at`.
    fn release_operands(&mut self, instr: &Instr, at: usize) {
        for t in instr.used_temps() {
            if self.last_use.get(&t) == Some(&at) {
                self.ra.release(t);
            }
        }
    }

    fn value(&self, op: &Operand) -> Result<String, CodegenError> {
        match op {
            Operand::Temp(t) => self
                .ra
                .location(*t)
                .map(|loc| loc.to_string())
                .ok_or_else(|| CodegenError::UndefinedTemporary {
                    function: self.name.to_string(),
                    temp: *t,
                }),
            Operand::Global(name) => Ok(format!("QWORD PTR {}[rip]", global_symbol(name))),
            Operand::Int(n) => Ok(n.to_string()),
            Operand::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
            Operand::Null => Ok("0".to_string()),
            Operand::Float(_) => Err(CodegenError::UnsupportedFloat {
                function: self.name.to_string(),
            }),
            Operand::Str(_) => Err(CodegenError::UnsupportedString {
                function: self.name.to_string(),
            }),
        }
    }

    /// Second operand of a two-operand instruction. Immediates wider than 32
    /// bits are staged through `rcx`.
    fn rhs_value(&mut self, op: &Operand) -> Result<String, CodegenError> {
        if let Operand::Int(n) = op {
            if i32::try_from(*n).is_err() {
                asm!(self, "mov rcx, {}", n);
                return Ok("rcx".to_string());
            }
        }
        self.value(op)
    }

    fn store_rax(&mut self, dest: Temp) {
        let loc = self.ra.allocate(dest);
        asm!(self, "mov {}, rax", loc);
    }

    /// Lowers `body[at]` and returns how many instructions were consumed.
    fn instr(&mut self, body: &[Instr], at: usize) -> Result<usize, CodegenError> {
        let instr = &body[at];
        match instr {
            Instr::Func { .. } => {}
            Instr::Copy { dest, src } => {
                let src_val = self.value(src)?;
                self.release_operands(instr, at);
                match dest {
                    Place::Temp(t) => {
                        if self.is_dead(*t, at) {
                            return Ok(1);
                        }
                        match self.ra.allocate(*t) {
                            Loc::Reg(r) => asm!(self, "mov {}, {}", r, src_val),
                            loc @ Loc::Stack(_) => {
                                asm!(self, "mov rax, {}", src_val);
                                asm!(self, "mov {}, rax", loc);
                            }
                        }
                    }
                    Place::Global(name) => {
                        asm!(self, "mov rax, {}", src_val);
                        asm!(self, "mov QWORD PTR {}[rip], rax", global_symbol(name));
                    }
                }
            }
            Instr::Binary { op, dest, lhs, rhs } => {
                if let Some(label) = self.fused_branch(body, at, *op, *dest) {
                    let r = self.rhs_value(rhs)?;
                    let l = self.value(lhs)?;
                    self.release_operands(instr, at);
                    asm!(self, "mov rax, {}", l);
                    asm!(self, "cmp rax, {}", r);
                    asm!(self, "{} .L{}", inverse_jump(*op), label);
                    return Ok(2);
                }
                let dead = self.is_dead(*dest, at);
                if dead && *op != BinOp::Div {
                    self.release_operands(instr, at);
                    return Ok(1);
                }
                let r = self.rhs_value(rhs)?;
                let l = self.value(lhs)?;
                self.release_operands(instr, at);
                asm!(self, "mov rax, {}", l);
                match op {
                    BinOp::Add => asm!(self, "add rax, {}", r),
                    BinOp::Sub => asm!(self, "sub rax, {}", r),
                    BinOp::Mul => asm!(self, "imul rax, {}", r),
                    BinOp::Div => {
                        if r != "rcx" {
                            asm!(self, "mov rcx, {}", r);
                        }
                        asm!(self, "cqo");
                        asm!(self, "idiv rcx");
                    }
                    _ => {
                        asm!(self, "cmp rax, {}", r);
                        asm!(self, "{} al", set_cc(*op));
                        asm!(self, "movzx eax, al");
                    }
                }
                if !dead {
                    self.store_rax(*dest);
                }
            }
            Instr::Unary { op, dest, operand } => {
                let v = self.value(operand)?;
                self.release_operands(instr, at);
                if self.is_dead(*dest, at) {
                    return Ok(1);
                }
                asm!(self, "mov rax, {}", v);
                match op {
                    UnOp::Neg => asm!(self, "neg rax"),
                    UnOp::Not => {
                        asm!(self, "test rax, rax");
                        asm!(self, "sete al");
                        asm!(self, "movzx eax, al");
                    }
                }
                self.store_rax(*dest);
            }
            Instr::Call {
                dest,
                function,
                args,
            } => {
                if args.len() > ARG_REGS.len() {
                    return Err(CodegenError::TooManyArguments {
                        function: function.clone(),
                        count: args.len(),
                    });
                }
                let mut setup = Vec::with_capacity(args.len());
                for (arg, reg) in args.iter().zip(ARG_REGS) {
                    setup.push(format!("mov {}, {}", reg, self.value(arg)?));
                }
                self.release_operands(instr, at);
                self.call(&setup, &function_symbol(function), false);
                if !self.is_dead(*dest, at) {
                    self.store_rax(*dest);
                }
            }
            Instr::Print { value } => {
                let setup = match value {
                    Operand::Str(s) => {
                        let idx = self.strings.intern(s);
                        vec![
                            format!("lea rdi, {}[rip]", FMT_STR),
                            format!("lea rsi, .LC{}[rip]", idx),
                        ]
                    }
                    other => vec![
                        format!("mov rsi, {}", self.value(other)?),
                        format!("lea rdi, {}[rip]", FMT_INT),
                    ],
                };
                self.release_operands(instr, at);
                self.call(&setup, "printf@PLT", true);
            }
            Instr::Jump { label } => asm!(self, "jmp .L{}", label),
            Instr::JumpIfFalse { cond, label } => {
                if let Some(truthy) = constant_truth(cond) {
                    if !truthy {
                        asm!(self, "jmp .L{}", label);
                    }
                    return Ok(1);
                }
                let v = self.value(cond)?;
                self.release_operands(instr, at);
                asm!(self, "cmp {}, 0", v);
                asm!(self, "je .L{}", label);
            }
            Instr::Label { label } => {
                let _ = writeln!(self.body, ".L{}:", label);
            }
            Instr::Return { value } => {
                match value {
                    None | Some(Operand::Null) => asm!(self, "xor eax, eax"),
                    Some(v) => {
                        let v = self.value(v)?;
                        asm!(self, "mov rax, {}", v);
                    }
                }
                self.release_operands(instr, at);
                if at + 1 < body.len() {
                    let ret = format!(".Lret_{}", self.symbol);
                    asm!(self, "jmp {}", ret);
                }
            }
        }
        Ok(1)
    }

    /// Label to branch to when `body[at]` is a comparison read only by the
    /// `jump-if-false` right after it.
    fn fused_branch<'b>(
        &self,
        body: &'b [Instr],
        at: usize,
        op: BinOp,
        dest: Temp,
    ) -> Option<&'b str> {
        if !op.is_comparison() {
            return None;
        }
        match body.get(at + 1) {
            Some(Instr::JumpIfFalse {
                cond: Operand::Temp(t),
                label,
            }) if *t == dest && self.last_use.get(&dest) == Some(&(at + 1)) => {
                Some(label.as_str())
            }
            _ => None,
        }
    }

    /// Emits a call, saving live caller-saved registers around it and keeping
    /// `rsp` 16-byte aligned at the `call`.
    fn call(&mut self, setup: &[String], target: &str, variadic: bool) {
        let saved = self.ra.live_caller_saved();
        let pad = saved.len() % 2 == 1;
        if pad {
            asm!(self, "sub rsp, 8");
        }
        for r in &saved {
            asm!(self, "push {}", r);
        }
        for line in setup {
            asm!(self, "{}", line);
        }
        if variadic {
            asm!(self, "xor eax, eax");
        }
        asm!(self, "call {}", target);
        for r in saved.iter().rev() {
            asm!(self, "pop {}", r);
        }
        if pad {
            asm!(self, "add rsp, 8");
        }
    }
}

fn constant_truth(op: &Operand) -> Option<bool> {
    match op {
        Operand::Int(n) => Some(*n != 0),
        Operand::Float(x) => Some(*x != 0.0),
        Operand::Bool(b) => Some(*b),
        Operand::Str(s) => Some(!s.is_empty()),
        Operand::Null => Some(false),
        Operand::Temp(_) | Operand::Global(_) => None,
    }
}

fn set_cc(op: BinOp) -> &'static str {
    match op {
        BinOp::Eq => "sete",
        BinOp::Ne => "setne",
        BinOp::Lt => "setl",
        BinOp::Gt => "setg",
        BinOp::Le => "setle",
        _ => "setge",
    }
}

/// Conditional jump taken when the comparison is false.
fn inverse_jump(op: BinOp) -> &'static str {
    match op {
        BinOp::Eq => "jne",
        BinOp::Ne => "je",
        BinOp::Lt => "jge",
        BinOp::Gt => "jle",
        BinOp::Le => "jg",
        _ => "jl",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headerless_ir_becomes_entry() {
        let ir = vec![Instr::Print {
            value: Operand::Int(1),
        }];
        let fs = split_functions(&ir);
        assert_eq!(fs.len(), 1);
        assert_eq!(fs[0].name, ENTRY_FUNCTION);
        assert_eq!(function_symbol(fs[0].name), "main");
        assert_eq!(function_symbol("main"), "fn_main");
    }

    #[test]
    fn escapes_for_gas() {
        assert_eq!(asm_string("a\"b\\\n\u{1}"), "a\\\"b\\\\\\n\\001");
    }
}
