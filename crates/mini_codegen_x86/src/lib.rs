//! x86-64 codegen for Mini: Intel-syntax assembly (SysV ABI, PIE) from lowered IR.

mod emit;
pub mod regalloc;

use mini_syntax::{Diagnostic, Instr, Phase, Temp};
use std::io::Write;
use thiserror::Error;

pub use regalloc::{Loc, Reg, RegisterAllocator, ALLOCATABLE};

/// Fatal for the whole unit; no partial assembly is produced.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum CodegenError {
    #[error("temporary '{temp}' read before assignment in function '{function}'")]
    UndefinedTemporary { function: String, temp: Temp },
    #[error("floating-point values are not supported by the x86-64 backend (in '{function}')")]
    UnsupportedFloat { function: String },
    #[error("string values can only be printed directly (in '{function}')")]
    UnsupportedString { function: String },
    #[error("call to '{function}' passes {count} arguments; at most 6 are supported")]
    TooManyArguments { function: String, count: usize },
    #[error("function '{function}' declares {count} parameters; at most 6 are supported")]
    TooManyParameters { function: String, count: usize },
    #[error("failed to write assembly: {0}")]
    Io(String),
}

impl CodegenError {
    pub fn kind(&self) -> &'static str {
        match self {
            CodegenError::UndefinedTemporary { .. } => "undefined-temporary",
            CodegenError::UnsupportedFloat { .. } => "unsupported-float",
            CodegenError::UnsupportedString { .. } => "unsupported-string",
            CodegenError::TooManyArguments { .. } => "too-many-arguments",
            CodegenError::TooManyParameters { .. } => "too-many-parameters",
            CodegenError::Io(_) => "io",
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(Phase::CodeGeneration, self.kind(), self.to_string(), None)
    }
}

/// Register-allocating code generator. Stateless between calls; every
/// `generate` starts from an empty register map.
#[derive(Clone, Debug)]
pub struct CodeGenerator {
    registers: usize,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new(ALLOCATABLE.len())
    }
}

impl CodeGenerator {
    /// `registers` is how many of [`ALLOCATABLE`] to use (clamped to 1..=7).
    pub fn new(registers: usize) -> Self {
        Self {
            registers: registers.clamp(1, ALLOCATABLE.len()),
        }
    }

    pub fn generate(&self, ir: &[Instr]) -> Result<String, CodegenError> {
        emit::emit_module(ir, self.registers)
    }
}

/// Emit an assembly module for `ir`. The entry function becomes `main`, user
/// functions `fn_<name>`, top-level variables `gv_<name>` in `.data`.
pub fn emit_asm(ir: &[Instr], registers: usize, out: &mut impl Write) -> Result<(), CodegenError> {
    let text = CodeGenerator::new(registers).generate(ir)?;
    out.write_all(text.as_bytes())
        .map_err(|e| CodegenError::Io(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mini_syntax::{BinOp, Operand, Place, ENTRY_FUNCTION};

    fn entry() -> Instr {
        Instr::Func {
            name: ENTRY_FUNCTION.into(),
            params: vec![],
        }
    }

    fn tmp(n: u32) -> Operand {
        Operand::Temp(Temp(n))
    }

    #[test]
    fn globals_arithmetic_and_print() {
        let ir = vec![
            entry(),
            Instr::Copy {
                dest: Place::Global("x".into()),
                src: Operand::Int(10),
            },
            Instr::Binary {
                op: BinOp::Add,
                dest: Temp(0),
                lhs: Operand::Global("x".into()),
                rhs: Operand::Int(5),
            },
            Instr::Print { value: tmp(0) },
            Instr::Return { value: None },
        ];
        let asm = CodeGenerator::default().generate(&ir).unwrap();
        assert!(asm.starts_with("\t.intel_syntax noprefix\n"));
        assert!(asm.contains("gv_x:\n\t.quad 0"));
        assert!(asm.contains("main:\n\tpush rbp\n\tmov rbp, rsp\n\tsub rsp, 16\n\tmov QWORD PTR [rbp-8], rbx\n"));
        assert!(asm.contains("\tmov rax, 10\n\tmov QWORD PTR gv_x[rip], rax\n"));
        assert!(asm.contains("\tmov rax, QWORD PTR gv_x[rip]\n\tadd rax, 5\n\tmov rbx, rax\n"));
        assert!(asm.contains("\tmov rsi, rbx\n\tlea rdi, .Lfmt_int[rip]\n\txor eax, eax\n\tcall printf@PLT\n"));
        assert!(asm.contains(".Lret_main:\n\tmov rbx, QWORD PTR [rbp-8]\n\tmov rsp, rbp\n\tpop rbp\n\tret\n"));
        assert!(asm.ends_with(".note.GNU-stack,\"\",@progbits\n"));
    }

    #[test]
    fn comparison_feeding_branch_is_fused() {
        let ir = vec![
            entry(),
            Instr::Binary {
                op: BinOp::Lt,
                dest: Temp(0),
                lhs: Operand::Int(1),
                rhs: Operand::Int(2),
            },
            Instr::JumpIfFalse {
                cond: tmp(0),
                label: "else0".into(),
            },
            Instr::Print {
                value: Operand::Str("yes".into()),
            },
            Instr::Label {
                label: "else0".into(),
            },
            Instr::Return { value: None },
        ];
        let asm = CodeGenerator::default().generate(&ir).unwrap();
        assert!(asm.contains("\tmov rax, 1\n\tcmp rax, 2\n\tjge .Lelse0\n"));
        assert!(!asm.contains("setl"));
        assert!(asm.contains(".LC0:\n\t.string \"yes\""));
        assert!(asm.contains("\tlea rdi, .Lfmt_str[rip]\n\tlea rsi, .LC0[rip]\n"));
        assert!(asm.contains(".Lelse0:\n"));
    }

    #[test]
    fn materialized_comparison_uses_setcc() {
        let ir = vec![
            entry(),
            Instr::Binary {
                op: BinOp::Ge,
                dest: Temp(0),
                lhs: Operand::Int(3),
                rhs: Operand::Int(2),
            },
            Instr::Print { value: tmp(0) },
            Instr::Return { value: None },
        ];
        let asm = CodeGenerator::default().generate(&ir).unwrap();
        assert!(asm.contains("\tcmp rax, 2\n\tsetge al\n\tmovzx eax, al\n\tmov rbx, rax\n"));
    }

    #[test]
    fn register_pressure_spills_to_stack() {
        // Three values live at once with only two registers.
        let mut ir = vec![entry()];
        for n in 0..3 {
            ir.push(Instr::Copy {
                dest: Place::Temp(Temp(n)),
                src: Operand::Int(n as i64 + 1),
            });
        }
        for n in 0..3 {
            ir.push(Instr::Print { value: tmp(n) });
        }
        ir.push(Instr::Return { value: None });
        let asm = CodeGenerator::new(2).generate(&ir).unwrap();
        assert!(asm.contains("\tmov rbx, 1\n\tmov r12, 2\n\tmov rax, 3\n\tmov QWORD PTR [rbp-8], rax\n"));
        // one spill slot + rbx, r12 saved: 24 bytes rounded up
        assert!(asm.contains("\tsub rsp, 32\n\tmov QWORD PTR [rbp-16], rbx\n\tmov QWORD PTR [rbp-24], r12\n"));
        assert!(asm.contains("\tmov rsi, QWORD PTR [rbp-8]\n"));
    }

    #[test]
    fn caller_saved_registers_survive_calls() {
        let mut ir = vec![entry()];
        for n in 0..6 {
            ir.push(Instr::Copy {
                dest: Place::Temp(Temp(n)),
                src: Operand::Int(n as i64),
            });
        }
        ir.push(Instr::Call {
            dest: Temp(6),
            function: "f".into(),
            args: vec![],
        });
        for n in 0..6 {
            ir.push(Instr::Print { value: tmp(n) });
        }
        ir.push(Instr::Return { value: None });
        ir.push(Instr::Func {
            name: "f".into(),
            params: vec![],
        });
        ir.push(Instr::Return {
            value: Some(Operand::Int(0)),
        });
        let asm = CodeGenerator::default().generate(&ir).unwrap();
        assert!(asm.contains("\tmov r10, 5\n"));
        assert!(asm.contains("\tsub rsp, 8\n\tpush r10\n\tcall fn_f\n\tpop r10\n\tadd rsp, 8\n"));
        assert!(asm.contains("fn_f:\n\tpush rbp\n\tmov rbp, rsp\n\tmov rax, 0\n.Lret_fn_f:\n"));
    }

    #[test]
    fn parameters_come_from_argument_registers() {
        let ir = vec![
            entry(),
            Instr::Call {
                dest: Temp(0),
                function: "add".into(),
                args: vec![Operand::Int(2), Operand::Int(3)],
            },
            Instr::Print { value: tmp(0) },
            Instr::Return { value: None },
            Instr::Func {
                name: "add".into(),
                params: vec![Temp(0), Temp(1)],
            },
            Instr::Binary {
                op: BinOp::Add,
                dest: Temp(2),
                lhs: tmp(0),
                rhs: tmp(1),
            },
            Instr::Return {
                value: Some(tmp(2)),
            },
        ];
        let asm = CodeGenerator::default().generate(&ir).unwrap();
        assert!(asm.contains("\tmov rdi, 2\n\tmov rsi, 3\n\tcall fn_add\n\tmov rbx, rax\n"));
        assert!(asm.contains("fn_add:\n"));
        assert!(asm.contains("\tmov rbx, rdi\n\tmov r12, rsi\n\tmov rax, rbx\n\tadd rax, r12\n\tmov rbx, rax\n\tmov rax, rbx\n"));
    }

    #[test]
    fn division_uses_idiv() {
        let ir = vec![
            entry(),
            Instr::Binary {
                op: BinOp::Div,
                dest: Temp(0),
                lhs: Operand::Int(7),
                rhs: Operand::Int(2),
            },
            Instr::Print { value: tmp(0) },
            Instr::Return { value: None },
        ];
        let asm = CodeGenerator::default().generate(&ir).unwrap();
        assert!(asm.contains("\tmov rax, 7\n\tmov rcx, 2\n\tcqo\n\tidiv rcx\n"));
    }

    #[test]
    fn unsupported_inputs_are_errors() {
        let undefined = vec![entry(), Instr::Print { value: tmp(9) }];
        assert_eq!(
            CodeGenerator::default().generate(&undefined),
            Err(CodegenError::UndefinedTemporary {
                function: ENTRY_FUNCTION.into(),
                temp: Temp(9),
            })
        );

        let float = vec![
            entry(),
            Instr::Copy {
                dest: Place::Global("x".into()),
                src: Operand::Float(1.5),
            },
        ];
        let err = CodeGenerator::default().generate(&float).unwrap_err();
        assert_eq!(err.kind(), "unsupported-float");
        assert_eq!(err.to_diagnostic().phase, Phase::CodeGeneration);

        let call = vec![
            entry(),
            Instr::Call {
                dest: Temp(0),
                function: "f".into(),
                args: (0..7).map(Operand::Int).collect(),
            },
        ];
        assert!(matches!(
            CodeGenerator::default().generate(&call),
            Err(CodegenError::TooManyArguments { count: 7, .. })
        ));
    }

    #[test]
    fn emit_asm_writes_module() {
        let mut buf = Vec::new();
        emit_asm(&[entry(), Instr::Return { value: None }], 7, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("\t.globl main\nmain:\n"));
    }
}
