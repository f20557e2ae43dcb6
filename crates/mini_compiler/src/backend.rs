//! Backend strategy: both the x86-64 code generator and the IR interpreter
//! consume the same IR and are selected from configuration.

use mini_codegen_x86::CodeGenerator;
use mini_config::{Config, Target};
use mini_runtime::{Execution, Interpreter};
use mini_syntax::diagnostics::Diagnostic;
use mini_syntax::ir::Instr;

#[derive(Clone, Debug, PartialEq)]
pub enum BackendOutput {
    Assembly(String),
    Execution(Execution),
}

pub trait Backend {
    fn name(&self) -> &'static str;

    /// Consume the IR. Code generation failures come back as a single
    /// diagnostic; runtime failures live inside the returned execution.
    fn run(&self, ir: &[Instr]) -> Result<BackendOutput, Diagnostic>;
}

impl Backend for CodeGenerator {
    fn name(&self) -> &'static str {
        "x86_64"
    }

    fn run(&self, ir: &[Instr]) -> Result<BackendOutput, Diagnostic> {
        self.generate(ir)
            .map(BackendOutput::Assembly)
            .map_err(|e| e.to_diagnostic())
    }
}

impl Backend for Interpreter {
    fn name(&self) -> &'static str {
        "interpreter"
    }

    fn run(&self, ir: &[Instr]) -> Result<BackendOutput, Diagnostic> {
        Ok(BackendOutput::Execution(self.execute(ir)))
    }
}

pub fn interpreter(config: &Config) -> Interpreter {
    Interpreter::new(
        config.interpreter.max_steps,
        config.interpreter.max_call_depth,
    )
}

pub fn select(config: &Config) -> Box<dyn Backend> {
    match config.compiler.target {
        Target::X86_64 => Box::new(CodeGenerator::new(config.codegen.registers)),
        Target::Interpreter => Box::new(interpreter(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mini_syntax::ir::{Operand, ENTRY_FUNCTION};

    fn program() -> Vec<Instr> {
        vec![
            Instr::Func {
                name: ENTRY_FUNCTION.into(),
                params: vec![],
            },
            Instr::Print {
                value: Operand::Int(7),
            },
            Instr::Return { value: None },
        ]
    }

    #[test]
    fn target_selects_backend() {
        let mut config = Config::default();
        assert_eq!(select(&config).name(), "x86_64");
        config.compiler.target = Target::Interpreter;
        let backend = select(&config);
        assert_eq!(backend.name(), "interpreter");
        match backend.run(&program()) {
            Ok(BackendOutput::Execution(exec)) => assert_eq!(exec.stdout(), "7\n"),
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[test]
    fn codegen_errors_become_diagnostics() {
        let ir = vec![Instr::Print {
            value: Operand::Float(0.5),
        }];
        let err = CodeGenerator::default().run(&ir).unwrap_err();
        assert_eq!(err.kind, "unsupported-float");
    }
}
