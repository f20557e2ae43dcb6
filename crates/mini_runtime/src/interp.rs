//! IR interpreter. Walks the flat instruction list with a program counter and a
//! frame stack; labels and function entry points are resolved up front.

use crate::error::RuntimeError;
use crate::value::Value;
use mini_syntax::{Diagnostic, Instr, Operand, Place, Temp, ENTRY_FUNCTION};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

/// Outcome of one run: everything printed, final top-level variables, and the
/// error that stopped execution (if any).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Execution {
    pub output: Vec<Value>,
    pub variables: BTreeMap<String, Value>,
    pub errors: Vec<RuntimeError>,
}

impl Execution {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Printed values, one per line.
    pub fn stdout(&self) -> String {
        let mut out = String::new();
        for v in &self.output {
            out.push_str(&v.to_string());
            out.push('\n');
        }
        out
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.errors.iter().map(RuntimeError::to_diagnostic).collect()
    }
}

impl Serialize for Execution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Execution", 3)?;
        s.serialize_field("output", &self.output)?;
        s.serialize_field("variables", &self.variables)?;
        s.serialize_field("errors", &self.diagnostics())?;
        s.end()
    }
}

#[derive(Clone, Debug)]
pub struct Interpreter {
    max_steps: u64,
    max_call_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(1_000_000, 512)
    }
}

struct Function<'ir> {
    /// Index of the `Func` header.
    start: usize,
    params: &'ir [Temp],
}

struct Frame {
    temps: HashMap<Temp, Value>,
    return_pc: usize,
    dest: Option<Temp>,
}

impl Frame {
    fn new(return_pc: usize, dest: Option<Temp>) -> Self {
        Self {
            temps: HashMap::new(),
            return_pc,
            dest,
        }
    }
}

/// Per-run state; rebuilt for every `execute`.
struct Machine<'ir> {
    ir: &'ir [Instr],
    labels: HashMap<&'ir str, usize>,
    functions: HashMap<&'ir str, Function<'ir>>,
    frames: Vec<Frame>,
    globals: BTreeMap<String, Value>,
    output: Vec<Value>,
    max_call_depth: usize,
}

impl Interpreter {
    pub fn new(max_steps: u64, max_call_depth: usize) -> Self {
        Self {
            max_steps,
            max_call_depth,
        }
    }

    pub fn execute(&self, ir: &[Instr]) -> Execution {
        let mut machine = Machine::new(ir, self.max_call_depth);
        let result = machine.run(self.max_steps);
        let errors = match result {
            Ok(()) => Vec::new(),
            Err(e) => {
                debug!(error = %e, "execution stopped");
                vec![e]
            }
        };
        Execution {
            output: machine.output,
            variables: machine.globals,
            errors,
        }
    }
}

impl<'ir> Machine<'ir> {
    fn new(ir: &'ir [Instr], max_call_depth: usize) -> Self {
        let mut labels = HashMap::new();
        let mut functions = HashMap::new();
        for (i, instr) in ir.iter().enumerate() {
            match instr {
                Instr::Label { label } => {
                    labels.insert(label.as_str(), i);
                }
                Instr::Func { name, params } => {
                    functions.insert(
                        name.as_str(),
                        Function {
                            start: i,
                            params: params.as_slice(),
                        },
                    );
                }
                _ => {}
            }
        }
        Self {
            ir,
            labels,
            functions,
            frames: Vec::new(),
            globals: BTreeMap::new(),
            output: Vec::new(),
            max_call_depth,
        }
    }

    fn run(&mut self, max_steps: u64) -> Result<(), RuntimeError> {
        let mut pc = match self.functions.get(ENTRY_FUNCTION) {
            Some(entry) => entry.start + 1,
            None => 0,
        };
        self.frames.push(Frame::new(self.ir.len(), None));
        debug!(instructions = self.ir.len(), start = pc, "execute");

        let mut steps: u64 = 0;
        loop {
            if pc >= self.ir.len() {
                match self.do_return(Value::Null)? {
                    Some(next) => {
                        pc = next;
                        continue;
                    }
                    None => return Ok(()),
                }
            }
            steps += 1;
            if steps > max_steps {
                return Err(RuntimeError::StepLimit(max_steps));
            }
            let ir = self.ir;
            let instr = &ir[pc];
            trace!(pc, %instr, "step");
            pc = match instr {
                // Running into the next function's header ends the current one.
                Instr::Func { .. } => match self.do_return(Value::Null)? {
                    Some(next) => next,
                    None => return Ok(()),
                },
                Instr::Copy { dest, src } => {
                    let value = self.eval(src)?;
                    match dest {
                        Place::Temp(t) => self.set_temp(*t, value),
                        Place::Global(name) => {
                            self.globals.insert(name.clone(), value);
                        }
                    }
                    pc + 1
                }
                Instr::Binary { op, dest, lhs, rhs } => {
                    let value = Value::binary(*op, &self.eval(lhs)?, &self.eval(rhs)?)?;
                    self.set_temp(*dest, value);
                    pc + 1
                }
                Instr::Unary { op, dest, operand } => {
                    let value = Value::unary(*op, &self.eval(operand)?)?;
                    self.set_temp(*dest, value);
                    pc + 1
                }
                Instr::Call {
                    dest,
                    function,
                    args,
                } => self.call(function, args, *dest, pc + 1)?,
                Instr::Print { value } => {
                    let value = self.eval(value)?;
                    self.output.push(value);
                    pc + 1
                }
                Instr::Jump { label } => self.label(label)?,
                Instr::JumpIfFalse { cond, label } => {
                    if self.eval(cond)?.is_truthy() {
                        pc + 1
                    } else {
                        self.label(label)?
                    }
                }
                Instr::Label { .. } => pc + 1,
                Instr::Return { value } => {
                    let value = match value {
                        Some(v) => self.eval(v)?,
                        None => Value::Null,
                    };
                    match self.do_return(value)? {
                        Some(next) => next,
                        None => return Ok(()),
                    }
                }
            };
        }
    }

    fn call(
        &mut self,
        function: &str,
        args: &[Operand],
        dest: Temp,
        return_pc: usize,
    ) -> Result<usize, RuntimeError> {
        let (start, params) = match self.functions.get(function) {
            Some(f) => (f.start, f.params),
            None => return Err(RuntimeError::UnknownFunction(function.to_string())),
        };
        if params.len() != args.len() {
            return Err(RuntimeError::ArityMismatch {
                function: function.to_string(),
                expected: params.len(),
                found: args.len(),
            });
        }
        if self.frames.len() >= self.max_call_depth {
            return Err(RuntimeError::StackOverflow(self.max_call_depth));
        }
        let mut frame = Frame::new(return_pc, Some(dest));
        for (param, arg) in params.iter().zip(args) {
            frame.temps.insert(*param, self.eval(arg)?);
        }
        trace!(function, depth = self.frames.len(), "call");
        self.frames.push(frame);
        Ok(start + 1)
    }

    /// Pops the current frame; returns the caller's resume point, or `None`
    /// when the entry frame finished.
    fn do_return(&mut self, value: Value) -> Result<Option<usize>, RuntimeError> {
        let frame = match self.frames.pop() {
            Some(f) => f,
            None => return Ok(None),
        };
        if self.frames.is_empty() {
            return Ok(None);
        }
        if let Some(dest) = frame.dest {
            self.set_temp(dest, value);
        }
        Ok(Some(frame.return_pc))
    }

    fn label(&self, label: &str) -> Result<usize, RuntimeError> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| RuntimeError::UnknownLabel(label.to_string()))
    }

    fn set_temp(&mut self, t: Temp, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.temps.insert(t, value);
        }
    }

    fn eval(&self, operand: &Operand) -> Result<Value, RuntimeError> {
        let value = match operand {
            Operand::Temp(t) => self
                .frames
                .last()
                .and_then(|f| f.temps.get(t))
                .cloned()
                .ok_or(RuntimeError::UndefinedTemporary(*t))?,
            Operand::Global(name) => self
                .globals
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeError::UndefinedVariable(name.clone()))?,
            Operand::Int(n) => Value::Int(*n),
            Operand::Float(x) => Value::Float(*x),
            Operand::Bool(b) => Value::Bool(*b),
            Operand::Str(s) => Value::Str(s.clone()),
            Operand::Null => Value::Null,
        };
        Ok(value)
    }
}
