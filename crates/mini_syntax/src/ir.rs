//! Three-address IR for Mini: produced by lowering, consumed by both backends.
//! A flat instruction list; no SSA, no explicit basic blocks. Control flow is
//! expressed with `Label`, `Jump` and `JumpIfFalse`, and only jumps forward.

use crate::ast::{BinOp, UnOp};
use serde::{Serialize, Serializer};
use std::fmt;

/// Name of the function that holds top-level code. Not a valid identifier, so
/// it never collides with a user function.
pub const ENTRY_FUNCTION: &str = "<main>";

/// Generator-assigned temporary, printed as `tN`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Temp(pub u32);

impl fmt::Display for Temp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Instruction operand: a temporary, top-level variable storage, or a constant.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Temp(Temp),
    Global(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Null,
}

impl Operand {
    pub fn as_temp(&self) -> Option<Temp> {
        match self {
            Operand::Temp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        !matches!(self, Operand::Temp(_) | Operand::Global(_))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Temp(t) => write!(f, "{}", t),
            Operand::Global(name) => write!(f, "@{}", name),
            Operand::Int(n) => write!(f, "{}", n),
            Operand::Float(x) => write!(f, "{:?}", x),
            Operand::Bool(b) => write!(f, "{}", b),
            Operand::Str(s) => write!(f, "\"{}\"", crate::ast::escape_str(s)),
            Operand::Null => f.write_str("null"),
        }
    }
}

/// Destination of a copy: a temporary or a top-level variable.
#[derive(Clone, Debug, PartialEq)]
pub enum Place {
    Temp(Temp),
    Global(String),
}

impl Place {
    pub fn to_operand(&self) -> Operand {
        match self {
            Place::Temp(t) => Operand::Temp(*t),
            Place::Global(name) => Operand::Global(name.clone()),
        }
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Place::Temp(t) => write!(f, "{}", t),
            Place::Global(name) => write!(f, "@{}", name),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Instr {
    /// Function header; params are the temporaries bound to the arguments.
    Func { name: String, params: Vec<Temp> },
    /// `dest = src`
    Copy { dest: Place, src: Operand },
    /// `dest = lhs OP rhs`
    Binary {
        op: BinOp,
        dest: Temp,
        lhs: Operand,
        rhs: Operand,
    },
    /// `dest = OP operand`
    Unary {
        op: UnOp,
        dest: Temp,
        operand: Operand,
    },
    /// `dest = call function(args)`
    Call {
        dest: Temp,
        function: String,
        args: Vec<Operand>,
    },
    Print { value: Operand },
    Jump { label: String },
    JumpIfFalse { cond: Operand, label: String },
    Label { label: String },
    /// `return value` (`None` is `return null`)
    Return { value: Option<Operand> },
}

impl Instr {
    /// Stable mnemonic used in dumps.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instr::Func { .. } => "func",
            Instr::Copy { .. } => "=",
            Instr::Binary { op, .. } => op.symbol(),
            Instr::Unary { op, .. } => match op {
                UnOp::Neg => "neg",
                UnOp::Not => "!",
            },
            Instr::Call { .. } => "call",
            Instr::Print { .. } => "print",
            Instr::Jump { .. } => "jump",
            Instr::JumpIfFalse { .. } => "jump-if-false",
            Instr::Label { .. } => "label",
            Instr::Return { .. } => "return",
        }
    }

    /// Temporary written by this instruction, if any.
    pub fn dest_temp(&self) -> Option<Temp> {
        match self {
            Instr::Copy {
                dest: Place::Temp(t),
                ..
            }
            | Instr::Binary { dest: t, .. }
            | Instr::Unary { dest: t, .. }
            | Instr::Call { dest: t, .. } => Some(*t),
            _ => None,
        }
    }

    /// Operands read by this instruction, in evaluation order.
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Instr::Copy { src, .. } => vec![src],
            Instr::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Instr::Unary { operand, .. } => vec![operand],
            Instr::Call { args, .. } => args.iter().collect(),
            Instr::Print { value } => vec![value],
            Instr::JumpIfFalse { cond, .. } => vec![cond],
            Instr::Return { value: Some(v) } => vec![v],
            Instr::Return { value: None }
            | Instr::Func { .. }
            | Instr::Jump { .. }
            | Instr::Label { .. } => Vec::new(),
        }
    }

    /// Temporaries read by this instruction.
    pub fn used_temps(&self) -> impl Iterator<Item = Temp> + '_ {
        self.operands().into_iter().filter_map(Operand::as_temp)
    }

    /// Flat record with stable field names (`op`, `dest`, `args`, `label`, `function`, `params`).
    pub fn record(&self) -> IrRecord {
        let mut rec = IrRecord {
            op: self.mnemonic(),
            dest: None,
            args: self.operands().iter().map(|o| o.to_string()).collect(),
            label: None,
            function: None,
            params: Vec::new(),
        };
        match self {
            Instr::Func { name, params } => {
                rec.function = Some(name.clone());
                rec.params = params.iter().map(|t| t.to_string()).collect();
            }
            Instr::Copy { dest, .. } => rec.dest = Some(dest.to_string()),
            Instr::Binary { dest, .. } | Instr::Unary { dest, .. } => {
                rec.dest = Some(dest.to_string())
            }
            Instr::Call { dest, function, .. } => {
                rec.dest = Some(dest.to_string());
                rec.function = Some(function.clone());
            }
            Instr::Jump { label } | Instr::JumpIfFalse { label, .. } | Instr::Label { label } => {
                rec.label = Some(label.clone())
            }
            Instr::Print { .. } | Instr::Return { .. } => {}
        }
        rec
    }
}

/// One-line listing form, e.g. `t2 = t0 + t1` or `jump-if-false t3, else0`.
impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Func { name, params } => {
                write!(f, "func {}(", name)?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                f.write_str(")")
            }
            Instr::Copy { dest, src } => write!(f, "  {} = {}", dest, src),
            Instr::Binary { op, dest, lhs, rhs } => {
                write!(f, "  {} = {} {} {}", dest, lhs, op, rhs)
            }
            Instr::Unary { op, dest, operand } => write!(f, "  {} = {}{}", dest, op, operand),
            Instr::Call {
                dest,
                function,
                args,
            } => {
                write!(f, "  {} = call {}(", dest, function)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                f.write_str(")")
            }
            Instr::Print { value } => write!(f, "  print {}", value),
            Instr::Jump { label } => write!(f, "  jump {}", label),
            Instr::JumpIfFalse { cond, label } => write!(f, "  jump-if-false {}, {}", cond, label),
            Instr::Label { label } => write!(f, "{}:", label),
            Instr::Return { value: Some(v) } => write!(f, "  return {}", v),
            Instr::Return { value: None } => f.write_str("  return null"),
        }
    }
}

impl Serialize for Instr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.record().serialize(serializer)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IrRecord {
    pub op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<String>,
}

/// Render an instruction list, one instruction per line.
pub fn listing(ir: &[Instr]) -> String {
    let mut out = String::new();
    for instr in ir {
        out.push_str(&instr.to_string());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_forms() {
        let ir = vec![
            Instr::Func {
                name: "add".into(),
                params: vec![Temp(0), Temp(1)],
            },
            Instr::Binary {
                op: BinOp::Add,
                dest: Temp(2),
                lhs: Operand::Temp(Temp(0)),
                rhs: Operand::Temp(Temp(1)),
            },
            Instr::Return {
                value: Some(Operand::Temp(Temp(2))),
            },
        ];
        assert_eq!(listing(&ir), "func add(t0, t1)\n  t2 = t0 + t1\n  return t2\n");
    }

    #[test]
    fn record_carries_stable_fields() {
        let call = Instr::Call {
            dest: Temp(4),
            function: "f".into(),
            args: vec![Operand::Global("x".into()), Operand::Int(3)],
        };
        let rec = call.record();
        assert_eq!(rec.op, "call");
        assert_eq!(rec.dest.as_deref(), Some("t4"));
        assert_eq!(rec.function.as_deref(), Some("f"));
        assert_eq!(rec.args, vec!["@x".to_string(), "3".to_string()]);

        let jf = Instr::JumpIfFalse {
            cond: Operand::Temp(Temp(1)),
            label: "else0".into(),
        };
        assert_eq!(jf.record().label.as_deref(), Some("else0"));
        assert_eq!(jf.used_temps().collect::<Vec<_>>(), vec![Temp(1)]);
    }
}
