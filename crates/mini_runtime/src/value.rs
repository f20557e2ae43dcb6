//! Runtime values and the operators over them.

use crate::error::RuntimeError;
use mini_syntax::{BinOp, UnOp};
use serde::Serialize;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Null,
}

/// Numeric view of a value: booleans and null coerce to integers.
enum Num {
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Null => "null",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::Null => false,
        }
    }

    fn as_num(&self) -> Option<Num> {
        match self {
            Value::Int(n) => Some(Num::Int(*n)),
            Value::Float(x) => Some(Num::Float(*x)),
            Value::Bool(b) => Some(Num::Int(*b as i64)),
            Value::Null => Some(Num::Int(0)),
            Value::Str(_) => None,
        }
    }

    pub fn binary(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
        if op == BinOp::Add {
            if let (Value::Str(_), _) | (_, Value::Str(_)) = (lhs, rhs) {
                return Ok(Value::Str(format!("{}{}", lhs, rhs)));
            }
        }
        match op {
            BinOp::Eq => return Ok(Value::Bool(loose_eq(lhs, rhs))),
            BinOp::Ne => return Ok(Value::Bool(!loose_eq(lhs, rhs))),
            _ => {}
        }
        if let (Value::Str(a), Value::Str(b)) = (lhs, rhs) {
            if op.is_comparison() {
                return Ok(Value::Bool(compare(op, a.cmp(b))));
            }
        }
        let mismatch = || RuntimeError::TypeMismatch {
            op: op.symbol(),
            operands: format!("{} and {}", lhs.type_name(), rhs.type_name()),
        };
        let (a, b) = match (lhs.as_num(), rhs.as_num()) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(mismatch()),
        };
        match (a, b) {
            (Num::Int(a), Num::Int(b)) => int_binary(op, a, b),
            (a, b) => float_binary(op, a.to_f64(), b.to_f64()),
        }
    }

    pub fn unary(op: UnOp, operand: &Value) -> Result<Value, RuntimeError> {
        match op {
            UnOp::Not => Ok(Value::Bool(!operand.is_truthy())),
            UnOp::Neg => match operand.as_num() {
                Some(Num::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
                Some(Num::Float(x)) => Ok(Value::Float(-x)),
                None => Err(RuntimeError::TypeMismatch {
                    op: "-",
                    operands: operand.type_name().to_string(),
                }),
            },
        }
    }
}

impl Num {
    fn to_f64(&self) -> f64 {
        match self {
            Num::Int(n) => *n as f64,
            Num::Float(x) => *x,
        }
    }
}

fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Null, Value::Null) => true,
        (Value::Str(_), _) | (_, Value::Str(_)) => false,
        _ => match (lhs.as_num(), rhs.as_num()) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
            (Some(a), Some(b)) => a.to_f64() == b.to_f64(),
            _ => false,
        },
    }
}

fn compare(op: BinOp, ord: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        BinOp::Lt => ord == Less,
        BinOp::Gt => ord == Greater,
        BinOp::Le => ord != Greater,
        BinOp::Ge => ord != Less,
        BinOp::Eq => ord == Equal,
        BinOp::Ne => ord != Equal,
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => false,
    }
}

/// Two's-complement wrapping with truncating division, as the native backend computes it.
fn int_binary(op: BinOp, a: i64, b: i64) -> Result<Value, RuntimeError> {
    let v = match op {
        BinOp::Add => Value::Int(a.wrapping_add(b)),
        BinOp::Sub => Value::Int(a.wrapping_sub(b)),
        BinOp::Mul => Value::Int(a.wrapping_mul(b)),
        BinOp::Div => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Value::Int(a.wrapping_div(b))
        }
        _ => Value::Bool(compare(op, a.cmp(&b))),
    };
    Ok(v)
}

fn float_binary(op: BinOp, a: f64, b: f64) -> Result<Value, RuntimeError> {
    let v = match op {
        BinOp::Add => Value::Float(a + b),
        BinOp::Sub => Value::Float(a - b),
        BinOp::Mul => Value::Float(a * b),
        BinOp::Div => {
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Value::Float(a / b)
        }
        _ => match a.partial_cmp(&b) {
            Some(ord) => Value::Bool(compare(op, ord)),
            None => Value::Bool(false),
        },
    };
    Ok(v)
}

/// Printed form. Booleans and null show as the integers they coerce to, which
/// is what compiled programs print for them.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Bool(b) => write!(f, "{}", *b as i64),
            Value::Str(s) => f.write_str(s),
            Value::Null => f.write_str("0"),
        }
    }
}
