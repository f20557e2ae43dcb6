//! Mini runtime: executes lowered IR directly (print output, top-level variables, runtime errors).

mod error;
mod interp;
mod value;

pub use error::RuntimeError;
pub use interp::{Execution, Interpreter};
pub use value::Value;
