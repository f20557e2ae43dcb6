//! Lower AST to IR. Consumes an analyzed program, produces one flat
//! instruction list: the `<main>` entry function first, then user functions.

mod to_ir;

pub use to_ir::generate_ir;
