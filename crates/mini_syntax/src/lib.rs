//! Mini syntax: tokens, spans, AST nodes, IR, diagnostics, pretty-printer.

pub mod ast;
pub mod diagnostics;
pub mod ir;
pub mod printer;
pub mod span;
pub mod token;

pub use ast::*;
pub use diagnostics::*;
pub use ir::*;
pub use printer::{dump, pretty};
pub use span::*;
pub use token::*;
