//! Optimization pass between lowering and the backend. Currently the identity.

use mini_syntax::ir::Instr;
use tracing::debug;

pub fn optimize(ir: Vec<Instr>) -> Vec<Instr> {
    debug!(instructions = ir.len(), "optimize (no-op)");
    ir
}

#[cfg(test)]
mod tests {
    use super::*;
    use mini_syntax::ir::Operand;

    #[test]
    fn leaves_ir_untouched() {
        let ir = vec![Instr::Print {
            value: Operand::Int(1),
        }];
        assert_eq!(optimize(ir.clone()), ir);
    }
}
