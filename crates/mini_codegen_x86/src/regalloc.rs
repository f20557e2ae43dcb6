//! Free-list register allocation over one function's temporaries.

use mini_syntax::{Instr, Temp};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Allocatable registers, in allocation order.
pub const ALLOCATABLE: [Reg; 7] = [
    Reg::Rbx,
    Reg::R12,
    Reg::R13,
    Reg::R14,
    Reg::R15,
    Reg::R10,
    Reg::R11,
];

/// SysV integer argument registers.
pub const ARG_REGS: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reg {
    Rbx,
    R12,
    R13,
    R14,
    R15,
    R10,
    R11,
}

impl Reg {
    pub fn name(self) -> &'static str {
        match self {
            Reg::Rbx => "rbx",
            Reg::R12 => "r12",
            Reg::R13 => "r13",
            Reg::R14 => "r14",
            Reg::R15 => "r15",
            Reg::R10 => "r10",
            Reg::R11 => "r11",
        }
    }

    pub fn is_callee_saved(self) -> bool {
        !matches!(self, Reg::R10 | Reg::R11)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a temporary lives for its whole lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Loc {
    Reg(Reg),
    /// Spill slot index; slot `n` is `[rbp - 8*(n+1)]`.
    Stack(u32),
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loc::Reg(r) => f.write_str(r.name()),
            Loc::Stack(slot) => write!(f, "QWORD PTR [rbp-{}]", 8 * (slot + 1)),
        }
    }
}

/// Index of the last instruction that reads each temporary.
pub fn last_uses(body: &[Instr]) -> HashMap<Temp, usize> {
    let mut last = HashMap::new();
    for (i, instr) in body.iter().enumerate() {
        for t in instr.used_temps() {
            last.insert(t, i);
        }
    }
    last
}

#[derive(Debug)]
pub struct RegisterAllocator {
    pool: Vec<Reg>,
    busy: HashMap<Reg, Temp>,
    map: HashMap<Temp, Loc>,
    spill_slots: u32,
    callee_saved: BTreeSet<Reg>,
}

impl RegisterAllocator {
    /// Uses the first `registers` entries of [`ALLOCATABLE`].
    pub fn new(registers: usize) -> Self {
        let n = registers.clamp(1, ALLOCATABLE.len());
        Self {
            pool: ALLOCATABLE[..n].to_vec(),
            busy: HashMap::new(),
            map: HashMap::new(),
            spill_slots: 0,
            callee_saved: BTreeSet::new(),
        }
    }

    pub fn location(&self, t: Temp) -> Option<Loc> {
        self.map.get(&t).copied()
    }

    /// Location for `t`, assigning the lowest free register (or a fresh spill
    /// slot) if it has none yet.
    pub fn allocate(&mut self, t: Temp) -> Loc {
        if let Some(loc) = self.location(t) {
            return loc;
        }
        let free = self.pool.iter().copied().find(|r| !self.busy.contains_key(r));
        let loc = match free {
            Some(reg) => {
                self.busy.insert(reg, t);
                if reg.is_callee_saved() {
                    self.callee_saved.insert(reg);
                }
                Loc::Reg(reg)
            }
            None => {
                let slot = self.spill_slots;
                self.spill_slots += 1;
                Loc::Stack(slot)
            }
        };
        self.map.insert(t, loc);
        loc
    }

    /// Frees `t`'s register after its last read. Spill slots are not reused.
    pub fn release(&mut self, t: Temp) {
        if let Some(Loc::Reg(reg)) = self.map.remove(&t) {
            self.busy.remove(&reg);
        }
    }

    /// Caller-saved registers currently holding a temporary, in pool order.
    pub fn live_caller_saved(&self) -> Vec<Reg> {
        self.pool
            .iter()
            .copied()
            .filter(|r| !r.is_callee_saved() && self.busy.contains_key(r))
            .collect()
    }

    pub fn spill_slots(&self) -> u32 {
        self.spill_slots
    }

    /// Callee-saved registers touched at any point (saved in the prologue).
    pub fn callee_saved_used(&self) -> Vec<Reg> {
        self.callee_saved.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mini_syntax::{BinOp, Operand};

    #[test]
    fn lowest_free_register_first() {
        let mut ra = RegisterAllocator::new(7);
        assert_eq!(ra.allocate(Temp(0)), Loc::Reg(Reg::Rbx));
        assert_eq!(ra.allocate(Temp(1)), Loc::Reg(Reg::R12));
        ra.release(Temp(0));
        assert_eq!(ra.allocate(Temp(2)), Loc::Reg(Reg::Rbx));
        assert_eq!(ra.allocate(Temp(1)), Loc::Reg(Reg::R12));
    }

    #[test]
    fn exhaustion_spills_to_successive_slots() {
        let mut ra = RegisterAllocator::new(2);
        ra.allocate(Temp(0));
        ra.allocate(Temp(1));
        assert_eq!(ra.allocate(Temp(2)), Loc::Stack(0));
        assert_eq!(ra.allocate(Temp(3)), Loc::Stack(1));
        assert_eq!(ra.spill_slots(), 2);
        assert_eq!(Loc::Stack(1).to_string(), "QWORD PTR [rbp-16]");
        assert_eq!(ra.callee_saved_used(), vec![Reg::Rbx, Reg::R12]);
    }

    #[test]
    fn caller_saved_tracking() {
        let mut ra = RegisterAllocator::new(7);
        for n in 0..6 {
            ra.allocate(Temp(n));
        }
        assert_eq!(ra.live_caller_saved(), vec![Reg::R10]);
        ra.release(Temp(5));
        assert!(ra.live_caller_saved().is_empty());
    }

    #[test]
    fn last_use_is_final_read() {
        let body = vec![
            Instr::Binary {
                op: BinOp::Add,
                dest: Temp(1),
                lhs: Operand::Temp(Temp(0)),
                rhs: Operand::Int(1),
            },
            Instr::Print {
                value: Operand::Temp(Temp(0)),
            },
            Instr::Print {
                value: Operand::Temp(Temp(1)),
            },
        ];
        let last = last_uses(&body);
        assert_eq!(last[&Temp(0)], 1);
        assert_eq!(last[&Temp(1)], 2);
    }
}
