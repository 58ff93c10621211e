//! Compiled-function records and constant pools.

use std::fmt;

use crate::instruction::Instruction;

/// Identifies a script function within a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u32);

/// Identifies an externally registered native routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeId(pub u32);

/// What an address-pool entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrKind {
    /// A script function, id = [`FunctionId`].
    Function,
    /// A registered native routine, id = [`NativeId`].
    Native,
    /// A class descriptor.
    Class,
    /// A named pseudo-random generator.
    Generator,
    /// The null pointer; id is ignored.
    Null,
}

/// A tagged address-pool entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddrConst {
    pub kind: AddrKind,
    pub id: u32,
}

impl AddrConst {
    /// The null pointer entry.
    pub const NULL: AddrConst = AddrConst {
        kind: AddrKind::Null,
        id: 0,
    };
}

/// Per-function constant pools, one per value family.
///
/// Entries are deduplicated by the code builder; the pools themselves are
/// plain append-only tables indexed by u16.
#[derive(Debug, Clone, Default)]
pub struct ConstPools {
    pub ints: Vec<i32>,
    pub floats: Vec<f64>,
    pub strings: Vec<String>,
    pub addrs: Vec<AddrConst>,
}

impl ConstPools {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A fully lowered function ready for the VM.
#[derive(Clone)]
pub struct CompiledFunction {
    pub name: String,
    pub code: Vec<Instruction>,
    pub pools: ConstPools,
    /// High-water register counts, indexed by bank.
    pub reg_counts: [u16; 4],
    /// Explicit declared parameters.
    pub param_count: u16,
    /// Implicit leading pointer parameters: 0 for free functions, 1 for
    /// plain methods (receiver), 3 for cue functions (receiver, invoker,
    /// cue-info).
    pub implicit_count: u16,
    /// Number of return values.
    pub ret_count: u16,
}

impl fmt::Debug for CompiledFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFunction")
            .field("name", &self.name)
            .field("code_len", &self.code.len())
            .field("reg_counts", &self.reg_counts)
            .field("param_count", &self.param_count)
            .field("implicit_count", &self.implicit_count)
            .field("ret_count", &self.ret_count)
            .finish()
    }
}

/// A set of compiled functions forming one script program.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub functions: Vec<CompiledFunction>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a function and returns its id.
    pub fn add_function(&mut self, func: CompiledFunction) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(func);
        id
    }

    pub fn get(&self, id: FunctionId) -> Option<&CompiledFunction> {
        self.functions.get(id.0 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Instruction, Opcode};

    #[test]
    fn test_program_add_get() {
        let mut program = Program::new();
        let id = program.add_function(CompiledFunction {
            name: "tick".into(),
            code: vec![Instruction::new(Opcode::RetNone, 0, 0, 0)],
            pools: ConstPools::new(),
            reg_counts: [0; 4],
            param_count: 0,
            implicit_count: 1,
            ret_count: 0,
        });
        assert_eq!(id, FunctionId(0));
        assert_eq!(program.get(id).unwrap().name, "tick");
        assert!(program.get(FunctionId(1)).is_none());
    }

    #[test]
    fn test_null_addr() {
        assert_eq!(AddrConst::NULL.kind, AddrKind::Null);
    }
}
