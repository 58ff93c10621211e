//! Bytecode definitions for the Skit virtual machine.
//!
//! The execution engine lives elsewhere; this crate only defines the data
//! the compiler back end produces: the 8-byte instruction format, the
//! opcode set of the four-bank register machine, constant pools, and
//! compiled-function records.

pub mod function;
pub mod instruction;

pub use function::{AddrConst, AddrKind, CompiledFunction, ConstPools, FunctionId, NativeId, Program};
pub use instruction::{CastKind, FlopFunc, Instruction, Opcode, RegBank};
pub use instruction::{
    CMPS_EQ, CMPS_GE, CMPS_GT, CMPS_LE, CMPS_LT, CMPS_NE, CMP_APPROX, FORM_KR, FORM_MASK, FORM_RK,
    FORM_RR, MEM_OFS_REG, MEM_SIGNED, MEM_W1, MEM_W2, MEM_W4, MEM_W8, MEM_WIDTH_MASK, PARAM_ADDR,
    PARAM_KONST, RET_KONST,
};
