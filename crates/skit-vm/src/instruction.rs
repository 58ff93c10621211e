//! Instruction format and opcodes for the Skit register VM.
//!
//! The machine has four register banks (int, float, string, pointer).
//! Every instruction is 8 bytes: opcode, a flags byte, and three u16
//! operands. Jump targets encode as a signed 32-bit offset relative to
//! `pc + 1`, spread across the `b:c` pair.

use std::fmt;

/// The storage class a value occupies in the VM.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegBank {
    Int = 0,
    Float = 1,
    String = 2,
    Ptr = 3,
}

impl RegBank {
    /// Decodes a bank from the low two bits of a flags byte.
    #[inline]
    pub fn from_flags(flags: u8) -> Self {
        match flags & 0x3 {
            0 => RegBank::Int,
            1 => RegBank::Float,
            2 => RegBank::String,
            _ => RegBank::Ptr,
        }
    }
}

impl fmt::Display for RegBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegBank::Int => write!(f, "int"),
            RegBank::Float => write!(f, "float"),
            RegBank::String => write!(f, "string"),
            RegBank::Ptr => write!(f, "ptr"),
        }
    }
}

// Operand-form bits in `flags` for arithmetic and comparison instructions.
// RK: `c` is a constant-pool index. KR: `b` is a constant-pool index.
pub const FORM_MASK: u8 = 0x03;
pub const FORM_RR: u8 = 0x00;
pub const FORM_RK: u8 = 0x01;
pub const FORM_KR: u8 = 0x02;

/// Approximate-compare bit for `EqF`/`EqV2`/`EqV3` (and their negations).
pub const CMP_APPROX: u8 = 0x04;

// `CmpS` packs the relational operator into flags bits 2..5,
// above the operand-form bits.
pub const CMPS_EQ: u8 = 0 << 2;
pub const CMPS_NE: u8 = 1 << 2;
pub const CMPS_LT: u8 = 2 << 2;
pub const CMPS_LE: u8 = 3 << 2;
pub const CMPS_GT: u8 = 4 << 2;
pub const CMPS_GE: u8 = 5 << 2;

// `Param` flags: low two bits are the bank.
/// The param operand is a constant-pool index, not a register.
pub const PARAM_KONST: u8 = 0x04;
/// The param is passed by address (reference/output parameter).
pub const PARAM_ADDR: u8 = 0x08;

/// `Ret` flag: operand `b` is a constant-pool index.
pub const RET_KONST: u8 = 0x04;

// Load/store flags: low two bits select the access width,
// bit 2 sign-extends on load, bit 3 means `c` is an offset register.
pub const MEM_WIDTH_MASK: u8 = 0x03;
pub const MEM_W1: u8 = 0x00;
pub const MEM_W2: u8 = 0x01;
pub const MEM_W4: u8 = 0x02;
pub const MEM_W8: u8 = 0x03;
pub const MEM_SIGNED: u8 = 0x04;
pub const MEM_OFS_REG: u8 = 0x08;

/// Conversion selector for the `Cast` instruction.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    I2F = 0,
    U2F,
    F2I,
    F2U,
    I2S,
    U2S,
    F2S,
    N2S,
    S2N,
    Co2S,
    S2Co,
    So2S,
    S2So,
}

/// Single-operand float function selector for the `Flop` instruction.
/// Trigonometric entries work in degrees.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlopFunc {
    Abs = 0,
    Sqrt,
    Exp,
    Log,
    Log10,
    Ceil,
    Floor,
    Round,
    Sin,
    Cos,
    Tan,
    ASin,
    ACos,
    ATan,
}

/// 8-byte fixed instruction format.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: u8,
    pub flags: u8,
    pub a: u16,
    pub b: u16,
    pub c: u16,
}

impl Instruction {
    #[inline]
    pub const fn new(op: Opcode, a: u16, b: u16, c: u16) -> Self {
        Self {
            op: op as u8,
            flags: 0,
            a,
            b,
            c,
        }
    }

    #[inline]
    pub const fn with_flags(op: Opcode, flags: u8, a: u16, b: u16, c: u16) -> Self {
        Self {
            op: op as u8,
            flags,
            a,
            b,
            c,
        }
    }

    #[inline]
    pub fn opcode(&self) -> Opcode {
        Opcode::from_u8(self.op)
    }

    /// Signed 32-bit immediate spread across `b:c`.
    #[inline]
    pub fn imm32(&self) -> i32 {
        ((self.b as u32) | ((self.c as u32) << 16)) as i32
    }

    /// Writes a signed 32-bit immediate across `b:c`.
    #[inline]
    pub fn set_imm32(&mut self, value: i32) {
        let v = value as u32;
        self.b = (v & 0xFFFF) as u16;
        self.c = (v >> 16) as u16;
    }

    /// Jump target PC: offsets are relative to `pc + 1`.
    #[inline]
    pub fn jump_target(&self, current_pc: usize) -> usize {
        (current_pc as i64 + 1 + self.imm32() as i64) as usize
    }
}

/// Opcode set of the Skit VM.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Nop = 0,

    // === LOAD: immediates, constant pool, moves ===
    /// a = dst int reg, b:c = signed 32-bit immediate.
    LoadI,
    LoadKI,
    LoadKF,
    LoadKS,
    LoadKP,
    MoveI,
    MoveF,
    MoveS,
    MoveP,
    MoveV2,
    MoveV3,

    // === ARITH: integer (flags = operand form) ===
    AddI,
    SubI,
    MulI,
    DivI,
    DivU,
    ModI,
    ModU,
    AndI,
    OrI,
    XorI,
    ShlI,
    ShrI,
    ShrU,
    NegI,
    NotI,
    AbsI,
    MinI,
    MaxI,
    MinU,
    MaxU,

    // === ARITH: float ===
    AddF,
    SubF,
    MulF,
    DivF,
    ModF,
    PowF,
    MinF,
    MaxF,
    NegF,
    /// a = dst, b = src, flags = [`FlopFunc`].
    Flop,
    /// a = dst, b = y, c = x; result in degrees.
    Atan2F,

    // === VEC: contiguous float-register vectors ===
    AddV2,
    SubV2,
    AddV3,
    SubV3,
    /// a = dst, b = vector, c = scalar float reg.
    ScaleV2,
    ScaleV3,
    /// Vector divided by scalar; the scalar is always operand c.
    DivV2,
    DivV3,
    DotV2,
    DotV3,
    CrossV,
    NegV2,
    NegV3,
    LenV2,
    LenV3,
    UnitV2,
    UnitV3,

    // === CMP: materialize a bool into an int register ===
    EqI,
    NeI,
    LtI,
    LeI,
    GtI,
    GeI,
    LtU,
    LeU,
    GtU,
    GeU,
    EqF,
    NeF,
    LtF,
    LeF,
    GtF,
    GeF,
    /// String compare; flags bits 2..5 select the operator.
    CmpS,
    EqP,
    NeP,
    /// Vector equality into int reg; flags may carry [`CMP_APPROX`].
    EqV2,
    EqV3,

    // === STR ===
    ConcatS,

    // === CONV ===
    /// a = dst, b = src, flags = [`CastKind`].
    Cast,
    /// Bool cast: compare src against its bank's zero representation.
    /// flags low two bits = source bank.
    CastB,

    // === MEM: loads/stores through an object pointer ===
    /// a = dst, b = base ptr reg, c = byte offset (or offset reg with
    /// [`MEM_OFS_REG`]); flags carry width/signedness.
    LdI,
    LdF,
    LdS,
    LdP,
    LdV2,
    LdV3,
    StI,
    StF,
    StS,
    StP,
    StV2,
    StV3,
    /// Constant-pool indexed load: a = dst, b = pool base entry, c = index reg.
    PoolI,
    PoolF,
    PoolS,
    /// Panics at runtime if a-reg >= b:c (unsigned).
    BoundCheck,
    /// Global-table access: flags = bank, a = reg, b = global slot.
    LdG,
    StG,

    // === JUMP ===
    /// b:c = signed offset relative to pc + 1.
    Jump,
    /// Skip the next instruction unless a-reg == imm32 (b:c).
    TestI,
    /// Skip the next instruction unless string a-reg == string pool entry b.
    TestS,
    /// Indexed jump: a = index reg, b = table size; a table of `Jump`
    /// instructions follows. Out-of-range indices fall through the table.
    IJump,

    // === CALL ===
    /// flags = bank | [`PARAM_KONST`] | [`PARAM_ADDR`]; a = reg or pool
    /// index; c = register count (vectors).
    Param,
    /// a = callee ptr reg, b = param count, c = result count.
    Call,
    /// a = address-pool index, b = param count, c = result count.
    CallK,
    TailCall,
    TailCallK,
    /// Fetch call result: flags = bank, a = result index, b = dst reg,
    /// c = register count.
    Result,
    /// Virtual-table lookup: a = dst ptr reg, b = object ptr reg,
    /// c = table index.
    Vtbl,
    /// flags = bank | [`RET_KONST`]; a = result index, b = reg or pool
    /// index, c = register count.
    Ret,
    RetNone,

    Invalid = 255,
}

impl Opcode {
    const MAX_VALID: u8 = Self::RetNone as u8;

    #[inline]
    pub fn from_u8(v: u8) -> Self {
        if v <= Self::MAX_VALID {
            // SAFETY: Opcode is #[repr(u8)] with contiguous discriminants
            // up to MAX_VALID.
            unsafe { core::mem::transmute(v) }
        } else {
            Self::Invalid
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_size() {
        assert_eq!(core::mem::size_of::<Instruction>(), 8);
    }

    #[test]
    fn test_imm32_roundtrip() {
        let mut inst = Instruction::new(Opcode::Jump, 0, 0, 0);
        inst.set_imm32(-7);
        assert_eq!(inst.imm32(), -7);
        inst.set_imm32(0x12345678);
        assert_eq!(inst.imm32(), 0x12345678);
    }

    #[test]
    fn test_jump_target() {
        let mut inst = Instruction::new(Opcode::Jump, 0, 0, 0);
        inst.set_imm32(3);
        assert_eq!(inst.jump_target(10), 14);
        inst.set_imm32(-5);
        assert_eq!(inst.jump_target(10), 6);
    }

    #[test]
    fn test_opcode_roundtrip() {
        for i in 0..=Opcode::MAX_VALID {
            let op = Opcode::from_u8(i);
            assert_ne!(op, Opcode::Invalid, "opcode {} should be valid", i);
            assert_eq!(op as u8, i);
        }
        assert_eq!(Opcode::from_u8(254), Opcode::Invalid);
    }

    #[test]
    fn test_bank_from_flags() {
        assert_eq!(RegBank::from_flags(0), RegBank::Int);
        assert_eq!(RegBank::from_flags(1), RegBank::Float);
        assert_eq!(RegBank::from_flags(2), RegBank::String);
        assert_eq!(RegBank::from_flags(3), RegBank::Ptr);
        assert_eq!(RegBank::from_flags(PARAM_KONST | 1), RegBank::Float);
    }
}
