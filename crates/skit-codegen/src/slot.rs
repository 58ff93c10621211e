//! Emission results.
//!
//! Every emitted expression yields a [`ValueSlot`] describing where its
//! value lives: a register run, a constant-pool index, or nothing at all
//! for void. Temporary registers are owned by the slot and returned to the
//! pool through [`FunctionBuilder::free_slot`](crate::builder::FunctionBuilder::free_slot).

use skit_vm::RegBank;

/// Where a slot's payload lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// A scratch register run owned by this slot.
    Temp,
    /// A register that outlives the expression (local variable, parameter,
    /// forwarded receiver). Never released by slot consumers.
    Fixed,
}

/// The result of emitting one expression.
#[derive(Debug, Clone, Copy)]
pub struct ValueSlot {
    pub bank: RegBank,
    /// First register of the run, or the constant-pool index.
    pub reg: u16,
    /// Registers in the run; 0 for void results.
    pub count: u16,
    /// When set, `reg` indexes the bank's constant pool instead.
    pub constant: bool,
    pub storage: Storage,
}

impl ValueSlot {
    /// A temporary register run.
    pub fn temp(bank: RegBank, reg: u16, count: u16) -> Self {
        Self {
            bank,
            reg,
            count,
            constant: false,
            storage: Storage::Temp,
        }
    }

    /// A long-lived register the slot does not own.
    pub fn fixed(bank: RegBank, reg: u16, count: u16) -> Self {
        Self {
            bank,
            reg,
            count,
            constant: false,
            storage: Storage::Fixed,
        }
    }

    /// A constant-pool reference.
    pub fn konst(bank: RegBank, index: u16) -> Self {
        Self {
            bank,
            reg: index,
            count: 1,
            constant: true,
            storage: Storage::Fixed,
        }
    }

    /// The result of a void expression.
    pub fn void() -> Self {
        Self {
            bank: RegBank::Int,
            reg: 0,
            count: 0,
            constant: false,
            storage: Storage::Fixed,
        }
    }

    #[inline]
    pub fn is_void(&self) -> bool {
        self.count == 0
    }

    /// True when the payload sits in an owned scratch register.
    #[inline]
    pub fn is_temp(&self) -> bool {
        !self.constant && self.storage == Storage::Temp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_kinds() {
        let t = ValueSlot::temp(RegBank::Float, 2, 3);
        assert!(t.is_temp());
        assert!(!t.is_void());

        let k = ValueSlot::konst(RegBank::Int, 5);
        assert!(!k.is_temp());
        assert!(k.constant);

        assert!(ValueSlot::void().is_void());
    }
}
