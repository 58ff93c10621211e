//! Bytecode assembly for one function.
//!
//! The builder owns the instruction stream, the four constant pools with
//! their dedup maps, the per-bank register allocators and the control-flow
//! patch stacks. Expression emitters drive it through [`ValueSlot`]s;
//! statement emitters push loop and switch frames around their bodies and
//! patch the collected jumps on the way out.

use hashbrown::HashMap;

use skit_common::symbol::{Symbol, SymbolInterner};
use skit_vm::{AddrConst, CompiledFunction, ConstPools, Instruction, Opcode, RegBank};

use crate::context::LocalId;
use crate::regpool::RegPool;
use crate::slot::ValueSlot;

/// Where a bound local's value lives.
#[derive(Debug, Clone, Copy)]
pub enum BoundLocal {
    /// An ordinary local: a register run in one bank.
    Reg { bank: RegBank, reg: u16, count: u16 },
    /// A static const array: a contiguous run of constant-pool entries.
    PoolRun { bank: RegBank, base: u16, len: u32 },
}

enum Frame {
    Loop {
        breaks: Vec<usize>,
        continues: Vec<usize>,
    },
    Switch {
        breaks: Vec<usize>,
    },
}

/// Assembles the bytecode of a single function.
pub struct FunctionBuilder<'a> {
    pub interner: &'a SymbolInterner,
    name: String,
    code: Vec<Instruction>,
    pools: ConstPools,
    int_map: HashMap<i32, u16>,
    float_map: HashMap<u64, u16>,
    string_map: HashMap<String, u16>,
    addr_map: HashMap<AddrConst, u16>,
    regs: [RegPool; 4],
    locals: Vec<Option<BoundLocal>>,
    frames: Vec<Frame>,
    param_count: u16,
    implicit_count: u16,
    ret_count: u16,
    /// Set for cue functions: the three acting-context pointers occupy
    /// ptr registers 0..3 and may be forwarded to callees wholesale.
    pub in_acting_context: bool,
}

impl<'a> FunctionBuilder<'a> {
    pub fn new(name: String, interner: &'a SymbolInterner) -> Self {
        Self {
            interner,
            name,
            code: Vec::new(),
            pools: ConstPools::new(),
            int_map: HashMap::new(),
            float_map: HashMap::new(),
            string_map: HashMap::new(),
            addr_map: HashMap::new(),
            regs: Default::default(),
            locals: Vec::new(),
            frames: Vec::new(),
            param_count: 0,
            implicit_count: 0,
            ret_count: 0,
            in_acting_context: false,
        }
    }

    /// Records the function's calling shape and pins the parameter
    /// registers at the bottom of their banks.
    pub fn set_signature(
        &mut self,
        param_count: u16,
        implicit_count: u16,
        ret_count: u16,
        bank_params: [u16; 4],
    ) {
        self.param_count = param_count;
        self.implicit_count = implicit_count;
        self.ret_count = ret_count;
        for (bank, &count) in bank_params.iter().enumerate() {
            self.regs[bank].reserve_low(count);
        }
        self.in_acting_context = implicit_count == 3;
    }

    // === instruction stream ===

    /// Next instruction's pc.
    #[inline]
    pub fn here(&self) -> usize {
        self.code.len()
    }

    pub fn emit(&mut self, op: Opcode, a: u16, b: u16, c: u16) -> usize {
        let pc = self.code.len();
        self.code.push(Instruction::new(op, a, b, c));
        pc
    }

    pub fn emit_f(&mut self, op: Opcode, flags: u8, a: u16, b: u16, c: u16) -> usize {
        let pc = self.code.len();
        self.code.push(Instruction::with_flags(op, flags, a, b, c));
        pc
    }

    /// Loads a 32-bit immediate into an int register.
    pub fn emit_load_imm(&mut self, dst: u16, value: i32) {
        let pc = self.emit(Opcode::LoadI, dst, 0, 0);
        self.code[pc].set_imm32(value);
    }

    /// Emits a forward jump with an unresolved target. Returns the pc to
    /// pass to [`patch_jump`](Self::patch_jump).
    pub fn emit_jump(&mut self) -> usize {
        self.emit(Opcode::Jump, 0, 0, 0)
    }

    /// Emits a jump to an already known (usually backward) target.
    pub fn emit_jump_to(&mut self, target: usize) {
        let at = self.emit(Opcode::Jump, 0, 0, 0);
        self.patch_jump(at, target);
    }

    /// Resolves the jump at `at` to land on `target`.
    pub fn patch_jump(&mut self, at: usize, target: usize) {
        let offset = target as i64 - (at as i64 + 1);
        self.code[at].set_imm32(offset as i32);
    }

    /// Resolves the jump at `at` to land on the next instruction.
    #[inline]
    pub fn patch_jump_here(&mut self, at: usize) {
        let target = self.here();
        self.patch_jump(at, target);
    }

    /// Emits a test-and-skip: execution falls through to the next
    /// instruction only when the int register equals `value`.
    pub fn emit_test(&mut self, reg: u16, value: i32) {
        let pc = self.emit(Opcode::TestI, reg, 0, 0);
        self.code[pc].set_imm32(value);
    }

    /// Emits a range check: execution traps unless `reg < len`.
    pub fn emit_bound_check(&mut self, reg: u16, len: u32) {
        let pc = self.emit(Opcode::BoundCheck, reg, 0, 0);
        self.code[pc].set_imm32(len as i32);
    }

    // === constant pools ===

    pub fn const_int(&mut self, value: i32) -> u16 {
        if let Some(&idx) = self.int_map.get(&value) {
            return idx;
        }
        let idx = self.pools.ints.len() as u16;
        self.pools.ints.push(value);
        self.int_map.insert(value, idx);
        idx
    }

    /// Floats dedup by bit pattern so 0.0 and -0.0 stay distinct.
    pub fn const_float(&mut self, value: f64) -> u16 {
        let bits = value.to_bits();
        if let Some(&idx) = self.float_map.get(&bits) {
            return idx;
        }
        let idx = self.pools.floats.len() as u16;
        self.pools.floats.push(value);
        self.float_map.insert(bits, idx);
        idx
    }

    pub fn const_string(&mut self, value: &str) -> u16 {
        if let Some(&idx) = self.string_map.get(value) {
            return idx;
        }
        let idx = self.pools.strings.len() as u16;
        self.pools.strings.push(value.to_string());
        self.string_map.insert(value.to_string(), idx);
        idx
    }

    /// Interned names share the string pool.
    pub fn const_name(&mut self, name: Symbol) -> u16 {
        let text = self.interner.resolve(name).unwrap_or("").to_string();
        self.const_string(&text)
    }

    pub fn const_addr(&mut self, value: AddrConst) -> u16 {
        if let Some(&idx) = self.addr_map.get(&value) {
            return idx;
        }
        let idx = self.pools.addrs.len() as u16;
        self.pools.addrs.push(value);
        self.addr_map.insert(value, idx);
        idx
    }

    // Contiguous pool runs for static const arrays. Never deduplicated:
    // indexed loads need the elements adjacent and in order.

    pub fn pool_run_int(&mut self, values: impl IntoIterator<Item = i32>) -> u16 {
        let base = self.pools.ints.len() as u16;
        self.pools.ints.extend(values);
        base
    }

    pub fn pool_run_float(&mut self, values: impl IntoIterator<Item = f64>) -> u16 {
        let base = self.pools.floats.len() as u16;
        self.pools.floats.extend(values);
        base
    }

    pub fn pool_run_string(&mut self, values: impl IntoIterator<Item = String>) -> u16 {
        let base = self.pools.strings.len() as u16;
        self.pools.strings.extend(values);
        base
    }

    // === registers ===

    pub fn acquire_temp(&mut self, bank: RegBank, count: u16) -> ValueSlot {
        let reg = self.regs[bank as usize].acquire(count);
        ValueSlot::temp(bank, reg, count)
    }

    /// Returns a slot's registers to the pool if the slot owns any.
    pub fn free_slot(&mut self, slot: &ValueSlot) {
        if slot.is_temp() && slot.count > 0 {
            self.regs[slot.bank as usize].release(slot.reg, slot.count);
        }
    }

    /// Ensures a slot's value sits in registers, loading constants from
    /// the pool when necessary.
    pub fn materialize(&mut self, slot: ValueSlot) -> ValueSlot {
        if !slot.constant {
            return slot;
        }
        let out = self.acquire_temp(slot.bank, 1);
        let op = match slot.bank {
            RegBank::Int => Opcode::LoadKI,
            RegBank::Float => Opcode::LoadKF,
            RegBank::String => Opcode::LoadKS,
            RegBank::Ptr => Opcode::LoadKP,
        };
        self.emit(op, out.reg, slot.reg, 0);
        out
    }

    /// Ensures a slot is a scratch register the caller may clobber:
    /// constants load, fixed registers copy, temporaries pass through.
    pub fn to_temp(&mut self, slot: ValueSlot) -> ValueSlot {
        if slot.is_temp() {
            return slot;
        }
        let count = if slot.constant { 1 } else { slot.count };
        let out = self.acquire_temp(slot.bank, count);
        self.move_into(&slot, out.reg);
        out
    }

    /// Moves a slot's value into a caller-chosen register run.
    pub fn move_into(&mut self, slot: &ValueSlot, dst_reg: u16) {
        if slot.constant {
            let op = match slot.bank {
                RegBank::Int => Opcode::LoadKI,
                RegBank::Float => Opcode::LoadKF,
                RegBank::String => Opcode::LoadKS,
                RegBank::Ptr => Opcode::LoadKP,
            };
            self.emit(op, dst_reg, slot.reg, 0);
            return;
        }
        if slot.reg == dst_reg {
            return;
        }
        let op = match (slot.bank, slot.count) {
            (RegBank::Float, 2) => Opcode::MoveV2,
            (RegBank::Float, 3) => Opcode::MoveV3,
            (RegBank::Int, _) => Opcode::MoveI,
            (RegBank::Float, _) => Opcode::MoveF,
            (RegBank::String, _) => Opcode::MoveS,
            (RegBank::Ptr, _) => Opcode::MoveP,
        };
        self.emit(op, dst_reg, slot.reg, 0);
    }

    // === locals ===

    fn local_slot(&mut self, id: LocalId) -> &mut Option<BoundLocal> {
        let idx = id.0 as usize;
        if self.locals.len() <= idx {
            self.locals.resize(idx + 1, None);
        }
        &mut self.locals[idx]
    }

    /// Allocates and binds registers for a declared local.
    pub fn bind_local(&mut self, id: LocalId, bank: RegBank, count: u16) -> u16 {
        let reg = self.regs[bank as usize].acquire(count);
        *self.local_slot(id) = Some(BoundLocal::Reg { bank, reg, count });
        reg
    }

    /// Binds a parameter local to its reserved low register, which
    /// [`set_signature`](Self::set_signature) already pinned.
    pub fn bind_param(&mut self, id: LocalId, bank: RegBank, reg: u16, count: u16) {
        *self.local_slot(id) = Some(BoundLocal::Reg { bank, reg, count });
    }

    /// Binds a local directly to a temporary's registers, taking them over
    /// without a copy.
    pub fn adopt_local(&mut self, id: LocalId, slot: &ValueSlot) {
        debug_assert!(slot.is_temp(), "can only adopt an owned temporary");
        *self.local_slot(id) = Some(BoundLocal::Reg {
            bank: slot.bank,
            reg: slot.reg,
            count: slot.count,
        });
    }

    /// Binds a static const array to its pool run.
    pub fn bind_static_array(&mut self, id: LocalId, bank: RegBank, base: u16, len: u32) {
        *self.local_slot(id) = Some(BoundLocal::PoolRun { bank, base, len });
    }

    /// The binding for a resolved local. Panics on use before declaration,
    /// which resolution has already ruled out.
    pub fn local(&self, id: LocalId) -> BoundLocal {
        self.locals[id.0 as usize].expect("local used before its declaration was emitted")
    }

    /// Unbinds a local at scope exit, releasing its registers.
    pub fn free_local(&mut self, id: LocalId) {
        if let Some(bound) = self.local_slot(id).take() {
            if let BoundLocal::Reg { bank, reg, count } = bound {
                self.regs[bank as usize].release(reg, count);
            }
        }
    }

    // === control-flow frames ===

    pub fn push_loop(&mut self) {
        self.frames.push(Frame::Loop {
            breaks: Vec::new(),
            continues: Vec::new(),
        });
    }

    /// Pops a loop frame, patching breaks to the next instruction and
    /// continues to `continue_target`.
    pub fn pop_loop(&mut self, continue_target: usize) {
        match self.frames.pop() {
            Some(Frame::Loop { breaks, continues }) => {
                for at in breaks {
                    self.patch_jump_here(at);
                }
                for at in continues {
                    self.patch_jump(at, continue_target);
                }
            }
            _ => unreachable!("unbalanced loop frame"),
        }
    }

    pub fn push_switch(&mut self) {
        self.frames.push(Frame::Switch { breaks: Vec::new() });
    }

    /// Pops a switch frame, patching breaks to the next instruction.
    pub fn pop_switch(&mut self) {
        match self.frames.pop() {
            Some(Frame::Switch { breaks }) => {
                for at in breaks {
                    self.patch_jump_here(at);
                }
            }
            _ => unreachable!("unbalanced switch frame"),
        }
    }

    /// Emits a break jump recorded against the innermost loop or switch.
    pub fn emit_break(&mut self) {
        let at = self.emit_jump();
        match self.frames.last_mut() {
            Some(Frame::Loop { breaks, .. }) | Some(Frame::Switch { breaks }) => breaks.push(at),
            None => unreachable!("break outside of loop or switch"),
        }
    }

    /// Emits a continue jump recorded against the innermost loop.
    pub fn emit_continue(&mut self) {
        let at = self.emit_jump();
        for frame in self.frames.iter_mut().rev() {
            if let Frame::Loop { continues, .. } = frame {
                continues.push(at);
                return;
            }
        }
        unreachable!("continue outside of loop");
    }

    // === finish ===

    pub fn finish(self) -> CompiledFunction {
        let reg_counts = [
            self.regs[0].high_water(),
            self.regs[1].high_water(),
            self.regs[2].high_water(),
            self.regs[3].high_water(),
        ];
        CompiledFunction {
            name: self.name,
            code: self.code,
            pools: self.pools,
            reg_counts,
            param_count: self.param_count,
            implicit_count: self.implicit_count,
            ret_count: self.ret_count,
        }
    }

    /// The instruction at `pc`, for peephole checks and tests.
    #[inline]
    pub fn instruction(&self, pc: usize) -> &Instruction {
        &self.code[pc]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(interner: &SymbolInterner) -> FunctionBuilder<'_> {
        FunctionBuilder::new("test".into(), interner)
    }

    #[test]
    fn test_const_dedup() {
        let interner = SymbolInterner::new();
        let mut b = builder(&interner);
        assert_eq!(b.const_int(42), b.const_int(42));
        assert_ne!(b.const_int(42), b.const_int(43));
        assert_eq!(b.const_float(1.5), b.const_float(1.5));
        // Bit-pattern dedup keeps signed zeros apart.
        assert_ne!(b.const_float(0.0), b.const_float(-0.0));
        assert_eq!(b.const_string("a"), b.const_string("a"));
    }

    #[test]
    fn test_pool_runs_not_deduped() {
        let interner = SymbolInterner::new();
        let mut b = builder(&interner);
        b.const_int(7);
        let base = b.pool_run_int([7, 7, 7]);
        assert_eq!(base, 1);
        let f = b.finish();
        assert_eq!(f.pools.ints, vec![7, 7, 7, 7]);
    }

    #[test]
    fn test_jump_patching() {
        let interner = SymbolInterner::new();
        let mut b = builder(&interner);
        let j = b.emit_jump();
        b.emit(Opcode::Nop, 0, 0, 0);
        b.emit(Opcode::Nop, 0, 0, 0);
        b.patch_jump_here(j);
        let f = b.finish();
        assert_eq!(f.code[j].imm32(), 2);
        assert_eq!(f.code[j].jump_target(j), 3);
    }

    #[test]
    fn test_backward_jump() {
        let interner = SymbolInterner::new();
        let mut b = builder(&interner);
        let top = b.here();
        b.emit(Opcode::Nop, 0, 0, 0);
        b.emit_jump_to(top);
        let f = b.finish();
        assert_eq!(f.code[1].imm32(), -2);
        assert_eq!(f.code[1].jump_target(1), 0);
    }

    #[test]
    fn test_loop_frame_patching() {
        let interner = SymbolInterner::new();
        let mut b = builder(&interner);
        b.push_loop();
        let top = b.here();
        b.emit(Opcode::Nop, 0, 0, 0);
        b.emit_break();
        b.emit_continue();
        b.pop_loop(top);
        let f = b.finish();
        // break lands after the loop, continue back on top.
        assert_eq!(f.code[1].jump_target(1), 3);
        assert_eq!(f.code[2].jump_target(2), top);
    }

    #[test]
    fn test_local_binding_lifecycle() {
        let interner = SymbolInterner::new();
        let mut b = builder(&interner);
        let id = LocalId(0);
        let reg = b.bind_local(id, RegBank::Int, 1);
        match b.local(id) {
            BoundLocal::Reg { bank, reg: r, count } => {
                assert_eq!(bank, RegBank::Int);
                assert_eq!(r, reg);
                assert_eq!(count, 1);
            }
            _ => panic!("expected register binding"),
        }
        b.free_local(id);
        // Register comes back to the pool.
        let again = b.acquire_temp(RegBank::Int, 1);
        assert_eq!(again.reg, reg);
    }

    #[test]
    fn test_materialize_constant() {
        let interner = SymbolInterner::new();
        let mut b = builder(&interner);
        let k = b.const_float(2.5);
        let slot = ValueSlot::konst(RegBank::Float, k);
        let m = b.materialize(slot);
        assert!(!m.constant);
        let f = b.finish();
        assert_eq!(f.code[0].opcode(), Opcode::LoadKF);
        assert_eq!(f.code[0].b, k);
    }
}
