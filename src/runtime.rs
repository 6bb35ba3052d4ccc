use std::{cmp::Ordering, fmt};

use crate::{
    isa::{field, s_ext},
    symbol::{Condition, Flag, Register},
};

/// Memory is a flat byte array addressed by 16 bits.
pub const MEMORY_SIZE: usize = 0x10000;
/// PC strictly above this address means the program has halted.
pub const HALT_BOUNDARY: u16 = 0xFFF4;
/// Instruction budget used when none is given.
pub const DEFAULT_BUDGET: u32 = 0xFFFF;
/// Stack pointer of a fresh machine.
pub const INITIAL_SP: u16 = 0x9FFE;

/// Represents complete program state during runtime.
pub struct RunState {
    /// System memory, big-endian words
    mem: Box<[u8; MEMORY_SIZE]>,
    /// R1..R11, IO, LR, SP, PC, FL
    reg: [u16; 16],
    /// Instructions executed so far
    cycles: u64,
}

/// Why a run stopped without faulting.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HaltReason {
    /// PC entered the reserved region above [`HALT_BOUNDARY`]
    HaltRegion,
    /// The instruction budget ran out first
    BudgetExhausted,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::HaltRegion => write!(f, "reached halt region above {HALT_BOUNDARY:#06X}"),
            HaltReason::BudgetExhausted => write!(f, "instruction budget exhausted"),
        }
    }
}

/// Execution faults. These end a run or step; the machine state is left as it was at the
/// point of the fault.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Fault {
    /// Word load, store or fetch at an odd address
    UnalignedWord { address: u16 },
    /// Taken branch, `CALL` or `RET` to an odd address
    UnalignedJump { target: u16 },
    /// Relative branch leaving the address space
    BranchOutOfRange { pc: u16, offset: i16 },
    IllegalInstruction { address: u16, instr: u16 },
    ProgramTooLarge { base: u16, len: usize },
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::UnalignedWord { address } => {
                write!(f, "Word access at odd address 0x{address:04X}")
            }
            Fault::UnalignedJump { target } => {
                write!(f, "Jump to odd address 0x{target:04X}")
            }
            Fault::BranchOutOfRange { pc, offset } => {
                write!(f, "Branch by {offset} from 0x{pc:04X} leaves the address space")
            }
            Fault::IllegalInstruction { address, instr } => {
                write!(f, "Illegal instruction 0x{instr:04X} at 0x{address:04X}")
            }
            Fault::ProgramTooLarge { base, len } => {
                write!(f, "Program of {len} words does not fit in memory at 0x{base:04X}")
            }
        }
    }
}

impl std::error::Error for Fault {}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        let mut reg = [0; 16];
        reg[Register::Sp as usize] = INITIAL_SP;
        RunState {
            mem: Box::new([0; MEMORY_SIZE]),
            reg,
            cycles: 0,
        }
    }

    /// Copy `words` into memory starting at `base` and point PC at the first one.
    pub fn load_program(&mut self, words: &[u16], base: u16) -> Result<(), Fault> {
        if base % 2 != 0 {
            return Err(Fault::UnalignedWord { address: base });
        }
        if base as usize + words.len() * 2 > MEMORY_SIZE {
            return Err(Fault::ProgramTooLarge {
                base,
                len: words.len(),
            });
        }
        for (i, word) in words.iter().enumerate() {
            let addr = base as usize + i * 2;
            self.mem[addr..addr + 2].copy_from_slice(&word.to_be_bytes());
        }
        self.set_reg(Register::Pc, base);
        Ok(())
    }

    const OP_TABLE: [fn(&mut RunState, u16) -> Result<(), Fault>; 16] = [
        Self::nop,     // 0x0
        Self::mv,      // 0x1
        Self::lb,      // 0x2
        Self::lw,      // 0x3
        Self::mvl,     // 0x4
        Self::mvh,     // 0x5
        Self::sb,      // 0x6
        Self::sw,      // 0x7
        Self::arith,   // 0x8
        Self::logic,   // 0x9
        Self::illegal, // 0xA
        Self::illegal, // 0xB
        Self::control, // 0xC
        Self::illegal, // 0xD
        Self::branch,  // 0xE
        Self::branch,  // 0xF
    ];

    /// Word at PC, without advancing.
    pub fn fetch(&self) -> Result<u16, Fault> {
        self.read_word(self.pc())
    }

    /// Advance PC past the instruction, then perform it.
    pub fn decode_and_execute(&mut self, instr: u16) -> Result<(), Fault> {
        let pc = self.pc();
        self.set_reg(Register::Pc, pc.wrapping_add(2));
        let opcode = (instr >> 12) as usize;
        let result = Self::OP_TABLE[opcode](self, instr);
        if result.is_err() {
            // Faulting instructions have no effect
            self.set_reg(Register::Pc, pc);
        }
        result
    }

    /// Fetch and execute a single instruction.
    pub fn step(&mut self) -> Result<(), Fault> {
        let instr = self.fetch()?;
        self.decode_and_execute(instr)?;
        self.cycles += 1;
        Ok(())
    }

    /// Execute at most `budget` instructions, stopping once PC enters the halt region.
    pub fn run(&mut self, budget: u32) -> Result<HaltReason, Fault> {
        for _ in 0..budget {
            if self.is_halted() {
                return Ok(HaltReason::HaltRegion);
            }
            self.step()?;
        }
        if self.is_halted() {
            return Ok(HaltReason::HaltRegion);
        }
        Ok(HaltReason::BudgetExhausted)
    }

    pub fn is_halted(&self) -> bool {
        self.pc() > HALT_BOUNDARY
    }

    // Accessors

    pub fn reg(&self, reg: Register) -> u16 {
        self.reg[reg as usize]
    }

    pub fn set_reg(&mut self, reg: Register, val: u16) {
        self.reg[reg as usize] = val;
    }

    pub fn registers(&self) -> &[u16; 16] {
        &self.reg
    }

    pub fn pc(&self) -> u16 {
        self.reg(Register::Pc)
    }

    pub fn sp(&self) -> u16 {
        self.reg(Register::Sp)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn flag(&self, flag: Flag) -> bool {
        self.reg(Register::Fl) & flag.mask() != 0
    }

    pub fn set_flag(&mut self, flag: Flag, value: bool) {
        let fl = &mut self.reg[Register::Fl as usize];
        if value {
            *fl |= flag.mask();
        } else {
            *fl &= !flag.mask();
        }
    }

    pub fn memory(&self) -> &[u8] {
        &self.mem[..]
    }

    pub fn read_byte(&self, addr: u16) -> u8 {
        self.mem[addr as usize]
    }

    pub fn write_byte(&mut self, addr: u16, val: u8) {
        self.mem[addr as usize] = val;
    }

    pub fn read_word(&self, addr: u16) -> Result<u16, Fault> {
        if addr % 2 != 0 {
            return Err(Fault::UnalignedWord { address: addr });
        }
        let addr = addr as usize;
        Ok(u16::from_be_bytes([self.mem[addr], self.mem[addr + 1]]))
    }

    pub fn write_word(&mut self, addr: u16, val: u16) -> Result<(), Fault> {
        if addr % 2 != 0 {
            return Err(Fault::UnalignedWord { address: addr });
        }
        let addr = addr as usize;
        self.mem[addr..addr + 2].copy_from_slice(&val.to_be_bytes());
        Ok(())
    }

    // Helpers

    /// Recompute Z/N/P from `val`. C and V are untouched.
    fn set_flags(&mut self, val: u16) {
        let (z, n, p) = match (val as i16).cmp(&0) {
            Ordering::Less => (false, true, false),
            Ordering::Equal => (true, false, false),
            Ordering::Greater => (false, false, true),
        };
        self.set_flag(Flag::Z, z);
        self.set_flag(Flag::N, n);
        self.set_flag(Flag::P, p);
    }

    /// Register named by a 4-bit field.
    #[inline]
    fn r(&self, code: u16) -> u16 {
        self.reg[(code & 0xF) as usize]
    }

    #[inline]
    fn r_mut(&mut self, code: u16) -> &mut u16 {
        &mut self.reg[(code & 0xF) as usize]
    }

    /// `IO` plus the sign-extended low byte of `instr`.
    #[inline]
    fn io_offset(&self, instr: u16) -> u16 {
        self.reg(Register::Io).wrapping_add(s_ext(instr, 8))
    }

    fn illegal_at(&self, instr: u16) -> Fault {
        Fault::IllegalInstruction {
            address: self.pc().wrapping_sub(2),
            instr,
        }
    }

    fn jump(&mut self, target: u16) -> Result<(), Fault> {
        if target % 2 != 0 {
            return Err(Fault::UnalignedJump { target });
        }
        self.set_reg(Register::Pc, target);
        Ok(())
    }

    // ALU

    fn alu_add(&mut self, a: u16, b: u16, carry_in: bool) -> u16 {
        let raw = a as u32 + b as u32 + carry_in as u32;
        let res = raw as u16;
        self.set_flag(Flag::C, raw > 0x7FFF);
        self.set_flag(Flag::V, (a ^ res) & (b ^ res) & 0x8000 != 0);
        self.set_flags(res);
        res
    }

    fn alu_sub(&mut self, a: u16, b: u16) -> u16 {
        let res = a.wrapping_sub(b);
        self.set_flag(Flag::C, a as i32 - b as i32 <= 0);
        self.set_flag(Flag::V, (a ^ b) & (a ^ res) & 0x8000 != 0);
        self.set_flags(res);
        res
    }

    // Instructions

    fn nop(&mut self, instr: u16) -> Result<(), Fault> {
        if instr >> 3 != 0 {
            return Err(self.illegal_at(instr));
        }
        Ok(())
    }

    fn mv(&mut self, instr: u16) -> Result<(), Fault> {
        let val = self.r(instr);
        *self.r_mut(field(instr, 4, 4)) = val;
        Ok(())
    }

    fn lb(&mut self, instr: u16) -> Result<(), Fault> {
        let val = self.read_byte(self.io_offset(instr));
        *self.r_mut(field(instr, 8, 4)) = val as u16;
        Ok(())
    }

    fn lw(&mut self, instr: u16) -> Result<(), Fault> {
        let val = self.read_word(self.io_offset(instr))?;
        *self.r_mut(field(instr, 8, 4)) = val;
        Ok(())
    }

    fn mvl(&mut self, instr: u16) -> Result<(), Fault> {
        let ra = self.r_mut(field(instr, 8, 4));
        *ra = (*ra & 0xFF00) | (instr & 0xFF);
        Ok(())
    }

    fn mvh(&mut self, instr: u16) -> Result<(), Fault> {
        let ra = self.r_mut(field(instr, 8, 4));
        *ra = (*ra & 0x00FF) | (instr << 8);
        Ok(())
    }

    fn sb(&mut self, instr: u16) -> Result<(), Fault> {
        let val = self.r(field(instr, 8, 4));
        self.write_byte(self.io_offset(instr), val as u8);
        Ok(())
    }

    fn sw(&mut self, instr: u16) -> Result<(), Fault> {
        let val = self.r(field(instr, 8, 4));
        self.write_word(self.io_offset(instr), val)
    }

    /// Second operand of `ADD`/`ADC`/`SUB`: register or sign-extended imm6.
    fn arith_operand(&self, instr: u16) -> u16 {
        if field(instr, 10, 1) != 0 {
            s_ext(instr, 6)
        } else {
            self.r(instr)
        }
    }

    /// `ADD` and `ADC`, told apart by bit 11.
    fn arith(&mut self, instr: u16) -> Result<(), Fault> {
        let ra = field(instr, 6, 4);
        let a = self.r(ra);
        let b = self.arith_operand(instr);
        let carry_in = field(instr, 11, 1) != 0 && self.flag(Flag::C);
        *self.r_mut(ra) = self.alu_add(a, b, carry_in);
        Ok(())
    }

    /// `SUB` when bit 11 is clear, otherwise the logic group selected by bits 8-10.
    fn logic(&mut self, instr: u16) -> Result<(), Fault> {
        if field(instr, 11, 1) == 0 {
            let ra = field(instr, 6, 4);
            let a = self.r(ra);
            let b = self.arith_operand(instr);
            *self.r_mut(ra) = self.alu_sub(a, b);
            return Ok(());
        }
        let ra = field(instr, 4, 4);
        let a = self.r(ra);
        let b = self.r(instr);
        let res = match field(instr, 8, 3) {
            0b000 => a & b,
            0b001 => a | b,
            0b010 => !a,
            0b011 => a ^ b,
            0b100 => a.checked_shl(b as u32).unwrap_or(0),
            0b101 => a.checked_shr(b as u32).unwrap_or(0),
            0b110 => ((a as i16) >> b.min(15)) as u16,
            _ => return Err(self.illegal_at(instr)),
        };
        *self.r_mut(ra) = res;
        Ok(())
    }

    /// `SET`, `RET`, `PUSH`, `POP` and `CALL`.
    fn control(&mut self, instr: u16) -> Result<(), Fault> {
        match field(instr, 8, 4) {
            0x1 => {
                let target = self.io_offset(instr);
                let ret = self.pc();
                self.jump(target)?;
                self.set_reg(Register::Lr, ret);
                return Ok(());
            }
            0x0 => (),
            _ => return Err(self.illegal_at(instr)),
        }
        let ra = field(instr, 0, 4);
        match field(instr, 4, 4) {
            // SET
            0x0 => {
                let val = self.r(ra);
                self.set_flags(val);
            }
            // RET
            0x1 => {
                let target = self.reg(Register::Lr);
                self.jump(target)?;
            }
            // PUSH
            0x2 => {
                let val = self.r(ra);
                let sp = self.sp().wrapping_sub(2);
                self.write_word(sp, val)?;
                self.set_reg(Register::Sp, sp);
            }
            // POP
            0x3 => {
                let sp = self.sp();
                let val = self.read_word(sp)?;
                self.set_reg(Register::Sp, sp.wrapping_add(2));
                *self.r_mut(ra) = val;
            }
            _ => return Err(self.illegal_at(instr)),
        }
        Ok(())
    }

    /// `BO*` (0xE) and `BA*` (0xF).
    fn branch(&mut self, instr: u16) -> Result<(), Fault> {
        if field(instr, 11, 1) != 0 {
            return Err(self.illegal_at(instr));
        }
        let Some(cond) = Condition::from_code(field(instr, 8, 3)) else {
            return Err(self.illegal_at(instr));
        };
        let taken = match cond {
            Condition::Always => true,
            Condition::Z => self.flag(Flag::Z),
            Condition::Nz => !self.flag(Flag::Z),
            Condition::C => self.flag(Flag::C),
            Condition::V => self.flag(Flag::V),
            Condition::N => self.flag(Flag::N),
            Condition::P => self.flag(Flag::P),
        };
        if !taken {
            return Ok(());
        }
        let target = if instr >> 12 == 0xE {
            let pc = self.pc();
            let offset = instr as u8 as i8 as i16;
            let target = pc as i32 + offset as i32;
            if !(0..=0xFFFF).contains(&target) {
                return Err(Fault::BranchOutOfRange { pc, offset });
            }
            target as u16
        } else {
            self.io_offset(instr)
        };
        self.jump(target)
    }

    fn illegal(&mut self, instr: u16) -> Result<(), Fault> {
        Err(self.illegal_at(instr))
    }
}
