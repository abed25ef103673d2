//! Comparisons, jumps and the other control flow opcodes.

use crate::dispatch::{DispatchTable, ALL_VERSIONS};
use crate::error::VmError;
use crate::instruction::{Instruction, OperandCount};
use crate::interpreter::{ExecutionResult, Interpreter};
use log::{debug, info};

pub(crate) fn register(table: &mut DispatchTable) {
    table.add(OperandCount::OP2, 0x01, ALL_VERSIONS, Interpreter::op_je);
    table.add(OperandCount::OP2, 0x02, ALL_VERSIONS, Interpreter::op_jl);
    table.add(OperandCount::OP2, 0x03, ALL_VERSIONS, Interpreter::op_jg);
    table.add(OperandCount::OP2, 0x04, ALL_VERSIONS, Interpreter::op_dec_chk);
    table.add(OperandCount::OP2, 0x05, ALL_VERSIONS, Interpreter::op_inc_chk);
    table.add(OperandCount::OP2, 0x07, ALL_VERSIONS, Interpreter::op_test);
    table.add(OperandCount::OP1, 0x00, ALL_VERSIONS, Interpreter::op_jz);
    table.add(OperandCount::OP1, 0x0C, ALL_VERSIONS, Interpreter::op_jump);
    table.add(OperandCount::OP0, 0x04, ALL_VERSIONS, Interpreter::op_nop);
    table.add(OperandCount::OP0, 0x0A, ALL_VERSIONS, Interpreter::op_quit);
    table.add(OperandCount::OP0, 0x0D, 3..=8, Interpreter::op_verify);
    table.add(OperandCount::OP0, 0x0F, 5..=8, Interpreter::op_piracy);
}

impl Interpreter {
    /// 2OP:0x01 - je a b [c d]: branch if a equals any of the others
    fn op_je(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let a = self.operand(inst, operands, 0)?;
        self.operand(inst, operands, 1)?;
        let condition = operands[1..].contains(&a);
        self.do_branch(inst, condition)
    }

    /// 2OP:0x02 - jl (signed)
    fn op_jl(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let a = self.operand(inst, operands, 0)? as i16;
        let b = self.operand(inst, operands, 1)? as i16;
        self.do_branch(inst, a < b)
    }

    /// 2OP:0x03 - jg (signed)
    fn op_jg(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let a = self.operand(inst, operands, 0)? as i16;
        let b = self.operand(inst, operands, 1)? as i16;
        self.do_branch(inst, a > b)
    }

    /// 2OP:0x05 - inc_chk (variable) value
    ///
    /// Increments the named variable and branches if the new value is
    /// greater than `value`, both compared as signed numbers. Variable 0 is
    /// the top of the stack, updated in place.
    fn op_inc_chk(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let var = self.operand(inst, operands, 0)?;
        let limit = self.operand(inst, operands, 1)? as i16;
        let value = self.vm.load_indirect(var)?.wrapping_add(1);
        self.vm.store_indirect(var, value)?;
        debug!("inc_chk V{:02x} now {} > {}", var, value, limit);
        self.do_branch(inst, value > limit)
    }

    /// 2OP:0x04 - dec_chk (variable) value: branch if the new value is less
    fn op_dec_chk(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let var = self.operand(inst, operands, 0)?;
        let limit = self.operand(inst, operands, 1)? as i16;
        let value = self.vm.load_indirect(var)?.wrapping_sub(1);
        self.vm.store_indirect(var, value)?;
        debug!("dec_chk V{:02x} now {} < {}", var, value, limit);
        self.do_branch(inst, value < limit)
    }

    /// 2OP:0x07 - test bitmap flags: branch if all flags are set in bitmap
    fn op_test(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let bitmap = self.operand(inst, operands, 0)?;
        let flags = self.operand(inst, operands, 1)?;
        self.do_branch(inst, bitmap & flags == flags)
    }

    fn op_jz(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let a = self.operand(inst, operands, 0)?;
        self.do_branch(inst, a == 0)
    }

    /// 1OP:0x0C - jump by a signed offset, same arithmetic as a branch
    fn op_jump(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let offset = self.operand(inst, operands, 0)? as i16;
        self.jump_relative(offset)?;
        Ok(ExecutionResult::Branched)
    }

    fn op_nop(&mut self, _: &Instruction, _: &[u16]) -> Result<ExecutionResult, VmError> {
        Ok(ExecutionResult::Continue)
    }

    fn op_quit(&mut self, _: &Instruction, _: &[u16]) -> Result<ExecutionResult, VmError> {
        info!("quit at {:05x}", self.current_pc);
        Ok(ExecutionResult::Quit)
    }

    /// 0OP:0x0D - verify: checksum of the story file from byte 0x40 up to
    /// the declared file length, against the header checksum
    fn op_verify(&mut self, inst: &Instruction, _: &[u16]) -> Result<ExecutionResult, VmError> {
        let header = self.vm.header();
        let expected = header.checksum()?;
        let length = header.file_length()?.min(self.original.len());
        let sum = self
            .original
            .get(0x40..length)
            .unwrap_or(&[])
            .iter()
            .fold(0u16, |sum, &b| sum.wrapping_add(b as u16));
        debug!("verify: computed {:04x}, header {:04x}", sum, expected);
        self.do_branch(inst, sum == expected)
    }

    /// 0OP:0x0F - piracy: this interpreter always vouches for the disc
    fn op_piracy(&mut self, inst: &Instruction, _: &[u16]) -> Result<ExecutionResult, VmError> {
        self.do_branch(inst, true)
    }
}
