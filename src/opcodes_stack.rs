/// Stack and routine call operations for Z-Machine interpreter
///
/// This module handles all stack-related opcodes including:
/// - Stack manipulation (push, pull, pop)
/// - Routine calls and returns (the call family, ret, rtrue, rfalse, ret_popped)
/// - Call stack management (catch, throw, check_arg_count)
///
/// Every call variant shares one handler: the first operand is the packed
/// routine address, the rest are arguments, and whether a result is stored
/// is decided by the instruction's store byte.
use crate::dispatch::{DispatchTable, ALL_VERSIONS};
use crate::error::VmError;
use crate::instruction::{Instruction, OperandCount};
use crate::interpreter::{ExecutionResult, Interpreter};
use log::debug;

pub(crate) fn register(table: &mut DispatchTable) {
    table.add(OperandCount::OP0, 0x00, ALL_VERSIONS, Interpreter::op_rtrue);
    table.add(OperandCount::OP0, 0x01, ALL_VERSIONS, Interpreter::op_rfalse);
    table.add(OperandCount::OP0, 0x08, ALL_VERSIONS, Interpreter::op_ret_popped);
    table.add(OperandCount::OP0, 0x09, 1..=4, Interpreter::op_pop);
    table.add(OperandCount::OP0, 0x09, 5..=8, Interpreter::op_catch);
    table.add(OperandCount::OP1, 0x08, 4..=8, Interpreter::op_call);
    table.add(OperandCount::OP1, 0x0B, ALL_VERSIONS, Interpreter::op_ret);
    table.add(OperandCount::OP1, 0x0F, 5..=8, Interpreter::op_call);
    table.add(OperandCount::OP2, 0x19, 4..=8, Interpreter::op_call);
    table.add(OperandCount::OP2, 0x1A, 5..=8, Interpreter::op_call);
    table.add(OperandCount::OP2, 0x1C, 5..=8, Interpreter::op_throw);
    table.add(OperandCount::VAR, 0x00, ALL_VERSIONS, Interpreter::op_call);
    table.add(OperandCount::VAR, 0x08, ALL_VERSIONS, Interpreter::op_push);
    table.add(OperandCount::VAR, 0x09, ALL_VERSIONS, Interpreter::op_pull);
    table.add(OperandCount::VAR, 0x0C, 4..=8, Interpreter::op_call);
    table.add(OperandCount::VAR, 0x19, 5..=8, Interpreter::op_call);
    table.add(OperandCount::VAR, 0x1A, 5..=8, Interpreter::op_call);
    table.add(OperandCount::VAR, 0x1F, 5..=8, Interpreter::op_check_arg_count);
}

impl Interpreter {
    /// call, call_vs, call_vs2, call_vn, call_vn2, call_1s, call_1n,
    /// call_2s and call_2n
    fn op_call(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let routine = self.operand(inst, operands, 0)?;
        debug!(
            "{} {:04x} with {} args",
            inst.name(self.vm.version),
            routine,
            operands.len() - 1
        );
        self.do_call(routine, &operands[1..], inst.store_var)
    }

    /// 0OP:0x00 - rtrue
    fn op_rtrue(&mut self, _: &Instruction, _: &[u16]) -> Result<ExecutionResult, VmError> {
        self.do_return(1)
    }

    /// 0OP:0x01 - rfalse
    fn op_rfalse(&mut self, _: &Instruction, _: &[u16]) -> Result<ExecutionResult, VmError> {
        self.do_return(0)
    }

    /// 1OP:0x0B - ret
    fn op_ret(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let value = self.operand(inst, operands, 0)?;
        self.do_return(value)
    }

    /// 0OP:0x08 - ret_popped
    fn op_ret_popped(&mut self, _: &Instruction, _: &[u16]) -> Result<ExecutionResult, VmError> {
        let value = self.vm.pop()?;
        debug!("ret_popped {}", value);
        self.do_return(value as u16)
    }

    /// 0OP:0x09 - pop (V1-4), discards the top of the stack
    fn op_pop(&mut self, _: &Instruction, _: &[u16]) -> Result<ExecutionResult, VmError> {
        self.vm.pop()?;
        Ok(ExecutionResult::Continue)
    }

    /// 0OP:0x09 - catch (V5+), stores the current frame count for throw
    fn op_catch(&mut self, inst: &Instruction, _: &[u16]) -> Result<ExecutionResult, VmError> {
        let depth = self.vm.call_depth() as u16;
        debug!("catch -> {}", depth);
        self.store_result(inst, depth)?;
        Ok(ExecutionResult::Continue)
    }

    /// 2OP:0x1C - throw value frame
    ///
    /// Unwinds to the frame recorded by catch and returns from it.
    fn op_throw(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let value = self.operand(inst, operands, 0)?;
        let frame = self.operand(inst, operands, 1)? as usize;
        debug!("throw {} to frame {} (depth {})", value, frame, self.vm.call_depth());
        if frame == 0 || frame > self.vm.call_depth() {
            return Err(VmError::ReturnWithoutCaller);
        }
        self.vm.call_stack.truncate(frame);
        self.do_return(value)
    }

    /// VAR:0x08 - push
    fn op_push(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let value = self.operand(inst, operands, 0)?;
        self.vm.push(value as i16)?;
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x09 - pull
    ///
    /// Pops into the variable named by the operand. Version 6 instead stores
    /// the value, popping from a user stack table when one is given.
    fn op_pull(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        if self.vm.version == 6 {
            let value = match operands.first() {
                Some(&table) => self.pop_user_stack(table as usize)?,
                None => self.vm.pop()? as u16,
            };
            self.store_result(inst, value)?;
            return Ok(ExecutionResult::Continue);
        }
        let var = self.operand(inst, operands, 0)?;
        let value = self.vm.pop()?;
        debug!("pull {} -> V{:02x}", value, var);
        self.vm.store_indirect(var, value)?;
        Ok(ExecutionResult::Continue)
    }

    /// Pop from a user stack: word 0 counts the free slots, the slots follow
    fn pop_user_stack(&mut self, table: usize) -> Result<u16, VmError> {
        let free = self.vm.memory.read_word(table)?.wrapping_add(1);
        let value = self.vm.memory.read_word(table + 2 * free as usize)?;
        self.vm.memory.write_word(table, free)?;
        Ok(value)
    }

    /// VAR:0x1F - check_arg_count
    fn op_check_arg_count(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let n = self.operand(inst, operands, 0)? as usize;
        let supplied = self.vm.current_frame()?.arg_count;
        self.do_branch(inst, n <= supplied)
    }
}
