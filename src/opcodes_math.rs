/// Mathematical and logical operations for Z-Machine interpreter
///
/// This module handles all arithmetic and bitwise operations including:
/// - Arithmetic operations (add, sub, mul, div, mod) on signed 16-bit values
/// - Bitwise operations (and, or, not) on raw bit patterns
/// - Shifts (log_shift, art_shift) and the random number generator
///
/// Division and modulo by zero are fatal and leave the store variable
/// untouched.
use crate::dispatch::{DispatchTable, ALL_VERSIONS};
use crate::error::VmError;
use crate::instruction::{Instruction, OperandCount};
use crate::interpreter::{ExecutionResult, Interpreter};
use log::debug;

pub(crate) fn register(table: &mut DispatchTable) {
    table.add(OperandCount::OP2, 0x08, ALL_VERSIONS, Interpreter::op_or);
    table.add(OperandCount::OP2, 0x09, ALL_VERSIONS, Interpreter::op_and);
    table.add(OperandCount::OP2, 0x14, ALL_VERSIONS, Interpreter::op_add);
    table.add(OperandCount::OP2, 0x15, ALL_VERSIONS, Interpreter::op_sub);
    table.add(OperandCount::OP2, 0x16, ALL_VERSIONS, Interpreter::op_mul);
    table.add(OperandCount::OP2, 0x17, ALL_VERSIONS, Interpreter::op_div);
    table.add(OperandCount::OP2, 0x18, ALL_VERSIONS, Interpreter::op_mod);
    table.add(OperandCount::OP1, 0x0F, 1..=4, Interpreter::op_not);
    table.add(OperandCount::VAR, 0x18, 5..=8, Interpreter::op_not);
    table.add(OperandCount::VAR, 0x07, ALL_VERSIONS, Interpreter::op_random);
    table.add(OperandCount::EXT, 0x02, 5..=8, Interpreter::op_log_shift);
    table.add(OperandCount::EXT, 0x03, 5..=8, Interpreter::op_art_shift);
}

impl Interpreter {
    /// Both operands as signed values
    fn signed_pair(&self, inst: &Instruction, operands: &[u16]) -> Result<(i16, i16), VmError> {
        Ok((
            self.operand(inst, operands, 0)? as i16,
            self.operand(inst, operands, 1)? as i16,
        ))
    }

    /// 2OP:0x08 - or (bitwise OR)
    fn op_or(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let (a, b) = (self.operand(inst, operands, 0)?, self.operand(inst, operands, 1)?);
        self.store_result(inst, a | b)?;
        Ok(ExecutionResult::Continue)
    }

    /// 2OP:0x09 - and (bitwise AND)
    fn op_and(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let (a, b) = (self.operand(inst, operands, 0)?, self.operand(inst, operands, 1)?);
        self.store_result(inst, a & b)?;
        Ok(ExecutionResult::Continue)
    }

    fn op_add(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let (a, b) = self.signed_pair(inst, operands)?;
        debug!("add {} {}", a, b);
        self.store_result(inst, a.wrapping_add(b) as u16)?;
        Ok(ExecutionResult::Continue)
    }

    fn op_sub(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let (a, b) = self.signed_pair(inst, operands)?;
        debug!("sub {} {}", a, b);
        self.store_result(inst, a.wrapping_sub(b) as u16)?;
        Ok(ExecutionResult::Continue)
    }

    fn op_mul(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let (a, b) = self.signed_pair(inst, operands)?;
        debug!("mul {} {}", a, b);
        self.store_result(inst, a.wrapping_mul(b) as u16)?;
        Ok(ExecutionResult::Continue)
    }

    /// 2OP:0x17 - div (signed division, truncating toward zero)
    fn op_div(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let (a, b) = self.signed_pair(inst, operands)?;
        debug!("div {} {}", a, b);
        if b == 0 {
            return Err(VmError::DivisionByZero);
        }
        self.store_result(inst, a.wrapping_div(b) as u16)?;
        Ok(ExecutionResult::Continue)
    }

    /// 2OP:0x18 - mod (remainder takes the sign of the dividend)
    fn op_mod(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let (a, b) = self.signed_pair(inst, operands)?;
        debug!("mod {} {}", a, b);
        if b == 0 {
            return Err(VmError::DivisionByZero);
        }
        self.store_result(inst, a.wrapping_rem(b) as u16)?;
        Ok(ExecutionResult::Continue)
    }

    /// 1OP:0x0F (V1-4) and VAR:0x18 (V5+) - not
    fn op_not(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let value = self.operand(inst, operands, 0)?;
        self.store_result(inst, !value)?;
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x07 - random
    ///
    /// A positive range yields 1..=range. A negative range seeds the generator
    /// predictably and zero reseeds it randomly; both store 0.
    fn op_random(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let range = self.operand(inst, operands, 0)? as i16;
        let result = if range > 0 {
            self.rng.gen_range(range as u16)
        } else {
            self.rng.reseed(range.unsigned_abs() as u64);
            0
        };
        debug!("random {} -> {}", range, result);
        self.store_result(inst, result)?;
        Ok(ExecutionResult::Continue)
    }

    /// EXT:0x02 - log_shift (zeros shifted in from either side)
    fn op_log_shift(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let number = self.operand(inst, operands, 0)?;
        let places = self.operand(inst, operands, 1)? as i16;
        let result = match places {
            0 => number,
            1..=15 => number << places,
            -15..=-1 => number >> -places,
            _ => 0,
        };
        self.store_result(inst, result)?;
        Ok(ExecutionResult::Continue)
    }

    /// EXT:0x03 - art_shift (sign preserved on right shifts)
    fn op_art_shift(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let number = self.operand(inst, operands, 0)? as i16;
        let places = self.operand(inst, operands, 1)? as i16;
        let result = match places {
            0 => number,
            1..=15 => number << places,
            -15..=-1 => number >> -places,
            _ if places > 0 => 0,
            _ => number >> 15,
        };
        self.store_result(inst, result as u16)?;
        Ok(ExecutionResult::Continue)
    }
}
