/// Memory operations for Z-Machine interpreter
///
/// This module handles all memory access operations including:
/// - Variable operations (load, store, inc, dec) addressed by operand
/// - Word operations (loadw, storew) - 16-bit values at array offsets
/// - Byte operations (loadb, storeb) - 8-bit values at array offsets
/// - Table operations (copy_table, scan_table)
///
/// Variables named by an operand are accessed indirectly: variable 0 reads
/// or replaces the top of the stack instead of popping or pushing.
use crate::dispatch::{DispatchTable, ALL_VERSIONS};
use crate::error::VmError;
use crate::instruction::{Instruction, OperandCount};
use crate::interpreter::{ExecutionResult, Interpreter};
use log::debug;

pub(crate) fn register(table: &mut DispatchTable) {
    table.add(OperandCount::OP1, 0x05, ALL_VERSIONS, Interpreter::op_inc);
    table.add(OperandCount::OP1, 0x06, ALL_VERSIONS, Interpreter::op_dec);
    table.add(OperandCount::OP1, 0x0E, ALL_VERSIONS, Interpreter::op_load);
    table.add(OperandCount::OP2, 0x0D, ALL_VERSIONS, Interpreter::op_store);
    table.add(OperandCount::OP2, 0x0F, ALL_VERSIONS, Interpreter::op_loadw);
    table.add(OperandCount::OP2, 0x10, ALL_VERSIONS, Interpreter::op_loadb);
    table.add(OperandCount::VAR, 0x01, ALL_VERSIONS, Interpreter::op_storew);
    table.add(OperandCount::VAR, 0x02, ALL_VERSIONS, Interpreter::op_storeb);
    table.add(OperandCount::VAR, 0x17, 4..=8, Interpreter::op_scan_table);
    table.add(OperandCount::VAR, 0x1D, 5..=8, Interpreter::op_copy_table);
}

/// Default scan_table form: word entries, two bytes apart
const DEFAULT_SCAN_FORM: u16 = 0x82;

/// Array element address; offsets wrap within the 16-bit address space
fn element(array: u16, offset: u16) -> usize {
    array.wrapping_add(offset) as usize
}

impl Interpreter {
    /// 1OP:0x05 - inc
    fn op_inc(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let var = self.operand(inst, operands, 0)?;
        let value = self.vm.load_indirect(var)?.wrapping_add(1);
        self.vm.store_indirect(var, value)?;
        Ok(ExecutionResult::Continue)
    }

    /// 1OP:0x06 - dec
    fn op_dec(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let var = self.operand(inst, operands, 0)?;
        let value = self.vm.load_indirect(var)?.wrapping_sub(1);
        self.vm.store_indirect(var, value)?;
        Ok(ExecutionResult::Continue)
    }

    /// 1OP:0x0E - load
    fn op_load(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let var = self.operand(inst, operands, 0)?;
        let value = self.vm.load_indirect(var)?;
        self.store_result(inst, value as u16)?;
        Ok(ExecutionResult::Continue)
    }

    /// 2OP:0x0D - store
    fn op_store(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let var = self.operand(inst, operands, 0)?;
        let value = self.operand(inst, operands, 1)?;
        debug!("store: var={:02x}, value={}", var, value as i16);
        self.vm.store_indirect(var, value as i16)?;
        Ok(ExecutionResult::Continue)
    }

    /// 2OP:0x0F - loadw
    fn op_loadw(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let array = self.operand(inst, operands, 0)?;
        let index = self.operand(inst, operands, 1)?;
        let value = self.vm.memory.read_word(element(array, index.wrapping_mul(2)))?;
        self.store_result(inst, value)?;
        Ok(ExecutionResult::Continue)
    }

    /// 2OP:0x10 - loadb
    fn op_loadb(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let array = self.operand(inst, operands, 0)?;
        let index = self.operand(inst, operands, 1)?;
        let value = self.vm.memory.read_byte(element(array, index))?;
        self.store_result(inst, value as u16)?;
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x01 - storew
    fn op_storew(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let array = self.operand(inst, operands, 0)?;
        let index = self.operand(inst, operands, 1)?;
        let value = self.operand(inst, operands, 2)?;
        self.vm
            .memory
            .write_word(element(array, index.wrapping_mul(2)), value)?;
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x02 - storeb
    fn op_storeb(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let array = self.operand(inst, operands, 0)?;
        let index = self.operand(inst, operands, 1)?;
        let value = self.operand(inst, operands, 2)?;
        self.vm.memory.write_byte(element(array, index), value as u8)?;
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x17 - scan_table x table len [form]
    ///
    /// Bit 7 of form selects word entries; bits 0-6 give the entry size in
    /// bytes. Stores the address of the first match (or 0) and branches if
    /// one was found.
    fn op_scan_table(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let target = self.operand(inst, operands, 0)?;
        let table = self.operand(inst, operands, 1)? as usize;
        let len = self.operand(inst, operands, 2)? as usize;
        let form = operands.get(3).copied().unwrap_or(DEFAULT_SCAN_FORM);
        let words = form & 0x80 != 0;
        let entry_size = (form & 0x7F) as usize;

        let mut found = None;
        for i in 0..len {
            let addr = table + i * entry_size;
            let value = if words {
                self.vm.memory.read_word(addr)?
            } else {
                self.vm.memory.read_byte(addr)? as u16
            };
            if value == target {
                found = Some(addr);
                break;
            }
        }
        debug!(
            "scan_table {:04x} in {:04x} len {} form {:02x} -> {:?}",
            target, table, len, form, found
        );
        self.store_result(inst, found.unwrap_or(0) as u16)?;
        self.do_branch(inst, found.is_some())
    }

    /// VAR:0x1D - copy_table first second size
    ///
    /// A zero `second` clears `size` bytes of `first`. A negative size forces
    /// a byte-by-byte forward copy even when the tables overlap; otherwise
    /// the copy behaves as if through a temporary buffer.
    fn op_copy_table(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let first = self.operand(inst, operands, 0)? as usize;
        let second = self.operand(inst, operands, 1)? as usize;
        let size = self.operand(inst, operands, 2)? as i16;
        let len = size.unsigned_abs() as usize;
        debug!("copy_table {:04x} -> {:04x}, size {}", first, second, size);

        if second == 0 {
            self.vm.memory.write_slice(first, &vec![0; len])?;
        } else if size < 0 {
            for i in 0..len {
                let byte = self.vm.memory.read_byte(first + i)?;
                self.vm.memory.write_byte(second + i, byte)?;
            }
        } else {
            let data = self.vm.memory.slice(first, len)?.to_vec();
            self.vm.memory.write_slice(second, &data)?;
        }
        Ok(ExecutionResult::Continue)
    }
}
