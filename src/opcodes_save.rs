/// Save, restore, undo and restart operations
///
/// Snapshots record the address of the save instruction. A successful
/// restore decodes that instruction again and resumes after it as if the
/// save had just succeeded: the branch is taken in versions 1-3, and 2 is
/// stored in later versions.
use crate::dispatch::{DispatchTable, ALL_VERSIONS};
use crate::error::VmError;
use crate::header::FLAGS2;
use crate::instruction::{Instruction, OperandCount};
use crate::interpreter::{ExecutionResult, Interpreter};
use crate::persistence::Snapshot;
use log::{debug, info, warn};

pub(crate) fn register(table: &mut DispatchTable) {
    table.add(OperandCount::OP0, 0x05, 1..=4, Interpreter::op_save);
    table.add(OperandCount::OP0, 0x06, 1..=4, Interpreter::op_restore);
    table.add(OperandCount::OP0, 0x07, ALL_VERSIONS, Interpreter::op_restart);
    table.add(OperandCount::EXT, 0x00, 5..=8, Interpreter::op_save);
    table.add(OperandCount::EXT, 0x01, 5..=8, Interpreter::op_restore);
    table.add(OperandCount::EXT, 0x09, 5..=8, Interpreter::op_save_undo);
    table.add(OperandCount::EXT, 0x0A, 5..=8, Interpreter::op_restore_undo);
}

/// Flags 2 bits that survive restore and restart: transcripting and fixed pitch
const PRESERVED_FLAGS2: u16 = 0x0003;

/// Result stored by a save instruction when execution resumes from a restore
const RESTORED: u16 = 2;

impl Interpreter {
    /// Report a save or restore outcome: branch in V1-3, store 0/1 later
    fn report_outcome(&mut self, inst: &Instruction, success: bool) -> Result<ExecutionResult, VmError> {
        if self.vm.version <= 3 {
            self.do_branch(inst, success)
        } else {
            self.store_result(inst, success as u16)?;
            Ok(ExecutionResult::Continue)
        }
    }

    /// Put a snapshot back and continue after the instruction that took it
    fn resume_from(&mut self, snapshot: &Snapshot) -> Result<ExecutionResult, VmError> {
        let flags2 = self.vm.memory.read_word(FLAGS2)?;
        let save_pc = snapshot.apply(&mut self.vm, &self.original)?;
        let restored_flags = self.vm.memory.read_word(FLAGS2)?;
        self.vm.memory.write_word(
            FLAGS2,
            (restored_flags & !PRESERVED_FLAGS2) | (flags2 & PRESERVED_FLAGS2),
        )?;
        self.configure_header()?;

        let save = Instruction::decode(&self.vm.memory, save_pc, self.vm.version)?;
        self.vm.pc = save_pc + save.size;
        info!("Resuming after {} at {:05x}", save.name(self.vm.version), save_pc);
        if self.vm.version <= 3 {
            self.do_branch(&save, true)
        } else {
            self.store_result(&save, RESTORED)?;
            Ok(ExecutionResult::Continue)
        }
    }

    /// 0OP:0x05 (V1-4) and EXT:0x00 (V5+) - save
    fn op_save(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        if !operands.is_empty() {
            warn!("save of a memory region is not supported");
            return self.report_outcome(inst, false);
        }
        let snapshot = Snapshot::capture(&self.vm, &self.original, self.current_pc)?;
        let saved = match self.persistence.as_deref_mut() {
            Some(persistence) => persistence.save(snapshot)?,
            None => {
                warn!("save: no persistence available");
                false
            }
        };
        debug!("save -> {}", saved);
        self.report_outcome(inst, saved)
    }

    /// 0OP:0x06 (V1-4) and EXT:0x01 (V5+) - restore
    fn op_restore(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        if !operands.is_empty() {
            warn!("restore of a memory region is not supported");
            return self.report_outcome(inst, false);
        }
        let snapshot = match self.persistence.as_deref_mut() {
            Some(persistence) => persistence.restore()?,
            None => {
                warn!("restore: no persistence available");
                None
            }
        };
        match snapshot {
            Some(snapshot) => self.resume_from(&snapshot),
            None => self.report_outcome(inst, false),
        }
    }

    /// EXT:0x09 - save_undo
    fn op_save_undo(&mut self, inst: &Instruction, _: &[u16]) -> Result<ExecutionResult, VmError> {
        self.undo = Some(Snapshot::capture(&self.vm, &self.original, self.current_pc)?);
        self.store_result(inst, 1)?;
        Ok(ExecutionResult::Continue)
    }

    /// EXT:0x0A - restore_undo; stores 0 when nothing was saved
    fn op_restore_undo(&mut self, inst: &Instruction, _: &[u16]) -> Result<ExecutionResult, VmError> {
        match self.undo.clone() {
            Some(snapshot) => self.resume_from(&snapshot),
            None => {
                self.store_result(inst, 0)?;
                Ok(ExecutionResult::Continue)
            }
        }
    }

    /// 0OP:0x07 - restart
    fn op_restart(&mut self, _: &Instruction, _: &[u16]) -> Result<ExecutionResult, VmError> {
        info!("Restarting story");
        let preserved = self.vm.memory.read_word(FLAGS2)? & PRESERVED_FLAGS2;
        let dynamic = self.vm.header().static_memory_base()? as usize;
        let image = self.original.get(..dynamic).ok_or(VmError::AddressOutOfRange {
            addr: dynamic,
            len: self.original.len(),
        })?;
        self.vm.memory.write_slice(0, image)?;
        let flags2 = self.vm.memory.read_word(FLAGS2)?;
        self.vm.memory.write_word(FLAGS2, flags2 | preserved)?;

        self.vm.reset()?;
        self.configure_header()?;
        self.reset_output_streams();
        Ok(ExecutionResult::Continue)
    }
}
