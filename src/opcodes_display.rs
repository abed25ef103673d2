/// Display operations for Z-Machine interpreter
///
/// This module handles the screen model opcodes:
/// - Window management (split_window, set_window, erase_window, erase_line)
/// - Cursor control (set_cursor, get_cursor)
/// - Text styling (set_text_style, set_colour, set_font, buffer_mode)
/// - The version 3 status line (show_status)
/// - Audio feedback (sound_effect), accepted and ignored
///
/// Text itself goes through the output streams; the screen only tracks
/// layout and style.
use crate::dispatch::{DispatchTable, ALL_VERSIONS};
use crate::display::StatusLine;
use crate::error::VmError;
use crate::instruction::{Instruction, OperandCount};
use crate::interpreter::{ExecutionResult, Interpreter};
use log::{debug, warn};

pub(crate) fn register(table: &mut DispatchTable) {
    table.add(OperandCount::OP0, 0x0C, ALL_VERSIONS, Interpreter::op_show_status);
    table.add(OperandCount::OP2, 0x1B, 5..=8, Interpreter::op_set_colour);
    table.add(OperandCount::VAR, 0x0A, 3..=8, Interpreter::op_split_window);
    table.add(OperandCount::VAR, 0x0B, 3..=8, Interpreter::op_set_window);
    table.add(OperandCount::VAR, 0x0D, 4..=8, Interpreter::op_erase_window);
    table.add(OperandCount::VAR, 0x0E, 4..=8, Interpreter::op_erase_line);
    table.add(OperandCount::VAR, 0x0F, 4..=8, Interpreter::op_set_cursor);
    table.add(OperandCount::VAR, 0x10, 4..=8, Interpreter::op_get_cursor);
    table.add(OperandCount::VAR, 0x11, 4..=8, Interpreter::op_set_text_style);
    table.add(OperandCount::VAR, 0x12, 4..=8, Interpreter::op_buffer_mode);
    table.add(OperandCount::VAR, 0x15, 3..=8, Interpreter::op_sound_effect);
    table.add(OperandCount::EXT, 0x04, 5..=8, Interpreter::op_set_font);
}

/// Globals read by the status line: location object, then score/hours and
/// turns/minutes
const LOCATION_GLOBAL: u16 = 0x10;
const LEFT_GLOBAL: u16 = 0x11;
const RIGHT_GLOBAL: u16 = 0x12;

impl Interpreter {
    /// Send the version 3 status line to the screen
    pub(crate) fn refresh_status_line(&mut self) -> Result<(), VmError> {
        let location_obj = self.vm.read_global(LOCATION_GLOBAL)? as u16;
        let location = match self.objects.as_deref() {
            Some(objects) if location_obj != 0 => {
                let addr = objects.name_address(&self.vm.memory, location_obj)?;
                self.decode_text(addr)?
            }
            _ => String::new(),
        };
        let status = StatusLine {
            location,
            left: self.vm.read_global(LEFT_GLOBAL)?,
            right: self.vm.read_global(RIGHT_GLOBAL)?,
            time_game: self.vm.header().flags1()? & 0x02 != 0,
        };
        debug!("status line: {:?}", status);
        self.screen.show_status(&status)
    }

    /// 0OP:0x0C - show_status; does nothing after version 3
    fn op_show_status(&mut self, _: &Instruction, _: &[u16]) -> Result<ExecutionResult, VmError> {
        if self.vm.version <= 3 {
            self.refresh_status_line()?;
        }
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x0A - split_window lines
    fn op_split_window(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let lines = self.operand(inst, operands, 0)?;
        self.screen.split_window(lines)?;
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x0B - set_window window
    fn op_set_window(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let window = self.operand(inst, operands, 0)?;
        self.screen.set_window(window)?;
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x0D - erase_window window (-1 unsplits, -2 clears everything)
    fn op_erase_window(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let window = self.operand(inst, operands, 0)? as i16;
        self.screen.erase_window(window)?;
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x0E - erase_line value
    fn op_erase_line(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let value = self.operand(inst, operands, 0)?;
        self.screen.erase_line(value)?;
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x0F - set_cursor line column
    fn op_set_cursor(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let line = self.operand(inst, operands, 0)? as i16;
        let column = operands.get(1).copied().unwrap_or(1);
        self.screen.set_cursor(line, column)?;
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x10 - get_cursor array: line and column as two words
    fn op_get_cursor(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let array = self.operand(inst, operands, 0)? as usize;
        let (line, column) = self.screen.cursor();
        self.vm.memory.write_word(array, line)?;
        self.vm.memory.write_word(array + 2, column)?;
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x11 - set_text_style style
    fn op_set_text_style(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let style = self.operand(inst, operands, 0)?;
        self.screen.set_text_style(style)?;
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x12 - buffer_mode flag
    fn op_buffer_mode(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let flag = self.operand(inst, operands, 0)?;
        self.screen.set_buffer_mode(flag != 0)?;
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x15 - sound_effect; no sound support, so only logged
    fn op_sound_effect(&mut self, _: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        warn!("sound_effect {:?} ignored", operands);
        Ok(ExecutionResult::Continue)
    }

    /// 2OP:0x1B - set_colour foreground background
    fn op_set_colour(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let foreground = self.operand(inst, operands, 0)?;
        let background = self.operand(inst, operands, 1)?;
        self.screen.set_colour(foreground, background)?;
        Ok(ExecutionResult::Continue)
    }

    /// EXT:0x04 - set_font font -> (previous font, or 0)
    fn op_set_font(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let font = self.operand(inst, operands, 0)?;
        let previous = self.screen.set_font(font)?;
        self.store_result(inst, previous)?;
        Ok(ExecutionResult::Continue)
    }
}
