//! Opcode dispatch table.
//!
//! Handlers are registered by the opcode family modules under the key
//! `(operand count, opcode number)`, each with the range of versions it
//! applies to. One key may carry several entries when an opcode changed
//! meaning between versions.

use crate::error::VmError;
use crate::instruction::{Instruction, OperandCount};
use crate::interpreter::{ExecutionResult, Interpreter};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::ops::RangeInclusive;

/// Handler signature: the instruction and its resolved operand values
pub type OpHandler =
    fn(&mut Interpreter, &Instruction, &[u16]) -> Result<ExecutionResult, VmError>;

#[derive(Clone)]
struct OpEntry {
    versions: RangeInclusive<u8>,
    handler: OpHandler,
}

#[derive(Default)]
pub struct DispatchTable {
    entries: HashMap<(OperandCount, u8), Vec<OpEntry>>,
}

/// Every version the interpreter accepts
pub const ALL_VERSIONS: RangeInclusive<u8> = 1..=8;

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with every opcode family registered
    pub fn standard() -> Self {
        let mut table = Self::new();
        crate::opcodes_math::register(&mut table);
        crate::opcodes_branch::register(&mut table);
        crate::opcodes_memory::register(&mut table);
        crate::opcodes_stack::register(&mut table);
        crate::opcodes_io::register(&mut table);
        crate::opcodes_object::register(&mut table);
        crate::opcodes_display::register(&mut table);
        crate::opcodes_save::register(&mut table);
        table
    }

    pub fn add(
        &mut self,
        count: OperandCount,
        opcode: u8,
        versions: RangeInclusive<u8>,
        handler: OpHandler,
    ) {
        self.entries
            .entry((count, opcode))
            .or_default()
            .push(OpEntry { versions, handler });
    }

    /// Handler for the opcode in the given story version, if any
    pub fn lookup(&self, count: OperandCount, opcode: u8, version: u8) -> Option<OpHandler> {
        self.entries
            .get(&(count, opcode))?
            .iter()
            .find(|entry| entry.versions.contains(&version))
            .map(|entry| entry.handler)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

lazy_static! {
    pub static ref DISPATCH: DispatchTable = DispatchTable::standard();
}
