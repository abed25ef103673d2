//! stony: an interpreter for Z-machine story files, versions 1 to 8.
//!
//! The [`Interpreter`] owns a [`vm::VM`] and executes one decoded
//! instruction at a time through a version-aware dispatch table. Text
//! decoding, the object tree, tokenisation, screen handling and save
//! storage are supplied through traits so hosts can plug in their own.

pub mod address;
pub mod config;
pub mod dictionary;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod header;
pub mod instruction;
pub mod interpreter;
pub mod memory;
pub mod object;
pub mod opcode_tables;
pub mod opcodes_branch;
pub mod opcodes_display;
pub mod opcodes_io;
pub mod opcodes_math;
pub mod opcodes_memory;
pub mod opcodes_object;
pub mod opcodes_save;
pub mod opcodes_stack;
pub mod persistence;
pub mod text;
pub mod vm;
pub mod zrand;

#[cfg(test)]
mod test_utils;

pub use config::Config;
pub use error::VmError;
pub use interpreter::{ExecutionResult, Interpreter, RunState};
