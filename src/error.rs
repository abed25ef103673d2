//! Error taxonomy for the interpreter.
//!
//! Every failure is fatal to the run. The interpreter never retries or
//! rolls back: side effects applied before the failing step stay applied.

use crate::instruction::{InstructionForm, OperandCount};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VmError {
    #[error("Unknown story file version: {0}")]
    UnknownVersion(u8),

    #[error("{feature} requires version {minimum} or later (story is version {version})")]
    UnsupportedVersion {
        feature: &'static str,
        minimum: u8,
        version: u8,
    },

    #[error("Story file too small for header: {0} bytes")]
    ImageTooSmall(usize),

    #[error("Unknown opcode {opcode:#04x} ({count:?}, {form:?} form)")]
    UnknownOpcode {
        opcode: u8,
        form: InstructionForm,
        count: OperandCount,
    },

    #[error("Memory address out of range: {addr:#06x} (memory size {len:#06x})")]
    AddressOutOfRange { addr: usize, len: usize },

    #[error("Invalid variable number: {0:#x}")]
    InvalidVariable(u16),

    #[error("Local variable L{var:02} not available (routine has {available} locals)")]
    NoSuchLocal { var: u8, available: usize },

    #[error("Stack underflow")]
    StackUnderflow,

    #[error("Stack overflow (limit {0})")]
    StackOverflow(usize),

    #[error("Return with no calling routine")]
    ReturnWithoutCaller,

    #[error("Invalid routine at {addr:#06x}: header declares {locals} locals")]
    InvalidRoutine { addr: usize, locals: u8 },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("{name} is missing operand {index}")]
    MissingOperand { name: &'static str, index: usize },

    #[error("No {0} available")]
    MissingCapability(&'static str),

    #[error("{0}")]
    Collaborator(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Interpreter has already halted")]
    Halted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad classification of a [`VmError`], for hosts that only care which
/// subsystem gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    Decode,
    Addressing,
    Arithmetic,
    Io,
    Capability,
    Config,
}

impl VmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VmError::UnknownVersion(_)
            | VmError::UnsupportedVersion { .. }
            | VmError::ImageTooSmall(_) => ErrorKind::Format,
            VmError::UnknownOpcode { .. } | VmError::MissingOperand { .. } => ErrorKind::Decode,
            VmError::AddressOutOfRange { .. }
            | VmError::InvalidVariable(_)
            | VmError::NoSuchLocal { .. }
            | VmError::StackUnderflow
            | VmError::StackOverflow(_)
            | VmError::ReturnWithoutCaller
            | VmError::InvalidRoutine { .. } => ErrorKind::Addressing,
            VmError::DivisionByZero => ErrorKind::Arithmetic,
            VmError::Io(_) => ErrorKind::Io,
            VmError::MissingCapability(_) | VmError::Collaborator(_) | VmError::Halted => {
                ErrorKind::Capability
            }
            VmError::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<VmError> for String {
    fn from(error: VmError) -> String {
        error.to_string()
    }
}
