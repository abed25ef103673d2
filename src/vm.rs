use crate::address;
use crate::error::VmError;
use crate::header::{Header, HEADER_SIZE};
use crate::memory::Memory;
use log::debug;

/// Default maximum depth of the value stack
pub const STACK_SIZE: usize = 1024;

/// Maximum number of local variables per routine
pub const MAX_LOCALS: usize = 15;

/// Represents a call frame on the VM call stack
#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    /// Return address (PC to return to)
    pub return_pc: usize,
    /// Where to store the return value (None = discard, Some(n) = variable n)
    pub return_store: Option<u8>,
    /// Local variable values; the length is the routine's declared count
    pub locals: Vec<i16>,
    /// Number of arguments actually supplied by the caller
    pub arg_count: usize,
    /// Stack depth when this routine was called
    pub stack_base: usize,
}

impl CallFrame {
    /// The frame the story starts in for versions 1 to 5: no locals, no caller
    pub fn main() -> Self {
        CallFrame {
            return_pc: 0,
            return_store: None,
            locals: Vec::new(),
            arg_count: 0,
            stack_base: 0,
        }
    }
}

/// The Z-Machine virtual machine state
pub struct VM {
    /// The raw story memory
    pub memory: Memory,
    /// Story version, validated once at load
    pub version: u8,
    /// Program counter - address of the next instruction to decode
    pub pc: usize,
    /// Value stack, shared by every routine of the run
    pub stack: Vec<i16>,
    /// Call stack for routine invocations
    pub call_stack: Vec<CallFrame>,
    stack_limit: usize,
}

impl VM {
    /// Load a story image. Fails if the image cannot hold a header or
    /// declares a version outside 1 to 8.
    pub fn new(image: Vec<u8>) -> Result<Self, VmError> {
        if image.len() < HEADER_SIZE {
            return Err(VmError::ImageTooSmall(image.len()));
        }
        let memory = Memory::new(image);
        let version = Header::new(&memory).version()?;
        address::multiplier(version)?;

        let mut vm = VM {
            memory,
            version,
            pc: 0,
            stack: Vec::with_capacity(STACK_SIZE),
            call_stack: Vec::new(),
            stack_limit: STACK_SIZE,
        };
        vm.reset()?;
        Ok(vm)
    }

    pub fn set_stack_limit(&mut self, limit: usize) {
        self.stack_limit = limit;
    }

    pub fn header(&self) -> Header<'_> {
        Header::new(&self.memory)
    }

    /// Reset stacks and program counter to the story's entry point.
    ///
    /// Versions 1-5 start executing at the initial PC inside a main frame
    /// that has no locals. Version 6 and later call the main routine instead.
    pub fn reset(&mut self) -> Result<(), VmError> {
        self.stack.clear();
        self.call_stack.clear();
        let initial = self.header().initial_pc()?;
        if self.version <= 5 {
            self.pc = initial as usize;
            self.call_stack.push(CallFrame::main());
        } else {
            let addr = address::to_routine_address(&self.header(), initial)?;
            let num_locals = self.memory.read_byte(addr)?;
            if num_locals as usize > MAX_LOCALS {
                return Err(VmError::InvalidRoutine {
                    addr,
                    locals: num_locals,
                });
            }
            self.call_stack.push(CallFrame {
                locals: vec![0; num_locals as usize],
                ..CallFrame::main()
            });
            self.pc = addr + 1;
        }
        debug!("VM reset: version {}, pc {:05x}", self.version, self.pc);
        Ok(())
    }

    /// Push a value onto the value stack
    pub fn push(&mut self, value: i16) -> Result<(), VmError> {
        if self.stack.len() >= self.stack_limit {
            return Err(VmError::StackOverflow(self.stack_limit));
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pop a value from the value stack
    pub fn pop(&mut self) -> Result<i16, VmError> {
        match self.stack.pop() {
            Some(value) => Ok(value),
            None => {
                debug!("Stack underflow at PC {:05x}", self.pc);
                Err(VmError::StackUnderflow)
            }
        }
    }

    /// Peek at the top of the stack without removing it
    pub fn peek(&self) -> Result<i16, VmError> {
        self.stack.last().copied().ok_or(VmError::StackUnderflow)
    }

    fn global_addr(&self, var: u16) -> Result<usize, VmError> {
        if !(0x10..=0xff).contains(&var) {
            return Err(VmError::InvalidVariable(var));
        }
        let table = self.header().global_variables()? as usize;
        Ok(table + (var as usize - 0x10) * 2)
    }

    /// Read a global variable (0x10-0xFF)
    pub fn read_global(&self, var: u16) -> Result<i16, VmError> {
        let addr = self.global_addr(var)?;
        self.memory.read_signed_word(addr)
    }

    /// Write a global variable (0x10-0xFF)
    pub fn write_global(&mut self, var: u16, value: i16) -> Result<(), VmError> {
        let addr = self.global_addr(var)?;
        self.memory.write_word(addr, value as u16)
    }

    fn local_slot(&self, var: u16) -> Result<usize, VmError> {
        let available = self.call_stack.last().map_or(0, |frame| frame.locals.len());
        let index = var as usize - 1;
        if index >= available {
            return Err(VmError::NoSuchLocal {
                var: var as u8,
                available,
            });
        }
        Ok(index)
    }

    fn read_local(&self, var: u16) -> Result<i16, VmError> {
        let index = self.local_slot(var)?;
        Ok(self.call_stack[self.call_stack.len() - 1].locals[index])
    }

    fn write_local(&mut self, var: u16, value: i16) -> Result<(), VmError> {
        let index = self.local_slot(var)?;
        let top = self.call_stack.len() - 1;
        self.call_stack[top].locals[index] = value;
        Ok(())
    }

    /// Load a variable (0x00 = pop stack, 0x01-0x0F = local, 0x10-0xFF = global)
    pub fn load(&mut self, var: u16) -> Result<i16, VmError> {
        match var {
            0x00 => self.pop(),
            0x01..=0x0F => self.read_local(var),
            0x10..=0xFF => self.read_global(var),
            _ => Err(VmError::InvalidVariable(var)),
        }
    }

    /// Store a variable (0x00 = push stack, 0x01-0x0F = local, 0x10-0xFF = global)
    pub fn store(&mut self, var: u16, value: i16) -> Result<(), VmError> {
        match var {
            0x00 => self.push(value),
            0x01..=0x0F => self.write_local(var, value),
            0x10..=0xFF => self.write_global(var, value),
            _ => Err(VmError::InvalidVariable(var)),
        }
    }

    /// Read a variable named by an operand rather than by an instruction's
    /// variable slot. The stack top is read in place, not popped.
    pub fn load_indirect(&mut self, var: u16) -> Result<i16, VmError> {
        match var {
            0x00 => self.peek(),
            _ => self.load(var),
        }
    }

    /// Write a variable named by an operand. The stack top is replaced in
    /// place, not pushed.
    pub fn store_indirect(&mut self, var: u16, value: i16) -> Result<(), VmError> {
        match var {
            0x00 => {
                let top = self.stack.last_mut().ok_or(VmError::StackUnderflow)?;
                *top = value;
                Ok(())
            }
            _ => self.store(var, value),
        }
    }

    /// Get the current call depth
    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    pub fn current_frame(&self) -> Result<&CallFrame, VmError> {
        self.call_stack.last().ok_or(VmError::ReturnWithoutCaller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn test_vm() -> VM {
        let mut image = vec![0u8; 0x400];
        image[0x00] = 3;
        image[0x06] = 0x03; // Initial PC at 0x0300
        image[0x0c] = 0x01; // Global table at 0x0100
        image[0x0e] = 0x03; // Static memory at 0x0300
        VM::new(image).unwrap()
    }

    #[test]
    fn test_load_rejects_bad_images() {
        assert!(matches!(VM::new(vec![3; 10]), Err(VmError::ImageTooSmall(10))));
        let mut image = vec![0u8; 64];
        image[0] = 9;
        assert!(matches!(VM::new(image), Err(VmError::UnknownVersion(9))));
    }

    #[test]
    fn test_initial_state() {
        let vm = test_vm();
        assert_eq!(vm.pc, 0x300);
        assert_eq!(vm.call_depth(), 1);
        assert!(vm.stack.is_empty());
    }

    #[test]
    fn test_global_round_trip() {
        let mut vm = test_vm();
        for var in 0x10u16..=0xff {
            for value in [0i16, 1, -1, 0x7fff, i16::MIN, -15000] {
                vm.store(var, value).unwrap();
                assert_eq!(vm.load(var).unwrap(), value);
            }
        }
        vm.store(0x10, -2).unwrap();
        assert_eq!(vm.memory.read_word(0x100).unwrap(), 0xfffe);
        vm.store(0xff, 0x1234).unwrap();
        assert_eq!(vm.memory.read_word(0x100 + 0xef * 2).unwrap(), 0x1234);
    }

    #[test]
    fn test_stack_is_lifo() {
        let mut vm = test_vm();
        for value in [10i16, -5, 300] {
            vm.store(0, value).unwrap();
        }
        assert_eq!(vm.load(0).unwrap(), 300);
        assert_eq!(vm.load(0).unwrap(), -5);
        assert_eq!(vm.load(0).unwrap(), 10);
        assert!(matches!(vm.load(0), Err(VmError::StackUnderflow)));
    }

    #[test]
    fn test_invalid_variable_numbers() {
        let mut vm = test_vm();
        assert!(matches!(vm.load(0x100), Err(VmError::InvalidVariable(0x100))));
        assert!(matches!(vm.store(0x1ff, 1), Err(VmError::InvalidVariable(0x1ff))));
        assert!(matches!(vm.read_global(0x0f), Err(VmError::InvalidVariable(0x0f))));
    }

    #[test]
    fn test_locals_fail_without_slot() {
        let mut vm = test_vm();
        assert!(matches!(
            vm.load(0x01),
            Err(VmError::NoSuchLocal { var: 1, available: 0 })
        ));
        vm.call_stack.push(CallFrame {
            locals: vec![7, 8],
            ..CallFrame::main()
        });
        assert_eq!(vm.load(0x02).unwrap(), 8);
        vm.store(0x01, -3).unwrap();
        assert_eq!(vm.load(0x01).unwrap(), -3);
        assert!(vm.load(0x03).is_err());
        // locals never fall through to globals
        assert_eq!(vm.read_global(0x10).unwrap(), 0);
    }

    #[test]
    fn test_indirect_stack_access_is_in_place() {
        let mut vm = test_vm();
        vm.push(4).unwrap();
        assert_eq!(vm.load_indirect(0).unwrap(), 4);
        vm.store_indirect(0, 9).unwrap();
        assert_eq!(vm.stack, vec![9]);
        vm.pop().unwrap();
        assert!(matches!(vm.store_indirect(0, 1), Err(VmError::StackUnderflow)));
    }

    #[test]
    fn test_stack_limit() {
        let mut vm = test_vm();
        vm.set_stack_limit(2);
        vm.push(1).unwrap();
        vm.push(2).unwrap();
        assert!(matches!(vm.push(3), Err(VmError::StackOverflow(2))));
    }
}
