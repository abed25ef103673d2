use crate::address;
use crate::config::Config;
use crate::dispatch::DISPATCH;
use crate::display::{HeadlessScreen, Screen};
use crate::dictionary::Tokenizer;
use crate::error::VmError;
use crate::instruction::{Instruction, OperandType};
use crate::object::ObjectModel;
use crate::persistence::{Persistence, Snapshot};
use crate::text::{self, TextDecoder, ZsciiDecoder};
use crate::vm::{CallFrame, MAX_LOCALS, VM};
use crate::zrand::ZRand;
use log::{debug, error, info, trace};
use std::io::{BufRead, Write};

/// Result of executing an instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Continue execution normally
    Continue,
    /// Branch taken, PC already updated
    Branched,
    /// Routine called, PC updated
    Called,
    /// Routine returned
    Returned(u16),
    /// Story asked to stop
    Quit,
}

/// Lifecycle of a run. Both halted states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    /// Stopped by `quit` or end of input
    Quit,
    /// Stopped by a fatal error
    Failed,
}

impl RunState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, RunState::Running)
    }
}

/// A memory table receiving output stream 3
#[derive(Debug, Clone, Copy)]
struct Stream3Table {
    addr: usize,
    written: u16,
}

/// State for managing output stream redirection
struct OutputStreamState {
    /// Stream 1 (the output sink) selected
    screen: bool,
    /// Nested stream 3 tables; only the innermost receives text
    stream3: Vec<Stream3Table>,
}

impl OutputStreamState {
    fn new() -> Self {
        OutputStreamState {
            screen: true,
            stream3: Vec::new(),
        }
    }
}

/// The main Z-Machine interpreter
pub struct Interpreter {
    /// The VM state
    pub vm: VM,
    input: Box<dyn BufRead>,
    output: Box<dyn Write>,
    /// Characters read ahead by read_char
    pending_input: String,
    pub(crate) text: Box<dyn TextDecoder>,
    pub(crate) objects: Option<Box<dyn ObjectModel>>,
    pub(crate) screen: Box<dyn Screen>,
    pub(crate) persistence: Option<Box<dyn Persistence>>,
    pub(crate) tokenizer: Option<Box<dyn Tokenizer>>,
    pub(crate) rng: ZRand,
    /// Story bytes as loaded, for restart, verify and save compression
    pub(crate) original: Vec<u8>,
    /// Address of the instruction currently executing
    pub(crate) current_pc: usize,
    pub(crate) undo: Option<Snapshot>,
    output_streams: OutputStreamState,
    state: RunState,
    instruction_count: u64,
    config: Config,
}

impl Interpreter {
    /// Load a story and attach the host's input source and output sink.
    pub fn new(
        image: Vec<u8>,
        input: impl BufRead + 'static,
        output: impl Write + 'static,
    ) -> Result<Self, VmError> {
        let original = image.clone();
        let vm = VM::new(image)?;
        let mut interpreter = Interpreter {
            vm,
            input: Box::new(input),
            output: Box::new(output),
            pending_input: String::new(),
            text: Box::new(ZsciiDecoder),
            objects: None,
            screen: Box::new(HeadlessScreen::new()),
            persistence: None,
            tokenizer: None,
            rng: ZRand::new_uniform(),
            original,
            current_pc: 0,
            undo: None,
            output_streams: OutputStreamState::new(),
            state: RunState::Running,
            instruction_count: 0,
            config: Config::default(),
        };
        interpreter.configure_header()?;
        Ok(interpreter)
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.vm.set_stack_limit(config.stack_limit);
        if let Some(seed) = config.random_seed {
            self.rng = ZRand::new_predictable(seed);
        }
        self.config = config;
        self
    }

    pub fn with_text_decoder(mut self, decoder: impl TextDecoder + 'static) -> Self {
        self.text = Box::new(decoder);
        self
    }

    pub fn with_objects(mut self, objects: impl ObjectModel + 'static) -> Self {
        self.objects = Some(Box::new(objects));
        self
    }

    pub fn with_screen(mut self, screen: impl Screen + 'static) -> Self {
        self.screen = Box::new(screen);
        self
    }

    pub fn with_persistence(mut self, persistence: impl Persistence + 'static) -> Self {
        self.persistence = Some(Box::new(persistence));
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: impl Tokenizer + 'static) -> Self {
        self.tokenizer = Some(Box::new(tokenizer));
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fill in the interpreter-owned header fields
    pub(crate) fn configure_header(&mut self) -> Result<(), VmError> {
        let version = self.vm.version;
        let memory = &mut self.vm.memory;
        if version <= 3 {
            // Status line available, screen splitting available
            let flags1 = memory.read_byte(0x01)?;
            memory.write_byte(0x01, (flags1 & !0x10) | 0x20)?;
        } else {
            memory.write_byte(0x1E, 6)?; // interpreter number
            memory.write_byte(0x1F, b'A')?; // interpreter version
            memory.write_byte(0x20, 24)?; // screen height in lines
            memory.write_byte(0x21, 80)?; // screen width in characters
        }
        if version >= 5 {
            memory.write_word(0x22, 80)?;
            memory.write_word(0x24, 24)?;
            memory.write_byte(0x26, 1)?;
            memory.write_byte(0x27, 1)?;
        }
        // Standard revision 1.1
        memory.write_word(0x32, 0x0101)?;
        Ok(())
    }

    /// Run until the story quits or fails, honouring the configured
    /// instruction limit.
    pub fn run(&mut self) -> Result<(), VmError> {
        self.run_with_limit(self.config.max_instructions)
    }

    /// Run until the story quits, fails, or `max_instructions` more
    /// instructions have executed. Reaching the limit is not an error.
    pub fn run_with_limit(&mut self, max_instructions: Option<u64>) -> Result<(), VmError> {
        info!(
            "Starting execution: version {}, pc {:05x}",
            self.vm.version, self.vm.pc
        );
        let mut executed = 0u64;
        while !self.state.is_finished() {
            if let Some(max) = max_instructions {
                if executed >= max {
                    info!("Reached instruction limit ({})", max);
                    break;
                }
            }
            self.step()?;
            executed += 1;
        }
        self.output.flush()?;
        info!(
            "Execution stopped after {} instructions ({:?})",
            self.instruction_count, self.state
        );
        Ok(())
    }

    /// Decode and execute one instruction.
    ///
    /// A fatal error leaves the interpreter in `RunState::Failed`; stepping a
    /// finished interpreter returns `VmError::Halted`.
    pub fn step(&mut self) -> Result<ExecutionResult, VmError> {
        if self.state.is_finished() {
            return Err(VmError::Halted);
        }
        match self.execute_next() {
            Ok(ExecutionResult::Quit) => {
                self.state = RunState::Quit;
                self.output.flush()?;
                Ok(ExecutionResult::Quit)
            }
            Ok(result) => Ok(result),
            Err(e) => {
                error!("Fatal error at {:05x}: {}", self.current_pc, e);
                self.state = RunState::Failed;
                // Output written before the failure still belongs to the host
                let _ = self.output.flush();
                Err(e)
            }
        }
    }

    fn execute_next(&mut self) -> Result<ExecutionResult, VmError> {
        let pc = self.vm.pc;
        let inst = Instruction::decode(&self.vm.memory, pc, self.vm.version)?;
        if self.config.trace {
            debug!("{:05x}: {}", pc, inst.format_with_version(self.vm.version));
        } else {
            trace!("{:05x}: {}", pc, inst.format_with_version(self.vm.version));
        }
        self.current_pc = pc;
        self.vm.pc = pc + inst.size;
        self.instruction_count += 1;
        self.execute_instruction(&inst)
    }

    /// Execute an already decoded instruction whose PC has been advanced
    pub fn execute_instruction(&mut self, inst: &Instruction) -> Result<ExecutionResult, VmError> {
        // Look the handler up first so an unknown opcode leaves the stack alone
        let handler = DISPATCH
            .lookup(inst.operand_count, inst.opcode, self.vm.version)
            .ok_or(VmError::UnknownOpcode {
                opcode: inst.opcode,
                form: inst.form,
                count: inst.operand_count,
            })?;
        let operands = self.resolve_operands(inst)?;
        handler(self, inst, &operands)
    }

    /// Resolve operand values (handle variables vs constants)
    pub fn resolve_operands(&mut self, inst: &Instruction) -> Result<Vec<u16>, VmError> {
        let mut values = Vec::with_capacity(inst.operands.len());
        for (op_type, &operand) in inst.operand_types.iter().zip(&inst.operands) {
            let value = match op_type {
                // Variable 0 pops the stack when used as an operand
                OperandType::Variable => self.vm.load(operand)? as u16,
                _ => operand,
            };
            values.push(value);
        }
        Ok(values)
    }

    /// Operand `index`, or an error naming the instruction
    pub(crate) fn operand(
        &self,
        inst: &Instruction,
        operands: &[u16],
        index: usize,
    ) -> Result<u16, VmError> {
        operands
            .get(index)
            .copied()
            .ok_or_else(|| VmError::MissingOperand {
                name: inst.name(self.vm.version),
                index,
            })
    }

    /// Write the result to the instruction's store variable
    pub(crate) fn store_result(&mut self, inst: &Instruction, value: u16) -> Result<(), VmError> {
        if let Some(var) = inst.store_var {
            self.vm.store(var as u16, value as i16)?;
        }
        Ok(())
    }

    /// Handle branching
    pub(crate) fn do_branch(
        &mut self,
        inst: &Instruction,
        condition: bool,
    ) -> Result<ExecutionResult, VmError> {
        let Some(ref branch) = inst.branch else {
            return Ok(ExecutionResult::Continue);
        };
        if condition != branch.on_true {
            return Ok(ExecutionResult::Continue);
        }
        match branch.offset {
            0 => self.do_return(0), // rfalse
            1 => self.do_return(1), // rtrue
            offset => {
                // Jump is relative to instruction after branch data
                self.jump_relative(offset)?;
                Ok(ExecutionResult::Branched)
            }
        }
    }

    /// Move the PC by `offset - 2` bytes from its current position
    pub(crate) fn jump_relative(&mut self, offset: i16) -> Result<(), VmError> {
        let target = self.vm.pc as i64 + offset as i64 - 2;
        if target < 0 || target as usize >= self.vm.memory.len() {
            return Err(VmError::AddressOutOfRange {
                addr: target.max(0) as usize,
                len: self.vm.memory.len(),
            });
        }
        self.vm.pc = target as usize;
        Ok(())
    }

    pub(crate) fn do_call(
        &mut self,
        packed_addr: u16,
        args: &[u16],
        return_store: Option<u8>,
    ) -> Result<ExecutionResult, VmError> {
        // Calling address 0 does nothing and returns false
        if packed_addr == 0 {
            if let Some(var) = return_store {
                self.vm.store(var as u16, 0)?;
            }
            return Ok(ExecutionResult::Continue);
        }

        let addr = address::to_routine_address(&self.vm.header(), packed_addr)?;
        let num_locals = self.vm.memory.read_byte(addr)?;
        if num_locals as usize > MAX_LOCALS {
            return Err(VmError::InvalidRoutine {
                addr,
                locals: num_locals,
            });
        }
        let num_locals = num_locals as usize;

        let mut pc = addr + 1;
        let mut locals = vec![0i16; num_locals];
        if self.vm.version <= 4 {
            // V1-4: initial values follow the header
            for local in locals.iter_mut() {
                *local = self.vm.memory.read_signed_word(pc)?;
                pc += 2;
            }
        }
        // Arguments overwrite the first locals
        for (local, &arg) in locals.iter_mut().zip(args) {
            *local = arg as i16;
        }

        debug!(
            "call {:05x} with {:?} -> {:?}, depth {}",
            addr,
            args,
            return_store,
            self.vm.call_depth()
        );
        self.vm.call_stack.push(CallFrame {
            return_pc: self.vm.pc,
            return_store,
            locals,
            arg_count: args.len(),
            stack_base: self.vm.stack.len(),
        });
        self.vm.pc = pc;
        Ok(ExecutionResult::Called)
    }

    /// Handle routine returns
    pub(crate) fn do_return(&mut self, value: u16) -> Result<ExecutionResult, VmError> {
        if self.vm.call_stack.len() <= 1 {
            return Err(VmError::ReturnWithoutCaller);
        }
        let frame = self
            .vm
            .call_stack
            .pop()
            .ok_or(VmError::ReturnWithoutCaller)?;

        debug!(
            "return {} to {:05x} -> {:?}",
            value as i16, frame.return_pc, frame.return_store
        );
        self.vm.pc = frame.return_pc;
        self.vm.stack.truncate(frame.stack_base);
        if let Some(var) = frame.return_store {
            self.vm.store(var as u16, value as i16)?;
        }
        Ok(ExecutionResult::Returned(value))
    }

    /// Decode the string at `addr` with the installed text decoder
    pub(crate) fn decode_text(&self, addr: usize) -> Result<String, VmError> {
        Ok(self.text.decode(&self.vm.memory, addr)?.0)
    }

    /// Send text to the selected output streams. While a stream 3 table is
    /// open it receives the text exclusively.
    pub(crate) fn write_output(&mut self, text: &str) -> Result<(), VmError> {
        if let Some(table) = self.output_streams.stream3.last_mut() {
            for ch in text.chars() {
                let code = text::char_to_zscii(ch).unwrap_or(b'?' as u16);
                let addr = table.addr + 2 + table.written as usize;
                self.vm.memory.write_byte(addr, code as u8)?;
                table.written = table.written.wrapping_add(1);
            }
            return Ok(());
        }
        if self.output_streams.screen {
            self.output.write_all(text.as_bytes())?;
        }
        Ok(())
    }

    pub(crate) fn select_screen_stream(&mut self, enabled: bool) {
        self.output_streams.screen = enabled;
    }

    pub(crate) fn open_stream3(&mut self, addr: usize) -> Result<(), VmError> {
        // The table must hold at least its length word
        self.vm.memory.read_word(addr)?;
        self.output_streams.stream3.push(Stream3Table { addr, written: 0 });
        Ok(())
    }

    /// Close the innermost stream 3 table, recording how many characters
    /// it received
    pub(crate) fn close_stream3(&mut self) -> Result<(), VmError> {
        if let Some(table) = self.output_streams.stream3.pop() {
            self.vm.memory.write_word(table.addr, table.written)?;
        }
        Ok(())
    }

    pub(crate) fn reset_output_streams(&mut self) {
        self.output_streams = OutputStreamState::new();
    }

    /// Read one line of input without its line terminator. Returns None at
    /// end of input.
    pub(crate) fn read_line(&mut self) -> Result<Option<String>, VmError> {
        self.output.flush()?;
        let mut line = std::mem::take(&mut self.pending_input);
        if !line.contains('\n') && self.input.read_line(&mut line)? == 0 && line.is_empty() {
            return Ok(None);
        }
        let line = match line.split_once('\n') {
            Some((first, rest)) => {
                self.pending_input = rest.to_string();
                first.to_string()
            }
            None => line,
        };
        Ok(Some(line.trim_end_matches('\r').to_string()))
    }

    /// Read a single character of input. Returns None at end of input.
    pub(crate) fn read_char(&mut self) -> Result<Option<char>, VmError> {
        self.output.flush()?;
        if self.pending_input.is_empty() && self.input.read_line(&mut self.pending_input)? == 0 {
            return Ok(None);
        }
        let mut chars = self.pending_input.chars();
        let ch = chars.next();
        self.pending_input = chars.as_str().to_string();
        Ok(ch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::FLAGS2;
    use crate::test_utils::{SharedOutput, StoryBuilder};
    use test_log::test;

    #[test]
    fn test_unknown_opcode_names_form() {
        // 2OP:0x1E in long form does not exist
        let story = StoryBuilder::new(3).code(&[0x1E, 0x01, 0x02]).build();
        let mut interp = Interpreter::new(story, std::io::empty(), std::io::sink()).unwrap();
        let err = interp.step().unwrap_err();
        assert!(matches!(
            err,
            VmError::UnknownOpcode {
                opcode: 0x1E,
                form: crate::instruction::InstructionForm::Long,
                count: crate::instruction::OperandCount::OP2,
            }
        ));
        assert_eq!(interp.state(), RunState::Failed);
        assert!(matches!(interp.step(), Err(VmError::Halted)));
    }

    #[test]
    fn test_unknown_opcode_does_not_pop_operands() {
        // VAR:0x1C encode_text with a stack operand
        let story = StoryBuilder::new(5).code(&[0xFC, 0xBF, 0x00]).build();
        let mut interp = Interpreter::new(story, std::io::empty(), std::io::sink()).unwrap();
        interp.vm.push(99).unwrap();
        assert!(interp.step().is_err());
        assert_eq!(interp.vm.stack, vec![99]);
    }

    #[test]
    fn test_quit_is_terminal() {
        let story = StoryBuilder::new(3).code(&[0xBA]).build();
        let mut interp = Interpreter::new(story, std::io::empty(), std::io::sink()).unwrap();
        assert_eq!(interp.step().unwrap(), ExecutionResult::Quit);
        assert_eq!(interp.state(), RunState::Quit);
        assert!(matches!(interp.step(), Err(VmError::Halted)));
        // run on a finished interpreter is a no-op
        interp.run().unwrap();
        assert_eq!(interp.instruction_count(), 1);
    }

    #[test]
    fn test_instruction_limit_stops_cleanly() {
        // jump to self: 8C FF FF (offset -1 lands on the jump again)
        let story = StoryBuilder::new(3).code(&[0x8C, 0xFF, 0xFF]).build();
        let mut interp = Interpreter::new(story, std::io::empty(), std::io::sink()).unwrap();
        interp.run_with_limit(Some(50)).unwrap();
        assert_eq!(interp.instruction_count(), 50);
        assert_eq!(interp.state(), RunState::Running);
    }

    #[test]
    fn test_config_limit_and_stack() {
        let story = StoryBuilder::new(3).code(&[0x8C, 0xFF, 0xFF]).build();
        let config = Config {
            max_instructions: Some(7),
            stack_limit: 4,
            ..Config::default()
        };
        let mut interp = Interpreter::new(story, std::io::empty(), std::io::sink())
            .unwrap()
            .with_config(config);
        interp.run().unwrap();
        assert_eq!(interp.instruction_count(), 7);
        for i in 0..4 {
            interp.vm.push(i).unwrap();
        }
        assert!(matches!(interp.vm.push(5), Err(VmError::StackOverflow(4))));
    }

    #[test]
    fn test_return_from_main_fails() {
        let story = StoryBuilder::new(3).code(&[0xB0]).build();
        let mut interp = Interpreter::new(story, std::io::empty(), std::io::sink()).unwrap();
        assert!(matches!(interp.step(), Err(VmError::ReturnWithoutCaller)));
    }

    #[test]
    fn test_stream3_captures_output() {
        let story = StoryBuilder::new(5).build();
        let out = SharedOutput::new();
        let mut interp = Interpreter::new(story, std::io::empty(), out.clone()).unwrap();
        interp.open_stream3(0x300).unwrap();
        interp.write_output("ab\n").unwrap();
        interp.open_stream3(0x320).unwrap();
        interp.write_output("z").unwrap();
        interp.close_stream3().unwrap();
        interp.write_output("c").unwrap();
        interp.close_stream3().unwrap();
        interp.write_output("!").unwrap();
        interp.output.flush().unwrap();

        assert_eq!(interp.vm.memory.read_word(0x300).unwrap(), 4);
        assert_eq!(interp.vm.memory.slice(0x302, 4).unwrap(), b"ab\rc");
        assert_eq!(interp.vm.memory.read_word(0x320).unwrap(), 1);
        assert_eq!(out.contents(), "!");
    }

    #[test]
    fn test_read_line_and_char_share_input() {
        let story = StoryBuilder::new(5).build();
        let input = std::io::Cursor::new(b"yes\r\nno\n".to_vec());
        let mut interp = Interpreter::new(story, input, std::io::sink()).unwrap();
        assert_eq!(interp.read_char().unwrap(), Some('y'));
        assert_eq!(interp.read_line().unwrap(), Some("es".to_string()));
        assert_eq!(interp.read_line().unwrap(), Some("no".to_string()));
        assert_eq!(interp.read_line().unwrap(), None);
        assert_eq!(interp.read_char().unwrap(), None);
    }

    #[test]
    fn test_header_configured_on_load() {
        let story = StoryBuilder::new(5).build();
        let interp = Interpreter::new(story, std::io::empty(), std::io::sink()).unwrap();
        assert_eq!(interp.vm.memory.read_byte(0x21).unwrap(), 80);
        assert_eq!(interp.vm.memory.read_word(0x32).unwrap(), 0x0101);
    }

    #[test]
    fn test_flags2_untouched_by_configuration() {
        let story = StoryBuilder::new(3).build();
        let interp = Interpreter::new(story, std::io::empty(), std::io::sink()).unwrap();
        assert_eq!(interp.vm.memory.read_word(FLAGS2).unwrap(), 0);
    }
}
