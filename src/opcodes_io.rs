/// Input/Output operations for Z-Machine interpreter
///
/// This module handles all I/O-related operations including:
/// - Printing (print, print_ret, print_addr, print_paddr, print_char,
///   print_num, print_unicode, print_table, new_line)
/// - Text input (sread/aread line input, read_char, tokenise)
/// - Stream management (output_stream redirection, input_stream)
///
/// Input comes from the host's input source one line at a time. End of
/// input halts the story the same way `quit` does.
use crate::address;
use crate::dictionary::TokeniseRequest;
use crate::dispatch::{DispatchTable, ALL_VERSIONS};
use crate::error::VmError;
use crate::instruction::{Instruction, OperandCount};
use crate::interpreter::{ExecutionResult, Interpreter};
use crate::text;
use log::{debug, info, warn};

pub(crate) fn register(table: &mut DispatchTable) {
    table.add(OperandCount::OP0, 0x02, ALL_VERSIONS, Interpreter::op_print);
    table.add(OperandCount::OP0, 0x03, ALL_VERSIONS, Interpreter::op_print_ret);
    table.add(OperandCount::OP0, 0x0B, ALL_VERSIONS, Interpreter::op_new_line);
    table.add(OperandCount::OP1, 0x07, ALL_VERSIONS, Interpreter::op_print_addr);
    table.add(OperandCount::OP1, 0x0D, ALL_VERSIONS, Interpreter::op_print_paddr);
    table.add(OperandCount::VAR, 0x04, 1..=4, Interpreter::op_sread);
    table.add(OperandCount::VAR, 0x04, 5..=8, Interpreter::op_aread);
    table.add(OperandCount::VAR, 0x05, ALL_VERSIONS, Interpreter::op_print_char);
    table.add(OperandCount::VAR, 0x06, ALL_VERSIONS, Interpreter::op_print_num);
    table.add(OperandCount::VAR, 0x13, 3..=8, Interpreter::op_output_stream);
    table.add(OperandCount::VAR, 0x14, 3..=8, Interpreter::op_input_stream);
    table.add(OperandCount::VAR, 0x16, 4..=8, Interpreter::op_read_char);
    table.add(OperandCount::VAR, 0x1B, 5..=8, Interpreter::op_tokenise);
    table.add(OperandCount::VAR, 0x1E, 5..=8, Interpreter::op_print_table);
    table.add(OperandCount::EXT, 0x0B, 5..=8, Interpreter::op_print_unicode);
    table.add(OperandCount::EXT, 0x0C, 5..=8, Interpreter::op_check_unicode);
}

/// ZSCII code for the end of a line of input
const ZSCII_NEWLINE: u16 = 13;

impl Interpreter {
    /// Print a ZSCII output code; codes with no printable form are dropped
    fn print_zscii(&mut self, code: u16) -> Result<(), VmError> {
        match text::zscii_to_char(code) {
            Some(ch) => self.write_output(ch.encode_utf8(&mut [0; 4])),
            None => {
                debug!("print: ZSCII {} has no output form", code);
                Ok(())
            }
        }
    }

    fn print_inline(&mut self, inst: &Instruction) -> Result<(), VmError> {
        let addr = inst.text_addr.ok_or(VmError::MissingOperand {
            name: inst.name(self.vm.version),
            index: 0,
        })?;
        let text = self.decode_text(addr)?;
        self.write_output(&text)
    }

    /// 0OP:0x02 - print (inline text)
    fn op_print(&mut self, inst: &Instruction, _: &[u16]) -> Result<ExecutionResult, VmError> {
        self.print_inline(inst)?;
        Ok(ExecutionResult::Continue)
    }

    /// 0OP:0x03 - print_ret: print, new line, return true
    fn op_print_ret(&mut self, inst: &Instruction, _: &[u16]) -> Result<ExecutionResult, VmError> {
        self.print_inline(inst)?;
        self.write_output("\n")?;
        self.do_return(1)
    }

    /// 0OP:0x0B - new_line
    fn op_new_line(&mut self, _: &Instruction, _: &[u16]) -> Result<ExecutionResult, VmError> {
        self.write_output("\n")?;
        Ok(ExecutionResult::Continue)
    }

    /// 1OP:0x07 - print_addr (byte address)
    fn op_print_addr(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let addr = self.operand(inst, operands, 0)? as usize;
        let text = self.decode_text(addr)?;
        self.write_output(&text)?;
        Ok(ExecutionResult::Continue)
    }

    /// 1OP:0x0D - print_paddr (packed string address)
    fn op_print_paddr(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let packed = self.operand(inst, operands, 0)?;
        let addr = address::to_string_address(&self.vm.header(), packed)?;
        debug!("print_paddr {:04x} -> {:05x}", packed, addr);
        let text = self.decode_text(addr)?;
        self.write_output(&text)?;
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x05 - print_char
    fn op_print_char(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let code = self.operand(inst, operands, 0)?;
        self.print_zscii(code)?;
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x06 - print_num (signed decimal)
    fn op_print_num(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let value = self.operand(inst, operands, 0)? as i16;
        self.write_output(&value.to_string())?;
        Ok(ExecutionResult::Continue)
    }

    /// EXT:0x0B - print_unicode
    fn op_print_unicode(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let code = self.operand(inst, operands, 0)?;
        let ch = char::from_u32(code as u32).unwrap_or('?');
        self.write_output(ch.encode_utf8(&mut [0; 4]))?;
        Ok(ExecutionResult::Continue)
    }

    /// EXT:0x0C - check_unicode: 3 when the character can be printed and
    /// read, 0 otherwise
    fn op_check_unicode(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let code = self.operand(inst, operands, 0)?;
        let supported = char::from_u32(code as u32).is_some_and(|ch| !ch.is_control());
        self.store_result(inst, if supported { 3 } else { 0 })?;
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x1E - print_table zscii-text width [height] [skip]
    fn op_print_table(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let table = self.operand(inst, operands, 0)? as usize;
        let width = self.operand(inst, operands, 1)? as usize;
        let height = operands.get(2).copied().unwrap_or(1) as usize;
        let skip = operands.get(3).copied().unwrap_or(0) as usize;

        for row in 0..height {
            if row > 0 {
                self.write_output("\n")?;
            }
            let start = table + row * (width + skip);
            for i in 0..width {
                let code = self.vm.memory.read_byte(start + i)?;
                self.print_zscii(code as u16)?;
            }
        }
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x13 - output_stream number [table]
    fn op_output_stream(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let stream = self.operand(inst, operands, 0)? as i16;
        debug!("output_stream {}", stream);
        match stream {
            0 => {}
            1 => self.select_screen_stream(true),
            -1 => self.select_screen_stream(false),
            3 => {
                let table = self.operand(inst, operands, 1)?;
                self.open_stream3(table as usize)?;
            }
            -3 => self.close_stream3()?,
            2 | -2 | 4 | -4 => warn!("output_stream {} not supported, ignoring", stream),
            _ => warn!("output_stream: unknown stream {}", stream),
        }
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x14 - input_stream; only the keyboard is available
    fn op_input_stream(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let stream = self.operand(inst, operands, 0)?;
        if stream != 0 {
            warn!("input_stream {} not supported, staying on keyboard", stream);
        }
        Ok(ExecutionResult::Continue)
    }

    /// Read a line for sread/aread, lowercased and limited to `max` ZSCII
    /// characters. None at end of input.
    fn read_input_line(&mut self, max: usize) -> Result<Option<Vec<u8>>, VmError> {
        let Some(line) = self.read_line()? else {
            info!("End of input, stopping");
            return Ok(None);
        };
        debug!("read: {:?}", line);
        let codes = line
            .to_lowercase()
            .chars()
            .filter_map(text::char_to_zscii)
            .filter(|&code| code != ZSCII_NEWLINE)
            .take(max)
            .map(|code| code as u8)
            .collect();
        Ok(Some(codes))
    }

    /// Run the tokenizer over the text buffer if a parse buffer was given
    fn tokenise_input(&mut self, request: TokeniseRequest) -> Result<(), VmError> {
        if request.parse_buffer == 0 {
            return Ok(());
        }
        let tokenizer = self
            .tokenizer
            .as_deref_mut()
            .ok_or(VmError::MissingCapability("tokenizer"))?;
        tokenizer.tokenise(&mut self.vm.memory, &request)
    }

    /// VAR:0x04 - sread text parse (V1-4)
    ///
    /// Byte 0 of the text buffer holds its size; the line is stored from
    /// byte 1 with a zero terminator.
    fn op_sread(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let text_buffer = self.operand(inst, operands, 0)? as usize;
        let parse_buffer = operands.get(1).copied().unwrap_or(0) as usize;
        if self.vm.version <= 3 {
            self.refresh_status_line()?;
        }

        let max = (self.vm.memory.read_byte(text_buffer)? as usize).saturating_sub(1);
        let Some(codes) = self.read_input_line(max)? else {
            return Ok(ExecutionResult::Quit);
        };
        self.vm.memory.write_slice(text_buffer + 1, &codes)?;
        self.vm.memory.write_byte(text_buffer + 1 + codes.len(), 0)?;

        self.tokenise_input(TokeniseRequest {
            text_buffer,
            parse_buffer,
            dictionary: None,
            skip_unknown: false,
        })?;
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x04 - aread text parse [time routine] -> (result) (V5+)
    ///
    /// Byte 0 holds the capacity, byte 1 receives the number of characters
    /// stored from byte 2. The timer operands are accepted and ignored.
    fn op_aread(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let text_buffer = self.operand(inst, operands, 0)? as usize;
        let parse_buffer = operands.get(1).copied().unwrap_or(0) as usize;

        let max = self.vm.memory.read_byte(text_buffer)? as usize;
        let Some(codes) = self.read_input_line(max)? else {
            return Ok(ExecutionResult::Quit);
        };
        self.vm.memory.write_byte(text_buffer + 1, codes.len() as u8)?;
        self.vm.memory.write_slice(text_buffer + 2, &codes)?;

        self.tokenise_input(TokeniseRequest {
            text_buffer,
            parse_buffer,
            dictionary: None,
            skip_unknown: false,
        })?;
        self.store_result(inst, ZSCII_NEWLINE)?;
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x16 - read_char 1 [time routine] -> (result)
    fn op_read_char(&mut self, inst: &Instruction, _: &[u16]) -> Result<ExecutionResult, VmError> {
        let Some(ch) = self.read_char()? else {
            info!("End of input, stopping");
            return Ok(ExecutionResult::Quit);
        };
        let code = text::char_to_zscii(ch).unwrap_or(b'?' as u16);
        debug!("read_char {:?} -> {}", ch, code);
        self.store_result(inst, code)?;
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x1B - tokenise text parse [dictionary] [flag]
    fn op_tokenise(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let text_buffer = self.operand(inst, operands, 0)? as usize;
        let parse_buffer = self.operand(inst, operands, 1)? as usize;
        let dictionary = operands
            .get(2)
            .copied()
            .filter(|&d| d != 0)
            .map(|d| d as usize);
        let skip_unknown = operands.get(3).is_some_and(|&flag| flag != 0);
        self.tokenise_input(TokeniseRequest {
            text_buffer,
            parse_buffer,
            dictionary,
            skip_unknown,
        })?;
        Ok(ExecutionResult::Continue)
    }
}

#[cfg(test)]
mod tests {
    use crate::dictionary::TokeniseRequest;
    use crate::error::VmError;
    use crate::interpreter::RunState;
    use crate::test_utils::{
        interpreter, packed, run, zstring, CountingTokenizer, StoryBuilder, ROUTINES, SCRATCH,
    };
    use test_log::test;

    #[test]
    fn test_print_num_signed() {
        // print_num #-900 ; new_line ; print_num G10 ; quit
        let story = StoryBuilder::new(3)
            .code(&[0xE6, 0x3F, 0xFC, 0x7C, 0xBB, 0xE6, 0xBF, 0x10, 0xBA])
            .global(0x10, 512)
            .build();
        let (mut interp, out) = interpreter(story, "");
        run(&mut interp).unwrap();
        assert_eq!(out.contents(), "-900\n512");
    }

    #[test]
    fn test_print_inline_and_print_ret() {
        // main: print "hello" ; call R -> G10 ; quit
        // R: print_ret "bye"
        let mut code = vec![0xB2];
        code.extend(zstring("hello"));
        let r = packed(3, ROUTINES);
        code.extend([0xE0, 0x3F, (r >> 8) as u8, r as u8, 0x10, 0xBA]);
        let mut routine = vec![0x00, 0xB3];
        routine.extend(zstring("bye"));
        let story = StoryBuilder::new(3)
            .code(&code)
            .bytes(ROUTINES, &routine)
            .build();
        let (mut interp, out) = interpreter(story, "");
        run(&mut interp).unwrap();
        assert_eq!(out.contents(), "hellobye\n");
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 1);
    }

    #[test]
    fn test_print_addr_and_paddr() {
        // print_addr #0300 ; print_paddr #0190 (0x320 packed) ; quit
        let story = StoryBuilder::new(3)
            .code(&[0x87, 0x03, 0x00, 0x8D, 0x01, 0x90, 0xBA])
            .bytes(SCRATCH, &zstring("ab"))
            .bytes(SCRATCH + 0x20, &zstring(" cd"))
            .build();
        let (mut interp, out) = interpreter(story, "");
        run(&mut interp).unwrap();
        assert_eq!(out.contents(), "ab cd");
    }

    #[test]
    fn test_print_char_and_unicode() {
        // print_char #'A' ; print_char #13 ; print_unicode #00e9 ; quit
        let story = StoryBuilder::new(5)
            .code(&[
                0xE5, 0x7F, b'A', 0xE5, 0x7F, 13, 0xBE, 0x0B, 0x3F, 0x00, 0xE9, 0xBA,
            ])
            .build();
        let (mut interp, out) = interpreter(story, "");
        run(&mut interp).unwrap();
        assert_eq!(out.contents(), "A\né");
    }

    #[test]
    fn test_check_unicode() {
        // check_unicode #00e9 -> G10 ; check_unicode #0007 -> G11 ; quit
        let story = StoryBuilder::new(5)
            .code(&[
                0xBE, 0x0C, 0x3F, 0x00, 0xE9, 0x10, 0xBE, 0x0C, 0x7F, 0x07, 0x11, 0xBA,
            ])
            .build();
        let (mut interp, _) = interpreter(story, "");
        run(&mut interp).unwrap();
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 3);
        assert_eq!(interp.vm.read_global(0x11).unwrap(), 0);
    }

    #[test]
    fn test_print_table_rows() {
        // print_table #0300 #2 #2 #1 ; quit
        let story = StoryBuilder::new(5)
            .code(&[0xFE, 0x15, 0x03, 0x00, 0x02, 0x02, 0x01, 0xBA])
            .bytes(SCRATCH, b"ab.cd")
            .build();
        let (mut interp, out) = interpreter(story, "");
        run(&mut interp).unwrap();
        assert_eq!(out.contents(), "ab\ncd");
    }

    #[test]
    fn test_output_stream_redirection() {
        // output_stream #3 #0300 ; print_num #42 ; output_stream #-3 ;
        // output_stream #-1 ; print_num #1 ; output_stream #1 ; print_num #2 ; quit
        let story = StoryBuilder::new(5)
            .code(&[
                0xF3, 0x4F, 0x03, 0x03, 0x00, // output_stream 3 table
                0xE6, 0x7F, 42, // print_num 42
                0xF3, 0x3F, 0xFF, 0xFD, // output_stream -3
                0xF3, 0x3F, 0xFF, 0xFF, // output_stream -1
                0xE6, 0x7F, 1, // print_num 1
                0xF3, 0x7F, 0x01, // output_stream 1
                0xE6, 0x7F, 2, // print_num 2
                0xBA,
            ])
            .build();
        let (mut interp, out) = interpreter(story, "");
        run(&mut interp).unwrap();
        assert_eq!(out.contents(), "2");
        assert_eq!(interp.vm.memory.read_word(SCRATCH).unwrap(), 2);
        assert_eq!(interp.vm.memory.slice(SCRATCH + 2, 2).unwrap(), b"42");
    }

    #[test]
    fn test_sread_fills_buffer_and_tokenises() {
        // sread #0300 #0340 ; quit
        let story = StoryBuilder::new(3)
            .code(&[0xE4, 0x0F, 0x03, 0x00, 0x03, 0x40, 0xBA])
            .bytes(SCRATCH, &[6])
            .build();
        let (interp, _) = interpreter(story, "Open  Door\n");
        let tokenizer = CountingTokenizer::default();
        let mut interp = interp.with_tokenizer(tokenizer.clone());
        run(&mut interp).unwrap();
        // capacity 6 keeps five characters, lowercased, zero terminated
        assert_eq!(interp.vm.memory.slice(SCRATCH + 1, 6).unwrap(), b"open \0");
        assert_eq!(
            tokenizer.calls.borrow().as_slice(),
            &[TokeniseRequest {
                text_buffer: SCRATCH,
                parse_buffer: SCRATCH + 0x40,
                dictionary: None,
                skip_unknown: false,
            }]
        );
        assert_eq!(interp.vm.memory.read_byte(SCRATCH + 0x41).unwrap(), 1);
    }

    #[test]
    fn test_aread_layout_and_terminator() {
        // aread #0300 #0340 -> G10 ; quit
        let story = StoryBuilder::new(5)
            .code(&[0xE4, 0x0F, 0x03, 0x00, 0x03, 0x40, 0x10, 0xBA])
            .bytes(SCRATCH, &[20])
            .build();
        let (interp, _) = interpreter(story, "take lamp\r\n");
        let mut interp = interp.with_tokenizer(CountingTokenizer::default());
        run(&mut interp).unwrap();
        assert_eq!(interp.vm.memory.read_byte(SCRATCH + 1).unwrap(), 9);
        assert_eq!(interp.vm.memory.slice(SCRATCH + 2, 9).unwrap(), b"take lamp");
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 13);
        assert_eq!(interp.vm.memory.read_byte(SCRATCH + 0x41).unwrap(), 2);
    }

    #[test]
    fn test_read_without_tokenizer_fails() {
        let story = StoryBuilder::new(5)
            .code(&[0xE4, 0x0F, 0x03, 0x00, 0x03, 0x40, 0x10, 0xBA])
            .bytes(SCRATCH, &[20])
            .build();
        let (mut interp, _) = interpreter(story, "look\n");
        assert!(matches!(
            run(&mut interp),
            Err(VmError::MissingCapability("tokenizer"))
        ));
    }

    #[test]
    fn test_end_of_input_quits() {
        let story = StoryBuilder::new(5)
            .code(&[0xE4, 0x3F, 0x03, 0x00, 0x10, 0xE6, 0x7F, 1])
            .bytes(SCRATCH, &[20])
            .build();
        let (mut interp, out) = interpreter(story, "");
        run(&mut interp).unwrap();
        assert_eq!(interp.state(), RunState::Quit);
        assert_eq!(out.contents(), "");
    }

    #[test]
    fn test_read_char() {
        // read_char #1 -> G10 ; read_char #1 -> G11 ; quit
        let story = StoryBuilder::new(5)
            .code(&[0xF6, 0x7F, 0x01, 0x10, 0xF6, 0x7F, 0x01, 0x11, 0xBA])
            .build();
        let (mut interp, _) = interpreter(story, "y\n");
        run(&mut interp).unwrap();
        assert_eq!(interp.vm.read_global(0x10).unwrap(), b'y' as i16);
        assert_eq!(interp.vm.read_global(0x11).unwrap(), 13);
    }

    #[test]
    fn test_tokenise_options() {
        // tokenise #0300 #0340 #0380 #1 ; quit
        let story = StoryBuilder::new(5)
            .code(&[
                0xFB, 0x01, 0x03, 0x00, 0x03, 0x40, 0x03, 0x80, 0x01, 0xBA,
            ])
            .bytes(SCRATCH, &[20, 0])
            .build();
        let (interp, _) = interpreter(story, "");
        let tokenizer = CountingTokenizer::default();
        let mut interp = interp.with_tokenizer(tokenizer.clone());
        run(&mut interp).unwrap();
        let calls = tokenizer.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].dictionary, Some(SCRATCH + 0x80));
        assert!(calls[0].skip_unknown);
    }
}
