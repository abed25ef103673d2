// Test utilities for assembling small story images and capturing output
use crate::dictionary::{TokeniseRequest, Tokenizer};
use crate::error::VmError;
use crate::interpreter::Interpreter;
use crate::memory::Memory;
use crate::object::ObjectModel;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::rc::Rc;

/// Global variable table
pub const GLOBALS: usize = 0x100;
/// Free dynamic memory for tables and buffers
pub const SCRATCH: usize = 0x300;
/// Start of static memory; the main code starts here
pub const CODE_START: usize = 0x400;
/// Free area for routines
pub const ROUTINES: usize = 0x600;
pub const STORY_SIZE: usize = 0x800;

/// Builds a minimal story: header, globals at 0x100, code at 0x400.
///
/// For versions 6 and later the code becomes the body of a main routine
/// with no locals, since those versions start by calling it.
pub struct StoryBuilder {
    version: u8,
    memory: Vec<u8>,
}

impl StoryBuilder {
    pub fn new(version: u8) -> Self {
        let mut memory = vec![0u8; STORY_SIZE];
        memory[0x00] = version;
        put_word(&mut memory, 0x04, CODE_START as u16); // high memory
        put_word(&mut memory, 0x0C, GLOBALS as u16);
        put_word(&mut memory, 0x0E, CODE_START as u16); // static memory
        let initial_pc = match version {
            6 | 7 => (CODE_START / 4) as u16,
            8 => (CODE_START / 8) as u16,
            _ => CODE_START as u16,
        };
        put_word(&mut memory, 0x06, initial_pc);
        StoryBuilder { version, memory }
    }

    /// Main code, placed at the start address
    pub fn code(mut self, code: &[u8]) -> Self {
        let start = if self.version >= 6 {
            self.memory[CODE_START] = 0; // main routine has no locals
            CODE_START + 1
        } else {
            CODE_START
        };
        self.memory[start..start + code.len()].copy_from_slice(code);
        self
    }

    /// Raw bytes at an address
    pub fn bytes(mut self, addr: usize, bytes: &[u8]) -> Self {
        self.memory[addr..addr + bytes.len()].copy_from_slice(bytes);
        self
    }

    pub fn word(mut self, addr: usize, value: u16) -> Self {
        put_word(&mut self.memory, addr, value);
        self
    }

    pub fn global(self, var: u8, value: u16) -> Self {
        self.word(GLOBALS + (var as usize - 0x10) * 2, value)
    }

    /// Finish the image, filling in file length and checksum
    pub fn build(mut self) -> Vec<u8> {
        let divisor = match self.version {
            1..=3 => 2,
            4 | 5 => 4,
            _ => 8,
        };
        put_word(&mut self.memory, 0x1A, (STORY_SIZE / divisor) as u16);
        let checksum = self.memory[0x40..]
            .iter()
            .fold(0u16, |sum, &b| sum.wrapping_add(b as u16));
        put_word(&mut self.memory, 0x1C, checksum);
        self.memory
    }
}

fn put_word(memory: &mut [u8], addr: usize, value: u16) {
    memory[addr] = (value >> 8) as u8;
    memory[addr + 1] = value as u8;
}

/// Packed address of a byte address for the given version
pub fn packed(version: u8, addr: usize) -> u16 {
    match version {
        1..=3 => (addr / 2) as u16,
        4..=7 => (addr / 4) as u16,
        _ => (addr / 8) as u16,
    }
}

/// Encode lowercase letters and spaces as a Z-string
pub fn zstring(text: &str) -> Vec<u8> {
    let mut zchars: Vec<u16> = text
        .bytes()
        .map(|b| match b {
            b' ' => 0,
            b'a'..=b'z' => (b - b'a') as u16 + 6,
            _ => panic!("zstring only encodes lowercase letters and spaces"),
        })
        .collect();
    while zchars.is_empty() || zchars.len() % 3 != 0 {
        zchars.push(5);
    }
    let mut bytes = Vec::new();
    let words = zchars.len() / 3;
    for (i, chunk) in zchars.chunks(3).enumerate() {
        let mut word = (chunk[0] << 10) | (chunk[1] << 5) | chunk[2];
        if i == words - 1 {
            word |= 0x8000;
        }
        bytes.extend_from_slice(&word.to_be_bytes());
    }
    bytes
}

/// Output sink shared between the test and the interpreter
#[derive(Clone, Default)]
pub struct SharedOutput(Rc<RefCell<Vec<u8>>>);

impl SharedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Interpreter over the story with captured output and the given input
pub fn interpreter(story: Vec<u8>, input: &str) -> (Interpreter, SharedOutput) {
    let output = SharedOutput::new();
    let interp = Interpreter::new(
        story,
        std::io::Cursor::new(input.as_bytes().to_vec()),
        output.clone(),
    )
    .unwrap();
    (interp, output)
}

/// Run until quit or failure, returning the final result
pub fn run(interp: &mut Interpreter) -> Result<(), VmError> {
    interp.run_with_limit(Some(10_000))
}

/// Object model kept outside story memory, for exercising the object opcodes
#[derive(Debug, Default, Clone)]
pub struct FakeObjects {
    pub parent: HashMap<u16, u16>,
    pub sibling: HashMap<u16, u16>,
    pub child: HashMap<u16, u16>,
    pub attributes: HashMap<u16, Vec<u16>>,
    pub properties: HashMap<u16, BTreeMap<u16, u16>>,
    pub names: HashMap<u16, usize>,
}

impl FakeObjects {
    fn get(map: &HashMap<u16, u16>, obj: u16) -> u16 {
        map.get(&obj).copied().unwrap_or(0)
    }
}

impl ObjectModel for FakeObjects {
    fn parent(&self, _: &Memory, obj: u16) -> Result<u16, VmError> {
        Ok(Self::get(&self.parent, obj))
    }

    fn sibling(&self, _: &Memory, obj: u16) -> Result<u16, VmError> {
        Ok(Self::get(&self.sibling, obj))
    }

    fn child(&self, _: &Memory, obj: u16) -> Result<u16, VmError> {
        Ok(Self::get(&self.child, obj))
    }

    fn test_attribute(&self, _: &Memory, obj: u16, attr: u16) -> Result<bool, VmError> {
        Ok(self
            .attributes
            .get(&obj)
            .is_some_and(|attrs| attrs.contains(&attr)))
    }

    fn set_attribute(&mut self, _: &mut Memory, obj: u16, attr: u16) -> Result<(), VmError> {
        self.attributes.entry(obj).or_default().push(attr);
        Ok(())
    }

    fn clear_attribute(&mut self, _: &mut Memory, obj: u16, attr: u16) -> Result<(), VmError> {
        if let Some(attrs) = self.attributes.get_mut(&obj) {
            attrs.retain(|&a| a != attr);
        }
        Ok(())
    }

    fn insert(&mut self, memory: &mut Memory, obj: u16, dest: u16) -> Result<(), VmError> {
        self.remove(memory, obj)?;
        let first = Self::get(&self.child, dest);
        self.sibling.insert(obj, first);
        self.child.insert(dest, obj);
        self.parent.insert(obj, dest);
        Ok(())
    }

    fn remove(&mut self, _: &mut Memory, obj: u16) -> Result<(), VmError> {
        let parent = Self::get(&self.parent, obj);
        if parent != 0 {
            let next = Self::get(&self.sibling, obj);
            if Self::get(&self.child, parent) == obj {
                self.child.insert(parent, next);
            } else {
                let mut cur = Self::get(&self.child, parent);
                while cur != 0 {
                    if Self::get(&self.sibling, cur) == obj {
                        self.sibling.insert(cur, next);
                        break;
                    }
                    cur = Self::get(&self.sibling, cur);
                }
            }
        }
        self.parent.insert(obj, 0);
        self.sibling.insert(obj, 0);
        Ok(())
    }

    fn property(&self, _: &Memory, obj: u16, prop: u16) -> Result<u16, VmError> {
        Ok(self
            .properties
            .get(&obj)
            .and_then(|props| props.get(&prop))
            .copied()
            .unwrap_or(0))
    }

    fn put_property(&mut self, _: &mut Memory, obj: u16, prop: u16, value: u16)
        -> Result<(), VmError> {
        match self.properties.get_mut(&obj).and_then(|p| p.get_mut(&prop)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(VmError::Collaborator(format!(
                "object {} has no property {}",
                obj, prop
            ))),
        }
    }

    fn property_address(&self, _: &Memory, obj: u16, prop: u16) -> Result<u16, VmError> {
        let has = self
            .properties
            .get(&obj)
            .is_some_and(|props| props.contains_key(&prop));
        Ok(if has { 0x500 + obj * 0x10 + prop } else { 0 })
    }

    fn next_property(&self, _: &Memory, obj: u16, prop: u16) -> Result<u16, VmError> {
        let Some(props) = self.properties.get(&obj) else {
            return Ok(0);
        };
        // Properties are walked in descending order
        let next = if prop == 0 {
            props.keys().next_back()
        } else {
            props.range(..prop).next_back().map(|(k, _)| k)
        };
        Ok(next.copied().unwrap_or(0))
    }

    fn property_length(&self, _: &Memory, addr: u16) -> Result<u16, VmError> {
        Ok(if addr == 0 { 0 } else { 2 })
    }

    fn name_address(&self, _: &Memory, obj: u16) -> Result<usize, VmError> {
        self.names
            .get(&obj)
            .copied()
            .ok_or_else(|| VmError::Collaborator(format!("object {} has no name", obj)))
    }
}

/// Tokenizer that records word counts: byte 1 of the parse buffer receives
/// the number of space separated words in the text buffer.
#[derive(Debug, Default, Clone)]
pub struct CountingTokenizer {
    pub calls: Rc<RefCell<Vec<TokeniseRequest>>>,
}

impl Tokenizer for CountingTokenizer {
    fn tokenise(&mut self, memory: &mut Memory, request: &TokeniseRequest) -> Result<(), VmError> {
        self.calls.borrow_mut().push(*request);
        let version = memory.read_byte(0)?;
        let (start, len) = if version <= 4 {
            let mut len = 0;
            while memory.read_byte(request.text_buffer + 1 + len)? != 0 {
                len += 1;
            }
            (request.text_buffer + 1, len)
        } else {
            (
                request.text_buffer + 2,
                memory.read_byte(request.text_buffer + 1)? as usize,
            )
        };
        let text = memory.slice(start, len)?;
        let words = text
            .split(|&b| b == b' ')
            .filter(|w| !w.is_empty())
            .count();
        memory.write_byte(request.parse_buffer + 1, words as u8)
    }
}
