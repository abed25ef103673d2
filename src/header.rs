use std::fmt::Display;
use std::fmt::Error;
use std::fmt::Formatter;

use crate::error::VmError;
use crate::memory::Memory;

const VERSION: usize = 0x00;
const FLAGS1: usize = 0x01;
const RELEASE: usize = 0x02;
const HIGH_MEMORY_BASE: usize = 0x04;
const INITIAL_PC: usize = 0x06;
const DICTIONARY: usize = 0x08;
const OBJECT_TABLE: usize = 0x0a;
const GLOBAL_VARIABLES: usize = 0x0c;
const STATIC_MEMORY_BASE: usize = 0x0e;
pub const FLAGS2: usize = 0x10;
const SERIAL: usize = 0x12;
const ABBREVIATIONS: usize = 0x18;
const FILE_LENGTH: usize = 0x1a;
const CHECKSUM: usize = 0x1c;
const ROUTINES_OFFSET: usize = 0x28;
const STATIC_STRINGS_OFFSET: usize = 0x2a;

/// Size of the header record at the start of every story file
pub const HEADER_SIZE: usize = 64;

/// Read-only view over the first 64 bytes of memory.
///
/// Nothing is cached: every accessor reads the underlying buffer, so writes
/// the story makes to its own header are always visible.
pub struct Header<'a> {
    memory: &'a Memory,
}

impl<'a> Header<'a> {
    pub fn new(memory: &'a Memory) -> Header<'a> {
        Header { memory }
    }

    pub fn version(&self) -> Result<u8, VmError> {
        self.memory.read_byte(VERSION)
    }

    pub fn flags1(&self) -> Result<u8, VmError> {
        self.memory.read_byte(FLAGS1)
    }

    pub fn release(&self) -> Result<u16, VmError> {
        self.memory.read_word(RELEASE)
    }

    pub fn high_memory_base(&self) -> Result<u16, VmError> {
        self.memory.read_word(HIGH_MEMORY_BASE)
    }

    /// Initial program counter. From version 6 on this is the packed
    /// address of the main routine instead.
    pub fn initial_pc(&self) -> Result<u16, VmError> {
        self.memory.read_word(INITIAL_PC)
    }

    pub fn dictionary(&self) -> Result<u16, VmError> {
        self.memory.read_word(DICTIONARY)
    }

    pub fn object_table(&self) -> Result<u16, VmError> {
        self.memory.read_word(OBJECT_TABLE)
    }

    pub fn global_variables(&self) -> Result<u16, VmError> {
        self.memory.read_word(GLOBAL_VARIABLES)
    }

    pub fn static_memory_base(&self) -> Result<u16, VmError> {
        self.memory.read_word(STATIC_MEMORY_BASE)
    }

    pub fn flags2(&self) -> Result<u16, VmError> {
        self.memory.read_word(FLAGS2)
    }

    pub fn serial(&self) -> Result<String, VmError> {
        Ok(self
            .memory
            .slice(SERIAL, 6)?
            .iter()
            .map(|&b| b as char)
            .collect())
    }

    pub fn abbreviations(&self) -> Result<u16, VmError> {
        self.memory.read_word(ABBREVIATIONS)
    }

    /// Declared story length in bytes. The raw field is scaled by 2 up to
    /// version 3, by 4 in versions 4 and 5, and by 8 afterwards.
    pub fn file_length(&self) -> Result<usize, VmError> {
        let version = self.require_version("file length", 3)?;
        let multiplier = match version {
            0..=3 => 2,
            4 | 5 => 4,
            _ => 8,
        };
        Ok(self.memory.read_word(FILE_LENGTH)? as usize * multiplier)
    }

    pub fn checksum(&self) -> Result<u16, VmError> {
        self.require_version("checksum", 3)?;
        self.memory.read_word(CHECKSUM)
    }

    /// Routines offset, divided by 8
    pub fn routines_offset(&self) -> Result<u16, VmError> {
        self.require_version("routines offset", 6)?;
        self.memory.read_word(ROUTINES_OFFSET)
    }

    /// Static strings offset, divided by 8
    pub fn static_strings_offset(&self) -> Result<u16, VmError> {
        self.require_version("static strings offset", 6)?;
        self.memory.read_word(STATIC_STRINGS_OFFSET)
    }

    fn require_version(&self, feature: &'static str, minimum: u8) -> Result<u8, VmError> {
        let version = self.version()?;
        if version < minimum {
            return Err(VmError::UnsupportedVersion {
                feature,
                minimum,
                version,
            });
        }
        Ok(version)
    }
}

impl Display for Header<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let word = |r: Result<u16, VmError>| r.unwrap_or(0);
        write!(
            f,
            "
Z-code version:           {}
Interpreter flags:        {:#04x}
Release number:           {}
Size of resident memory:  {:#06x}
Start PC:                 {:#06x}
Dictionary address:       {:#06x}
Object table address:     {:#06x}
Global variables address: {:#06x}
Size of dynamic memory:   {:#06x}
Serial number:            {}
Abbreviations address:    {:#06x}
File size:                {:#06x}
Checksum:                 {:#06x}
",
            self.version().unwrap_or(0),
            self.flags1().unwrap_or(0),
            word(self.release()),
            word(self.high_memory_base()),
            word(self.initial_pc()),
            word(self.dictionary()),
            word(self.object_table()),
            word(self.global_variables()),
            word(self.static_memory_base()),
            self.serial().unwrap_or_default(),
            word(self.abbreviations()),
            self.file_length().unwrap_or(0),
            word(self.checksum()),
        )
    }
}
