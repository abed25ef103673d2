use crate::error::VmError;
use crate::memory::Memory;
use crate::opcode_tables;
use crate::text;
use std::fmt::{Display, Error, Formatter, Write};

/// Operand types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// Large constant (2 bytes)
    LargeConstant,
    /// Small constant (1 byte)
    SmallConstant,
    /// Variable number
    Variable,
    /// Omitted (not present)
    Omitted,
}

impl OperandType {
    /// Parse operand type from 2-bit value
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0b00 => OperandType::LargeConstant,
            0b01 => OperandType::SmallConstant,
            0b10 => OperandType::Variable,
            _ => OperandType::Omitted,
        }
    }

    /// Get the size in bytes for this operand type
    pub fn size(&self) -> usize {
        match self {
            OperandType::LargeConstant => 2,
            OperandType::SmallConstant => 1,
            OperandType::Variable => 1,
            OperandType::Omitted => 0,
        }
    }
}

/// Instruction forms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionForm {
    Long,
    Short,
    Extended,
    Variable,
}

/// Operand count categories. Together with the opcode number this selects
/// the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandCount {
    /// 0 operands
    OP0,
    /// 1 operand
    OP1,
    /// 2OP opcode table (long form, or variable form 0xc0-0xdf)
    OP2,
    /// VAR opcode table (variable form 0xe0-0xff)
    VAR,
    /// Extended opcode table (0xbe prefix, V5+)
    EXT,
}

/// Branch information
#[derive(Debug, Clone, PartialEq)]
pub struct BranchInfo {
    /// True if branch on true, false if branch on false
    pub on_true: bool,
    /// Branch offset (0-1 = return false/true, otherwise a jump)
    pub offset: i16,
}

/// A decoded Z-Machine instruction. Operands are raw: variable operands
/// still hold the variable number, resolution happens at execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The opcode number with the form bits stripped
    pub opcode: u8,
    /// The instruction form
    pub form: InstructionForm,
    /// Operand count category
    pub operand_count: OperandCount,
    /// Operand types (up to 8)
    pub operand_types: Vec<OperandType>,
    /// Operand values (up to 8)
    pub operands: Vec<u16>,
    /// Variable to store result (if applicable)
    pub store_var: Option<u8>,
    /// Branch information (if applicable)
    pub branch: Option<BranchInfo>,
    /// Address of the inline string for print and print_ret
    pub text_addr: Option<usize>,
    /// Total size of instruction in bytes
    pub size: usize,
}

/// Read a type byte, appending operand types up to the first omitted slot.
/// Returns false once an omitted slot has been seen.
fn push_operand_types(type_byte: u8, types: &mut Vec<OperandType>) -> bool {
    for i in 0..4 {
        let op_type = OperandType::from_bits(type_byte >> (6 - i * 2));
        if op_type == OperandType::Omitted {
            return false;
        }
        types.push(op_type);
    }
    true
}

impl Instruction {
    /// Decode an instruction from memory at the given address.
    ///
    /// Decoding only reads memory; decoding the same address twice yields
    /// the same instruction.
    pub fn decode(memory: &Memory, addr: usize, version: u8) -> Result<Self, VmError> {
        let mut offset = addr;
        let opcode_byte = memory.read_byte(offset)?;
        offset += 1;

        let form = match opcode_byte {
            0xBE if version >= 5 => InstructionForm::Extended,
            0x00..=0x7F | 0xBE => InstructionForm::Long,
            0x80..=0xBF => InstructionForm::Short,
            0xC0..=0xFF => InstructionForm::Variable,
        };

        let mut operand_types = Vec::new();
        let (opcode, operand_count) = match form {
            InstructionForm::Long => {
                // Long form: types in bits 6 and 5, 0 = small constant, 1 = variable
                for mask in [0x40, 0x20] {
                    operand_types.push(if opcode_byte & mask != 0 {
                        OperandType::Variable
                    } else {
                        OperandType::SmallConstant
                    });
                }
                (opcode_byte & 0x1F, OperandCount::OP2)
            }
            InstructionForm::Short => {
                // Short form: type in bits 5-4, omitted means 0OP
                let op_type = OperandType::from_bits(opcode_byte >> 4);
                if op_type == OperandType::Omitted {
                    (opcode_byte & 0x0F, OperandCount::OP0)
                } else {
                    operand_types.push(op_type);
                    (opcode_byte & 0x0F, OperandCount::OP1)
                }
            }
            InstructionForm::Variable => {
                let opcode = opcode_byte & 0x1F;
                let count = if opcode_byte & 0x20 == 0 {
                    OperandCount::OP2
                } else {
                    OperandCount::VAR
                };
                // call_vs2 and call_vn2 carry a second type byte for up to 8 operands
                let type_bytes = if count == OperandCount::VAR && (opcode == 0x0C || opcode == 0x1A) {
                    2
                } else {
                    1
                };
                let mut open = true;
                for _ in 0..type_bytes {
                    let type_byte = memory.read_byte(offset)?;
                    offset += 1;
                    if open {
                        open = push_operand_types(type_byte, &mut operand_types);
                    }
                }
                (opcode, count)
            }
            InstructionForm::Extended => {
                // Extended form: next byte is the actual opcode
                let ext_opcode = memory.read_byte(offset)?;
                offset += 1;
                let type_byte = memory.read_byte(offset)?;
                offset += 1;
                push_operand_types(type_byte, &mut operand_types);
                (ext_opcode, OperandCount::EXT)
            }
        };

        // Read operand values
        let mut operands = Vec::with_capacity(operand_types.len());
        for op_type in &operand_types {
            match op_type {
                OperandType::LargeConstant => operands.push(memory.read_word(offset)?),
                _ => operands.push(memory.read_byte(offset)? as u16),
            }
            offset += op_type.size();
        }

        let store_var = if opcode_tables::stores_result(opcode, operand_count, version) {
            let var = memory.read_byte(offset)?;
            offset += 1;
            Some(var)
        } else {
            None
        };

        let branch = if opcode_tables::has_branch(opcode, operand_count, version) {
            let first_byte = memory.read_byte(offset)?;
            offset += 1;

            let on_true = (first_byte & 0x80) != 0;
            let offset_val = if (first_byte & 0x40) != 0 {
                // Short form: 6-bit unsigned offset
                (first_byte & 0x3F) as i16
            } else {
                // Long form: 14-bit signed offset
                let second_byte = memory.read_byte(offset)?;
                offset += 1;
                let val = (((first_byte & 0x3F) as i16) << 8) | (second_byte as i16);
                if val & 0x2000 != 0 {
                    // Sign extend
                    val | (0xC000u16 as i16)
                } else {
                    val
                }
            };

            Some(BranchInfo {
                on_true,
                offset: offset_val,
            })
        } else {
            None
        };

        let text_addr = if opcode_tables::has_text(opcode, operand_count, version) {
            let start = offset;
            offset += text::encoded_length(memory, start)?;
            Some(start)
        } else {
            None
        };

        Ok(Instruction {
            opcode,
            form,
            operand_count,
            operand_types,
            operands,
            store_var,
            branch,
            text_addr,
            size: offset - addr,
        })
    }

    /// Get a human-readable name for the instruction
    pub fn name(&self, version: u8) -> &'static str {
        opcode_tables::get_instruction_name(self.opcode, self.operand_count, version)
    }

    /// Format the instruction with proper version information
    pub fn format_with_version(&self, version: u8) -> String {
        let mut result = String::from(self.name(version));
        // Writing to a String cannot fail
        let _ = self.write_operands(&mut result);
        result
    }

    fn write_operands(&self, out: &mut impl Write) -> std::fmt::Result {
        for (i, op) in self.operands.iter().enumerate() {
            out.write_str(if i == 0 { " " } else { ", " })?;
            match self.operand_types[i] {
                OperandType::Variable => write!(out, "V{:02x}", op)?,
                _ => write!(out, "#{:04x}", op)?,
            }
        }

        if let Some(var) = self.store_var {
            write!(out, " -> V{:02x}", var)?;
        }

        if let Some(ref branch) = self.branch {
            write!(
                out,
                " [{}{}]",
                if branch.on_true { "TRUE" } else { "FALSE" },
                match branch.offset {
                    0 => " RFALSE".to_string(),
                    1 => " RTRUE".to_string(),
                    n => format!(" {:+}", n),
                }
            )?;
        }
        Ok(())
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        // Version 3 naming; use format_with_version when the version matters
        write!(f, "{}", self.name(3))?;
        self.write_operands(f)
    }
}
