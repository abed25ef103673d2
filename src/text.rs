use crate::error::VmError;
use crate::header::Header;
use crate::memory::Memory;
use log::{debug, trace};

/// The three alphabets for Z-string decoding
pub const ALPHABET_A0: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const ALPHABET_A1: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ALPHABET_A2_V1: &[u8] = b" 0123456789.,!?_#'\"/\\<-:()";
const ALPHABET_A2: &[u8] = b" \n0123456789.,!?_#'\"/\\-:()";

/// Characters for ZSCII codes 155-223 (the default extra characters table)
const EXTRA_CHARACTERS: &str =
    "äöüÄÖÜß»«ëïÿËÏáéíóúýÁÉÍÓÚÝàèìòùÀÈÌÒÙâêîôûÂÊÎÔÛåÅøØãñõÃÑÕæÆçÇþðÞÐ£œŒ¡¿";

/// Abbreviations may not nest; a little slack covers sloppy story files
const MAX_ABBREVIATION_DEPTH: u8 = 3;

/// Strings longer than this are treated as runaway data
const MAX_ZCHARS: usize = 3000;

/// Decompresses encoded strings for the print family of opcodes.
pub trait TextDecoder {
    /// Decode the string starting at `addr`. Returns the text and the
    /// number of bytes the encoded form occupies.
    fn decode(&self, memory: &Memory, addr: usize) -> Result<(String, usize), VmError>;
}

/// Byte length of the encoded string at `addr`: words up to and including
/// the first one with bit 15 set.
pub fn encoded_length(memory: &Memory, addr: usize) -> Result<usize, VmError> {
    let mut offset = addr;
    loop {
        let word = memory.read_word(offset)?;
        offset += 2;
        if word & 0x8000 != 0 {
            return Ok(offset - addr);
        }
    }
}

/// Translate a ZSCII output code to a character. Returns None for codes
/// with no printable form.
pub fn zscii_to_char(code: u16) -> Option<char> {
    match code {
        13 => Some('\n'),
        32..=126 => Some(code as u8 as char),
        155..=223 => EXTRA_CHARACTERS.chars().nth((code - 155) as usize),
        _ => None,
    }
}

/// Translate a character to its ZSCII code, if it has one
pub fn char_to_zscii(ch: char) -> Option<u16> {
    match ch {
        '\n' | '\r' => Some(13),
        ' '..='~' => Some(ch as u16),
        _ => EXTRA_CHARACTERS
            .chars()
            .position(|c| c == ch)
            .map(|i| 155 + i as u16),
    }
}

/// Standard decoder for the compressed text format, reading the version and
/// the abbreviations table from the story header.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZsciiDecoder;

impl TextDecoder for ZsciiDecoder {
    fn decode(&self, memory: &Memory, addr: usize) -> Result<(String, usize), VmError> {
        let header = Header::new(memory);
        let version = header.version()?;
        let abbreviations = header.abbreviations()? as usize;
        decode_string_recursive(memory, addr, version, abbreviations, 0)
    }
}

fn collect_zchars(memory: &Memory, addr: usize) -> Result<(Vec<u8>, usize), VmError> {
    let mut zchars = Vec::new();
    let mut offset = addr;
    loop {
        let word = memory.read_word(offset)?;
        offset += 2;
        zchars.extend_from_slice(&[
            ((word >> 10) & 0x1F) as u8,
            ((word >> 5) & 0x1F) as u8,
            (word & 0x1F) as u8,
        ]);
        trace!("Z-word {:04x} at {:05x}", word, offset - 2);
        if word & 0x8000 != 0 {
            return Ok((zchars, offset - addr));
        }
        if zchars.len() >= MAX_ZCHARS {
            return Err(VmError::Collaborator(format!(
                "unterminated string at {:05x}",
                addr
            )));
        }
    }
}

/// Internal recursive function with depth tracking
fn decode_string_recursive(
    memory: &Memory,
    addr: usize,
    version: u8,
    abbreviations: usize,
    depth: u8,
) -> Result<(String, usize), VmError> {
    if depth > MAX_ABBREVIATION_DEPTH {
        return Err(VmError::Collaborator(format!(
            "abbreviation recursion too deep at {:05x}",
            addr
        )));
    }
    let (zchars, consumed) = collect_zchars(memory, addr)?;

    let mut result = String::new();
    // Locked alphabet (V1-2 shift lock) and the one for the next character
    let mut locked = 0usize;
    let mut current = 0usize;

    let mut i = 0;
    while i < zchars.len() {
        let zc = zchars[i];
        i += 1;

        let abbreviation_bank = match (version, zc) {
            (1, _) => None,
            (2, 1) => Some(0),
            (3..=8, 1..=3) => Some(zc as usize - 1),
            _ => None,
        };
        if let Some(bank) = abbreviation_bank {
            // A dangling abbreviation marker at the end of the string is padding
            if let Some(&index) = zchars.get(i) {
                i += 1;
                let entry = abbreviations + (bank * 32 + index as usize) * 2;
                let target = memory.read_word(entry)? as usize * 2;
                let (text, _) =
                    decode_string_recursive(memory, target, version, abbreviations, depth + 1)?;
                result.push_str(&text);
            }
            current = locked;
            continue;
        }

        match zc {
            0 => {
                result.push(' ');
                current = locked;
            }
            1 => {
                // Only reachable in V1: newline
                result.push('\n');
                current = locked;
            }
            2..=5 if version <= 2 => {
                // 2/3 shift for one character, 4/5 shift lock
                let step = if zc % 2 == 0 { 1 } else { 2 };
                current = (locked + step) % 3;
                if zc >= 4 {
                    locked = current;
                }
            }
            4 => current = 1,
            5 => current = 2,
            6 if current == 2 => {
                // 10-bit ZSCII escape in the next two z-characters
                if i + 1 < zchars.len() {
                    let code = ((zchars[i] as u16) << 5) | zchars[i + 1] as u16;
                    i += 2;
                    result.push(zscii_to_char(code).unwrap_or('?'));
                } else {
                    debug!("ZSCII escape truncated at end of string {:05x}", addr);
                    i = zchars.len();
                }
                current = locked;
            }
            _ => {
                let index = (zc - 6) as usize;
                let ch = match current {
                    0 => ALPHABET_A0[index],
                    1 => ALPHABET_A1[index],
                    _ if version == 1 => ALPHABET_A2_V1[index],
                    _ => ALPHABET_A2[index],
                };
                result.push(ch as char);
                current = locked;
            }
        }
    }

    Ok((result, consumed))
}
