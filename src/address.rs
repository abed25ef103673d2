//! Packed address translation.
//!
//! Routine and string targets are stored as packed words. Versions 6 and 7
//! add a header offset on top of the multiplier, and the offset field differs
//! between routines and strings, so the two translations stay separate.

use crate::error::VmError;
use crate::header::Header;

/// Packed address multiplier for a story version
pub fn multiplier(version: u8) -> Result<usize, VmError> {
    match version {
        1..=3 => Ok(2),
        4..=7 => Ok(4),
        8 => Ok(8),
        _ => Err(VmError::UnknownVersion(version)),
    }
}

/// Unpack the target of a call instruction
pub fn to_routine_address(header: &Header, packed: u16) -> Result<usize, VmError> {
    let version = header.version()?;
    let base = packed as usize * multiplier(version)?;
    match version {
        6 | 7 => Ok(base + 8 * header.routines_offset()? as usize),
        _ => Ok(base),
    }
}

/// Unpack the target of a print_paddr-style string reference
pub fn to_string_address(header: &Header, packed: u16) -> Result<usize, VmError> {
    let version = header.version()?;
    let base = packed as usize * multiplier(version)?;
    match version {
        6 | 7 => Ok(base + 8 * header.static_strings_offset()? as usize),
        _ => Ok(base),
    }
}
