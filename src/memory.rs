use crate::error::VmError;

/// Flat byte-addressable story memory.
///
/// One buffer holds the whole image; the dynamic/static/high partition is
/// only declared by the header. Words are big-endian. Storage is
/// sign-agnostic: writes keep the low 8/16 bits, and the signed readers only
/// change how those bits are interpreted.
#[derive(Debug, Clone)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    pub fn new(bytes: Vec<u8>) -> Self {
        Memory { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    fn check(&self, addr: usize, width: usize) -> Result<(), VmError> {
        match addr.checked_add(width) {
            Some(end) if end <= self.bytes.len() => Ok(()),
            _ => Err(VmError::AddressOutOfRange {
                addr,
                len: self.bytes.len(),
            }),
        }
    }

    /// Borrow `len` bytes starting at `addr`
    pub fn slice(&self, addr: usize, len: usize) -> Result<&[u8], VmError> {
        self.check(addr, len)?;
        Ok(&self.bytes[addr..addr + len])
    }

    pub fn read_byte(&self, addr: usize) -> Result<u8, VmError> {
        self.check(addr, 1)?;
        Ok(self.bytes[addr])
    }

    pub fn read_signed_byte(&self, addr: usize) -> Result<i8, VmError> {
        Ok(self.read_byte(addr)? as i8)
    }

    /// Read a word (2 bytes, big-endian)
    pub fn read_word(&self, addr: usize) -> Result<u16, VmError> {
        self.check(addr, 2)?;
        Ok(((self.bytes[addr] as u16) << 8) | self.bytes[addr + 1] as u16)
    }

    pub fn read_signed_word(&self, addr: usize) -> Result<i16, VmError> {
        Ok(self.read_word(addr)? as i16)
    }

    pub fn write_byte(&mut self, addr: usize, value: u8) -> Result<(), VmError> {
        self.check(addr, 1)?;
        self.bytes[addr] = value;
        Ok(())
    }

    /// Write a word (2 bytes, big-endian). Both bytes are range-checked
    /// before either is written.
    pub fn write_word(&mut self, addr: usize, value: u16) -> Result<(), VmError> {
        self.check(addr, 2)?;
        self.bytes[addr] = (value >> 8) as u8;
        self.bytes[addr + 1] = (value & 0xFF) as u8;
        Ok(())
    }

    /// Overwrite `data.len()` bytes starting at `addr`
    pub fn write_slice(&mut self, addr: usize, data: &[u8]) -> Result<(), VmError> {
        self.check(addr, data.len())?;
        self.bytes[addr..addr + data.len()].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_word_is_big_endian() {
        let mem = Memory::new(vec![0x12, 0x34, 0xff, 0xfe]);
        assert_eq!(mem.read_word(0).unwrap(), 0x1234);
        assert_eq!(mem.read_word(2).unwrap(), 0xfffe);
        assert_eq!(mem.read_signed_word(2).unwrap(), -2);
    }

    #[test]
    fn test_signed_byte() {
        let mem = Memory::new(vec![0x80, 0x7f]);
        assert_eq!(mem.read_byte(0).unwrap(), 0x80);
        assert_eq!(mem.read_signed_byte(0).unwrap(), -128);
        assert_eq!(mem.read_signed_byte(1).unwrap(), 127);
    }

    #[test]
    fn test_writes_are_sign_agnostic() {
        let mut mem = Memory::new(vec![0; 4]);
        mem.write_word(0, (-15000i16) as u16).unwrap();
        assert_eq!(mem.read_signed_word(0).unwrap(), -15000);
        assert_eq!(mem.read_word(0).unwrap(), 50536);
        mem.write_byte(2, (-1i8) as u8).unwrap();
        assert_eq!(mem.read_byte(2).unwrap(), 0xff);
    }

    #[test]
    fn test_out_of_range() {
        let mut mem = Memory::new(vec![0; 4]);
        assert!(matches!(
            mem.read_byte(4),
            Err(VmError::AddressOutOfRange { addr: 4, len: 4 })
        ));
        // second byte of the word is past the end
        assert!(mem.read_word(3).is_err());
        assert!(mem.write_word(3, 0xffff).is_err());
        assert_eq!(mem.read_byte(3).unwrap(), 0, "failed word write must not touch memory");
        assert!(mem.read_word(usize::MAX).is_err());
    }
}
