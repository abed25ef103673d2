//! Save/restore capability.
//!
//! A snapshot holds dynamic memory, XOR-RLE compressed against the story as
//! loaded, together with the value stack, the call frames and the address of
//! the save instruction that produced it.

use crate::error::VmError;
use crate::vm::{CallFrame, VM};
use log::debug;

/// Compress dynamic memory using XOR-RLE compression
///
/// This XORs the current memory with the original, then compresses runs of zeros
pub fn compress_memory(current: &[u8], original: &[u8]) -> Result<Vec<u8>, VmError> {
    if current.len() != original.len() {
        return Err(VmError::Collaborator(format!(
            "memory sizes differ: {} vs {}",
            current.len(),
            original.len()
        )));
    }

    let mut compressed = Vec::new();
    let mut i = 0;

    while i < current.len() {
        let xor_byte = current[i] ^ original[i];

        if xor_byte == 0 {
            let start = i;
            while i < current.len() && (current[i] ^ original[i]) == 0 {
                i += 1;
            }
            // Runs are stored as 0 followed by (length - 1), at most 256 per pair
            let mut remaining = i - start;
            while remaining > 0 {
                let run = remaining.min(256);
                compressed.push(0);
                compressed.push((run - 1) as u8);
                remaining -= run;
            }
        } else {
            compressed.push(xor_byte);
            i += 1;
        }
    }

    debug!("Compressed {} bytes to {} bytes", current.len(), compressed.len());
    Ok(compressed)
}

/// Decompress memory using XOR-RLE decompression
pub fn decompress_memory(compressed: &[u8], original: &[u8]) -> Result<Vec<u8>, VmError> {
    let mut decompressed = Vec::with_capacity(original.len());
    let mut bytes = compressed.iter();

    while let Some(&byte) = bytes.next() {
        if byte == 0 {
            let run_length = match bytes.next() {
                Some(&len) => len as usize + 1,
                None => return Err(VmError::Collaborator("incomplete RLE sequence".to_string())),
            };
            let start = decompressed.len();
            if start + run_length > original.len() {
                return Err(VmError::Collaborator("RLE run extends beyond memory".to_string()));
            }
            decompressed.extend_from_slice(&original[start..start + run_length]);
        } else {
            let index = decompressed.len();
            match original.get(index) {
                Some(orig) => decompressed.push(orig ^ byte),
                None => {
                    return Err(VmError::Collaborator(
                        "compressed data extends beyond memory".to_string(),
                    ))
                }
            }
        }
    }

    // Trailing unchanged bytes may be left out
    let filled = decompressed.len();
    decompressed.extend_from_slice(&original[filled..]);
    Ok(decompressed)
}

/// Saved machine state
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Dynamic memory, compressed against the original image
    pub memory: Vec<u8>,
    pub stack: Vec<i16>,
    pub frames: Vec<CallFrame>,
    /// Address of the save instruction
    pub pc: usize,
}

impl Snapshot {
    /// Capture the VM's dynamic memory, stacks and the given save address
    pub fn capture(vm: &VM, original: &[u8], pc: usize) -> Result<Self, VmError> {
        let dynamic = dynamic_len(vm, original)?;
        Ok(Snapshot {
            memory: compress_memory(vm.memory.slice(0, dynamic)?, &original[..dynamic])?,
            stack: vm.stack.clone(),
            frames: vm.call_stack.clone(),
            pc,
        })
    }

    /// Write the snapshot back into the VM. Returns the save address.
    pub fn apply(&self, vm: &mut VM, original: &[u8]) -> Result<usize, VmError> {
        let dynamic = dynamic_len(vm, original)?;
        let bytes = decompress_memory(&self.memory, &original[..dynamic])?;
        vm.memory.write_slice(0, &bytes)?;
        vm.stack = self.stack.clone();
        vm.call_stack = self.frames.clone();
        vm.pc = self.pc;
        Ok(self.pc)
    }
}

fn dynamic_len(vm: &VM, original: &[u8]) -> Result<usize, VmError> {
    let dynamic = vm.header().static_memory_base()? as usize;
    if dynamic > original.len() || dynamic > vm.memory.len() {
        return Err(VmError::AddressOutOfRange {
            addr: dynamic,
            len: original.len().min(vm.memory.len()),
        });
    }
    Ok(dynamic)
}

/// Storage for saved games
pub trait Persistence {
    /// Store a snapshot. Returns false if the host declined to save.
    fn save(&mut self, snapshot: Snapshot) -> Result<bool, VmError>;

    /// Most recently saved snapshot, if any
    fn restore(&mut self) -> Result<Option<Snapshot>, VmError>;
}

/// Keeps the last saved snapshot in memory
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    slot: Option<Snapshot>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_save(&self) -> bool {
        self.slot.is_some()
    }
}

impl Persistence for InMemoryPersistence {
    fn save(&mut self, snapshot: Snapshot) -> Result<bool, VmError> {
        debug!("Saving snapshot for pc {:05x}", snapshot.pc);
        self.slot = Some(snapshot);
        Ok(true)
    }

    fn restore(&mut self) -> Result<Option<Snapshot>, VmError> {
        Ok(self.slot.clone())
    }
}
