//! Object model capability.
//!
//! The object tree and property tables live in story memory, so every
//! operation receives the memory it works on. The interpreter owns no object
//! layout knowledge of its own; object opcodes fail with
//! `VmError::MissingCapability` when no model is installed.

use crate::error::VmError;
use crate::memory::Memory;

pub trait ObjectModel {
    fn parent(&self, memory: &Memory, obj: u16) -> Result<u16, VmError>;
    fn sibling(&self, memory: &Memory, obj: u16) -> Result<u16, VmError>;
    fn child(&self, memory: &Memory, obj: u16) -> Result<u16, VmError>;

    fn test_attribute(&self, memory: &Memory, obj: u16, attr: u16) -> Result<bool, VmError>;
    fn set_attribute(&mut self, memory: &mut Memory, obj: u16, attr: u16) -> Result<(), VmError>;
    fn clear_attribute(&mut self, memory: &mut Memory, obj: u16, attr: u16)
        -> Result<(), VmError>;

    /// Detach `obj` and make it the first child of `dest`
    fn insert(&mut self, memory: &mut Memory, obj: u16, dest: u16) -> Result<(), VmError>;
    /// Detach `obj` from its parent, leaving it without parent or sibling
    fn remove(&mut self, memory: &mut Memory, obj: u16) -> Result<(), VmError>;

    /// Property value, falling back to the default table
    fn property(&self, memory: &Memory, obj: u16, prop: u16) -> Result<u16, VmError>;
    fn put_property(
        &mut self,
        memory: &mut Memory,
        obj: u16,
        prop: u16,
        value: u16,
    ) -> Result<(), VmError>;
    /// Byte address of the property data, or 0 if the object lacks it
    fn property_address(&self, memory: &Memory, obj: u16, prop: u16) -> Result<u16, VmError>;
    /// Number of the property after `prop`; 0 starts the walk, 0 ends it
    fn next_property(&self, memory: &Memory, obj: u16, prop: u16) -> Result<u16, VmError>;
    /// Length of the property whose data starts at `addr`; 0 for address 0
    fn property_length(&self, memory: &Memory, addr: u16) -> Result<u16, VmError>;

    /// Address of the object's encoded short name
    fn name_address(&self, memory: &Memory, obj: u16) -> Result<usize, VmError>;
}
