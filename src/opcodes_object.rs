/// Object system operations for Z-Machine interpreter
///
/// This module handles all object-related operations including:
/// - Object hierarchy operations (get_sibling, get_child, get_parent, insert_obj, remove_obj)
/// - Object properties (get_prop, put_prop, get_prop_addr, get_next_prop, get_prop_len)
/// - Object attributes (test_attr, set_attr, clear_attr)
/// - Object relationships (jin - test if object is inside another)
/// - Object display (print_obj - print object's short name)
///
/// The tree and property tables are owned by the installed object model.
/// Object 0 means "nothing": reads on it yield 0 or false and writes are
/// skipped with a warning.
use crate::dispatch::{DispatchTable, ALL_VERSIONS};
use crate::error::VmError;
use crate::instruction::{Instruction, OperandCount};
use crate::interpreter::{ExecutionResult, Interpreter};
use crate::memory::Memory;
use crate::object::ObjectModel;
use log::{debug, warn};

pub(crate) fn register(table: &mut DispatchTable) {
    table.add(OperandCount::OP1, 0x01, ALL_VERSIONS, Interpreter::op_get_sibling);
    table.add(OperandCount::OP1, 0x02, ALL_VERSIONS, Interpreter::op_get_child);
    table.add(OperandCount::OP1, 0x03, ALL_VERSIONS, Interpreter::op_get_parent);
    table.add(OperandCount::OP1, 0x04, ALL_VERSIONS, Interpreter::op_get_prop_len);
    table.add(OperandCount::OP1, 0x09, ALL_VERSIONS, Interpreter::op_remove_obj);
    table.add(OperandCount::OP1, 0x0A, ALL_VERSIONS, Interpreter::op_print_obj);
    table.add(OperandCount::OP2, 0x06, ALL_VERSIONS, Interpreter::op_jin);
    table.add(OperandCount::OP2, 0x0A, ALL_VERSIONS, Interpreter::op_test_attr);
    table.add(OperandCount::OP2, 0x0B, ALL_VERSIONS, Interpreter::op_set_attr);
    table.add(OperandCount::OP2, 0x0C, ALL_VERSIONS, Interpreter::op_clear_attr);
    table.add(OperandCount::OP2, 0x0E, ALL_VERSIONS, Interpreter::op_insert_obj);
    table.add(OperandCount::OP2, 0x11, ALL_VERSIONS, Interpreter::op_get_prop);
    table.add(OperandCount::OP2, 0x12, ALL_VERSIONS, Interpreter::op_get_prop_addr);
    table.add(OperandCount::OP2, 0x13, ALL_VERSIONS, Interpreter::op_get_next_prop);
    table.add(OperandCount::VAR, 0x03, ALL_VERSIONS, Interpreter::op_put_prop);
}

const NO_OBJECT_MODEL: VmError = VmError::MissingCapability("object model");

impl Interpreter {
    fn object_model(&self) -> Result<&dyn ObjectModel, VmError> {
        self.objects.as_deref().ok_or(NO_OBJECT_MODEL)
    }

    /// Object 0 stands for no object; logged when an opcode receives it
    fn is_nothing(&self, inst: &Instruction, obj: u16) -> bool {
        if obj == 0 {
            warn!(
                "{} on object 0 at {:05x}",
                inst.name(self.vm.version),
                self.current_pc
            );
        }
        obj == 0
    }

    /// Store a relative of `obj` and optionally branch when it exists
    fn store_relative(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
        relation: fn(&dyn ObjectModel, &Memory, u16) -> Result<u16, VmError>,
    ) -> Result<ExecutionResult, VmError> {
        let obj = self.operand(inst, operands, 0)?;
        let related = if self.is_nothing(inst, obj) {
            0
        } else {
            relation(self.object_model()?, &self.vm.memory, obj)?
        };
        self.store_result(inst, related)?;
        self.do_branch(inst, related != 0)
    }

    /// 1OP:0x01 - get_sibling (store, branch if it exists)
    fn op_get_sibling(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        self.store_relative(inst, operands, |model, memory, obj| model.sibling(memory, obj))
    }

    /// 1OP:0x02 - get_child (store, branch if it exists)
    fn op_get_child(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        self.store_relative(inst, operands, |model, memory, obj| model.child(memory, obj))
    }

    /// 1OP:0x03 - get_parent
    fn op_get_parent(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        // get_parent has no branch data, so do_branch falls through
        self.store_relative(inst, operands, |model, memory, obj| model.parent(memory, obj))
    }

    /// 1OP:0x04 - get_prop_len
    fn op_get_prop_len(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let addr = self.operand(inst, operands, 0)?;
        let len = self.object_model()?.property_length(&self.vm.memory, addr)?;
        self.store_result(inst, len)?;
        Ok(ExecutionResult::Continue)
    }

    /// 1OP:0x09 - remove_obj
    fn op_remove_obj(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let obj = self.operand(inst, operands, 0)?;
        if self.is_nothing(inst, obj) {
            return Ok(ExecutionResult::Continue);
        }
        debug!("remove_obj {}", obj);
        let model = self.objects.as_deref_mut().ok_or(NO_OBJECT_MODEL)?;
        model.remove(&mut self.vm.memory, obj)?;
        Ok(ExecutionResult::Continue)
    }

    /// 1OP:0x0A - print_obj (short name)
    fn op_print_obj(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let obj = self.operand(inst, operands, 0)?;
        if self.is_nothing(inst, obj) {
            return Ok(ExecutionResult::Continue);
        }
        let addr = self.object_model()?.name_address(&self.vm.memory, obj)?;
        let name = self.decode_text(addr)?;
        self.write_output(&name)?;
        Ok(ExecutionResult::Continue)
    }

    /// 2OP:0x06 - jin a b: branch if b is the parent of a
    fn op_jin(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let obj = self.operand(inst, operands, 0)?;
        let dest = self.operand(inst, operands, 1)?;
        let parent = if self.is_nothing(inst, obj) {
            0
        } else {
            self.object_model()?.parent(&self.vm.memory, obj)?
        };
        self.do_branch(inst, parent == dest)
    }

    /// 2OP:0x0A - test_attr
    fn op_test_attr(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let obj = self.operand(inst, operands, 0)?;
        let attr = self.operand(inst, operands, 1)?;
        let set = !self.is_nothing(inst, obj)
            && self.object_model()?.test_attribute(&self.vm.memory, obj, attr)?;
        self.do_branch(inst, set)
    }

    /// 2OP:0x0B - set_attr
    fn op_set_attr(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let obj = self.operand(inst, operands, 0)?;
        let attr = self.operand(inst, operands, 1)?;
        if !self.is_nothing(inst, obj) {
            let model = self.objects.as_deref_mut().ok_or(NO_OBJECT_MODEL)?;
            model.set_attribute(&mut self.vm.memory, obj, attr)?;
        }
        Ok(ExecutionResult::Continue)
    }

    /// 2OP:0x0C - clear_attr
    fn op_clear_attr(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let obj = self.operand(inst, operands, 0)?;
        let attr = self.operand(inst, operands, 1)?;
        if !self.is_nothing(inst, obj) {
            let model = self.objects.as_deref_mut().ok_or(NO_OBJECT_MODEL)?;
            model.clear_attribute(&mut self.vm.memory, obj, attr)?;
        }
        Ok(ExecutionResult::Continue)
    }

    /// 2OP:0x0E - insert_obj object destination
    fn op_insert_obj(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let obj = self.operand(inst, operands, 0)?;
        let dest = self.operand(inst, operands, 1)?;
        if self.is_nothing(inst, obj) || self.is_nothing(inst, dest) {
            return Ok(ExecutionResult::Continue);
        }
        debug!("insert_obj {} into {}", obj, dest);
        let model = self.objects.as_deref_mut().ok_or(NO_OBJECT_MODEL)?;
        model.insert(&mut self.vm.memory, obj, dest)?;
        Ok(ExecutionResult::Continue)
    }

    /// 2OP:0x11 - get_prop
    fn op_get_prop(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let obj = self.operand(inst, operands, 0)?;
        let prop = self.operand(inst, operands, 1)?;
        let value = if self.is_nothing(inst, obj) {
            0
        } else {
            self.object_model()?.property(&self.vm.memory, obj, prop)?
        };
        self.store_result(inst, value)?;
        Ok(ExecutionResult::Continue)
    }

    /// 2OP:0x12 - get_prop_addr
    fn op_get_prop_addr(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let obj = self.operand(inst, operands, 0)?;
        let prop = self.operand(inst, operands, 1)?;
        let addr = if self.is_nothing(inst, obj) {
            0
        } else {
            self.object_model()?.property_address(&self.vm.memory, obj, prop)?
        };
        self.store_result(inst, addr)?;
        Ok(ExecutionResult::Continue)
    }

    /// 2OP:0x13 - get_next_prop
    fn op_get_next_prop(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let obj = self.operand(inst, operands, 0)?;
        let prop = self.operand(inst, operands, 1)?;
        let next = if self.is_nothing(inst, obj) {
            0
        } else {
            self.object_model()?.next_property(&self.vm.memory, obj, prop)?
        };
        self.store_result(inst, next)?;
        Ok(ExecutionResult::Continue)
    }

    /// VAR:0x03 - put_prop
    fn op_put_prop(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, VmError> {
        let obj = self.operand(inst, operands, 0)?;
        let prop = self.operand(inst, operands, 1)?;
        let value = self.operand(inst, operands, 2)?;
        if !self.is_nothing(inst, obj) {
            let model = self.objects.as_deref_mut().ok_or(NO_OBJECT_MODEL)?;
            model.put_property(&mut self.vm.memory, obj, prop, value)?;
        }
        Ok(ExecutionResult::Continue)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::VmError;
    use crate::interpreter::Interpreter;
    use crate::test_utils::{interpreter, run, zstring, FakeObjects, StoryBuilder, SCRATCH};
    use std::collections::BTreeMap;
    use test_log::test;

    /// Room 1 holding objects 2 and 3; object 2 has attribute 5 and
    /// properties 4 and 7
    fn world() -> FakeObjects {
        let mut objects = FakeObjects::default();
        objects.parent.extend([(2, 1), (3, 1)]);
        objects.child.insert(1, 2);
        objects.sibling.insert(2, 3);
        objects.attributes.insert(2, vec![5]);
        objects
            .properties
            .insert(2, BTreeMap::from([(4, 0x0044), (7, 0x0077)]));
        objects.names.insert(2, SCRATCH);
        objects
    }

    fn with_world(story: Vec<u8>) -> Interpreter {
        let (interp, _) = interpreter(story, "");
        interp.with_objects(world())
    }

    #[test]
    fn test_tree_navigation() {
        // get_child #1 -> G10 ?+2 ; get_sibling #2 -> G11 ?+2 ;
        // get_sibling #3 -> G12 ?+2 ; get_parent #3 -> G13 ; quit
        let story = StoryBuilder::new(3)
            .code(&[
                0x92, 0x01, 0x10, 0xC2, // get_child
                0x91, 0x02, 0x11, 0xC2, // get_sibling
                0x91, 0x03, 0x12, 0xC2, // get_sibling (none, no branch)
                0x93, 0x03, 0x13, // get_parent
                0xBA,
            ])
            .build();
        let mut interp = with_world(story);
        run(&mut interp).unwrap();
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 2);
        assert_eq!(interp.vm.read_global(0x11).unwrap(), 3);
        assert_eq!(interp.vm.read_global(0x12).unwrap(), 0);
        assert_eq!(interp.vm.read_global(0x13).unwrap(), 1);
    }

    #[test]
    fn test_get_child_branch() {
        // get_child #2 -> G10 ?~+3 (taken: no child) ; quit ; print_num #7 ; quit
        let story = StoryBuilder::new(3)
            .code(&[0x92, 0x02, 0x10, 0x43, 0xBA, 0xE6, 0x7F, 0x07, 0xBA])
            .build();
        let (interp, out) = interpreter(story, "");
        let mut interp = interp.with_objects(world());
        run(&mut interp).unwrap();
        assert_eq!(out.contents(), "7");
    }

    #[test]
    fn test_attributes_and_jin() {
        // test_attr #2 #5 ?+3 ; quit ; clear_attr #2 #5 ; set_attr #3 #1 ;
        // jin #3 #1 ?+3 ; quit ; print_num #1 ; quit
        let story = StoryBuilder::new(3)
            .code(&[
                0x0A, 0x02, 0x05, 0xC3, 0xBA, // test_attr
                0x0C, 0x02, 0x05, // clear_attr
                0x0B, 0x03, 0x01, // set_attr
                0x06, 0x03, 0x01, 0xC3, 0xBA, // jin
                0xE6, 0x7F, 0x01, 0xBA,
            ])
            .build();
        let (interp, out) = interpreter(story, "");
        let mut interp = interp.with_objects(world());
        run(&mut interp).unwrap();
        assert_eq!(out.contents(), "1");
    }

    #[test]
    fn test_insert_and_remove() {
        // insert_obj #3 #2 ; remove_obj #2 ; get_child #1 -> G10 ?+2 ; quit
        let story = StoryBuilder::new(3)
            .code(&[0x0E, 0x03, 0x02, 0x99, 0x02, 0x92, 0x01, 0x10, 0xC2, 0xBA])
            .build();
        let mut interp = with_world(story);
        run(&mut interp).unwrap();
        // object 2 left the room and took 3 with it
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 0);
    }

    #[test]
    fn test_properties() {
        // get_prop #2 #7 -> G10 ; get_prop_addr #2 #4 -> G11 ;
        // get_next_prop #2 #7 -> G12 ; get_prop_len G11 -> G13 ;
        // put_prop #2 #4 #0099 ; get_prop #2 #4 -> G14 ; quit
        let story = StoryBuilder::new(3)
            .code(&[
                0x11, 0x02, 0x07, 0x10, // get_prop
                0x12, 0x02, 0x04, 0x11, // get_prop_addr
                0x13, 0x02, 0x07, 0x12, // get_next_prop
                0xA4, 0x11, 0x13, // get_prop_len
                0xE3, 0x53, 0x02, 0x04, 0x00, 0x99, // put_prop
                0x11, 0x02, 0x04, 0x14, // get_prop
                0xBA,
            ])
            .build();
        let mut interp = with_world(story);
        run(&mut interp).unwrap();
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 0x77);
        assert_eq!(interp.vm.read_global(0x11).unwrap(), 0x500 + 0x20 + 4);
        assert_eq!(interp.vm.read_global(0x12).unwrap(), 4);
        assert_eq!(interp.vm.read_global(0x13).unwrap(), 2);
        assert_eq!(interp.vm.read_global(0x14).unwrap(), 0x99);
    }

    #[test]
    fn test_print_obj() {
        let story = StoryBuilder::new(3)
            .code(&[0x9A, 0x02, 0xBA])
            .bytes(SCRATCH, &zstring("lamp"))
            .build();
        let (interp, out) = interpreter(story, "");
        let mut interp = interp.with_objects(world());
        run(&mut interp).unwrap();
        assert_eq!(out.contents(), "lamp");
    }

    #[test]
    fn test_object_zero_is_nothing() {
        // get_parent #0 -> G10 ; set_attr #0 #1 ; quit
        let story = StoryBuilder::new(3)
            .code(&[0x93, 0x00, 0x10, 0x0B, 0x00, 0x01, 0xBA])
            .global(0x10, 0x7777)
            .build();
        let mut interp = with_world(story);
        run(&mut interp).unwrap();
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 0);
    }

    #[test]
    fn test_missing_object_model() {
        let story = StoryBuilder::new(3).code(&[0x93, 0x02, 0x10, 0xBA]).build();
        let (mut interp, _) = interpreter(story, "");
        assert!(matches!(
            run(&mut interp),
            Err(VmError::MissingCapability("object model"))
        ));
    }
}
