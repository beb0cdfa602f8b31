//! Per-function stack frame bookkeeping.
//!
//! `FrameInfo` collects every object that needs stack storage: alloca-ed
//! locals, spill slots created by the register allocator, and the outgoing
//! call-argument area. Offsets are symbolic (frame indices) until
//! `calculate_offsets` runs; frame lowering and stack-slot lowering then
//! rewrite frame-index operands into concrete SP-relative addresses.

use crate::entity::{entity_impl, PrimaryMap};
use crate::ir::Value;
use rustc_hash::FxHashMap;

/// A symbolic reference to a stack frame object.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct FrameIndex(u32);
entity_impl!(FrameIndex, "fi");

/// What a frame object is used for.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FrameObjectKind {
    /// Storage for an `alloca`.
    Local,
    /// A register-allocator spill slot.
    SpillSlot,
}

/// A single object within the frame.
#[derive(Clone, Debug)]
pub struct FrameObject {
    /// Size in bytes.
    pub size: u32,
    /// Alignment in bytes. At least 16 for locals, at least 8 for spill
    /// slots.
    pub align: u32,
    /// Offset from SP after the prologue. Assigned by
    /// `calculate_offsets`.
    pub offset: Option<u32>,
    /// The kind of object.
    pub kind: FrameObjectKind,
}

/// The frame layout table of a single function.
#[derive(Clone, Debug)]
pub struct FrameInfo {
    objects: PrimaryMap<FrameIndex, FrameObject>,
    locals: FxHashMap<Value, FrameIndex>,
    param_area: u32,
    base_align: u32,
}

impl Default for FrameInfo {
    fn default() -> Self {
        Self::new()
    }
}

const DEFAULT_BASE_ALIGN: u32 = 16;

fn align_to(value: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

impl FrameInfo {
    /// Create an empty frame.
    pub fn new() -> Self {
        Self {
            objects: PrimaryMap::new(),
            locals: FxHashMap::default(),
            param_area: 0,
            base_align: DEFAULT_BASE_ALIGN,
        }
    }

    /// Create storage for the alloca defining `value`.
    pub fn create_local(&mut self, value: Value, size: u32, align: u32) -> FrameIndex {
        let fi = self.objects.push(FrameObject {
            size,
            align: align.max(16),
            offset: None,
            kind: FrameObjectKind::Local,
        });
        self.locals.insert(value, fi);
        fi
    }

    /// Create a spill slot.
    pub fn create_spill_slot(&mut self, size: u32) -> FrameIndex {
        self.objects.push(FrameObject {
            size,
            align: 8,
            offset: None,
            kind: FrameObjectKind::SpillSlot,
        })
    }

    /// The frame index backing an alloca result, if one exists.
    pub fn local_for_value(&self, value: Value) -> Option<FrameIndex> {
        self.locals.get(&value).copied()
    }

    /// The assigned offset of `fi`, if offsets have been calculated.
    pub fn offset(&self, fi: FrameIndex) -> Option<u32> {
        self.objects.get(fi).and_then(|obj| obj.offset)
    }

    /// The object behind `fi`.
    pub fn object(&self, fi: FrameIndex) -> &FrameObject {
        &self.objects[fi]
    }

    /// Number of frame objects.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Record that at least `bytes` of outgoing argument space is needed.
    pub fn set_param_area_size(&mut self, bytes: u32) {
        self.param_area = self.param_area.max(align_to(bytes, 16));
    }

    /// The outgoing argument area size.
    pub fn param_area_size(&self) -> u32 {
        self.param_area
    }

    /// Assign an offset to every object and return the total size of the
    /// local area (outgoing args + objects), aligned to the base
    /// alignment. Safe to call repeatedly.
    pub fn calculate_offsets(&mut self) -> u32 {
        let mut offset = self.param_area;
        for obj in self.objects.values_mut() {
            offset = align_to(offset, obj.align);
            obj.offset = Some(offset);
            offset += obj.size;
        }
        align_to(offset, self.base_align)
    }

    /// The size of the local area as laid out by the last
    /// `calculate_offsets` call.
    pub fn stack_size(&self) -> u32 {
        let mut max = self.param_area;
        for obj in self.objects.values() {
            if let Some(offset) = obj.offset {
                max = max.max(offset + obj.size);
            }
        }
        align_to(max, self.base_align)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;

    #[test]
    fn offsets_are_aligned_and_contiguous() {
        let mut frame = FrameInfo::new();
        let a = frame.create_local(Value::new(0), 4, 16);
        let s0 = frame.create_spill_slot(8);
        let s1 = frame.create_spill_slot(8);

        let total = frame.calculate_offsets();
        assert_eq!(frame.offset(a), Some(0));
        assert_eq!(frame.offset(s0), Some(16));
        assert_eq!(frame.offset(s1), Some(24));
        assert_eq!(total, 32);
        assert_eq!(frame.stack_size(), 32);
    }

    #[test]
    fn param_area_comes_first() {
        let mut frame = FrameInfo::new();
        frame.set_param_area_size(16);
        let s = frame.create_spill_slot(8);
        frame.calculate_offsets();
        assert_eq!(frame.offset(s), Some(16));
    }

    #[test]
    fn total_is_multiple_of_base_alignment() {
        let mut frame = FrameInfo::new();
        frame.create_spill_slot(8);
        assert_eq!(frame.calculate_offsets() % 16, 0);
    }
}
