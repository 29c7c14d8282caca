//! Frame layout metadata.
//!
//! A layout is the static description of one closure frame: a synthesized
//! record type with one field per slot, and a link to the layout of the
//! frame stored in slot 0. The chain of layouts mirrors the chain of frame
//! values at run time, so hop counts computed here are valid for any frame
//! built from the layout.

use framejit_types::{RecordField, RecordType, Type, VarId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::ir::Variable;
use crate::storage::StorageKind;

/// Bits reserved for the slot half of an encoded `(hops, slot)` pair
pub const SLOT_BITS: u32 = 32;

/// One slot of a frame
#[derive(Debug, Clone)]
pub struct FrameSlot {
    pub variable: Variable,
    pub storage: StorageKind,
}

impl FrameSlot {
    pub fn new(variable: Variable, storage: StorageKind) -> Self {
        Self { variable, storage }
    }

    /// Type of the record field backing this slot
    pub fn field_type(&self) -> Type {
        if self.storage.is_boxed() {
            Type::strong_box(self.variable.ty().clone())
        } else {
            self.variable.ty().clone()
        }
    }
}

#[derive(Debug)]
pub struct FrameLayout {
    pub record: Arc<RecordType>,
    /// Layout of the frame referenced from slot 0, if there is one
    pub parent: Option<Arc<FrameLayout>>,
    pub slots: Vec<FrameSlot>,
    index: HashMap<VarId, usize>,
}

impl FrameLayout {
    /// Build a layout. Slot order is `slots` order; when `parent` is given
    /// the caller has already put the parent link variable in slot 0.
    pub fn new(name: impl Into<String>, parent: Option<Arc<FrameLayout>>, slots: Vec<FrameSlot>) -> Self {
        let fields = slots
            .iter()
            .map(|slot| RecordField {
                name: slot.variable.name().to_string(),
                ty: slot.field_type(),
            })
            .collect();
        let index = slots
            .iter()
            .enumerate()
            .map(|(i, slot)| (slot.variable.id(), i))
            .collect();

        Self {
            record: Arc::new(RecordType::new(name, fields)),
            parent,
            slots,
            index,
        }
    }

    pub fn record_type(&self) -> Type {
        Type::Record(self.record.clone())
    }

    pub fn slot_of(&self, variable: &Variable) -> Option<usize> {
        self.index.get(&variable.id()).copied()
    }

    pub fn slot(&self, index: usize) -> Option<&FrameSlot> {
        self.slots.get(index)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Find `variable` in this frame or one of its ancestors. Returns the
    /// number of parent links to follow and the slot in that frame.
    pub fn locate(&self, variable: &Variable) -> Option<(u32, usize)> {
        let mut hops = 0u32;
        let mut layout = self;
        loop {
            if let Some(slot) = layout.slot_of(variable) {
                return Some((hops, slot));
            }
            layout = layout.parent.as_deref()?;
            hops += 1;
        }
    }

    /// Number of parent links between this layout and `ancestor`
    pub fn hops_to(self: &Arc<Self>, ancestor: &Arc<FrameLayout>) -> Option<u32> {
        let mut hops = 0u32;
        let mut layout = self;
        loop {
            if Arc::ptr_eq(layout, ancestor) {
                return Some(hops);
            }
            layout = layout.parent.as_ref()?;
            hops += 1;
        }
    }
}

/// Pack a `(hops, slot)` pair into one integer
pub fn encode_location(hops: u32, slot: usize) -> u64 {
    ((hops as u64) << SLOT_BITS) | (slot as u64 & 0xFFFF_FFFF)
}

/// Unpack an integer built by [`encode_location`]
pub fn decode_location(encoded: u64) -> (u32, usize) {
    ((encoded >> SLOT_BITS) as u32, (encoded & 0xFFFF_FFFF) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(name: &str, parent: Option<Arc<FrameLayout>>, vars: &[(&Variable, StorageKind)]) -> Arc<FrameLayout> {
        let mut slots = Vec::new();
        if let Some(p) = &parent {
            slots.push(FrameSlot::new(Variable::new("parent", p.record_type()), StorageKind::HOISTED));
        }
        slots.extend(vars.iter().map(|(v, k)| FrameSlot::new((*v).clone(), *k)));
        Arc::new(FrameLayout::new(name, parent, slots))
    }

    #[test]
    fn test_boxed_slot_type() {
        let x = Variable::new("x", Type::Int);
        let y = Variable::new("y", Type::Int);
        let frame = layout("f", None, &[(&x, StorageKind::HOISTED), (&y, StorageKind::HOISTED | StorageKind::BOXED)]);
        assert_eq!(frame.record.fields[0].ty, Type::Int);
        assert_eq!(frame.record.fields[1].ty, Type::strong_box(Type::Int));
        assert_eq!(frame.slot_of(&y), Some(1));
    }

    #[test]
    fn test_locate_walks_parents() {
        let x = Variable::new("x", Type::Int);
        let y = Variable::new("y", Type::Int);
        let outer = layout("outer", None, &[(&x, StorageKind::HOISTED)]);
        let inner = layout("inner", Some(outer.clone()), &[(&y, StorageKind::HOISTED)]);

        assert_eq!(inner.locate(&y), Some((0, 1)));
        assert_eq!(inner.locate(&x), Some((1, 0)));
        assert_eq!(inner.locate(&Variable::new("z", Type::Int)), None);
        assert_eq!(inner.hops_to(&outer), Some(1));
        assert_eq!(outer.hops_to(&inner), None);
    }

    #[test]
    fn test_encoding() {
        let encoded = encode_location(2, 5);
        assert_eq!(encoded, (2u64 << 32) | 5);
        assert_eq!(decode_location(encoded), (2, 5));
    }
}
