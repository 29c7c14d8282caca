//! Closure frame builder
//!
//! A [`FrameDescriptor`] wraps the layout of one scope's frame and knows how
//! to read and initialize each slot. Boxed slots hold a cell: reads go
//! through the cell, initialization stores a fresh one.

use std::sync::Arc;

use framejit_ir::{FrameLayout, FrameSlot, Node, StorageKind, Variable};
use framejit_types::Type;

use crate::error::CompileError;

#[derive(Debug, Clone)]
pub struct FrameDescriptor {
    layout: Arc<FrameLayout>,
}

impl FrameDescriptor {
    /// Build a frame from `(variable, storage)` pairs. Slots follow input
    /// order; when `parent` is given, the caller passes the parent link as
    /// the first pair.
    pub fn build(
        name: impl Into<String>,
        parent: Option<Arc<FrameLayout>>,
        variables: &[(Variable, StorageKind)],
    ) -> Self {
        let slots = variables
            .iter()
            .map(|(variable, storage)| FrameSlot::new(variable.clone(), *storage))
            .collect();
        Self {
            layout: Arc::new(FrameLayout::new(name, parent, slots)),
        }
    }

    pub fn layout(&self) -> &Arc<FrameLayout> {
        &self.layout
    }

    pub fn record_type(&self) -> Type {
        self.layout.record_type()
    }

    pub fn contains(&self, variable: &Variable) -> bool {
        self.layout.slot_of(variable).is_some()
    }

    fn slot(&self, variable: &Variable) -> Result<(usize, bool), CompileError> {
        self.layout
            .slot_of(variable)
            .and_then(|index| self.layout.slot(index).map(|slot| (index, slot.storage.is_boxed())))
            .ok_or_else(|| CompileError::VariableNotInFrame {
                variable: variable.clone(),
                frame: self.layout.record.name.clone(),
            })
    }

    /// Read path of `variable` in the frame `frame`. The result is also a
    /// valid assignment target.
    pub fn access(&self, frame: Node, variable: &Variable) -> Result<Node, CompileError> {
        let (index, boxed) = self.slot(variable)?;
        let field = Node::field(frame, index);
        Ok(if boxed { Node::box_value(field) } else { field })
    }

    /// Initialize the slot of `variable` with `value`
    pub fn assign(&self, frame: Node, variable: &Variable, value: Node) -> Result<Node, CompileError> {
        let (index, boxed) = self.slot(variable)?;
        let field = Node::field(frame, index);
        let value = if boxed { Node::new_box(value) } else { value };
        Ok(Node::assign(field, value))
    }

    /// Parent frame of `frame`, when this layout has one
    pub fn parent_link(&self, frame: Node) -> Option<Node> {
        self.layout.parent.as_ref().map(|_| Node::field(frame, 0))
    }

    /// Expression allocating a frame of this layout
    pub fn allocate(&self) -> Node {
        Node::new_frame(self.layout.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framejit_ir::{Literal, NodeKind};

    #[test]
    fn test_slot_order_and_types() {
        let x = Variable::new("x", Type::Int);
        let s = Variable::new("s", Type::String);
        let frame = FrameDescriptor::build(
            "frame",
            None,
            &[(x.clone(), StorageKind::HOISTED), (s.clone(), StorageKind::HOISTED | StorageKind::BOXED)],
        );

        let record = frame.record_type();
        let record = record.as_record().unwrap();
        assert_eq!(record.fields.len(), 2);
        assert_eq!(record.fields[0].ty, Type::Int);
        assert_eq!(record.fields[1].ty, Type::strong_box(Type::String));
        assert!(frame.contains(&s));
    }

    #[test]
    fn test_boxed_access_goes_through_the_cell() {
        let x = Variable::new("x", Type::Int);
        let y = Variable::new("y", Type::Int);
        let frame = FrameDescriptor::build(
            "frame",
            None,
            &[(x.clone(), StorageKind::HOISTED), (y.clone(), StorageKind::HOISTED | StorageKind::BOXED)],
        );
        let fv = Variable::new("f", frame.record_type());

        let plain = frame.access(Node::variable(&fv), &x).unwrap();
        assert!(matches!(plain.kind(), NodeKind::Field { slot: 0, .. }));
        assert_eq!(plain.ty(), &Type::Int);

        let boxed = frame.access(Node::variable(&fv), &y).unwrap();
        assert!(matches!(boxed.kind(), NodeKind::BoxValue(_)));
        assert_eq!(boxed.ty(), &Type::Int);
    }

    #[test]
    fn test_boxed_assign_allocates_a_cell() {
        let y = Variable::new("y", Type::Int);
        let frame = FrameDescriptor::build("frame", None, &[(y.clone(), StorageKind::BOXED | StorageKind::HOISTED)]);
        let fv = Variable::new("f", frame.record_type());

        let init = frame
            .assign(Node::variable(&fv), &y, Node::constant(Literal::Int(3)))
            .unwrap();
        let NodeKind::Assign { target, value } = init.kind() else {
            panic!("expected assign");
        };
        assert!(matches!(target.kind(), NodeKind::Field { slot: 0, .. }));
        assert!(matches!(value.kind(), NodeKind::NewBox(_)));
    }

    #[test]
    fn test_missing_variable() {
        let frame = FrameDescriptor::build("frame", None, &[]);
        let fv = Variable::new("f", frame.record_type());
        let err = frame
            .access(Node::variable(&fv), &Variable::new("z", Type::Int))
            .unwrap_err();
        assert!(matches!(err, CompileError::VariableNotInFrame { ref frame, .. } if frame == "frame"));
        assert!(frame.parent_link(Node::variable(&fv)).is_none());
    }
}
