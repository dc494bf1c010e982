//! Tagged intermediate representation produced by the encoder.
//!
//! A tagged graph is the live graph with class identification already
//! resolved: recognized instances carry their qualified name, everything else
//! is plain structure. Sharing and true cycles survive encoding because
//! `TaggedValue` is an identity-bearing cell like [`LiveValue`], which is what
//! lets the cycle compactor observe repeated identity downstream.
//!
//! [`LiveValue`]: crate::types::value::LiveValue

use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::registry::QualifiedName;
use crate::types::value::Scalar;

/// One node of the tagged graph.
#[derive(Debug)]
pub enum TaggedNode {
    /// Primitive leaf.
    Scalar(Scalar),
    /// Ordered sequence.
    Seq(Vec<TaggedValue>),
    /// Plain keyed mapping.
    Map(BTreeMap<String, TaggedValue>),
    /// Recognized class instance. The qualified name must be resolvable by
    /// the Class Registry at decode time or decoding the graph fails.
    Instance {
        /// Registry-stable name of the class.
        class: QualifiedName,
        /// Encoded own members.
        props: BTreeMap<String, TaggedValue>,
    },
}

/// Shared handle to a node of the tagged graph.
#[derive(Debug, Clone)]
pub struct TaggedValue(Rc<RefCell<TaggedNode>>);

impl TaggedValue {
    /// Wrap a node in a fresh cell.
    pub fn new(node: TaggedNode) -> Self {
        Self(Rc::new(RefCell::new(node)))
    }

    /// Scalar leaf.
    pub fn scalar(value: Scalar) -> Self {
        Self::new(TaggedNode::Scalar(value))
    }

    /// Empty sequence, filled in after the cell is registered.
    pub fn empty_seq() -> Self {
        Self::new(TaggedNode::Seq(Vec::new()))
    }

    /// Empty mapping, filled in after the cell is registered.
    pub fn empty_map() -> Self {
        Self::new(TaggedNode::Map(BTreeMap::new()))
    }

    /// Instance with no props yet, filled in after the cell is registered.
    pub fn empty_instance(class: QualifiedName) -> Self {
        Self::new(TaggedNode::Instance {
            class,
            props: BTreeMap::new(),
        })
    }

    /// Borrow the node immutably.
    pub fn borrow(&self) -> Ref<'_, TaggedNode> {
        self.0.borrow()
    }

    /// Borrow the node mutably.
    pub fn borrow_mut(&self) -> RefMut<'_, TaggedNode> {
        self.0.borrow_mut()
    }

    /// Whether two handles alias the same cell.
    pub fn same_identity(&self, other: &TaggedValue) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Stable address of the cell for the lifetime of the handle.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Install keyed members into a `Map` or `Instance` cell.
    pub(crate) fn install_entries(&self, entries: BTreeMap<String, TaggedValue>) {
        match &mut *self.borrow_mut() {
            TaggedNode::Map(map) => *map = entries,
            TaggedNode::Instance { props, .. } => *props = entries,
            _ => {}
        }
    }

    /// Install sequence items into a `Seq` cell.
    pub(crate) fn install_items(&self, items: Vec<TaggedValue>) {
        if let TaggedNode::Seq(seq) = &mut *self.borrow_mut() {
            *seq = items;
        }
    }
}
