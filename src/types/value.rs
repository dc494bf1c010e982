//! Live value model for the host's cache graph.
//!
//! The host's cache is an arbitrary heterogeneous graph: primitives, ordered
//! sequences, keyed mappings, and class instances, possibly sharing sub-objects
//! and possibly cyclic. `LiveValue` is a shared handle to one node of that
//! graph; identity is `Rc` pointer identity, which is what the encoder's
//! visited set and the cycle compactor key on.
//!
//! The codec never mutates values it only reads; mutation helpers exist for
//! the host side (building the cache, merging restored defaults).

use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Primitive leaf value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Absent/null value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 text.
    Text(String),
}

impl Scalar {
    /// Short kind name used in qualified path segments.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Bool(_) => "Bool",
            Self::Int(_) => "Int",
            Self::Float(_) => "Float",
            Self::Text(_) => "Text",
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Short constructor name the host reports for a non-plain value.
///
/// The tag is what the Class Registry matches against when identifying
/// instances, and what qualified path segments show for values the registry
/// does not recognize.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeTag(String);

impl TypeTag {
    /// Create a tag from a constructor name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TypeTag {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// One node of the live graph.
///
/// `Map` uses `BTreeMap` so member iteration is deterministic across runs.
#[derive(Debug)]
pub enum LiveNode {
    /// Primitive leaf.
    Scalar(Scalar),
    /// Ordered sequence.
    Seq(Vec<LiveValue>),
    /// Plain keyed mapping.
    Map(BTreeMap<String, LiveValue>),
    /// Non-plain value with a constructor tag. Whether the tag names a known,
    /// constructible definition is the Class Registry's call, not this type's.
    Object {
        /// Constructor tag reported by the host.
        tag: TypeTag,
        /// Own enumerable members.
        fields: BTreeMap<String, LiveValue>,
    },
    /// A member the host could not capture faithfully (accessor-backed,
    /// handle-like). Encoding one records a read-only-prop failure.
    Opaque {
        /// Constructor tag reported by the host.
        tag: TypeTag,
    },
}

/// Shared handle to a node of the live graph.
///
/// Cloning a `LiveValue` clones the handle, not the node: both handles
/// observe the same cell, and [`LiveValue::same_identity`] reports whether two
/// handles alias.
#[derive(Debug, Clone)]
pub struct LiveValue(Rc<RefCell<LiveNode>>);

impl LiveValue {
    /// Wrap a node in a fresh cell.
    pub fn new(node: LiveNode) -> Self {
        Self(Rc::new(RefCell::new(node)))
    }

    /// Null scalar.
    pub fn null() -> Self {
        Self::new(LiveNode::Scalar(Scalar::Null))
    }

    /// Boolean scalar.
    pub fn bool(value: bool) -> Self {
        Self::new(LiveNode::Scalar(Scalar::Bool(value)))
    }

    /// Integer scalar.
    pub fn int(value: i64) -> Self {
        Self::new(LiveNode::Scalar(Scalar::Int(value)))
    }

    /// Float scalar.
    pub fn float(value: f64) -> Self {
        Self::new(LiveNode::Scalar(Scalar::Float(value)))
    }

    /// Text scalar.
    pub fn text(value: impl Into<String>) -> Self {
        Self::new(LiveNode::Scalar(Scalar::Text(value.into())))
    }

    /// Ordered sequence.
    pub fn seq(items: Vec<LiveValue>) -> Self {
        Self::new(LiveNode::Seq(items))
    }

    /// Plain mapping from an entry iterator.
    pub fn map(entries: impl IntoIterator<Item = (String, LiveValue)>) -> Self {
        Self::new(LiveNode::Map(entries.into_iter().collect()))
    }

    /// Empty plain mapping.
    pub fn empty_map() -> Self {
        Self::new(LiveNode::Map(BTreeMap::new()))
    }

    /// Tagged object with the given fields.
    pub fn object(
        tag: impl Into<TypeTag>,
        fields: impl IntoIterator<Item = (String, LiveValue)>,
    ) -> Self {
        Self::new(LiveNode::Object {
            tag: tag.into(),
            fields: fields.into_iter().collect(),
        })
    }

    /// Uncapturable member placeholder.
    pub fn opaque(tag: impl Into<TypeTag>) -> Self {
        Self::new(LiveNode::Opaque { tag: tag.into() })
    }

    /// Borrow the node immutably.
    pub fn borrow(&self) -> Ref<'_, LiveNode> {
        self.0.borrow()
    }

    /// Borrow the node mutably.
    pub fn borrow_mut(&self) -> RefMut<'_, LiveNode> {
        self.0.borrow_mut()
    }

    /// Whether two handles alias the same cell.
    pub fn same_identity(&self, other: &LiveValue) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Stable address of the cell for the lifetime of the handle.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Short type name used in qualified path segments.
    pub fn type_name(&self) -> String {
        match &*self.borrow() {
            LiveNode::Scalar(s) => s.kind_name().to_string(),
            LiveNode::Seq(_) => "Seq".to_string(),
            LiveNode::Map(_) => "Map".to_string(),
            LiveNode::Object { tag, .. } | LiveNode::Opaque { tag } => tag.to_string(),
        }
    }

    /// Look up a member of a `Map` or `Object` by key.
    pub fn get(&self, key: &str) -> Option<LiveValue> {
        match &*self.borrow() {
            LiveNode::Map(entries) => entries.get(key).cloned(),
            LiveNode::Object { fields, .. } => fields.get(key).cloned(),
            _ => None,
        }
    }

    /// Whether a `Map` or `Object` has the given member.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert a member into a `Map` or `Object`. No-op for other shapes.
    pub fn insert(&self, key: impl Into<String>, value: LiveValue) {
        match &mut *self.borrow_mut() {
            LiveNode::Map(entries) => {
                entries.insert(key.into(), value);
            }
            LiveNode::Object { fields, .. } => {
                fields.insert(key.into(), value);
            }
            _ => {}
        }
    }

    /// Number of members of a container, 0 for scalars and opaque values.
    pub fn len(&self) -> usize {
        match &*self.borrow() {
            LiveNode::Seq(items) => items.len(),
            LiveNode::Map(entries) => entries.len(),
            LiveNode::Object { fields, .. } => fields.len(),
            LiveNode::Scalar(_) | LiveNode::Opaque { .. } => 0,
        }
    }

    /// Whether the value has no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Structural equality ignoring identity: same shape, same keys, same
    /// scalar values, same tags per node. Cycle-safe; two nodes already under
    /// comparison on the current chain are taken as equal, which makes
    /// isomorphic cyclic graphs compare equal.
    pub fn structural_eq(&self, other: &LiveValue) -> bool {
        let mut in_progress = HashSet::new();
        structural_eq_inner(self, other, &mut in_progress)
    }
}

fn structural_eq_inner(
    a: &LiveValue,
    b: &LiveValue,
    in_progress: &mut HashSet<(usize, usize)>,
) -> bool {
    if a.same_identity(b) {
        return true;
    }
    if !in_progress.insert((a.identity(), b.identity())) {
        return true;
    }
    let result = match (&*a.borrow(), &*b.borrow()) {
        (LiveNode::Scalar(x), LiveNode::Scalar(y)) => x == y,
        (LiveNode::Seq(x), LiveNode::Seq(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y.iter())
                    .all(|(l, r)| structural_eq_inner(l, r, in_progress))
        }
        (LiveNode::Map(x), LiveNode::Map(y)) => entries_eq(x, y, in_progress),
        (
            LiveNode::Object { tag: t1, fields: f1 },
            LiveNode::Object { tag: t2, fields: f2 },
        ) => t1 == t2 && entries_eq(f1, f2, in_progress),
        (LiveNode::Opaque { tag: t1 }, LiveNode::Opaque { tag: t2 }) => t1 == t2,
        _ => false,
    };
    in_progress.remove(&(a.identity(), b.identity()));
    result
}

fn entries_eq(
    x: &BTreeMap<String, LiveValue>,
    y: &BTreeMap<String, LiveValue>,
    in_progress: &mut HashSet<(usize, usize)>,
) -> bool {
    x.len() == y.len()
        && x.iter().zip(y.iter()).all(|((k1, v1), (k2, v2))| {
            k1 == k2 && structural_eq_inner(v1, v2, in_progress)
        })
}
