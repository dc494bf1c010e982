//! In-memory class registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::types::value::{LiveNode, LiveValue, TypeTag};

use super::{ClassDefinition, ClassRegistry, QualifiedName};

/// A class definition backed by a constructor closure.
///
/// The closure produces the default fields of a fresh instance; the decoder
/// then copies decoded props over them.
pub struct FnDefinition {
    name: QualifiedName,
    tag: TypeTag,
    construct: Box<dyn Fn() -> BTreeMap<String, LiveValue> + Send + Sync>,
}

impl FnDefinition {
    /// Create a definition from a name, the constructor tag its instances
    /// carry, and a default-field constructor.
    pub fn new(
        name: impl Into<QualifiedName>,
        tag: impl Into<TypeTag>,
        construct: impl Fn() -> BTreeMap<String, LiveValue> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
            construct: Box::new(construct),
        }
    }

    /// Definition whose fresh instances start with no fields.
    pub fn empty(name: impl Into<QualifiedName>, tag: impl Into<TypeTag>) -> Self {
        Self::new(name, tag, BTreeMap::new)
    }

    /// The constructor tag instances of this definition carry.
    pub fn tag(&self) -> &TypeTag {
        &self.tag
    }
}

impl ClassDefinition for FnDefinition {
    fn qualified_name(&self) -> &QualifiedName {
        &self.name
    }

    fn instantiate(&self) -> LiveValue {
        LiveValue::new(LiveNode::Object {
            tag: self.tag.clone(),
            fields: (self.construct)(),
        })
    }
}

impl fmt::Debug for FnDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnDefinition")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .finish()
    }
}

/// Registry over an explicit definition table.
///
/// Identification matches an object's constructor tag against the registered
/// definitions; resolution is a straight name lookup. `BTreeMap` keeps
/// iteration deterministic.
#[derive(Default)]
pub struct InMemoryRegistry {
    by_name: BTreeMap<QualifiedName, Arc<dyn ClassDefinition>>,
    by_tag: BTreeMap<TypeTag, QualifiedName>,
}

impl InMemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition whose instances carry `tag`.
    ///
    /// A later registration for the same tag or name replaces the earlier
    /// one.
    pub fn register(&mut self, tag: impl Into<TypeTag>, definition: Arc<dyn ClassDefinition>) {
        let name = definition.qualified_name().clone();
        self.by_tag.insert(tag.into(), name.clone());
        self.by_name.insert(name, definition);
    }

    /// Register a closure-backed definition; see [`FnDefinition::new`].
    pub fn register_fn(
        &mut self,
        name: &str,
        tag: &str,
        construct: impl Fn() -> BTreeMap<String, LiveValue> + Send + Sync + 'static,
    ) {
        self.register(tag, Arc::new(FnDefinition::new(name, tag, construct)));
    }

    /// Number of registered definitions.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether no definitions are registered.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Registered qualified names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &QualifiedName> {
        self.by_name.keys()
    }
}

impl ClassRegistry for InMemoryRegistry {
    fn identify(&self, value: &LiveValue) -> Option<QualifiedName> {
        match &*value.borrow() {
            LiveNode::Object { tag, .. } => self.by_tag.get(tag).cloned(),
            _ => None,
        }
    }

    fn resolve(&self, name: &QualifiedName) -> Option<Arc<dyn ClassDefinition>> {
        self.by_name.get(name).cloned()
    }
}

impl fmt::Debug for InMemoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryRegistry")
            .field("names", &self.by_name.keys().collect::<Vec<_>>())
            .finish()
    }
}
