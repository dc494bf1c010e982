//! Cycle compaction and expansion.
//!
//! The persisted format is a strict tree: no node may have two parents. The
//! compactor walks a tagged graph depth-first and replaces every repeated
//! identity with a [`PersistedNode::Ref`] pointing at the first-emitted
//! location; the expander inverts that, installing the same cell (not a copy)
//! at every reference site. A node's path is registered before its members
//! are walked, so a true cycle resolves to an ancestor that is still being
//! filled.
//!
//! Invariant: `expand(compact(t))` equals `t` up to identity, structurally
//! for unshared nodes and by cell identity for shared and cyclic ones.

use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use crate::persist::PersistedNode;
use crate::types::path::{PathKey, TreePath};
use crate::types::tagged::{TaggedNode, TaggedValue};

/// Error expanding a persisted tree back into a tagged graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpandError {
    /// A path reference whose target was not materialized earlier in the
    /// pre-order walk: forward, dangling, or malformed.
    #[error("path reference {path} does not resolve to an earlier node")]
    DanglingRef {
        /// The unresolvable target path.
        path: TreePath,
    },
}

/// Flatten a tagged graph into a strictly acyclic persisted tree.
pub fn compact(root: &TaggedValue) -> PersistedNode {
    let mut emitted: HashMap<usize, TreePath> = HashMap::new();
    compact_value(root, &TreePath::root(), &mut emitted)
}

fn compact_value(
    value: &TaggedValue,
    path: &TreePath,
    emitted: &mut HashMap<usize, TreePath>,
) -> PersistedNode {
    if let Some(first) = emitted.get(&value.identity()) {
        trace!(at = %path, target = %first, "emitting path reference");
        return PersistedNode::Ref(first.clone());
    }

    let node = value.borrow();
    match &*node {
        // Scalars carry no identity and never deduplicate.
        TaggedNode::Scalar(scalar) => PersistedNode::Scalar(scalar.clone()),

        TaggedNode::Seq(items) => {
            emitted.insert(value.identity(), path.clone());
            PersistedNode::Seq(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        compact_value(item, &path.child(PathKey::Index(index)), emitted)
                    })
                    .collect(),
            )
        }

        TaggedNode::Map(entries) => {
            emitted.insert(value.identity(), path.clone());
            PersistedNode::Map(
                entries
                    .iter()
                    .map(|(key, member)| {
                        let child =
                            compact_value(member, &path.child(PathKey::Key(key.clone())), emitted);
                        (key.clone(), child)
                    })
                    .collect(),
            )
        }

        TaggedNode::Instance { class, props } => {
            emitted.insert(value.identity(), path.clone());
            PersistedNode::Instance {
                class: class.clone(),
                props: props
                    .iter()
                    .map(|(key, member)| {
                        let child =
                            compact_value(member, &path.child(PathKey::Key(key.clone())), emitted);
                        (key.clone(), child)
                    })
                    .collect(),
            }
        }
    }
}

/// Rebuild a tagged graph from a persisted tree, restoring shared identity
/// and cycles at reference sites.
pub fn expand(tree: &PersistedNode) -> Result<TaggedValue, ExpandError> {
    let mut materialized: HashMap<TreePath, TaggedValue> = HashMap::new();
    expand_value(tree, &TreePath::root(), &mut materialized)
}

fn expand_value(
    node: &PersistedNode,
    path: &TreePath,
    materialized: &mut HashMap<TreePath, TaggedValue>,
) -> Result<TaggedValue, ExpandError> {
    match node {
        PersistedNode::Scalar(scalar) => Ok(TaggedValue::scalar(scalar.clone())),

        PersistedNode::Ref(target) => materialized
            .get(target)
            .cloned()
            .ok_or_else(|| ExpandError::DanglingRef {
                path: target.clone(),
            }),

        PersistedNode::Seq(items) => {
            let cell = TaggedValue::empty_seq();
            materialized.insert(path.clone(), cell.clone());

            let mut expanded = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                expanded.push(expand_value(
                    item,
                    &path.child(PathKey::Index(index)),
                    materialized,
                )?);
            }
            cell.install_items(expanded);
            Ok(cell)
        }

        PersistedNode::Map(entries) => {
            let cell = TaggedValue::empty_map();
            materialized.insert(path.clone(), cell.clone());
            let expanded = expand_entries(entries, path, materialized)?;
            cell.install_entries(expanded);
            Ok(cell)
        }

        PersistedNode::Instance { class, props } => {
            let cell = TaggedValue::empty_instance(class.clone());
            materialized.insert(path.clone(), cell.clone());
            let expanded = expand_entries(props, path, materialized)?;
            cell.install_entries(expanded);
            Ok(cell)
        }
    }
}

fn expand_entries(
    entries: &BTreeMap<String, PersistedNode>,
    path: &TreePath,
    materialized: &mut HashMap<TreePath, TaggedValue>,
) -> Result<BTreeMap<String, TaggedValue>, ExpandError> {
    let mut expanded = BTreeMap::new();
    for (key, member) in entries {
        let child = expand_value(member, &path.child(PathKey::Key(key.clone())), materialized)?;
        expanded.insert(key.clone(), child);
    }
    Ok(expanded)
}
