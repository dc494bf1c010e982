//! Structural encoder: live graph to tagged graph.
//!
//! Depth-first walk over a [`LiveValue`] graph. Each node is classified once
//! (its [`LiveNode`] variant plus one registry lookup) and encoded
//! accordingly: scalars copy through, containers recurse, objects the
//! registry recognizes become [`TaggedNode::Instance`], unrecognized objects
//! record an `unknown-custom-class` failure and keep their structural content
//! as a plain mapping, and opaque members record a `read-only-prop` failure.
//!
//! The visited map is shared across the whole call and never shrunk as the
//! walk returns from a branch: re-encountering an identity reuses the tagged
//! cell produced at first encounter. That terminates true cycles and keeps
//! every occurrence of a shared sub-object in the output, leaving the cycle
//! compactor to turn repetition into path references.
//!
//! Failures accumulate; they never abort the traversal and never surface as
//! `Err`. One bad branch must not prevent serializing the rest of the graph.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace};

use crate::registry::ClassRegistry;
use crate::types::failure::{qualified_segment, FailureReason, FailureRecord};
use crate::types::tagged::TaggedValue;
use crate::types::value::{LiveNode, LiveValue, Scalar};

/// Result of one encode pass.
#[derive(Debug)]
pub struct Encoded {
    /// Root of the tagged graph.
    pub root: TaggedValue,
    /// Accumulated non-fatal failures, in traversal order.
    pub failures: Vec<FailureRecord>,
}

/// Per-call traversal state.
struct EncodeState {
    /// Live cell address to the tagged cell produced at first encounter.
    visited: HashMap<usize, TaggedValue>,
    failures: Vec<FailureRecord>,
}

impl EncodeState {
    fn fail(&mut self, reason: FailureReason, path: &[String]) {
        let record = FailureRecord::new(reason, path.to_vec());
        trace!(failure = %record.chain(), "encode failure");
        self.failures.push(record);
    }
}

/// Encode a live graph into a tagged graph, accumulating failures.
///
/// The input graph is only read, never mutated. An opaque encode root yields
/// a null scalar plus a failure record.
pub fn encode(root: &LiveValue, registry: &dyn ClassRegistry) -> Encoded {
    let mut state = EncodeState {
        visited: HashMap::new(),
        failures: Vec::new(),
    };
    let mut path = Vec::new();

    let encoded = encode_value(root, &mut path, registry, &mut state)
        .unwrap_or_else(|| TaggedValue::scalar(Scalar::Null));

    debug!(
        nodes = state.visited.len(),
        failures = state.failures.len(),
        "encoded live graph"
    );
    Encoded {
        root: encoded,
        failures: state.failures,
    }
}

/// Encode one value. `None` means the value is uncapturable and the caller
/// should drop the member (mappings) or install a null placeholder
/// (sequences, whose later indices must stay addressable by path references).
fn encode_value(
    value: &LiveValue,
    path: &mut Vec<String>,
    registry: &dyn ClassRegistry,
    state: &mut EncodeState,
) -> Option<TaggedValue> {
    if let Some(seen) = state.visited.get(&value.identity()) {
        return Some(seen.clone());
    }

    let node = value.borrow();
    match &*node {
        LiveNode::Scalar(scalar) => Some(TaggedValue::scalar(scalar.clone())),

        LiveNode::Opaque { .. } => {
            state.fail(FailureReason::ReadOnlyMember, path);
            None
        }

        LiveNode::Seq(items) => {
            // Register before descending so a cycle through this node
            // resolves to the cell being filled.
            let cell = TaggedValue::empty_seq();
            state.visited.insert(value.identity(), cell.clone());

            let mut encoded = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                path.push(qualified_segment(&index.to_string(), &item.type_name()));
                let child = encode_value(item, path, registry, state)
                    .unwrap_or_else(|| TaggedValue::scalar(Scalar::Null));
                path.pop();
                encoded.push(child);
            }
            cell.install_items(encoded);
            Some(cell)
        }

        LiveNode::Map(entries) => {
            let cell = TaggedValue::empty_map();
            state.visited.insert(value.identity(), cell.clone());
            let encoded = encode_entries(entries.iter(), path, registry, state);
            cell.install_entries(encoded);
            Some(cell)
        }

        LiveNode::Object { fields, .. } => {
            // Identification decides the cell's shape before descent, so
            // cycles through this node land on the right variant.
            let identified = registry.identify(value);
            let cell = match &identified {
                Some(name) => TaggedValue::empty_instance(name.clone()),
                None => TaggedValue::empty_map(),
            };
            state.visited.insert(value.identity(), cell.clone());

            if identified.is_none() {
                // Unrecognized custom class: report it, but keep the
                // structural content so the rest of the branch survives.
                state.fail(FailureReason::UnknownCustomClass, path);
            }

            let encoded = encode_entries(fields.iter(), path, registry, state);
            cell.install_entries(encoded);
            Some(cell)
        }
    }
}

fn encode_entries<'a>(
    entries: impl Iterator<Item = (&'a String, &'a LiveValue)>,
    path: &mut Vec<String>,
    registry: &dyn ClassRegistry,
    state: &mut EncodeState,
) -> BTreeMap<String, TaggedValue> {
    let mut encoded = BTreeMap::new();
    for (key, member) in entries {
        path.push(qualified_segment(key, &member.type_name()));
        if let Some(child) = encode_value(member, path, registry, state) {
            encoded.insert(key.clone(), child);
        }
        path.pop();
    }
    encoded
}
