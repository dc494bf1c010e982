//! Structural decoder: tagged graph to live graph.
//!
//! Inverse of the encoder. Instances go through the registry in two distinct
//! steps: resolve the qualified name to a definition, then instantiate that
//! definition and copy the decoded props onto the fresh instance under their
//! original member keys. A name the registry cannot resolve fails the whole
//! decode; a partially-typed cache is worse than no cache.
//!
//! The input graph may be shared or cyclic (the expander restores identity
//! before decoding runs), so the decoder keeps its own identity map and
//! registers each live cell before descending into members.

use std::collections::HashMap;

use tracing::debug;

use crate::registry::{ClassRegistry, QualifiedName};
use crate::types::tagged::{TaggedNode, TaggedValue};
use crate::types::value::{LiveNode, LiveValue};

/// Error decoding a tagged graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// A tagged instance whose class the registry cannot resolve.
    #[error("unknown class in persisted cache: {0}")]
    UnknownClass(QualifiedName),
}

/// Decode a tagged graph into a live graph.
pub fn decode(root: &TaggedValue, registry: &dyn ClassRegistry) -> Result<LiveValue, DecodeError> {
    let mut materialized: HashMap<usize, LiveValue> = HashMap::new();
    let live = decode_value(root, registry, &mut materialized)?;
    debug!(nodes = materialized.len(), "decoded cache graph");
    Ok(live)
}

fn decode_value(
    value: &TaggedValue,
    registry: &dyn ClassRegistry,
    materialized: &mut HashMap<usize, LiveValue>,
) -> Result<LiveValue, DecodeError> {
    if let Some(done) = materialized.get(&value.identity()) {
        return Ok(done.clone());
    }

    let node = value.borrow();
    match &*node {
        TaggedNode::Scalar(scalar) => Ok(LiveValue::new(LiveNode::Scalar(scalar.clone()))),

        TaggedNode::Seq(items) => {
            let live = LiveValue::seq(Vec::with_capacity(items.len()));
            materialized.insert(value.identity(), live.clone());

            let mut decoded = Vec::with_capacity(items.len());
            for item in items {
                decoded.push(decode_value(item, registry, materialized)?);
            }
            if let LiveNode::Seq(slot) = &mut *live.borrow_mut() {
                *slot = decoded;
            }
            Ok(live)
        }

        TaggedNode::Map(entries) => {
            let live = LiveValue::empty_map();
            materialized.insert(value.identity(), live.clone());
            for (key, member) in entries {
                let decoded = decode_value(member, registry, materialized)?;
                // rebuilt under the original member key, not anything derived
                // from the decoded value
                live.insert(key.clone(), decoded);
            }
            Ok(live)
        }

        TaggedNode::Instance { class, props } => {
            let definition = registry
                .resolve(class)
                .ok_or_else(|| DecodeError::UnknownClass(class.clone()))?;
            let instance = definition.instantiate();
            materialized.insert(value.identity(), instance.clone());
            for (key, member) in props {
                let decoded = decode_value(member, registry, materialized)?;
                instance.insert(key.clone(), decoded);
            }
            Ok(instance)
        }
    }
}
