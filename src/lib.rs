//! # cachegraph
//!
//! Persists a build tool's in-memory object graph to durable storage between
//! runs, and restores it faithfully on the next run so cached computation can
//! be reused.
//!
//! The hard part is not file I/O. It is safely serializing and reconstructing
//! an arbitrary, possibly cyclic, heterogeneous object graph that mixes plain
//! structure with instances of recognized classes, while never looping on
//! cycles, preserving object identity for shared sub-objects, tagging
//! instances with enough information to rebuild their type, and reporting
//! (not crashing) when part of the graph cannot be represented.
//!
//! ## Architecture
//!
//! ```text
//! live graph -> Encoder -> tagged graph -> Compactor -> acyclic tree
//!                                                           |
//!                                                       [storage]
//!                                                           |
//! live graph <- Decoder <- tagged graph <- Expander <-------+
//! ```
//!
//! The [`encode()`]/[`decode()`] pair handles class tagging and failure
//! accumulation, [`compact()`]/[`expand()`] converts sharing and cycles to and
//! from `$ref` path markers so the persisted form is a strict tree, and
//! [`CachePersistence`] sequences load, merge, and save across a run
//! boundary. Class identification is injected through the [`ClassRegistry`]
//! trait, keeping the codec free of any host-framework dependency.
//!
//! ## Guarantees
//!
//! - Encoding terminates on any graph, cyclic or not, and never mutates it.
//! - `expand(compact(t))` equals `t` up to identity: structurally for
//!   unshared nodes, by cell identity for shared and cyclic ones.
//! - Load-side failures never propagate to the host; they degrade to a cold
//!   start. Only the save write is gated, and an aborted save deletes the
//!   stale blob rather than persisting a known-incomplete snapshot.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cycle;
pub mod decode;
pub mod encode;
pub mod ignore;
pub mod orchestrator;
pub mod persist;
pub mod registry;
pub mod storage;
pub mod types;

// Re-exports
pub use types::{
    qualified_segment, FailureReason, FailureRecord, LiveNode, LiveValue, PathKey, Scalar,
    TaggedNode, TaggedValue, TreePath, TreePathParseError, TypeTag,
};
pub use registry::{
    CachingRegistry, ClassDefinition, ClassRegistry, FnDefinition, InMemoryRegistry,
    QualifiedName, RegistryCacheConfig, RegistryCacheStats,
};
pub use encode::{encode, Encoded};
pub use cycle::{compact, expand, ExpandError};
pub use decode::{decode, DecodeError};
pub use persist::{PersistError, PersistedNode, MARKER_CLASS, MARKER_PROPS, MARKER_REF};
pub use storage::{CacheStorage, FsStorage, FsStorageError, InMemoryStorage, InMemoryStorageError};
pub use orchestrator::{
    CachePersistence, IgnorePattern, OrchestratorError, PersistConfig, RunState, RunStats,
    SaveOutcome, WarnMode,
};
