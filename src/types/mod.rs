//! Core types for the graph codec.

pub mod failure;
pub mod path;
pub mod tagged;
pub mod value;

pub use failure::{qualified_segment, FailureReason, FailureRecord};
pub use path::{PathKey, TreePath, TreePathParseError};
pub use tagged::{TaggedNode, TaggedValue};
pub use value::{LiveNode, LiveValue, Scalar, TypeTag};
