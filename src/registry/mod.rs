//! Class identity resolution for instance tagging.
//!
//! The codec itself knows nothing about the host framework's classes. It asks
//! a [`ClassRegistry`] two questions: "what is this value?" at encode time and
//! "how do I build one of these?" at decode time. The host supplies the
//! registry; [`InMemoryRegistry`] covers hosts that can enumerate their
//! constructible definitions up front, and [`CachingRegistry`] memoizes
//! identification for hosts whose lookup is expensive.
//!
//! Reinstantiation is deliberately two-step: `resolve` yields a definition,
//! and `instantiate` on that definition yields a fresh instance the decoder
//! copies props onto. A registry must answer both questions symmetrically
//! across the encoding and decoding process.

pub mod caching;
pub mod memory;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::value::LiveValue;

pub use caching::{CachingRegistry, RegistryCacheConfig, RegistryCacheStats};
pub use memory::{FnDefinition, InMemoryRegistry};

/// Stable string identifying a class definition, resolvable symmetrically by
/// the registry at encode and decode time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName(String);

impl QualifiedName {
    /// Create a qualified name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final component of the name, for qualified path segments and display.
    ///
    /// Splits on the separators qualified names are commonly built from
    /// (`.`, `::`, `/`, `\`), e.g. `build.graph.Module` yields `Module`.
    pub fn short(&self) -> &str {
        self.0
            .rsplit(['.', ':', '/', '\\'])
            .next()
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for QualifiedName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A constructible class definition.
pub trait ClassDefinition {
    /// The registry-stable name of this definition.
    fn qualified_name(&self) -> &QualifiedName;

    /// Build a fresh, default-initialized instance.
    ///
    /// The decoder copies decoded props onto the returned value member by
    /// member, so the instance must be a field-bearing object.
    fn instantiate(&self) -> LiveValue;
}

/// Resolves live values to stable names and names back to definitions.
///
/// Both operations must be pure from the codec's perspective; population and
/// caching strategy are the implementor's concern.
pub trait ClassRegistry {
    /// Stable name for `value` if it is an instance of a known, constructible
    /// definition. Plain mappings, sequences, and primitives yield `None`.
    fn identify(&self, value: &LiveValue) -> Option<QualifiedName>;

    /// Definition for a previously issued name. `None` when the name is
    /// unknown, e.g. registry population differs between the encoding and
    /// decoding process.
    fn resolve(&self, name: &QualifiedName) -> Option<Arc<dyn ClassDefinition>>;
}

impl<R: ClassRegistry + ?Sized> ClassRegistry for &R {
    fn identify(&self, value: &LiveValue) -> Option<QualifiedName> {
        (**self).identify(value)
    }

    fn resolve(&self, name: &QualifiedName) -> Option<Arc<dyn ClassDefinition>> {
        (**self).resolve(name)
    }
}
