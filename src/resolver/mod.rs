//! Pluggable document resolvers.
//!
//! A resolver turns a file into indexable text lines plus metadata. Resolvers
//! are registered explicitly at startup (see
//! [`ResolverChain::register`]) and tried in descending priority order.

mod chain;
mod text;

pub use chain::{ChainOutcome, DefaultResolver, ResolverChain};
pub use text::TextResolver;

use crate::types::{Document, Metadata};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by individual resolvers.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Failed to read {}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Resolver '{resolver}' failed on {}: {reason}", .path.display())]
    Failed {
        resolver: String,
        path: PathBuf,
        reason: String,
    },
}

/// Content produced by a successful resolve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub data: Vec<String>,
    pub metadata: Metadata,
}

impl Resolution {
    pub fn new(data: Vec<String>) -> Self {
        Self {
            data,
            metadata: Metadata::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>, values: Vec<String>) -> Self {
        self.metadata.insert(field.into(), values);
        self
    }
}

/// Strategy that turns a document into indexable content.
///
/// Implementations hold no per-document state; metadata travels back in the
/// returned [`Resolution`].
pub trait Resolver: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Higher priorities are tried first.
    fn priority(&self) -> f64;

    fn can_resolve(&self, doc: &Document) -> bool;

    fn resolve(&self, doc: &Document) -> Result<Resolution, ResolveError>;
}
