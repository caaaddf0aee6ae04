//! Priority-ordered resolver chain with an optional default fallback.

use std::path::Path;
use std::sync::Arc;

use super::{Resolution, ResolveError, Resolver};
use crate::types::Document;

/// How a document was resolved by the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    /// A registered resolver matched and produced content.
    Resolved { resolver: String },
    /// No resolver matched; the default resolver committed path and checksum only.
    Fallback,
    /// No resolver matched and the fallback is disabled.
    Unresolved,
}

/// Identity resolver used as the fallback: no content, no metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultResolver;

impl Resolver for DefaultResolver {
    fn name(&self) -> &str {
        "default"
    }

    fn priority(&self) -> f64 {
        f64::MIN
    }

    fn can_resolve(&self, _doc: &Document) -> bool {
        true
    }

    fn resolve(&self, _doc: &Document) -> Result<Resolution, ResolveError> {
        Ok(Resolution::default())
    }
}

/// Ordered set of resolvers.
///
/// Kept sorted by descending priority at registration time. Resolvers with
/// equal priority stay in registration order.
#[derive(Clone, Default)]
pub struct ResolverChain {
    resolvers: Vec<Arc<dyn Resolver>>,
    fallback: Option<Arc<dyn Resolver>>,
}

impl ResolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the [`DefaultResolver`] fallback.
    pub fn with_default_fallback(mut self, enabled: bool) -> Self {
        self.set_default_fallback(enabled);
        self
    }

    pub fn set_default_fallback(&mut self, enabled: bool) {
        self.fallback = enabled.then(|| Arc::new(DefaultResolver) as Arc<dyn Resolver>);
    }

    pub fn uses_default_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Register a resolver, keeping priority order stable.
    pub fn register(&mut self, resolver: Arc<dyn Resolver>) {
        let priority = resolver.priority();
        let position = self
            .resolvers
            .iter()
            .position(|existing| existing.priority() < priority)
            .unwrap_or(self.resolvers.len());
        tracing::debug!(
            target: "resolver",
            "registered '{}' (priority {priority}) at position {position}",
            resolver.name()
        );
        self.resolvers.insert(position, resolver);
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    /// Resolver names in the order they are tried.
    pub fn names(&self) -> Vec<&str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    /// Whether any registered resolver is interested in `path`.
    pub fn accepts(&self, path: &Path) -> bool {
        let probe = Document::probe(path);
        self.resolvers.iter().any(|r| r.can_resolve(&probe))
    }

    /// Resolve `doc` in place with the first matching resolver.
    ///
    /// A resolver error fails this document only; the chain stays usable.
    pub fn resolve(&self, doc: &mut Document) -> Result<ChainOutcome, ResolveError> {
        for resolver in &self.resolvers {
            if !resolver.can_resolve(doc) {
                continue;
            }
            let resolution = resolver.resolve(doc)?;
            doc.set_resolved(resolution.data, resolution.metadata);
            return Ok(ChainOutcome::Resolved {
                resolver: resolver.name().to_string(),
            });
        }

        match &self.fallback {
            Some(fallback) => {
                let resolution = fallback.resolve(doc)?;
                doc.set_resolved(resolution.data, resolution.metadata);
                Ok(ChainOutcome::Fallback)
            }
            None => {
                tracing::debug!(
                    target: "resolver",
                    "no resolver for {}, left unresolved",
                    doc.path.display()
                );
                Ok(ChainOutcome::Unresolved)
            }
        }
    }
}

impl std::fmt::Debug for ResolverChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverChain")
            .field("resolvers", &self.names())
            .field("fallback", &self.uses_default_fallback())
            .finish()
    }
}
