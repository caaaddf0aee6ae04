//! Built-in resolver for plain-text files.

use std::collections::HashSet;
use std::fs;

use super::{Resolution, ResolveError, Resolver};
use crate::config::TextResolverConfig;
use crate::types::Document;

/// Resolves text files by extension into their lines.
#[derive(Debug, Clone)]
pub struct TextResolver {
    extensions: HashSet<String>,
    max_bytes: u64,
    priority: f64,
}

impl TextResolver {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            max_bytes: u64::MAX,
            priority: 1.0,
        }
    }

    pub fn from_config(config: &TextResolverConfig) -> Self {
        Self::new(&config.extensions)
            .with_max_bytes(config.max_bytes)
            .with_priority(config.priority)
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }
}

impl Resolver for TextResolver {
    fn name(&self) -> &str {
        "text"
    }

    fn priority(&self) -> f64 {
        self.priority
    }

    fn can_resolve(&self, doc: &Document) -> bool {
        let Some(ext) = doc.extension() else {
            return false;
        };
        if !self.extensions.contains(&ext) {
            return false;
        }
        // Unreadable metadata is left for resolve() to report.
        fs::metadata(&doc.path)
            .map(|m| m.len() <= self.max_bytes)
            .unwrap_or(true)
    }

    fn resolve(&self, doc: &Document) -> Result<Resolution, ResolveError> {
        let bytes = fs::read(&doc.path).map_err(|source| ResolveError::Read {
            path: doc.path.clone(),
            source,
        })?;
        let text = String::from_utf8_lossy(&bytes);
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        let line_count = lines.len();

        let mut resolution = Resolution::new(lines);
        if let Some(ext) = doc.extension() {
            resolution = resolution.with_field("extension", vec![ext]);
        }
        Ok(resolution.with_field("line_count", vec![line_count.to_string()]))
    }
}
