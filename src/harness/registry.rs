//! Example Registry
//!
//! Holds every example by identifier in registration order. Examples are immutable once
//! registered; the registry only hands out shared references and clones.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;

use crate::errors::{unspanned, ErrorKind, ErrorReporting, ExemplarError, SourceContext, ValidationContext};

/// Where an example was defined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Origin {
    pub file: PathBuf,
    /// 1-based line of the definition.
    pub line: usize,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// A named snippet and the console output it must produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Example {
    pub id: String,
    pub source: String,
    pub expected: Vec<String>,
    /// `Name` or `Name: message` of the uncaught error the snippet should end with.
    pub expect_error: Option<String>,
    /// Overrides the harness timeout for this example.
    pub timeout: Option<Duration>,
    pub origin: Option<Origin>,
}

impl Example {
    pub fn new(id: impl Into<String>, source: impl Into<String>, expected: Vec<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            expected,
            expect_error: None,
            timeout: None,
            origin: None,
        }
    }

    pub fn with_expect_error(mut self, expect_error: impl Into<String>) -> Self {
        self.expect_error = Some(expect_error.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    /// `id (file:line)` when the origin is known.
    pub fn label(&self) -> String {
        match &self.origin {
            Some(origin) => format!("{} ({})", self.id, origin),
            None => self.id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    examples: IndexMap<String, Example>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn context() -> ValidationContext {
        ValidationContext::new(SourceContext::fallback("example registry"), "registry")
    }

    pub fn register(
        &mut self,
        id: impl Into<String>,
        source: impl Into<String>,
        expected: Vec<String>,
    ) -> Result<(), ExemplarError> {
        self.register_example(Example::new(id, source, expected))
    }

    /// Adds `example`; on failure the registry is left untouched.
    pub fn register_example(&mut self, example: Example) -> Result<(), ExemplarError> {
        if example.id.trim().is_empty() {
            return Err(Self::context().invalid_definition("example identifier is empty", unspanned()));
        }
        if let Some(existing) = self.examples.get(&example.id) {
            return Err(Self::context().report(
                ErrorKind::DuplicateIdentifier {
                    id: example.id.clone(),
                    original: existing.origin.as_ref().map(Origin::to_string),
                },
                unspanned(),
            ));
        }
        self.examples.insert(example.id.clone(), example);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&Example, ExemplarError> {
        self.examples
            .get(id)
            .ok_or_else(|| Self::context().report(ErrorKind::NotFound { id: id.to_string() }, unspanned()))
    }

    /// Examples in registration order. Each call starts over; the iterator is `Clone`.
    pub fn all(&self) -> indexmap::map::Values<'_, String, Example> {
        self.examples.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> + Clone {
        self.examples.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Keeps the examples whose identifier contains `filter`, preserving order.
    pub fn retain_matching(&mut self, filter: &str) {
        self.examples.retain(|id, _| id.contains(filter));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCategory;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn duplicates_are_rejected_and_leave_the_registry_unchanged() {
        let mut registry = Registry::new();
        registry.register("sum", "console.log(1 + 2)", lines(&["3"])).unwrap();
        let error = registry
            .register("sum", "console.log(4)", lines(&["4"]))
            .unwrap_err();
        assert!(matches!(error.kind, ErrorKind::DuplicateIdentifier { ref id, .. } if id == "sum"));
        assert_eq!(error.category(), ErrorCategory::Registry);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("sum").unwrap().source, "console.log(1 + 2)");
    }

    #[test]
    fn empty_identifiers_are_invalid() {
        let mut registry = Registry::new();
        let error = registry.register("  ", "1", Vec::new()).unwrap_err();
        assert!(matches!(error.kind, ErrorKind::InvalidDefinition { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn missing_examples_are_not_found() {
        let registry = Registry::new();
        let error = registry.get("nope").unwrap_err();
        assert!(matches!(error.kind, ErrorKind::NotFound { ref id } if id == "nope"));
    }

    #[test]
    fn iteration_is_ordered_and_restartable() {
        let mut registry = Registry::new();
        for id in ["b", "a", "c"] {
            registry.register(id, "", Vec::new()).unwrap();
        }
        let first: Vec<&str> = registry.all().map(|e| e.id.as_str()).collect();
        let again: Vec<&str> = registry.all().map(|e| e.id.as_str()).collect();
        assert_eq!(first, vec!["b", "a", "c"]);
        assert_eq!(first, again);

        let iter = registry.all();
        let copy = iter.clone();
        assert_eq!(iter.count(), copy.count());
    }

    #[test]
    fn filtering_keeps_order() {
        let mut registry = Registry::new();
        for id in ["closure-counter", "array-map", "closure-loop"] {
            registry.register(id, "", Vec::new()).unwrap();
        }
        registry.retain_matching("closure");
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["closure-counter", "closure-loop"]);
    }

    #[test]
    fn duplicate_message_names_the_first_origin() {
        let mut registry = Registry::new();
        let origin = Origin {
            file: PathBuf::from("docs/a.md"),
            line: 3,
        };
        registry
            .register_example(Example::new("x", "", Vec::new()).with_origin(origin))
            .unwrap();
        let error = registry.register_example(Example::new("x", "", Vec::new())).unwrap_err();
        assert!(error.to_string().contains("docs/a.md:3"));
    }
}
