//! Handler registry: exact-id tables and prefix patterns.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use super::error::{DispatcherError, HandlerSlot};
use super::handler::{HandlerKind, OperationHandler};

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

struct RegisteredHandler {
    kind: HandlerKind,
    handler: Arc<dyn OperationHandler>,
}

#[derive(Clone)]
struct PatternEntry {
    prefix: String,
    /// Lowercased `prefix`; matching is case-insensitive.
    folded: String,
    /// Length of `prefix` in characters, the match priority.
    len: usize,
    handler: Arc<dyn OperationHandler>,
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

/// Resolves operation ids to handlers.
///
/// Request, message and pattern registrations share one namespace: an id or
/// prefix string may be registered only once across all three. Exact ids are
/// matched verbatim; patterns match case-insensitively by prefix, longest
/// prefix first, ties broken by registration order.
pub struct HandlerRegistry {
    exact: HashMap<String, RegisteredHandler>,
    patterns: Vec<PatternEntry>,
    /// Patterns in descending prefix length. Empty until the first lookup
    /// after a registration.
    sorted: OnceLock<Vec<PatternEntry>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            exact: HashMap::new(),
            patterns: Vec::new(),
            sorted: OnceLock::new(),
        }
    }

    /// Registers an exact-id handler.
    ///
    /// # Errors
    ///
    /// [`DispatcherError::DuplicateHandler`] if `id` is already taken; the
    /// existing registration is kept.
    pub fn register_exact(
        &mut self,
        id: String,
        kind: HandlerKind,
        handler: Arc<dyn OperationHandler>,
    ) -> Result<(), DispatcherError> {
        self.ensure_free(&id)?;
        self.exact.insert(id, RegisteredHandler { kind, handler });
        Ok(())
    }

    /// Registers a prefix-pattern handler.
    ///
    /// # Errors
    ///
    /// [`DispatcherError::DuplicateHandler`] if `prefix` is already taken; the
    /// existing registration is kept.
    pub fn register_pattern(&mut self, prefix: String, handler: Arc<dyn OperationHandler>) -> Result<(), DispatcherError> {
        self.ensure_free(&prefix)?;
        self.patterns.push(PatternEntry {
            folded: prefix.to_lowercase(),
            len: prefix.chars().count(),
            prefix,
            handler,
        });
        self.sorted.take();
        Ok(())
    }

    /// Exact-id handler registered for `kind`.
    #[must_use]
    pub fn resolve_exact(&self, id: &str, kind: HandlerKind) -> Option<Arc<dyn OperationHandler>> {
        self.exact
            .get(id)
            .filter(|entry| entry.kind == kind)
            .map(|entry| Arc::clone(&entry.handler))
    }

    /// Handler of the longest pattern that prefixes `id`, ignoring case.
    #[must_use]
    pub fn resolve_pattern(&self, id: &str) -> Option<Arc<dyn OperationHandler>> {
        if self.patterns.is_empty() {
            return None;
        }
        let folded = id.to_lowercase();
        self.sorted_patterns()
            .iter()
            .find(|entry| folded.starts_with(&entry.folded))
            .map(|entry| Arc::clone(&entry.handler))
    }

    /// Registered pattern prefixes in match-priority order.
    #[must_use]
    pub fn pattern_prefixes(&self) -> Vec<String> {
        self.sorted_patterns().iter().map(|entry| entry.prefix.clone()).collect()
    }

    fn ensure_free(&self, id: &str) -> Result<(), DispatcherError> {
        let existing = if let Some(entry) = self.exact.get(id) {
            Some(match entry.kind {
                HandlerKind::Request => HandlerSlot::Request,
                HandlerKind::Message => HandlerSlot::Message,
            })
        } else if self.patterns.iter().any(|entry| entry.prefix == id) {
            Some(HandlerSlot::Pattern)
        } else {
            None
        };
        match existing {
            Some(existing) => Err(DispatcherError::DuplicateHandler {
                id: id.to_string(),
                existing,
            }),
            None => Ok(()),
        }
    }

    fn sorted_patterns(&self) -> &[PatternEntry] {
        self.sorted.get_or_init(|| {
            let mut entries = self.patterns.clone();
            // Stable sort keeps registration order among equal lengths.
            entries.sort_by(|a, b| b.len.cmp(&a.len));
            entries
        })
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use opwire_core::{Document, TransportContext, TransportResult};
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::dispatch::handler::HandlerResult;

    /// Returns its tag so tests can tell which handler was resolved.
    struct Tagged(&'static str);

    #[async_trait]
    impl OperationHandler for Tagged {
        async fn handle(&self, _payload: Document, _ctx: TransportContext) -> HandlerResult {
            Ok(TransportResult::ok(json!(self.0)))
        }
    }

    fn tagged(tag: &'static str) -> Arc<dyn OperationHandler> {
        Arc::new(Tagged(tag))
    }

    fn same(found: Option<Arc<dyn OperationHandler>>, expected: &Arc<dyn OperationHandler>) -> bool {
        found.is_some_and(|found| Arc::ptr_eq(&found, expected))
    }

    #[test]
    fn exact_lookup_respects_kind() {
        let mut registry = HandlerRegistry::new();
        let handler = tagged("get");
        registry
            .register_exact("svc.get".into(), HandlerKind::Request, handler.clone())
            .unwrap();

        assert!(same(registry.resolve_exact("svc.get", HandlerKind::Request), &handler));
        assert!(registry.resolve_exact("svc.get", HandlerKind::Message).is_none());
        assert!(registry.resolve_exact("SVC.GET", HandlerKind::Request).is_none());
    }

    #[test]
    fn longest_prefix_wins() {
        let mut registry = HandlerRegistry::new();
        let short = tagged("short");
        let long = tagged("long");
        registry.register_pattern("svc.".into(), short.clone()).unwrap();
        registry.register_pattern("svc.items.".into(), long.clone()).unwrap();

        assert!(same(registry.resolve_pattern("svc.items.get"), &long));
        assert!(same(registry.resolve_pattern("svc.users.get"), &short));
        assert!(registry.resolve_pattern("other.get").is_none());
    }

    #[test]
    fn patterns_match_case_insensitively() {
        let mut registry = HandlerRegistry::new();
        let handler = tagged("p");
        registry.register_pattern("Svc.Items.".into(), handler.clone()).unwrap();
        assert!(same(registry.resolve_pattern("svc.ITEMS.get"), &handler));
    }

    #[test]
    fn registration_after_lookup_resorts_patterns() {
        let mut registry = HandlerRegistry::new();
        registry.register_pattern("svc.".into(), tagged("short")).unwrap();
        assert_eq!(registry.pattern_prefixes(), vec!["svc."]);

        let long = tagged("long");
        registry.register_pattern("svc.items.".into(), long.clone()).unwrap();
        assert!(same(registry.resolve_pattern("svc.items.1"), &long));
        assert_eq!(registry.pattern_prefixes(), vec!["svc.items.", "svc."]);
    }

    #[test]
    fn equal_lengths_keep_registration_order() {
        let mut registry = HandlerRegistry::new();
        let first = tagged("first");
        registry.register_pattern("svc.".into(), first.clone()).unwrap();
        registry.register_pattern("SVC.".into(), tagged("second")).unwrap();

        assert!(same(registry.resolve_pattern("svc.x"), &first));
    }

    #[test]
    fn priority_counts_characters_of_the_registered_prefix() {
        // "İx" folds to "i\u{307}x", the same text as the second prefix, but
        // is one character shorter as registered.
        let mut registry = HandlerRegistry::new();
        registry.register_pattern("İx".into(), tagged("dotted-capital")).unwrap();
        let combining = tagged("combining");
        registry.register_pattern("i\u{307}x".into(), combining.clone()).unwrap();

        assert!(same(registry.resolve_pattern("i\u{307}xyz"), &combining));
        assert_eq!(registry.pattern_prefixes(), vec!["i\u{307}x", "İx"]);
    }

    #[test]
    fn duplicates_are_rejected_across_all_tables() {
        let mut registry = HandlerRegistry::new();
        let original = tagged("original");
        registry
            .register_exact("svc.get".into(), HandlerKind::Request, original.clone())
            .unwrap();

        let err = registry
            .register_exact("svc.get".into(), HandlerKind::Message, tagged("dup"))
            .unwrap_err();
        assert!(matches!(
            err,
            DispatcherError::DuplicateHandler { existing: HandlerSlot::Request, .. }
        ));
        assert!(registry.register_pattern("svc.get".into(), tagged("dup")).is_err());
        assert!(same(registry.resolve_exact("svc.get", HandlerKind::Request), &original));

        registry.register_pattern("svc.".into(), tagged("p")).unwrap();
        let err = registry
            .register_exact("svc.".into(), HandlerKind::Request, tagged("dup"))
            .unwrap_err();
        assert!(matches!(
            err,
            DispatcherError::DuplicateHandler { existing: HandlerSlot::Pattern, .. }
        ));
    }

    proptest! {
        #[test]
        fn resolved_pattern_is_the_longest_matching_prefix(
            prefixes in proptest::collection::btree_set("[a-c]{1,4}\\.", 1..8),
            id in "[a-c]{1,6}\\.[a-c]{0,4}",
        ) {
            let mut registry = HandlerRegistry::new();
            let mut handlers = Vec::new();
            for prefix in &prefixes {
                let handler = tagged("p");
                registry.register_pattern(prefix.clone(), handler.clone()).unwrap();
                handlers.push((prefix.clone(), handler));
            }

            let expected = handlers
                .iter()
                .filter(|(prefix, _)| id.starts_with(prefix.as_str()))
                .max_by_key(|(prefix, _)| prefix.len());

            match (registry.resolve_pattern(&id), expected) {
                (None, None) => {}
                (Some(found), Some((_, handler))) => prop_assert!(Arc::ptr_eq(&found, handler)),
                (found, expected) => prop_assert!(
                    false,
                    "resolved {:?}, expected {:?}",
                    found.is_some(),
                    expected.map(|(prefix, _)| prefix)
                ),
            }
        }
    }
}
