//! Token scopes.
//!
//! A token's `scope` claim is either a space-delimited string or an array of
//! strings. [`ScopeSet`] normalizes both shapes and answers membership
//! questions by exact token comparison, never by prefix or substring.

use std::collections::BTreeSet;

/// Scope granting execution rights on every container.
pub const ADMIN_SCOPE: &str = "wt:admin";

/// Returns the scope granting execution rights on a single container.
///
/// ```
/// assert_eq!(webtask_core::owner_scope("acme"), "wt:owner:acme");
/// ```
#[must_use]
pub fn owner_scope(container: &str) -> String {
    format!("wt:owner:{container}")
}

/// Normalized set of scope tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    /// Parses a space-delimited scope string.
    ///
    /// Empty tokens produced by repeated spaces are dropped.
    #[must_use]
    pub fn parse(scope: &str) -> Self {
        scope
            .split(' ')
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Normalizes a `scope` claim value.
    ///
    /// Accepts a string or an array of strings. Returns `None` for any other
    /// shape, including arrays holding non-string entries.
    #[must_use]
    pub fn from_claim(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(Self::parse(s)),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<BTreeSet<_>>>()
                .map(Self),
            _ => None,
        }
    }

    /// Returns `true` if the exact token is present.
    #[must_use]
    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    /// Decides whether the holder may execute a webtask.
    ///
    /// Granted by [`ADMIN_SCOPE`], by the owner scope of `container`, or by
    /// `required` when one is configured. With no required scope only the
    /// admin and owner scopes grant access.
    #[must_use]
    pub fn permits(&self, container: Option<&str>, required: Option<&str>) -> bool {
        if self.contains(ADMIN_SCOPE) {
            return true;
        }
        if container.is_some_and(|c| self.contains(&owner_scope(c))) {
            return true;
        }
        required.is_some_and(|r| self.contains(r))
    }

    /// Number of distinct tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no token is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the tokens in lexical order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl FromIterator<String> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_parse_splits_on_spaces() {
        let scopes = ScopeSet::parse("wt:admin  read:logs");
        assert_eq!(scopes.len(), 2);
        assert!(scopes.contains("wt:admin"));
        assert!(scopes.contains("read:logs"));
    }

    #[test]
    fn test_from_claim_shapes() {
        let from_str = ScopeSet::from_claim(&json!("a b")).unwrap();
        let from_array = ScopeSet::from_claim(&json!(["a", "b"])).unwrap();
        assert_eq!(from_str, from_array);

        assert!(ScopeSet::from_claim(&json!(42)).is_none());
        assert!(ScopeSet::from_claim(&json!(["a", 1])).is_none());
        assert!(ScopeSet::from_claim(&json!(null)).is_none());
    }

    #[test]
    fn test_admin_is_exact_match() {
        let scopes = ScopeSet::parse("wt:administrator wt:foo");
        assert!(!scopes.permits(None, Some("wt:admin")));
        assert!(!scopes.permits(Some("acme"), None));
    }

    #[test]
    fn test_owner_scope_matches_container_only() {
        let scopes = ScopeSet::parse("wt:owner:acme");
        assert!(scopes.permits(Some("acme"), None));
        assert!(!scopes.permits(Some("acme-corp"), None));
        assert!(!scopes.permits(None, None));
    }

    #[test]
    fn test_required_scope() {
        let scopes = ScopeSet::parse("run:hooks");
        assert!(scopes.permits(Some("acme"), Some("run:hooks")));
        assert!(!scopes.permits(Some("acme"), Some("run")));
        assert!(!scopes.permits(Some("acme"), None));
    }

    #[test]
    fn test_empty_set_denies() {
        let scopes = ScopeSet::default();
        assert!(scopes.is_empty());
        assert!(!scopes.permits(Some("acme"), Some("x")));
    }

    proptest! {
        #[test]
        fn prop_admin_always_permits(container in "[a-z]{1,12}", extra in "[a-z:]{0,16}") {
            let scopes = ScopeSet::parse(&format!("{extra} wt:admin"));
            prop_assert!(scopes.permits(Some(&container), None));
        }

        #[test]
        fn prop_prefixed_admin_never_matches(suffix in "[a-z]{1,8}") {
            let scopes = ScopeSet::parse(&format!("wt:admin{suffix}"));
            prop_assert!(!scopes.permits(None, Some(ADMIN_SCOPE)));
        }
    }
}
