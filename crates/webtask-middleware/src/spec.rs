//! Middleware references.
//!
//! A webtask names its steps in the `wt-middleware` metadata entry. Each
//! entry is one of:
//!
//! - `https://host/path.js` - source fetched over HTTP and compiled
//! - `name` or `@scope/name` - the default export of a registered module
//! - `name/export` or `@scope/name/export` - a named export
//!
//! Parsing never touches the network or the registry.
//!
//! ```
//! use webtask_middleware::MiddlewareSpec;
//!
//! let spec = MiddlewareSpec::parse("@webtask/jwt-middleware").unwrap();
//! assert_eq!(spec.kind(), "named");
//!
//! let specs = MiddlewareSpec::parse_list("a, b/check ,,https://cdn.example.com/mw.js").unwrap();
//! assert_eq!(specs.len(), 3);
//! assert_eq!(specs[2].kind(), "remote");
//! ```

use crate::middleware::Middleware;
use regex::Regex;
use reqwest::Url;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use webtask_core::{WebtaskError, WebtaskResult};

fn named_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(@[^/(]+/[^/(]+|[^@/(]+)(?:/([^/(]+))?$").expect("valid regex")
    })
}

/// A reference to one pipeline step.
#[derive(Clone)]
pub enum MiddlewareSpec {
    /// A step supplied directly by the host.
    Inline(Arc<dyn Middleware>),
    /// A module in the registry, optionally narrowed to one export.
    Named {
        /// Module name, including any `@scope/` prefix.
        module: String,
        /// Export name; the default export when `None`.
        export: Option<String>,
    },
    /// Source text fetched from a URL and compiled per request.
    Remote {
        /// Location of the source.
        url: Url,
    },
}

impl MiddlewareSpec {
    /// Parses one textual reference.
    ///
    /// # Errors
    ///
    /// Returns a parse error when the text is neither an `http(s)` URL nor a
    /// `[@scope/]name[/export]` reference.
    pub fn parse(text: &str) -> WebtaskResult<Self> {
        let text = text.trim();

        if text.starts_with("http://") || text.starts_with("https://") {
            let url = Url::parse(text).map_err(|e| WebtaskError::parse(text, e.to_string()))?;
            return Ok(Self::Remote { url });
        }

        let Some(captures) = named_pattern().captures(text) else {
            let reason = if text.starts_with('@') && !text.contains('/') {
                "scoped reference is missing a package name"
            } else {
                "expected `[@scope/]name[/export]` or an http(s) URL"
            };
            return Err(WebtaskError::parse(text, reason));
        };

        Ok(Self::Named {
            module: captures[1].to_string(),
            export: captures.get(2).map(|m| m.as_str().to_string()),
        })
    }

    /// Parses the `wt-middleware` metadata value.
    ///
    /// A value that is truthy JSON must be an array of strings. Anything else,
    /// including `null`, `false`, `0` and `""`, is treated as a comma
    /// separated list; blank entries are skipped.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for JSON that is not an array of
    /// strings, and a parse error for the first malformed entry.
    pub fn parse_list(text: &str) -> WebtaskResult<Vec<Self>> {
        let parsed = serde_json::from_str::<serde_json::Value>(text)
            .ok()
            .filter(is_truthy);
        if let Some(value) = parsed {
            let serde_json::Value::Array(items) = value else {
                return Err(WebtaskError::configuration(
                    "wt-middleware must be a JSON array of strings or a comma separated list",
                ));
            };
            return items
                .iter()
                .map(|item| {
                    item.as_str()
                        .ok_or_else(|| {
                            WebtaskError::configuration("wt-middleware entries must be strings")
                        })
                        .and_then(Self::parse)
                })
                .collect();
        }

        text.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(Self::parse)
            .collect()
    }

    /// Wraps a host-supplied step.
    pub fn inline<M: Middleware>(middleware: M) -> Self {
        Self::Inline(Arc::new(middleware))
    }

    /// Short name of the variant, used as a metric label.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Inline(_) => "inline",
            Self::Named { .. } => "named",
            Self::Remote { .. } => "remote",
        }
    }

    /// Human-readable label for logs.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Inline(middleware) => format!("inline:{}", middleware.name()),
            Self::Named {
                module,
                export: Some(export),
            } => format!("{module}/{export}"),
            Self::Named { module, export: None } => module.clone(),
            Self::Remote { url } => url.to_string(),
        }
    }
}

impl fmt::Debug for MiddlewareSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(middleware) => f
                .debug_tuple("MiddlewareSpec::Inline")
                .field(&middleware.name())
                .finish(),
            Self::Named { module, export } => f
                .debug_struct("MiddlewareSpec::Named")
                .field("module", module)
                .field("export", export)
                .finish(),
            Self::Remote { url } => f
                .debug_struct("MiddlewareSpec::Remote")
                .field("url", &url.as_str())
                .finish(),
        }
    }
}

impl FromStr for MiddlewareSpec {
    type Err = WebtaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use webtask_core::ErrorKind;

    fn named(spec: &MiddlewareSpec) -> (&str, Option<&str>) {
        match spec {
            MiddlewareSpec::Named { module, export } => (module.as_str(), export.as_deref()),
            other => panic!("expected named spec, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_plain_name() {
        let spec = MiddlewareSpec::parse("body-parser").unwrap();
        assert_eq!(named(&spec), ("body-parser", None));
    }

    #[test]
    fn test_parse_name_with_export() {
        let spec = MiddlewareSpec::parse("auth/verify").unwrap();
        assert_eq!(named(&spec), ("auth", Some("verify")));
    }

    #[test]
    fn test_parse_scoped_name() {
        let spec = MiddlewareSpec::parse("  @webtask/bearer-auth-middleware ").unwrap();
        assert_eq!(named(&spec), ("@webtask/bearer-auth-middleware", None));

        let spec = MiddlewareSpec::parse("@webtask/jwt-middleware/strict").unwrap();
        assert_eq!(named(&spec), ("@webtask/jwt-middleware", Some("strict")));
    }

    #[test]
    fn test_parse_remote() {
        let spec = MiddlewareSpec::parse("https://cdn.example.com/mw.js").unwrap();
        assert_eq!(spec.kind(), "remote");
        assert_eq!(spec.label(), "https://cdn.example.com/mw.js");
    }

    #[test]
    fn test_parse_rejects_bare_scope() {
        let err = MiddlewareSpec::parse("@webtask").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.message().contains("package name"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for text in ["", "a/b/c", "fn(x)", "@scope/pkg/export/extra"] {
            let err = MiddlewareSpec::parse(text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Parse, "{text:?}");
        }
    }

    #[test]
    fn test_parse_list_csv() {
        let specs = MiddlewareSpec::parse_list(" a ,, b/c ,").unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(named(&specs[0]), ("a", None));
        assert_eq!(named(&specs[1]), ("b", Some("c")));
    }

    #[test]
    fn test_parse_list_json_array() {
        let specs =
            MiddlewareSpec::parse_list(r#"["@webtask/bearer-auth-middleware", "x/y"]"#).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].label(), "x/y");
    }

    #[test]
    fn test_parse_list_json_not_array() {
        let err = MiddlewareSpec::parse_list(r#"{"a": 1}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = MiddlewareSpec::parse_list("[1, 2]").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_parse_list_falsy_json_is_csv() {
        for text in ["0", "null", "false"] {
            let specs = MiddlewareSpec::parse_list(text).unwrap();
            assert_eq!(specs.len(), 1);
            assert_eq!(named(&specs[0]), (text, None));
        }

        for text in ["1", "true", r#""pkg""#] {
            let err = MiddlewareSpec::parse_list(text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration);
        }
    }

    #[test]
    fn test_parse_list_propagates_entry_errors() {
        let err = MiddlewareSpec::parse_list("ok, @bad").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_from_str() {
        let spec: MiddlewareSpec = "pkg".parse().unwrap();
        assert_eq!(spec.label(), "pkg");
    }

    proptest! {
        #[test]
        fn bare_scope_never_parses(scope in "[a-z][a-z0-9-]{0,15}") {
            let text = format!("@{scope}");
            prop_assert!(MiddlewareSpec::parse(&text).is_err());
        }

        #[test]
        fn plain_names_round_trip(name in "[a-z][a-z0-9-]{0,15}", export in "[a-z][a-z0-9_]{0,10}") {
            let spec = MiddlewareSpec::parse(&format!("{name}/{export}")).unwrap();
            prop_assert_eq!(spec.label(), format!("{name}/{export}"));
        }
    }
}
