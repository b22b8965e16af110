//! Tracking expression resolution.
//!
//! Turns a free-form, whitespace-separated list of class names into a compound
//! class selector (logical AND of classes on a single element).

/// Resolve a tracking expression into a compound class selector.
///
/// `"foo .bar  baz"` becomes `".foo.bar.baz"`. Empty or all-whitespace input
/// yields an empty string, which callers treat as "no valid expression".
/// Tokens are not escaped; symbols inside a token produce a selector the
/// query layer will reject.
pub fn resolve(expression: &str) -> String {
    expression
        .split_whitespace()
        .map(|token| {
            if token.starts_with('.') {
                token.to_string()
            } else {
                format!(".{}", token)
            }
        })
        .collect()
}

/// Check whether an expression resolves to something trackable
pub fn is_trackable(expression: &str) -> bool {
    !resolve(expression).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_expressions() {
        assert_eq!(resolve(""), "");
        assert_eq!(resolve("   "), "");
        assert_eq!(resolve("\t\n "), "");
        assert!(!is_trackable("  "));
    }

    #[test]
    fn test_mixed_prefixes() {
        assert_eq!(resolve("foo .bar  baz"), ".foo.bar.baz");
        assert_eq!(resolve(".a b"), ".a.b");
    }

    #[test]
    fn test_surrounding_whitespace() {
        assert_eq!(resolve("  ytp-caption-segment  "), ".ytp-caption-segment");
        assert!(is_trackable("sub-line"));
    }

    #[test]
    fn test_already_resolved_is_stable() {
        let once = resolve("a b c");
        assert_eq!(resolve(&once), once);
    }

    #[test]
    fn test_symbols_pass_through_unescaped() {
        assert_eq!(resolve("a#b"), ".a#b");
        assert_eq!(resolve("x>y"), ".x>y");
    }
}
