//! Matching APIs for GitHub Actions expression contexts
//! (e.g. `github.event.name`).

enum Comparison {
    Child,
    Match,
}

/// A `ContextPattern` is a pattern that matches one or more contexts.
///
/// A pattern is always in dotted form and can only contain identifiers
/// and wildcards. A `*` component matches exactly one context component.
#[derive(Debug, Clone, Copy)]
pub struct ContextPattern<'src>(&'src str);

impl<'src> ContextPattern<'src> {
    /// Creates a new `ContextPattern` from the given string.
    ///
    /// Returns `None` if the pattern is invalid.
    pub fn new(pattern: &'src str) -> Option<Self> {
        let mut count = 0;
        for part in pattern.split('.') {
            match part {
                "" => return None,
                "*" => {}
                _ if part
                    .bytes()
                    .all(|c| c.is_ascii_alphanumeric() || c == b'-' || c == b'_') => {}
                _ => return None,
            }
            count += 1;
        }

        match count {
            0 => None,
            _ => Some(Self(pattern)),
        }
    }

    fn compare(&self, ctx: &str) -> Option<Comparison> {
        let mut pattern_parts = self.0.split('.');
        let mut ctx_parts = ctx.split('.');

        loop {
            match (pattern_parts.next(), ctx_parts.next()) {
                (Some("*"), Some(_)) => {}
                (Some(pattern), Some(part)) if pattern.eq_ignore_ascii_case(part) => {}
                (Some(_), Some(_)) => return None,
                // If both are exhausted, we have an exact match.
                (None, None) => return Some(Comparison::Match),
                // If the pattern is exhausted but the context isn't, then
                // the context is a child of the pattern.
                (None, Some(_)) => return Some(Comparison::Child),
                (Some(_), None) => return None,
            }
        }
    }

    /// Returns true if the given context is a child of the pattern.
    ///
    /// This is a loose parent-child relationship; for example, `foo` is its
    /// own parent, as well as the parent of `foo.bar` and `foo.bar.baz`.
    pub fn parent_of(&self, ctx: &str) -> bool {
        matches!(
            self.compare(ctx),
            Some(Comparison::Child | Comparison::Match)
        )
    }
}
