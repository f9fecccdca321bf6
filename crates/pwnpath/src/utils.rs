//! Helper routines.

use std::sync::LazyLock;

use github_actions_expressions::Expr;
use regex::Regex;

pub(crate) static PWNPATH_AGENT: &str =
    concat!("pwnpath/", env!("CARGO_PKG_VERSION"), " (https://github.com/pwnpath/pwnpath)");

/// Dotted context paths, for expressions our grammar can't parse.
static CONTEXT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"[A-Za-z_][\w-]*(?:\.(?:[\w-]+|\*))+").unwrap()
});

/// `[0]` or `['name']` index components.
static INDEX_COMPONENT: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r#"\[\s*(?:\d+|\*|'([^']*)'|"([^"]*)")\s*\]"#).unwrap()
});

pub(crate) trait PipeSelf<F> {
    fn pipe(self, f: F) -> Self
    where
        F: FnOnce(Self) -> Self,
        Self: Sized,
    {
        f(self)
    }
}

impl<T, F> PipeSelf<F> for T where T: Sized {}

/// Finds the end of the `${{ ... }}` starting at `start`, skipping over
/// `}}` inside single-quoted strings.
fn expression_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut in_string = false;

    for idx in start + 3..bytes.len() {
        match bytes[idx] {
            b'\'' => in_string = !in_string,
            b'}' if !in_string && idx > 0 && bytes[idx - 1] == b'}' => return Some(idx + 1),
            _ => {}
        }
    }

    None
}

/// Extracts the bodies of every `${{ ... }}` expression in `text`,
/// trimmed of whitespace, in order of appearance.
pub(crate) fn extract_expressions(text: &str) -> Vec<&str> {
    let mut exprs = vec![];
    let mut offset = 0;

    while let Some(start) = text[offset..].find("${{").map(|s| s + offset) {
        let Some(end) = expression_end(text, start) else {
            break;
        };

        exprs.push(text[start + 3..end - 2].trim());
        offset = end;
    }

    exprs
}

/// Returns the contexts referenced by an expression body.
///
/// Bodies our grammar can't parse (e.g. ones that index into arrays)
/// fall back to a textual scan, with `[0]` normalized to `.*` and
/// `['key']` to `.key`.
pub(crate) fn context_tokens(body: &str) -> Vec<String> {
    if let Ok(expr) = Expr::parse(body) {
        return expr.contexts().into_iter().map(Into::into).collect();
    }

    let normalized = INDEX_COMPONENT.replace_all(body, |caps: &regex::Captures| {
        match caps.get(1).or(caps.get(2)) {
            Some(key) => format!(".{}", key.as_str()),
            None => ".*".into(),
        }
    });

    // Drop string literals so that their contents aren't mistaken for contexts.
    let mut stripped = String::with_capacity(normalized.len());
    let mut in_string = false;
    for c in normalized.chars() {
        match c {
            '\'' => in_string = !in_string,
            _ if in_string => {}
            c => stripped.push(c),
        }
    }

    CONTEXT_PATH
        .find_iter(&stripped)
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{context_tokens, extract_expressions};

    #[test]
    fn test_extract_expressions() {
        for (text, expected) in [
            ("nothing here", vec![]),
            ("${{ github.actor }}", vec!["github.actor"]),
            (
                "echo ${{github.event.issue.title}} && echo '${{ env.FOO }}'",
                vec!["github.event.issue.title", "env.FOO"],
            ),
            ("${{ format('{0}}}', inputs.x) }}", vec!["format('{0}}}', inputs.x)"]),
            ("${{ unterminated", vec![]),
            ("${{ a }}${{ b }}", vec!["a", "b"]),
        ] {
            assert_eq!(extract_expressions(text), expected, "{text}");
        }
    }

    #[test]
    fn test_context_tokens() {
        for (body, expected) in [
            ("github.event.issue.title", vec!["github.event.issue.title"]),
            (
                "contains(github.event.comment.body, 'x.y') && env.FOO",
                vec!["github.event.comment.body", "env.FOO"],
            ),
            (
                "github.event.commits[0].message",
                vec!["github.event.commits.*.message"],
            ),
            (
                "github.event['pull_request']['title'] || 'a.b'",
                vec!["github.event.pull_request.title"],
            ),
            ("true", vec![]),
        ] {
            assert_eq!(context_tokens(body), expected, "{body}");
        }
    }
}
