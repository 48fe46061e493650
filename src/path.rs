//! Path pattern matching.
//!
//! Patterns are split on `/` and compared segment by segment:
//!
//! | Segment | Matches |
//! |---|---|
//! | `users` | exactly `users` (case-sensitive) |
//! | `:id` | any single non-empty segment, bound to `id` |
//! | trailing `*` | the rest of the path, including nothing at all |
//!
//! Without a trailing `*` the segment counts must agree, so `/users/:id`
//! does not match `/users/42/posts`. Trailing slashes are not normalised:
//! `/users/` has an extra empty segment.

use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A compiled path pattern.
#[derive(Clone, Debug)]
pub struct PathMatcher {
    pattern: String,
    segments: Vec<Segment>,
    wildcard: bool,
}

impl PathMatcher {
    pub fn new(pattern: &str) -> Self {
        let mut parts: Vec<&str> = pattern.split('/').collect();
        let wildcard = parts.last() == Some(&"*");
        if wildcard {
            parts.pop();
        }

        let segments = parts
            .into_iter()
            .map(|part| match part.strip_prefix(':') {
                Some(name) if !name.is_empty() => Segment::Param(name.to_owned()),
                _ => Segment::Literal(part.to_owned()),
            })
            .collect();

        Self { pattern: pattern.to_owned(), segments, wildcard }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, path: &str) -> bool {
        self.bind(path).is_some()
    }

    /// Matches `path` and returns the bound parameters.
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let bound = self.bind(path)?;
        Some(
            bound
                .into_iter()
                .map(|(name, value)| (name.to_owned(), value.to_owned()))
                .collect(),
        )
    }

    fn bind<'s, 'p>(&'s self, path: &'p str) -> Option<Vec<(&'s str, &'p str)>> {
        let mut parts = path.split('/');
        let mut bound = Vec::new();

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Param(name) if !part.is_empty() => bound.push((name.as_str(), part)),
                _ => return None,
            }
        }

        if !self.wildcard && parts.next().is_some() {
            return None;
        }
        Some(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_is_exact() {
        let m = PathMatcher::new("/items");
        assert!(m.matches("/items"));
        assert!(!m.matches("/Items"));
        assert!(!m.matches("/items/"));
        assert!(!m.matches("/item"));
    }

    #[test]
    fn param_binds_one_segment() {
        let m = PathMatcher::new("/items/:id");
        let params = m.captures("/items/42").unwrap();
        assert_eq!(params["id"], "42");
        assert!(!m.matches("/items/"));
        assert!(!m.matches("/items"));
    }

    #[test]
    fn extra_segment_never_matches() {
        for pattern in ["/a/:b", "/users/:id"] {
            let m = PathMatcher::new(pattern);
            assert!(!m.matches("/a/x/y"));
            assert!(!m.matches("/users/42/posts"));
        }
    }

    #[test]
    fn wildcard_matches_zero_or_more_segments() {
        let m = PathMatcher::new("/a/*");
        assert!(m.matches("/a"));
        assert!(m.matches("/a/x"));
        assert!(m.matches("/a/x/y"));
        assert!(!m.matches("/b/x"));
        assert!(!m.matches("/ab"));
    }

    #[test]
    fn wildcard_keeps_params() {
        let m = PathMatcher::new("/orgs/:org/*");
        assert_eq!(m.captures("/orgs/acme/repos/1").unwrap()["org"], "acme");
        assert_eq!(m.captures("/orgs/acme").unwrap()["org"], "acme");
    }

    #[test]
    fn bare_wildcard_matches_everything() {
        let m = PathMatcher::new("*");
        assert!(m.matches("/"));
        assert!(m.matches("/anything/at/all"));
    }

    #[test]
    fn multiple_params() {
        let params = PathMatcher::new("/u/:user/p/:post").captures("/u/ann/p/7").unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params["user"], "ann");
        assert_eq!(params["post"], "7");
    }
}
