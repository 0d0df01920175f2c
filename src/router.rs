//! Route patterns and path matching.
//!
//! Three pattern styles are supported:
//!
//! | Pattern              | Example match              | Captured params                 |
//! |----------------------|----------------------------|---------------------------------|
//! | `/users`             | `/users`                   | *(none)*                        |
//! | `/users/:id`         | `/users/42`                | `id → "42"`                     |
//! | `/files/*`           | `/files/docs/readme.txt`   | `path → "docs/readme.txt"`      |
//!
//! Trailing slashes are normalized on both patterns and incoming paths, so
//! `/users/` and `/users` are treated as equivalent. A bare `*` normalizes to
//! `/*`, and a missing leading separator is added, so `items` registers as
//! `/items`.
//!
//! When several patterns structurally match one path, the most specific wins:
//! the one with the fewest parameter/wildcard segments. Two overlapping
//! patterns of *equal* specificity would make that choice arbitrary, so the
//! registry rejects them at registration time via [`Pattern::overlaps`].

use std::collections::HashMap;

use crate::http::Method;

/// Path parameters bound by the matcher for one request.
#[derive(Debug, Clone, Default)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    /// Creates an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a parameter value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    /// Returns a bound parameter value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Returns the number of bound parameters.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` when nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// A single path segment, either a literal string or a named capture (`:name`).
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Name under which a trailing wildcard binds the remainder of the path.
pub const WILDCARD_PARAM: &str = "path";

/// Compiled representation of a route pattern string.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
    wildcard: bool,
}

impl Pattern {
    /// Parses and normalizes a route pattern string.
    pub fn parse(pattern: &str) -> Self {
        let mut pattern = pattern.to_owned();
        if !pattern.starts_with('/') {
            pattern.insert(0, '/');
        }
        if pattern == "/*" || pattern == "/" {
            // Root and bare-wildcard need no trailing-slash treatment.
        } else if pattern.ends_with('/') {
            pattern.pop();
        }

        let wildcard = pattern == "/*" || pattern.ends_with("/*");
        let trimmed = if wildcard {
            &pattern[..pattern.len() - 2]
        } else {
            pattern.as_str()
        };

        let segments = trimmed
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_owned()),
                None => Segment::Literal(s.to_owned()),
            })
            .collect();

        Self {
            raw: pattern,
            segments,
            wildcard,
        }
    }

    /// The normalized pattern string, used for duplicate detection and
    /// include prefixing.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Recompiles this pattern under a path prefix.
    pub fn prefixed(&self, prefix: &str) -> Pattern {
        if prefix.is_empty() {
            self.clone()
        } else {
            Pattern::parse(&format!("{prefix}{}", self.raw))
        }
    }

    /// The number of dynamic (parameter or wildcard) segments. Lower is more
    /// specific.
    pub fn specificity(&self) -> usize {
        let params = self
            .segments
            .iter()
            .filter(|s| matches!(s, Segment::Param(_)))
            .count();
        params + usize::from(self.wildcard)
    }

    /// Tries to match `path`, returning bound parameters on success.
    ///
    /// Literal segments must match exactly; parameter segments bind any
    /// single segment; a trailing wildcard binds the (possibly empty)
    /// remainder under [`WILDCARD_PARAM`].
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        if self.wildcard {
            if parts.len() < self.segments.len() {
                return None;
            }
        } else if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = PathParams::new();
        for (segment, part) in self.segments.iter().zip(&parts) {
            match segment {
                Segment::Literal(lit) => {
                    if lit != part {
                        return None;
                    }
                }
                Segment::Param(name) => params.insert(name.clone(), *part),
            }
        }

        if self.wildcard {
            params.insert(WILDCARD_PARAM, parts[self.segments.len()..].join("/"));
        }

        Some(params)
    }

    /// Returns `true` when some path could match both patterns.
    ///
    /// Used by the registry: two overlapping patterns of equal specificity
    /// with intersecting methods are rejected at registration time.
    pub fn overlaps(&self, other: &Pattern) -> bool {
        let (short, long) = if self.segments.len() <= other.segments.len() {
            (self, other)
        } else {
            (other, self)
        };

        // Without a wildcard on the shorter pattern, segment counts must agree.
        if !short.wildcard && short.segments.len() != long.segments.len() {
            return false;
        }

        let compared = short.segments.len().min(long.segments.len());
        let compatible = short.segments[..compared]
            .iter()
            .zip(&long.segments[..compared])
            .all(|(a, b)| match (a, b) {
                (Segment::Literal(x), Segment::Literal(y)) => x == y,
                _ => true,
            });
        if !compatible {
            return false;
        }

        // Equal-length fixed patterns with compatible segments always overlap;
        // a wildcard extends over any longer remainder.
        short.wildcard || long.wildcard || short.segments.len() == long.segments.len()
    }
}

/// Returns `true` when the two method sets share at least one method.
pub(crate) fn methods_intersect(a: &[Method], b: &[Method]) -> bool {
    a.iter().any(|m| b.contains(m))
}
