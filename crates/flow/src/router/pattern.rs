//! Compiled route patterns.
//!
//! A pattern such as `/users/:userId/posts/:postId` is split on `/` into
//! [`Segment`]s. Literal segments must match a path segment exactly, a segment
//! starting with `:` is a named parameter that matches any single non-empty
//! path segment.

use crate::error::RouterError;
use crate::request::PathParams;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

const PARAM_MARKER: char = ':';

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compiles `pattern` into segment descriptors.
    ///
    /// The pattern must start with `/`; one trailing slash is ignored except
    /// for the root pattern `/`.
    pub fn parse(pattern: &str) -> Result<Self, RouterError> {
        if !pattern.starts_with('/') {
            return Err(RouterError::invalid_pattern(pattern, "pattern must start with '/'"));
        }

        let mut names = HashSet::new();
        let mut segments = Vec::new();
        for segment in split_segments(pattern) {
            match segment.strip_prefix(PARAM_MARKER) {
                Some("") => return Err(RouterError::invalid_pattern(pattern, "parameter name is empty")),
                Some(name) => {
                    if !names.insert(name) {
                        return Err(RouterError::DuplicateParam { pattern: pattern.to_string(), name: name.to_string() });
                    }
                    segments.push(Segment::Param(name.to_string()));
                }
                None => segments.push(Segment::Literal(segment.to_string())),
            }
        }

        Ok(Self { raw: pattern.to_string(), segments })
    }

    /// The pattern as it was registered.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Two patterns are structurally equal when they accept exactly the same
    /// paths, `/users/:id` and `/users/:uid` included.
    pub fn same_shape(&self, other: &PathPattern) -> bool {
        self.segments.len() == other.segments.len()
            && self.segments.iter().zip(&other.segments).all(|pair| match pair {
                (Segment::Literal(a), Segment::Literal(b)) => a == b,
                (Segment::Param(_), Segment::Param(_)) => true,
                _ => false,
            })
    }

    /// Matches already split and decoded path segments, binding parameters by position.
    pub fn matches(&self, path_segments: &[Cow<'_, str>]) -> Option<PathParams> {
        if path_segments.len() != self.segments.len() {
            return None;
        }

        let mut params = PathParams::empty();
        for (segment, value) in self.segments.iter().zip(path_segments) {
            match segment {
                Segment::Literal(literal) if literal == value => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if value.is_empty() => return None,
                Segment::Param(name) => params.insert(name.clone(), value.to_string()),
            }
        }
        Some(params)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Splits a path into its segments, trimming exactly one trailing slash unless
/// the path is the root.
pub(crate) fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);
    // the root path has no segments at all
    let empty = path.is_empty();
    path.split('/').filter(move |_| !empty)
}

/// Splits and percent-decodes a request path.
pub(crate) fn decode_segments(path: &str) -> Vec<Cow<'_, str>> {
    split_segments(path).map(percent_decode).collect()
}

pub(crate) fn percent_decode(raw: &str) -> Cow<'_, str> {
    if !raw.contains('%') {
        return Cow::Borrowed(raw);
    }
    let bytes = urlencoding::decode_binary(raw.as_bytes());
    Cow::Owned(String::from_utf8_lossy(&bytes).into_owned())
}
