//! Route path patterns with typed segment matchers, e.g. `/shows/{id:[0-9]+}`.

use regex::Regex;

use super::RouterError;

#[derive(Clone, Debug)]
enum Segment {
    Literal(String),
    Param { name: String, constraint: Option<Regex> },
}

/// A parsed route path. Parsing fails on malformed input so a bad pattern is
/// caught at registration, never at request time.
#[derive(Clone, Debug)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(raw: &str) -> Result<Self, RouterError> {
        let invalid = |reason: &str| RouterError::InvalidPattern {
            pattern: raw.to_owned(),
            reason: reason.to_owned(),
        };
        let rest = raw.strip_prefix('/').ok_or_else(|| invalid("must start with '/'"))?;
        let mut segments = Vec::new();
        if rest.is_empty() {
            return Ok(PathPattern {
                raw: raw.to_owned(),
                segments,
            });
        }
        for part in split_segments(rest).ok_or_else(|| invalid("unbalanced braces"))? {
            if part.is_empty() {
                return Err(invalid("empty path segment"));
            }
            let segment = match part.strip_prefix('{') {
                Some(inner) => {
                    let inner = inner
                        .strip_suffix('}')
                        .ok_or_else(|| invalid("variables must span a whole segment"))?;
                    let (name, constraint) = match inner.split_once(':') {
                        Some((name, re)) => (name, Some(re)),
                        None => (inner, None),
                    };
                    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                        return Err(invalid("variable names must be non-empty [A-Za-z0-9_]"));
                    }
                    let already_used = segments
                        .iter()
                        .any(|s| matches!(s, Segment::Param { name: n, .. } if n == name));
                    if already_used {
                        return Err(invalid("duplicate variable name"));
                    }
                    let constraint = match constraint {
                        Some(re) if re.is_empty() => return Err(invalid("empty segment matcher")),
                        Some(re) => Some(
                            Regex::new(&format!("^(?:{re})$"))
                                .map_err(|err| invalid(&format!("bad segment matcher: {err}")))?,
                        ),
                        None => None,
                    };
                    Segment::Param {
                        name: name.to_owned(),
                        constraint,
                    }
                }
                None => {
                    if part.contains(['{', '}']) {
                        return Err(invalid("variables must span a whole segment"));
                    }
                    if part.starts_with([':', '*']) {
                        return Err(invalid("segments must not start with ':' or '*'"));
                    }
                    Segment::Literal(part.to_owned())
                }
            };
            segments.push(segment);
        }
        Ok(PathPattern {
            raw: raw.to_owned(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The pattern in the transport's syntax (`/shows/:id`). Patterns that
    /// differ only in segment matchers share this path.
    pub fn transport_path(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_owned();
        }
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(lit) => format!("/{lit}"),
                Segment::Param { name, .. } => format!("/:{name}"),
            })
            .collect()
    }

    /// The pattern with variables erased (`/shows/{}`). Two patterns with the
    /// same shape compete for the same requests.
    pub fn shape(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_owned();
        }
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(lit) => format!("/{lit}"),
                Segment::Param { .. } => "/{}".to_owned(),
            })
            .collect()
    }

    /// Whether captured `(name, value)` pairs satisfy every segment matcher.
    pub fn accepts<'a>(&self, captures: impl IntoIterator<Item = (&'a str, &'a str)>) -> bool {
        captures.into_iter().all(|(name, value)| {
            self.segments.iter().all(|s| match s {
                Segment::Param {
                    name: n,
                    constraint: Some(re),
                } if n == name => re.is_match(value),
                _ => true,
            })
        })
    }
}

/// Split on '/' outside braces; `None` when braces are unbalanced.
fn split_segments(path: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in path.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.checked_sub(1)?,
            '/' if depth == 0 => {
                parts.push(&path[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    parts.push(&path[start..]);
    Some(parts)
}
