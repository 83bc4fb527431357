//! Path patterns with typed placeholders.
//!
//! A pattern is a `/`-separated list of segments. Each segment is either a
//! literal or a whole-segment placeholder:
//!
//! ```text
//! /user/<username>            string placeholder (the default type)
//! /user/<username:string>     same thing, spelled out
//! /post/<id:int>              digits only, parsed to i64
//! ```
//!
//! Patterns are compiled once at registration. Matching walks the segments
//! of a single pattern; choosing *which* pattern is the router's job.

use std::fmt;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

use crate::error::Error;
use crate::params::{Params, Value};

/// Characters escaped when a value is written into a path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// The type tag of a placeholder.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    /// Any non-empty segment.
    Str,
    /// `[0-9]+`, parsed to `i64`.
    Int,
}

impl Kind {
    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "string" | "str" => Some(Self::Str),
            "int" | "integer" => Some(Self::Int),
            _ => None,
        }
    }

    /// Converts a decoded segment into a value, or `None` if it does not fit.
    fn accept(self, segment: &str) -> Option<Value> {
        match self {
            Self::Str if !segment.is_empty() => Some(Value::Str(segment.to_owned())),
            Self::Str => None,
            Self::Int if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) => {
                segment.parse().ok().map(Value::Int)
            }
            Self::Int => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder { name: String, kind: Kind },
}

/// A compiled path pattern.
#[derive(Clone, Debug)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Compiles `source`, rejecting anything that is not a clean pattern.
    pub fn parse(source: &str) -> Result<Self, Error> {
        if !source.starts_with('/') {
            return Err(Error::malformed(source, "pattern must start with `/`"));
        }

        let mut segments = Vec::new();
        let normalized = normalize(source);
        if normalized != "/" {
            for raw in normalized[1..].split('/') {
                if raw.is_empty() {
                    return Err(Error::malformed(source, "empty path segment"));
                }
                segments.push(parse_segment(source, raw)?);
            }
        }

        let mut seen: Vec<&str> = Vec::new();
        for name in segments.iter().filter_map(placeholder_name) {
            if seen.contains(&name) {
                return Err(Error::malformed(source, format!("placeholder `{name}` appears twice")));
            }
            seen.push(name);
        }

        Ok(Self { source: source.to_owned(), segments })
    }

    /// The pattern text as registered.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Placeholder names, in path order.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(placeholder_name)
    }

    /// Matches an already-normalized path, returning the extracted values.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let mut params = Params::new();
        let rest = path.strip_prefix('/').unwrap_or(path);
        let mut parts = rest.split('/').filter(|_| !rest.is_empty());

        for segment in &self.segments {
            let raw = parts.next()?;
            let decoded = percent_decode_str(raw).decode_utf8().ok()?;
            match segment {
                Segment::Literal(lit) => {
                    if lit.as_str() != decoded.as_ref() {
                        return None;
                    }
                }
                Segment::Placeholder { name, kind } => {
                    params.insert(name, kind.accept(&decoded)?);
                }
            }
        }

        if parts.next().is_some() {
            return None;
        }
        Some(params)
    }

    /// Builds a path from `args`, checking each value against its placeholder.
    ///
    /// `endpoint` only labels errors. Arguments that are not placeholders are
    /// ignored here; the caller turns them into a query string.
    pub fn build(&self, endpoint: &str, args: &Params) -> Result<String, Error> {
        if self.segments.is_empty() {
            return Ok("/".to_owned());
        }

        let mut path = String::with_capacity(self.source.len());
        for segment in &self.segments {
            path.push('/');
            match segment {
                Segment::Literal(lit) => path.push_str(lit),
                Segment::Placeholder { name, kind } => {
                    let value = args.get(name).ok_or_else(|| Error::MissingParameter {
                        endpoint: endpoint.to_owned(),
                        param: name.clone(),
                    })?;
                    let text = value.to_string();
                    if kind.accept(&text).is_none() {
                        return Err(Error::InvalidParameter {
                            endpoint: endpoint.to_owned(),
                            param: name.clone(),
                            value: text,
                        });
                    }
                    path.extend(utf8_percent_encode(&text, SEGMENT));
                }
            }
        }
        Ok(path)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Strips trailing slashes, except from the root. An empty path is the root.
pub fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

fn placeholder_name(segment: &Segment) -> Option<&str> {
    match segment {
        Segment::Placeholder { name, .. } => Some(name),
        Segment::Literal(_) => None,
    }
}

fn parse_segment(source: &str, raw: &str) -> Result<Segment, Error> {
    let Some(inner) = raw.strip_prefix('<').and_then(|s| s.strip_suffix('>')) else {
        if raw.contains(['<', '>']) {
            return Err(Error::malformed(
                source,
                format!("placeholder must fill its segment: `{raw}`"),
            ));
        }
        return Ok(Segment::Literal(raw.to_owned()));
    };

    let (name, kind) = match inner.split_once(':') {
        Some((name, tag)) => {
            let kind = Kind::parse(tag.trim())
                .ok_or_else(|| {
                    Error::malformed(source, format!("unknown placeholder type `{tag}`"))
                })?;
            (name.trim(), kind)
        }
        None => (inner.trim(), Kind::Str),
    };

    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(Error::malformed(source, format!("bad placeholder name `{name}`")));
    }
    Ok(Segment::Placeholder { name: name.to_owned(), kind })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("/", "/")]
    #[case("", "/")]
    #[case("/user/", "/user")]
    #[case("/user//", "/user")]
    #[case("/user/foo", "/user/foo")]
    fn normalizes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(input), expected);
    }

    #[test]
    fn string_placeholder() {
        let p = Pattern::parse("/user/<username:string>").unwrap();
        let params = p.matches("/user/foo").unwrap();
        assert_eq!(params.get("username"), Some(&Value::from("foo")));
        assert!(p.matches("/user").is_none());
        assert!(p.matches("/user/foo/bar").is_none());
    }

    #[test]
    fn untyped_placeholder_is_a_string() {
        let p = Pattern::parse("/tag/<name>").unwrap();
        assert_eq!(p.matches("/tag/42").unwrap().get("name"), Some(&Value::from("42")));
    }

    #[rstest]
    #[case("/post/42", Some(42))]
    #[case("/post/007", Some(7))]
    #[case("/post/-1", None)]
    #[case("/post/4x", None)]
    #[case("/post/99999999999999999999", None)]
    fn int_placeholder(#[case] path: &str, #[case] expected: Option<i64>) {
        let p = Pattern::parse("/post/<id:int>").unwrap();
        let got = p.matches(path).and_then(|m| m.get("id").and_then(Value::as_int));
        assert_eq!(got, expected);
    }

    #[test]
    fn root_pattern_has_no_segments() {
        let p = Pattern::parse("/").unwrap();
        assert!(p.matches("/").unwrap().is_empty());
        assert!(p.matches("/x").is_none());
        assert_eq!(p.build("index", &Params::new()).unwrap(), "/");
    }

    #[test]
    fn segments_are_percent_decoded() {
        let p = Pattern::parse("/user/<name>").unwrap();
        let params = p.matches("/user/a%20b").unwrap();
        assert_eq!(params.get("name"), Some(&Value::from("a b")));
    }

    #[rstest]
    #[case("user")]
    #[case("/a//b")]
    #[case("/user/<>")]
    #[case("/user/<id:float>")]
    #[case("/user/x<id>")]
    #[case("/a/<id>/<id:int>")]
    fn rejects_malformed(#[case] source: &str) {
        assert!(matches!(Pattern::parse(source), Err(Error::MalformedPattern { .. })));
    }

    #[test]
    fn build_encodes_and_validates() {
        let p = Pattern::parse("/files/<name>/<rev:int>").unwrap();
        let args = Params::new().with("name", "a/b c").with("rev", 3);
        assert_eq!(p.build("files", &args).unwrap(), "/files/a%2Fb%20c/3");

        let bad = Params::new().with("name", "x").with("rev", "three");
        assert!(matches!(p.build("files", &bad), Err(Error::InvalidParameter { .. })));

        let missing = Params::new().with("name", "x");
        assert!(matches!(
            p.build("files", &missing),
            Err(Error::MissingParameter { param, .. }) if param == "rev"
        ));
    }
}
