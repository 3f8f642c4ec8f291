//! Member paths such as `Items[0].Name`.
//!
//! A path is parsed once into an immutable list of segments. Index segments
//! keep their brackets (`[0]`) so resolvers can tell them apart from named
//! members. Equality and hashing compare the segment lists, which makes paths
//! usable as cache keys.

use std::{
    fmt,
    hash::{Hash, Hasher},
    rc::Rc,
};

use floem_expr::Literal;

use crate::error::{BindingError, Result};

#[derive(Clone)]
enum Segments {
    Empty,
    /// The common case gets no slice allocation.
    Single(Rc<str>),
    Multi(Rc<[Rc<str>]>),
}

#[derive(Clone)]
pub struct MemberPath {
    path: Rc<str>,
    segments: Segments,
}

impl MemberPath {
    /// The path with no segments; it observes the target itself.
    pub fn empty() -> Self {
        MemberPath {
            path: "".into(),
            segments: Segments::Empty,
        }
    }

    /// A single named segment, taken as-is.
    pub fn single(member: impl Into<Rc<str>>) -> Self {
        let member = member.into();
        MemberPath {
            path: member.clone(),
            segments: Segments::Single(member),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let segments = split_segments(text)?;
        Ok(MemberPath::from_segments(segments))
    }

    fn from_segments(mut segments: Vec<Rc<str>>) -> Self {
        match segments.len() {
            0 => MemberPath::empty(),
            1 => match segments.pop() {
                Some(member) => MemberPath::single(member),
                None => MemberPath::empty(),
            },
            _ => MemberPath {
                path: join_segments(&segments).into(),
                segments: Segments::Multi(segments.into()),
            },
        }
    }

    /// The normalized path string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn members(&self) -> &[Rc<str>] {
        match &self.segments {
            Segments::Empty => &[],
            Segments::Single(member) => std::slice::from_ref(member),
            Segments::Multi(members) => members,
        }
    }

    pub fn len(&self) -> usize {
        self.members().len()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.segments, Segments::Empty)
    }

    pub fn is_single(&self) -> bool {
        matches!(self.segments, Segments::Single(_))
    }

    pub fn last(&self) -> Option<&str> {
        self.members().last().map(|member| &**member)
    }

    /// This path followed by `other`.
    pub fn join(&self, other: &MemberPath) -> MemberPath {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        let segments = self.members().iter().chain(other.members()).cloned().collect();
        MemberPath::from_segments(segments)
    }
}

impl PartialEq for MemberPath {
    fn eq(&self, other: &Self) -> bool {
        self.members() == other.members()
    }
}

impl Eq for MemberPath {}

impl Hash for MemberPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.members().hash(state);
    }
}

impl fmt::Display for MemberPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl fmt::Debug for MemberPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberPath({:?})", &*self.path)
    }
}

impl std::str::FromStr for MemberPath {
    type Err = BindingError;

    fn from_str(s: &str) -> Result<Self> {
        MemberPath::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for MemberPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.path())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for MemberPath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        MemberPath::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Whether `segment` is an index segment such as `[0]`.
pub fn is_index_segment(segment: &str) -> bool {
    segment.starts_with('[') && segment.ends_with(']')
}

/// Parses the arguments of an index segment. `[0, "a"]` gives `[Int(0), Str("a")]`.
///
/// Unquoted arguments that are not numbers, booleans or `null` are taken as
/// strings. Inside quotes a backslash escapes the next character.
pub fn parse_index_args(segment: &str) -> Result<Vec<Literal>> {
    let invalid = |reason| BindingError::InvalidPath {
        path: segment.to_owned(),
        reason,
    };
    let inner = segment
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| invalid("index segment must be wrapped in brackets"))?;

    let mut args = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (pos, c) in inner.char_indices() {
        match (quote, c) {
            (Some(_), _) if escaped => escaped = false,
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, ',') => {
                let arg = parse_index_arg(&inner[start..pos]);
                args.push(arg.ok_or_else(|| invalid("empty index argument"))?);
                start = pos + 1;
            }
            (None, _) => {}
        }
    }
    if quote.is_some() {
        return Err(invalid("unterminated string in index"));
    }
    args.push(parse_index_arg(&inner[start..]).ok_or_else(|| invalid("empty index argument"))?);
    Ok(args)
}

fn parse_index_arg(raw: &str) -> Option<Literal> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let quoted = raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')));
    Some(if quoted {
        Literal::Str(unescape(&raw[1..raw.len() - 1]).into())
    } else if let Ok(v) = raw.parse::<i64>() {
        Literal::Int(v)
    } else if let Ok(v) = raw.parse::<f64>() {
        Literal::Float(v)
    } else {
        match raw {
            "true" => Literal::Bool(true),
            "false" => Literal::Bool(false),
            "null" => Literal::Null,
            _ => Literal::Str(raw.into()),
        }
    })
}

fn unescape(quoted: &str) -> String {
    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

fn normalize_index(segment: &str) -> Result<Rc<str>> {
    let args = parse_index_args(segment)?;
    let mut out = String::from("[");
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&arg.to_string());
    }
    out.push(']');
    Ok(out.into())
}

fn split_segments(text: &str) -> Result<Vec<Rc<str>>> {
    let invalid = |reason| BindingError::InvalidPath {
        path: text.to_owned(),
        reason,
    };
    let trimmed = text.trim();
    let mut segments: Vec<Rc<str>> = Vec::new();
    if trimmed.is_empty() {
        return Ok(segments);
    }

    let bytes = trimmed.as_bytes();
    let mut name_start = 0;
    // Set after a `.`: a named segment (or an index) must follow.
    let mut expect_segment = true;
    let mut pos = 0;
    while pos < bytes.len() {
        match bytes[pos] {
            b'.' => {
                let name = trimmed[name_start..pos].trim();
                if name.is_empty() {
                    if expect_segment {
                        return Err(invalid("empty member name"));
                    }
                } else {
                    segments.push(check_name(name).map_err(invalid)?);
                }
                expect_segment = true;
                pos += 1;
                name_start = pos;
            }
            b'[' => {
                let name = trimmed[name_start..pos].trim();
                if !name.is_empty() {
                    segments.push(check_name(name).map_err(invalid)?);
                }
                let end = find_index_end(trimmed, pos).ok_or_else(|| invalid("unclosed `[`"))?;
                segments.push(normalize_index(&trimmed[pos..=end])?);
                expect_segment = false;
                pos = end + 1;
                name_start = pos;
            }
            b']' => return Err(invalid("unexpected `]`")),
            _ => pos += 1,
        }
    }

    let name = trimmed[name_start..].trim();
    if name.is_empty() {
        if expect_segment {
            return Err(invalid("path ends with `.`"));
        }
    } else {
        segments.push(check_name(name).map_err(invalid)?);
    }
    Ok(segments)
}

fn check_name(name: &str) -> std::result::Result<Rc<str>, &'static str> {
    if name.chars().any(char::is_whitespace) {
        return Err("whitespace inside member name");
    }
    Ok(name.into())
}

/// Position of the `]` closing the index opened at `open`, skipping quoted text.
fn find_index_end(text: &str, open: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (offset, c) in text[open + 1..].char_indices() {
        match (quote, c) {
            (Some(_), _) if escaped => escaped = false,
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, ']') => return Some(open + 1 + offset),
            (None, '[') => return None,
            (None, _) => {}
        }
    }
    None
}

fn join_segments(segments: &[Rc<str>]) -> String {
    let mut path = String::new();
    for segment in segments {
        if !path.is_empty() && !is_index_segment(segment) {
            path.push('.');
        }
        path.push_str(segment);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(path: &MemberPath) -> Vec<&str> {
        path.members().iter().map(|m| &**m).collect()
    }

    #[test]
    fn dotted_and_indexed_segments() {
        let path = MemberPath::parse("Items[0].Name").unwrap();
        assert_eq!(members(&path), ["Items", "[0]", "Name"]);
        assert_eq!(path.path(), "Items[0].Name");
        assert!(!path.is_single());

        let path = MemberPath::parse(" A.B.C ").unwrap();
        assert_eq!(members(&path), ["A", "B", "C"]);
        assert_eq!(path.last(), Some("C"));
    }

    #[test]
    fn single_and_empty_paths() {
        let path = MemberPath::parse("Name").unwrap();
        assert!(path.is_single());
        assert_eq!(path, MemberPath::single("Name"));

        let path = MemberPath::parse("  ").unwrap();
        assert!(path.is_empty());
        assert_eq!(path.len(), 0);
        assert_eq!(path, MemberPath::empty());
    }

    #[test]
    fn index_segments_are_normalized() {
        let path = MemberPath::parse("Map[ 'key' , 2 ].Value").unwrap();
        assert_eq!(members(&path), ["Map", "[\"key\", 2]", "Value"]);
        assert_eq!(path, MemberPath::parse("Map[\"key\",2].Value").unwrap());
        assert_eq!(
            MemberPath::parse("[0][1]").unwrap().members().len(),
            2,
        );
        assert_eq!(MemberPath::parse("A.[1]").unwrap().path(), "A[1]");
    }

    #[test]
    fn quoted_index_survives_a_reparse() {
        let path = MemberPath::parse(r#"Map['a"b'].Value"#).unwrap();
        assert_eq!(members(&path), ["Map", r#"["a\"b"]"#, "Value"]);
        assert_eq!(
            parse_index_args(&path.members()[1]).unwrap(),
            [Literal::Str("a\"b".into())]
        );

        let reparsed = MemberPath::parse(path.path()).unwrap();
        assert_eq!(reparsed, path);
        assert_eq!(reparsed.path(), path.path());

        let path = MemberPath::parse(r#"Map["c:\\x", 'it\'s']"#).unwrap();
        assert_eq!(
            parse_index_args(&path.members()[1]).unwrap(),
            [Literal::Str(r"c:\x".into()), Literal::Str("it's".into())]
        );
        assert_eq!(MemberPath::parse(path.path()).unwrap(), path);
    }

    #[test]
    fn equality_compares_segments() {
        let single = MemberPath::single("A.B");
        let parsed = MemberPath::parse("A.B").unwrap();
        assert_eq!(single.path(), parsed.path());
        assert_ne!(single, parsed);

        let mut set = indexmap::IndexSet::new();
        set.insert(single);
        set.insert(parsed);
        set.insert(MemberPath::parse("A . B").unwrap());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn index_arguments_are_typed() {
        let args = parse_index_args("[0, \"a,b\", 1.5, true, null, bare]").unwrap();
        assert_eq!(args, [
            Literal::Int(0),
            Literal::Str("a,b".into()),
            Literal::Float(1.5),
            Literal::Bool(true),
            Literal::Null,
            Literal::Str("bare".into()),
        ]);
    }

    #[test]
    fn malformed_paths_are_rejected() {
        for text in ["A..B", ".A", "A.", "A[0", "A]", "A[]", "A[1,]", "A B", "A['x]"] {
            let err = MemberPath::parse(text).unwrap_err();
            assert!(
                matches!(err, BindingError::InvalidPath { .. }),
                "{text:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn join_appends_segments() {
        let a = MemberPath::parse("A.B").unwrap();
        let b = MemberPath::parse("[2].C").unwrap();
        assert_eq!(a.join(&b).path(), "A.B[2].C");
        assert_eq!(a.join(&MemberPath::empty()), a);
    }
}
