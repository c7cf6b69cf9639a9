//! Dotted-path locator algebra.
//!
//! A [`DotPath`] addresses a location inside a JSON document tree. It is
//! built from a non-empty sequence of [`PathSegment`]s and supports three
//! distinct lookup modes used by the rest of the system:
//!
//! - [`DotPath::find_if_exists`] — non-mutating resolution that stops short
//!   of the leaf, returning the parent node plus the final key/index
//!   (used by the filter algebra and by `$exists`).
//! - [`DotPath::find_or_create`] — mutating resolution that auto-vivifies
//!   missing object parents and pads arrays with `null`, used by the
//!   update algebra.
//! - [`DotPath::find_value`] — a direct, non-mutating value lookup used by
//!   projection and sort.
//!
//! Segments that look like bare digits (`"0"`, `"12"`) are ambiguous until
//! they are matched against an actual document node: against an array they
//! address an index, against an object they address a literal key named
//! `"0"`. Segments written with explicit bracket syntax (`"[0]"`) are never
//! ambiguous — they always address an array index, and are rejected against
//! an object parent. The shredder never produces ambiguous segments: it
//! walks the real document structure, so every leaf path it emits already
//! knows whether a segment was an object key or an array index.

use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::fmt;

use crate::error::JsonApiError;

/// One component of a [`DotPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A literal object key. Produced by the shredder for every object
    /// field, and by the parser for any non-numeric token.
    Key(String),
    /// An explicit array index, written `[n]` in path strings. Produced by
    /// the shredder for every array element, and by the parser for any
    /// bracketed token.
    Index(usize),
    /// A bare digit token from a parsed path string (`"0"`, `"12"`, ...)
    /// whose meaning — array index or object key — is resolved against the
    /// document at lookup time.
    Numeric(usize),
}

impl PathSegment {
    /// The digit-string value if this segment could plausibly address an
    /// array index (`Index` or `Numeric`).
    fn as_index(&self) -> Option<usize> {
        match self {
            PathSegment::Index(i) | PathSegment::Numeric(i) => Some(*i),
            PathSegment::Key(_) => None,
        }
    }

    /// The literal key this segment would address against an object
    /// (`Key` or `Numeric`, rendered back to its digit string).
    fn as_key(&self) -> Option<String> {
        match self {
            PathSegment::Key(k) => Some(k.clone()),
            PathSegment::Numeric(i) => Some(i.to_string()),
            PathSegment::Index(_) => None,
        }
    }

    /// Canonical sort/render form: escaped key text, or `[n]` for an
    /// explicit index. Used both for path ordering and for serializing the
    /// path back to a string (`docFieldOrder`).
    fn canonical(&self) -> String {
        match self {
            PathSegment::Index(i) => format!("[{i}]"),
            PathSegment::Numeric(i) => i.to_string(),
            PathSegment::Key(k) => escape_key(k),
        }
    }
}

fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for ch in key.chars() {
        match ch {
            '.' | '[' | ']' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// A non-empty, parsed dotted path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DotPath {
    segments: Vec<PathSegment>,
}

impl DotPath {
    /// Build a path directly from segments. Used by the shredder, which
    /// already knows — from walking the real document — whether each
    /// component is an object key or an array index.
    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        debug_assert!(!segments.is_empty(), "DotPath must have at least one segment");
        Self { segments }
    }

    /// Parse a dotted path string. Empty segments (`"a..b"`, leading or
    /// trailing dots) are rejected.
    pub fn parse(raw: &str) -> Result<Self, JsonApiError> {
        if raw.is_empty() {
            return Err(JsonApiError::unsupported_update_operation_path(
                raw,
                "path must not be empty",
            ));
        }
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = raw.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    } else {
                        current.push('\\');
                    }
                }
                '.' => {
                    if current.is_empty() {
                        return Err(JsonApiError::unsupported_update_operation_path(
                            raw,
                            "path contains an empty segment",
                        ));
                    }
                    segments.push(parse_segment(&current));
                    current.clear();
                }
                other => current.push(other),
            }
        }
        if current.is_empty() {
            return Err(JsonApiError::unsupported_update_operation_path(
                raw,
                "path contains an empty segment",
            ));
        }
        segments.push(parse_segment(&current));
        Ok(Self { segments })
    }

    /// Borrow the path's segments.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Non-mutating resolution. Returns the parent node and the final
    /// key/index if the path resolves to an addressable location, or
    /// [`PathMatch::Missing`] if any intermediate segment does not exist.
    pub fn find_if_exists<'a>(&self, doc: &'a JsonValue) -> PathMatch<'a> {
        let mut current = doc;
        for segment in &self.segments[..self.segments.len() - 1] {
            match step(current, segment) {
                Some(next) => current = next,
                None => return PathMatch::Missing,
            }
        }
        let last = self.segments.last().expect("non-empty path");
        match current {
            JsonValue::Object(map) => match last.as_key() {
                Some(key) if map.contains_key(&key) => PathMatch::Object {
                    parent: current,
                    key,
                },
                _ => PathMatch::Missing,
            },
            JsonValue::Array(arr) => match last.as_index() {
                Some(idx) if idx < arr.len() => PathMatch::Array {
                    parent: current,
                    index: idx,
                },
                _ => PathMatch::Missing,
            },
            _ => PathMatch::Missing,
        }
    }

    /// Direct value lookup, used by projection and sort. Equivalent to
    /// `find_if_exists(doc).value()`.
    pub fn find_value<'a>(&self, doc: &'a JsonValue) -> Option<&'a JsonValue> {
        self.find_if_exists(doc).value()
    }

    /// Mutating resolution that auto-vivifies missing object parents and
    /// pads arrays with `null` up to (but not including) the requested
    /// index, inserting an empty object at that index.
    ///
    /// Fails with [`ErrorCode::UnsupportedUpdateOperationPath`] if an
    /// intermediate segment would require creating a named property on a
    /// non-object (an array or a scalar).
    pub fn find_or_create<'a>(
        &self,
        doc: &'a mut JsonValue,
    ) -> Result<PathMatchMut<'a>, JsonApiError> {
        let mut current = doc;
        for segment in &self.segments[..self.segments.len() - 1] {
            current = step_or_create(current, segment, &self.to_string())?;
        }
        let last = self.segments.last().expect("non-empty path");
        if current.is_null() {
            // A freshly auto-vivified parent has no shape of its own yet —
            // pick object vs. array from what the final segment addresses,
            // rather than always defaulting to an object.
            *current = match last {
                PathSegment::Index(_) => JsonValue::Array(Vec::new()),
                PathSegment::Key(_) | PathSegment::Numeric(_) => JsonValue::Object(serde_json::Map::new()),
            };
        }
        match current {
            JsonValue::Object(_) => {
                let key = last.as_key().ok_or_else(|| {
                    JsonApiError::unsupported_update_operation_path(
                        self.to_string(),
                        "cannot address an object with an array index",
                    )
                })?;
                if !current.as_object().unwrap().contains_key(&key) {
                    current
                        .as_object_mut()
                        .unwrap()
                        .insert(key.clone(), JsonValue::Null);
                }
                Ok(PathMatchMut::Object { parent: current, key })
            }
            JsonValue::Array(_) => {
                let idx = last.as_index().ok_or_else(|| {
                    JsonApiError::unsupported_update_operation_path(
                        self.to_string(),
                        "cannot address an array with a named property",
                    )
                })?;
                pad_array(current, idx);
                Ok(PathMatchMut::Array {
                    parent: current,
                    index: idx,
                })
            }
            _ => Err(JsonApiError::unsupported_update_operation_path(
                self.to_string(),
                "cannot create a path through a scalar value",
            )),
        }
    }

    /// True iff `other` is a proper ancestor of `self` — i.e. `other`'s
    /// segments are a proper prefix of `self`'s segments.
    pub fn is_sub_path_of(&self, other: &DotPath) -> bool {
        other.segments.len() < self.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }
}

impl fmt::Display for DotPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", segment.canonical())?;
        }
        Ok(())
    }
}

/// Ancestor-before-descendant total order: segment-wise lexicographic
/// comparison of each segment's canonical form, then shorter-before-longer
/// at an equal common prefix.
impl PartialOrd for DotPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DotPath {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.segments.iter().zip(other.segments.iter()) {
            match a.canonical().cmp(&b.canonical()) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        self.segments.len().cmp(&other.segments.len())
    }
}

fn parse_segment(token: &str) -> PathSegment {
    if token.len() >= 3 && token.starts_with('[') && token.ends_with(']') {
        if let Ok(idx) = token[1..token.len() - 1].parse::<usize>() {
            return PathSegment::Index(idx);
        }
    }
    if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(idx) = token.parse::<usize>() {
            return PathSegment::Numeric(idx);
        }
    }
    PathSegment::Key(token.to_string())
}

fn step<'a>(node: &'a JsonValue, segment: &PathSegment) -> Option<&'a JsonValue> {
    match node {
        JsonValue::Object(map) => segment.as_key().and_then(|k| map.get(&k)),
        JsonValue::Array(arr) => segment.as_index().and_then(|i| arr.get(i)),
        _ => None,
    }
}

fn step_or_create<'a>(
    node: &'a mut JsonValue,
    segment: &PathSegment,
    full_path: &str,
) -> Result<&'a mut JsonValue, JsonApiError> {
    if node.is_null() {
        // Same choice as the final segment in `find_or_create`: an
        // intermediate parent auto-vivifies into whatever shape `segment`
        // addresses, not always an object.
        *node = match segment {
            PathSegment::Index(_) => JsonValue::Array(Vec::new()),
            PathSegment::Key(_) | PathSegment::Numeric(_) => JsonValue::Object(serde_json::Map::new()),
        };
    }
    match node {
        JsonValue::Object(_) => {
            let key = segment.as_key().ok_or_else(|| {
                JsonApiError::unsupported_update_operation_path(
                    full_path,
                    "cannot address an object with an array index",
                )
            })?;
            let map = node.as_object_mut().unwrap();
            Ok(map.entry(key).or_insert(JsonValue::Null))
        }
        JsonValue::Array(_) => {
            let idx = segment.as_index().ok_or_else(|| {
                JsonApiError::unsupported_update_operation_path(
                    full_path,
                    "cannot create a named property on an array",
                )
            })?;
            pad_array(node, idx);
            Ok(node.as_array_mut().unwrap().get_mut(idx).unwrap())
        }
        _ => Err(JsonApiError::unsupported_update_operation_path(
            full_path,
            "cannot create a path through a scalar value",
        )),
    }
}

/// Pad `node` (an array) with `null` up to but not including `idx`, then
/// ensure an object exists at `idx`.
fn pad_array(node: &mut JsonValue, idx: usize) {
    let arr = node.as_array_mut().expect("array node");
    while arr.len() <= idx {
        arr.push(JsonValue::Null);
    }
    if arr[idx].is_null() {
        arr[idx] = JsonValue::Object(serde_json::Map::new());
    }
}

/// The result of a non-mutating path resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathMatch<'a> {
    /// The path resolves through an object parent to `key`.
    Object { parent: &'a JsonValue, key: String },
    /// The path resolves through an array parent to `index`.
    Array { parent: &'a JsonValue, index: usize },
    /// Some segment of the path does not exist in the document.
    Missing,
}

impl<'a> PathMatch<'a> {
    /// The resolved value, if any.
    pub fn value(&self) -> Option<&'a JsonValue> {
        match self {
            PathMatch::Object { parent, key } => parent.as_object()?.get(key),
            PathMatch::Array { parent, index } => parent.as_array()?.get(*index),
            PathMatch::Missing => None,
        }
    }

    pub fn exists(&self) -> bool {
        !matches!(self, PathMatch::Missing)
    }
}

/// The result of a mutating path resolution ([`DotPath::find_or_create`]).
/// Unlike [`PathMatch`] there is no `Missing` variant — resolution either
/// succeeds (auto-vivifying as needed) or returns an error.
#[derive(Debug)]
pub enum PathMatchMut<'a> {
    Object { parent: &'a mut JsonValue, key: String },
    Array { parent: &'a mut JsonValue, index: usize },
}

impl<'a> PathMatchMut<'a> {
    pub fn get(&self) -> Option<&JsonValue> {
        match self {
            PathMatchMut::Object { parent, key } => parent.as_object()?.get(key),
            PathMatchMut::Array { parent, index } => parent.as_array()?.get(*index),
        }
    }

    pub fn set(&mut self, value: JsonValue) {
        match self {
            PathMatchMut::Object { parent, key } => {
                parent.as_object_mut().unwrap().insert(key.clone(), value);
            }
            PathMatchMut::Array { parent, index } => {
                parent.as_array_mut().unwrap()[*index] = value;
            }
        }
    }

    pub fn remove(&mut self) -> Option<JsonValue> {
        match self {
            PathMatchMut::Object { parent, key } => parent.as_object_mut().unwrap().remove(key),
            PathMatchMut::Array { parent, index } => {
                let arr = parent.as_array_mut().unwrap();
                if *index < arr.len() {
                    Some(arr.remove(*index))
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_plain_dotted_path() {
        let path = DotPath::parse("a.b.c").unwrap();
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn rejects_empty_segment() {
        assert!(DotPath::parse("a..b").is_err());
        assert!(DotPath::parse("").is_err());
        assert!(DotPath::parse(".a").is_err());
    }

    #[test]
    fn escaped_dot_stays_in_one_segment() {
        let path = DotPath::parse(r"a\.b.c").unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path.segments()[0], PathSegment::Key("a.b".to_string()));
    }

    #[test]
    fn bracket_segment_is_explicit_index() {
        let path = DotPath::parse("values.[0]").unwrap();
        assert_eq!(path.segments()[1], PathSegment::Index(0));
    }

    #[test]
    fn find_if_exists_resolves_through_object_and_array() {
        let doc = json!({"a": {"b": [1, 2, 3]}});
        let path = DotPath::parse("a.b.[1]").unwrap();
        let found = path.find_if_exists(&doc);
        assert_eq!(found.value(), Some(&json!(2)));
    }

    #[test]
    fn find_if_exists_missing_parent_segment() {
        let doc = json!({"a": {}});
        let path = DotPath::parse("a.b.c").unwrap();
        assert_eq!(path.find_if_exists(&doc), PathMatch::Missing);
    }

    #[test]
    fn find_or_create_auto_vivifies_objects() {
        let mut doc = json!({});
        let path = DotPath::parse("a.b.c").unwrap();
        let mut found = path.find_or_create(&mut doc).unwrap();
        found.set(json!(42));
        assert_eq!(doc, json!({"a": {"b": {"c": 42}}}));
    }

    #[test]
    fn find_or_create_pads_arrays_with_null() {
        let mut doc = json!({"arr": []});
        let path = DotPath::parse("arr.[2]").unwrap();
        let mut found = path.find_or_create(&mut doc).unwrap();
        found.set(json!("x"));
        assert_eq!(doc, json!({"arr": [null, null, "x"]}));
    }

    #[test]
    fn find_or_create_rejects_named_property_on_array() {
        let mut doc = json!({"arr": [1, 2]});
        let path = DotPath::parse("arr.name").unwrap();
        assert!(path.find_or_create(&mut doc).is_err());
    }

    #[test]
    fn find_or_create_auto_vivifies_array_when_final_segment_is_an_index() {
        let mut doc = json!({});
        let path = DotPath::parse("tags.[0]").unwrap();
        let mut found = path.find_or_create(&mut doc).unwrap();
        found.set(json!(1));
        assert_eq!(doc, json!({"tags": [1]}));
    }

    #[test]
    fn find_or_create_auto_vivifies_array_for_an_intermediate_index_segment() {
        let mut doc = json!({});
        let path = DotPath::parse("a.[0].b").unwrap();
        let mut found = path.find_or_create(&mut doc).unwrap();
        found.set(json!(1));
        assert_eq!(doc, json!({"a": [{"b": 1}]}));
    }

    #[test]
    fn ancestor_sorts_before_descendant() {
        let parent = DotPath::parse("a").unwrap();
        let child = DotPath::parse("a.b").unwrap();
        assert!(parent < child);
    }

    #[test]
    fn is_sub_path_of() {
        let parent = DotPath::parse("a.b").unwrap();
        let child = DotPath::parse("a.b.c").unwrap();
        assert!(child.is_sub_path_of(&parent));
        assert!(!parent.is_sub_path_of(&child));
        assert!(!parent.is_sub_path_of(&parent));
    }

    #[test]
    fn escapes_brackets_and_dots_on_render() {
        let path = DotPath::from_segments(vec![PathSegment::Key("[extra.stuff]".to_string())]);
        assert_eq!(path.to_string(), r"\[extra\.stuff\]");
    }
}

#[cfg(test)]
mod proptests {
    //! spec.md §3 Paths / §8: "sorting locators by the spec's order places
    //! every parent immediately before its first descendant."

    use super::*;
    use proptest::prelude::*;

    fn arb_key_segment() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9]{0,6}"
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..Default::default() })]

        /// A path is always strictly less than any proper descendant of
        /// itself, regardless of what the descendant's extra segments are.
        #[test]
        fn parent_sorts_before_descendant(
            prefix in proptest::collection::vec(arb_key_segment(), 1..4),
            suffix in proptest::collection::vec(arb_key_segment(), 1..4),
        ) {
            let parent = DotPath::from_segments(
                prefix.iter().cloned().map(PathSegment::Key).collect(),
            );
            let mut child_segments: Vec<PathSegment> = prefix.into_iter().map(PathSegment::Key).collect();
            child_segments.extend(suffix.into_iter().map(PathSegment::Key));
            let child = DotPath::from_segments(child_segments);

            prop_assert!(parent < child);
            prop_assert!(child.is_sub_path_of(&parent));
        }

        /// Parsing a path's own canonical render recovers an equal path —
        /// the render/parse round trip `docFieldOrder` entries rely on.
        #[test]
        fn render_then_parse_round_trips(segments in proptest::collection::vec(arb_key_segment(), 1..5)) {
            let path = DotPath::from_segments(segments.into_iter().map(PathSegment::Key).collect());
            let rendered = path.to_string();
            let reparsed = DotPath::parse(&rendered).unwrap();
            prop_assert_eq!(reparsed.to_string(), rendered);
        }
    }
}
