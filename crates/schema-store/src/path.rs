//! Paths into the state tree and into the live object graph.
//!
//! A path is a sequence of segments, each either an object key or an array
//! index. The same type is used for store paths (where data lives), instance
//! paths (how the object graph reached it) and type monikers (where a type
//! was declared in the schema).

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of a path: an object key or an array index.
///
/// Keys made of digits address array slots too; see [`Seg::as_index`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seg {
    Key(String),
    Index(usize),
}

impl Seg {
    pub fn key(k: impl Into<String>) -> Self {
        Seg::Key(k.into())
    }

    pub fn as_key(&self) -> Option<&str> {
        if let Seg::Key(k) = self {
            Some(k)
        } else {
            None
        }
    }

    /// The array slot this segment addresses, if any. `"3"` and `3` are the
    /// same slot; `"-1"` and `"03x"` are not slots.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Seg::Index(i) => Some(*i),
            Seg::Key(k) if !k.is_empty() && k.bytes().all(|b| b.is_ascii_digit()) => k.parse().ok(),
            Seg::Key(_) => None,
        }
    }

    /// Object-key spelling of the segment.
    pub fn to_key(&self) -> String {
        match self {
            Seg::Key(k) => k.clone(),
            Seg::Index(i) => i.to_string(),
        }
    }

    pub(crate) fn for_array(&self) -> Option<Seg> {
        self.as_index().map(Seg::Index)
    }

    pub(crate) fn for_object(&self) -> Seg {
        Seg::Key(self.to_key())
    }
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

impl fmt::Display for Seg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seg::Index(i) => write!(f, "[{}]", i),
            Seg::Key(k) if is_identifier(k) => write!(f, ".{}", k),
            Seg::Key(k) if self.as_index().is_some() => write!(f, "[{}]", k),
            Seg::Key(k) => write!(f, "[{:?}]", k),
        }
    }
}

impl From<String> for Seg {
    fn from(s: String) -> Self {
        Seg::Key(s)
    }
}

impl From<&str> for Seg {
    fn from(s: &str) -> Self {
        Seg::key(s)
    }
}

impl From<&String> for Seg {
    fn from(s: &String) -> Self {
        Seg::key(s.as_str())
    }
}

impl From<usize> for Seg {
    fn from(i: usize) -> Self {
        Seg::Index(i)
    }
}

/// Segments from the root of a tree down to one node.
///
/// Dereferences to `[Seg]`, so slice methods such as `len`, `last` and
/// `split_first` work directly.
///
/// ```
/// use schema_store::Path;
///
/// let path = Path::root().key("todos").index(0).key("text");
/// assert_eq!(path.len(), 3);
/// assert_eq!(path.to_string(), "todos[0].text");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<Seg>);

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<Seg>) -> Self {
        Self(segments)
    }

    /// Builder form of [`push`](Self::push) for a key.
    #[must_use]
    pub fn key(self, k: impl Into<String>) -> Self {
        self.with_segment(Seg::Key(k.into()))
    }

    /// Builder form of [`push`](Self::push) for an index.
    #[must_use]
    pub fn index(self, i: usize) -> Self {
        self.with_segment(Seg::Index(i))
    }

    pub fn push(&mut self, seg: Seg) {
        self.0.push(seg);
    }

    pub fn pop(&mut self) -> Option<Seg> {
        self.0.pop()
    }

    pub fn segments(&self) -> &[Seg] {
        &self.0
    }

    /// This path followed by `tail`.
    pub fn join(&self, tail: &[Seg]) -> Path {
        self.iter().chain(tail).cloned().collect()
    }

    /// This path with one more segment.
    pub fn with_segment(&self, seg: impl Into<Seg>) -> Path {
        let mut out = Vec::with_capacity(self.0.len() + 1);
        out.extend_from_slice(&self.0);
        out.push(seg.into());
        Path(out)
    }

    /// Everything but the last segment; `None` at the root.
    pub fn parent(&self) -> Option<Path> {
        self.0
            .split_last()
            .map(|(_, init)| Path(init.to_vec()))
    }
}

impl std::ops::Deref for Path {
    type Target = [Seg];

    fn deref(&self) -> &[Seg] {
        &self.0
    }
}

/// Renders `todos.abc[0]`-style paths; the root renders as the empty string.
impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut segs = self.0.iter();
        if let Some(first) = segs.next() {
            match first {
                Seg::Key(k) if is_identifier(k) => f.write_str(k)?,
                other => write!(f, "{}", other)?,
            }
        }
        segs.try_for_each(|seg| write!(f, "{}", seg))
    }
}

impl FromIterator<Seg> for Path {
    fn from_iter<I: IntoIterator<Item = Seg>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Seg;
    type IntoIter = std::slice::Iter<'a, Seg>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Build a [`Path`] from keys and indices.
///
/// ```
/// use schema_store::{path, Seg};
///
/// let p = path!("items", 0, "name");
/// assert_eq!(p[1], Seg::Index(0));
/// assert!(path!().is_empty());
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($seg:expr),+ $(,)?) => {
        $crate::Path::from_segments(vec![$($crate::Seg::from($seg)),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_macro_agree() {
        let built = Path::root().key("users").index(0).key("name");
        assert_eq!(built, path!("users", 0, "name"));
        assert_eq!(built.last(), Some(&Seg::key("name")));
        assert_eq!(built.join(&[Seg::Index(2)]), path!("users", 0, "name", 2));
    }

    #[test]
    fn test_display_uses_js_accessors() {
        assert_eq!(path!("users", 0, "name").to_string(), "users[0].name");
        assert_eq!(path!("todos", "abc", "text").to_string(), "todos.abc.text");
        assert_eq!(path!("a", "two words").to_string(), "a[\"two words\"]");
        assert_eq!(path!("list", "3").to_string(), "list[3]");
        assert_eq!(path!("7x").to_string(), "[\"7x\"]");
        assert_eq!(Path::root().to_string(), "");
    }

    #[test]
    fn test_digit_keys_are_indices() {
        assert_eq!(Seg::key("3").as_index(), Some(3));
        assert_eq!(Seg::key("-1").as_index(), None);
        assert_eq!(Seg::key("x").as_index(), None);
        assert_eq!(Seg::Index(2).for_object(), Seg::key("2"));
        assert_eq!(Seg::key("4").for_array(), Some(Seg::Index(4)));
    }

    #[test]
    fn test_parent() {
        assert_eq!(path!("a", "b").parent(), Some(path!("a")));
        assert_eq!(path!("a").parent(), Some(Path::root()));
        assert!(Path::root().parent().is_none());
    }

    #[test]
    fn test_serializes_as_plain_array() {
        let path = path!("users", 0);
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, r#"["users",0]"#);
        assert_eq!(serde_json::from_str::<Path>(&json).unwrap(), path);
    }
}
