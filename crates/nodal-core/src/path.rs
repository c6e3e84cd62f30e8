//! Hierarchical object paths.
//!
//! A [`Path`] is an absolute, `/`-separated sequence of [`Symbol`]s, e.g.
//! `/main/osc1/freq`. The root graph is `/`.
//!
//! # Ordering
//!
//! Paths order by lexicographic comparison of their *segments*, not of their
//! raw strings. The difference matters for prefix contiguity: with segment
//! ordering every descendant of `/a` sorts strictly between `/a` and the next
//! sibling of `/a`, whatever characters the sibling names contain. The
//! [`Store`](crate::Store) relies on this to find a whole subtree with a single
//! ordered range scan.

use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Segment separator.
pub const SEPARATOR: char = '/';

/// Errors produced when parsing paths and symbols.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path does not start with `/`.
    #[error("path '{0}' is not absolute")]
    NotAbsolute(String),

    /// A segment is not a valid symbol (empty, bad first character, ...).
    #[error("invalid symbol '{segment}' in path '{input}'")]
    InvalidSymbol {
        /// The full input that failed to parse.
        input: String,
        /// The offending segment.
        segment: String,
    },
}

/// A single path segment: `[A-Za-z_][A-Za-z0-9_]*`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parses a symbol, rejecting anything outside the symbol alphabet.
    pub fn new(s: impl Into<String>) -> Result<Self, PathError> {
        let s = s.into();
        if Self::is_valid(&s) {
            Ok(Self(s))
        } else {
            Err(PathError::InvalidSymbol {
                input: s.clone(),
                segment: s,
            })
        }
    }

    /// Returns `true` if `s` is a valid symbol.
    pub fn is_valid(s: &str) -> bool {
        let mut chars = s.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    /// Returns the symbol text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `self` with a decimal suffix, or `self` unchanged for `0`.
    ///
    /// Digits are always valid after the first character, so this cannot fail.
    pub fn with_suffix(&self, n: u32) -> Symbol {
        if n == 0 {
            self.clone()
        } else {
            Self(format!("{}{n}", self.0))
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Symbol {
    type Error = PathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Symbol> for String {
    fn from(s: Symbol) -> Self {
        s.0
    }
}

/// An absolute, validated object path.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path(String);

impl Path {
    /// The root path `/`.
    pub fn root() -> Self {
        Self(SEPARATOR.to_string())
    }

    /// Parses and validates a path.
    ///
    /// # Errors
    ///
    /// [`PathError::NotAbsolute`] if `s` does not start with `/`, and
    /// [`PathError::InvalidSymbol`] for empty segments (`//`, trailing `/`) or
    /// segments outside the symbol alphabet.
    pub fn new(s: impl Into<String>) -> Result<Self, PathError> {
        let s = s.into();
        if !s.starts_with(SEPARATOR) {
            return Err(PathError::NotAbsolute(s));
        }
        if s.len() == 1 {
            return Ok(Self(s));
        }
        if let Some(bad) = s[1..].split(SEPARATOR).find(|seg| !Symbol::is_valid(seg)) {
            return Err(PathError::InvalidSymbol {
                segment: bad.to_string(),
                input: s,
            });
        }
        Ok(Self(s))
    }

    /// Returns the path text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// Iterates over the path's segments. The root has none.
    pub fn segments(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.split(SEPARATOR).filter(|seg| !seg.is_empty())
    }

    /// Number of segments (0 for the root).
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// The last segment, or `""` for the root.
    pub fn symbol(&self) -> &str {
        self.0.rsplit(SEPARATOR).next().unwrap_or("")
    }

    /// The parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Path> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind(SEPARATOR) {
            Some(0) | None => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
        }
    }

    /// Appends a child symbol.
    pub fn child(&self, symbol: &Symbol) -> Path {
        if self.is_root() {
            Self(format!("{SEPARATOR}{symbol}"))
        } else {
            Self(format!("{}{SEPARATOR}{symbol}", self.0))
        }
    }

    /// Appends a child symbol given as text, validating it.
    pub fn child_str(&self, symbol: &str) -> Result<Path, PathError> {
        Ok(self.child(&Symbol::new(symbol)?))
    }

    /// Whether `self` lies strictly below `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &Path) -> bool {
        if ancestor.is_root() {
            return !self.is_root();
        }
        self.0.len() > ancestor.0.len()
            && self.0.starts_with(ancestor.as_str())
            && self.0.as_bytes()[ancestor.0.len()] == SEPARATOR as u8
    }

    /// Whether `self` is an immediate child of `parent`.
    pub fn is_child_of(&self, parent: &Path) -> bool {
        self.parent().as_ref() == Some(parent)
    }

    /// Replaces the `old_prefix` part of this path with `new_prefix`.
    ///
    /// Returns `None` if `self` is neither `old_prefix` nor below it.
    pub fn rebase(&self, old_prefix: &Path, new_prefix: &Path) -> Option<Path> {
        if self == old_prefix {
            return Some(new_prefix.clone());
        }
        if !self.is_descendant_of(old_prefix) {
            return None;
        }
        let rest = if old_prefix.is_root() {
            &self.0[1..]
        } else {
            &self.0[old_prefix.0.len() + 1..]
        };
        if new_prefix.is_root() {
            Some(Self(format!("{SEPARATOR}{rest}")))
        } else {
            Some(Self(format!("{}{SEPARATOR}{rest}", new_prefix.0)))
        }
    }

    /// The deepest path that is `self` or an ancestor of `self`, and also
    /// `other` or an ancestor of `other`.
    pub fn common_ancestor(&self, other: &Path) -> Path {
        let mut out = Self::root();
        for (a, b) in self.segments().zip(other.segments()) {
            if a != b {
                break;
            }
            out = Self(if out.is_root() {
                format!("{SEPARATOR}{a}")
            } else {
                format!("{}{SEPARATOR}{a}", out.0)
            });
        }
        out
    }
}

impl Ord for Path {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments().cmp(other.segments())
    }
}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({})", self.0)
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Path {
    type Error = PathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<&str> for Path {
    type Error = PathError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Path> for String {
    fn from(p: Path) -> Self {
        p.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Path {
        Path::new(s).unwrap()
    }

    #[test]
    fn parses_root_and_nested() {
        assert!(p("/").is_root());
        assert_eq!(p("/main/osc").depth(), 2);
        assert_eq!(p("/main/osc").symbol(), "osc");
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!(Path::new("main"), Err(PathError::NotAbsolute(_))));
        assert!(matches!(Path::new("/a//b"), Err(PathError::InvalidSymbol { .. })));
        assert!(matches!(Path::new("/a/"), Err(PathError::InvalidSymbol { .. })));
        assert!(matches!(Path::new("/1a"), Err(PathError::InvalidSymbol { .. })));
        assert!(matches!(Path::new("/a-b"), Err(PathError::InvalidSymbol { .. })));
    }

    #[test]
    fn parent_and_child() {
        assert_eq!(p("/a/b").parent(), Some(p("/a")));
        assert_eq!(p("/a").parent(), Some(Path::root()));
        assert_eq!(Path::root().parent(), None);
        assert_eq!(Path::root().child_str("a").unwrap(), p("/a"));
        assert_eq!(p("/a").child_str("b").unwrap(), p("/a/b"));
        assert!(p("/a").child_str("b c").is_err());
    }

    #[test]
    fn descendant_checks_respect_segment_boundaries() {
        assert!(p("/a/b").is_descendant_of(&p("/a")));
        assert!(p("/a/b/c").is_descendant_of(&p("/a")));
        assert!(!p("/ab").is_descendant_of(&p("/a")));
        assert!(!p("/a").is_descendant_of(&p("/a")));
        assert!(p("/a").is_descendant_of(&Path::root()));
        assert!(p("/a/b").is_child_of(&p("/a")));
        assert!(!p("/a/b/c").is_child_of(&p("/a")));
    }

    #[test]
    fn segment_order_keeps_subtrees_contiguous() {
        let mut paths = vec![p("/a_b"), p("/a/z"), p("/a"), p("/b"), p("/a/b/c"), p("/a0")];
        paths.sort();
        let strs: Vec<&str> = paths.iter().map(Path::as_str).collect();
        assert_eq!(strs, ["/a", "/a/b/c", "/a/z", "/a0", "/a_b", "/b"]);
    }

    #[test]
    fn rebase_moves_prefix() {
        assert_eq!(p("/a/x/y").rebase(&p("/a"), &p("/b")), Some(p("/b/x/y")));
        assert_eq!(p("/a").rebase(&p("/a"), &p("/q/r")), Some(p("/q/r")));
        assert_eq!(p("/ab").rebase(&p("/a"), &p("/b")), None);
        assert_eq!(p("/x").rebase(&Path::root(), &p("/g")), Some(p("/g/x")));
    }

    #[test]
    fn common_ancestor_of_siblings() {
        assert_eq!(p("/g/a/out").common_ancestor(&p("/g/b/in")), p("/g"));
        assert_eq!(p("/a").common_ancestor(&p("/b")), Path::root());
        assert_eq!(p("/a/b").common_ancestor(&p("/a/b")), p("/a/b"));
    }

    #[test]
    fn try_from_string_validates() {
        assert_eq!(Path::try_from("/a/b".to_string()).unwrap(), p("/a/b"));
        assert!(Path::try_from("a/b".to_string()).is_err());
        assert!(Symbol::try_from("osc".to_string()).is_ok());
        assert!(Symbol::try_from("9osc".to_string()).is_err());
    }
}
