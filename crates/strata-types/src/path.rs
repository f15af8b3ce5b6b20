//! Normalized virtual paths.
//!
//! A [`VfsPath`] always starts with `/` and never ends with one (except the
//! root itself). Normalization only rewrites separators: `\` becomes `/` and
//! runs of separators collapse to one. Segments are stored verbatim, so
//! non-ASCII names round-trip byte for byte and there is no case folding.
//!
//! Paths map onto the flat blob key-space by dropping the leading slash:
//! `/docs/report.pdf` is stored under the key `docs/report.pdf`, and the
//! directory `/docs` is the key prefix `docs/`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A normalized, absolute path inside one virtual filesystem.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct VfsPath(String);

impl VfsPath {
    /// The root path `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Normalize `raw` into a path. Never fails.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(normalize(raw.as_ref()))
    }

    /// Build a path from a blob key (`docs/a.txt` → `/docs/a.txt`).
    pub fn from_key(key: &str) -> Self {
        Self::new(key)
    }

    /// The normalized string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for `/`.
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Path segments, root first. The root has none.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Last segment, or `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Extension of the last segment without the dot.
    ///
    /// Dot-files such as `.profile` have no extension.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name()?;
        match name.rfind('.') {
            Some(idx) if idx > 0 && idx + 1 < name.len() => Some(&name[idx + 1..]),
            _ => None,
        }
    }

    /// The containing directory, or `None` for the root.
    pub fn parent(&self) -> Option<VfsPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) | None => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
        }
    }

    /// Append `relative` beneath this path.
    ///
    /// A leading slash on `relative` does not reset to the root.
    pub fn join(&self, relative: impl AsRef<str>) -> VfsPath {
        Self::new(format!("{}/{}", self.0, relative.as_ref()))
    }

    /// Returns true if `base` is this path or one of its ancestors.
    ///
    /// Matching happens on segment boundaries: `/foo2` does not start with `/foo`.
    pub fn starts_with(&self, base: &VfsPath) -> bool {
        if base.is_root() || self.0 == base.0 {
            return true;
        }
        self.0.len() > base.0.len()
            && self.0.starts_with(&base.0)
            && self.0.as_bytes()[base.0.len()] == b'/'
    }

    /// This path relative to `base`, as an absolute path rooted at `/`.
    ///
    /// `/mnt/data/a.txt` stripped of `/mnt` is `/data/a.txt`; stripping a
    /// path of itself yields the root.
    pub fn strip_prefix(&self, base: &VfsPath) -> Option<VfsPath> {
        if !self.starts_with(base) {
            return None;
        }
        if base.is_root() {
            return Some(self.clone());
        }
        Some(Self::new(&self.0[base.0.len()..]))
    }

    /// Move this path from under `from` to the same relative place under `to`.
    pub fn rebase(&self, from: &VfsPath, to: &VfsPath) -> Option<VfsPath> {
        let relative = self.strip_prefix(from)?;
        if relative.is_root() {
            return Some(to.clone());
        }
        Some(to.join(relative.as_str()))
    }

    /// Blob key for this path. The root maps to the empty key.
    pub fn to_key(&self) -> String {
        self.0[1..].to_string()
    }

    /// Key prefix that selects everything beneath this path as a directory.
    pub fn to_prefix(&self) -> String {
        if self.is_root() {
            String::new()
        } else {
            format!("{}/", &self.0[1..])
        }
    }
}

fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 1);
    for segment in raw.split(['/', '\\']).filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

impl Default for VfsPath {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VfsPath({})", self.0)
    }
}

impl AsRef<str> for VfsPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VfsPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for VfsPath {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&String> for VfsPath {
    fn from(s: &String) -> Self {
        Self::new(s)
    }
}

impl From<&VfsPath> for VfsPath {
    fn from(p: &VfsPath) -> Self {
        p.clone()
    }
}

impl From<VfsPath> for String {
    fn from(p: VfsPath) -> String {
        p.0
    }
}

impl FromStr for VfsPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        assert_eq!(VfsPath::new("").as_str(), "/");
        assert_eq!(VfsPath::new("/").as_str(), "/");
        assert_eq!(VfsPath::new("docs").as_str(), "/docs");
        assert_eq!(VfsPath::new("/docs/").as_str(), "/docs");
        assert_eq!(VfsPath::new("//docs///a.txt").as_str(), "/docs/a.txt");
        assert_eq!(VfsPath::new("\\docs\\sub\\a.txt").as_str(), "/docs/sub/a.txt");
    }

    #[test]
    fn test_equality_is_post_normalization() {
        assert_eq!(VfsPath::new("a/b"), VfsPath::new("/a//b/"));
        assert_ne!(VfsPath::new("/A/b"), VfsPath::new("/a/b"));
    }

    #[test]
    fn test_unicode_segments_round_trip() {
        for raw in [
            "/Документы/отчёт.txt",
            "/文件夹/数据.csv",
            "/폴더/파일.md",
            "/📁/🎉 party.png",
        ] {
            let path = VfsPath::new(raw);
            assert_eq!(path.as_str(), raw);
            assert_eq!(VfsPath::from_key(&path.to_key()), path);
        }
        assert_eq!(VfsPath::new("/폴더/파일.md").file_name(), Some("파일.md"));
    }

    #[test]
    fn test_file_name_and_parent() {
        let path = VfsPath::new("/docs/sub/report.pdf");
        assert_eq!(path.file_name(), Some("report.pdf"));
        assert_eq!(path.extension(), Some("pdf"));
        assert_eq!(path.parent(), Some(VfsPath::new("/docs/sub")));
        assert_eq!(VfsPath::new("/top").parent(), Some(VfsPath::root()));
        assert_eq!(VfsPath::root().parent(), None);
        assert_eq!(VfsPath::root().file_name(), None);
        assert_eq!(VfsPath::new("/.profile").extension(), None);
        assert_eq!(VfsPath::new("/archive.").extension(), None);
    }

    #[test]
    fn test_join() {
        let base = VfsPath::new("/docs");
        assert_eq!(base.join("a.txt").as_str(), "/docs/a.txt");
        assert_eq!(base.join("/nested/b.txt").as_str(), "/docs/nested/b.txt");
        assert_eq!(VfsPath::root().join("x").as_str(), "/x");
    }

    #[test]
    fn test_starts_with_segment_boundary() {
        let foo = VfsPath::new("/foo");
        assert!(VfsPath::new("/foo").starts_with(&foo));
        assert!(VfsPath::new("/foo/bar").starts_with(&foo));
        assert!(!VfsPath::new("/foo2").starts_with(&foo));
        assert!(!VfsPath::new("/fo").starts_with(&foo));
        assert!(VfsPath::new("/anything").starts_with(&VfsPath::root()));
    }

    #[test]
    fn test_strip_prefix_and_rebase() {
        let mount = VfsPath::new("/mnt");
        let path = VfsPath::new("/mnt/data/a.txt");
        assert_eq!(path.strip_prefix(&mount), Some(VfsPath::new("/data/a.txt")));
        assert_eq!(mount.strip_prefix(&mount), Some(VfsPath::root()));
        assert_eq!(VfsPath::new("/other").strip_prefix(&mount), None);

        let moved = path.rebase(&VfsPath::new("/mnt/data"), &VfsPath::new("/backup"));
        assert_eq!(moved, Some(VfsPath::new("/backup/a.txt")));
    }

    #[test]
    fn test_keys_and_prefixes() {
        let path = VfsPath::new("/docs/a.txt");
        assert_eq!(path.to_key(), "docs/a.txt");
        assert_eq!(VfsPath::new("/docs").to_prefix(), "docs/");
        assert_eq!(VfsPath::root().to_key(), "");
        assert_eq!(VfsPath::root().to_prefix(), "");
    }

    #[test]
    fn test_serde_as_string() {
        let path = VfsPath::new("/a/b");
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"/a/b\"");
        let back: VfsPath = serde_json::from_str("\"a\\\\b/\"").unwrap();
        assert_eq!(back.as_str(), "/a/b");
    }
}
