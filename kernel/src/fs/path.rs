//! Path values for the VFS
//!
//! A [`VfsPath`] is an immutable sequence of non-empty name segments plus a
//! flag telling whether the path is anchored at the global root. Segments
//! never contain `/`; a rooted path with zero segments is the global root
//! itself. Paths are built per call and discarded on return — they carry no
//! filesystem state.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

/// An absolute or relative path, split into its name segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsPath {
    rooted: bool,
    segments: Vec<String>,
}

impl VfsPath {
    /// Parse a path string.
    ///
    /// The result is rooted iff the string starts with `/`. Empty segments
    /// (from doubled or trailing slashes) are discarded, so `"/sys/"`,
    /// `"/sys"` and `"//sys"` all parse to the same path.
    pub fn parse(path: &str) -> Self {
        Self {
            rooted: path.starts_with('/'),
            segments: split_segments(path),
        }
    }

    /// Build an absolute path from a working directory and a relative string.
    ///
    /// The base is expected to be rooted (it comes from the scheduler); the
    /// relative string's segments are appended to it.
    pub fn from_base(base: &VfsPath, relative: &str) -> Self {
        let mut segments = base.segments.clone();
        segments.extend(split_segments(relative));
        Self {
            rooted: base.rooted,
            segments,
        }
    }

    /// The global root: rooted, zero segments.
    pub fn root() -> Self {
        Self {
            rooted: true,
            segments: Vec::new(),
        }
    }

    /// True for a rooted path with no segments.
    pub fn is_root(&self) -> bool {
        self.rooted && self.segments.is_empty()
    }

    /// True when the path has no segments, rooted or not.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_rooted(&self) -> bool {
        self.rooted
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn segment(&self, index: usize) -> Option<&str> {
        self.segments.get(index).map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    /// The final segment, if any.
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Everything but the final segment. The empty path is its own parent.
    pub fn parent(&self) -> VfsPath {
        let end = self.segments.len().saturating_sub(1);
        Self {
            rooted: self.rooted,
            segments: self.segments[..end].to_vec(),
        }
    }

    /// The suffix after dropping the first `count` segments.
    ///
    /// Rootedness is preserved: a sub-path of a rooted path is rooted, so
    /// the empty sub-path of a mount's own path denotes that mount's root
    /// directory. Dropping more segments than exist yields the empty path.
    pub fn sub_path(&self, count: usize) -> VfsPath {
        let start = count.min(self.segments.len());
        Self {
            rooted: self.rooted,
            segments: self.segments[start..].to_vec(),
        }
    }

    /// Canonical directory form: `/` for the root, otherwise the segments
    /// joined with a leading and a trailing slash (`/a/b/`).
    ///
    /// This is the form the mount table stores for non-root mount points,
    /// and duplicate-mount detection compares it bit-exactly.
    pub fn to_dir_string(&self) -> String {
        let mut out = String::from("/");
        for segment in &self.segments {
            out.push_str(segment);
            out.push('/');
        }
        out
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str(if self.rooted { "/" } else { "" });
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 || self.rooted {
                f.write_str("/")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

fn split_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
