//! Lexical path helpers.
//!
//! None of these functions touch the filesystem: symlinks are never resolved
//! and `..` is folded textually.

use std::path::{Component, Path, PathBuf};

/// Render a relative path with `/` separators regardless of platform.
///
/// Backslashes inside a component are treated as separators as well, so a
/// path recorded with Windows separators normalizes to the same string as
/// its posix spelling.
#[must_use]
pub fn to_posix(path: &Path) -> String {
    let mut segments: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_string_lossy();
                segments.extend(
                    part.split('\\')
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                );
            }
            Component::ParentDir => segments.push("..".to_string()),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    segments.join("/")
}

/// Number of segments in a `/`-separated relative path.
///
/// The empty path has depth zero.
#[must_use]
pub fn posix_depth(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

/// Number of components in a path, counting the root.
///
/// Used to compare how far an ancestor directory sits from the filesystem root.
#[must_use]
pub fn component_depth(path: &Path) -> usize {
    path.components().count()
}

/// Join a manifest-relative target (`./dist/index.js`, `lib/main`) onto `base`.
///
/// Both `/` and `\` split segments, `.` segments are dropped and `..` pops the
/// previous segment without escaping above `base`'s root.
#[must_use]
pub fn join_lexical(base: &Path, target: &str) -> PathBuf {
    let mut joined = base.to_path_buf();
    for segment in target.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                joined.pop();
            }
            other => joined.push(other),
        }
    }
    joined
}

/// Strip a leading `./` from an export key.
#[must_use]
pub fn strip_dot_slash(key: &str) -> &str {
    key.strip_prefix("./").unwrap_or(key)
}
