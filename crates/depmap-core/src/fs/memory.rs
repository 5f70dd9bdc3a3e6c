//! In-memory [`PackageFs`] for deterministic walk tests.

use super::PackageFs;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

const MAX_SYMLINK_HOPS: usize = 40;

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(String),
    Symlink(PathBuf),
}

/// A tree of directories, files and symlinks keyed by absolute path.
///
/// Every operation is recorded as `"<op>: <path>"` so tests can assert on
/// how many filesystem calls a walk issued.
#[derive(Debug)]
pub struct MemoryFs {
    nodes: BTreeMap<PathBuf, Node>,
    failures: Mutex<BTreeMap<PathBuf, io::ErrorKind>>,
    log: Mutex<Vec<String>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(PathBuf::from("/"), Node::Dir);
        Self {
            nodes,
            failures: Mutex::new(BTreeMap::new()),
            log: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory (and its parents).
    pub fn dir(mut self, path: &str) -> Self {
        self.insert(PathBuf::from(path), Node::Dir);
        self
    }

    /// Add a file (and its parent directories).
    pub fn file(mut self, path: &str, content: &str) -> Self {
        self.insert(PathBuf::from(path), Node::File(content.to_string()));
        self
    }

    /// Add a symlink at `path` pointing at the absolute `target`.
    pub fn symlink(mut self, path: &str, target: &str) -> Self {
        self.insert(PathBuf::from(path), Node::Symlink(PathBuf::from(target)));
        self
    }

    /// Make every operation on exactly `path` fail with `kind`.
    pub fn fail(self, path: &str, kind: io::ErrorKind) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), kind);
        self
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        let prefix = format!("{op}: ");
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|line| line.starts_with(&prefix))
            .count()
    }

    fn insert(&mut self, path: PathBuf, node: Node) {
        let mut parent = path.parent();
        while let Some(dir) = parent {
            self.nodes.entry(dir.to_path_buf()).or_insert(Node::Dir);
            parent = dir.parent();
        }
        self.nodes.insert(path, node);
    }

    fn record(&self, op: &str, path: &Path) -> io::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{op}: {}", path.display()));
        match self.failures.lock().unwrap().get(path) {
            Some(kind) => Err(io::Error::from(*kind)),
            None => Ok(()),
        }
    }

    /// Resolve symlinks in every component of `path`.
    fn resolve(&self, path: &Path, hops: usize) -> io::Result<PathBuf> {
        if hops > MAX_SYMLINK_HOPS {
            return Err(io::Error::new(io::ErrorKind::Other, "too many symlinks"));
        }
        let mut resolved = PathBuf::from("/");
        for component in path.components() {
            let Component::Normal(part) = component else {
                continue;
            };
            match self.nodes.get(&resolved) {
                Some(Node::Dir) => {}
                Some(Node::File(_)) => return Err(io::Error::from(io::ErrorKind::NotADirectory)),
                Some(Node::Symlink(_)) | None => {
                    return Err(io::Error::from(io::ErrorKind::NotFound));
                }
            }
            resolved.push(part);
            if let Some(Node::Symlink(target)) = self.nodes.get(&resolved) {
                resolved = self.resolve(target, hops + 1)?;
            }
        }
        if self.nodes.contains_key(&resolved) {
            Ok(resolved)
        } else {
            Err(io::Error::from(io::ErrorKind::NotFound))
        }
    }

    fn list(&self, path: &Path) -> io::Result<Vec<OsString>> {
        self.record("read_dir", path)?;
        let real = self.resolve(path, 0)?;
        match self.nodes.get(&real) {
            Some(Node::Dir) => Ok(self
                .nodes
                .keys()
                .filter(|candidate| candidate.parent() == Some(real.as_path()))
                .filter_map(|candidate| candidate.file_name().map(OsString::from))
                .collect()),
            _ => Err(io::Error::from(io::ErrorKind::NotADirectory)),
        }
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        self.record("read_file", path)?;
        let real = self.resolve(path, 0)?;
        match self.nodes.get(&real) {
            Some(Node::File(content)) => Ok(content.clone()),
            _ => Err(io::Error::from(io::ErrorKind::IsADirectory)),
        }
    }

    fn realpath(&self, path: &Path) -> io::Result<PathBuf> {
        self.record("realpath", path)?;
        self.resolve(path, 0)
    }
}

impl PackageFs for MemoryFs {
    fn read_dir(&self, path: &Path) -> impl Future<Output = io::Result<Vec<OsString>>> + Send {
        let result = self.list(path);
        async move {
            tokio::task::yield_now().await;
            result
        }
    }

    fn read_to_string(&self, path: &Path) -> impl Future<Output = io::Result<String>> + Send {
        let result = self.read(path);
        async move {
            tokio::task::yield_now().await;
            result
        }
    }

    fn canonicalize(&self, path: &Path) -> impl Future<Output = io::Result<PathBuf>> + Send {
        let result = self.realpath(path);
        async move {
            tokio::task::yield_now().await;
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_symlink_resolution() {
        let fs = MemoryFs::new()
            .file("/foo/bing/package.json", "{}")
            .symlink("/foo/bar/node_modules/link", "/foo/bing");

        let real = fs
            .canonicalize(Path::new("/foo/bar/node_modules/link"))
            .await
            .unwrap();
        assert_eq!(real, PathBuf::from("/foo/bing"));

        let content = fs
            .read_to_string(Path::new("/foo/bar/node_modules/link/package.json"))
            .await
            .unwrap();
        assert_eq!(content, "{}");
    }

    #[tokio::test]
    async fn test_missing_and_wrong_kind() {
        let fs = MemoryFs::new().file("/a/file.txt", "x");

        let err = fs.read_dir(Path::new("/a/missing")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        let err = fs
            .read_dir(Path::new("/a/file.txt/node_modules"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotADirectory);

        let err = fs.read_to_string(Path::new("/a")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::IsADirectory);
    }

    #[tokio::test]
    async fn test_failures_and_log() {
        let fs = MemoryFs::new()
            .dir("/a")
            .fail("/a", io::ErrorKind::PermissionDenied);

        let err = fs.read_dir(Path::new("/a")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(fs.log(), vec!["read_dir: /a".to_string()]);

        fs.clear_failures();
        assert!(fs.read_dir(Path::new("/a")).await.unwrap().is_empty());
        assert_eq!(fs.count("read_dir"), 2);
    }
}
