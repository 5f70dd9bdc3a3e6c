//! Package export resolution.
//!
//! Produces the flat table of importable subpaths of a package: every
//! `exports` entry of the root manifest plus those of manifests in nested
//! directories (a `lib/package.json` contributes `lib/...` subpaths). Packages
//! without `exports` fall back to `module`, a string `browser`, `main`, and
//! finally `./index.js`. `package.json` itself is always exported.

mod target;

pub use target::ExportTarget;

use crate::error::{Error, Result};
use crate::fs::{absent_as_none, PackageFs, TokioFs};
use crate::manifest::{self, Manifest, NODE_MODULES, PACKAGE_JSON};
use crate::scheduler::{Scheduler, Step, Unit, DEFAULT_MAX_PARALLEL_TASKS};
use depmap_util::path::{join_lexical, strip_dot_slash};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use target::select_logged;
use tracing::{debug, trace};

/// Directory entries never scanned for nested manifests.
pub const IGNORED_ENTRIES: &[&str] = &[NODE_MODULES, "CVS", "config.gypi", "npm-debug.log"];

const ROOT_KEY: &str = ".";
const PACKAGE_JSON_KEY: &str = "./package.json";
const DEFAULT_ENTRY: &str = "./index.js";

/// One importable subpath.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedExport {
    /// Subpath without a leading `./`; empty for the package root.
    pub export_name: String,
    /// Absolute path of the file the subpath maps to.
    pub resolved_path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Condition names to accept, highest priority first.
    pub allowed_condition_keys: Vec<String>,
    /// Used instead of the root manifest's entry fields; disables nested
    /// manifest scanning.
    pub override_export_map: Option<Map<String, Value>>,
}

impl ExportOptions {
    #[must_use]
    pub fn new(allowed_condition_keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed_condition_keys: allowed_condition_keys.into_iter().map(Into::into).collect(),
            override_export_map: None,
        }
    }

    #[must_use]
    pub fn with_override(mut self, override_export_map: Map<String, Value>) -> Self {
        self.override_export_map = Some(override_export_map);
        self
    }
}

/// Where a manifest's exports come from.
#[derive(Debug)]
enum EntrySource<'a> {
    Declared(&'a Map<String, Value>),
    Single(&'a str),
}

impl<'a> EntrySource<'a> {
    fn pick(manifest: &'a Manifest, manifest_path: &Path) -> Result<Self> {
        match manifest.get("exports") {
            Some(Value::Object(map)) => return Ok(Self::Declared(map)),
            Some(Value::Null) | None => {}
            Some(_) => {
                return Err(Error::ExportsNotObject {
                    manifest: manifest_path.to_path_buf(),
                })
            }
        }
        if let Some(entry) = entry_field(manifest, manifest_path, "module")? {
            return Ok(Self::Single(entry));
        }
        // An object `browser` is a replacement map, not an entry point.
        if let Some(entry) = manifest.non_empty_str("browser") {
            return Ok(Self::Single(entry));
        }
        if let Some(entry) = entry_field(manifest, manifest_path, "main")? {
            return Ok(Self::Single(entry));
        }
        Ok(Self::Single(DEFAULT_ENTRY))
    }
}

fn entry_field<'a>(
    manifest: &'a Manifest,
    manifest_path: &Path,
    field: &'static str,
) -> Result<Option<&'a str>> {
    match manifest.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(entry)) => Ok(Some(entry.as_str()).filter(|entry| !entry.is_empty())),
        Some(_) => Err(Error::InvalidEntryField {
            manifest: manifest_path.to_path_buf(),
            field,
        }),
    }
}

/// The subpath a key maps to under a directory prefix.
fn export_name(parts: &[String], key: &str) -> String {
    if key == ROOT_KEY {
        return parts.join("/");
    }
    let subpath = strip_dot_slash(key);
    if parts.is_empty() {
        subpath.to_string()
    } else {
        format!("{}/{subpath}", parts.join("/"))
    }
}

/// Normalize the exports of one manifest.
fn collect_exports(
    source: EntrySource<'_>,
    manifest_path: &Path,
    real_dir: &Path,
    parts: &[String],
    conditions: &[String],
) -> Result<Vec<NormalizedExport>> {
    let export = |key: &str, target: &str| NormalizedExport {
        export_name: export_name(parts, key),
        resolved_path: join_lexical(real_dir, target),
    };

    let map = match source {
        EntrySource::Single(entry) => {
            return Ok(vec![
                export(ROOT_KEY, entry),
                export(PACKAGE_JSON_KEY, PACKAGE_JSON_KEY),
            ]);
        }
        EntrySource::Declared(map) => map,
    };

    let mut exports = Vec::with_capacity(map.len() + 1);
    for (key, value) in map {
        if key != ROOT_KEY && !key.starts_with("./") {
            return Err(Error::InvalidExportKey {
                manifest: manifest_path.to_path_buf(),
                key: key.clone(),
            });
        }
        let target = ExportTarget::from_value(value).ok_or_else(|| Error::InvalidExportTarget {
            manifest: manifest_path.to_path_buf(),
            key: key.clone(),
        })?;
        if key == "./" {
            trace!(manifest = %manifest_path.display(), "Skipping \"./\" export key");
            continue;
        }
        if key.contains('*') {
            debug!(manifest = %manifest_path.display(), key = key.as_str(), "Skipping wildcard export");
            continue;
        }
        if let Some(path) = select_logged(&target, key, conditions) {
            exports.push(export(key.as_str(), path));
        }
    }
    // A declared `./package.json` that is excluded or matches no condition
    // still leaves the manifest itself exported.
    let manifest_export = export_name(parts, PACKAGE_JSON_KEY);
    if !exports.iter().any(|e| e.export_name == manifest_export) {
        exports.push(export(PACKAGE_JSON_KEY, PACKAGE_JSON_KEY));
    }
    Ok(exports)
}

/// Realpaths of the directories along one descent of the package tree.
#[derive(Debug)]
struct Chain {
    dir: PathBuf,
    parent: Option<Arc<Chain>>,
}

impl Chain {
    fn contains(mut link: Option<&Arc<Chain>>, dir: &Path) -> bool {
        while let Some(chain) = link {
            if chain.dir == dir {
                return true;
            }
            link = chain.parent.as_ref();
        }
        false
    }
}

struct Context<F> {
    fs: Arc<F>,
    options: ExportOptions,
}

type ExportUnit = Unit<Vec<NormalizedExport>, Error>;

/// Resolves package exports through a [`PackageFs`].
#[derive(Debug, Clone)]
pub struct ExportResolver<F = TokioFs> {
    fs: Arc<F>,
    max_parallel_tasks: usize,
}

impl Default for ExportResolver<TokioFs> {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportResolver<TokioFs> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_fs(Arc::new(TokioFs))
    }
}

impl<F: PackageFs> ExportResolver<F> {
    #[must_use]
    pub fn with_fs(fs: Arc<F>) -> Self {
        Self {
            fs,
            max_parallel_tasks: DEFAULT_MAX_PARALLEL_TASKS,
        }
    }

    #[must_use]
    pub fn with_max_parallel_tasks(mut self, max_parallel_tasks: usize) -> Self {
        self.max_parallel_tasks = max_parallel_tasks;
        self
    }

    /// Resolve the exports of the package at `package_dir`, sorted by
    /// export name.
    pub async fn run(
        &self,
        package_dir: &Path,
        options: &ExportOptions,
    ) -> Result<Vec<NormalizedExport>> {
        let context = Arc::new(Context {
            fs: Arc::clone(&self.fs),
            options: options.clone(),
        });
        let seed = resolve_root(context, package_dir.to_path_buf());

        let mut exports = Scheduler::new(self.max_parallel_tasks)
            .run(seed, Vec::new(), |all: &mut Vec<NormalizedExport>, found| {
                all.extend(found);
            })
            .await?;
        exports.sort_by(|a, b| a.export_name.cmp(&b.export_name));

        debug!(
            package = %package_dir.display(),
            exports = exports.len(),
            "Resolved package exports"
        );
        Ok(exports)
    }
}

/// Resolve the exports of the package at `package_dir` on the real filesystem.
pub async fn resolve_exports(
    package_dir: &Path,
    options: &ExportOptions,
) -> Result<Vec<NormalizedExport>> {
    ExportResolver::new().run(package_dir, options).await
}

fn resolve_root<F: PackageFs>(context: Arc<Context<F>>, package_dir: PathBuf) -> ExportUnit {
    async move {
        let real = context
            .fs
            .canonicalize(&package_dir)
            .await
            .map_err(|e| Error::io("realpath", &package_dir, e))?;
        Ok(visit(&context, real, Vec::new(), None))
    }
    .boxed()
}

fn visit<F: PackageFs>(
    context: &Arc<Context<F>>,
    real: PathBuf,
    parts: Vec<String>,
    chain: Option<Arc<Chain>>,
) -> Step<Vec<NormalizedExport>, Error> {
    if context.options.override_export_map.is_some() {
        return Step::empty().spawn(read_exports(Arc::clone(context), real, parts));
    }
    let chain = Some(Arc::new(Chain {
        dir: real.clone(),
        parent: chain,
    }));
    Step::empty()
        .spawn(read_exports(Arc::clone(context), real.clone(), parts.clone()))
        .spawn(list_directory(Arc::clone(context), real, parts, chain))
}

fn list_directory<F: PackageFs>(
    context: Arc<Context<F>>,
    dir: PathBuf,
    parts: Vec<String>,
    chain: Option<Arc<Chain>>,
) -> ExportUnit {
    async move {
        let Some(names) = absent_as_none(context.fs.read_dir(&dir).await)
            .map_err(|e| Error::io("read_dir", &dir, e))?
        else {
            return Ok(Step::empty());
        };

        let nested = names.into_iter().filter_map(|name| {
            let name = name.to_string_lossy().into_owned();
            if name.starts_with('.') || IGNORED_ENTRIES.contains(&name.as_str()) {
                return None;
            }
            let mut nested_parts = parts.clone();
            let path = dir.join(&name);
            nested_parts.push(name);
            Some(enter_directory(
                Arc::clone(&context),
                path,
                nested_parts,
                chain.clone(),
            ))
        });
        Ok(Step::empty().spawn_all(nested))
    }
    .boxed()
}

fn enter_directory<F: PackageFs>(
    context: Arc<Context<F>>,
    dir: PathBuf,
    parts: Vec<String>,
    chain: Option<Arc<Chain>>,
) -> ExportUnit {
    async move {
        let Some(real) = absent_as_none(context.fs.canonicalize(&dir).await)
            .map_err(|e| Error::io("realpath", &dir, e))?
        else {
            return Ok(Step::empty());
        };
        if Chain::contains(chain.as_ref(), &real) {
            debug!(dir = %dir.display(), real = %real.display(), "Not descending into symlink cycle");
            return Ok(Step::empty());
        }
        Ok(visit(&context, real, parts, chain))
    }
    .boxed()
}

fn read_exports<F: PackageFs>(
    context: Arc<Context<F>>,
    dir: PathBuf,
    parts: Vec<String>,
) -> ExportUnit {
    async move {
        let Some(manifest) = manifest::load(context.fs.as_ref(), &dir).await? else {
            return Ok(Step::empty());
        };
        let manifest_path = dir.join(PACKAGE_JSON);
        let source = match &context.options.override_export_map {
            Some(map) => EntrySource::Declared(map),
            None => EntrySource::pick(&manifest, &manifest_path)?,
        };
        let exports = collect_exports(
            source,
            &manifest_path,
            &dir,
            &parts,
            &context.options.allowed_condition_keys,
        )?;
        Ok(Step::empty().emit(exports))
    }
    .boxed()
}
