//! Package location discovery.
//!
//! Walks `node_modules` at the start directory and at every ancestor up to
//! the filesystem root. Each ancestor is scanned independently as a *source
//! directory*, so the same package can be found several times; all
//! occurrences of one `name@version` are folded into a single
//! [`PackageLocation`] whose current location is the nearest one.
//!
//! Nearest means, in order:
//! 1. the source directory closest to the start directory (deepest ancestor),
//! 2. the fewest path segments below the source directory,
//! 3. the lexically smallest relative path, then source directory.
//!
//! The ranking only looks at paths, never at arrival order, so the result is
//! the same however the filesystem calls interleave.

use crate::error::{Error, Result};
use crate::fs::{absent_as_none, PackageFs, TokioFs};
use crate::identity::PackageId;
use crate::manifest::{self, NODE_MODULES, NON_PACKAGE_ENTRIES, SCOPE_PREFIX};
use crate::scheduler::{Scheduler, Step, Unit, DEFAULT_MAX_PARALLEL_TASKS};
use depmap_util::path::{component_depth, posix_depth, to_posix};
use futures::FutureExt;
use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::collections::btree_map::{self, Entry};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// One place a package was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationEntry {
    /// Ancestor directory whose `node_modules` tree was being scanned.
    pub source_directory: PathBuf,
    /// Path from the source directory to the package, `/`-separated, as
    /// discovered (it may pass through symlinks).
    pub relative_package_directory: String,
    /// Realpath of the package directory.
    pub resolved_package_directory: PathBuf,
}

impl LocationEntry {
    fn rank(&self) -> (Reverse<usize>, usize, &str, &Path) {
        (
            Reverse(component_depth(&self.source_directory)),
            posix_depth(&self.relative_package_directory),
            &self.relative_package_directory,
            &self.source_directory,
        )
    }

    /// Compare two locations of the same package; `Less` means `self` is preferred.
    #[must_use]
    pub fn preference(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// A discovered package and every place it is installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageLocation {
    pub name: String,
    pub version: String,
    /// The preferred location.
    #[serde(flatten)]
    pub location: LocationEntry,
    /// Every other location, best first.
    pub alternative_locations: Vec<LocationEntry>,
}

impl PackageLocation {
    #[must_use]
    pub fn id(&self) -> PackageId {
        PackageId {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }

    fn record(&mut self, candidate: LocationEntry) {
        if candidate.preference(&self.location) == Ordering::Less {
            let previous = std::mem::replace(&mut self.location, candidate);
            self.alternative_locations.push(previous);
        } else {
            self.alternative_locations.push(candidate);
        }
    }
}

/// Result of a discovery run, sorted by `name@version`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LocationMap {
    packages: BTreeMap<String, PackageLocation>,
}

impl LocationMap {
    /// Look up a package by its `name@version` key.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&PackageLocation> {
        self.packages.get(id)
    }

    #[must_use]
    pub fn get_id(&self, id: &PackageId) -> Option<&PackageLocation> {
        self.get(&id.key())
    }

    /// Every installed version of `name`, lowest key first.
    pub fn by_name<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a PackageLocation> + 'a {
        self.packages
            .values()
            .filter(move |location| location.name == name)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, PackageLocation> {
        self.packages.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    fn insert(&mut self, found: Discovered) {
        match self.packages.entry(found.id.key()) {
            Entry::Vacant(slot) => {
                slot.insert(PackageLocation {
                    name: found.id.name,
                    version: found.id.version,
                    location: found.entry,
                    alternative_locations: Vec::new(),
                });
            }
            Entry::Occupied(mut slot) => slot.get_mut().record(found.entry),
        }
    }

    fn finish(&mut self) {
        for location in self.packages.values_mut() {
            location.alternative_locations.sort_by(LocationEntry::preference);
        }
    }
}

impl<'a> IntoIterator for &'a LocationMap {
    type Item = (&'a String, &'a PackageLocation);
    type IntoIter = btree_map::Iter<'a, String, PackageLocation>;

    fn into_iter(self) -> Self::IntoIter {
        self.packages.iter()
    }
}

/// A manifest with an identity, found while scanning.
#[derive(Debug)]
struct Discovered {
    id: PackageId,
    entry: LocationEntry,
}

/// Realpaths of the directories along one descent.
///
/// A package whose realpath is already on its own chain links back to an
/// ancestor; its manifest is still recorded but its `node_modules` is not
/// listed again.
#[derive(Debug)]
struct Chain {
    dir: PathBuf,
    parent: Option<Arc<Chain>>,
}

fn chain_contains(chain: Option<&Arc<Chain>>, dir: &Path) -> bool {
    let mut link = chain;
    while let Some(current) = link {
        if current.dir == dir {
            return true;
        }
        link = current.parent.as_ref();
    }
    false
}

type DiscoverUnit = Unit<Discovered, Error>;

/// Discovers installed packages through a [`PackageFs`].
#[derive(Debug, Clone)]
pub struct Discovery<F = TokioFs> {
    fs: Arc<F>,
    max_parallel_tasks: usize,
}

impl Default for Discovery<TokioFs> {
    fn default() -> Self {
        Self::new()
    }
}

impl Discovery<TokioFs> {
    /// Discovery over the real filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::with_fs(Arc::new(TokioFs))
    }
}

impl<F: PackageFs> Discovery<F> {
    #[must_use]
    pub fn with_fs(fs: Arc<F>) -> Self {
        Self {
            fs,
            max_parallel_tasks: DEFAULT_MAX_PARALLEL_TASKS,
        }
    }

    /// Set the ceiling on concurrent filesystem operations.
    #[must_use]
    pub fn with_max_parallel_tasks(mut self, max_parallel_tasks: usize) -> Self {
        self.max_parallel_tasks = max_parallel_tasks;
        self
    }

    /// Discover every package reachable from `start`.
    ///
    /// Fails if `start` cannot be resolved or on any filesystem error other
    /// than a missing path or a path of the wrong kind.
    pub async fn run(&self, start: &Path) -> Result<LocationMap> {
        let started = Instant::now();
        let scheduler = Scheduler::new(self.max_parallel_tasks);
        let seed = resolve_start(Arc::clone(&self.fs), start.to_path_buf());

        let (mut map, stats) = scheduler
            .run_with_stats(seed, LocationMap::default(), LocationMap::insert)
            .await?;
        map.finish();

        debug!(
            start = %start.display(),
            packages = map.len(),
            units = stats.units_completed,
            max_in_flight = stats.max_in_flight,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Discovered package locations"
        );
        Ok(map)
    }
}

/// Discover every package reachable from `start` on the real filesystem.
pub async fn discover(start: &Path) -> Result<LocationMap> {
    Discovery::new().run(start).await
}

fn resolve_start<F: PackageFs>(fs: Arc<F>, start: PathBuf) -> DiscoverUnit {
    async move {
        let root = fs
            .canonicalize(&start)
            .await
            .map_err(|e| Error::io("realpath", &start, e))?;

        let step = root.ancestors().fold(Step::empty(), |step, dir| {
            let source = Arc::new(dir.to_path_buf());
            step.merge(scan_directory(
                &fs,
                &source,
                dir.to_path_buf(),
                dir.to_path_buf(),
                None,
            ))
        });
        Ok(step)
    }
    .boxed()
}

/// Schedule the listing of `dir/node_modules` and the read of `dir/package.json`.
fn scan_directory<F: PackageFs>(
    fs: &Arc<F>,
    source: &Arc<PathBuf>,
    dir: PathBuf,
    real: PathBuf,
    chain: Option<Arc<Chain>>,
) -> Step<Discovered, Error> {
    let step = Step::empty().spawn(read_manifest(
        Arc::clone(fs),
        Arc::clone(source),
        dir.clone(),
        real.clone(),
    ));

    if chain_contains(chain.as_ref(), &real) {
        debug!(dir = %dir.display(), real = %real.display(), "Not descending into symlink cycle");
        return step;
    }

    let chain = Some(Arc::new(Chain { dir: real, parent: chain }));
    step.spawn(list_install_dir(Arc::clone(fs), Arc::clone(source), dir, chain))
}

fn list_install_dir<F: PackageFs>(
    fs: Arc<F>,
    source: Arc<PathBuf>,
    dir: PathBuf,
    chain: Option<Arc<Chain>>,
) -> DiscoverUnit {
    async move {
        let install_dir = dir.join(NODE_MODULES);
        let Some(names) = absent_as_none(fs.read_dir(&install_dir).await)
            .map_err(|e| Error::io("read_dir", &install_dir, e))?
        else {
            return Ok(Step::empty());
        };

        let mut step = Step::empty();
        for name in names {
            let display = name.to_string_lossy();
            let entry = install_dir.join(&name);
            if display.starts_with(SCOPE_PREFIX) {
                step = step.spawn(list_scope(
                    Arc::clone(&fs),
                    Arc::clone(&source),
                    entry,
                    chain.clone(),
                ));
            } else if NON_PACKAGE_ENTRIES.contains(&&*display) {
                trace!(entry = %entry.display(), "Skipping non-package entry");
            } else {
                step = step.spawn(resolve_package_dir(
                    Arc::clone(&fs),
                    Arc::clone(&source),
                    entry,
                    chain.clone(),
                ));
            }
        }
        Ok(step)
    }
    .boxed()
}

fn list_scope<F: PackageFs>(
    fs: Arc<F>,
    source: Arc<PathBuf>,
    scope_dir: PathBuf,
    chain: Option<Arc<Chain>>,
) -> DiscoverUnit {
    async move {
        let Some(names) = absent_as_none(fs.read_dir(&scope_dir).await)
            .map_err(|e| Error::io("read_dir", &scope_dir, e))?
        else {
            return Ok(Step::empty());
        };

        let members = names.into_iter().map(|name| {
            resolve_package_dir(
                Arc::clone(&fs),
                Arc::clone(&source),
                scope_dir.join(name),
                chain.clone(),
            )
        });
        Ok(Step::empty().spawn_all(members))
    }
    .boxed()
}

fn resolve_package_dir<F: PackageFs>(
    fs: Arc<F>,
    source: Arc<PathBuf>,
    dir: PathBuf,
    chain: Option<Arc<Chain>>,
) -> DiscoverUnit {
    async move {
        let Some(real) = absent_as_none(fs.canonicalize(&dir).await)
            .map_err(|e| Error::io("realpath", &dir, e))?
        else {
            trace!(dir = %dir.display(), "Skipping dangling entry");
            return Ok(Step::empty());
        };
        Ok(scan_directory(&fs, &source, dir, real, chain))
    }
    .boxed()
}

fn read_manifest<F: PackageFs>(
    fs: Arc<F>,
    source: Arc<PathBuf>,
    dir: PathBuf,
    real: PathBuf,
) -> DiscoverUnit {
    async move {
        let Some(manifest) = manifest::load(fs.as_ref(), &dir).await? else {
            return Ok(Step::empty());
        };
        let Some(id) = manifest.identity() else {
            debug!(dir = %dir.display(), "Skipping manifest without name and version");
            return Ok(Step::empty());
        };

        let relative = dir.strip_prefix(source.as_path()).unwrap_or(&dir);
        let entry = LocationEntry {
            source_directory: source.as_ref().clone(),
            relative_package_directory: to_posix(relative),
            resolved_package_directory: real,
        };
        Ok(Step::empty().emit(Discovered { id, entry }))
    }
    .boxed()
}
