//! Caller-owned memoization of discovery and export resolution.
//!
//! A long-running host (a dev server answering module requests) asks for the
//! same project and the same packages over and over. `PackageCache` keeps one
//! result per key, shares a single in-flight computation between concurrent
//! callers and never stores failures. Entries live until explicitly
//! invalidated.

use crate::config::ResolverConfig;
use crate::discover::{Discovery, LocationMap, PackageLocation};
use crate::error::Result;
use crate::exports::{ExportResolver, NormalizedExport};
use crate::fs::{PackageFs, TokioFs};
use crate::identity::PackageId;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

type Slot<T> = Arc<OnceCell<Arc<T>>>;
type Slots<T> = Mutex<HashMap<PathBuf, Slot<T>>>;

fn slot<T>(slots: &Slots<T>, key: &Path) -> Slot<T> {
    let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(slots.entry(key.to_path_buf()).or_default())
}

fn evict<T>(slots: &Slots<T>, key: &Path) -> bool {
    slots
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(key)
        .is_some()
}

/// Memoized package locations and exports.
#[derive(Debug)]
pub struct PackageCache<F = TokioFs> {
    fs: Arc<F>,
    config: ResolverConfig,
    locations: Slots<LocationMap>,
    exports: Slots<Vec<NormalizedExport>>,
}

impl PackageCache<TokioFs> {
    #[must_use]
    pub fn new(config: ResolverConfig) -> Self {
        Self::with_fs(Arc::new(TokioFs), config)
    }
}

impl<F: PackageFs> PackageCache<F> {
    #[must_use]
    pub fn with_fs(fs: Arc<F>, config: ResolverConfig) -> Self {
        Self {
            fs,
            config,
            locations: Mutex::default(),
            exports: Mutex::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Every package reachable from `dir`.
    pub async fn locations(&self, dir: &Path) -> Result<Arc<LocationMap>> {
        let cell = slot(&self.locations, dir);
        let discovery = Discovery::with_fs(Arc::clone(&self.fs))
            .with_max_parallel_tasks(self.config.max_parallel_tasks);

        let init = cell.get_or_try_init(|| async {
            debug!(dir = %dir.display(), "Discovering package locations");
            discovery.run(dir).await.map(Arc::new)
        });
        let label = format!("locations {}", dir.display());
        let map = warn_if_slow(init, self.config.slow_call_warning(), &label).await?;
        Ok(Arc::clone(map))
    }

    /// The location of one package as seen from `dir`.
    pub async fn location(&self, dir: &Path, id: &PackageId) -> Result<Option<PackageLocation>> {
        Ok(self.locations(dir).await?.get_id(id).cloned())
    }

    /// Exports of the package `id` as seen from `dir`, or `None` when it is
    /// not installed.
    pub async fn exports(
        &self,
        dir: &Path,
        id: &PackageId,
    ) -> Result<Option<Arc<Vec<NormalizedExport>>>> {
        let Some(location) = self.location(dir, id).await? else {
            return Ok(None);
        };
        self.package_exports(&location.location.resolved_package_directory, &id.name)
            .await
            .map(Some)
    }

    /// Exports of the package at `package_dir`, with the configured override
    /// for `name` applied.
    pub async fn package_exports(
        &self,
        package_dir: &Path,
        name: &str,
    ) -> Result<Arc<Vec<NormalizedExport>>> {
        let cell = slot(&self.exports, package_dir);
        let resolver = ExportResolver::with_fs(Arc::clone(&self.fs))
            .with_max_parallel_tasks(self.config.max_parallel_tasks);
        let options = self.config.export_options_for(name);

        let init = cell.get_or_try_init(|| async {
            resolver.run(package_dir, &options).await.map(Arc::new)
        });
        let label = format!("exports {name}");
        let exports = warn_if_slow(init, self.config.slow_call_warning(), &label).await?;
        Ok(Arc::clone(exports))
    }

    /// Forget the locations discovered from `dir`.
    pub fn invalidate(&self, dir: &Path) -> bool {
        evict(&self.locations, dir)
    }

    /// Forget the exports of the package at `package_dir`.
    pub fn invalidate_package(&self, package_dir: &Path) -> bool {
        evict(&self.exports, package_dir)
    }

    pub fn clear(&self) {
        self.locations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.exports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Await `future`, logging a warning if it is still pending after
/// `threshold`. The future is never cancelled.
pub async fn warn_if_slow<T>(future: impl Future<Output = T>, threshold: Duration, label: &str) -> T {
    tokio::pin!(future);
    tokio::select! {
        output = &mut future => return output,
        () = tokio::time::sleep(threshold) => {}
    }
    warn!(
        call = label,
        threshold_ms = threshold.as_millis() as u64,
        "Call is taking longer than expected"
    );
    future.await
}
