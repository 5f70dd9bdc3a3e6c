use super::{report, runtime};
use depmap_core::{
    ExportOptions, ExportResolver, NormalizedExport, PackageCache, PackageId, ResolverConfig,
};
use miette::{IntoDiagnostic, Result};
use std::path::Path;

/// Which package to inspect.
pub enum Target<'a> {
    /// An installed package, looked up from the working directory.
    Installed(&'a str),
    /// A package directory.
    Directory(&'a Path),
}

/// Print the export table of a package.
pub fn run(cwd: &Path, config: ResolverConfig, target: Target<'_>, json: bool) -> Result<()> {
    let runtime = runtime()?;

    let exports = match target {
        Target::Installed(id) => {
            let parsed = PackageId::parse(id).ok_or_else(|| {
                miette::miette!(
                    help = "use the name@version form, e.g. react@18.2.0",
                    "Invalid package id {id:?}"
                )
            })?;
            let cache = PackageCache::new(config);
            runtime
                .block_on(cache.exports(cwd, &parsed))
                .map_err(report)?
                .ok_or_else(|| {
                    miette::miette!("{parsed} is not installed at or above {}", cwd.display())
                })?
                .to_vec()
        }
        Target::Directory(dir) => {
            let dir = cwd.join(dir);
            let options = ExportOptions::new(config.condition_keys.iter().cloned());
            runtime
                .block_on(
                    ExportResolver::new()
                        .with_max_parallel_tasks(config.max_parallel_tasks)
                        .run(&dir, &options),
                )
                .map_err(report)?
        }
    };

    if json {
        let out = serde_json::to_string_pretty(&exports).into_diagnostic()?;
        println!("{out}");
    } else {
        print_table(&exports);
    }
    Ok(())
}

fn print_table(exports: &[NormalizedExport]) {
    let width = exports
        .iter()
        .map(|e| e.export_name.len() + 2)
        .max()
        .unwrap_or(0);
    for export in exports {
        let name = if export.export_name.is_empty() {
            ".".to_string()
        } else {
            format!("./{}", export.export_name)
        };
        println!("{name:<width$}  {}", export.resolved_path.display());
    }
}
