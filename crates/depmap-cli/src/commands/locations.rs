use super::{report, runtime};
use depmap_core::{Discovery, LocationEntry, PackageLocation, ResolverConfig};
use miette::{IntoDiagnostic, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Print every package installed at or above `cwd`.
///
/// With `name`, only the versions of that package are shown.
pub fn run(cwd: &Path, config: &ResolverConfig, name: Option<&str>, json: bool) -> Result<()> {
    let map = runtime()?
        .block_on(
            Discovery::new()
                .with_max_parallel_tasks(config.max_parallel_tasks)
                .run(cwd),
        )
        .map_err(report)?;

    let selected: BTreeMap<&str, &PackageLocation> = map
        .iter()
        .filter(|(_, location)| name.map_or(true, |name| location.name == name))
        .map(|(key, location)| (key.as_str(), location))
        .collect();

    if json {
        let out = serde_json::to_string_pretty(&selected).into_diagnostic()?;
        println!("{out}");
        return Ok(());
    }

    if selected.is_empty() {
        info!(cwd = %cwd.display(), "No packages found");
        return Ok(());
    }
    for (key, location) in &selected {
        println!("{key}");
        print_entry("at", &location.location);
        for alternative in &location.alternative_locations {
            print_entry("also", alternative);
        }
    }
    Ok(())
}

fn print_entry(label: &str, entry: &LocationEntry) {
    let relative = if entry.relative_package_directory.is_empty() {
        "."
    } else {
        entry.relative_package_directory.as_str()
    };
    println!(
        "  {label:<4} {relative} (in {}) -> {}",
        entry.source_directory.display(),
        entry.resolved_package_directory.display()
    );
}
