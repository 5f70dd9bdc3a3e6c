#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]

//! Discovery of installed npm packages and resolution of their exports.
//!
//! [`discover`] walks `node_modules` at a directory and all of its ancestors
//! and returns one location per `name@version`. [`resolve_exports`] lists the
//! importable subpaths of one package. [`PackageCache`] memoizes both for
//! long-running hosts.

pub mod cache;
pub mod config;
pub mod discover;
pub mod error;
pub mod exports;
pub mod fs;
pub mod identity;
pub mod manifest;
pub mod scheduler;
pub mod version;

pub use cache::{warn_if_slow, PackageCache};
pub use config::ResolverConfig;
pub use discover::{discover, Discovery, LocationEntry, LocationMap, PackageLocation};
pub use error::{Error, Result};
pub use exports::{resolve_exports, ExportOptions, ExportResolver, ExportTarget, NormalizedExport};
pub use fs::{PackageFs, TokioFs};
pub use identity::PackageId;
pub use scheduler::{RunStats, Scheduler, Step};
pub use version::VERSION;
