#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Shared utilities for depmap.
//!
//! This crate provides pure helper functions with no I/O and no logging.
//! Filesystem access and tracing live in `depmap-core`.

pub mod path;
