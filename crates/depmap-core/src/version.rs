/// The current version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `depmap <version>`, with the build's git hash when one was provided.
#[must_use]
pub fn version_string() -> String {
    match option_env!("DEPMAP_BUILD_GIT_HASH") {
        Some(hash) => format!("depmap {VERSION} ({hash})"),
        None => format!("depmap {VERSION}"),
    }
}
