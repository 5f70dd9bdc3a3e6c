pub mod exports;
pub mod locations;
pub mod version;

/// Convert a core error into a report carrying its stable code.
pub(crate) fn report(err: depmap_core::Error) -> miette::Report {
    miette::miette!(code = err.code(), "{err}")
}

/// Build the runtime that drives one command.
pub(crate) fn runtime() -> miette::Result<tokio::runtime::Runtime> {
    use miette::IntoDiagnostic;
    tokio::runtime::Runtime::new().into_diagnostic()
}
