//! Export values and condition selection.

use serde_json::Value;
use tracing::debug;

/// The value of one `exports` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTarget {
    /// A path relative to the manifest directory.
    Path(String),
    /// Condition name to target, in declaration order.
    Conditional(Vec<(String, ExportTarget)>),
    /// Fallbacks; the first usable one wins.
    Candidates(Vec<ExportTarget>),
    /// `null`: the subpath is deliberately not exported.
    Excluded,
}

impl ExportTarget {
    /// Convert a JSON value. Numbers and booleans are not targets.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(path) => Some(Self::Path(path.clone())),
            Value::Null => Some(Self::Excluded),
            Value::Array(items) => items
                .iter()
                .map(Self::from_value)
                .collect::<Option<Vec<_>>>()
                .map(Self::Candidates),
            Value::Object(entries) => entries
                .iter()
                .map(|(condition, target)| Some((condition.clone(), Self::from_value(target)?)))
                .collect::<Option<Vec<_>>>()
                .map(Self::Conditional),
            Value::Bool(_) | Value::Number(_) => None,
        }
    }

    /// Pick the path this target resolves to under `conditions`.
    ///
    /// Conditions are tried in the caller's priority order, not declaration
    /// order. A condition whose own target is unusable falls through to the
    /// next one.
    #[must_use]
    pub fn select(&self, conditions: &[String]) -> Option<&str> {
        match self {
            Self::Path(path) => Some(path.as_str()),
            Self::Excluded => None,
            Self::Candidates(candidates) => candidates
                .iter()
                .find_map(|candidate| candidate.select(conditions)),
            Self::Conditional(entries) => conditions.iter().find_map(|condition| {
                entries
                    .iter()
                    .find(|(key, _)| key == condition)
                    .and_then(|(_, target)| target.select(conditions))
            }),
        }
    }
}

/// Resolve `target` for `subpath`, logging when nothing matches.
pub(crate) fn select_logged<'a>(
    target: &'a ExportTarget,
    subpath: &str,
    conditions: &[String],
) -> Option<&'a str> {
    let selected = target.select(conditions);
    if selected.is_none() && !matches!(target, ExportTarget::Excluded) {
        debug!(subpath, ?conditions, "No export condition matched, skipping");
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conditions(keys: &[&str]) -> Vec<String> {
        keys.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_from_value() {
        assert_eq!(
            ExportTarget::from_value(&json!("./a.js")),
            Some(ExportTarget::Path("./a.js".into()))
        );
        assert_eq!(ExportTarget::from_value(&json!(null)), Some(ExportTarget::Excluded));
        assert_eq!(ExportTarget::from_value(&json!(1)), None);
        assert_eq!(ExportTarget::from_value(&json!({ "import": [true] })), None);
    }

    #[test]
    fn test_conditions_follow_caller_priority() {
        let target = ExportTarget::from_value(&json!({
            "default": "./main.js",
            "module": "./esm.js",
        }))
        .unwrap();

        assert_eq!(target.select(&conditions(&["module", "default"])), Some("./esm.js"));
        assert_eq!(target.select(&conditions(&["default", "module"])), Some("./main.js"));
        assert_eq!(target.select(&conditions(&["worker"])), None);
    }

    #[test]
    fn test_nested_conditions() {
        let target = ExportTarget::from_value(&json!({
            "browser": { "worker": "./worker.js" },
            "import": { "default": "./esm.js" },
        }))
        .unwrap();

        assert_eq!(
            target.select(&conditions(&["browser", "import", "default"])),
            Some("./esm.js")
        );
        assert_eq!(
            target.select(&conditions(&["worker", "browser"])),
            Some("./worker.js")
        );
    }

    #[test]
    fn test_candidates_take_first_usable() {
        let target = ExportTarget::from_value(&json!([
            { "worker": "./worker.js" },
            null,
            "./fallback.js",
            "./never.js",
        ]))
        .unwrap();

        assert_eq!(target.select(&conditions(&["default"])), Some("./fallback.js"));
        assert_eq!(target.select(&conditions(&["worker"])), Some("./worker.js"));
    }

    #[test]
    fn test_excluded_selects_nothing() {
        let target = ExportTarget::from_value(&json!({ "default": null })).unwrap();
        assert_eq!(target.select(&conditions(&["default"])), None);
    }
}
