//! Blueprint-vs-live diffing.
//!
//! Live objects carry fields the API server populates after creation
//! (TypeMeta, server-managed ObjectMeta, status, defaulted spec fields).
//! The diff therefore masks a default set of paths and then performs a
//! subset comparison: every field present in the blueprint must match the
//! live object, fields only present live are ignored. Callers add masks for
//! server-defaulted spec fields of specific kinds.

use serde_json::Value;

/// Paths masked on every comparison, slash-separated from the object root
pub const DEFAULT_MASKS: &[&str] = &[
    "apiVersion",
    "kind",
    "status",
    "metadata/uid",
    "metadata/resourceVersion",
    "metadata/generation",
    "metadata/creationTimestamp",
    "metadata/deletionTimestamp",
    "metadata/managedFields",
    "metadata/selfLink",
    "metadata/finalizers",
    "metadata/ownerReferences",
    "metadata/annotations",
];

/// Caller-supplied comparison options
#[derive(Debug, Clone, Default)]
pub struct DiffOpts {
    /// Extra masked paths on top of [`DEFAULT_MASKS`]
    pub masks: Vec<String>,
}

impl DiffOpts {
    pub fn ignore(paths: &[&str]) -> Self {
        Self {
            masks: paths.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Kinds that are deleted and recreated on any non-empty diff instead of
/// updated in place. Service.spec.clusterIP, Route/Ingress.spec.host,
/// Job.spec.template and Secret.type are immutable or fail updates in
/// subtle ways; a single recreate is simpler than field-by-field patching.
pub fn requires_recreate(kind: &str) -> bool {
    matches!(kind, "Service" | "Ingress" | "Route" | "Job" | "Secret")
}

/// Remove a slash-separated path from a JSON value, in place
fn remove_path(value: &mut Value, path: &str) {
    let mut segments = path.split('/').peekable();
    let mut current = value;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            if let Value::Object(map) = current {
                map.remove(segment);
            }
            return;
        }
        match current.get_mut(segment) {
            Some(next) => current = next,
            None => return,
        }
    }
}

/// Apply default plus caller masks to a serialized object
pub fn apply_masks(value: &mut Value, opts: &DiffOpts) {
    for path in DEFAULT_MASKS {
        remove_path(value, path);
    }
    for path in &opts.masks {
        remove_path(value, path);
    }
}

/// Paths where the blueprint disagrees with the live object. Empty means in
/// sync. Both values must already be masked.
pub fn changed_paths(blueprint: &Value, live: &Value) -> Vec<String> {
    let mut paths = Vec::new();
    collect_changes(blueprint, live, String::new(), &mut paths);
    paths
}

fn collect_changes(blueprint: &Value, live: &Value, prefix: String, out: &mut Vec<String>) {
    match (blueprint, live) {
        (Value::Object(bp), Value::Object(lv)) => {
            for (key, bp_value) in bp {
                // Blueprint fields set to null are treated as unspecified
                if bp_value.is_null() {
                    continue;
                }
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}/{key}")
                };
                match lv.get(key) {
                    Some(lv_value) => collect_changes(bp_value, lv_value, path, out),
                    None => out.push(path),
                }
            }
        }
        // Arrays are positional in the Kubernetes API. Same-length arrays
        // are compared element-wise so subset semantics keep applying
        // inside them; the API server defaults fields deep inside e.g.
        // pod-template container lists. A length mismatch is a change.
        (Value::Array(bp), Value::Array(lv)) => {
            if bp.len() != lv.len() {
                out.push(if prefix.is_empty() {
                    "<root>".to_string()
                } else {
                    prefix
                });
                return;
            }
            for (i, (bp_value, lv_value)) in bp.iter().zip(lv).enumerate() {
                let path = if prefix.is_empty() {
                    format!("{i}")
                } else {
                    format!("{prefix}/{i}")
                };
                collect_changes(bp_value, lv_value, path, out);
            }
        }
        (bp, lv) => {
            if bp != lv {
                out.push(if prefix.is_empty() {
                    "<root>".to_string()
                } else {
                    prefix
                });
            }
        }
    }
}

/// Convenience wrapper: serialize, mask, subset-compare
pub fn diff_objects<K: serde::Serialize>(
    blueprint: &K,
    live: &K,
    opts: &DiffOpts,
) -> Result<Vec<String>, serde_json::Error> {
    let mut bp = serde_json::to_value(blueprint)?;
    let mut lv = serde_json::to_value(live)?;
    apply_masks(&mut bp, opts);
    apply_masks(&mut lv, opts);
    Ok(changed_paths(&bp, &lv))
}
