//! Process environment read once at startup.

/// Mounted service-account namespace file, the fallback when POD_NAMESPACE
/// is not set
const SA_NAMESPACE_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Namespace the controller watches. WATCH_NAMESPACE wins (empty value
/// means cluster-wide), then the mounted service-account namespace.
pub fn watch_namespace() -> Option<String> {
    if let Ok(ns) = std::env::var("WATCH_NAMESPACE") {
        return (!ns.is_empty()).then_some(ns);
    }
    std::fs::read_to_string(SA_NAMESPACE_FILE)
        .ok()
        .map(|ns| ns.trim().to_string())
        .filter(|ns| !ns.is_empty())
}

/// Image override for restricted-network installs, e.g.
/// `RELATED_IMAGE_postgres` overrides the PostgreSQL image.
pub fn related_image(component: &str) -> Option<String> {
    std::env::var(format!("RELATED_IMAGE_{component}"))
        .ok()
        .filter(|v| !v.is_empty())
}

/// Pick the image for a component: CR override wins, then the
/// RELATED_IMAGE_* environment, then the built-in default.
pub fn image_for(component: &str, cr_override: Option<&String>, default: &str) -> String {
    if let Some(img) = cr_override {
        if !img.is_empty() {
            return img.clone();
        }
    }
    related_image(component).unwrap_or_else(|| default.to_string())
}

/// Test-mode toggle disabling exec-into-pod and external processes
pub fn mock_api() -> bool {
    std::env::var("MOCK_API").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Directory holding the provisioning script templates shipped in the
/// operator image. Overridable for tests.
pub fn template_dir() -> String {
    std::env::var("CHE_TEMPLATE_DIR").unwrap_or_else(|_| "/tmp/che/templates".to_string())
}
