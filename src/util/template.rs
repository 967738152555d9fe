//! Provisioning script templates.
//!
//! Templates are plain shell fragments shipped in the operator image with
//! `{{placeholder}}` markers. Each template is loaded from disk once per
//! process and variable-substituted per reconcile.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use crate::controller::error::Result;
use crate::util::env;

fn cache() -> &'static Mutex<HashMap<String, String>> {
    static CACHE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Load a template by file name, reading it from the template directory on
/// first use
pub fn load_template(name: &str) -> Result<String> {
    {
        let cache = cache().lock().expect("template cache poisoned");
        if let Some(content) = cache.get(name) {
            return Ok(content.clone());
        }
    }
    let path = Path::new(&env::template_dir()).join(name);
    let content = std::fs::read_to_string(path)?;
    cache()
        .lock()
        .expect("template cache poisoned")
        .insert(name.to_string(), content.clone());
    Ok(content)
}

/// Substitute `{{key}}` markers with their values
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}
