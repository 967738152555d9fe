//! HTPasswd file generation via the local `htpasswd` binary shipped in the
//! operator image.

use tokio::process::Command;

use crate::controller::error::{Error, Result};
use crate::util::env;

/// Arguments passed to htpasswd: print to stdout (-n), password from the
/// command line (-b), bcrypt (-B).
pub fn htpasswd_args(user: &str, password: &str) -> Vec<String> {
    vec![
        "-nbB".to_string(),
        user.to_string(),
        password.to_string(),
    ]
}

/// Produce an htpasswd entry for the initial OpenShift OAuth user. Under
/// MOCK_API a fixed placeholder line is returned.
pub async fn generate_htpasswd(user: &str, password: &str) -> Result<String> {
    if env::mock_api() {
        return Ok(format!("{user}:mock"));
    }

    let output = Command::new("htpasswd")
        .args(htpasswd_args(user, password))
        .output()
        .await
        .map_err(|e| Error::ProcessError {
            command: "htpasswd".to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(Error::ProcessError {
            command: "htpasswd".to_string(),
            message: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
