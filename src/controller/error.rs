//! Error types for the CheCluster controller

use thiserror::Error;

/// Error variants are named with the `Error` suffix for clarity (e.g.,
/// `KubeError`, `ValidationError`). This is idiomatic for error enums and
/// improves readability at call sites.
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Missing object key: {0}")]
    MissingObjectKey(&'static str),

    /// CR missing a required field or carrying contradictory settings.
    /// Surfaced on status reason/message/helpLink, not retried.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// More than one CheCluster in the watched namespace
    #[error("expected exactly one CheCluster in namespace {namespace}, found {found}")]
    NonSingletonError { namespace: String, found: usize },

    /// Command exec'd into a pod failed
    #[error("Exec into pod {pod} failed: {message}")]
    ExecError { pod: String, message: String },

    /// Local process invocation (htpasswd) failed
    #[error("External process {command} failed: {message}")]
    ProcessError { command: String, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Status write still conflicting after the bounded retry loop
    #[error("Status update for {0} kept conflicting, giving up")]
    StatusConflictError(String),

    /// Error annotated with the phase it came from, so operator logs show
    /// exactly which phase failed
    #[error("{phase}: {source}")]
    PhaseError {
        phase: &'static str,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with the name of the phase that produced it
    pub fn in_phase(self, phase: &'static str) -> Self {
        Error::PhaseError {
            phase,
            source: Box::new(self),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::KubeError(e) => match e {
                kube::Error::Api(api_err) => {
                    // 4xx errors (except 409 Conflict, 429 TooManyRequests)
                    // are usually not retryable; 5xx errors are
                    let code = api_err.code;
                    if (400..500).contains(&code) {
                        code == 409 || code == 429
                    } else {
                        true
                    }
                }
                _ => true,
            },
            Error::ValidationError(_) | Error::NonSingletonError { .. } => false,
            Error::SerializationError(_) | Error::MissingObjectKey(_) => false,
            Error::ExecError { .. } | Error::ProcessError { .. } => true,
            Error::IoError(_) => true,
            Error::StatusConflictError(_) => true,
            Error::PhaseError { source, .. } => source.is_retryable(),
        }
    }

    /// Whether the underlying cause is a 404 from the API server
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::KubeError(kube::Error::Api(api_err)) => api_err.code == 404,
            Error::PhaseError { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Check whether a raw kube error is a 404
pub fn is_kube_not_found(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(resp) if resp.code == 404)
}

/// Check whether a raw kube error is a 409 AlreadyExists / Conflict
pub fn is_kube_conflict(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(resp) if resp.code == 409)
}
