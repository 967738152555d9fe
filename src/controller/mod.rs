pub mod context;
pub mod error;
pub mod pipeline;
pub mod reconciler;
pub mod status;
pub mod validation;

pub use context::DeployContext;
pub use error::{Error, Result};
