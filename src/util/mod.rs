pub mod env;
pub mod exec;
pub mod htpasswd;
pub mod password;
pub mod template;
