mod che_cluster;
pub mod openshift;

pub use che_cluster::*;
