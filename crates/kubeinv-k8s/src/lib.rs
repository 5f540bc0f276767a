//! Kubernetes data sources for kubeinv
//!
//! This crate turns a cluster query into raw records. Two mechanisms are
//! provided: shelling out to `kubectl`, and talking to the API server
//! directly through kube-rs.

mod client;
mod kubectl;
mod source;

pub use client::{KubeApiSource, KubeClient};
pub use kubectl::{KubectlSource, parse_list_payload};
pub use source::{ClusterSource, DataSource};

// Re-export types that are used in our public API
pub use kubeinv_types::{ContextInfo, FetchError, RawRecord};
