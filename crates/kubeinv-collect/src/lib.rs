//! Inventory collection core for kubeinv
//!
//! This crate validates raw records, groups them by namespace and drives a
//! whole collection run against a [`DataSource`], including retries with
//! backoff and cancellation.

mod collector;
mod grouper;
mod normalizer;

pub use collector::{Collector, CollectorConfig};
pub use grouper::group;
pub use normalizer::{DEFAULT_NAMESPACE, Strictness, normalize, normalize_all};

// Re-export types used in our public API
pub use kubeinv_k8s::DataSource;
pub use kubeinv_types::{
    CollectionReport, CollectionStatus, FetchError, NamespaceGroup, RawRecord, RejectionReason,
    ResourceRecord, SkippedRecord,
};
pub use tokio_util::sync::CancellationToken;
