//! Shared types for kubeinv
//!
//! This crate contains the data model passed between the data sources, the
//! collection core and the renderers.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

// ============================================================================
// Raw input
// ============================================================================

/// Unvalidated record exactly as the data source returned it
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RawRecord(Value);

impl RawRecord {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// The record as a mapping, if it is one
    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        self.0.as_object()
    }
}

impl From<Value> for RawRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

// ============================================================================
// Kubernetes contexts
// ============================================================================

/// Kubernetes context information
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContextInfo {
    pub name: String,
    pub cluster: String,
    pub user: String,
    pub namespace: Option<String>,
    pub is_current: bool,
}

impl ContextInfo {
    pub fn new(
        name: String,
        cluster: String,
        user: String,
        namespace: Option<String>,
        is_current: bool,
    ) -> Self {
        Self {
            name,
            cluster,
            user,
            namespace,
            is_current,
        }
    }
}

// ============================================================================
// Normalized records
// ============================================================================

/// Lifecycle phase of an inventoried resource
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourcePhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl ResourcePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        }
    }
}

impl From<&str> for ResourcePhase {
    fn from(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ResourcePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ResourcePhase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A validated resource. Name and namespace are never empty.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResourceRecord {
    name: String,
    namespace: String,
    status: ResourcePhase,
    #[serde(skip)]
    raw: RawRecord,
}

impl ResourceRecord {
    /// Returns `None` if `name` or `namespace` is empty
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        status: ResourcePhase,
        raw: RawRecord,
    ) -> Option<Self> {
        let name = name.into();
        let namespace = namespace.into();
        if name.is_empty() || namespace.is_empty() {
            return None;
        }
        Some(Self {
            name,
            namespace,
            status,
            raw,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn status(&self) -> ResourcePhase {
        self.status
    }

    /// The original record, kept for diagnostics
    pub fn raw(&self) -> &RawRecord {
        &self.raw
    }
}

// ============================================================================
// Rejections
// ============================================================================

/// Logical field extracted from a raw record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Name,
    Namespace,
    Status,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Namespace => "namespace",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a raw record could not become a [`ResourceRecord`]
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", content = "field", rename_all = "snake_case")]
pub enum RejectionReason {
    #[error("missing field `{0}`")]
    MissingField(Field),
    #[error("field `{0}` has an unexpected type")]
    InvalidType(Field),
    #[error("record is not an object")]
    NotAnObject,
}

/// A raw record that was left out of the inventory, and why
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedRecord {
    pub raw: RawRecord,
    pub reason: RejectionReason,
}

impl SkippedRecord {
    pub fn new(raw: RawRecord, reason: RejectionReason) -> Self {
        Self { raw, reason }
    }
}

// ============================================================================
// Grouping
// ============================================================================

/// Records keyed by namespace.
///
/// Namespaces iterate in the order they were first pushed; records within a
/// namespace keep their push order. Serializes as a map in that same order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NamespaceGroup {
    groups: IndexMap<String, Vec<ResourceRecord>>,
}

impl NamespaceGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to its namespace, creating the namespace on first use
    pub fn push(&mut self, record: ResourceRecord) {
        self.groups
            .entry(record.namespace().to_string())
            .or_default()
            .push(record);
    }

    pub fn get(&self, namespace: &str) -> Option<&[ResourceRecord]> {
        self.groups.get(namespace).map(Vec::as_slice)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ResourceRecord])> {
        self.groups
            .iter()
            .map(|(ns, records)| (ns.as_str(), records.as_slice()))
    }

    /// Number of namespaces
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of records across all namespaces
    pub fn record_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}

// ============================================================================
// Fetch errors and reports
// ============================================================================

/// Failure of a single data source query
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FetchError {
    /// The querying tool or API cannot be reached at all
    #[error("data source not available: {0}")]
    NotAvailable(String),
    /// The query ran but reported failure
    #[error("query failed: {0}")]
    ExecutionFailed(String),
    /// The response was not the structured data we expected
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NotAvailable(_))
    }
}

/// Overall outcome of one collection run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CollectionStatus {
    Success,
    PartialFailure,
    TotalFailure,
    Cancelled,
}

impl CollectionStatus {
    /// Whether the run produced an inventory worth using
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Success | Self::PartialFailure)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::PartialFailure => "PartialFailure",
            Self::TotalFailure => "TotalFailure",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one collection run
#[derive(Clone, Debug, Serialize)]
pub struct CollectionReport {
    pub status: CollectionStatus,
    pub groups: NamespaceGroup,
    pub skipped: Vec<SkippedRecord>,

    /// Raw records returned by the successful fetch
    pub fetched: usize,

    /// Fetch attempts made, including the successful one
    pub attempts: u32,

    /// Last fetch error when the run failed before normalizing
    pub failure: Option<FetchError>,

    pub namespace_filter: Option<String>,
    pub collected_at: DateTime<Utc>,
}

impl CollectionReport {
    pub fn record_count(&self) -> usize {
        self.groups.record_count()
    }

    /// True when the run failed because the data source is missing
    pub fn is_setup_failure(&self) -> bool {
        matches!(self.failure, Some(FetchError::NotAvailable(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(name: &str, namespace: &str) -> ResourceRecord {
        ResourceRecord::new(name, namespace, ResourcePhase::Running, json!({}).into()).unwrap()
    }

    #[test]
    fn test_record_rejects_empty_identity() {
        assert!(ResourceRecord::new("", "ns", ResourcePhase::Running, json!({}).into()).is_none());
        assert!(ResourceRecord::new("a", "", ResourcePhase::Running, json!({}).into()).is_none());
    }

    #[test]
    fn test_phase_from_str() {
        assert_eq!(ResourcePhase::from("Running"), ResourcePhase::Running);
        assert_eq!(ResourcePhase::from("Evicted"), ResourcePhase::Unknown);
    }

    #[test]
    fn test_group_keeps_first_seen_order() {
        let mut groups = NamespaceGroup::new();
        groups.push(record("a", "zeta"));
        groups.push(record("b", "alpha"));
        groups.push(record("c", "zeta"));

        assert_eq!(groups.namespaces().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
        let zeta: Vec<_> = groups.get("zeta").unwrap().iter().map(|r| r.name()).collect();
        assert_eq!(zeta, vec!["a", "c"]);
        assert_eq!(groups.record_count(), 3);
    }

    #[test]
    fn test_group_serializes_in_insertion_order() {
        let mut groups = NamespaceGroup::new();
        groups.push(record("a", "zeta"));
        groups.push(record("b", "alpha"));

        let out = serde_json::to_string(&groups).unwrap();
        assert!(out.find("zeta").unwrap() < out.find("alpha").unwrap());
        assert!(!out.contains("raw"));
        assert_eq!(
            out,
            r#"{"zeta":[{"name":"a","namespace":"zeta","status":"Running"}],"alpha":[{"name":"b","namespace":"alpha","status":"Running"}]}"#
        );
    }

    #[test]
    fn test_not_available_is_not_retryable() {
        assert!(!FetchError::NotAvailable("kubectl".into()).is_retryable());
        assert!(FetchError::ExecutionFailed("boom".into()).is_retryable());
        assert!(FetchError::MalformedPayload("eof".into()).is_retryable());
    }
}
