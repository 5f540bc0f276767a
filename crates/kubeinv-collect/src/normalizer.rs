use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use kubeinv_types::{
    Field, RawRecord, RejectionReason, ResourcePhase, ResourceRecord, SkippedRecord,
};

/// Namespace assumed for records without one under [`Strictness::Lenient`]
pub const DEFAULT_NAMESPACE: &str = "default";

/// How absent fields are treated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Any absent field rejects the record
    #[default]
    Strict,
    /// Absent namespace or status fall back to defaults; absent name still rejects
    Lenient,
}

/// Where each field lives in a record
struct Layout {
    name: &'static [&'static str],
    namespace: &'static [&'static str],
    status: &'static [&'static str],
}

/// Kubernetes object: `metadata.name`, `metadata.namespace`, `status.phase`
const OBJECT_LAYOUT: Layout = Layout {
    name: &["metadata", "name"],
    namespace: &["metadata", "namespace"],
    status: &["status", "phase"],
};

const FLAT_LAYOUT: Layout = Layout {
    name: &["name"],
    namespace: &["namespace"],
    status: &["status"],
};

/// Kinds whose objects report a lifecycle phase in `status.phase`
const PHASED_KINDS: &[&str] = &["Pod", "Namespace", "PersistentVolume", "PersistentVolumeClaim"];

/// Whether a Kubernetes object is expected to carry `status.phase`.
/// Objects without a `kind` are treated as pods.
fn expects_phase(object: &Map<String, Value>) -> bool {
    match object.get("kind").and_then(Value::as_str) {
        Some(kind) => PHASED_KINDS.contains(&kind),
        None => true,
    }
}

enum Lookup<'a> {
    Found(&'a str),
    Missing,
    Invalid,
}

/// Walk `path` through nested objects down to a non-empty string
fn lookup<'a>(object: &'a Map<String, Value>, path: &[&str]) -> Lookup<'a> {
    let Some((last, parents)) = path.split_last() else {
        return Lookup::Missing;
    };

    let mut current = object;
    for key in parents {
        match current.get(*key) {
            None | Some(Value::Null) => return Lookup::Missing,
            Some(Value::Object(inner)) => current = inner,
            Some(_) => return Lookup::Invalid,
        }
    }

    match current.get(*last) {
        None | Some(Value::Null) => Lookup::Missing,
        Some(Value::String(s)) if s.is_empty() => Lookup::Missing,
        Some(Value::String(s)) => Lookup::Found(s),
        Some(_) => Lookup::Invalid,
    }
}

fn extract<'a>(
    object: &'a Map<String, Value>,
    path: &[&str],
    field: Field,
) -> Result<Option<&'a str>, RejectionReason> {
    match lookup(object, path) {
        Lookup::Found(value) => Ok(Some(value)),
        Lookup::Missing => Ok(None),
        Lookup::Invalid => Err(RejectionReason::InvalidType(field)),
    }
}

/// Validate one raw record and extract its name, namespace and status.
///
/// Records carrying a `metadata` key are read as Kubernetes objects; anything
/// else is read as a flat `{name, namespace, status}` mapping. Fields are
/// checked in that order and the first problem is reported. Objects of a kind
/// that has no lifecycle phase (deployments, services, ...) get
/// [`ResourcePhase::Unknown`] instead of being rejected.
pub fn normalize(
    raw: &RawRecord,
    strictness: Strictness,
) -> Result<ResourceRecord, RejectionReason> {
    let object = raw.as_object().ok_or(RejectionReason::NotAnObject)?;
    let is_object = object.contains_key("metadata");
    let layout = if is_object { &OBJECT_LAYOUT } else { &FLAT_LAYOUT };

    let name = extract(object, layout.name, Field::Name)?
        .ok_or(RejectionReason::MissingField(Field::Name))?;

    let namespace = match extract(object, layout.namespace, Field::Namespace)? {
        Some(namespace) => namespace,
        None if strictness == Strictness::Lenient => DEFAULT_NAMESPACE,
        None => return Err(RejectionReason::MissingField(Field::Namespace)),
    };

    let status = match extract(object, layout.status, Field::Status)? {
        Some(phase) => ResourcePhase::from(phase),
        None if strictness == Strictness::Lenient => ResourcePhase::Unknown,
        None if is_object && !expects_phase(object) => ResourcePhase::Unknown,
        None => return Err(RejectionReason::MissingField(Field::Status)),
    };

    // lookup() never yields empty strings
    ResourceRecord::new(name, namespace, status, raw.clone())
        .ok_or(RejectionReason::MissingField(Field::Name))
}

/// Normalize a whole fetch, keeping fetch order on both sides
pub fn normalize_all(
    raw: Vec<RawRecord>,
    strictness: Strictness,
) -> (Vec<ResourceRecord>, Vec<SkippedRecord>) {
    let mut records = Vec::with_capacity(raw.len());
    let mut skipped = Vec::new();

    for (position, item) in raw.into_iter().enumerate() {
        match normalize(&item, strictness) {
            Ok(record) => records.push(record),
            Err(reason) => {
                debug!(position, %reason, "skipping record");
                skipped.push(SkippedRecord::new(item, reason));
            }
        }
    }

    (records, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod(name: &str, namespace: &str, phase: &str) -> RawRecord {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": name, "namespace": namespace},
            "status": {"phase": phase}
        })
        .into()
    }

    #[test]
    fn test_kubernetes_object() {
        let record = normalize(&pod("web-1", "shop", "Running"), Strictness::Strict).unwrap();
        assert_eq!(record.name(), "web-1");
        assert_eq!(record.namespace(), "shop");
        assert_eq!(record.status(), ResourcePhase::Running);
        assert_eq!(record.raw(), &pod("web-1", "shop", "Running"));
    }

    #[test]
    fn test_flat_record() {
        let raw: RawRecord = json!({"name": "a", "namespace": "ns1", "status": "Pending"}).into();
        let record = normalize(&raw, Strictness::Strict).unwrap();
        assert_eq!(record.name(), "a");
        assert_eq!(record.status(), ResourcePhase::Pending);
    }

    #[test]
    fn test_missing_fields_are_rejected() {
        let cases = [
            (json!({"namespace": "ns", "status": "Running"}), Field::Name),
            (json!({"name": "a", "status": "Running"}), Field::Namespace),
            (json!({"name": "a", "namespace": "ns"}), Field::Status),
            (json!({"name": "a", "namespace": null, "status": "Running"}), Field::Namespace),
            (json!({"name": "", "namespace": "ns", "status": "Running"}), Field::Name),
            (json!({"metadata": {"name": "a"}, "status": {"phase": "Running"}}), Field::Namespace),
            (json!({"metadata": {"name": "a", "namespace": "ns"}, "status": {}}), Field::Status),
            (json!({"metadata": {"name": "a", "namespace": "ns"}}), Field::Status),
        ];

        for (raw, field) in cases {
            let raw = RawRecord::new(raw);
            assert_eq!(
                normalize(&raw, Strictness::Strict),
                Err(RejectionReason::MissingField(field)),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn test_wrong_types_are_rejected() {
        let cases = [
            (json!({"name": 7, "namespace": "ns", "status": "Running"}), Field::Name),
            (json!({"name": "a", "namespace": ["ns"], "status": "Running"}), Field::Namespace),
            (json!({"metadata": "pod-a", "status": {"phase": "Running"}}), Field::Name),
            (json!({"metadata": {"name": "a", "namespace": "ns"}, "status": "Running"}), Field::Status),
            (json!({"metadata": {"name": "a", "namespace": "ns"}, "status": {"phase": true}}), Field::Status),
        ];

        for (raw, field) in cases {
            let raw = RawRecord::new(raw);
            assert_eq!(
                normalize(&raw, Strictness::Lenient),
                Err(RejectionReason::InvalidType(field)),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn test_non_object_is_rejected() {
        let raw = RawRecord::new(json!("pod/a"));
        assert_eq!(normalize(&raw, Strictness::Lenient), Err(RejectionReason::NotAnObject));
    }

    #[test]
    fn test_unrecognised_phase_is_unknown() {
        let record = normalize(&pod("a", "ns", "Evicted"), Strictness::Strict).unwrap();
        assert_eq!(record.status(), ResourcePhase::Unknown);
    }

    #[test]
    fn test_kinds_without_phase_are_kept() {
        let deployment: RawRecord = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "shop"},
            "status": {"replicas": 2, "readyReplicas": 2}
        })
        .into();
        let record = normalize(&deployment, Strictness::Strict).unwrap();
        assert_eq!(record.name(), "web");
        assert_eq!(record.status(), ResourcePhase::Unknown);

        let service: RawRecord = json!({
            "kind": "Service",
            "metadata": {"name": "api", "namespace": "shop"}
        })
        .into();
        assert_eq!(
            normalize(&service, Strictness::Strict).unwrap().status(),
            ResourcePhase::Unknown
        );

        // a pod still has to report its phase
        let pod: RawRecord = json!({
            "kind": "Pod",
            "metadata": {"name": "web-1", "namespace": "shop"},
            "status": {}
        })
        .into();
        assert_eq!(
            normalize(&pod, Strictness::Strict),
            Err(RejectionReason::MissingField(Field::Status))
        );

        // a phase of the wrong type is still an error
        let odd: RawRecord = json!({
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "shop"},
            "status": {"phase": 3}
        })
        .into();
        assert_eq!(
            normalize(&odd, Strictness::Strict),
            Err(RejectionReason::InvalidType(Field::Status))
        );
    }

    #[test]
    fn test_lenient_defaults() {
        let raw: RawRecord = json!({"metadata": {"name": "a"}}).into();
        let record = normalize(&raw, Strictness::Lenient).unwrap();
        assert_eq!(record.namespace(), DEFAULT_NAMESPACE);
        assert_eq!(record.status(), ResourcePhase::Unknown);

        let nameless: RawRecord = json!({"metadata": {"namespace": "ns"}}).into();
        assert_eq!(
            normalize(&nameless, Strictness::Lenient),
            Err(RejectionReason::MissingField(Field::Name))
        );
    }

    #[test]
    fn test_normalize_all_keeps_order() {
        let raw = vec![
            pod("a", "ns", "Running"),
            json!({"metadata": {"name": "broken"}}).into(),
            pod("b", "ns", "Failed"),
            json!(42).into(),
        ];
        let (records, skipped) = normalize_all(raw, Strictness::Strict);

        let names: Vec<_> = records.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0].reason, RejectionReason::MissingField(Field::Namespace));
        assert_eq!(skipped[1].reason, RejectionReason::NotAnObject);
        assert_eq!(skipped[1].raw, RawRecord::new(json!(42)));
    }
}
