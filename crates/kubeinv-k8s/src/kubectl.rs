//! `kubectl` subprocess data source

use std::io;
use std::path::PathBuf;

use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use kubeinv_types::{FetchError, RawRecord};

use crate::source::DataSource;

/// Runs `kubectl get <resource> -o json` and returns the listed items
#[derive(Clone, Debug)]
pub struct KubectlSource {
    binary: PathBuf,
    resource: String,
    namespace: Option<String>,
    context: Option<String>,
}

impl KubectlSource {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("kubectl"),
            resource: "pods".to_string(),
            namespace: None,
            context: None,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    /// Query a single namespace instead of all of them
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    /// Command line arguments passed to kubectl
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["get".to_string(), self.resource.clone()];
        match &self.namespace {
            Some(ns) => {
                args.push("--namespace".to_string());
                args.push(ns.clone());
            }
            None => args.push("--all-namespaces".to_string()),
        }
        args.push("-o".to_string());
        args.push("json".to_string());
        if let Some(context) = &self.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        args
    }

    fn spawn_error(&self, err: io::Error) -> FetchError {
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                FetchError::NotAvailable(format!(
                    "'{}' could not be executed ({}). Please ensure it is installed and in your PATH",
                    self.binary.display(),
                    err
                ))
            }
            _ => FetchError::ExecutionFailed(format!(
                "failed to run '{}': {}",
                self.binary.display(),
                err
            )),
        }
    }
}

impl Default for KubectlSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSource for KubectlSource {
    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        let args = self.args();
        debug!(binary = %self.binary.display(), ?args, "running kubectl");

        // Dropping the future (cancel, deadline) must not leave kubectl behind
        let output = Command::new(&self.binary)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(status = %output.status, stderr = %stderr, "kubectl exited with failure");
            let message = if stderr.is_empty() {
                format!("{} exited with {}", self.binary.display(), output.status)
            } else {
                stderr
            };
            return Err(FetchError::ExecutionFailed(message));
        }

        parse_list_payload(&output.stdout)
    }
}

/// Extract the `items` array from a Kubernetes list document.
///
/// A document without `items` is an empty list.
pub fn parse_list_payload(payload: &[u8]) -> Result<Vec<RawRecord>, FetchError> {
    let document: Value = serde_json::from_slice(payload)
        .map_err(|e| FetchError::MalformedPayload(format!("output is not valid JSON: {}", e)))?;

    let Value::Object(mut document) = document else {
        return Err(FetchError::MalformedPayload(
            "expected a JSON object at the top level".to_string(),
        ));
    };

    match document.remove("items") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.into_iter().map(RawRecord::new).collect()),
        Some(_) => Err(FetchError::MalformedPayload(
            "`items` is not an array".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args_cover_all_namespaces() {
        let source = KubectlSource::new();
        assert_eq!(
            source.args(),
            vec!["get", "pods", "--all-namespaces", "-o", "json"]
        );
    }

    #[test]
    fn test_scoped_args() {
        let source = KubectlSource::new()
            .with_resource("deployments")
            .with_namespace(Some("kube-system".to_string()))
            .with_context(Some("prod".to_string()));
        assert_eq!(
            source.args(),
            vec![
                "get",
                "deployments",
                "--namespace",
                "kube-system",
                "-o",
                "json",
                "--context",
                "prod"
            ]
        );
    }

    #[test]
    fn test_parse_items() {
        let payload = br#"{"kind":"List","items":[{"metadata":{"name":"a"}},"junk"]}"#;
        let items = parse_list_payload(payload).unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[0].as_object().is_some());
        assert!(items[1].as_object().is_none());
    }

    #[test]
    fn test_parse_missing_items_is_empty() {
        assert!(parse_list_payload(br#"{"kind":"List"}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_list_payload(b"error: the server doesn't have a resource type"),
            Err(FetchError::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_list_payload(b"[1, 2]"),
            Err(FetchError::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_list_payload(br#"{"items": {}}"#),
            Err(FetchError::MalformedPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_not_available() {
        let source = KubectlSource::new().with_binary("kubeinv-test-no-such-binary");
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::NotAvailable(_)), "{err:?}");
        assert!(!err.is_retryable());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_is_execution_failed() {
        let source = KubectlSource::new().with_binary("false");
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::ExecutionFailed(_)), "{err:?}");
    }
}
