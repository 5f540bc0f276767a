//! Kubernetes API data source

use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use tracing::debug;

use kubeinv_types::{ContextInfo, FetchError, RawRecord};

use crate::source::DataSource;

/// Kubeconfig wrapper
pub struct KubeClient {
    kubeconfig: Kubeconfig,
    current_context: Option<String>,
}

impl KubeClient {
    /// Create a new KubeClient by loading the kubeconfig
    pub fn new() -> Result<Self, FetchError> {
        let kubeconfig = Kubeconfig::read().map_err(|e| {
            FetchError::NotAvailable(format!(
                "failed to read kubeconfig ({}). Is kubectl configured?",
                e
            ))
        })?;

        let current_context = kubeconfig.current_context.clone();

        Ok(Self {
            kubeconfig,
            current_context,
        })
    }

    /// Get all available contexts from kubeconfig
    pub fn get_contexts(&self) -> Vec<ContextInfo> {
        self.kubeconfig
            .contexts
            .iter()
            .map(|ctx| {
                let context = ctx.context.as_ref();
                ContextInfo::new(
                    ctx.name.clone(),
                    context.map(|c| c.cluster.clone()).unwrap_or_default(),
                    context.and_then(|c| c.user.clone()).unwrap_or_default(),
                    context.and_then(|c| c.namespace.clone()),
                    Some(&ctx.name) == self.current_context.as_ref(),
                )
            })
            .collect()
    }

    /// Create a kube::Client for a specific context
    pub async fn client_for_context(&self, context_name: &str) -> Result<kube::Client, FetchError> {
        if !self.kubeconfig.contexts.iter().any(|c| c.name == context_name) {
            return Err(FetchError::NotAvailable(format!(
                "context '{}' not found in kubeconfig",
                context_name
            )));
        }

        let config = kube::Config::from_custom_kubeconfig(
            self.kubeconfig.clone(),
            &KubeConfigOptions {
                context: Some(context_name.to_string()),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| {
            FetchError::NotAvailable(format!(
                "failed to create config for context {}: {}",
                context_name, e
            ))
        })?;

        kube::Client::try_from(config).map_err(|e| {
            FetchError::NotAvailable(format!(
                "failed to create client for context {}: {}",
                context_name, e
            ))
        })
    }
}

/// Lists pods straight from the API server
#[derive(Clone, Debug, Default)]
pub struct KubeApiSource {
    context: Option<String>,
    namespace: Option<String>,
}

impl KubeApiSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a named kubeconfig context instead of the inferred configuration
    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    /// Query a single namespace instead of all of them
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    async fn client(&self) -> Result<kube::Client, FetchError> {
        match &self.context {
            Some(context) => KubeClient::new()?.client_for_context(context).await,
            None => kube::Client::try_default().await.map_err(|e| {
                FetchError::NotAvailable(format!("no usable cluster configuration: {}", e))
            }),
        }
    }
}

impl DataSource for KubeApiSource {
    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        let client = self.client().await?;
        let pods: Api<Pod> = match &self.namespace {
            Some(namespace) => Api::namespaced(client, namespace),
            None => Api::all(client),
        };

        debug!(namespace = ?self.namespace, "listing pods via API");
        let list = pods
            .list(&ListParams::default())
            .await
            .map_err(classify_error)?;

        list.items
            .into_iter()
            .map(|pod| {
                serde_json::to_value(pod)
                    .map(RawRecord::new)
                    .map_err(|e| FetchError::MalformedPayload(e.to_string()))
            })
            .collect()
    }
}

/// Map a kube error onto the fetch taxonomy
fn classify_error(err: kube::Error) -> FetchError {
    match err {
        kube::Error::Api(response) => FetchError::ExecutionFailed(format!(
            "{} ({} {})",
            response.message, response.code, response.reason
        )),
        kube::Error::SerdeError(e) => FetchError::MalformedPayload(e.to_string()),
        other => FetchError::ExecutionFailed(other.to_string()),
    }
}
