use std::future::Future;

use kubeinv_types::{FetchError, RawRecord};

use crate::client::KubeApiSource;
use crate::kubectl::KubectlSource;

/// Something that can produce one point-in-time list of raw records
pub trait DataSource {
    fn fetch(&self) -> impl Future<Output = Result<Vec<RawRecord>, FetchError>> + Send;
}

/// Data source selected at runtime
#[derive(Clone, Debug)]
pub enum ClusterSource {
    Kubectl(KubectlSource),
    Api(KubeApiSource),
}

impl ClusterSource {
    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Kubectl(_) => "kubectl",
            Self::Api(_) => "api",
        }
    }
}

impl DataSource for ClusterSource {
    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        match self {
            Self::Kubectl(source) => source.fetch().await,
            Self::Api(source) => source.fetch().await,
        }
    }
}
