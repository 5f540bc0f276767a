//! Config file and command line settings
//!
//! Settings come from an optional TOML file, then command line flags override
//! whatever the file said.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::Deserialize;

use kubeinv_collect::{CollectorConfig, Strictness};
use kubeinv_k8s::{ClusterSource, KubeApiSource, KubectlSource};

/// Which mechanism queries the cluster
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Shell out to kubectl
    #[default]
    Kubectl,
    /// Talk to the API server directly
    Api,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Contents of the TOML config file. Every key is optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub source: Option<SourceKind>,
    pub kubectl: Option<PathBuf>,
    pub resource: Option<String>,
    pub context: Option<String>,
    pub max_retries: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub strictness: Option<Strictness>,
    pub output: Option<OutputFormat>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load `explicit` if given, otherwise `~/.kubeinv/config.toml` when it exists
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match default_path() {
                Some(path) if path.is_file() => path,
                _ => return Ok(Self::default()),
            },
        };

        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse { path, source })
    }
}

/// Default config file location
pub fn default_path() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    Some(home.join(".kubeinv").join("config.toml"))
}

/// Command line flags that override the config file
#[derive(clap::Args, Clone, Debug, Default)]
pub struct Overrides {
    /// Maximum number of retries after a failed query
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Give up on the whole collection after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Only report resources from this namespace
    #[arg(long, value_name = "NAMESPACE")]
    pub namespace_filter: Option<String>,

    /// How to query the cluster
    #[arg(long, value_enum)]
    pub source: Option<SourceKind>,

    /// Kubeconfig context to use
    #[arg(long, value_name = "CONTEXT")]
    pub context: Option<String>,

    /// Path to the kubectl binary
    #[arg(long, value_name = "PATH")]
    pub kubectl: Option<PathBuf>,

    /// Resource type to inventory (kubectl source only)
    #[arg(long, value_name = "KIND")]
    pub resource: Option<String>,

    /// Fill in missing namespace/status instead of skipping the record
    #[arg(long)]
    pub lenient: bool,

    /// Output format
    #[arg(short = 'o', long, value_enum)]
    pub output: Option<OutputFormat>,
}

/// Effective settings for one run
#[derive(Clone, Debug)]
pub struct Settings {
    pub source: SourceKind,
    pub kubectl: PathBuf,
    pub resource: String,
    pub context: Option<String>,
    pub output: OutputFormat,
    pub collector: CollectorConfig,
}

impl Settings {
    pub fn resolve(file: FileConfig, flags: &Overrides) -> Result<Self, ConfigError> {
        let defaults = CollectorConfig::default();

        let source = flags.source.or(file.source).unwrap_or_default();
        let resource = flags
            .resource
            .clone()
            .or(file.resource)
            .unwrap_or_else(|| "pods".to_string());
        if source == SourceKind::Api && resource != "pods" {
            return Err(ConfigError::Invalid(format!(
                "the api source only lists pods, not '{}'",
                resource
            )));
        }

        let base_delay = file
            .base_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.base_delay);
        let max_delay = file
            .max_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.max_delay);
        if max_delay < base_delay {
            return Err(ConfigError::Invalid(format!(
                "max_delay_ms ({}) is below base_delay_ms ({})",
                max_delay.as_millis(),
                base_delay.as_millis()
            )));
        }

        let timeout = match flags.timeout.or(file.timeout_secs) {
            Some(0) => return Err(ConfigError::Invalid("timeout must be positive".to_string())),
            other => other.map(Duration::from_secs),
        };

        if flags.namespace_filter.as_deref() == Some("") {
            return Err(ConfigError::Invalid(
                "namespace filter must not be empty".to_string(),
            ));
        }

        let strictness = if flags.lenient {
            Strictness::Lenient
        } else {
            file.strictness.unwrap_or_default()
        };

        Ok(Self {
            source,
            kubectl: flags
                .kubectl
                .clone()
                .or(file.kubectl)
                .unwrap_or_else(|| PathBuf::from("kubectl")),
            resource,
            context: flags.context.clone().or(file.context),
            output: flags.output.or(file.output).unwrap_or_default(),
            collector: CollectorConfig {
                max_retries: flags
                    .max_retries
                    .or(file.max_retries)
                    .unwrap_or(defaults.max_retries),
                base_delay,
                max_delay,
                timeout,
                strictness,
                namespace_filter: flags.namespace_filter.clone(),
            },
        })
    }

    /// Build the data source these settings describe
    pub fn data_source(&self) -> ClusterSource {
        let namespace = self.collector.namespace_filter.clone();
        match self.source {
            SourceKind::Kubectl => ClusterSource::Kubectl(
                KubectlSource::new()
                    .with_binary(self.kubectl.clone())
                    .with_resource(self.resource.clone())
                    .with_namespace(namespace)
                    .with_context(self.context.clone()),
            ),
            SourceKind::Api => ClusterSource::Api(
                KubeApiSource::new()
                    .with_context(self.context.clone())
                    .with_namespace(namespace),
            ),
        }
    }

    /// Plural noun for the inventoried resource, used in messages
    pub fn noun(&self) -> &str {
        &self.resource
    }
}
