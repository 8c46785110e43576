//! Tenant file loading and per-tenant client construction.
//!
//! The tenant file lists one entry per (configuration, cluster) pair:
//!
//! ```yaml
//! tenants:
//!   - configurationId: prod-config
//!     clusterName: eu-west-1
//!     kubeconfig: /etc/dashboard/prod.kubeconfig
//!     context: eu-west-1
//! ```

use anyhow::Context;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use watch_engine::{KubeBackend, TenantKey};

/// Parsed tenant file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantsFile {
    /// Configured tenants
    #[serde(default)]
    pub tenants: Vec<TenantEntry>,
}

/// One cluster credential.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantEntry {
    /// Owning configuration
    pub configuration_id: String,
    /// Cluster name within the configuration
    pub cluster_name: String,
    /// Path of the kubeconfig holding the credential
    pub kubeconfig: PathBuf,
    /// Context to select, the kubeconfig's current context if unset
    #[serde(default)]
    pub context: Option<String>,
}

impl TenantEntry {
    /// Tenant key of the entry.
    #[must_use]
    pub fn key(&self) -> TenantKey {
        TenantKey::new(&self.configuration_id, &self.cluster_name)
    }

    /// Builds a client from the entry's kubeconfig.
    pub async fn connect(&self) -> anyhow::Result<Client> {
        let kubeconfig = Kubeconfig::read_from(&self.kubeconfig)
            .with_context(|| format!("failed to read kubeconfig {}", self.kubeconfig.display()))?;
        let options = KubeConfigOptions {
            context: self.context.clone(),
            ..KubeConfigOptions::default()
        };
        let config = Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .with_context(|| format!("failed to load kubeconfig for {}", self.key()))?;
        Client::try_from(config).with_context(|| format!("failed to build client for {}", self.key()))
    }
}

impl TenantsFile {
    /// Parses a tenant file from YAML.
    pub fn parse(yaml: &str) -> anyhow::Result<Self> {
        let file: Self = serde_yaml::from_str(yaml).context("invalid tenant file")?;
        for entry in &file.tenants {
            if entry.configuration_id.is_empty() || entry.cluster_name.is_empty() {
                anyhow::bail!("tenant entries need a configurationId and a clusterName");
            }
        }
        Ok(file)
    }

    /// Reads and parses a tenant file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read tenant file {}", path.display()))?;
        Self::parse(&yaml)
    }
}

/// Connects every tenant and registers its client with the backend.
///
/// A tenant whose credential cannot be loaded is logged and skipped. Returns
/// the number of registered tenants.
pub async fn register_all(backend: &KubeBackend, file: &TenantsFile) -> usize {
    let mut registered = 0;
    for entry in &file.tenants {
        match entry.connect().await {
            Ok(client) => {
                info!("Registered tenant {}", entry.key());
                backend.insert(entry.key(), client);
                registered += 1;
            }
            Err(err) => warn!("Skipping tenant {}: {:#}", entry.key(), err),
        }
    }
    registered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tenant_file() {
        let file = TenantsFile::parse(
            r"
tenants:
  - configurationId: prod-config
    clusterName: eu-west-1
    kubeconfig: /etc/dashboard/prod.kubeconfig
    context: eu-west-1
  - configurationId: prod-config
    clusterName: us-east-1
    kubeconfig: /etc/dashboard/us.kubeconfig
",
        )
        .unwrap();

        assert_eq!(file.tenants.len(), 2);
        assert_eq!(file.tenants[0].key(), TenantKey::new("prod-config", "eu-west-1"));
        assert_eq!(file.tenants[0].context.as_deref(), Some("eu-west-1"));
        assert!(file.tenants[1].context.is_none());
    }

    #[test]
    fn test_empty_file_has_no_tenants() {
        assert!(TenantsFile::parse("{}").unwrap().tenants.is_empty());
    }

    #[test]
    fn test_missing_cluster_rejected() {
        let result = TenantsFile::parse(
            r"
tenants:
  - configurationId: prod-config
    clusterName: ''
    kubeconfig: /tmp/kubeconfig
",
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unreadable_kubeconfig_is_skipped() {
        let file = TenantsFile::parse(
            r"
tenants:
  - configurationId: cfg
    clusterName: dev
    kubeconfig: /nonexistent/kubeconfig
",
        )
        .unwrap();
        let backend = KubeBackend::new();

        assert_eq!(register_all(&backend, &file).await, 0);
        assert!(backend.tenants().is_empty());
    }

    #[test]
    fn test_missing_tenant_file() {
        let err = TenantsFile::load(Path::new("/nonexistent/tenants.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/tenants.yaml"));
    }
}
