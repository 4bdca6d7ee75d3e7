use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_with::{MapPreventDuplicates, serde_as};

mod error;

pub use error::ContextError;

/// The account/region pair a build pass runs against.
///
/// Always supplied in the context document, never read from process
/// environment state, so a pass is reproducible from its inputs alone.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, bon::Builder)]
#[builder(on(String, into))]
#[serde(deny_unknown_fields)]
pub struct Environment {
    pub account: String,
    pub region: String,
}

impl Environment {
    /// Qualify a certificate reference into a full ARN.
    ///
    /// References that already carry an `arn:` prefix pass through untouched.
    pub fn certificate_arn(&self, certificate: &str) -> String {
        if certificate.starts_with("arn:") {
            certificate.to_string()
        } else {
            format!(
                "arn:aws:acm:{}:{}:certificate/{}",
                self.region, self.account, certificate
            )
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum ExternalKind {
    Network,
    Cluster,
    LoadBalancer,
    SecurityGroup,
    DnsNamespace,
    Bucket,
    LogGroup,
}

impl fmt::Display for ExternalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExternalKind::Network => "network",
            ExternalKind::Cluster => "cluster",
            ExternalKind::LoadBalancer => "load balancer",
            ExternalKind::SecurityGroup => "security group",
            ExternalKind::DnsNamespace => "DNS namespace",
            ExternalKind::Bucket => "bucket",
            ExternalKind::LogGroup => "log group",
        };
        f.write_str(s)
    }
}

/// Handle to a resource owned and lifecycle-managed outside the build pass.
///
/// Carries the expected kind, the export key it was resolved from, and the
/// identifier found in the catalog. Binding never constructs the resource.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExternalRef {
    pub kind: ExternalKind,
    pub key: String,
    pub id: String,
}

/// A service-discovery namespace is exported as three catalog entries under
/// one key prefix: `<prefix>-id`, `<prefix>-arn`, `<prefix>-name`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DnsNamespaceRef {
    pub key: String,
    pub id: String,
    pub arn: String,
    pub name: String,
}

/// The injected catalog of externally-provisioned resources.
///
/// Lookups are pure map reads: resolving the same key twice yields equivalent
/// handles, and a missing key is a configuration error, never a transient
/// fault.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct ProvisioningContext {
    pub environment: Environment,
    #[serde_as(as = "MapPreventDuplicates<_, _>")]
    #[serde(default)]
    #[builder(default)]
    pub exports: BTreeMap<String, String>,
}

impl ProvisioningContext {
    /// Resolve an export key to a typed handle.
    ///
    /// An empty catalog value is treated as unresolved.
    pub fn resolve(&self, kind: ExternalKind, key: &str) -> Result<ExternalRef, ContextError> {
        let id = self
            .exports
            .get(key)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ContextError::UnresolvedReference {
                kind,
                key: key.to_string(),
            })?;
        Ok(ExternalRef {
            kind,
            key: key.to_string(),
            id: id.clone(),
        })
    }

    /// Resolve the id/arn/name triple of a service-discovery namespace.
    pub fn resolve_namespace(&self, prefix: &str) -> Result<DnsNamespaceRef, ContextError> {
        let id = self.resolve(ExternalKind::DnsNamespace, &format!("{prefix}-id"))?;
        let arn = self.resolve(ExternalKind::DnsNamespace, &format!("{prefix}-arn"))?;
        let name = self.resolve(ExternalKind::DnsNamespace, &format!("{prefix}-name"))?;
        Ok(DnsNamespaceRef {
            key: prefix.to_string(),
            id: id.id,
            arn: arn.id,
            name: name.id,
        })
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }
}

impl FromStr for ProvisioningContext {
    type Err = ContextError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(input)?)
    }
}
