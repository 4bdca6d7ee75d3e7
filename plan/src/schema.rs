use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

use crate::names::{ContainerName, PortName, ProviderName, RecordName, ServiceName};

#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, bon::Builder,
)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct PortMapping {
    pub name: PortName,
    pub container_port: u16,
    pub host_port: u16,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Effect {
    #[default]
    Allow,
    Deny,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Effect::Allow => "allow",
            Effect::Deny => "deny",
        };
        f.write_str(s)
    }
}

/// One role-policy statement. Statements attached to the same role form a
/// set with union semantics; order never matters.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, bon::Builder,
)]
#[builder(on(String, into))]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct IamStatement {
    #[serde(default)]
    #[builder(default)]
    pub effect: Effect,
    pub actions: BTreeSet<String>,
    pub resources: BTreeSet<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum StoreAccess {
    Read,
    Write,
    ReadWrite,
}

impl fmt::Display for StoreAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoreAccess::Read => "read",
            StoreAccess::Write => "write",
            StoreAccess::ReadWrite => "read-write",
        };
        f.write_str(s)
    }
}

/// Grants the task role a fixed action set against one object store, keyed
/// by its export key. The expansion is exactly the store contract's action
/// set, never a wildcard.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, bon::Builder,
)]
#[builder(on(String, into))]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct StoreGrant {
    pub store: String,
    pub access: StoreAccess,
}

#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, bon::Builder,
)]
#[builder(on(String, into))]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct LogDecl {
    /// Export key of the log sink in the provisioning context.
    #[serde(default = "default_log_sink")]
    #[builder(default = default_log_sink())]
    pub sink: String,
    pub stream_prefix: String,
}

fn default_log_sink() -> String {
    "log-group".to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, bon::Builder)]
#[builder(on(String, into))]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct TaskDecl {
    pub container: ContainerName,
    pub image: String,
    pub cpu: u32,
    pub memory: u32,
    #[serde(default)]
    #[builder(default)]
    pub ports: Vec<PortMapping>,
    #[serde(default)]
    pub log: Option<LogDecl>,
    #[serde(default)]
    #[builder(default)]
    pub execution_policies: BTreeSet<IamStatement>,
    #[serde(default)]
    #[builder(default)]
    pub task_policies: BTreeSet<IamStatement>,
    #[serde(default)]
    #[builder(default)]
    pub store_grants: Vec<StoreGrant>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum PlacementRule {
    PackedByMemory,
    PackedByCpu,
    SpreadAcrossZones,
}

impl fmt::Display for PlacementRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlacementRule::PackedByMemory => "packed-by-memory",
            PlacementRule::PackedByCpu => "packed-by-cpu",
            PlacementRule::SpreadAcrossZones => "spread-across-zones",
        };
        f.write_str(s)
    }
}

#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, bon::Builder,
)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct CapacityTarget {
    pub provider: ProviderName,
    pub weight: u32,
    #[serde(default)]
    #[builder(default)]
    pub base: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum IngressProtocol {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for IngressProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IngressProtocol::Tcp => "tcp",
            IngressProtocol::Udp => "udp",
        };
        f.write_str(s)
    }
}

/// Named source policy of an ingress rule, so a broad allow is a declared
/// choice rather than an inferred wildcard.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum IngressSource {
    OpenToAny,
    Restricted { cidr: String },
}

impl fmt::Display for IngressSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngressSource::OpenToAny => f.write_str("open-to-any"),
            IngressSource::Restricted { cidr } => write!(f, "restricted({cidr})"),
        }
    }
}

#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, bon::Builder,
)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct IngressRule {
    /// Port mapping this rule admits traffic to, by name.
    pub port: PortName,
    #[serde(default)]
    #[builder(default)]
    pub protocol: IngressProtocol,
    pub source: IngressSource,
}

#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, bon::Builder,
)]
#[builder(on(String, into))]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct DiscoveryDecl {
    /// Key prefix of the namespace triple in the provisioning context.
    #[serde(default = "default_namespace")]
    #[builder(default = default_namespace())]
    pub namespace: String,
    pub name: RecordName,
}

fn default_namespace() -> String {
    "namespace".to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, bon::Builder)]
#[builder(on(String, into))]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct DeploymentDecl {
    /// Export key of the cluster in the provisioning context.
    #[serde(default = "default_cluster")]
    #[builder(default = default_cluster())]
    pub cluster: String,
    /// Zero is valid: a provisioned-but-scaled-down service.
    #[serde(default)]
    #[builder(default)]
    pub desired_count: u32,
    #[serde(default)]
    #[builder(default)]
    pub placement: Vec<PlacementRule>,
    #[serde(default)]
    #[builder(default)]
    pub capacity: Vec<CapacityTarget>,
    #[serde(default)]
    #[builder(default)]
    pub ingress: Vec<IngressRule>,
    #[serde(default)]
    pub discovery: Option<DiscoveryDecl>,
    #[serde(default)]
    #[builder(default)]
    pub remote_exec: bool,
}

fn default_cluster() -> String {
    "cluster".to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct ServiceDecl {
    pub task: TaskDecl,
    pub deployment: DeploymentDecl,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerProtocol {
    Tcp,
    Tls,
}

impl fmt::Display for ListenerProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ListenerProtocol::Tcp => "tcp",
            ListenerProtocol::Tls => "tls",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum TargetProtocol {
    #[default]
    Tcp,
    Tls,
}

impl fmt::Display for TargetProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetProtocol::Tcp => "tcp",
            TargetProtocol::Tls => "tls",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum TlsPolicy {
    /// Platform-recommended cipher/protocol baseline.
    #[default]
    Recommended,
    ForwardSecrecy,
    Legacy,
}

impl fmt::Display for TlsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TlsPolicy::Recommended => "recommended",
            TlsPolicy::ForwardSecrecy => "forward-secrecy",
            TlsPolicy::Legacy => "legacy",
        };
        f.write_str(s)
    }
}

#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, bon::Builder,
)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct TargetRef {
    pub service: ServiceName,
    /// Port mapping on the target service's task, by name.
    pub port: PortName,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, bon::Builder)]
#[builder(on(String, into))]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct ListenerDecl {
    pub port: u16,
    pub protocol: ListenerProtocol,
    #[serde(default)]
    pub certificate: Option<String>,
    #[serde(default)]
    pub tls_policy: Option<TlsPolicy>,
    /// Protocol of the target group behind this listener, declared
    /// explicitly rather than inherited from the listener.
    #[serde(default)]
    #[builder(default)]
    pub target_protocol: TargetProtocol,
    pub targets: Vec<TargetRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, bon::Builder)]
#[builder(on(String, into))]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct RoutingDecl {
    /// Export key of the shared load balancer in the provisioning context.
    #[serde(default = "default_load_balancer")]
    #[builder(default = default_load_balancer())]
    pub load_balancer: String,
    #[serde(default)]
    #[builder(default)]
    pub listeners: Vec<ListenerDecl>,
}

fn default_load_balancer() -> String {
    "load-balancer".to_string()
}
