use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fmt,
};

use gantry_context::{DnsNamespaceRef, ExternalRef};
use gantry_plan::{
    CapacityTarget, ContainerName, IamStatement, IngressProtocol, IngressSource, ListenerProtocol,
    PlacementRule, PlanDigest, PortMapping, RecordName, ServiceName, StoreAccess, TargetProtocol,
    TlsPolicy,
};
use serde::{Deserialize, Serialize};

pub mod ir;

pub use ir::{TOPOLOGY_IR_SCHEMA, TOPOLOGY_IR_VERSION, TopologyIr, TopologyIrError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

#[derive(Clone, Debug)]
pub struct Node {
    pub id: NodeId,
    /// Stable display name used by renderers and error contexts.
    pub name: String,
    pub attrs: NodeAttrs,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NodeAttrs {
    External(ExternalRef),
    DnsNamespace(DnsNamespaceRef),
    Task(TaskSpec),
    Service(ServiceSpec),
    Listener(ListenerSpec),
    TargetGroup(TargetGroupSpec),
}

/// One task definition: the container recipe a service runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub container: ContainerName,
    pub image: String,
    pub cpu: u32,
    pub memory: u32,
    #[serde(default)]
    pub port_mappings: Vec<PortMapping>,
    /// Set when the task ships logs; the sink is the node behind the
    /// `logs-to` edge.
    #[serde(default)]
    pub log_stream_prefix: Option<String>,
    /// Statements attached to the execution role, merged as a union.
    #[serde(default)]
    pub execution_policies: BTreeSet<IamStatement>,
    /// Statements attached to the task role, merged as a union.
    #[serde(default)]
    pub task_policies: BTreeSet<IamStatement>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressSpec {
    /// Host port admitted by this rule, resolved from the port mapping name.
    pub port: u16,
    pub protocol: IngressProtocol,
    pub source: IngressSource,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: ServiceName,
    pub desired_count: u32,
    #[serde(default)]
    pub placement: Vec<PlacementRule>,
    #[serde(default)]
    pub capacity: Vec<CapacityTarget>,
    #[serde(default)]
    pub ingress: Vec<IngressSpec>,
    /// Registered as one A record per running instance in the namespace
    /// behind the `registers-in` edge.
    #[serde(default)]
    pub discovery: Option<RecordName>,
    #[serde(default)]
    pub remote_exec: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSpec {
    pub port: u16,
    pub protocol: ListenerProtocol,
    #[serde(default)]
    pub certificate: Option<String>,
    #[serde(default)]
    pub tls_policy: Option<TlsPolicy>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroupSpec {
    pub port: u16,
    pub protocol: TargetProtocol,
    pub targets: Vec<Target>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub service: ServiceName,
    pub container: ContainerName,
    pub container_port: u16,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    /// Service to the cluster it is scheduled on.
    RunsOn,
    /// Service to its task definition.
    Runs,
    /// Task to its log sink.
    LogsTo,
    /// Task to an object store it was granted access to.
    StoreAccess { access: StoreAccess },
    /// Service to the discovery namespace it registers in.
    RegistersIn,
    /// Listener to the load balancer it is attached to.
    AttachedTo,
    /// Listener to its target group.
    ForwardsTo,
    /// Target group to a service it sends traffic to.
    Targets,
    /// Load balancer to its security group.
    GuardedBy,
    /// Cluster to the network it lives in.
    InNetwork,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::RunsOn => f.write_str("runs-on"),
            EdgeKind::Runs => f.write_str("runs"),
            EdgeKind::LogsTo => f.write_str("logs-to"),
            EdgeKind::StoreAccess { access } => write!(f, "store-access({access})"),
            EdgeKind::RegistersIn => f.write_str("registers-in"),
            EdgeKind::AttachedTo => f.write_str("attached-to"),
            EdgeKind::ForwardsTo => f.write_str("forwards-to"),
            EdgeKind::Targets => f.write_str("targets"),
            EdgeKind::GuardedBy => f.write_str("guarded-by"),
            EdgeKind::InNetwork => f.write_str("in-network"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
}

#[derive(Clone, Debug)]
pub struct Topology {
    /// Digest of the plan this topology was composed from.
    pub plan_digest: PlanDigest,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Topology {
    pub fn new(plan_digest: PlanDigest) -> Self {
        Self {
            plan_digest,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.nodes.get(id.0).expect("node should exist")
    }

    pub fn nodes_iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (NodeId(idx), node))
    }

    pub fn outgoing(&self, id: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |edge| edge.from == id)
    }

    pub fn push_node(&mut self, name: impl Into<String>, attrs: NodeAttrs) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            id,
            name: name.into(),
            attrs,
        });
        id
    }

    pub fn push_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) {
        self.edges.push(Edge { from, to, kind });
    }

    pub fn normalize_order(&mut self) {
        self.edges
            .sort_by(|a, b| (a.from, a.to, &a.kind).cmp(&(b.from, b.to, &b.kind)));
    }

    /// Debug-only validation for post-composition invariants.
    pub fn assert_invariants(&self) {
        if !cfg!(debug_assertions) {
            return;
        }

        for (idx, node) in self.nodes.iter().enumerate() {
            debug_assert_eq!(node.id.0, idx, "node id out of line with node table");
        }

        for edge in &self.edges {
            debug_assert!(edge.from.0 < self.nodes.len(), "edge source out of range");
            debug_assert!(edge.to.0 < self.nodes.len(), "edge target out of range");
        }

        let mut tasks_by_service: BTreeMap<&str, &TaskSpec> = BTreeMap::new();
        for edge in &self.edges {
            if edge.kind == EdgeKind::Runs
                && let NodeAttrs::Service(service) = &self.node(edge.from).attrs
                && let NodeAttrs::Task(task) = &self.node(edge.to).attrs
            {
                tasks_by_service.insert(service.name.as_str(), task);
            }
        }

        let mut listener_keys = HashSet::new();
        for (id, node) in self.nodes_iter() {
            match &node.attrs {
                NodeAttrs::Listener(listener) => {
                    debug_assert!(
                        listener_keys.insert((listener.port, listener.protocol)),
                        "duplicate listener port/protocol"
                    );
                    let forwards = self
                        .outgoing(id)
                        .filter(|edge| edge.kind == EdgeKind::ForwardsTo)
                        .count();
                    debug_assert_eq!(forwards, 1, "listener must forward to one target group");
                }
                NodeAttrs::TargetGroup(group) => {
                    for target in &group.targets {
                        let task = tasks_by_service
                            .get(target.service.as_str())
                            .expect("target group references a composed service");
                        debug_assert!(
                            task.port_mappings
                                .iter()
                                .any(|mapping| mapping.container_port == target.container_port),
                            "target container port not mapped on task"
                        );
                    }
                }
                _ => {}
            }
        }
    }
}
