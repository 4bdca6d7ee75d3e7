use gantry_plan::PlanDigest;
use serde::{Deserialize, Serialize};

use crate::{Edge, EdgeKind, Node, NodeAttrs, NodeId, Topology};

pub const TOPOLOGY_IR_SCHEMA: &str = "gantry.topology.ir";
pub const TOPOLOGY_IR_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TopologyIr {
    pub schema: String,
    pub version: u32,
    pub plan: PlanDigest,
    pub nodes: Vec<NodeIr>,
    pub edges: Vec<EdgeIr>,
}

impl From<&Topology> for TopologyIr {
    fn from(topology: &Topology) -> Self {
        let nodes = topology
            .nodes_iter()
            .map(|(id, node)| NodeIr::from_node(id, node))
            .collect();
        let edges = topology.edges.iter().map(EdgeIr::from).collect();

        Self {
            schema: TOPOLOGY_IR_SCHEMA.to_string(),
            version: TOPOLOGY_IR_VERSION,
            plan: topology.plan_digest,
            nodes,
            edges,
        }
    }
}

impl TryFrom<TopologyIr> for Topology {
    type Error = TopologyIrError;

    fn try_from(ir: TopologyIr) -> Result<Self, Self::Error> {
        if ir.schema != TOPOLOGY_IR_SCHEMA {
            return Err(TopologyIrError::SchemaMismatch {
                expected: TOPOLOGY_IR_SCHEMA,
                actual: ir.schema,
            });
        }
        if ir.version != TOPOLOGY_IR_VERSION {
            return Err(TopologyIrError::VersionMismatch {
                expected: TOPOLOGY_IR_VERSION,
                actual: ir.version,
            });
        }

        let len = ir.nodes.iter().map(|node| node.id + 1).max().unwrap_or(0);
        let mut slots: Vec<Option<Node>> = vec![None; len];
        for node in ir.nodes {
            let id = node.id;
            if slots[id].is_some() {
                return Err(TopologyIrError::DuplicateNodeId { id });
            }
            slots[id] = Some(node.into_node());
        }

        let nodes = slots
            .into_iter()
            .enumerate()
            .map(|(id, node)| {
                node.ok_or(TopologyIrError::MissingNode {
                    id,
                    context: "node table".to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for edge in &ir.edges {
            ensure_node(&nodes, edge.from, || format!("source of {} edge", edge.kind))?;
            ensure_node(&nodes, edge.to, || format!("target of {} edge", edge.kind))?;
        }

        let mut topology = Topology {
            plan_digest: ir.plan,
            nodes,
            edges: ir.edges.into_iter().map(EdgeIr::into_edge).collect(),
        };
        topology.normalize_order();
        Ok(topology)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeIr {
    pub id: usize,
    pub name: String,
    pub attrs: NodeAttrs,
}

impl NodeIr {
    fn from_node(id: NodeId, node: &Node) -> Self {
        Self {
            id: id.0,
            name: node.name.clone(),
            attrs: node.attrs.clone(),
        }
    }

    fn into_node(self) -> Node {
        Node {
            id: NodeId(self.id),
            name: self.name,
            attrs: self.attrs,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeIr {
    pub from: usize,
    pub to: usize,
    pub kind: EdgeKind,
}

impl From<&Edge> for EdgeIr {
    fn from(edge: &Edge) -> Self {
        Self {
            from: edge.from.0,
            to: edge.to.0,
            kind: edge.kind.clone(),
        }
    }
}

impl EdgeIr {
    fn into_edge(self) -> Edge {
        Edge {
            from: NodeId(self.from),
            to: NodeId(self.to),
            kind: self.kind,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TopologyIrError {
    #[error("topology IR schema mismatch: expected {expected}, got {actual}")]
    SchemaMismatch {
        expected: &'static str,
        actual: String,
    },
    #[error("topology IR version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },
    #[error("topology IR has duplicate node id {id}")]
    DuplicateNodeId { id: usize },
    #[error("topology IR missing node {id} referenced by {context}")]
    MissingNode { id: usize, context: String },
}

fn ensure_node(
    nodes: &[Node],
    id: usize,
    context: impl FnOnce() -> String,
) -> Result<(), TopologyIrError> {
    if id < nodes.len() {
        Ok(())
    } else {
        Err(TopologyIrError::MissingNode {
            id,
            context: context(),
        })
    }
}
