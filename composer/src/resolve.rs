use std::collections::BTreeMap;

use gantry_context::{ExternalKind, ProvisioningContext};
use gantry_plan::Plan;
use gantry_topology::{EdgeKind, NodeAttrs, NodeId, Topology};

use crate::Error;

/// Nodes for every externally-provisioned resource the plan references,
/// keyed by export key.
pub(crate) struct ExternalNodes {
    clusters: BTreeMap<String, NodeId>,
    log_groups: BTreeMap<String, NodeId>,
    buckets: BTreeMap<String, NodeId>,
    namespaces: BTreeMap<String, NodeId>,
    load_balancer: Option<NodeId>,
}

impl ExternalNodes {
    pub(crate) fn cluster(&self, key: &str) -> NodeId {
        *self
            .clusters
            .get(key)
            .expect("cluster was bound during reference resolution")
    }

    pub(crate) fn log_group(&self, key: &str) -> NodeId {
        *self
            .log_groups
            .get(key)
            .expect("log group was bound during reference resolution")
    }

    pub(crate) fn bucket(&self, key: &str) -> NodeId {
        *self
            .buckets
            .get(key)
            .expect("bucket was bound during reference resolution")
    }

    pub(crate) fn namespace(&self, key: &str) -> NodeId {
        *self
            .namespaces
            .get(key)
            .expect("namespace was bound during reference resolution")
    }

    pub(crate) fn load_balancer(&self) -> NodeId {
        self.load_balancer
            .expect("load balancer was bound during reference resolution")
    }
}

/// Bind every external reference the plan makes to a catalog entry.
///
/// Walks the plan in declaration order and pushes one node per distinct
/// export key. The first unresolved key aborts the pass, so a topology is
/// only ever built against a fully resolved context.
pub(crate) fn resolve(
    context: &ProvisioningContext,
    plan: &Plan,
    topology: &mut Topology,
) -> Result<ExternalNodes, Error> {
    let network = context.resolve(ExternalKind::Network, "network")?;
    let network = topology.push_node(network.key.clone(), NodeAttrs::External(network));

    let mut externals = ExternalNodes {
        clusters: BTreeMap::new(),
        log_groups: BTreeMap::new(),
        buckets: BTreeMap::new(),
        namespaces: BTreeMap::new(),
        load_balancer: None,
    };

    for decl in plan.services().values() {
        let deployment = &decl.deployment;

        if !externals.clusters.contains_key(&deployment.cluster) {
            let cluster = context.resolve(ExternalKind::Cluster, &deployment.cluster)?;
            let id = topology.push_node(cluster.key.clone(), NodeAttrs::External(cluster));
            topology.push_edge(id, network, EdgeKind::InNetwork);
            externals.clusters.insert(deployment.cluster.clone(), id);
        }

        if let Some(log) = &decl.task.log
            && !externals.log_groups.contains_key(&log.sink)
        {
            let group = context.resolve(ExternalKind::LogGroup, &log.sink)?;
            let id = topology.push_node(group.key.clone(), NodeAttrs::External(group));
            externals.log_groups.insert(log.sink.clone(), id);
        }

        for grant in &decl.task.store_grants {
            if !externals.buckets.contains_key(&grant.store) {
                let bucket = context.resolve(ExternalKind::Bucket, &grant.store)?;
                let id = topology.push_node(bucket.key.clone(), NodeAttrs::External(bucket));
                externals.buckets.insert(grant.store.clone(), id);
            }
        }

        if let Some(discovery) = &deployment.discovery
            && !externals.namespaces.contains_key(&discovery.namespace)
        {
            let namespace = context.resolve_namespace(&discovery.namespace)?;
            let id = topology.push_node(namespace.key.clone(), NodeAttrs::DnsNamespace(namespace));
            externals.namespaces.insert(discovery.namespace.clone(), id);
        }
    }

    if let Some(routing) = plan.routing() {
        let balancer = context.resolve(ExternalKind::LoadBalancer, &routing.load_balancer)?;
        let guard_key = format!("{}-security-group", routing.load_balancer);
        let guard = context.resolve(ExternalKind::SecurityGroup, &guard_key)?;

        let balancer = topology.push_node(balancer.key.clone(), NodeAttrs::External(balancer));
        let guard = topology.push_node(guard.key.clone(), NodeAttrs::External(guard));
        topology.push_edge(balancer, guard, EdgeKind::GuardedBy);
        externals.load_balancer = Some(balancer);
    }

    Ok(externals)
}
