use gantry_plan::{IngressSource, ServiceDecl, ServiceName};
use gantry_topology::{EdgeKind, IngressSpec, NodeAttrs, NodeId, ServiceSpec, Topology};

use crate::{lint::ComposeWarning, resolve::ExternalNodes};

/// Build the service node for one declaration and wire it to its cluster,
/// task, and discovery namespace.
///
/// Ingress rules come out with the mapping name resolved to its host port.
/// An open-to-any rule composes like any other but is flagged.
pub(crate) fn build_service(
    name: &ServiceName,
    decl: &ServiceDecl,
    task: NodeId,
    externals: &ExternalNodes,
    topology: &mut Topology,
    warnings: &mut Vec<ComposeWarning>,
) -> NodeId {
    let deployment = &decl.deployment;

    let mut ingress = Vec::with_capacity(deployment.ingress.len());
    for rule in &deployment.ingress {
        let mapping = decl
            .task
            .ports
            .iter()
            .find(|mapping| mapping.name == rule.port)
            .expect("ingress ports were checked during plan validation");

        if matches!(rule.source, IngressSource::OpenToAny) {
            warnings.push(ComposeWarning::OpenIngress {
                service: name.to_string(),
                port: mapping.host_port,
            });
        }

        ingress.push(IngressSpec {
            port: mapping.host_port,
            protocol: rule.protocol,
            source: rule.source.clone(),
        });
    }

    let spec = ServiceSpec {
        name: name.clone(),
        desired_count: deployment.desired_count,
        placement: deployment.placement.clone(),
        capacity: deployment.capacity.clone(),
        ingress,
        discovery: deployment
            .discovery
            .as_ref()
            .map(|discovery| discovery.name.clone()),
        remote_exec: deployment.remote_exec,
    };
    let service = topology.push_node(name.as_str(), NodeAttrs::Service(spec));

    topology.push_edge(
        service,
        externals.cluster(&deployment.cluster),
        EdgeKind::RunsOn,
    );
    topology.push_edge(service, task, EdgeKind::Runs);
    if let Some(discovery) = &deployment.discovery {
        topology.push_edge(
            service,
            externals.namespace(&discovery.namespace),
            EdgeKind::RegistersIn,
        );
    }

    service
}
