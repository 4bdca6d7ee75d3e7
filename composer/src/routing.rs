use std::collections::{BTreeMap, BTreeSet};

use gantry_context::Environment;
use gantry_plan::{ListenerProtocol, Plan, RoutingDecl, ServiceName, TargetProtocol};
use gantry_topology::{
    EdgeKind, ListenerSpec, NodeAttrs, NodeId, Target, TargetGroupSpec, Topology,
};

use crate::{Error, lint::ComposeWarning, resolve::ExternalNodes};

/// Attach listeners and target groups to the shared load balancer.
///
/// TLS terminates at the balancer: a `tls` listener decrypts with its
/// certificate and forwards according to the target group's declared
/// protocol, so a `tcp` target group behind it carries plaintext to the
/// service.
///
/// Every listener is checked before any node is pushed; a failing listener
/// leaves the topology without routing nodes at all.
pub(crate) fn compose_routing(
    routing: &RoutingDecl,
    plan: &Plan,
    service_nodes: &BTreeMap<ServiceName, NodeId>,
    environment: &Environment,
    externals: &ExternalNodes,
    topology: &mut Topology,
    warnings: &mut Vec<ComposeWarning>,
) -> Result<(), Error> {
    let mut claimed = BTreeSet::new();
    for listener in &routing.listeners {
        if listener.protocol == ListenerProtocol::Tls && listener.certificate.is_none() {
            return Err(Error::MissingCertificate {
                port: listener.port,
            });
        }
        if !claimed.insert((listener.port, listener.protocol)) {
            return Err(Error::PortConflict {
                port: listener.port,
                protocol: listener.protocol,
            });
        }
        for target in &listener.targets {
            let Some(decl) = plan.services().get(&target.service) else {
                return Err(Error::DanglingTarget {
                    port: listener.port,
                    service: target.service.to_string(),
                });
            };
            if !decl
                .task
                .ports
                .iter()
                .any(|mapping| mapping.name == target.port)
            {
                return Err(Error::UnknownTargetPort {
                    port: listener.port,
                    service: target.service.to_string(),
                    target_port: target.port.to_string(),
                });
            }
        }
    }

    for listener in &routing.listeners {
        let (certificate, tls_policy) = match listener.protocol {
            ListenerProtocol::Tls => {
                let certificate = listener
                    .certificate
                    .as_deref()
                    .expect("tls listeners were checked for a certificate");
                (
                    Some(environment.certificate_arn(certificate)),
                    Some(listener.tls_policy.unwrap_or_default()),
                )
            }
            // A plain listener carries no TLS settings, even if declared.
            ListenerProtocol::Tcp => (None, None),
        };

        let spec = ListenerSpec {
            port: listener.port,
            protocol: listener.protocol,
            certificate,
            tls_policy,
        };
        let listener_node = topology.push_node(
            format!("listener-{}-{}", listener.port, listener.protocol),
            NodeAttrs::Listener(spec),
        );

        let mut targets = Vec::with_capacity(listener.targets.len());
        let mut targeted = Vec::new();
        for target in &listener.targets {
            let decl = plan
                .services()
                .get(&target.service)
                .expect("targets were checked against declared services");
            let mapping = decl
                .task
                .ports
                .iter()
                .find(|mapping| mapping.name == target.port)
                .expect("target ports were checked against task port mappings");

            if listener.protocol == ListenerProtocol::Tls
                && listener.target_protocol == TargetProtocol::Tcp
            {
                warnings.push(ComposeWarning::PlaintextBehindTls {
                    listener_port: listener.port,
                    service: target.service.to_string(),
                    container_port: mapping.container_port,
                });
            }

            targets.push(Target {
                service: target.service.clone(),
                container: decl.task.container.clone(),
                container_port: mapping.container_port,
            });
            if !targeted.contains(&target.service) {
                targeted.push(target.service.clone());
            }
        }

        let group = TargetGroupSpec {
            port: listener.port,
            protocol: listener.target_protocol,
            targets,
        };
        let group_node = topology.push_node(
            format!("targets-{}-{}", listener.port, listener.protocol),
            NodeAttrs::TargetGroup(group),
        );

        topology.push_edge(listener_node, externals.load_balancer(), EdgeKind::AttachedTo);
        topology.push_edge(listener_node, group_node, EdgeKind::ForwardsTo);
        for service in &targeted {
            let service_node = service_nodes
                .get(service)
                .copied()
                .expect("services were composed before routing");
            topology.push_edge(group_node, service_node, EdgeKind::Targets);
        }
    }

    Ok(())
}
