use std::collections::BTreeSet;

use gantry_context::{ContextError, ExternalKind, ProvisioningContext};
use gantry_plan::{
    IamStatement, IngressSource, ListenerProtocol, Plan, StoreAccess, TargetProtocol, TlsPolicy,
};
use gantry_topology::{
    EdgeKind, ListenerSpec, Node, NodeAttrs, ServiceSpec, TargetGroupSpec, TaskSpec, Topology,
    TopologyIr,
};

use crate::{ComposeOutput, ComposeWarning, Composer, Error};

#[test]
fn composes_services_tasks_and_externals() {
    let output = compose(OPENRESTY_PLAN, full_context());
    let topology = &output.topology;

    let names: Vec<&str> = topology
        .nodes_iter()
        .map(|(_, node)| node.name.as_str())
        .collect();
    assert_eq!(
        names,
        [
            "network",
            "cluster",
            "log-group",
            "bucket",
            "namespace",
            "load-balancer",
            "load-balancer-security-group",
            "web-task",
            "web",
            "listener-80-tcp",
            "targets-80-tcp",
            "listener-443-tls",
            "targets-443-tls",
        ]
    );

    let service = service_spec(topology, "web");
    assert_eq!(service.desired_count, 0);
    assert!(service.remote_exec);
    assert_eq!(service.discovery.as_ref().unwrap().as_str(), "openresty");
    assert_eq!(service.placement.len(), 2);
    assert_eq!(service.capacity[0].provider.as_str(), "AL2023AsgCapProvider");
    assert_eq!(service.capacity[0].weight, 1);

    assert_eq!(service.ingress.len(), 2);
    assert_eq!(service.ingress[0].port, 8080);
    assert_eq!(service.ingress[1].port, 8443);
    assert!(matches!(service.ingress[0].source, IngressSource::OpenToAny));

    let task = task_spec(topology, "web-task");
    assert_eq!(task.image, "bitnami/openresty:latest");
    assert_eq!(task.cpu, 512);
    assert_eq!(task.memory, 512);
    assert_eq!(task.port_mappings.len(), 2);
    assert_eq!(task.log_stream_prefix.as_deref(), Some("OpenRestyLogs"));

    assert!(has_edge(topology, "cluster", "network", EdgeKind::InNetwork));
    assert!(has_edge(
        topology,
        "load-balancer",
        "load-balancer-security-group",
        EdgeKind::GuardedBy
    ));
    assert!(has_edge(topology, "web", "cluster", EdgeKind::RunsOn));
    assert!(has_edge(topology, "web", "web-task", EdgeKind::Runs));
    assert!(has_edge(topology, "web", "namespace", EdgeKind::RegistersIn));
    assert!(has_edge(topology, "web-task", "log-group", EdgeKind::LogsTo));
    assert!(has_edge(
        topology,
        "web-task",
        "bucket",
        EdgeKind::StoreAccess {
            access: StoreAccess::ReadWrite
        }
    ));
}

#[test]
fn synthesizes_task_role_policies() {
    let output = compose(OPENRESTY_PLAN, full_context());
    let task = task_spec(&output.topology, "web-task");

    let expected_execution: BTreeSet<IamStatement> = [
        IamStatement::builder()
            .actions(string_set(&["logs:CreateLogStream", "logs:PutLogEvents"]))
            .resources(string_set(&["*"]))
            .build(),
        IamStatement::builder()
            .actions(string_set(&["logs:*"]))
            .resources(string_set(&["*"]))
            .build(),
    ]
    .into_iter()
    .collect();
    assert_eq!(task.execution_policies, expected_execution);

    assert_eq!(task.task_policies.len(), 2);
    let store = task
        .task_policies
        .iter()
        .find(|statement| statement.actions.iter().any(|action| action.starts_with("s3:")))
        .expect("store grant statement");
    assert_eq!(
        store.actions,
        string_set(&[
            "s3:Abort*",
            "s3:DeleteObject*",
            "s3:GetBucket*",
            "s3:GetObject*",
            "s3:List*",
            "s3:PutObject",
            "s3:PutObjectLegalHold",
            "s3:PutObjectRetention",
            "s3:PutObjectTagging",
            "s3:PutObjectVersionTagging",
        ])
    );
    assert_eq!(
        store.resources,
        string_set(&[
            "arn:aws:s3:::ecs-clusters-space",
            "arn:aws:s3:::ecs-clusters-space/*",
        ])
    );

    let remote_exec = task
        .task_policies
        .iter()
        .find(|statement| statement.actions.iter().any(|action| action.starts_with("ssmmessages:")))
        .expect("remote exec statement");
    assert_eq!(
        remote_exec.actions,
        string_set(&[
            "ssmmessages:CreateControlChannel",
            "ssmmessages:CreateDataChannel",
            "ssmmessages:OpenControlChannel",
            "ssmmessages:OpenDataChannel",
        ])
    );
    assert_eq!(remote_exec.resources, string_set(&["*"]));
}

#[test]
fn read_grant_expands_to_read_actions_only() {
    let plan = r#"{
        "plan_version": "0.1.0",
        "services": {
            "web": {
                "task": {
                    "container": "web",
                    "image": "nginx",
                    "cpu": 256,
                    "memory": 256,
                    "store_grants": [ { "store": "bucket", "access": "read" } ]
                },
                "deployment": {}
            }
        }
    }"#;
    let output = compose(plan, full_context());
    let task = task_spec(&output.topology, "web-task");

    assert!(task.execution_policies.is_empty());
    let store = task.task_policies.iter().next().unwrap();
    assert_eq!(
        store.actions,
        string_set(&["s3:GetBucket*", "s3:GetObject*", "s3:List*"])
    );
}

#[test]
fn declared_policies_merge_as_a_union() {
    let plan = r#"{
        "plan_version": "0.1.0",
        "services": {
            "web": {
                "task": {
                    "container": "web",
                    "image": "nginx",
                    "cpu": 256,
                    "memory": 256,
                    "task_policies": [
                        {
                            "actions": [
                                "ssmmessages:CreateControlChannel",
                                "ssmmessages:CreateDataChannel",
                                "ssmmessages:OpenControlChannel",
                                "ssmmessages:OpenDataChannel"
                            ],
                            "resources": ["*"]
                        }
                    ]
                },
                "deployment": { "remote_exec": true }
            }
        }
    }"#;
    let output = compose(plan, full_context());
    let task = task_spec(&output.topology, "web-task");

    // The declared statement and the synthesized one are the same set
    // element.
    assert_eq!(task.task_policies.len(), 1);
}

#[test]
fn composes_listeners_and_target_groups() {
    let output = compose(OPENRESTY_PLAN, full_context());
    let topology = &output.topology;

    let plain = listener_spec(topology, "listener-80-tcp");
    assert_eq!(plain.port, 80);
    assert_eq!(plain.protocol, ListenerProtocol::Tcp);
    assert_eq!(plain.certificate, None);
    assert_eq!(plain.tls_policy, None);

    let secure = listener_spec(topology, "listener-443-tls");
    assert_eq!(secure.port, 443);
    assert_eq!(secure.protocol, ListenerProtocol::Tls);
    assert_eq!(
        secure.certificate.as_deref(),
        Some(
            "arn:aws:acm:eu-west-1:123456789012:certificate/1ee19594-0000-0000-0000-000000000000"
        )
    );
    assert_eq!(secure.tls_policy, Some(TlsPolicy::Recommended));

    for name in ["targets-80-tcp", "targets-443-tls"] {
        let group = target_group_spec(topology, name);
        assert_eq!(group.protocol, TargetProtocol::Tcp);
        assert_eq!(group.targets.len(), 1);
        assert_eq!(group.targets[0].service.as_str(), "web");
        assert_eq!(group.targets[0].container.as_str(), "web");
        assert_eq!(group.targets[0].container_port, 8080);
    }

    for listener in ["listener-80-tcp", "listener-443-tls"] {
        assert!(has_edge(
            topology,
            listener,
            "load-balancer",
            EdgeKind::AttachedTo
        ));
    }
    assert!(has_edge(
        topology,
        "listener-80-tcp",
        "targets-80-tcp",
        EdgeKind::ForwardsTo
    ));
    assert!(has_edge(
        topology,
        "listener-443-tls",
        "targets-443-tls",
        EdgeKind::ForwardsTo
    ));
    assert!(has_edge(topology, "targets-80-tcp", "web", EdgeKind::Targets));
    assert!(has_edge(topology, "targets-443-tls", "web", EdgeKind::Targets));
}

#[test]
fn flags_open_ingress_and_plaintext_forwarding() {
    let output = compose(OPENRESTY_PLAN, full_context());

    let mut open_ports = Vec::new();
    let mut plaintext = Vec::new();
    for warning in &output.warnings {
        match warning {
            ComposeWarning::OpenIngress { service, port } => {
                assert_eq!(service, "web");
                open_ports.push(*port);
            }
            ComposeWarning::PlaintextBehindTls {
                listener_port,
                service,
                container_port,
            } => {
                assert_eq!(service, "web");
                plaintext.push((*listener_port, *container_port));
            }
            other => panic!("unexpected warning: {other}"),
        }
    }
    assert_eq!(open_ports, [8080, 8443]);
    assert_eq!(plaintext, [(443, 8080)]);
}

#[test]
fn tls_target_protocol_silences_the_plaintext_warning() {
    let plan = r#"{
        "plan_version": "0.1.0",
        "services": {
            "web": {
                "task": {
                    "container": "web",
                    "image": "nginx",
                    "cpu": 256,
                    "memory": 256,
                    "ports": [ { "name": "web", "container_port": 8443, "host_port": 8443 } ]
                },
                "deployment": {}
            }
        },
        "routing": {
            "listeners": [
                {
                    "port": 443,
                    "protocol": "tls",
                    "certificate": "cafe0000-0000-0000-0000-000000000000",
                    "target_protocol": "tls",
                    "targets": [ { "service": "web", "port": "web" } ]
                }
            ]
        }
    }"#;
    let output = compose(plan, full_context());

    assert!(output.warnings.is_empty());
    let group = target_group_spec(&output.topology, "targets-443-tls");
    assert_eq!(group.protocol, TargetProtocol::Tls);
}

#[test]
fn plain_listener_drops_declared_tls_settings() {
    let plan = r#"{
        "plan_version": "0.1.0",
        "services": {
            "web": {
                "task": {
                    "container": "web",
                    "image": "nginx",
                    "cpu": 256,
                    "memory": 256,
                    "ports": [ { "name": "web", "container_port": 8080, "host_port": 8080 } ]
                },
                "deployment": {}
            }
        },
        "routing": {
            "listeners": [
                {
                    "port": 80,
                    "protocol": "tcp",
                    "certificate": "cafe0000-0000-0000-0000-000000000000",
                    "tls_policy": "legacy",
                    "targets": [ { "service": "web", "port": "web" } ]
                }
            ]
        }
    }"#;
    let output = compose(plan, full_context());

    let listener = listener_spec(&output.topology, "listener-80-tcp");
    assert_eq!(listener.certificate, None);
    assert_eq!(listener.tls_policy, None);
}

#[test]
fn compose_is_idempotent() {
    let plan: Plan = OPENRESTY_PLAN.parse().unwrap();
    let composer = Composer::new(full_context());

    let first = composer.compose(&plan).unwrap();
    let second = composer.compose(&plan).unwrap();

    assert_eq!(
        serde_json::to_value(TopologyIr::from(&first.topology)).unwrap(),
        serde_json::to_value(TopologyIr::from(&second.topology)).unwrap(),
    );
}

#[test]
fn topology_carries_the_plan_digest() {
    let plan: Plan = OPENRESTY_PLAN.parse().unwrap();
    let output = Composer::new(full_context()).compose(&plan).unwrap();

    assert_eq!(output.topology.plan_digest, plan.digest());
}

#[test]
fn missing_certificate_is_fatal() {
    let plan = r#"{
        "plan_version": "0.1.0",
        "services": {
            "web": {
                "task": {
                    "container": "web",
                    "image": "nginx",
                    "cpu": 256,
                    "memory": 256,
                    "ports": [ { "name": "web", "container_port": 8080, "host_port": 8080 } ]
                },
                "deployment": {}
            }
        },
        "routing": {
            "listeners": [
                { "port": 80, "protocol": "tcp", "targets": [ { "service": "web", "port": "web" } ] },
                { "port": 443, "protocol": "tls", "targets": [ { "service": "web", "port": "web" } ] }
            ]
        }
    }"#;
    let err = compose_err(plan, full_context());
    match err {
        Error::MissingCertificate { port } => assert_eq!(port, 443),
        other => panic!("expected missing certificate error, got: {other}"),
    }
}

#[test]
fn duplicate_listener_ports_conflict() {
    let plan = r#"{
        "plan_version": "0.1.0",
        "services": {
            "web": {
                "task": {
                    "container": "web",
                    "image": "nginx",
                    "cpu": 256,
                    "memory": 256,
                    "ports": [ { "name": "web", "container_port": 8080, "host_port": 8080 } ]
                },
                "deployment": {}
            }
        },
        "routing": {
            "listeners": [
                {
                    "port": 443,
                    "protocol": "tls",
                    "certificate": "cafe0000-0000-0000-0000-000000000000",
                    "targets": [ { "service": "web", "port": "web" } ]
                },
                {
                    "port": 443,
                    "protocol": "tls",
                    "certificate": "cafe0000-0000-0000-0000-000000000000",
                    "targets": [ { "service": "web", "port": "web" } ]
                }
            ]
        }
    }"#;
    let err = compose_err(plan, full_context());
    match err {
        Error::PortConflict { port, protocol } => {
            assert_eq!(port, 443);
            assert_eq!(protocol, ListenerProtocol::Tls);
        }
        other => panic!("expected port conflict error, got: {other}"),
    }
}

#[test]
fn dangling_target_is_fatal() {
    let plan = r#"{
        "plan_version": "0.1.0",
        "services": {
            "web": {
                "task": {
                    "container": "web",
                    "image": "nginx",
                    "cpu": 256,
                    "memory": 256,
                    "ports": [ { "name": "web", "container_port": 8080, "host_port": 8080 } ]
                },
                "deployment": {}
            }
        },
        "routing": {
            "listeners": [
                { "port": 80, "protocol": "tcp", "targets": [ { "service": "ghost", "port": "web" } ] }
            ]
        }
    }"#;
    let err = compose_err(plan, full_context());
    match err {
        Error::DanglingTarget { port, service } => {
            assert_eq!(port, 80);
            assert_eq!(service, "ghost");
        }
        other => panic!("expected dangling target error, got: {other}"),
    }
}

#[test]
fn unmapped_target_port_is_fatal() {
    let plan = r#"{
        "plan_version": "0.1.0",
        "services": {
            "web": {
                "task": {
                    "container": "web",
                    "image": "nginx",
                    "cpu": 256,
                    "memory": 256,
                    "ports": [ { "name": "web", "container_port": 8080, "host_port": 8080 } ]
                },
                "deployment": {}
            }
        },
        "routing": {
            "listeners": [
                { "port": 80, "protocol": "tcp", "targets": [ { "service": "web", "port": "admin" } ] }
            ]
        }
    }"#;
    let err = compose_err(plan, full_context());
    match err {
        Error::UnknownTargetPort {
            port,
            service,
            target_port,
        } => {
            assert_eq!(port, 80);
            assert_eq!(service, "web");
            assert_eq!(target_port, "admin");
        }
        other => panic!("expected unknown target port error, got: {other}"),
    }
}

#[test]
fn zero_sizing_is_fatal() {
    let plan = r#"{
        "plan_version": "0.1.0",
        "services": {
            "web": {
                "task": { "container": "web", "image": "nginx", "cpu": 0, "memory": 512 },
                "deployment": {}
            }
        }
    }"#;
    let err = compose_err(plan, full_context());
    match err {
        Error::InvalidSizing {
            service,
            cpu,
            memory,
        } => {
            assert_eq!(service, "web");
            assert_eq!(cpu, 0);
            assert_eq!(memory, 512);
        }
        other => panic!("expected invalid sizing error, got: {other}"),
    }
}

#[test]
fn unresolved_reference_is_fatal() {
    let context: ProvisioningContext = r#"{
        "environment": { "account": "123456789012", "region": "eu-west-1" },
        "exports": { "network": "vpc-0f00ba11", "cluster": "tqsft-services" }
    }"#
    .parse()
    .unwrap();
    let plan = r#"{
        "plan_version": "0.1.0",
        "services": {
            "web": {
                "task": {
                    "container": "web",
                    "image": "nginx",
                    "cpu": 256,
                    "memory": 256,
                    "store_grants": [ { "store": "bucket", "access": "read" } ]
                },
                "deployment": {}
            }
        }
    }"#;
    let err = compose_err(plan, context);
    match err {
        Error::Resolve(ContextError::UnresolvedReference { kind, key }) => {
            assert_eq!(kind, ExternalKind::Bucket);
            assert_eq!(key, "bucket");
        }
        other => panic!("expected unresolved reference error, got: {other}"),
    }
}

#[test]
fn routing_free_plan_needs_no_balancer_exports() {
    let context: ProvisioningContext = r#"{
        "environment": { "account": "123456789012", "region": "eu-west-1" },
        "exports": { "network": "vpc-0f00ba11", "cluster": "tqsft-services" }
    }"#
    .parse()
    .unwrap();
    let plan = r#"{
        "plan_version": "0.1.0",
        "services": {
            "web": {
                "task": { "container": "web", "image": "nginx", "cpu": 256, "memory": 256 },
                "deployment": {}
            }
        }
    }"#;
    let output = compose(plan, context);

    assert!(
        output
            .topology
            .nodes_iter()
            .all(|(_, node)| !matches!(node.attrs, NodeAttrs::Listener(_))),
    );
    assert!(output.warnings.is_empty());
}

const OPENRESTY_PLAN: &str = r#"{
    "plan_version": "0.1.0",
    "services": {
        "web": {
            "task": {
                "container": "web",
                "image": "bitnami/openresty:latest",
                "cpu": 512,
                "memory": 512,
                "ports": [
                    { "name": "web", "container_port": 8080, "host_port": 8080 },
                    { "name": "web-secure", "container_port": 8443, "host_port": 8443 }
                ],
                "log": { "stream_prefix": "OpenRestyLogs" },
                "store_grants": [ { "store": "bucket", "access": "read-write" } ]
            },
            "deployment": {
                "desired_count": 0,
                "placement": ["packed-by-memory", "packed-by-cpu"],
                "capacity": [ { "provider": "AL2023AsgCapProvider", "weight": 1 } ],
                "ingress": [
                    { "port": "web", "source": "open-to-any" },
                    { "port": "web-secure", "source": "open-to-any" }
                ],
                "discovery": { "name": "openresty" },
                "remote_exec": true
            }
        }
    },
    "routing": {
        "listeners": [
            {
                "port": 80,
                "protocol": "tcp",
                "targets": [ { "service": "web", "port": "web" } ]
            },
            {
                "port": 443,
                "protocol": "tls",
                "certificate": "1ee19594-0000-0000-0000-000000000000",
                "targets": [ { "service": "web", "port": "web" } ]
            }
        ]
    }
}"#;

fn full_context() -> ProvisioningContext {
    r#"{
        "environment": { "account": "123456789012", "region": "eu-west-1" },
        "exports": {
            "network": "vpc-0f00ba11",
            "cluster": "tqsft-services",
            "log-group": "/ecs/tqsft-services",
            "bucket": "ecs-clusters-space",
            "namespace-id": "ns-f00",
            "namespace-arn": "arn:aws:servicediscovery:eu-west-1:123456789012:namespace/ns-f00",
            "namespace-name": "tqsft.local",
            "load-balancer": "tqsft-lb",
            "load-balancer-security-group": "sg-0aa11bb22cc33dd44"
        }
    }"#
    .parse()
    .unwrap()
}

fn compose(plan: &str, context: ProvisioningContext) -> ComposeOutput {
    let plan: Plan = plan.parse().unwrap();
    Composer::new(context).compose(&plan).unwrap()
}

fn compose_err(plan: &str, context: ProvisioningContext) -> Error {
    let plan: Plan = plan.parse().unwrap();
    Composer::new(context).compose(&plan).unwrap_err()
}

fn node_named<'a>(topology: &'a Topology, name: &str) -> &'a Node {
    topology
        .nodes_iter()
        .map(|(_, node)| node)
        .find(|node| node.name == name)
        .unwrap_or_else(|| panic!("no node named `{name}`"))
}

fn has_edge(topology: &Topology, from: &str, to: &str, kind: EdgeKind) -> bool {
    topology.edges.iter().any(|edge| {
        topology.node(edge.from).name == from
            && topology.node(edge.to).name == to
            && edge.kind == kind
    })
}

fn service_spec<'a>(topology: &'a Topology, name: &str) -> &'a ServiceSpec {
    match &node_named(topology, name).attrs {
        NodeAttrs::Service(spec) => spec,
        other => panic!("expected a service node, got: {other:?}"),
    }
}

fn task_spec<'a>(topology: &'a Topology, name: &str) -> &'a TaskSpec {
    match &node_named(topology, name).attrs {
        NodeAttrs::Task(spec) => spec,
        other => panic!("expected a task node, got: {other:?}"),
    }
}

fn listener_spec<'a>(topology: &'a Topology, name: &str) -> &'a ListenerSpec {
    match &node_named(topology, name).attrs {
        NodeAttrs::Listener(spec) => spec,
        other => panic!("expected a listener node, got: {other:?}"),
    }
}

fn target_group_spec<'a>(topology: &'a Topology, name: &str) -> &'a TargetGroupSpec {
    match &node_named(topology, name).attrs {
        NodeAttrs::TargetGroup(spec) => spec,
        other => panic!("expected a target group node, got: {other:?}"),
    }
}

fn string_set(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|value| value.to_string()).collect()
}
