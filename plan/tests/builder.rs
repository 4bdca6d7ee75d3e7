use bon::map;
use gantry_plan::{
    ContainerName, DeploymentDecl, Error, ListenerDecl, ListenerProtocol, Plan, PortMapping,
    PortName, RoutingDecl, ServiceDecl, ServiceName, TargetRef, TaskDecl,
};
use semver::Version;

fn web_task() -> TaskDecl {
    TaskDecl::builder()
        .container("web".parse::<ContainerName>().unwrap())
        .image("bitnami/openresty")
        .cpu(512)
        .memory(512)
        .ports(vec![
            PortMapping::builder()
                .name("web".parse::<PortName>().unwrap())
                .container_port(8080)
                .host_port(8080)
                .build(),
        ])
        .build()
}

#[test]
fn plan_builder_constructs_a_valid_plan() {
    let services = map! {
        "web": ServiceDecl::builder()
            .task(web_task())
            .deployment(DeploymentDecl::builder().build())
            .build(),
    };

    let plan = Plan::builder()
        .services(services)
        .build()
        .expect("builder should produce a valid plan");

    assert_eq!(plan.plan_version(), &Version::new(0, 1, 0));
    assert_eq!(plan.services().len(), 1);
    assert!(plan.routing().is_none());
}

#[test]
fn plan_builder_rejects_duplicate_host_ports() {
    let task = TaskDecl::builder()
        .container("web".parse::<ContainerName>().unwrap())
        .image("bitnami/openresty")
        .cpu(512)
        .memory(512)
        .ports(vec![
            PortMapping::builder()
                .name("web".parse::<PortName>().unwrap())
                .container_port(8080)
                .host_port(8080)
                .build(),
            PortMapping::builder()
                .name("web-secure".parse::<PortName>().unwrap())
                .container_port(8443)
                .host_port(8080)
                .build(),
        ])
        .build();

    let services = map! {
        "web": ServiceDecl::builder()
            .task(task)
            .deployment(DeploymentDecl::builder().build())
            .build(),
    };

    let err = Plan::builder().services(services).build().unwrap_err();

    assert!(matches!(err, Error::DuplicateHostPort { .. }));
}

#[test]
fn plan_builder_rejects_empty_listener_targets() {
    let routing = RoutingDecl::builder()
        .listeners(vec![
            ListenerDecl::builder()
                .port(80)
                .protocol(ListenerProtocol::Tcp)
                .targets(Vec::new())
                .build(),
        ])
        .build();

    let err = Plan::builder().routing(routing).build().unwrap_err();

    assert!(matches!(err, Error::EmptyListenerTargets { port: 80 }));
}

#[test]
fn plan_builder_accepts_routing_targets() {
    let services = map! {
        "web": ServiceDecl::builder()
            .task(web_task())
            .deployment(DeploymentDecl::builder().build())
            .build(),
    };

    let routing = RoutingDecl::builder()
        .listeners(vec![
            ListenerDecl::builder()
                .port(80)
                .protocol(ListenerProtocol::Tcp)
                .targets(vec![
                    TargetRef::builder()
                        .service("web".parse::<ServiceName>().unwrap())
                        .port("web".parse::<PortName>().unwrap())
                        .build(),
                ])
                .build(),
        ])
        .build();

    let plan = Plan::builder()
        .services(services)
        .routing(routing)
        .build()
        .expect("builder should produce a valid plan");

    assert_eq!(plan.routing().unwrap().load_balancer, "load-balancer");
}
