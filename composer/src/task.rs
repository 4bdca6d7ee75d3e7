use std::collections::BTreeSet;

use gantry_plan::{IamStatement, ServiceDecl, ServiceName, StoreAccess};
use gantry_topology::{EdgeKind, NodeAttrs, NodeId, TaskSpec, Topology};

use crate::{Error, resolve::ExternalNodes};

const STORE_READ_ACTIONS: [&str; 3] = ["s3:GetObject*", "s3:GetBucket*", "s3:List*"];

const STORE_WRITE_ACTIONS: [&str; 7] = [
    "s3:Abort*",
    "s3:DeleteObject*",
    "s3:PutObject",
    "s3:PutObjectLegalHold",
    "s3:PutObjectRetention",
    "s3:PutObjectTagging",
    "s3:PutObjectVersionTagging",
];

/// Build the task node for one service and wire it to its log sink and
/// stores.
///
/// Declared policy statements are merged with the synthesized ones as a
/// set union; a statement repeated across sources lands once.
pub(crate) fn build_task(
    service: &ServiceName,
    decl: &ServiceDecl,
    externals: &ExternalNodes,
    topology: &mut Topology,
) -> Result<NodeId, Error> {
    let task_decl = &decl.task;
    if task_decl.cpu == 0 || task_decl.memory == 0 {
        return Err(Error::InvalidSizing {
            service: service.to_string(),
            cpu: task_decl.cpu,
            memory: task_decl.memory,
        });
    }

    let mut execution_policies = task_decl.execution_policies.clone();
    if task_decl.log.is_some() {
        execution_policies.extend(log_shipping_statements());
    }

    let mut task_policies = task_decl.task_policies.clone();
    for grant in &task_decl.store_grants {
        let arn = bucket_arn(topology, externals.bucket(&grant.store));
        task_policies.insert(store_grant_statement(grant.access, &arn));
    }
    if decl.deployment.remote_exec {
        task_policies.insert(remote_exec_statement());
    }

    let spec = TaskSpec {
        container: task_decl.container.clone(),
        image: task_decl.image.clone(),
        cpu: task_decl.cpu,
        memory: task_decl.memory,
        port_mappings: task_decl.ports.clone(),
        log_stream_prefix: task_decl.log.as_ref().map(|log| log.stream_prefix.clone()),
        execution_policies,
        task_policies,
    };
    let task = topology.push_node(format!("{service}-task"), NodeAttrs::Task(spec));

    if let Some(log) = &task_decl.log {
        topology.push_edge(task, externals.log_group(&log.sink), EdgeKind::LogsTo);
    }
    for grant in &task_decl.store_grants {
        topology.push_edge(
            task,
            externals.bucket(&grant.store),
            EdgeKind::StoreAccess {
                access: grant.access,
            },
        );
    }

    Ok(task)
}

fn bucket_arn(topology: &Topology, bucket: NodeId) -> String {
    let NodeAttrs::External(external) = &topology.node(bucket).attrs else {
        unreachable!("store grants bind to external nodes");
    };
    if external.id.starts_with("arn:") {
        external.id.clone()
    } else {
        format!("arn:aws:s3:::{}", external.id)
    }
}

fn log_shipping_statements() -> [IamStatement; 2] {
    [
        statement(&["logs:CreateLogStream", "logs:PutLogEvents"], &["*"]),
        statement(&["logs:*"], &["*"]),
    ]
}

fn remote_exec_statement() -> IamStatement {
    statement(
        &[
            "ssmmessages:CreateControlChannel",
            "ssmmessages:CreateDataChannel",
            "ssmmessages:OpenControlChannel",
            "ssmmessages:OpenDataChannel",
        ],
        &["*"],
    )
}

/// Read-write is the union of the read and write action sets, never a
/// wildcard.
fn store_grant_statement(access: StoreAccess, arn: &str) -> IamStatement {
    let mut actions = BTreeSet::new();
    if matches!(access, StoreAccess::Read | StoreAccess::ReadWrite) {
        actions.extend(STORE_READ_ACTIONS.iter().map(|action| action.to_string()));
    }
    if matches!(access, StoreAccess::Write | StoreAccess::ReadWrite) {
        actions.extend(STORE_WRITE_ACTIONS.iter().map(|action| action.to_string()));
    }

    IamStatement::builder()
        .actions(actions)
        .resources(BTreeSet::from([arn.to_string(), format!("{arn}/*")]))
        .build()
}

fn statement(actions: &[&str], resources: &[&str]) -> IamStatement {
    IamStatement::builder()
        .actions(actions.iter().map(|action| action.to_string()).collect())
        .resources(
            resources
                .iter()
                .map(|resource| resource.to_string())
                .collect(),
        )
        .build()
}
