#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use gantry_context::ProvisioningContext;
use gantry_plan::{ListenerProtocol, Plan};
use gantry_topology::Topology;
use miette::Diagnostic;
use thiserror::Error;

mod lint;
mod resolve;
mod routing;
mod service;
mod task;

pub mod reporter;

pub use lint::ComposeWarning;

#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolve(#[from] gantry_context::ContextError),

    #[error(
        "service `{service}` must size cpu and memory above zero, got cpu {cpu} and memory \
         {memory}"
    )]
    #[diagnostic(code(composer::invalid_sizing))]
    InvalidSizing {
        service: String,
        cpu: u32,
        memory: u32,
    },

    #[error("listener {port} speaks tls but declares no certificate")]
    #[diagnostic(
        code(composer::missing_certificate),
        help("Set `certificate` to an ACM ARN or a bare certificate id.")
    )]
    MissingCertificate { port: u16 },

    #[error("listener {port} targets undeclared service `{service}`")]
    #[diagnostic(code(composer::dangling_target))]
    DanglingTarget { port: u16, service: String },

    #[error(
        "listener {port} targets port mapping `{target_port}` which service `{service}` does \
         not declare"
    )]
    #[diagnostic(code(composer::unknown_target_port))]
    UnknownTargetPort {
        port: u16,
        service: String,
        target_port: String,
    },

    #[error("port {port} is claimed by more than one {protocol} listener")]
    #[diagnostic(code(composer::port_conflict))]
    PortConflict {
        port: u16,
        protocol: ListenerProtocol,
    },
}

/// A composed topology plus the advisory findings raised along the way.
#[derive(Clone, Debug)]
pub struct ComposeOutput {
    pub topology: Topology,
    pub warnings: Vec<ComposeWarning>,
}

/// Drives the composition passes over a validated plan.
#[derive(Clone, Debug)]
pub struct Composer {
    context: ProvisioningContext,
}

impl Composer {
    pub fn new(context: ProvisioningContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ProvisioningContext {
        &self.context
    }

    /// Compose a validated plan into a service topology graph.
    ///
    /// Passes run in a fixed order: external references bind first, then
    /// task nodes, then service nodes, then routing. Any error aborts the
    /// whole pass; a topology is returned complete or not at all. Composing
    /// the same plan against the same context twice yields the same graph.
    pub fn compose(&self, plan: &Plan) -> Result<ComposeOutput, Error> {
        let mut topology = Topology::new(plan.digest());
        let mut warnings = Vec::new();

        let externals = resolve::resolve(&self.context, plan, &mut topology)?;

        let mut task_nodes = BTreeMap::new();
        for (name, decl) in plan.services() {
            let task = task::build_task(name, decl, &externals, &mut topology)?;
            task_nodes.insert(name.clone(), task);
        }

        let mut service_nodes = BTreeMap::new();
        for (name, decl) in plan.services() {
            let task = task_nodes[name];
            let service = service::build_service(
                name,
                decl,
                task,
                &externals,
                &mut topology,
                &mut warnings,
            );
            service_nodes.insert(name.clone(), service);
        }

        if let Some(routing) = plan.routing() {
            routing::compose_routing(
                routing,
                plan,
                &service_nodes,
                self.context.environment(),
                &externals,
                &mut topology,
                &mut warnings,
            )?;
        }

        topology.normalize_order();
        topology.assert_invariants();

        Ok(ComposeOutput { topology, warnings })
    }
}
