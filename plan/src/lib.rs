mod digest;
mod error;
mod names;
mod schema;

use std::{
    collections::{BTreeMap, BTreeSet},
    str::FromStr,
    sync::OnceLock,
};

use bon::bon;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use serde_with::{MapPreventDuplicates, serde_as};

pub use crate::{
    digest::PlanDigest,
    error::Error,
    names::{ContainerName, PortName, ProviderName, RecordName, ServiceName},
    schema::{
        CapacityTarget, DeploymentDecl, DiscoveryDecl, Effect, IamStatement, IngressProtocol,
        IngressRule, IngressSource, ListenerDecl, ListenerProtocol, LogDecl, PlacementRule,
        PortMapping, RoutingDecl, ServiceDecl, StoreAccess, StoreGrant, TargetProtocol, TargetRef,
        TaskDecl, TlsPolicy,
    },
};

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct RawPlan {
    pub plan_version: Version,
    #[serde_as(as = "MapPreventDuplicates<_, _>")]
    #[serde(default)]
    pub services: BTreeMap<String, ServiceDecl>,
    #[serde(default)]
    pub routing: Option<RoutingDecl>,
}

const SUPPORTED_PLAN_VERSION_REQ: &str = "^0.1.0";

fn supported_plan_version_req() -> &'static VersionReq {
    static REQ: OnceLock<VersionReq> = OnceLock::new();
    REQ.get_or_init(|| {
        VersionReq::parse(SUPPORTED_PLAN_VERSION_REQ)
            .expect("supported plan version requirement must be valid")
    })
}

fn convert_services(
    services: BTreeMap<String, ServiceDecl>,
) -> Result<BTreeMap<ServiceName, ServiceDecl>, Error> {
    services
        .into_iter()
        .map(|(name, decl)| Ok((ServiceName::try_from(name)?, decl)))
        .collect::<Result<BTreeMap<_, _>, Error>>()
}

fn validate_task(service: &ServiceName, task: &TaskDecl) -> Result<(), Error> {
    if task.image.is_empty() {
        return Err(Error::EmptyImage {
            service: service.to_string(),
        });
    }

    let mut names = BTreeSet::new();
    let mut host_ports = BTreeSet::new();
    for mapping in &task.ports {
        if !names.insert(mapping.name.clone()) {
            return Err(Error::DuplicatePortName {
                service: service.to_string(),
                name: mapping.name.to_string(),
            });
        }
        if !host_ports.insert(mapping.host_port) {
            return Err(Error::DuplicateHostPort {
                service: service.to_string(),
                port: mapping.host_port,
            });
        }
    }

    Ok(())
}

fn validate_ingress(service: &ServiceName, decl: &ServiceDecl) -> Result<(), Error> {
    for rule in &decl.deployment.ingress {
        if !decl
            .task
            .ports
            .iter()
            .any(|mapping| mapping.name == rule.port)
        {
            return Err(Error::UnknownIngressPort {
                service: service.to_string(),
                port: rule.port.to_string(),
            });
        }
    }
    Ok(())
}

fn validate_routing(routing: &RoutingDecl) -> Result<(), Error> {
    for listener in &routing.listeners {
        if listener.targets.is_empty() {
            return Err(Error::EmptyListenerTargets {
                port: listener.port,
            });
        }
    }
    Ok(())
}

impl RawPlan {
    fn digest(&self) -> PlanDigest {
        PlanDigest::digest(self)
    }

    fn validate_version(&self) -> Result<(), Error> {
        let req = supported_plan_version_req();
        if !req.matches(&self.plan_version) {
            return Err(Error::UnsupportedPlanVersion {
                version: self.plan_version.clone(),
                supported_req: SUPPORTED_PLAN_VERSION_REQ,
            });
        }
        Ok(())
    }

    pub fn validate(self) -> Result<Plan, Error> {
        self.validate_version()?;
        let digest = self.digest();

        let RawPlan {
            plan_version,
            services,
            routing,
        } = self;

        let services = convert_services(services)?;

        for (name, decl) in &services {
            validate_task(name, &decl.task)?;
            validate_ingress(name, decl)?;
        }

        if let Some(routing) = routing.as_ref() {
            validate_routing(routing)?;
        }

        Ok(Plan {
            plan_version,
            services,
            routing,
            digest,
        })
    }
}

/// A validated deployment plan. References into the provisioning context are
/// still unresolved keys here; only the plan's own shape has been checked.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "RawPlan", try_from = "RawPlan")]
pub struct Plan {
    plan_version: Version,
    services: BTreeMap<ServiceName, ServiceDecl>,
    routing: Option<RoutingDecl>,
    digest: PlanDigest,
}

impl Plan {
    pub fn plan_version(&self) -> &Version {
        &self.plan_version
    }

    pub fn services(&self) -> &BTreeMap<ServiceName, ServiceDecl> {
        &self.services
    }

    pub fn routing(&self) -> Option<&RoutingDecl> {
        self.routing.as_ref()
    }

    pub fn digest(&self) -> PlanDigest {
        self.digest
    }

    pub fn empty() -> Self {
        RawPlan {
            plan_version: Version::new(0, 1, 0),
            services: BTreeMap::new(),
            routing: None,
        }
        .validate()
        .expect("empty plan is valid")
    }
}

#[bon]
impl Plan {
    #[builder]
    pub fn new(
        #[builder(default = Version::new(0, 1, 0))] plan_version: Version,
        #[builder(default)] services: BTreeMap<String, ServiceDecl>,
        routing: Option<RoutingDecl>,
    ) -> Result<Self, Error> {
        RawPlan {
            plan_version,
            services,
            routing,
        }
        .validate()
    }
}

impl TryFrom<RawPlan> for Plan {
    type Error = Error;

    fn try_from(raw: RawPlan) -> Result<Self, Self::Error> {
        raw.validate()
    }
}

impl From<Plan> for RawPlan {
    fn from(plan: Plan) -> Self {
        RawPlan::from(&plan)
    }
}

impl From<&Plan> for RawPlan {
    fn from(plan: &Plan) -> Self {
        let services = plan
            .services
            .iter()
            .map(|(name, decl)| (name.to_string(), decl.clone()))
            .collect();

        RawPlan {
            plan_version: plan.plan_version.clone(),
            services,
            routing: plan.routing.clone(),
        }
    }
}

impl FromStr for Plan {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let raw: RawPlan = serde_json::from_str(input)?;
        raw.validate()
    }
}
