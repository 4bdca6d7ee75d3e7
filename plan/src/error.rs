use miette::Diagnostic;
use semver::Version;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid plan document: {0}")]
    #[diagnostic(code(plan::parse_error))]
    Parse(#[from] serde_json::Error),

    #[error("unsupported plan version `{version}` (supported: {supported_req})")]
    #[diagnostic(code(plan::unsupported_version))]
    UnsupportedPlanVersion {
        version: Version,
        supported_req: &'static str,
    },

    #[error("invalid {kind} name `{name}`: names must be non-empty and dot-free")]
    #[diagnostic(code(plan::invalid_name))]
    InvalidName { kind: &'static str, name: String },

    #[error("service `{service}` has no image")]
    #[diagnostic(code(plan::empty_image))]
    EmptyImage { service: String },

    #[error("service `{service}` declares port mapping `{name}` more than once")]
    #[diagnostic(code(plan::duplicate_port_name))]
    DuplicatePortName { service: String, name: String },

    #[error("service `{service}` maps host port {port} more than once")]
    #[diagnostic(code(plan::duplicate_host_port))]
    DuplicateHostPort { service: String, port: u16 },

    #[error("ingress rule on service `{service}` references unknown port mapping `{port}`")]
    #[diagnostic(code(plan::unknown_ingress_port))]
    UnknownIngressPort { service: String, port: String },

    #[error("listener {port} declares no targets")]
    #[diagnostic(code(plan::empty_listener_targets))]
    EmptyListenerTargets { port: u16 },

    #[error("invalid plan digest `{0}`")]
    #[diagnostic(code(plan::invalid_digest))]
    InvalidPlanDigest(String),
}
