use miette::Diagnostic;
use thiserror::Error;

/// Advisory findings raised while composing.
///
/// A warning never aborts a pass; callers decide whether to print it or
/// treat it as fatal.
#[derive(Clone, Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum ComposeWarning {
    #[error("service `{service}` admits traffic on port {port} from any source")]
    #[diagnostic(
        code(composer::open_ingress),
        severity(Warning),
        help("Restrict the rule to a CIDR if port {port} is not meant to be public.")
    )]
    OpenIngress { service: String, port: u16 },

    #[error(
        "listener {listener_port} terminates TLS and forwards plaintext to `{service}` port \
         {container_port}"
    )]
    #[diagnostic(
        code(composer::plaintext_behind_tls),
        severity(Warning),
        help("Declare `target_protocol: \"tls\"` if the service terminates TLS itself.")
    )]
    PlaintextBehindTls {
        listener_port: u16,
        service: String,
        container_port: u16,
    },
}
