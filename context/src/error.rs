use miette::Diagnostic;
use thiserror::Error;

use crate::ExternalKind;

#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum ContextError {
    #[error("invalid context document: {0}")]
    #[diagnostic(code(context::parse_error))]
    Parse(#[from] serde_json::Error),

    #[error("unresolved {kind} reference `{key}`: no such export in the provisioning context")]
    #[diagnostic(
        code(context::unresolved_reference),
        help("Export the {kind} under `{key}` in the provisioning context, or fix the key.")
    )]
    UnresolvedReference { kind: ExternalKind, key: String },
}
