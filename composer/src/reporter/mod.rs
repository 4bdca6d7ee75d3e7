use miette::Diagnostic;
use thiserror::Error;

use crate::ComposeOutput;

pub mod dot;
pub mod ir;

pub use dot::DotReporter;
pub use ir::{JsonReporter, YamlReporter};

#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum ReporterError {
    #[error("reporter error: {0}")]
    #[diagnostic(code(reporter::error))]
    Other(String),
}

pub trait Reporter {
    type Artifact;

    fn emit(&self, output: &ComposeOutput) -> Result<Self::Artifact, ReporterError>;
}
