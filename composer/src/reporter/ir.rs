use gantry_topology::{Topology, TopologyIr};

use super::{Reporter, ReporterError};
use crate::ComposeOutput;

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonReporter;

impl Reporter for JsonReporter {
    type Artifact = String;

    fn emit(&self, output: &ComposeOutput) -> Result<Self::Artifact, ReporterError> {
        render_topology_json(&output.topology)
    }
}

/// Render a topology graph as a stable JSON IR artifact.
pub fn render_topology_json(t: &Topology) -> Result<String, ReporterError> {
    let ir = TopologyIr::from(t);
    let mut out = serde_json::to_string_pretty(&ir)
        .map_err(|e| ReporterError::Other(format!("failed to render topology IR: {e}")))?;
    out.push('\n');
    Ok(out)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct YamlReporter;

impl Reporter for YamlReporter {
    type Artifact = String;

    fn emit(&self, output: &ComposeOutput) -> Result<Self::Artifact, ReporterError> {
        render_topology_yaml(&output.topology)
    }
}

/// Render a topology graph as a YAML IR artifact.
pub fn render_topology_yaml(t: &Topology) -> Result<String, ReporterError> {
    let ir = TopologyIr::from(t);
    serde_yaml::to_string(&ir)
        .map_err(|e| ReporterError::Other(format!("failed to render topology IR: {e}")))
}
