use std::fmt::Write as _;

use gantry_topology::{NodeAttrs, Topology};

use super::{Reporter, ReporterError};
use crate::ComposeOutput;

#[derive(Clone, Copy, Debug, Default)]
pub struct DotReporter;

impl Reporter for DotReporter {
    type Artifact = String;

    fn emit(&self, output: &ComposeOutput) -> Result<Self::Artifact, ReporterError> {
        Ok(render_dot(&output.topology))
    }
}

/// Render a topology graph as a Graphviz DOT diagram.
///
/// Externally-provisioned resources draw as boxes; everything the plan
/// declares draws as a plain node.
pub fn render_dot(t: &Topology) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph topology {{");
    let _ = writeln!(out, "  rankdir=LR;");

    for (id, node) in t.nodes_iter() {
        write_indent(&mut out, 1);
        let _ = write!(out, "n{} [label=\"", id.0);
        write_escaped_label(&mut out, &node.name);
        if is_provisioned(&node.attrs) {
            let _ = writeln!(out, "\", shape=box];");
        } else {
            let _ = writeln!(out, "\"];");
        }
    }

    for edge in &t.edges {
        write_indent(&mut out, 1);
        let _ = write!(out, "n{} -> n{} [label=\"", edge.from.0, edge.to.0);
        write_escaped_label(&mut out, &edge.kind.to_string());
        let _ = writeln!(out, "\"];");
    }

    let _ = writeln!(out, "}}");
    out
}

fn is_provisioned(attrs: &NodeAttrs) -> bool {
    matches!(attrs, NodeAttrs::External(_) | NodeAttrs::DnsNamespace(_))
}

fn write_indent(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push_str("  ");
    }
}

fn write_escaped_label(out: &mut String, label: &str) {
    for ch in label.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
}
