//! Graphviz export of the operation graph.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use crate::backend::Backend;
use crate::element::Element;
use crate::node::NodeId;
use crate::tensor::Tensor;

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

impl<E: Element, B: Backend> Tensor<E, B> {
    /// Render the graph that produced this tensor in Graphviz `dot` syntax.
    ///
    /// Each tensor is a box labelled with its operation (or its name for
    /// named leaves) and shape; edges run from sources to results. Node order
    /// follows creation order, so the output is stable for a given graph.
    pub fn graph(&self) -> String {
        let mut labels: BTreeMap<NodeId, String> = BTreeMap::new();
        let mut edges: BTreeSet<(NodeId, NodeId)> = BTreeSet::new();
        let mut stack = vec![self.clone()];

        while let Some(node) = stack.pop() {
            if labels.contains_key(&node.id()) {
                continue;
            }
            let kind = match (node.context(), node.name()) {
                (Some(ctx), _) => ctx.op().symbol().to_string(),
                (None, Some(name)) => name.to_string(),
                (None, None) => "leaf".to_string(),
            };
            labels.insert(node.id(), format!("{} {}", kind, node.shape()));

            if let Some(ctx) = node.context() {
                for source in ctx.sources() {
                    edges.insert((source.id(), node.id()));
                    stack.push(source.clone());
                }
            }
        }

        let mut out = String::from("digraph {\n    node [shape=box];\n");
        for (id, label) in &labels {
            let _ = writeln!(out, "    {} [label=\"{}\"];", id, escape(label));
        }
        for (from, to) in &edges {
            let _ = writeln!(out, "    {} -> {};", from, to);
        }
        out.push_str("}\n");
        out
    }
}
