//! DOT export of a diagram for debugging.

use std::fmt::Write as _;

use crate::diagram::Diagram;

impl Diagram {
    /// Renders the diagram as a Graphviz DOT digraph.
    ///
    /// Nodes carry the block name and kind; edges are labelled with the
    /// connected port type. The output is deterministic (insertion order)
    /// so snapshots diff cleanly.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph voz {\n  rankdir=LR;\n  node [shape=box];\n");
        for block in self.blocks() {
            let _ = writeln!(
                out,
                "  b{} [label=\"{}\\n{}\"];",
                block.id().index(),
                block.name(),
                block.kind()
            );
        }
        for conn in self.connections() {
            let label = self
                .block(conn.src_block)
                .ok()
                .and_then(|b| b.outputs().get(conn.src_port))
                .map(|p| p.port_type().to_string())
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "  b{} -> b{} [label=\"{}\"];",
                conn.src_block.index(),
                conn.dst_block.index(),
                label
            );
        }
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use crate::diagram::Diagram;
    use crate::diagram::test_support::{gain, sink, source};

    #[test]
    fn dot_lists_nodes_and_labelled_edges() {
        let mut d = Diagram::new();
        let a = d.add_block(source("input", 64, 1.0)).unwrap();
        let g = d.add_block(gain("boost", 64, 2.0)).unwrap();
        let s = d.add_block(sink("output", 64)).unwrap();
        d.connect(a, 0, g, 0).unwrap();
        d.connect(g, 0, s, 0).unwrap();

        let dot = d.to_dot();
        assert!(dot.starts_with("digraph voz {"));
        assert!(dot.contains("input\\nAudioInput"));
        assert!(dot.contains("boost\\nCustom"));
        assert!(dot.contains("b0 -> b1 [label=\"audio\"]"));
        assert!(dot.contains("b1 -> b2 [label=\"audio\"]"));
        assert!(dot.ends_with("}\n"));
    }
}
