//! Graphviz dumps of a baked schedule.
//!
//! Each queue becomes a cluster that contains its passes in queue order. Dependency edges are drawn solid, and edges
//! that became a cross queue wait are drawn bold and red.

use graphviz_rust::{
    dot_structures as gv,
    printer::{DotPrinter, PrinterContext},
};

use crate::{Bake, EdgeKind, QueueClass};

fn escaped(s: &str) -> gv::Id {
    gv::Id::Escaped(format!("\"{}\"", s.replace('"', "\\\"")))
}

fn plain(s: &str) -> gv::Id {
    gv::Id::Plain(s.to_string())
}

fn attr(key: &str, value: gv::Id) -> gv::Attribute {
    gv::Attribute(plain(key), value)
}

fn node_id(pass: usize) -> gv::NodeId {
    gv::NodeId(plain(&format!("p{}", pass)), None)
}

fn queue_color(queue: QueueClass) -> &'static str {
    match queue {
        QueueClass::Graphics => "lightblue",
        QueueClass::Compute => "palegreen",
        QueueClass::Copy => "khaki",
        QueueClass::Fill => "lightgrey",
    }
}

///Builds the graphviz representation of `bake`.
pub fn to_graph(bake: &Bake) -> gv::Graph {
    let registry = &bake.registry;
    let schedule = &bake.schedule;
    let mut stmts = vec![gv::Stmt::Attribute(attr("rankdir", plain("LR")))];

    for queue in QueueClass::ALL {
        let passes = schedule.queue_passes(queue);
        if passes.is_empty() {
            continue;
        }

        let mut cluster = vec![
            gv::Stmt::Attribute(attr("label", escaped(&queue.to_string()))),
            gv::Stmt::Attribute(attr("style", plain("filled"))),
            gv::Stmt::Attribute(attr("color", plain(queue_color(queue)))),
        ];
        for &pass in passes {
            let name = registry.passes()[pass].name.as_str();
            let label = format!("{} [{}] L{}", name, schedule.queue_index(pass), schedule.level(pass));
            cluster.push(gv::Stmt::Node(gv::Node {
                id: node_id(pass),
                attributes: vec![attr("label", escaped(&label)), attr("shape", plain("box"))],
            }));
        }

        stmts.push(gv::Stmt::Subgraph(gv::Subgraph {
            id: plain(&format!("cluster_{}", queue.index())),
            stmts: cluster,
        }));
    }

    for edge in bake.dependencies.edges() {
        if !schedule.is_live(edge.producer) || !schedule.is_live(edge.consumer) {
            continue;
        }
        let waited = schedule.queue(edge.producer) != schedule.queue(edge.consumer)
            && bake
                .sync
                .waits(edge.consumer)
                .iter()
                .any(|w| w.queue == schedule.queue(edge.producer) && w.index == schedule.queue_index(edge.producer));

        let resource = registry.name_of(edge.resource).unwrap_or("?");
        let mut attributes = vec![attr("label", escaped(resource))];
        if edge.kind == EdgeKind::WriteAfterRead {
            attributes.push(attr("style", plain("dashed")));
        }
        if waited {
            attributes.push(attr("color", plain("red")));
            attributes.push(attr("penwidth", plain("2")));
        }

        stmts.push(gv::Stmt::Edge(gv::Edge {
            ty: gv::EdgeTy::Pair(
                gv::Vertex::N(node_id(edge.producer)),
                gv::Vertex::N(node_id(edge.consumer)),
            ),
            attributes,
        }));
    }

    gv::Graph::DiGraph {
        id: plain("rmg"),
        strict: false,
        stmts,
    }
}

///Renders `bake` into dot source.
pub fn to_dot(bake: &Bake) -> String {
    to_graph(bake).print(&mut PrinterContext::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BakeOptions, BufDesc, Declaration, LifetimeClass, bake, declare::Access};

    #[test]
    fn clusters_per_queue_and_marks_waits() {
        let mut decl = Declaration::new();
        let data = decl.buffer("particles", BufDesc::storage(64), LifetimeClass::Transient);
        let sim = decl.pass("simulate", QueueClass::Compute);
        let data = decl.write(sim, data, 0, Access::compute_write()).unwrap();
        let draw = decl.pass("draw", QueueClass::Graphics);
        decl.read(draw, data, 0, Access::vertex_read()).unwrap();

        let bake = bake(&decl.encode().unwrap().bytes, &BakeOptions::default()).unwrap();
        let dot = to_dot(&bake);
        assert!(dot.contains("cluster_0"));
        assert!(dot.contains("cluster_1"));
        assert!(dot.contains("simulate"));
        assert!(dot.contains("red"));
    }
}
