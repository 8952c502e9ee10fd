//! Pass to pass dependency graph.
//!
//! Nodes are passes, addressed by their declaration index within the [Registry]. Since every write mints a new
//! version, a version has at most one producer. Readers of a version depend on that producer, and the single pass
//! that overwrites a version depends on all of its other readers.

use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;

use crate::{BakeError, ConfigurationError, Registry, Res, registry::PassInfo};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EdgeKind {
    ///Consumer reads, or overwrites, the version the producer minted.
    ReadAfterWrite,
    ///Producer reads a version the consumer overwrites.
    WriteAfterRead,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Edge {
    pub producer: usize,
    pub consumer: usize,
    ///The version that caused this edge. For deduplicated edges the first one found.
    pub resource: Res,
    pub kind: EdgeKind,
}

pub struct DependencyGraph {
    edges: Vec<Edge>,
    predecessors: Vec<SmallVec<[usize; 4]>>,
    successors: Vec<SmallVec<[usize; 4]>>,
    ///Version -> pass that minted it.
    producers: AHashMap<Res, usize>,
}

impl DependencyGraph {
    pub fn build(registry: &Registry) -> Result<Self, BakeError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let passes = registry.passes();
        let mut producers: AHashMap<Res, usize> = AHashMap::default();
        let mut overwriters: AHashMap<Res, usize> = AHashMap::default();
        let mut readers: AHashMap<Res, SmallVec<[usize; 4]>> = AHashMap::default();

        for (idx, pass) in passes.iter().enumerate() {
            for write in &pass.writes {
                let output = write.output.ok_or_else(|| ConfigurationError::MissingOutputAlias {
                    pass: pass.pass_ref(),
                    resource: write.resource,
                })?;

                if let Some(first) = producers.insert(output, idx) {
                    return Err(ConfigurationError::OutputProducedTwice {
                        resource: output,
                        first: passes[first].pass_ref(),
                        second: pass.pass_ref(),
                    }
                    .into());
                }
                if let Some(first) = overwriters.insert(write.resource, idx) {
                    return Err(ConfigurationError::VersionWrittenTwice {
                        resource: write.resource,
                        first: passes[first].pass_ref(),
                        second: pass.pass_ref(),
                    }
                    .into());
                }
            }

            for read in pass.read_versions() {
                let list = readers.entry(read).or_default();
                if list.last() != Some(&idx) {
                    list.push(idx);
                }
            }
        }

        let mut graph = DependencyGraph {
            edges: Vec::new(),
            predecessors: vec![SmallVec::new(); passes.len()],
            successors: vec![SmallVec::new(); passes.len()],
            producers,
        };
        let mut known = AHashSet::default();

        for (idx, pass) in passes.iter().enumerate() {
            for version in consumed_versions(pass) {
                if let Some(&producer) = graph.producers.get(&version) {
                    graph.add_edge(&mut known, producer, idx, version, EdgeKind::ReadAfterWrite);
                }
            }

            for write in &pass.writes {
                if let Some(list) = readers.get(&write.resource) {
                    for &reader in list.iter().filter(|r| **r != idx) {
                        graph.add_edge(&mut known, reader, idx, write.resource, EdgeKind::WriteAfterRead);
                    }
                }
            }
        }

        #[cfg(feature = "logging")]
        log::info!(
            "Dependency graph: {} passes, {} edges",
            passes.len(),
            graph.edges.len()
        );

        Ok(graph)
    }

    fn add_edge(
        &mut self,
        known: &mut AHashSet<(usize, usize)>,
        producer: usize,
        consumer: usize,
        resource: Res,
        kind: EdgeKind,
    ) {
        if !known.insert((producer, consumer)) {
            return;
        }

        #[cfg(feature = "logging")]
        log::trace!("Edge {} -> {} via {} ({:?})", producer, consumer, resource, kind);

        self.edges.push(Edge {
            producer,
            consumer,
            resource,
            kind,
        });
        self.predecessors[consumer].push(producer);
        self.successors[producer].push(consumer);
    }

    ///All deduplicated edges, in discovery order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn predecessors(&self, pass: usize) -> &[usize] {
        &self.predecessors[pass]
    }

    pub fn successors(&self, pass: usize) -> &[usize] {
        &self.successors[pass]
    }

    ///Pass that minted `version`. `None` for versions that enter the graph from outside.
    pub fn producer_of(&self, version: Res) -> Option<usize> {
        self.producers.get(&version).copied()
    }

    pub fn pass_count(&self) -> usize {
        self.predecessors.len()
    }
}

///Versions a pass needs to exist before it can start: reads, bindless reads and the consumed side of its writes.
fn consumed_versions(pass: &PassInfo) -> impl Iterator<Item = Res> + '_ {
    pass.read_versions().chain(pass.writes.iter().map(|w| w.resource))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BufDesc, Declaration, LifetimeClass, QueueClass, declare::Access};

    fn registry(decl: &Declaration) -> Registry {
        Registry::ingest(&decl.encode().unwrap().bytes).unwrap()
    }

    #[test]
    fn read_after_write_and_write_after_read() {
        let mut decl = Declaration::new();
        let a = decl.buffer("a", BufDesc::storage(64), LifetimeClass::Transient);
        let produce = decl.pass("produce", QueueClass::Compute);
        let a1 = decl.write(produce, a, 0, Access::compute_write()).unwrap();
        let consume = decl.pass("consume", QueueClass::Graphics);
        decl.read(consume, a1, 0, Access::fragment_read()).unwrap();
        let overwrite = decl.pass("overwrite", QueueClass::Compute);
        decl.write(overwrite, a1, 0, Access::compute_write()).unwrap();

        let graph = DependencyGraph::build(&registry(&decl)).unwrap();
        assert_eq!(graph.predecessors(1), &[0]);
        //overwrite depends on the producer of a1 and on its reader.
        assert_eq!(graph.predecessors(2), &[0, 1]);
        assert!(graph.edges().iter().any(|e| e.producer == 1
            && e.consumer == 2
            && e.kind == EdgeKind::WriteAfterRead));
        assert_eq!(graph.producer_of(crate::Res::Buffer(crate::BufferId(1))), Some(0));
    }

    #[test]
    fn edges_are_deduplicated() {
        let mut decl = Declaration::new();
        let a = decl.buffer("a", BufDesc::storage(64), LifetimeClass::Transient);
        let b = decl.buffer("b", BufDesc::storage(64), LifetimeClass::Transient);
        let produce = decl.pass("produce", QueueClass::Compute);
        let a1 = decl.write(produce, a, 0, Access::compute_write()).unwrap();
        let b1 = decl.write(produce, b, 1, Access::compute_write()).unwrap();
        let consume = decl.pass("consume", QueueClass::Compute);
        decl.read(consume, a1, 0, Access::compute_read()).unwrap();
        decl.read(consume, b1, 1, Access::compute_read()).unwrap();

        let graph = DependencyGraph::build(&registry(&decl)).unwrap();
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(graph.successors(0), &[1]);
    }

    #[test]
    fn overwriting_a_version_twice_is_rejected() {
        let mut decl = Declaration::new();
        let a = decl.buffer("a", BufDesc::storage(64), LifetimeClass::Transient);
        let first = decl.pass("first", QueueClass::Compute);
        decl.write(first, a, 0, Access::compute_write()).unwrap();
        let second = decl.pass("second", QueueClass::Compute);
        decl.write(second, a, 0, Access::compute_write()).unwrap();

        assert!(matches!(
            DependencyGraph::build(&registry(&decl)),
            Err(BakeError::Configuration(ConfigurationError::VersionWrittenTwice { .. }))
        ));
    }
}
