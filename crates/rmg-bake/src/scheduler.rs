//! Orders the dependency graph.
//!
//! Sorting happens in three steps:
//!
//! 1. A reverse depth-first traversal over the predecessors of every pass. It validates that the graph is acyclic and
//!    assigns each pass its dependency level (longest path from a root).
//! 2. Optional culling of passes that have no observable effect.
//! 3. Sorting by level, using the declaration order to break ties, then partitioning per queue.
//!
//! The result is validated against every edge before it is handed on.

use crate::{
    BakeOptions, DependencyGraph, GraphError, LifetimeClass, QueueClass, Registry, Res, registry::PassInfo,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Mark {
    Unvisited,
    Visiting,
    Visited,
}

///Final order of all live passes. Passes are addressed by their declaration index.
pub struct Schedule {
    ///Live passes in execution order.
    order: Vec<usize>,
    ///Per declaration index, `None` for culled passes.
    position: Vec<Option<u32>>,
    level: Vec<u32>,
    queue: Vec<QueueClass>,
    queue_index: Vec<u32>,
    queues: [Vec<usize>; QueueClass::COUNT],
    culled: Vec<usize>,
}

impl Schedule {
    pub fn new(registry: &Registry, graph: &DependencyGraph, options: &BakeOptions) -> Result<Self, GraphError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let passes = registry.passes();
        let level = levels(passes, graph)?;

        let live = if options.cull_passes {
            live_passes(registry, graph)
        } else {
            vec![true; passes.len()]
        };

        let mut order: Vec<usize> = (0..passes.len()).filter(|p| live[*p]).collect();
        //stable, declaration order breaks ties
        order.sort_by_key(|p| (level[*p], *p));

        let mut position = vec![None; passes.len()];
        let mut queue_index = vec![0; passes.len()];
        let mut queues: [Vec<usize>; QueueClass::COUNT] = Default::default();
        for (pos, pass) in order.iter().enumerate() {
            position[*pass] = Some(pos as u32);
            let track = &mut queues[passes[*pass].queue.index()];
            queue_index[*pass] = track.len() as u32;
            track.push(*pass);
        }

        let culled: Vec<usize> = (0..passes.len()).filter(|p| !live[*p]).collect();

        #[cfg(feature = "logging")]
        {
            for pass in &culled {
                log::trace!("Culled {}", passes[*pass].pass_ref());
            }
            log::info!(
                "Scheduled {} passes on {} levels, culled {}",
                order.len(),
                order.last().map(|p| level[*p] + 1).unwrap_or(0),
                culled.len()
            );
        }

        let schedule = Schedule {
            order,
            position,
            level,
            queue: passes.iter().map(|p| p.queue).collect(),
            queue_index,
            queues,
            culled,
        };
        schedule.validate(registry, graph)?;

        Ok(schedule)
    }

    ///Checks that every producer is placed before its consumer.
    fn validate(&self, registry: &Registry, graph: &DependencyGraph) -> Result<(), GraphError> {
        for edge in graph.edges() {
            let (Some(producer), Some(consumer)) = (self.position[edge.producer], self.position[edge.consumer]) else {
                continue;
            };
            if producer >= consumer {
                return Err(GraphError::OrderViolation {
                    producer: registry.passes()[edge.producer].pass_ref(),
                    consumer: registry.passes()[edge.consumer].pass_ref(),
                });
            }
        }
        Ok(())
    }

    ///Live passes in execution order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn position(&self, pass: usize) -> Option<u32> {
        self.position[pass]
    }

    pub fn is_live(&self, pass: usize) -> bool {
        self.position[pass].is_some()
    }

    pub fn level(&self, pass: usize) -> u32 {
        self.level[pass]
    }

    pub fn queue(&self, pass: usize) -> QueueClass {
        self.queue[pass]
    }

    ///Index of `pass` within the list of its queue.
    pub fn queue_index(&self, pass: usize) -> u32 {
        self.queue_index[pass]
    }

    ///Passes of `queue` in execution order.
    pub fn queue_passes(&self, queue: QueueClass) -> &[usize] {
        &self.queues[queue.index()]
    }

    pub fn culled(&self) -> &[usize] {
        &self.culled
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

///Validates acyclicity and calculates the dependency level of every pass.
fn levels(passes: &[PassInfo], graph: &DependencyGraph) -> Result<Vec<u32>, GraphError> {
    let mut marks = vec![Mark::Unvisited; passes.len()];
    let mut level = vec![0u32; passes.len()];
    //(pass, next predecessor to visit)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..passes.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        marks[root] = Mark::Visiting;
        stack.push((root, 0));

        while let Some((pass, next)) = stack.last_mut() {
            let pass = *pass;
            let predecessors = graph.predecessors(pass);
            if let Some(pred) = predecessors.get(*next).copied() {
                *next += 1;
                match marks[pred] {
                    Mark::Unvisited => {
                        marks[pred] = Mark::Visiting;
                        stack.push((pred, 0));
                    }
                    Mark::Visiting => {
                        #[cfg(feature = "logging")]
                        log::error!(
                            "Found cycle between {} and {}",
                            passes[pred].pass_ref(),
                            passes[pass].pass_ref()
                        );
                        return Err(GraphError::CyclicDependency {
                            producer: passes[pred].pass_ref(),
                            consumer: passes[pass].pass_ref(),
                        });
                    }
                    Mark::Visited => {}
                }
            } else {
                //all dependencies are resolved
                level[pass] = predecessors
                    .iter()
                    .map(|p| level[*p] + 1)
                    .max()
                    .unwrap_or(0);
                marks[pass] = Mark::Visited;
                stack.pop();
            }
        }
    }

    Ok(level)
}

///A pass is observable if it writes into a persistent or presented chain, or if it has no writes at all, which makes
/// it a side-effect only pass. Everything an observable pass transitively depends on is live as well.
fn live_passes(registry: &Registry, graph: &DependencyGraph) -> Vec<bool> {
    let present = registry.present_image().map(|i| registry.base_of(Res::Image(i)));
    let observable = |pass: &PassInfo| {
        pass.writes.is_empty()
            || pass.writes.iter().any(|w| {
                registry.lifetime(w.resource) == LifetimeClass::Persistent
                    || Some(registry.base_of(w.resource)) == present
            })
    };

    let passes = registry.passes();
    let mut live = vec![false; passes.len()];
    let mut stack: Vec<usize> = (0..passes.len()).filter(|p| observable(&passes[*p])).collect();
    while let Some(pass) = stack.pop() {
        if live[pass] {
            continue;
        }
        live[pass] = true;
        stack.extend(graph.predecessors(pass).iter().copied().filter(|p| !live[*p]));
    }

    live
}
