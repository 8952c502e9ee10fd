//! Cross queue synchronization.
//!
//! Each queue owns a timeline that is signalled with `index + 1` once its pass `index` finished. A pass that depends on
//! work of another queue waits on that queue's timeline. The plan is calculated in two steps.
//!
//! First a *reach* table is filled. For every pass and every queue it stores the queue index of the latest pass on
//! that queue the pass transitively depends on. Since passes are visited in schedule order, every predecessor's row
//! is final when it is merged.
//!
//! Second the raw waits (reach entries of foreign queues) are minimized per queue. A queue's timeline only moves
//! forward, so once a pass waited for index `i` of queue `Q'` all later passes on the same queue may rely on it. A
//! wait is only dropped if such an earlier, kept wait covers it.
//!
//! Finally each queue is split into submit frames. A frame starts at a waiting pass and ends after a pass another
//! queue waits for.

use std::fmt::Display;

use ahash::AHashSet;
use smallvec::SmallVec;

use crate::{DependencyGraph, QueueClass, Schedule};

///Waits until pass `index` of `queue` has finished.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SyncEntry {
    pub queue: QueueClass,
    pub index: u32,
}

impl SyncEntry {
    ///Value the queue's timeline reaches once the pass finished.
    pub fn timeline_value(&self) -> u64 {
        self.index as u64 + 1
    }
}

impl Display for SyncEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.queue, self.index)
    }
}

pub type Waits = SmallVec<[SyncEntry; 3]>;

///Contiguous run of passes of one queue, submitted as a unit. Only waits at its start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitFrame {
    pub queue: QueueClass,
    ///Queue index of the first pass.
    pub first: u32,
    pub len: u32,
    pub waits: Waits,
    ///Timeline value signalled once the last pass finished.
    pub signal: u64,
}

impl SubmitFrame {
    pub fn contains(&self, queue_index: u32) -> bool {
        queue_index >= self.first && queue_index < self.first + self.len
    }
}

impl Display for SubmitFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "|F {}: {}..{}|", self.queue, self.first, self.first + self.len)
    }
}

type Reach = [Option<u32>; QueueClass::COUNT];

pub struct SyncPlan {
    ///Per declaration index.
    reach: Vec<Reach>,
    raw_waits: Vec<Waits>,
    waits: Vec<Waits>,
    frames: [Vec<SubmitFrame>; QueueClass::COUNT],
}

impl SyncPlan {
    pub fn new(graph: &DependencyGraph, schedule: &Schedule) -> Self {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let count = graph.pass_count();
        let mut reach: Vec<Reach> = vec![[None; QueueClass::COUNT]; count];

        for &pass in schedule.order() {
            let mut row: Reach = [None; QueueClass::COUNT];
            for &pred in graph.predecessors(pass) {
                for (entry, pred_entry) in row.iter_mut().zip(reach[pred].iter()) {
                    *entry = (*entry).max(*pred_entry);
                }
                let own = &mut row[schedule.queue(pred).index()];
                *own = (*own).max(Some(schedule.queue_index(pred)));
            }
            reach[pass] = row;
        }

        let raw_waits: Vec<Waits> = (0..count)
            .map(|pass| {
                if !schedule.is_live(pass) {
                    return Waits::new();
                }
                let own = schedule.queue(pass);
                QueueClass::ALL
                    .iter()
                    .filter(|q| **q != own)
                    .filter_map(|q| {
                        reach[pass][q.index()].map(|index| SyncEntry { queue: *q, index })
                    })
                    .collect()
            })
            .collect();

        let mut waits = vec![Waits::new(); count];
        for queue in QueueClass::ALL {
            let mut satisfied: Reach = [None; QueueClass::COUNT];
            for &pass in schedule.queue_passes(queue) {
                for wait in &raw_waits[pass] {
                    let covered = &mut satisfied[wait.queue.index()];
                    if *covered >= Some(wait.index) {
                        #[cfg(feature = "logging")]
                        log::trace!("Dropping wait {} of pass {}, covered by {:?}", wait, pass, covered);
                        continue;
                    }
                    *covered = Some(wait.index);
                    waits[pass].push(*wait);
                }
            }
        }

        let frames = build_frames(schedule, &waits);

        #[cfg(feature = "logging")]
        log::info!(
            "Synchronization: {} raw waits, {} after optimization, {} submit frames",
            raw_waits.iter().map(|w| w.len()).sum::<usize>(),
            waits.iter().map(|w| w.len()).sum::<usize>(),
            frames.iter().map(|f| f.len()).sum::<usize>()
        );

        SyncPlan {
            reach,
            raw_waits,
            waits,
            frames,
        }
    }

    ///Minimized waits of `pass`.
    pub fn waits(&self, pass: usize) -> &[SyncEntry] {
        &self.waits[pass]
    }

    ///Waits of `pass` before minimization.
    pub fn raw_waits(&self, pass: usize) -> &[SyncEntry] {
        &self.raw_waits[pass]
    }

    ///Latest pass of `queue` that `pass` transitively depends on.
    pub fn reach(&self, pass: usize, queue: QueueClass) -> Option<u32> {
        self.reach[pass][queue.index()]
    }

    pub fn frames(&self, queue: QueueClass) -> &[SubmitFrame] {
        &self.frames[queue.index()]
    }

    pub fn raw_wait_count(&self) -> usize {
        self.raw_waits.iter().map(|w| w.len()).sum()
    }

    pub fn wait_count(&self) -> usize {
        self.waits.iter().map(|w| w.len()).sum()
    }

    ///True if `a` is guaranteed to have finished before `b` starts, either by queue order or by a dependency chain.
    pub fn happens_before(&self, schedule: &Schedule, a: usize, b: usize) -> bool {
        if a == b || !schedule.is_live(a) || !schedule.is_live(b) {
            return false;
        }
        let queue = schedule.queue(a);
        if queue == schedule.queue(b) {
            schedule.queue_index(a) < schedule.queue_index(b)
        } else {
            self.reach(b, queue) >= Some(schedule.queue_index(a))
        }
    }
}

fn build_frames(schedule: &Schedule, waits: &[Waits]) -> [Vec<SubmitFrame>; QueueClass::COUNT] {
    let waited_on: AHashSet<SyncEntry> = waits.iter().flatten().copied().collect();
    let mut frames: [Vec<SubmitFrame>; QueueClass::COUNT] = Default::default();

    for queue in QueueClass::ALL {
        let track = &mut frames[queue.index()];
        let mut split_next = true;
        for &pass in schedule.queue_passes(queue) {
            let index = schedule.queue_index(pass);
            let pass_waits = &waits[pass];

            match track.last_mut() {
                Some(frame) if !split_next && pass_waits.is_empty() => {
                    frame.len += 1;
                    frame.signal = index as u64 + 1;
                }
                _ => track.push(SubmitFrame {
                    queue,
                    first: index,
                    len: 1,
                    waits: pass_waits.clone(),
                    signal: index as u64 + 1,
                }),
            }

            split_next = waited_on.contains(&SyncEntry { queue, index });
        }
    }

    frames
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        BakeOptions, BufDesc, Declaration, LifetimeClass, Registry,
        declare::{Access, ResKey},
    };

    struct Baked {
        graph: DependencyGraph,
        schedule: Schedule,
        sync: SyncPlan,
    }

    fn bake(decl: &Declaration) -> Baked {
        let registry = Registry::ingest(&decl.encode().unwrap().bytes).unwrap();
        let graph = DependencyGraph::build(&registry).unwrap();
        let schedule = Schedule::new(&registry, &graph, &BakeOptions::default()).unwrap();
        let sync = SyncPlan::new(&graph, &schedule);
        Baked { graph, schedule, sync }
    }

    #[test]
    fn compute_to_graphics_waits_once() {
        let mut decl = Declaration::new();
        let buf = decl.buffer("particles", BufDesc::storage(1024), LifetimeClass::Transient);
        let sim = decl.pass("simulate", QueueClass::Compute);
        let particles = decl.write(sim, buf, 0, Access::compute_write()).unwrap();
        let draw = decl.pass("draw", QueueClass::Graphics);
        decl.read(draw, particles, 0, Access::vertex_read()).unwrap();
        let post = decl.pass("post", QueueClass::Graphics);
        decl.read(post, particles, 0, Access::fragment_read()).unwrap();

        let baked = bake(&decl);
        assert_eq!(
            baked.sync.waits(1),
            &[SyncEntry {
                queue: QueueClass::Compute,
                index: 0
            }]
        );
        //covered by the wait of draw
        assert_eq!(baked.sync.raw_waits(2).len(), 1);
        assert!(baked.sync.waits(2).is_empty());

        let frames = baked.sync.frames(QueueClass::Graphics);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len, 2);
        assert_eq!(frames[0].signal, 2);
        assert_eq!(baked.sync.frames(QueueClass::Compute)[0].signal, 1);
    }

    #[test]
    fn frames_split_around_waits() {
        let mut decl = Declaration::new();
        let a = decl.buffer("a", BufDesc::storage(64), LifetimeClass::Transient);
        let b = decl.buffer("b", BufDesc::storage(64), LifetimeClass::Transient);
        let g0 = decl.pass("g0", QueueClass::Graphics);
        let a1 = decl.write(g0, a, 0, Access::compute_write()).unwrap();
        let c0 = decl.pass("c0", QueueClass::Compute);
        decl.read(c0, a1, 0, Access::compute_read()).unwrap();
        let b1 = decl.write(c0, b, 1, Access::compute_write()).unwrap();
        let g1 = decl.pass("g1", QueueClass::Graphics);
        decl.read(g1, b1, 0, Access::fragment_read()).unwrap();

        let baked = bake(&decl);
        let graphics = baked.sync.frames(QueueClass::Graphics);
        //g0 is waited on by c0, g1 waits on c0.
        assert_eq!(graphics.len(), 2);
        assert_eq!((graphics[0].first, graphics[0].len), (0, 1));
        assert_eq!(graphics[1].waits.as_slice(), baked.sync.waits(2));
        assert!(baked.sync.happens_before(&baked.schedule, 0, 2));
        assert!(baked.sync.happens_before(&baked.schedule, 1, 2));
        assert!(!baked.sync.happens_before(&baked.schedule, 2, 1));
    }

    ///Builds a random DAG over all queues. Every pass reads a few versions minted by earlier passes and writes
    /// a fresh resource.
    fn random_declaration(rng: &mut StdRng, passes: usize) -> Declaration {
        let mut decl = Declaration::new();
        let mut versions: Vec<ResKey> = Vec::new();
        for idx in 0..passes {
            let queue = QueueClass::ALL[rng.gen_range(0..QueueClass::COUNT)];
            let pass = decl.pass(&format!("p{}", idx), queue);
            let mut binding = 0;
            if !versions.is_empty() {
                for _ in 0..rng.gen_range(0..3) {
                    let version = versions[rng.gen_range(0..versions.len())];
                    if decl.read(pass, version, binding, Access::compute_read()).is_ok() {
                        binding += 1;
                    }
                }
            }
            let res = decl.buffer(
                &format!("r{}", idx),
                BufDesc::storage(64 * rng.gen_range(1..8)),
                LifetimeClass::Transient,
            );
            let out = decl.write(pass, res, binding, Access::compute_write()).unwrap();
            versions.push(out);
        }
        decl
    }

    #[test]
    fn minimized_waits_cover_every_cross_queue_edge() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..64 {
            let count = rng.gen_range(1..24);
            let decl = random_declaration(&mut rng, count);
            let baked = bake(&decl);

            for edge in baked.graph.edges() {
                let producer_queue = baked.schedule.queue(edge.producer);
                let consumer_queue = baked.schedule.queue(edge.consumer);
                let consumer_index = baked.schedule.queue_index(edge.consumer);
                if producer_queue == consumer_queue {
                    assert!(baked.schedule.queue_index(edge.producer) < consumer_index);
                    continue;
                }
                //Some pass at or before the consumer on its queue must wait on the producer or a later pass.
                let covered = baked
                    .schedule
                    .queue_passes(consumer_queue)
                    .iter()
                    .filter(|p| baked.schedule.queue_index(**p) <= consumer_index)
                    .flat_map(|p| baked.sync.waits(*p).iter())
                    .any(|w| {
                        w.queue == producer_queue && w.index >= baked.schedule.queue_index(edge.producer)
                    });
                assert!(covered, "Edge {:?} is not synchronized", edge);
            }
            assert!(baked.sync.wait_count() <= baked.sync.raw_wait_count());
        }
    }
}
