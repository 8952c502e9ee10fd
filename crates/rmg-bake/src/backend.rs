//! Execution backends.
//!
//! A [Backend] receives the output op-stream of a bake, prepares whatever it needs to execute it and submits the
//! schedule. [DryRunBackend] executes nothing. It simulates one timeline per queue, which is enough to check that a
//! schedule can't deadlock and that it honors every wait.

use std::time::Duration;

use rmg_opstream::StreamError;
use thiserror::Error;

use crate::{BakedGraph, PassId, QueueClass, SubmitFrame};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Op-stream error: {0}")]
    Stream(#[from] StreamError),
    #[error("Queue {queue} can't make progress, frame {frame} waits on work that never finishes")]
    Deadlock { queue: QueueClass, frame: usize },
    #[error("Frame {frame} of queue {queue} references passes the queue does not have")]
    MalformedFrame { queue: QueueClass, frame: usize },
    #[error("Submit without a baked graph")]
    NotBaked,
    #[error("Baked graph does not match the created op-stream")]
    GraphMismatch,
}

///Executes baked graphs.
pub trait Backend {
    ///Creates all resources of the output op-stream `stream`.
    fn create(&mut self, stream: &[u8]) -> Result<(), BackendError>;
    ///Prepares execution of `graph`. Is called after [create](Backend::create) with the graph the stream was encoded
    /// from.
    fn bake(&mut self, graph: &BakedGraph) -> Result<(), BackendError>;
    ///Executes the baked graph once.
    fn submit(&mut self) -> Result<(), BackendError>;
    ///Time `pass` took on its last submit. `None` if the pass was not executed yet.
    fn query_time(&self, pass: PassId) -> Option<Duration>;
}

///Simulated per queue state.
struct SimTrack {
    queue: QueueClass,
    ///Current timeline value, `index + 1` of the last finished pass.
    value: u64,
    ///Next frame to submit.
    next_frame: usize,
    ///Simulated time the queue becomes idle.
    clock: Duration,
    ///End time per queue index.
    ends: Vec<Duration>,
}

impl SimTrack {
    fn new(queue: QueueClass) -> Self {
        SimTrack {
            queue,
            value: 0,
            next_frame: 0,
            clock: Duration::ZERO,
            ends: Vec::new(),
        }
    }
}

struct Simulation {
    executed: Vec<PassId>,
    timings: Vec<(PassId, Duration)>,
    frame_time: Duration,
}

///Backend that decodes and simulates a baked graph without touching a device.
#[derive(Default)]
pub struct DryRunBackend {
    created: Option<BakedGraph>,
    baked: bool,
    ///Passes in the order of the last simulated submit.
    executed: Vec<PassId>,
    timings: Vec<(PassId, Duration)>,
    frame_time: Duration,
    submits: usize,
}

impl DryRunBackend {
    ///Simulated cost of a pass.
    pub const PASS_COST: Duration = Duration::from_micros(5);
    pub const INTERACTION_COST: Duration = Duration::from_micros(1);

    pub fn new() -> Self {
        Self::default()
    }

    ///Pass execution order of the last submit.
    pub fn executed(&self) -> &[PassId] {
        &self.executed
    }

    ///Number of successful submits.
    pub fn submit_count(&self) -> usize {
        self.submits
    }

    ///Simulated wall time of the last submit.
    pub fn frame_time(&self) -> Duration {
        self.frame_time
    }

    fn ready(tracks: &[SimTrack], frame: &SubmitFrame) -> bool {
        frame.waits.iter().all(|w| {
            tracks
                .iter()
                .find(|t| t.queue == w.queue)
                .is_some_and(|t| t.value >= w.timeline_value())
        })
    }

    fn simulate(graph: &BakedGraph) -> Result<Simulation, BackendError> {
        let mut tracks: Vec<SimTrack> = graph.queues.iter().map(|q| SimTrack::new(q.queue)).collect();
        let mut executed = Vec::with_capacity(graph.pass_count());
        let mut timings = Vec::with_capacity(graph.pass_count());

        loop {
            let mut progressed = false;
            let mut finished = true;

            for (qidx, queue) in graph.queues.iter().enumerate() {
                let Some(frame) = queue.frames.get(tracks[qidx].next_frame) else {
                    continue;
                };
                finished = false;
                if !Self::ready(&tracks, frame) {
                    continue;
                }

                //frame starts once the queue is idle and every awaited pass ended
                let mut start = tracks[qidx].clock;
                for wait in &frame.waits {
                    if let Some(end) = tracks
                        .iter()
                        .find(|t| t.queue == wait.queue)
                        .and_then(|t| t.ends.get(wait.index as usize))
                    {
                        start = start.max(*end);
                    }
                }

                let frame_index = tracks[qidx].next_frame;
                for index in frame.first..frame.first + frame.len {
                    let pass = queue
                        .passes
                        .get(index as usize)
                        .filter(|p| p.queue_index == index)
                        .ok_or(BackendError::MalformedFrame {
                            queue: queue.queue,
                            frame: frame_index,
                        })?;
                    let cost = Self::PASS_COST + Self::INTERACTION_COST * pass.interactions.len() as u32;
                    start += cost;

                    let track = &mut tracks[qidx];
                    track.ends.resize(index as usize + 1, start);
                    track.ends[index as usize] = start;
                    executed.push(pass.id);
                    timings.push((pass.id, cost));
                }

                let track = &mut tracks[qidx];
                track.clock = start;
                track.value = frame.signal;
                track.next_frame += 1;
                progressed = true;

                #[cfg(feature = "logging")]
                log::trace!("Simulated {} until {:?}", frame, start);
            }

            if finished {
                break;
            }
            if !progressed {
                let (queue, frame) = tracks
                    .iter()
                    .zip(graph.queues.iter())
                    .find(|(t, q)| t.next_frame < q.frames.len())
                    .map(|(t, _)| (t.queue, t.next_frame))
                    .unwrap_or((QueueClass::Graphics, 0));
                return Err(BackendError::Deadlock { queue, frame });
            }
        }

        Ok(Simulation {
            executed,
            timings,
            frame_time: tracks.iter().map(|t| t.clock).max().unwrap_or(Duration::ZERO),
        })
    }
}

impl Backend for DryRunBackend {
    fn create(&mut self, stream: &[u8]) -> Result<(), BackendError> {
        let graph = BakedGraph::decode(stream)?;

        #[cfg(feature = "logging")]
        log::info!(
            "Dry run: creating {} buckets, {} aliases",
            graph.buckets.len(),
            graph.aliases.len()
        );

        self.created = Some(graph);
        self.baked = false;
        Ok(())
    }

    fn bake(&mut self, graph: &BakedGraph) -> Result<(), BackendError> {
        if self.created.as_ref() != Some(graph) {
            self.baked = false;
            return Err(BackendError::GraphMismatch);
        }
        self.baked = true;
        Ok(())
    }

    fn submit(&mut self) -> Result<(), BackendError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let graph = match (&self.created, self.baked) {
            (Some(graph), true) => graph,
            _ => return Err(BackendError::NotBaked),
        };

        let simulation = Self::simulate(graph)?;
        self.executed = simulation.executed;
        self.timings = simulation.timings;
        self.frame_time = simulation.frame_time;
        self.submits += 1;
        Ok(())
    }

    fn query_time(&self, pass: PassId) -> Option<Duration> {
        self.timings.iter().find(|(id, _)| *id == pass).map(|(_, t)| *t)
    }
}
