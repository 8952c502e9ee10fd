//! # RMG bake
//!
//! Compiles a declaration of GPU passes and the resources they touch into an executable schedule. The pipeline is
//!
//! 1. [Registry]: decodes and validates the input op-stream,
//! 2. [DependencyGraph]: derives producer/consumer edges from the versioned resource accesses,
//! 3. [Schedule]: orders passes by dependency level and partitions them per queue,
//! 4. [SyncPlan]: computes the minimal set of cross-queue timeline waits,
//! 5. [AliasPlan]: packs resources with disjoint lifetimes into shared memory buckets,
//! 6. [emit]: writes the [BakedGraph] that is handed to a [Backend].
//!
//! Client code usually never touches the stages directly. Passes and resources are declared on a [Declaration], and
//! an [Rmg] context bakes and runs them whenever the declaration changed.
//!
//! ```ignore
//! let mut rmg = Rmg::new(DryRunBackend::default());
//! let decl = rmg.declare();
//! let particles = decl.buffer("particles", BufDesc::storage(1 << 20), LifetimeClass::Transient);
//! let sim = decl.pass("simulate", QueueClass::Compute);
//! let particles = decl.write(sim, particles, 0, Access::compute_write())?;
//! let draw = decl.pass("draw", QueueClass::Graphics);
//! decl.read(draw, particles, 0, Access::vertex_read())?;
//! rmg.run()?;
//! ```

mod handle;
pub use handle::{BindlessId, BufferId, ImageId, PassId, PassRef, ProgramId, Res, ResKind, SamplerId, ShaderId};

mod desc;
pub use desc::{
    AccessMode, BufDesc, ImageExtent, ImageShape, ImgDesc, Interaction, LifetimeClass, MemoryClass, QueueClass,
    texel_size,
};

mod error;
pub use error::{AliasError, BakeError, ConfigurationError, GraphError};

pub mod declare;
pub use declare::{Access, Declaration, ResKey};

pub mod registry;
pub use registry::Registry;

mod graph;
pub use graph::{DependencyGraph, Edge, EdgeKind};

mod scheduler;
pub use scheduler::Schedule;

pub mod sync;
pub use sync::{SubmitFrame, SyncEntry, SyncPlan};

mod alloc;
pub use alloc::{AliasPlan, Bucket, BucketDesc, BucketMember, InitialState, Liveness};

mod emit;
pub use emit::{BakedAlias, BakedBucket, BakedGraph, BakedPass, BakedQueue, ResolvedInteraction, emit};

pub mod backend;
pub use backend::{Backend, BackendError, DryRunBackend};

mod rmg;
pub use rmg::{Rmg, RmgError};

#[cfg(feature = "dot")]
pub mod dot;

pub use rmg_opstream as opstream;

///Knobs of a single bake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BakeOptions {
    ///Removes passes whose results never reach a persistent resource or the present image.
    pub cull_passes: bool,
    ///Lets transient resources with disjoint lifetimes share memory. If false every resource chain gets its own
    /// bucket.
    pub alias_transients: bool,
}

impl Default for BakeOptions {
    fn default() -> Self {
        BakeOptions {
            cull_passes: false,
            alias_transients: true,
        }
    }
}

///Result of a successful bake. Keeps every stage around for introspection.
pub struct Bake {
    pub registry: Registry,
    pub dependencies: DependencyGraph,
    pub schedule: Schedule,
    pub sync: SyncPlan,
    pub aliasing: AliasPlan,
    pub graph: BakedGraph,
}

///Summary numbers of a [Bake].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct BakeStats {
    pub passes: usize,
    pub culled: usize,
    pub edges: usize,
    ///Cross-queue waits before minimization.
    pub raw_waits: usize,
    pub waits: usize,
    pub frames: usize,
    pub buckets: usize,
    pub unused: usize,
    ///Sum of all bucket sizes.
    pub bytes: u64,
}

impl Bake {
    pub fn stats(&self) -> BakeStats {
        BakeStats {
            passes: self.schedule.len(),
            culled: self.schedule.culled().len(),
            edges: self.dependencies.edges().len(),
            raw_waits: self.sync.raw_wait_count(),
            waits: self.sync.wait_count(),
            frames: QueueClass::ALL.iter().map(|q| self.sync.frames(*q).len()).sum(),
            buckets: self.aliasing.buckets().len(),
            unused: self.aliasing.unused().len(),
            bytes: self
                .aliasing
                .buckets()
                .iter()
                .fold(0u64, |sum, b| sum.saturating_add(b.desc.byte_size())),
        }
    }
}

///Runs every bake stage on an input op-stream. Either returns the complete result, or the first error. No stage
/// publishes partial results.
pub fn bake(input: &[u8], options: &BakeOptions) -> Result<Bake, BakeError> {
    #[cfg(feature = "profiling")]
    puffin::profile_function!();

    let registry = Registry::ingest(input)?;
    let dependencies = DependencyGraph::build(&registry)?;
    let schedule = Schedule::new(&registry, &dependencies, options)?;
    let sync = SyncPlan::new(&dependencies, &schedule);
    let aliasing = AliasPlan::new(&registry, &schedule, &sync, options)?;
    let graph = emit(&registry, &schedule, &sync, &aliasing)?;

    let bake = Bake {
        registry,
        dependencies,
        schedule,
        sync,
        aliasing,
        graph,
    };

    #[cfg(feature = "logging")]
    {
        let stats = bake.stats();
        log::info!(
            "Baked {} passes ({} culled), {} edges, {}/{} waits, {} frames, {} buckets ({} bytes)",
            stats.passes,
            stats.culled,
            stats.edges,
            stats.waits,
            stats.raw_waits,
            stats.frames,
            stats.buckets,
            stats.bytes
        );
        if stats.unused > 0 {
            log::warn!("{} transient resources are never used", stats.unused);
        }
    }

    Ok(bake)
}

#[cfg(test)]
mod tests;
