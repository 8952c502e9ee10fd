//! Liveness and memory aliasing.
//!
//! Resources are grouped by the base of their alias chain. Each group needs one physical allocation, a *bucket*.
//! Persistent groups and the presented chain always get their own bucket. Transient groups are placed first-fit, in
//! descending size order, into a compatible bucket whose occupants are all finished before the group is used (or the
//! other way around).

use ahash::AHashMap;
use ash::vk;

use crate::{
    BakeError, BakeOptions, ConfigurationError, ImageShape, LifetimeClass, MemoryClass, QueueClass, Registry, Res,
    ResKind, Schedule, SyncPlan,
};

///Inclusive range of schedule positions a resource is used in.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Liveness {
    pub first: u32,
    pub last: u32,
}

impl Liveness {
    fn point(pos: u32) -> Self {
        Liveness {
            first: pos,
            last: pos,
        }
    }

    fn extend(&mut self, pos: u32) {
        self.first = self.first.min(pos);
        self.last = self.last.max(pos);
    }

    ///True if both ranges do not overlap.
    pub fn independent(&self, other: &Liveness) -> bool {
        self.last < other.first || self.first > other.last
    }

    pub fn union(&self, other: &Liveness) -> Liveness {
        Liveness {
            first: self.first.min(other.first),
            last: self.last.max(other.last),
        }
    }
}

///Physical description of a bucket.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BucketDesc {
    Buffer {
        size: u64,
        usage: vk::BufferUsageFlags,
        memory: MemoryClass,
    },
    Image {
        shape: ImageShape,
        usage: vk::ImageUsageFlags,
    },
}

impl BucketDesc {
    pub fn kind(&self) -> ResKind {
        match self {
            BucketDesc::Buffer { .. } => ResKind::Buffer,
            BucketDesc::Image { .. } => ResKind::Image,
        }
    }

    pub fn byte_size(&self) -> u64 {
        match self {
            BucketDesc::Buffer { size, .. } => *size,
            BucketDesc::Image { shape, .. } => shape.byte_size(),
        }
    }

    ///Whether `other` may live in the same memory.
    fn compatible(&self, other: &BucketDesc) -> bool {
        match (self, other) {
            (BucketDesc::Buffer { memory: a, .. }, BucketDesc::Buffer { memory: b, .. }) => a == b,
            (BucketDesc::Image { shape: a, .. }, BucketDesc::Image { shape: b, .. }) => a == b,
            _ => false,
        }
    }

    fn merge(&mut self, other: &BucketDesc) {
        match (self, other) {
            (
                BucketDesc::Buffer { size, usage, .. },
                BucketDesc::Buffer {
                    size: other_size,
                    usage: other_usage,
                    ..
                },
            ) => {
                *size = (*size).max(*other_size);
                *usage |= *other_usage;
            }
            (BucketDesc::Image { usage, .. }, BucketDesc::Image { usage: other_usage, .. }) => {
                *usage |= *other_usage;
            }
            _ => {}
        }
    }
}

///Synchronization state a bucket's memory is in before the first pass touches it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct InitialState {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    pub layout: vk::ImageLayout,
}

impl Default for InitialState {
    fn default() -> Self {
        InitialState {
            stage: vk::PipelineStageFlags2::NONE,
            access: vk::AccessFlags2::NONE,
            layout: vk::ImageLayout::UNDEFINED,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BucketMember {
    pub resource: Res,
    ///`None` if no live pass uses the resource.
    pub liveness: Option<Liveness>,
}

#[derive(Clone, Debug)]
pub struct Bucket {
    pub id: u32,
    ///Base of the first group placed into the bucket.
    pub base: Res,
    pub desc: BucketDesc,
    pub persistent: bool,
    ///Members in placement order. Chains stay in declaration order.
    pub members: Vec<BucketMember>,
    pub initial: InitialState,
}

impl Bucket {
    pub fn liveness(&self) -> Option<Liveness> {
        self.members
            .iter()
            .filter_map(|m| m.liveness)
            .reduce(|a, b| a.union(&b))
    }
}

///State of a resource that is first read through a bindless table on `queue`.
fn bindless_state(queue: QueueClass, kind: ResKind) -> InitialState {
    let stage = match queue {
        QueueClass::Graphics => vk::PipelineStageFlags2::VERTEX_SHADER | vk::PipelineStageFlags2::FRAGMENT_SHADER,
        _ => vk::PipelineStageFlags2::COMPUTE_SHADER,
    };
    match kind {
        ResKind::Image => InitialState {
            stage,
            access: vk::AccessFlags2::SHADER_SAMPLED_READ,
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        },
        ResKind::Buffer => InitialState {
            stage,
            access: vk::AccessFlags2::SHADER_STORAGE_READ,
            layout: vk::ImageLayout::UNDEFINED,
        },
    }
}

///One alias chain.
struct Group {
    base: Res,
    members: Vec<Res>,
    desc: BucketDesc,
    dedicated: bool,
}

pub struct AliasPlan {
    buckets: Vec<Bucket>,
    assignment: AHashMap<Res, u32>,
    liveness: AHashMap<Res, Liveness>,
    unused: Vec<Res>,
}

impl AliasPlan {
    pub fn new(
        registry: &Registry,
        schedule: &Schedule,
        sync: &SyncPlan,
        options: &BakeOptions,
    ) -> Result<Self, BakeError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let passes = registry.passes();
        let mut liveness: AHashMap<Res, Liveness> = AHashMap::default();
        //passes touching each resource, in schedule order
        let mut users: AHashMap<Res, Vec<usize>> = AHashMap::default();
        let mut initial: AHashMap<Res, InitialState> = AHashMap::default();

        for (pos, &pass) in schedule.order().iter().enumerate() {
            let pos = pos as u32;
            let info = &passes[pass];
            let touched = info
                .interactions()
                .flat_map(|i| i.touched())
                .chain(info.bindless_reads.iter().copied());
            for res in touched {
                liveness
                    .entry(res)
                    .and_modify(|l| l.extend(pos))
                    .or_insert(Liveness::point(pos));
                let list = users.entry(res).or_default();
                if list.last() != Some(&pass) {
                    list.push(pass);
                }
            }
            for interaction in info.interactions() {
                initial
                    .entry(registry.base_of(interaction.resource))
                    .or_insert(InitialState {
                        stage: interaction.stage,
                        access: interaction.access,
                        layout: match interaction.resource.kind() {
                            ResKind::Image => interaction.layout.unwrap_or(vk::ImageLayout::UNDEFINED),
                            ResKind::Buffer => vk::ImageLayout::UNDEFINED,
                        },
                    });
            }
            for &res in &info.bindless_reads {
                initial
                    .entry(registry.base_of(res))
                    .or_insert_with(|| bindless_state(info.queue, res.kind()));
            }
        }

        let present = registry.present_image().map(Res::Image);
        if let Some(present) = present {
            if let Some(end) = schedule.len().checked_sub(1) {
                let end = end as u32;
                liveness
                    .entry(present)
                    .and_modify(|l| l.last = end)
                    .or_insert(Liveness { first: 0, last: end });
            }
        }

        let present_base = present.map(|p| registry.base_of(p));
        let mut groups = collect_groups(registry, present_base)?;

        let mut unused = Vec::new();
        groups.retain(|group| {
            let used = group.dedicated || group.members.iter().any(|m| liveness.contains_key(m));
            if !used {
                #[cfg(feature = "logging")]
                log::warn!("Transient chain of {} is never used, no memory is assigned", group.base);
                unused.extend(group.members.iter().copied());
            }
            used
        });

        //dedicated first, in id order. Then transient groups, largest first.
        groups.sort_by(|a, b| {
            b.dedicated
                .cmp(&a.dedicated)
                .then_with(|| {
                    if a.dedicated {
                        core::cmp::Ordering::Equal
                    } else {
                        b.desc.byte_size().cmp(&a.desc.byte_size())
                    }
                })
                .then_with(|| a.base.cmp(&b.base))
        });

        let mut buckets: Vec<Bucket> = Vec::new();
        let mut assignment = AHashMap::default();

        for group in groups {
            let members: Vec<BucketMember> = group
                .members
                .iter()
                .map(|m| BucketMember {
                    resource: *m,
                    liveness: liveness.get(m).copied(),
                })
                .collect();

            let target = if group.dedicated || !options.alias_transients {
                None
            } else {
                buckets.iter().position(|bucket| {
                    !bucket.persistent
                        && bucket.desc.compatible(&group.desc)
                        && bucket.members.iter().all(|occupant| {
                            members
                                .iter()
                                .all(|member| ordered(schedule, sync, &users, occupant, member))
                        })
                })
            };

            let bucket_id = match target {
                Some(idx) => {
                    let bucket = &mut buckets[idx];

                    #[cfg(feature = "logging")]
                    log::trace!(
                        "Placing chain of {} into bucket {} (base {})",
                        group.base,
                        bucket.id,
                        bucket.base
                    );

                    bucket.desc.merge(&group.desc);
                    bucket.members.extend(members);
                    bucket.id
                }
                None => {
                    let id = buckets.len() as u32;

                    #[cfg(feature = "logging")]
                    log::trace!(
                        "New bucket {} for chain of {} (dedicated: {})",
                        id,
                        group.base,
                        group.dedicated
                    );

                    buckets.push(Bucket {
                        id,
                        base: group.base,
                        desc: group.desc,
                        persistent: group.dedicated,
                        members,
                        initial: InitialState::default(),
                    });
                    id
                }
            };

            for member in &group.members {
                assignment.insert(*member, bucket_id);
            }
        }

        //initial state is the state of the first interaction with any member
        for bucket in buckets.iter_mut() {
            let first = bucket
                .members
                .iter()
                .filter_map(|m| m.liveness.map(|l| (l.first, m.resource)))
                .min_by_key(|(first, res)| (*first, *res));
            if let Some((_, res)) = first {
                if let Some(state) = initial.get(&registry.base_of(res)) {
                    bucket.initial = *state;
                }
            }
        }

        #[cfg(feature = "logging")]
        log::info!(
            "Aliasing: {} resources in {} buckets, {} unused",
            assignment.len(),
            buckets.len(),
            unused.len()
        );

        Ok(AliasPlan {
            buckets,
            assignment,
            liveness,
            unused,
        })
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn bucket_of(&self, res: Res) -> Option<u32> {
        self.assignment.get(&res).copied()
    }

    pub fn liveness(&self, res: Res) -> Option<Liveness> {
        self.liveness.get(&res).copied()
    }

    ///Transient resources no live pass uses. Those have no bucket.
    pub fn unused(&self) -> &[Res] {
        &self.unused
    }
}

///Builds one group per alias chain, in id order of the bases.
fn collect_groups(registry: &Registry, present_base: Option<Res>) -> Result<Vec<Group>, BakeError> {
    let mut index: AHashMap<Res, usize> = AHashMap::default();
    let mut groups: Vec<Group> = Vec::new();

    for res in registry.resources() {
        let base = registry.base_of(res);
        let idx = match index.get(&base).copied() {
            Some(idx) => idx,
            None => {
                let dedicated =
                    registry.lifetime(base) == LifetimeClass::Persistent || Some(base) == present_base;
                index.insert(base, groups.len());
                groups.push(Group {
                    base,
                    members: Vec::new(),
                    desc: describe(registry, base)?,
                    dedicated,
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[idx];

        let desc = describe(registry, res)?;
        group.desc.merge(&desc);
        group.members.push(res);
    }

    for group in groups.iter_mut() {
        group
            .members
            .sort_by_key(|m| (registry.chain_order(*m), *m));
    }

    Ok(groups)
}

fn describe(registry: &Registry, res: Res) -> Result<BucketDesc, BakeError> {
    let desc = match res {
        Res::Buffer(id) => {
            let info = registry
                .buffer(id)
                .ok_or(ConfigurationError::UnknownResource(res))?;
            BucketDesc::Buffer {
                size: info.desc.size,
                usage: info.desc.usage,
                memory: info.desc.memory,
            }
        }
        Res::Image(id) => {
            let info = registry
                .image(id)
                .ok_or(ConfigurationError::UnknownResource(res))?;
            BucketDesc::Image {
                shape: info.shape,
                usage: info.desc.usage,
            }
        }
    };
    Ok(desc)
}

///True if `a` and `b` may share memory: either one of them is never used, or their liveness is disjoint and every use
/// of the earlier one happens before every use of the later one.
fn ordered(
    schedule: &Schedule,
    sync: &SyncPlan,
    users: &AHashMap<Res, Vec<usize>>,
    a: &BucketMember,
    b: &BucketMember,
) -> bool {
    let (Some(la), Some(lb)) = (a.liveness, b.liveness) else {
        return true;
    };
    if !la.independent(&lb) {
        return false;
    }
    let (earlier, later) = if la.last < lb.first {
        (a.resource, b.resource)
    } else {
        (b.resource, a.resource)
    };
    let (Some(earlier), Some(later)) = (users.get(&earlier), users.get(&later)) else {
        return true;
    };
    earlier
        .iter()
        .all(|e| later.iter().all(|l| sync.happens_before(schedule, *e, *l)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BufDesc, Declaration, DependencyGraph, ImgDesc, QueueClass, declare::Access};

    struct Baked {
        registry: Registry,
        plan: AliasPlan,
    }

    fn bake(decl: &Declaration, options: &BakeOptions) -> Baked {
        let registry = Registry::ingest(&decl.encode().unwrap().bytes).unwrap();
        let graph = DependencyGraph::build(&registry).unwrap();
        let schedule = Schedule::new(&registry, &graph, options).unwrap();
        let sync = SyncPlan::new(&graph, &schedule);
        let plan = AliasPlan::new(&registry, &schedule, &sync, options).unwrap();
        Baked { registry, plan }
    }

    #[test]
    fn liveness_ranges() {
        assert!(Liveness { first: 0, last: 1 }.independent(&Liveness { first: 2, last: 3 }));
        assert!(Liveness { first: 2, last: 3 }.independent(&Liveness { first: 0, last: 1 }));
        assert!(!Liveness { first: 0, last: 2 }.independent(&Liveness { first: 2, last: 3 }));
        assert_eq!(
            Liveness { first: 0, last: 1 }.union(&Liveness { first: 3, last: 4 }),
            Liveness { first: 0, last: 4 }
        );
    }

    ///a -> A -> B reads a'. b -> C -> D reads b'. C depends on B, so a and b never overlap.
    fn disjoint_chain(lifetime: LifetimeClass) -> Declaration {
        let mut decl = Declaration::new();
        let a = decl.buffer("a", BufDesc::storage(256), LifetimeClass::Transient);
        let b = decl.buffer("b", BufDesc::storage(256), lifetime);
        let gate = decl.buffer("gate", BufDesc::storage(16), LifetimeClass::Transient);

        let pa = decl.pass("A", QueueClass::Compute);
        let a1 = decl.write(pa, a, 0, Access::compute_write()).unwrap();
        let pb = decl.pass("B", QueueClass::Compute);
        decl.read(pb, a1, 0, Access::compute_read()).unwrap();
        let gate1 = decl.write(pb, gate, 1, Access::compute_write()).unwrap();
        let pc = decl.pass("C", QueueClass::Compute);
        decl.read(pc, gate1, 0, Access::compute_read()).unwrap();
        let b1 = decl.write(pc, b, 1, Access::compute_write()).unwrap();
        let pd = decl.pass("D", QueueClass::Compute);
        decl.read(pd, b1, 0, Access::compute_read()).unwrap();
        decl
    }

    #[test]
    fn disjoint_transients_share_a_bucket() {
        let decl = disjoint_chain(LifetimeClass::Transient);
        let baked = bake(&decl, &BakeOptions::default());
        let a = Res::Buffer(crate::BufferId(0));
        let b = Res::Buffer(crate::BufferId(1));
        assert_eq!(baked.plan.bucket_of(a), baked.plan.bucket_of(b));
        assert!(baked.plan.bucket_of(a).is_some());

        //a's chain and b's chain are members, in chain order.
        let bucket = &baked.plan.buckets()[baked.plan.bucket_of(a).unwrap() as usize];
        let la = baked.plan.liveness(a).unwrap();
        let lb = baked.plan.liveness(b).unwrap();
        assert!(la.independent(&lb));
        assert!(bucket.members.len() >= 4);
        assert_eq!(bucket.desc.byte_size(), 256);
    }

    #[test]
    fn sharing_can_be_disabled() {
        let decl = disjoint_chain(LifetimeClass::Transient);
        let options = BakeOptions {
            alias_transients: false,
            ..Default::default()
        };
        let baked = bake(&decl, &options);
        assert_ne!(
            baked.plan.bucket_of(Res::Buffer(crate::BufferId(0))),
            baked.plan.bucket_of(Res::Buffer(crate::BufferId(1)))
        );
    }

    #[test]
    fn persistent_resources_get_their_own_bucket() {
        let decl = disjoint_chain(LifetimeClass::Persistent);
        let baked = bake(&decl, &BakeOptions::default());
        let b = Res::Buffer(crate::BufferId(1));
        let bucket = &baked.plan.buckets()[baked.plan.bucket_of(b).unwrap() as usize];
        assert!(bucket.persistent);
        assert!(
            bucket
                .members
                .iter()
                .all(|m| baked.registry.base_of(m.resource) == b)
        );
    }

    #[test]
    fn overlapping_resources_are_separated() {
        let mut decl = Declaration::new();
        let a = decl.buffer("a", BufDesc::storage(256), LifetimeClass::Transient);
        let b = decl.buffer("b", BufDesc::storage(256), LifetimeClass::Transient);
        let pass = decl.pass("both", QueueClass::Compute);
        let a1 = decl.write(pass, a, 0, Access::compute_write()).unwrap();
        let b1 = decl.write(pass, b, 1, Access::compute_write()).unwrap();
        let reader = decl.pass("read", QueueClass::Compute);
        decl.read(reader, a1, 0, Access::compute_read()).unwrap();
        decl.read(reader, b1, 1, Access::compute_read()).unwrap();

        let baked = bake(&decl, &BakeOptions::default());
        assert_ne!(
            baked.plan.bucket_of(Res::Buffer(crate::BufferId(0))),
            baked.plan.bucket_of(Res::Buffer(crate::BufferId(1)))
        );
    }

    #[test]
    fn concurrent_queues_do_not_share() {
        //a is used on compute only, b on graphics only. Positions are disjoint, but nothing orders the queues.
        let mut decl = Declaration::new();
        let a = decl.buffer("a", BufDesc::storage(256), LifetimeClass::Transient);
        let b = decl.buffer("b", BufDesc::storage(256), LifetimeClass::Transient);
        let pa = decl.pass("compute", QueueClass::Compute);
        decl.write(pa, a, 0, Access::compute_write()).unwrap();
        let pb = decl.pass("graphics", QueueClass::Graphics);
        decl.write(pb, b, 0, Access::compute_write()).unwrap();

        let baked = bake(&decl, &BakeOptions::default());
        assert_ne!(
            baked.plan.bucket_of(Res::Buffer(crate::BufferId(0))),
            baked.plan.bucket_of(Res::Buffer(crate::BufferId(1)))
        );
    }

    #[test]
    fn unused_transients_get_no_bucket() {
        let mut decl = Declaration::new();
        decl.image(
            "idle",
            ImgDesc::texture_2d(8, 8, vk::Format::R8G8B8A8_UNORM),
            LifetimeClass::Transient,
        )
        .unwrap();
        let a = decl.buffer("a", BufDesc::storage(256), LifetimeClass::Transient);
        let pass = decl.pass("p", QueueClass::Compute);
        decl.write(pass, a, 0, Access::compute_write()).unwrap();

        let baked = bake(&decl, &BakeOptions::default());
        let idle = Res::Image(crate::ImageId(0));
        assert_eq!(baked.plan.bucket_of(idle), None);
        assert_eq!(baked.plan.unused(), &[idle]);
    }

    #[test]
    fn bindless_first_use_sets_initial_state() {
        let mut decl = Declaration::new();
        let lut = decl
            .image(
                "lut",
                ImgDesc::texture_2d(16, 16, vk::Format::R8G8B8A8_UNORM),
                LifetimeClass::Persistent,
            )
            .unwrap();
        let out = decl.buffer("out", BufDesc::storage(256), LifetimeClass::Transient);
        let params = decl.buffer("params", BufDesc::storage(64), LifetimeClass::Persistent);
        let textures = decl.bindless("textures", &[lut.into()]).unwrap();
        let constants = decl.bindless("constants", &[params.into()]).unwrap();

        let shade = decl.pass("shade", QueueClass::Compute);
        decl.use_bindless(shade, textures).unwrap();
        let out = decl.write(shade, out, 0, Access::compute_write()).unwrap();
        let draw = decl.pass("draw", QueueClass::Graphics);
        decl.use_bindless(draw, constants).unwrap();
        decl.read(draw, out, 0, Access::vertex_read()).unwrap();

        let baked = bake(&decl, &BakeOptions::default());
        let initial = |res: Res| {
            let bucket = baked.plan.bucket_of(res).unwrap();
            baked.plan.buckets()[bucket as usize].initial
        };

        assert_eq!(
            initial(Res::Image(crate::ImageId(0))),
            InitialState {
                stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
                access: vk::AccessFlags2::SHADER_SAMPLED_READ,
                layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            }
        );
        assert_eq!(
            initial(Res::Buffer(crate::BufferId(1))),
            InitialState {
                stage: vk::PipelineStageFlags2::VERTEX_SHADER | vk::PipelineStageFlags2::FRAGMENT_SHADER,
                access: vk::AccessFlags2::SHADER_STORAGE_READ,
                layout: vk::ImageLayout::UNDEFINED,
            }
        );
        //explicit interactions are unaffected
        assert_eq!(
            initial(Res::Buffer(crate::BufferId(0))).access,
            vk::AccessFlags2::SHADER_STORAGE_WRITE
        );
    }
}
