//! The baked graph and its output op-stream.
//!
//! [BakedGraph] is everything a backend needs to execute the schedule: buckets to allocate, the map of resources onto
//! buckets and per queue the submit frames and pass records. The stream layout is
//!
//! ```text
//! CreateBuffer | CreateImage   one per bucket, in bucket order
//! Alias                        one per non-base bucket member
//! QueueBegin                   per queue with passes, in queue order
//!   SubmitFrame                frame_count times
//!   Pass                       pass_count times, in queue order
//! End
//! ```

use ash::vk;
use rmg_opstream::{
    OUTPUT_MAGIC, Record, StreamError, StreamReader, StreamWriter, Tag, TailWriter, id_opt, opt_id,
    payload::{
        AliasPayload, CreateBufferPayload, CreateImagePayload, FramePayload, MODE_READ, MODE_WRITE,
        PassRecordPayload, QueueBeginPayload, ResolvedInteractionPayload, WaitPayload,
    },
};

use crate::{
    AccessMode, AliasPlan, BakeError, BucketDesc, ConfigurationError, ImageShape, InitialState, MemoryClass, PassId,
    ProgramId, QueueClass, Registry, Res, ResKind, Schedule, SubmitFrame, SyncEntry, SyncPlan, sync::Waits,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BakedBucket {
    pub id: u32,
    pub base: Res,
    pub desc: BucketDesc,
    pub persistent: bool,
    pub member_count: u32,
    pub initial: InitialState,
}

///Places a non-base resource within a bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BakedAlias {
    pub resource: Res,
    pub bucket: u32,
    pub base: Res,
    pub offset: u64,
}

///Interaction with its resource resolved to a bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedInteraction {
    pub resource: Res,
    pub output: Option<Res>,
    pub bucket: u32,
    pub binding: u32,
    pub mode: AccessMode,
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    pub layout: Option<vk::ImageLayout>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BakedPass {
    pub id: PassId,
    pub name: String,
    pub queue: QueueClass,
    pub position: u32,
    pub queue_index: u32,
    pub level: u32,
    pub program: Option<ProgramId>,
    pub interactions: Vec<ResolvedInteraction>,
    pub waits: Waits,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BakedQueue {
    pub queue: QueueClass,
    pub frames: Vec<SubmitFrame>,
    pub passes: Vec<BakedPass>,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct BakedGraph {
    pub buckets: Vec<BakedBucket>,
    pub aliases: Vec<BakedAlias>,
    ///Only queues with at least one pass, in [QueueClass] order.
    pub queues: Vec<BakedQueue>,
}

///Resolves the stage outputs into a [BakedGraph].
pub fn emit(
    registry: &Registry,
    schedule: &Schedule,
    sync: &SyncPlan,
    aliasing: &AliasPlan,
) -> Result<BakedGraph, BakeError> {
    #[cfg(feature = "profiling")]
    puffin::profile_function!();

    let mut graph = BakedGraph::default();

    for bucket in aliasing.buckets() {
        graph.buckets.push(BakedBucket {
            id: bucket.id,
            base: bucket.base,
            desc: bucket.desc,
            persistent: bucket.persistent,
            member_count: bucket.members.len() as u32,
            initial: bucket.initial,
        });
        for member in bucket.members.iter().filter(|m| m.resource != bucket.base) {
            graph.aliases.push(BakedAlias {
                resource: member.resource,
                bucket: bucket.id,
                base: bucket.base,
                offset: 0,
            });
        }
    }

    let bucket_of = |res: Res| {
        aliasing
            .bucket_of(res)
            .ok_or(ConfigurationError::UnknownResource(res))
    };

    for queue in QueueClass::ALL {
        let passes = schedule.queue_passes(queue);
        if passes.is_empty() {
            continue;
        }

        let mut baked = BakedQueue {
            queue,
            frames: sync.frames(queue).to_vec(),
            passes: Vec::with_capacity(passes.len()),
        };

        for &pass in passes {
            let info = &registry.passes()[pass];
            let interactions = info
                .interactions()
                .map(|i| {
                    Ok(ResolvedInteraction {
                        resource: i.resource,
                        output: i.output,
                        bucket: bucket_of(i.resource)?,
                        binding: i.binding,
                        mode: i.mode,
                        stage: i.stage,
                        access: i.access,
                        layout: i.layout,
                    })
                })
                .collect::<Result<Vec<_>, ConfigurationError>>()?;

            baked.passes.push(BakedPass {
                id: info.id,
                name: info.name.clone(),
                queue,
                position: schedule.position(pass).unwrap_or(0),
                queue_index: schedule.queue_index(pass),
                level: schedule.level(pass),
                program: info.program,
                interactions,
                waits: sync.waits(pass).iter().copied().collect(),
            });
        }

        graph.queues.push(baked);
    }

    Ok(graph)
}

fn wait_payload(wait: &SyncEntry) -> WaitPayload {
    WaitPayload {
        queue: wait.queue.as_raw(),
        index: wait.index,
    }
}

fn image_layout(raw: i32) -> Option<vk::ImageLayout> {
    let layout = vk::ImageLayout::from_raw(raw);
    if layout == vk::ImageLayout::UNDEFINED {
        None
    } else {
        Some(layout)
    }
}

impl BakedGraph {
    pub fn pass_count(&self) -> usize {
        self.queues.iter().map(|q| q.passes.len()).sum()
    }

    pub fn queue(&self, queue: QueueClass) -> Option<&BakedQueue> {
        self.queues.iter().find(|q| q.queue == queue)
    }

    ///All passes ordered by their global position.
    pub fn passes_in_order(&self) -> Vec<&BakedPass> {
        let mut passes: Vec<&BakedPass> = self.queues.iter().flat_map(|q| q.passes.iter()).collect();
        passes.sort_by_key(|p| p.position);
        passes
    }

    pub fn pass(&self, id: PassId) -> Option<&BakedPass> {
        self.queues
            .iter()
            .flat_map(|q| q.passes.iter())
            .find(|p| p.id == id)
    }

    ///Bucket `res` lives in.
    pub fn bucket_of(&self, res: Res) -> Option<u32> {
        self.buckets
            .iter()
            .find(|b| b.base == res)
            .map(|b| b.id)
            .or_else(|| self.aliases.iter().find(|a| a.resource == res).map(|a| a.bucket))
    }

    ///Serializes the graph into an output op-stream.
    pub fn encode(&self) -> Vec<u8> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let mut writer = StreamWriter::new(OUTPUT_MAGIC);

        for bucket in &self.buckets {
            match bucket.desc {
                BucketDesc::Buffer { size, usage, memory } => writer.push(
                    Tag::CreateBuffer,
                    &CreateBufferPayload {
                        size,
                        bucket: bucket.id,
                        base: bucket.base.raw(),
                        usage: usage.as_raw(),
                        memory: memory.as_raw(),
                        persistent: bucket.persistent as u32,
                        member_count: bucket.member_count,
                        initial_stage: bucket.initial.stage.as_raw(),
                        initial_access: bucket.initial.access.as_raw(),
                    },
                    TailWriter::new(),
                ),
                BucketDesc::Image { shape, usage } => writer.push(
                    Tag::CreateImage,
                    &CreateImagePayload {
                        initial_stage: bucket.initial.stage.as_raw(),
                        initial_access: bucket.initial.access.as_raw(),
                        bucket: bucket.id,
                        base: bucket.base.raw(),
                        width: shape.width,
                        height: shape.height,
                        depth: shape.depth,
                        format: shape.format.as_raw(),
                        usage: usage.as_raw(),
                        mip_levels: shape.mip_levels,
                        array_layers: shape.array_layers,
                        samples: shape.samples.as_raw(),
                        persistent: bucket.persistent as u32,
                        member_count: bucket.member_count,
                        initial_layout: bucket.initial.layout.as_raw(),
                        _reserved: 0,
                    },
                    TailWriter::new(),
                ),
            }
        }

        for alias in &self.aliases {
            writer.push(
                Tag::Alias,
                &AliasPayload {
                    offset: alias.offset,
                    resource_kind: alias.resource.kind().as_raw(),
                    resource: alias.resource.raw(),
                    bucket: alias.bucket,
                    base: alias.base.raw(),
                },
                TailWriter::new(),
            );
        }

        for queue in &self.queues {
            writer.push(
                Tag::QueueBegin,
                &QueueBeginPayload {
                    queue: queue.queue.as_raw(),
                    pass_count: queue.passes.len() as u32,
                    frame_count: queue.frames.len() as u32,
                    _reserved: 0,
                },
                TailWriter::new(),
            );

            for frame in &queue.frames {
                let waits: Vec<WaitPayload> = frame.waits.iter().map(wait_payload).collect();
                let mut tail = TailWriter::new();
                tail.items(&waits);
                writer.push(
                    Tag::SubmitFrame,
                    &FramePayload {
                        signal: frame.signal,
                        queue: frame.queue.as_raw(),
                        first: frame.first,
                        len: frame.len,
                        wait_count: waits.len() as u32,
                    },
                    tail,
                );
            }

            for pass in &queue.passes {
                let interactions: Vec<ResolvedInteractionPayload> = pass
                    .interactions
                    .iter()
                    .map(|i| ResolvedInteractionPayload {
                        stage: i.stage.as_raw(),
                        access: i.access.as_raw(),
                        resource_kind: i.resource.kind().as_raw(),
                        resource: i.resource.raw(),
                        output: opt_id(i.output.map(|o| o.raw())),
                        bucket: i.bucket,
                        binding: i.binding,
                        mode: match i.mode {
                            AccessMode::Read => MODE_READ,
                            AccessMode::Write => MODE_WRITE,
                        },
                        layout: i.layout.unwrap_or(vk::ImageLayout::UNDEFINED).as_raw(),
                        _reserved: 0,
                    })
                    .collect();
                let waits: Vec<WaitPayload> = pass.waits.iter().map(wait_payload).collect();

                let mut tail = TailWriter::new();
                tail.items(&interactions).items(&waits).string(&pass.name);
                writer.push(
                    Tag::Pass,
                    &PassRecordPayload {
                        id: pass.id.0,
                        queue: pass.queue.as_raw(),
                        position: pass.position,
                        queue_index: pass.queue_index,
                        level: pass.level,
                        program: opt_id(pass.program.map(|p| p.0)),
                        interaction_count: interactions.len() as u32,
                        wait_count: waits.len() as u32,
                        name_len: pass.name.len() as u32,
                        _reserved: 0,
                    },
                    tail,
                );
            }
        }

        writer.finish()
    }

    ///Reads an output op-stream back. Validates record order and counts.
    pub fn decode(bytes: &[u8]) -> Result<Self, StreamError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        #[derive(PartialEq, Eq, PartialOrd, Ord)]
        enum Section {
            Buckets,
            Aliases,
            Queues,
        }

        struct Open {
            frames_left: u32,
            passes_left: u32,
        }

        let mut reader = StreamReader::new(bytes, OUTPUT_MAGIC)?;
        let mut graph = BakedGraph::default();
        let mut section = Section::Buckets;
        let mut open: Option<Open> = None;

        loop {
            let record = reader.next_record()?;
            let unexpected = StreamError::UnexpectedTag { found: record.tag };
            match record.tag {
                Tag::CreateBuffer | Tag::CreateImage if section == Section::Buckets => {
                    graph.buckets.push(decode_bucket(&record)?);
                }
                Tag::Alias if section <= Section::Aliases => {
                    section = Section::Aliases;
                    let payload: AliasPayload = record.payload()?;
                    record.tail().finish()?;
                    let kind = res_kind(payload.resource_kind)?;
                    graph.aliases.push(BakedAlias {
                        resource: Res::new(kind, payload.resource),
                        bucket: payload.bucket,
                        base: Res::new(kind, payload.base),
                        offset: payload.offset,
                    });
                }
                Tag::QueueBegin => {
                    if open.as_ref().is_some_and(|o| o.frames_left + o.passes_left > 0) {
                        return Err(unexpected);
                    }
                    section = Section::Queues;
                    let payload: QueueBeginPayload = record.payload()?;
                    record.tail().finish()?;
                    graph.queues.push(BakedQueue {
                        queue: queue_class(payload.queue)?,
                        frames: Vec::with_capacity(payload.frame_count as usize),
                        passes: Vec::with_capacity(payload.pass_count as usize),
                    });
                    open = Some(Open {
                        frames_left: payload.frame_count,
                        passes_left: payload.pass_count,
                    });
                }
                Tag::SubmitFrame => {
                    let (Some(state), Some(queue)) = (open.as_mut(), graph.queues.last_mut()) else {
                        return Err(unexpected);
                    };
                    if state.frames_left == 0 {
                        return Err(unexpected);
                    }
                    state.frames_left -= 1;

                    let payload: FramePayload = record.payload()?;
                    let mut tail = record.tail();
                    let waits: Vec<WaitPayload> = tail.items(payload.wait_count as usize)?;
                    tail.finish()?;
                    queue.frames.push(SubmitFrame {
                        queue: queue_class(payload.queue)?,
                        first: payload.first,
                        len: payload.len,
                        waits: decode_waits(&waits)?,
                        signal: payload.signal,
                    });
                }
                Tag::Pass => {
                    let (Some(state), Some(queue)) = (open.as_mut(), graph.queues.last_mut()) else {
                        return Err(unexpected);
                    };
                    if state.frames_left != 0 || state.passes_left == 0 {
                        return Err(unexpected);
                    }
                    state.passes_left -= 1;
                    queue.passes.push(decode_pass(&record)?);
                }
                Tag::End => {
                    if open.as_ref().is_some_and(|o| o.frames_left + o.passes_left > 0) {
                        return Err(unexpected);
                    }
                    break;
                }
                _ => return Err(unexpected),
            }
        }

        Ok(graph)
    }
}

fn res_kind(raw: u32) -> Result<ResKind, StreamError> {
    ResKind::from_raw(raw).ok_or(StreamError::InvalidValue {
        field: "resource kind",
        value: raw,
    })
}

fn queue_class(raw: u32) -> Result<QueueClass, StreamError> {
    QueueClass::from_raw(raw).ok_or(StreamError::InvalidValue {
        field: "queue class",
        value: raw,
    })
}

fn decode_waits(waits: &[WaitPayload]) -> Result<Waits, StreamError> {
    waits
        .iter()
        .map(|w| {
            Ok(SyncEntry {
                queue: queue_class(w.queue)?,
                index: w.index,
            })
        })
        .collect()
}

fn decode_bucket(record: &Record) -> Result<BakedBucket, StreamError> {
    record.tail().finish()?;
    let bucket = if record.tag == Tag::CreateBuffer {
        let payload: CreateBufferPayload = record.payload()?;
        BakedBucket {
            id: payload.bucket,
            base: Res::new(ResKind::Buffer, payload.base),
            desc: BucketDesc::Buffer {
                size: payload.size,
                usage: vk::BufferUsageFlags::from_raw(payload.usage),
                memory: MemoryClass::from_raw(payload.memory).ok_or(StreamError::InvalidValue {
                    field: "memory class",
                    value: payload.memory,
                })?,
            },
            persistent: payload.persistent != 0,
            member_count: payload.member_count,
            initial: InitialState {
                stage: vk::PipelineStageFlags2::from_raw(payload.initial_stage),
                access: vk::AccessFlags2::from_raw(payload.initial_access),
                layout: vk::ImageLayout::UNDEFINED,
            },
        }
    } else {
        let payload: CreateImagePayload = record.payload()?;
        BakedBucket {
            id: payload.bucket,
            base: Res::new(ResKind::Image, payload.base),
            desc: BucketDesc::Image {
                shape: ImageShape {
                    width: payload.width,
                    height: payload.height,
                    depth: payload.depth,
                    format: vk::Format::from_raw(payload.format),
                    mip_levels: payload.mip_levels,
                    array_layers: payload.array_layers,
                    samples: vk::SampleCountFlags::from_raw(payload.samples),
                },
                usage: vk::ImageUsageFlags::from_raw(payload.usage),
            },
            persistent: payload.persistent != 0,
            member_count: payload.member_count,
            initial: InitialState {
                stage: vk::PipelineStageFlags2::from_raw(payload.initial_stage),
                access: vk::AccessFlags2::from_raw(payload.initial_access),
                layout: vk::ImageLayout::from_raw(payload.initial_layout),
            },
        }
    };
    Ok(bucket)
}

fn decode_pass(record: &Record) -> Result<BakedPass, StreamError> {
    let payload: PassRecordPayload = record.payload()?;
    let mut tail = record.tail();
    let interactions: Vec<ResolvedInteractionPayload> = tail.items(payload.interaction_count as usize)?;
    let waits: Vec<WaitPayload> = tail.items(payload.wait_count as usize)?;
    let name = tail.string(payload.name_len as usize)?.to_string();
    tail.finish()?;

    let interactions = interactions
        .iter()
        .map(|i| {
            let kind = res_kind(i.resource_kind)?;
            let mode = match i.mode {
                MODE_READ => AccessMode::Read,
                MODE_WRITE => AccessMode::Write,
                other => {
                    return Err(StreamError::InvalidValue {
                        field: "access mode",
                        value: other,
                    });
                }
            };
            Ok(ResolvedInteraction {
                resource: Res::new(kind, i.resource),
                output: id_opt(i.output).map(|o| Res::new(kind, o)),
                bucket: i.bucket,
                binding: i.binding,
                mode,
                stage: vk::PipelineStageFlags2::from_raw(i.stage),
                access: vk::AccessFlags2::from_raw(i.access),
                layout: image_layout(i.layout),
            })
        })
        .collect::<Result<Vec<_>, StreamError>>()?;

    Ok(BakedPass {
        id: PassId(payload.id),
        name,
        queue: queue_class(payload.queue)?,
        position: payload.position,
        queue_index: payload.queue_index,
        level: payload.level,
        program: id_opt(payload.program).map(ProgramId),
        interactions,
        waits: decode_waits(&waits)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BakeOptions, BufDesc, Declaration, ImgDesc, LifetimeClass, bake, declare::Access};

    fn frame() -> Declaration {
        let mut decl = Declaration::new();
        decl.set_render_extent(128, 64, vk::Format::B8G8R8A8_SRGB);
        let lights = decl.buffer("lights", BufDesc::storage(4096), LifetimeClass::Transient);
        let target = decl
            .image(
                "target",
                ImgDesc::render_target(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::STORAGE),
                LifetimeClass::Transient,
            )
            .unwrap();

        let cull = decl.pass("cull lights", QueueClass::Compute);
        let lights = decl.write(cull, lights, 0, Access::compute_write()).unwrap();
        let shade = decl.pass("shade", QueueClass::Graphics);
        decl.read(shade, lights, 0, Access::fragment_read()).unwrap();
        let target = decl.write(shade, target, 1, Access::color_attachment()).unwrap();
        decl.set_present_image(target).unwrap();
        decl
    }

    #[test]
    fn output_stream_roundtrip() {
        let bake = bake(&frame().encode().unwrap().bytes, &BakeOptions::default()).unwrap();
        let bytes = bake.graph.encode();
        let decoded = BakedGraph::decode(&bytes).unwrap();
        assert_eq!(decoded, bake.graph);
        assert_eq!(decoded.pass_count(), 2);
        assert!(decoded.buckets.iter().any(|b| b.persistent));
    }

    #[test]
    fn decoder_checks_queue_counts() {
        let mut writer = StreamWriter::new(OUTPUT_MAGIC);
        writer.push(
            Tag::QueueBegin,
            &QueueBeginPayload {
                queue: 0,
                pass_count: 1,
                frame_count: 0,
                _reserved: 0,
            },
            TailWriter::new(),
        );
        //announced pass is missing
        assert!(matches!(
            BakedGraph::decode(&writer.finish()),
            Err(StreamError::UnexpectedTag { found: Tag::End })
        ));
    }

    #[test]
    fn buckets_after_queues_are_rejected() {
        let bake = bake(&frame().encode().unwrap().bytes, &BakeOptions::default()).unwrap();
        let mut reordered = BakedGraph {
            buckets: Vec::new(),
            aliases: Vec::new(),
            queues: bake.graph.queues.clone(),
        };
        let mut bytes = reordered.encode();
        assert!(BakedGraph::decode(&bytes).is_ok());

        //append a create record behind the queue section
        reordered.queues.clear();
        reordered.buckets = bake.graph.buckets.clone();
        let buckets = reordered.encode();
        let end_record = 16;
        bytes.truncate(bytes.len() - end_record);
        bytes.extend_from_slice(&buckets[8..]);
        assert!(matches!(
            BakedGraph::decode(&bytes),
            Err(StreamError::UnexpectedTag {
                found: Tag::CreateBuffer | Tag::CreateImage
            })
        ));
    }
}
