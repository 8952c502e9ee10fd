//! Decodes an input op-stream into dense per-kind tables.
//!
//! The registry is the only stage that touches the wire format of the declaration. Everything after works on the
//! typed tables below. Ids are dense and sized by the leading brief record, so every table is a plain `Vec` indexed by
//! id.

mod alias;
pub(crate) use alias::AliasForest;

use ahash::AHashSet;
use ash::vk;
use rmg_opstream::{
    INPUT_MAGIC, RECORD_OVERHEAD, Record, StreamError, StreamReader, Tag, id_opt,
    payload::{
        BindlessPayload, BriefPayload, BufferPayload, ForceAliasPayload, ImagePayload, InteractionPayload,
        PassPayload, ProgramPayload, ResourceRef, SIZING_FIXED, SIZING_RENDER, SamplerPayload, ShaderPayload,
    },
};
use smallvec::SmallVec;

use crate::{
    AccessMode, AliasError, BakeError, BindlessId, BufDesc, BufferId, ConfigurationError, ImageExtent, ImageId,
    ImageShape, ImgDesc, Interaction, LifetimeClass, MemoryClass, PassId, PassRef, ProgramId, QueueClass, Res, ResKind,
    SamplerId, ShaderId,
};

///Global graph settings of the brief record.
#[derive(Clone, Copy, Debug)]
pub struct Brief {
    pub buffer_count: u32,
    pub image_count: u32,
    pub pass_count: u32,
    pub program_count: u32,
    pub shader_count: u32,
    pub sampler_count: u32,
    pub bindless_count: u32,
    pub present_image: Option<ImageId>,
    ///Extent render sized images resolve to. `None` if the graph has no render extent.
    pub render_extent: Option<(u32, u32)>,
    pub render_format: vk::Format,
}

#[derive(Clone, Debug)]
pub struct BufferInfo {
    pub name: String,
    pub desc: BufDesc,
    pub lifetime: LifetimeClass,
}

#[derive(Clone, Debug)]
pub struct ImageInfo {
    pub name: String,
    pub desc: ImgDesc,
    ///Physical shape after resolving the render extent.
    pub shape: ImageShape,
    pub lifetime: LifetimeClass,
}

#[derive(Clone, Debug)]
pub struct ShaderInfo {
    pub path: String,
    pub stage: vk::ShaderStageFlags,
}

#[derive(Clone, Debug)]
pub struct ProgramInfo {
    pub name: String,
    pub shaders: Vec<ShaderId>,
}

#[derive(Clone, Debug)]
pub struct SamplerInfo {
    pub name: String,
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
}

#[derive(Clone, Debug)]
pub struct BindlessInfo {
    pub name: String,
    pub resources: Vec<Res>,
}

#[derive(Clone, Debug)]
pub struct PassInfo {
    pub id: PassId,
    pub name: String,
    pub queue: QueueClass,
    pub program: Option<ProgramId>,
    pub bindless: Option<BindlessId>,
    pub reads: SmallVec<[Interaction; 4]>,
    pub writes: SmallVec<[Interaction; 4]>,
    ///Reads implied by the bound bindless table.
    pub bindless_reads: Vec<Res>,
}

impl PassInfo {
    pub fn pass_ref(&self) -> PassRef {
        PassRef {
            id: self.id,
            name: self.name.clone(),
        }
    }

    ///Reads followed by writes, in declaration order.
    pub fn interactions(&self) -> impl Iterator<Item = &Interaction> + '_ {
        self.reads.iter().chain(self.writes.iter())
    }

    ///Every version this pass reads, explicit reads first.
    pub fn read_versions(&self) -> impl Iterator<Item = Res> + '_ {
        self.reads
            .iter()
            .map(|r| r.resource)
            .chain(self.bindless_reads.iter().copied())
    }
}

fn table<T>(count: u32) -> Vec<Option<T>> {
    (0..count).map(|_| None).collect()
}

///Checks `id` against the brief and makes sure the slot is still empty.
fn claim<T>(table: &[Option<T>], kind: &'static str, id: u32) -> Result<usize, ConfigurationError> {
    match table.get(id as usize) {
        None => Err(ConfigurationError::IdOutOfRange {
            kind,
            id,
            count: table.len() as u32,
        }),
        Some(Some(_)) => Err(ConfigurationError::DuplicateId { kind, id }),
        Some(None) => Ok(id as usize),
    }
}

fn known<T>(table: &[Option<T>], kind: &'static str, id: u32) -> Result<(), ConfigurationError> {
    if table.get(id as usize).map(|s| s.is_some()).unwrap_or(false) {
        Ok(())
    } else {
        Err(ConfigurationError::UnknownHandle { kind, id })
    }
}

///Every declared entry needs its own record, so no count can exceed the number of records `len` bytes can hold. Keeps
/// table allocation bounded by the stream size.
fn check_counts(brief: &BriefPayload, len: usize) -> Result<(), ConfigurationError> {
    let limit = len / RECORD_OVERHEAD;
    let counts = [
        ("buffer", brief.buffer_count),
        ("image", brief.image_count),
        ("pass", brief.pass_count),
        ("program", brief.program_count),
        ("shader", brief.shader_count),
        ("sampler", brief.sampler_count),
        ("bindless", brief.bindless_count),
    ];
    for (kind, count) in counts {
        if count as usize > limit {
            return Err(ConfigurationError::CountExceedsStream { kind, count, limit });
        }
    }
    Ok(())
}

fn owned(s: &str) -> String {
    s.to_string()
}

///Dense tables of everything an input stream declared.
pub struct Registry {
    brief: Brief,
    buffers: Vec<Option<BufferInfo>>,
    images: Vec<Option<ImageInfo>>,
    shaders: Vec<Option<ShaderInfo>>,
    programs: Vec<Option<ProgramInfo>>,
    samplers: Vec<Option<SamplerInfo>>,
    bindless: Vec<Option<BindlessInfo>>,
    ///Passes in declaration order.
    passes: Vec<PassInfo>,
    ///Maps pass ids to their declaration index.
    pass_slots: Vec<Option<usize>>,
    buffer_alias: AliasForest,
    image_alias: AliasForest,
}

impl Registry {
    ///Decodes and validates `bytes`. Fails on the first malformed or inconsistent record.
    pub fn ingest(bytes: &[u8]) -> Result<Self, BakeError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let mut reader = StreamReader::new(bytes, INPUT_MAGIC)?;
        let first = reader.next_record()?;
        if first.tag != Tag::SetBrief {
            return Err(ConfigurationError::MissingBrief.into());
        }
        let brief: BriefPayload = first.payload()?;
        first.tail().finish()?;
        check_counts(&brief, bytes.len())?;
        let mut registry = Registry::from_brief(brief);

        loop {
            let record = reader.next_record()?;
            match record.tag {
                Tag::SetBrief => return Err(ConfigurationError::DuplicateBrief.into()),
                Tag::RegisterShader => registry.add_shader(&record)?,
                Tag::RegisterProgram => registry.add_program(&record)?,
                Tag::RegisterBuffer => registry.add_buffer(&record)?,
                Tag::RegisterImage => registry.add_image(&record)?,
                Tag::RegisterSampler => registry.add_sampler(&record)?,
                Tag::RegisterBindless => registry.add_bindless(&record)?,
                Tag::ForceAliasBuffer => registry.add_force_alias(ResKind::Buffer, &record)?,
                Tag::ForceAliasImage => registry.add_force_alias(ResKind::Image, &record)?,
                Tag::RegisterPass => registry.add_pass(&record)?,
                Tag::End => break,
                other => return Err(StreamError::UnexpectedTag { found: other }.into()),
            }
        }

        registry.finish()?;

        #[cfg(feature = "logging")]
        log::info!(
            "Ingested {} passes, {} buffers, {} images",
            registry.passes.len(),
            registry.buffers.iter().flatten().count(),
            registry.images.iter().flatten().count()
        );

        Ok(registry)
    }

    fn from_brief(brief: BriefPayload) -> Self {
        let render_extent = if brief.render_width > 0 && brief.render_height > 0 {
            Some((brief.render_width, brief.render_height))
        } else {
            None
        };

        #[cfg(feature = "logging")]
        log::trace!("Brief: {:?}", brief);

        Registry {
            brief: Brief {
                buffer_count: brief.buffer_count,
                image_count: brief.image_count,
                pass_count: brief.pass_count,
                program_count: brief.program_count,
                shader_count: brief.shader_count,
                sampler_count: brief.sampler_count,
                bindless_count: brief.bindless_count,
                present_image: id_opt(brief.present_image).map(ImageId),
                render_extent,
                render_format: vk::Format::from_raw(brief.render_format),
            },
            buffers: table(brief.buffer_count),
            images: table(brief.image_count),
            shaders: table(brief.shader_count),
            programs: table(brief.program_count),
            samplers: table(brief.sampler_count),
            bindless: table(brief.bindless_count),
            passes: Vec::with_capacity(brief.pass_count as usize),
            pass_slots: vec![None; brief.pass_count as usize],
            buffer_alias: AliasForest::new(ResKind::Buffer, brief.buffer_count as usize),
            image_alias: AliasForest::new(ResKind::Image, brief.image_count as usize),
        }
    }

    fn add_shader(&mut self, record: &Record) -> Result<(), BakeError> {
        let payload: ShaderPayload = record.payload()?;
        let slot = claim(&self.shaders, "shader", payload.id)?;
        let mut tail = record.tail();
        let path = owned(tail.string(payload.path_len as usize)?);
        tail.finish()?;

        self.shaders[slot] = Some(ShaderInfo {
            path,
            stage: vk::ShaderStageFlags::from_raw(payload.stage),
        });
        Ok(())
    }

    fn add_program(&mut self, record: &Record) -> Result<(), BakeError> {
        let payload: ProgramPayload = record.payload()?;
        let slot = claim(&self.programs, "program", payload.id)?;
        let mut tail = record.tail();
        let shaders: Vec<u32> = tail.items(payload.shader_count as usize)?;
        let name = owned(tail.string(payload.name_len as usize)?);
        tail.finish()?;

        for shader in &shaders {
            known(&self.shaders, "shader", *shader)?;
        }

        self.programs[slot] = Some(ProgramInfo {
            name,
            shaders: shaders.into_iter().map(ShaderId).collect(),
        });
        Ok(())
    }

    fn add_buffer(&mut self, record: &Record) -> Result<(), BakeError> {
        let payload: BufferPayload = record.payload()?;
        let slot = claim(&self.buffers, "buffer", payload.id)?;
        let mut tail = record.tail();
        let name = owned(tail.string(payload.name_len as usize)?);
        tail.finish()?;

        let memory = MemoryClass::from_raw(payload.memory).ok_or(ConfigurationError::InvalidValue {
            field: "memory class",
            value: payload.memory,
        })?;
        let lifetime = LifetimeClass::from_raw(payload.lifetime).ok_or(ConfigurationError::InvalidValue {
            field: "lifetime class",
            value: payload.lifetime,
        })?;

        #[cfg(feature = "logging")]
        if payload.size == 0 {
            log::warn!("Buffer {} '{}' has size 0", payload.id, name);
        }

        self.buffers[slot] = Some(BufferInfo {
            name,
            desc: BufDesc {
                size: payload.size,
                usage: vk::BufferUsageFlags::from_raw(payload.usage),
                memory,
            },
            lifetime,
        });
        self.buffer_alias.register(payload.id);
        Ok(())
    }

    fn add_image(&mut self, record: &Record) -> Result<(), BakeError> {
        let payload: ImagePayload = record.payload()?;
        let slot = claim(&self.images, "image", payload.id)?;
        let mut tail = record.tail();
        let name = owned(tail.string(payload.name_len as usize)?);
        tail.finish()?;

        let res = Res::Image(ImageId(payload.id));
        let lifetime = LifetimeClass::from_raw(payload.lifetime).ok_or(ConfigurationError::InvalidValue {
            field: "lifetime class",
            value: payload.lifetime,
        })?;
        let format = vk::Format::from_raw(payload.format);

        let (extent, width, height, depth, shape_format) = match payload.sizing {
            SIZING_FIXED => (
                ImageExtent::Fixed {
                    width: payload.width,
                    height: payload.height,
                    depth: payload.depth.max(1),
                },
                payload.width,
                payload.height,
                payload.depth.max(1),
                format,
            ),
            SIZING_RENDER => {
                if format != vk::Format::UNDEFINED {
                    return Err(ConfigurationError::DerivedFormatOverride {
                        image: name,
                        format: format!("{:?}", format),
                    }
                    .into());
                }
                let (width, height) = self
                    .brief
                    .render_extent
                    .ok_or(ConfigurationError::NoRenderExtent(res))?;
                (ImageExtent::Render, width, height, 1, self.brief.render_format)
            }
            other => {
                return Err(ConfigurationError::InvalidValue {
                    field: "image sizing",
                    value: other,
                }
                .into());
            }
        };

        let desc = ImgDesc {
            extent,
            format,
            usage: vk::ImageUsageFlags::from_raw(payload.usage),
            mip_levels: payload.mip_levels.max(1),
            array_layers: payload.array_layers.max(1),
            samples: vk::SampleCountFlags::from_raw(payload.samples.max(1)),
        };
        let shape = ImageShape {
            width,
            height,
            depth,
            format: shape_format,
            mip_levels: desc.mip_levels,
            array_layers: desc.array_layers,
            samples: desc.samples,
        };

        self.images[slot] = Some(ImageInfo {
            name,
            desc,
            shape,
            lifetime,
        });
        self.image_alias.register(payload.id);
        Ok(())
    }

    fn add_sampler(&mut self, record: &Record) -> Result<(), BakeError> {
        let payload: SamplerPayload = record.payload()?;
        let slot = claim(&self.samplers, "sampler", payload.id)?;
        let mut tail = record.tail();
        let name = owned(tail.string(payload.name_len as usize)?);
        tail.finish()?;

        self.samplers[slot] = Some(SamplerInfo {
            name,
            mag_filter: vk::Filter::from_raw(payload.mag_filter),
            min_filter: vk::Filter::from_raw(payload.min_filter),
            address_mode: vk::SamplerAddressMode::from_raw(payload.address_mode),
        });
        Ok(())
    }

    fn resource_ref(&self, rref: &ResourceRef) -> Result<Res, ConfigurationError> {
        let kind = ResKind::from_raw(rref.kind).ok_or(ConfigurationError::InvalidValue {
            field: "resource kind",
            value: rref.kind,
        })?;
        let res = Res::new(kind, rref.id);
        if self.contains(res) {
            Ok(res)
        } else {
            Err(ConfigurationError::UnknownResource(res))
        }
    }

    fn add_bindless(&mut self, record: &Record) -> Result<(), BakeError> {
        let payload: BindlessPayload = record.payload()?;
        let slot = claim(&self.bindless, "bindless", payload.id)?;
        let mut tail = record.tail();
        let refs: Vec<ResourceRef> = tail.items(payload.resource_count as usize)?;
        let name = owned(tail.string(payload.name_len as usize)?);
        tail.finish()?;

        let resources = refs
            .iter()
            .map(|r| self.resource_ref(r))
            .collect::<Result<Vec<_>, _>>()?;

        self.bindless[slot] = Some(BindlessInfo { name, resources });
        Ok(())
    }

    ///Checks that `alias` fits into the memory of the chain rooted at `root`.
    fn check_compatible(&self, root: Res, alias: Res) -> Result<(), AliasError> {
        let compatible = match (root, alias) {
            (Res::Buffer(root), Res::Buffer(alias)) => {
                match (self.buffer(root), self.buffer(alias)) {
                    (Some(root), Some(alias)) => {
                        alias.desc.size <= root.desc.size && alias.desc.memory == root.desc.memory
                    }
                    _ => false,
                }
            }
            (Res::Image(root), Res::Image(alias)) => match (self.image(root), self.image(alias)) {
                (Some(root), Some(alias)) => root.shape == alias.shape,
                _ => false,
            },
            _ => false,
        };

        if compatible {
            Ok(())
        } else {
            Err(AliasError::DescriptorMismatch { alias, base: root })
        }
    }

    fn forest_mut(&mut self, kind: ResKind) -> &mut AliasForest {
        match kind {
            ResKind::Buffer => &mut self.buffer_alias,
            ResKind::Image => &mut self.image_alias,
        }
    }

    ///Links `alias` under `base` and validates the descriptors against the chain's root.
    fn link(&mut self, base: Res, alias: Res) -> Result<(), AliasError> {
        let root = self.forest_mut(base.kind()).link(base.raw(), alias.raw())?;
        let root = Res::new(base.kind(), root);

        #[cfg(feature = "logging")]
        log::trace!("Aliasing {} onto {} (root {})", alias, base, root);

        self.check_compatible(root, alias)
    }

    fn add_force_alias(&mut self, kind: ResKind, record: &Record) -> Result<(), BakeError> {
        let payload: ForceAliasPayload = record.payload()?;
        record.tail().finish()?;
        self.link(Res::new(kind, payload.base), Res::new(kind, payload.alias))?;
        Ok(())
    }

    fn interaction(
        &self,
        raw: &InteractionPayload,
        mode: AccessMode,
        pass: &PassRef,
    ) -> Result<Interaction, ConfigurationError> {
        let resource = self.resource_ref(&ResourceRef {
            kind: raw.resource_kind,
            id: raw.resource,
        })?;

        let output = match (mode, id_opt(raw.output)) {
            (AccessMode::Read, None) => None,
            (AccessMode::Read, Some(output)) => {
                return Err(ConfigurationError::InvalidValue {
                    field: "read output",
                    value: output,
                });
            }
            (AccessMode::Write, None) => {
                return Err(ConfigurationError::MissingOutputAlias {
                    pass: pass.clone(),
                    resource,
                });
            }
            (AccessMode::Write, Some(output)) => {
                let output = Res::new(resource.kind(), output);
                if output == resource {
                    return Err(ConfigurationError::OutputAliasNotDistinct {
                        pass: pass.clone(),
                        resource,
                    });
                }
                if !self.contains(output) {
                    return Err(ConfigurationError::UnknownResource(output));
                }
                Some(output)
            }
        };

        let layout = vk::ImageLayout::from_raw(raw.layout);
        Ok(Interaction {
            resource,
            output,
            mode,
            binding: raw.binding,
            stage: vk::PipelineStageFlags2::from_raw(raw.stage),
            access: vk::AccessFlags2::from_raw(raw.access),
            layout: if layout == vk::ImageLayout::UNDEFINED {
                None
            } else {
                Some(layout)
            },
        })
    }

    ///Makes sure a write's output alias belongs to the written resource's chain, linking it if it is still free.
    fn chain_output(&mut self, pass: &PassRef, write: &Interaction) -> Result<(), BakeError> {
        let Some(output) = write.output else {
            return Ok(());
        };

        let forest = self.forest_mut(write.resource.kind());
        let resource_root = forest.find(write.resource.raw());
        let output_root = forest.find(output.raw());

        if resource_root == output_root {
            return Ok(());
        }
        if output_root != output.raw() {
            return Err(ConfigurationError::ForeignOutputAlias {
                pass: pass.clone(),
                resource: write.resource,
                output,
            }
            .into());
        }

        self.link(write.resource, output)?;
        Ok(())
    }

    fn add_pass(&mut self, record: &Record) -> Result<(), BakeError> {
        let payload: PassPayload = record.payload()?;
        let slot = match self.pass_slots.get(payload.id as usize) {
            None => {
                return Err(ConfigurationError::IdOutOfRange {
                    kind: "pass",
                    id: payload.id,
                    count: self.pass_slots.len() as u32,
                }
                .into());
            }
            Some(Some(_)) => {
                return Err(ConfigurationError::DuplicateId {
                    kind: "pass",
                    id: payload.id,
                }
                .into());
            }
            Some(None) => payload.id as usize,
        };

        let mut tail = record.tail();
        let reads: Vec<InteractionPayload> = tail.items(payload.read_count as usize)?;
        let writes: Vec<InteractionPayload> = tail.items(payload.write_count as usize)?;
        let name = owned(tail.string(payload.name_len as usize)?);
        tail.finish()?;

        let pass_ref = PassRef {
            id: PassId(payload.id),
            name,
        };

        let queue = QueueClass::from_raw(payload.queue).ok_or(ConfigurationError::InvalidValue {
            field: "queue class",
            value: payload.queue,
        })?;
        let program = match id_opt(payload.program) {
            Some(id) => {
                known(&self.programs, "program", id)?;
                Some(ProgramId(id))
            }
            None => None,
        };
        let bindless = match id_opt(payload.bindless) {
            Some(id) => {
                known(&self.bindless, "bindless", id)?;
                Some(BindlessId(id))
            }
            None => None,
        };

        let mut bindings = AHashSet::default();
        let mut decode = |raw: &InteractionPayload, mode| -> Result<Interaction, ConfigurationError> {
            if !bindings.insert(raw.binding) {
                return Err(ConfigurationError::BindingSlotReused {
                    pass: pass_ref.clone(),
                    binding: raw.binding,
                });
            }
            self.interaction(raw, mode, &pass_ref)
        };

        let reads = reads
            .iter()
            .map(|r| decode(r, AccessMode::Read))
            .collect::<Result<SmallVec<_>, _>>()?;
        let writes = writes
            .iter()
            .map(|w| decode(w, AccessMode::Write))
            .collect::<Result<SmallVec<_>, _>>()?;

        for write in &writes {
            self.chain_output(&pass_ref, write)?;
        }

        let bindless_reads = bindless
            .and_then(|b| self.bindless_table(b))
            .map(|b| b.resources.clone())
            .unwrap_or_default();

        #[cfg(feature = "logging")]
        log::trace!(
            "Pass {} on {}: {} reads, {} writes, {} bindless reads",
            pass_ref,
            queue,
            reads.len(),
            writes.len(),
            bindless_reads.len()
        );

        self.pass_slots[slot] = Some(self.passes.len());
        self.passes.push(PassInfo {
            id: pass_ref.id,
            name: pass_ref.name,
            queue,
            program,
            bindless,
            reads,
            writes,
            bindless_reads,
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<(), BakeError> {
        if let Some(present) = self.brief.present_image {
            known(&self.images, "present image", present.0)?;
        }

        self.buffer_alias.flatten();
        self.image_alias.flatten();
        Ok(())
    }

    pub fn brief(&self) -> &Brief {
        &self.brief
    }

    pub fn present_image(&self) -> Option<ImageId> {
        self.brief.present_image
    }

    ///All passes in declaration order.
    pub fn passes(&self) -> &[PassInfo] {
        &self.passes
    }

    ///Declaration index of `id`.
    pub fn pass_index(&self, id: PassId) -> Option<usize> {
        self.pass_slots.get(id.index()).copied().flatten()
    }

    pub fn pass(&self, id: PassId) -> Option<&PassInfo> {
        self.pass_index(id).map(|idx| &self.passes[idx])
    }

    pub fn buffer(&self, id: BufferId) -> Option<&BufferInfo> {
        self.buffers.get(id.index()).and_then(|b| b.as_ref())
    }

    pub fn image(&self, id: ImageId) -> Option<&ImageInfo> {
        self.images.get(id.index()).and_then(|i| i.as_ref())
    }

    pub fn shader(&self, id: ShaderId) -> Option<&ShaderInfo> {
        self.shaders.get(id.index()).and_then(|s| s.as_ref())
    }

    pub fn program(&self, id: ProgramId) -> Option<&ProgramInfo> {
        self.programs.get(id.index()).and_then(|p| p.as_ref())
    }

    pub fn sampler(&self, id: SamplerId) -> Option<&SamplerInfo> {
        self.samplers.get(id.index()).and_then(|s| s.as_ref())
    }

    pub fn bindless_table(&self, id: BindlessId) -> Option<&BindlessInfo> {
        self.bindless.get(id.index()).and_then(|b| b.as_ref())
    }

    pub fn contains(&self, res: Res) -> bool {
        match res {
            Res::Buffer(b) => self.buffer(b).is_some(),
            Res::Image(i) => self.image(i).is_some(),
        }
    }

    ///Every registered resource. Buffers first, each kind in id order.
    pub fn resources(&self) -> impl Iterator<Item = Res> + '_ {
        let buffers = self
            .buffers
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_some())
            .map(|(id, _)| Res::Buffer(BufferId(id as u32)));
        let images = self
            .images
            .iter()
            .enumerate()
            .filter(|(_, i)| i.is_some())
            .map(|(id, _)| Res::Image(ImageId(id as u32)));
        buffers.chain(images)
    }

    ///Physical base of `res`, i.e. the root of its alias chain.
    pub fn base_of(&self, res: Res) -> Res {
        match res {
            Res::Buffer(b) => Res::Buffer(BufferId(self.buffer_alias.base(b.0))),
            Res::Image(i) => Res::Image(ImageId(self.image_alias.base(i.0))),
        }
    }

    ///Position of `res` within its alias chain. The base is always 0.
    pub fn chain_order(&self, res: Res) -> u32 {
        match res {
            Res::Buffer(b) => self.buffer_alias.order(b.0),
            Res::Image(i) => self.image_alias.order(i.0),
        }
    }

    ///Lifetime of the chain `res` belongs to. A chain is persistent if its base is.
    pub fn lifetime(&self, res: Res) -> LifetimeClass {
        match self.base_of(res) {
            Res::Buffer(b) => self.buffer(b).map(|b| b.lifetime),
            Res::Image(i) => self.image(i).map(|i| i.lifetime),
        }
        .unwrap_or_default()
    }

    pub fn name_of(&self, res: Res) -> Option<&str> {
        match res {
            Res::Buffer(b) => self.buffer(b).map(|b| b.name.as_str()),
            Res::Image(i) => self.image(i).map(|i| i.name.as_str()),
        }
    }
}
