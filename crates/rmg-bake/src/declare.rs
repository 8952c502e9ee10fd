//! Declaration front-end.
//!
//! Client code registers resources and passes on a [Declaration] and receives generation checked keys. Misuse that
//! can be detected locally (destroyed handles, reused binding slots, formats on render sized images) is reported at
//! the call. [Declaration::encode] turns the declaration into the input op-stream of the compiler.

use std::fmt::Display;

use ash::vk;
use rmg_opstream::{
    INPUT_MAGIC, NONE, StreamWriter, Tag, TailWriter, opt_id,
    payload::{
        BindlessPayload, BriefPayload, BufferPayload, ForceAliasPayload, ImagePayload, InteractionPayload,
        PassPayload, ProgramPayload, ResourceRef, SIZING_FIXED, SIZING_RENDER, SamplerPayload, ShaderPayload,
    },
};
use slotmap::{Key, SecondaryMap, SlotMap};

use crate::{
    BufDesc, BufferId, ConfigurationError, ImageExtent, ImageId, ImgDesc, LifetimeClass, PassId, PassRef, QueueClass,
    Res, ResKind,
};

slotmap::new_key_type!(
    pub struct BufferKey;
);
slotmap::new_key_type!(
    pub struct ImageKey;
);
slotmap::new_key_type!(
    pub struct PassKey;
);
slotmap::new_key_type!(
    pub struct ShaderKey;
);
slotmap::new_key_type!(
    pub struct ProgramKey;
);
slotmap::new_key_type!(
    pub struct SamplerKey;
);
slotmap::new_key_type!(
    pub struct BindlessKey;
);

///Key of any resource in a [Declaration].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ResKey {
    Buffer(BufferKey),
    Image(ImageKey),
}

impl ResKey {
    pub fn kind(&self) -> ResKind {
        match self {
            ResKey::Buffer(_) => ResKind::Buffer,
            ResKey::Image(_) => ResKind::Image,
        }
    }
}

impl Display for ResKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResKey::Buffer(bufk) => write!(f, "ResKey::Buffer({:?})", bufk),
            ResKey::Image(imgk) => write!(f, "ResKey::Image({:?})", imgk),
        }
    }
}

impl From<BufferKey> for ResKey {
    fn from(k: BufferKey) -> Self {
        ResKey::Buffer(k)
    }
}

impl From<ImageKey> for ResKey {
    fn from(k: ImageKey) -> Self {
        ResKey::Image(k)
    }
}

///Slot index of a key. Only used to name handles in errors.
fn slot(key: impl Key) -> u32 {
    key.data().as_ffi() as u32
}

///Pipeline stage, access mask and optional layout of an interaction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Access {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    pub layout: Option<vk::ImageLayout>,
}

impl Access {
    pub const fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        Access {
            stage,
            access,
            layout: None,
        }
    }

    pub const fn with_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub const fn compute_read() -> Self {
        Self::new(
            vk::PipelineStageFlags2::COMPUTE_SHADER,
            vk::AccessFlags2::SHADER_STORAGE_READ,
        )
    }

    pub const fn compute_write() -> Self {
        Self::new(
            vk::PipelineStageFlags2::COMPUTE_SHADER,
            vk::AccessFlags2::SHADER_STORAGE_WRITE,
        )
    }

    pub const fn vertex_read() -> Self {
        Self::new(
            vk::PipelineStageFlags2::VERTEX_SHADER,
            vk::AccessFlags2::SHADER_STORAGE_READ,
        )
    }

    pub const fn fragment_read() -> Self {
        Self::new(
            vk::PipelineStageFlags2::FRAGMENT_SHADER,
            vk::AccessFlags2::SHADER_STORAGE_READ,
        )
    }

    ///Sampled image read in the fragment shader.
    pub const fn sampled() -> Self {
        Self::new(
            vk::PipelineStageFlags2::FRAGMENT_SHADER,
            vk::AccessFlags2::SHADER_SAMPLED_READ,
        )
        .with_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
    }

    pub const fn color_attachment() -> Self {
        Self::new(
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        )
        .with_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
    }

    pub const fn transfer_read() -> Self {
        Self::new(vk::PipelineStageFlags2::COPY, vk::AccessFlags2::TRANSFER_READ)
    }

    pub const fn transfer_write() -> Self {
        Self::new(vk::PipelineStageFlags2::COPY, vk::AccessFlags2::TRANSFER_WRITE)
    }

    ///Buffer or image clear, as used by fill passes.
    pub const fn fill() -> Self {
        Self::new(vk::PipelineStageFlags2::CLEAR, vk::AccessFlags2::TRANSFER_WRITE)
    }
}

struct BufferDecl {
    name: String,
    desc: BufDesc,
    lifetime: LifetimeClass,
}

struct ImageDecl {
    name: String,
    desc: ImgDesc,
    lifetime: LifetimeClass,
}

struct ShaderDecl {
    path: String,
    stage: vk::ShaderStageFlags,
}

struct ProgramDecl {
    name: String,
    shaders: Vec<ShaderKey>,
}

struct SamplerDecl {
    name: String,
    mag_filter: vk::Filter,
    min_filter: vk::Filter,
    address_mode: vk::SamplerAddressMode,
}

struct BindlessDecl {
    name: String,
    resources: Vec<ResKey>,
}

#[derive(Clone, Copy)]
struct InteractionDecl {
    resource: ResKey,
    output: Option<ResKey>,
    binding: u32,
    access: Access,
}

struct PassDecl {
    name: String,
    queue: QueueClass,
    program: Option<ProgramKey>,
    bindless: Option<BindlessKey>,
    reads: Vec<InteractionDecl>,
    writes: Vec<InteractionDecl>,
}

impl PassDecl {
    fn uses_binding(&self, binding: u32) -> bool {
        self.reads
            .iter()
            .chain(self.writes.iter())
            .any(|i| i.binding == binding)
    }
}

///Maps declaration keys to the dense ids of one encoded stream.
#[derive(Default)]
pub struct DenseIds {
    buffers: SecondaryMap<BufferKey, u32>,
    images: SecondaryMap<ImageKey, u32>,
    passes: SecondaryMap<PassKey, u32>,
    shaders: SecondaryMap<ShaderKey, u32>,
    programs: SecondaryMap<ProgramKey, u32>,
    samplers: SecondaryMap<SamplerKey, u32>,
    bindless: SecondaryMap<BindlessKey, u32>,
    pass_keys: Vec<PassKey>,
}

impl DenseIds {
    pub fn res(&self, key: ResKey) -> Option<Res> {
        match key {
            ResKey::Buffer(b) => self.buffers.get(b).map(|id| Res::Buffer(BufferId(*id))),
            ResKey::Image(i) => self.images.get(i).map(|id| Res::Image(ImageId(*id))),
        }
    }

    pub fn pass(&self, key: PassKey) -> Option<PassId> {
        self.passes.get(key).map(|id| PassId(*id))
    }

    pub fn pass_key(&self, id: PassId) -> Option<PassKey> {
        self.pass_keys.get(id.index()).copied()
    }
}

///Encoded input stream together with the id mapping used while encoding.
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub ids: DenseIds,
}

///Declared passes and resources.
pub struct Declaration {
    buffers: SlotMap<BufferKey, BufferDecl>,
    images: SlotMap<ImageKey, ImageDecl>,
    shaders: SlotMap<ShaderKey, ShaderDecl>,
    programs: SlotMap<ProgramKey, ProgramDecl>,
    samplers: SlotMap<SamplerKey, SamplerDecl>,
    bindless: SlotMap<BindlessKey, BindlessDecl>,
    passes: SlotMap<PassKey, PassDecl>,
    ///Passes in declaration order.
    pass_order: Vec<PassKey>,
    ///(base, alias) pairs in declaration order.
    aliases: Vec<(ResKey, ResKey)>,
    present: Option<ImageKey>,
    render_extent: Option<(u32, u32)>,
    render_format: vk::Format,
    dirty: bool,
}

impl Default for Declaration {
    fn default() -> Self {
        Self::new()
    }
}

impl Declaration {
    pub fn new() -> Self {
        Declaration {
            buffers: SlotMap::with_key(),
            images: SlotMap::with_key(),
            shaders: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            samplers: SlotMap::with_key(),
            bindless: SlotMap::with_key(),
            passes: SlotMap::with_key(),
            pass_order: Vec::new(),
            aliases: Vec::new(),
            present: None,
            render_extent: None,
            render_format: vk::Format::UNDEFINED,
            dirty: true,
        }
    }

    ///True if anything changed since the last successful bake.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    fn pass_ref(&self, key: PassKey) -> PassRef {
        PassRef {
            id: PassId(slot(key)),
            name: self
                .passes
                .get(key)
                .map(|p| p.name.clone())
                .unwrap_or_default(),
        }
    }

    fn check_res(&self, key: ResKey) -> Result<(), ConfigurationError> {
        let exists = match key {
            ResKey::Buffer(b) => self.buffers.contains_key(b),
            ResKey::Image(i) => self.images.contains_key(i),
        };
        if exists {
            Ok(())
        } else {
            Err(ConfigurationError::UnknownHandle {
                kind: match key.kind() {
                    ResKind::Buffer => "buffer",
                    ResKind::Image => "image",
                },
                id: match key {
                    ResKey::Buffer(b) => slot(b),
                    ResKey::Image(i) => slot(i),
                },
            })
        }
    }

    fn check_pass(&self, key: PassKey) -> Result<(), ConfigurationError> {
        if self.passes.contains_key(key) {
            Ok(())
        } else {
            Err(ConfigurationError::UnknownHandle {
                kind: "pass",
                id: slot(key),
            })
        }
    }

    ///Sets the extent and format of render sized images.
    pub fn set_render_extent(&mut self, width: u32, height: u32, format: vk::Format) {
        self.dirty = true;
        self.render_extent = Some((width, height));
        self.render_format = format;
    }

    pub fn buffer(&mut self, name: &str, desc: BufDesc, lifetime: LifetimeClass) -> BufferKey {
        self.dirty = true;
        self.buffers.insert(BufferDecl {
            name: name.to_string(),
            desc,
            lifetime,
        })
    }

    ///Declares an image. Render sized images must leave the format `UNDEFINED`, it is derived from the render
    /// settings.
    pub fn image(&mut self, name: &str, desc: ImgDesc, lifetime: LifetimeClass) -> Result<ImageKey, ConfigurationError> {
        if desc.is_render_sized() && desc.format != vk::Format::UNDEFINED {
            return Err(ConfigurationError::DerivedFormatOverride {
                image: name.to_string(),
                format: format!("{:?}", desc.format),
            });
        }

        self.dirty = true;
        Ok(self.images.insert(ImageDecl {
            name: name.to_string(),
            desc,
            lifetime,
        }))
    }

    pub fn shader(&mut self, path: &str, stage: vk::ShaderStageFlags) -> ShaderKey {
        self.dirty = true;
        self.shaders.insert(ShaderDecl {
            path: path.to_string(),
            stage,
        })
    }

    pub fn program(&mut self, name: &str, shaders: &[ShaderKey]) -> Result<ProgramKey, ConfigurationError> {
        for shader in shaders {
            if !self.shaders.contains_key(*shader) {
                return Err(ConfigurationError::UnknownHandle {
                    kind: "shader",
                    id: slot(*shader),
                });
            }
        }
        self.dirty = true;
        Ok(self.programs.insert(ProgramDecl {
            name: name.to_string(),
            shaders: shaders.to_vec(),
        }))
    }

    pub fn sampler(
        &mut self,
        name: &str,
        mag_filter: vk::Filter,
        min_filter: vk::Filter,
        address_mode: vk::SamplerAddressMode,
    ) -> SamplerKey {
        self.dirty = true;
        self.samplers.insert(SamplerDecl {
            name: name.to_string(),
            mag_filter,
            min_filter,
            address_mode,
        })
    }

    ///Declares a bindless table. Every pass using it implicitly reads all of `resources`.
    pub fn bindless(&mut self, name: &str, resources: &[ResKey]) -> Result<BindlessKey, ConfigurationError> {
        for res in resources {
            self.check_res(*res)?;
        }
        self.dirty = true;
        Ok(self.bindless.insert(BindlessDecl {
            name: name.to_string(),
            resources: resources.to_vec(),
        }))
    }

    pub fn pass(&mut self, name: &str, queue: QueueClass) -> PassKey {
        self.dirty = true;
        let key = self.passes.insert(PassDecl {
            name: name.to_string(),
            queue,
            program: None,
            bindless: None,
            reads: Vec::new(),
            writes: Vec::new(),
        });
        self.pass_order.push(key);
        key
    }

    pub fn set_program(&mut self, pass: PassKey, program: ProgramKey) -> Result<(), ConfigurationError> {
        if !self.programs.contains_key(program) {
            return Err(ConfigurationError::UnknownHandle {
                kind: "program",
                id: slot(program),
            });
        }
        let decl = self.passes.get_mut(pass).ok_or(ConfigurationError::UnknownHandle {
            kind: "pass",
            id: slot(pass),
        })?;
        decl.program = Some(program);
        self.dirty = true;
        Ok(())
    }

    pub fn use_bindless(&mut self, pass: PassKey, table: BindlessKey) -> Result<(), ConfigurationError> {
        if !self.bindless.contains_key(table) {
            return Err(ConfigurationError::UnknownHandle {
                kind: "bindless",
                id: slot(table),
            });
        }
        let decl = self.passes.get_mut(pass).ok_or(ConfigurationError::UnknownHandle {
            kind: "pass",
            id: slot(pass),
        })?;
        decl.bindless = Some(table);
        self.dirty = true;
        Ok(())
    }

    fn check_binding(&self, pass: PassKey, binding: u32) -> Result<(), ConfigurationError> {
        self.check_pass(pass)?;
        if self.passes[pass].uses_binding(binding) {
            return Err(ConfigurationError::BindingSlotReused {
                pass: self.pass_ref(pass),
                binding,
            });
        }
        Ok(())
    }

    ///Declares that `pass` reads `resource` through `binding`.
    pub fn read(
        &mut self,
        pass: PassKey,
        resource: impl Into<ResKey>,
        binding: u32,
        access: Access,
    ) -> Result<(), ConfigurationError> {
        let resource = resource.into();
        self.check_res(resource)?;
        self.check_binding(pass, binding)?;

        self.passes[pass].reads.push(InteractionDecl {
            resource,
            output: None,
            binding,
            access,
        });
        self.dirty = true;
        Ok(())
    }

    ///Declares that `pass` overwrites `resource` through `binding`. Returns the version the write produces. Later
    /// passes that want to see the written content must use the returned key.
    pub fn write(
        &mut self,
        pass: PassKey,
        resource: impl Into<ResKey>,
        binding: u32,
        access: Access,
    ) -> Result<ResKey, ConfigurationError> {
        let resource = resource.into();
        self.check_res(resource)?;
        self.check_binding(pass, binding)?;

        let output = self.mint(resource, |name| format!("{}'", name))?;
        self.aliases.push((resource, output));
        self.passes[pass].writes.push(InteractionDecl {
            resource,
            output: Some(output),
            binding,
            access,
        });
        self.dirty = true;
        Ok(output)
    }

    ///Creates a new handle that shares the memory of `base`.
    pub fn alias(&mut self, base: impl Into<ResKey>) -> Result<ResKey, ConfigurationError> {
        let base = base.into();
        self.check_res(base)?;
        let alias = self.mint(base, |name| format!("{} (alias)", name))?;
        self.aliases.push((base, alias));
        self.dirty = true;
        Ok(alias)
    }

    ///Copies the descriptor of `of` into a new resource.
    fn mint(&mut self, of: ResKey, name: impl Fn(&str) -> String) -> Result<ResKey, ConfigurationError> {
        self.check_res(of)?;
        let key = match of {
            ResKey::Buffer(b) => {
                let src = &self.buffers[b];
                let decl = BufferDecl {
                    name: name(&src.name),
                    desc: src.desc,
                    lifetime: src.lifetime,
                };
                ResKey::Buffer(self.buffers.insert(decl))
            }
            ResKey::Image(i) => {
                let src = &self.images[i];
                let decl = ImageDecl {
                    name: name(&src.name),
                    desc: src.desc,
                    lifetime: src.lifetime,
                };
                ResKey::Image(self.images.insert(decl))
            }
        };
        Ok(key)
    }

    ///Marks the image, or version of an image, that is presented after the graph ran.
    pub fn set_present_image(&mut self, image: impl Into<ResKey>) -> Result<(), ConfigurationError> {
        let image = image.into();
        self.check_res(image)?;
        match image {
            ResKey::Image(i) => {
                self.present = Some(i);
                self.dirty = true;
                Ok(())
            }
            ResKey::Buffer(b) => Err(ConfigurationError::UnknownHandle {
                kind: "image",
                id: slot(b),
            }),
        }
    }

    fn drop_aliases_of(&mut self, res: ResKey) {
        self.aliases.retain(|(base, alias)| *base != res && *alias != res);
    }

    pub fn remove_buffer(&mut self, key: BufferKey) -> Result<(), ConfigurationError> {
        self.buffers.remove(key).ok_or(ConfigurationError::UnknownHandle {
            kind: "buffer",
            id: slot(key),
        })?;
        self.drop_aliases_of(ResKey::Buffer(key));
        self.dirty = true;
        Ok(())
    }

    pub fn remove_image(&mut self, key: ImageKey) -> Result<(), ConfigurationError> {
        self.images.remove(key).ok_or(ConfigurationError::UnknownHandle {
            kind: "image",
            id: slot(key),
        })?;
        self.drop_aliases_of(ResKey::Image(key));
        if self.present == Some(key) {
            self.present = None;
        }
        self.dirty = true;
        Ok(())
    }

    pub fn remove_pass(&mut self, key: PassKey) -> Result<(), ConfigurationError> {
        self.passes.remove(key).ok_or(ConfigurationError::UnknownHandle {
            kind: "pass",
            id: slot(key),
        })?;
        self.pass_order.retain(|p| *p != key);
        self.dirty = true;
        Ok(())
    }

    pub fn remove_shader(&mut self, key: ShaderKey) -> Result<(), ConfigurationError> {
        self.shaders.remove(key).ok_or(ConfigurationError::UnknownHandle {
            kind: "shader",
            id: slot(key),
        })?;
        self.dirty = true;
        Ok(())
    }

    pub fn remove_program(&mut self, key: ProgramKey) -> Result<(), ConfigurationError> {
        self.programs.remove(key).ok_or(ConfigurationError::UnknownHandle {
            kind: "program",
            id: slot(key),
        })?;
        self.dirty = true;
        Ok(())
    }

    pub fn remove_sampler(&mut self, key: SamplerKey) -> Result<(), ConfigurationError> {
        self.samplers.remove(key).ok_or(ConfigurationError::UnknownHandle {
            kind: "sampler",
            id: slot(key),
        })?;
        self.dirty = true;
        Ok(())
    }

    pub fn remove_bindless(&mut self, key: BindlessKey) -> Result<(), ConfigurationError> {
        self.bindless.remove(key).ok_or(ConfigurationError::UnknownHandle {
            kind: "bindless",
            id: slot(key),
        })?;
        self.dirty = true;
        Ok(())
    }

    pub fn name_of(&self, res: impl Into<ResKey>) -> Option<&str> {
        match res.into() {
            ResKey::Buffer(b) => self.buffers.get(b).map(|b| b.name.as_str()),
            ResKey::Image(i) => self.images.get(i).map(|i| i.name.as_str()),
        }
    }

    pub fn pass_name(&self, pass: PassKey) -> Option<&str> {
        self.passes.get(pass).map(|p| p.name.as_str())
    }

    ///Number of currently declared passes.
    pub fn pass_count(&self) -> usize {
        self.pass_order.len()
    }

    fn dense_ids(&self) -> DenseIds {
        let mut ids = DenseIds::default();
        for (idx, key) in self.buffers.keys().enumerate() {
            ids.buffers.insert(key, idx as u32);
        }
        for (idx, key) in self.images.keys().enumerate() {
            ids.images.insert(key, idx as u32);
        }
        for (idx, key) in self.pass_order.iter().enumerate() {
            ids.passes.insert(*key, idx as u32);
            ids.pass_keys.push(*key);
        }
        for (idx, key) in self.shaders.keys().enumerate() {
            ids.shaders.insert(key, idx as u32);
        }
        for (idx, key) in self.programs.keys().enumerate() {
            ids.programs.insert(key, idx as u32);
        }
        for (idx, key) in self.samplers.keys().enumerate() {
            ids.samplers.insert(key, idx as u32);
        }
        for (idx, key) in self.bindless.keys().enumerate() {
            ids.bindless.insert(key, idx as u32);
        }
        ids
    }

    fn resource_ref(&self, ids: &DenseIds, key: ResKey) -> Result<ResourceRef, ConfigurationError> {
        self.check_res(key)?;
        let res = ids.res(key).ok_or(ConfigurationError::UnknownHandle {
            kind: "resource",
            id: NONE,
        })?;
        Ok(ResourceRef {
            kind: res.kind().as_raw(),
            id: res.raw(),
        })
    }

    fn interaction(&self, ids: &DenseIds, decl: &InteractionDecl) -> Result<InteractionPayload, ConfigurationError> {
        let resource = self.resource_ref(ids, decl.resource)?;
        let output = match decl.output {
            Some(output) => self.resource_ref(ids, output)?.id,
            None => NONE,
        };
        Ok(InteractionPayload {
            stage: decl.access.stage.as_raw(),
            access: decl.access.access.as_raw(),
            resource_kind: resource.kind,
            resource: resource.id,
            output,
            binding: decl.binding,
            layout: decl.access.layout.unwrap_or(vk::ImageLayout::UNDEFINED).as_raw(),
            _reserved: 0,
        })
    }

    ///Serializes the declaration into an input op-stream. Fails if a pass still references a removed handle.
    pub fn encode(&self) -> Result<Encoded, ConfigurationError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let ids = self.dense_ids();
        let mut writer = StreamWriter::new(INPUT_MAGIC);

        let present = match self.present {
            Some(image) => Some(self.resource_ref(&ids, ResKey::Image(image))?.id),
            None => None,
        };
        let (render_width, render_height) = self.render_extent.unwrap_or((0, 0));
        writer.push(
            Tag::SetBrief,
            &BriefPayload {
                buffer_count: self.buffers.len() as u32,
                image_count: self.images.len() as u32,
                pass_count: self.pass_order.len() as u32,
                program_count: self.programs.len() as u32,
                shader_count: self.shaders.len() as u32,
                sampler_count: self.samplers.len() as u32,
                bindless_count: self.bindless.len() as u32,
                present_image: opt_id(present),
                render_width,
                render_height,
                render_format: self.render_format.as_raw(),
                _reserved: 0,
            },
            TailWriter::new(),
        );

        for (key, shader) in &self.shaders {
            let mut tail = TailWriter::new();
            tail.string(&shader.path);
            writer.push(
                Tag::RegisterShader,
                &ShaderPayload {
                    id: ids.shaders[key],
                    stage: shader.stage.as_raw(),
                    path_len: shader.path.len() as u32,
                    _reserved: 0,
                },
                tail,
            );
        }

        for (key, program) in &self.programs {
            let shaders = program
                .shaders
                .iter()
                .map(|s| {
                    ids.shaders.get(*s).copied().ok_or(ConfigurationError::UnknownHandle {
                        kind: "shader",
                        id: slot(*s),
                    })
                })
                .collect::<Result<Vec<u32>, _>>()?;
            let mut tail = TailWriter::new();
            tail.items(&shaders).string(&program.name);
            writer.push(
                Tag::RegisterProgram,
                &ProgramPayload {
                    id: ids.programs[key],
                    shader_count: shaders.len() as u32,
                    name_len: program.name.len() as u32,
                    _reserved: 0,
                },
                tail,
            );
        }

        for (key, sampler) in &self.samplers {
            let mut tail = TailWriter::new();
            tail.string(&sampler.name);
            writer.push(
                Tag::RegisterSampler,
                &SamplerPayload {
                    id: ids.samplers[key],
                    mag_filter: sampler.mag_filter.as_raw(),
                    min_filter: sampler.min_filter.as_raw(),
                    address_mode: sampler.address_mode.as_raw(),
                    name_len: sampler.name.len() as u32,
                    _reserved: 0,
                },
                tail,
            );
        }

        for (key, buffer) in &self.buffers {
            let mut tail = TailWriter::new();
            tail.string(&buffer.name);
            writer.push(
                Tag::RegisterBuffer,
                &BufferPayload {
                    size: buffer.desc.size,
                    id: ids.buffers[key],
                    usage: buffer.desc.usage.as_raw(),
                    memory: buffer.desc.memory.as_raw(),
                    lifetime: buffer.lifetime.as_raw(),
                    name_len: buffer.name.len() as u32,
                    _reserved: 0,
                },
                tail,
            );
        }

        for (key, image) in &self.images {
            let (sizing, width, height, depth) = match image.desc.extent {
                ImageExtent::Fixed { width, height, depth } => (SIZING_FIXED, width, height, depth),
                ImageExtent::Render => (SIZING_RENDER, 0, 0, 1),
            };
            let mut tail = TailWriter::new();
            tail.string(&image.name);
            writer.push(
                Tag::RegisterImage,
                &ImagePayload {
                    id: ids.images[key],
                    sizing,
                    width,
                    height,
                    depth,
                    format: image.desc.format.as_raw(),
                    usage: image.desc.usage.as_raw(),
                    mip_levels: image.desc.mip_levels,
                    array_layers: image.desc.array_layers,
                    samples: image.desc.samples.as_raw(),
                    lifetime: image.lifetime.as_raw(),
                    name_len: image.name.len() as u32,
                },
                tail,
            );
        }

        for (base, alias) in &self.aliases {
            let base = self.resource_ref(&ids, *base)?;
            let alias = self.resource_ref(&ids, *alias)?;
            let tag = if base.kind == ResKind::Buffer.as_raw() {
                Tag::ForceAliasBuffer
            } else {
                Tag::ForceAliasImage
            };
            writer.push(
                tag,
                &ForceAliasPayload {
                    base: base.id,
                    alias: alias.id,
                },
                TailWriter::new(),
            );
        }

        for (key, table) in &self.bindless {
            let refs = table
                .resources
                .iter()
                .map(|r| self.resource_ref(&ids, *r))
                .collect::<Result<Vec<_>, _>>()?;
            let mut tail = TailWriter::new();
            tail.items(&refs).string(&table.name);
            writer.push(
                Tag::RegisterBindless,
                &BindlessPayload {
                    id: ids.bindless[key],
                    resource_count: refs.len() as u32,
                    name_len: table.name.len() as u32,
                    _reserved: 0,
                },
                tail,
            );
        }

        for key in &self.pass_order {
            let pass = &self.passes[*key];
            let program = match pass.program {
                Some(p) => Some(ids.programs.get(p).copied().ok_or(ConfigurationError::UnknownHandle {
                    kind: "program",
                    id: slot(p),
                })?),
                None => None,
            };
            let bindless = match pass.bindless {
                Some(b) => Some(ids.bindless.get(b).copied().ok_or(ConfigurationError::UnknownHandle {
                    kind: "bindless",
                    id: slot(b),
                })?),
                None => None,
            };
            let reads = pass
                .reads
                .iter()
                .map(|r| self.interaction(&ids, r))
                .collect::<Result<Vec<_>, _>>()?;
            let writes = pass
                .writes
                .iter()
                .map(|w| self.interaction(&ids, w))
                .collect::<Result<Vec<_>, _>>()?;

            let mut tail = TailWriter::new();
            tail.items(&reads).items(&writes).string(&pass.name);
            writer.push(
                Tag::RegisterPass,
                &PassPayload {
                    id: ids.passes[*key],
                    queue: pass.queue.as_raw(),
                    program: opt_id(program),
                    bindless: opt_id(bindless),
                    read_count: reads.len() as u32,
                    write_count: writes.len() as u32,
                    name_len: pass.name.len() as u32,
                    _reserved: 0,
                },
                tail,
            );
        }

        #[cfg(feature = "logging")]
        log::trace!(
            "Encoded declaration: {} passes, {} buffers, {} images, {} aliases",
            self.pass_order.len(),
            self.buffers.len(),
            self.images.len(),
            self.aliases.len()
        );

        Ok(Encoded {
            bytes: writer.finish(),
            ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Registry;

    #[test]
    fn render_target_with_format_is_rejected() {
        let mut decl = Declaration::new();
        let mut desc = ImgDesc::render_target(vk::ImageUsageFlags::COLOR_ATTACHMENT);
        desc.format = vk::Format::R16G16B16A16_SFLOAT;
        assert!(matches!(
            decl.image("hdr", desc, LifetimeClass::Transient),
            Err(ConfigurationError::DerivedFormatOverride { .. })
        ));
    }

    #[test]
    fn binding_slots_are_unique_per_pass() {
        let mut decl = Declaration::new();
        let a = decl.buffer("a", BufDesc::storage(16), LifetimeClass::Transient);
        let b = decl.buffer("b", BufDesc::storage(16), LifetimeClass::Transient);
        let pass = decl.pass("p", QueueClass::Compute);
        decl.read(pass, a, 2, Access::compute_read()).unwrap();
        assert!(matches!(
            decl.write(pass, b, 2, Access::compute_write()),
            Err(ConfigurationError::BindingSlotReused { binding: 2, .. })
        ));
    }

    #[test]
    fn destroyed_handles_fail_fast() {
        let mut decl = Declaration::new();
        let a = decl.buffer("a", BufDesc::storage(16), LifetimeClass::Transient);
        let pass = decl.pass("p", QueueClass::Compute);
        decl.remove_buffer(a).unwrap();
        assert!(matches!(
            decl.read(pass, a, 0, Access::compute_read()),
            Err(ConfigurationError::UnknownHandle { kind: "buffer", .. })
        ));
        assert!(decl.remove_buffer(a).is_err());

        decl.remove_pass(pass).unwrap();
        let b = decl.buffer("b", BufDesc::storage(16), LifetimeClass::Transient);
        assert!(matches!(
            decl.read(pass, b, 0, Access::compute_read()),
            Err(ConfigurationError::UnknownHandle { kind: "pass", .. })
        ));
    }

    #[test]
    fn removed_resource_still_in_use_fails_encoding() {
        let mut decl = Declaration::new();
        let a = decl.buffer("a", BufDesc::storage(16), LifetimeClass::Transient);
        let pass = decl.pass("p", QueueClass::Compute);
        decl.read(pass, a, 0, Access::compute_read()).unwrap();
        decl.remove_buffer(a).unwrap();
        assert!(decl.encode().is_err());
    }

    #[test]
    fn alias_of_alias_resolves_to_same_base() {
        let mut decl = Declaration::new();
        let x = decl.buffer("x", BufDesc::storage(64), LifetimeClass::Transient);
        let ax = decl.alias(x).unwrap();
        let aax = decl.alias(ax).unwrap();

        let encoded = decl.encode().unwrap();
        let registry = Registry::ingest(&encoded.bytes).unwrap();
        let base = encoded.ids.res(x.into()).unwrap();
        let ax = encoded.ids.res(ax).unwrap();
        let aax = encoded.ids.res(aax).unwrap();
        assert_eq!(registry.base_of(ax), base);
        assert_eq!(registry.base_of(aax), registry.base_of(ax));
        assert_eq!(registry.name_of(aax), Some("x (alias) (alias)"));
    }

    #[test]
    fn write_mints_new_versions() {
        let mut decl = Declaration::new();
        let x = decl.buffer("x", BufDesc::storage(64), LifetimeClass::Transient);
        let pass = decl.pass("p", QueueClass::Compute);
        let x1 = decl.write(pass, x, 0, Access::compute_write()).unwrap();
        assert_ne!(x1, ResKey::Buffer(x));
        assert_eq!(decl.name_of(x1), Some("x'"));

        let encoded = decl.encode().unwrap();
        let registry = Registry::ingest(&encoded.bytes).unwrap();
        let write = &registry.passes()[0].writes[0];
        assert_eq!(write.output, encoded.ids.res(x1));
        assert_eq!(encoded.ids.pass_key(PassId(0)), Some(pass));
    }

    #[test]
    fn encoding_is_deterministic() {
        let build = || {
            let mut decl = Declaration::new();
            let x = decl.buffer("x", BufDesc::storage(64), LifetimeClass::Transient);
            let shader = decl.shader("shaders/blur.spv", vk::ShaderStageFlags::COMPUTE);
            let program = decl.program("blur", &[shader]).unwrap();
            let pass = decl.pass("blur", QueueClass::Compute);
            decl.set_program(pass, program).unwrap();
            decl.write(pass, x, 0, Access::compute_write()).unwrap();
            decl.encode().unwrap().bytes
        };
        assert_eq!(build(), build());
    }
}
