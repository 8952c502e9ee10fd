//! Fixed-size payloads of every [Tag](crate::Tag).
//!
//! All payloads are `#[repr(C)]` and padding free. 64bit fields come first. Vulkan enums and flags travel as their raw
//! values, absent ids as [NONE](crate::NONE).

use bytemuck::{Pod, Zeroable};

///Resource kind values used by [ResourceRef], [InteractionPayload] and friends.
pub const KIND_BUFFER: u32 = 0;
pub const KIND_IMAGE: u32 = 1;

///Image extent values of [ImagePayload::sizing].
pub const SIZING_FIXED: u32 = 0;
pub const SIZING_RENDER: u32 = 1;

///Interaction mode values.
pub const MODE_READ: u32 = 0;
pub const MODE_WRITE: u32 = 1;

//Input stream
//============

///Global counts. Must be the first record of an input stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct BriefPayload {
    pub buffer_count: u32,
    pub image_count: u32,
    pub pass_count: u32,
    pub program_count: u32,
    pub shader_count: u32,
    pub sampler_count: u32,
    pub bindless_count: u32,
    pub present_image: u32,
    pub render_width: u32,
    pub render_height: u32,
    ///Raw `vk::Format` render-sized images inherit.
    pub render_format: i32,
    pub _reserved: u32,
}

///Tail: `path_len` bytes of utf-8.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ShaderPayload {
    pub id: u32,
    ///Raw `vk::ShaderStageFlags`.
    pub stage: u32,
    pub path_len: u32,
    pub _reserved: u32,
}

///Tail: `shader_count` `u32` shader ids, then `name_len` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ProgramPayload {
    pub id: u32,
    pub shader_count: u32,
    pub name_len: u32,
    pub _reserved: u32,
}

///Tail: `name_len` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct BufferPayload {
    pub size: u64,
    pub id: u32,
    ///Raw `vk::BufferUsageFlags`.
    pub usage: u32,
    pub memory: u32,
    pub lifetime: u32,
    pub name_len: u32,
    pub _reserved: u32,
}

///Tail: `name_len` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ImagePayload {
    pub id: u32,
    pub sizing: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    ///Raw `vk::Format`. Must be `UNDEFINED` for render-sized images.
    pub format: i32,
    ///Raw `vk::ImageUsageFlags`.
    pub usage: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    ///Raw `vk::SampleCountFlags`.
    pub samples: u32,
    pub lifetime: u32,
    pub name_len: u32,
}

///Tail: `name_len` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct SamplerPayload {
    pub id: u32,
    pub mag_filter: i32,
    pub min_filter: i32,
    pub address_mode: i32,
    pub name_len: u32,
    pub _reserved: u32,
}

///Reference to either a buffer or an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ResourceRef {
    pub kind: u32,
    pub id: u32,
}

///Tail: `resource_count` [ResourceRef]s, then `name_len` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct BindlessPayload {
    pub id: u32,
    pub resource_count: u32,
    pub name_len: u32,
    pub _reserved: u32,
}

///Tail: `read_count` reads, then `write_count` writes (both [InteractionPayload]), then `name_len` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct PassPayload {
    pub id: u32,
    pub queue: u32,
    pub program: u32,
    pub bindless: u32,
    pub read_count: u32,
    pub write_count: u32,
    pub name_len: u32,
    pub _reserved: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct InteractionPayload {
    ///Raw `vk::PipelineStageFlags2`.
    pub stage: u64,
    ///Raw `vk::AccessFlags2`.
    pub access: u64,
    pub resource_kind: u32,
    pub resource: u32,
    ///Output alias minted by a write. [NONE](crate::NONE) for reads.
    pub output: u32,
    pub binding: u32,
    ///Raw `vk::ImageLayout`, `UNDEFINED` if no layout is requested.
    pub layout: i32,
    pub _reserved: u32,
}

///Declares `alias` as an order preserving alias of `base`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ForceAliasPayload {
    pub base: u32,
    pub alias: u32,
}

//Output stream
//=============

#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct CreateBufferPayload {
    pub size: u64,
    pub bucket: u32,
    pub base: u32,
    pub usage: u32,
    pub memory: u32,
    pub persistent: u32,
    pub member_count: u32,
    pub initial_stage: u64,
    pub initial_access: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct CreateImagePayload {
    pub initial_stage: u64,
    pub initial_access: u64,
    pub bucket: u32,
    pub base: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub format: i32,
    pub usage: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: u32,
    pub persistent: u32,
    pub member_count: u32,
    pub initial_layout: i32,
    pub _reserved: u32,
}

///Maps a non-base resource onto its bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct AliasPayload {
    pub offset: u64,
    pub resource_kind: u32,
    pub resource: u32,
    pub bucket: u32,
    pub base: u32,
}

///Followed by `frame_count` [FramePayload] records and `pass_count` [PassRecordPayload] records of this queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct QueueBeginPayload {
    pub queue: u32,
    pub pass_count: u32,
    pub frame_count: u32,
    pub _reserved: u32,
}

///Wait until pass `index` of `queue` has finished, i.e. the queue's timeline reached `index + 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct WaitPayload {
    pub queue: u32,
    pub index: u32,
}

///Tail: `wait_count` [WaitPayload]s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct FramePayload {
    ///Timeline value signalled once the frame has finished.
    pub signal: u64,
    pub queue: u32,
    pub first: u32,
    pub len: u32,
    pub wait_count: u32,
}

///Tail: `interaction_count` [ResolvedInteractionPayload]s, `wait_count` [WaitPayload]s, then `name_len` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct PassRecordPayload {
    pub id: u32,
    pub queue: u32,
    pub position: u32,
    pub queue_index: u32,
    pub level: u32,
    pub program: u32,
    pub interaction_count: u32,
    pub wait_count: u32,
    pub name_len: u32,
    pub _reserved: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ResolvedInteractionPayload {
    pub stage: u64,
    pub access: u64,
    pub resource_kind: u32,
    pub resource: u32,
    pub output: u32,
    pub bucket: u32,
    pub binding: u32,
    pub mode: u32,
    pub layout: i32,
    pub _reserved: u32,
}
