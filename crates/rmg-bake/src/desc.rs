//! Declarative descriptions of queues, resources and interactions.

use ash::vk;
use std::fmt::Display;

use crate::Res;

///Queue class a pass executes on. Each class is one *track* of the schedule.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum QueueClass {
    Graphics,
    Compute,
    Copy,
    Fill,
}

impl QueueClass {
    pub const COUNT: usize = 4;
    pub const ALL: [QueueClass; Self::COUNT] = [
        QueueClass::Graphics,
        QueueClass::Compute,
        QueueClass::Copy,
        QueueClass::Fill,
    ];

    ///Dense index into per-queue tables.
    pub const fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    pub const fn as_raw(&self) -> u32 {
        *self as u32
    }

    ///Minimal vulkan capabilities a queue needs to host this class.
    pub fn queue_flags(&self) -> vk::QueueFlags {
        match self {
            QueueClass::Graphics => vk::QueueFlags::GRAPHICS,
            QueueClass::Compute => vk::QueueFlags::COMPUTE,
            QueueClass::Copy | QueueClass::Fill => vk::QueueFlags::TRANSFER,
        }
    }
}

impl Display for QueueClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

///Where the memory of a buffer should live.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub enum MemoryClass {
    #[default]
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
}

impl MemoryClass {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(MemoryClass::GpuOnly),
            1 => Some(MemoryClass::CpuToGpu),
            2 => Some(MemoryClass::GpuToCpu),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> u32 {
        *self as u32
    }
}

///Transient resources may share memory within one run of the graph. Persistent resources keep identity and memory
/// across runs and never share.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub enum LifetimeClass {
    #[default]
    Transient,
    Persistent,
}

impl LifetimeClass {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(LifetimeClass::Transient),
            1 => Some(LifetimeClass::Persistent),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> u32 {
        *self as u32
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct BufDesc {
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    pub memory: MemoryClass,
}

impl BufDesc {
    ///Gpu local storage buffer of `size` bytes.
    pub fn storage(size: u64) -> Self {
        BufDesc {
            size,
            usage: vk::BufferUsageFlags::STORAGE_BUFFER
                | vk::BufferUsageFlags::TRANSFER_SRC
                | vk::BufferUsageFlags::TRANSFER_DST,
            memory: MemoryClass::GpuOnly,
        }
    }
}

///Extent of an image. Render sized images follow the render resolution and format of the graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ImageExtent {
    Fixed { width: u32, height: u32, depth: u32 },
    Render,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ImgDesc {
    pub extent: ImageExtent,
    ///Must stay `UNDEFINED` for [ImageExtent::Render] images, the format is derived.
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: vk::SampleCountFlags,
}

impl ImgDesc {
    pub fn texture_2d(width: u32, height: u32, format: vk::Format) -> Self {
        ImgDesc {
            extent: ImageExtent::Fixed {
                width,
                height,
                depth: 1,
            },
            format,
            usage: vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::TRANSFER_DST,
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
        }
    }

    ///Render sized target. Extent and format follow the graph's render settings.
    pub fn render_target(usage: vk::ImageUsageFlags) -> Self {
        ImgDesc {
            extent: ImageExtent::Render,
            format: vk::Format::UNDEFINED,
            usage,
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
        }
    }

    pub fn is_render_sized(&self) -> bool {
        self.extent == ImageExtent::Render
    }
}

///Physical image properties after resolving render sized extents. Two images can only share memory if those are
/// equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ImageShape {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub format: vk::Format,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: vk::SampleCountFlags,
}

impl ImageShape {
    ///Rough byte size. Used to order allocations and for statistics, never for actual allocation. Saturates at
    /// `u64::MAX` for absurd extents.
    pub fn byte_size(&self) -> u64 {
        let base = [
            self.height as u64,
            self.depth as u64,
            self.array_layers as u64,
            texel_size(self.format),
            self.samples.as_raw().max(1) as u64,
        ]
        .into_iter()
        .fold(self.width as u64, u64::saturating_mul);
        //full mip chain adds a third at most.
        if self.mip_levels > 1 {
            base.saturating_add(base / 3)
        } else {
            base
        }
    }
}

///Bytes per texel of common formats. Unknown formats are assumed to be 16 bytes wide.
pub fn texel_size(format: vk::Format) -> u64 {
    match format {
        vk::Format::R8_UNORM | vk::Format::R8_UINT | vk::Format::R8_SNORM | vk::Format::S8_UINT => 1,
        vk::Format::R8G8_UNORM | vk::Format::R16_SFLOAT | vk::Format::R16_UINT | vk::Format::D16_UNORM => 2,
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::A2B10G10R10_UNORM_PACK32
        | vk::Format::B10G11R11_UFLOAT_PACK32
        | vk::Format::R16G16_SFLOAT
        | vk::Format::R32_SFLOAT
        | vk::Format::R32_UINT
        | vk::Format::D32_SFLOAT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::X8_D24_UNORM_PACK32 => 4,
        vk::Format::D32_SFLOAT_S8_UINT => 5,
        vk::Format::R16G16B16A16_SFLOAT | vk::Format::R32G32_SFLOAT | vk::Format::R32G32_UINT => 8,
        vk::Format::R32G32B32A32_SFLOAT | vk::Format::R32G32B32A32_UINT => 16,
        _ => 16,
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AccessMode {
    Read,
    Write,
}

///One access of a pass to a resource.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Interaction {
    ///The version that is read, or overwritten.
    pub resource: Res,
    ///Version minted by a write. Always `None` for reads.
    pub output: Option<Res>,
    pub mode: AccessMode,
    pub binding: u32,
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    pub layout: Option<vk::ImageLayout>,
}

impl Interaction {
    pub fn is_write(&self) -> bool {
        self.mode == AccessMode::Write
    }

    ///All versions this interaction touches. The consumed one first.
    pub fn touched(&self) -> impl Iterator<Item = Res> + '_ {
        std::iter::once(self.resource).chain(self.output)
    }
}
