use core::mem::size_of;

use crate::{StreamError, payload::*};

///Record kinds of both streams. Input records live below `0x100`, output records above.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Tag {
    SetBrief = 0x01,
    RegisterShader = 0x02,
    RegisterProgram = 0x03,
    RegisterPass = 0x04,
    RegisterBuffer = 0x05,
    RegisterImage = 0x06,
    RegisterSampler = 0x07,
    RegisterBindless = 0x08,
    ForceAliasBuffer = 0x09,
    ForceAliasImage = 0x0a,

    CreateBuffer = 0x101,
    CreateImage = 0x102,
    Alias = 0x103,
    QueueBegin = 0x104,
    SubmitFrame = 0x105,
    Pass = 0x106,

    End = 0xff,
}

impl Tag {
    ///Size of the fixed payload every record of this kind carries.
    pub const fn payload_size(&self) -> usize {
        match self {
            Tag::SetBrief => size_of::<BriefPayload>(),
            Tag::RegisterShader => size_of::<ShaderPayload>(),
            Tag::RegisterProgram => size_of::<ProgramPayload>(),
            Tag::RegisterPass => size_of::<PassPayload>(),
            Tag::RegisterBuffer => size_of::<BufferPayload>(),
            Tag::RegisterImage => size_of::<ImagePayload>(),
            Tag::RegisterSampler => size_of::<SamplerPayload>(),
            Tag::RegisterBindless => size_of::<BindlessPayload>(),
            Tag::ForceAliasBuffer | Tag::ForceAliasImage => size_of::<ForceAliasPayload>(),
            Tag::CreateBuffer => size_of::<CreateBufferPayload>(),
            Tag::CreateImage => size_of::<CreateImagePayload>(),
            Tag::Alias => size_of::<AliasPayload>(),
            Tag::QueueBegin => size_of::<QueueBeginPayload>(),
            Tag::SubmitFrame => size_of::<FramePayload>(),
            Tag::Pass => size_of::<PassRecordPayload>(),
            Tag::End => 0,
        }
    }

    pub const fn as_raw(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for Tag {
    type Error = StreamError;
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        let tag = match value {
            0x01 => Tag::SetBrief,
            0x02 => Tag::RegisterShader,
            0x03 => Tag::RegisterProgram,
            0x04 => Tag::RegisterPass,
            0x05 => Tag::RegisterBuffer,
            0x06 => Tag::RegisterImage,
            0x07 => Tag::RegisterSampler,
            0x08 => Tag::RegisterBindless,
            0x09 => Tag::ForceAliasBuffer,
            0x0a => Tag::ForceAliasImage,
            0x101 => Tag::CreateBuffer,
            0x102 => Tag::CreateImage,
            0x103 => Tag::Alias,
            0x104 => Tag::QueueBegin,
            0x105 => Tag::SubmitFrame,
            0x106 => Tag::Pass,
            0xff => Tag::End,
            other => return Err(StreamError::UnknownTag(other)),
        };
        Ok(tag)
    }
}
