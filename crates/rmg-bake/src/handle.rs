use std::fmt::Display;

use rmg_opstream::payload::{KIND_BUFFER, KIND_IMAGE};

macro_rules! dense_id {
    ($(#[$outer:meta])* $name:ident, $short:literal) => {
        $(#[$outer])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn index(&self) -> usize {
                self.0 as usize
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", $short, self.0)
            }
        }
    };
}

dense_id!(
    ///Dense buffer id, as used in the op-streams.
    BufferId,
    "Buffer"
);
dense_id!(
    ///Dense image id, as used in the op-streams.
    ImageId,
    "Image"
);
dense_id!(PassId, "Pass");
dense_id!(ProgramId, "Program");
dense_id!(ShaderId, "Shader");
dense_id!(SamplerId, "Sampler");
dense_id!(BindlessId, "Bindless");

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum ResKind {
    Buffer,
    Image,
}

impl ResKind {
    pub fn as_raw(&self) -> u32 {
        match self {
            ResKind::Buffer => KIND_BUFFER,
            ResKind::Image => KIND_IMAGE,
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            KIND_BUFFER => Some(ResKind::Buffer),
            KIND_IMAGE => Some(ResKind::Image),
            _ => None,
        }
    }
}

///Any resource the graph tracks. Either a buffer or an image.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Res {
    Buffer(BufferId),
    Image(ImageId),
}

impl Res {
    pub fn new(kind: ResKind, id: u32) -> Self {
        match kind {
            ResKind::Buffer => Res::Buffer(BufferId(id)),
            ResKind::Image => Res::Image(ImageId(id)),
        }
    }

    pub fn kind(&self) -> ResKind {
        match self {
            Res::Buffer(_) => ResKind::Buffer,
            Res::Image(_) => ResKind::Image,
        }
    }

    ///Raw id within its kind.
    pub fn raw(&self) -> u32 {
        match self {
            Res::Buffer(b) => b.0,
            Res::Image(i) => i.0,
        }
    }
}

impl Display for Res {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Res::Buffer(b) => write!(f, "Res::{}", b),
            Res::Image(i) => write!(f, "Res::{}", i),
        }
    }
}

impl From<BufferId> for Res {
    fn from(b: BufferId) -> Self {
        Res::Buffer(b)
    }
}

impl From<ImageId> for Res {
    fn from(i: ImageId) -> Self {
        Res::Image(i)
    }
}

///Pass reference used in diagnostics. Carries the name so errors stay readable after the registry is gone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassRef {
    pub id: PassId,
    pub name: String,
}

impl Display for PassRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' ({})", self.name, self.id)
    }
}
