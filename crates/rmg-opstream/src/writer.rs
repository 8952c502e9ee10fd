use core::mem::size_of;

use bytemuck::Pod;

use crate::{RECORD_SENTINEL, StreamHeader, Tag, VERSION, reader::padding};

///Collects the variable-length tail of a record.
#[derive(Default)]
pub struct TailWriter {
    bytes: Vec<u8>,
}

impl TailWriter {
    pub fn new() -> Self {
        TailWriter { bytes: Vec::new() }
    }

    pub fn items<T: Pod>(&mut self, items: &[T]) -> &mut Self {
        self.bytes.extend_from_slice(bytemuck::cast_slice(items));
        self
    }

    pub fn string(&mut self, string: &str) -> &mut Self {
        self.bytes.extend_from_slice(string.as_bytes());
        self
    }
}

///Writes a stream record by record. [finish](Self::finish) appends the end record.
pub struct StreamWriter {
    bytes: Vec<u8>,
}

impl StreamWriter {
    pub fn new(magic: [u8; 4]) -> Self {
        let mut bytes = Vec::with_capacity(1024);
        bytes.extend_from_slice(bytemuck::bytes_of(&StreamHeader {
            magic,
            version: VERSION,
        }));
        StreamWriter { bytes }
    }

    fn push_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    ///Appends one record. `payload` must be the payload type of `tag`.
    pub fn push<T: Pod>(&mut self, tag: Tag, payload: &T, tail: TailWriter) {
        debug_assert!(
            size_of::<T>() == tag.payload_size(),
            "Payload type does not match {:?}",
            tag
        );

        self.push_u32(tag.as_raw());
        self.push_u32(size_of::<T>() as u32);
        self.bytes.extend_from_slice(bytemuck::bytes_of(payload));
        self.push_u32(tail.bytes.len() as u32);
        self.bytes.extend_from_slice(&tail.bytes);
        self.bytes
            .extend(core::iter::repeat_n(0u8, padding(tail.bytes.len())));
        self.push_u32(RECORD_SENTINEL);
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.push_u32(Tag::End.as_raw());
        self.push_u32(0);
        self.push_u32(0);
        self.push_u32(RECORD_SENTINEL);

        #[cfg(feature = "logging")]
        log::trace!("Finished op-stream with {} bytes", self.bytes.len());

        self.bytes
    }
}
